//! # greenhouse-adapter-virtual
//!
//! In-memory [`SignalBackend`] used when no GPIO hardware is present.
//!
//! Every write succeeds and is recorded. Readback is off by default, so the
//! state store reports the last commanded state, which is what an operator
//! sees on a development machine. Tests can turn readback on and inject
//! per-pin faults.
//!
//! ## Dependency rule
//!
//! Depends on `greenhouse-app` (port traits) and `greenhouse-domain` only.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use greenhouse_app::ports::{OutputPlan, SignalBackend};
use greenhouse_domain::device::Pin;
use greenhouse_domain::error::HardwareError;
use greenhouse_domain::signal::Level;

#[derive(Default)]
struct Pins {
    levels: HashMap<Pin, Level>,
    faulty: HashSet<Pin>,
    writes: Vec<(Pin, Level)>,
    released: bool,
}

/// Simulated GPIO bank.
#[derive(Default)]
pub struct VirtualGpio {
    readback: bool,
    pins: Mutex<Pins>,
}

impl VirtualGpio {
    /// A backend that cannot read levels back.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose `read_level` reports the last level written.
    #[must_use]
    pub fn with_readback() -> Self {
        Self {
            readback: true,
            pins: Mutex::default(),
        }
    }

    /// Make every subsequent write to `pin` fail.
    pub fn fail_pin(&self, pin: Pin) {
        self.lock().faulty.insert(pin);
    }

    /// Undo [`fail_pin`](Self::fail_pin).
    pub fn heal_pin(&self, pin: Pin) {
        self.lock().faulty.remove(&pin);
    }

    /// Last level driven on `pin`, regardless of the readback setting.
    #[must_use]
    pub fn level(&self, pin: Pin) -> Option<Level> {
        self.lock().levels.get(&pin).copied()
    }

    /// Every successful `set_level` call, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(Pin, Level)> {
        self.lock().writes.clone()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    fn lock(&self) -> MutexGuard<'_, Pins> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalBackend for VirtualGpio {
    fn name(&self) -> &'static str {
        "virtual"
    }

    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let mut pins = self.lock();
        for plan in outputs {
            pins.levels.insert(plan.pin, plan.level);
        }
        pins.released = false;
        tracing::info!(pins = outputs.len(), "virtual outputs configured");
        async { Ok(()) }
    }

    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let mut pins = self.lock();
        let result = if pins.faulty.contains(&pin) {
            Err(HardwareError::Fault {
                pin,
                reason: "injected fault".to_string(),
            })
        } else {
            pins.levels.insert(pin, level);
            pins.writes.push((pin, level));
            Ok(())
        };
        async { result }
    }

    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send {
        let level = if self.readback {
            self.lock().levels.get(&pin).copied()
        } else {
            None
        };
        async move { Ok(level) }
    }

    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let mut pins = self.lock();
        for plan in outputs {
            pins.levels.insert(plan.pin, plan.level);
        }
        pins.released = true;
        async { Ok(()) }
    }
}
