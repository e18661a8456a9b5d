//! Signal backend port: drive and read electrical levels on GPIO pins.
//!
//! Exactly one backend is chosen at startup (real GPIO or the in-memory
//! virtual one) and kept for the lifetime of the process.

use std::future::Future;

use greenhouse_domain::device::Pin;
use greenhouse_domain::error::HardwareError;
use greenhouse_domain::signal::Level;

/// Level a pin must be driven to, typically a device's OFF level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputPlan {
    pub pin: Pin,
    pub level: Level,
}

/// Hardware abstraction over a set of output pins.
///
/// Backends know nothing about devices or polarity: the state store computes
/// every level before calling in.
pub trait SignalBackend {
    /// Short label reported by status endpoints (e.g. `"sysfs"`).
    fn name(&self) -> &'static str;

    /// Configure every pin in `outputs` as an output driven to its level.
    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send;

    /// Drive `pin` to `level`.
    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send;

    /// Read the current level of `pin`.
    ///
    /// Returns `Ok(None)` when the backend cannot read levels back.
    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send;

    /// Record `plan.level` as the new OFF level of `plan.pin`.
    ///
    /// Called after a polarity change. Backends that drive outputs OFF on
    /// their own (e.g. when dropped without shutdown) must use the latest
    /// level; the others can ignore it.
    fn update_off_level(&self, plan: OutputPlan) {
        let _ = plan;
    }

    /// Drive every pin in `outputs` to its level, then release the pins.
    ///
    /// Implementations keep going after a failed pin so that as many relays
    /// as possible end up de-energised; the first error is returned.
    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send;
}

impl<T: SignalBackend + Send + Sync> SignalBackend for std::sync::Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        (**self).initialize(outputs)
    }

    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        (**self).set_level(pin, level)
    }

    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send {
        (**self).read_level(pin)
    }

    fn update_off_level(&self, plan: OutputPlan) {
        (**self).update_off_level(plan);
    }

    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        (**self).shutdown(outputs)
    }
}
