//! In-memory fakes shared by the service tests.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Mutex;

use greenhouse_domain::device::Pin;
use greenhouse_domain::error::HardwareError;
use greenhouse_domain::event::DeviceEvent;
use greenhouse_domain::signal::Level;

use crate::ports::{EventPublisher, OutputPlan, SignalBackend};

#[derive(Default)]
pub struct FakeBackend {
    pub readback: bool,
    pub fail_initialize: bool,
    pub levels: Mutex<HashMap<Pin, Level>>,
    pub failing: Mutex<HashSet<Pin>>,
    pub writes: Mutex<Vec<(Pin, Level)>>,
    pub off_levels: Mutex<HashMap<Pin, Level>>,
}

impl FakeBackend {
    pub fn with_readback() -> Self {
        Self {
            readback: true,
            ..Self::default()
        }
    }

    pub fn fail_pin(&self, pin: u32) {
        self.failing.lock().unwrap().insert(Pin::new(pin));
    }

    pub fn level(&self, pin: u32) -> Option<Level> {
        self.levels.lock().unwrap().get(&Pin::new(pin)).copied()
    }

    pub fn off_level(&self, pin: u32) -> Option<Level> {
        self.off_levels.lock().unwrap().get(&Pin::new(pin)).copied()
    }

    /// Writes issued after `initialize`.
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl SignalBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let result = if self.fail_initialize {
            Err(HardwareError::Fault {
                pin: outputs.first().map_or(Pin::new(0), |plan| plan.pin),
                reason: "export refused".to_string(),
            })
        } else {
            let mut levels = self.levels.lock().unwrap();
            for plan in outputs {
                levels.insert(plan.pin, plan.level);
            }
            Ok(())
        };
        async { result }
    }

    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let result = if self.failing.lock().unwrap().contains(&pin) {
            Err(HardwareError::Fault {
                pin,
                reason: "injected".to_string(),
            })
        } else {
            self.levels.lock().unwrap().insert(pin, level);
            self.writes.lock().unwrap().push((pin, level));
            Ok(())
        };
        async { result }
    }

    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send {
        let result = if self.readback {
            self.levels.lock().unwrap().get(&pin).copied()
        } else {
            None
        };
        async move { Ok(result) }
    }

    fn update_off_level(&self, plan: OutputPlan) {
        self.off_levels.lock().unwrap().insert(plan.pin, plan.level);
    }

    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let mut levels = self.levels.lock().unwrap();
        for plan in outputs {
            levels.insert(plan.pin, plan.level);
        }
        async { Ok(()) }
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub events: Mutex<Vec<DeviceEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<DeviceEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, event: DeviceEvent) -> impl Future<Output = ()> + Send {
        self.events.lock().unwrap().push(event);
        async {}
    }
}
