//! Event: an immutable record of something that happened to a device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{DeviceId, EventId};
use crate::signal::{Polarity, SwitchState};

/// UTC timestamp attached to every event.
pub type Timestamp = DateTime<Utc>;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// A commanded logical state was applied to the hardware.
    StateChanged {
        device_id: DeviceId,
        from: SwitchState,
        to: SwitchState,
    },
    /// An operator changed the wiring polarity of a device.
    PolarityChanged {
        device_id: DeviceId,
        polarity: Polarity,
    },
    /// All outputs were driven OFF and the backend released.
    BackendReleased,
}

/// A timestamped [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub id: EventId,
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl DeviceEvent {
    /// Stamp `kind` with a fresh id and the current time.
    #[must_use]
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The device the event concerns, if any.
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        match &self.kind {
            EventKind::StateChanged { device_id, .. }
            | EventKind::PolarityChanged { device_id, .. } => Some(device_id),
            EventKind::BackendReleased => None,
        }
    }
}
