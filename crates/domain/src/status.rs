//! Read models: per-device status and pin diagnostics.

use serde::{Deserialize, Serialize};

use crate::device::Pin;
use crate::id::DeviceId;
use crate::signal::{Level, Polarity, SwitchState};

/// Observed status of one device, as shown on status pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub id: DeviceId,
    pub pin: Pin,
    pub polarity: Polarity,
    pub state: SwitchState,
}

/// One write/read-back step of a pin diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStep {
    DirectHigh,
    DirectLow,
    LogicalOn,
    LogicalOff,
}

/// Level driven during a step and what the backend read back afterwards.
///
/// `observed` is `None` when the backend cannot read levels back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSample {
    pub cycle: u32,
    pub step: DiagnosticStep,
    pub driven: Level,
    pub observed: Option<Level>,
}

impl DiagnosticSample {
    /// `false` only when a readback disagreed with the driven level.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.observed.is_none_or(|level| level == self.driven)
    }
}

/// Outcome of exercising one device's pin directly and through its polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub device_id: DeviceId,
    pub pin: Pin,
    pub polarity: Polarity,
    pub backend: String,
    pub samples: Vec<DiagnosticSample>,
}

impl DiagnosticReport {
    /// Whether every readback matched the driven level.
    ///
    /// A pin that follows the driven level while the relay misbehaves points
    /// at the relay board (e.g. 5V low-trigger input fed from 3.3V logic).
    #[must_use]
    pub fn levels_follow_writes(&self) -> bool {
        self.samples.iter().all(DiagnosticSample::is_consistent)
    }
}
