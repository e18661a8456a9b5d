//! Electrical levels, wiring polarity and logical switch state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Electrical level driven on (or read back from) a GPIO pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    High,
    Low,
}

impl Level {
    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::High => Self::Low,
            Self::Low => Self::High,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("HIGH"),
            Self::Low => f.write_str("LOW"),
        }
    }
}

/// Which electrical level energises the relay.
///
/// Most cheap relay boards are active-low: pulling the input LOW switches
/// the relay ON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    #[default]
    ActiveLow,
    ActiveHigh,
}

impl Polarity {
    #[must_use]
    pub fn from_active_low(active_low: bool) -> Self {
        if active_low {
            Self::ActiveLow
        } else {
            Self::ActiveHigh
        }
    }

    #[must_use]
    pub fn is_active_low(self) -> bool {
        matches!(self, Self::ActiveLow)
    }

    #[must_use]
    pub fn inverted(self) -> Self {
        match self {
            Self::ActiveLow => Self::ActiveHigh,
            Self::ActiveHigh => Self::ActiveLow,
        }
    }

    /// Level that makes the device logically ON (`on == true`) or OFF.
    #[must_use]
    pub fn level_for(self, on: bool) -> Level {
        match (self, on) {
            (Self::ActiveLow, true) | (Self::ActiveHigh, false) => Level::Low,
            (Self::ActiveLow, false) | (Self::ActiveHigh, true) => Level::High,
        }
    }

    /// Logical state implied by an observed level.
    #[must_use]
    pub fn is_on_at(self, level: Level) -> bool {
        self.level_for(true) == level
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveLow => f.write_str("active-low"),
            Self::ActiveHigh => f.write_str("active-high"),
        }
    }
}

/// Logical ON/OFF state of a device as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    #[default]
    Off,
}

impl SwitchState {
    #[must_use]
    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }

    /// Uppercase label used by the status endpoint and the dashboard.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }
}

impl From<bool> for SwitchState {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_drive_low_for_on_when_active_low() {
        assert_eq!(Polarity::ActiveLow.level_for(true), Level::Low);
        assert_eq!(Polarity::ActiveLow.level_for(false), Level::High);
    }

    #[test]
    fn should_drive_high_for_on_when_active_high() {
        assert_eq!(Polarity::ActiveHigh.level_for(true), Level::High);
        assert_eq!(Polarity::ActiveHigh.level_for(false), Level::Low);
    }

    #[test]
    fn should_invert_level_to_logical_mapping() {
        for polarity in [Polarity::ActiveLow, Polarity::ActiveHigh] {
            for on in [true, false] {
                assert_eq!(polarity.is_on_at(polarity.level_for(on)), on);
            }
        }
    }

    #[test]
    fn should_flip_polarity_when_inverted() {
        assert_eq!(Polarity::ActiveLow.inverted(), Polarity::ActiveHigh);
        assert!(!Polarity::ActiveLow.inverted().is_active_low());
    }

    #[test]
    fn should_label_switch_state_uppercase() {
        assert_eq!(SwitchState::On.label(), "ON");
        assert_eq!(SwitchState::from(false).label(), "OFF");
    }

    #[test]
    fn should_display_switch_state_lowercase() {
        assert_eq!(SwitchState::On.to_string(), "on");
        assert_eq!(serde_json::to_string(&SwitchState::Off).unwrap(), "\"off\"");
    }
}
