//! Device: a relay-driven actuator wired to one GPIO pin.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::id::DeviceId;
use crate::signal::Polarity;

/// Physical pin identifier (BCM numbering on a Raspberry Pi).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pin(u32);

impl Pin {
    #[must_use]
    pub const fn new(number: u32) -> Self {
        Self(number)
    }

    #[must_use]
    pub const fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A controllable actuator as registered at startup.
///
/// `polarity` is only the *initial* wiring convention; the runtime value lives
/// in the [`PolarityPolicy`](crate::polarity::PolarityPolicy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub pin: Pin,
    pub polarity: Polarity,
}

impl Device {
    /// Create a builder for constructing a [`Device`].
    #[must_use]
    pub fn builder() -> DeviceBuilder {
        DeviceBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyDeviceId`] when `id` is empty.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.as_str().is_empty() {
            return Err(ConfigurationError::EmptyDeviceId);
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Device`].
#[derive(Debug, Default)]
pub struct DeviceBuilder {
    id: Option<DeviceId>,
    pin: Option<Pin>,
    polarity: Polarity,
}

impl DeviceBuilder {
    #[must_use]
    pub fn id(mut self, id: impl AsRef<str>) -> Self {
        self.id = Some(DeviceId::new(id));
        self
    }

    #[must_use]
    pub fn pin(mut self, pin: u32) -> Self {
        self.pin = Some(Pin::new(pin));
        self
    }

    #[must_use]
    pub fn active_low(mut self, active_low: bool) -> Self {
        self.polarity = Polarity::from_active_low(active_low);
        self
    }

    #[must_use]
    pub fn polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    /// Consume the builder, validate, and return a [`Device`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptyDeviceId`] if the id is missing or blank.
    pub fn build(self) -> Result<Device, ConfigurationError> {
        let device = Device {
            id: self.id.unwrap_or_else(|| DeviceId::new("")),
            pin: self.pin.unwrap_or(Pin::new(0)),
            polarity: self.polarity,
        };
        device.validate()?;
        Ok(device)
    }
}
