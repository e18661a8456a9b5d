//! Common error types used across the workspace.
//!
//! Each failure class has its own typed error; [`GreenhouseError`] wraps them
//! via `#[from]` so layers can propagate with `?`.

use crate::device::Pin;
use crate::id::DeviceId;

/// Top-level error for the device-control core.
///
/// Displays as the wrapped error so per-action failure reasons stay specific.
#[derive(Debug, thiserror::Error)]
pub enum GreenhouseError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Hardware(#[from] HardwareError),

    #[error(transparent)]
    Unavailable(#[from] UnavailableError),
}

/// Startup-time violations of the device catalogue. Always fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no devices configured")]
    EmptyRegistry,

    #[error("device id must not be empty")]
    EmptyDeviceId,

    #[error("device '{0}' is registered twice")]
    DuplicateDevice(DeviceId),

    #[error("pin {pin} is assigned to both '{first}' and '{second}'")]
    DuplicatePin {
        pin: Pin,
        first: DeviceId,
        second: DeviceId,
    },

    #[error("alias must not be empty")]
    EmptyAlias,

    #[error("alias '{alias}' points to unknown device '{target}'")]
    UnknownAliasTarget { alias: String, target: String },

    #[error("alias '{alias}' already maps to '{existing}', cannot remap to '{requested}'")]
    AliasConflict {
        alias: String,
        existing: DeviceId,
        requested: DeviceId,
    },

    #[error("no signal backend available and mock fallback is disabled")]
    BackendMissing,
}

/// A device reference that does not match any registered device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device '{input}'; valid devices: {}", join_ids(.valid))]
pub struct ResolutionError {
    pub input: String,
    pub valid: Vec<DeviceId>,
}

fn join_ids(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(DeviceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Structural problems with a control request, detected before any hardware access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid request body")]
    UnrecognizedRequest,

    #[error("request body is not valid JSON")]
    MalformedBody,

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid action: {0}")]
    InvalidAction(String),
}

/// Failure reported by a signal backend while driving or reading a pin.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("pin {pin}: {source}")]
    Io {
        pin: Pin,
        #[source]
        source: std::io::Error,
    },

    #[error("pin {pin} is not configured as an output")]
    NotConfigured { pin: Pin },

    #[error("pin {pin} reported an unreadable level: {value:?}")]
    InvalidLevel { pin: Pin, value: String },

    #[error("pin {pin} fault: {reason}")]
    Fault { pin: Pin, reason: String },
}

impl HardwareError {
    /// The pin the failure relates to.
    #[must_use]
    pub fn pin(&self) -> Pin {
        match self {
            Self::Io { pin, .. }
            | Self::NotConfigured { pin }
            | Self::InvalidLevel { pin, .. }
            | Self::Fault { pin, .. } => *pin,
        }
    }
}

/// The state store cannot serve requests because the backend is not usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnavailableError {
    #[error("signal backend has not been initialized")]
    NotInitialized,

    #[error("signal backend faulted during initialization: {0}")]
    Faulted(String),

    #[error("signal backend has been released")]
    Released,
}
