use std::path::PathBuf;

use greenhouse_domain::device::Pin;
use greenhouse_domain::error::HardwareError;

/// Failures talking to the sysfs GPIO interface.
#[derive(Debug, thiserror::Error)]
pub enum SysfsError {
    #[error("sysfs GPIO interface not found at {}", root.display())]
    Missing { root: PathBuf },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} did not appear after export", path.display())]
    ExportTimeout { path: PathBuf },

    #[error("{} holds {value:?}, expected 0 or 1", path.display())]
    InvalidValue { path: PathBuf, value: String },
}

impl SysfsError {
    /// Attach the failing pin, producing the port-level error.
    pub(crate) fn at(self, pin: Pin) -> HardwareError {
        match self {
            Self::Io { source, .. } => HardwareError::Io { pin, source },
            Self::InvalidValue { value, .. } => HardwareError::InvalidLevel { pin, value },
            other @ (Self::Missing { .. } | Self::ExportTimeout { .. }) => HardwareError::Fault {
                pin,
                reason: other.to_string(),
            },
        }
    }
}
