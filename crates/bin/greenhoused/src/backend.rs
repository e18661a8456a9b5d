//! Signal backend selection.
//!
//! The backend is chosen once at startup and never swapped afterwards.

use std::future::Future;

use greenhouse_adapter_gpio_sysfs::SysfsGpio;
use greenhouse_adapter_virtual::VirtualGpio;
use greenhouse_app::ports::{OutputPlan, SignalBackend};
use greenhouse_domain::device::Pin;
use greenhouse_domain::error::{ConfigurationError, HardwareError};
use greenhouse_domain::signal::Level;

use crate::config::{BackendMode, GpioConfig};

/// The backend picked by [`select`].
pub enum SelectedBackend {
    Sysfs(SysfsGpio),
    Virtual(VirtualGpio),
}

/// Pick the backend described by `config`.
///
/// # Errors
///
/// Returns [`ConfigurationError::BackendMissing`] when real GPIO is required
/// (or the fallback is disabled) and the sysfs interface is absent.
pub fn select(config: &GpioConfig) -> Result<SelectedBackend, ConfigurationError> {
    let virtual_gpio = || {
        if config.mock_readback {
            VirtualGpio::with_readback()
        } else {
            VirtualGpio::new()
        }
    };

    match config.backend {
        BackendMode::Mock => {
            tracing::info!("using virtual GPIO backend");
            Ok(SelectedBackend::Virtual(virtual_gpio()))
        }
        BackendMode::Sysfs => SysfsGpio::detect(config.sysfs_root.clone())
            .map(SelectedBackend::Sysfs)
            .map_err(|err| {
                tracing::error!(error = %err, "sysfs GPIO backend required but unavailable");
                ConfigurationError::BackendMissing
            }),
        BackendMode::Auto => match SysfsGpio::detect(config.sysfs_root.clone()) {
            Ok(gpio) => Ok(SelectedBackend::Sysfs(gpio)),
            Err(err) if config.allow_mock_fallback => {
                tracing::warn!(error = %err, "no GPIO hardware found, falling back to virtual backend");
                Ok(SelectedBackend::Virtual(virtual_gpio()))
            }
            Err(err) => {
                tracing::error!(error = %err, "no GPIO hardware found and mock fallback is disabled");
                Err(ConfigurationError::BackendMissing)
            }
        },
    }
}

impl SignalBackend for SelectedBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Sysfs(gpio) => gpio.name(),
            Self::Virtual(gpio) => gpio.name(),
        }
    }

    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        async move {
            match self {
                Self::Sysfs(gpio) => gpio.initialize(outputs).await,
                Self::Virtual(gpio) => gpio.initialize(outputs).await,
            }
        }
    }

    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        async move {
            match self {
                Self::Sysfs(gpio) => gpio.set_level(pin, level).await,
                Self::Virtual(gpio) => gpio.set_level(pin, level).await,
            }
        }
    }

    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send {
        async move {
            match self {
                Self::Sysfs(gpio) => gpio.read_level(pin).await,
                Self::Virtual(gpio) => gpio.read_level(pin).await,
            }
        }
    }

    fn update_off_level(&self, plan: OutputPlan) {
        match self {
            Self::Sysfs(gpio) => gpio.update_off_level(plan),
            Self::Virtual(gpio) => gpio.update_off_level(plan),
        }
    }

    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        async move {
            match self {
                Self::Sysfs(gpio) => gpio.shutdown(outputs).await,
                Self::Virtual(gpio) => gpio.shutdown(outputs).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: BackendMode, root: &std::path::Path) -> GpioConfig {
        GpioConfig {
            backend,
            sysfs_root: root.to_path_buf(),
            ..GpioConfig::default()
        }
    }

    #[test]
    fn should_use_virtual_backend_when_mock_requested() {
        let root = tempfile::tempdir().unwrap();
        let backend = select(&config(BackendMode::Mock, root.path())).unwrap();
        assert_eq!(backend.name(), "virtual");
    }

    #[test]
    fn should_use_sysfs_when_export_file_present() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("export"), "").unwrap();
        let backend = select(&config(BackendMode::Auto, root.path())).unwrap();
        assert_eq!(backend.name(), "sysfs");
    }

    #[test]
    fn should_fall_back_to_virtual_when_sysfs_missing() {
        let root = tempfile::tempdir().unwrap();
        let backend = select(&config(BackendMode::Auto, root.path())).unwrap();
        assert_eq!(backend.name(), "virtual");
    }

    #[test]
    fn should_fail_when_fallback_disabled_and_sysfs_missing() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(BackendMode::Auto, root.path());
        config.allow_mock_fallback = false;
        assert!(matches!(
            select(&config),
            Err(ConfigurationError::BackendMissing)
        ));
    }

    #[test]
    fn should_fail_when_sysfs_required_but_missing() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(
            select(&config(BackendMode::Sysfs, root.path())),
            Err(ConfigurationError::BackendMissing)
        ));
    }

    #[tokio::test]
    async fn should_delegate_to_selected_backend() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config(BackendMode::Mock, root.path());
        config.mock_readback = true;
        let backend = select(&config).unwrap();

        backend.set_level(Pin::new(5), Level::Low).await.unwrap();
        assert_eq!(
            backend.read_level(Pin::new(5)).await.unwrap(),
            Some(Level::Low)
        );
    }
}
