//! # greenhouse-adapter-gpio-sysfs
//!
//! [`SignalBackend`] over the Linux sysfs GPIO interface (`/sys/class/gpio`).
//!
//! | File | Use |
//! |------|-----|
//! | `export` / `unexport` | claim and release a pin |
//! | `gpioN/direction` | written `high` / `low`: output with a glitch-free initial level |
//! | `gpioN/value` | written `1` / `0`, read back for observed state |
//!
//! Pins exported by this backend are unexported on shutdown. If the backend
//! is dropped without an orderly shutdown (e.g. while unwinding) it drives
//! every configured pin to its latest OFF level synchronously.
//!
//! ## Dependency rule
//!
//! Depends on `greenhouse-app` (port traits) and `greenhouse-domain` only.

mod error;

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use greenhouse_app::ports::{OutputPlan, SignalBackend};
use greenhouse_domain::device::Pin;
use greenhouse_domain::error::HardwareError;
use greenhouse_domain::signal::Level;

pub use error::SysfsError;

/// Default location of the sysfs GPIO interface.
pub const DEFAULT_ROOT: &str = "/sys/class/gpio";

const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
struct Output {
    off: Level,
    exported_here: bool,
}

#[derive(Debug, Default)]
struct Outputs {
    pins: HashMap<Pin, Output>,
    released: bool,
}

/// GPIO bank driven through sysfs.
#[derive(Debug)]
pub struct SysfsGpio {
    root: PathBuf,
    export_timeout: Duration,
    outputs: Mutex<Outputs>,
}

impl SysfsGpio {
    /// Use the sysfs tree at `root` without checking that it exists.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            export_timeout: DEFAULT_EXPORT_TIMEOUT,
            outputs: Mutex::default(),
        }
    }

    /// Use the sysfs tree at `root` if it exposes an `export` file.
    ///
    /// # Errors
    ///
    /// Returns [`SysfsError::Missing`] when `root/export` does not exist.
    pub fn detect(root: impl Into<PathBuf>) -> Result<Self, SysfsError> {
        let root = root.into();
        if root.join("export").exists() {
            tracing::debug!(root = %root.display(), "sysfs GPIO interface found");
            Ok(Self::new(root))
        } else {
            Err(SysfsError::Missing { root })
        }
    }

    /// How long to wait for `gpioN/` to appear (and become writable) after export.
    #[must_use]
    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout = timeout;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pin_dir(&self, pin: Pin) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }

    fn value_path(&self, pin: Pin) -> PathBuf {
        self.pin_dir(pin).join("value")
    }

    fn lock(&self) -> MutexGuard<'_, Outputs> {
        self.outputs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_configured(&self, pin: Pin) -> Result<(), HardwareError> {
        if self.lock().pins.contains_key(&pin) {
            Ok(())
        } else {
            Err(HardwareError::NotConfigured { pin })
        }
    }

    async fn configure(&self, plan: OutputPlan) -> Result<(), SysfsError> {
        let dir = self.pin_dir(plan.pin);
        let exported_here = !dir.exists();
        if exported_here {
            write(self.root.join("export"), plan.pin.to_string()).await?;
        }
        // Recorded before waiting so that shutdown unexports a half-configured pin.
        self.lock().pins.insert(
            plan.pin,
            Output {
                off: plan.level,
                exported_here,
            },
        );
        if exported_here {
            self.wait_for(&dir).await?;
        }

        self.write_when_permitted(dir.join("direction"), direction(plan.level))
            .await?;
        tracing::debug!(pin = %plan.pin, level = %plan.level, exported_here, "output configured");
        Ok(())
    }

    async fn wait_for(&self, dir: &Path) -> Result<(), SysfsError> {
        let deadline = tokio::time::Instant::now() + self.export_timeout;
        while !dir.exists() {
            if tokio::time::Instant::now() >= deadline {
                return Err(SysfsError::ExportTimeout {
                    path: dir.to_path_buf(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// udev fixes permissions of freshly exported pins asynchronously.
    async fn write_when_permitted(&self, path: PathBuf, contents: &str) -> Result<(), SysfsError> {
        let deadline = tokio::time::Instant::now() + self.export_timeout;
        loop {
            match tokio::fs::write(&path, contents).await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.kind() == ErrorKind::PermissionDenied
                        && tokio::time::Instant::now() < deadline =>
                {
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(source) => return Err(SysfsError::Io { path, source }),
            }
        }
    }

    async fn release(&self, plan: OutputPlan) -> Result<(), HardwareError> {
        let Some(output) = self.lock().pins.get(&plan.pin).copied() else {
            return Ok(());
        };
        let driven = write(self.value_path(plan.pin), value(plan.level))
            .await
            .map_err(|err| err.at(plan.pin));
        if output.exported_here {
            write(self.root.join("unexport"), plan.pin.to_string())
                .await
                .map_err(|err| err.at(plan.pin))?;
        }
        self.lock().pins.remove(&plan.pin);
        driven
    }
}

impl SignalBackend for SysfsGpio {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn initialize(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        async move {
            self.lock().released = false;
            for plan in outputs {
                self.configure(*plan).await.map_err(|err| err.at(plan.pin))?;
            }
            tracing::info!(root = %self.root.display(), pins = outputs.len(), "sysfs outputs configured");
            Ok(())
        }
    }

    fn set_level(
        &self,
        pin: Pin,
        level: Level,
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        let configured = self.ensure_configured(pin);
        let path = self.value_path(pin);
        async move {
            configured?;
            write(path, value(level)).await.map_err(|err| err.at(pin))
        }
    }

    fn read_level(
        &self,
        pin: Pin,
    ) -> impl Future<Output = Result<Option<Level>, HardwareError>> + Send {
        let configured = self.ensure_configured(pin);
        let path = self.value_path(pin);
        async move {
            configured?;
            read(path).await.map(Some).map_err(|err| err.at(pin))
        }
    }

    fn update_off_level(&self, plan: OutputPlan) {
        if let Some(output) = self.lock().pins.get_mut(&plan.pin) {
            output.off = plan.level;
            tracing::debug!(pin = %plan.pin, off = %plan.level, "off level updated");
        }
    }

    fn shutdown(
        &self,
        outputs: &[OutputPlan],
    ) -> impl Future<Output = Result<(), HardwareError>> + Send {
        async move {
            let mut first_error = None;
            for plan in outputs {
                if let Err(err) = self.release(*plan).await {
                    tracing::error!(pin = %plan.pin, error = %err, "failed to release output");
                    first_error.get_or_insert(err);
                }
            }
            self.lock().released = true;
            first_error.map_or(Ok(()), Err)
        }
    }
}

impl Drop for SysfsGpio {
    fn drop(&mut self) {
        let outputs = std::mem::take(&mut *self.lock());
        if outputs.released || outputs.pins.is_empty() {
            return;
        }
        tracing::warn!(pins = outputs.pins.len(), "sysfs backend dropped without shutdown, driving outputs off");
        for (pin, output) in outputs.pins {
            if let Err(err) = std::fs::write(self.value_path(pin), value(output.off)) {
                tracing::error!(%pin, error = %err, "failed to drive output off");
            }
            if output.exported_here {
                let _ = std::fs::write(self.root.join("unexport"), pin.to_string());
            }
        }
    }
}

fn direction(level: Level) -> &'static str {
    match level {
        Level::High => "high",
        Level::Low => "low",
    }
}

fn value(level: Level) -> &'static str {
    match level {
        Level::High => "1",
        Level::Low => "0",
    }
}

async fn write(path: PathBuf, contents: impl AsRef<[u8]>) -> Result<(), SysfsError> {
    tokio::fs::write(&path, contents)
        .await
        .map_err(|source| SysfsError::Io { path, source })
}

async fn read(path: PathBuf) -> Result<Level, SysfsError> {
    let raw = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| SysfsError::Io {
            path: path.clone(),
            source,
        })?;
    match raw.trim() {
        "1" => Ok(Level::High),
        "0" => Ok(Level::Low),
        other => Err(SysfsError::InvalidValue {
            path,
            value: other.to_string(),
        }),
    }
}
