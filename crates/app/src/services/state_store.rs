//! State store: the single authoritative record of commanded device state.
//!
//! Every hardware write goes through [`StateStore`]. Its mutable table
//! (logical states, polarity policy, lifecycle) lives behind one async mutex
//! held for the whole read-modify-write, hardware write and settle delay
//! included, so concurrent requests never interleave on a pin.
//! Diagnose is the exception: it takes the lock once per pin access so a
//! long run does not stall other requests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use greenhouse_domain::control::{ControlIntent, ControlResult};
use greenhouse_domain::device::Device;
use greenhouse_domain::error::{GreenhouseError, HardwareError, ResolutionError, UnavailableError};
use greenhouse_domain::event::{DeviceEvent, EventKind};
use greenhouse_domain::id::DeviceId;
use greenhouse_domain::polarity::PolarityPolicy;
use greenhouse_domain::registry::DeviceRegistry;
use greenhouse_domain::signal::{Level, Polarity, SwitchState};
use greenhouse_domain::status::{DeviceStatus, DiagnosticReport, DiagnosticSample, DiagnosticStep};

use crate::ports::{EventPublisher, OutputPlan, SignalBackend};

/// Delay between a write and its debug readback, giving relay boards time to settle.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(20);

/// Where the store is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    Faulted(String),
    Released,
}

impl Lifecycle {
    fn ensure_ready(&self) -> Result<(), UnavailableError> {
        match self {
            Self::Ready => Ok(()),
            Self::Uninitialized => Err(UnavailableError::NotInitialized),
            Self::Faulted(reason) => Err(UnavailableError::Faulted(reason.clone())),
            Self::Released => Err(UnavailableError::Released),
        }
    }
}

struct Inner {
    states: HashMap<DeviceId, bool>,
    policy: PolarityPolicy,
    lifecycle: Lifecycle,
}

/// Owns the device table and serializes access to the signal backend.
pub struct StateStore<B, P> {
    registry: Arc<DeviceRegistry>,
    backend: B,
    publisher: P,
    settle: Duration,
    inner: Mutex<Inner>,
}

impl<B, P> StateStore<B, P>
where
    B: SignalBackend + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    /// Create an uninitialized store. Call [`initialize`](Self::initialize)
    /// before serving requests.
    pub fn new(registry: Arc<DeviceRegistry>, backend: B, publisher: P) -> Self {
        let policy = PolarityPolicy::from_registry(&registry);
        let states = registry.devices().map(|d| (d.id.clone(), false)).collect();
        Self {
            registry,
            backend,
            publisher,
            settle: DEFAULT_SETTLE_TIME,
            inner: Mutex::new(Inner {
                states,
                policy,
                lifecycle: Lifecycle::Uninitialized,
            }),
        }
    }

    #[must_use]
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Label of the backend in use (e.g. `"sysfs"`).
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        self.inner.lock().await.lifecycle.clone()
    }

    /// Whether the store can currently serve control requests.
    ///
    /// # Errors
    ///
    /// Returns [`UnavailableError`] unless the store is `Ready`.
    pub async fn availability(&self) -> Result<(), UnavailableError> {
        self.inner.lock().await.lifecycle.ensure_ready()
    }

    /// Configure every registered pin as an output at its OFF level.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`HardwareError`]; the store is then `Faulted`
    /// and refuses all further operations.
    #[tracing::instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn initialize(&self) -> Result<(), HardwareError> {
        let mut inner = self.inner.lock().await;
        if inner.lifecycle != Lifecycle::Uninitialized {
            tracing::warn!(lifecycle = ?inner.lifecycle, "state store already initialized");
            return Ok(());
        }

        let plan = self.off_plan(&inner.policy);
        match self.backend.initialize(&plan).await {
            Ok(()) => {
                for state in inner.states.values_mut() {
                    *state = false;
                }
                inner.lifecycle = Lifecycle::Ready;
                tracing::info!(devices = plan.len(), "all outputs configured and driven off");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "signal backend initialization failed");
                inner.lifecycle = Lifecycle::Faulted(err.to_string());
                Err(err)
            }
        }
    }

    /// Command `id` ON or OFF and return the resulting logical state.
    ///
    /// # Errors
    ///
    /// - [`GreenhouseError::Unavailable`] when the store is not `Ready`
    /// - [`GreenhouseError::Resolution`] when `id` is not registered
    /// - [`GreenhouseError::Hardware`] when the write fails; the stored state
    ///   is left unchanged
    #[tracing::instrument(skip(self, id), fields(device = %id))]
    pub async fn set_device(&self, id: &DeviceId, on: bool) -> Result<SwitchState, GreenhouseError> {
        let mut inner = self.ready().await?;
        let device = self.device(id)?;
        Ok(self.apply_locked(&mut inner, device, on).await?)
    }

    /// Invert the stored logical state of `id`.
    ///
    /// The stored state is used even when the backend could read the pin:
    /// the last command wins over whatever the wiring reports.
    ///
    /// # Errors
    ///
    /// Same as [`set_device`](Self::set_device).
    #[tracing::instrument(skip(self, id), fields(device = %id))]
    pub async fn toggle_device(&self, id: &DeviceId) -> Result<SwitchState, GreenhouseError> {
        let mut inner = self.ready().await?;
        let device = self.device(id)?;
        let current = inner.states.get(&device.id).copied().unwrap_or(false);
        Ok(self.apply_locked(&mut inner, device, !current).await?)
    }

    /// Current logical state of `id`: live readback when the backend supports
    /// it, the stored state otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`GreenhouseError::Unavailable`] or [`GreenhouseError::Resolution`].
    pub async fn get_state(&self, id: &DeviceId) -> Result<bool, GreenhouseError> {
        let inner = self.ready().await?;
        let device = self.device(id)?;
        Ok(self.observed_locked(&inner, device).await)
    }

    /// Snapshot of every device in registry order, taken under one lock.
    ///
    /// # Errors
    ///
    /// Returns [`UnavailableError`] unless the store is `Ready`.
    pub async fn get_all_states(&self) -> Result<Vec<(DeviceId, bool)>, UnavailableError> {
        let inner = self.ready().await?;
        let mut snapshot = Vec::with_capacity(self.registry.len());
        for device in self.registry.devices() {
            let on = self.observed_locked(&inner, device).await;
            snapshot.push((device.id.clone(), on));
        }
        Ok(snapshot)
    }

    /// Last commanded state of every device in registry order, whatever the
    /// lifecycle. After [`shutdown`](Self::shutdown) every device is OFF.
    pub async fn commanded_states(&self) -> Vec<(DeviceId, bool)> {
        let inner = self.inner.lock().await;
        self.registry
            .devices()
            .map(|device| {
                let on = inner.states.get(&device.id).copied().unwrap_or(false);
                (device.id.clone(), on)
            })
            .collect()
    }

    /// Id, pin, polarity and observed state of every device.
    ///
    /// # Errors
    ///
    /// Returns [`UnavailableError`] unless the store is `Ready`.
    pub async fn status(&self) -> Result<Vec<DeviceStatus>, UnavailableError> {
        let inner = self.ready().await?;
        let mut statuses = Vec::with_capacity(self.registry.len());
        for device in self.registry.devices() {
            let on = self.observed_locked(&inner, device).await;
            statuses.push(DeviceStatus {
                id: device.id.clone(),
                pin: device.pin,
                polarity: self.polarity_locked(&inner, device),
                state: SwitchState::from(on),
            });
        }
        Ok(statuses)
    }

    /// Drive every device ON (or OFF) in registry order.
    ///
    /// Not atomic: a failed device does not stop the others, and every
    /// per-device outcome is reported.
    ///
    /// # Errors
    ///
    /// Returns [`UnavailableError`] unless the store is `Ready`.
    #[tracing::instrument(skip(self))]
    pub async fn turn_all(&self, on: bool) -> Result<Vec<ControlResult>, UnavailableError> {
        let mut inner = self.ready().await?;
        let intent = if on { ControlIntent::On } else { ControlIntent::Off };
        let mut results = Vec::with_capacity(self.registry.len());
        for device in self.registry.devices() {
            let result = match self.apply_locked(&mut inner, device, on).await {
                Ok(state) => ControlResult::ok(device.id.as_str(), intent, state),
                Err(err) => ControlResult::failed(device.id.as_str(), Some(intent), err),
            };
            results.push(result);
        }
        Ok(results)
    }

    /// # Errors
    ///
    /// See [`turn_all`](Self::turn_all).
    pub async fn turn_all_on(&self) -> Result<Vec<ControlResult>, UnavailableError> {
        self.turn_all(true).await
    }

    /// # Errors
    ///
    /// See [`turn_all`](Self::turn_all).
    pub async fn turn_all_off(&self) -> Result<Vec<ControlResult>, UnavailableError> {
        self.turn_all(false).await
    }

    /// Current polarity of `id`, or `None` if it is not registered.
    pub async fn polarity(&self, id: &DeviceId) -> Option<Polarity> {
        self.inner.lock().await.policy.polarity(id)
    }

    /// Set the polarity of `id` and immediately re-drive its pin so the
    /// device keeps its logical state under the new wiring.
    ///
    /// # Errors
    ///
    /// Same as [`set_device`](Self::set_device). When the re-drive fails the
    /// previous polarity is restored.
    #[tracing::instrument(skip(self, id), fields(device = %id))]
    pub async fn set_polarity(
        &self,
        id: &DeviceId,
        active_low: bool,
    ) -> Result<DeviceStatus, GreenhouseError> {
        let mut inner = self.ready().await?;
        let device = self.device(id)?;
        let polarity = Polarity::from_active_low(active_low);
        Ok(self.repolarize_locked(&mut inner, device, polarity).await?)
    }

    /// Invert the polarity of `id`.
    ///
    /// # Errors
    ///
    /// See [`set_polarity`](Self::set_polarity).
    #[tracing::instrument(skip(self, id), fields(device = %id))]
    pub async fn toggle_polarity(&self, id: &DeviceId) -> Result<DeviceStatus, GreenhouseError> {
        let mut inner = self.ready().await?;
        let device = self.device(id)?;
        let polarity = self.polarity_locked(&inner, device).inverted();
        Ok(self.repolarize_locked(&mut inner, device, polarity).await?)
    }

    /// Exercise the pin of `id`: drive HIGH, LOW directly, then logical ON,
    /// OFF, reading the level back after each step.
    ///
    /// The lock is taken for each write and each readback but released while
    /// waiting `delay`, so other requests and [`shutdown`](Self::shutdown)
    /// are held up by one pin access at most. Steps stop as soon as the
    /// store leaves `Ready`. The device is left OFF afterwards, even when a
    /// step fails.
    ///
    /// # Errors
    ///
    /// Same as [`set_device`](Self::set_device).
    #[tracing::instrument(skip(self, id), fields(device = %id))]
    pub async fn diagnose(
        &self,
        id: &DeviceId,
        cycles: u32,
        delay: Duration,
    ) -> Result<DiagnosticReport, GreenhouseError> {
        let (device, polarity) = {
            let inner = self.ready().await?;
            let device = self.device(id)?;
            (device, self.polarity_locked(&inner, device))
        };

        let sampled = self.sample(device, polarity, cycles, delay).await;
        // Logical OFF is the last step of every cycle; make it stick.
        let mut inner = self.ready().await?;
        let restored = self.apply_locked(&mut inner, device, false).await;
        drop(inner);
        let samples = sampled?;
        restored?;

        let report = DiagnosticReport {
            device_id: device.id.clone(),
            pin: device.pin,
            polarity,
            backend: self.backend.name().to_string(),
            samples,
        };
        tracing::info!(consistent = report.levels_follow_writes(), "diagnostic finished");
        Ok(report)
    }

    /// Drive every device OFF and release the backend.
    ///
    /// Idempotent: returns `Ok(false)` when the backend was already released.
    ///
    /// # Errors
    ///
    /// Returns the first [`HardwareError`] reported while releasing. The store
    /// is `Released` either way.
    #[tracing::instrument(skip(self), fields(backend = self.backend.name()))]
    pub async fn shutdown(&self) -> Result<bool, HardwareError> {
        let mut inner = self.inner.lock().await;
        if inner.lifecycle == Lifecycle::Released {
            return Ok(false);
        }

        let plan = self.off_plan(&inner.policy);
        let result = self.backend.shutdown(&plan).await;
        inner.lifecycle = Lifecycle::Released;
        for state in inner.states.values_mut() {
            *state = false;
        }
        self.publisher
            .publish(DeviceEvent::new(EventKind::BackendReleased))
            .await;

        match result {
            Ok(()) => {
                tracing::info!("all outputs driven off and released");
                Ok(true)
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to release every output");
                Err(err)
            }
        }
    }

    async fn ready(&self) -> Result<MutexGuard<'_, Inner>, UnavailableError> {
        let inner = self.inner.lock().await;
        inner.lifecycle.ensure_ready()?;
        Ok(inner)
    }

    fn device(&self, id: &DeviceId) -> Result<&Device, ResolutionError> {
        self.registry.lookup(id).ok_or_else(|| ResolutionError {
            input: id.to_string(),
            valid: self.registry.ids(),
        })
    }

    fn polarity_locked(&self, inner: &Inner, device: &Device) -> Polarity {
        inner.policy.polarity(&device.id).unwrap_or(device.polarity)
    }

    fn off_plan(&self, policy: &PolarityPolicy) -> Vec<OutputPlan> {
        self.registry
            .devices()
            .map(|device| OutputPlan {
                pin: device.pin,
                level: policy
                    .logical_to_level(&device.id, false)
                    .unwrap_or_else(|| device.polarity.level_for(false)),
            })
            .collect()
    }

    async fn apply_locked(
        &self,
        inner: &mut Inner,
        device: &Device,
        on: bool,
    ) -> Result<SwitchState, HardwareError> {
        let polarity = self.polarity_locked(inner, device);
        let level = polarity.level_for(on);

        if let Err(err) = self.backend.set_level(device.pin, level).await {
            tracing::warn!(pin = %device.pin, %level, error = %err, "failed to drive pin");
            return Err(err);
        }
        tracing::debug!(pin = %device.pin, %level, %polarity, on, "pin driven");

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        match self.backend.read_level(device.pin).await {
            Ok(Some(observed)) => {
                tracing::debug!(pin = %device.pin, %observed, matches = observed == level, "readback");
            }
            Ok(None) => {}
            Err(err) => tracing::debug!(pin = %device.pin, error = %err, "readback failed"),
        }

        let previous = inner.states.insert(device.id.clone(), on).unwrap_or(false);
        if previous != on {
            self.publisher
                .publish(DeviceEvent::new(EventKind::StateChanged {
                    device_id: device.id.clone(),
                    from: previous.into(),
                    to: on.into(),
                }))
                .await;
        }
        Ok(SwitchState::from(on))
    }

    async fn observed_locked(&self, inner: &Inner, device: &Device) -> bool {
        let stored = inner.states.get(&device.id).copied().unwrap_or(false);
        match self.backend.read_level(device.pin).await {
            Ok(Some(level)) => self.polarity_locked(inner, device).is_on_at(level),
            Ok(None) => stored,
            Err(err) => {
                tracing::debug!(pin = %device.pin, error = %err, "readback failed, using stored state");
                stored
            }
        }
    }

    async fn repolarize_locked(
        &self,
        inner: &mut Inner,
        device: &Device,
        polarity: Polarity,
    ) -> Result<DeviceStatus, HardwareError> {
        let on = inner.states.get(&device.id).copied().unwrap_or(false);
        let previous = inner
            .policy
            .set_polarity(&device.id, polarity)
            .unwrap_or(device.polarity);

        let level = polarity.level_for(on);
        if let Err(err) = self.backend.set_level(device.pin, level).await {
            inner.policy.set_polarity(&device.id, previous);
            tracing::warn!(pin = %device.pin, %level, error = %err, "failed to re-drive pin, polarity kept");
            return Err(err);
        }
        self.backend.update_off_level(OutputPlan {
            pin: device.pin,
            level: polarity.level_for(false),
        });
        tracing::info!(pin = %device.pin, %previous, %polarity, %level, "polarity changed");

        if previous != polarity {
            self.publisher
                .publish(DeviceEvent::new(EventKind::PolarityChanged {
                    device_id: device.id.clone(),
                    polarity,
                }))
                .await;
        }
        Ok(DeviceStatus {
            id: device.id.clone(),
            pin: device.pin,
            polarity,
            state: SwitchState::from(on),
        })
    }

    async fn sample(
        &self,
        device: &Device,
        polarity: Polarity,
        cycles: u32,
        delay: Duration,
    ) -> Result<Vec<DiagnosticSample>, GreenhouseError> {
        let steps = [
            (DiagnosticStep::DirectHigh, Level::High),
            (DiagnosticStep::DirectLow, Level::Low),
            (DiagnosticStep::LogicalOn, polarity.level_for(true)),
            (DiagnosticStep::LogicalOff, polarity.level_for(false)),
        ];
        let mut samples = Vec::with_capacity(steps.len() * cycles as usize);
        for cycle in 1..=cycles {
            for (step, driven) in steps {
                {
                    let _inner = self.ready().await?;
                    self.backend.set_level(device.pin, driven).await?;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let readback = {
                    let _inner = self.ready().await?;
                    self.backend.read_level(device.pin).await
                };
                let observed = match readback {
                    Ok(level) => level,
                    Err(err) => {
                        tracing::debug!(pin = %device.pin, error = %err, "diagnostic readback failed");
                        None
                    }
                };
                tracing::debug!(cycle, ?step, %driven, ?observed, "diagnostic step");
                samples.push(DiagnosticSample {
                    cycle,
                    step,
                    driven,
                    observed,
                });
            }
        }
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeBackend, RecordingPublisher};
    use greenhouse_domain::control::Outcome;
    use greenhouse_domain::device::Pin;

    type Store = StateStore<Arc<FakeBackend>, Arc<RecordingPublisher>>;

    fn build(backend: FakeBackend) -> (Store, Arc<FakeBackend>, Arc<RecordingPublisher>) {
        let registry = Arc::new(DeviceRegistry::greenhouse_default().unwrap());
        let backend = Arc::new(backend);
        let publisher = Arc::new(RecordingPublisher::default());
        let store = StateStore::new(registry, Arc::clone(&backend), Arc::clone(&publisher))
            .with_settle_time(Duration::ZERO);
        (store, backend, publisher)
    }

    async fn ready(backend: FakeBackend) -> (Store, Arc<FakeBackend>, Arc<RecordingPublisher>) {
        let (store, backend, publisher) = build(backend);
        store.initialize().await.unwrap();
        (store, backend, publisher)
    }

    fn id(name: &str) -> DeviceId {
        DeviceId::new(name)
    }

    #[tokio::test]
    async fn should_drive_all_pins_off_when_initialized() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        assert_eq!(store.lifecycle().await, Lifecycle::Ready);
        // Active-low relays are OFF at HIGH.
        for pin in [5, 6, 13, 19] {
            assert_eq!(backend.level(pin), Some(Level::High));
        }
        let states = store.get_all_states().await.unwrap();
        assert!(states.iter().all(|(_, on)| !on));
    }

    #[tokio::test]
    async fn should_report_unavailable_when_not_initialized() {
        let (store, backend, _) = build(FakeBackend::default());
        let err = store.set_device(&id("pump"), true).await.unwrap_err();
        assert!(matches!(
            err,
            GreenhouseError::Unavailable(UnavailableError::NotInitialized)
        ));
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn should_fault_when_backend_initialization_fails() {
        let (store, _, _) = build(FakeBackend {
            fail_initialize: true,
            ..FakeBackend::default()
        });
        assert!(store.initialize().await.is_err());
        assert!(matches!(store.lifecycle().await, Lifecycle::Faulted(_)));
        assert!(matches!(
            store.availability().await,
            Err(UnavailableError::Faulted(_))
        ));
        assert!(store.get_all_states().await.is_err());
    }

    #[tokio::test]
    async fn should_drive_low_and_report_on_when_active_low_device_is_set() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        let pump = id("pump");

        let state = store.set_device(&pump, true).await.unwrap();
        assert_eq!(state, SwitchState::On);
        assert_eq!(backend.level(13), Some(Level::Low));
        assert!(store.get_state(&pump).await.unwrap());

        store.set_device(&pump, false).await.unwrap();
        assert_eq!(backend.level(13), Some(Level::High));
        assert!(!store.get_state(&pump).await.unwrap());
    }

    #[tokio::test]
    async fn should_read_state_from_hardware_when_readback_supported() {
        let (store, backend, _) = ready(FakeBackend::with_readback()).await;
        let fan = id("fan1");
        // Someone flips the pin behind our back.
        backend.levels.lock().unwrap().insert(Pin::new(5), Level::Low);
        assert!(store.get_state(&fan).await.unwrap());
    }

    #[tokio::test]
    async fn should_keep_state_when_write_fails() {
        let (store, backend, publisher) = ready(FakeBackend::default()).await;
        backend.fail_pin(19);
        let light = id("light");

        let err = store.set_device(&light, true).await.unwrap_err();
        assert!(matches!(err, GreenhouseError::Hardware(_)));
        assert!(!store.get_state(&light).await.unwrap());
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn should_restore_state_when_toggled_twice() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        let fan = id("fan2");

        assert_eq!(store.toggle_device(&fan).await.unwrap(), SwitchState::On);
        assert_eq!(store.toggle_device(&fan).await.unwrap(), SwitchState::Off);
        assert!(!store.get_state(&fan).await.unwrap());
    }

    #[tokio::test]
    async fn should_turn_every_device_on() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        let results = store.turn_all_on().await.unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(ControlResult::is_ok));
        let states = store.get_all_states().await.unwrap();
        assert!(states.iter().all(|(_, on)| *on));
    }

    #[tokio::test]
    async fn should_continue_bulk_operation_when_one_device_fails() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        backend.fail_pin(6);

        let results = store.turn_all_on().await.unwrap();
        let outcomes: Vec<_> = results.iter().map(|r| (r.device_id.as_str(), r.outcome)).collect();
        assert_eq!(
            outcomes,
            vec![
                ("fan1", Outcome::Ok),
                ("fan2", Outcome::Failed),
                ("pump", Outcome::Ok),
                ("light", Outcome::Ok),
            ]
        );
        assert!(!store.get_state(&id("fan2")).await.unwrap());
        assert!(store.get_state(&id("light")).await.unwrap());
    }

    #[tokio::test]
    async fn should_snapshot_in_registry_order() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        store.set_device(&id("pump"), true).await.unwrap();
        let states = store.get_all_states().await.unwrap();
        let names: Vec<_> = states.iter().map(|(id, on)| (id.as_str(), *on)).collect();
        assert_eq!(
            names,
            vec![("fan1", false), ("fan2", false), ("pump", true), ("light", false)]
        );
    }

    #[tokio::test]
    async fn should_keep_device_on_and_invert_level_when_polarity_flipped() {
        let (store, backend, publisher) = ready(FakeBackend::with_readback()).await;
        let pump = id("pump");
        store.set_device(&pump, true).await.unwrap();
        assert_eq!(backend.level(13), Some(Level::Low));

        let status = store.set_polarity(&pump, false).await.unwrap();
        assert_eq!(status.polarity, Polarity::ActiveHigh);
        assert_eq!(status.state, SwitchState::On);
        assert_eq!(backend.level(13), Some(Level::High));
        assert!(store.get_state(&pump).await.unwrap());
        assert!(publisher.events().iter().any(|e| matches!(
            e.kind,
            EventKind::PolarityChanged { polarity: Polarity::ActiveHigh, .. }
        )));
    }

    #[tokio::test]
    async fn should_revert_polarity_when_redrive_fails() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        let light = id("light");
        backend.fail_pin(19);

        assert!(store.toggle_polarity(&light).await.is_err());
        assert_eq!(store.polarity(&light).await, Some(Polarity::ActiveLow));
    }

    #[tokio::test]
    async fn should_flip_polarity_when_toggled() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        let fan = id("fan1");
        let status = store.toggle_polarity(&fan).await.unwrap();
        assert_eq!(status.polarity, Polarity::ActiveHigh);
        let status = store.toggle_polarity(&fan).await.unwrap();
        assert_eq!(status.polarity, Polarity::ActiveLow);
    }

    #[tokio::test]
    async fn should_report_resolution_error_when_device_unknown() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        let err = store.set_device(&id("heater"), true).await.unwrap_err();
        let GreenhouseError::Resolution(err) = err else {
            panic!("expected resolution error");
        };
        assert_eq!(err.valid.len(), 4);
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn should_publish_state_change_only_when_state_differs() {
        let (store, _, publisher) = ready(FakeBackend::default()).await;
        let pump = id("pump");
        store.set_device(&pump, true).await.unwrap();
        store.set_device(&pump, true).await.unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].kind,
            EventKind::StateChanged {
                device_id: pump,
                from: SwitchState::Off,
                to: SwitchState::On,
            }
        );
    }

    #[tokio::test]
    async fn should_include_polarity_and_pin_in_status() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        store.set_device(&id("light"), true).await.unwrap();
        let statuses = store.status().await.unwrap();
        let light = statuses.iter().find(|s| s.id.as_str() == "light").unwrap();
        assert_eq!(light.pin, Pin::new(19));
        assert_eq!(light.polarity, Polarity::ActiveLow);
        assert_eq!(light.state, SwitchState::On);
    }

    #[tokio::test]
    async fn should_cycle_levels_and_leave_device_off_when_diagnosed() {
        let (store, backend, _) = ready(FakeBackend::with_readback()).await;
        let fan = id("fan1");
        store.set_device(&fan, true).await.unwrap();

        let report = store.diagnose(&fan, 2, Duration::ZERO).await.unwrap();
        assert_eq!(report.samples.len(), 8);
        assert_eq!(report.backend, "fake");
        assert!(report.levels_follow_writes());
        let driven: Vec<_> = report.samples[..4].iter().map(|s| s.driven).collect();
        assert_eq!(driven, vec![Level::High, Level::Low, Level::Low, Level::High]);
        assert!(!store.get_state(&fan).await.unwrap());
        assert_eq!(backend.level(5), Some(Level::High));
    }

    #[tokio::test]
    async fn should_hand_new_off_level_to_backend_when_polarity_changes() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        store.set_polarity(&id("pump"), false).await.unwrap();
        assert_eq!(backend.off_level(13), Some(Level::Low));

        store.toggle_polarity(&id("pump")).await.unwrap();
        assert_eq!(backend.off_level(13), Some(Level::High));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn should_serialize_concurrent_toggles_on_same_device() {
        let (store, backend, _) = ready(FakeBackend::default()).await;
        let store = Arc::new(store);
        let toggle = || {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.toggle_device(&id("pump")).await })
        };

        let (first, second) = tokio::join!(toggle(), toggle());
        let mut states = vec![first.unwrap().unwrap(), second.unwrap().unwrap()];
        states.sort_by_key(|state| state.is_on());
        assert_eq!(states, vec![SwitchState::Off, SwitchState::On]);

        assert!(!store.get_state(&id("pump")).await.unwrap());
        assert_eq!(
            *backend.writes.lock().unwrap(),
            vec![(Pin::new(13), Level::Low), (Pin::new(13), Level::High)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn should_serve_other_requests_while_diagnose_waits() {
        let (store, _, _) = ready(FakeBackend::with_readback()).await;
        let store = Arc::new(store);
        let diagnosing = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.diagnose(&id("fan1"), 1, Duration::from_secs(1)).await }
        });
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        store.set_device(&id("pump"), true).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!diagnosing.is_finished());

        let report = diagnosing.await.unwrap().unwrap();
        assert_eq!(report.samples.len(), 4);
        assert!(store.get_state(&id("pump")).await.unwrap());
        assert!(!store.get_state(&id("fan1")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn should_stop_diagnose_when_store_shut_down() {
        let (store, backend, _) = ready(FakeBackend::with_readback()).await;
        let store = Arc::new(store);
        let diagnosing = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.diagnose(&id("fan1"), 3, Duration::from_secs(1)).await }
        });
        tokio::task::yield_now().await;

        assert!(store.shutdown().await.unwrap());
        let err = diagnosing.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            GreenhouseError::Unavailable(UnavailableError::Released)
        ));
        assert_eq!(backend.level(5), Some(Level::High));
    }

    #[tokio::test]
    async fn should_report_commanded_states_whatever_the_lifecycle() {
        let (store, _, _) = ready(FakeBackend::default()).await;
        store.set_device(&id("pump"), true).await.unwrap();
        let states = store.commanded_states().await;
        assert_eq!(states[2], (id("pump"), true));

        store.shutdown().await.unwrap();
        assert!(store.get_all_states().await.is_err());
        let states = store.commanded_states().await;
        assert_eq!(states.len(), 4);
        assert!(states.iter().all(|(_, on)| !on));
    }

    #[tokio::test]
    async fn should_release_once_when_shut_down_twice() {
        let (store, backend, publisher) = ready(FakeBackend::default()).await;
        store.turn_all_on().await.unwrap();

        assert!(store.shutdown().await.unwrap());
        assert!(!store.shutdown().await.unwrap());
        for pin in [5, 6, 13, 19] {
            assert_eq!(backend.level(pin), Some(Level::High));
        }
        let released = publisher
            .events()
            .iter()
            .filter(|e| e.kind == EventKind::BackendReleased)
            .count();
        assert_eq!(released, 1);
        assert!(matches!(
            store.set_device(&id("pump"), true).await,
            Err(GreenhouseError::Unavailable(UnavailableError::Released))
        ));
    }
}
