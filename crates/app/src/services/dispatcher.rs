//! Control dispatcher: turns any accepted request body into per-device results.

use std::sync::Arc;

use serde_json::Value;

use greenhouse_domain::control::{ControlAction, ControlIntent, ControlRequest, ControlResult};
use greenhouse_domain::error::GreenhouseError;
use greenhouse_domain::id::DeviceId;

use crate::ports::{EventPublisher, SignalBackend};
use crate::services::state_store::StateStore;

/// Everything a caller needs to render a control response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Caller-supplied controller label, echoed back untouched.
    pub label: Option<String>,
    pub results: Vec<ControlResult>,
    /// Fresh snapshot taken after every action ran, in registry order.
    pub current_states: Vec<(DeviceId, bool)>,
}

/// Validates control requests and executes them against a [`StateStore`].
pub struct ControlDispatcher<B, P> {
    store: Arc<StateStore<B, P>>,
}

impl<B, P> ControlDispatcher<B, P>
where
    B: SignalBackend + Send + Sync,
    P: EventPublisher + Send + Sync,
{
    pub fn new(store: Arc<StateStore<B, P>>) -> Self {
        Self { store }
    }

    /// Parse `body`, run every action it describes and report the outcome.
    ///
    /// Unknown devices, malformed batch entries and hardware failures become
    /// `FAILED` results; only request-level problems are errors.
    ///
    /// # Errors
    ///
    /// - [`GreenhouseError::Unavailable`] when the store is not `Ready`
    /// - [`GreenhouseError::Validation`] when `body` matches no accepted shape,
    ///   or a single-device request lacks a usable action
    #[tracing::instrument(skip_all)]
    pub async fn dispatch(&self, body: &Value) -> Result<DispatchOutcome, GreenhouseError> {
        self.store.availability().await?;
        let request = ControlRequest::parse(body)?;
        let label = request.label().map(ToString::to_string);

        let results = match request {
            ControlRequest::Bulk(bulk) => self.store.turn_all(bulk.desired_on()).await?,
            ControlRequest::Batch(entries) => {
                let mut results = Vec::with_capacity(entries.len());
                for entry in entries {
                    let result = match entry {
                        Ok(action) => self.execute(&action).await,
                        Err(rejected) => ControlResult::failed(
                            rejected.device_ref.unwrap_or_default(),
                            None,
                            rejected.reason,
                        ),
                    };
                    results.push(result);
                }
                results
            }
            ControlRequest::Single(action) | ControlRequest::Component { action, .. } => {
                vec![self.execute(&action).await]
            }
        };

        let failed = results.iter().filter(|r| !r.is_ok()).count();
        tracing::info!(actions = results.len(), failed, "control request dispatched");

        let current_states = self.snapshot().await;
        Ok(DispatchOutcome {
            label,
            results,
            current_states,
        })
    }

    /// Observed states, or the commanded ones when the store stopped being
    /// `Ready` while the actions ran, so applied results are never lost.
    async fn snapshot(&self) -> Vec<(DeviceId, bool)> {
        match self.store.get_all_states().await {
            Ok(states) => states,
            Err(err) => {
                tracing::warn!(error = %err, "store became unavailable during dispatch, reporting commanded states");
                self.store.commanded_states().await
            }
        }
    }

    async fn execute(&self, action: &ControlAction) -> ControlResult {
        let resolved = self
            .store
            .registry()
            .resolver()
            .resolve_or_err(&action.device_ref);
        let id = match resolved {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(device_ref = %action.device_ref, "unknown device");
                return ControlResult::failed(action.device_ref.as_str(), Some(action.intent), err);
            }
        };

        let applied = match action.intent {
            ControlIntent::On => self.store.set_device(&id, true).await,
            ControlIntent::Off => self.store.set_device(&id, false).await,
            ControlIntent::Toggle => self.store.toggle_device(&id).await,
        };
        match applied {
            Ok(state) => ControlResult::ok(id.as_str(), action.intent, state),
            Err(err) => ControlResult::failed(id.as_str(), Some(action.intent), err),
        }
    }
}
