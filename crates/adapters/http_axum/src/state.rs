//! Shared application state for axum handlers.

use std::sync::Arc;

use tokio::sync::watch;

use greenhouse_app::event_bus::InProcessEventBus;
use greenhouse_app::ports::{EventPublisher, SignalBackend};
use greenhouse_app::services::dispatcher::ControlDispatcher;
use greenhouse_app::services::state_store::StateStore;

/// Application state shared across all axum handlers.
///
/// Generic over the signal backend and event publisher to avoid dynamic
/// dispatch. `Clone` is implemented manually so the underlying types do not
/// need to be `Clone`; only the `Arc` wrappers are cloned.
pub struct AppState<B, P> {
    /// The authoritative device state.
    pub store: Arc<StateStore<B, P>>,
    /// Control request dispatcher, sharing `store`.
    pub dispatcher: Arc<ControlDispatcher<B, P>>,
    /// Event bus for the SSE stream.
    pub event_bus: Arc<InProcessEventBus>,
    closing: Arc<watch::Sender<bool>>,
}

impl<B, P> Clone for AppState<B, P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
            event_bus: Arc::clone(&self.event_bus),
            closing: Arc::clone(&self.closing),
        }
    }
}

impl<B, P> AppState<B, P> {
    /// Handle that ends every open event stream.
    ///
    /// SSE responses never finish on their own, so a graceful shutdown must
    /// close them or it waits forever.
    #[must_use]
    pub fn stream_closer(&self) -> StreamCloser {
        StreamCloser(Arc::clone(&self.closing))
    }

    /// Watch that flips to `true` once streams must end.
    pub(crate) fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

/// See [`AppState::stream_closer`].
#[derive(Clone)]
pub struct StreamCloser(Arc<watch::Sender<bool>>);

impl StreamCloser {
    /// End every open event stream; streams opened afterwards end at once.
    pub fn close(&self) {
        self.0.send_replace(true);
        tracing::debug!("event streams closed");
    }
}

impl<B, P> AppState<B, P>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    /// Create the state from a shared store; the dispatcher is built on top of it.
    pub fn new(store: Arc<StateStore<B, P>>, event_bus: Arc<InProcessEventBus>) -> Self {
        let (closing, _) = watch::channel(false);
        Self {
            dispatcher: Arc::new(ControlDispatcher::new(Arc::clone(&store))),
            store,
            event_bus,
            closing: Arc::new(closing),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use greenhouse_adapter_virtual::VirtualGpio;
    use greenhouse_app::event_bus::InProcessEventBus;
    use greenhouse_app::services::state_store::StateStore;
    use greenhouse_domain::registry::DeviceRegistry;

    use super::AppState;

    pub type TestState = AppState<Arc<VirtualGpio>, Arc<InProcessEventBus>>;

    /// State over the default catalogue, not yet initialized.
    pub fn uninitialized(gpio: Arc<VirtualGpio>) -> TestState {
        let registry = Arc::new(DeviceRegistry::greenhouse_default().unwrap());
        let bus = Arc::new(InProcessEventBus::new(16));
        let store = StateStore::new(registry, gpio, Arc::clone(&bus))
            .with_settle_time(Duration::ZERO);
        AppState::new(Arc::new(store), bus)
    }

    /// State over the default catalogue with every output driven OFF.
    pub async fn ready(gpio: Arc<VirtualGpio>) -> TestState {
        let state = uninitialized(gpio);
        state.store.initialize().await.unwrap();
        state
    }

    pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
