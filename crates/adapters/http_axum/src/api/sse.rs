//! Server-Sent Events (SSE) stream of device events.

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

use greenhouse_app::ports::{EventPublisher, SignalBackend};

use crate::state::AppState;

enum Frame {
    Event(Event),
    Closing,
}

/// `GET /api/iot/events`: SSE stream of state and polarity changes.
///
/// Each event is sent as a JSON `data:` frame tagged with its `type`. The
/// stream continues until the client disconnects or the server starts
/// shutting down (see [`AppState::stream_closer`]).
pub async fn stream<B, P>(
    State(state): State<AppState<B, P>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>>
where
    B: SignalBackend + Send + Sync + 'static,
    P: EventPublisher + Send + Sync + 'static,
{
    let event_rx = state.event_bus.subscribe();
    let events = BroadcastStream::new(event_rx).filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(json) => Some(Frame::Event(Event::default().data(json))),
            Err(err) => {
                tracing::warn!(%err, "failed to serialize event for SSE stream");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "SSE subscriber lagged, some events were dropped");
            None
        }
    });
    let closing = WatchStream::new(state.closing())
        .filter(|closing| *closing)
        .map(|_| Frame::Closing);

    let stream = events.merge(closing).map_while(|frame| match frame {
        Frame::Event(event) => Some(Ok(event)),
        Frame::Closing => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
