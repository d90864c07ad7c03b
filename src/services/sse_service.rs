use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::sse::ServerEvent,
    services::sse_events::state_updated_event,
    state::SharedState,
};

/// Subscribe to admin events and store change stamps.
pub fn subscribe_admin(
    state: &SharedState,
) -> (broadcast::Receiver<ServerEvent>, watch::Receiver<i64>) {
    (state.events().subscribe(), state.store().subscribe())
}

/// Convert the admin subscriptions into an SSE response, forwarding events
/// until the client disconnects.
pub fn to_sse_stream(
    mut events: broadcast::Receiver<ServerEvent>,
    mut updates: watch::Receiver<i64>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // Store stamps and hub events are merged into one ordered channel.
    tokio::spawn(async move {
        loop {
            let payload = tokio::select! {
                _ = tx.closed() => break,
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let stamp = *updates.borrow_and_update();
                    match state_updated_event(stamp) {
                        Some(payload) => payload,
                        None => continue,
                    }
                }
                recv_result = events.recv() => {
                    match recv_result {
                        Ok(payload) => payload,
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::debug!(skipped, "admin stream lagging, events dropped");
                            continue;
                        }
                    }
                }
            };

            let mut event = Event::default().data(payload.data);
            if let Some(name) = payload.event {
                event = event.event(name);
            }
            if tx.send(Ok(event)).await.is_err() {
                break;
            }
        }
        tracing::info!("admin stream closed");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
