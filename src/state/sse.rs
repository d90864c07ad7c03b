use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Fan-out point for admin events; the store's own change stamps travel separately.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// `capacity` bounds how far a slow admin stream may lag before it skips events.
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::Sender::new(capacity),
        }
    }

    /// Receiver for events sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Publish `event`, returning how many admin streams will see it.
    ///
    /// Zero when nobody is listening; the event is simply dropped.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}
