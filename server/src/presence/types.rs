//! Connection handles.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::ws::ServerEvent;

/// Outbound side of one WebSocket connection.
///
/// Every event for a connection goes through its single queue, so delivery
/// order per connection is the order events were enqueued.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    user_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    #[must_use]
    pub fn new(user_id: Uuid, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id,
            tx,
        }
    }

    /// Unique id of this connection.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// User the connection was authenticated as.
    #[must_use]
    pub const fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Enqueue an event without waiting.
    ///
    /// Returns `false` if the event was dropped. Drops are logged and never
    /// retried.
    pub fn send(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(
                    user_id = %self.user_id,
                    connection_id = %self.id,
                    event = event.name(),
                    "Outbound queue full, dropping event"
                );
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    user_id = %self.user_id,
                    connection_id = %self.id,
                    event = event.name(),
                    "Connection closed, dropping event"
                );
                false
            }
        }
    }

    /// Whether the receiving side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reports_drops() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(Uuid::now_v7(), tx);

        assert!(handle.send(ServerEvent::Pong));
        // Queue depth is one
        assert!(!handle.send(ServerEvent::Pong));
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::Pong)));

        drop(rx);
        assert!(handle.is_closed());
        assert!(!handle.send(ServerEvent::Pong));
    }
}
