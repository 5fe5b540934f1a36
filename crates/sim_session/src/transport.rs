use tokio::sync::mpsc;
use tracing::debug;

use sim_feed::RawEvent;

/// Fixed message carried by the synthetic `error` event injected when the
/// underlying transport reports a connection-level failure.
pub const CONNECTION_LOST_MESSAGE: &str = "stream connection lost";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Owns at most one active push connection.
///
/// The push source writes through a [`FeedPublisher`]; the consumer pulls
/// from the handle one event at a time. Opening a new stream always
/// supersedes the previous one: the prior handle is closed first, which
/// invalidates its publisher.
#[derive(Debug, Default)]
pub struct FeedTransport {
    active: Option<StreamHandle>,
}

#[derive(Debug)]
struct StreamHandle {
    stream_id: String,
    rx: mpsc::Receiver<RawEvent>,
}

impl FeedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Establishes the push connection for `stream_id`, closing any prior
    /// handle first, and returns the producer-side publisher.
    pub fn open(&mut self, stream_id: impl Into<String>, capacity: usize) -> FeedPublisher {
        self.close();
        let stream_id = stream_id.into();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        debug!(%stream_id, "opening feed stream");
        self.active = Some(StreamHandle { stream_id, rx });
        FeedPublisher { tx }
    }

    /// Closes the active handle. Idempotent; safe when nothing is open.
    pub fn close(&mut self) {
        if let Some(handle) = self.active.take() {
            debug!(stream_id = %handle.stream_id, "closing feed stream");
        }
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.active.as_ref().map(|handle| handle.stream_id.as_str())
    }

    /// Pulls the next delivered event; `None` once the stream has ended or
    /// when no connection is open.
    pub async fn recv(&mut self) -> Option<RawEvent> {
        match self.active.as_mut() {
            Some(handle) => handle.rx.recv().await,
            None => None,
        }
    }
}

/// Producer side of an open feed stream.
///
/// Dropping the publisher ends the stream normally; [`FeedPublisher::fail`]
/// ends it with a synthetic `error` event, mirroring how a transport-level
/// failure is surfaced to the consumer.
#[derive(Debug, Clone)]
pub struct FeedPublisher {
    tx: mpsc::Sender<RawEvent>,
}

impl FeedPublisher {
    /// Delivers one event. Returns `false` when the handle was closed
    /// (superseded or torn down), in which case the event is discarded.
    pub async fn publish(&self, event: RawEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Reports a connection-level failure: injects the synthetic `error`
    /// event and ends the stream.
    pub async fn fail(self) {
        let _ = self
            .tx
            .send(RawEvent::text("error", CONNECTION_LOST_MESSAGE))
            .await;
    }

    /// True once the consumer side has been closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opening_supersedes_the_prior_connection() {
        let mut transport = FeedTransport::new();
        let first = transport.open("run-1", 8);
        assert!(transport.is_open());

        let second = transport.open("run-2", 8);
        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_eq!(transport.stream_id(), Some("run-2"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut transport = FeedTransport::new();
        let publisher = transport.open("run-1", 8);
        transport.close();
        transport.close();
        assert!(!transport.is_open());
        assert!(publisher.is_closed());
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn failure_injects_the_synthetic_error_event() {
        let mut transport = FeedTransport::new();
        let publisher = transport.open("run-1", 8);
        publisher.fail().await;

        let event = transport.recv().await.expect("synthetic event");
        assert_eq!(event.kind, "error");
        assert_eq!(
            event,
            RawEvent::text("error", CONNECTION_LOST_MESSAGE)
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_supersede_reports_closed() {
        let mut transport = FeedTransport::new();
        let stale = transport.open("run-1", 8);
        let _fresh = transport.open("run-2", 8);
        assert!(!stale.publish(RawEvent::text("log", "late")).await);
    }
}
