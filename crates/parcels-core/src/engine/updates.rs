//! Update stream
//!
//! Hand-off from the engine to the notification consumer. The channel is
//! bounded and publishing waits for capacity: a slow consumer slows the
//! engine down instead of losing updates.

use std::pin::Pin;

use tokio::sync::mpsc;
pub use tokio::sync::mpsc::error::TryRecvError;
use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::model::TrackingUpdate;

/// Publishing half, owned by the engine
#[derive(Debug, Clone)]
pub(crate) struct UpdatePublisher {
    tx: mpsc::Sender<TrackingUpdate>,
}

impl UpdatePublisher {
    /// Hand an update to the consumer, waiting while the stream is full
    ///
    /// Returns `false` when the consumer has gone away.
    pub(crate) async fn publish(&self, update: TrackingUpdate) -> bool {
        let user_id = update.user_id;
        let tracking_number = update.tracking_number.clone();

        if self.tx.send(update).await.is_err() {
            warn!(
                user_id,
                tracking_number = %tracking_number,
                "Update stream has no consumer, update dropped"
            );
            return false;
        }
        true
    }
}

/// Receiving half of the update stream
///
/// There is exactly one consumer. It is responsible for resolving a
/// delivery address for `user_id` and rendering the update.
#[derive(Debug)]
pub struct UpdateStream {
    rx: mpsc::Receiver<TrackingUpdate>,
}

impl UpdateStream {
    /// Receive the next update
    ///
    /// Returns `None` once the engine is dropped and the stream is drained.
    pub async fn recv(&mut self) -> Option<TrackingUpdate> {
        self.rx.recv().await
    }

    /// Receive an update if one is ready
    ///
    /// `Err(TryRecvError::Empty)` means nothing is queued right now;
    /// `Err(TryRecvError::Disconnected)` means the engine is gone and the
    /// stream is drained.
    pub fn try_recv(&mut self) -> Result<TrackingUpdate, TryRecvError> {
        self.rx.try_recv()
    }

    /// Convert into a `Stream` of updates
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = TrackingUpdate> + Send + 'static>> {
        Box::pin(ReceiverStream::new(self.rx))
    }
}

/// Create a bounded update stream
pub(crate) fn channel(capacity: usize) -> (UpdatePublisher, UpdateStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (UpdatePublisher { tx }, UpdateStream { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn update(n: usize) -> TrackingUpdate {
        TrackingUpdate {
            tracking_number: format!("TRACK{n}"),
            user_id: 42,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publish_waits_for_the_consumer_when_full() {
        let (publisher, mut stream) = channel(1);

        assert!(publisher.publish(update(1)).await);

        let blocked = tokio::time::timeout(Duration::from_millis(50), publisher.publish(update(2))).await;
        assert!(blocked.is_err(), "second publish must wait for capacity");

        assert_eq!(stream.recv().await.unwrap().tracking_number, "TRACK1");
        assert!(publisher.publish(update(3)).await);
        assert_eq!(stream.recv().await.unwrap().tracking_number, "TRACK3");
    }

    #[tokio::test]
    async fn waiting_publish_completes_once_the_consumer_reads() {
        let (publisher, mut stream) = channel(1);
        assert!(publisher.publish(update(1)).await);

        let mut pending = tokio_test::task::spawn(publisher.publish(update(2)));
        tokio_test::assert_pending!(pending.poll());

        assert_eq!(stream.recv().await.unwrap().tracking_number, "TRACK1");
        assert!(pending.is_woken());
        assert!(tokio_test::assert_ready!(pending.poll()));
        assert_eq!(stream.recv().await.unwrap().tracking_number, "TRACK2");
    }

    #[tokio::test]
    async fn publish_reports_a_missing_consumer() {
        let (publisher, stream) = channel(1);
        drop(stream);
        assert!(!publisher.publish(update(1)).await);
    }

    #[tokio::test]
    async fn try_recv_tells_empty_from_disconnected() {
        let (publisher, mut stream) = channel(2);
        assert_eq!(stream.try_recv().unwrap_err(), TryRecvError::Empty);

        publisher.publish(update(1)).await;
        drop(publisher);

        assert_eq!(stream.try_recv().unwrap().tracking_number, "TRACK1");
        assert_eq!(stream.try_recv().unwrap_err(), TryRecvError::Disconnected);
    }

    #[tokio::test]
    async fn stream_adapter_yields_updates_in_order() {
        let (publisher, stream) = channel(4);
        for n in 0..3 {
            publisher.publish(update(n)).await;
        }
        drop(publisher);

        let numbers: Vec<_> = stream
            .into_stream()
            .map(|u| u.tracking_number)
            .collect()
            .await;
        assert_eq!(numbers, vec!["TRACK0", "TRACK1", "TRACK2"]);
    }
}
