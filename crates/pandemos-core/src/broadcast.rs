//! Non-blocking fan-out of committed tick diffs.
//!
//! Built on `tokio::sync::broadcast`: the publisher never waits for
//! subscribers, and a subscriber that falls more than the channel
//! capacity behind observes a `Lagged` error, skips the missed diffs,
//! and resumes from the most recent ones. Slow consumers can never delay
//! a tick commit.

use tokio::sync::broadcast;

use pandemos_types::TickDiff;

/// Diffs buffered per subscriber before the oldest are dropped.
pub const BROADCAST_CAPACITY: usize = 64;

/// Shared handle for publishing tick diffs to all live subscribers.
#[derive(Debug, Clone)]
pub struct DiffBroadcaster {
    sender: broadcast::Sender<TickDiff>,
}

impl Default for DiffBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffBroadcaster {
    /// Create a broadcaster with the default capacity.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { sender }
    }

    /// Publish one committed diff; returns the number of subscribers that
    /// will observe it. Zero subscribers is not an error.
    pub fn publish(&self, diff: TickDiff) -> usize {
        self.sender.send(diff).unwrap_or(0)
    }

    /// Open a new subscription starting at the next published diff.
    pub fn subscribe(&self) -> broadcast::Receiver<TickDiff> {
        self.sender.subscribe()
    }

    /// Number of currently attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn diff(tick_id: u64) -> TickDiff {
        TickDiff {
            tick_id,
            entries: vec![],
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_diffs() {
        let broadcaster = DiffBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        assert_eq!(broadcaster.publish(diff(1)), 1);
        assert_eq!(rx.recv().await.unwrap().tick_id, 1);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let broadcaster = DiffBroadcaster::new();
        assert_eq!(broadcaster.publish(diff(1)), 0);
    }

    #[tokio::test]
    async fn lagged_subscriber_skips_to_recent_diffs() {
        let broadcaster = DiffBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        // Overflow the per-subscriber buffer without the receiver reading.
        for tick_id in 1..=100_u64 {
            let _ = broadcaster.publish(diff(tick_id));
        }

        // The first read reports the lag; the next read resumes at the
        // oldest retained diff rather than blocking on lost ones.
        let lagged = rx.recv().await;
        assert!(matches!(
            lagged,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_))
        ));
        let resumed = rx.recv().await.unwrap();
        assert!(resumed.tick_id > 1);
    }
}
