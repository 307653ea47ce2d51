//! Push-style job progress subscriptions.

use std::time::Duration;

use futures::Stream;
use relaycast_common::JobId;

use super::job::JobSnapshot;
use super::store::JobStore;

/// Serves job snapshots to any number of independent observers.
#[derive(Clone)]
pub struct ProgressChannel {
    store: JobStore,
    interval: Duration,
}

impl ProgressChannel {
    pub fn new(store: JobStore, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Snapshots of `id`, one per polling tick starting immediately.
    ///
    /// The stream ends right after the first terminal snapshot, or at once for
    /// an unknown job. Dropping the stream unsubscribes.
    pub fn subscribe(&self, id: JobId) -> impl Stream<Item = JobSnapshot> + Send + 'static {
        let store = self.store.clone();
        let period = self.interval;

        async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(snapshot) = store.snapshot(&id) else {
                    break;
                };
                if snapshot.is_terminal() {
                    store.mark_delivered(&id);
                    yield snapshot;
                    break;
                }
                yield snapshot;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::job::JobStatus;
    use futures::StreamExt;

    fn channel() -> (JobStore, ProgressChannel) {
        let store = JobStore::new(Duration::from_millis(200), Duration::from_secs(600));
        let channel = ProgressChannel::new(store.clone(), Duration::from_millis(10));
        (store, channel)
    }

    #[tokio::test]
    async fn unknown_job_yields_nothing() {
        let (_store, channel) = channel();
        let events: Vec<JobSnapshot> = channel.subscribe(JobId::new()).collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn first_snapshot_is_immediate() {
        let (store, _) = channel();
        let slow = ProgressChannel::new(store.clone(), Duration::from_secs(30));
        let id = store.create("song", "music");
        let mut stream = Box::pin(slow.subscribe(id));
        let first = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.status, JobStatus::Searching);
    }

    #[tokio::test]
    async fn ends_after_terminal_snapshot() {
        let (store, channel) = channel();
        let id = store.create("song", "music");
        store.update(&id, |j| j.advance(JobStatus::Preparing, 10.0));

        let updater = {
            let store = store.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                store.update(&id, |j| j.fail("Song not found"));
            })
        };

        let events: Vec<JobSnapshot> = channel.subscribe(id).collect().await;
        updater.await.unwrap();

        let last = events.last().unwrap();
        assert_eq!(last.status, JobStatus::Error);
        assert_eq!(last.message.as_deref(), Some("Song not found"));
        assert_eq!(events.iter().filter(|s| s.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn two_subscribers_see_the_same_terminal_snapshot() {
        let (store, channel) = channel();
        let id = store.create("song", "music");

        let a = tokio::spawn(channel.subscribe(id).collect::<Vec<_>>());
        let b = tokio::spawn(channel.subscribe(id).collect::<Vec<_>>());

        tokio::time::sleep(Duration::from_millis(30)).await;
        store.update(&id, |j| j.complete("Song", relaycast_common::ObjectId::parse("o1").unwrap()));

        let a = a.await.unwrap();
        let b = b.await.unwrap();
        assert_eq!(a.last(), b.last());
        assert_eq!(a.last().unwrap().status, JobStatus::Completed);

        // Record is gone once the grace period has passed.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(store.snapshot(&id).is_none());
    }
}
