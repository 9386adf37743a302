//! Webhook consistency reconciliation.
//!
//! A change notification can arrive before the content API serves the new
//! state. The [`Reconciler`] re-reads the item until it reflects the change,
//! the item disappears, or it runs out of attempts.

use std::time::Duration;

use async_trait::async_trait;
use cms_graphql::RetryPolicy;
use tracing::{debug, warn};

use crate::config::ReconcileConfig;
use crate::document::RemoteDocument;
use crate::error::HygraphResult;
use crate::notification::NotificationOperation;

/// Result of reconciling one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The fetched item reflects the change.
    Fresh(RemoteDocument),
    /// Attempts ran out; the last fetched item.
    Exhausted(RemoteDocument),
    /// The item could not be read.
    Absent,
}

impl ReconcileOutcome {
    /// The item to write back, if any.
    pub fn into_item(self) -> Option<RemoteDocument> {
        match self {
            Self::Fresh(item) | Self::Exhausted(item) => Some(item),
            Self::Absent => None,
        }
    }
}

/// Reads a single item by typename and id.
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Fetch the current draft of an item. `Ok(None)` when it does not exist.
    async fn fetch_item(&self, typename: &str, id: &str) -> HygraphResult<Option<RemoteDocument>>;
}

/// Waits between attempts.
#[async_trait]
pub trait Delay: Send + Sync {
    /// Suspend for `duration`.
    async fn wait(&self, duration: Duration);
}

/// [`Delay`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Whether `fetched` reflects `operation`.
///
/// `cached` is the copy held before the notification; only updates look at it.
pub fn is_fresh(
    operation: NotificationOperation,
    fetched: &RemoteDocument,
    cached: Option<&RemoteDocument>,
) -> bool {
    match operation {
        NotificationOperation::Create => true,
        NotificationOperation::Update => match cached.map(|item| item.updated_at) {
            None | Some(None) => true,
            Some(Some(cached_at)) => fetched.updated_at.is_some_and(|at| cached_at < at),
        },
        NotificationOperation::Publish => match (fetched.published_record(), fetched.updated_at)
        {
            (Some(record), Some(updated_at)) => record.updated_at == Some(updated_at),
            _ => false,
        },
        NotificationOperation::Unpublish => fetched.published_record().is_none(),
        NotificationOperation::Delete => false,
    }
}

/// Bounded re-read loop.
#[derive(Debug, Clone)]
pub struct Reconciler<D = TokioDelay> {
    policy: RetryPolicy,
    delay: D,
}

impl Reconciler<TokioDelay> {
    /// Reconciler using the tokio timer.
    pub const fn new(config: &ReconcileConfig) -> Self {
        Self {
            policy: RetryPolicy::fixed(config.max_attempts, config.delay()),
            delay: TokioDelay,
        }
    }
}

impl<D: Delay> Reconciler<D> {
    /// Replace the delay implementation.
    pub fn with_delay<E: Delay>(self, delay: E) -> Reconciler<E> {
        Reconciler {
            policy: self.policy,
            delay,
        }
    }

    /// Maximum reads per notification.
    pub const fn max_attempts(&self) -> usize {
        self.policy.max_attempts
    }

    /// Re-read `typename`/`id` until it reflects `operation`.
    pub async fn reconcile<F>(
        &self,
        fetcher: &F,
        typename: &str,
        id: &str,
        operation: NotificationOperation,
        cached: Option<&RemoteDocument>,
    ) -> ReconcileOutcome
    where
        F: ItemFetcher + ?Sized,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = None;

        for attempt in 1..=attempts {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                self.delay.wait(delay).await;
            }

            let fetched = match fetcher.fetch_item(typename, id).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    debug!(typename, id, %operation, attempt, "item not found");
                    return ReconcileOutcome::Absent;
                }
                Err(err) => {
                    warn!(typename, id, %operation, attempt, error = %err, "item read failed");
                    return ReconcileOutcome::Absent;
                }
            };

            if is_fresh(operation, &fetched, cached) {
                debug!(typename, id, %operation, attempt, "item is fresh");
                return ReconcileOutcome::Fresh(fetched);
            }
            debug!(typename, id, %operation, attempt, "item is stale");
            last = Some(fetched);
        }

        match last {
            Some(item) => {
                warn!(
                    typename,
                    id,
                    %operation,
                    attempts,
                    "content API did not reflect change; keeping last read"
                );
                ReconcileOutcome::Exhausted(item)
            }
            None => ReconcileOutcome::Absent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HygraphError;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_subscriber::fmt::MakeWriter;

    fn doc(updated_at: &str, published_at: Option<&str>) -> RemoteDocument {
        let stages = published_at.map_or_else(
            || serde_json::json!([]),
            |at| serde_json::json!([{ "stage": "PUBLISHED", "updatedAt": at }]),
        );
        serde_json::from_value(serde_json::json!({
            "__typename": "Post",
            "id": "p1",
            "updatedAt": updated_at,
            "documentInStages": stages
        }))
        .unwrap()
    }

    enum Step {
        Item(RemoteDocument),
        Missing,
        Fail,
    }

    /// Replays a script; the last step repeats.
    struct ScriptedFetcher {
        steps: Vec<Step>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ItemFetcher for ScriptedFetcher {
        async fn fetch_item(
            &self,
            _typename: &str,
            _id: &str,
        ) -> HygraphResult<Option<RemoteDocument>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.steps[call.min(self.steps.len() - 1)] {
                Step::Item(item) => Ok(Some(item.clone())),
                Step::Missing => Ok(None),
                Step::Fail => Err(HygraphError::Config("boom".into())),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingDelay(Arc<Mutex<Vec<Duration>>>);

    #[async_trait]
    impl Delay for RecordingDelay {
        async fn wait(&self, duration: Duration) {
            self.0.lock().push(duration);
        }
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    impl Capture {
        fn warnings(&self) -> usize {
            String::from_utf8_lossy(&self.0.lock())
                .lines()
                .filter(|line| line.contains("WARN"))
                .count()
        }
    }

    fn reconciler(delay: RecordingDelay) -> Reconciler<RecordingDelay> {
        Reconciler::new(&ReconcileConfig::default()).with_delay(delay)
    }

    #[test]
    fn freshness_rules() {
        let older = doc("2024-05-01T10:00:00Z", None);
        let newer = doc("2024-05-01T10:05:00Z", None);
        let untimed: RemoteDocument = serde_json::from_value(
            serde_json::json!({ "__typename": "Post", "id": "p1" }),
        )
        .unwrap();

        assert!(is_fresh(NotificationOperation::Create, &older, Some(&newer)));

        assert!(is_fresh(NotificationOperation::Update, &older, None));
        assert!(is_fresh(NotificationOperation::Update, &older, Some(&untimed)));
        assert!(is_fresh(NotificationOperation::Update, &newer, Some(&older)));
        assert!(!is_fresh(NotificationOperation::Update, &older, Some(&older)));
        assert!(!is_fresh(NotificationOperation::Update, &older, Some(&newer)));

        let in_sync = doc("2024-05-01T10:05:00Z", Some("2024-05-01T10:05:00Z"));
        let lagging = doc("2024-05-01T10:05:00Z", Some("2024-05-01T10:00:00Z"));
        assert!(is_fresh(NotificationOperation::Publish, &in_sync, None));
        assert!(!is_fresh(NotificationOperation::Publish, &lagging, None));
        assert!(!is_fresh(NotificationOperation::Publish, &newer, None));

        assert!(is_fresh(NotificationOperation::Unpublish, &newer, None));
        assert!(!is_fresh(NotificationOperation::Unpublish, &in_sync, None));

        assert!(!is_fresh(NotificationOperation::Delete, &newer, None));
    }

    #[tokio::test]
    async fn update_becomes_fresh_after_retries() {
        let cached = doc("2024-05-01T10:00:00Z", None);
        let fresh = doc("2024-05-01T10:05:00Z", None);
        let fetcher = ScriptedFetcher::new(vec![
            Step::Item(cached.clone()),
            Step::Item(cached.clone()),
            Step::Item(fresh.clone()),
        ]);
        let delay = RecordingDelay::default();

        let outcome = reconciler(delay.clone())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Update, Some(&cached))
            .await;

        assert_eq!(outcome, ReconcileOutcome::Fresh(fresh));
        assert_eq!(fetcher.calls(), 3);
        assert_eq!(*delay.0.lock(), vec![Duration::from_millis(500); 2]);
    }

    #[tokio::test]
    async fn first_fresh_read_does_not_wait() {
        let item = doc("2024-05-01T10:00:00Z", None);
        let fetcher = ScriptedFetcher::new(vec![Step::Item(item.clone())]);
        let delay = RecordingDelay::default();

        let outcome = reconciler(delay.clone())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Create, None)
            .await;

        assert_eq!(outcome, ReconcileOutcome::Fresh(item));
        assert!(delay.0.lock().is_empty());
    }

    #[tokio::test]
    async fn exhaustion_returns_last_read_and_warns_once() {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let lagging = doc("2024-05-01T10:05:00Z", Some("2024-05-01T10:00:00Z"));
        let fetcher = ScriptedFetcher::new(vec![Step::Item(lagging.clone())]);
        let delay = RecordingDelay::default();

        let outcome = reconciler(delay.clone())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Publish, None)
            .await;

        assert_eq!(outcome, ReconcileOutcome::Exhausted(lagging));
        assert_eq!(fetcher.calls(), 10);
        assert_eq!(delay.0.lock().len(), 9);
        assert_eq!(capture.warnings(), 1);
    }

    #[tokio::test]
    async fn missing_item_stops_immediately() {
        let fetcher = ScriptedFetcher::new(vec![Step::Missing]);
        let delay = RecordingDelay::default();

        let outcome = reconciler(delay.clone())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Update, None)
            .await;

        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(fetcher.calls(), 1);
        assert!(delay.0.lock().is_empty());
    }

    #[tokio::test]
    async fn read_failure_counts_as_absent() {
        let fetcher = ScriptedFetcher::new(vec![Step::Fail]);

        let outcome = reconciler(RecordingDelay::default())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Create, None)
            .await;

        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(fetcher.calls(), 1);
        assert!(outcome.into_item().is_none());
    }

    #[tokio::test]
    async fn delete_waits_until_item_disappears() {
        let item = doc("2024-05-01T10:00:00Z", None);
        let fetcher = ScriptedFetcher::new(vec![Step::Item(item.clone()), Step::Missing]);

        let outcome = reconciler(RecordingDelay::default())
            .reconcile(&fetcher, "Post", "p1", NotificationOperation::Delete, None)
            .await;

        assert_eq!(outcome, ReconcileOutcome::Absent);
        assert_eq!(fetcher.calls(), 2);
    }
}
