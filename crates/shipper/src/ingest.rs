//! The ingestion loop: blocking dequeue → decode → route → index.
//!
//! Delivery is at-most-once: the pop removes the item from its queue, and
//! there is no acknowledgment protocol, so a crash between pop and index
//! write can lose the single in-flight event. Events whose index write
//! fails are pushed to the dead-letter queue instead of being discarded.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use logship_core::Config;
use logship_queue::{QueueConsumer, RawMessage};
use logship_search::router;
use logship_search::{SearchClient, SearchError};

/// First retry delay after a transient failure.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Ceiling of the exponential backoff curve.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Upper bound of the uniform jitter added to every backoff sleep.
const BACKOFF_JITTER_MS: u64 = 250;

/// Write attempts per document before it is dead-lettered.
const INDEX_ATTEMPTS: u32 = 3;

/// Exponential backoff with jitter: 500ms, 1s, 2s, … capped at 30s.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BACKOFF_BASE.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1).min(6)));
    let jitter = rand::thread_rng().gen_range(0..=BACKOFF_JITTER_MS);
    exp.min(BACKOFF_CAP) + Duration::from_millis(jitter)
}

/// The long-running ingestion driver.
///
/// Constructed with already-open backend handles; only ever talks to the
/// [`QueueConsumer`] and [`SearchClient`] traits.
pub struct Shipper<Q, S> {
    queue: Q,
    search: S,
    index_prefix: String,
    document_category: String,
    dead_letter_queue: String,
    shipped: u64,
    dropped: u64,
    dead_lettered: u64,
}

impl<Q, S> Shipper<Q, S>
where
    Q: QueueConsumer,
    S: SearchClient,
{
    pub fn new(queue: Q, search: S, config: &Config) -> Self {
        Self {
            queue,
            search,
            index_prefix: config.index_prefix.clone(),
            document_category: config.document_category.clone(),
            dead_letter_queue: config.dead_letter_queue.clone(),
            shipped: 0,
            dropped: 0,
            dead_lettered: 0,
        }
    }

    /// Run until `shutdown` fires.
    ///
    /// Transient dequeue failures are retried in place with backoff and
    /// never escape. The only error path out of the loop is a failed
    /// dead-letter push, where continuing would silently lose an event.
    pub async fn run(&mut self, shutdown: Arc<Notify>) -> anyhow::Result<()> {
        info!(
            prefix = %self.index_prefix,
            category = %self.document_category,
            "ingestion loop started"
        );

        let mut consecutive_pop_errors: u32 = 0;

        loop {
            let msg = tokio::select! {
                _ = shutdown.notified() => {
                    info!(
                        shipped = self.shipped,
                        dropped = self.dropped,
                        dead_lettered = self.dead_lettered,
                        "shutdown requested, stopping ingestion loop"
                    );
                    return Ok(());
                }
                popped = self.queue.blocking_pop() => match popped {
                    Ok(msg) => {
                        consecutive_pop_errors = 0;
                        msg
                    }
                    Err(e) => {
                        // Nothing was popped, so nothing is lost; keep
                        // retrying the same call until the backend is back.
                        consecutive_pop_errors += 1;
                        let delay = backoff_delay(consecutive_pop_errors);
                        warn!(
                            error = %e,
                            attempt = consecutive_pop_errors,
                            backoff_ms = delay.as_millis() as u64,
                            "dequeue failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
            };

            self.process(msg).await?;
        }
    }

    /// Handle one popped message: decode, resolve the daily index, write.
    async fn process(&mut self, msg: RawMessage) -> anyhow::Result<()> {
        let event: Value = match serde_json::from_str(&msg.payload) {
            Ok(v) => v,
            Err(e) => {
                // An unparseable payload cannot be re-driven; drop it but
                // keep the loss visible through the running counter.
                self.dropped += 1;
                error!(
                    namespace = %msg.namespace,
                    error = %e,
                    dropped = self.dropped,
                    "undecodable payload dropped"
                );
                return Ok(());
            }
        };

        let index = router::resolve(&self.index_prefix, Utc::now());

        match self.write_with_retry(&index, &event).await {
            Ok(()) => {
                self.shipped += 1;
                debug!(
                    namespace = %msg.namespace,
                    %index,
                    shipped = self.shipped,
                    "event shipped"
                );
                Ok(())
            }
            Err(e) => {
                self.dead_lettered += 1;
                warn!(
                    namespace = %msg.namespace,
                    %index,
                    error = %e,
                    dead_lettered = self.dead_lettered,
                    "index write failed, dead-lettering event"
                );
                self.queue
                    .dead_letter(&self.dead_letter_queue, &msg.payload)
                    .await
                    .map_err(|push_err| {
                        anyhow::anyhow!(
                            "dead-letter push failed ({push_err}) after write failure ({e}); \
                             stopping to avoid silent event loss"
                        )
                    })
            }
        }
    }

    /// Index one event, retrying retryable failures up to the attempt
    /// bound. A 4xx rejection short-circuits: the backend will keep
    /// saying no to the same document.
    async fn write_with_retry(&self, index: &str, event: &Value) -> Result<(), SearchError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .search
                .index_document(index, &self.document_category, event)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < INDEX_ATTEMPTS => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        %index,
                        error = %e,
                        attempt,
                        backoff_ms = delay.as_millis() as u64,
                        "index write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;

    use logship_queue::QueueError;

    /// Scripted queue: serves a fixed sequence of pop results, then
    /// signals shutdown and parks so `run` exits cleanly.
    struct ScriptedQueue {
        script: VecDeque<Result<RawMessage, QueueError>>,
        shutdown: Arc<Notify>,
        pops: Arc<Mutex<u32>>,
        dead_letters: Arc<Mutex<Vec<(String, String)>>>,
        fail_dead_letter: bool,
    }

    impl ScriptedQueue {
        fn new(
            script: Vec<Result<RawMessage, QueueError>>,
            shutdown: Arc<Notify>,
        ) -> Self {
            Self {
                script: script.into(),
                shutdown,
                pops: Arc::new(Mutex::new(0)),
                dead_letters: Arc::new(Mutex::new(Vec::new())),
                fail_dead_letter: false,
            }
        }
    }

    #[async_trait]
    impl QueueConsumer for ScriptedQueue {
        async fn blocking_pop(&mut self) -> Result<RawMessage, QueueError> {
            *self.pops.lock().unwrap() += 1;
            match self.script.pop_front() {
                Some(result) => result,
                None => {
                    self.shutdown.notify_one();
                    std::future::pending().await
                }
            }
        }

        async fn ping(&mut self) -> Result<(), QueueError> {
            Ok(())
        }

        async fn dead_letter(&mut self, queue: &str, payload: &str) -> Result<(), QueueError> {
            if self.fail_dead_letter {
                return Err(QueueError::Push("dead-letter queue unavailable".into()));
            }
            self.dead_letters
                .lock()
                .unwrap()
                .push((queue.to_string(), payload.to_string()));
            Ok(())
        }
    }

    /// Search fake: records writes, optionally serving scripted failures
    /// first.
    struct RecordingSearch {
        writes: Arc<Mutex<Vec<(String, String, Value)>>>,
        failures: Mutex<VecDeque<SearchError>>,
    }

    impl RecordingSearch {
        fn new(failures: Vec<SearchError>) -> Self {
            Self {
                writes: Arc::new(Mutex::new(Vec::new())),
                failures: Mutex::new(failures.into()),
            }
        }
    }

    #[async_trait]
    impl SearchClient for RecordingSearch {
        async fn cluster_health(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn index_document(
            &self,
            index: &str,
            category: &str,
            body: &Value,
        ) -> Result<(), SearchError> {
            if let Some(e) = self.failures.lock().unwrap().pop_front() {
                return Err(e);
            }
            self.writes
                .lock()
                .unwrap()
                .push((index.to_string(), category.to_string(), body.clone()));
            Ok(())
        }
    }

    fn msg(namespace: &str, payload: &str) -> Result<RawMessage, QueueError> {
        Ok(RawMessage {
            namespace: namespace.to_string(),
            payload: payload.to_string(),
        })
    }

    fn test_config() -> Config {
        Config::default()
    }

    #[tokio::test]
    async fn ships_wellformed_event_to_daily_index() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(vec![msg("logs", r#"{"msg":"hello"}"#)], shutdown.clone());
        let search = RecordingSearch::new(vec![]);
        let writes = search.writes.clone();

        let expected_before = router::resolve("logstash", Utc::now());
        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();
        let expected_after = router::resolve("logstash", Utc::now());

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        let (index, category, body) = &writes[0];
        // Tolerate a run that straddles UTC midnight.
        assert!(*index == expected_before || *index == expected_after);
        assert_eq!(category, "logevent");
        assert_eq!(*body, json!({"msg": "hello"}));
    }

    #[tokio::test]
    async fn undecodable_payload_is_dropped_and_loop_continues() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(
            vec![msg("logs", "not valid json"), msg("logs", r#"{"ok":true}"#)],
            shutdown.clone(),
        );
        let pops = queue.pops.clone();
        let search = RecordingSearch::new(vec![]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        // The bad payload produced no write, and the loop went straight
        // back to dequeueing.
        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].2, json!({"ok": true}));
        assert_eq!(*pops.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn arrival_order_is_preserved() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(
            vec![msg("a", r#"{"from":"a"}"#), msg("b", r#"{"from":"b"}"#)],
            shutdown.clone(),
        );
        let search = RecordingSearch::new(vec![]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].2, json!({"from": "a"}));
        assert_eq!(writes[1].2, json!({"from": "b"}));
    }

    #[tokio::test]
    async fn transient_pop_error_is_retried_not_raised() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(
            vec![
                Err(QueueError::Connection("broken pipe".into())),
                msg("logs", r#"{"msg":"after outage"}"#),
            ],
            shutdown.clone(),
        );
        let pops = queue.pops.clone();
        let search = RecordingSearch::new(vec![]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        assert_eq!(writes.lock().unwrap().len(), 1);
        assert_eq!(*pops.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn retryable_write_failure_is_retried_then_succeeds() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(vec![msg("logs", r#"{"n":1}"#)], shutdown.clone());
        let dead_letters = queue.dead_letters.clone();
        let search = RecordingSearch::new(vec![SearchError::Connection("reset".into())]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        assert_eq!(writes.lock().unwrap().len(), 1);
        assert!(dead_letters.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_retry_exhaustion_dead_letters_and_continues() {
        let shutdown = Arc::new(Notify::new());
        let payload = r#"{"n":2}"#;
        let queue = ScriptedQueue::new(
            vec![msg("logs", payload), msg("logs", r#"{"n":3}"#)],
            shutdown.clone(),
        );
        let dead_letters = queue.dead_letters.clone();
        let search = RecordingSearch::new(vec![
            SearchError::Connection("reset".into()),
            SearchError::Connection("reset".into()),
            SearchError::Connection("reset".into()),
        ]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        let dead_letters = dead_letters.lock().unwrap();
        assert_eq!(dead_letters.len(), 1);
        assert_eq!(dead_letters[0], ("logs:deadletter".to_string(), payload.to_string()));
        // The next event still shipped.
        let writes = writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].2, json!({"n": 3}));
    }

    #[tokio::test]
    async fn client_rejection_dead_letters_without_retrying() {
        let shutdown = Arc::new(Notify::new());
        let queue = ScriptedQueue::new(vec![msg("logs", r#"{"n":4}"#)], shutdown.clone());
        let dead_letters = queue.dead_letters.clone();
        let search = RecordingSearch::new(vec![SearchError::Rejected {
            status: 400,
            body: "mapper_parsing_exception".into(),
        }]);
        let writes = search.writes.clone();

        let mut shipper = Shipper::new(queue, search, &test_config());
        shipper.run(shutdown).await.unwrap();

        // One failure consumed, no retry attempted, payload dead-lettered.
        assert_eq!(dead_letters.lock().unwrap().len(), 1);
        assert!(writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dead_letter_push_failure_stops_the_loop() {
        let shutdown = Arc::new(Notify::new());
        let mut queue = ScriptedQueue::new(vec![msg("logs", r#"{"n":5}"#)], shutdown.clone());
        queue.fail_dead_letter = true;
        let search = RecordingSearch::new(vec![SearchError::Rejected {
            status: 400,
            body: "rejected".into(),
        }]);

        let mut shipper = Shipper::new(queue, search, &test_config());
        let err = shipper.run(shutdown).await.unwrap_err();
        assert!(err.to_string().contains("dead-letter push failed"));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        // Strip jitter by checking lower bounds only.
        assert!(backoff_delay(1) >= Duration::from_millis(500));
        assert!(backoff_delay(2) >= Duration::from_secs(1));
        assert!(backoff_delay(3) >= Duration::from_secs(2));
        // Deep into the curve the delay stays at the cap (plus jitter).
        let deep = backoff_delay(30);
        assert!(deep >= Duration::from_secs(30));
        assert!(deep <= Duration::from_secs(30) + Duration::from_millis(BACKOFF_JITTER_MS));
    }
}
