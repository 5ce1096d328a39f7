use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use roadmap_core::model::{
    CompletionRecord, CompletionSnapshot, MandatoryKind, ModuleId, QuizStatus, Topic,
};
use storage::repository::KeyValueStore;

use crate::api::ContentApi;
use crate::error::CompletionServiceError;

/// Store key of a topic's completion record.
#[must_use]
pub fn completion_key(topic_title: &str) -> String {
    format!("completion:{topic_title}")
}

/// Store key of a subject's mandatory quiz status.
#[must_use]
pub fn quiz_status_key(subject: &str) -> String {
    format!("quiz_status:{subject}")
}

/// Per-topic module completion and per-subject quiz status, kept in the
/// shared key-value store.
///
/// Updates are read-modify-write without compare-and-swap; concurrent writers
/// in other contexts can overwrite each other.
#[derive(Clone)]
pub struct CompletionTracker {
    store: Arc<dyn KeyValueStore>,
    poll_interval: Duration,
}

impl CompletionTracker {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Load the topic's record, creating or repairing it as needed.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Storage` if the store cannot be read or written.
    pub async fn ensure_record(
        &self,
        topic: &Topic,
    ) -> Result<CompletionRecord, CompletionServiceError> {
        let key = completion_key(topic.title());
        let record = match self.store.get_as::<CompletionRecord>(&key).await? {
            Some(mut record) => {
                if record.reconcile(topic) {
                    debug!(topic = topic.title(), "completion record repaired");
                    self.store.set_as(&key, &record).await?;
                }
                record
            }
            None => {
                let record = CompletionRecord::for_topic(topic);
                self.store.set_as(&key, &record).await?;
                debug!(
                    topic = topic.title(),
                    modules = record.total_modules(),
                    "completion record created"
                );
                record
            }
        };
        Ok(record)
    }

    /// # Errors
    ///
    /// Returns `CompletionServiceError::Storage` if the store cannot be read or written.
    pub async fn get_completion(
        &self,
        topic: &Topic,
    ) -> Result<CompletionSnapshot, CompletionServiceError> {
        Ok(self.ensure_record(topic).await?.snapshot())
    }

    /// Mark a module of `topic` complete.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Completion` for a module outside the
    /// topic, or `CompletionServiceError::Storage` on store failures.
    pub async fn mark_module_complete(
        &self,
        topic: &Topic,
        module: ModuleId,
    ) -> Result<CompletionSnapshot, CompletionServiceError> {
        let mut record = self.ensure_record(topic).await?;
        if record.mark_complete(topic, module)? {
            self.store
                .set_as(&completion_key(topic.title()), &record)
                .await?;
            info!(
                topic = topic.title(),
                module = module.value(),
                percent = record.percent(),
                "module completed"
            );
        }
        Ok(record.snapshot())
    }

    /// Locally recorded status of the mandatory quizzes for `subject`.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Storage` if the store cannot be read.
    pub async fn quiz_status(&self, subject: &str) -> Result<QuizStatus, CompletionServiceError> {
        Ok(self
            .store
            .get_as::<QuizStatus>(&quiz_status_key(subject))
            .await?
            .unwrap_or_default())
    }

    /// Record a mandatory quiz result. A recorded pass is never cleared.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Storage` on store failures.
    pub async fn record_quiz_result(
        &self,
        subject: &str,
        kind: MandatoryKind,
        passed: bool,
    ) -> Result<QuizStatus, CompletionServiceError> {
        let current = self.quiz_status(subject).await?;
        let mut observed = QuizStatus::default();
        observed.set(kind, passed);
        let merged = current.merged(observed);
        if merged != current {
            self.store.set_as(&quiz_status_key(subject), &merged).await?;
        }
        Ok(merged)
    }

    /// Pull the remote status for `subject` and merge it into the local one.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Fetch` if the remote call fails, or
    /// `CompletionServiceError::Storage` on store failures.
    pub async fn sync_quiz_status(
        &self,
        api: &dyn ContentApi,
        subject: &str,
    ) -> Result<QuizStatus, CompletionServiceError> {
        let remote = api.quiz_status(subject).await?;
        let local = self.quiz_status(subject).await?;
        let merged = local.merged(remote);
        if merged != local {
            self.store.set_as(&quiz_status_key(subject), &merged).await?;
            debug!(subject, "quiz status updated from remote");
        }
        Ok(merged)
    }

    /// Follow the topic's completion as other contexts change it.
    ///
    /// Re-reads on every store notification and on each poll interval;
    /// watchers only see snapshots that differ from the last one.
    ///
    /// # Errors
    ///
    /// Returns `CompletionServiceError::Storage` if the initial read fails.
    pub async fn watch(&self, topic: Arc<Topic>) -> Result<CompletionWatch, CompletionServiceError> {
        let mut feed = self.store.subscribe(&completion_key(topic.title()));
        let initial = self.get_completion(&topic).await?;
        let (tx, rx) = watch::channel(initial);
        let store = Arc::clone(&self.store);
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            let mut feed_open = true;

            loop {
                tokio::select! {
                    change = feed.changed(), if feed_open => {
                        if change.is_none() {
                            feed_open = false;
                            continue;
                        }
                    }
                    _ = ticker.tick() => {}
                }
                if tx.is_closed() {
                    break;
                }

                match read_snapshot(&store, &topic).await {
                    Ok(snapshot) => {
                        tx.send_if_modified(|current| {
                            if *current == snapshot {
                                false
                            } else {
                                *current = snapshot;
                                true
                            }
                        });
                    }
                    Err(err) => {
                        warn!(topic = topic.title(), error = %err, "completion refresh failed");
                    }
                }
            }
        });

        Ok(CompletionWatch { rx, task })
    }
}

/// Read without writing back; repairs stay in memory.
async fn read_snapshot(
    store: &Arc<dyn KeyValueStore>,
    topic: &Topic,
) -> Result<CompletionSnapshot, CompletionServiceError> {
    let mut record = store
        .get_as::<CompletionRecord>(&completion_key(topic.title()))
        .await?
        .unwrap_or_else(|| CompletionRecord::for_topic(topic));
    record.reconcile(topic);
    Ok(record.snapshot())
}

/// Live completion of one topic. Dropping it stops the background refresh.
pub struct CompletionWatch {
    rx: watch::Receiver<CompletionSnapshot>,
    task: JoinHandle<()>,
}

impl CompletionWatch {
    #[must_use]
    pub fn current(&self) -> CompletionSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next distinct snapshot.
    pub async fn changed(&mut self) -> Option<CompletionSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    #[must_use]
    pub fn receiver(&self) -> watch::Receiver<CompletionSnapshot> {
        self.rx.clone()
    }
}

impl Drop for CompletionWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}
