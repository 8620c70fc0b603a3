//! Delayed, de-duplicated background jobs.

use crate::error::{PilotError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub const RECONCILE_JOB: &str = "update-transaction";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileJob {
    pub sequence_id: Uuid,
}

impl ReconcileJob {
    pub fn dedupe_key(&self) -> String {
        format!("reconcile:{}", self.sequence_id)
    }

    pub fn options(&self, delay: Duration) -> EnqueueOptions {
        EnqueueOptions {
            delay,
            dedupe_key: Some(self.dedupe_key()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    pub delay: Duration,
    /// While a job with this key is waiting, further enqueues are dropped.
    pub dedupe_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub payload: Value,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Returns false when the job was dropped as a duplicate.
    async fn enqueue(&self, name: &str, payload: Value, options: EnqueueOptions) -> Result<bool>;
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: Job) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-process queue
// ---------------------------------------------------------------------------

/// Timer-per-job queue feeding a single worker channel.
#[derive(Clone)]
pub struct TokioJobQueue {
    tx: mpsc::UnboundedSender<Job>,
    waiting: Arc<Mutex<HashSet<String>>>,
}

impl TokioJobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                waiting: Arc::new(Mutex::new(HashSet::new())),
            },
            rx,
        )
    }
}

#[async_trait]
impl JobQueue for TokioJobQueue {
    async fn enqueue(&self, name: &str, payload: Value, options: EnqueueOptions) -> Result<bool> {
        if let Some(key) = &options.dedupe_key {
            let mut waiting = self
                .waiting
                .lock()
                .map_err(|_| PilotError::Queue("dedupe set lock poisoned".to_string()))?;
            if !waiting.insert(key.clone()) {
                debug!(job = name, key = %key, "duplicate job dropped");
                return Ok(false);
            }
        }

        let job = Job {
            name: name.to_string(),
            payload,
        };
        let tx = self.tx.clone();
        let waiting = self.waiting.clone();
        tokio::spawn(async move {
            if !options.delay.is_zero() {
                tokio::time::sleep(options.delay).await;
            }
            // Released before dispatch so a running job may re-enqueue itself.
            if let Some(key) = &options.dedupe_key {
                if let Ok(mut waiting) = waiting.lock() {
                    waiting.remove(key);
                }
            }
            if tx.send(job).is_err() {
                warn!("job worker has shut down; job dropped");
            }
        });
        Ok(true)
    }
}

/// Drain `rx`, handing each job to `handler` one at a time.
pub async fn run_worker(mut rx: mpsc::UnboundedReceiver<Job>, handler: Arc<dyn JobHandler>) {
    while let Some(job) = rx.recv().await {
        let name = job.name.clone();
        if let Err(e) = handler.handle(job).await {
            warn!(job = %name, error = %e, "job failed");
        }
    }
    debug!("job worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn delayed_job_is_delivered() {
        let (queue, mut rx) = TokioJobQueue::new();
        let job = ReconcileJob {
            sequence_id: Uuid::new_v4(),
        };
        assert!(queue
            .enqueue(RECONCILE_JOB, json!(job), job.options(Duration::from_millis(5)))
            .await
            .unwrap());
        let got = rx.recv().await.unwrap();
        assert_eq!(got.name, "update-transaction");
        let back: ReconcileJob = serde_json::from_value(got.payload).unwrap();
        assert_eq!(back, job);
    }

    #[tokio::test]
    async fn waiting_duplicates_are_dropped() {
        let (queue, mut rx) = TokioJobQueue::new();
        let job = ReconcileJob {
            sequence_id: Uuid::new_v4(),
        };
        let opts = job.options(Duration::from_millis(20));
        assert!(queue.enqueue(RECONCILE_JOB, json!(job), opts.clone()).await.unwrap());
        assert!(!queue.enqueue(RECONCILE_JOB, json!(job), opts.clone()).await.unwrap());

        rx.recv().await.unwrap();
        // Key is released once dispatched.
        assert!(queue.enqueue(RECONCILE_JOB, json!(job), opts).await.unwrap());
        rx.recv().await.unwrap();
    }

    #[test]
    fn dedupe_key_names_the_sequence() {
        let id = Uuid::nil();
        assert_eq!(
            ReconcileJob { sequence_id: id }.dedupe_key(),
            "reconcile:00000000-0000-0000-0000-000000000000"
        );
    }

    struct Counter(Mutex<Vec<String>>);

    #[async_trait]
    impl JobHandler for Counter {
        async fn handle(&self, job: Job) -> Result<()> {
            self.0.lock().unwrap().push(job.name);
            Err(PilotError::Queue("handler errors are logged, not fatal".into()))
        }
    }

    #[tokio::test]
    async fn worker_keeps_running_after_errors() {
        let (queue, rx) = TokioJobQueue::new();
        let counter = Arc::new(Counter(Mutex::new(Vec::new())));
        for name in ["a", "b"] {
            queue.enqueue(name, Value::Null, EnqueueOptions::default()).await.unwrap();
        }
        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), run_worker(rx, counter.clone()))
            .await
            .unwrap();
        let mut seen = counter.0.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["a", "b"]);
    }
}
