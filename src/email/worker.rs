//! Bounded email queue and its worker pool.
//!
//! [`EmailDispatcher::dispatch`] never blocks: a full or closed queue drops
//! the message with an error log. The worker loop pulls messages off the
//! queue and delivers up to `workers` of them concurrently, retrying each
//! with exponential backoff and jitter until `max_attempts` is reached.

use super::{EmailMessage, EmailSender};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
        }
    }
}

impl EmailWorkerConfig {
    #[must_use]
    pub fn normalize(self) -> Self {
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_millis(1)
        } else {
            self.backoff_base
        };
        Self {
            workers: self.workers.max(1),
            queue_capacity: self.queue_capacity.max(1),
            max_attempts: self.max_attempts.max(1),
            backoff_base,
            backoff_max: self.backoff_max.max(backoff_base),
        }
    }
}

/// Cheap, cloneable handle onto the email queue.
#[derive(Clone, Debug)]
pub struct EmailDispatcher {
    queue: mpsc::Sender<EmailMessage>,
}

impl EmailDispatcher {
    /// Creates the queue and spawns the worker loop on the current runtime.
    /// The loop exits once every dispatcher clone is dropped and the queue
    /// has drained.
    pub fn start(
        sender: Arc<dyn EmailSender>,
        config: EmailWorkerConfig,
    ) -> (Self, JoinHandle<()>) {
        let config = config.normalize();
        let (queue, rx) = mpsc::channel(config.queue_capacity);
        let handle = tokio::spawn(run_worker(rx, sender, config));
        (Self { queue }, handle)
    }

    pub fn dispatch(&self, message: EmailMessage) {
        match self.queue.try_send(message) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::error!(to = %message.to, subject = %message.subject, "Email queue full, message dropped");
            }
            Err(mpsc::error::TrySendError::Closed(message)) => {
                tracing::error!(to = %message.to, subject = %message.subject, "Email queue closed, message dropped");
            }
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<EmailMessage>,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) {
    let permits = Arc::new(Semaphore::new(config.workers));

    while let Some(message) = rx.recv().await {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let sender = Arc::clone(&sender);
        tokio::spawn(async move {
            deliver(sender.as_ref(), &message, &config).await;
            drop(permit);
        });
    }

    // Wait for in-flight deliveries before returning.
    let workers = u32::try_from(config.workers).unwrap_or(u32::MAX);
    let _ = permits.acquire_many(workers).await;
    tracing::debug!("Email worker stopped");
}

async fn deliver(sender: &dyn EmailSender, message: &EmailMessage, config: &EmailWorkerConfig) {
    for attempt in 1..=config.max_attempts {
        match sender.send(message).await {
            Ok(()) => {
                tracing::debug!(to = %message.to, attempt, "Email delivered");
                return;
            }
            Err(err) if attempt < config.max_attempts => {
                let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
                tracing::warn!(
                    to = %message.to,
                    attempt,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Email delivery failed: {err:#}"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                tracing::error!(
                    to = %message.to,
                    subject = %message.subject,
                    attempts = attempt,
                    "Email delivery abandoned: {err:#}"
                );
            }
        }
    }
}

/// `base * 2^(attempt-1)`, capped at `max`, plus up to 10% jitter.
fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let delay = base.saturating_mul(1 << exp).min(max);
    let jitter_cap = u64::try_from(delay.as_millis() / 10).unwrap_or(0);
    let jitter = if jitter_cap == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_cap)
    };
    delay + Duration::from_millis(jitter)
}
