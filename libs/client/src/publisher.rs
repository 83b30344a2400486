use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;

use pubsub_api::{PublisherStub, PubsubMessage, ServiceError, TopicName};

use crate::error::PublishError;

// ═══════════════════════════════════════════════════════════════
//  Settings
// ═══════════════════════════════════════════════════════════════

/// Batching and retry thresholds. A batch is sent as soon as any one of
/// the three batch thresholds is reached.
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    pub element_count_threshold: usize,
    pub request_byte_threshold: usize,
    pub delay_threshold: Duration,
    /// Attempts per batch, counting the first, for retryable failures.
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            element_count_threshold: 100,
            request_byte_threshold: 1000,
            delay_threshold: Duration::from_millis(1),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PublishHandle
// ═══════════════════════════════════════════════════════════════

/// Completion of one `Publisher::publish` call: the service-assigned
/// message id, or the reason the message was not published.
#[must_use = "a publish handle does nothing unless awaited"]
pub struct PublishHandle {
    rx: oneshot::Receiver<Result<String, PublishError>>,
}

impl Future for PublishHandle {
    type Output = Result<String, PublishError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(PublishError::Shutdown)))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Publisher
// ═══════════════════════════════════════════════════════════════

struct Outgoing {
    message: PubsubMessage,
    reply: oneshot::Sender<Result<String, PublishError>>,
}

/// Publishes to one topic through a background batching task.
///
/// Must be created inside a tokio runtime. After `shutdown` no new
/// messages are accepted; everything already queued is still sent, and
/// `await_termination` waits for that to finish.
pub struct Publisher {
    topic: TopicName,
    queue: Mutex<Option<mpsc::UnboundedSender<Outgoing>>>,
    terminated: watch::Receiver<bool>,
}

impl Publisher {
    pub fn new(topic: TopicName, stub: Arc<dyn PublisherStub>) -> Self {
        Self::with_settings(topic, stub, PublisherSettings::default())
    }

    pub fn with_settings(
        topic: TopicName,
        stub: Arc<dyn PublisherStub>,
        settings: PublisherSettings,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = watch::channel(false);
        let batcher = Batcher {
            topic: topic.clone(),
            stub,
            settings,
        };
        tokio::spawn(batcher.run(rx, done_tx));
        tracing::debug!(topic = %topic, "publisher started");
        Self {
            topic,
            queue: Mutex::new(Some(tx)),
            terminated: done_rx,
        }
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Outgoing>> {
        self.queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Queue a message. Never blocks; the returned handle resolves once
    /// the batch containing the message has been answered.
    pub fn publish(&self, message: PubsubMessage) -> PublishHandle {
        let (reply, rx) = oneshot::channel();
        let outgoing = Outgoing { message, reply };
        match self.sender() {
            Some(tx) => {
                if let Err(mpsc::error::SendError(rejected)) = tx.send(outgoing) {
                    let _ = rejected.reply.send(Err(PublishError::Shutdown));
                }
            }
            None => {
                let _ = outgoing.reply.send(Err(PublishError::Shutdown));
            }
        }
        PublishHandle { rx }
    }

    /// Stop accepting messages and flush what is queued. Idempotent.
    pub fn shutdown(&self) {
        let taken = self
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if taken.is_some() {
            tracing::info!(topic = %self.topic, "publisher shutting down");
        }
    }

    /// Wait until every queued message has been answered.
    pub async fn await_termination(&self, timeout: Duration) -> Result<(), PublishError> {
        let mut terminated = self.terminated.clone();
        match tokio::time::timeout(timeout, terminated.wait_for(|done| *done)).await {
            // A closed channel means the batching task is gone.
            Ok(_) => Ok(()),
            Err(_) => Err(PublishError::Timeout(timeout)),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Batching task
// ═══════════════════════════════════════════════════════════════

struct Batcher {
    topic: TopicName,
    stub: Arc<dyn PublisherStub>,
    settings: PublisherSettings,
}

impl Batcher {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Outgoing>, done: watch::Sender<bool>) {
        let mut pending: Vec<Outgoing> = Vec::new();
        let mut bytes = 0usize;
        let mut flush_at: Option<Instant> = None;

        loop {
            let next = match flush_at {
                Some(at) => match tokio::time::timeout_at(at, rx.recv()).await {
                    Ok(next) => next,
                    Err(_) => {
                        self.flush(&mut pending).await;
                        bytes = 0;
                        flush_at = None;
                        continue;
                    }
                },
                None => rx.recv().await,
            };

            let Some(outgoing) = next else { break };
            bytes += outgoing.message.size();
            pending.push(outgoing);
            if flush_at.is_none() {
                flush_at = Some(Instant::now() + self.settings.delay_threshold);
            }
            if pending.len() >= self.settings.element_count_threshold
                || bytes >= self.settings.request_byte_threshold
            {
                self.flush(&mut pending).await;
                bytes = 0;
                flush_at = None;
            }
        }

        self.flush(&mut pending).await;
        tracing::info!(topic = %self.topic, "publisher terminated");
        let _ = done.send(true);
    }

    async fn flush(&self, pending: &mut Vec<Outgoing>) {
        if pending.is_empty() {
            return;
        }
        let (messages, replies): (Vec<_>, Vec<_>) = std::mem::take(pending)
            .into_iter()
            .map(|o| (o.message, o.reply))
            .unzip();
        let count = messages.len();

        match self.publish_with_retry(messages).await {
            Ok(ids) if ids.len() == count => {
                tracing::debug!(topic = %self.topic, messages = count, "batch published");
                for (reply, id) in replies.into_iter().zip(ids) {
                    let _ = reply.send(Ok(id));
                }
            }
            Ok(ids) => {
                let err = ServiceError::internal(format!(
                    "service returned {} ids for {count} messages",
                    ids.len()
                ));
                tracing::error!(topic = %self.topic, error = %err, "malformed publish response");
                for reply in replies {
                    let _ = reply.send(Err(err.clone().into()));
                }
            }
            Err(e) => {
                tracing::warn!(topic = %self.topic, messages = count, error = %e, "batch publish failed");
                for reply in replies {
                    let _ = reply.send(Err(PublishError::Service(e.clone())));
                }
            }
        }
    }

    async fn publish_with_retry(
        &self,
        messages: Vec<PubsubMessage>,
    ) -> Result<Vec<String>, ServiceError> {
        let mut attempt = 1;
        loop {
            match self.stub.publish(&self.topic, messages.clone()).await {
                Err(e) if e.is_retryable() && attempt < self.settings.max_attempts => {
                    tracing::debug!(topic = %self.topic, attempt, error = %e, "retrying publish");
                    tokio::time::sleep(self.settings.retry_backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pubsub_api::{Code, ServiceFuture};

    use super::*;

    #[derive(Default)]
    struct Recording {
        batches: Mutex<Vec<usize>>,
        failures: Mutex<VecDeque<ServiceError>>,
        calls: AtomicUsize,
    }

    impl Recording {
        fn failing_with(errors: Vec<ServiceError>) -> Self {
            Self {
                failures: Mutex::new(errors.into()),
                ..Self::default()
            }
        }
    }

    impl PublisherStub for Recording {
        fn publish(
            &self,
            _topic: &TopicName,
            messages: Vec<PubsubMessage>,
        ) -> ServiceFuture<'_, Vec<String>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if let Some(e) = self.failures.lock().unwrap().pop_front() {
                    return Err(e);
                }
                let mut batches = self.batches.lock().unwrap();
                let base: usize = batches.iter().sum();
                batches.push(messages.len());
                Ok((0..messages.len()).map(|i| format!("id-{}", base + i)).collect())
            })
        }
    }

    struct Hanging;

    impl PublisherStub for Hanging {
        fn publish(&self, _: &TopicName, _: Vec<PubsubMessage>) -> ServiceFuture<'_, Vec<String>> {
            Box::pin(std::future::pending())
        }
    }

    fn topic() -> TopicName {
        TopicName::of("p", "t")
    }

    #[tokio::test]
    async fn ids_resolve_in_publish_order_and_batches_respect_count() {
        let stub = Arc::new(Recording::default());
        let publisher = Publisher::with_settings(
            topic(),
            stub.clone(),
            PublisherSettings {
                element_count_threshold: 2,
                delay_threshold: Duration::from_secs(5),
                ..PublisherSettings::default()
            },
        );

        let handles: Vec<_> = (0..5)
            .map(|i| publisher.publish(PubsubMessage::new().set_data(format!("m{i}"))))
            .collect();
        publisher.shutdown();

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        assert_eq!(ids, ["id-0", "id-1", "id-2", "id-3", "id-4"]);
        assert_eq!(*stub.batches.lock().unwrap(), [2, 2, 1]);
        publisher.await_termination(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_rejected() {
        let publisher = Publisher::new(topic(), Arc::new(Recording::default()));
        publisher.shutdown();
        publisher.shutdown();
        let err = publisher
            .publish(PubsubMessage::new().set_data("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failure_is_retried() {
        let stub = Arc::new(Recording::failing_with(vec![ServiceError::unavailable("blip")]));
        let publisher = Publisher::new(topic(), stub.clone());

        let id = publisher.publish(PubsubMessage::new().set_data("x")).await.unwrap();
        assert_eq!(id, "id-0");
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_failure_reaches_the_handle() {
        let stub = Arc::new(Recording::failing_with(vec![ServiceError::invalid_argument(
            "bad payload",
        )]));
        let publisher = Publisher::new(topic(), stub.clone());

        let err = publisher
            .publish(PubsubMessage::new().set_data("x"))
            .await
            .unwrap_err();
        match err {
            PublishError::Service(e) => assert_eq!(e.code(), Code::InvalidArgument),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        // The publisher stays usable after a failed batch.
        assert!(publisher.publish(PubsubMessage::new().set_data("y")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn await_termination_times_out_on_stuck_batch() {
        let publisher = Publisher::new(topic(), Arc::new(Hanging));
        let _handle = publisher.publish(PubsubMessage::new().set_data("stuck"));
        publisher.shutdown();

        let err = publisher
            .await_termination(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Timeout(_)));
    }
}
