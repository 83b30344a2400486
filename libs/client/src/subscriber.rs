use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pubsub_api::{PubsubMessage, ReceivedMessage, ServiceError, SubscriberStub, SubscriptionName};

use crate::error::SubscriberError;

// ═══════════════════════════════════════════════════════════════
//  Settings & state
// ═══════════════════════════════════════════════════════════════

/// Concurrency knobs. At most `parallel_pull_count * executor_thread_count`
/// callbacks run at the same time.
#[derive(Debug, Clone)]
pub struct SubscriberSettings {
    /// Independent pull streams.
    pub parallel_pull_count: usize,
    /// Callback workers per stream.
    pub executor_thread_count: usize,
    pub max_messages_per_pull: usize,
    /// Pause between a retryable pull failure and the next attempt.
    pub retry_backoff: Duration,
}

impl Default for SubscriberSettings {
    fn default() -> Self {
        Self {
            parallel_pull_count: 1,
            executor_thread_count: 5,
            max_messages_per_pull: 100,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Lifecycle: `Created -> Running -> Stopping -> Terminated`, or `Failed`
/// when a stream hits an error it cannot retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Created,
    Running,
    Stopping,
    Terminated,
    Failed,
}

impl SubscriberState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriberState::Terminated | SubscriberState::Failed)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Callback surface
// ═══════════════════════════════════════════════════════════════

/// User callback, invoked once per delivery on a worker thread. It may
/// block; each call occupies one worker slot until it returns.
///
/// The consumer may outlive the call. Decisions made after the subscriber
/// has terminated are dropped, and the delivery comes back once its ack
/// deadline passes.
pub trait MessageReceiver: Send + Sync + 'static {
    fn receive_message(&self, message: PubsubMessage, consumer: AckReplyConsumer);
}

impl<F> MessageReceiver for F
where
    F: Fn(PubsubMessage, AckReplyConsumer) + Send + Sync + 'static,
{
    fn receive_message(&self, message: PubsubMessage, consumer: AckReplyConsumer) {
        self(message, consumer)
    }
}

enum Reply {
    Ack(String),
    Nack(String),
}

/// Decision handle for one delivery. `ack` and `nack` consume it, so a
/// delivery gets at most one decision. Dropping it undecided leaves the
/// message to be redelivered once its ack deadline passes.
pub struct AckReplyConsumer {
    ack_id: String,
    message_id: String,
    replies: mpsc::UnboundedSender<Reply>,
    decided: bool,
}

impl AckReplyConsumer {
    fn new(ack_id: String, message_id: String, replies: mpsc::UnboundedSender<Reply>) -> Self {
        Self {
            ack_id,
            message_id,
            replies,
            decided: false,
        }
    }

    pub fn ack(mut self) {
        let ack_id = std::mem::take(&mut self.ack_id);
        self.reply(Reply::Ack(ack_id));
    }

    /// Ask for immediate redelivery.
    pub fn nack(mut self) {
        let ack_id = std::mem::take(&mut self.ack_id);
        self.reply(Reply::Nack(ack_id));
    }

    fn reply(&mut self, reply: Reply) {
        self.decided = true;
        if self.replies.send(reply).is_err() {
            tracing::warn!(message_id = %self.message_id, "decision after subscriber termination dropped");
        }
    }
}

impl Drop for AckReplyConsumer {
    fn drop(&mut self) {
        if !self.decided {
            tracing::warn!(
                message_id = %self.message_id,
                "delivery dropped without ack or nack, redelivery after ack deadline"
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Subscriber
// ═══════════════════════════════════════════════════════════════

struct Inner {
    subscription: SubscriptionName,
    stub: Arc<dyn SubscriberStub>,
    receiver: Arc<dyn MessageReceiver>,
    settings: SubscriberSettings,
    state: watch::Sender<SubscriberState>,
    token: CancellationToken,
    failure: Mutex<Option<ServiceError>>,
}

impl Inner {
    fn fail(&self, error: ServiceError) {
        {
            let mut failure = self.failure.lock().unwrap_or_else(|p| p.into_inner());
            if failure.is_none() {
                *failure = Some(error);
            }
        }
        self.token.cancel();
    }

    fn failure(&self) -> ServiceError {
        self.failure
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .unwrap_or_else(|| ServiceError::internal("subscriber failed without a recorded error"))
    }
}

pub struct SubscriberBuilder {
    subscription: SubscriptionName,
    stub: Arc<dyn SubscriberStub>,
    receiver: Arc<dyn MessageReceiver>,
    settings: SubscriberSettings,
}

impl SubscriberBuilder {
    pub fn parallel_pull_count(mut self, count: usize) -> Self {
        self.settings.parallel_pull_count = count.max(1);
        self
    }

    pub fn executor_thread_count(mut self, count: usize) -> Self {
        self.settings.executor_thread_count = count.max(1);
        self
    }

    pub fn max_messages_per_pull(mut self, count: usize) -> Self {
        self.settings.max_messages_per_pull = count.max(1);
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.settings.retry_backoff = backoff;
        self
    }

    pub fn settings(self, settings: SubscriberSettings) -> Self {
        self.parallel_pull_count(settings.parallel_pull_count)
            .executor_thread_count(settings.executor_thread_count)
            .max_messages_per_pull(settings.max_messages_per_pull)
            .retry_backoff(settings.retry_backoff)
    }

    pub fn build(self) -> Subscriber {
        let (state, _) = watch::channel(SubscriberState::Created);
        Subscriber {
            inner: Arc::new(Inner {
                subscription: self.subscription,
                stub: self.stub,
                receiver: self.receiver,
                settings: self.settings,
                state,
                token: CancellationToken::new(),
                failure: Mutex::new(None),
            }),
        }
    }
}

/// Streaming-pull subscriber. Single use: once stopped it cannot be
/// started again. Dropping a running subscriber stops it.
pub struct Subscriber {
    inner: Arc<Inner>,
}

impl Subscriber {
    pub fn builder(
        subscription: SubscriptionName,
        stub: Arc<dyn SubscriberStub>,
        receiver: impl MessageReceiver,
    ) -> SubscriberBuilder {
        SubscriberBuilder {
            subscription,
            stub,
            receiver: Arc::new(receiver),
            settings: SubscriberSettings::default(),
        }
    }

    pub fn subscription(&self) -> &SubscriptionName {
        &self.inner.subscription
    }

    pub fn state(&self) -> SubscriberState {
        *self.inner.state.borrow()
    }

    /// Spawn the pull streams. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), SubscriberError> {
        let mut previous = SubscriberState::Created;
        let started = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == SubscriberState::Created {
                *state = SubscriberState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(SubscriberError::IllegalState(previous));
        }

        let settings = &self.inner.settings;
        tracing::info!(
            subscription = %self.inner.subscription,
            streams = settings.parallel_pull_count,
            threads = settings.executor_thread_count,
            "subscriber started"
        );
        tokio::spawn(supervise(self.inner.clone()));
        Ok(())
    }

    /// Wait until the subscriber has left `Created`.
    pub async fn await_running(&self) -> Result<(), SubscriberError> {
        let mut state = self.inner.state.subscribe();
        let current = state
            .wait_for(|s| *s != SubscriberState::Created)
            .await
            .map(|s| *s)
            .unwrap_or(SubscriberState::Terminated);
        match current {
            SubscriberState::Running => Ok(()),
            SubscriberState::Failed => Err(SubscriberError::Failed(self.inner.failure())),
            other => Err(SubscriberError::IllegalState(other)),
        }
    }

    /// Begin a graceful stop: pulling ceases, queued deliveries are
    /// nacked, callbacks already running finish.
    pub fn stop(&self) {
        let changed = self.inner.state.send_if_modified(|state| match *state {
            SubscriberState::Created => {
                *state = SubscriberState::Terminated;
                true
            }
            SubscriberState::Running => {
                *state = SubscriberState::Stopping;
                true
            }
            _ => false,
        });
        self.inner.token.cancel();
        if changed {
            tracing::info!(subscription = %self.inner.subscription, "subscriber stopping");
        }
    }

    /// Wait for `Terminated` or `Failed`. Hitting the timeout is not a
    /// failure of the subscriber; it keeps running.
    pub async fn await_terminated(&self, timeout: Duration) -> Result<(), SubscriberError> {
        let mut state = self.inner.state.subscribe();
        let waited = tokio::time::timeout(timeout, async {
            state.wait_for(|s| s.is_terminal()).await.map(|s| *s)
        })
        .await;
        match waited {
            Err(_) => Err(SubscriberError::Timeout(timeout)),
            Ok(Ok(SubscriberState::Failed)) => Err(SubscriberError::Failed(self.inner.failure())),
            Ok(_) => Ok(()),
        }
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.inner.token.cancel();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Streams
// ═══════════════════════════════════════════════════════════════

async fn supervise(inner: Arc<Inner>) {
    let streams: Vec<JoinHandle<()>> = (0..inner.settings.parallel_pull_count)
        .map(|stream| tokio::spawn(run_stream(inner.clone(), stream)))
        .collect();
    for handle in streams {
        if let Err(e) = handle.await {
            tracing::error!(subscription = %inner.subscription, error = %e, "stream task panicked");
        }
    }

    let failed = inner
        .failure
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .is_some();
    let final_state = if failed {
        SubscriberState::Failed
    } else {
        SubscriberState::Terminated
    };
    inner.state.send_replace(final_state);
    tracing::info!(subscription = %inner.subscription, state = ?final_state, "subscriber terminated");
}

/// One pull stream: a pull loop feeding a bounded work queue, a fixed set
/// of callback workers draining it, and a dispatcher sending decisions.
async fn run_stream(inner: Arc<Inner>, stream: usize) {
    let threads = inner.settings.executor_thread_count;
    let (work_tx, work_rx) = mpsc::channel::<ReceivedMessage>(threads);
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));
    let (reply_tx, reply_rx) = mpsc::unbounded_channel::<Reply>();

    let drained = CancellationToken::new();
    let dispatcher = tokio::spawn(dispatch_replies(inner.clone(), reply_rx, drained.clone()));
    let workers: Vec<JoinHandle<()>> = (0..threads)
        .map(|_| tokio::spawn(run_worker(inner.clone(), work_rx.clone(), reply_tx.clone())))
        .collect();

    pull_loop(&inner, stream, work_tx, &reply_tx).await;

    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(subscription = %inner.subscription, stream, error = %e, "worker panicked");
        }
    }
    drop(reply_tx);
    drained.cancel();
    let _ = dispatcher.await;
    tracing::debug!(subscription = %inner.subscription, stream, "stream stopped");
}

async fn pull_loop(
    inner: &Inner,
    stream: usize,
    work: mpsc::Sender<ReceivedMessage>,
    replies: &mpsc::UnboundedSender<Reply>,
) {
    loop {
        let pulled = tokio::select! {
            _ = inner.token.cancelled() => return,
            pulled = inner.stub.pull(&inner.subscription, inner.settings.max_messages_per_pull) => pulled,
        };

        match pulled {
            Ok(batch) => {
                let mut batch = batch.into_iter();
                while let Some(received) = batch.next() {
                    let permit = tokio::select! {
                        permit = work.reserve() => permit,
                        _ = inner.token.cancelled() => {
                            let _ = replies.send(Reply::Nack(received.ack_id));
                            for rest in batch {
                                let _ = replies.send(Reply::Nack(rest.ack_id));
                            }
                            return;
                        }
                    };
                    match permit {
                        Ok(permit) => permit.send(received),
                        Err(_) => return,
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    subscription = %inner.subscription,
                    stream,
                    error = %e,
                    "pull failed, retrying"
                );
                tokio::select! {
                    _ = inner.token.cancelled() => return,
                    _ = tokio::time::sleep(inner.settings.retry_backoff) => {}
                }
            }
            Err(e) => {
                tracing::error!(
                    subscription = %inner.subscription,
                    stream,
                    error = %e,
                    "pull failed permanently, stopping subscriber"
                );
                inner.fail(e);
                return;
            }
        }
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    work: Arc<tokio::sync::Mutex<mpsc::Receiver<ReceivedMessage>>>,
    replies: mpsc::UnboundedSender<Reply>,
) {
    loop {
        let next = work.lock().await.recv().await;
        let Some(received) = next else { break };

        // Queued but not started: hand it back.
        if inner.token.is_cancelled() {
            let _ = replies.send(Reply::Nack(received.ack_id));
            continue;
        }

        let consumer = AckReplyConsumer::new(
            received.ack_id,
            received.message.message_id.clone(),
            replies.clone(),
        );
        let receiver = inner.receiver.clone();
        let message = received.message;
        if let Err(e) =
            tokio::task::spawn_blocking(move || receiver.receive_message(message, consumer)).await
        {
            tracing::error!(subscription = %inner.subscription, error = %e, "message receiver panicked");
        }
    }
}

/// Collects decisions and sends them in as few calls as possible.
///
/// Once `drained` fires the channel is closed: decisions already queued
/// are still sent, consumers held past that point are not waited for.
async fn dispatch_replies(
    inner: Arc<Inner>,
    mut replies: mpsc::UnboundedReceiver<Reply>,
    drained: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            biased;
            reply = replies.recv() => match reply {
                Some(reply) => reply,
                None => return,
            },
            _ = drained.cancelled() => {
                replies.close();
                continue;
            }
        };
        let mut acks = Vec::new();
        let mut nacks = Vec::new();
        let mut next = Some(first);
        while let Some(reply) = next {
            match reply {
                Reply::Ack(id) => acks.push(id),
                Reply::Nack(id) => nacks.push(id),
            }
            next = replies.try_recv().ok();
        }

        if !acks.is_empty() {
            let count = acks.len();
            if let Err(e) = inner.stub.acknowledge(&inner.subscription, acks).await {
                tracing::warn!(subscription = %inner.subscription, count, error = %e, "acknowledge failed");
            }
        }
        if !nacks.is_empty() {
            let count = nacks.len();
            if let Err(e) = inner
                .stub
                .modify_ack_deadline(&inner.subscription, nacks, 0)
                .await
            {
                tracing::warn!(subscription = %inner.subscription, count, error = %e, "nack failed");
            }
        }
    }
}
