use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pubsub_api::{PubsubMessage, SubscriptionName};
use pubsub_client::{AckReplyConsumer, MessageReceiver, Subscriber, SubscriberError};

use crate::Clients;
use crate::error::SnippetError;

#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    pub parallel_pull_count: usize,
    pub executor_thread_count: usize,
    /// How long to listen before stopping.
    pub run_for: Duration,
    /// Bound on the graceful stop once `run_for` has elapsed.
    pub stop_timeout: Duration,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            parallel_pull_count: 2,
            executor_thread_count: 4,
            run_for: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(30),
        }
    }
}

/// Prints `Id:` and `Data:` for each message, then acks it. The writer
/// lock is held for both lines so concurrent callbacks never interleave.
pub struct PrintingReceiver<W> {
    out: Arc<Mutex<W>>,
}

impl<W> PrintingReceiver<W> {
    pub fn new(out: Arc<Mutex<W>>) -> Self {
        Self { out }
    }
}

impl PrintingReceiver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(Arc::new(Mutex::new(std::io::stdout())))
    }
}

impl<W: Write + Send + 'static> MessageReceiver for PrintingReceiver<W> {
    fn receive_message(&self, message: PubsubMessage, consumer: AckReplyConsumer) {
        {
            let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
            let written = writeln!(out, "Id: {}", message.message_id)
                .and_then(|_| writeln!(out, "Data: {}", message.data_utf8()))
                .and_then(|_| out.flush());
            if let Err(e) = written {
                tracing::warn!(message_id = %message.message_id, error = %e, "could not print message");
            }
        }
        consumer.ack();
    }
}

/// Listen on `projects/{project_id}/subscriptions/{subscription_id}` with
/// `parallel_pull_count` streams of `executor_thread_count` callback
/// workers each, for `run_for`, then stop gracefully.
///
/// Running out the listening window is the normal way this returns, even
/// when callbacks outlast `stop_timeout`; only an unrecoverable subscriber
/// failure is an error.
pub async fn subscribe_with_concurrency_control(
    clients: &Clients,
    project_id: &str,
    subscription_id: &str,
    options: &SubscribeOptions,
    receiver: impl MessageReceiver,
    out: &mut (dyn Write + Send),
) -> Result<(), SnippetError> {
    let subscription = SubscriptionName::of(project_id, subscription_id);
    let subscriber = Subscriber::builder(subscription.clone(), clients.subscriber.clone(), receiver)
        .parallel_pull_count(options.parallel_pull_count)
        .executor_thread_count(options.executor_thread_count)
        .build();

    subscriber.start()?;
    subscriber.await_running().await?;
    writeln!(out, "Listening for messages on {subscription}:").map_err(SnippetError::output)?;

    match subscriber.await_terminated(options.run_for).await {
        Ok(()) => return Ok(()),
        Err(SubscriberError::Timeout(_)) => {
            tracing::info!(subscription = %subscription, after = ?options.run_for, "listening window over, stopping");
        }
        Err(e) => return Err(e.into()),
    }

    subscriber.stop();
    match subscriber.await_terminated(options.stop_timeout).await {
        Err(SubscriberError::Timeout(after)) => {
            // Callbacks still running; they finish on their own.
            tracing::warn!(subscription = %subscription, ?after, "subscriber did not stop in time");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}
