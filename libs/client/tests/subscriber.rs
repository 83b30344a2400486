use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pubsub_api::{
    Code, PubsubMessage, PublisherStub, ReceivedMessage, ServiceError, ServiceFuture,
    SubscriberStub, SubscriptionName, Topic, TopicName,
};
use pubsub_client::{AckReplyConsumer, Subscriber, SubscriberError, SubscriberState};
use topic_engine::{EngineConfig, MemoryPubsub};

async fn setup() -> (Arc<MemoryPubsub>, TopicName, SubscriptionName) {
    let engine = Arc::new(MemoryPubsub::new(EngineConfig {
        default_ack_deadline: Duration::from_secs(10),
        max_pull_wait: Duration::from_millis(20),
    }));
    let topic = TopicName::of("demo", "events");
    let sub = SubscriptionName::of("demo", "events-sub");
    engine.create_topic(Topic::new(topic.clone())).await.unwrap();
    engine.create_subscription(sub.clone(), &topic, None).await.unwrap();
    (engine, topic, sub)
}

async fn publish_n(engine: &MemoryPubsub, topic: &TopicName, n: usize) -> Vec<String> {
    let messages = (0..n)
        .map(|i| PubsubMessage::new().set_data(format!("message {i}")))
        .collect();
    engine.publish(topic, messages).await.unwrap()
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..400 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_message_is_delivered_once_within_the_concurrency_limit() {
    let (engine, topic, sub) = setup().await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let receiver = {
        let (seen, running, peak) = (seen.clone(), running.clone(), peak.clone());
        move |message: PubsubMessage, consumer: AckReplyConsumer| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            seen.lock().unwrap().push(message.message_id.clone());
            running.fetch_sub(1, Ordering::SeqCst);
            consumer.ack();
        }
    };

    let subscriber = Subscriber::builder(sub.clone(), engine.clone(), receiver)
        .parallel_pull_count(2)
        .executor_thread_count(4)
        .build();
    subscriber.start().unwrap();
    subscriber.await_running().await.unwrap();

    let ids = publish_n(&engine, &topic, 10).await;

    let handle = engine.subscription(&sub).await.unwrap();
    wait_until(|| seen.lock().unwrap().len() == 10 && handle.unacked() == 0).await;

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
    assert_eq!(subscriber.state(), SubscriberState::Terminated);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 10);
    let distinct: HashSet<&String> = seen.iter().collect();
    let expected: HashSet<&String> = ids.iter().collect();
    assert_eq!(distinct, expected);
    assert!(peak.load(Ordering::SeqCst) <= 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nacked_message_is_redelivered() {
    let (engine, topic, sub) = setup().await;

    let first_time = Arc::new(AtomicBool::new(true));
    let deliveries = Arc::new(AtomicUsize::new(0));
    let receiver = {
        let (first_time, deliveries) = (first_time.clone(), deliveries.clone());
        move |_: PubsubMessage, consumer: AckReplyConsumer| {
            deliveries.fetch_add(1, Ordering::SeqCst);
            if first_time.swap(false, Ordering::SeqCst) {
                consumer.nack();
            } else {
                consumer.ack();
            }
        }
    };

    let subscriber = Subscriber::builder(sub.clone(), engine.clone(), receiver).build();
    subscriber.start().unwrap();
    publish_n(&engine, &topic, 1).await;

    let handle = engine.subscription(&sub).await.unwrap();
    wait_until(|| deliveries.load(Ordering::SeqCst) == 2 && handle.unacked() == 0).await;

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_lets_running_callbacks_finish_and_hands_back_the_rest() {
    let (engine, topic, sub) = setup().await;
    let ids = publish_n(&engine, &topic, 10).await;

    let started = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(Mutex::new(Vec::new()));
    let receiver = {
        let (started, completed) = (started.clone(), completed.clone());
        move |message: PubsubMessage, consumer: AckReplyConsumer| {
            started.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(300));
            completed.lock().unwrap().push(message.message_id.clone());
            consumer.ack();
        }
    };

    let subscriber = Subscriber::builder(sub.clone(), engine.clone(), receiver)
        .parallel_pull_count(1)
        .executor_thread_count(2)
        .build();
    subscriber.start().unwrap();
    wait_until(|| started.load(Ordering::SeqCst) == 2).await;

    subscriber.stop();
    assert_eq!(subscriber.state(), SubscriberState::Stopping);
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
    assert_eq!(subscriber.state(), SubscriberState::Terminated);

    let completed: Vec<String> = completed.lock().unwrap().clone();
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert_eq!(completed.len(), 2);
    assert_eq!(engine.subscription(&sub).await.unwrap().unacked(), 8);

    // Handed back with a zero deadline, so they are pullable right away.
    let redelivered = engine.pull(&sub, 10).await.unwrap();
    assert_eq!(redelivered.len(), 8);
    let mut delivered: HashSet<String> = redelivered
        .iter()
        .map(|m| m.message.message_id.clone())
        .collect();
    delivered.extend(completed);
    assert_eq!(delivered, ids.into_iter().collect::<HashSet<String>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn held_consumer_does_not_block_termination() {
    let (engine, topic, sub) = setup().await;

    let held = Arc::new(Mutex::new(Vec::new()));
    let receiver = {
        let held = held.clone();
        move |_: PubsubMessage, consumer: AckReplyConsumer| held.lock().unwrap().push(consumer)
    };

    let subscriber = Subscriber::builder(sub.clone(), engine.clone(), receiver).build();
    subscriber.start().unwrap();
    publish_n(&engine, &topic, 1).await;
    wait_until(|| held.lock().unwrap().len() == 1).await;

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(2)).await.unwrap();

    // Too late to count: the lease stays outstanding until its deadline.
    let consumer = held.lock().unwrap().pop().unwrap();
    consumer.ack();
    assert_eq!(engine.subscription(&sub).await.unwrap().unacked(), 1);
}

#[tokio::test]
async fn start_is_rejected_outside_created() {
    let (engine, _, sub) = setup().await;
    let subscriber = Subscriber::builder(sub, engine, |_: PubsubMessage, c: AckReplyConsumer| {
        c.ack()
    })
    .build();

    subscriber.start().unwrap();
    assert!(matches!(
        subscriber.start(),
        Err(SubscriberError::IllegalState(SubscriberState::Running))
    ));

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
    assert!(matches!(
        subscriber.start(),
        Err(SubscriberError::IllegalState(SubscriberState::Terminated))
    ));
}

#[tokio::test]
async fn stop_before_start_terminates() {
    let (engine, _, sub) = setup().await;
    let subscriber =
        Subscriber::builder(sub, engine, |_: PubsubMessage, c: AckReplyConsumer| c.ack()).build();

    subscriber.stop();
    assert_eq!(subscriber.state(), SubscriberState::Terminated);
    subscriber.await_terminated(Duration::from_millis(10)).await.unwrap();
}

#[tokio::test]
async fn await_terminated_times_out_while_running() {
    let (engine, _, sub) = setup().await;
    let subscriber =
        Subscriber::builder(sub, engine, |_: PubsubMessage, c: AckReplyConsumer| c.ack()).build();
    subscriber.start().unwrap();

    let err = subscriber
        .await_terminated(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, SubscriberError::Timeout(_)));
    assert_eq!(subscriber.state(), SubscriberState::Running);

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn missing_subscription_fails_the_subscriber() {
    let (engine, _, _) = setup().await;
    let subscriber = Subscriber::builder(
        SubscriptionName::of("demo", "does-not-exist"),
        engine,
        |_: PubsubMessage, c: AckReplyConsumer| c.ack(),
    )
    .build();
    subscriber.start().unwrap();

    match subscriber.await_terminated(Duration::from_secs(5)).await {
        Err(SubscriberError::Failed(e)) => assert_eq!(e.code(), Code::NotFound),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(subscriber.state(), SubscriberState::Failed);
}

/// Fails the first `failures` pulls with `Unavailable`, then delegates.
struct Flaky {
    engine: Arc<MemoryPubsub>,
    failures: AtomicUsize,
}

impl SubscriberStub for Flaky {
    fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: usize,
    ) -> ServiceFuture<'_, Vec<ReceivedMessage>> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Box::pin(async { Err(ServiceError::unavailable("connection reset")) });
        }
        self.engine.pull(subscription, max_messages)
    }

    fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
    ) -> ServiceFuture<'_, ()> {
        self.engine.acknowledge(subscription, ack_ids)
    }

    fn modify_ack_deadline(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
        ack_deadline_seconds: u32,
    ) -> ServiceFuture<'_, ()> {
        self.engine
            .modify_ack_deadline(subscription, ack_ids, ack_deadline_seconds)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transient_pull_errors_are_retried() {
    let (engine, topic, sub) = setup().await;
    let stub = Arc::new(Flaky {
        engine: engine.clone(),
        failures: AtomicUsize::new(3),
    });

    let acked = Arc::new(AtomicUsize::new(0));
    let receiver = {
        let acked = acked.clone();
        move |_: PubsubMessage, consumer: AckReplyConsumer| {
            consumer.ack();
            acked.fetch_add(1, Ordering::SeqCst);
        }
    };
    let subscriber = Subscriber::builder(sub, stub.clone(), receiver)
        .retry_backoff(Duration::from_millis(5))
        .build();
    subscriber.start().unwrap();
    publish_n(&engine, &topic, 2).await;

    wait_until(|| acked.load(Ordering::SeqCst) == 2).await;
    assert_eq!(stub.failures.load(Ordering::SeqCst), 0);
    assert_eq!(subscriber.state(), SubscriberState::Running);

    subscriber.stop();
    subscriber.await_terminated(Duration::from_secs(5)).await.unwrap();
}
