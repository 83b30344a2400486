use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use pubsub_api::{PubsubMessage, ReceivedMessage, SubscriptionName, TopicName};

struct Pending {
    message: PubsubMessage,
    /// Deliveries so far.
    attempts: i32,
}

struct Lease {
    message: PubsubMessage,
    attempts: i32,
    deadline: Instant,
}

#[derive(Default)]
struct State {
    backlog: VecDeque<Pending>,
    leases: HashMap<String, Lease>,
}

/// A subscription attached to one topic: a backlog of undelivered
/// messages plus the leases of delivered-but-undecided ones.
///
/// A lease ends in exactly one of: ack (message dropped), nack or
/// deadline expiry (message back to the backlog for redelivery).
pub struct Subscription {
    name: SubscriptionName,
    topic: TopicName,
    ack_deadline: Duration,
    state: Mutex<State>,
    notify: Notify,
    next_ack_id: AtomicU64,
}

impl Subscription {
    pub fn new(name: SubscriptionName, topic: TopicName, ack_deadline: Duration) -> Self {
        Self {
            name,
            topic,
            ack_deadline,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            next_ack_id: AtomicU64::new(1),
        }
    }

    pub fn name(&self) -> &SubscriptionName {
        &self.name
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!(subscription = %self.name, "subscription lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Append published messages to the backlog and wake pullers.
    pub fn enqueue(&self, messages: &[PubsubMessage]) {
        {
            let mut state = self.lock();
            state.backlog.extend(messages.iter().cloned().map(|message| Pending {
                message,
                attempts: 0,
            }));
        }
        self.notify.notify_waiters();
    }

    /// Lease up to `max` messages, waiting up to `max_wait` for the
    /// backlog to become non-empty. Returns an empty batch on timeout.
    pub async fn pull(&self, max: usize, max_wait: Duration) -> Vec<ReceivedMessage> {
        let give_up = Instant::now() + max_wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_expiry) = self.take(max);
            if !batch.is_empty() {
                return batch;
            }

            let now = Instant::now();
            if now >= give_up {
                return Vec::new();
            }
            let wake_at = next_expiry.map_or(give_up, |e| e.min(give_up));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    /// Expire overdue leases, then lease from the backlog. Also returns the
    /// earliest remaining lease deadline so an idle puller knows when to
    /// look again.
    fn take(&self, max: usize) -> (Vec<ReceivedMessage>, Option<Instant>) {
        let now = Instant::now();
        let mut state = self.lock();

        let expired: Vec<String> = state
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for ack_id in expired {
            if let Some(lease) = state.leases.remove(&ack_id) {
                tracing::debug!(subscription = %self.name, %ack_id, "ack deadline expired, redelivering");
                state.backlog.push_back(Pending {
                    message: lease.message,
                    attempts: lease.attempts,
                });
            }
        }

        let mut batch = Vec::new();
        while batch.len() < max {
            let Some(pending) = state.backlog.pop_front() else {
                break;
            };
            let ack_id = format!(
                "{}-{}",
                self.name.id(),
                self.next_ack_id.fetch_add(1, Ordering::Relaxed)
            );
            let attempts = pending.attempts + 1;
            state.leases.insert(
                ack_id.clone(),
                Lease {
                    message: pending.message.clone(),
                    attempts,
                    deadline: now + self.ack_deadline,
                },
            );
            batch.push(ReceivedMessage {
                ack_id,
                message: pending.message,
                delivery_attempt: attempts,
            });
        }

        let next_expiry = state.leases.values().map(|l| l.deadline).min();
        (batch, next_expiry)
    }

    /// Drop the leased messages for good. Unknown ids (already decided or
    /// expired and redelivered) are ignored.
    pub fn acknowledge(&self, ack_ids: &[String]) {
        let mut state = self.lock();
        for ack_id in ack_ids {
            if state.leases.remove(ack_id).is_none() {
                tracing::debug!(subscription = %self.name, %ack_id, "ack for unknown lease ignored");
            }
        }
    }

    /// Extend the given leases, or release them for redelivery when
    /// `seconds` is zero.
    pub fn modify_ack_deadline(&self, ack_ids: &[String], seconds: u32) {
        let released = {
            let mut state = self.lock();
            let deadline = Instant::now() + Duration::from_secs(u64::from(seconds));
            let mut released = false;
            for ack_id in ack_ids {
                if seconds == 0 {
                    if let Some(lease) = state.leases.remove(ack_id) {
                        state.backlog.push_back(Pending {
                            message: lease.message,
                            attempts: lease.attempts,
                        });
                        released = true;
                    }
                } else if let Some(lease) = state.leases.get_mut(ack_id) {
                    lease.deadline = deadline;
                }
            }
            released
        };
        if released {
            self.notify.notify_waiters();
        }
    }

    /// Messages not yet acknowledged: backlog plus outstanding leases.
    pub fn unacked(&self) -> usize {
        let state = self.lock();
        state.backlog.len() + state.leases.len()
    }
}
