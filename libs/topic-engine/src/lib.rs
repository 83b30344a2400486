//! In-process messaging service.
//!
//! `MemoryPubsub` implements every capability trait of `pubsub-api`
//! (schema registry, topic admin, publish, pull/ack) with the service-side
//! behavior the sample flows depend on: duplicate-id rejection, payload
//! validation against the topic schema, leases with an ack deadline and
//! redelivery on nack or expiry. Tests and local runs use it in place of
//! the managed service.

pub mod error;
mod subscription;
mod topic;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use pubsub_api::{
    Encoding, ProjectName, PubsubMessage, PublisherStub, ReceivedMessage, Schema, SchemaName,
    SchemaService, SchemaType, ServiceFuture, SubscriberStub, SubscriptionName, TopicAdmin,
    TopicName, now_ms, rfc3339_from_ms,
};

pub use error::EngineError;
pub use subscription::Subscription;
pub use topic::{PayloadValidator, Topic};

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Lease length for subscriptions created without an explicit one.
    pub default_ack_deadline: Duration,
    /// How long a pull waits for messages before returning empty.
    pub max_pull_wait: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ack_deadline: Duration::from_secs(10),
            max_pull_wait: Duration::from_millis(100),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryPubsub
// ═══════════════════════════════════════════════════════════════

/// Registry of schemas, topics and subscriptions.
pub struct MemoryPubsub {
    config: EngineConfig,
    schemas: RwLock<HashMap<SchemaName, Schema>>,
    topics: RwLock<HashMap<TopicName, Arc<Topic>>>,
    subscriptions: RwLock<HashMap<SubscriptionName, Arc<Subscription>>>,
    next_message_id: AtomicU64,
    next_revision: AtomicU64,
}

impl Default for MemoryPubsub {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl MemoryPubsub {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            schemas: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            next_message_id: AtomicU64::new(1),
            next_revision: AtomicU64::new(1),
        }
    }

    /// Create a topic. If it carries schema settings, the schema must
    /// exist and every published payload is validated against it.
    pub async fn create_topic(
        &self,
        topic: pubsub_api::Topic,
    ) -> Result<pubsub_api::Topic, EngineError> {
        let validator = match &topic.schema_settings {
            Some(settings) => {
                let schemas = self.schemas.read().await;
                let schema = schemas
                    .get(&settings.schema)
                    .ok_or_else(|| EngineError::SchemaNotFound(settings.schema.to_string()))?;
                if settings.encoding == Encoding::EncodingUnspecified {
                    return Err(EngineError::InvalidArgument(format!(
                        "topic '{}': schema settings need an encoding",
                        topic.name
                    )));
                }
                let avro = codec_avro::parse_schema(&schema.definition)
                    .map_err(|e| EngineError::InvalidSchema(e.to_string()))?;
                Some(PayloadValidator::new(avro, settings.encoding))
            }
            None => None,
        };

        let mut topics = self.topics.write().await;
        if topics.contains_key(&topic.name) {
            return Err(EngineError::AlreadyExists(topic.name.to_string()));
        }
        topics.insert(topic.name.clone(), Arc::new(Topic::new(topic.clone(), validator)));
        tracing::info!(topic = %topic.name, encoding = %topic.encoding(), "created topic");
        Ok(topic)
    }

    /// Attach a new subscription to an existing topic. Only messages
    /// published after this call are delivered to it.
    pub async fn create_subscription(
        &self,
        name: SubscriptionName,
        topic: &TopicName,
        ack_deadline: Option<Duration>,
    ) -> Result<Arc<Subscription>, EngineError> {
        let topic_arc = self
            .topics
            .read()
            .await
            .get(topic)
            .cloned()
            .ok_or_else(|| EngineError::TopicNotFound(topic.to_string()))?;

        let mut subs = self.subscriptions.write().await;
        if subs.contains_key(&name) {
            return Err(EngineError::AlreadyExists(name.to_string()));
        }
        let sub = Arc::new(Subscription::new(
            name.clone(),
            topic.clone(),
            ack_deadline.unwrap_or(self.config.default_ack_deadline),
        ));
        topic_arc.attach(sub.clone()).await;
        subs.insert(name.clone(), sub.clone());
        tracing::info!(subscription = %name, topic = %topic, "created subscription");
        Ok(sub)
    }

    pub async fn subscription(&self, name: &SubscriptionName) -> Option<Arc<Subscription>> {
        self.subscriptions.read().await.get(name).cloned()
    }

    async fn subscription_or_err(
        &self,
        name: &SubscriptionName,
    ) -> Result<Arc<Subscription>, EngineError> {
        self.subscription(name)
            .await
            .ok_or_else(|| EngineError::SubscriptionNotFound(name.to_string()))
    }
}

fn validate_schema_id(schema_id: &str) -> Result<(), EngineError> {
    let starts_with_letter = schema_id.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let allowed = schema_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_.~+%".contains(c));
    if !starts_with_letter || !allowed || schema_id.len() > 255 {
        return Err(EngineError::InvalidArgument(format!("invalid schema id '{schema_id}'")));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════
//  Capability traits
// ═══════════════════════════════════════════════════════════════

impl SchemaService for MemoryPubsub {
    fn create_schema(
        &self,
        project: &ProjectName,
        schema: Schema,
        schema_id: &str,
    ) -> ServiceFuture<'_, Schema> {
        let name = SchemaName::of(project.project(), schema_id);
        let schema_id = schema_id.to_string();
        Box::pin(async move {
            validate_schema_id(&schema_id)?;
            if schema.schema_type != SchemaType::Avro {
                return Err(EngineError::InvalidArgument(format!(
                    "unsupported schema type {:?}",
                    schema.schema_type
                ))
                .into());
            }
            codec_avro::parse_schema(&schema.definition)
                .map_err(|e| EngineError::InvalidSchema(e.to_string()))?;

            let mut schemas = self.schemas.write().await;
            if schemas.contains_key(&name) {
                return Err(EngineError::AlreadyExists(name.to_string()).into());
            }
            let stored = Schema {
                name: name.clone(),
                schema_type: SchemaType::Avro,
                definition: schema.definition,
                revision_id: format!("{:08x}", self.next_revision.fetch_add(1, Ordering::Relaxed)),
            };
            schemas.insert(name, stored.clone());
            tracing::info!(schema = %stored.name, revision = %stored.revision_id, "created schema");
            Ok(stored)
        })
    }

    fn get_schema(&self, name: &SchemaName) -> ServiceFuture<'_, Schema> {
        let name = name.clone();
        Box::pin(async move {
            self.schemas
                .read()
                .await
                .get(&name)
                .cloned()
                .ok_or_else(|| EngineError::SchemaNotFound(name.to_string()).into())
        })
    }
}

impl TopicAdmin for MemoryPubsub {
    fn get_topic(&self, name: &TopicName) -> ServiceFuture<'_, pubsub_api::Topic> {
        let name = name.clone();
        Box::pin(async move {
            self.topics
                .read()
                .await
                .get(&name)
                .map(|t| t.info.clone())
                .ok_or_else(|| EngineError::TopicNotFound(name.to_string()).into())
        })
    }
}

impl PublisherStub for MemoryPubsub {
    fn publish(
        &self,
        topic: &TopicName,
        messages: Vec<PubsubMessage>,
    ) -> ServiceFuture<'_, Vec<String>> {
        let topic = topic.clone();
        Box::pin(async move {
            let topic_arc = self
                .topics
                .read()
                .await
                .get(&topic)
                .cloned()
                .ok_or_else(|| EngineError::TopicNotFound(topic.to_string()))?;
            if messages.is_empty() {
                return Err(EngineError::InvalidArgument("publish with no messages".into()).into());
            }

            let publish_time = rfc3339_from_ms(now_ms());
            let mut ids = Vec::with_capacity(messages.len());
            let stamped: Vec<PubsubMessage> = messages
                .into_iter()
                .map(|mut m| {
                    let id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string();
                    m.message_id = id.clone();
                    m.publish_time = Some(publish_time.clone());
                    ids.push(id);
                    m
                })
                .collect();

            topic_arc.publish(&stamped).await?;
            Ok(ids)
        })
    }
}

impl SubscriberStub for MemoryPubsub {
    fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: usize,
    ) -> ServiceFuture<'_, Vec<ReceivedMessage>> {
        let name = subscription.clone();
        Box::pin(async move {
            let sub = self.subscription_or_err(&name).await?;
            Ok(sub.pull(max_messages.max(1), self.config.max_pull_wait).await)
        })
    }

    fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
    ) -> ServiceFuture<'_, ()> {
        let name = subscription.clone();
        Box::pin(async move {
            let sub = self.subscription_or_err(&name).await?;
            sub.acknowledge(&ack_ids);
            Ok(())
        })
    }

    fn modify_ack_deadline(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
        ack_deadline_seconds: u32,
    ) -> ServiceFuture<'_, ()> {
        let name = subscription.clone();
        Box::pin(async move {
            if ack_deadline_seconds > 600 {
                return Err(EngineError::InvalidArgument(format!(
                    "ack deadline {ack_deadline_seconds}s exceeds 600s"
                ))
                .into());
            }
            let sub = self.subscription_or_err(&name).await?;
            sub.modify_ack_deadline(&ack_ids, ack_deadline_seconds);
            Ok(())
        })
    }
}
