use std::future::Future;
use std::pin::Pin;

use crate::error::ServiceError;
use crate::model::{PubsubMessage, ReceivedMessage, Schema, Topic};
use crate::names::{ProjectName, SchemaName, SubscriptionName, TopicName};

// ════════════════════════════════════════════════════════════════
//  Capability traits
// ════════════════════════════════════════════════════════════════
//
// Every remote operation the samples consume, one trait per service
// surface. Implementations: `topic_engine::MemoryPubsub` (in-process)
// and `pubsub_rest::RestClient` (HTTP). The client runtimes and the
// sample flows only ever see `dyn` trait objects.

/// Boxed future returned by every trait method.
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ServiceError>> + Send + 'a>>;

/// Schema registry operations.
pub trait SchemaService: Send + Sync {
    /// Register `schema` under `projects/{project}/schemas/{schema_id}`.
    ///
    /// Fails with `AlreadyExists` if the id is taken and with
    /// `InvalidArgument` if the definition does not parse.
    fn create_schema(
        &self,
        project: &ProjectName,
        schema: Schema,
        schema_id: &str,
    ) -> ServiceFuture<'_, Schema>;

    /// Look up a registered schema.
    fn get_schema(&self, name: &SchemaName) -> ServiceFuture<'_, Schema>;
}

/// Topic metadata operations.
pub trait TopicAdmin: Send + Sync {
    fn get_topic(&self, name: &TopicName) -> ServiceFuture<'_, Topic>;
}

/// Raw publish RPC. One call publishes one batch; the returned ids are in
/// the same order as `messages`.
pub trait PublisherStub: Send + Sync {
    fn publish(
        &self,
        topic: &TopicName,
        messages: Vec<PubsubMessage>,
    ) -> ServiceFuture<'_, Vec<String>>;
}

/// Raw pull-side RPCs a streaming subscriber is built from.
pub trait SubscriberStub: Send + Sync {
    /// Lease up to `max_messages` outstanding messages. May wait for
    /// messages to arrive and may return an empty batch.
    fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: usize,
    ) -> ServiceFuture<'_, Vec<ReceivedMessage>>;

    /// Terminal positive decision for the given leases. Unknown or
    /// expired ack ids are ignored.
    fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
    ) -> ServiceFuture<'_, ()>;

    /// Change the lease deadline; `0` releases the lease for immediate
    /// redelivery (negative acknowledgment).
    fn modify_ack_deadline(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
        ack_deadline_seconds: u32,
    ) -> ServiceFuture<'_, ()>;
}
