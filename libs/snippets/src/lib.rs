//! The three sample flows: register an Avro schema, publish the records
//! of an Avro container file to a schema-bound topic, and consume a
//! subscription with bounded callback concurrency.
//!
//! Each flow talks to the service only through the capability traits
//! bundled in [`Clients`], so the same code runs against the REST client
//! and the in-memory engine.

pub mod error;
mod publish;
mod schema;
mod subscribe;

use std::sync::Arc;

use pubsub_api::{PublisherStub, SchemaService, SubscriberStub, TopicAdmin};

pub use error::SnippetError;
pub use publish::{PublishOptions, PublishReport, publish_avro_records};
pub use schema::create_avro_schema;
pub use subscribe::{PrintingReceiver, SubscribeOptions, subscribe_with_concurrency_control};

/// Service handles a flow needs. Dropped at the end of the flow's scope.
#[derive(Clone)]
pub struct Clients {
    pub schemas: Arc<dyn SchemaService>,
    pub topics: Arc<dyn TopicAdmin>,
    pub publisher: Arc<dyn PublisherStub>,
    pub subscriber: Arc<dyn SubscriberStub>,
}

impl Clients {
    /// All four surfaces served by one backend.
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: SchemaService + TopicAdmin + PublisherStub + SubscriberStub + 'static,
    {
        Self {
            schemas: backend.clone(),
            topics: backend.clone(),
            publisher: backend.clone(),
            subscriber: backend,
        }
    }
}
