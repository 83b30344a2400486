//! Client runtimes built on the capability traits of `pubsub-api`.
//!
//! `Publisher` batches messages in a background task and hands back one
//! completion handle per message. `Subscriber` runs a fixed number of pull
//! streams, each dispatching deliveries to a fixed number of callback
//! workers, and sends the callback's ack/nack decisions back to the service.

pub mod error;
pub mod publisher;
pub mod subscriber;

pub use error::{PublishError, SubscriberError};
pub use publisher::{PublishHandle, Publisher, PublisherSettings};
pub use subscriber::{
    AckReplyConsumer, MessageReceiver, Subscriber, SubscriberBuilder, SubscriberSettings,
    SubscriberState,
};
