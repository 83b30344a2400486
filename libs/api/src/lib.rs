//! Resource names, data model and capability traits shared by every crate
//! in the workspace.
//!
//! This crate has no runtime dependency: implementations of the traits
//! (in-memory engine, REST client) and the client runtimes built on top of
//! them live in their own crates.

pub mod error;
pub mod model;
pub mod names;
pub mod stub;
mod util;

pub use error::{Code, ServiceError};
pub use model::{
    Encoding, PubsubMessage, ReceivedMessage, Schema, SchemaSettings, SchemaType, Topic,
};
pub use names::{ProjectName, SchemaName, SubscriptionName, TopicName};
pub use stub::{PublisherStub, SchemaService, ServiceFuture, SubscriberStub, TopicAdmin};
pub use util::{now_ms, rfc3339_from_ms};
