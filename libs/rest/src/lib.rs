//! REST/JSON transport for the capability traits.
//!
//! `RestClient` talks to the managed service or an emulator. `server`
//! exposes a `MemoryPubsub` on the same surface, so the samples can run
//! end to end against a local process.

mod client;
pub mod error;
pub mod server;
pub mod status;
mod wire;

pub use client::{DEFAULT_ENDPOINT, RestClient};
pub use error::RestError;
