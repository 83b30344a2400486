//! Avro plumbing for the publish and validation paths: schema parsing and
//! normalization, container reading, bare binary datums and the
//! schema-less JSON rendering.

mod codec;
mod container;
mod convert;
pub mod error;

pub use apache_avro::Schema;
pub use apache_avro::types::Value;

pub use codec::{decode_binary, encode_binary, normalize_schema, parse_schema};
pub use container::{RecordReader, write_container};
pub use convert::{json_to_avro, render_json};
pub use error::CodecError;
