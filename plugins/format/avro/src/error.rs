#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Schema document is not JSON or not a valid Avro schema.
    #[error("avro schema: {0}")]
    SchemaParse(String),

    /// Container or datum could not be read, or does not match the schema.
    #[error("avro decode: {0}")]
    Decode(String),

    /// Value cannot be written with the given schema.
    #[error("avro encode: {0}")]
    Encode(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
