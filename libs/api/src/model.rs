use std::borrow::Cow;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::names::{SchemaName, TopicName};

// ════════════════════════════════════════════════════════════════
//  Schemas
// ════════════════════════════════════════════════════════════════

/// Definition language of a registered schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaType {
    #[default]
    TypeUnspecified,
    ProtocolBuffer,
    Avro,
}

/// A schema owned by the service. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: SchemaName,
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub definition: String,
    /// Assigned by the service on create.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision_id: String,
}

impl Schema {
    pub fn avro(name: SchemaName, definition: impl Into<String>) -> Self {
        Self {
            name,
            schema_type: SchemaType::Avro,
            definition: definition.into(),
            revision_id: String::new(),
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "name: \"{}\"", self.name)?;
        writeln!(f, "type: {:?}", self.schema_type)?;
        writeln!(f, "definition: {:?}", self.definition)?;
        if !self.revision_id.is_empty() {
            writeln!(f, "revision_id: \"{}\"", self.revision_id)?;
        }
        Ok(())
    }
}

// ════════════════════════════════════════════════════════════════
//  Topics
// ════════════════════════════════════════════════════════════════

/// Wire encoding a topic expects for schema-validated messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Encoding {
    #[default]
    EncodingUnspecified,
    Json,
    Binary,
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Encoding::EncodingUnspecified => f.write_str("ENCODING_UNSPECIFIED"),
            Encoding::Json => f.write_str("JSON"),
            Encoding::Binary => f.write_str("BINARY"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSettings {
    pub schema: SchemaName,
    #[serde(default)]
    pub encoding: Encoding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub name: TopicName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_settings: Option<SchemaSettings>,
}

impl Topic {
    pub fn new(name: TopicName) -> Self {
        Self { name, schema_settings: None }
    }

    pub fn with_schema(mut self, schema: SchemaName, encoding: Encoding) -> Self {
        self.schema_settings = Some(SchemaSettings { schema, encoding });
        self
    }

    /// Encoding from the schema settings, `EncodingUnspecified` when the
    /// topic carries none.
    pub fn encoding(&self) -> Encoding {
        self.schema_settings
            .as_ref()
            .map(|s| s.encoding)
            .unwrap_or_default()
    }
}

// ════════════════════════════════════════════════════════════════
//  Messages
// ════════════════════════════════════════════════════════════════

/// Opaque payload plus attributes. `message_id` and `publish_time` are
/// filled by the service on delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(default, with = "base64_bytes")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ordering_key: String,
}

impl PubsubMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = data.into();
        self
    }

    pub fn set_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.ordering_key = key.into();
        self
    }

    /// Payload as text, invalid UTF-8 replaced.
    pub fn data_utf8(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.data)
    }

    /// Approximate request size, used for batch thresholds.
    pub fn size(&self) -> usize {
        self.data.len()
            + self.ordering_key.len()
            + self
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// One delivery of a message on a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub ack_id: String,
    pub message: PubsubMessage,
    /// 1 on first delivery, incremented on every redelivery.
    #[serde(default)]
    pub delivery_attempt: i32,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
