use std::sync::Arc;

use tokio::sync::RwLock;

use codec_avro::Schema as AvroSchema;
use pubsub_api::{Encoding, PubsubMessage};

use crate::error::EngineError;
use crate::subscription::Subscription;

/// Checks payloads of a schema-bound topic before they are accepted.
pub struct PayloadValidator {
    schema: AvroSchema,
    encoding: Encoding,
}

impl PayloadValidator {
    pub fn new(schema: AvroSchema, encoding: Encoding) -> Self {
        Self { schema, encoding }
    }

    fn validate(&self, data: &[u8]) -> Result<(), String> {
        match self.encoding {
            Encoding::Binary => codec_avro::decode_binary(&self.schema, data)
                .map(|_| ())
                .map_err(|e| e.to_string()),
            Encoding::Json => {
                let text = std::str::from_utf8(data).map_err(|e| format!("not utf-8: {e}"))?;
                let json: serde_json::Value =
                    serde_json::from_str(text).map_err(|e| format!("not json: {e}"))?;
                codec_avro::json_to_avro(&json, &self.schema)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            Encoding::EncodingUnspecified => Ok(()),
        }
    }
}

/// Named topic: metadata, optional payload validation and the
/// subscriptions every accepted message fans out to.
pub struct Topic {
    pub info: pubsub_api::Topic,
    validator: Option<PayloadValidator>,
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
}

impl Topic {
    pub fn new(info: pubsub_api::Topic, validator: Option<PayloadValidator>) -> Self {
        Self {
            info,
            validator,
            subscriptions: RwLock::new(Vec::new()),
        }
    }

    pub async fn attach(&self, subscription: Arc<Subscription>) {
        self.subscriptions.write().await.push(subscription);
    }

    /// Validate the whole batch, then deliver it to every attached
    /// subscription. A single bad message rejects the batch.
    pub async fn publish(&self, messages: &[PubsubMessage]) -> Result<(), EngineError> {
        if let Some(validator) = &self.validator {
            for (index, message) in messages.iter().enumerate() {
                validator
                    .validate(&message.data)
                    .map_err(|detail| EngineError::InvalidMessage { index, detail })?;
            }
        }

        let subs = self.subscriptions.read().await;
        for sub in subs.iter() {
            sub.enqueue(messages);
        }
        tracing::debug!(
            topic = %self.info.name,
            messages = messages.len(),
            subscriptions = subs.len(),
            "published batch"
        );
        Ok(())
    }
}
