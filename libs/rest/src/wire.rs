//! Request and response bodies of the REST surface.

use serde::{Deserialize, Serialize};

use pubsub_api::{PubsubMessage, ReceivedMessage, SchemaSettings, TopicName};

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishRequest {
    pub messages: Vec<PubsubMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    #[serde(default)]
    pub message_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub max_messages: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    #[serde(default)]
    pub received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub ack_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAckDeadlineRequest {
    pub ack_ids: Vec<String>,
    pub ack_deadline_seconds: u32,
}

/// Body of `PUT .../topics/{id}`. The name comes from the path.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_settings: Option<SchemaSettings>,
}

/// Body of `PUT .../subscriptions/{id}`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionBody {
    pub topic: TopicName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_deadline_seconds: Option<u32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}
