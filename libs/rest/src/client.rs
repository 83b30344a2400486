use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;

use pubsub_api::{
    ProjectName, PubsubMessage, PublisherStub, ReceivedMessage, Schema, SchemaName,
    SchemaService, ServiceError, ServiceFuture, SubscriberStub, SubscriptionName, Topic,
    TopicAdmin, TopicName,
};

use crate::error::RestError;
use crate::status::service_error_from_response;
use crate::wire::{
    AcknowledgeRequest, Empty, ModifyAckDeadlineRequest, PublishRequest, PublishResponse,
    PullRequest, PullResponse, SubscriptionBody, TopicBody,
};

pub const DEFAULT_ENDPOINT: &str = "https://pubsub.googleapis.com";

/// Longer than any server-side pull wait.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// HTTP/JSON implementation of every capability trait.
///
/// Works against the managed service (with a bearer token) and against
/// any emulator speaking the same REST surface, including
/// [`crate::server`].
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    /// `endpoint` is either a full URL or a bare `host:port`, which is
    /// taken as plain HTTP (the emulator convention).
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self, RestError> {
        let base_url = normalize_endpoint(endpoint)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RestError::Client(e.to_string()))?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<B, R>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<R, ServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/v1/{path}", self.base_url);
        let mut request = self.http.request(method.clone(), &url).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;
        tracing::debug!(%method, %url, status = status.as_u16(), "rest call");

        if !status.is_success() {
            return Err(service_error_from_response(status.as_u16(), &text));
        }
        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text)
            .map_err(|e| ServiceError::internal(format!("malformed response from {url}: {e}")))
    }

    /// `PUT v1/{topic}`: not part of the capability traits; used to set up
    /// an emulator.
    pub async fn create_topic(&self, topic: &Topic) -> Result<Topic, ServiceError> {
        let body = TopicBody {
            schema_settings: topic.schema_settings.clone(),
        };
        self.call(Method::PUT, &topic.name.to_string(), &[], Some(&body))
            .await
    }

    /// `PUT v1/{subscription}`.
    pub async fn create_subscription(
        &self,
        name: &SubscriptionName,
        topic: &TopicName,
        ack_deadline_seconds: Option<u32>,
    ) -> Result<(), ServiceError> {
        let body = SubscriptionBody {
            topic: topic.clone(),
            ack_deadline_seconds,
        };
        let _: serde_json::Value = self
            .call(Method::PUT, &name.to_string(), &[], Some(&body))
            .await?;
        Ok(())
    }
}

fn normalize_endpoint(endpoint: &str) -> Result<String, RestError> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(RestError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            detail: "empty".into(),
        });
    }
    let url = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };
    reqwest::Url::parse(&url).map_err(|e| RestError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        detail: e.to_string(),
    })?;
    Ok(url)
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    if e.is_timeout() {
        ServiceError::new(pubsub_api::Code::DeadlineExceeded, e.to_string())
    } else {
        ServiceError::unavailable(e.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Capability traits
// ═══════════════════════════════════════════════════════════════

impl SchemaService for RestClient {
    fn create_schema(
        &self,
        project: &ProjectName,
        schema: Schema,
        schema_id: &str,
    ) -> ServiceFuture<'_, Schema> {
        let path = format!("{project}/schemas");
        let schema_id = schema_id.to_string();
        Box::pin(async move {
            self.call(
                Method::POST,
                &path,
                &[("schemaId", schema_id.as_str())],
                Some(&schema),
            )
            .await
        })
    }

    fn get_schema(&self, name: &SchemaName) -> ServiceFuture<'_, Schema> {
        let path = name.to_string();
        Box::pin(async move { self.call::<Empty, _>(Method::GET, &path, &[], None).await })
    }
}

impl TopicAdmin for RestClient {
    fn get_topic(&self, name: &TopicName) -> ServiceFuture<'_, Topic> {
        let path = name.to_string();
        Box::pin(async move { self.call::<Empty, _>(Method::GET, &path, &[], None).await })
    }
}

impl PublisherStub for RestClient {
    fn publish(
        &self,
        topic: &TopicName,
        messages: Vec<PubsubMessage>,
    ) -> ServiceFuture<'_, Vec<String>> {
        let path = format!("{topic}:publish");
        Box::pin(async move {
            let response: PublishResponse = self
                .call(Method::POST, &path, &[], Some(&PublishRequest { messages }))
                .await?;
            Ok(response.message_ids)
        })
    }
}

impl SubscriberStub for RestClient {
    fn pull(
        &self,
        subscription: &SubscriptionName,
        max_messages: usize,
    ) -> ServiceFuture<'_, Vec<ReceivedMessage>> {
        let path = format!("{subscription}:pull");
        Box::pin(async move {
            let response: PullResponse = self
                .call(Method::POST, &path, &[], Some(&PullRequest { max_messages }))
                .await?;
            Ok(response.received_messages)
        })
    }

    fn acknowledge(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
    ) -> ServiceFuture<'_, ()> {
        let path = format!("{subscription}:acknowledge");
        Box::pin(async move {
            let _: Empty = self
                .call(Method::POST, &path, &[], Some(&AcknowledgeRequest { ack_ids }))
                .await?;
            Ok(())
        })
    }

    fn modify_ack_deadline(
        &self,
        subscription: &SubscriptionName,
        ack_ids: Vec<String>,
        ack_deadline_seconds: u32,
    ) -> ServiceFuture<'_, ()> {
        let path = format!("{subscription}:modifyAckDeadline");
        Box::pin(async move {
            let body = ModifyAckDeadlineRequest {
                ack_ids,
                ack_deadline_seconds,
            };
            let _: Empty = self.call(Method::POST, &path, &[], Some(&body)).await?;
            Ok(())
        })
    }
}
