//! Emulator: the REST surface served over an in-process `MemoryPubsub`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use pubsub_api::{
    ProjectName, PublisherStub, Schema, SchemaName, SchemaService, ServiceError, SubscriberStub,
    SubscriptionName, Topic, TopicAdmin, TopicName,
};
use topic_engine::MemoryPubsub;

use crate::error::RestError;
use crate::status::{ErrorBody, http_from_code};
use crate::wire::{
    AcknowledgeRequest, Empty, ModifyAckDeadlineRequest, PublishRequest, PublishResponse,
    PullRequest, PullResponse, SubscriptionBody, TopicBody,
};

pub fn router(engine: Arc<MemoryPubsub>) -> Router {
    Router::new()
        .route("/v1/{*path}", any(handle))
        .with_state(engine)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<MemoryPubsub>,
    shutdown: CancellationToken,
) -> Result<(), RestError> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "emulator listening");
    }
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn handle(
    State(engine): State<Arc<MemoryPubsub>>,
    method: Method,
    Path(path): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    match dispatch(&engine, &method, &path, &params, &body).await {
        Ok(json) => axum::Json(json).into_response(),
        Err(e) => {
            tracing::debug!(%method, path = %path, error = %e, "request failed");
            (http_from_code(e.code()), axum::Json(ErrorBody::from_service_error(&e))).into_response()
        }
    }
}

async fn dispatch(
    engine: &MemoryPubsub,
    method: &Method,
    path: &str,
    params: &HashMap<String, String>,
    body: &[u8],
) -> Result<serde_json::Value, ServiceError> {
    let (resource, action) = match path.rsplit_once(':') {
        Some((resource, action)) => (resource, Some(action)),
        None => (path, None),
    };
    let segments: Vec<&str> = resource.split('/').collect();

    match (method.as_str(), segments.as_slice(), action) {
        // ── schemas ──
        ("POST", ["projects", project, "schemas"], None) => {
            let schema_id = params.get("schemaId").map(String::as_str).unwrap_or_default();
            let schema: Schema = parse_body(body)?;
            let created = engine
                .create_schema(&ProjectName::of(*project), schema, schema_id)
                .await?;
            to_json(&created)
        }
        ("GET", ["projects", _, "schemas", _], None) => {
            let name: SchemaName = resource.parse()?;
            to_json(&engine.get_schema(&name).await?)
        }

        // ── topics ──
        ("GET", ["projects", _, "topics", _], None) => {
            let name: TopicName = resource.parse()?;
            to_json(&engine.get_topic(&name).await?)
        }
        ("PUT", ["projects", _, "topics", _], None) => {
            let name: TopicName = resource.parse()?;
            let body: TopicBody = parse_body_or_default(body)?;
            let topic = Topic {
                name,
                schema_settings: body.schema_settings,
            };
            to_json(&engine.create_topic(topic).await?)
        }
        ("POST", ["projects", _, "topics", _], Some("publish")) => {
            let name: TopicName = resource.parse()?;
            let request: PublishRequest = parse_body(body)?;
            let message_ids = engine.publish(&name, request.messages).await?;
            to_json(&PublishResponse { message_ids })
        }

        // ── subscriptions ──
        ("PUT", ["projects", _, "subscriptions", _], None) => {
            let name: SubscriptionName = resource.parse()?;
            let request: SubscriptionBody = parse_body(body)?;
            let ack_deadline = request
                .ack_deadline_seconds
                .map(|s| Duration::from_secs(u64::from(s)));
            engine
                .create_subscription(name.clone(), &request.topic, ack_deadline)
                .await?;
            Ok(serde_json::json!({ "name": name, "topic": request.topic }))
        }
        ("POST", ["projects", _, "subscriptions", _], Some("pull")) => {
            let name: SubscriptionName = resource.parse()?;
            let request: PullRequest = parse_body(body)?;
            let received_messages = engine.pull(&name, request.max_messages).await?;
            to_json(&PullResponse { received_messages })
        }
        ("POST", ["projects", _, "subscriptions", _], Some("acknowledge")) => {
            let name: SubscriptionName = resource.parse()?;
            let request: AcknowledgeRequest = parse_body(body)?;
            engine.acknowledge(&name, request.ack_ids).await?;
            to_json(&Empty {})
        }
        ("POST", ["projects", _, "subscriptions", _], Some("modifyAckDeadline")) => {
            let name: SubscriptionName = resource.parse()?;
            let request: ModifyAckDeadlineRequest = parse_body(body)?;
            engine
                .modify_ack_deadline(&name, request.ack_ids, request.ack_deadline_seconds)
                .await?;
            to_json(&Empty {})
        }

        _ => Err(ServiceError::not_found(format!("no route for {method} /v1/{path}"))),
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::invalid_argument(format!("malformed request body: {e}")))
}

fn parse_body_or_default<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_body(body)
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::internal(e.to_string()))
}
