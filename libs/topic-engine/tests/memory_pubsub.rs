use std::time::Duration;

use pubsub_api::{
    Code, Encoding, ProjectName, PubsubMessage, PublisherStub, Schema, SchemaName, SchemaService,
    SubscriberStub, SubscriptionName, Topic, TopicAdmin, TopicName,
};
use topic_engine::{EngineConfig, MemoryPubsub};

const STATE_SCHEMA: &str = r#"{
    "type": "record",
    "name": "State",
    "fields": [
        {"name": "name", "type": "string"},
        {"name": "post_abbr", "type": "string"}
    ]
}"#;

fn engine() -> MemoryPubsub {
    MemoryPubsub::new(EngineConfig {
        default_ack_deadline: Duration::from_secs(10),
        max_pull_wait: Duration::from_millis(20),
    })
}

async fn with_schema_topic(engine: &MemoryPubsub, encoding: Encoding) -> TopicName {
    let project = ProjectName::of("demo");
    engine
        .create_schema(&project, Schema::avro(SchemaName::of("demo", "s"), STATE_SCHEMA), "state")
        .await
        .unwrap();
    let topic = TopicName::of("demo", "states");
    engine
        .create_topic(Topic::new(topic.clone()).with_schema(SchemaName::of("demo", "state"), encoding))
        .await
        .unwrap();
    topic
}

#[tokio::test]
async fn create_schema_assigns_name_and_revision() {
    let engine = engine();
    let created = engine
        .create_schema(
            &ProjectName::of("demo"),
            Schema::avro(SchemaName::of("demo", "ignored"), STATE_SCHEMA),
            "s1",
        )
        .await
        .unwrap();

    assert_eq!(created.name.to_string(), "projects/demo/schemas/s1");
    assert!(!created.revision_id.is_empty());

    let fetched = engine.get_schema(&created.name).await.unwrap();
    assert_eq!(fetched.definition, STATE_SCHEMA);
}

#[tokio::test]
async fn duplicate_schema_id_is_already_exists() {
    let engine = engine();
    let project = ProjectName::of("demo");
    let schema = Schema::avro(SchemaName::of("demo", "x"), STATE_SCHEMA);
    engine.create_schema(&project, schema.clone(), "dup").await.unwrap();

    let err = engine.create_schema(&project, schema, "dup").await.unwrap_err();
    assert_eq!(err.code(), Code::AlreadyExists);
}

#[tokio::test]
async fn malformed_definition_is_invalid_argument() {
    let engine = engine();
    let err = engine
        .create_schema(
            &ProjectName::of("demo"),
            Schema::avro(SchemaName::of("demo", "x"), "{not json"),
            "broken",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn schema_id_must_start_with_letter() {
    let engine = engine();
    let err = engine
        .create_schema(
            &ProjectName::of("demo"),
            Schema::avro(SchemaName::of("demo", "x"), STATE_SCHEMA),
            "1abc",
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn unknown_lookups_are_not_found() {
    let engine = engine();
    let schema_err = engine.get_schema(&SchemaName::of("demo", "nope")).await.unwrap_err();
    assert_eq!(schema_err.code(), Code::NotFound);

    let topic_err = engine.get_topic(&TopicName::of("demo", "nope")).await.unwrap_err();
    assert_eq!(topic_err.code(), Code::NotFound);

    let pull_err = engine.pull(&SubscriptionName::of("demo", "nope"), 1).await.unwrap_err();
    assert_eq!(pull_err.code(), Code::NotFound);
}

#[tokio::test]
async fn topic_with_unknown_schema_is_rejected() {
    let engine = engine();
    let err = engine
        .create_topic(
            Topic::new(TopicName::of("demo", "t"))
                .with_schema(SchemaName::of("demo", "missing"), Encoding::Json),
        )
        .await
        .unwrap_err();
    assert_eq!(pubsub_api::ServiceError::from(err).code(), Code::NotFound);
}

#[tokio::test]
async fn get_topic_reports_encoding() {
    let engine = engine();
    let topic = with_schema_topic(&engine, Encoding::Binary).await;
    let info = engine.get_topic(&topic).await.unwrap();
    assert_eq!(info.encoding(), Encoding::Binary);
}

#[tokio::test]
async fn json_topic_accepts_matching_and_rejects_mismatched_payloads() {
    let engine = engine();
    let topic = with_schema_topic(&engine, Encoding::Json).await;

    let ids = engine
        .publish(
            &topic,
            vec![PubsubMessage::new().set_data(r#"{"name": "Alaska", "post_abbr": "AK"}"#)],
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);

    let err = engine
        .publish(&topic, vec![PubsubMessage::new().set_data(r#"{"name": 5}"#)])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn binary_topic_validates_datums() {
    let engine = engine();
    let topic = with_schema_topic(&engine, Encoding::Binary).await;

    let schema = codec_avro::parse_schema(STATE_SCHEMA).unwrap();
    let record = codec_avro::json_to_avro(
        &serde_json::json!({"name": "Ohio", "post_abbr": "OH"}),
        &schema,
    )
    .unwrap();
    let datum = codec_avro::encode_binary(&schema, record).unwrap();

    engine
        .publish(&topic, vec![PubsubMessage::new().set_data(datum)])
        .await
        .unwrap();

    let err = engine
        .publish(&topic, vec![PubsubMessage::new().set_data(vec![0xff, 0xff, 0xff])])
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn published_messages_fan_out_and_ack() {
    let engine = engine();
    let topic = TopicName::of("demo", "plain");
    engine.create_topic(Topic::new(topic.clone())).await.unwrap();

    let a = SubscriptionName::of("demo", "a");
    let b = SubscriptionName::of("demo", "b");
    engine.create_subscription(a.clone(), &topic, None).await.unwrap();
    engine.create_subscription(b.clone(), &topic, None).await.unwrap();

    let ids = engine
        .publish(
            &topic,
            vec![
                PubsubMessage::new().set_data("one").set_attribute("k", "v"),
                PubsubMessage::new().set_data("two"),
            ],
        )
        .await
        .unwrap();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    for sub in [&a, &b] {
        let batch = engine.pull(sub, 10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].message.message_id, ids[0]);
        assert_eq!(batch[0].message.attributes.get("k").map(String::as_str), Some("v"));
        assert!(batch[0].message.publish_time.is_some());

        let ack_ids = batch.into_iter().map(|m| m.ack_id).collect();
        engine.acknowledge(sub, ack_ids).await.unwrap();
        assert_eq!(engine.subscription(sub).await.unwrap().unacked(), 0);
    }
}

#[tokio::test]
async fn nack_redelivers_with_higher_attempt() {
    let engine = engine();
    let topic = TopicName::of("demo", "plain");
    engine.create_topic(Topic::new(topic.clone())).await.unwrap();
    let sub = SubscriptionName::of("demo", "s");
    engine.create_subscription(sub.clone(), &topic, None).await.unwrap();

    engine
        .publish(&topic, vec![PubsubMessage::new().set_data("retry me")])
        .await
        .unwrap();

    let first = engine.pull(&sub, 1).await.unwrap();
    engine
        .modify_ack_deadline(&sub, vec![first[0].ack_id.clone()], 0)
        .await
        .unwrap();

    let second = engine.pull(&sub, 1).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].delivery_attempt, 2);
    assert_eq!(second[0].message.data, b"retry me");
}

#[tokio::test]
async fn subscription_created_after_publish_sees_nothing() {
    let engine = engine();
    let topic = TopicName::of("demo", "plain");
    engine.create_topic(Topic::new(topic.clone())).await.unwrap();
    engine
        .publish(&topic, vec![PubsubMessage::new().set_data("early")])
        .await
        .unwrap();

    let sub = SubscriptionName::of("demo", "late");
    engine.create_subscription(sub.clone(), &topic, None).await.unwrap();
    assert!(engine.pull(&sub, 10).await.unwrap().is_empty());
}
