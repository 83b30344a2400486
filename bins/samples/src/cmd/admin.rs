use pubsub_api::{SchemaName, SubscriptionName, Topic, TopicName};

use crate::config::{CreateSubscriptionArgs, CreateTopicArgs, Effective};
use crate::error::SamplesError;

pub async fn create_topic(eff: &Effective, args: CreateTopicArgs) -> Result<(), SamplesError> {
    let project = eff.project()?;
    let mut topic = Topic::new(TopicName::of(project, &args.topic_id));
    if let (Some(schema_id), Some(encoding)) = (&args.schema_id, args.encoding) {
        topic = topic.with_schema(SchemaName::of(project, schema_id), encoding.into());
    }

    let created = super::rest_client(eff)?.create_topic(&topic).await?;
    println!("Created topic: {}", created.name);
    Ok(())
}

pub async fn create_subscription(
    eff: &Effective,
    args: CreateSubscriptionArgs,
) -> Result<(), SamplesError> {
    let project = eff.project()?;
    let name = SubscriptionName::of(project, &args.subscription_id);
    let topic = TopicName::of(project, &args.topic_id);

    super::rest_client(eff)?
        .create_subscription(&name, &topic, args.ack_deadline_secs)
        .await?;
    println!("Created subscription: {name}");
    Ok(())
}
