use std::io::Write;
use std::path::Path;
use std::time::Duration;

use codec_avro::{CodecError, RecordReader};
use pubsub_api::{Encoding, PubsubMessage, SchemaName, TopicName};
use pubsub_client::{PublishError, Publisher, PublisherSettings};

use crate::Clients;
use crate::error::SnippetError;

#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Bound on the wait for queued messages after shutdown.
    pub shutdown_timeout: Duration,
    pub publisher: PublisherSettings,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(60),
            publisher: PublisherSettings::default(),
        }
    }
}

/// Outcome of a publish run. Failures of individual messages do not stop
/// the run; they are collected here.
#[derive(Debug)]
pub struct PublishReport {
    pub topic: TopicName,
    pub encoding: Encoding,
    /// Message ids in file order.
    pub published: Vec<String>,
    /// Zero-based record index and the reason it was not published.
    pub failed: Vec<(usize, PublishError)>,
    /// Set when the publisher did not drain within the shutdown timeout.
    pub shutdown_error: Option<PublishError>,
}

impl PublishReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.shutdown_error.is_none()
    }
}

/// Publish every record of the Avro container `avro_file` to a topic that
/// carries schema settings, one message per record, encoded the way the
/// topic declares.
///
/// Records are resolved against the registered schema `schema_id`, so the
/// payloads always conform to it. Each message is awaited before the next
/// record is read. The publisher is shut down on every exit path.
pub async fn publish_avro_records(
    clients: &Clients,
    project_id: &str,
    topic_id: &str,
    schema_id: &str,
    avro_file: &Path,
    options: &PublishOptions,
    out: &mut (dyn Write + Send),
) -> Result<PublishReport, SnippetError> {
    let topic_name = TopicName::of(project_id, topic_id);
    let schema_name = SchemaName::of(project_id, schema_id);

    let schema = clients.schemas.get_schema(&schema_name).await?;
    let topic = clients.topics.get_topic(&topic_name).await?;
    let encoding = topic.encoding();
    if encoding == Encoding::EncodingUnspecified {
        return Err(SnippetError::UnsupportedEncoding {
            topic: topic_name.to_string(),
            encoding,
        });
    }

    let avro_schema =
        codec_avro::parse_schema(&schema.definition).map_err(|e| SnippetError::SchemaParse {
            origin: schema_name.to_string(),
            detail: e.to_string(),
        })?;
    let records = RecordReader::open(avro_file, &avro_schema)
        .map_err(|e| codec_error(avro_file, e))?;

    let publisher = Publisher::with_settings(
        topic_name.clone(),
        clients.publisher.clone(),
        options.publisher.clone(),
    );
    let mut report = PublishReport {
        topic: topic_name,
        encoding,
        published: Vec::new(),
        failed: Vec::new(),
        shutdown_error: None,
    };

    let outcome = publish_all(
        &publisher,
        records,
        &avro_schema,
        avro_file,
        &mut report,
        out,
    )
    .await;

    publisher.shutdown();
    if let Err(e) = publisher.await_termination(options.shutdown_timeout).await {
        tracing::warn!(topic = %report.topic, error = %e, "publisher did not terminate cleanly");
        report.shutdown_error = Some(e);
    }

    outcome?;
    tracing::info!(
        topic = %report.topic,
        published = report.published.len(),
        failed = report.failed.len(),
        "publish run finished"
    );
    Ok(report)
}

async fn publish_all<R: std::io::Read>(
    publisher: &Publisher,
    records: RecordReader<'_, R>,
    schema: &codec_avro::Schema,
    avro_file: &Path,
    report: &mut PublishReport,
    out: &mut (dyn Write + Send),
) -> Result<(), SnippetError> {
    writeln!(
        out,
        "Prepared to publish {}-encoded messages to {}",
        report.encoding, report.topic
    )
    .map_err(SnippetError::output)?;

    for (index, record) in records.enumerate() {
        let value = record.map_err(|e| codec_error(avro_file, e))?;
        let data = match report.encoding {
            Encoding::Binary => codec_avro::encode_binary(schema, value).map_err(|e| {
                SnippetError::Decode {
                    path: avro_file.to_path_buf(),
                    detail: format!("record {index}: {e}"),
                }
            })?,
            _ => codec_avro::render_json(&value).into_bytes(),
        };

        match publisher.publish(PubsubMessage::new().set_data(data)).await {
            Ok(id) => {
                writeln!(out, "Published message ID: {id}").map_err(SnippetError::output)?;
                report.published.push(id);
            }
            Err(e) => {
                tracing::warn!(topic = %report.topic, record = index, error = %e, "publish failed");
                writeln!(out, "Failed to publish record {index}: {e}")
                    .map_err(SnippetError::output)?;
                report.failed.push((index, e));
            }
        }
    }
    Ok(())
}

fn codec_error(path: &Path, e: CodecError) -> SnippetError {
    match e {
        CodecError::Io(source) => SnippetError::io(path, source),
        other => SnippetError::Decode {
            path: path.to_path_buf(),
            detail: other.to_string(),
        },
    }
}
