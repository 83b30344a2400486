use std::time::Duration;

use crate::config::{Effective, PublishArgs};
use crate::error::SamplesError;

pub async fn run(eff: &Effective, args: PublishArgs) -> Result<(), SamplesError> {
    let clients = super::clients(eff)?;
    let mut options = eff.publish.clone();
    if let Some(secs) = args.shutdown_timeout_secs {
        options.shutdown_timeout = Duration::from_secs(secs);
    }

    let mut out = std::io::stdout();
    let report = pubsub_snippets::publish_avro_records(
        &clients,
        eff.project()?,
        &args.topic_id,
        &args.schema_id,
        &args.avro_file,
        &options,
        &mut out,
    )
    .await?;

    if !report.failed.is_empty() {
        return Err(SamplesError::IncompletePublish {
            failed: report.failed.len(),
            total: report.failed.len() + report.published.len(),
        });
    }
    if let Some(e) = report.shutdown_error {
        return Err(SamplesError::Shutdown(e.to_string()));
    }
    Ok(())
}
