use crate::config::{CreateSchemaArgs, Effective};
use crate::error::SamplesError;

pub async fn run(eff: &Effective, args: CreateSchemaArgs) -> Result<(), SamplesError> {
    let clients = super::clients(eff)?;
    let mut out = std::io::stdout();
    pubsub_snippets::create_avro_schema(
        &clients,
        eff.project()?,
        &args.schema_id,
        &args.avsc_file,
        &mut out,
    )
    .await?;
    Ok(())
}
