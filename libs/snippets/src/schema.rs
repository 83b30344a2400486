use std::io::Write;
use std::path::Path;

use pubsub_api::{ProjectName, Schema, SchemaName};

use crate::Clients;
use crate::error::SnippetError;

/// Register the Avro schema in `avsc_file` as
/// `projects/{project_id}/schemas/{schema_id}`.
///
/// The file is parsed locally first; a document that does not parse never
/// reaches the service. What gets registered is the normalized rendering
/// of the parsed schema, not the raw file text.
pub async fn create_avro_schema(
    clients: &Clients,
    project_id: &str,
    schema_id: &str,
    avsc_file: &Path,
    out: &mut (dyn Write + Send),
) -> Result<Schema, SnippetError> {
    let source =
        std::fs::read_to_string(avsc_file).map_err(|e| SnippetError::io(avsc_file, e))?;
    let definition =
        codec_avro::normalize_schema(&source).map_err(|e| SnippetError::SchemaParse {
            origin: avsc_file.display().to_string(),
            detail: e.to_string(),
        })?;

    let project = ProjectName::of(project_id);
    let request = Schema::avro(SchemaName::of(project_id, schema_id), definition);
    let schema = clients
        .schemas
        .create_schema(&project, request, schema_id)
        .await?;

    tracing::info!(schema = %schema.name, revision = %schema.revision_id, "registered avro schema");
    write!(out, "Created a schema:\n{schema}").map_err(SnippetError::output)?;
    Ok(schema)
}
