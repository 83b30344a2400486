pub mod admin;
pub mod create_schema;
pub mod emulator;
pub mod publish;
pub mod subscribe;

use std::sync::Arc;

use pubsub_rest::RestClient;
use pubsub_snippets::Clients;

use crate::config::Effective;
use crate::error::SamplesError;

fn rest_client(eff: &Effective) -> Result<Arc<RestClient>, SamplesError> {
    let client = RestClient::new(&eff.endpoint, eff.token.clone())?;
    tracing::debug!(endpoint = %client.base_url(), "using rest endpoint");
    Ok(Arc::new(client))
}

fn clients(eff: &Effective) -> Result<Clients, SamplesError> {
    Ok(Clients::from_backend(rest_client(eff)?))
}
