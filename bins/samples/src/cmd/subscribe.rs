use std::time::Duration;

use pubsub_snippets::PrintingReceiver;

use crate::config::{Effective, SubscribeArgs};
use crate::error::SamplesError;

pub async fn run(eff: &Effective, args: SubscribeArgs) -> Result<(), SamplesError> {
    let clients = super::clients(eff)?;
    let mut options = eff.subscribe.clone();
    if let Some(n) = args.parallel_pull_count {
        options.parallel_pull_count = n;
    }
    if let Some(n) = args.executor_thread_count {
        options.executor_thread_count = n;
    }
    if let Some(secs) = args.run_for_secs {
        options.run_for = Duration::from_secs(secs);
    }

    let mut out = std::io::stdout();
    pubsub_snippets::subscribe_with_concurrency_control(
        &clients,
        eff.project()?,
        &args.subscription_id,
        &options,
        PrintingReceiver::stdout(),
        &mut out,
    )
    .await?;
    Ok(())
}
