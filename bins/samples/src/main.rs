mod cmd;
mod config;
mod error;

use clap::Parser;
use config::{Cli, Commands, Effective};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let eff = match Effective::new(&cli.global) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::CreateAvroSchema(args) => cmd::create_schema::run(&eff, args).await,
        Commands::PublishAvroRecords(args) => cmd::publish::run(&eff, args).await,
        Commands::Subscribe(args) => cmd::subscribe::run(&eff, args).await,
        Commands::CreateTopic(args) => cmd::admin::create_topic(&eff, args).await,
        Commands::CreateSubscription(args) => cmd::admin::create_subscription(&eff, args).await,
        Commands::Emulator(args) => cmd::emulator::run(&eff, args).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
