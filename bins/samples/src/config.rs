use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use pubsub_api::Encoding;
use pubsub_rest::DEFAULT_ENDPOINT;
use pubsub_snippets::{PublishOptions, SubscribeOptions};

use crate::error::SamplesError;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(name = "pubsub-samples", about = "Avro schema, publish and subscribe samples")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone, Debug)]
pub struct GlobalArgs {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "config.toml", env = "PUBSUB_SAMPLES_CONFIG")]
    pub config: String,

    /// Project id
    #[arg(long, global = true, env = "GOOGLE_CLOUD_PROJECT")]
    pub project: Option<String>,

    /// Service endpoint: full URL, or host:port of an emulator
    #[arg(long, global = true, env = "PUBSUB_EMULATOR_HOST")]
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    #[arg(long, global = true, env = "PUBSUB_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register an Avro schema from an .avsc file
    CreateAvroSchema(CreateSchemaArgs),
    /// Publish the records of an Avro container file to a schema-bound topic
    PublishAvroRecords(PublishArgs),
    /// Listen on a subscription with bounded callback concurrency
    Subscribe(SubscribeArgs),
    /// Create a topic, optionally bound to a schema
    CreateTopic(CreateTopicArgs),
    /// Create a subscription on a topic
    CreateSubscription(CreateSubscriptionArgs),
    /// Serve an in-memory service on the REST surface
    Emulator(EmulatorArgs),
}

#[derive(Args, Clone, Debug)]
pub struct CreateSchemaArgs {
    #[arg(long)]
    pub schema_id: String,
    /// Avro schema document (JSON)
    #[arg(long)]
    pub avsc_file: PathBuf,
}

#[derive(Args, Clone, Debug)]
pub struct PublishArgs {
    /// Existing topic with schema settings
    #[arg(long)]
    pub topic_id: String,
    /// Existing schema the records are resolved against
    #[arg(long)]
    pub schema_id: String,
    /// Avro object container file
    #[arg(long)]
    pub avro_file: PathBuf,
    /// Bound on the wait for queued messages at shutdown
    #[arg(long)]
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct SubscribeArgs {
    #[arg(long)]
    pub subscription_id: String,
    /// Number of pull streams
    #[arg(long)]
    pub parallel_pull_count: Option<usize>,
    /// Callback workers per stream
    #[arg(long)]
    pub executor_thread_count: Option<usize>,
    /// Listening window before a graceful stop
    #[arg(long)]
    pub run_for_secs: Option<u64>,
}

#[derive(Args, Clone, Debug)]
pub struct CreateTopicArgs {
    #[arg(long)]
    pub topic_id: String,
    #[arg(long, requires = "encoding")]
    pub schema_id: Option<String>,
    #[arg(long, value_enum, requires = "schema_id")]
    pub encoding: Option<EncodingArg>,
}

#[derive(Args, Clone, Debug)]
pub struct CreateSubscriptionArgs {
    #[arg(long)]
    pub subscription_id: String,
    #[arg(long)]
    pub topic_id: String,
    #[arg(long)]
    pub ack_deadline_secs: Option<u32>,
}

#[derive(Args, Clone, Debug)]
pub struct EmulatorArgs {
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum EncodingArg {
    Json,
    Binary,
}

impl From<EncodingArg> for Encoding {
    fn from(e: EncodingArg) -> Self {
        match e {
            EncodingArg::Json => Encoding::Json,
            EncodingArg::Binary => Encoding::Binary,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub project: Option<String>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub subscribe: SubscribeConfig,
    #[serde(default)]
    pub emulator: EmulatorConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PublishConfig {
    pub shutdown_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubscribeConfig {
    pub parallel_pull_count: Option<usize>,
    pub executor_thread_count: Option<usize>,
    pub run_for_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmulatorConfig {
    pub port: Option<u16>,
    pub ack_deadline_secs: Option<u64>,
}

pub fn load_config(path: &str) -> Result<Config, SamplesError> {
    let content = std::fs::read_to_string(path).map_err(|e| SamplesError::Config {
        context: "read",
        detail: format!("'{path}': {e}"),
    })?;
    toml::from_str(&content).map_err(|e| SamplesError::Config {
        context: "parse",
        detail: format!("'{path}': {e}"),
    })
}

// ═══════════════════════════════════════════════════════════════
//  Effective: merged config
// ═══════════════════════════════════════════════════════════════

/// Settings after merging, lowest precedence first: built-in defaults,
/// config.toml, env, CLI flags. Per-command flags are applied by the
/// command itself.
#[derive(Debug)]
pub struct Effective {
    pub project: Option<String>,
    pub endpoint: String,
    pub token: Option<String>,
    pub publish: PublishOptions,
    pub subscribe: SubscribeOptions,
    pub emulator_port: u16,
    pub emulator_ack_deadline: Duration,
}

impl Effective {
    pub fn new(args: &GlobalArgs) -> Result<Self, SamplesError> {
        // A missing config file is fine; an unreadable or invalid one is not.
        let cfg = match load_config(&args.config) {
            Ok(c) => c,
            Err(e) => {
                if Path::new(&args.config).exists() {
                    return Err(e);
                }
                Config::default()
            }
        };

        let mut publish = PublishOptions::default();
        if let Some(secs) = cfg.publish.shutdown_timeout_secs {
            publish.shutdown_timeout = Duration::from_secs(secs);
        }

        let mut subscribe = SubscribeOptions::default();
        if let Some(n) = cfg.subscribe.parallel_pull_count {
            subscribe.parallel_pull_count = n;
        }
        if let Some(n) = cfg.subscribe.executor_thread_count {
            subscribe.executor_thread_count = n;
        }
        if let Some(secs) = cfg.subscribe.run_for_secs {
            subscribe.run_for = Duration::from_secs(secs);
        }

        Ok(Self {
            project: args.project.clone().or(cfg.project),
            endpoint: args
                .endpoint
                .clone()
                .or(cfg.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            token: args.token.clone(),
            publish,
            subscribe,
            emulator_port: cfg.emulator.port.unwrap_or(8085),
            emulator_ack_deadline: Duration::from_secs(cfg.emulator.ack_deadline_secs.unwrap_or(10)),
        })
    }

    pub fn project(&self) -> Result<&str, SamplesError> {
        self.project.as_deref().ok_or(SamplesError::Config {
            context: "project",
            detail: "set --project, GOOGLE_CLOUD_PROJECT or `project` in the config file".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn args(config: &str) -> GlobalArgs {
        GlobalArgs {
            config: config.to_string(),
            project: None,
            endpoint: None,
            token: None,
        }
    }

    #[test]
    fn missing_file_gives_defaults() {
        let eff = Effective::new(&args("/nonexistent/pubsub-samples.toml")).unwrap();
        assert_eq!(eff.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(eff.publish.shutdown_timeout, Duration::from_secs(60));
        assert_eq!(eff.subscribe.parallel_pull_count, 2);
        assert_eq!(eff.subscribe.executor_thread_count, 4);
        assert_eq!(eff.subscribe.run_for, Duration::from_secs(30));
        assert!(eff.project().is_err());
    }

    #[test]
    fn file_values_apply_and_flags_win() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
project = "from-file"
endpoint = "localhost:8085"

[publish]
shutdown_timeout_secs = 5

[subscribe]
parallel_pull_count = 3
run_for_secs = 10
"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let eff = Effective::new(&args(&path)).unwrap();
        assert_eq!(eff.project().unwrap(), "from-file");
        assert_eq!(eff.endpoint, "localhost:8085");
        assert_eq!(eff.publish.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(eff.subscribe.parallel_pull_count, 3);
        assert_eq!(eff.subscribe.executor_thread_count, 4);
        assert_eq!(eff.subscribe.run_for, Duration::from_secs(10));

        let mut overridden = args(&path);
        overridden.project = Some("from-flag".into());
        overridden.endpoint = Some("https://example.test".into());
        let eff = Effective::new(&overridden).unwrap();
        assert_eq!(eff.project().unwrap(), "from-flag");
        assert_eq!(eff.endpoint, "https://example.test");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "unknown_key = 1").unwrap();
        let err = Effective::new(&args(file.path().to_str().unwrap())).unwrap_err();
        assert!(matches!(err, SamplesError::Config { context: "parse", .. }));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "pubsub-samples",
            "--project",
            "p",
            "publish-avro-records",
            "--topic-id",
            "t",
            "--schema-id",
            "s",
            "--avro-file",
            "records.avro",
        ])
        .unwrap();
        assert_eq!(cli.global.project.as_deref(), Some("p"));
        match cli.command {
            Commands::PublishAvroRecords(a) => {
                assert_eq!(a.topic_id, "t");
                assert_eq!(a.avro_file, PathBuf::from("records.avro"));
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
