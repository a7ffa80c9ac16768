//! cadencectl: Command-line interface for Cadence pending queues.
//!
//! Appends notifications to the shared Redis lists that Cadence daemons
//! drain, and reports how many are still waiting.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// Command-line interface for Cadence pending queues.
#[derive(Parser)]
#[command(name = "cadencectl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Redis connection URL
    #[arg(short, long, env = "CADENCE_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    redis_url: String,

    /// Prefix of the per-channel list keys
    #[arg(long, env = "CADENCE_KEY_PREFIX", default_value = cadence::storage::DEFAULT_KEY_PREFIX)]
    key_prefix: String,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

/// Identifies a dispatch channel by notifier id and optional sub-channel.
#[derive(clap::Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Notifier id
    notifier: String,
    /// Sub-channel of the notifier
    #[arg(short, long)]
    channel: Option<String>,
}

impl ChannelArgs {
    pub fn channel_id(&self) -> String {
        let mut config = cadence::NotifierConfig::new(self.notifier.clone());
        config.channel = self.channel.clone();
        config.list_name()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append a notification payload to a channel
    Push {
        #[command(flatten)]
        target: ChannelArgs,
        /// JSON payload (or use --file, or stdin)
        payload: Option<String>,
        /// Read payload from file
        #[arg(short, long)]
        file: Option<String>,
    },
    /// Show how many notifications are waiting on a channel
    Depth {
        #[command(flatten)]
        target: ChannelArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let store = cadence::storage::RedisStore::connect(&cli.redis_url, cli.key_prefix.clone())
        .await
        .with_context(|| format!("failed to connect to {}", cli.redis_url))?;

    match cli.command {
        Commands::Push {
            target,
            payload,
            file,
        } => {
            commands::push::run(&store, &target.channel_id(), payload, file, cli.output).await?;
        }
        Commands::Depth { target } => {
            commands::depth::run(&store, &target.channel_id(), cli.output).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_args() {
        let cli = Cli::try_parse_from([
            "cadencectl",
            "--output",
            "json",
            "push",
            "ops",
            "--channel",
            "mail",
            r#"{"to":"oncall"}"#,
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        match cli.command {
            Commands::Push { target, payload, .. } => {
                assert_eq!(target.channel_id(), "ops_mail");
                assert_eq!(payload.as_deref(), Some(r#"{"to":"oncall"}"#));
            }
            Commands::Depth { .. } => panic!("expected push"),
        }
    }

    #[test]
    fn test_depth_without_channel() {
        let cli = Cli::try_parse_from(["cadencectl", "depth", "ops"]).unwrap();
        match cli.command {
            Commands::Depth { target } => assert_eq!(target.channel_id(), "ops"),
            Commands::Push { .. } => panic!("expected depth"),
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
