//! CLI argument parsing

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use toolrelay_client::ClientConfig;

use crate::error::CliResult;

/// Main CLI application structure
#[derive(Parser, Debug)]
#[command(
    name = "toolrelay",
    version,
    about = "Call, stream and watch tools on a remote tool host",
    long_about = "toolrelay connects to a remote tool host over WebSocket, registers the agent,\n\
                  discovers the available tools and invokes them.\n\n\
                  Configuration is read from --config (TOML, YAML or JSON), then TOOLRELAY_*\n\
                  environment variables, then command-line flags."
)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub connection: Connection,

    /// Output format
    #[arg(long, short = 'f', global = true, value_enum, default_value = "human")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Invoke a tool and print its result
    Call {
        /// Tool name
        tool: String,

        /// Parameters as a JSON object
        #[arg(long, short = 'p', default_value = "{}")]
        params: String,
    },

    /// Invoke a tool with streamed output, printing tokens as they arrive
    Stream {
        /// Tool name
        tool: String,

        /// Parameters as a JSON object
        #[arg(long, short = 'p', default_value = "{}")]
        params: String,
    },

    /// List the tools the host advertises
    Tools,

    /// Connect and print the client status
    Status,

    /// Print client events until interrupted
    Watch {
        /// Stop after this many seconds
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,
    },
}

/// Connection settings shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct Connection {
    /// Host URL
    #[arg(long, global = true, env = "TOOLRELAY_URL")]
    pub url: Option<String>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Agent name sent with every request
    #[arg(long, global = true)]
    pub agent: Option<String>,

    /// Emotion tag sent with every request
    #[arg(long, global = true)]
    pub emotion: Option<String>,

    /// Request timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout: Option<u64>,
}

impl Connection {
    /// Resolve the client configuration: file, then flags.
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(url) = &self.url {
            config.url.clone_from(url);
        }
        if let Some(agent) = &self.agent {
            config.identity.agent.clone_from(agent);
        }
        if let Some(emotion) = &self.emotion {
            config.identity.emotion.clone_from(emotion);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_request_timeout(Duration::from_millis(timeout));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable with colors
    Human,
    /// Pretty JSON
    Json,
    /// Compact JSON, one value per line
    Compact,
    /// Table format
    Table,
}

/// Log line formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text
    Text,
    /// One JSON object per line
    Json,
}
