//! Command execution using toolrelay-client

use std::io::Write as _;
use std::time::Duration;

use serde_json::Value;
use toolrelay_client::{Client, ClientConfig, EventKind, WebSocketTransport};
use tracing::debug;

use crate::cli::{Commands, Connection};
use crate::error::{CliError, CliResult};
use crate::formatter::Formatter;

/// Execute CLI commands
#[derive(Debug)]
pub struct CommandExecutor {
    pub formatter: Formatter,
}

impl CommandExecutor {
    #[must_use]
    pub const fn new(formatter: Formatter) -> Self {
        Self { formatter }
    }

    /// Display an error with rich formatting
    pub fn display_error(&self, error: &CliError) {
        self.formatter.display_error(error);
    }

    /// Execute a command
    pub async fn execute(&self, connection: &Connection, command: Commands) -> CliResult<()> {
        let config = connection.client_config()?;
        debug!(url = %config.url, agent = %config.identity.agent, "resolved configuration");

        match command {
            Commands::Call { tool, params } => self.call(config, &tool, &params).await,
            Commands::Stream { tool, params } => self.stream(config, &tool, &params).await,
            Commands::Tools => self.tools(config).await,
            Commands::Status => self.status(config).await,
            Commands::Watch { duration } => self.watch(config, duration.map(Duration::from_secs)).await,
        }
    }

    async fn call(&self, config: ClientConfig, tool: &str, params: &str) -> CliResult<()> {
        let params = parse_params(params)?;
        let client = Client::websocket(config)?;
        let result = client.invoke(tool, params).await;
        client.disconnect().await;
        self.formatter.display(&result?)
    }

    async fn stream(&self, config: ClientConfig, tool: &str, params: &str) -> CliResult<()> {
        let params = parse_params(params)?;
        let client = Client::websocket(config)?;
        let result = client
            .invoke_stream(tool, params, |token| {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(token.as_bytes());
                let _ = stdout.flush();
            })
            .await;
        client.disconnect().await;
        self.formatter.display_stream_summary(&result?)
    }

    async fn tools(&self, config: ClientConfig) -> CliResult<()> {
        let client = connect(config).await?;
        let tools = client.available_tools();
        client.disconnect().await;
        self.formatter.display_tools(&tools)
    }

    async fn status(&self, config: ClientConfig) -> CliResult<()> {
        let client = connect(config).await?;
        // Give the first heartbeat a chance to report latency.
        if client.config().heartbeat.enabled {
            tokio::time::sleep(client.config().heartbeat.interval().min(Duration::from_secs(2))).await;
        }
        let status = client.status();
        client.disconnect().await;
        self.formatter.display_status(&status)
    }

    async fn watch(&self, config: ClientConfig, duration: Option<Duration>) -> CliResult<()> {
        let client = Client::websocket(config)?;
        let formatter = self.formatter;
        for kind in EventKind::ALL {
            client.on(kind, move |event| formatter.display_event(event));
        }
        client.connect().await?;

        let interrupted = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        match duration {
            Some(duration) => {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {}
                    () = interrupted => {}
                }
            }
            None => interrupted.await,
        }

        client.disconnect().await;
        Ok(())
    }
}

async fn connect(config: ClientConfig) -> CliResult<Client<WebSocketTransport>> {
    let client = Client::websocket(config)?;
    client.connect().await?;
    Ok(client)
}

/// Parse `--params`: a JSON object, or empty for `{}`.
pub fn parse_params(raw: &str) -> CliResult<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| CliError::InvalidArguments(format!("Invalid JSON parameters: {e}")))?;
    if !value.is_object() {
        return Err(CliError::InvalidArguments(
            "Parameters must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}
