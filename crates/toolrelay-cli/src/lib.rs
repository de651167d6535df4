//! # toolrelay CLI
//!
//! Command-line front-end for a remote tool host.
//!
//! ## Usage
//!
//! ```bash
//! # Call a tool
//! toolrelay call search --params '{"query": "tokio"}'
//!
//! # Stream a tool's output token by token
//! toolrelay stream summarize --params '{"text": "..."}'
//!
//! # List tools in a table
//! toolrelay tools --format table
//!
//! # Print events for a minute
//! toolrelay watch --duration 60 --url ws://tools.internal:8765
//! ```

pub mod cli;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod logging;

use anyhow::Context as _;
use clap::Parser;

pub use cli::{Cli, Commands, Connection, LogFormat, OutputFormat};
pub use error::{CliError, CliResult, ErrorCategory};
pub use executor::CommandExecutor;
pub use formatter::Formatter;

/// Parse arguments and run the selected command.
///
/// Command failures are printed with their category and suggestions and
/// terminate the process with status 1.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format).context("failed to install log subscriber")?;

    let executor = CommandExecutor::new(Formatter::new(cli.format, !cli.no_color));
    if let Err(e) = executor.execute(&cli.connection, cli.command).await {
        executor.display_error(&e);
        std::process::exit(1);
    }
    Ok(())
}
