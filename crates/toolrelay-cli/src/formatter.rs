//! Output formatting

use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::{Value, json};
use toolrelay_client::{ClientEvent, ClientStatus, FrameBody, StreamSummary, ToolDescriptor};

use crate::cli::OutputFormat;
use crate::error::{CliError, CliResult};

/// Format and display output based on format preference
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    colored: bool,
}

impl Formatter {
    #[must_use]
    pub const fn new(format: OutputFormat, colored: bool) -> Self {
        Self { format, colored }
    }

    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Display any serializable value
    pub fn display<T: Serialize + ?Sized>(&self, value: &T) -> CliResult<()> {
        match self.format {
            OutputFormat::Human | OutputFormat::Json | OutputFormat::Table => {
                self.display_json(value, true)
            }
            OutputFormat::Compact => self.display_json(value, false),
        }
    }

    /// Display the available tools
    pub fn display_tools(&self, tools: &[ToolDescriptor]) -> CliResult<()> {
        match self.format {
            OutputFormat::Human => {
                if tools.is_empty() {
                    self.print_info("No tools available");
                    return Ok(());
                }

                self.print_header("Available Tools");
                for tool in tools {
                    self.print_tool(tool);
                }
                self.print_footer(&format!("Total: {} tools", tools.len()));
                Ok(())
            }
            OutputFormat::Table => {
                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL)
                    .apply_modifier(UTF8_ROUND_CORNERS)
                    .set_header(vec!["Name", "Description"]);
                for tool in tools {
                    table.add_row(vec![
                        tool.name.as_str(),
                        tool.description.as_deref().unwrap_or("-"),
                    ]);
                }
                println!("{table}");
                Ok(())
            }
            _ => self.display(tools),
        }
    }

    /// Display the client status snapshot
    pub fn display_status(&self, status: &ClientStatus) -> CliResult<()> {
        match self.format {
            OutputFormat::Human | OutputFormat::Table => {
                self.print_header("Client Status");
                self.print_kv("State", &status.state.to_string());
                self.print_kv(
                    "Latency",
                    &status
                        .latency_ms
                        .map_or_else(|| "-".to_string(), |ms| format!("{ms} ms")),
                );
                self.print_kv("Reconnect attempts", &status.reconnect_attempts.to_string());
                self.print_kv("Available tools", &status.active_tools.to_string());
                self.print_kv("Pending requests", &status.pending_requests.to_string());
                if let Some(last) = &status.last_tool_used {
                    self.print_kv("Last tool", &format!("{} at {}", last.tool, last.at));
                }
                if !status.tool_usage.is_empty() {
                    self.print_header("Tool Usage");
                    for usage in &status.tool_usage {
                        self.print_kv(&usage.tool, &usage.count.to_string());
                    }
                }
                Ok(())
            }
            _ => self.display(status),
        }
    }

    /// Finish a streamed invocation
    pub fn display_stream_summary(&self, summary: &StreamSummary) -> CliResult<()> {
        match self.format {
            OutputFormat::Human | OutputFormat::Table => {
                println!();
                self.print_footer(&format!("{} tokens", summary.tokens));
                Ok(())
            }
            _ => self.display(summary),
        }
    }

    /// One line per event, for `watch`
    pub fn display_event(&self, event: &ClientEvent) {
        match self.format {
            OutputFormat::Human | OutputFormat::Table => {
                let kind = event.kind().to_string();
                let detail = describe_event(event);
                if self.colored {
                    println!("{} {detail}", format!("[{kind}]").bright_cyan());
                } else {
                    println!("[{kind}] {detail}");
                }
            }
            OutputFormat::Json | OutputFormat::Compact => println!("{}", event_json(event)),
        }
    }

    /// Display an error with category and suggestions
    pub fn display_error(&self, error: &CliError) {
        let category = error.category();
        if self.colored {
            eprintln!("{} {}", format!("{category}:").bright_red().bold(), error);
        } else {
            eprintln!("{category}: {error}");
        }

        let suggestions = error.suggestions();
        if !suggestions.is_empty() {
            eprintln!();
            for suggestion in suggestions {
                if self.colored {
                    eprintln!("  {} {suggestion}", "→".bright_yellow());
                } else {
                    eprintln!("  - {suggestion}");
                }
            }
        }
    }

    // Internal formatting helpers

    fn display_json<T: Serialize + ?Sized>(&self, value: &T, pretty: bool) -> CliResult<()> {
        let json = if pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        println!("{json}");
        Ok(())
    }

    fn print_header(&self, text: &str) {
        if self.colored {
            println!("\n{}", text.bright_cyan().bold());
            println!("{}", "=".repeat(text.len()).bright_cyan());
        } else {
            println!("\n{text}");
            println!("{}", "=".repeat(text.len()));
        }
    }

    fn print_footer(&self, text: &str) {
        if self.colored {
            println!("\n{}", text.bright_black());
        } else {
            println!("\n{text}");
        }
    }

    fn print_info(&self, text: &str) {
        if self.colored {
            println!("{}", text.bright_blue());
        } else {
            println!("{text}");
        }
    }

    fn print_kv(&self, key: &str, value: &str) {
        if self.colored {
            println!("  {}: {}", key.bright_green().bold(), value);
        } else {
            println!("  {key}: {value}");
        }
    }

    fn print_tool(&self, tool: &ToolDescriptor) {
        if self.colored {
            println!("  {} {}", "•".bright_blue(), tool.name.bright_green().bold());
        } else {
            println!("  • {}", tool.name);
        }
        if let Some(description) = &tool.description {
            println!("    {description}");
        }
    }
}

/// Human summary of an event.
pub fn describe_event(event: &ClientEvent) -> String {
    match event {
        ClientEvent::Connected { endpoint } => {
            format!("connected to {}", endpoint.as_deref().unwrap_or("host"))
        }
        ClientEvent::Disconnected { code, reason } => match code {
            Some(code) => format!("closed ({code}) {reason}"),
            None => format!("closed {reason}"),
        },
        ClientEvent::Error(error) => error.to_string(),
        ClientEvent::Message(frame) => match &frame.body {
            FrameBody::Result(_) => format!("{} result", frame.request_id),
            FrameBody::Error(message) => format!("{} error: {message}", frame.request_id),
            FrameBody::Token(content) => format!("{} token {content:?}", frame.request_id),
            FrameBody::End => format!("{} end", frame.request_id),
        },
        ClientEvent::Latency(latency) => format!("{} ms", latency.as_millis()),
        ClientEvent::ToolsUpdated(tools) => {
            let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
            format!("{} tools: {}", tools.len(), names.join(", "))
        }
        ClientEvent::ToolInvoked(invocation) => format!("{} invoked", invocation.tool),
    }
}

/// JSON rendering of an event.
pub fn event_json(event: &ClientEvent) -> Value {
    let kind = event.kind().as_str();
    match event {
        ClientEvent::Connected { endpoint } => json!({"event": kind, "endpoint": endpoint}),
        ClientEvent::Disconnected { code, reason } => {
            json!({"event": kind, "code": code, "reason": reason})
        }
        ClientEvent::Error(error) => json!({"event": kind, "error": error.to_string()}),
        ClientEvent::Message(frame) => json!({"event": kind, "frame": frame.to_value()}),
        ClientEvent::Latency(latency) => {
            json!({"event": kind, "latency_ms": latency.as_secs_f64() * 1000.0})
        }
        ClientEvent::ToolsUpdated(tools) => json!({"event": kind, "tools": tools}),
        ClientEvent::ToolInvoked(invocation) => json!({"event": kind, "invocation": invocation}),
    }
}
