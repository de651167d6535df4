//! Client configuration.
//!
//! Durations are stored as millisecond integers so configuration files stay
//! plain TOML/YAML/JSON. Accessors return [`Duration`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment prefix for configuration overrides.
pub const ENV_PREFIX: &str = "TOOLRELAY";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Who the client says it is on every frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Agent name, also used as `client_id` during registration
    pub agent: String,
    /// Emotional context tag attached to every frame
    pub emotion: String,
    /// Capabilities announced during registration
    pub capabilities: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            agent: "toolrelay".to_string(),
            emotion: "neutral".to_string(),
            capabilities: vec!["tools".to_string(), "streaming".to_string()],
        }
    }
}

/// Automatic reconnection after an unexpected close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether to reconnect at all
    pub enabled: bool,
    /// Fixed delay before each attempt
    pub delay_ms: u64,
    /// Attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: 3_000,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Reconnection switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before each attempt.
    pub const fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Set the delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay_ms = duration_millis(delay);
        self
    }

    /// Set the attempt bound.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Liveness probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Whether to probe at all
    pub enabled: bool,
    /// Time between probes
    pub interval_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 30_000,
        }
    }
}

impl HeartbeatConfig {
    /// Time between probes.
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Registration and tool discovery run after every transport open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Whether to run the handshake
    pub enabled: bool,
    /// Tool invoked to register this client
    pub register_tool: String,
    /// Tool invoked to list available tools
    pub list_tools_tool: String,
    /// Deadline for each handshake request
    pub timeout_ms: u64,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            register_tool: "register_client".to_string(),
            list_tools_tool: "list_tools".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl HandshakeConfig {
    /// Deadline for each handshake request.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote host endpoint
    pub url: String,
    /// Caller identity
    pub identity: IdentityConfig,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
    /// Heartbeat policy
    pub heartbeat: HeartbeatConfig,
    /// Handshake settings
    pub handshake: HandshakeConfig,
    /// Default deadline for caller requests; `None` waits indefinitely
    pub request_timeout_ms: Option<u64>,
    /// Largest frame accepted by the WebSocket transport
    pub max_message_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765".to_string(),
            identity: IdentityConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            handshake: HandshakeConfig::default(),
            request_timeout_ms: None,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ClientConfig {
    /// Default configuration for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set agent and emotion.
    pub fn with_identity(mut self, agent: impl Into<String>, emotion: impl Into<String>) -> Self {
        self.identity.agent = agent.into();
        self.identity.emotion = emotion.into();
        self
    }

    /// Set the capabilities announced at registration.
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identity.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the reconnection policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat.enabled = true;
        self.heartbeat.interval_ms = duration_millis(interval);
        self
    }

    /// Turn heartbeats off.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat.enabled = false;
        self
    }

    /// Replace the handshake settings.
    pub fn with_handshake(mut self, handshake: HandshakeConfig) -> Self {
        self.handshake = handshake;
        self
    }

    /// Skip registration and tool discovery.
    pub fn without_handshake(mut self) -> Self {
        self.handshake.enabled = false;
        self
    }

    /// Apply a default deadline to every caller request.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = Some(duration_millis(timeout));
        self
    }

    /// Set the WebSocket message size limit.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Default deadline for caller requests.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() {
            return Err(ConfigError::Invalid("url must not be empty".into()));
        }
        if self.heartbeat.enabled && self.heartbeat.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat.interval_ms must be greater than zero".into(),
            ));
        }
        if self.reconnect.enabled && self.reconnect.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "reconnect.max_attempts must be greater than zero when reconnect is enabled"
                    .into(),
            ));
        }
        if self.handshake.enabled
            && (self.handshake.register_tool.is_empty() || self.handshake.list_tools_tool.is_empty())
        {
            return Err(ConfigError::Invalid(
                "handshake tool names must not be empty".into(),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format is picked from the extension. Environment variables with
    /// the `TOOLRELAY_` prefix override file settings, with `__` separating
    /// nested keys (`TOOLRELAY_RECONNECT__DELAY_MS=500`).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix.
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, File, FileFormat};

        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                config::Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let loaded: Self = config.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
