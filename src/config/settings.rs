use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;

use crate::error::Result;

/// Prefix for environment overrides, e.g. `CHAT_HUB_SERVER__PORT=9000`
const ENV_PREFIX: &str = "CHAT_HUB";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound messages queued per connection before senders wait
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Upper bound for one send to one connection, in milliseconds
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    /// Sends in flight per broadcast
    #[serde(default = "default_max_concurrent_sends")]
    pub max_concurrent_sends: usize,
    /// Largest accepted client message, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    /// How long shutdown waits for connections to close, in seconds
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_outbound_buffer() -> usize {
    32
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn default_max_concurrent_sends() -> usize {
    100
}

fn default_max_message_size() -> usize {
    64 * 1024
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl Settings {
    pub fn new() -> Result<Self> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("websocket.outbound_buffer", default_outbound_buffer() as i64)?
            .set_default("websocket.send_timeout_ms", default_send_timeout_ms() as i64)?
            .set_default("websocket.max_concurrent_sends", default_max_concurrent_sends() as i64)?
            .set_default("websocket.max_message_size", default_max_message_size() as i64)?
            .set_default("websocket.shutdown_timeout_secs", default_shutdown_timeout_secs() as i64)?
            .set_default("logging.format", "pretty")?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CHAT_HUB_SERVER__PORT, CHAT_HUB_WEBSOCKET__SEND_TIMEOUT_MS, ...
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        Ok(builder.build()?.try_deserialize()?)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: default_outbound_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            max_concurrent_sends: default_max_concurrent_sends(),
            max_message_size: default_max_message_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}
