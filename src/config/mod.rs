mod settings;

pub use settings::{LogFormat, LoggingConfig, ServerConfig, Settings, WebSocketConfig};
