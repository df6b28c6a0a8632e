pub mod client;
pub mod config;
pub mod usage;

pub use client::OpenAiClient;
pub use config::{ConfigError, OpenAiConfig};
