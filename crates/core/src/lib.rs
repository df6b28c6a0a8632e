pub mod commands;
pub mod config;
pub mod llm;
pub mod session;
pub mod stats;
pub mod store;
