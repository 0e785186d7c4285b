pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod language;
pub mod llm;
pub mod platform;
pub mod runs;
pub mod sandbox;
pub mod server;
pub mod shutdown;
pub mod status;
pub mod workflow;
pub mod workspace;
