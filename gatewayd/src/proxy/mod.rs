//! The Anthropic Messages-compatible reverse proxy: `POST /v1/messages`.

pub mod handler;
pub mod wire;

pub use handler::proxy_messages;
