//! Helpline API Library
//!
//! Real-time support chat: an AI auto-responder, the end user and human
//! operators share one conversation over the `/chat` WebSocket channel.

pub mod ai;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
