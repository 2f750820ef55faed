//! WebSocket support for the `/chat` channel
//!
//! # Architecture
//!
//! - **Connection**: an authenticated endpoint with a bounded outbound queue
//! - **Room**: session-based pub/sub plus the admin audience
//! - **State**: table of live endpoints shared across handlers
//! - **Handler**: Axum WebSocket route handler
//!
//! Event types live in `helpline_shared::protocol` so the client crate can
//! speak the same wire format.

pub mod connection;
pub mod handler;
pub mod room;
pub mod state;

pub use connection::{Connection, DeliveryError};
pub use handler::ws_handler;
pub use room::{Audience, Delivery, RoomRegistry};
pub use state::{WebSocketState, WebSocketStats};
