//! Helpline client
//!
//! Client-side state for the user chat widget and the operator console:
//! the current-session context, the operator presence cache, a reconnecting
//! driver for the `/chat` channel and an HTTP client for message history.

pub mod console;
pub mod context;
pub mod error;
pub mod history;
pub mod presence;
pub mod reconnect;
pub mod transport;

pub use console::OperatorConsole;
pub use context::ClientSessionContext;
pub use error::ClientError;
pub use history::{HistoryClient, SessionListing};
pub use presence::{ClientPresenceCache, OpenSession, PresenceUpdate, SessionEntry};
pub use reconnect::{ChatDriver, ConnectionStatus, DriverEvent, ReconnectPolicy};
pub use transport::{Connector, Transport, WsConnector, WsTransport};
