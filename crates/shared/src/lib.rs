//! Helpline Shared Types and Utilities
//!
//! This crate contains the identifiers, domain records and wire protocol shared
//! by the chat coordinator and its clients.

pub mod db;
pub mod error;
pub mod protocol;
pub mod types;

pub use db::*;
pub use error::*;
pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
