//! Vitrine Protocol
//!
//! Shared types for communication between the Vitrine gateway and its
//! browser clients, and for the JSON session documents the gateway
//! persists. These types are serialized as JSON over WebSocket.

use uuid::Uuid;

pub mod server;
pub mod types;

pub use server::ServerEvent;
pub use types::*;

/// Generate a new unique ID
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
