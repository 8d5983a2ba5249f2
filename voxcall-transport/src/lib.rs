//! Voxcall Transport
//!
//! Wire protocol and connection handling for the conversation backend.
//! The protocol is newline-delimited JSON over one persistent connection;
//! see `events` for the frame shapes and `channel` for the IO tasks.

pub mod channel;
pub mod error;
pub mod events;

pub use channel::{InboundFrame, TransportChannel};
pub use error::{Result, TransportError};
pub use events::{decode_server_line, ClientEvent, ServerEvent};
