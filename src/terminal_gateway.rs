//! Terminal gateway subsystem.
//!
//! Authenticated duplex bridge between a browser WebSocket and an
//! interactive exec inside the session's container.

pub mod gateway;

pub use gateway::{TerminalGateway, TerminalQuery};
