//! HTTP + WebSocket surface of the session core.
//!
//! Components:
//! - `routes`: one warp filter per endpoint.
//! - `responses`: request/response payloads.
//! - `web_server`: server struct binding the composed routes.

pub mod responses;
pub mod routes;
pub mod web_server;

pub use routes::ApiContext;
pub use web_server::WebServer;
