//! API Exposure modules for different protocols
//!
//! Each exposure type consumes a `ServerHost` and produces a Router for that
//! protocol: request/response over REST, events over WebSocket.

pub mod rest;
pub mod websocket;

pub use rest::RestExposure;
pub use websocket::{ChannelHub, WebSocketExposure};
