//! Server module
//!
//! Hand-rolled HTTP and WebSocket transports. Neither uses a
//! general-purpose protocol library: the gateway supports exactly the
//! subset needed for JSON request/response and the RFC 6455 upgrade.

pub mod http;
pub mod ws;
