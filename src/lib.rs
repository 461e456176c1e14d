//! controlgate gateway library
//!
//! Control-plane front door for an external factory automation system:
//! accepts JSON commands over HTTP, deduplicates and rate-limits them,
//! dispatches each to a pluggable executor, and republishes status
//! transitions to subscribed WebSocket clients.

pub mod auth;
pub mod config;
pub mod executors;
pub mod gateway;
pub mod model;
pub mod router;
pub mod server;
pub mod world;
