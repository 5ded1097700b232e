//! Netdecoy - a multi-protocol network decoy
//!
//! Binds a set of TCP ports, each impersonating a different service:
//! - HTTP: serves a static page and captures the request bytes
//! - Banner: greets like SSH/Telnet and captures what the peer sends back
//! - Generic: raw TCP capture with optional echo
//!
//! Every byte exchanged with a peer becomes a timestamped JSON-lines record.
//! The decoy never provides real service functionality; it exists to observe
//! unsolicited traffic without letting any single peer disturb the rest.

pub mod config;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod log;
pub mod supervisor;
