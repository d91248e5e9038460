//! ndproxy - IPv6 Neighbor Discovery proxy
//!
//! Bridges Neighbor Discovery between a WAN and a LAN interface so hosts
//! on both sides can resolve each other while sharing one prefix.
//! Messages are parsed and rebuilt in userspace over raw ICMPv6 sockets.

pub mod clock;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod port;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
