//! ICMPv6 Neighbor Discovery wire formats
//!
//! Decoding and encoding of RFC 4861 messages and their option chains.

pub mod icmpv6;
pub mod options;
pub mod types;

pub use icmpv6::{decode, DecodeError, NdMessage};
pub use options::NdOption;
pub use types::*;
