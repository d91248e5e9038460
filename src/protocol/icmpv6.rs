//! ICMPv6 Neighbor Discovery messages - RFC 4861
//!
//! Buffers handled here start at the ICMPv6 header; the IPv6 header is
//! stripped by the raw socket. The checksum field is written as zero
//! because the kernel computes it for raw ICMPv6 sockets.

use super::options::{
    parse_options, rewrite_link_addr, source_link_addr, target_link_addr, write_options, NdOption,
    OPT_SOURCE_LINK_ADDR,
};
use super::LinkAddr;
use std::fmt;
use std::net::Ipv6Addr;

/// Type, code, checksum
pub const HEADER_SIZE: usize = 4;

/// Router Solicitation: header + reserved
pub const RS_MIN_SIZE: usize = 8;
/// Router Advertisement: header + hop limit/flags/lifetime + two timers
pub const RA_MIN_SIZE: usize = 16;
/// Neighbor Solicitation/Advertisement: header + reserved/flags + target
pub const NDP_MSG_SIZE: usize = 24;

/// Managed address configuration
pub const RA_FLAG_MANAGED: u8 = 0x80;
/// Other configuration
pub const RA_FLAG_OTHER: u8 = 0x40;
/// Proxied advertisement (RFC 4389)
pub const RA_FLAG_PROXY: u8 = 0x04;

const NA_FLAG_ROUTER: u8 = 0x80;
const NA_FLAG_SOLICITED: u8 = 0x40;
const NA_FLAG_OVERRIDE: u8 = 0x20;

/// ICMPv6 message types handled by the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Icmpv6Type {
    RouterSolicitation = 133,
    RouterAdvertisement = 134,
    NeighborSolicitation = 135,
    NeighborAdvertisement = 136,
}

impl Icmpv6Type {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            133 => Some(Icmpv6Type::RouterSolicitation),
            134 => Some(Icmpv6Type::RouterAdvertisement),
            135 => Some(Icmpv6Type::NeighborSolicitation),
            136 => Some(Icmpv6Type::NeighborAdvertisement),
            _ => None,
        }
    }

    fn min_size(self) -> usize {
        match self {
            Icmpv6Type::RouterSolicitation => RS_MIN_SIZE,
            Icmpv6Type::RouterAdvertisement => RA_MIN_SIZE,
            Icmpv6Type::NeighborSolicitation | Icmpv6Type::NeighborAdvertisement => NDP_MSG_SIZE,
        }
    }
}

/// Reasons a received ICMPv6 payload is rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("empty packet")]
    Empty,
    #[error("type {msg_type} packet too short: {len} bytes, need {min}")]
    Truncated { msg_type: u8, len: usize, min: usize },
    #[error("type {msg_type} packet with non-zero code {code}")]
    BadCode { msg_type: u8, code: u8 },
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
}

fn read_addr(buf: &[u8]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&buf[..16]);
    Ipv6Addr::from(octets)
}

fn header(msg_type: Icmpv6Type, capacity: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(capacity);
    buf.extend_from_slice(&[msg_type as u8, 0, 0, 0]);
    buf
}

/// Router Solicitation message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterSolicitation {
    pub options: Vec<NdOption>,
}

impl RouterSolicitation {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            options: parse_options(&body[4..])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterSolicitation, RS_MIN_SIZE + 8);
        buf.extend_from_slice(&[0; 4]);
        write_options(&self.options, &mut buf);
        buf
    }

    pub fn source_link_addr(&self) -> Option<&LinkAddr> {
        source_link_addr(&self.options)
    }
}

/// Router Advertisement message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RouterAdvertisement {
    pub cur_hop_limit: u8,
    /// M, O, H, Prf and P bits as they appear on the wire
    pub flags: u8,
    pub router_lifetime: u16,
    pub reachable_time: u32,
    pub retrans_timer: u32,
    pub options: Vec<NdOption>,
}

impl RouterAdvertisement {
    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            cur_hop_limit: body[0],
            flags: body[1],
            router_lifetime: u16::from_be_bytes([body[2], body[3]]),
            reachable_time: u32::from_be_bytes([body[4], body[5], body[6], body[7]]),
            retrans_timer: u32::from_be_bytes([body[8], body[9], body[10], body[11]]),
            options: parse_options(&body[12..])?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::RouterAdvertisement, RA_MIN_SIZE + 32);
        buf.push(self.cur_hop_limit);
        buf.push(self.flags);
        buf.extend_from_slice(&self.router_lifetime.to_be_bytes());
        buf.extend_from_slice(&self.reachable_time.to_be_bytes());
        buf.extend_from_slice(&self.retrans_timer.to_be_bytes());
        write_options(&self.options, &mut buf);
        buf
    }

    pub fn source_link_addr(&self) -> Option<&LinkAddr> {
        source_link_addr(&self.options)
    }
}

/// Neighbor Solicitation message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborSolicitation {
    pub target_addr: Ipv6Addr,
    pub options: Vec<NdOption>,
}

impl NeighborSolicitation {
    /// Create a new NS for the given target
    pub fn new(target_addr: Ipv6Addr, source_link_addr: Option<LinkAddr>) -> Self {
        Self {
            target_addr,
            options: source_link_addr
                .map(NdOption::SourceLinkAddr)
                .into_iter()
                .collect(),
        }
    }

    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        // Skip 4 bytes reserved
        Ok(Self {
            target_addr: read_addr(&body[4..20]),
            options: parse_options(&body[20..])?,
        })
    }

    /// Build NS message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = header(Icmpv6Type::NeighborSolicitation, NDP_MSG_SIZE + 8);
        buf.extend_from_slice(&[0; 4]);
        buf.extend_from_slice(&self.target_addr.octets());
        write_options(&self.options, &mut buf);
        buf
    }

    pub fn source_link_addr(&self) -> Option<&LinkAddr> {
        source_link_addr(&self.options)
    }

    /// Substitute the Source Link-Layer Address option, if the message has one
    pub fn rewrite_source_link_addr(&mut self, addr: &LinkAddr) -> bool {
        rewrite_link_addr(&mut self.options, OPT_SOURCE_LINK_ADDR, addr)
    }
}

/// Neighbor Advertisement message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    pub router_flag: bool,
    pub solicited_flag: bool,
    pub override_flag: bool,
    pub target_addr: Ipv6Addr,
    pub options: Vec<NdOption>,
}

impl NeighborAdvertisement {
    pub fn new(
        target_addr: Ipv6Addr,
        target_link_addr: Option<LinkAddr>,
        router_flag: bool,
        solicited_flag: bool,
        override_flag: bool,
    ) -> Self {
        Self {
            router_flag,
            solicited_flag,
            override_flag,
            target_addr,
            options: target_link_addr
                .map(NdOption::TargetLinkAddr)
                .into_iter()
                .collect(),
        }
    }

    /// Parse from ICMPv6 body (after type/code/checksum)
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        let flags = body[0];
        Ok(Self {
            router_flag: flags & NA_FLAG_ROUTER != 0,
            solicited_flag: flags & NA_FLAG_SOLICITED != 0,
            override_flag: flags & NA_FLAG_OVERRIDE != 0,
            target_addr: read_addr(&body[4..20]),
            options: parse_options(&body[20..])?,
        })
    }

    /// Build NA message bytes (ICMPv6 payload, without IPv6 header)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.router_flag {
            flags |= NA_FLAG_ROUTER;
        }
        if self.solicited_flag {
            flags |= NA_FLAG_SOLICITED;
        }
        if self.override_flag {
            flags |= NA_FLAG_OVERRIDE;
        }

        let mut buf = header(Icmpv6Type::NeighborAdvertisement, NDP_MSG_SIZE + 8);
        buf.extend_from_slice(&[flags, 0, 0, 0]);
        buf.extend_from_slice(&self.target_addr.octets());
        write_options(&self.options, &mut buf);
        buf
    }

    pub fn target_link_addr(&self) -> Option<&LinkAddr> {
        target_link_addr(&self.options)
    }
}

/// A decoded ICMPv6 message as seen by the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NdMessage {
    RouterSolicit(RouterSolicitation),
    RouterAdvert(RouterAdvertisement),
    NeighborSolicit(NeighborSolicitation),
    NeighborAdvert(NeighborAdvertisement),
    /// Any other ICMPv6 message; never re-encoded
    Other { msg_type: u8, code: u8, body: Vec<u8> },
}

impl NdMessage {
    pub fn msg_type(&self) -> u8 {
        match self {
            NdMessage::RouterSolicit(_) => Icmpv6Type::RouterSolicitation as u8,
            NdMessage::RouterAdvert(_) => Icmpv6Type::RouterAdvertisement as u8,
            NdMessage::NeighborSolicit(_) => Icmpv6Type::NeighborSolicitation as u8,
            NdMessage::NeighborAdvert(_) => Icmpv6Type::NeighborAdvertisement as u8,
            NdMessage::Other { msg_type, .. } => *msg_type,
        }
    }

    /// Encode to ICMPv6 bytes. Returns `None` for [`NdMessage::Other`].
    pub fn encode(&self) -> Option<Vec<u8>> {
        match self {
            NdMessage::RouterSolicit(rs) => Some(rs.to_bytes()),
            NdMessage::RouterAdvert(ra) => Some(ra.to_bytes()),
            NdMessage::NeighborSolicit(ns) => Some(ns.to_bytes()),
            NdMessage::NeighborAdvert(na) => Some(na.to_bytes()),
            NdMessage::Other { .. } => None,
        }
    }
}

impl fmt::Display for NdMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NdMessage::RouterSolicit(_) => write!(f, "RS"),
            NdMessage::RouterAdvert(_) => write!(f, "RA"),
            NdMessage::NeighborSolicit(ns) => write!(f, "NS(target={})", ns.target_addr),
            NdMessage::NeighborAdvert(na) => write!(f, "NA(target={})", na.target_addr),
            NdMessage::Other { msg_type, .. } => write!(f, "Other({msg_type})"),
        }
    }
}

/// Decode a raw ICMPv6 payload.
///
/// A packet is accepted only as a whole: short buffers, a non-zero code
/// on an ND type, or any malformed option reject it.
pub fn decode(raw: &[u8]) -> Result<NdMessage, DecodeError> {
    let Some(&msg_type) = raw.first() else {
        return Err(DecodeError::Empty);
    };

    let Some(kind) = Icmpv6Type::from_u8(msg_type) else {
        if raw.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated {
                msg_type,
                len: raw.len(),
                min: HEADER_SIZE,
            });
        }
        return Ok(NdMessage::Other {
            msg_type,
            code: raw[1],
            body: raw[HEADER_SIZE..].to_vec(),
        });
    };

    let min = kind.min_size();
    if raw.len() < min {
        return Err(DecodeError::Truncated {
            msg_type,
            len: raw.len(),
            min,
        });
    }
    let code = raw[1];
    if code != 0 {
        return Err(DecodeError::BadCode { msg_type, code });
    }

    let body = &raw[HEADER_SIZE..];
    let message = match kind {
        Icmpv6Type::RouterSolicitation => NdMessage::RouterSolicit(RouterSolicitation::parse(body)?),
        Icmpv6Type::RouterAdvertisement => NdMessage::RouterAdvert(RouterAdvertisement::parse(body)?),
        Icmpv6Type::NeighborSolicitation => {
            NdMessage::NeighborSolicit(NeighborSolicitation::parse(body)?)
        }
        Icmpv6Type::NeighborAdvertisement => {
            NdMessage::NeighborAdvert(NeighborAdvertisement::parse(body)?)
        }
    };
    Ok(message)
}
