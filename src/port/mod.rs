//! Network ports
//!
//! A port owns one interface's ICMPv6 capability: send, receive with
//! address metadata, and multicast group membership. Nothing here knows
//! about Neighbor Discovery semantics.

mod af_packet;
mod icmp6_socket;
mod interface;
mod multicast;

pub use af_packet::{strip_ipv6_header, PacketCapture, IPV6_HEADER_SIZE};
pub use icmp6_socket::{interface_mac, Icmp6Socket};
pub use interface::InterfacePort;
pub use multicast::{solicited_node, GroupMembership, ALL_NODES, ALL_ROUTERS};

use crate::Result;
use std::fmt;
use std::future::Future;
use std::net::Ipv6Addr;
use std::ops::{Index, IndexMut};

/// Which side of the proxy a packet came from or goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortId {
    Lan,
    Wan,
}

impl PortId {
    pub const ALL: [PortId; 2] = [PortId::Lan, PortId::Wan];

    pub fn opposite(self) -> Self {
        match self {
            PortId::Lan => PortId::Wan,
            PortId::Wan => PortId::Lan,
        }
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortId::Lan => f.write_str("lan"),
            PortId::Wan => f.write_str("wan"),
        }
    }
}

/// One value per port
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMap<T> {
    pub lan: T,
    pub wan: T,
}

impl<T> PortMap<T> {
    pub fn new(lan: T, wan: T) -> Self {
        Self { lan, wan }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortId, &T)> {
        [(PortId::Lan, &self.lan), (PortId::Wan, &self.wan)].into_iter()
    }

    pub fn map<U>(self, mut f: impl FnMut(PortId, T) -> U) -> PortMap<U> {
        PortMap {
            lan: f(PortId::Lan, self.lan),
            wan: f(PortId::Wan, self.wan),
        }
    }
}

impl<T> Index<PortId> for PortMap<T> {
    type Output = T;

    fn index(&self, port: PortId) -> &T {
        match port {
            PortId::Lan => &self.lan,
            PortId::Wan => &self.wan,
        }
    }
}

impl<T> IndexMut<PortId> for PortMap<T> {
    fn index_mut(&mut self, port: PortId) -> &mut T {
        match port {
            PortId::Lan => &mut self.lan,
            PortId::Wan => &mut self.wan,
        }
    }
}

/// Metadata of a received ICMPv6 packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
    /// Source address from the IPv6 header
    pub src: Ipv6Addr,
    /// Destination address from the IPv6 header
    pub dst: Ipv6Addr,
    /// Hop limit from the IPv6 header, if the kernel reported it
    pub hop_limit: Option<u8>,
}

/// Raw ICMPv6 port
///
/// The dispatcher polls both ports' `recv` futures concurrently, so
/// implementations must be cancel-safe: dropping a pending `recv` must
/// not lose a packet that was already dequeued.
pub trait Port: Send {
    /// Interface name, for logging
    fn name(&self) -> &str;

    /// Receive one ICMPv6 payload (IPv6 header stripped) into `buf`
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send one ICMPv6 payload to `dst`
    fn send(&mut self, buf: &[u8], dst: Ipv6Addr) -> impl Future<Output = Result<usize>> + Send;

    fn join_group(&mut self, group: Ipv6Addr) -> Result<()>;

    fn leave_group(&mut self, group: Ipv6Addr) -> Result<()>;
}
