//! One proxied interface: link-layer capture in, raw ICMPv6 out

use super::{Icmp6Socket, PacketCapture, Port, RxInfo};
use crate::Result;
use std::net::Ipv6Addr;
use tracing::debug;

pub struct InterfacePort {
    capture: PacketCapture,
    socket: Icmp6Socket,
}

impl InterfacePort {
    /// Open both sockets on `ifname`. Needs CAP_NET_RAW.
    pub fn bind(ifname: &str) -> Result<Self> {
        let socket = Icmp6Socket::bind(ifname)?;
        let capture = PacketCapture::bind(socket.ifindex())?;
        debug!("{}: capturing ND with all-multicast enabled", ifname);
        Ok(Self { capture, socket })
    }

    pub fn ifindex(&self) -> u32 {
        self.socket.ifindex()
    }
}

impl Port for InterfacePort {
    fn name(&self) -> &str {
        self.socket.name()
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        self.capture.recv(buf).await
    }

    async fn send(&mut self, buf: &[u8], dst: Ipv6Addr) -> Result<usize> {
        self.socket.send(buf, dst).await
    }

    fn join_group(&mut self, group: Ipv6Addr) -> Result<()> {
        self.socket.join_group(group)
    }

    fn leave_group(&mut self, group: Ipv6Addr) -> Result<()> {
        self.socket.leave_group(group)
    }
}
