//! In-memory links for driving the dispatcher
//!
//! Each port is backed by a pair of channels: the test injects packets
//! as if they arrived on the interface and reads back what the proxy sent.

use ndproxy::clock::ManualClock;
use ndproxy::dataplane::{Dispatcher, Fdb, Lifecycle, PendingQueries, Relay, RelayConfig};
use ndproxy::port::{Port, PortId, PortMap, RxInfo, ALL_ROUTERS};
use ndproxy::protocol::{decode, MacAddr, NdMessage};
use ndproxy::telemetry::ProxyStats;
use ndproxy::{Error, Result};
use std::net::Ipv6Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const LAN_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
pub const WAN_MAC: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

type Frame = (Vec<u8>, RxInfo);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    Join(Ipv6Addr),
    Leave(Ipv6Addr),
}

/// The proxy's side of a link
pub struct MemoryPort {
    id: PortId,
    name: String,
    inbox: mpsc::UnboundedReceiver<Frame>,
    outbox: mpsc::UnboundedSender<(Vec<u8>, Ipv6Addr)>,
    groups: Arc<Mutex<Vec<GroupOp>>>,
}

impl Port for MemoryPort {
    fn name(&self) -> &str {
        &self.name
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<RxInfo> {
        match self.inbox.recv().await {
            Some((data, info)) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(info)
            }
            None => Err(Error::PortClosed {
                port: self.id,
                source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
            }),
        }
    }

    async fn send(&mut self, buf: &[u8], dst: Ipv6Addr) -> Result<usize> {
        // The test may have stopped listening; the packet is still "sent"
        let _ = self.outbox.send((buf.to_vec(), dst));
        Ok(buf.len())
    }

    fn join_group(&mut self, group: Ipv6Addr) -> Result<()> {
        self.groups.lock().unwrap().push(GroupOp::Join(group));
        Ok(())
    }

    fn leave_group(&mut self, group: Ipv6Addr) -> Result<()> {
        self.groups.lock().unwrap().push(GroupOp::Leave(group));
        Ok(())
    }
}

/// The test's side of a link
pub struct Wire {
    inject: Option<mpsc::UnboundedSender<Frame>>,
    sent: mpsc::UnboundedReceiver<(Vec<u8>, Ipv6Addr)>,
    groups: Arc<Mutex<Vec<GroupOp>>>,
}

impl Wire {
    /// Deliver a message to the proxy as if it arrived from `src`
    pub fn inject(&self, message: &NdMessage, src: &str, dst: &str) {
        let bytes = message.encode().expect("ND message encodes");
        self.inject_raw(&bytes, src, dst, 255);
    }

    pub fn inject_raw(&self, bytes: &[u8], src: &str, dst: &str, hop_limit: u8) {
        let info = RxInfo {
            len: bytes.len(),
            src: src.parse().unwrap(),
            dst: dst.parse().unwrap(),
            hop_limit: Some(hop_limit),
        };
        self.inject
            .as_ref()
            .expect("wire is open")
            .send((bytes.to_vec(), info))
            .unwrap();
    }

    /// Next packet the proxy sent on this link
    pub async fn next_sent(&mut self) -> (NdMessage, Ipv6Addr) {
        let (bytes, dst) = tokio::time::timeout(Duration::from_secs(30), self.sent.recv())
            .await
            .expect("proxy sent nothing")
            .expect("link closed");
        (decode(&bytes).expect("proxy sent a valid ND message"), dst)
    }

    /// True if the proxy has sent nothing that was not read yet
    pub fn is_quiet(&mut self) -> bool {
        self.sent.try_recv().is_err()
    }

    /// Unplug the link; the proxy's next receive fails
    pub fn close(&mut self) {
        self.inject = None;
    }

    pub fn group_ops(&self) -> Vec<GroupOp> {
        self.groups.lock().unwrap().clone()
    }

    pub fn joined(&self) -> Vec<Ipv6Addr> {
        self.group_ops()
            .into_iter()
            .filter_map(|op| match op {
                GroupOp::Join(g) => Some(g),
                GroupOp::Leave(_) => None,
            })
            .collect()
    }

    pub fn left(&self) -> Vec<Ipv6Addr> {
        self.group_ops()
            .into_iter()
            .filter_map(|op| match op {
                GroupOp::Leave(g) => Some(g),
                GroupOp::Join(_) => None,
            })
            .collect()
    }

    /// Groups currently held, counting joins against leaves
    pub fn held(&self) -> Vec<Ipv6Addr> {
        let mut held = Vec::new();
        for op in self.group_ops() {
            match op {
                GroupOp::Join(g) => held.push(g),
                GroupOp::Leave(g) => {
                    if let Some(i) = held.iter().position(|h| *h == g) {
                        held.remove(i);
                    }
                }
            }
        }
        held
    }
}

pub fn link(id: PortId, name: &str) -> (MemoryPort, Wire) {
    let (inject, inbox) = mpsc::unbounded_channel();
    let (outbox, sent) = mpsc::unbounded_channel();
    let groups = Arc::new(Mutex::new(Vec::new()));

    let port = MemoryPort {
        id,
        name: name.to_string(),
        inbox,
        outbox,
        groups: groups.clone(),
    };
    let wire = Wire {
        inject: Some(inject),
        sent,
        groups,
    };
    (port, wire)
}

/// A dispatcher wired to two in-memory links
pub struct Proxy {
    pub dispatcher: Dispatcher<MemoryPort>,
    pub lan: Wire,
    pub wan: Wire,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<ProxyStats>,
    pub lifecycle: Lifecycle,
}

pub fn proxy(aging_secs: u64) -> Proxy {
    let (lan_port, lan) = link(PortId::Lan, "lan0");
    let (wan_port, wan) = link(PortId::Wan, "wan0");

    let clock = Arc::new(ManualClock::new());
    let stats = Arc::new(ProxyStats::new());
    let relay = Relay::new(
        RelayConfig {
            link_addrs: PortMap::new(LAN_MAC.into(), WAN_MAC.into()),
            relay_router_discovery: true,
            set_proxy_flag: true,
            probe_stale: true,
        },
        Fdb::new(1024, Duration::from_secs(aging_secs), clock.clone()),
        PendingQueries::new(Duration::from_secs(3), 3),
        stats.clone(),
    );

    let dispatcher = Dispatcher::new(
        PortMap::new(lan_port, wan_port),
        relay,
        PortMap::new(vec![ALL_ROUTERS], vec![ALL_ROUTERS]),
        Duration::from_secs(1),
    );

    Proxy {
        dispatcher,
        lan,
        wan,
        clock,
        stats,
        lifecycle: Lifecycle::new(),
    }
}

/// Give the dispatcher a chance to drain what was injected
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
