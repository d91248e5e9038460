//! Packet dispatcher
//!
//! Owns both ports and the relay engine. One task receives from both
//! ports, runs the relay, transmits its output and keeps solicited-node
//! group membership in step with the neighbor table.

use crate::dataplane::fdb::FdbEvent;
use crate::dataplane::relay::{Inbound, Outbound, Relay};
use crate::port::{solicited_node, GroupMembership, Port, PortId, PortMap, RxInfo};
use crate::protocol::decode;
use crate::telemetry::ProxyStats;
use crate::Result;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Receive buffer size; ND messages never exceed the link MTU
pub const RECV_BUF_SIZE: usize = 2048;

/// Hop limit every Neighbor Discovery message must arrive with
pub const ND_HOP_LIMIT: u8 = 255;

struct LifecycleInner {
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// Run state shared between the dispatcher and whoever stops it
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<LifecycleInner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(LifecycleInner {
                running: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Mark the proxy as running
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// Ask the dispatcher to stop after the packet in hand
    pub fn request_shutdown(&self) {
        self.inner.shutdown.send_replace(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst) && !self.is_shutdown_requested()
    }

    /// Resolves once shutdown has been requested
    pub async fn wait_shutdown(&self) {
        let mut rx = self.inner.shutdown.subscribe();
        let _ = rx.wait_for(|requested| *requested).await;
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    fn stopped(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("running", &self.inner.running.load(Ordering::SeqCst))
            .field("shutdown_requested", &self.is_shutdown_requested())
            .finish()
    }
}

pub struct Dispatcher<P: Port> {
    ports: PortMap<P>,
    relay: Relay,
    groups: PortMap<GroupMembership>,
    /// Groups joined for the whole run, from configuration
    static_groups: PortMap<Vec<Ipv6Addr>>,
    idle_timeout: Duration,
    stats: Arc<ProxyStats>,
}

impl<P: Port> Dispatcher<P> {
    pub fn new(
        ports: PortMap<P>,
        relay: Relay,
        static_groups: PortMap<Vec<Ipv6Addr>>,
        idle_timeout: Duration,
    ) -> Self {
        let stats = relay.stats().clone();
        Self {
            ports,
            relay,
            groups: PortMap::default(),
            static_groups,
            idle_timeout,
            stats,
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn ports(&self) -> &PortMap<P> {
        &self.ports
    }

    pub fn groups(&self) -> &PortMap<GroupMembership> {
        &self.groups
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Run until shutdown is requested or a port fails for good.
    ///
    /// Every group joined during the run is left before returning, on
    /// either path.
    pub async fn run(&mut self, lifecycle: &Lifecycle) -> Result<()> {
        self.join_static_groups();
        lifecycle.start();
        info!(
            "proxying between {} (lan) and {} (wan)",
            self.ports.lan.name(),
            self.ports.wan.name()
        );

        let result = self.event_loop(lifecycle).await;

        self.leave_all_groups();
        lifecycle.stopped();
        info!("stopped: {}", self.stats.summary());
        result
    }

    async fn event_loop(&mut self, lifecycle: &Lifecycle) -> Result<()> {
        let mut shutdown = lifecycle.subscribe();
        let mut maintenance = tokio::time::interval(self.idle_timeout);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut bufs = PortMap::new(vec![0u8; RECV_BUF_SIZE], vec![0u8; RECV_BUF_SIZE]);
        // Port polled first on the next receive; flips after each packet
        let mut first = PortId::Lan;

        loop {
            if *shutdown.borrow_and_update() {
                info!("shutdown requested");
                return Ok(());
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = maintenance.tick() => {
                    self.on_maintenance().await;
                }
                (port, result) = recv_next(&mut self.ports, &mut bufs, first) => {
                    first = port.opposite();
                    self.on_receive(port, result, &bufs[port]).await?;
                }
            }
        }
    }

    async fn on_receive(
        &mut self,
        port: PortId,
        result: Result<RxInfo>,
        buf: &[u8],
    ) -> Result<()> {
        match result {
            Ok(info) => {
                let len = info.len.min(buf.len());
                self.process(port, info, &buf[..len]).await;
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!("{}: receive failed: {}", self.ports[port].name(), e);
                Err(e)
            }
            Err(e) => {
                warn!("{}: receive failed: {}", self.ports[port].name(), e);
                self.stats.ports[port].record_rx_error();
                Ok(())
            }
        }
    }

    async fn process(&mut self, port: PortId, info: RxInfo, raw: &[u8]) {
        let stats = &self.stats.ports[port];
        stats.record_rx(raw.len());

        if info.hop_limit != Some(ND_HOP_LIMIT) {
            debug!(
                "{}: dropping packet from {} with hop limit {:?}",
                port, info.src, info.hop_limit
            );
            stats.record_rx_drop();
            self.stats.hop_limit_drops.inc();
            return;
        }

        let message = match decode(raw) {
            Ok(message) => message,
            Err(e) => {
                debug!("{}: dropping packet from {}: {}", port, info.src, e);
                stats.record_rx_drop();
                self.stats.decode_errors.inc();
                return;
            }
        };

        debug!(
            "{}: from: {}, to: {}, type: {}",
            port, info.src, info.dst, message
        );

        let out = self.relay.handle(Inbound {
            origin: port,
            src: info.src,
            dst: info.dst,
            message,
        });
        self.transmit(out).await;
        self.sync_groups();
    }

    async fn on_maintenance(&mut self) {
        let now = self.relay.fdb().now();
        let out = self.relay.maintain(now);
        self.transmit(out).await;
        self.sync_groups();
        debug!(
            "maintenance: {} entries, {} pending, {}",
            self.relay.fdb().len(),
            self.relay.pending().len(),
            self.stats.summary()
        );
    }

    async fn transmit(&mut self, out: Vec<Outbound>) {
        for packet in out {
            let Some(bytes) = packet.message.encode() else {
                continue;
            };
            let port = &mut self.ports[packet.port];
            match port.send(&bytes, packet.dst).await {
                Ok(n) => self.stats.ports[packet.port].record_tx(n),
                Err(e) => {
                    warn!(
                        "{}: failed to send {} to {}: {}",
                        port.name(),
                        packet.message,
                        packet.dst,
                        e
                    );
                    self.stats.ports[packet.port].record_tx_error();
                }
            }
        }
    }

    /// Listen for solicitations of learned addresses on the side facing
    /// away from them.
    fn sync_groups(&mut self) {
        for event in self.relay.drain_events() {
            match event {
                FdbEvent::Added { address, origin } => {
                    self.join(origin.opposite(), solicited_node(address));
                }
                FdbEvent::Removed { address, origin } => {
                    self.leave(origin.opposite(), solicited_node(address));
                }
                FdbEvent::Rehomed { address, from, to } => {
                    self.leave(from.opposite(), solicited_node(address));
                    self.join(to.opposite(), solicited_node(address));
                }
            }
        }
    }

    fn join(&mut self, port: PortId, group: Ipv6Addr) {
        let socket = &mut self.ports[port];
        if let Err(e) = self.groups[port].join(socket, group) {
            warn!("{}: failed to join {}: {}", socket.name(), group, e);
        }
    }

    fn leave(&mut self, port: PortId, group: Ipv6Addr) {
        let socket = &mut self.ports[port];
        if let Err(e) = self.groups[port].leave(socket, group) {
            warn!("{}: failed to leave {}: {}", socket.name(), group, e);
        }
    }

    fn join_static_groups(&mut self) {
        for port in PortId::ALL {
            for group in self.static_groups[port].clone() {
                self.join(port, group);
            }
        }
    }

    fn leave_all_groups(&mut self) {
        for port in PortId::ALL {
            self.groups[port].leave_all(&mut self.ports[port]);
        }
    }
}

/// Receive from whichever port has a packet, trying `first` before the
/// other so a busy port cannot starve its peer.
async fn recv_next<P: Port>(
    ports: &mut PortMap<P>,
    bufs: &mut PortMap<Vec<u8>>,
    first: PortId,
) -> (PortId, Result<RxInfo>) {
    let PortMap { lan, wan } = ports;
    let PortMap {
        lan: lan_buf,
        wan: wan_buf,
    } = bufs;

    match first {
        PortId::Lan => tokio::select! {
            biased;
            result = lan.recv(lan_buf) => (PortId::Lan, result),
            result = wan.recv(wan_buf) => (PortId::Wan, result),
        },
        PortId::Wan => tokio::select! {
            biased;
            result = wan.recv(wan_buf) => (PortId::Wan, result),
            result = lan.recv(lan_buf) => (PortId::Lan, result),
        },
    }
}
