//! Neighbor Discovery relay engine
//!
//! Decides, for each decoded message, what the proxy sends and where:
//! - NS: learn the sender, answer from the table or relay to the other side
//! - NA: learn the target, turn it into a reply for a pending query
//! - RS/RA: relay LAN to WAN and WAN to LAN respectively
//!
//! The engine does no I/O. Given the same table, pending state and clock
//! it always produces the same output.

use crate::dataplane::fdb::{Fdb, FdbEvent, LearnOutcome};
use crate::dataplane::pending::PendingQueries;
use crate::port::{PortId, PortMap, ALL_NODES, ALL_ROUTERS};
use crate::protocol::icmpv6::{
    NeighborAdvertisement, NeighborSolicitation, RouterAdvertisement, RouterSolicitation,
    RA_FLAG_PROXY,
};
use crate::protocol::options::{rewrite_link_addr, OPT_SOURCE_LINK_ADDR};
use crate::protocol::{LinkAddr, NdMessage};
use crate::telemetry::ProxyStats;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace};

/// Relay behavior switches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// The proxy's own link-layer address on each port
    pub link_addrs: PortMap<LinkAddr>,
    pub relay_router_discovery: bool,
    /// Set the RFC 4389 proxy flag on relayed Router Advertisements
    pub set_proxy_flag: bool,
    /// Probe stale entries with a unicast NS during maintenance
    pub probe_stale: bool,
}

/// A decoded message and where it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub origin: PortId,
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub message: NdMessage,
}

/// A message to send; the kernel picks the source address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub port: PortId,
    pub dst: Ipv6Addr,
    pub message: NdMessage,
}

pub struct Relay {
    config: RelayConfig,
    fdb: Fdb,
    pending: PendingQueries,
    stats: Arc<ProxyStats>,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        fdb: Fdb,
        pending: PendingQueries,
        stats: Arc<ProxyStats>,
    ) -> Self {
        Self {
            config,
            fdb,
            pending,
            stats,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn fdb(&self) -> &Fdb {
        &self.fdb
    }

    pub fn pending(&self) -> &PendingQueries {
        &self.pending
    }

    pub fn stats(&self) -> &Arc<ProxyStats> {
        &self.stats
    }

    /// Table membership changes since the last call
    pub fn drain_events(&mut self) -> Vec<FdbEvent> {
        self.fdb.drain_events()
    }

    /// Process one inbound message
    pub fn handle(&mut self, packet: Inbound) -> Vec<Outbound> {
        let Inbound {
            origin,
            src,
            dst,
            message,
        } = packet;

        match message {
            NdMessage::NeighborSolicit(ns) => self.on_neighbor_solicit(origin, src, dst, ns),
            NdMessage::NeighborAdvert(na) => self.on_neighbor_advert(origin, na),
            NdMessage::RouterSolicit(rs) => self.on_router_solicit(origin, dst, rs),
            NdMessage::RouterAdvert(ra) => self.on_router_advert(origin, dst, ra),
            NdMessage::Other { msg_type, .. } => {
                trace!("{}: ignoring ICMPv6 type {} from {}", origin, msg_type, src);
                Vec::new()
            }
        }
    }

    fn on_neighbor_solicit(
        &mut self,
        origin: PortId,
        src: Ipv6Addr,
        dst: Ipv6Addr,
        mut ns: NeighborSolicitation,
    ) -> Vec<Outbound> {
        let target = ns.target_addr;
        if target.is_multicast() || target.is_unspecified() {
            debug!("{}: NS with invalid target {} from {}", origin, target, src);
            return Vec::new();
        }

        if !src.is_unspecified() && !src.is_multicast() {
            self.learn(src, origin, ns.source_link_addr().cloned(), None);
        }

        let known = self.fdb.lookup(&target).map(|e| (e.origin, e.is_router));
        match known {
            Some((home, is_router)) if home == origin.opposite() => {
                // Answer on behalf of the target
                let solicited = !src.is_unspecified();
                let reply_dst = if solicited { src } else { ALL_NODES };
                let na = NeighborAdvertisement::new(
                    target,
                    Some(self.config.link_addrs[origin].clone()),
                    is_router,
                    solicited,
                    false,
                );
                self.stats.proxied_answers.inc();
                debug!(
                    "{}: answering NS for {} (on {}) to {}",
                    origin, target, home, reply_dst
                );
                vec![Outbound {
                    port: origin,
                    dst: reply_dst,
                    message: NdMessage::NeighborAdvert(na),
                }]
            }
            Some(_) => {
                debug!(
                    "{}: NS for {} from {}, target on the same side",
                    origin, target, src
                );
                Vec::new()
            }
            None => {
                let now = self.fdb.now();
                if !self.pending.record(target, origin, src, now) {
                    debug!(
                        "{}: NS for {} suppressed, relay attempts exhausted",
                        origin, target
                    );
                    return Vec::new();
                }

                let out_port = origin.opposite();
                ns.rewrite_source_link_addr(&self.config.link_addrs[out_port]);
                self.stats.relayed_solicitations.inc();
                debug!("{}: relaying NS for {} to {}", origin, target, out_port);
                vec![Outbound {
                    port: out_port,
                    dst,
                    message: NdMessage::NeighborSolicit(ns),
                }]
            }
        }
    }

    fn on_neighbor_advert(&mut self, origin: PortId, na: NeighborAdvertisement) -> Vec<Outbound> {
        let target = na.target_addr;
        if target.is_multicast() || target.is_unspecified() {
            debug!("{}: NA with invalid target {}", origin, target);
            return Vec::new();
        }

        self.learn(
            target,
            origin,
            na.target_link_addr().cloned(),
            Some(na.router_flag),
        );

        let now = self.fdb.now();
        let Some(query) = self.pending.take(&target, now) else {
            trace!("{}: NA for {} with nothing pending", origin, target);
            return Vec::new();
        };

        if query.port == origin {
            debug!(
                "{}: NA for {} answers a query from the same side, discarded",
                origin, target
            );
            return Vec::new();
        }

        let (dst, solicited) = query.reply_destination();
        let answer = NeighborAdvertisement::new(
            target,
            Some(self.config.link_addrs[query.port].clone()),
            na.router_flag,
            solicited,
            false,
        );
        self.stats.synthesized_adverts.inc();
        debug!(
            "{}: NA for {} answers {} requester(s) on {}",
            origin,
            target,
            query.requesters().len(),
            query.port
        );
        vec![Outbound {
            port: query.port,
            dst,
            message: NdMessage::NeighborAdvert(answer),
        }]
    }

    fn on_router_solicit(
        &mut self,
        origin: PortId,
        dst: Ipv6Addr,
        mut rs: RouterSolicitation,
    ) -> Vec<Outbound> {
        if !self.config.relay_router_discovery || origin != PortId::Lan {
            trace!("{}: RS not relayed", origin);
            return Vec::new();
        }

        let out_port = origin.opposite();
        rewrite_link_addr(
            &mut rs.options,
            OPT_SOURCE_LINK_ADDR,
            &self.config.link_addrs[out_port],
        );
        self.stats.router_discovery_relays.inc();
        debug!("{}: relaying RS to {}", origin, out_port);
        vec![Outbound {
            port: out_port,
            dst: if dst.is_multicast() { dst } else { ALL_ROUTERS },
            message: NdMessage::RouterSolicit(rs),
        }]
    }

    fn on_router_advert(
        &mut self,
        origin: PortId,
        dst: Ipv6Addr,
        mut ra: RouterAdvertisement,
    ) -> Vec<Outbound> {
        if !self.config.relay_router_discovery || origin != PortId::Wan {
            trace!("{}: RA not relayed", origin);
            return Vec::new();
        }

        let out_port = origin.opposite();
        rewrite_link_addr(
            &mut ra.options,
            OPT_SOURCE_LINK_ADDR,
            &self.config.link_addrs[out_port],
        );
        if self.config.set_proxy_flag {
            ra.flags |= RA_FLAG_PROXY;
        }
        self.stats.router_discovery_relays.inc();
        debug!("{}: relaying RA to {}", origin, out_port);
        vec![Outbound {
            port: out_port,
            dst: if dst.is_multicast() { dst } else { ALL_NODES },
            message: NdMessage::RouterAdvert(ra),
        }]
    }

    /// Learn `address` on `origin`. `is_router` of `None` keeps the flag
    /// already known for the address.
    fn learn(
        &mut self,
        address: Ipv6Addr,
        origin: PortId,
        link_addr: Option<LinkAddr>,
        is_router: Option<bool>,
    ) {
        let is_router = is_router
            .unwrap_or_else(|| self.fdb.lookup(&address).is_some_and(|e| e.is_router));

        match self.fdb.learn(address, origin, link_addr, is_router) {
            LearnOutcome::Created { evicted } => {
                debug!("{}: learned {}", origin, address);
                if evicted.is_some() {
                    self.stats.fdb_evictions.inc();
                }
            }
            LearnOutcome::Rehomed { from } => {
                info!("{} moved from {} to {}", address, from, origin);
                self.stats.fdb_rehomes.inc();
            }
            LearnOutcome::Refreshed | LearnOutcome::Ignored => {}
        }
    }

    /// Periodic housekeeping: age out the table and pending queries, then
    /// probe entries that went stale.
    pub fn maintain(&mut self, now: Instant) -> Vec<Outbound> {
        let expired = self.fdb.sweep(now);
        if expired > 0 {
            debug!("aged out {} entries", expired);
            self.stats.fdb_expired.add(expired as u64);
        }
        self.pending.expire(now);

        let mut out = Vec::new();
        if self.config.probe_stale {
            for entry in self.fdb.stale_entries(now) {
                let ns = NeighborSolicitation::new(
                    entry.address,
                    Some(self.config.link_addrs[entry.origin].clone()),
                );
                out.push(Outbound {
                    port: entry.origin,
                    dst: entry.address,
                    message: NdMessage::NeighborSolicit(ns),
                });
                self.fdb.mark_probed(&entry.address);
                self.stats.probes_sent.inc();
                trace!("{}: probing stale {}", entry.origin, entry.address);
            }
        }

        self.stats.fdb_size.set(self.fdb.len());
        self.stats.pending_queries.set(self.pending.len());
        out
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("config", &self.config)
            .field("fdb", &self.fdb)
            .field("pending", &self.pending.len())
            .finish()
    }
}
