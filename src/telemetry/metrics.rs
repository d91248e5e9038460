//! Proxy statistics.
//!
//! Lock-free counters shared between the dispatcher and the relay engine,
//! kept per port where it matters.

use crate::port::PortMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Increments the counter by 1.
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a value to the counter.
    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    /// Gets the current value of the counter.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Point-in-time value, overwritten rather than accumulated.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: usize) {
        self.0.store(val as u64, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-port statistics.
#[derive(Debug, Default)]
pub struct PortStats {
    /// Number of packets received.
    pub rx_packets: Counter,
    /// Number of bytes received.
    pub rx_bytes: Counter,
    /// Number of packets transmitted.
    pub tx_packets: Counter,
    /// Number of bytes transmitted.
    pub tx_bytes: Counter,
    /// Packets received but not processed (bad hop limit, undecodable).
    pub rx_drops: Counter,
    /// Number of receive errors.
    pub rx_errors: Counter,
    /// Number of transmit errors.
    pub tx_errors: Counter,
}

impl PortStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rx(&self, bytes: usize) {
        self.rx_packets.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_packets.inc();
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_rx_drop(&self) {
        self.rx_drops.inc();
    }

    pub fn record_rx_error(&self) {
        self.rx_errors.inc();
    }

    pub fn record_tx_error(&self) {
        self.tx_errors.inc();
    }
}

/// Counters for the whole proxy.
#[derive(Debug, Default)]
pub struct ProxyStats {
    pub ports: PortMap<PortStats>,

    /// Packets rejected by the codec.
    pub decode_errors: Counter,
    /// Packets dropped for a hop limit other than 255.
    pub hop_limit_drops: Counter,

    // Relay decisions
    /// Solicitations answered from the table.
    pub proxied_answers: Counter,
    /// Solicitations relayed to the other port.
    pub relayed_solicitations: Counter,
    /// Advertisements built for a pending query.
    pub synthesized_adverts: Counter,
    /// Router solicitations and advertisements relayed.
    pub router_discovery_relays: Counter,
    /// Refresh probes sent for stale entries.
    pub probes_sent: Counter,

    // Table
    /// Entries pushed out of a full table.
    pub fdb_evictions: Counter,
    /// Entries that moved to the other port.
    pub fdb_rehomes: Counter,
    /// Entries removed by aging.
    pub fdb_expired: Counter,
    /// Current number of table entries.
    pub fdb_size: Gauge,
    /// Current number of pending queries.
    pub pending_queries: Gauge,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("decode_errors".into(), self.decode_errors.get()),
            ("hop_limit_drops".into(), self.hop_limit_drops.get()),
            ("proxied_answers".into(), self.proxied_answers.get()),
            (
                "relayed_solicitations".into(),
                self.relayed_solicitations.get(),
            ),
            ("synthesized_adverts".into(), self.synthesized_adverts.get()),
            (
                "router_discovery_relays".into(),
                self.router_discovery_relays.get(),
            ),
            ("probes_sent".into(), self.probes_sent.get()),
            ("fdb_evictions".into(), self.fdb_evictions.get()),
            ("fdb_rehomes".into(), self.fdb_rehomes.get()),
            ("fdb_expired".into(), self.fdb_expired.get()),
            ("fdb_size".into(), self.fdb_size.get()),
            ("pending_queries".into(), self.pending_queries.get()),
        ];

        for (port, stats) in self.ports.iter() {
            result.extend([
                (format!("{}_rx_packets", port), stats.rx_packets.get()),
                (format!("{}_rx_bytes", port), stats.rx_bytes.get()),
                (format!("{}_tx_packets", port), stats.tx_packets.get()),
                (format!("{}_tx_bytes", port), stats.tx_bytes.get()),
                (format!("{}_rx_drops", port), stats.rx_drops.get()),
                (format!("{}_rx_errors", port), stats.rx_errors.get()),
                (format!("{}_tx_errors", port), stats.tx_errors.get()),
            ]);
        }

        result
    }

    /// One-line summary for log output.
    pub fn summary(&self) -> String {
        self.export()
            .into_iter()
            .filter(|(_, v)| *v != 0)
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
