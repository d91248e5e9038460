//! Configuration types

use crate::dataplane::{
    DEFAULT_AGING_TIME_SECS, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_PENDING, DEFAULT_PENDING_RETRIES,
    DEFAULT_PENDING_TIMEOUT_SECS,
};
use crate::port::{PortId, PortMap, ALL_ROUTERS};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::time::Duration;

/// Default maintenance period in seconds
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 1;

/// Proxy configuration (ndproxy.toml)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub interfaces: InterfacesConfig,
    pub proxy: ProxyConfig,
    pub router_discovery: RouterDiscoveryConfig,
    pub multicast: MulticastConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InterfacesConfig {
    pub wan: String,
    pub lan: String,
    /// Link-layer address to advertise on WAN instead of the interface's own
    pub wan_link_addr: Option<String>,
    /// Link-layer address to advertise on LAN instead of the interface's own
    pub lan_link_addr: Option<String>,
}

impl InterfacesConfig {
    pub fn name(&self, port: PortId) -> &str {
        match port {
            PortId::Lan => &self.lan,
            PortId::Wan => &self.wan,
        }
    }

    pub fn link_addr(&self, port: PortId) -> Option<&str> {
        match port {
            PortId::Lan => self.lan_link_addr.as_deref(),
            PortId::Wan => self.wan_link_addr.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub max_entries: u32,
    /// Seconds an entry lives without being seen again
    pub aging_time: u64,
    /// Seconds between maintenance passes
    pub idle_timeout: u64,
    /// Seconds a relayed solicitation waits for an answer
    pub pending_timeout: u64,
    /// Relays per unanswered solicitation
    pub pending_retries: u32,
    /// Unanswered solicitations tracked at once
    pub max_pending: usize,
    pub probe_stale: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            aging_time: DEFAULT_AGING_TIME_SECS,
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            pending_timeout: DEFAULT_PENDING_TIMEOUT_SECS,
            pending_retries: DEFAULT_PENDING_RETRIES,
            max_pending: DEFAULT_MAX_PENDING,
            probe_stale: true,
        }
    }
}

impl ProxyConfig {
    pub fn aging_time(&self) -> Duration {
        Duration::from_secs(self.aging_time)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn pending_timeout(&self) -> Duration {
        Duration::from_secs(self.pending_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterDiscoveryConfig {
    /// Relay RS from LAN to WAN and RA from WAN to LAN
    pub relay: bool,
    pub set_proxy_flag: bool,
}

impl Default for RouterDiscoveryConfig {
    fn default() -> Self {
        Self {
            relay: true,
            set_proxy_flag: true,
        }
    }
}

/// Groups joined on each interface for the whole run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub wan: Vec<Ipv6Addr>,
    pub lan: Vec<Ipv6Addr>,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            wan: vec![ALL_ROUTERS],
            lan: vec![ALL_ROUTERS],
        }
    }
}

impl MulticastConfig {
    pub fn groups(&self) -> PortMap<Vec<Ipv6Addr>> {
        PortMap::new(self.lan.clone(), self.wan.clone())
    }
}
