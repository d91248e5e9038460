//! Neighbor forwarding database
//!
//! Maps IPv6 addresses to the port they were observed on:
//! - Learning from Neighbor Solicitation sources and Advertisement targets
//! - Lazy expiry on lookup, periodic sweep of aged entries
//! - Bounded size with oldest-`last_seen` eviction
//! - Re-homing when an address shows up on the other port

use crate::clock::Clock;
use crate::port::PortId;
use crate::protocol::LinkAddr;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default table size
pub const DEFAULT_MAX_ENTRIES: u32 = 1024;

/// Default aging time in seconds
pub const DEFAULT_AGING_TIME_SECS: u64 = 300;

/// Entry state derived from its age
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    /// Seen within the first half of the aging time
    Reachable,
    /// In the second half of the aging time; worth a refresh probe
    Stale,
    /// Past the aging time, waiting for the next sweep. Never returned by lookups.
    Expiring,
}

/// A learned neighbor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborEntry {
    pub address: Ipv6Addr,
    /// Port the address was last observed on as a source
    pub origin: PortId,
    pub link_addr: Option<LinkAddr>,
    /// Router flag from the last advertisement
    pub is_router: bool,
    pub last_seen: Instant,
    probed: bool,
}

impl NeighborEntry {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }

    pub fn state(&self, now: Instant, aging_time: Duration) -> NeighborState {
        let age = self.age(now);
        if age > aging_time {
            NeighborState::Expiring
        } else if age > aging_time / 2 {
            NeighborState::Stale
        } else {
            NeighborState::Reachable
        }
    }

    /// True once a refresh probe went out for the current stale period
    pub fn probed(&self) -> bool {
        self.probed
    }
}

/// What [`Fdb::learn`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    /// New entry; `evicted` is the entry pushed out to make room
    Created { evicted: Option<NeighborEntry> },
    /// Existing entry refreshed on the same port
    Refreshed,
    /// Existing entry moved to the other port
    Rehomed { from: PortId },
    /// Unspecified or multicast address, not learnable
    Ignored,
}

/// Table membership changes, drained by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FdbEvent {
    Added { address: Ipv6Addr, origin: PortId },
    Removed { address: Ipv6Addr, origin: PortId },
    Rehomed {
        address: Ipv6Addr,
        from: PortId,
        to: PortId,
    },
}

/// Bounded, aging neighbor table
pub struct Fdb {
    entries: HashMap<Ipv6Addr, NeighborEntry>,
    /// (last_seen, address) for every entry, oldest first
    by_age: BTreeSet<(Instant, Ipv6Addr)>,
    max_entries: usize,
    aging_time: Duration,
    clock: Arc<dyn Clock>,
    events: Vec<FdbEvent>,
}

impl Fdb {
    pub fn new(max_entries: u32, aging_time: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            by_age: BTreeSet::new(),
            max_entries: (max_entries as usize).max(1),
            aging_time,
            clock,
            events: Vec::new(),
        }
    }

    pub fn aging_time(&self) -> Duration {
        self.aging_time
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Look up a live entry. Entries past the aging time are treated as
    /// absent even before the sweep removes them.
    pub fn lookup(&self, address: &Ipv6Addr) -> Option<&NeighborEntry> {
        let now = self.clock.now();
        self.entries
            .get(address)
            .filter(|e| e.age(now) <= self.aging_time)
    }

    /// Insert or refresh an address observed on `origin`.
    ///
    /// A link address of `None` keeps whatever was learned before.
    pub fn learn(
        &mut self,
        address: Ipv6Addr,
        origin: PortId,
        link_addr: Option<LinkAddr>,
        is_router: bool,
    ) -> LearnOutcome {
        if address.is_unspecified() || address.is_multicast() {
            return LearnOutcome::Ignored;
        }

        let now = self.clock.now();

        if let Some(entry) = self.entries.get_mut(&address) {
            self.by_age.remove(&(entry.last_seen, address));
            self.by_age.insert((now, address));

            let previous = entry.origin;
            entry.origin = origin;
            entry.last_seen = now;
            entry.is_router = is_router;
            entry.probed = false;
            if link_addr.is_some() {
                entry.link_addr = link_addr;
            }

            if previous != origin {
                self.events.push(FdbEvent::Rehomed {
                    address,
                    from: previous,
                    to: origin,
                });
                return LearnOutcome::Rehomed { from: previous };
            }
            return LearnOutcome::Refreshed;
        }

        let evicted = if self.entries.len() >= self.max_entries {
            self.evict_oldest()
        } else {
            None
        };

        self.entries.insert(
            address,
            NeighborEntry {
                address,
                origin,
                link_addr,
                is_router,
                last_seen: now,
                probed: false,
            },
        );
        self.by_age.insert((now, address));
        self.events.push(FdbEvent::Added { address, origin });

        LearnOutcome::Created { evicted }
    }

    fn evict_oldest(&mut self) -> Option<NeighborEntry> {
        let (_, address) = self.by_age.first().copied()?;
        let entry = self.remove(&address)?;
        debug!(
            "FDB full ({} entries), evicted {} on {}",
            self.max_entries, entry.address, entry.origin
        );
        Some(entry)
    }

    /// Remove an entry
    pub fn remove(&mut self, address: &Ipv6Addr) -> Option<NeighborEntry> {
        let entry = self.entries.remove(address)?;
        self.by_age.remove(&(entry.last_seen, entry.address));
        self.events.push(FdbEvent::Removed {
            address: entry.address,
            origin: entry.origin,
        });
        Some(entry)
    }

    /// Remove every entry older than the aging time.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let mut expired = Vec::new();
        for &(last_seen, address) in &self.by_age {
            if now.saturating_duration_since(last_seen) <= self.aging_time {
                break;
            }
            expired.push(address);
        }

        for address in &expired {
            self.remove(address);
        }
        expired.len()
    }

    /// Stale entries that have not been probed yet, oldest first
    pub fn stale_entries(&self, now: Instant) -> Vec<NeighborEntry> {
        self.by_age
            .iter()
            .filter_map(|(_, address)| self.entries.get(address))
            .filter(|e| e.state(now, self.aging_time) == NeighborState::Stale && !e.probed)
            .cloned()
            .collect()
    }

    pub fn mark_probed(&mut self, address: &Ipv6Addr) {
        if let Some(entry) = self.entries.get_mut(address) {
            entry.probed = true;
        }
    }

    /// Take the membership changes recorded since the last call
    pub fn drain_events(&mut self) -> Vec<FdbEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Fdb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fdb")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("aging_time", &self.aging_time)
            .finish()
    }
}
