//! Outstanding relayed solicitations
//!
//! When a Neighbor Solicitation is relayed to the other side, the proxy
//! remembers who asked so the answering advertisement can be turned into
//! a reply on the requester's side.

use crate::port::{PortId, ALL_NODES};
use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::time::{Duration, Instant};
use tracing::debug;

/// Requester addresses remembered per query
pub const MAX_REQUESTERS: usize = 8;

/// Default query lifetime in seconds
pub const DEFAULT_PENDING_TIMEOUT_SECS: u64 = 3;

/// Default number of relays per query
pub const DEFAULT_PENDING_RETRIES: u32 = 3;

/// Default bound on queries outstanding at once
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// A solicitation relayed to the other port and not yet answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub target: Ipv6Addr,
    /// Port the solicitation arrived on; the answer goes back here
    pub port: PortId,
    requesters: Vec<Ipv6Addr>,
    /// Time of the last relay; the query expires `timeout` after it
    pub last_relay: Instant,
    /// Relays sent so far
    pub attempts: u32,
}

impl PendingQuery {
    fn new(target: Ipv6Addr, port: PortId, now: Instant) -> Self {
        Self {
            target,
            port,
            requesters: Vec::new(),
            last_relay: now,
            attempts: 0,
        }
    }

    fn add_requester(&mut self, requester: Ipv6Addr) {
        if !self.requesters.contains(&requester) && self.requesters.len() < MAX_REQUESTERS {
            self.requesters.push(requester);
        }
    }

    pub fn requesters(&self) -> &[Ipv6Addr] {
        &self.requesters
    }

    /// Destination and Solicited flag for the synthesized answer.
    ///
    /// A single unicast requester gets a solicited unicast reply; anything
    /// else is answered unsolicited to all-nodes.
    pub fn reply_destination(&self) -> (Ipv6Addr, bool) {
        match self.requesters.as_slice() {
            [single] if !single.is_unspecified() => (*single, true),
            _ => (ALL_NODES, false),
        }
    }
}

/// Outstanding queries keyed by solicited target
#[derive(Debug)]
pub struct PendingQueries {
    queries: HashMap<Ipv6Addr, PendingQuery>,
    timeout: Duration,
    max_attempts: u32,
    max_queries: usize,
}

impl PendingQueries {
    pub fn new(timeout: Duration, max_attempts: u32) -> Self {
        Self::with_capacity(timeout, max_attempts, DEFAULT_MAX_PENDING)
    }

    /// At most `max_queries` targets are tracked; a new target beyond
    /// that replaces the query relayed longest ago.
    pub fn with_capacity(timeout: Duration, max_attempts: u32, max_queries: usize) -> Self {
        Self {
            queries: HashMap::new(),
            timeout,
            max_attempts: max_attempts.max(1),
            max_queries: max_queries.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_queries
    }

    fn is_expired(&self, query: &PendingQuery, now: Instant) -> bool {
        now.saturating_duration_since(query.last_relay) > self.timeout
    }

    /// Record a solicitation for `target` from `requester` on `port`.
    ///
    /// Returns true if it should be relayed, false once the query has
    /// used all its attempts.
    pub fn record(
        &mut self,
        target: Ipv6Addr,
        port: PortId,
        requester: Ipv6Addr,
        now: Instant,
    ) -> bool {
        let replace = match self.queries.get(&target) {
            Some(query) => query.port != port || self.is_expired(query, now),
            None => true,
        };
        if replace {
            if !self.queries.contains_key(&target) && self.queries.len() >= self.max_queries {
                self.make_room(now);
            }
            self.queries
                .insert(target, PendingQuery::new(target, port, now));
        }

        let max_attempts = self.max_attempts;
        let Some(query) = self.queries.get_mut(&target) else {
            return false;
        };
        query.add_requester(requester);

        if query.attempts >= max_attempts {
            return false;
        }
        query.attempts += 1;
        query.last_relay = now;
        true
    }

    /// Drop expired queries, or failing that the one relayed longest ago
    fn make_room(&mut self, now: Instant) {
        if self.expire(now) > 0 {
            return;
        }
        let oldest = self
            .queries
            .values()
            .min_by_key(|q| (q.last_relay, q.target))
            .map(|q| q.target);
        if let Some(target) = oldest {
            debug!("pending queries full, dropping query for {}", target);
            self.queries.remove(&target);
        }
    }

    /// Remove and return the live query for `target`
    pub fn take(&mut self, target: &Ipv6Addr, now: Instant) -> Option<PendingQuery> {
        let query = self.queries.remove(target)?;
        if self.is_expired(&query, now) {
            return None;
        }
        Some(query)
    }

    pub fn get(&self, target: &Ipv6Addr) -> Option<&PendingQuery> {
        self.queries.get(target)
    }

    /// Drop expired queries, returning how many went
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.queries.len();
        let timeout = self.timeout;
        self.queries
            .retain(|_, q| now.saturating_duration_since(q.last_relay) <= timeout);
        before - self.queries.len()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

impl Default for PendingQueries {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_PENDING_TIMEOUT_SECS),
            DEFAULT_PENDING_RETRIES,
        )
    }
}
