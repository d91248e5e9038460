//! Data plane components
//!
//! Handles Neighbor Discovery proxying: the neighbor table, pending
//! queries, relay decisions and the dispatch loop around the ports.

mod dispatcher;
mod fdb;
mod pending;
mod relay;

pub use dispatcher::{Dispatcher, Lifecycle, ND_HOP_LIMIT, RECV_BUF_SIZE};
pub use fdb::{
    Fdb, FdbEvent, LearnOutcome, NeighborEntry, NeighborState, DEFAULT_AGING_TIME_SECS,
    DEFAULT_MAX_ENTRIES,
};
pub use pending::{
    PendingQueries, PendingQuery, DEFAULT_MAX_PENDING, DEFAULT_PENDING_RETRIES,
    DEFAULT_PENDING_TIMEOUT_SECS, MAX_REQUESTERS,
};
pub use relay::{Inbound, Outbound, Relay, RelayConfig};
