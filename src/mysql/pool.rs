//! Round-robin ring of server connections with two-pass failover.

use std::time::Instant;

use super::connection::{MySqlConnection, QueryAttempt};
use super::link::{Connector, LinkError, QueryReply};
use super::settings::MySqlSettings;

/// Outcome of dispatching one statement across the ring.
#[derive(Debug)]
pub(crate) enum Dispatched {
    /// No member could serve the statement.
    NotConnected,
    /// A member answered.
    Completed(QueryReply),
    /// A member rejected the statement.
    Failed(LinkError),
}

/// Fixed-membership connection ring with a shared round-robin cursor.
///
/// Members keep the declaration order of the connect string for the whole
/// life of the handle.
pub(crate) struct ConnectionRing {
    conns: Vec<MySqlConnection>,
    next: usize,
}

impl ConnectionRing {
    pub(crate) fn new(hosts: &[String]) -> Self {
        Self {
            conns: hosts.iter().cloned().map(MySqlConnection::new).collect(),
            next: 0,
        }
    }

    pub(crate) fn connections_mut(&mut self) -> impl Iterator<Item = &mut MySqlConnection> {
        self.conns.iter_mut()
    }

    /// Dispatch one statement, starting at the cursor and failing over
    /// around the ring.
    ///
    /// The cursor advances whether or not the attempt succeeds, so load
    /// spreads over the members. A member that answers or rejects ends the
    /// walk; an unreachable member is skipped. When a full pass serves
    /// nothing, every member's delay is pulled down to the probe value and
    /// the ring is walked one more time before giving up.
    ///
    /// `clock` is read per attempt (callers outside tests pass
    /// [`Instant::now`]), so wall time spent in one member counts against
    /// the reconnect gates of the members after it.
    pub(crate) fn dispatch(
        &mut self,
        connector: &dyn Connector,
        settings: &MySqlSettings,
        query: &str,
        clock: impl Fn() -> Instant,
    ) -> Dispatched {
        let size = self.conns.len();
        let start = self.next % size;
        self.next = self.next.wrapping_add(1);

        for pass in 0..2 {
            if pass == 1 {
                // Nothing was reachable. The delays may have grown too
                // high; reset them all to see which members are still
                // alive.
                for conn in &mut self.conns {
                    conn.reset_delay();
                }
            }
            for offset in 0..size {
                let idx = (start + offset) % size;
                match self.conns[idx].run_query(connector, settings, query, &clock) {
                    QueryAttempt::NotConnected => continue,
                    QueryAttempt::Completed(reply) => return Dispatched::Completed(reply),
                    QueryAttempt::Failed(err) => return Dispatched::Failed(err),
                }
            }
        }

        Dispatched::NotConnected
    }
}
