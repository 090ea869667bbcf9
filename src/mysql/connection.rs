//! Per-server connection state: reconnect rate limiting and backoff.

use std::time::{Duration, Instant};

use super::link::{Connector, LinkError, QueryReply, ServerLink};
use super::settings::MySqlSettings;

/// Floor for the reconnect delay, and its value after a successful connect.
pub(crate) const CONNECT_MIN_DELAY: Duration = Duration::from_secs(1);
/// Ceiling for the reconnect delay.
pub(crate) const CONNECT_MAX_DELAY: Duration = Duration::from_secs(60 * 30);
/// Delay forced onto every member before the ring's second dispatch pass.
pub(crate) const CONNECT_RESET_DELAY: Duration = Duration::from_secs(15);
/// Multiplier applied to the delay on every consecutive failure after the
/// first.
const CONNECT_BACKOFF_FACTOR: u32 = 5;

/// Outcome of one query attempt on one ring member.
#[derive(Debug)]
pub(crate) enum QueryAttempt {
    /// Could not reach the server: rate-limited, connect failed, or the
    /// bounded mid-query retry ran out. The ring moves to the next member.
    NotConnected,
    /// The server answered.
    Completed(QueryReply),
    /// The server rejected the statement, or its reply did not parse.
    /// Surfaces to the caller with no failover.
    Failed(LinkError),
}

/// One ring member: a server endpoint plus its connect state.
///
/// A host beginning with `/` names a unix socket; the distinction is the
/// transport's business, the backoff logic is identical.
pub(crate) struct MySqlConnection {
    host: String,
    link: Option<Box<dyn ServerLink>>,
    connect_delay: Duration,
    failure_count: u32,
    last_connect: Option<Instant>,
}

impl MySqlConnection {
    pub(crate) fn new(host: String) -> Self {
        Self {
            host,
            link: None,
            connect_delay: CONNECT_MIN_DELAY,
            failure_count: 0,
            last_connect: None,
        }
    }

    /// Forget the link without touching the backoff state.
    fn mark_disconnected(&mut self) {
        self.link = None;
    }

    /// Pull the reconnect gate down to the probe delay.
    pub(crate) fn reset_delay(&mut self) {
        self.connect_delay = CONNECT_RESET_DELAY;
    }

    /// Try to connect, honoring the reconnect rate limit. Returns whether
    /// the member is connected afterwards.
    ///
    /// A refused attempt (still inside the delay window) changes nothing,
    /// not even the failure count. A real attempt records `last_connect`
    /// whatever its outcome; failure grows the delay by the backoff factor
    /// once there has been more than one consecutive failure.
    pub(crate) fn connect_at(
        &mut self,
        connector: &dyn Connector,
        settings: &MySqlSettings,
        now: Instant,
    ) -> bool {
        if self.link.is_some() {
            return true;
        }

        // Never try reconnecting faster than the current delay allows.
        if let Some(last) = self.last_connect {
            if now < last + self.connect_delay {
                return false;
            }
        }
        self.last_connect = Some(now);

        match connector.connect(&self.host, settings) {
            Ok(link) => {
                self.link = Some(link);
                self.failure_count = 0;
                self.connect_delay = CONNECT_MIN_DELAY;
                tracing::info!(
                    "Connected to {}{} ({})",
                    self.host,
                    if settings.uses_tls(&self.host) { " using TLS" } else { "" },
                    settings.dbname.as_deref().unwrap_or("")
                );
                true
            }
            Err(err) => {
                if self.failure_count > 0 {
                    self.connect_delay =
                        (self.connect_delay * CONNECT_BACKOFF_FACTOR).min(CONNECT_MAX_DELAY);
                }
                self.failure_count += 1;
                tracing::error!(
                    "Connect failed to {} ({}): {} - waiting for {} seconds before retry",
                    self.host,
                    settings.dbname.as_deref().unwrap_or(""),
                    err,
                    self.connect_delay.as_secs()
                );
                false
            }
        }
    }

    /// Run one statement, reconnecting once if the link drops mid-query.
    ///
    /// The immediate retry goes through the normal rate-limited connect, so
    /// a link that died within its member's delay window is not retried
    /// here; the ring moves on instead. Each attempt samples `clock` anew,
    /// which lets the time a slow statement spent dying count toward the
    /// reconnect gate.
    pub(crate) fn run_query(
        &mut self,
        connector: &dyn Connector,
        settings: &MySqlSettings,
        query: &str,
        clock: impl Fn() -> Instant,
    ) -> QueryAttempt {
        for _ in 0..2 {
            if !self.connect_at(connector, settings, clock()) {
                return QueryAttempt::NotConnected;
            }
            let Some(link) = self.link.as_mut() else {
                return QueryAttempt::NotConnected;
            };
            match link.run_query(query) {
                Ok(reply) => return QueryAttempt::Completed(reply),
                Err(LinkError::ConnectionLost(err)) => {
                    tracing::warn!("Connection to {} lost mid-query: {}", self.host, err);
                    self.mark_disconnected();
                }
                Err(err) => return QueryAttempt::Failed(err),
            }
        }

        // Connected, lost it, reconnected, lost it again.
        QueryAttempt::NotConnected
    }

    #[cfg(test)]
    pub(crate) fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    #[cfg(test)]
    pub(crate) fn connect_delay(&self) -> Duration {
        self.connect_delay
    }

    #[cfg(test)]
    pub(crate) fn failure_count(&self) -> u32 {
        self.failure_count
    }
}
