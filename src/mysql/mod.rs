//! MySQL driver: redundant servers, round-robin dispatch, reconnect backoff.
//!
//! A handle owns one connection per configured host. Statements go to the
//! members in round-robin order; an unreachable member is skipped and
//! reconnected later under multiplicative backoff, and a statement that
//! hits a dying link is retried once on a fresh connection. When every
//! member is down the ring gets one probe pass with lowered delays before
//! the statement is reported as not connected.

mod connection;
pub mod link;
mod pool;
mod result;
pub mod settings;
pub mod wire;

pub use link::{Connector, FieldDef, LinkError, QueryReply, Row, Rows, ServerLink};
pub use settings::MySqlSettings;
pub use wire::WireConnector;

use std::time::Instant;

use crate::db::{DbFlags, SqlDb, SqlDriver};
use crate::error::{InitError, SqlError};
use crate::result::{ErrorResult, NotConnectedResult, SqlResult};

use pool::{ConnectionRing, Dispatched};
use result::MySqlResult;

/// Database handle over one or more redundant MySQL servers.
///
/// Dropping the handle closes every server link.
pub struct MySqlDb {
    settings: MySqlSettings,
    ring: ConnectionRing,
    connector: Box<dyn Connector>,
}

impl MySqlDb {
    /// Parse `connect_string`, build the ring, and eagerly connect every
    /// member. Connect failures are not fatal here; they only prime the
    /// reconnect backoff.
    pub fn init(connect_string: &str) -> Result<Self, InitError> {
        Self::init_with(connect_string, Box::new(WireConnector::new()))
    }

    /// Like [`MySqlDb::init`], with a caller-supplied transport.
    pub fn init_with(
        connect_string: &str,
        connector: Box<dyn Connector>,
    ) -> Result<Self, InitError> {
        let settings = MySqlSettings::parse(connect_string)?;
        let ring = ConnectionRing::new(&settings.hosts);
        let mut db = Self {
            settings,
            ring,
            connector,
        };
        db.connect_all();
        Ok(db)
    }

    fn connect_all(&mut self) {
        for conn in self.ring.connections_mut() {
            conn.connect_at(self.connector.as_ref(), &self.settings, Instant::now());
        }
    }

    fn dispatch(&mut self, query: &str) -> Dispatched {
        self.ring
            .dispatch(self.connector.as_ref(), &self.settings, query, Instant::now)
    }
}

impl SqlDb for MySqlDb {
    fn flags(&self) -> DbFlags {
        DbFlags::BLOCKING
    }

    fn exec(&mut self, query: &str) {
        match self.dispatch(query) {
            Dispatched::NotConnected => {
                tracing::debug!("exec dropped: not connected");
            }
            Dispatched::Completed(_) => {}
            Dispatched::Failed(err) => {
                tracing::debug!("exec failed: {}", err);
            }
        }
    }

    fn query(&mut self, query: &str, callback: &mut dyn FnMut(&mut dyn SqlResult)) {
        match self.dispatch(query) {
            Dispatched::NotConnected => callback(&mut NotConnectedResult),
            Dispatched::Completed(QueryReply::ResultSet(rows)) => {
                callback(&mut MySqlResult::new(rows))
            }
            Dispatched::Completed(QueryReply::Done { .. }) => {
                callback(&mut ErrorResult::new(SqlError::Protocol(
                    "statement returned no result set".into(),
                )))
            }
            Dispatched::Failed(err) => callback(&mut ErrorResult::new(err.into())),
        }
    }
}

/// [`SqlDriver`] registering the MySQL backend under the name `"mysql"`.
pub struct MySqlDriver;

impl SqlDriver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn init(&self, connect_string: &str) -> Result<Box<dyn SqlDb>, InitError> {
        Ok(Box::new(MySqlDb::init(connect_string)?))
    }
}
