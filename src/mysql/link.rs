//! Transport seam between the pool engine and the server wire code.
//!
//! The pool cares about three things: opening a link, running one statement
//! on it, and telling a dead link apart from a server that said no. Packet
//! handling lives behind these traits, so the engine runs against scripted
//! links in tests and against [`crate::mysql::wire::WireConnector`] in
//! production.

use std::collections::VecDeque;

use thiserror::Error;

use crate::error::SqlError;

/// One row, field values in column order, `None` for SQL NULL.
pub type Row = Vec<Option<String>>;

/// Metadata for one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
}

/// Failure reported by a server link.
///
/// `ConnectionLost` is the one retryable class: the pool marks the link dead
/// and tries once more. Everything else bubbles straight to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The transport broke: connect refused, reset, EOF mid-packet.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// ERR packet from the server.
    #[error("{message} (server error {code})")]
    Server { code: u16, message: String },

    /// The server sent bytes that do not parse.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::ConnectionLost(err.to_string())
    }
}

impl From<LinkError> for SqlError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::ConnectionLost(msg) => SqlError::ConnectionLost(msg),
            LinkError::Server { code, message } => SqlError::Server { code, message },
            LinkError::Protocol(msg) => SqlError::Protocol(msg),
        }
    }
}

/// Reply to one statement.
#[derive(Debug)]
pub enum QueryReply {
    /// OK packet: the statement ran and produced no result set.
    Done { affected_rows: u64 },
    /// A result set, fully buffered.
    ResultSet(Rows),
}

/// A buffered result set.
///
/// Rows are read off the wire in full before the reply is handed over. If
/// the stream broke part-way through, the rows received up to the break are
/// still served and the break is reported once the buffer drains, then on
/// every call after that.
#[derive(Debug, Default)]
pub struct Rows {
    fields: Vec<FieldDef>,
    rows: VecDeque<Row>,
    tail: Option<LinkError>,
}

impl Rows {
    pub fn new(fields: Vec<FieldDef>, rows: Vec<Row>, tail: Option<LinkError>) -> Self {
        Self {
            fields,
            rows: rows.into(),
            tail,
        }
    }

    /// Field metadata, in column order.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Take the next buffered row.
    ///
    /// `Ok(None)` is the end of the result and stays the end; a terminal
    /// error likewise repeats.
    pub fn fetch(&mut self) -> Result<Option<Row>, LinkError> {
        match self.rows.pop_front() {
            Some(row) => Ok(Some(row)),
            None => match &self.tail {
                Some(err) => Err(err.clone()),
                None => Ok(None),
            },
        }
    }
}

/// One authenticated link to one server.
pub trait ServerLink {
    /// Run one statement and buffer its reply.
    fn run_query(&mut self, query: &str) -> Result<QueryReply, LinkError>;
}

/// Opens server links.
///
/// The production connector speaks the wire protocol; tests substitute
/// scripted links. Any error from `connect` counts as a connect failure and
/// feeds the backoff of the member being connected.
pub trait Connector {
    fn connect(
        &self,
        host: &str,
        settings: &super::settings::MySqlSettings,
    ) -> Result<Box<dyn ServerLink>, LinkError>;
}
