//! Error types shared by every driver.

use thiserror::Error;

/// Failure reported while executing a query or iterating its result.
///
/// Clone-able on purpose: the degenerate result objects hand the same error
/// back on every cursor call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SqlError {
    /// No server in the ring could be reached.
    #[error("Not connected to database")]
    NotConnected,

    /// The server rejected the statement.
    #[error("{message} (server error {code})")]
    Server { code: u16, message: String },

    /// The link dropped mid-query and the bounded retry ran out.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The server sent traffic the client could not make sense of.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Connect-string parse failure. Always fatal to driver init.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    /// A token without `=`.
    #[error("Missing value in connect string: {0}")]
    MissingValue(String),

    /// A key this driver does not know.
    #[error("Unknown connect string: {0}")]
    UnknownKey(String),

    /// A numeric key with a non-numeric value.
    #[error("Invalid value for {key}: {value}")]
    InvalidNumber { key: String, value: String },

    /// Not a single `host`/`hostaddr` in the string.
    #[error("No hosts given in connect string")]
    NoHosts,
}

/// Driver construction failure.
#[derive(Debug, Error)]
pub enum InitError {
    /// The registry has no driver under the requested name.
    #[error("Unknown database driver: {0}")]
    UnknownDriver(String),

    #[error(transparent)]
    Settings(#[from] SettingsError),
}
