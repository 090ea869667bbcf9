//! SQL driver layer for mail-server lookups: redundant servers behind one
//! handle, round-robin dispatch, automatic reconnect with backoff.
//!
//! The crate has two layers. [`db`] and [`result`] define the driver-neutral
//! contract: a [`SqlDb`] handle that runs statements, a [`SqlResult`] cursor
//! the `query` callback walks, and a [`DriverRegistry`] that maps driver
//! names to implementations. [`mysql`] is the one backend: it speaks the
//! MySQL client protocol over blocking sockets and hides any number of
//! redundant servers behind a single handle.
//!
//! A statement goes to the ring members in round-robin order. A member that
//! cannot be reached is skipped and reconnected later under multiplicative
//! backoff; a statement that hits a dying link is retried once on a fresh
//! connection. A query can fail, but it never blocks on a dead server for
//! longer than the connect attempts themselves take.
//!
//! ```ignore
//! use sqlring::{DriverRegistry, MySqlDriver};
//!
//! let mut registry = DriverRegistry::new();
//! registry.register(Box::new(MySqlDriver));
//!
//! let mut db = registry.init(
//!     "mysql",
//!     "host=sql1.example.com host=sql2.example.com user=auth dbname=mail",
//! )?;
//!
//! db.query("SELECT userid, password FROM users", &mut |result| {
//!     while let Ok(true) = result.next_row() {
//!         let user = result.find_field_value("userid");
//!         let pass = result.find_field_value("password");
//!         println!("{user:?} {pass:?}");
//!     }
//! });
//! ```

pub mod db;
pub mod error;
pub mod mysql;
pub mod result;

pub use db::{DbFlags, DriverRegistry, SqlDb, SqlDriver};
pub use error::{InitError, SettingsError, SqlError};
pub use mysql::{MySqlDb, MySqlDriver};
pub use result::{ErrorResult, NotConnectedResult, SqlResult};
