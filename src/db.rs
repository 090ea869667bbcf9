//! Driver facade: the contract the lookup subsystem programs against.

use crate::error::InitError;
use crate::result::SqlResult;

/// Driver capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbFlags(u32);

impl DbFlags {
    /// The driver blocks the calling thread for the duration of each call.
    pub const BLOCKING: DbFlags = DbFlags(0x01);

    pub const fn empty() -> Self {
        DbFlags(0)
    }

    pub const fn contains(self, other: DbFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for DbFlags {
    type Output = DbFlags;

    fn bitor(self, rhs: DbFlags) -> DbFlags {
        DbFlags(self.0 | rhs.0)
    }
}

/// A live database handle over one or more redundant servers.
///
/// Dropping the handle closes every server connection.
pub trait SqlDb {
    /// Capability flags of the backing driver.
    fn flags(&self) -> DbFlags;

    /// Run a statement and ignore its outcome.
    fn exec(&mut self, query: &str);

    /// Run a statement and hand its result to `callback`.
    ///
    /// The callback runs exactly once, synchronously, before this method
    /// returns: with a row cursor on success, or with a degenerate result
    /// carrying the failure otherwise. The result must not be retained past
    /// the callback.
    fn query(&mut self, query: &str, callback: &mut dyn FnMut(&mut dyn SqlResult));
}

/// A named driver that mints [`SqlDb`] handles from a connect string.
pub trait SqlDriver {
    fn name(&self) -> &'static str;

    fn init(&self, connect_string: &str) -> Result<Box<dyn SqlDb>, InitError>;
}

/// Registry of available drivers, consulted by name.
///
/// Built once by whoever owns process setup and passed to the code that
/// opens databases; there is no global driver list.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: Vec<Box<dyn SqlDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self { drivers: Vec::new() }
    }

    /// Register a driver. The first driver registered under a name wins.
    pub fn register(&mut self, driver: Box<dyn SqlDriver>) {
        self.drivers.push(driver);
    }

    /// Construct a handle with the named driver.
    pub fn init(&self, name: &str, connect_string: &str) -> Result<Box<dyn SqlDb>, InitError> {
        match self.drivers.iter().find(|driver| driver.name() == name) {
            Some(driver) => driver.init(connect_string),
            None => Err(InitError::UnknownDriver(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SqlError;
    use crate::result::ErrorResult;

    struct NullDb;

    impl SqlDb for NullDb {
        fn flags(&self) -> DbFlags {
            DbFlags::BLOCKING
        }

        fn exec(&mut self, _query: &str) {}

        fn query(&mut self, _query: &str, callback: &mut dyn FnMut(&mut dyn SqlResult)) {
            callback(&mut ErrorResult::new(SqlError::NotConnected));
        }
    }

    struct NullDriver;

    impl SqlDriver for NullDriver {
        fn name(&self) -> &'static str {
            "null"
        }

        fn init(&self, _connect_string: &str) -> Result<Box<dyn SqlDb>, InitError> {
            Ok(Box::new(NullDb))
        }
    }

    #[test]
    fn test_registry_finds_driver_by_name() {
        let mut registry = DriverRegistry::new();
        registry.register(Box::new(NullDriver));

        let db = registry.init("null", "host=x").unwrap();
        assert!(db.flags().contains(DbFlags::BLOCKING));
    }

    #[test]
    fn test_registry_rejects_unknown_driver() {
        let registry = DriverRegistry::new();

        match registry.init("pgsql", "host=x") {
            Err(InitError::UnknownDriver(name)) => assert_eq!(name, "pgsql"),
            other => panic!("expected UnknownDriver, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_flags_bit_operations() {
        let flags = DbFlags::empty();
        assert!(!flags.contains(DbFlags::BLOCKING));
        assert!((flags | DbFlags::BLOCKING).contains(DbFlags::BLOCKING));
    }
}
