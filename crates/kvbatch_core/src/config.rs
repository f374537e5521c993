//! Store configuration.

/// Default database name.
pub const DEFAULT_DB_NAME: &str = "keyval-store";

/// Default table name.
pub const DEFAULT_TABLE_NAME: &str = "keyval";

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Name of the database to open.
    pub db_name: String,

    /// Name of the table inside the database.
    pub table_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: DEFAULT_DB_NAME.to_string(),
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the database name.
    #[must_use]
    pub fn db_name(mut self, name: impl Into<String>) -> Self {
        self.db_name = name.into();
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }
}
