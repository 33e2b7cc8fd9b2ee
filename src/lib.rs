pub use tether_core::*;
pub use tether_sqlite::*;

/// Connection to a SQLite database.
pub type SqliteConnection = Connection<SqliteEngine>;
