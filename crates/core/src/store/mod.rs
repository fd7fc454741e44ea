//! SQLite persistence for generated critical CSS.

pub mod connection;
pub mod migrations;
pub mod results;

pub use connection::ResultStore;
pub use results::CriticalCssRecord;
