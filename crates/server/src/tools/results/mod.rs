//! Stored critical CSS result tools.

pub mod delete;
pub mod get;

pub use delete::{ResultDeleteParams, delete_impl};
pub use get::{ResultGetParams, get_impl};
