//! Core types and shared functionality for critcss.
//!
//! This crate provides:
//! - The two-tier stylesheet cache (memory + disk)
//! - The SQLite result store
//! - Unified error types
//! - Layered configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod store;

pub use cache::{CacheStats, InvalidateTarget, InvalidationReport, Provenance, StylesheetCache, stylesheet_key};
pub use config::AppConfig;
pub use error::{Error, ErrorKind};
pub use store::{CriticalCssRecord, ResultStore};
