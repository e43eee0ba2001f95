//! The metadata store: run coordination, artifact entries, metrics,
//! and node registration.
//!
//! The store is the source of ordering truth for a federation of
//! pipelines. Every backend must satisfy [`base::client::MetadataClient`];
//! this crate ships the SQLite reference backend.

pub mod base;
pub mod data;
pub mod id;
pub mod sqlite;
