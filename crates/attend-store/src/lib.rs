//! attend-store — SQLite persistence for identities and the attendance log.
//!
//! One database file holds both tables. Embeddings are stored as JSON
//! arrays; timestamps as RFC 3339 in local time, with the local calendar
//! date kept alongside for per-day queries.

mod csv;
pub mod database;

pub use database::{Database, DatabaseError};
