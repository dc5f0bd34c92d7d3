//! Database module: models, schema and queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows and request payloads
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: pool setup and the `OpsStorage` handle
//! - one file of `impl OpsStorage` queries per table group

pub mod assistant;
pub mod audit;
pub mod files;
pub mod kitchens;
pub mod models;
pub mod profiles;
pub mod projects;
pub mod reminders;
pub mod schema;
pub mod sqlite;
pub mod tasks;

pub use reminders::ReminderCounts;
pub use schema::SQLITE_INIT;
pub use sqlite::{OpsStorage, SqlitePool};
pub use tasks::TaskFilter;
