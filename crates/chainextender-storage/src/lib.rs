//! chainextender-storage — storage backends for ChainExtender.
//!
//! Backends:
//! - [`memory`] — in-memory (dev/testing, no persistence)
//! - `postgres` — PostgreSQL via `sqlx` (feature `postgres`)
//!
//! Both implement [`chainextender_core::Store`] with the same referential
//! rules, so pipeline tests against the memory store catch ordering bugs
//! that Postgres would reject.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryStore;

#[cfg(feature = "postgres")]
pub use postgres::{PostgresOptions, PostgresStore};
