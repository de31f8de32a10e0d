//! Data layer for the Pandemos contagion service (Redis + `PostgreSQL`).
//!
//! Redis backs the two coordination concerns: the leader lock the tick
//! scheduler contends on, and a hot mirror of the latest world snapshot
//! for cold API replicas. `PostgreSQL` receives insert-only copies of the
//! audit trail for operator queries and retention. Neither store is
//! authoritative at runtime -- the in-process state store and audit log in
//! `pandemos-core` are -- so the whole crate is optional for single-node
//! and test runs.
//!
//! # Modules
//!
//! - [`redis`] -- Redis hot-state mirror operations
//! - [`lock`] -- Redis-backed [`LeaderLock`](pandemos_core::LeaderLock)
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`audit_store`] -- Insert-only tick/action history mirror
//! - [`error`] -- Shared error types

pub mod audit_store;
pub mod error;
pub mod lock;
pub mod postgres;
pub mod redis;

// Re-export primary types for convenience.
pub use audit_store::AuditStore;
pub use error::DbError;
pub use lock::RedisLeaderLock;
pub use postgres::{PostgresConfig, PostgresPool};
pub use redis::RedisPool;
