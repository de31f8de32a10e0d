//! Error types for the service binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during startup.

/// Top-level error for the service binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: pandemos_core::config::ConfigError,
    },

    /// The region topology catalog is malformed.
    #[error("topology error: {source}")]
    Topology {
        /// The underlying topology error.
        #[from]
        source: pandemos_model::topology::TopologyError,
    },

    /// The compound registry definitions are malformed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: pandemos_model::registry::RegistryError,
    },

    /// Redis or `PostgreSQL` connection failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying data layer error.
        #[from]
        source: pandemos_db::DbError,
    },
}
