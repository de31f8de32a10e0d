//! Pure domain logic for the Pandemos contagion service.
//!
//! Everything in this crate is deterministic and side-effect free: the
//! immutable region topology, the static compound registry, seed
//! derivation, and the spread model that computes each tick's simultaneous
//! global update. The stateful machinery that drives these functions lives
//! in `pandemos-core`.
//!
//! # Modules
//!
//! - [`topology`] -- region graph built once from the startup catalog
//! - [`registry`] -- compound definitions consulted during scoring
//! - [`seed`] -- pure seed derivation (no external entropy, ever)
//! - [`spread`] -- the per-tick simultaneous update

pub mod registry;
pub mod seed;
pub mod spread;
pub mod topology;

pub use registry::{Compound, CompoundRegistry, RegistryError};
pub use seed::{outcome_seed, region_fraction, tick_seed, unit_fraction};
pub use spread::{SpreadParams, compute, drift_resistance};
pub use topology::{RegionCatalogEntry, RegionGraph, TopologyError};
