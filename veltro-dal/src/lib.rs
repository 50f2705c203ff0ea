//! Multi-layer data access coordinator (C6): an ordered, non-empty stack
//! of storage tiers with read-promotion and write-through semantics.

pub mod coordinator;
pub mod error;
pub mod layers;
pub mod tier;

pub use coordinator::{Dal, DalConfig};
pub use error::DalError;
pub use tier::{DalStats, Layer, LayerStats, SetOptions, TierConfig, Transaction};
