//! Water source nodes and their weekly mass balance.
//!
//! A source is one hydrologic node of the network: a storage reservoir, a
//! flooded quarry with a diversion cap, a run-of-river intake (plain or
//! allocation-tracked), or a reuse plant. All variants share one flat
//! struct tagged by [`SourceKind`]; behavior differences live in the
//! `match` arms of the continuity step.

pub mod types;

mod balance;

pub use types::{HydrologySeries, SourceKind, StorageArea, WaterSource};
