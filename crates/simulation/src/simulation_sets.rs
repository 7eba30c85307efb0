//! Deterministic weekly ordering via `SystemSet` phases.
//!
//! These sets establish a contract for system execution order within the
//! `FixedUpdate` schedule, which the runner executes exactly once per
//! simulated week. Plugins place their systems into the appropriate set so
//! that inter-plugin ordering is explicit and testable rather than relying
//! on implicit timing assumptions.
//!
//! # Weekly phases (`SimulationSet`)
//!
//! ```text
//! PreSim  →  Simulation  →  PostSim
//! ```
//!
//! * **PreSim** – Risk-of-failure evaluation against the state frozen at
//!   the start of the week, and the demand projection refresh it reads.
//! * **Simulation** – Infrastructure triggering (which consumes this
//!   week's long-term risk) followed by the continuity step: demand
//!   splitting, topological source balance, utility totals.
//! * **PostSim** – Aggregation and validation: weekly records, invariant
//!   checks, and the week counter advance. These only read simulation
//!   state, so output consumers can rely on their ordering.

use bevy::prelude::*;

/// Ordered phases for systems running in the `FixedUpdate` schedule.
///
/// Configured as a chain: `PreSim` → `Simulation` → `PostSim`.
/// Individual systems use `.in_set(SimulationSet::X)` when registering,
/// which gives them automatic ordering relative to other phases while
/// retaining fine-grained `.after()` constraints within the same phase.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SimulationSet {
    /// Risk-of-failure evaluation and projection refresh.
    PreSim,
    /// Infrastructure triggering and the weekly continuity step.
    Simulation,
    /// Records, invariant checks, week advance.
    PostSim,
}
