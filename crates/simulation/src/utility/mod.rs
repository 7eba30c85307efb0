//! Water utilities: demand, finances, and infrastructure planning.
//!
//! A utility owns allocations in a set of sources, splits its weekly
//! demand across them (intakes and reuse first, reservoirs
//! proportionally), keeps a bounded contingency fund fed by a fixed
//! revenue share and drained by drought mitigation, and triggers new
//! infrastructure from long-term risk of failure or realized demand
//! growth, financing it with bonds.

pub mod types;

mod demand;
mod finance;
mod infra;

pub use infra::{handle_infrastructure_triggers, InfrastructureTriggeredEvent};
pub use types::{ProjectionSettings, Utility};
