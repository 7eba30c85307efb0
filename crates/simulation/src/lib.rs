//! Weekly hydrologic-financial simulation of a regional water supply
//! system.
//!
//! A directed network of water sources (reservoirs, quarries, intakes,
//! reuse plants) is balanced once per week in topological order, driven by
//! the demands of the utilities that own allocations in it. Utilities keep
//! contingency funds, issue bonds for new infrastructure, and decide when
//! to build from nested risk-of-failure reruns of the same continuity
//! model over historically shifted flow years.
//!
//! The engine is headless and deterministic: the outer runner builds one
//! world per stochastic realization and executes the `FixedUpdate`
//! schedule once per simulated week.

pub mod bonds;
pub mod config;
pub mod continuity;
pub mod error;
pub mod infrastructure;
pub mod invariant_checks;
pub mod records;
pub mod region;
pub mod rof;
pub mod simulation_sets;
pub mod source_graph;
pub mod utility;
pub mod water_sources;
pub mod wwtp;

#[cfg(test)]
mod integration_tests;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use error::SimulationError;
use invariant_checks::CoreInvariantViolations;
use records::UtilityRecords;
use region::Utilities;
use rof::{RofScratch, RofSettings};
use simulation_sets::SimulationSet;
use utility::InfrastructureTriggeredEvent;

/// Current simulation week, starting at 0 and advanced at the end of each
/// `FixedUpdate` pass.
#[derive(Resource, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SimClock {
    pub week: usize,
}

/// Outcome of the running realization. The first runtime invariant
/// violation parks its error here; every weekly system becomes a no-op
/// afterwards and the outer runner aborts the realization.
#[derive(Resource, Debug, Clone, Default)]
pub struct RealizationStatus {
    error: Option<SimulationError>,
}

impl RealizationStatus {
    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&SimulationError> {
        self.error.as_ref()
    }

    /// Record the first failure; later ones are dropped.
    pub fn fail(&mut self, error: SimulationError) {
        if self.error.is_none() {
            bevy::log::error!("realization aborted: {error}");
            self.error = Some(error);
        }
    }
}

/// System: close out the week. Clears the per-week build list and moves
/// the clock.
fn advance_week(mut clock: ResMut<SimClock>, mut utilities: ResMut<Utilities>) {
    for utility in utilities.0.iter_mut() {
        utility.infra_built_last_week.clear();
    }
    clock.week += 1;
}

/// Wires one simulated week into `FixedUpdate`:
///
/// ```text
/// PreSim:     short-term risk → long-term risk
/// Simulation: infrastructure triggers → continuity step
/// PostSim:    records → invariant checks → week advance
/// ```
///
/// The runner must insert [`region::WaterNetwork`] and
/// [`region::Utilities`] (from [`region::RegionConfig::build_realization`])
/// before stepping the schedule.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<SimClock>()
            .init_resource::<RealizationStatus>()
            .init_resource::<RofSettings>()
            .init_resource::<RofScratch>()
            .init_resource::<UtilityRecords>()
            .init_resource::<CoreInvariantViolations>()
            .add_event::<InfrastructureTriggeredEvent>()
            .configure_sets(
                FixedUpdate,
                (
                    SimulationSet::PreSim,
                    SimulationSet::Simulation,
                    SimulationSet::PostSim,
                )
                    .chain(),
            )
            .add_systems(
                FixedUpdate,
                (rof::update_short_term_rof, rof::update_long_term_rof)
                    .chain()
                    .in_set(SimulationSet::PreSim),
            )
            .add_systems(
                FixedUpdate,
                (
                    utility::handle_infrastructure_triggers,
                    continuity::run_continuity,
                )
                    .chain()
                    .in_set(SimulationSet::Simulation),
            )
            .add_systems(
                FixedUpdate,
                (
                    records::record_week,
                    invariant_checks::validate_utilities,
                    invariant_checks::validate_sources,
                    advance_week,
                )
                    .chain()
                    .in_set(SimulationSet::PostSim),
            );
    }
}
