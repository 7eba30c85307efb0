//! Weekly continuity step: demand split, topological mass balance,
//! utility post-update.

use bevy::prelude::*;

use crate::config::WEEKS_IN_YEAR;
use crate::error::SimulationError;
use crate::region::{Utilities, WaterNetwork};
use crate::source_graph::SourceGraph;
use crate::utility::Utility;
use crate::water_sources::WaterSource;
use crate::{RealizationStatus, SimClock};

/// Sentinel for the live simulation: no flow-year shift is applied.
pub const LIVE_REALIZATION: i32 = -1;

/// Advance the whole network one week.
///
/// Utilities split demand against last week's availability and announce
/// their effluent releases; sources then balance in topological order so
/// each sees its upstream spillage (plus effluent discharged into it); the
/// utilities finally refresh their availability totals and, on the live
/// path, settle the week's finances.
///
/// `rof_realization` shifts the hydrologic inputs back by whole flow
/// years for risk-of-failure reruns; [`LIVE_REALIZATION`] applies no
/// shift.
pub fn continuity_step(
    week: usize,
    rof_realization: i32,
    sources: &mut [WaterSource],
    utilities: &mut [Utility],
    graph: &SourceGraph,
    apply_demand_buffer: bool,
    apply_demand_projection: bool,
) -> Result<(), SimulationError> {
    let n_utilities = utilities.len();
    let mut demands = vec![vec![0.0; n_utilities]; sources.len()];
    let mut discharges = vec![0.0; sources.len()];

    for utility in utilities.iter_mut() {
        utility.split_demands(
            week,
            &mut demands,
            apply_demand_buffer,
            apply_demand_projection,
            sources,
        );
        utility.calculate_wastewater(week, &mut discharges);
    }

    let effective_week =
        week as i64 - ((rof_realization + 1) as f64 * WEEKS_IN_YEAR).round() as i64;

    for &id in graph.topological_order() {
        let upstream_spillage: f64 = graph
            .upstream(id)
            .iter()
            .map(|&up| sources[up].total_outflow)
            .sum();
        sources[id].apply_continuity(
            effective_week,
            upstream_spillage + discharges[id],
            &demands[id],
        )?;
    }

    for utility in utilities.iter_mut() {
        utility.update_total_available_volume(sources);
        if utility.used_for_realization {
            utility.update_fund_and_debt(week, sources)?;
        }
    }

    Ok(())
}

/// System: run the live continuity step for the current week.
pub fn run_continuity(
    clock: Res<SimClock>,
    mut network: ResMut<WaterNetwork>,
    mut utilities: ResMut<Utilities>,
    mut status: ResMut<RealizationStatus>,
) {
    if status.failed() {
        return;
    }
    let WaterNetwork { sources, graph } = &mut *network;
    if let Err(error) = continuity_step(
        clock.week,
        LIVE_REALIZATION,
        sources,
        &mut utilities.0,
        graph,
        false,
        false,
    ) {
        status.fail(error);
    }
}
