//! Risk-of-failure evaluation.
//!
//! Each week the continuity model is rerun over copies of the live state,
//! once per historical flow year: rerun `r` shifts every hydrologic input
//! back `r + 1` years while demand stays put, so the same system is
//! stress-tested against the streamflows the region has actually seen.
//! The risk of failure is the fraction of rerun weeks in which a utility's
//! storage fell below the failure ratio (storage risk) or its demand
//! outgrew treatment capacity (treatment risk).

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::is_first_week_of_year;
use crate::continuity::continuity_step;
use crate::error::SimulationError;
use crate::region::{Utilities, WaterNetwork};
use crate::source_graph::SourceGraph;
use crate::utility::Utility;
use crate::water_sources::WaterSource;
use crate::{RealizationStatus, SimClock};

/// Horizons and thresholds for the nested reruns.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct RofSettings {
    /// Number of shifted flow years evaluated per week.
    pub n_rof_realizations: usize,
    /// Forward horizon of the short-term rerun, in weeks.
    pub short_term_horizon_weeks: usize,
    /// Forward horizon of the long-term rerun, in weeks.
    pub long_term_horizon_weeks: usize,
    /// Stored-to-capacity ratio below which a week counts as a storage
    /// failure.
    pub storage_failure_ratio: f64,
}

impl Default for RofSettings {
    fn default() -> Self {
        Self {
            n_rof_realizations: 50,
            short_term_horizon_weeks: 52,
            long_term_horizon_weeks: 52 * 5,
            storage_failure_ratio: 0.2,
        }
    }
}

/// Component risks for one utility.
#[derive(Debug, Clone, Copy, Default)]
pub struct RofEstimate {
    pub storage: f64,
    pub treatment: f64,
}

impl RofEstimate {
    /// The headline risk is whichever component is worse.
    pub fn overall(&self) -> f64 {
        self.storage.max(self.treatment)
    }
}

/// Reusable copy of the live world for the nested reruns. Input series
/// and configuration are cloned once and reused; only numeric state is
/// refreshed per rerun.
#[derive(Resource, Default)]
pub struct RofScratch {
    sources: Vec<WaterSource>,
    utilities: Vec<Utility>,
    primed: bool,
}

impl RofScratch {
    fn sync(&mut self, sources: &[WaterSource], utilities: &[Utility]) {
        if !self.primed {
            self.sources = sources.to_vec();
            self.utilities = utilities.to_vec();
            self.primed = true;
        } else {
            // Same shape every week: refresh in place, keeping the series
            // allocations alive across reruns.
            for (copy, live) in self.sources.iter_mut().zip(sources) {
                copy.clone_from(live);
            }
            for (copy, live) in self.utilities.iter_mut().zip(utilities) {
                copy.clone_from(live);
            }
        }
        for utility in &mut self.utilities {
            utility.used_for_realization = false;
        }
    }

    /// Drop the primed copy, e.g. between realizations.
    pub fn reset(&mut self) {
        self.primed = false;
        self.sources.clear();
        self.utilities.clear();
    }
}

/// Rerun the continuity model over shifted flow years and count failure
/// weeks per utility.
#[allow(clippy::too_many_arguments)]
pub fn compute_rofs(
    week: usize,
    horizon_weeks: usize,
    n_rof_realizations: usize,
    storage_failure_ratio: f64,
    use_demand_projection: bool,
    sources: &[WaterSource],
    utilities: &[Utility],
    graph: &SourceGraph,
    scratch: &mut RofScratch,
) -> Result<Vec<RofEstimate>, SimulationError> {
    let n_utilities = utilities.len();
    let mut storage_failures = vec![0u64; n_utilities];
    let mut treatment_failures = vec![0u64; n_utilities];

    for rof_realization in 0..n_rof_realizations {
        scratch.sync(sources, utilities);
        for w in (week + 1)..=(week + horizon_weeks) {
            continuity_step(
                w,
                rof_realization as i32,
                &mut scratch.sources,
                &mut scratch.utilities,
                graph,
                true,
                use_demand_projection,
            )?;
            for (index, utility) in scratch.utilities.iter().enumerate() {
                if utility.storage_to_capacity_ratio() < storage_failure_ratio {
                    storage_failures[index] += 1;
                }
                if utility.unrestricted_demand > utility.total_treatment_capacity {
                    treatment_failures[index] += 1;
                }
            }
        }
    }

    let total_weeks = (n_rof_realizations * horizon_weeks) as f64;
    Ok((0..n_utilities)
        .map(|index| RofEstimate {
            storage: storage_failures[index] as f64 / total_weeks,
            treatment: treatment_failures[index] as f64 / total_weeks,
        })
        .collect())
}

/// True when every utility's demand trace covers the rerun horizon from
/// this week.
fn horizon_in_trace(week: usize, horizon_weeks: usize, utilities: &[Utility]) -> bool {
    utilities
        .iter()
        .all(|u| week + horizon_weeks < u.demand_series.len())
}

/// System: evaluate short-term risk of failure against the state frozen
/// at the start of the week.
pub fn update_short_term_rof(
    clock: Res<SimClock>,
    settings: Res<RofSettings>,
    network: Res<WaterNetwork>,
    mut utilities: ResMut<Utilities>,
    mut scratch: ResMut<RofScratch>,
    mut status: ResMut<RealizationStatus>,
) {
    if status.failed() {
        return;
    }
    if !horizon_in_trace(clock.week, settings.short_term_horizon_weeks, &utilities.0) {
        debug!(
            "week {}: demand trace too short for short-term risk horizon",
            clock.week
        );
        return;
    }

    match compute_rofs(
        clock.week,
        settings.short_term_horizon_weeks,
        settings.n_rof_realizations,
        settings.storage_failure_ratio,
        false,
        &network.sources,
        &utilities.0,
        &network.graph,
        &mut scratch,
    ) {
        Ok(estimates) => {
            for (utility, estimate) in utilities.0.iter_mut().zip(&estimates) {
                utility.short_term_storage_rof = estimate.storage;
                utility.short_term_treatment_rof = estimate.treatment;
                utility.short_term_rof = estimate.overall();
            }
        }
        Err(error) => status.fail(error),
    }
}

/// System: refresh demand projections (re-fitting once a year) and
/// evaluate long-term risk of failure under projected demand.
pub fn update_long_term_rof(
    clock: Res<SimClock>,
    settings: Res<RofSettings>,
    network: Res<WaterNetwork>,
    mut utilities: ResMut<Utilities>,
    mut scratch: ResMut<RofScratch>,
    mut status: ResMut<RealizationStatus>,
) {
    if status.failed() {
        return;
    }

    let reproject = is_first_week_of_year(clock.week);
    for utility in utilities.0.iter_mut() {
        if let Err(error) = utility.calculate_demand_estimate(clock.week, reproject) {
            status.fail(error);
            return;
        }
    }

    if !horizon_in_trace(clock.week, settings.long_term_horizon_weeks, &utilities.0) {
        debug!(
            "week {}: demand trace too short for long-term risk horizon",
            clock.week
        );
        return;
    }

    match compute_rofs(
        clock.week,
        settings.long_term_horizon_weeks,
        settings.n_rof_realizations,
        settings.storage_failure_ratio,
        true,
        &network.sources,
        &utilities.0,
        &network.graph,
        &mut scratch,
    ) {
        Ok(estimates) => {
            for (utility, estimate) in utilities.0.iter_mut().zip(&estimates) {
                utility.long_term_storage_rof = estimate.storage;
                utility.long_term_treatment_rof = estimate.treatment;
                utility.long_term_rof = estimate.overall();
            }
        }
        Err(error) => status.fail(error),
    }
}
