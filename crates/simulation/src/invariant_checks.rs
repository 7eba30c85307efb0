//! Runtime invariant guards over the weekly state.
//!
//! These systems run at the end of every simulated week. Accounting
//! quantities that drift out of bounds are logged, counted, and clamped;
//! a stored volume above capacity tolerance is unrecoverable and aborts
//! the realization.

use bevy::prelude::*;

use crate::error::SimulationError;
use crate::region::{Utilities, WaterNetwork};
use crate::{RealizationStatus, SimClock};

/// Stored volume may exceed capacity by at most this factor before the
/// realization is considered corrupt.
const VOLUME_TOLERANCE: f64 = 1.01;

/// Violations detected during the last validation pass. Read by
/// integration tests.
#[derive(Resource, Default, Debug)]
pub struct CoreInvariantViolations {
    pub fund_bounds: u32,
    pub negative_demand: u32,
    pub volume_bounds: u32,
}

/// Validate utility accounting state.
pub fn validate_utilities(
    clock: Res<SimClock>,
    mut utilities: ResMut<Utilities>,
    mut violations: ResMut<CoreInvariantViolations>,
    status: Res<RealizationStatus>,
) {
    if status.failed() {
        return;
    }
    violations.fund_bounds = 0;
    violations.negative_demand = 0;

    for utility in utilities.0.iter_mut() {
        if !utility.contingency_fund.is_finite()
            || utility.contingency_fund < 0.0
            || utility.contingency_fund > utility.contingency_fund_cap
        {
            warn!(
                "week {}: utility {} fund {} outside [0, {}], clamping",
                clock.week, utility.name, utility.contingency_fund, utility.contingency_fund_cap
            );
            utility.contingency_fund = utility
                .contingency_fund
                .clamp(0.0, utility.contingency_fund_cap);
            if !utility.contingency_fund.is_finite() {
                utility.contingency_fund = 0.0;
            }
            violations.fund_bounds += 1;
        }

        if utility.unfulfilled_demand < 0.0 {
            warn!(
                "week {}: utility {} unfulfilled demand {} negative, zeroing",
                clock.week, utility.name, utility.unfulfilled_demand
            );
            utility.unfulfilled_demand = 0.0;
            violations.negative_demand += 1;
        }
    }
}

/// Validate stored volumes against capacity. Drift beyond tolerance means
/// the mass balance is corrupt; the realization aborts.
pub fn validate_sources(
    clock: Res<SimClock>,
    network: Res<WaterNetwork>,
    mut violations: ResMut<CoreInvariantViolations>,
    mut status: ResMut<RealizationStatus>,
) {
    if status.failed() {
        return;
    }
    violations.volume_bounds = 0;

    for source in &network.sources {
        if !source.kind.has_storage() || !source.online {
            continue;
        }
        if source.available_volume > source.capacity * VOLUME_TOLERANCE {
            violations.volume_bounds += 1;
            status.fail(SimulationError::VolumeAboveCapacity {
                source_id: source.id,
                week: clock.week,
                volume: source.available_volume,
                capacity: source.capacity,
            });
            return;
        }
    }
}
