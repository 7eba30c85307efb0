//! Shared fixtures for the scenario tests.

use bevy::app::App;
use bevy::prelude::FixedUpdate;

use crate::bonds::BondKind;
use crate::region::{
    BondConfig, InfraPlanConfig, RegionConfig, SourceAllocation, SourceConfig, UtilityConfig,
};
use crate::rof::RofSettings;
use crate::utility::ProjectionSettings;
use crate::water_sources::{HydrologySeries, SourceKind};
use crate::SimulationPlugin;

pub const TRACE_WEEKS: usize = 600;
pub const HISTORY_WEEKS: usize = 160;

/// Small settings so the nested reruns stay cheap in tests.
pub fn test_rof_settings() -> RofSettings {
    RofSettings {
        n_rof_realizations: 2,
        short_term_horizon_weeks: 10,
        long_term_horizon_weeks: 20,
        storage_failure_ratio: 0.2,
    }
}

/// A river chain (reservoir feeding an intake) plus an offline expansion
/// reservoir, all owned by one utility on a flat 12-unit demand.
pub fn river_chain_config() -> RegionConfig {
    let mut headwater = SourceConfig::new("Headwater Lake", SourceKind::Reservoir);
    headwater.capacity = 300.0;
    headwater.initial_volume = 200.0;
    headwater.min_environmental_outflow = 2.0;
    headwater.max_treatment_capacity = 30.0;
    headwater.catchment_inflows = vec![HydrologySeries::constant(
        20.0,
        HISTORY_WEEKS,
        TRACE_WEEKS + 60,
    )];
    headwater.allocations = vec![SourceAllocation {
        utility: 0,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];

    let mut intake = SourceConfig::new("Valley Intake", SourceKind::Intake);
    intake.max_treatment_capacity = 15.0;
    intake.catchment_inflows = vec![HydrologySeries::constant(
        5.0,
        HISTORY_WEEKS,
        TRACE_WEEKS + 60,
    )];
    intake.allocations = vec![SourceAllocation {
        utility: 0,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];

    let mut expansion = SourceConfig::new("Ridge Expansion", SourceKind::Reservoir);
    expansion.online = false;
    expansion.capacity = 200.0;
    expansion.max_treatment_capacity = 20.0;
    expansion.construction_time = 8;
    expansion.catchment_inflows = vec![HydrologySeries::constant(
        10.0,
        HISTORY_WEEKS,
        TRACE_WEEKS + 60,
    )];
    expansion.allocations = vec![SourceAllocation {
        utility: 0,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];
    expansion.bonds = vec![BondConfig {
        utility: 0,
        kind: BondKind::Fixed,
        principal: 100_000.0,
        term_years: 25.0,
        interest_rate: 0.05,
    }];

    RegionConfig {
        sources: vec![headwater, intake, expansion],
        edges: vec![(0, 1)],
        utilities: vec![UtilityConfig {
            name: "Riverton".into(),
            demands_all_realizations: vec![vec![12.0; TRACE_WEEKS]],
            annual_demand_projections: vec![12.0; 40],
            monthly_demand_fractions: vec![vec![1.0]; 12],
            monthly_prices: vec![vec![1.0]; 12],
            percent_contingency_fund_contribution: 0.05,
            contingency_fund_cap: 10.0,
            demand_buffer: 0.0,
            projection: ProjectionSettings::default(),
            wwtp_discharge: Vec::new(),
            infrastructure: Some(InfraPlanConfig {
                rof_triggered: vec![2],
                demand_triggered: Vec::new(),
                triggers: vec![(2, 0.99)],
                if_built_remove: Vec::new(),
                discount_rate: 0.05,
            }),
        }],
    }
}

/// An app with the weekly schedule wired and the given realization's
/// world inserted.
pub fn build_app(config: &RegionConfig, realization: usize, rdm: &[f64]) -> App {
    let settings = test_rof_settings();
    let (network, utilities) = config
        .build_realization(realization, rdm, &settings)
        .expect("test region must build");

    let mut app = App::new();
    app.add_plugins(SimulationPlugin);
    app.insert_resource(settings);
    app.insert_resource(network);
    app.insert_resource(utilities);
    app
}

/// Step the schedule one simulated week.
pub fn step_week(app: &mut App) {
    app.world_mut().run_schedule(FixedUpdate);
}

pub fn step_weeks(app: &mut App, weeks: usize) {
    for _ in 0..weeks {
        step_week(app);
    }
}
