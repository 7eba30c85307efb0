//! Headless runner: simulates a small built-in demonstration region over
//! several stochastic realizations and logs a per-utility summary.
//!
//! The world for each realization is built fresh from the same
//! [`RegionConfig`]; the weekly schedule is stepped manually so runs are
//! deterministic and independent of wall-clock time.

use bevy::log::{info, warn, LogPlugin};
use bevy::prelude::*;

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use simulation::bonds::BondKind;
use simulation::records::UtilityRecords;
use simulation::region::{
    BondConfig, InfraPlanConfig, RegionConfig, SourceAllocation, SourceConfig, UtilityConfig,
};
use simulation::rof::{RofScratch, RofSettings};
use simulation::utility::ProjectionSettings;
use simulation::water_sources::{HydrologySeries, SourceKind, StorageArea};
use simulation::{RealizationStatus, SimClock, SimulationPlugin};

const N_REALIZATIONS: usize = 4;
const N_WEEKS: usize = 520;
const N_ROF_REALIZATIONS: usize = 10;
/// Weeks of pre-simulation hydrology needed by the risk reruns.
const HISTORY_WEEKS: usize = 530;
/// Trace length: history + simulated weeks + long-term risk horizon.
const TRACE_WEEKS: usize = N_WEEKS + 170;

fn main() {
    let mut app = App::new();
    app.add_plugins(LogPlugin::default());
    app.add_plugins(SimulationPlugin);

    let settings = RofSettings {
        n_rof_realizations: N_ROF_REALIZATIONS,
        short_term_horizon_weeks: 52,
        long_term_horizon_weeks: 156,
        storage_failure_ratio: 0.2,
    };
    app.insert_resource(settings.clone());

    let config = demo_region();

    for realization in 0..N_REALIZATIONS {
        let rdm = [1.0, 1.0, 1.0, 1.0];
        let (network, utilities) = config
            .build_realization(realization, &rdm, &settings)
            .expect("demo region must validate");

        app.insert_resource(network);
        app.insert_resource(utilities);
        app.insert_resource(SimClock::default());
        app.insert_resource(RealizationStatus::default());
        app.insert_resource(UtilityRecords::default());
        app.world_mut().resource_mut::<RofScratch>().reset();

        for _ in 0..N_WEEKS {
            app.world_mut().run_schedule(FixedUpdate);
        }

        report(&app, realization);
    }
}

fn report(app: &App, realization: usize) {
    let status = app.world().resource::<RealizationStatus>();
    if let Some(error) = status.error() {
        warn!("realization {realization} aborted: {error}");
        return;
    }

    let records = app.world().resource::<UtilityRecords>();
    let utilities = app.world().resource::<simulation::region::Utilities>();
    for utility in &utilities.0 {
        let rows: Vec<_> = records.for_utility(utility.id).collect();
        let weeks = rows.len() as f64;
        let mean_rof: f64 = rows.iter().map(|r| r.risk_of_failure).sum::<f64>() / weeks;
        let peak_rof = rows
            .iter()
            .map(|r| r.risk_of_failure)
            .fold(0.0, f64::max);
        let unfulfilled: f64 = rows.iter().map(|r| r.unfulfilled_demand).sum();
        let built: usize = rows.iter().map(|r| r.infra_built_last_week.len()).sum();
        let last = rows.last().expect("at least one simulated week");

        info!(
            "realization {realization}, {}: mean ROF {:.4}, peak ROF {:.4}, \
             unfulfilled {:.1}, projects built {}, final fund {:.2}, debt paid this year {:.0}",
            utility.name,
            mean_rof,
            peak_rof,
            unfulfilled,
            built,
            last.contingency_fund,
            last.current_debt_payment,
        );
    }
}

/// Two-utility demonstration region: a mountain reservoir spilling into a
/// river intake (shared stretch), a flooded quarry, and an expansion
/// reservoir either utility can trigger.
fn demo_region() -> RegionConfig {
    let mut headwater = SourceConfig::new("Falls Lake", SourceKind::Reservoir);
    headwater.capacity = 2_500.0;
    headwater.initial_volume = 1_800.0;
    headwater.min_environmental_outflow = 8.0;
    headwater.max_treatment_capacity = 90.0;
    headwater.storage_area = StorageArea::Linear {
        base: 2.0,
        slope: 0.002,
    };
    headwater.catchment_inflows = streamflow_traces(11, 75.0);
    headwater.evaporation = vec![HydrologySeries::constant(0.3, HISTORY_WEEKS, TRACE_WEEKS)];
    headwater.allocations = vec![SourceAllocation {
        utility: 0,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];

    let mut intake = SourceConfig::new("Mills Run Intake", SourceKind::Intake);
    intake.max_treatment_capacity = 40.0;
    intake.min_environmental_outflow = 5.0;
    intake.catchment_inflows = streamflow_traces(23, 18.0);
    intake.allocations = vec![SourceAllocation {
        utility: 1,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];

    let mut quarry = SourceConfig::new("Stone Quarry", SourceKind::Quarry);
    quarry.capacity = 600.0;
    quarry.initial_volume = 300.0;
    quarry.max_diversion = 25.0;
    quarry.max_treatment_capacity = 30.0;
    quarry.catchment_inflows = streamflow_traces(37, 20.0);
    quarry.allocations = vec![SourceAllocation {
        utility: 1,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    }];

    let mut expansion = SourceConfig::new("Caldwell Expansion", SourceKind::Reservoir);
    expansion.online = false;
    expansion.capacity = 1_200.0;
    expansion.max_treatment_capacity = 50.0;
    expansion.construction_time = 104;
    expansion.catchment_inflows = streamflow_traces(53, 22.0);
    expansion.allocations = vec![
        SourceAllocation {
            utility: 0,
            capacity_fraction: 0.6,
            treatment_fraction: 0.6,
        },
        SourceAllocation {
            utility: 1,
            capacity_fraction: 0.4,
            treatment_fraction: 0.4,
        },
    ];
    expansion.bonds = vec![
        BondConfig {
            utility: 0,
            kind: BondKind::Fixed,
            principal: 180_000.0,
            term_years: 30.0,
            interest_rate: 0.05,
        },
        BondConfig {
            utility: 1,
            kind: BondKind::Fixed,
            principal: 120_000.0,
            term_years: 30.0,
            interest_rate: 0.05,
        },
    ];

    RegionConfig {
        sources: vec![headwater, intake, quarry, expansion],
        edges: vec![(0, 1)],
        utilities: vec![
            utility_config("Uplands Water", 0, 55.0, 3),
            utility_config("Rivervale Water", 1, 35.0, 3),
        ],
    }
}

fn utility_config(
    name: &str,
    utility: usize,
    base_demand: f64,
    expansion_source: usize,
) -> UtilityConfig {
    let demands: Vec<Vec<f64>> = (0..N_REALIZATIONS)
        .map(|r| demand_trace((utility * 101 + r) as u64, base_demand))
        .collect();

    // Projections follow the same growth the traces are built around.
    let projections: Vec<f64> = (0..24)
        .map(|year| base_demand * (1.0 + 0.01 * year as f64))
        .collect();

    UtilityConfig {
        name: name.into(),
        demands_all_realizations: demands,
        annual_demand_projections: projections,
        monthly_demand_fractions: vec![vec![0.6, 0.4]; 12],
        monthly_prices: vec![vec![420.0, 560.0]; 12],
        percent_contingency_fund_contribution: 0.02,
        contingency_fund_cap: 5_000.0,
        demand_buffer: 2.0,
        projection: ProjectionSettings::default(),
        wwtp_discharge: vec![(1, vec![0.35; 53])],
        infrastructure: Some(InfraPlanConfig {
            rof_triggered: vec![expansion_source],
            demand_triggered: Vec::new(),
            triggers: vec![(expansion_source, 0.05)],
            if_built_remove: Vec::new(),
            discount_rate: 0.05,
        }),
    }
}

/// Deterministic lag-1 autoregressive streamflow around `mean`, one trace
/// per realization.
fn streamflow_traces(seed: u64, mean: f64) -> Vec<HydrologySeries> {
    (0..N_REALIZATIONS)
        .map(|realization| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(realization as u64));
            let mut flow = mean;
            let values = (0..TRACE_WEEKS + HISTORY_WEEKS)
                .map(|week| {
                    let season =
                        1.0 + 0.35 * (std::f64::consts::TAU * week as f64 / 52.0).sin();
                    let shock: f64 = rng.gen_range(-0.25..0.25);
                    flow = 0.6 * flow + 0.4 * mean * season * (1.0 + shock);
                    flow.max(0.0)
                })
                .collect();
            HydrologySeries::new(values, HISTORY_WEEKS)
        })
        .collect()
}

/// Seasonal demand with mild growth and noise.
fn demand_trace(seed: u64, base: f64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..TRACE_WEEKS)
        .map(|week| {
            let season = 1.0 + 0.15 * (std::f64::consts::TAU * week as f64 / 52.0).sin();
            let growth = 1.0 + 0.0002 * week as f64;
            let noise: f64 = rng.gen_range(-0.05..0.05);
            base * season * growth * (1.0 + noise)
        })
        .collect()
}
