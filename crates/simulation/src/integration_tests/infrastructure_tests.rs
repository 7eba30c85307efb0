//! Infrastructure triggering across the weekly loop.

use crate::bonds::BondKind;
use crate::records::UtilityRecords;
use crate::region::{
    BondConfig, InfraPlanConfig, RegionConfig, SourceAllocation, SourceConfig, UtilityConfig,
};
use crate::region::{Utilities, WaterNetwork};
use crate::utility::ProjectionSettings;
use crate::water_sources::{HydrologySeries, SourceKind};
use crate::RealizationStatus;

use super::helpers::{build_app, river_chain_config, step_week, step_weeks, HISTORY_WEEKS, TRACE_WEEKS};

fn series(value: f64) -> Vec<HydrologySeries> {
    vec![HydrologySeries::constant(
        value,
        HISTORY_WEEKS,
        TRACE_WEEKS + 60,
    )]
}

/// Trigger thresholds below zero fire on the first evaluation.
fn eager_trigger_config() -> RegionConfig {
    let mut config = river_chain_config();
    config.utilities[0].infrastructure = Some(InfraPlanConfig {
        rof_triggered: vec![2],
        demand_triggered: Vec::new(),
        triggers: vec![(2, -1.0)],
        if_built_remove: Vec::new(),
        discount_rate: 0.05,
    });
    config
}

#[test]
fn test_triggered_project_builds_and_onlines() {
    let mut app = build_app(&eager_trigger_config(), 0, &[1.0, 1.0, 1.0, 1.0]);

    step_week(&mut app);
    {
        let world = app.world();
        let utilities = world.resource::<Utilities>();
        assert!(utilities.0[0].infrastructure.is_under_construction(2));
        assert_eq!(utilities.0[0].issued_bonds.len(), 1);
        assert!(utilities.0[0].infra_net_present_cost > 0.0);
        assert!(!world.resource::<WaterNetwork>().sources[2].online);
    }

    // Construction takes 8 weeks from week 0; the completion pass of week
    // 8 brings it online.
    step_weeks(&mut app, 8);
    let world = app.world();
    let utilities = world.resource::<Utilities>();
    assert!(world.resource::<WaterNetwork>().sources[2].online);
    assert!(utilities.0[0].infrastructure.is_built(2));
    // 300 + 200 once the expansion counts.
    assert!((utilities.0[0].total_storage_capacity - 500.0).abs() < 1e-9);

    // The build shows up in exactly one weekly record.
    let records = world.resource::<UtilityRecords>();
    let build_rows: Vec<_> = records
        .rows
        .iter()
        .filter(|r| !r.infra_built_last_week.is_empty())
        .collect();
    assert_eq!(build_rows.len(), 1);
    assert_eq!(build_rows[0].infra_built_last_week, vec![2]);
    assert_eq!(build_rows[0].week, 8);
}

#[test]
fn test_variable_joint_plant_rebases_on_completion() {
    // The expansion is a drifting-share plant whose sole owner holds 0.5
    // of the nameplate on paper; once it comes online the owner's total
    // reflects the whole allocated share instead.
    let mut config = eager_trigger_config();
    config.sources[2].variable_allocations = true;
    config.sources[2].allocations[0].treatment_fraction = 0.5;

    let mut app = build_app(&config, 0, &[1.0, 1.0, 1.0, 1.0]);
    step_weeks(&mut app, 9);

    let world = app.world();
    assert!(world.resource::<WaterNetwork>().sources[2].online);
    let utilities = world.resource::<Utilities>();
    // Raw shares: 30 (reservoir) + 15 (intake) + 10 (half the expansion);
    // the drift correction re-bases the expansion to its full 20.
    assert!((utilities.0[0].total_treatment_capacity - 65.0).abs() < 1e-9);
}

#[test]
fn test_bond_not_reissued_across_weeks() {
    let mut app = build_app(&eager_trigger_config(), 0, &[1.0, 1.0, 1.0, 1.0]);
    step_weeks(&mut app, 12);
    let utilities = app.world().resource::<Utilities>();
    assert_eq!(utilities.0[0].issued_bonds.len(), 1);
}

#[test]
fn test_high_threshold_never_triggers() {
    let mut app = build_app(&river_chain_config(), 0, &[1.0, 1.0, 1.0, 1.0]);
    step_weeks(&mut app, 30);
    let world = app.world();
    assert!(!world.resource::<RealizationStatus>().failed());
    let utilities = world.resource::<Utilities>();
    assert!(utilities.0[0].issued_bonds.is_empty());
    assert!(!world.resource::<WaterNetwork>().sources[2].online);
}

/// Two utilities; the first one's eager project strikes alternatives from
/// both utilities' queues.
fn mutual_exclusion_config() -> RegionConfig {
    let make_reservoir = |name: &str, online: bool| {
        let mut source = SourceConfig::new(name, SourceKind::Reservoir);
        source.online = online;
        source.capacity = 200.0;
        source.initial_volume = if online { 150.0 } else { 0.0 };
        source.max_treatment_capacity = 50.0;
        source.construction_time = 10;
        source.catchment_inflows = series(15.0);
        source
    };

    let own = |utility: usize| SourceAllocation {
        utility,
        capacity_fraction: 1.0,
        treatment_fraction: 1.0,
    };
    let bond = |utility: usize| BondConfig {
        utility,
        kind: BondKind::Fixed,
        principal: 50_000.0,
        term_years: 20.0,
        interest_rate: 0.05,
    };

    let mut base_a = make_reservoir("Lake A", true);
    base_a.allocations = vec![own(0)];
    let mut base_b = make_reservoir("Lake B", true);
    base_b.allocations = vec![own(1)];

    // Candidates: 2 (A's eager pick), 3 and 4 (alternatives in both
    // utilities' queues).
    let mut candidate = make_reservoir("New Lake", false);
    candidate.allocations = vec![own(0)];
    candidate.bonds = vec![bond(0)];
    let mut alternative_one = make_reservoir("Alt One", false);
    alternative_one.allocations = vec![own(0)];
    alternative_one.bonds = vec![bond(0)];
    let mut alternative_two = make_reservoir("Alt Two", false);
    alternative_two.allocations = vec![own(1)];
    alternative_two.bonds = vec![bond(1)];

    let utility = |name: &str, infra: InfraPlanConfig| UtilityConfig {
        name: name.into(),
        demands_all_realizations: vec![vec![5.0; TRACE_WEEKS]],
        annual_demand_projections: vec![5.0; 40],
        monthly_demand_fractions: vec![vec![1.0]; 12],
        monthly_prices: vec![vec![1.0]; 12],
        percent_contingency_fund_contribution: 0.05,
        contingency_fund_cap: 10.0,
        demand_buffer: 0.0,
        projection: ProjectionSettings::default(),
        wwtp_discharge: Vec::new(),
        infrastructure: Some(infra),
    };

    RegionConfig {
        sources: vec![base_a, base_b, candidate, alternative_one, alternative_two],
        edges: Vec::new(),
        utilities: vec![
            utility(
                "Utility A",
                InfraPlanConfig {
                    rof_triggered: vec![2],
                    demand_triggered: vec![3],
                    triggers: vec![(2, -1.0), (3, 1e9)],
                    if_built_remove: vec![vec![2, 3, 4]],
                    discount_rate: 0.05,
                },
            ),
            utility(
                "Utility B",
                InfraPlanConfig {
                    rof_triggered: vec![4],
                    demand_triggered: Vec::new(),
                    triggers: vec![(4, 1e9)],
                    if_built_remove: Vec::new(),
                    discount_rate: 0.05,
                },
            ),
        ],
    }
}

#[test]
fn test_mutual_exclusion_strikes_all_queues() {
    let mut app = build_app(&mutual_exclusion_config(), 0, &[1.0, 1.0, 1.0, 1.0]);
    step_week(&mut app);

    let utilities = app.world().resource::<Utilities>();
    let a = &utilities.0[0];
    let b = &utilities.0[1];

    // A's project 2 broke ground and stays queued until completion.
    assert!(a.infrastructure.is_under_construction(2));
    // The alternatives vanished from every queue, A's and B's alike.
    assert!(!a.infrastructure.demand_queue().contains(&3));
    assert!(b.infrastructure.rof_queue().is_empty());
}

#[test]
fn test_exclusion_rows_apply_once() {
    let mut app = build_app(&mutual_exclusion_config(), 0, &[1.0, 1.0, 1.0, 1.0]);
    step_weeks(&mut app, 3);
    let utilities = app.world().resource::<Utilities>();
    // Nothing left to strike: repeated weeks change no queue further.
    assert_eq!(utilities.0[0].infrastructure.rof_queue(), &[2]);
    assert!(utilities.0[0].infrastructure.demand_queue().is_empty());
    assert!(utilities.0[1].infrastructure.rof_queue().is_empty());
}
