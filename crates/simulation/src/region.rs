//! Region configuration and per-realization world construction.
//!
//! The config loader (outside this crate) hands in a [`RegionConfig`];
//! [`RegionConfig::build_realization`] validates it and produces the
//! [`WaterNetwork`] and [`Utilities`] resources for one stochastic
//! realization, with the deep-uncertainty factors already applied. Every
//! validation failure is fatal and leaves no partial state behind.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bonds::{Bond, BondKind};
use crate::config::WEEKS_IN_YEAR;
use crate::error::ConfigError;
use crate::infrastructure::InfrastructureManager;
use crate::rof::RofSettings;
use crate::source_graph::SourceGraph;
use crate::utility::{ProjectionSettings, Utility};
use crate::water_sources::{HydrologySeries, SourceKind, StorageArea, WaterSource};
use crate::wwtp::WwtpDischargeRule;

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The source arena and its graph, owned by value per realization.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct WaterNetwork {
    pub sources: Vec<WaterSource>,
    pub graph: SourceGraph,
}

/// All utilities of the region, indexed by utility id.
#[derive(Resource, Debug, Clone, Serialize, Deserialize)]
pub struct Utilities(pub Vec<Utility>);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// One utility's stake in a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceAllocation {
    pub utility: usize,
    pub capacity_fraction: f64,
    pub treatment_fraction: f64,
}

/// Financing terms for one utility's share of a buildable source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondConfig {
    pub utility: usize,
    pub kind: BondKind,
    pub principal: f64,
    pub term_years: f64,
    pub interest_rate: f64,
}

/// Static definition of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub online: bool,
    pub capacity: f64,
    pub initial_volume: f64,
    pub min_environmental_outflow: f64,
    pub max_treatment_capacity: f64,
    pub max_diversion: f64,
    pub construction_time: usize,
    pub sequence_predecessor: Option<usize>,
    pub variable_allocations: bool,
    pub storage_area: StorageArea,
    /// One inflow series per realization; a single entry is shared by all.
    pub catchment_inflows: Vec<HydrologySeries>,
    /// One evaporation series per realization; empty means no evaporation.
    pub evaporation: Vec<HydrologySeries>,
    pub allocations: Vec<SourceAllocation>,
    pub bonds: Vec<BondConfig>,
}

impl SourceConfig {
    /// A blank, online source definition to be filled in field by field.
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            online: true,
            capacity: 0.0,
            initial_volume: 0.0,
            min_environmental_outflow: 0.0,
            max_treatment_capacity: 0.0,
            max_diversion: 0.0,
            construction_time: 0,
            sequence_predecessor: None,
            variable_allocations: false,
            storage_area: StorageArea::default(),
            catchment_inflows: Vec::new(),
            evaporation: Vec::new(),
            allocations: Vec::new(),
            bonds: Vec::new(),
        }
    }
}

/// Candidate projects and trigger thresholds for one utility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfraPlanConfig {
    pub rof_triggered: Vec<usize>,
    pub demand_triggered: Vec<usize>,
    /// `(source, threshold)`; risk or demand level depending on the queue.
    pub triggers: Vec<(usize, f64)>,
    /// Rows `[trigger, remove, …]` applied to every utility when the
    /// trigger breaks ground.
    pub if_built_remove: Vec<Vec<usize>>,
    pub discount_rate: f64,
}

/// Static definition of one utility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtilityConfig {
    pub name: String,
    pub demands_all_realizations: Vec<Vec<f64>>,
    pub annual_demand_projections: Vec<f64>,
    pub monthly_demand_fractions: Vec<Vec<f64>>,
    pub monthly_prices: Vec<Vec<f64>>,
    pub percent_contingency_fund_contribution: f64,
    pub contingency_fund_cap: f64,
    pub demand_buffer: f64,
    pub projection: ProjectionSettings,
    /// `(source, 53 weekly fractions)` effluent routing.
    pub wwtp_discharge: Vec<(usize, Vec<f64>)>,
    pub infrastructure: Option<InfraPlanConfig>,
}

/// The whole region: sources (ids are positions), downstream edges, and
/// utilities (ids are positions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub sources: Vec<SourceConfig>,
    pub edges: Vec<(usize, usize)>,
    pub utilities: Vec<UtilityConfig>,
}

impl RegionConfig {
    /// Validate and build the world for one realization, applying the
    /// deep-uncertainty vector (`rdm[0]` demand, `rdm[1]` bond term,
    /// `rdm[2]` bond rate, `rdm[3]` discount rate; missing entries default
    /// to 1, extra entries are ignored).
    pub fn build_realization(
        &self,
        realization: usize,
        rdm_factors: &[f64],
        rof_settings: &RofSettings,
    ) -> Result<(WaterNetwork, Utilities), ConfigError> {
        let n_sources = self.sources.len();
        let n_utilities = self.utilities.len();
        let graph = SourceGraph::new(n_sources, &self.edges)?;

        let mut rdm = [1.0; 4];
        for (slot, &factor) in rdm.iter_mut().zip(rdm_factors) {
            *slot = factor;
        }

        let required_history = (rof_settings.n_rof_realizations as f64 * WEEKS_IN_YEAR)
            .round() as usize;

        // --- Sources ---
        let mut sources = Vec::with_capacity(n_sources);
        for (id, config) in self.sources.iter().enumerate() {
            let fraction_sum: f64 = config
                .allocations
                .iter()
                .map(|a| a.capacity_fraction)
                .sum();
            if fraction_sum > 1.0 + 1e-9 {
                return Err(ConfigError::OverAllocatedSource {
                    source_id: id,
                    sum: fraction_sum,
                });
            }

            let mut source = WaterSource::new(id, config.name.clone(), config.kind, n_utilities);
            source.online = config.online;
            source.capacity = config.capacity;
            source.available_volume = config.initial_volume;
            source.min_environmental_outflow = config.min_environmental_outflow;
            source.max_treatment_capacity = config.max_treatment_capacity;
            source.max_diversion = config.max_diversion;
            source.construction_time = config.construction_time;
            source.sequence_predecessor = config.sequence_predecessor;
            source.variable_allocations = config.variable_allocations;
            source.storage_area = config.storage_area;
            source.catchment_inflows = pick_series(&config.catchment_inflows, realization)?;
            source.evaporation = pick_series(&config.evaporation, realization)?;

            if !source.catchment_inflows.is_empty()
                && source.catchment_inflows.history_weeks() < required_history
            {
                return Err(ConfigError::InsufficientHydrologyHistory {
                    source_id: id,
                    history: source.catchment_inflows.history_weeks(),
                    required: required_history,
                });
            }

            for allocation in &config.allocations {
                if allocation.utility >= n_utilities {
                    return Err(ConfigError::UnknownUtility {
                        source_id: id,
                        utility: allocation.utility,
                    });
                }
                source.allocated_fractions[allocation.utility] = allocation.capacity_fraction;
                source.allocated_treatment_fractions[allocation.utility] =
                    allocation.treatment_fraction;
            }

            source.bonds = config
                .bonds
                .iter()
                .map(|b| {
                    Bond::new(
                        id,
                        b.utility,
                        b.kind,
                        b.principal,
                        b.term_years,
                        b.interest_rate,
                    )
                })
                .collect();

            // Week-zero availability so the first demand split has
            // something to draw against.
            let first_inflow = source.catchment_inflows.at(0).unwrap_or(0.0);
            for utility in 0..n_utilities {
                source.available_allocated_volumes[utility] = if !source.online {
                    0.0
                } else {
                    match source.kind {
                        SourceKind::Reservoir | SourceKind::Quarry => {
                            source.allocated_fractions[utility] * source.available_volume
                        }
                        SourceKind::Intake | SourceKind::AllocatedIntake => {
                            (source.allocated_fractions[utility] * first_inflow)
                                .min(source.allocated_treatment_capacity(utility))
                        }
                        SourceKind::Reuse => source.allocated_treatment_capacity(utility),
                    }
                };
            }

            sources.push(source);
        }

        // --- Utilities ---
        let mut utilities = Vec::with_capacity(n_utilities);
        for (id, config) in self.utilities.iter().enumerate() {
            if config.demands_all_realizations.is_empty() {
                return Err(ConfigError::EmptyDemandMatrix(id));
            }
            let trace = config.demands_all_realizations.get(realization).ok_or(
                ConfigError::RealizationOutOfRange {
                    realization,
                    available: config.demands_all_realizations.len(),
                },
            )?;

            let weekly_prices = Utility::calculate_weekly_average_prices(
                id,
                &config.monthly_demand_fractions,
                &config.monthly_prices,
            )?;
            let discharge_rule = WwtpDischargeRule::new(config.wwtp_discharge.clone())?;

            let mut utility = Utility::new(
                id,
                config.name.clone(),
                config.percent_contingency_fund_contribution,
                config.contingency_fund_cap,
                config.demand_buffer,
                weekly_prices,
                discharge_rule,
            );
            utility.projection = config.projection;
            utility.annual_demand_projections = config.annual_demand_projections.clone();

            if let Some(plan) = &config.infrastructure {
                if plan.discount_rate <= 0.0 {
                    return Err(ConfigError::NonPositiveDiscountRate(id));
                }
                if plan.rof_triggered.is_empty() && plan.demand_triggered.is_empty() {
                    return Err(ConfigError::EmptyConstructionQueues(id));
                }
                utility.infra_discount_rate = plan.discount_rate;
                utility.infrastructure = InfrastructureManager::new(
                    plan.rof_triggered.clone(),
                    plan.demand_triggered.clone(),
                    plan.triggers.clone(),
                    plan.if_built_remove.clone(),
                );
            }

            utility.set_realization(trace, &rdm);

            let simulated_years = utility.annual_average_weekly_demand.len();
            if simulated_years + config.projection.forecast_length
                > utility.annual_demand_projections.len()
            {
                return Err(ConfigError::ForecastBeyondProjections {
                    utility: id,
                    projections: utility.annual_demand_projections.len(),
                    years: simulated_years,
                    forecast: config.projection.forecast_length,
                });
            }

            // Ownership from source allocations, in source-id order.
            for (source_id, source) in sources.iter().enumerate() {
                let owns = self.sources[source_id]
                    .allocations
                    .iter()
                    .filter(|a| a.utility == id)
                    .count();
                if owns > 1 {
                    return Err(ConfigError::DuplicateSource {
                        utility: id,
                        source_id,
                    });
                }
                if owns == 1 {
                    utility.owned_sources.push(source.id);
                }
            }

            utility.rebuild_source_partitions(&sources);
            utility.recalculate_capacity_totals(&sources);
            utility.apply_joint_plant_capacity_drift(&sources);
            utility.update_total_available_volume(&sources);

            utilities.push(utility);
        }

        Ok((WaterNetwork { sources, graph }, Utilities(utilities)))
    }
}

/// Pick the realization's series: one entry is shared across realizations,
/// several entries index by realization, none means an all-zero series.
fn pick_series(
    series: &[HydrologySeries],
    realization: usize,
) -> Result<HydrologySeries, ConfigError> {
    match series.len() {
        0 => Ok(HydrologySeries::zero()),
        1 => Ok(series[0].clone()),
        n if realization < n => Ok(series[realization].clone()),
        n => Err(ConfigError::RealizationOutOfRange {
            realization,
            available: n,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rof_settings() -> RofSettings {
        RofSettings {
            n_rof_realizations: 2,
            short_term_horizon_weeks: 52,
            long_term_horizon_weeks: 104,
            storage_failure_ratio: 0.2,
        }
    }

    fn minimal_config() -> RegionConfig {
        let mut lake = SourceConfig::new("Lake", SourceKind::Reservoir);
        lake.capacity = 100.0;
        lake.initial_volume = 50.0;
        lake.max_treatment_capacity = 40.0;
        lake.catchment_inflows = vec![HydrologySeries::constant(10.0, 110, 600)];
        lake.allocations = vec![SourceAllocation {
            utility: 0,
            capacity_fraction: 1.0,
            treatment_fraction: 1.0,
        }];

        RegionConfig {
            sources: vec![lake],
            edges: Vec::new(),
            utilities: vec![UtilityConfig {
                name: "City".into(),
                demands_all_realizations: vec![vec![5.0; 600]],
                annual_demand_projections: vec![5.0; 40],
                monthly_demand_fractions: vec![vec![1.0]; 12],
                monthly_prices: vec![vec![1.0]; 12],
                percent_contingency_fund_contribution: 0.05,
                contingency_fund_cap: 10.0,
                demand_buffer: 0.0,
                projection: ProjectionSettings::default(),
                wwtp_discharge: Vec::new(),
                infrastructure: None,
            }],
        }
    }

    #[test]
    fn test_minimal_region_builds() {
        let (network, utilities) = minimal_config()
            .build_realization(0, &[1.0, 1.0, 1.0, 1.0], &rof_settings())
            .unwrap();
        assert_eq!(network.sources.len(), 1);
        assert_eq!(utilities.0.len(), 1);
        let utility = &utilities.0[0];
        assert_eq!(utility.owned_sources, vec![0]);
        assert_eq!(utility.non_priority_draw_sources, vec![0]);
        assert!((utility.total_storage_capacity - 100.0).abs() < 1e-9);
        assert!((utility.total_treatment_capacity - 40.0).abs() < 1e-9);
        assert!((utility.total_available_volume - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_short_rdm_vector_defaults_to_neutral() {
        let (_, utilities) = minimal_config()
            .build_realization(0, &[], &rof_settings())
            .unwrap();
        assert_eq!(utilities.0[0].demand_series[0], 5.0);
        assert_eq!(utilities.0[0].bond_term_multiplier, 1.0);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut config = minimal_config();
        config.edges = vec![(0, 0)];
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::CyclicSourceGraph(_))
        ));
    }

    #[test]
    fn test_empty_demand_matrix_rejected() {
        let mut config = minimal_config();
        config.utilities[0].demands_all_realizations.clear();
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::EmptyDemandMatrix(0))
        ));
    }

    #[test]
    fn test_realization_out_of_range_rejected() {
        let config = minimal_config();
        assert!(matches!(
            config.build_realization(3, &[], &rof_settings()),
            Err(ConfigError::RealizationOutOfRange { .. })
        ));
    }

    #[test]
    fn test_duplicate_allocation_rejected() {
        let mut config = minimal_config();
        let duplicate = config.sources[0].allocations[0].clone();
        config.sources[0].allocations.push(duplicate);
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::OverAllocatedSource { .. })
                | Err(ConfigError::DuplicateSource { .. })
        ));
    }

    #[test]
    fn test_over_allocated_source_rejected() {
        let mut config = minimal_config();
        config.sources[0].allocations.push(SourceAllocation {
            utility: 0,
            capacity_fraction: 0.5,
            treatment_fraction: 0.0,
        });
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::OverAllocatedSource { .. })
        ));
    }

    #[test]
    fn test_non_positive_discount_rate_rejected() {
        let mut config = minimal_config();
        config.utilities[0].infrastructure = Some(InfraPlanConfig {
            rof_triggered: vec![0],
            demand_triggered: Vec::new(),
            triggers: vec![(0, 0.1)],
            if_built_remove: Vec::new(),
            discount_rate: 0.0,
        });
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::NonPositiveDiscountRate(0))
        ));
    }

    #[test]
    fn test_empty_queues_rejected() {
        let mut config = minimal_config();
        config.utilities[0].infrastructure = Some(InfraPlanConfig {
            rof_triggered: Vec::new(),
            demand_triggered: Vec::new(),
            triggers: Vec::new(),
            if_built_remove: Vec::new(),
            discount_rate: 0.05,
        });
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::EmptyConstructionQueues(0))
        ));
    }

    #[test]
    fn test_short_projection_vector_rejected() {
        let mut config = minimal_config();
        config.utilities[0].annual_demand_projections = vec![5.0; 6];
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::ForecastBeyondProjections { .. })
        ));
    }

    #[test]
    fn test_insufficient_history_rejected() {
        let mut config = minimal_config();
        // Two rof realizations need ~104 weeks of history; give 50.
        config.sources[0].catchment_inflows = vec![HydrologySeries::constant(10.0, 50, 600)];
        assert!(matches!(
            config.build_realization(0, &[], &rof_settings()),
            Err(ConfigError::InsufficientHydrologyHistory { .. })
        ));
    }

    #[test]
    fn test_offline_source_starts_unavailable() {
        let mut config = minimal_config();
        let mut expansion = SourceConfig::new("Expansion", SourceKind::Reservoir);
        expansion.capacity = 200.0;
        expansion.online = false;
        expansion.catchment_inflows = vec![HydrologySeries::constant(5.0, 110, 600)];
        expansion.allocations = vec![SourceAllocation {
            utility: 0,
            capacity_fraction: 1.0,
            treatment_fraction: 0.5,
        }];
        config.sources.push(expansion);

        let (network, utilities) = config
            .build_realization(0, &[], &rof_settings())
            .unwrap();
        assert!(!network.sources[1].online);
        // Offline capacity is not counted and the source sits in no
        // partition.
        assert!((utilities.0[0].total_storage_capacity - 100.0).abs() < 1e-9);
        assert_eq!(utilities.0[0].non_priority_draw_sources, vec![0]);
        assert_eq!(utilities.0[0].owned_sources, vec![0, 1]);
    }
}
