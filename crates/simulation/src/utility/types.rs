//! Utility state and realization setup.

use serde::{Deserialize, Serialize};

use crate::bonds::Bond;
use crate::config::{
    month_of_week_of_year, NUMBER_OF_MONTHS, WEEKS_IN_YEAR, WEEKS_IN_YEAR_ROUND,
    WEEKS_OF_YEAR_TABLE,
};
use crate::error::ConfigError;
use crate::infrastructure::InfrastructureManager;
use crate::water_sources::WaterSource;
use crate::wwtp::WwtpDischargeRule;

/// Price per volume unit is configured in dollars per million volume
/// units; weekly tables are kept in dollars per unit.
const PRICE_SCALE: f64 = 1e-6;

/// Demand-projection horizon parameters, in years.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProjectionSettings {
    /// Years ahead the long-term estimate looks.
    pub forecast_length: usize,
    /// Years of recorded demand the growth rate is fitted over.
    pub historical_period: usize,
    /// Re-fit the growth rate every this many years.
    pub reprojection_frequency: usize,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self {
            forecast_length: 5,
            historical_period: 5,
            reprojection_frequency: 5,
        }
    }
}

/// One water provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utility {
    pub id: usize,
    pub name: String,

    // Configuration.
    pub percent_contingency_fund_contribution: f64,
    pub contingency_fund_cap: f64,
    pub demand_buffer: f64,
    pub infra_discount_rate: f64,
    pub bond_term_multiplier: f64,
    pub bond_interest_rate_multiplier: f64,
    pub projection: ProjectionSettings,
    /// Average price per volume unit for each week-of-year slot.
    pub weekly_average_volumetric_price: Vec<f64>,
    pub wwtp_discharge_rule: WwtpDischargeRule,

    // Realization inputs.
    pub demand_series: Vec<f64>,
    pub weekly_peaking_factor: Vec<f64>,
    pub annual_average_weekly_demand: Vec<f64>,
    pub annual_demand_projections: Vec<f64>,

    // Owned sources. `owned_sources` keeps declaration order; the draw
    // partitions hold online sources only.
    pub owned_sources: Vec<usize>,
    pub priority_draw_sources: Vec<usize>,
    pub non_priority_draw_sources: Vec<usize>,

    // Capacity and availability totals.
    pub total_storage_capacity: f64,
    pub total_treatment_capacity: f64,
    pub total_available_volume: f64,
    pub total_stored_volume: f64,
    pub net_stream_inflow: f64,

    // Weekly demand state.
    pub unrestricted_demand: f64,
    pub restricted_demand: f64,
    pub unfulfilled_demand: f64,
    pub demand_multiplier: f64,
    pub demand_offset: f64,
    pub offset_rate_per_volume: f64,
    /// Surcharge price while restrictions are enacted.
    pub restricted_price: Option<f64>,

    // Financial state.
    pub contingency_fund: f64,
    pub gross_revenue: f64,
    pub drought_mitigation_cost: f64,
    pub insurance_payout: f64,
    pub insurance_purchase: f64,
    pub fund_contribution: f64,
    pub current_debt_payment: f64,
    pub current_pv_debt_payment: f64,
    pub infra_net_present_cost: f64,
    pub issued_bonds: Vec<Bond>,
    pub waste_water_discharge: f64,

    // Demand projection state.
    pub current_year_recorded_demand: f64,
    pub future_demand_estimate: f64,

    // Risk of failure, written by the risk sub-simulator.
    pub short_term_storage_rof: f64,
    pub short_term_treatment_rof: f64,
    pub short_term_rof: f64,
    pub long_term_storage_rof: f64,
    pub long_term_treatment_rof: f64,
    pub long_term_rof: f64,

    // Infrastructure planning.
    pub infrastructure: InfrastructureManager,
    pub infra_built_last_week: Vec<usize>,

    /// False inside risk-of-failure reruns, where no money moves.
    pub used_for_realization: bool,
}

impl Utility {
    /// A utility with empty realization data and zeroed state. The region
    /// builder fills in sources, demand, and infrastructure afterwards.
    pub fn new(
        id: usize,
        name: impl Into<String>,
        percent_contingency_fund_contribution: f64,
        contingency_fund_cap: f64,
        demand_buffer: f64,
        weekly_average_volumetric_price: Vec<f64>,
        wwtp_discharge_rule: WwtpDischargeRule,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            percent_contingency_fund_contribution,
            contingency_fund_cap,
            demand_buffer,
            infra_discount_rate: 0.0,
            bond_term_multiplier: 1.0,
            bond_interest_rate_multiplier: 1.0,
            projection: ProjectionSettings::default(),
            weekly_average_volumetric_price,
            wwtp_discharge_rule,
            demand_series: Vec::new(),
            weekly_peaking_factor: vec![1.0; WEEKS_OF_YEAR_TABLE],
            annual_average_weekly_demand: Vec::new(),
            annual_demand_projections: Vec::new(),
            owned_sources: Vec::new(),
            priority_draw_sources: Vec::new(),
            non_priority_draw_sources: Vec::new(),
            total_storage_capacity: 0.0,
            total_treatment_capacity: 0.0,
            total_available_volume: 0.0,
            total_stored_volume: 0.0,
            net_stream_inflow: 0.0,
            unrestricted_demand: 0.0,
            restricted_demand: 0.0,
            unfulfilled_demand: 0.0,
            demand_multiplier: 1.0,
            demand_offset: 0.0,
            offset_rate_per_volume: 0.0,
            restricted_price: None,
            contingency_fund: 0.0,
            gross_revenue: 0.0,
            drought_mitigation_cost: 0.0,
            insurance_payout: 0.0,
            insurance_purchase: 0.0,
            fund_contribution: 0.0,
            current_debt_payment: 0.0,
            current_pv_debt_payment: 0.0,
            infra_net_present_cost: 0.0,
            issued_bonds: Vec::new(),
            waste_water_discharge: 0.0,
            current_year_recorded_demand: 0.0,
            future_demand_estimate: 0.0,
            short_term_storage_rof: 0.0,
            short_term_treatment_rof: 0.0,
            short_term_rof: 0.0,
            long_term_storage_rof: 0.0,
            long_term_treatment_rof: 0.0,
            long_term_rof: 0.0,
            infrastructure: InfrastructureManager::default(),
            infra_built_last_week: Vec::new(),
            used_for_realization: true,
        }
    }

    /// Weekly average price per volume unit from monthly per-tier demand
    /// fractions and prices.
    ///
    /// Both tables must have 12 rows and matching tier counts; the weekly
    /// table averages prices across tiers weighted by consumption share.
    pub fn calculate_weekly_average_prices(
        utility: usize,
        monthly_demand_fractions: &[Vec<f64>],
        monthly_prices: &[Vec<f64>],
    ) -> Result<Vec<f64>, ConfigError> {
        if monthly_demand_fractions.len() != NUMBER_OF_MONTHS {
            return Err(ConfigError::BadPriceTable {
                utility,
                rows: monthly_demand_fractions.len(),
            });
        }
        if monthly_prices.len() != NUMBER_OF_MONTHS {
            return Err(ConfigError::BadPriceTable {
                utility,
                rows: monthly_prices.len(),
            });
        }
        let n_tiers = monthly_prices[0].len();
        if monthly_demand_fractions.iter().any(|r| r.len() != n_tiers)
            || monthly_prices.iter().any(|r| r.len() != n_tiers)
        {
            return Err(ConfigError::MismatchedPriceTiers { utility });
        }

        let mut monthly_average = [0.0; NUMBER_OF_MONTHS];
        for month in 0..NUMBER_OF_MONTHS {
            for tier in 0..n_tiers {
                monthly_average[month] +=
                    monthly_demand_fractions[month][tier] * monthly_prices[month][tier];
            }
        }

        Ok((0..WEEKS_OF_YEAR_TABLE)
            .map(|week| monthly_average[month_of_week_of_year(week)] * PRICE_SCALE)
            .collect())
    }

    /// Week-of-year peaking factors: for each of the 53 slots, the average
    /// over trace years of that week's demand relative to its year's mean.
    pub fn calculate_weekly_peaking_factor(demands: &[f64]) -> Vec<f64> {
        let n_years = ((demands.len() as f64 / WEEKS_IN_YEAR) as usize).saturating_sub(1);
        if n_years == 0 {
            return vec![1.0; WEEKS_OF_YEAR_TABLE];
        }

        let mut factors = vec![0.0; WEEKS_OF_YEAR_TABLE];
        for year in 0..n_years {
            let start = (year as f64 * WEEKS_IN_YEAR) as usize;
            let end = ((year + 1) as f64 * WEEKS_IN_YEAR) as usize;
            let year_average = demands[start..end].iter().sum::<f64>() / (end - start) as f64;
            for (week, factor) in factors.iter_mut().enumerate() {
                *factor += demands[start + week] / year_average / n_years as f64;
            }
        }
        factors
    }

    /// Mean weekly demand of each 52-week block of the trace. A trailing
    /// partial block averages the weeks it has; an empty one carries the
    /// previous value forward.
    pub fn calculate_annual_average_weekly_demand(demands: &[f64]) -> Vec<f64> {
        let n_years = (demands.len() as f64 / WEEKS_IN_YEAR) as usize + 1;
        let mut averages = vec![0.0; n_years];
        for year in 0..n_years {
            let start = (year * WEEKS_IN_YEAR_ROUND).min(demands.len());
            let end = ((year + 1) * WEEKS_IN_YEAR_ROUND).min(demands.len());
            if start < end {
                averages[year] = demands[start..end].iter().sum::<f64>() / (end - start) as f64;
            } else if year > 0 {
                averages[year] = averages[year - 1];
            }
        }
        averages
    }

    /// Bind this utility to one stochastic trace, applying the
    /// deep-uncertainty factors: `rdm[0]` scales demand around its
    /// starting level, `rdm[1]` scales bond terms, `rdm[2]` bond rates,
    /// `rdm[3]` the infrastructure discount rate. Further entries are
    /// accepted and ignored.
    pub fn set_realization(&mut self, demands: &[f64], rdm_factors: &[f64]) {
        let delta_demand = demands.first().copied().unwrap_or(0.0) * (1.0 - rdm_factors[0]);
        self.demand_series = demands
            .iter()
            .map(|d| d * rdm_factors[0] + delta_demand)
            .collect();

        self.bond_term_multiplier = rdm_factors[1];
        self.bond_interest_rate_multiplier = rdm_factors[2];
        self.infra_discount_rate *= rdm_factors[3];

        // Peaking factors and annual averages come from the raw trace.
        self.weekly_peaking_factor = Self::calculate_weekly_peaking_factor(demands);
        self.annual_average_weekly_demand = Self::calculate_annual_average_weekly_demand(demands);
    }

    /// Rebuild the draw partitions from online status: intakes and reuse
    /// in declaration order, storage sources in id order.
    pub fn rebuild_source_partitions(&mut self, sources: &[WaterSource]) {
        self.priority_draw_sources = self
            .owned_sources
            .iter()
            .copied()
            .filter(|&ws| sources[ws].online && sources[ws].kind.is_priority_draw())
            .collect();
        self.non_priority_draw_sources = self
            .owned_sources
            .iter()
            .copied()
            .filter(|&ws| sources[ws].online && !sources[ws].kind.is_priority_draw())
            .collect();
        self.non_priority_draw_sources.sort_unstable();
    }

    /// Recompute capacity totals from online owned sources.
    pub fn recalculate_capacity_totals(&mut self, sources: &[WaterSource]) {
        self.total_storage_capacity = 0.0;
        self.total_treatment_capacity = 0.0;
        for &ws in &self.owned_sources {
            if !sources[ws].online {
                continue;
            }
            self.total_storage_capacity += sources[ws].allocated_capacity(self.id);
            self.total_treatment_capacity += sources[ws].allocated_treatment_capacity(self.id);
        }
    }

    /// Recompute availability totals from this week's source allocations.
    /// Every source contributes at least a sliver so the proportional
    /// split never divides by zero.
    pub fn update_total_available_volume(&mut self, sources: &[WaterSource]) {
        self.total_available_volume = 0.0;
        self.total_stored_volume = 0.0;
        self.net_stream_inflow = 0.0;

        for &ws in &self.priority_draw_sources {
            let source = &sources[ws];
            self.total_available_volume += source.available_allocated_volume(self.id).max(1e-6);
            self.total_stored_volume += source.priority_source_potential_volume(self.id).max(1e-6);
            self.net_stream_inflow += source.allocated_inflow(self.id);
        }

        for &ws in &self.non_priority_draw_sources {
            let source = &sources[ws];
            let stored = source.available_allocated_volume(self.id).max(1e-6);
            self.total_available_volume += stored;
            self.total_stored_volume += stored;
            self.net_stream_inflow += source.allocated_inflow(self.id);
        }
    }

    /// Stored volume relative to storage capacity; a utility with no
    /// storage never counts as storage-failed.
    pub fn storage_to_capacity_ratio(&self) -> f64 {
        if self.total_storage_capacity > 0.0 {
            self.total_stored_volume / self.total_storage_capacity
        } else {
            1.0
        }
    }
}
