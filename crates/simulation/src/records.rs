//! Weekly per-utility output rows, read by the external result writers.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::region::Utilities;
use crate::{RealizationStatus, SimClock};

/// Everything the outer driver wants to know about one utility-week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyUtilityRecord {
    pub week: usize,
    pub utility_id: usize,
    pub risk_of_failure: f64,
    pub storage_rof: f64,
    pub treatment_rof: f64,
    pub long_term_rof: f64,
    pub long_term_storage_rof: f64,
    pub long_term_treatment_rof: f64,
    pub restricted_demand: f64,
    pub unrestricted_demand: f64,
    pub unfulfilled_demand: f64,
    pub gross_revenue: f64,
    pub contingency_fund: f64,
    pub fund_contribution: f64,
    pub drought_mitigation_cost: f64,
    pub insurance_payout: f64,
    pub insurance_purchase: f64,
    pub current_debt_payment: f64,
    pub current_pv_debt_payment: f64,
    pub infra_net_present_cost: f64,
    pub infra_built_last_week: Vec<usize>,
    pub total_storage_capacity: f64,
    pub total_treatment_capacity: f64,
    pub total_available_volume: f64,
    pub total_stored_volume: f64,
    pub waste_water_discharge: f64,
    pub net_stream_inflow: f64,
}

/// Accumulated rows for the whole realization, week-major then
/// utility-major, so the writer can stream them in order.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct UtilityRecords {
    pub rows: Vec<WeeklyUtilityRecord>,
}

impl UtilityRecords {
    /// Rows belonging to one utility, in week order.
    pub fn for_utility(&self, utility_id: usize) -> impl Iterator<Item = &WeeklyUtilityRecord> {
        self.rows.iter().filter(move |r| r.utility_id == utility_id)
    }
}

/// System: snapshot every utility at the end of the week.
pub fn record_week(
    clock: Res<SimClock>,
    utilities: Res<Utilities>,
    mut records: ResMut<UtilityRecords>,
    status: Res<RealizationStatus>,
) {
    if status.failed() {
        return;
    }
    for utility in &utilities.0 {
        records.rows.push(WeeklyUtilityRecord {
            week: clock.week,
            utility_id: utility.id,
            risk_of_failure: utility.short_term_rof,
            storage_rof: utility.short_term_storage_rof,
            treatment_rof: utility.short_term_treatment_rof,
            long_term_rof: utility.long_term_rof,
            long_term_storage_rof: utility.long_term_storage_rof,
            long_term_treatment_rof: utility.long_term_treatment_rof,
            restricted_demand: utility.restricted_demand,
            unrestricted_demand: utility.unrestricted_demand,
            unfulfilled_demand: utility.unfulfilled_demand,
            gross_revenue: utility.gross_revenue,
            contingency_fund: utility.contingency_fund,
            fund_contribution: utility.fund_contribution,
            drought_mitigation_cost: utility.drought_mitigation_cost,
            insurance_payout: utility.insurance_payout,
            insurance_purchase: utility.insurance_purchase,
            current_debt_payment: utility.current_debt_payment,
            current_pv_debt_payment: utility.current_pv_debt_payment,
            infra_net_present_cost: utility.infra_net_present_cost,
            infra_built_last_week: utility.infra_built_last_week.clone(),
            total_storage_capacity: utility.total_storage_capacity,
            total_treatment_capacity: utility.total_treatment_capacity,
            total_available_volume: utility.total_available_volume,
            total_stored_volume: utility.total_stored_volume,
            waste_water_discharge: utility.waste_water_discharge,
            net_stream_inflow: utility.net_stream_inflow,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(week: usize, utility_id: usize) -> WeeklyUtilityRecord {
        WeeklyUtilityRecord {
            week,
            utility_id,
            risk_of_failure: 0.0,
            storage_rof: 0.0,
            treatment_rof: 0.0,
            long_term_rof: 0.0,
            long_term_storage_rof: 0.0,
            long_term_treatment_rof: 0.0,
            restricted_demand: 0.0,
            unrestricted_demand: 0.0,
            unfulfilled_demand: 0.0,
            gross_revenue: 0.0,
            contingency_fund: 0.0,
            fund_contribution: 0.0,
            drought_mitigation_cost: 0.0,
            insurance_payout: 0.0,
            insurance_purchase: 0.0,
            current_debt_payment: 0.0,
            current_pv_debt_payment: 0.0,
            infra_net_present_cost: 0.0,
            infra_built_last_week: Vec::new(),
            total_storage_capacity: 0.0,
            total_treatment_capacity: 0.0,
            total_available_volume: 0.0,
            total_stored_volume: 0.0,
            waste_water_discharge: 0.0,
            net_stream_inflow: 0.0,
        }
    }

    #[test]
    fn test_for_utility_filters_rows() {
        let records = UtilityRecords {
            rows: vec![row(0, 0), row(0, 1), row(1, 0), row(1, 1)],
        };
        let weeks: Vec<usize> = records.for_utility(1).map(|r| r.week).collect();
        assert_eq!(weeks, vec![0, 1]);
    }
}
