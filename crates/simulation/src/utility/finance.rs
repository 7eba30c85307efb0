//! Contingency fund, debt service, and insurance accounting.

use crate::bonds::BondKind;
use crate::config::{is_first_week_of_year, week_of_year};
use crate::error::SimulationError;
use crate::water_sources::WaterSource;

use super::types::Utility;

impl Utility {
    /// Weekly financial update.
    ///
    /// The fund receives a fixed share of what full-price revenue would
    /// have been, loses restriction and transfer costs, and recoups the
    /// surcharge collected while restrictions are priced up. It is clamped
    /// to `[0, cap]`: shortfalls carry forward as drought-mitigation cost,
    /// overflow is forfeited. Debt service is then refreshed, rescaling
    /// variable-interest bonds from current treatment allocations first.
    pub fn update_fund_and_debt(
        &mut self,
        week: usize,
        sources: &[WaterSource],
    ) -> Result<(), SimulationError> {
        // Fiscal-year rollovers: insurance on the boundary week, the
        // yearly cost accumulators one week later.
        if is_first_week_of_year(week) {
            self.insurance_purchase = 0.0;
        } else if week > 0 && is_first_week_of_year(week - 1) {
            self.infra_net_present_cost = 0.0;
        }

        let unrestricted_price = self.weekly_average_volumetric_price[week_of_year(week)];
        let current_price = self.restricted_price.unwrap_or(unrestricted_price);
        if current_price < unrestricted_price {
            return Err(SimulationError::RestrictedPriceBelowBase {
                utility: self.id,
                week,
                restricted: current_price,
                base: unrestricted_price,
            });
        }

        let projected_contribution = self.percent_contingency_fund_contribution
            * self.unrestricted_demand
            * unrestricted_price;
        self.gross_revenue = self.restricted_demand * current_price;

        let lost_volume =
            self.unrestricted_demand * (1.0 - self.demand_multiplier) + self.unfulfilled_demand;
        let revenue_losses = lost_volume * unrestricted_price;
        let transfer_costs = self.demand_offset * (self.offset_rate_per_volume - unrestricted_price);
        let surcharge_recouped = self.restricted_demand * (current_price - unrestricted_price);

        let previous_fund = self.contingency_fund;
        self.contingency_fund = (previous_fund + projected_contribution
            - revenue_losses
            - transfer_costs
            + surcharge_recouped)
            .clamp(0.0, self.contingency_fund_cap);

        self.drought_mitigation_cost = (revenue_losses + transfer_costs
            - self.insurance_payout
            - surcharge_recouped)
            .max(0.0);
        self.fund_contribution = (projected_contribution - revenue_losses - transfer_costs
            + surcharge_recouped)
            .min(self.contingency_fund_cap - previous_fund);

        // Mitigation inputs are consumed; policies set them anew each week.
        self.restricted_price = None;
        self.demand_offset = 0.0;
        self.offset_rate_per_volume = 0.0;

        self.update_debt_payments(week, sources)
    }

    /// Sum this week's debt service over issued bonds, present-valued and
    /// nominal.
    fn update_debt_payments(
        &mut self,
        week: usize,
        sources: &[WaterSource],
    ) -> Result<(), SimulationError> {
        for bond in &mut self.issued_bonds {
            if bond.kind == BondKind::VariableInterest {
                let fraction = sources[bond.source_id].allocated_treatment_fraction(self.id);
                bond.set_debt_service(fraction);
            }
        }

        let mut debt_payment = 0.0;
        let mut pv_debt_payment = 0.0;
        for bond in &mut self.issued_bonds {
            // Present value reads the pending payment, so it must come
            // before the payment counter advances.
            pv_debt_payment += bond.present_value_debt_service(week, self.infra_discount_rate);
            debt_payment += bond.debt_service(week);
        }

        if !debt_payment.is_finite() || !pv_debt_payment.is_finite() {
            return Err(SimulationError::NonFiniteDebtService {
                utility: self.id,
                week,
            });
        }

        self.current_debt_payment = debt_payment;
        self.current_pv_debt_payment = pv_debt_payment;
        Ok(())
    }

    /// Credit an insurance payout into the fund.
    pub fn add_insurance_payout(&mut self, payout: f64) {
        self.contingency_fund =
            (self.contingency_fund + payout).clamp(0.0, self.contingency_fund_cap);
        self.insurance_payout = payout;
    }

    /// Pay an insurance premium out of the fund.
    pub fn purchase_insurance(&mut self, price: f64) {
        self.contingency_fund =
            (self.contingency_fund - price).clamp(0.0, self.contingency_fund_cap);
        self.insurance_purchase = price;
    }

    /// Enact a demand-restriction multiplier for the coming week.
    pub fn set_demand_multiplier(&mut self, multiplier: f64) {
        self.demand_multiplier = multiplier;
    }

    /// Register a transfer for the coming week. Offsets accumulate, since
    /// a utility can hold several transfer agreements.
    pub fn set_demand_offset(&mut self, offset: f64, rate_per_volume: f64) {
        self.demand_offset += offset;
        self.offset_rate_per_volume = rate_per_volume;
    }

    /// Set the surcharge price enacted with restrictions.
    pub fn set_restricted_price(&mut self, price: f64) {
        self.restricted_price = Some(price);
    }

    /// Adjust treatment capacity for a joint plant whose shares drifted.
    /// Floored at zero.
    pub fn update_treatment_capacity(&mut self, adjustment: f64) {
        self.total_treatment_capacity = (self.total_treatment_capacity + adjustment).max(0.0);
    }

    /// Correct the capacity totals for jointly owned plants with drifting
    /// shares: the raw configured fraction counted by
    /// [`Utility::recalculate_capacity_totals`] is replaced, as a delta,
    /// by the share of the currently allocated total. Applied whenever a
    /// source comes online and shares shift.
    pub fn apply_joint_plant_capacity_drift(&mut self, sources: &[WaterSource]) {
        let owned_sources = self.owned_sources.clone();
        for ws in owned_sources {
            let source = &sources[ws];
            if !source.online || !source.variable_allocations {
                continue;
            }
            let raw = source.allocated_treatment_capacity(self.id);
            let effective =
                source.allocated_treatment_fraction(self.id) * source.max_treatment_capacity;
            self.update_treatment_capacity(effective - raw);
        }
    }
}
