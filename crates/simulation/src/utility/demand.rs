//! Weekly demand computation: splitting across sources, effluent
//! releases, and the long-term demand projection.

use crate::config::{week_of_year, year_of_week};
use crate::error::SimulationError;
use crate::water_sources::WaterSource;

use super::types::Utility;

impl Utility {
    /// Split this week's demand across owned sources into
    /// `demands[source][utility]`.
    ///
    /// Unrestricted demand comes from the realization trace (or, for
    /// long-term risk evaluation, the projected estimate), scaled by the
    /// week-of-year peaking factor. Restrictions and transfers shrink it
    /// to the restricted demand; whatever exceeds available volume or
    /// treatment capacity becomes unfulfilled. Intakes and reuse are drawn
    /// first in declaration order; reservoirs split the remainder in
    /// proportion to available allocated volume, with a single
    /// redistribution pass repairing any draw above a source's treatment
    /// capacity.
    pub fn split_demands(
        &mut self,
        week: usize,
        demands: &mut [Vec<f64>],
        apply_demand_buffer: bool,
        apply_demand_projection: bool,
        sources: &[WaterSource],
    ) {
        let peaking = self.weekly_peaking_factor[week_of_year(week)];
        self.unrestricted_demand = if apply_demand_projection {
            self.future_demand_estimate * peaking
        } else {
            let buffer = if apply_demand_buffer {
                self.demand_buffer
            } else {
                0.0
            };
            (self.demand_series[week] + buffer) * peaking
        };

        let mut restricted = self.unrestricted_demand * self.demand_multiplier - self.demand_offset;
        self.unfulfilled_demand = (restricted - self.total_available_volume)
            .max(restricted - self.total_treatment_capacity)
            .max(0.0);
        restricted -= self.unfulfilled_demand;

        // Intakes and reuse first, to their availability.
        let mut remaining = restricted;
        for &ws in &self.priority_draw_sources {
            let draw = remaining.min(sources[ws].available_allocated_volume(self.id));
            demands[ws][self.id] = draw;
            remaining -= draw;
        }

        // Reservoirs share the remainder in proportion to available
        // allocated volume.
        let mut demand_fractions = vec![0.0; sources.len()];
        let mut over_allocated_volume = 0.0;
        let mut not_over_allocated: Vec<usize> = Vec::new();
        let mut sum_not_over_fraction = 0.0;

        for &ws in &self.non_priority_draw_sources {
            let source = &sources[ws];
            let fraction = (source.available_allocated_volume(self.id)
                / self.total_available_volume)
                .max(1e-6);
            demand_fractions[ws] = fraction;

            let source_demand = remaining * fraction;
            let treatment_cap = source.allocated_treatment_capacity(self.id);
            let over = source_demand - treatment_cap;
            if over > 0.0 {
                over_allocated_volume += over;
                demands[ws][self.id] = treatment_cap;
            } else {
                demands[ws][self.id] = source_demand;
                not_over_allocated.push(ws);
                sum_not_over_fraction += fraction;
            }
        }

        // One redistribution pass; residual excess beyond every treatment
        // cap was already counted as unfulfilled.
        if over_allocated_volume > 0.0 && sum_not_over_fraction > 0.0 {
            for &ws in &not_over_allocated {
                demands[ws][self.id] +=
                    over_allocated_volume * demand_fractions[ws] / sum_not_over_fraction;
            }
        }

        self.restricted_demand = restricted;
    }

    /// Route this week's effluent to the configured downstream sources,
    /// adding to `discharges[source]`. Transfers do not reduce the water
    /// actually consumed, so the offset is added back before applying the
    /// discharge fractions.
    pub fn calculate_wastewater(&mut self, week: usize, discharges: &mut [f64]) {
        self.waste_water_discharge = 0.0;
        let week_of_year = week_of_year(week);
        let volume = self.restricted_demand + self.demand_offset;
        for &dest in self.wwtp_discharge_rule.destinations() {
            let discharge = volume * self.wwtp_discharge_rule.fraction(dest, week_of_year);
            discharges[dest] += discharge;
            self.waste_water_discharge += discharge;
        }
    }

    /// Refresh the future demand estimate used by long-term risk
    /// evaluation.
    ///
    /// Once per reprojection period (and only after enough history has
    /// accumulated), the annual growth rate is re-fit from recorded
    /// demand and the projection vector is overwritten with the linear
    /// extrapolation until the next re-fit. Otherwise the estimate is read
    /// straight from the projection vector at the forecast horizon.
    pub fn calculate_demand_estimate(
        &mut self,
        week: usize,
        reproject: bool,
    ) -> Result<(), SimulationError> {
        let year = year_of_week(week);
        let projection = self.projection;

        if year >= self.annual_average_weekly_demand.len() {
            return Err(SimulationError::ProjectionOutOfRange {
                utility: self.id,
                year,
            });
        }
        self.current_year_recorded_demand = self.annual_average_weekly_demand[year];

        if year + projection.forecast_length >= self.annual_demand_projections.len() {
            return Err(SimulationError::ProjectionOutOfRange {
                utility: self.id,
                year: year + projection.forecast_length,
            });
        }

        let reprojection_due = year >= projection.historical_period
            && reproject
            && year % projection.reprojection_frequency == 0;

        if reprojection_due {
            let growth_rate = (self.annual_average_weekly_demand[year]
                - self.annual_average_weekly_demand[year - projection.historical_period])
                / projection.historical_period as f64;
            self.future_demand_estimate = self.current_year_recorded_demand
                + growth_rate * projection.forecast_length as f64;

            // Use the re-fit line until the next reprojection.
            for (step, target_year) in (year..=year + projection.reprojection_frequency).enumerate()
            {
                if target_year < self.annual_demand_projections.len() {
                    self.annual_demand_projections[target_year] =
                        self.current_year_recorded_demand + growth_rate * step as f64;
                }
            }
        } else {
            self.future_demand_estimate =
                self.annual_demand_projections[year + projection.forecast_length];
        }

        Ok(())
    }

    /// Projected change in annual demand from the recorded current year to
    /// the next, used by joint plants with drifting capacity shares.
    pub fn current_to_next_year_demand_delta(&self, current_year: usize) -> f64 {
        self.annual_demand_projections[current_year + 1] - self.current_year_recorded_demand
    }
}
