//! Weekly mass balance per source variant.

use crate::error::SimulationError;

use super::types::{SourceKind, WaterSource};

impl WaterSource {
    /// Advance this source one week.
    ///
    /// `week` is the effective (possibly shifted, possibly negative) week
    /// used to index hydrologic inputs; `upstream_source_inflow` is the
    /// summed outflow of upstream sources plus effluent discharged here
    /// this week; `demand_outflow` holds each utility's draw against this
    /// source.
    ///
    /// Offline sources are transparent: inflow passes through unchanged
    /// and stored volume stays put. Storage never leaves `[0, capacity]`.
    pub fn apply_continuity(
        &mut self,
        week: i64,
        upstream_source_inflow: f64,
        demand_outflow: &[f64],
    ) -> Result<(), SimulationError> {
        let total_demand: f64 = demand_outflow.iter().sum();
        let catchment_inflow = self.catchment_inflow_at(week)?;
        let total_inflow = upstream_source_inflow + catchment_inflow;

        self.evaporated_volume = 0.0;
        self.diverted_flow = 0.0;
        self.available_after_demand = 0.0;

        match self.kind {
            SourceKind::Reservoir => {
                if self.online {
                    self.evaporated_volume =
                        self.evaporation_depth_at(week)? * self.storage_area.area(self.available_volume);
                    let mut new_volume = self.available_volume + total_inflow
                        - total_demand
                        - self.min_environmental_outflow
                        - self.evaporated_volume;
                    let mut outflow = self.min_environmental_outflow;
                    if new_volume > self.capacity {
                        outflow += new_volume - self.capacity;
                        new_volume = self.capacity;
                    }
                    self.available_volume = new_volume.max(0.0);
                    self.total_outflow = outflow;
                } else {
                    self.total_outflow = total_inflow;
                }
            }
            SourceKind::Quarry => {
                if self.online {
                    self.evaporated_volume =
                        self.evaporation_depth_at(week)? * self.storage_area.area(self.available_volume);
                    self.diverted_flow = self
                        .max_diversion
                        .min(total_inflow - self.min_environmental_outflow)
                        .max(0.0);
                    let mut new_volume = self.available_volume + self.diverted_flow
                        - total_demand
                        - self.evaporated_volume;
                    let mut outflow = total_inflow - self.diverted_flow;
                    if new_volume > self.capacity {
                        let excess = new_volume - self.capacity;
                        outflow += excess;
                        self.diverted_flow -= excess;
                        new_volume = self.capacity;
                    }
                    self.available_volume = new_volume.max(0.0);
                    self.total_outflow = outflow;
                } else {
                    self.total_outflow = total_inflow;
                }
            }
            SourceKind::Intake | SourceKind::AllocatedIntake => {
                if self.online {
                    self.total_outflow = (total_inflow - total_demand).max(0.0);
                    self.available_after_demand =
                        (total_inflow - total_demand - self.min_environmental_outflow).max(0.0);
                } else {
                    self.total_outflow = total_inflow;
                }
            }
            SourceKind::Reuse => {
                // Off-stream: upstream flow continues untouched.
                self.total_outflow = total_inflow;
            }
        }

        self.total_demand = total_demand;
        self.upstream_source_inflow = upstream_source_inflow;
        self.upstream_catchment_inflow = catchment_inflow;
        self.update_allocations(total_inflow);

        Ok(())
    }

    /// Refresh per-utility availability for the upcoming week's demand
    /// split.
    fn update_allocations(&mut self, total_inflow: f64) {
        for utility in 0..self.allocated_fractions.len() {
            self.allocated_inflows[utility] = self.allocated_fractions[utility] * total_inflow;

            self.available_allocated_volumes[utility] = if !self.online {
                0.0
            } else {
                match self.kind {
                    SourceKind::Reservoir | SourceKind::Quarry => {
                        self.allocated_fractions[utility] * self.available_volume
                    }
                    SourceKind::Intake | SourceKind::AllocatedIntake => {
                        (self.allocated_fractions[utility] * total_inflow)
                            .min(self.allocated_treatment_capacity(utility))
                    }
                    SourceKind::Reuse => self.allocated_treatment_capacity(utility),
                }
            };
        }
    }

    fn catchment_inflow_at(&self, week: i64) -> Result<f64, SimulationError> {
        if self.catchment_inflows.is_empty() {
            return Ok(0.0);
        }
        self.catchment_inflows
            .at(week)
            .ok_or(SimulationError::HydrologyOutOfRange {
                source_id: self.id,
                week,
            })
    }

    fn evaporation_depth_at(&self, week: i64) -> Result<f64, SimulationError> {
        if self.evaporation.is_empty() {
            return Ok(0.0);
        }
        self.evaporation
            .at(week)
            .ok_or(SimulationError::HydrologyOutOfRange {
                source_id: self.id,
                week,
            })
    }
}
