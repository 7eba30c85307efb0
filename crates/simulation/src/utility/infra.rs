//! Infrastructure triggering and bond issuance.

use bevy::prelude::*;

use crate::config::WEEKS_IN_YEAR_ROUND;
use crate::error::SimulationError;
use crate::infrastructure::TriggerQueue;
use crate::region::{Utilities, WaterNetwork};
use crate::water_sources::WaterSource;
use crate::{RealizationStatus, SimClock};

use super::types::Utility;

/// Sent when a trigger starts a construction project.
#[derive(Event, Debug, Clone)]
pub struct InfrastructureTriggeredEvent {
    pub utility_id: usize,
    pub source_id: usize,
    pub week: usize,
}

impl Utility {
    /// Weekly infrastructure pass: bring finished projects online, then
    /// check the trigger queues against this week's long-term risk and the
    /// past year's average demand. A triggered project breaks ground
    /// immediately and its bond is issued.
    ///
    /// Returns the id of the project triggered this week, if any. Striking
    /// mutually exclusive alternatives from *other* utilities' queues is
    /// the caller's job, since this utility cannot reach them.
    pub fn handle_infrastructure(
        &mut self,
        long_term_rof: f64,
        week: usize,
        sources: &mut [WaterSource],
    ) -> Result<Option<usize>, SimulationError> {
        for id in self.infrastructure.complete_due(week) {
            sources[id].set_online();
            self.infra_built_last_week.push(id);
            self.rebuild_source_partitions(sources);
            self.recalculate_capacity_totals(sources);
            info!(
                "utility {} brought {} online in week {}",
                self.name, sources[id].name, week
            );
        }

        let past_year_average_demand = if week >= WEEKS_IN_YEAR_ROUND {
            self.demand_series[week - WEEKS_IN_YEAR_ROUND..week]
                .iter()
                .sum::<f64>()
                / WEEKS_IN_YEAR_ROUND as f64
        } else {
            0.0
        };

        self.long_term_rof = long_term_rof;

        let Some((id, queue)) = self
            .infrastructure
            .handle_triggers(long_term_rof, past_year_average_demand)
        else {
            return Ok(None);
        };

        self.begin_and_fund(id, queue, week, sources)?;
        Ok(Some(id))
    }

    /// Exogenous policy: force the given projects to break ground this
    /// week regardless of triggers. Returns the ids actually started.
    pub fn force_infrastructure_construction(
        &mut self,
        week: usize,
        new_infra: &[usize],
        sources: &mut [WaterSource],
    ) -> Result<Vec<usize>, SimulationError> {
        let mut started = Vec::new();
        for &id in new_infra {
            if self.infrastructure.is_under_construction(id) || self.infrastructure.is_built(id) {
                continue;
            }
            let queue = if self.infrastructure.demand_queue().contains(&id) {
                TriggerQueue::Demand
            } else {
                TriggerQueue::RiskOfFailure
            };
            self.begin_and_fund(id, queue, week, sources)?;
            started.push(id);
        }
        Ok(started)
    }

    fn begin_and_fund(
        &mut self,
        id: usize,
        queue: TriggerQueue,
        week: usize,
        sources: &mut [WaterSource],
    ) -> Result<(), SimulationError> {
        let construction_time = sources[id].construction_time;
        self.infrastructure
            .begin_construction(id, queue, week, construction_time);
        info!(
            "utility {} started {} in week {} ({} weeks to build)",
            self.name, sources[id].name, week, construction_time
        );

        self.adjust_sequenced_principal(id, week, sources);
        self.issue_bond(id, week, sources)
    }

    /// Shared-capital adjustment for sequenced projects: capital already
    /// sunk into a predecessor under way is not financed twice, so the
    /// successor's principal drops by the predecessor's elapsed share.
    fn adjust_sequenced_principal(&self, id: usize, week: usize, sources: &mut [WaterSource]) {
        let Some(predecessor) = sources[id].sequence_predecessor else {
            return;
        };
        let Some(progress) = self.infrastructure.construction_progress(predecessor, week) else {
            return;
        };
        let paid = sources[predecessor]
            .bonds
            .iter()
            .find(|b| b.utility_id == self.id)
            .map_or(0.0, |b| b.principal * progress);
        if let Some(bond) = sources[id].bond_for(self.id) {
            bond.principal = (bond.principal - paid).max(0.0);
        }
    }

    /// Issue this utility's bond for `id` and book its present value.
    /// Already issued bonds are left untouched, so re-triggering within a
    /// week cannot double-book.
    pub fn issue_bond(
        &mut self,
        id: usize,
        week: usize,
        sources: &mut [WaterSource],
    ) -> Result<(), SimulationError> {
        let construction_time = sources[id].construction_time;
        let Some(bond) = sources[id].bond_for(self.id) else {
            return Ok(());
        };
        if bond.is_issued() {
            return Ok(());
        }

        bond.issue(
            week,
            construction_time,
            self.bond_term_multiplier,
            self.bond_interest_rate_multiplier,
        );
        let issued = bond.clone();
        let npv = issued.net_present_value_at_issuance(self.infra_discount_rate);
        if !npv.is_finite() {
            return Err(SimulationError::NonFiniteDebtService {
                utility: self.id,
                week,
            });
        }
        self.infra_net_present_cost += npv;
        self.issued_bonds.push(issued);
        info!(
            "utility {} issued a bond for {} in week {}",
            self.name, sources[id].name, week
        );
        Ok(())
    }
}

/// System: run every utility's weekly infrastructure pass, then broadcast
/// mutual-exclusion removals to all utilities and refresh partitions when
/// a jointly owned source came online.
pub fn handle_infrastructure_triggers(
    clock: Res<SimClock>,
    mut network: ResMut<WaterNetwork>,
    mut utilities: ResMut<Utilities>,
    mut status: ResMut<RealizationStatus>,
    mut events: EventWriter<InfrastructureTriggeredEvent>,
) {
    if status.failed() {
        return;
    }
    let week = clock.week;
    let mut any_completed = false;

    for index in 0..utilities.0.len() {
        let built_before = utilities.0[index].infra_built_last_week.len();
        let long_term_rof = utilities.0[index].long_term_rof;
        match utilities.0[index].handle_infrastructure(long_term_rof, week, &mut network.sources) {
            Ok(triggered) => {
                if utilities.0[index].infra_built_last_week.len() > built_before {
                    any_completed = true;
                }
                if let Some(source_id) = triggered {
                    let removed = utilities.0[index].infrastructure.removal_row(source_id);
                    if !removed.is_empty() {
                        for utility in utilities.0.iter_mut() {
                            utility.infrastructure.remove_options(&removed);
                        }
                    }
                    events.send(InfrastructureTriggeredEvent {
                        utility_id: index,
                        source_id,
                        week,
                    });
                }
            }
            Err(error) => {
                status.fail(error);
                return;
            }
        }
    }

    // A completion changes availability for every co-owner, not just the
    // utility whose queue carried the project. Joint plants with drifting
    // shares then re-base each co-owner's treatment capacity on its share
    // of the currently allocated total.
    if any_completed {
        for utility in utilities.0.iter_mut() {
            utility.rebuild_source_partitions(&network.sources);
            utility.recalculate_capacity_totals(&network.sources);
            utility.apply_joint_plant_capacity_drift(&network.sources);
        }
    }
}
