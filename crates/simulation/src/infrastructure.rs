//! Construction triggering and build queues.
//!
//! Each utility plans two ordered queues of candidate projects: one
//! triggered by long-term risk of failure, one by realized demand growth.
//! At most one project per queue may be under construction at a time. When
//! a project breaks ground, mutually exclusive alternatives are struck
//! from every utility's queues; when its construction window elapses the
//! source comes online.

use serde::{Deserialize, Serialize};

/// Which queue a candidate project belongs to, and therefore which metric
/// its trigger threshold is compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerQueue {
    /// Compared against long-term risk of failure.
    RiskOfFailure,
    /// Compared against the past year's average weekly demand.
    Demand,
}

/// A project that has broken ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionProject {
    pub source_id: usize,
    pub queue: TriggerQueue,
    pub start_week: usize,
    pub end_week: usize,
}

/// Per-utility construction planning state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureManager {
    rof_queue: Vec<usize>,
    demand_queue: Vec<usize>,
    /// `(source_id, threshold)`; the queue the source sits in decides
    /// whether the threshold is a risk or a demand level.
    triggers: Vec<(usize, f64)>,
    /// Rows `[trigger, remove, remove, …]`: starting `trigger` strikes the
    /// others from every utility's queues.
    if_built_remove: Vec<Vec<usize>>,
    under_construction: Vec<ConstructionProject>,
    built: Vec<usize>,
}

impl InfrastructureManager {
    pub fn new(
        rof_queue: Vec<usize>,
        demand_queue: Vec<usize>,
        triggers: Vec<(usize, f64)>,
        if_built_remove: Vec<Vec<usize>>,
    ) -> Self {
        Self {
            rof_queue,
            demand_queue,
            triggers,
            if_built_remove,
            under_construction: Vec::new(),
            built: Vec::new(),
        }
    }

    pub fn rof_queue(&self) -> &[usize] {
        &self.rof_queue
    }

    pub fn demand_queue(&self) -> &[usize] {
        &self.demand_queue
    }

    pub fn has_no_candidates(&self) -> bool {
        self.rof_queue.is_empty() && self.demand_queue.is_empty()
    }

    pub fn trigger_threshold(&self, source_id: usize) -> Option<f64> {
        self.triggers
            .iter()
            .find(|(id, _)| *id == source_id)
            .map(|&(_, threshold)| threshold)
    }

    pub fn is_under_construction(&self, source_id: usize) -> bool {
        self.under_construction
            .iter()
            .any(|p| p.source_id == source_id)
    }

    pub fn is_built(&self, source_id: usize) -> bool {
        self.built.contains(&source_id)
    }

    /// Fraction of `source_id`'s construction window already elapsed:
    /// `None` if never started, 1 once built or due.
    pub fn construction_progress(&self, source_id: usize, week: usize) -> Option<f64> {
        if self.is_built(source_id) {
            return Some(1.0);
        }
        self.under_construction
            .iter()
            .find(|p| p.source_id == source_id)
            .map(|p| {
                let span = (p.end_week - p.start_week).max(1) as f64;
                ((week.saturating_sub(p.start_week)) as f64 / span).clamp(0.0, 1.0)
            })
    }

    /// Compare each queue's metric against its head candidate's threshold
    /// and return the first project to trigger this week, if any.
    ///
    /// A queue whose head is already under construction (or whose slot is
    /// occupied by an earlier project) contributes nothing this week; the
    /// two queues are independent, so a utility can carry one project from
    /// each simultaneously.
    pub fn handle_triggers(
        &mut self,
        long_term_rof: f64,
        past_year_average_demand: f64,
    ) -> Option<(usize, TriggerQueue)> {
        let checks = [
            (TriggerQueue::RiskOfFailure, long_term_rof),
            (TriggerQueue::Demand, past_year_average_demand),
        ];

        for (queue_kind, metric) in checks {
            if self
                .under_construction
                .iter()
                .any(|p| p.queue == queue_kind)
            {
                continue;
            }
            let queue = match queue_kind {
                TriggerQueue::RiskOfFailure => &self.rof_queue,
                TriggerQueue::Demand => &self.demand_queue,
            };
            let Some(&head) = queue
                .iter()
                .find(|&&id| !self.is_under_construction(id) && !self.is_built(id))
            else {
                continue;
            };
            let Some(threshold) = self.trigger_threshold(head) else {
                continue;
            };
            if metric > threshold {
                return Some((head, queue_kind));
            }
        }
        None
    }

    /// Record that `source_id` broke ground this week.
    pub fn begin_construction(
        &mut self,
        source_id: usize,
        queue: TriggerQueue,
        week: usize,
        construction_time: usize,
    ) {
        self.under_construction.push(ConstructionProject {
            source_id,
            queue,
            start_week: week,
            end_week: week + construction_time,
        });
    }

    /// Alternatives struck out when `trigger_id` breaks ground.
    pub fn removal_row(&self, trigger_id: usize) -> Vec<usize> {
        self.if_built_remove
            .iter()
            .filter(|row| row.first() == Some(&trigger_id))
            .flat_map(|row| row[1..].iter().copied())
            .collect()
    }

    /// Strike candidate ids from both queues. Projects already under
    /// construction are not interrupted.
    pub fn remove_options(&mut self, ids: &[usize]) {
        let protected: Vec<usize> = self
            .under_construction
            .iter()
            .map(|p| p.source_id)
            .collect();
        let keep = |id: &usize| !ids.contains(id) || protected.contains(id);
        self.rof_queue.retain(&keep);
        self.demand_queue.retain(&keep);
    }

    /// Pull every project whose construction window has elapsed, removing
    /// it from its pending queue and recording it as built.
    pub fn complete_due(&mut self, week: usize) -> Vec<usize> {
        let mut completed = Vec::new();
        self.under_construction.retain(|p| {
            if p.end_week <= week {
                completed.push(p.source_id);
                false
            } else {
                true
            }
        });
        for &id in &completed {
            self.rof_queue.retain(|&q| q != id);
            self.demand_queue.retain(|&q| q != id);
            self.built.push(id);
        }
        completed
    }
}
