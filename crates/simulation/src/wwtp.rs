//! Wastewater treatment plant discharge rules.
//!
//! Each utility returns a week-of-year dependent fraction of its demand as
//! treated effluent to specific downstream sources. The rule is a table of
//! 53 weekly fractions per destination source, fixed at construction.

use serde::{Deserialize, Serialize};

use crate::config::WEEKS_OF_YEAR_TABLE;
use crate::error::ConfigError;

/// Year-indexed effluent fractions for one utility.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WwtpDischargeRule {
    /// Source ids receiving effluent, in discharge order.
    discharge_to_source_ids: Vec<usize>,
    /// One 53-slot weekly fraction series per entry of
    /// `discharge_to_source_ids`.
    fractions: Vec<Vec<f64>>,
}

impl WwtpDischargeRule {
    /// Build a rule from `(source_id, weekly_fractions)` pairs.
    ///
    /// Every series must have 53 entries in `[0, 1]`.
    pub fn new(series: Vec<(usize, Vec<f64>)>) -> Result<Self, ConfigError> {
        let mut discharge_to_source_ids = Vec::with_capacity(series.len());
        let mut fractions = Vec::with_capacity(series.len());

        for (source, weekly) in series {
            if weekly.len() != WEEKS_OF_YEAR_TABLE {
                return Err(ConfigError::BadDischargeTable {
                    source_id: source,
                    len: weekly.len(),
                });
            }
            if let Some(&value) = weekly.iter().find(|f| !(0.0..=1.0).contains(*f)) {
                return Err(ConfigError::DischargeFractionOutOfRange { source_id: source, value });
            }
            discharge_to_source_ids.push(source);
            fractions.push(weekly);
        }

        Ok(Self {
            discharge_to_source_ids,
            fractions,
        })
    }

    /// A rule that discharges nothing anywhere.
    pub fn none() -> Self {
        Self::default()
    }

    /// Destination source ids, in discharge order.
    pub fn destinations(&self) -> &[usize] {
        &self.discharge_to_source_ids
    }

    /// Fraction of demand discharged to `source_id` in the given
    /// week-of-year slot. Zero for sources the rule does not target.
    pub fn fraction(&self, source_id: usize, week_of_year: usize) -> f64 {
        self.discharge_to_source_ids
            .iter()
            .position(|&id| id == source_id)
            .map_or(0.0, |idx| self.fractions[idx][week_of_year])
    }
}
