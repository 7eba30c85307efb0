//! Source types, input series, and per-utility allocation accessors.

use serde::{Deserialize, Serialize};

use crate::bonds::Bond;

/// The hydrologic behavior of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// Storage reservoir with catchment inflow and evaporation.
    Reservoir,
    /// Reservoir whose inflow is capped by a diversion channel; excess
    /// bypasses storage.
    Quarry,
    /// Run-of-river intake with no storage.
    Intake,
    /// Intake with per-utility allocation bookkeeping.
    AllocatedIntake,
    /// Wastewater reuse plant; produces treated water, no stream outflow.
    Reuse,
}

impl SourceKind {
    pub fn name(self) -> &'static str {
        match self {
            SourceKind::Reservoir => "Reservoir",
            SourceKind::Quarry => "Quarry",
            SourceKind::Intake => "Intake",
            SourceKind::AllocatedIntake => "Allocated Intake",
            SourceKind::Reuse => "Reuse",
        }
    }

    /// Priority-draw sources are used to their availability before any
    /// reservoir storage is touched.
    pub fn is_priority_draw(self) -> bool {
        matches!(
            self,
            SourceKind::Intake | SourceKind::AllocatedIntake | SourceKind::Reuse
        )
    }

    /// Whether the variant holds water between weeks.
    pub fn has_storage(self) -> bool {
        matches!(self, SourceKind::Reservoir | SourceKind::Quarry)
    }
}

/// A weekly input series with pre-simulation history.
///
/// Risk-of-failure reruns shift the simulation week back by whole flow
/// years, producing negative effective weeks; `history_weeks` values before
/// week 0 absorb those shifts so a lookup never wraps or extrapolates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HydrologySeries {
    values: Vec<f64>,
    history_weeks: usize,
}

impl HydrologySeries {
    pub fn new(values: Vec<f64>, history_weeks: usize) -> Self {
        Self {
            values,
            history_weeks,
        }
    }

    /// A constant series covering `history_weeks` of history plus
    /// `future_weeks` of simulation.
    pub fn constant(value: f64, history_weeks: usize, future_weeks: usize) -> Self {
        Self {
            values: vec![value; history_weeks + future_weeks],
            history_weeks,
        }
    }

    /// Series that is zero everywhere.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Weeks of history before simulation week 0.
    pub fn history_weeks(&self) -> usize {
        self.history_weeks
    }

    /// Value at a (possibly negative) simulation week.
    pub fn at(&self, week: i64) -> Option<f64> {
        let index = week + self.history_weeks as i64;
        if index < 0 {
            return None;
        }
        self.values.get(index as usize).copied()
    }
}

/// Reservoir surface area as a function of stored volume, for evaporation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum StorageArea {
    /// Constant surface area.
    Fixed(f64),
    /// Area grows linearly with stored volume.
    Linear { base: f64, slope: f64 },
}

impl StorageArea {
    pub fn area(&self, volume: f64) -> f64 {
        match *self {
            StorageArea::Fixed(area) => area,
            StorageArea::Linear { base, slope } => base + slope * volume,
        }
    }
}

impl Default for StorageArea {
    fn default() -> Self {
        StorageArea::Fixed(0.0)
    }
}

/// One hydrologic node with per-utility allocation bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterSource {
    pub id: usize,
    pub name: String,
    pub kind: SourceKind,
    pub online: bool,
    /// Storage capacity (storage variants) in volume units.
    pub capacity: f64,
    pub min_environmental_outflow: f64,
    pub max_treatment_capacity: f64,
    /// Inflow cap for quarries; unused elsewhere.
    pub max_diversion: f64,
    /// Weeks from construction start to coming online.
    pub construction_time: usize,
    /// Earlier project this one extends, for shared-capital accounting.
    pub sequence_predecessor: Option<usize>,
    /// Jointly owned plants with drifting capacity shares normalize their
    /// treatment fractions instead of reading them raw.
    pub variable_allocations: bool,

    pub catchment_inflows: HydrologySeries,
    /// Weekly evaporation depth; empty series means no evaporation.
    pub evaporation: HydrologySeries,
    pub storage_area: StorageArea,

    /// Capacity fraction per utility id.
    pub allocated_fractions: Vec<f64>,
    /// Treatment-capacity fraction per utility id.
    pub allocated_treatment_fractions: Vec<f64>,
    /// Volume each utility may draw next week.
    pub available_allocated_volumes: Vec<f64>,
    /// This week's stream inflow attributed to each utility.
    pub allocated_inflows: Vec<f64>,

    /// Unissued bonds, one per owning utility of a buildable source.
    pub bonds: Vec<Bond>,

    // Weekly mass-balance state.
    pub available_volume: f64,
    pub total_outflow: f64,
    pub upstream_source_inflow: f64,
    pub upstream_catchment_inflow: f64,
    pub evaporated_volume: f64,
    pub total_demand: f64,
    /// Flow admitted into quarry storage this week.
    pub diverted_flow: f64,
    /// Intakes: stream water left after this week's withdrawals.
    pub available_after_demand: f64,
}

impl WaterSource {
    /// A source with zeroed state and allocation tables sized for
    /// `n_utilities`. Callers fill in configuration afterwards.
    pub fn new(id: usize, name: impl Into<String>, kind: SourceKind, n_utilities: usize) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            online: true,
            capacity: 0.0,
            min_environmental_outflow: 0.0,
            max_treatment_capacity: 0.0,
            max_diversion: 0.0,
            construction_time: 0,
            sequence_predecessor: None,
            variable_allocations: false,
            catchment_inflows: HydrologySeries::zero(),
            evaporation: HydrologySeries::zero(),
            storage_area: StorageArea::default(),
            allocated_fractions: vec![0.0; n_utilities],
            allocated_treatment_fractions: vec![0.0; n_utilities],
            available_allocated_volumes: vec![0.0; n_utilities],
            allocated_inflows: vec![0.0; n_utilities],
            bonds: Vec::new(),
            available_volume: 0.0,
            total_outflow: 0.0,
            upstream_source_inflow: 0.0,
            upstream_catchment_inflow: 0.0,
            evaporated_volume: 0.0,
            total_demand: 0.0,
            diverted_flow: 0.0,
            available_after_demand: 0.0,
        }
    }

    /// Storage capacity share owned by `utility`.
    pub fn allocated_capacity(&self, utility: usize) -> f64 {
        self.allocated_fractions[utility] * self.capacity
    }

    /// Treatment capacity share owned by `utility`.
    pub fn allocated_treatment_capacity(&self, utility: usize) -> f64 {
        self.allocated_treatment_fractions[utility] * self.max_treatment_capacity
    }

    /// Treatment fraction owned by `utility`. Jointly owned plants with
    /// drifting shares report the fraction of the currently allocated
    /// total, since shares need not sum to 1 there.
    pub fn allocated_treatment_fraction(&self, utility: usize) -> f64 {
        if self.variable_allocations {
            let sum: f64 = self.allocated_treatment_fractions.iter().sum();
            if sum > 0.0 {
                return self.allocated_treatment_fractions[utility] / sum;
            }
        }
        self.allocated_treatment_fractions[utility]
    }

    /// This week's stream inflow attributed to `utility`.
    pub fn allocated_inflow(&self, utility: usize) -> f64 {
        self.allocated_inflows[utility]
    }

    /// Volume `utility` may draw in the upcoming week.
    pub fn available_allocated_volume(&self, utility: usize) -> f64 {
        self.available_allocated_volumes[utility]
    }

    /// Contribution of this source to the utility's stored-volume total:
    /// storage variants report their allocated volume, intakes report the
    /// stream water left after this week's demands, reuse reports nothing.
    pub fn priority_source_potential_volume(&self, utility: usize) -> f64 {
        match self.kind {
            SourceKind::Reservoir | SourceKind::Quarry => {
                self.available_allocated_volumes[utility]
            }
            SourceKind::Intake | SourceKind::AllocatedIntake => {
                self.allocated_fractions[utility] * self.available_after_demand
            }
            SourceKind::Reuse => 0.0,
        }
    }

    /// The unissued bond held for `utility`, if this source is buildable
    /// by it.
    pub fn bond_for(&mut self, utility: usize) -> Option<&mut Bond> {
        self.bonds.iter_mut().find(|b| b.utility_id == utility)
    }

    /// Bring the source online. Quarries start empty and fill from
    /// diverted inflow.
    pub fn set_online(&mut self) {
        self.online = true;
        if self.kind == SourceKind::Quarry {
            self.available_volume = 0.0;
        }
    }
}
