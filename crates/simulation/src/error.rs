//! Error types for the simulation crate.
//!
//! Configuration problems are fatal at construction and surface as
//! [`ConfigError`] from [`crate::region::RegionConfig::build_realization`].
//! Invariant violations detected while stepping surface as
//! [`SimulationError`]; the weekly systems park them in
//! [`crate::RealizationStatus`] so the outer runner can abort the
//! realization.

/// Errors raised while validating and building a region configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The source graph contains a cycle and has no topological order.
    #[error("source graph contains a cycle involving source {0}")]
    CyclicSourceGraph(usize),

    /// An edge references a source id outside the arena.
    #[error("graph edge references unknown source {0}")]
    UnknownSource(usize),

    /// A source allocation references a utility id outside the region.
    #[error("source {source_id}: allocation references unknown utility {utility}")]
    UnknownUtility { source_id: usize, utility: usize },

    /// Monthly demand-fraction / price tables must have 12 rows each.
    #[error("utility {utility}: monthly price tables must have 12 rows, got {rows}")]
    BadPriceTable { utility: usize, rows: usize },

    /// Demand-fraction and price tables must agree on the tier count.
    #[error("utility {utility}: demand fractions and prices disagree on tier count")]
    MismatchedPriceTiers { utility: usize },

    /// The same source was attached to a utility twice.
    #[error("utility {utility}: source {source_id} attached twice")]
    DuplicateSource { utility: usize, source_id: usize },

    /// A utility was given no demand realizations at all.
    #[error("utility {0}: empty demand matrix")]
    EmptyDemandMatrix(usize),

    /// The requested realization index is outside the demand matrix.
    #[error("realization {realization} out of range ({available} available)")]
    RealizationOutOfRange { realization: usize, available: usize },

    /// Infrastructure planning requires a strictly positive discount rate.
    #[error("utility {0}: infrastructure discount rate must be positive")]
    NonPositiveDiscountRate(usize),

    /// Infrastructure planning with no candidate projects is a
    /// configuration mistake, not an empty plan.
    #[error("utility {0}: both construction queues are empty")]
    EmptyConstructionQueues(usize),

    /// The projection vector is too short for the forecast horizon.
    #[error(
        "utility {utility}: {projections} annual projections cannot cover \
         {years} simulated years plus a {forecast}-year forecast"
    )]
    ForecastBeyondProjections {
        utility: usize,
        projections: usize,
        years: usize,
        forecast: usize,
    },

    /// Per-utility allocation fractions of one source exceed 100%.
    #[error("source {source_id}: allocation fractions sum to {sum}, above 1")]
    OverAllocatedSource { source_id: usize, sum: f64 },

    /// Effluent tables must carry one fraction per week-of-year slot.
    #[error("discharge rule for source {source_id}: expected 53 weekly fractions, got {len}")]
    BadDischargeTable { source_id: usize, len: usize },

    /// Effluent fractions must lie in [0, 1].
    #[error("discharge rule for source {source_id}: fraction {value} outside [0, 1]")]
    DischargeFractionOutOfRange { source_id: usize, value: f64 },

    /// Hydrologic series must reach far enough into the past to cover the
    /// shifted flow years used by the risk-of-failure reruns.
    #[error(
        "source {source_id}: inflow history of {history} weeks cannot cover \
         {required} weeks of risk-of-failure shifts"
    )]
    InsufficientHydrologyHistory {
        source_id: usize,
        history: usize,
        required: usize,
    },
}

/// Errors raised while stepping a realization. All of these abort the
/// realization; none are recoverable inside the core.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimulationError {
    /// A surcharge price below the base volumetric price would make the
    /// fund arithmetic pay customers to restrict demand.
    #[error(
        "utility {utility}, week {week}: restricted price {restricted} below \
         base price {base}"
    )]
    RestrictedPriceBelowBase {
        utility: usize,
        week: usize,
        restricted: f64,
        base: f64,
    },

    /// Stored volume drifted above capacity beyond tolerance.
    #[error("source {source_id}, week {week}: volume {volume} exceeds capacity {capacity}")]
    VolumeAboveCapacity {
        source_id: usize,
        week: usize,
        volume: f64,
        capacity: f64,
    },

    /// Debt service arithmetic produced a non-finite number.
    #[error("utility {utility}, week {week}: non-finite debt service")]
    NonFiniteDebtService { utility: usize, week: usize },

    /// A demand projection was requested past the projection vector.
    #[error("utility {utility}: projection for year {year} is out of range")]
    ProjectionOutOfRange { utility: usize, year: usize },

    /// A series lookup fell outside the provided history window.
    #[error("source {source_id}: hydrology lookup at shifted week {week} has no data")]
    HydrologyOutOfRange { source_id: usize, week: i64 },
}
