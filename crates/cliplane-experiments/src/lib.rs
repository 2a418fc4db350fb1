//! Bayesian experiment engine for the ClipLane core.
//!
//! Maintains a Beta-Bernoulli posterior per creative variant, recommends
//! traffic allocation with an exploration floor, and decides when a variant
//! has won its experiment.

pub mod engine;
pub mod error;
pub mod posterior;

pub use engine::{
    CreateExperiment, CreateVariant, Decision, ExperimentDetails, ExperimentEngine,
    IngestSummary, MetricsItem, VariantDetails,
};
pub use error::{ExperimentError, ExperimentResult};
pub use posterior::{
    recommend_allocations, should_promote, Promotion, VariantPosterior, DEFAULT_MIN_SHARE,
};
