//! Configuration-driven factor scoring.
//!
//! Raw per-security metrics are normalized to 0-100 scores by the methods in
//! [`methods`], aggregated per factor by [`factor`], combined under a persona by
//! [`composite`], and explained by [`explain`]. Everything is driven by factor and
//! persona definitions validated up front by [`loader`]. Data absence travels as
//! `None` end to end; only structural configuration problems are errors.
//! [`router`] exposes the engine over HTTP.

pub mod composite;
pub mod config;
pub mod definitions;
pub mod engine;
pub mod explain;
pub mod factor;
pub mod loader;
pub mod methods;
pub mod metrics;
pub mod router;
pub mod store;
pub mod universe;
pub mod views;

#[cfg(test)]
mod tests;

pub use composite::CompositeScore;
pub use config::{
    ClampBounds, FactorConfig, FactorId, FactorSummary, MetricSpec, Persona, PersonaFactor,
    PersonaId, ScoringConfigSet,
};
pub use definitions::{
    DefinitionSource, DefinitionSourceError, FactorDefinition, MetricEntry, PersonaDefinition,
    ScoringDefinitions,
};
pub use engine::{ScoringEngine, ScoringError};
pub use explain::{ExplanationTemplate, TemplateError};
pub use factor::{FactorResult, ScoreComponent};
pub use loader::{ConfigIssue, ConfigScope, ConfigValidationError, IssueKind};
pub use methods::{LinearBounds, ScoringMethod, ThresholdBand, ThresholdBound, ThresholdLadder};
pub use metrics::{
    MetricDefinition, MetricValue, MetricsSource, SecurityId, SecurityMetrics, SourceError,
    ValueKind,
};
pub use router::{scoring_router, ScoringService};
pub use store::{ConfigSnapshot, ConfigStore};
pub use universe::{
    Classification, PeerUniverse, PeerUniverseSource, UniverseLoadError, UniverseScope,
    UniverseSnapshot,
};
pub use views::{CompositeView, ConfigListingView, FactorView};

/// Weighted mean over present `(value, weight)` pairs, renormalized by the weight
/// actually present. `None` when nothing contributed.
pub(crate) fn weighted_mean(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let (weighted_sum, total_weight) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(sum, total), (value, weight)| {
            (sum + value * weight, total + weight)
        });

    if total_weight > 0.0 {
        Some(weighted_sum / total_weight)
    } else {
        None
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
