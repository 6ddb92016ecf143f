use serde::Serialize;
use tracing::debug;

use super::config::{FactorConfig, FactorId, MetricSpec};
use super::explain;
use super::methods::{self, ScoringMethod};
use super::metrics::{resolve, SecurityMetrics, ValueKind};
use super::universe::{build_peer_universe, PeerUniverseSource};
use super::{round_to, weighted_mean};

/// Outcome of scoring one metric for one security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub metric_id: String,
    pub label: String,
    pub value_kind: ValueKind,
    pub method: &'static str,
    /// Value as resolved from the snapshot, before any clamp.
    pub raw_value: Option<f64>,
    pub score: Option<f64>,
    pub percentile_rank: Option<f64>,
    pub peer_count: Option<usize>,
    pub weight: f64,
    pub contribution: Option<f64>,
}

impl ScoreComponent {
    pub fn is_present(&self) -> bool {
        self.score.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorResult {
    pub factor: FactorId,
    pub version: u32,
    pub label: String,
    pub score: Option<f64>,
    pub components: Vec<ScoreComponent>,
    pub explanation: String,
}

impl FactorResult {
    /// Score rounded for presentation; aggregation always uses [`Self::score`].
    pub fn display_score(&self) -> Option<f64> {
        self.score.map(|score| round_to(score, 1))
    }

    pub fn component(&self, metric_id: &str) -> Option<&ScoreComponent> {
        self.components
            .iter()
            .find(|component| component.metric_id == metric_id)
    }

    pub fn present_count(&self) -> usize {
        self.components
            .iter()
            .filter(|component| component.is_present())
            .count()
    }
}

/// Score one factor for one security.
///
/// Absent metrics produce components with no score and drop out of both the
/// numerator and the denominator, so the remaining weights are renormalized.
pub fn calculate<U>(metrics: &SecurityMetrics, config: &FactorConfig, universe: &U) -> FactorResult
where
    U: PeerUniverseSource + ?Sized,
{
    let components: Vec<ScoreComponent> = config
        .metrics
        .iter()
        .map(|spec| score_metric(metrics, spec, universe))
        .collect();

    let score = weighted_mean(
        components
            .iter()
            .filter_map(|component| component.score.map(|score| (score, component.weight))),
    );

    let mut result = FactorResult {
        factor: config.factor.clone(),
        version: config.version,
        label: config.label.clone(),
        score,
        components,
        explanation: String::new(),
    };
    result.explanation = explain::render(&config.explanation, &result);

    debug!(
        security = %metrics.security_id,
        factor = %config.factor,
        version = config.version,
        score = ?result.score,
        present = result.present_count(),
        total = result.components.len(),
        "factor scored"
    );

    result
}

fn score_metric<U>(metrics: &SecurityMetrics, spec: &MetricSpec, universe: &U) -> ScoreComponent
where
    U: PeerUniverseSource + ?Sized,
{
    let raw_value = resolve(metrics, &spec.source);
    let mut percentile_rank = None;
    let mut peer_count = None;

    let score = raw_value.and_then(|raw| {
        let value = spec.bounds.map_or(raw, |bounds| bounds.apply(raw));
        match &spec.method {
            ScoringMethod::Percentile { universe: scope }
            | ScoringMethod::PercentileInverse { universe: scope } => {
                let mut peers =
                    build_peer_universe(universe, &metrics.security_id, &spec.source, *scope);
                if let Some(bounds) = spec.bounds {
                    // Peers share the subject's clamp.
                    peers = peers.values().iter().map(|peer| bounds.apply(*peer)).collect();
                }
                peer_count = Some(peers.len());
                let rank = methods::percentile_score(value, &peers)?;
                percentile_rank = Some(rank);
                Some(match spec.method {
                    ScoringMethod::PercentileInverse { .. } => methods::SCORE_MAX - rank,
                    _ => rank,
                })
            }
            ScoringMethod::Threshold { ladder } => Some(ladder.score(value)),
            ScoringMethod::Linear { bounds } => Some(bounds.score(value)),
        }
    });

    ScoreComponent {
        metric_id: spec.id.clone(),
        label: spec.label.clone(),
        value_kind: spec.definition.value_kind,
        method: spec.method.name(),
        raw_value,
        score,
        percentile_rank,
        peer_count,
        weight: spec.weight,
        contribution: score.map(|score| score * spec.weight),
    }
}
