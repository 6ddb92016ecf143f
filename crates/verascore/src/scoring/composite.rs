use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::{FactorId, Persona, PersonaId};
use super::factor::{self, FactorResult};
use super::metrics::{SecurityId, SecurityMetrics};
use super::universe::PeerUniverseSource;
use super::{round_to, weighted_mean};

/// Persona-weighted combination of factor results for one security.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeScore {
    pub security_id: SecurityId,
    pub overall_score: Option<f64>,
    pub factors: BTreeMap<FactorId, FactorResult>,
    pub factor_weights: BTreeMap<FactorId, f64>,
    pub persona: PersonaId,
    pub persona_label: String,
    pub computed_at: DateTime<Utc>,
    /// Generation of the configuration snapshot the score was computed against.
    pub config_generation: Option<u64>,
}

impl CompositeScore {
    pub fn display_score(&self) -> Option<f64> {
        self.overall_score.map(|score| round_to(score, 1))
    }

    pub fn factor(&self, factor: &FactorId) -> Option<&FactorResult> {
        self.factors.get(factor)
    }
}

/// Score every factor of `persona` and combine the present ones.
///
/// Pure apart from the caller-supplied `computed_at`: the same inputs always
/// produce the same composite.
pub fn calculate<U>(
    metrics: &SecurityMetrics,
    persona: &Persona,
    universe: &U,
    computed_at: DateTime<Utc>,
) -> CompositeScore
where
    U: PeerUniverseSource + ?Sized,
{
    let mut factors = BTreeMap::new();
    let mut factor_weights = BTreeMap::new();
    let mut present = Vec::with_capacity(persona.factors.len());

    for entry in &persona.factors {
        let result = factor::calculate(metrics, &entry.config, universe);
        if let Some(score) = result.score {
            present.push((score, entry.weight));
        }
        factor_weights.insert(entry.config.factor.clone(), entry.weight);
        factors.insert(entry.config.factor.clone(), result);
    }

    CompositeScore {
        security_id: metrics.security_id.clone(),
        overall_score: weighted_mean(present),
        factors,
        factor_weights,
        persona: persona.id.clone(),
        persona_label: persona.label.clone(),
        computed_at,
        config_generation: None,
    }
}
