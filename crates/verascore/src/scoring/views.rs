//! Presentation shapes for scores: display rounding and formatted raw values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::composite::CompositeScore;
use super::config::{FactorId, FactorSummary, Persona, PersonaId};
use super::factor::{FactorResult, ScoreComponent};
use super::round_to;
use super::store::ConfigSnapshot;

fn rounded(value: Option<f64>, places: i32) -> Option<f64> {
    value.map(|value| round_to(value, places))
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentView {
    pub metric_id: String,
    pub label: String,
    pub method: &'static str,
    pub raw_value: Option<f64>,
    pub display_value: Option<String>,
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentile_rank: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer_count: Option<usize>,
    pub weight: f64,
    pub contribution: Option<f64>,
}

impl From<&ScoreComponent> for ComponentView {
    fn from(component: &ScoreComponent) -> Self {
        Self {
            metric_id: component.metric_id.clone(),
            label: component.label.clone(),
            method: component.method,
            raw_value: component.raw_value,
            display_value: component
                .raw_value
                .map(|raw| component.value_kind.format(raw)),
            score: rounded(component.score, 1),
            percentile_rank: rounded(component.percentile_rank, 1),
            peer_count: component.peer_count,
            weight: component.weight,
            contribution: rounded(component.contribution, 2),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FactorView {
    pub factor: FactorId,
    pub version: u32,
    pub label: String,
    pub score: Option<f64>,
    pub metrics_available: usize,
    pub metrics_total: usize,
    pub components: Vec<ComponentView>,
    pub explanation: String,
}

impl From<&FactorResult> for FactorView {
    fn from(result: &FactorResult) -> Self {
        Self {
            factor: result.factor.clone(),
            version: result.version,
            label: result.label.clone(),
            score: result.display_score(),
            metrics_available: result.present_count(),
            metrics_total: result.components.len(),
            components: result.components.iter().map(ComponentView::from).collect(),
            explanation: result.explanation.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompositeView {
    pub security_id: String,
    pub overall_score: Option<f64>,
    pub persona: PersonaId,
    pub persona_label: String,
    pub factor_weights: BTreeMap<FactorId, f64>,
    pub factors: Vec<FactorView>,
    pub computed_at: DateTime<Utc>,
    pub config_generation: Option<u64>,
}

impl From<&CompositeScore> for CompositeView {
    fn from(composite: &CompositeScore) -> Self {
        Self {
            security_id: composite.security_id.to_string(),
            overall_score: composite.display_score(),
            persona: composite.persona.clone(),
            persona_label: composite.persona_label.clone(),
            factor_weights: composite.factor_weights.clone(),
            factors: composite.factors.values().map(FactorView::from).collect(),
            computed_at: composite.computed_at,
            config_generation: composite.config_generation,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonaFactorView {
    pub factor: FactorId,
    pub version: u32,
    pub weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonaView {
    pub profile: PersonaId,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_default: bool,
    pub factors: Vec<PersonaFactorView>,
}

impl PersonaView {
    fn new(persona: &Persona, is_default: bool) -> Self {
        Self {
            profile: persona.id.clone(),
            label: persona.label.clone(),
            description: persona.description.clone(),
            is_default,
            factors: persona
                .factors
                .iter()
                .map(|entry| PersonaFactorView {
                    factor: entry.config.factor.clone(),
                    version: entry.config.version,
                    weight: entry.weight,
                })
                .collect(),
        }
    }
}

/// Listing of an installed configuration snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigListingView {
    pub generation: u64,
    pub loaded_at: DateTime<Utc>,
    pub factors: Vec<FactorSummary>,
    pub personas: Vec<PersonaView>,
}

impl From<&ConfigSnapshot> for ConfigListingView {
    fn from(snapshot: &ConfigSnapshot) -> Self {
        let default_id = snapshot
            .set
            .default_persona()
            .map(|persona| persona.id.clone());

        Self {
            generation: snapshot.generation,
            loaded_at: snapshot.loaded_at,
            factors: snapshot.set.summaries(),
            personas: snapshot
                .set
                .personas()
                .iter()
                .map(|persona| PersonaView::new(persona, default_id.as_ref() == Some(&persona.id)))
                .collect(),
        }
    }
}
