use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::explain::ExplanationTemplate;
use super::methods::ScoringMethod;
use super::metrics::MetricDefinition;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorId(pub String);

impl FactorId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FactorId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Slug identifying an investor persona.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(pub String);

impl PersonaId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonaId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Raw value clamp applied before a metric is scored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ClampBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ClampBounds {
    pub fn apply(&self, raw: f64) -> f64 {
        let raw = self.min.map_or(raw, |min| raw.max(min));
        self.max.map_or(raw, |max| raw.min(max))
    }
}

/// One metric inside a factor: where to read it, how to score it, how much it counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSpec {
    pub id: String,
    pub source: String,
    pub label: String,
    pub definition: MetricDefinition,
    pub method: ScoringMethod,
    pub weight: f64,
    pub bounds: Option<ClampBounds>,
}

/// A validated, immutable factor revision identified by `(factor, version)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorConfig {
    pub factor: FactorId,
    pub version: u32,
    pub label: String,
    pub default_weight: f64,
    pub metrics: Vec<MetricSpec>,
    pub explanation: ExplanationTemplate,
}

impl FactorConfig {
    pub fn metric(&self, id: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|metric| metric.id == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersonaFactor {
    pub config: Arc<FactorConfig>,
    pub weight: f64,
}

/// Named weighting of factor configs into a composite score.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub id: PersonaId,
    pub label: String,
    pub description: Option<String>,
    pub factors: Vec<PersonaFactor>,
}

impl Persona {
    pub fn factor(&self, factor: &FactorId) -> Option<&PersonaFactor> {
        self.factors
            .iter()
            .find(|entry| entry.config.factor == *factor)
    }
}

/// Listing entry for a loaded factor revision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactorSummary {
    pub factor: FactorId,
    pub label: String,
    pub version: u32,
    pub default_weight: f64,
    pub metrics_count: usize,
}

/// Fully validated configuration: every factor revision and persona, plus the
/// metric catalog shared between them.
#[derive(Debug, Clone, Default)]
pub struct ScoringConfigSet {
    factors: BTreeMap<FactorId, BTreeMap<u32, Arc<FactorConfig>>>,
    personas: Vec<Arc<Persona>>,
    default_persona: Option<PersonaId>,
    metric_catalog: BTreeMap<String, MetricDefinition>,
}

impl ScoringConfigSet {
    pub(crate) fn new(
        factors: BTreeMap<FactorId, BTreeMap<u32, Arc<FactorConfig>>>,
        personas: Vec<Arc<Persona>>,
        default_persona: Option<PersonaId>,
        metric_catalog: BTreeMap<String, MetricDefinition>,
    ) -> Self {
        Self {
            factors,
            personas,
            default_persona,
            metric_catalog,
        }
    }

    /// Highest loaded version of a factor.
    pub fn factor(&self, factor: &FactorId) -> Option<&Arc<FactorConfig>> {
        self.factors
            .get(factor)
            .and_then(|versions| versions.values().next_back())
    }

    pub fn factor_version(&self, factor: &FactorId, version: u32) -> Option<&Arc<FactorConfig>> {
        self.factors
            .get(factor)
            .and_then(|versions| versions.get(&version))
    }

    pub fn factor_ids(&self) -> impl Iterator<Item = &FactorId> {
        self.factors.keys()
    }

    pub fn persona(&self, persona: &PersonaId) -> Option<&Arc<Persona>> {
        self.personas.iter().find(|candidate| candidate.id == *persona)
    }

    /// Personas in declaration order.
    pub fn personas(&self) -> &[Arc<Persona>] {
        &self.personas
    }

    pub fn default_persona(&self) -> Option<&Arc<Persona>> {
        self.default_persona
            .as_ref()
            .and_then(|persona| self.persona(persona))
    }

    pub fn metric_definition(&self, metric: &str) -> Option<&MetricDefinition> {
        self.metric_catalog.get(metric)
    }

    pub fn metric_catalog(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metric_catalog.values()
    }

    pub fn summaries(&self) -> Vec<FactorSummary> {
        self.factors
            .values()
            .flat_map(|versions| versions.values())
            .map(|config| FactorSummary {
                factor: config.factor.clone(),
                label: config.label.clone(),
                version: config.version,
                default_weight: config.default_weight,
                metrics_count: config.metrics.len(),
            })
            .collect()
    }
}
