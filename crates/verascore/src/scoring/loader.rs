//! Validation of raw definitions into an immutable [`ScoringConfigSet`].
//!
//! Loading is all-or-nothing: every problem found across every factor and
//! persona is collected into one [`ConfigValidationError`], and a set is only
//! produced when there are none.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::config::{
    ClampBounds, FactorConfig, FactorId, MetricSpec, Persona, PersonaFactor, PersonaId,
    ScoringConfigSet,
};
use super::definitions::{
    FactorDefinition, LinearBoundsEntry, MetricEntry, PersonaDefinition, ScoringDefinitions,
    ThresholdRuleEntry,
};
use super::explain::{ExplanationTemplate, DEFAULT_FACTOR_TEMPLATE};
use super::methods::{
    LinearBounds, ScoringMethod, ThresholdBand, ThresholdBound, ThresholdLadder, SCORE_MAX,
    SCORE_MIN,
};
use super::metrics::{MetricDefinition, ValueKind};
use super::universe::UniverseScope;

/// Allowed distance of a weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Where in the configuration an issue was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigScope {
    Set,
    Factor {
        factor: String,
        version: u32,
    },
    Metric {
        factor: String,
        version: u32,
        metric: String,
    },
    Persona {
        persona: String,
    },
}

impl fmt::Display for ConfigScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigScope::Set => f.write_str("configuration"),
            ConfigScope::Factor { factor, version } => write!(f, "factor {factor} v{version}"),
            ConfigScope::Metric {
                factor,
                version,
                metric,
            } => write!(f, "metric {metric} in factor {factor} v{version}"),
            ConfigScope::Persona { persona } => write!(f, "persona {persona}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IssueKind {
    #[error("no factor definitions were supplied")]
    NoFactors,
    #[error("{field} must not be blank")]
    BlankIdentifier { field: &'static str },
    #[error("factor and version are declared more than once")]
    DuplicateFactor,
    #[error("factor declares no metrics")]
    EmptyFactor,
    #[error("default weight {weight} is outside [0, 1]")]
    DefaultWeightOutOfRange { weight: f64 },
    #[error("metric weights sum to {sum}, expected 1.0")]
    MetricWeightsSum { sum: f64 },
    #[error("weight {weight} must be a positive number")]
    InvalidMetricWeight { weight: f64 },
    #[error("metric id is declared more than once")]
    DuplicateMetric,
    #[error("unknown scoring method '{method}'")]
    UnknownMethod { method: String },
    #[error("{method} scoring requires `{parameter}`")]
    MissingParameter {
        method: &'static str,
        parameter: &'static str,
    },
    #[error("unknown universe '{universe}' (expected sector, industry or market)")]
    UnknownUniverse { universe: String },
    #[error("unknown value type '{value_type}'")]
    UnknownValueType { value_type: String },
    #[error("threshold rule {index}: {reason}")]
    MalformedThresholdRule { index: usize, reason: &'static str },
    #[error("threshold rule {index} scores {score}, outside [0, 100]")]
    ThresholdScoreOutOfRange { index: usize, score: f64 },
    #[error("threshold ladder has no default rule")]
    MissingDefaultThreshold,
    #[error("threshold ladder has more than one default rule")]
    MultipleDefaultThresholds,
    #[error("threshold default rule must be the last rule")]
    DefaultThresholdNotLast,
    #[error("linear bounds must all be finite")]
    NonFiniteLinearBounds,
    #[error("linear output_min {output_min} exceeds output_max {output_max}")]
    InvertedLinearOutput { output_min: f64, output_max: f64 },
    #[error("linear output range [{output_min}, {output_max}] leaves [0, 100]")]
    LinearOutputOutOfRange { output_min: f64, output_max: f64 },
    #[error("clamp bounds min {min} exceeds max {max}")]
    InvertedClampBounds { min: f64, max: f64 },
    #[error("metric disagrees with an earlier definition of the same metric id")]
    ConflictingMetricDefinition,
    #[error("explanation template: {message}")]
    Template { message: String },
    #[error("persona slug is declared more than once")]
    DuplicatePersona,
    #[error("persona references no factors")]
    EmptyPersona,
    #[error("factor weights sum to {sum}, expected 1.0")]
    PersonaWeightsSum { sum: f64 },
    #[error("factor {factor} has weight {weight}, expected a positive number")]
    InvalidPersonaWeight { factor: String, weight: f64 },
    #[error(
        "references unknown factor {factor}{}",
        .version.map(|version| format!(" v{version}")).unwrap_or_default()
    )]
    UnknownFactorReference {
        factor: String,
        version: Option<u32>,
    },
    #[error("references factor {factor} more than once")]
    DuplicateFactorReference { factor: String },
    #[error("more than one persona is flagged as default: {personas}")]
    MultipleDefaultPersonas { personas: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub scope: ConfigScope,
    pub kind: IssueKind,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.kind)
    }
}

/// Every issue that prevented a configuration set from loading.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    issues: Vec<ConfigIssue>,
}

impl ConfigValidationError {
    pub fn issues(&self) -> &[ConfigIssue] {
        &self.issues
    }

    pub fn contains(&self, kind: impl Fn(&IssueKind) -> bool) -> bool {
        self.issues.iter().any(|issue| kind(&issue.kind))
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "scoring configuration rejected with {} issue(s)",
            self.issues.len()
        )?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

#[derive(Default)]
struct Issues(Vec<ConfigIssue>);

impl Issues {
    fn push(&mut self, scope: &ConfigScope, kind: IssueKind) {
        self.0.push(ConfigIssue {
            scope: scope.clone(),
            kind,
        });
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn weights_sum_to_one(sum: f64) -> bool {
    (sum - 1.0).abs() <= WEIGHT_TOLERANCE
}

fn is_positive_weight(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// Validate `definitions` and build the configuration set they describe.
pub fn load(definitions: &ScoringDefinitions) -> Result<ScoringConfigSet, ConfigValidationError> {
    let mut issues = Issues::default();
    if definitions.factors.is_empty() {
        issues.push(&ConfigScope::Set, IssueKind::NoFactors);
    }

    let mut declared: BTreeSet<(String, u32)> = BTreeSet::new();
    let mut factors: BTreeMap<FactorId, BTreeMap<u32, Arc<FactorConfig>>> = BTreeMap::new();
    let mut catalog: BTreeMap<String, MetricDefinition> = BTreeMap::new();

    for definition in &definitions.factors {
        let scope = ConfigScope::Factor {
            factor: definition.factor.clone(),
            version: definition.version,
        };
        if !declared.insert((definition.factor.clone(), definition.version)) {
            issues.push(&scope, IssueKind::DuplicateFactor);
            continue;
        }

        if let Some(config) = compile_factor(definition, &scope, &mut catalog, &mut issues) {
            factors
                .entry(config.factor.clone())
                .or_default()
                .insert(config.version, Arc::new(config));
        }
    }

    let mut persona_ids: BTreeSet<&str> = BTreeSet::new();
    let mut flagged_default: Vec<&str> = Vec::new();
    let mut personas = Vec::new();

    for definition in &definitions.personas {
        let scope = ConfigScope::Persona {
            persona: definition.profile.clone(),
        };
        if definition.profile.trim().is_empty() {
            issues.push(&scope, IssueKind::BlankIdentifier { field: "profile" });
            continue;
        }
        if !persona_ids.insert(definition.profile.as_str()) {
            issues.push(&scope, IssueKind::DuplicatePersona);
            continue;
        }
        if definition.default {
            flagged_default.push(definition.profile.as_str());
        }

        let persona = compile_persona(definition, &scope, &factors, &declared, &mut issues);
        personas.push(Arc::new(persona));
    }

    if flagged_default.len() > 1 {
        issues.push(
            &ConfigScope::Set,
            IssueKind::MultipleDefaultPersonas {
                personas: flagged_default.join(", "),
            },
        );
    }

    if !issues.is_empty() {
        return Err(ConfigValidationError { issues: issues.0 });
    }

    let default_persona = flagged_default
        .first()
        .map(|slug| PersonaId::new(*slug))
        .or_else(|| personas.first().map(|persona| persona.id.clone()));

    debug!(
        factors = factors.len(),
        personas = personas.len(),
        metrics = catalog.len(),
        "scoring configuration validated"
    );

    Ok(ScoringConfigSet::new(
        factors,
        personas,
        default_persona,
        catalog,
    ))
}

fn compile_factor(
    definition: &FactorDefinition,
    scope: &ConfigScope,
    catalog: &mut BTreeMap<String, MetricDefinition>,
    issues: &mut Issues,
) -> Option<FactorConfig> {
    let before = issues.len();

    if definition.factor.trim().is_empty() {
        issues.push(scope, IssueKind::BlankIdentifier { field: "factor" });
    }
    if !(0.0..=1.0).contains(&definition.default_weight) {
        issues.push(
            scope,
            IssueKind::DefaultWeightOutOfRange {
                weight: definition.default_weight,
            },
        );
    }

    if definition.metrics.is_empty() {
        issues.push(scope, IssueKind::EmptyFactor);
    } else {
        let sum: f64 = definition.metrics.iter().map(|metric| metric.weight).sum();
        if !weights_sum_to_one(sum) {
            issues.push(scope, IssueKind::MetricWeightsSum { sum });
        }
    }

    let mut seen = BTreeSet::new();
    let mut metrics = Vec::with_capacity(definition.metrics.len());
    for entry in &definition.metrics {
        let metric_scope = ConfigScope::Metric {
            factor: definition.factor.clone(),
            version: definition.version,
            metric: entry.id.clone(),
        };
        if !seen.insert(entry.id.as_str()) {
            issues.push(&metric_scope, IssueKind::DuplicateMetric);
            continue;
        }

        if let Some(spec) = compile_metric(definition, entry, &metric_scope, issues) {
            match catalog.get(&spec.id) {
                Some(existing) if *existing != spec.definition => {
                    issues.push(&metric_scope, IssueKind::ConflictingMetricDefinition);
                }
                Some(_) => {}
                None => {
                    catalog.insert(spec.id.clone(), spec.definition.clone());
                }
            }
            metrics.push(spec);
        }
    }

    let template_source = definition
        .explanation
        .as_deref()
        .unwrap_or(DEFAULT_FACTOR_TEMPLATE);
    let explanation = match ExplanationTemplate::parse(template_source) {
        Ok(template) => Some(template),
        Err(err) => {
            issues.push(
                scope,
                IssueKind::Template {
                    message: err.to_string(),
                },
            );
            None
        }
    };

    if issues.len() > before {
        return None;
    }

    Some(FactorConfig {
        factor: FactorId::new(definition.factor.as_str()),
        version: definition.version,
        label: definition
            .label
            .clone()
            .unwrap_or_else(|| definition.factor.clone()),
        default_weight: definition.default_weight,
        metrics,
        explanation: explanation?,
    })
}

fn compile_metric(
    factor: &FactorDefinition,
    entry: &MetricEntry,
    scope: &ConfigScope,
    issues: &mut Issues,
) -> Option<MetricSpec> {
    let before = issues.len();

    if entry.id.trim().is_empty() {
        issues.push(scope, IssueKind::BlankIdentifier { field: "id" });
    }
    if entry.source.trim().is_empty() {
        issues.push(scope, IssueKind::BlankIdentifier { field: "source" });
    }
    if !is_positive_weight(entry.weight) {
        issues.push(
            scope,
            IssueKind::InvalidMetricWeight {
                weight: entry.weight,
            },
        );
    }

    let value_kind = ValueKind::parse(&entry.value_type);
    if value_kind.is_none() {
        issues.push(
            scope,
            IssueKind::UnknownValueType {
                value_type: entry.value_type.clone(),
            },
        );
    }

    let method = compile_method(entry, scope, issues);
    let bounds = entry.bounds.and_then(|clamp| {
        match (clamp.min, clamp.max) {
            (Some(min), Some(max)) if min > max || min.is_nan() || max.is_nan() => {
                issues.push(scope, IssueKind::InvertedClampBounds { min, max });
                None
            }
            (min, max) => Some(ClampBounds { min, max }),
        }
    });

    if issues.len() > before {
        return None;
    }

    Some(MetricSpec {
        id: entry.id.clone(),
        source: entry.source.clone(),
        label: entry.label.clone(),
        definition: MetricDefinition {
            id: entry.id.clone(),
            value_kind: value_kind?,
            higher_is_better: entry.higher_is_better,
            category: entry
                .category
                .clone()
                .unwrap_or_else(|| factor.factor.clone()),
        },
        method: method?,
        weight: entry.weight,
        bounds,
    })
}

fn compile_method(
    entry: &MetricEntry,
    scope: &ConfigScope,
    issues: &mut Issues,
) -> Option<ScoringMethod> {
    let method = entry.scoring_method.trim();
    match method {
        "percentile" | "percentile_inverse" => {
            let inverse = method == "percentile_inverse";
            let method_name = if inverse {
                "percentile_inverse"
            } else {
                "percentile"
            };
            let Some(raw) = entry.universe.as_deref() else {
                issues.push(
                    scope,
                    IssueKind::MissingParameter {
                        method: method_name,
                        parameter: "universe",
                    },
                );
                return None;
            };
            let Some(universe) = UniverseScope::parse(raw) else {
                issues.push(
                    scope,
                    IssueKind::UnknownUniverse {
                        universe: raw.to_string(),
                    },
                );
                return None;
            };

            Some(if inverse {
                ScoringMethod::PercentileInverse { universe }
            } else {
                ScoringMethod::Percentile { universe }
            })
        }
        "threshold" => {
            let Some(rules) = entry.thresholds.as_deref() else {
                issues.push(
                    scope,
                    IssueKind::MissingParameter {
                        method: "threshold",
                        parameter: "thresholds",
                    },
                );
                return None;
            };
            compile_ladder(rules, scope, issues).map(|ladder| ScoringMethod::Threshold { ladder })
        }
        "linear" => {
            let Some(bounds) = entry.linear_bounds else {
                issues.push(
                    scope,
                    IssueKind::MissingParameter {
                        method: "linear",
                        parameter: "linear_bounds",
                    },
                );
                return None;
            };
            compile_linear(bounds, scope, issues).map(|bounds| ScoringMethod::Linear { bounds })
        }
        _ => {
            issues.push(
                scope,
                IssueKind::UnknownMethod {
                    method: entry.scoring_method.clone(),
                },
            );
            None
        }
    }
}

fn compile_ladder(
    rules: &[ThresholdRuleEntry],
    scope: &ConfigScope,
    issues: &mut Issues,
) -> Option<ThresholdLadder> {
    let before = issues.len();

    let defaults = rules.iter().filter(|rule| rule.default.is_some()).count();
    match defaults {
        0 => issues.push(scope, IssueKind::MissingDefaultThreshold),
        1 if rules.last().and_then(|rule| rule.default).is_none() => {
            issues.push(scope, IssueKind::DefaultThresholdNotLast)
        }
        1 => {}
        _ => issues.push(scope, IssueKind::MultipleDefaultThresholds),
    }

    let mut bands = Vec::with_capacity(rules.len());
    let mut default_score = None;
    for (index, rule) in rules.iter().enumerate() {
        let malformed = |reason| IssueKind::MalformedThresholdRule { index, reason };
        let conditions = [rule.min, rule.max, rule.default]
            .iter()
            .filter(|value| value.is_some())
            .count();
        if conditions != 1 {
            issues.push(scope, malformed("expected exactly one of min, max or default"));
            continue;
        }

        let score = match (rule.default, rule.score) {
            (Some(_), Some(_)) => {
                issues.push(
                    scope,
                    malformed("a default rule takes its score as the default value"),
                );
                continue;
            }
            (Some(score), None) | (None, Some(score)) => score,
            (None, None) => {
                issues.push(scope, malformed("missing score"));
                continue;
            }
        };
        if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
            issues.push(scope, IssueKind::ThresholdScoreOutOfRange { index, score });
            continue;
        }

        let bound = match (rule.min, rule.max) {
            (Some(min), None) => ThresholdBound::AtLeast(min),
            (None, Some(max)) => ThresholdBound::AtMost(max),
            _ => {
                default_score = Some(score);
                continue;
            }
        };
        let limit = match bound {
            ThresholdBound::AtLeast(limit) | ThresholdBound::AtMost(limit) => limit,
        };
        if !limit.is_finite() {
            issues.push(scope, malformed("bound must be a finite number"));
            continue;
        }
        bands.push(ThresholdBand { bound, score });
    }

    if issues.len() > before {
        return None;
    }
    default_score.map(|default_score| ThresholdLadder::new(bands, default_score))
}

fn compile_linear(
    entry: LinearBoundsEntry,
    scope: &ConfigScope,
    issues: &mut Issues,
) -> Option<LinearBounds> {
    let LinearBoundsEntry {
        input_min,
        input_max,
        output_min,
        output_max,
    } = entry;

    if ![input_min, input_max, output_min, output_max]
        .iter()
        .all(|value| value.is_finite())
    {
        issues.push(scope, IssueKind::NonFiniteLinearBounds);
        return None;
    }
    if output_min > output_max {
        issues.push(
            scope,
            IssueKind::InvertedLinearOutput {
                output_min,
                output_max,
            },
        );
        return None;
    }
    if output_min < SCORE_MIN || output_max > SCORE_MAX {
        issues.push(
            scope,
            IssueKind::LinearOutputOutOfRange {
                output_min,
                output_max,
            },
        );
        return None;
    }

    Some(LinearBounds::new(input_min, input_max, output_min, output_max))
}

fn compile_persona(
    definition: &PersonaDefinition,
    scope: &ConfigScope,
    factors: &BTreeMap<FactorId, BTreeMap<u32, Arc<FactorConfig>>>,
    declared: &BTreeSet<(String, u32)>,
    issues: &mut Issues,
) -> Persona {
    if definition.factors.is_empty() {
        issues.push(scope, IssueKind::EmptyPersona);
    } else {
        let sum: f64 = definition.factors.iter().map(|entry| entry.weight).sum();
        if !weights_sum_to_one(sum) {
            issues.push(scope, IssueKind::PersonaWeightsSum { sum });
        }
    }

    let mut referenced = BTreeSet::new();
    let mut entries = Vec::with_capacity(definition.factors.len());
    for entry in &definition.factors {
        if !is_positive_weight(entry.weight) {
            issues.push(
                scope,
                IssueKind::InvalidPersonaWeight {
                    factor: entry.factor.clone(),
                    weight: entry.weight,
                },
            );
        }
        if !referenced.insert(entry.factor.as_str()) {
            issues.push(
                scope,
                IssueKind::DuplicateFactorReference {
                    factor: entry.factor.clone(),
                },
            );
            continue;
        }

        let versions = factors.get(&FactorId::new(entry.factor.as_str()));
        let config = match entry.version {
            Some(version) => versions.and_then(|versions| versions.get(&version)),
            None => versions.and_then(|versions| versions.values().next_back()),
        };

        match config {
            Some(config) => entries.push(PersonaFactor {
                config: Arc::clone(config),
                weight: entry.weight,
            }),
            None => {
                // A declared factor that failed to compile has already been reported.
                let was_declared = declared.iter().any(|(factor, version)| {
                    *factor == entry.factor
                        && entry.version.map_or(true, |pinned| pinned == *version)
                });
                if !was_declared {
                    issues.push(
                        scope,
                        IssueKind::UnknownFactorReference {
                            factor: entry.factor.clone(),
                            version: entry.version,
                        },
                    );
                }
            }
        }
    }

    Persona {
        id: PersonaId::new(definition.profile.as_str()),
        label: definition
            .label
            .clone()
            .unwrap_or_else(|| definition.profile.clone()),
        description: definition.description.clone(),
        factors: entries,
    }
}
