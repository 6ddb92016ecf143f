use std::collections::BTreeMap;
use std::sync::Arc;

use axum::response::Response;
use serde_json::Value;

use crate::scoring::{
    loader, ConfigStore, DefinitionSource, FactorConfig, FactorId, MetricsSource,
    PeerUniverseSource, ScoringConfigSet, ScoringDefinitions, ScoringEngine, ScoringService,
    SecurityId, SecurityMetrics, SourceError, UniverseScope,
};

pub(super) const VALUATION_YAML: &str = "\
factor: valuation
label: Valuation
default_weight: 0.25
metrics:
  - id: pe_ratio
    source: valuation.pe_ttm
    label: P/E Ratio
    higher_is_better: false
    scoring_method: percentile_inverse
    universe: sector
    weight: 0.5
  - id: ps_ratio
    source: valuation.ps_ttm
    label: P/S Ratio
    higher_is_better: false
    scoring_method: percentile
    universe: sector
    weight: 0.5
";

/// Three identity-mapped linear metrics so scores equal raw values.
pub(super) const QUALITY_YAML: &str = "\
factor: quality
label: Quality
metrics:
  - id: alpha
    source: quality.alpha
    label: Alpha
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 100 }
    weight: 0.5
  - id: beta
    source: quality.beta
    label: Beta
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 100 }
    weight: 0.3
  - id: gamma
    source: quality.gamma
    label: Gamma
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 100 }
    weight: 0.2
";

pub(super) const BALANCED_YAML: &str = "\
profile: balanced
label: Balanced
factors:
  - factor: valuation
    weight: 0.6
  - factor: quality
    weight: 0.4
";

pub(super) fn definitions(documents: &[(&str, &str)]) -> ScoringDefinitions {
    ScoringDefinitions::from_yaml_documents(documents.iter().copied())
        .expect("fixture definitions parse")
}

pub(super) fn scenario_definitions() -> ScoringDefinitions {
    definitions(&[
        ("valuation.yaml", VALUATION_YAML),
        ("quality.yaml", QUALITY_YAML),
        ("balanced.yaml", BALANCED_YAML),
    ])
}

pub(super) fn scenario_set() -> ScoringConfigSet {
    loader::load(&scenario_definitions()).expect("fixture configuration is valid")
}

pub(super) fn factor(set: &ScoringConfigSet, id: &str) -> Arc<FactorConfig> {
    set.factor(&FactorId::from(id))
        .cloned()
        .expect("fixture factor exists")
}

pub(super) fn acme() -> SecurityMetrics {
    SecurityMetrics::new(SecurityId::new("ACME"))
        .with_value("valuation.pe_ttm", 15.0)
        .with_value("valuation.ps_ttm", 8.0)
        .with_value("quality.alpha", 90.0)
        .with_value("quality.beta", 70.0)
        .with_value("quality.gamma", 20.0)
}

/// Peer values keyed by source path, identical for every scope.
#[derive(Debug, Clone, Default)]
pub(super) struct StaticPeers(BTreeMap<String, Vec<f64>>);

impl StaticPeers {
    pub(super) fn with(mut self, source_path: &str, values: &[f64]) -> Self {
        self.0.insert(source_path.to_string(), values.to_vec());
        self
    }
}

impl PeerUniverseSource for StaticPeers {
    fn peer_values(&self, _: &SecurityId, source_path: &str, _: UniverseScope) -> Vec<f64> {
        self.0.get(source_path).cloned().unwrap_or_default()
    }
}

pub(super) fn scenario_peers() -> StaticPeers {
    StaticPeers::default()
        .with("valuation.pe_ttm", &[10.0, 15.0, 20.0, 25.0])
        .with("valuation.ps_ttm", &[4.0, 8.0, 12.0, 16.0])
}

#[derive(Debug, Clone, Default)]
pub(super) struct MemoryMetrics(BTreeMap<SecurityId, SecurityMetrics>);

impl MemoryMetrics {
    pub(super) fn with(mut self, metrics: SecurityMetrics) -> Self {
        self.0.insert(metrics.security_id.clone(), metrics);
        self
    }
}

impl MetricsSource for MemoryMetrics {
    fn security_metrics(&self, security_id: &SecurityId) -> Result<SecurityMetrics, SourceError> {
        self.0
            .get(security_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(security_id.clone()))
    }
}

pub(super) struct OfflineMetrics;

impl MetricsSource for OfflineMetrics {
    fn security_metrics(&self, _: &SecurityId) -> Result<SecurityMetrics, SourceError> {
        Err(SourceError::Unavailable("provider timed out".to_string()))
    }
}

pub(super) fn engine_with(
    definitions: &ScoringDefinitions,
) -> ScoringEngine<MemoryMetrics, StaticPeers> {
    let store = ConfigStore::from_definitions(definitions).expect("fixture configuration is valid");
    ScoringEngine::new(
        Arc::new(store),
        Arc::new(MemoryMetrics::default().with(acme())),
        Arc::new(scenario_peers()),
    )
}

pub(super) type TestService = ScoringService<MemoryMetrics, StaticPeers>;

/// Scenario engine whose reloads read from `source`.
pub(super) fn service_with(source: DefinitionSource) -> Arc<TestService> {
    Arc::new(ScoringService::new(
        engine_with(&scenario_definitions()),
        source,
    ))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("score is present");
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
