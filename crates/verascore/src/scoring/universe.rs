use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::metrics::{resolve, MetricsSource, SecurityId, SecurityMetrics, SourceError};

/// Peer group a percentile method ranks against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseScope {
    Sector,
    Industry,
    Market,
}

impl UniverseScope {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sector => "sector",
            Self::Industry => "industry",
            Self::Market => "market",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sector" => Some(Self::Sector),
            "industry" => Some(Self::Industry),
            "market" => Some(Self::Market),
            _ => None,
        }
    }
}

/// Sorted, finite peer values for one metric within one scope.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PeerUniverse {
    values: Vec<f64>,
}

impl PeerUniverse {
    pub fn new(raw_values: impl IntoIterator<Item = f64>) -> Self {
        let mut values: Vec<f64> = raw_values
            .into_iter()
            .filter(|value| value.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<f64> for PeerUniverse {
    fn from_iter<T: IntoIterator<Item = f64>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Collaborator supplying raw peer values for the same metric across a universe.
/// Values may arrive unsorted and may be empty.
pub trait PeerUniverseSource: Send + Sync {
    fn peer_values(
        &self,
        security_id: &SecurityId,
        source_path: &str,
        scope: UniverseScope,
    ) -> Vec<f64>;
}

/// Build the ranked peer universe for one security, metric and scope.
pub fn build_peer_universe<U>(
    source: &U,
    security_id: &SecurityId,
    source_path: &str,
    scope: UniverseScope,
) -> PeerUniverse
where
    U: PeerUniverseSource + ?Sized,
{
    PeerUniverse::new(source.peer_values(security_id, source_path, scope))
}

/// Sector and industry membership of a security.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    pub sector: Option<String>,
    pub industry: Option<String>,
}

impl Classification {
    pub fn new(sector: impl Into<String>, industry: impl Into<String>) -> Self {
        Self {
            sector: Some(sector.into()),
            industry: Some(industry.into()),
        }
    }

    fn shares_scope(&self, other: &Classification, scope: UniverseScope) -> bool {
        let same = |left: &Option<String>, right: &Option<String>| match (left, right) {
            (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
            _ => false,
        };

        match scope {
            UniverseScope::Market => true,
            UniverseScope::Sector => same(&self.sector, &other.sector),
            UniverseScope::Industry => same(&self.industry, &other.industry),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct UniverseMember {
    classification: Classification,
    metrics: SecurityMetrics,
}

/// In-memory universe of classified securities and their metric snapshots.
///
/// Serves both as a metrics source and as the percentile universe builder. Peer
/// sets include the subject security itself, so a security is always ranked
/// within the group it belongs to.
#[derive(Debug, Clone, Default)]
pub struct UniverseSnapshot {
    members: BTreeMap<SecurityId, UniverseMember>,
}

impl UniverseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a security, returning the previous snapshot when replaced.
    pub fn insert(
        &mut self,
        classification: Classification,
        metrics: SecurityMetrics,
    ) -> Option<SecurityMetrics> {
        let id = metrics.security_id.clone();
        self.members
            .insert(
                id,
                UniverseMember {
                    classification,
                    metrics,
                },
            )
            .map(|previous| previous.metrics)
    }

    pub fn with_security(
        mut self,
        classification: Classification,
        metrics: SecurityMetrics,
    ) -> Self {
        self.insert(classification, metrics);
        self
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, UniverseLoadError> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_json_str(raw: &str) -> Result<Self, UniverseLoadError> {
        let document: UniverseDocument = serde_json::from_str(raw)?;
        Self::from_document(document)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, UniverseLoadError> {
        let document: UniverseDocument = serde_json::from_reader(reader)?;
        Self::from_document(document)
    }

    fn from_document(document: UniverseDocument) -> Result<Self, UniverseLoadError> {
        let mut universe = Self::new();
        for entry in document.securities {
            if universe.members.contains_key(&entry.id) {
                return Err(UniverseLoadError::DuplicateSecurity(entry.id));
            }

            let mut metrics = SecurityMetrics::from_nested(entry.id, &entry.metrics);
            if document.derive_analyst_fields {
                metrics.derive_analyst_fields();
            }

            universe.insert(
                Classification {
                    sector: entry.sector,
                    industry: entry.industry,
                },
                metrics,
            );
        }
        Ok(universe)
    }

    pub fn security_ids(&self) -> impl Iterator<Item = &SecurityId> {
        self.members.keys()
    }

    pub fn classification(&self, security_id: &SecurityId) -> Option<&Classification> {
        self.members
            .get(security_id)
            .map(|member| &member.classification)
    }

    pub fn metrics(&self, security_id: &SecurityId) -> Option<&SecurityMetrics> {
        self.members.get(security_id).map(|member| &member.metrics)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PeerUniverseSource for UniverseSnapshot {
    fn peer_values(
        &self,
        security_id: &SecurityId,
        source_path: &str,
        scope: UniverseScope,
    ) -> Vec<f64> {
        let unclassified = Classification::default();
        let subject = self
            .classification(security_id)
            .unwrap_or(&unclassified);

        self.members
            .values()
            .filter(|member| subject.shares_scope(&member.classification, scope))
            .filter_map(|member| resolve(&member.metrics, source_path))
            .collect()
    }
}

impl MetricsSource for UniverseSnapshot {
    fn security_metrics(&self, security_id: &SecurityId) -> Result<SecurityMetrics, SourceError> {
        self.metrics(security_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(security_id.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct UniverseDocument {
    securities: Vec<SecurityDocument>,
    #[serde(default)]
    derive_analyst_fields: bool,
}

#[derive(Debug, Deserialize)]
struct SecurityDocument {
    id: SecurityId,
    #[serde(default)]
    sector: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    metrics: serde_json::Value,
}

/// Failure reading a universe document.
#[derive(Debug, thiserror::Error)]
pub enum UniverseLoadError {
    #[error("failed to read universe file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid universe document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("security {0} appears more than once in the universe")]
    DuplicateSecurity(SecurityId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> UniverseSnapshot {
        UniverseSnapshot::from_json_str(
            r#"{
                "securities": [
                    {"id": "AAA", "sector": "Technology", "industry": "Software",
                     "metrics": {"valuation": {"pe_ttm": 30.0}}},
                    {"id": "BBB", "sector": "technology", "industry": "Semiconductors",
                     "metrics": {"valuation": {"pe_ttm": 18.0}}},
                    {"id": "CCC", "sector": "Energy", "industry": "Oil & Gas",
                     "metrics": {"valuation": {"pe_ttm": 9.0}}},
                    {"id": "DDD", "sector": "Technology", "industry": "Software",
                     "metrics": {"valuation": {"pe_ttm": null}}},
                    {"id": "EEE", "metrics": {"valuation": {"pe_ttm": 12.0}}}
                ]
            }"#,
        )
        .expect("universe parses")
    }

    fn sorted(mut values: Vec<f64>) -> Vec<f64> {
        values.sort_by(f64::total_cmp);
        values
    }

    #[test]
    fn sector_peers_include_subject_and_skip_missing_values() {
        let universe = universe();
        let peers = universe.peer_values(&"AAA".into(), "valuation.pe_ttm", UniverseScope::Sector);
        assert_eq!(sorted(peers), vec![18.0, 30.0]);
    }

    #[test]
    fn industry_and_market_scopes() {
        let universe = universe();
        let industry =
            universe.peer_values(&"AAA".into(), "valuation.pe_ttm", UniverseScope::Industry);
        assert_eq!(industry, vec![30.0]);

        let market = universe.peer_values(&"CCC".into(), "valuation.pe_ttm", UniverseScope::Market);
        assert_eq!(sorted(market), vec![9.0, 12.0, 18.0, 30.0]);
    }

    #[test]
    fn unclassified_security_has_no_sector_peers() {
        let universe = universe();
        let peers = universe.peer_values(&"EEE".into(), "valuation.pe_ttm", UniverseScope::Sector);
        assert!(peers.is_empty());

        let unknown = universe.peer_values(&"ZZZ".into(), "valuation.pe_ttm", UniverseScope::Sector);
        assert!(unknown.is_empty());
    }

    #[test]
    fn peer_universe_sorts_and_discards_non_finite_values() {
        let peers = PeerUniverse::new([3.0, f64::NAN, 1.0, f64::INFINITY, 2.0]);
        assert_eq!(peers.values(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn rejects_duplicate_securities() {
        let err = UniverseSnapshot::from_json_str(
            r#"{"securities": [{"id": "AAA"}, {"id": "AAA"}]}"#,
        )
        .expect_err("duplicate ids are rejected");
        assert!(matches!(err, UniverseLoadError::DuplicateSecurity(id) if id.as_str() == "AAA"));
    }

    #[test]
    fn serves_metrics_snapshots() {
        let universe = universe();
        let metrics = universe
            .security_metrics(&"BBB".into())
            .expect("known security");
        assert_eq!(resolve(&metrics, "valuation.pe_ttm"), Some(18.0));

        let missing = universe.security_metrics(&"ZZZ".into());
        assert_eq!(missing, Err(SourceError::NotFound("ZZZ".into())));
    }
}
