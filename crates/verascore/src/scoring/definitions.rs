//! Raw, unvalidated factor and persona definitions as authored in YAML.
//!
//! Nothing here checks semantics; [`super::loader::load`] turns a
//! [`ScoringDefinitions`] into a validated configuration set.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactorDefinition {
    pub factor: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub default_weight: f64,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricEntry>,
}

fn default_version() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricEntry {
    pub id: String,
    pub source: String,
    pub label: String,
    #[serde(default = "default_value_type")]
    pub value_type: String,
    #[serde(default = "default_higher_is_better")]
    pub higher_is_better: bool,
    #[serde(default)]
    pub category: Option<String>,
    pub scoring_method: String,
    #[serde(default)]
    pub universe: Option<String>,
    #[serde(default)]
    pub thresholds: Option<Vec<ThresholdRuleEntry>>,
    #[serde(default)]
    pub linear_bounds: Option<LinearBoundsEntry>,
    pub weight: f64,
    #[serde(default)]
    pub bounds: Option<ClampEntry>,
}

fn default_value_type() -> String {
    "ratio".to_string()
}

fn default_higher_is_better() -> bool {
    true
}

/// One rung of a threshold ladder; exactly one of `min`, `max`, `default` is expected.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ThresholdRuleEntry {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub default: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinearBoundsEntry {
    pub input_min: f64,
    pub input_max: f64,
    #[serde(default)]
    pub output_min: f64,
    #[serde(default = "default_output_max")]
    pub output_max: f64,
}

fn default_output_max() -> f64 {
    100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClampEntry {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaDefinition {
    pub profile: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub factors: Vec<PersonaFactorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersonaFactorEntry {
    #[serde(alias = "config")]
    pub factor: String,
    #[serde(default)]
    pub version: Option<u32>,
    pub weight: f64,
}

/// Failure obtaining definitions, before any validation happens.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionSourceError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in {origin}: {source}")]
    Yaml {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{origin} is neither a factor (`factor:`) nor a persona (`profile:`) definition")]
    Unclassified { origin: String },
}

const BUILTIN_DOCUMENTS: [(&str, &str); 8] = [
    ("valuation.yaml", include_str!("../../configs/scoring/valuation.yaml")),
    ("growth.yaml", include_str!("../../configs/scoring/growth.yaml")),
    ("profitability.yaml", include_str!("../../configs/scoring/profitability.yaml")),
    ("quality.yaml", include_str!("../../configs/scoring/quality.yaml")),
    ("momentum.yaml", include_str!("../../configs/scoring/momentum.yaml")),
    ("default_profile.yaml", include_str!("../../configs/scoring/default_profile.yaml")),
    ("value_investor.yaml", include_str!("../../configs/scoring/value_investor.yaml")),
    ("growth_investor.yaml", include_str!("../../configs/scoring/growth_investor.yaml")),
];

/// Where a process obtains its definitions, re-read on every reload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DefinitionSource {
    #[default]
    Builtin,
    Directory(PathBuf),
}

impl DefinitionSource {
    pub fn from_dir_option(dir: Option<PathBuf>) -> Self {
        dir.map_or(Self::Builtin, Self::Directory)
    }

    pub fn load(&self) -> Result<ScoringDefinitions, DefinitionSourceError> {
        match self {
            Self::Builtin => ScoringDefinitions::builtin(),
            Self::Directory(dir) => ScoringDefinitions::from_dir(dir),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Builtin => "built-in definitions".to_string(),
            Self::Directory(dir) => dir.display().to_string(),
        }
    }
}

/// Unvalidated factor and persona definitions in declaration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringDefinitions {
    #[serde(default)]
    pub factors: Vec<FactorDefinition>,
    #[serde(default)]
    pub personas: Vec<PersonaDefinition>,
}

impl ScoringDefinitions {
    /// Definitions compiled into the library.
    pub fn builtin() -> Result<Self, DefinitionSourceError> {
        Self::from_yaml_documents(BUILTIN_DOCUMENTS)
    }

    pub fn from_yaml_documents<'a>(
        documents: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, DefinitionSourceError> {
        let mut definitions = Self::default();
        for (origin, text) in documents {
            definitions.push_yaml(origin, text)?;
        }
        Ok(definitions)
    }

    /// Load every `*.yaml`/`*.yml` file in `dir`, in file-name order.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, DefinitionSourceError> {
        let dir = dir.as_ref();
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| DefinitionSourceError::Io { path, source }
        };

        let mut paths = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error(dir))? {
            let path = entry.map_err(io_error(dir))?.path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml")
                });
            if is_yaml && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Self::default();
        for path in paths {
            let text = fs::read_to_string(&path).map_err(io_error(&path))?;
            definitions.push_yaml(&path.display().to_string(), &text)?;
        }
        Ok(definitions)
    }

    /// Parse one YAML document and file it as a factor or persona definition.
    pub fn push_yaml(&mut self, origin: &str, text: &str) -> Result<(), DefinitionSourceError> {
        let yaml_error = |source| DefinitionSourceError::Yaml {
            origin: origin.to_string(),
            source,
        };

        let document: serde_yaml::Value = serde_yaml::from_str(text).map_err(yaml_error)?;
        let has_key = |key: &str| {
            document
                .as_mapping()
                .is_some_and(|mapping| mapping.contains_key(key))
        };

        if has_key("factor") {
            let factor = serde_yaml::from_value(document).map_err(yaml_error)?;
            self.factors.push(factor);
        } else if has_key("profile") {
            let persona = serde_yaml::from_value(document).map_err(yaml_error)?;
            self.personas.push(persona);
        } else {
            return Err(DefinitionSourceError::Unclassified {
                origin: origin.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_documents_by_key() {
        let definitions = ScoringDefinitions::from_yaml_documents([
            (
                "value.yaml",
                "factor: value\nmetrics:\n  - id: pe\n    source: valuation.pe\n    label: P/E\n    scoring_method: percentile_inverse\n    universe: sector\n    weight: 1.0\n",
            ),
            (
                "persona.yaml",
                "profile: balanced\nfactors:\n  - config: value\n    weight: 1.0\n",
            ),
        ])
        .expect("documents parse");

        assert_eq!(definitions.factors.len(), 1);
        assert_eq!(definitions.factors[0].version, 1);
        assert_eq!(definitions.factors[0].metrics[0].value_type, "ratio");
        assert!(definitions.factors[0].metrics[0].higher_is_better);
        assert_eq!(definitions.personas[0].factors[0].factor, "value");
    }

    #[test]
    fn rejects_unclassified_and_malformed_documents() {
        let mut definitions = ScoringDefinitions::default();
        let err = definitions
            .push_yaml("notes.yaml", "title: nothing to see\n")
            .expect_err("unclassified");
        assert!(matches!(err, DefinitionSourceError::Unclassified { .. }));

        let err = definitions
            .push_yaml("broken.yaml", "factor: [unclosed\n")
            .expect_err("bad yaml");
        assert!(matches!(err, DefinitionSourceError::Yaml { .. }));

        let err = definitions
            .push_yaml("typo.yaml", "factor: value\nmetrcs: []\n")
            .expect_err("unknown field");
        assert!(err.to_string().contains("typo.yaml"));
    }

    #[test]
    fn builtin_definitions_parse() {
        let definitions = ScoringDefinitions::builtin().expect("builtin definitions parse");
        let factors: Vec<&str> = definitions
            .factors
            .iter()
            .map(|factor| factor.factor.as_str())
            .collect();
        assert_eq!(
            factors,
            vec!["valuation", "growth", "profitability", "quality", "momentum"]
        );
        assert_eq!(definitions.personas.len(), 3);
    }
}
