use super::common::*;

use crate::scoring::loader::{load, WEIGHT_TOLERANCE};
use crate::scoring::{
    ConfigScope, FactorId, IssueKind, PersonaId, ScoringDefinitions, ScoringMethod, UniverseScope,
};

#[test]
fn builtin_definitions_load() {
    let set = load(&ScoringDefinitions::builtin().expect("builtin yaml parses"))
        .expect("builtin configuration is valid");

    let factors: Vec<&str> = set.factor_ids().map(FactorId::as_str).collect();
    assert_eq!(
        factors,
        ["growth", "momentum", "profitability", "quality", "valuation"]
    );

    let personas: Vec<&str> = set
        .personas()
        .iter()
        .map(|persona| persona.id.as_str())
        .collect();
    assert_eq!(
        personas,
        ["default_profile", "value_investor", "growth_investor"]
    );
    let default = set.default_persona().expect("default persona");
    assert_eq!(default.id.as_str(), "default_profile");

    for persona in set.personas() {
        let sum: f64 = persona.factors.iter().map(|entry| entry.weight).sum();
        assert!((sum - 1.0).abs() <= WEIGHT_TOLERANCE, "{}", persona.id);
    }
}

#[test]
fn scenario_metric_definitions_enter_the_catalog() {
    let set = scenario_set();

    let pe = set.metric_definition("pe_ratio").expect("pe_ratio catalogued");
    assert!(!pe.higher_is_better);
    assert_eq!(pe.category, "valuation");
    assert_eq!(set.metric_catalog().count(), 5);

    let valuation = factor(&set, "valuation");
    assert_eq!(
        valuation.metric("pe_ratio").map(|spec| &spec.method),
        Some(&ScoringMethod::PercentileInverse {
            universe: UniverseScope::Sector
        })
    );
}

#[test]
fn every_problem_is_reported_and_nothing_loads() {
    let definitions = definitions(&[
        (
            "broken.yaml",
            "\
factor: broken
metrics:
  - id: a
    source: x.a
    label: A
    scoring_method: percentile
    weight: 0.5
  - id: b
    source: x.b
    label: B
    scoring_method: zscore
    weight: 0.2
",
        ),
        (
            "persona.yaml",
            "\
profile: lopsided
factors:
  - factor: broken
    weight: 0.7
  - factor: missing
    weight: 0.2
",
        ),
    ]);

    let err = load(&definitions).expect_err("configuration is invalid");

    assert!(err.contains(|kind| matches!(kind, IssueKind::MetricWeightsSum { .. })));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::MissingParameter {
            method: "percentile",
            parameter: "universe"
        }
    )));
    assert!(err.contains(|kind| matches!(kind, IssueKind::UnknownMethod { method } if method == "zscore")));
    assert!(err.contains(|kind| matches!(kind, IssueKind::PersonaWeightsSum { .. })));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::UnknownFactorReference { factor, version: None } if factor == "missing"
    )));
    // `broken` failed to compile; it is not reported a second time as unknown.
    assert!(!err.contains(|kind| matches!(
        kind,
        IssueKind::UnknownFactorReference { factor, .. } if factor == "broken"
    )));
    assert_eq!(err.issues().len(), 5);
    assert!(err.to_string().starts_with("scoring configuration rejected with 5 issue(s)"));
}

#[test]
fn metric_issues_carry_their_scope() {
    let definitions = definitions(&[(
        "sector.yaml",
        "\
factor: sector
metrics:
  - id: pb
    source: valuation.pb
    label: P/B
    scoring_method: percentile_inverse
    universe: galaxy
    weight: 1.0
",
    )]);

    let err = load(&definitions).expect_err("unknown universe");

    let issue = &err.issues()[0];
    assert_eq!(
        issue.scope,
        ConfigScope::Metric {
            factor: "sector".to_string(),
            version: 1,
            metric: "pb".to_string(),
        }
    );
    assert_eq!(
        issue.kind,
        IssueKind::UnknownUniverse {
            universe: "galaxy".to_string()
        }
    );
    assert_eq!(
        issue.to_string(),
        "metric pb in factor sector v1: unknown universe 'galaxy' (expected sector, industry or market)"
    );
}

#[test]
fn threshold_ladders_are_checked() {
    let definitions = definitions(&[
        (
            "no_default.yaml",
            "\
factor: no_default
metrics:
  - id: peg
    source: valuation.peg
    label: PEG
    scoring_method: threshold
    thresholds:
      - { max: 1, score: 90 }
      - { max: 2, score: 140 }
    weight: 1.0
",
        ),
        (
            "default_first.yaml",
            "\
factor: default_first
metrics:
  - id: peg
    source: valuation.peg
    label: PEG
    scoring_method: threshold
    thresholds:
      - { default: 10 }
      - { max: 1, min: 0, score: 90 }
    weight: 1.0
",
        ),
    ]);

    let err = load(&definitions).expect_err("ladders are invalid");

    assert!(err.contains(|kind| *kind == IssueKind::MissingDefaultThreshold));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::ThresholdScoreOutOfRange { index: 1, .. }
    )));
    assert!(err.contains(|kind| *kind == IssueKind::DefaultThresholdNotLast));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::MalformedThresholdRule { index: 1, .. }
    )));
}

#[test]
fn linear_and_clamp_bounds_are_checked() {
    let definitions = definitions(&[(
        "margins.yaml",
        "\
factor: margins
metrics:
  - id: gross
    source: profitability.gross_margin
    label: Gross Margin
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 0.8, output_min: 20, output_max: 120 }
    weight: 0.5
  - id: net
    source: profitability.net_margin
    label: Net Margin
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 0.3 }
    bounds: { min: 1, max: -1 }
    weight: 0.5
",
    )]);

    let err = load(&definitions).expect_err("bounds are invalid");

    assert!(err.contains(|kind| matches!(kind, IssueKind::LinearOutputOutOfRange { .. })));
    assert!(err.contains(|kind| matches!(kind, IssueKind::InvertedClampBounds { .. })));
    assert_eq!(err.issues().len(), 2);
}

#[test]
fn broken_explanation_template_is_a_load_error() {
    let definitions = definitions(&[(
        "verbose.yaml",
        "\
factor: verbose
explanation: \"{factor} scored {scroe}\"
metrics:
  - id: a
    source: x.a
    label: A
    scoring_method: linear
    linear_bounds: { input_min: 0, input_max: 1 }
    weight: 1.0
",
    )]);

    let err = load(&definitions).expect_err("template is invalid");

    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::Template { message } if message.contains("scroe")
    )));
}

#[test]
fn same_metric_id_must_mean_the_same_thing() {
    let definitions = definitions(&[
        ("valuation.yaml", VALUATION_YAML),
        (
            "contrarian.yaml",
            "\
factor: contrarian
metrics:
  - id: pe_ratio
    source: valuation.pe_ttm
    label: P/E Ratio
    higher_is_better: true
    scoring_method: percentile
    universe: market
    weight: 1.0
",
        ),
    ]);

    let err = load(&definitions).expect_err("definitions conflict");

    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].kind, IssueKind::ConflictingMetricDefinition);
}

#[test]
fn personas_pin_versions_and_default_to_the_latest() {
    let v2 = VALUATION_YAML.replacen("factor: valuation\n", "factor: valuation\nversion: 2\n", 1);
    let definitions = definitions(&[
        ("valuation.yaml", VALUATION_YAML),
        ("valuation_v2.yaml", v2.as_str()),
        ("quality.yaml", QUALITY_YAML),
        (
            "pinned.yaml",
            "\
profile: pinned
factors:
  - factor: valuation
    version: 1
    weight: 0.5
  - factor: quality
    weight: 0.5
",
        ),
        ("balanced.yaml", BALANCED_YAML),
    ]);

    let set = load(&definitions).expect("valid");

    let valuation = FactorId::from("valuation");
    assert_eq!(set.factor(&valuation).map(|config| config.version), Some(2));
    assert!(set.factor_version(&valuation, 1).is_some());

    let pinned = set.persona(&PersonaId::from("pinned")).expect("pinned");
    assert_eq!(
        pinned.factor(&valuation).map(|entry| entry.config.version),
        Some(1)
    );
    let balanced = set.persona(&PersonaId::from("balanced")).expect("balanced");
    assert_eq!(
        balanced.factor(&valuation).map(|entry| entry.config.version),
        Some(2)
    );

    // Nobody is flagged default, so the first declared persona is.
    assert_eq!(
        set.default_persona().map(|persona| persona.id.as_str()),
        Some("pinned")
    );
}

#[test]
fn persona_problems_are_reported() {
    let definitions = definitions(&[
        ("valuation.yaml", VALUATION_YAML),
        ("quality.yaml", QUALITY_YAML),
        (
            "first.yaml",
            "\
profile: first
default: true
factors:
  - factor: valuation
    version: 3
    weight: 1.0
",
        ),
        (
            "second.yaml",
            "\
profile: second
default: true
factors:
  - factor: quality
    weight: 0.5
  - factor: quality
    weight: 0.5
",
        ),
        ("empty.yaml", "profile: empty\n"),
    ]);

    let err = load(&definitions).expect_err("personas are invalid");

    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::UnknownFactorReference { factor, version: Some(3) } if factor == "valuation"
    )));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::DuplicateFactorReference { factor } if factor == "quality"
    )));
    assert!(err.contains(|kind| *kind == IssueKind::EmptyPersona));
    assert!(err.contains(|kind| matches!(
        kind,
        IssueKind::MultipleDefaultPersonas { personas } if personas == "first, second"
    )));
}

#[test]
fn empty_definitions_are_rejected() {
    let err = load(&ScoringDefinitions::default()).expect_err("nothing to load");

    assert_eq!(err.issues().len(), 1);
    assert_eq!(err.issues()[0].scope, ConfigScope::Set);
    assert_eq!(err.issues()[0].kind, IssueKind::NoFactors);
}
