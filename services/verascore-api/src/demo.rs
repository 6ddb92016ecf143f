use crate::infra::{build_engine, definition_source, format_score, load_universe, UniverseEngine};
use clap::Args;
use std::path::PathBuf;
use verascore::config::AppConfig;
use verascore::error::AppError;
use verascore::scoring::{
    CompositeScore, CompositeView, DefinitionSource, FactorId, FactorResult, FactorView,
    PersonaId, SecurityId,
};

#[derive(Args, Debug, Default)]
pub(crate) struct ScoreArgs {
    /// JSON universe file (defaults to SCORING_UNIVERSE_PATH, then the bundled demo universe)
    #[arg(long)]
    pub(crate) universe: Option<PathBuf>,
    /// Security identifier to score
    #[arg(long)]
    pub(crate) security: String,
    /// Score a single factor instead of the composite
    #[arg(long)]
    pub(crate) factor: Option<String>,
    /// Persona slug (defaults to the configured default persona)
    #[arg(long)]
    pub(crate) persona: Option<String>,
    /// Directory of factor and persona definitions
    #[arg(long)]
    pub(crate) config_dir: Option<PathBuf>,
    /// Print the result as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only score under this persona
    #[arg(long)]
    pub(crate) persona: Option<String>,
    /// Number of explanations printed per persona
    #[arg(long, default_value_t = 1)]
    pub(crate) explain: usize,
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let ScoreArgs {
        universe,
        security,
        factor,
        persona,
        config_dir,
        json,
    } = args;

    let config = AppConfig::load()?;
    let definitions = definition_source(config_dir, config.scoring.config_dir);
    let universe = load_universe(universe.or(config.scoring.universe_path).as_deref())?;
    let engine = build_engine(&definitions, universe)?;

    let security = SecurityId::new(security);
    let persona = persona.map(PersonaId::new);

    match factor {
        Some(factor) => {
            let result =
                engine.get_factor_score(&security, &FactorId::new(factor), persona.as_ref())?;
            if json {
                println!("{}", to_json(&FactorView::from(&result))?);
            } else {
                print!("{}", render_factor(&result));
            }
        }
        None => {
            let composite = engine.get_composite_score(&security, persona.as_ref())?;
            if json {
                println!("{}", to_json(&CompositeView::from(&composite))?);
            } else {
                print!("{}", render_composite(&composite));
            }
        }
    }

    Ok(())
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { persona, explain } = args;

    let engine = build_engine(&DefinitionSource::Builtin, load_universe(None)?)?;
    let snapshot = engine.store().snapshot();
    let personas: Vec<PersonaId> = match persona {
        Some(persona) => vec![PersonaId::new(persona)],
        None => snapshot
            .set
            .personas()
            .iter()
            .map(|persona| persona.id.clone())
            .collect(),
    };

    println!(
        "VeraScore demo: {} factor revision(s), {} persona(s)",
        snapshot.set.summaries().len(),
        snapshot.set.personas().len()
    );

    for persona in &personas {
        let ranking = rank_universe(&engine, persona)?;
        let Some(first) = ranking.first() else {
            continue;
        };

        println!("\n{} ({})", first.persona_label, persona);
        for (position, composite) in ranking.iter().enumerate() {
            println!(
                "  {:>2}. {:<8} {:>6}",
                position + 1,
                composite.security_id.as_str(),
                format_score(composite.display_score())
            );
        }

        for composite in ranking.iter().take(explain) {
            println!();
            print!("{}", render_composite(composite));
        }
    }

    Ok(())
}

/// Composite scores for every security in the engine's universe, best first.
/// Securities without a composite sort last.
fn rank_universe(
    engine: &UniverseEngine,
    persona: &PersonaId,
) -> Result<Vec<CompositeScore>, AppError> {
    let mut ranking = Vec::with_capacity(engine.universe().len());
    for security in engine.universe().security_ids() {
        ranking.push(engine.get_composite_score(security, Some(persona))?);
    }

    ranking.sort_by(|left, right| {
        let left = left.overall_score.unwrap_or(f64::NEG_INFINITY);
        let right = right.overall_score.unwrap_or(f64::NEG_INFINITY);
        right.total_cmp(&left)
    });
    Ok(ranking)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string_pretty(value).map_err(|err| AppError::Io(err.into()))
}

pub(crate) fn render_composite(composite: &CompositeScore) -> String {
    let mut out = format!(
        "{} under {}: {}\n",
        composite.security_id,
        composite.persona_label,
        format_score(composite.display_score())
    );
    for (factor, result) in &composite.factors {
        let weight = composite.factor_weights.get(factor).copied().unwrap_or(0.0);
        out.push_str(&format!(
            "  {:<24} {:>6}  (weight {:.0}%)\n",
            result.label,
            format_score(result.display_score()),
            weight * 100.0
        ));
    }
    for result in composite.factors.values() {
        out.push('\n');
        out.push_str(&indent(&result.explanation));
    }
    out
}

pub(crate) fn render_factor(result: &FactorResult) -> String {
    let mut out = format!(
        "{} v{}: {}\n",
        result.label,
        result.version,
        format_score(result.display_score())
    );
    for component in &result.components {
        let value = component
            .raw_value
            .map_or_else(|| "-".to_string(), |raw| component.value_kind.format(raw));
        out.push_str(&format!(
            "  {:<28} {:>12} {:>6}  {}\n",
            component.label,
            value,
            format_score(component.score),
            component.method
        ));
    }
    out.push('\n');
    out.push_str(&indent(&result.explanation));
    out
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {line}\n")).collect()
}
