use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use verascore::error::AppError;
use verascore::scoring::{ConfigStore, DefinitionSource, ScoringEngine, UniverseSnapshot};

/// Universe shipped with the binary for demos and servers started without data.
const DEMO_UNIVERSE: &str = include_str!("../data/demo_universe.json");

pub(crate) type UniverseEngine = ScoringEngine<UniverseSnapshot, UniverseSnapshot>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn demo_universe() -> Result<UniverseSnapshot, AppError> {
    Ok(UniverseSnapshot::from_json_str(DEMO_UNIVERSE)?)
}

/// Load the universe at `path`, or the bundled demo universe when none is given.
pub(crate) fn load_universe(path: Option<&Path>) -> Result<UniverseSnapshot, AppError> {
    let universe = match path {
        Some(path) => UniverseSnapshot::from_path(path)?,
        None => demo_universe()?,
    };
    let source = path.map_or_else(
        || "bundled demo".to_string(),
        |path| path.display().to_string(),
    );
    info!(securities = universe.len(), %source, "universe loaded");
    Ok(universe)
}

/// An explicit directory wins over the configured one; otherwise built-in definitions.
pub(crate) fn definition_source(
    explicit: Option<PathBuf>,
    configured: Option<PathBuf>,
) -> DefinitionSource {
    DefinitionSource::from_dir_option(explicit.or(configured))
}

pub(crate) fn build_engine(
    definitions: &DefinitionSource,
    universe: UniverseSnapshot,
) -> Result<UniverseEngine, AppError> {
    let store = ConfigStore::from_definitions(&definitions.load()?)?;
    let universe = Arc::new(universe);
    Ok(ScoringEngine::new(
        Arc::new(store),
        Arc::clone(&universe),
        universe,
    ))
}

/// Render an optional score for terminal output.
pub(crate) fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |score| format!("{score:.1}"))
}
