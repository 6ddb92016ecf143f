use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::config::{FactorId, PersonaId};
use super::definitions::DefinitionSource;
use super::engine::ScoringEngine;
use super::metrics::{MetricsSource, SecurityId};
use super::universe::PeerUniverseSource;
use super::views::{CompositeView, ConfigListingView, FactorView};
use crate::error::AppError;

/// Scoring engine plus the definition source reloads read from.
pub struct ScoringService<M, U>
where
    M: MetricsSource + ?Sized,
    U: PeerUniverseSource + ?Sized,
{
    engine: ScoringEngine<M, U>,
    definitions: DefinitionSource,
}

impl<M, U> ScoringService<M, U>
where
    M: MetricsSource + ?Sized,
    U: PeerUniverseSource + ?Sized,
{
    pub fn new(engine: ScoringEngine<M, U>, definitions: DefinitionSource) -> Self {
        Self {
            engine,
            definitions,
        }
    }

    pub fn engine(&self) -> &ScoringEngine<M, U> {
        &self.engine
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScoreQuery {
    #[serde(default)]
    pub persona: Option<String>,
}

impl ScoreQuery {
    fn persona(&self) -> Option<PersonaId> {
        self.persona
            .as_deref()
            .map(str::trim)
            .filter(|persona| !persona.is_empty())
            .map(PersonaId::new)
    }
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub generation: u64,
    pub source: String,
    pub factors: usize,
    pub personas: usize,
}

/// Router exposing configuration listing, reload and score lookups.
pub fn scoring_router<M, U>(service: Arc<ScoringService<M, U>>) -> Router
where
    M: MetricsSource + ?Sized + 'static,
    U: PeerUniverseSource + ?Sized + 'static,
{
    Router::new()
        .route("/api/v1/scoring/configs", get(configs_handler::<M, U>))
        .route(
            "/api/v1/scoring/configs/reload",
            post(reload_handler::<M, U>),
        )
        .route(
            "/api/v1/scoring/securities/:security_id/scores",
            get(composite_handler::<M, U>),
        )
        .route(
            "/api/v1/scoring/securities/:security_id/scores/:factor",
            get(factor_handler::<M, U>),
        )
        .with_state(service)
}

pub(crate) async fn configs_handler<M, U>(
    State(service): State<Arc<ScoringService<M, U>>>,
) -> Json<ConfigListingView>
where
    M: MetricsSource + ?Sized + 'static,
    U: PeerUniverseSource + ?Sized + 'static,
{
    let snapshot = service.engine.store().snapshot();
    Json(ConfigListingView::from(snapshot.as_ref()))
}

pub(crate) async fn reload_handler<M, U>(
    State(service): State<Arc<ScoringService<M, U>>>,
) -> Result<Json<ReloadResponse>, AppError>
where
    M: MetricsSource + ?Sized + 'static,
    U: PeerUniverseSource + ?Sized + 'static,
{
    // Directory sources read the filesystem.
    let source = service.definitions.clone();
    let definitions = tokio::task::spawn_blocking(move || source.load())
        .await
        .map_err(axum::Error::new)??;
    let snapshot = service.engine.store().reload(&definitions)?;
    info!(
        generation = snapshot.generation,
        source = %service.definitions.describe(),
        "scoring configuration reload requested over http"
    );

    Ok(Json(ReloadResponse {
        generation: snapshot.generation,
        source: service.definitions.describe(),
        factors: snapshot.set.summaries().len(),
        personas: snapshot.set.personas().len(),
    }))
}

pub(crate) async fn composite_handler<M, U>(
    State(service): State<Arc<ScoringService<M, U>>>,
    Path(security_id): Path<String>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<CompositeView>, AppError>
where
    M: MetricsSource + ?Sized + 'static,
    U: PeerUniverseSource + ?Sized + 'static,
{
    let persona = query.persona();
    let composite = service
        .engine
        .get_composite_score(&SecurityId::new(security_id), persona.as_ref())?;
    Ok(Json(CompositeView::from(&composite)))
}

pub(crate) async fn factor_handler<M, U>(
    State(service): State<Arc<ScoringService<M, U>>>,
    Path((security_id, factor)): Path<(String, String)>,
    Query(query): Query<ScoreQuery>,
) -> Result<Json<FactorView>, AppError>
where
    M: MetricsSource + ?Sized + 'static,
    U: PeerUniverseSource + ?Sized + 'static,
{
    let persona = query.persona();
    let result = service.engine.get_factor_score(
        &SecurityId::new(security_id),
        &FactorId::new(factor),
        persona.as_ref(),
    )?;
    Ok(Json(FactorView::from(&result)))
}
