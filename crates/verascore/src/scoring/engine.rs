use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use super::composite::{self, CompositeScore};
use super::config::{FactorId, Persona, PersonaId};
use super::factor::{self, FactorResult};
use super::metrics::{MetricsSource, SecurityId, SecurityMetrics, SourceError};
use super::store::{ConfigSnapshot, ConfigStore};
use super::universe::PeerUniverseSource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScoringError {
    #[error("unknown factor '{0}'")]
    UnknownFactor(FactorId),
    #[error("unknown persona '{0}'")]
    UnknownPersona(PersonaId),
    #[error("the active configuration defines no personas")]
    NoDefaultPersona,
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Entry point for scoring securities against the active configuration.
///
/// Each call takes a single configuration snapshot up front, so a concurrent
/// reload never splits one calculation across two configurations.
pub struct ScoringEngine<M, U>
where
    M: MetricsSource + ?Sized,
    U: PeerUniverseSource + ?Sized,
{
    store: Arc<ConfigStore>,
    metrics: Arc<M>,
    universe: Arc<U>,
}

impl<M, U> Clone for ScoringEngine<M, U>
where
    M: MetricsSource + ?Sized,
    U: PeerUniverseSource + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            metrics: Arc::clone(&self.metrics),
            universe: Arc::clone(&self.universe),
        }
    }
}

impl<M, U> ScoringEngine<M, U>
where
    M: MetricsSource + ?Sized,
    U: PeerUniverseSource + ?Sized,
{
    pub fn new(store: Arc<ConfigStore>, metrics: Arc<M>, universe: Arc<U>) -> Self {
        Self {
            store,
            metrics,
            universe,
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    pub fn universe(&self) -> &Arc<U> {
        &self.universe
    }

    /// Score one factor. A persona that references the factor selects its pinned
    /// version; otherwise the latest loaded version is used.
    pub fn get_factor_score(
        &self,
        security_id: &SecurityId,
        factor: &FactorId,
        persona: Option<&PersonaId>,
    ) -> Result<FactorResult, ScoringError> {
        let snapshot = self.store.snapshot();

        let pinned = match persona {
            Some(persona) => resolve_persona(&snapshot, Some(persona))?
                .factor(factor)
                .map(|entry| Arc::clone(&entry.config)),
            None => None,
        };
        let config = match pinned {
            Some(config) => config,
            None => snapshot
                .set
                .factor(factor)
                .cloned()
                .ok_or_else(|| ScoringError::UnknownFactor(factor.clone()))?,
        };

        let metrics = self.fetch_metrics(security_id)?;
        Ok(factor::calculate(&metrics, &config, self.universe.as_ref()))
    }

    /// Composite score under `persona`, or under the default persona when none is given.
    pub fn get_composite_score(
        &self,
        security_id: &SecurityId,
        persona: Option<&PersonaId>,
    ) -> Result<CompositeScore, ScoringError> {
        let snapshot = self.store.snapshot();
        let persona = resolve_persona(&snapshot, persona)?;
        let metrics = self.fetch_metrics(security_id)?;

        let mut composite =
            composite::calculate(&metrics, persona, self.universe.as_ref(), Utc::now());
        composite.config_generation = Some(snapshot.generation);
        Ok(composite)
    }

    fn fetch_metrics(&self, security_id: &SecurityId) -> Result<SecurityMetrics, ScoringError> {
        self.metrics.security_metrics(security_id).map_err(|err| {
            warn!(security = %security_id, error = %err, "metrics source failed");
            ScoringError::Source(err)
        })
    }
}

fn resolve_persona<'a>(
    snapshot: &'a ConfigSnapshot,
    persona: Option<&PersonaId>,
) -> Result<&'a Persona, ScoringError> {
    match persona {
        Some(persona) => snapshot
            .set
            .persona(persona)
            .map(Arc::as_ref)
            .ok_or_else(|| ScoringError::UnknownPersona(persona.clone())),
        None => snapshot
            .set
            .default_persona()
            .map(Arc::as_ref)
            .ok_or(ScoringError::NoDefaultPersona),
    }
}
