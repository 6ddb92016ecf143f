use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::config::ScoringConfigSet;
use super::definitions::ScoringDefinitions;
use super::loader::{self, ConfigValidationError};

/// One installed configuration set.
#[derive(Debug)]
pub struct ConfigSnapshot {
    pub generation: u64,
    pub set: ScoringConfigSet,
    pub loaded_at: DateTime<Utc>,
}

/// Holder of the active configuration.
///
/// Readers clone the current `Arc` and keep working against it; a reload swaps
/// in a fully validated replacement, so no calculation ever observes a mix of
/// old and new definitions.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl ConfigStore {
    pub fn new(set: ScoringConfigSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigSnapshot {
                generation: 1,
                set,
                loaded_at: Utc::now(),
            })),
        }
    }

    pub fn from_definitions(
        definitions: &ScoringDefinitions,
    ) -> Result<Self, ConfigValidationError> {
        let set = loader::load(definitions)?;
        info!(
            factors = set.summaries().len(),
            personas = set.personas().len(),
            "scoring configuration loaded"
        );
        Ok(Self::new(set))
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn generation(&self) -> u64 {
        self.snapshot().generation
    }

    /// Install an already validated set, returning the new snapshot.
    pub fn replace(&self, set: ScoringConfigSet) -> Arc<ConfigSnapshot> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(ConfigSnapshot {
            generation: guard.generation + 1,
            set,
            loaded_at: Utc::now(),
        });
        *guard = Arc::clone(&next);
        next
    }

    /// Validate `definitions` and install them. On failure the active
    /// configuration is left untouched.
    pub fn reload(
        &self,
        definitions: &ScoringDefinitions,
    ) -> Result<Arc<ConfigSnapshot>, ConfigValidationError> {
        let set = match loader::load(definitions) {
            Ok(set) => set,
            Err(err) => {
                warn!(
                    issues = err.issues().len(),
                    error = %err,
                    "scoring configuration reload rejected"
                );
                return Err(err);
            }
        };

        let snapshot = self.replace(set);
        info!(
            generation = snapshot.generation,
            factors = snapshot.set.summaries().len(),
            personas = snapshot.set.personas().len(),
            "scoring configuration reloaded"
        );
        Ok(snapshot)
    }
}
