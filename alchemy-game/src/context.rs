//! Engine configuration and the injected collaborators.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::achievements::AchievementThresholds;
use crate::clock::{Clock, PuzzleClock, SystemClock, default_launch_date};
use crate::constants::{DEFAULT_GAME_KEY, RECENT_ELEMENTS_CAP};
use crate::oracle::RetryPolicy;
use crate::rules::{RuleTableSource, StaticPuzzleSource};
use crate::source::{CombinationSource, PuzzleSource};
use crate::storage::{JsonStore, KeyValueStore, TieredStorage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Storage namespace; every key is `<game_key>_<suffix>`.
    pub game_key: String,
    pub launch_date: NaiveDate,
    pub retry: RetryPolicy,
    pub recent_cap: usize,
    pub achievements: AchievementThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            game_key: DEFAULT_GAME_KEY.to_string(),
            launch_date: default_launch_date(),
            retry: RetryPolicy::default(),
            recent_cap: RECENT_ELEMENTS_CAP,
            achievements: AchievementThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON config; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Everything the engine talks to, passed in explicitly.
#[derive(Clone)]
pub struct EngineContext {
    pub storage: Arc<TieredStorage>,
    pub combinations: Arc<dyn CombinationSource>,
    pub puzzles: Arc<dyn PuzzleSource>,
    pub clock: Arc<dyn Clock>,
    pub config: EngineConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("storage", &self.storage)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl EngineContext {
    #[must_use]
    pub fn new(
        storage: Arc<TieredStorage>,
        combinations: Arc<dyn CombinationSource>,
        puzzles: Arc<dyn PuzzleSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            combinations,
            puzzles,
            clock,
            config: EngineConfig::default(),
        }
    }

    /// Bundled rule table and puzzles, memory storage, system clock.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(
            Arc::new(TieredStorage::in_memory()),
            Arc::new(RuleTableSource::bundled()),
            Arc::new(StaticPuzzleSource::bundled()),
            Arc::new(SystemClock),
        )
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_storage(mut self, storage: Arc<TieredStorage>) -> Self {
        self.storage = storage;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The namespaced JSON view over the storage adapter.
    #[must_use]
    pub fn json_store(&self) -> JsonStore {
        let raw: Arc<dyn KeyValueStore> = self.storage.clone();
        JsonStore::new(raw, &self.config.game_key, Arc::clone(&self.clock))
    }

    #[must_use]
    pub fn puzzle_clock(&self) -> PuzzleClock {
        PuzzleClock::new(self.config.launch_date, Arc::clone(&self.clock))
    }
}
