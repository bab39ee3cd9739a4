//! Local, data-driven implementations of the source contracts.
//!
//! `RuleTableSource` answers combinations from a recipe list and
//! `StaticPuzzleSource` rotates through a fixed puzzle list. Both ship with
//! bundled defaults so the engine can run fully offline.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::names::CombinationKey;
use crate::source::{
    CombinationSource, PuzzleDefinition, PuzzleSource, PuzzleSourceError, SourceError,
    SourceReply,
};

const DEFAULT_RECIPES: &str = include_str!("../data/recipes.json");
const DEFAULT_PUZZLES: &str = include_str!("../data/puzzles.json");

/// One row of the recipe table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub a: String,
    pub b: String,
    pub name: String,
    pub glyph: String,
}

/// Combination source backed by a recipe table.
///
/// The first time a pair is served in this process it is reported as a
/// global first discovery.
#[derive(Debug, Default)]
pub struct RuleTableSource {
    recipes: HashMap<CombinationKey, Recipe>,
    served: Mutex<HashSet<CombinationKey>>,
}

impl RuleTableSource {
    #[must_use]
    pub fn new(recipes: impl IntoIterator<Item = Recipe>) -> Self {
        let recipes = recipes
            .into_iter()
            .map(|recipe| (CombinationKey::new(&recipe.a, &recipe.b), recipe))
            .collect();
        Self {
            recipes,
            served: Mutex::new(HashSet::new()),
        }
    }

    /// Parse a JSON recipe list.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a recipe array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let recipes: Vec<Recipe> = serde_json::from_str(json)?;
        Ok(Self::new(recipes))
    }

    /// The bundled recipe table.
    #[must_use]
    pub fn bundled() -> Self {
        Self::from_json(DEFAULT_RECIPES).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    #[must_use]
    pub fn lookup(&self, a: &str, b: &str) -> Option<&Recipe> {
        self.recipes.get(&CombinationKey::new(a, b))
    }
}

#[async_trait]
impl CombinationSource for RuleTableSource {
    async fn combine(&self, a: &str, b: &str) -> Result<SourceReply, SourceError> {
        let key = CombinationKey::new(a, b);
        let recipe = self.recipes.get(&key).ok_or(SourceError::PermanentNone)?;
        let first = self
            .served
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
        Ok(SourceReply::new(&recipe.name, &recipe.glyph, first))
    }
}

/// Puzzle source rotating through a fixed list by puzzle number.
#[derive(Debug, Clone, Default)]
pub struct StaticPuzzleSource {
    puzzles: Vec<PuzzleDefinition>,
}

impl StaticPuzzleSource {
    #[must_use]
    pub const fn new(puzzles: Vec<PuzzleDefinition>) -> Self {
        Self { puzzles }
    }

    /// Parse a JSON puzzle list.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is not a puzzle array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json).map(Self::new)
    }

    /// The bundled puzzle list.
    #[must_use]
    pub fn bundled() -> Self {
        Self::from_json(DEFAULT_PUZZLES).unwrap_or_default()
    }

    #[must_use]
    pub fn puzzles(&self) -> &[PuzzleDefinition] {
        &self.puzzles
    }
}

#[async_trait]
impl PuzzleSource for StaticPuzzleSource {
    async fn get_puzzle_for_date(
        &self,
        date: NaiveDate,
        number: u32,
    ) -> Result<PuzzleDefinition, PuzzleSourceError> {
        if self.puzzles.is_empty() || number == 0 {
            return Err(PuzzleSourceError::NotFound(date));
        }
        let index = (number as usize - 1) % self.puzzles.len();
        let mut puzzle = self.puzzles[index].clone();
        puzzle.number = number;
        Ok(puzzle)
    }
}
