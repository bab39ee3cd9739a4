//! Contracts for the engine's external collaborators: the combination source
//! and the puzzle source.
//!
//! Both are opaque to the engine. A combination source may be a remote
//! service or a local rule table; it owns transport, rate limiting and the
//! "first in the world" attribution.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::names::CombinationKey;

/// A successful combination as reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReply {
    pub name: String,
    pub glyph: String,
    pub is_global_first_discovery: bool,
}

impl SourceReply {
    #[must_use]
    pub fn new(name: &str, glyph: &str, is_global_first_discovery: bool) -> Self {
        Self {
            name: name.to_string(),
            glyph: glyph.to_string(),
            is_global_first_discovery,
        }
    }
}

/// Typed failures from a combination source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The pair cannot combine. This is a result, and it is cached.
    #[error("these elements do not combine")]
    PermanentNone,
    /// Network, 5xx, timeouts. Retried by the oracle.
    #[error("transient source failure: {0}")]
    Transient(String),
}

/// Given two case-insensitive element names, produce their product.
#[async_trait]
pub trait CombinationSource: Send + Sync {
    async fn combine(&self, a: &str, b: &str) -> Result<SourceReply, SourceError>;
}

/// One step of a puzzle's reference solution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionStep {
    pub from: [String; 2],
    pub result: String,
}

fn default_hints() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

/// Daily puzzle definition as delivered by the puzzle source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleDefinition {
    #[serde(default)]
    pub number: u32,
    pub target: String,
    pub target_glyph: String,
    pub par_moves: u32,
    /// Missing means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_limit_seconds: Option<u32>,
    #[serde(default = "default_hints")]
    pub hints: u32,
    #[serde(default = "default_true")]
    pub hint_costs_move: bool,
    #[serde(default)]
    pub solution_path: Vec<SolutionStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PuzzleSourceError {
    #[error("no puzzle for {0}")]
    NotFound(NaiveDate),
    #[error("puzzle source failed: {0}")]
    Failed(String),
}

/// `getPuzzleForDate(isoDate)`
#[async_trait]
pub trait PuzzleSource: Send + Sync {
    async fn get_puzzle_for_date(
        &self,
        date: NaiveDate,
        number: u32,
    ) -> Result<PuzzleDefinition, PuzzleSourceError>;
}

/// Combination source driven by a fixed script. Each pair pops replies from
/// its queue; the last reply repeats. Counts every call.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<CombinationKey, VecDeque<Result<SourceReply, SourceError>>>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every reply, so concurrent callers overlap.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue replies for a pair, in order.
    #[must_use]
    pub fn script(
        self,
        a: &str,
        b: &str,
        replies: impl IntoIterator<Item = Result<SourceReply, SourceError>>,
    ) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(CombinationKey::new(a, b))
            .or_default()
            .extend(replies);
        self
    }

    /// Shorthand for a pair that always succeeds.
    #[must_use]
    pub fn always(self, a: &str, b: &str, reply: SourceReply) -> Self {
        self.script(a, b, [Ok(reply)])
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }
}

#[async_trait]
impl CombinationSource for ScriptedSource {
    async fn combine(&self, a: &str, b: &str) -> Result<SourceReply, SourceError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let key = CombinationKey::new(a, b);
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(queue) = script.get_mut(&key) else {
            return Err(SourceError::PermanentNone);
        };
        if queue.len() > 1 {
            queue.pop_front().unwrap_or(Err(SourceError::PermanentNone))
        } else {
            queue.front().cloned().unwrap_or(Err(SourceError::PermanentNone))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_source_pops_then_repeats() {
        let source = ScriptedSource::new().script(
            "fire",
            "water",
            [
                Err(SourceError::Transient("503".into())),
                Ok(SourceReply::new("Steam", "💨", true)),
            ],
        );
        assert!(matches!(
            source.combine("Water", "Fire").await,
            Err(SourceError::Transient(_))
        ));
        assert_eq!(source.combine("fire", "water").await.unwrap().name, "Steam");
        assert_eq!(source.combine("fire", "water").await.unwrap().name, "Steam");
        assert_eq!(
            source.combine("earth", "earth").await,
            Err(SourceError::PermanentNone)
        );
        assert_eq!(source.calls(), 4);
    }

    #[test]
    fn puzzle_definition_defaults() {
        let def: PuzzleDefinition = serde_json::from_str(
            r#"{"target":"Steam","targetGlyph":"💨","parMoves":1}"#,
        )
        .unwrap();
        assert_eq!(def.time_limit_seconds, None);
        assert_eq!(def.hints, 3);
        assert!(def.hint_costs_move);
        assert!(def.solution_path.is_empty());
    }
}
