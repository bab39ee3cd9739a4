//! Daily Alchemy Engine
//!
//! Platform-agnostic core of the Daily Alchemy puzzle: players combine two
//! known elements to discover a third, racing toward a daily target.
//! This crate provides the combination oracle, discovery bank, session state
//! machine, stats ledger and share encoder without any UI dependencies.

pub mod achievements;
pub mod bank;
pub mod clock;
pub mod constants;
pub mod context;
pub mod element;
pub mod engine;
pub mod error;
pub mod names;
pub mod numbers;
pub mod oracle;
pub mod rules;
pub mod session;
pub mod share;
pub mod source;
pub mod stats;
pub mod storage;

// Re-export commonly used types
pub use achievements::{
    Achievement, AchievementKind, AchievementThresholds, UnlockedAchievements,
};
pub use bank::{BankOrder, DiscoveryBank, DiscoveryEvent, SharedBank};
pub use clock::{
    Clock, ClockError, ManualClock, MonthRange, PuzzleClock, SystemClock, format_iso_date,
    parse_iso_date,
};
pub use context::{EngineConfig, EngineContext};
pub use element::{Element, ElementId, ElementSource, SourceKind};
pub use engine::{AlchemyEngine, EngineEvent};
pub use error::{EngineError, Result};
pub use names::{CombinationKey, canonical_name, names_equal};
pub use oracle::{
    CombinationOracle, CombinationOutcome, CombinationResult, MemoEntry, RetryPolicy,
};
pub use rules::{Recipe, RuleTableSource, StaticPuzzleSource};
pub use session::{
    CancelHandle, CombinationStep, GameSession, SessionPhase, SessionState, Selection, Slot,
};
pub use share::{ShareInput, encode as encode_share, winning_path};
pub use source::{
    CombinationSource, PuzzleDefinition, PuzzleSource, PuzzleSourceError, ScriptedSource,
    SolutionStep, SourceError, SourceReply,
};
pub use stats::{AggregateStats, CompletionRecord, DayStats, StatsLedger};
pub use storage::{
    FileStore, IndexedStore, JsonStore, KeyValueStore, MemoryStore, StorageError, TieredStorage,
    WriteOutcome,
};
