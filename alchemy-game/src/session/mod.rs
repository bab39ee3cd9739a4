//! Game session: one playthrough of one daily puzzle.
//!
//! The session is a synchronous state machine. The asynchronous part of a
//! combine (the oracle call) happens between [`GameSession::begin_combine`]
//! and [`GameSession::finish_combine`], so the session is never borrowed
//! across a suspension point and the player can clear slots meanwhile.

mod phase;
mod selection;

pub use phase::SessionPhase;
pub use selection::{Selection, Slot};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use crate::bank::{DiscoveryBank, DiscoveryEvent};
use crate::constants::{
    LOG_PHASE_CHANGE, NO_COMBINATION_MESSAGE, RECENT_ELEMENTS_CAP, TRANSIENT_FAILURE_MESSAGE,
};
use crate::element::Element;
use crate::error::{EngineError, Result};
use crate::names::{canonical_name, names_equal};
use crate::numbers::clamp_i64_to_u32;
use crate::oracle::{CombinationOutcome, CombinationResult};
use crate::source::{PuzzleDefinition, SolutionStep};
use crate::stats::DayStats;

/// One combination the player made, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationStep {
    pub from: [String; 2],
    pub result: String,
    /// Glyphs of `from[0]`, `from[1]` and `result`.
    #[serde(default)]
    pub glyphs: [String; 3],
}

impl CombinationStep {
    fn new(a: &Element, b: &Element, product: &Element) -> Self {
        Self {
            from: [a.name().to_string(), b.name().to_string()],
            result: product.name().to_string(),
            glyphs: [
                a.glyph().to_string(),
                b.glyph().to_string(),
                product.glyph().to_string(),
            ],
        }
    }
}

pub type RecentElements = SmallVec<[String; RECENT_ELEMENTS_CAP]>;

/// Persistent projection of a session, written on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: SessionPhase,
    pub date: NaiveDate,
    pub puzzle_number: u32,
    pub target: Element,
    pub par_moves: u32,
    /// `None` means no limit.
    pub time_limit: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed: u32,
    pub moves: u32,
    pub hints_remaining: u32,
    pub hints_used: u32,
    pub hints_used_positions: BTreeSet<usize>,
    #[serde(default)]
    pub revealed_hints: Vec<SolutionStep>,
    #[serde(flatten)]
    pub selection: Selection,
    pub last_result: Option<CombinationResult>,
    pub combination_error: Option<String>,
    /// Newly discovered element shown in the result overlay.
    pub result_overlay: Option<Element>,
    pub combination_path: Vec<CombinationStep>,
    pub recent_elements: RecentElements,
    pub first_discoveries: u32,
    pub free_play_mode: bool,
    pub is_archive: bool,
    pub is_combining: bool,
}

impl SessionState {
    fn fresh(
        date: NaiveDate,
        puzzle: &PuzzleDefinition,
        is_archive: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            phase: SessionPhase::Loading,
            date,
            puzzle_number: puzzle.number,
            target: Element::target(&puzzle.target, &puzzle.target_glyph, now),
            par_moves: puzzle.par_moves,
            time_limit: puzzle.time_limit_seconds,
            started_at: None,
            elapsed: 0,
            moves: 0,
            hints_remaining: puzzle.hints,
            hints_used: 0,
            hints_used_positions: BTreeSet::new(),
            revealed_hints: Vec::new(),
            selection: Selection::default(),
            last_result: None,
            combination_error: None,
            result_overlay: None,
            combination_path: Vec::new(),
            recent_elements: RecentElements::new(),
            first_discoveries: 0,
            free_play_mode: false,
            is_archive,
            is_combining: false,
        }
    }

    /// Completion without hints, reveals or mistakes.
    #[must_use]
    pub const fn is_perfect(&self) -> bool {
        self.hints_used == 0
    }
}

/// Aborts an outstanding combine.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, rx)
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A combine that passed the guard and awaits its oracle outcome.
#[derive(Debug)]
pub struct PendingCombine {
    pub first: Element,
    pub second: Element,
    generation: u64,
    cancelled: watch::Receiver<bool>,
}

impl PendingCombine {
    /// Resolves when the combine is cancelled; pends forever otherwise.
    pub fn cancelled(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.cancelled.clone();
        async move {
            if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    fn was_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }
}

/// What settling a combine did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombineReport {
    pub outcome: CombinationOutcome,
    pub discovery: Option<DiscoveryEvent>,
    pub reached_target: bool,
}

#[derive(Debug)]
pub struct GameSession {
    state: SessionState,
    puzzle: PuzzleDefinition,
    cancel: Option<CancelHandle>,
    generation: u64,
    recent_cap: usize,
    transitions: Vec<(SessionPhase, SessionPhase)>,
}

impl GameSession {
    /// A session for `puzzle`, waiting on the welcome screen.
    #[must_use]
    pub fn new(
        date: NaiveDate,
        puzzle: PuzzleDefinition,
        is_archive: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let state = SessionState::fresh(date, &puzzle, is_archive, now);
        let mut session = Self {
            state,
            puzzle,
            cancel: None,
            generation: 0,
            recent_cap: RECENT_ELEMENTS_CAP,
            transitions: Vec::new(),
        };
        session.set_phase(SessionPhase::Welcome);
        session
    }

    /// Resume from a saved snapshot of the same puzzle. A snapshot for a
    /// different target is ignored. The timer resumes where it stopped.
    #[must_use]
    pub fn restore(
        date: NaiveDate,
        puzzle: PuzzleDefinition,
        is_archive: bool,
        snapshot: SessionState,
        now: DateTime<Utc>,
    ) -> Self {
        if snapshot.date != date || !names_equal(snapshot.target.name(), &puzzle.target) {
            return Self::new(date, puzzle, is_archive, now);
        }
        let mut state = snapshot;
        if state.is_combining {
            state.is_combining = false;
            state.moves = state.moves.saturating_sub(1);
        }
        state.is_archive = is_archive;
        state.phase = match state.phase {
            SessionPhase::Loading | SessionPhase::Error => SessionPhase::Welcome,
            other => other,
        };
        if state.phase == SessionPhase::Playing && !state.free_play_mode {
            state.started_at = Some(now - chrono::Duration::seconds(i64::from(state.elapsed)));
        }
        Self {
            state,
            puzzle,
            cancel: None,
            generation: 0,
            recent_cap: RECENT_ELEMENTS_CAP,
            transitions: Vec::new(),
        }
    }

    /// How many recent discoveries to keep for the "NEW" badge.
    #[must_use]
    pub fn with_recent_cap(mut self, cap: usize) -> Self {
        self.recent_cap = cap.max(1);
        let excess = self.state.recent_elements.len().saturating_sub(self.recent_cap);
        self.state.recent_elements.drain(..excess);
        self
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    #[must_use]
    pub const fn puzzle(&self) -> &PuzzleDefinition {
        &self.puzzle
    }

    /// Phase changes since the last call, oldest first.
    pub fn take_transitions(&mut self) -> Vec<(SessionPhase, SessionPhase)> {
        std::mem::take(&mut self.transitions)
    }

    /// Handle for the combine in flight, if any.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        self.cancel.clone()
    }

    fn set_phase(&mut self, next: SessionPhase) {
        let from = self.state.phase;
        if from == next {
            return;
        }
        log::debug!("{LOG_PHASE_CHANGE}: {} {from} -> {next}", self.state.date);
        self.state.phase = next;
        self.transitions.push((from, next));
    }

    fn transition(&mut self, next: SessionPhase, action: &'static str) -> Result<()> {
        if !self.state.phase.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                action,
                phase: self.state.phase,
            });
        }
        self.set_phase(next);
        Ok(())
    }

    const fn ensure_idle(&self) -> Result<()> {
        if self.state.is_combining {
            Err(EngineError::Busy)
        } else {
            Ok(())
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(handle) = self.cancel.take() {
            handle.cancel();
        }
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionPhase::Playing, "start")?;
        self.state.started_at = Some(now);
        self.state.elapsed = 0;
        self.state.time_limit = self.puzzle.time_limit_seconds;
        self.state.free_play_mode = false;
        Ok(())
    }

    /// Open-ended play: no timer and no completion.
    pub fn start_free_play(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionPhase::Playing, "start free play")?;
        self.state.started_at = Some(now);
        self.state.elapsed = 0;
        self.state.time_limit = None;
        self.state.free_play_mode = true;
        Ok(())
    }

    pub fn select(&mut self, element: Element) -> Result<Option<Slot>> {
        if !self.state.phase.accepts_selection() {
            return Err(EngineError::InvalidTransition {
                action: "select an element",
                phase: self.state.phase,
            });
        }
        self.ensure_idle()?;
        self.state.combination_error = None;
        Ok(self.state.selection.select(element))
    }

    /// Clear one slot. Cancels a combine in flight.
    pub fn clear_slot(&mut self, slot: Slot) -> Option<Element> {
        self.cancel_pending();
        self.state.selection.clear_slot(slot)
    }

    /// Clear both slots. Cancels a combine in flight.
    pub fn clear_selections(&mut self) {
        self.cancel_pending();
        self.state.selection.clear();
        self.state.combination_error = None;
    }

    /// Guard and charge a move. The caller resolves the pair through the
    /// oracle and hands the outcome to [`Self::finish_combine`].
    pub fn begin_combine(&mut self) -> Result<PendingCombine> {
        if !self.state.phase.accepts_combine() {
            return Err(EngineError::InvalidTransition {
                action: "combine",
                phase: self.state.phase,
            });
        }
        self.ensure_idle()?;
        let (first, second) = self
            .state
            .selection
            .pair()
            .map(|(a, b)| (a.clone(), b.clone()))
            .ok_or_else(|| EngineError::InputInvalid("select two elements first".into()))?;
        let (handle, cancelled) = CancelHandle::new();
        self.cancel = Some(handle);
        self.state.moves += 1;
        self.state.is_combining = true;
        self.state.combination_error = None;
        Ok(PendingCombine {
            first,
            second,
            generation: self.generation,
            cancelled,
        })
    }

    /// Apply an oracle outcome. Returns `None` when the session was reset
    /// while the combine was in flight.
    pub fn finish_combine(
        &mut self,
        pending: &PendingCombine,
        outcome: CombinationOutcome,
        bank: &mut DiscoveryBank,
        now: DateTime<Utc>,
    ) -> Option<CombineReport> {
        if pending.generation != self.generation {
            return None;
        }
        self.state.is_combining = false;
        self.cancel = None;
        // A reply that lands after the limit cannot win the game.
        self.tick(now);

        let mut discovery = None;
        let mut reached_target = false;
        match &outcome {
            CombinationOutcome::Transient { reason } => {
                self.state.moves = self.state.moves.saturating_sub(1);
                if !pending.was_cancelled() {
                    log::debug!("combine failed: {reason}");
                    self.state.combination_error = Some(TRANSIENT_FAILURE_MESSAGE.to_string());
                }
            }
            CombinationOutcome::Blocked { .. } => {
                self.state.selection.clear();
                self.state.combination_error = Some(NO_COMBINATION_MESSAGE.to_string());
                self.state.last_result = outcome.result();
            }
            CombinationOutcome::Product { element, .. } => {
                self.state.selection.clear();
                self.state.last_result = outcome.result();
                self.state
                    .combination_path
                    .push(CombinationStep::new(&pending.first, &pending.second, element));
                if let Some(event) = bank.add(element.clone(), now) {
                    if event.was_first_global {
                        self.state.first_discoveries += 1;
                    }
                    self.push_recent(&event.name);
                    self.state.result_overlay = bank.get(&event.name).cloned();
                    discovery = Some(event);
                }
                if !self.state.free_play_mode
                    && self.state.phase == SessionPhase::Playing
                    && names_equal(element.name(), self.state.target.name())
                {
                    self.update_elapsed(now);
                    self.set_phase(SessionPhase::Admire);
                    reached_target = true;
                }
            }
        }
        Some(CombineReport {
            outcome,
            discovery,
            reached_target,
        })
    }

    fn push_recent(&mut self, name: &str) {
        let recent = &mut self.state.recent_elements;
        recent.retain(|existing| !names_equal(existing, name));
        while recent.len() >= self.recent_cap {
            recent.remove(0);
        }
        recent.push(name.to_string());
    }

    /// Reveal the next step of the reference solution that the player has
    /// neither been shown nor already made.
    pub fn use_hint(&mut self) -> Result<SolutionStep> {
        if self.state.phase != SessionPhase::Playing {
            return Err(EngineError::InvalidTransition {
                action: "use a hint",
                phase: self.state.phase,
            });
        }
        self.ensure_idle()?;
        if self.state.hints_remaining == 0 {
            return Err(EngineError::InputInvalid("no hints remaining".into()));
        }
        if self.puzzle.solution_path.is_empty() {
            return Err(EngineError::InputInvalid("this puzzle has no hints".into()));
        }
        let made: HashSet<String> = self
            .state
            .combination_path
            .iter()
            .map(|step| canonical_name(&step.result))
            .collect();
        let (index, step) = self
            .puzzle
            .solution_path
            .iter()
            .enumerate()
            .find(|(index, step)| {
                !self.state.hints_used_positions.contains(index)
                    && !made.contains(&canonical_name(&step.result))
            })
            .ok_or_else(|| EngineError::InputInvalid("nothing left to reveal".into()))?;
        let step = step.clone();

        self.state.hints_remaining -= 1;
        self.state.hints_used += 1;
        self.state.hints_used_positions.insert(index);
        self.state.revealed_hints.push(step.clone());
        if self.puzzle.hint_costs_move {
            self.state.moves += 1;
        }
        Ok(step)
    }

    /// Dismiss the result overlay; in ADMIRE this completes the session.
    pub fn acknowledge(&mut self) -> Result<()> {
        match self.state.phase {
            SessionPhase::Admire => {
                self.state.result_overlay = None;
                self.transition(SessionPhase::Complete, "acknowledge")
            }
            SessionPhase::Playing | SessionPhase::Complete | SessionPhase::GameOver => {
                self.state.result_overlay = None;
                self.state.combination_error = None;
                Ok(())
            }
            phase => Err(EngineError::InvalidTransition {
                action: "acknowledge",
                phase,
            }),
        }
    }

    /// Back to the welcome screen with a clean board. The bank is untouched.
    pub fn reset(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SessionPhase::Welcome, "reset")?;
        self.cancel_pending();
        self.generation += 1;
        let recent = std::mem::take(&mut self.state.recent_elements);
        let phase = self.state.phase;
        self.state = SessionState::fresh(
            self.state.date,
            &self.puzzle,
            self.state.is_archive,
            now,
        );
        self.state.phase = phase;
        self.state.recent_elements = recent;
        Ok(())
    }

    fn update_elapsed(&mut self, now: DateTime<Utc>) {
        if let Some(started) = self.state.started_at {
            self.state.elapsed = clamp_i64_to_u32((now - started).num_seconds());
        }
    }

    /// Advance the timer. Returns true when the time limit ended the game.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        if self.state.phase != SessionPhase::Playing || self.state.free_play_mode {
            return false;
        }
        self.update_elapsed(now);
        match self.state.time_limit {
            Some(limit) if self.state.elapsed >= limit => {
                self.state.elapsed = limit;
                self.cancel_pending();
                self.set_phase(SessionPhase::GameOver);
                true
            }
            _ => false,
        }
    }

    /// The day's result for the stats ledger.
    #[must_use]
    pub fn day_stats(&self, now: DateTime<Utc>) -> DayStats {
        DayStats {
            completed: matches!(
                self.state.phase,
                SessionPhase::Admire | SessionPhase::Complete
            ),
            time_seconds: self.state.elapsed,
            moves: self.state.moves,
            hints_used: self.state.hints_used,
            first_discoveries: self.state.first_discoveries,
            perfect_solve: self.state.is_perfect(),
            is_archive: self.state.is_archive,
            timestamp: now,
            checks: 0,
            reveals: 0,
            mistakes: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn step(a: &str, b: &str, result: &str) -> SolutionStep {
        SolutionStep {
            from: [a.into(), b.into()],
            result: result.into(),
        }
    }

    fn puzzle() -> PuzzleDefinition {
        PuzzleDefinition {
            number: 1,
            target: "Cloud".into(),
            target_glyph: "☁️".into(),
            par_moves: 2,
            time_limit_seconds: Some(120),
            hints: 2,
            hint_costs_move: true,
            solution_path: vec![step("Fire", "Water", "Steam"), step("Steam", "Air", "Cloud")],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn playing() -> (GameSession, DiscoveryBank) {
        let mut session = GameSession::new(date(), puzzle(), false, at(0));
        session.start(at(0)).unwrap();
        (session, DiscoveryBank::new(at(0)))
    }

    fn product(name: &str, glyph: &str, first: bool) -> CombinationOutcome {
        CombinationOutcome::Product {
            element: Element::combined(name, glyph, ["Fire", "Water"], first, at(0)),
            cached: false,
            first_discovery: first,
        }
    }

    fn pick(session: &mut GameSession, bank: &DiscoveryBank, a: &str, b: &str) {
        session.select(bank.get(a).unwrap().clone()).unwrap();
        session.select(bank.get(b).unwrap().clone()).unwrap();
    }

    #[test]
    fn starts_on_welcome_and_rejects_combine() {
        let mut session = GameSession::new(date(), puzzle(), false, at(0));
        assert_eq!(session.phase(), SessionPhase::Welcome);
        assert_eq!(
            session.take_transitions(),
            vec![(SessionPhase::Loading, SessionPhase::Welcome)]
        );
        assert!(matches!(
            session.begin_combine(),
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn combine_requires_both_slots() {
        let (mut session, bank) = playing();
        session.select(bank.get("fire").unwrap().clone()).unwrap();
        assert!(matches!(
            session.begin_combine(),
            Err(EngineError::InputInvalid(_))
        ));
        assert_eq!(session.state().moves, 0);
    }

    #[test]
    fn discovery_charges_a_move_and_fills_the_bank() {
        let (mut session, mut bank) = playing();
        pick(&mut session, &bank, "Fire", "Water");
        let pending = session.begin_combine().unwrap();
        assert!(session.state().is_combining);
        assert!(matches!(session.begin_combine(), Err(EngineError::Busy)));

        let report = session
            .finish_combine(&pending, product("Steam", "♨️", true), &mut bank, at(5))
            .unwrap();
        assert_eq!(report.discovery.unwrap().name, "Steam");
        let state = session.state();
        assert_eq!(state.moves, 1);
        assert_eq!(state.first_discoveries, 1);
        assert!(state.selection.is_empty());
        assert_eq!(state.recent_elements.as_slice(), ["Steam".to_string()]);
        assert_eq!(state.result_overlay.as_ref().unwrap().name(), "Steam");
        assert_eq!(state.combination_path[0].glyphs[2], "♨️");
        assert!(bank.contains("steam"));
    }

    #[test]
    fn transient_failure_refunds_the_move_and_keeps_slots() {
        let (mut session, mut bank) = playing();
        pick(&mut session, &bank, "Fire", "Water");
        let pending = session.begin_combine().unwrap();
        let outcome = CombinationOutcome::Transient {
            reason: "503".into(),
        };
        session.finish_combine(&pending, outcome, &mut bank, at(1));
        let state = session.state();
        assert_eq!(state.moves, 0);
        assert!(state.selection.pair().is_some());
        assert_eq!(
            state.combination_error.as_deref(),
            Some(TRANSIENT_FAILURE_MESSAGE)
        );
    }

    #[test]
    fn blocked_pair_clears_slots_and_counts() {
        let (mut session, mut bank) = playing();
        pick(&mut session, &bank, "Fire", "Fire");
        let pending = session.begin_combine().unwrap();
        session.finish_combine(
            &pending,
            CombinationOutcome::Blocked { cached: false },
            &mut bank,
            at(1),
        );
        let state = session.state();
        assert_eq!(state.moves, 1);
        assert!(state.selection.is_empty());
        assert_eq!(state.combination_error.as_deref(), Some(NO_COMBINATION_MESSAGE));
        assert_eq!(bank.len(), 4);
    }

    #[test]
    fn target_moves_to_admire_then_complete() {
        let (mut session, mut bank) = playing();
        bank.add(Element::combined("Steam", "♨️", ["Fire", "Water"], false, at(0)), at(0));
        pick(&mut session, &bank, "Steam", "Air");
        let pending = session.begin_combine().unwrap();
        let report = session
            .finish_combine(&pending, product("cloud", "☁️", false), &mut bank, at(42))
            .unwrap();
        assert!(report.reached_target);
        assert_eq!(session.phase(), SessionPhase::Admire);
        assert_eq!(session.state().elapsed, 42);

        session.select(bank.get("fire").unwrap().clone()).unwrap();
        assert!(session.begin_combine().is_err());
        assert!(!session.tick(at(500)));
        assert_eq!(session.state().elapsed, 42);

        session.acknowledge().unwrap();
        assert_eq!(session.phase(), SessionPhase::Complete);
        let stats = session.day_stats(at(60));
        assert!(stats.completed);
        assert!(stats.perfect_solve);
        assert_eq!(stats.time_seconds, 42);
    }

    #[test]
    fn target_settling_after_the_limit_ends_the_game() {
        let (mut session, mut bank) = playing();
        bank.add(Element::combined("Steam", "♨️", ["Fire", "Water"], false, at(0)), at(0));
        pick(&mut session, &bank, "Steam", "Air");
        let pending = session.begin_combine().unwrap();
        let report = session
            .finish_combine(&pending, product("Cloud", "☁️", false), &mut bank, at(130))
            .unwrap();
        assert!(!report.reached_target);
        assert_eq!(session.phase(), SessionPhase::GameOver);
        assert_eq!(session.state().elapsed, 120);
        assert!(bank.contains("cloud"));
        assert!(!session.day_stats(at(130)).completed);
    }

    #[test]
    fn timer_expiry_is_game_over() {
        let (mut session, _) = playing();
        assert!(!session.tick(at(60)));
        assert_eq!(session.state().elapsed, 60);
        assert!(session.tick(at(130)));
        assert_eq!(session.phase(), SessionPhase::GameOver);
        assert_eq!(session.state().elapsed, 120);
        session.reset(at(131)).unwrap();
        assert_eq!(session.phase(), SessionPhase::Welcome);
        assert_eq!(session.state().elapsed, 0);
    }

    #[test]
    fn free_play_never_completes_or_times_out() {
        let mut session = GameSession::new(date(), puzzle(), false, at(0));
        session.start_free_play(at(0)).unwrap();
        let mut bank = DiscoveryBank::new(at(0));
        bank.add(Element::combined("Steam", "♨️", ["Fire", "Water"], false, at(0)), at(0));
        assert!(!session.tick(at(10_000)));
        pick(&mut session, &bank, "Steam", "Air");
        let pending = session.begin_combine().unwrap();
        session.finish_combine(&pending, product("Cloud", "☁️", false), &mut bank, at(1));
        assert_eq!(session.phase(), SessionPhase::Playing);
    }

    #[test]
    fn hints_walk_the_solution_and_skip_made_steps() {
        let (mut session, mut bank) = playing();
        pick(&mut session, &bank, "Fire", "Water");
        let pending = session.begin_combine().unwrap();
        session.finish_combine(&pending, product("Steam", "♨️", false), &mut bank, at(1));

        let hint = session.use_hint().unwrap();
        assert_eq!(hint.result, "Cloud");
        assert_eq!(session.state().moves, 2);
        assert_eq!(session.state().hints_remaining, 1);
        assert!(session.state().hints_used_positions.contains(&1));
        assert!(matches!(
            session.use_hint(),
            Err(EngineError::InputInvalid(_))
        ));
        assert_eq!(session.state().hints_remaining, 1);
        assert!(!session.state().is_perfect());
    }

    #[test]
    fn clearing_cancels_and_reset_discards_stale_outcomes() {
        let (mut session, mut bank) = playing();
        pick(&mut session, &bank, "Fire", "Water");
        let pending = session.begin_combine().unwrap();
        let handle = session.cancel_handle().unwrap();
        session.clear_selections();
        assert!(handle.is_cancelled());

        session.reset(at(2)).unwrap();
        let stale = session.finish_combine(&pending, product("Steam", "♨️", false), &mut bank, at(3));
        assert!(stale.is_none());
        assert!(!bank.contains("steam"));
    }

    #[test]
    fn restore_resumes_timer_and_drops_half_finished_combine() {
        let (mut session, bank) = playing();
        pick(&mut session, &bank, "Fire", "Water");
        let _pending = session.begin_combine().unwrap();
        session.tick(at(30));
        let snapshot = session.state().clone();
        let json = serde_json::to_string(&snapshot).unwrap();
        let snapshot: SessionState = serde_json::from_str(&json).unwrap();

        let restored = GameSession::restore(date(), puzzle(), false, snapshot, at(1_000));
        let state = restored.state();
        assert_eq!(state.phase, SessionPhase::Playing);
        assert_eq!(state.moves, 0);
        assert!(!state.is_combining);
        assert_eq!(state.started_at, Some(at(970)));
    }
}
