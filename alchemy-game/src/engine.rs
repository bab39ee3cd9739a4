//! The command surface handed to a UI layer.
//!
//! `AlchemyEngine` owns the current session and shares the oracle, bank and
//! stats ledger with any companion engines, so two views of the same player
//! coordinate through one memo and one in-flight table.
//! Every command returns the new [`SessionState`].

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::achievements::{Achievement, UnlockedAchievements};
use crate::bank::{DiscoveryBank, DiscoveryEvent, SharedBank};
use crate::clock::{PuzzleClock, parse_iso_date};
use crate::constants::{
    KEY_ACHIEVEMENTS, KEY_COMBINATION_CACHE, KEY_DISCOVERY_BANK, KEY_SESSION_PREFIX, KEY_STATS,
};
use crate::context::EngineContext;
use crate::element::Element;
use crate::error::{EngineError, Result};
use crate::names::CombinationKey;
use crate::oracle::{CombinationOracle, CombinationOutcome};
use crate::session::{CancelHandle, GameSession, SessionPhase, SessionState, Slot};
use crate::share;
use crate::stats::{AggregateStats, CompletionRecord, StatsLedger};
use crate::storage::JsonStore;

const CANCELLED: &str = "cancelled";

/// Notifications for observers, drained with [`AlchemyEngine::drain_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Discovery(DiscoveryEvent),
    CombineSettled {
        pair: CombinationKey,
        outcome: CombinationOutcome,
    },
    StateChange {
        from: SessionPhase,
        to: SessionPhase,
    },
    AchievementUnlocked(Achievement),
    /// Storage fell back to memory; shown once.
    StorageDegraded(String),
}

/// State shared by every engine of one player.
struct EngineCore {
    ctx: EngineContext,
    store: JsonStore,
    clock: PuzzleClock,
    bank: SharedBank,
    oracle: CombinationOracle,
    stats: tokio::sync::Mutex<StatsLedger>,
    unlocked: tokio::sync::Mutex<UnlockedAchievements>,
}

impl std::fmt::Debug for EngineCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineCore")
            .field("ctx", &self.ctx)
            .field("oracle", &self.oracle)
            .finish_non_exhaustive()
    }
}

impl EngineCore {
    async fn load(ctx: EngineContext) -> Self {
        let store = ctx.json_store();
        let clock = ctx.puzzle_clock();
        let now = clock.now();

        let bank_key = store.key(KEY_DISCOVERY_BANK);
        let stored: Vec<Element> = store.load_or_default(&bank_key).await;
        let bank: SharedBank = Arc::new(Mutex::new(DiscoveryBank::from_elements(stored, now)));

        let oracle = CombinationOracle::load(
            Arc::clone(&ctx.combinations),
            store.clone(),
            Arc::clone(&bank),
            Arc::clone(&ctx.clock),
            ctx.config.retry.clone(),
            store.key(KEY_COMBINATION_CACHE),
        )
        .await;
        let stats = StatsLedger::load(store.clone(), store.key(KEY_STATS)).await;
        let unlocked: UnlockedAchievements =
            store.load_or_default(&store.key(KEY_ACHIEVEMENTS)).await;

        Self {
            ctx,
            store,
            clock,
            bank,
            oracle,
            stats: tokio::sync::Mutex::new(stats),
            unlocked: tokio::sync::Mutex::new(unlocked),
        }
    }

    fn lock_bank(&self) -> MutexGuard<'_, DiscoveryBank> {
        self.bank.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_key(&self, date: NaiveDate) -> String {
        self.store.key(&format!("{KEY_SESSION_PREFIX}_{date}"))
    }
}

#[derive(Debug)]
enum SessionSlot {
    Empty,
    Loading(NaiveDate),
    Failed(NaiveDate),
    Ready { epoch: u64, session: GameSession },
}

impl SessionSlot {
    const fn phase(&self) -> Option<SessionPhase> {
        match self {
            Self::Empty => None,
            Self::Loading(_) => Some(SessionPhase::Loading),
            Self::Failed(_) => Some(SessionPhase::Error),
            Self::Ready { session, .. } => Some(session.phase()),
        }
    }
}

#[derive(Debug)]
pub struct AlchemyEngine {
    core: Arc<EngineCore>,
    session: Mutex<SessionSlot>,
    opened: AtomicU64,
    events: Mutex<Vec<EngineEvent>>,
}

impl AlchemyEngine {
    /// Load the bank, memo, stats and achievements from storage.
    pub async fn load(ctx: EngineContext) -> Self {
        Self::with_core(Arc::new(EngineCore::load(ctx).await))
    }

    fn with_core(core: Arc<EngineCore>) -> Self {
        Self {
            core,
            session: Mutex::new(SessionSlot::Empty),
            opened: AtomicU64::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    /// A second engine for the same player with its own session.
    #[must_use]
    pub fn companion(&self) -> Self {
        Self::with_core(Arc::clone(&self.core))
    }

    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.core.ctx
    }

    #[must_use]
    pub fn oracle(&self) -> &CombinationOracle {
        &self.core.oracle
    }

    #[must_use]
    pub fn bank(&self) -> SharedBank {
        Arc::clone(&self.core.bank)
    }

    #[must_use]
    pub fn puzzle_clock(&self) -> &PuzzleClock {
        &self.core.clock
    }

    pub async fn stats(&self) -> AggregateStats {
        self.core.stats.lock().await.stats().clone()
    }

    pub async fn unlocked_achievements(&self) -> UnlockedAchievements {
        self.core.unlocked.lock().await.clone()
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionSlot> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: impl IntoIterator<Item = EngineEvent>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events);
    }

    /// Events since the last drain, oldest first.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current session snapshot, if a puzzle is open.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        match &*self.lock_session() {
            SessionSlot::Ready { session, .. } => Some(session.state().clone()),
            _ => None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Option<SessionPhase> {
        self.lock_session().phase()
    }

    /// Handle that aborts the combine in flight, if any.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancelHandle> {
        match &*self.lock_session() {
            SessionSlot::Ready { session, .. } => session.cancel_handle(),
            _ => None,
        }
    }

    /// One-shot storage warning, if storage has fallen back to memory.
    pub fn storage_warning(&self) -> Option<String> {
        let warning = self.core.ctx.storage.take_degraded_warning();
        if let Some(message) = &warning {
            self.emit([EngineEvent::StorageDegraded(message.clone())]);
        }
        warning
    }

    /// Run `f` against the open session after advancing its timer. Phase
    /// changes are emitted even when `f` fails.
    fn with_session<T>(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut GameSession, DateTime<Utc>) -> Result<T>,
    ) -> Result<(T, SessionState)> {
        let now = self.core.clock.now();
        let mut slot = self.lock_session();
        let session = match &mut *slot {
            SessionSlot::Ready { session, .. } => session,
            SessionSlot::Empty => return Err(EngineError::NoSession),
            SessionSlot::Loading(_) => {
                return Err(EngineError::InvalidTransition {
                    action,
                    phase: SessionPhase::Loading,
                });
            }
            SessionSlot::Failed(_) => {
                return Err(EngineError::InvalidTransition {
                    action,
                    phase: SessionPhase::Error,
                });
            }
        };
        session.tick(now);
        let result = f(session, now);
        let transitions = session.take_transitions();
        let snapshot = session.state().clone();
        drop(slot);
        self.emit(
            transitions
                .into_iter()
                .map(|(from, to)| EngineEvent::StateChange { from, to }),
        );
        result.map(|value| (value, snapshot))
    }

    async fn persist_session(&self, state: &SessionState) {
        let key = self.core.session_key(state.date);
        if let Err(err) = self.core.store.save(&key, state).await {
            log::warn!("{key}: progress not saved ({err})");
        }
        self.storage_warning();
    }

    async fn persist_bank(&self) {
        let elements = self.core.lock_bank().as_slice().to_vec();
        let key = self.core.store.key(KEY_DISCOVERY_BANK);
        if let Err(err) = self.core.store.save(&key, &elements).await {
            log::warn!("{key}: discovery bank not saved ({err})");
        }
    }

    async fn mutate<T>(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut GameSession, DateTime<Utc>) -> Result<T>,
    ) -> Result<SessionState> {
        let (_, state) = self.with_session(action, f)?;
        self.persist_session(&state).await;
        Ok(state)
    }

    /// Open the puzzle for `iso_date`, resuming saved progress for that day.
    ///
    /// # Errors
    ///
    /// `InputInvalid` for malformed, pre-launch or future dates;
    /// `PuzzleUnavailable` when the puzzle source fails.
    pub async fn open_puzzle(&self, iso_date: &str) -> Result<SessionState> {
        let date = parse_iso_date(iso_date)?;
        let clock = &self.core.clock;
        if date > clock.today() {
            return Err(EngineError::InputInvalid(format!(
                "{iso_date} has not been released yet"
            )));
        }
        if date < clock.launch() {
            return Err(EngineError::InputInvalid(format!(
                "{iso_date} is before puzzle #1"
            )));
        }
        let number = clock.puzzle_number_for_date(iso_date)?;

        let epoch = self.opened.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut slot = self.lock_session();
            if let SessionSlot::Ready { session, .. } = &mut *slot {
                session.clear_selections();
            }
            *slot = SessionSlot::Loading(date);
        }

        let puzzle = match self.core.ctx.puzzles.get_puzzle_for_date(date, number).await {
            Ok(puzzle) => puzzle,
            Err(err) => {
                log::warn!("puzzle {number} ({date}) unavailable: {err}");
                *self.lock_session() = SessionSlot::Failed(date);
                self.emit([EngineEvent::StateChange {
                    from: SessionPhase::Loading,
                    to: SessionPhase::Error,
                }]);
                return Err(err.into());
            }
        };

        let is_archive = clock.is_archive(date);
        let now = clock.now();
        let key = self.core.session_key(date);
        let saved = match self.core.store.load::<SessionState>(&key).await {
            Ok(saved) => saved,
            Err(err) => {
                log::warn!("{key}: starting over ({err})");
                None
            }
        };
        let session = match saved {
            Some(snapshot) => GameSession::restore(date, puzzle, is_archive, snapshot, now),
            None => GameSession::new(date, puzzle, is_archive, now),
        }
        .with_recent_cap(self.core.ctx.config.recent_cap);

        let state = {
            let mut slot = self.lock_session();
            if matches!(&*slot, SessionSlot::Loading(d) if *d == date)
                && self.opened.load(Ordering::Acquire) == epoch
            {
                *slot = SessionSlot::Ready { epoch, session };
            }
            drop(slot);
            self.with_session("open", |_, _| Ok(()))?.1
        };
        self.persist_session(&state).await;
        Ok(state)
    }

    /// Open today's puzzle.
    ///
    /// # Errors
    ///
    /// See [`Self::open_puzzle`].
    pub async fn open_today(&self) -> Result<SessionState> {
        let today = self.core.clock.current_date_string();
        self.open_puzzle(&today).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` unless on the welcome screen.
    pub async fn start_game(&self) -> Result<SessionState> {
        self.mutate("start", |session, now| session.start(now)).await
    }

    /// # Errors
    ///
    /// `InvalidTransition` unless on the welcome screen.
    pub async fn start_free_play(&self) -> Result<SessionState> {
        self.mutate("start free play", |session, now| session.start_free_play(now))
            .await
    }

    /// Put a discovered element into the next free slot.
    ///
    /// # Errors
    ///
    /// `InputInvalid` for an element the player has not discovered; `Busy`
    /// while a combine is in flight.
    pub async fn select_element(&self, name: &str) -> Result<SessionState> {
        let element = self
            .core
            .lock_bank()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::InputInvalid(format!("unknown element {name:?}")))?;
        self.mutate("select an element", |session, _| session.select(element))
            .await
    }

    /// # Errors
    ///
    /// `NoSession` when no puzzle is open.
    pub async fn clear_slot(&self, slot: Slot) -> Result<SessionState> {
        self.mutate("clear a slot", |session, _| {
            session.clear_slot(slot);
            Ok(())
        })
        .await
    }

    /// Empty both slots, cancelling any combine in flight.
    ///
    /// # Errors
    ///
    /// `NoSession` when no puzzle is open.
    pub async fn clear_selections(&self) -> Result<SessionState> {
        self.mutate("clear selections", |session, _| {
            session.clear_selections();
            Ok(())
        })
        .await
    }

    /// Combine the two selected elements.
    ///
    /// # Errors
    ///
    /// `InputInvalid` without two selections, `Busy` while another combine
    /// runs, `InvalidTransition` outside PLAYING, and `SourceTransient` when
    /// the source stayed unreachable (no move is charged).
    pub async fn combine_selected(&self) -> Result<SessionState> {
        let epoch = match &*self.lock_session() {
            SessionSlot::Ready { epoch, .. } => *epoch,
            _ => 0,
        };
        let (pending, _) = self.with_session("combine", |session, _| session.begin_combine())?;
        let cancelled = pending.cancelled();
        let outcome = tokio::select! {
            biased;
            () = cancelled => CombinationOutcome::Transient { reason: CANCELLED.to_string() },
            outcome = self.core.oracle.combine(&pending.first, &pending.second) => outcome,
        };

        let now = self.core.clock.now();
        let settled = {
            let mut slot = self.lock_session();
            match &mut *slot {
                SessionSlot::Ready {
                    epoch: current,
                    session,
                } if *current == epoch => {
                    let mut bank = self.core.lock_bank();
                    session
                        .finish_combine(&pending, outcome.clone(), &mut bank, now)
                        .map(|report| (report, session.day_stats(now), session.state().date))
                }
                _ => None,
            }
        };
        // Emits the ADMIRE transition, if any.
        let state = self.with_session("combine", |_, _| Ok(()))?.1;

        let pair = CombinationKey::new(pending.first.name(), pending.second.name());
        self.emit([EngineEvent::CombineSettled {
            pair,
            outcome: outcome.clone(),
        }]);
        let Some((report, day, date)) = settled else {
            return Ok(state);
        };
        if let Some(discovery) = report.discovery {
            self.emit([EngineEvent::Discovery(discovery)]);
            self.persist_bank().await;
        }
        if report.reached_target {
            self.record_completion(date, day).await;
        }
        self.persist_session(&state).await;

        match outcome {
            CombinationOutcome::Transient { reason } if reason != CANCELLED => {
                Err(EngineError::SourceTransient(reason))
            }
            _ => Ok(state),
        }
    }

    async fn record_completion(&self, date: NaiveDate, day: crate::stats::DayStats) {
        // A daily completion that crosses midnight still counts for its own day.
        let today = if day.is_archive {
            self.core.clock.today()
        } else {
            date
        };
        let mut ledger = self.core.stats.lock().await;
        if ledger.record_completion(date, today, day) == CompletionRecord::AlreadyCompleted {
            log::debug!("{date} already completed; stats unchanged");
            return;
        }
        if let Err(err) = ledger.persist().await {
            log::warn!("stats not saved ({err})");
        }
        self.check_achievements(ledger.stats()).await;
    }

    async fn check_achievements(&self, stats: &AggregateStats) {
        let mut unlocked = self.core.unlocked.lock().await;
        let fresh = unlocked.check(stats, &self.core.ctx.config.achievements);
        if fresh.is_empty() {
            return;
        }
        let key = self.core.store.key(KEY_ACHIEVEMENTS);
        if let Err(err) = self.core.store.save(&key, &*unlocked).await {
            log::warn!("{key}: achievements not saved ({err})");
        }
        self.emit(fresh.into_iter().map(EngineEvent::AchievementUnlocked));
    }

    /// Reveal the next step of the reference solution.
    ///
    /// # Errors
    ///
    /// `InputInvalid` when no hint is left or the puzzle has none.
    pub async fn use_hint(&self) -> Result<SessionState> {
        self.mutate("use a hint", |session, _| session.use_hint())
            .await
    }

    /// Dismiss the result; completes the session from ADMIRE.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` on the welcome screen.
    pub async fn acknowledge_result(&self) -> Result<SessionState> {
        self.mutate("acknowledge", |session, _| session.acknowledge())
            .await
    }

    /// # Errors
    ///
    /// `InvalidTransition` from WELCOME or ADMIRE.
    pub async fn reset_game(&self) -> Result<SessionState> {
        self.mutate("reset", GameSession::reset).await
    }

    /// Advance the timer; may end the game.
    ///
    /// # Errors
    ///
    /// `NoSession` when no puzzle is open.
    pub async fn tick(&self) -> Result<SessionState> {
        let before = self.phase();
        let (_, state) = self.with_session("tick", |_, _| Ok(()))?;
        if before != Some(state.phase) {
            self.persist_session(&state).await;
        }
        Ok(state)
    }

    /// Share text for a solved puzzle.
    ///
    /// # Errors
    ///
    /// `InvalidTransition` until the target has been found.
    pub fn get_share_text(&self) -> Result<String> {
        let (_, state) = self.with_session("share", |session, _| match session.phase() {
            SessionPhase::Admire | SessionPhase::Complete => Ok(()),
            phase => Err(EngineError::InvalidTransition {
                action: "share",
                phase,
            }),
        })?;
        Ok(share::encode_session(&state))
    }

    /// Fold in stats from an external mirror and persist the result.
    pub async fn merge_external_stats(&self, other: &AggregateStats) -> AggregateStats {
        let mut ledger = self.core.stats.lock().await;
        ledger.merge_external(other);
        if let Err(err) = ledger.persist().await {
            log::warn!("stats not saved ({err})");
        }
        let merged = ledger.stats().clone();
        self.check_achievements(&merged).await;
        merged
    }

    /// Write everything still pending.
    pub async fn flush(&self) -> bool {
        let memo = self.core.oracle.flush().await;
        self.persist_bank().await;
        if let Some(state) = self.state() {
            self.persist_session(&state).await;
        }
        memo
    }
}
