//! Per-game statistics, daily streaks and the sync merge rule.
//!
//! Totals are always derived from the `completedPuzzles` map, so merging two
//! copies never double-counts. Streaks only move on first-attempt completions
//! of today's puzzle; archive plays feed totals and first discoveries only.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::numbers::{mean_nonzero, round_f64_to_u32};
use crate::storage::{JsonStore, StorageError};

/// One day's result for one game type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayStats {
    pub completed: bool,
    pub time_seconds: u32,
    pub moves: u32,
    pub hints_used: u32,
    pub first_discoveries: u32,
    pub perfect_solve: bool,
    pub is_archive: bool,
    pub timestamp: DateTime<Utc>,
    /// Shared with the other puzzle formats' merge rule; always 0 here.
    #[serde(default)]
    pub checks: u32,
    #[serde(default)]
    pub reveals: u32,
    #[serde(default)]
    pub mistakes: u32,
}

impl DayStats {
    /// Ordering used to pick the better of two entries for the same day:
    /// completed first, then lower time (0 = unknown sorts last), then every
    /// remaining field so the choice is total.
    fn merge_order(&self, other: &Self) -> Ordering {
        let time_key = |d: &Self| {
            if d.time_seconds == 0 {
                u32::MAX
            } else {
                d.time_seconds
            }
        };
        (!self.completed)
            .cmp(&!other.completed)
            .then_with(|| time_key(self).cmp(&time_key(other)))
            .then_with(|| self.moves.cmp(&other.moves))
            .then_with(|| self.hints_used.cmp(&other.hints_used))
            .then_with(|| other.first_discoveries.cmp(&self.first_discoveries))
            .then_with(|| (!self.perfect_solve).cmp(&!other.perfect_solve))
            .then_with(|| self.is_archive.cmp(&other.is_archive))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
    }

    /// Keep the faster entry and the minimum checks/reveals/mistakes.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut best = if self.merge_order(other) == Ordering::Greater {
            other.clone()
        } else {
            self.clone()
        };
        best.checks = self.checks.min(other.checks);
        best.reveals = self.reveals.min(other.reveals);
        best.mistakes = self.mistakes.min(other.mistakes);
        best
    }
}

/// Aggregate statistics for one game type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateStats {
    pub total_completed: u32,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_hints_used: u32,
    pub perfect_solves: u32,
    pub average_time: f64,
    pub best_time: Option<u32>,
    pub first_discoveries: u32,
    pub completed_puzzles: BTreeMap<NaiveDate, DayStats>,
    pub last_played_date: Option<NaiveDate>,
}

/// What a completion did to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionRecord {
    /// First completion of this date; totals updated.
    Recorded { streak_updated: bool },
    /// The date was already completed; nothing changed.
    AlreadyCompleted,
}

impl AggregateStats {
    /// Record a completion for `date`. `today` is the player-local date used
    /// for streak attribution; archive entries never touch the streak.
    pub fn record_completion(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
        day: DayStats,
    ) -> CompletionRecord {
        if self
            .completed_puzzles
            .get(&date)
            .is_some_and(|existing| existing.completed)
        {
            return CompletionRecord::AlreadyCompleted;
        }
        let archive = day.is_archive;
        self.completed_puzzles.insert(date, day);
        self.recompute_totals();
        if archive {
            return CompletionRecord::Recorded {
                streak_updated: false,
            };
        }
        self.advance_streak(today);
        CompletionRecord::Recorded {
            streak_updated: true,
        }
    }

    fn advance_streak(&mut self, today: NaiveDate) {
        let yesterday = today - Duration::days(1);
        self.current_streak = match self.last_played_date {
            Some(last) if last == today => self.current_streak.max(1),
            Some(last) if last == yesterday => self.current_streak + 1,
            _ => 1,
        };
        self.longest_streak = self.longest_streak.max(self.current_streak);
        self.last_played_date = Some(today);
    }

    /// Recompute every total from the completed-puzzle map.
    pub fn recompute_totals(&mut self) {
        let completed = || self.completed_puzzles.values().filter(|d| d.completed);
        self.total_completed = count_u32(completed().count());
        self.total_hints_used = completed().map(|d| d.hints_used).sum();
        self.perfect_solves = count_u32(completed().filter(|d| d.perfect_solve).count());
        self.first_discoveries = completed().map(|d| d.first_discoveries).sum();
        self.best_time = completed()
            .map(|d| d.time_seconds)
            .filter(|t| *t > 0)
            .min();
        self.average_time = mean_nonzero(completed().map(|d| d.time_seconds)).unwrap_or(0.0);
    }

    /// Average time rounded to whole seconds.
    #[must_use]
    pub fn average_time_seconds(&self) -> u32 {
        round_f64_to_u32(self.average_time)
    }

    /// Streak as it should be displayed today: a streak whose last day is
    /// before yesterday is already broken.
    #[must_use]
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        match self.last_played_date {
            Some(last) if last >= today - Duration::days(1) => self.current_streak,
            _ => 0,
        }
    }

    /// Non-archive completion dates, ascending.
    fn daily_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.completed_puzzles
            .iter()
            .filter(|(_, d)| d.completed && !d.is_archive)
            .map(|(date, _)| *date)
    }

    /// Length of the run of consecutive daily completions ending at `end`.
    fn run_ending_at(&self, end: NaiveDate) -> u32 {
        let mut run = 0;
        let mut cursor = end;
        while self
            .completed_puzzles
            .get(&cursor)
            .is_some_and(|d| d.completed && !d.is_archive)
        {
            run += 1;
            cursor -= Duration::days(1);
        }
        run
    }

    fn longest_run(&self) -> u32 {
        let mut longest = 0;
        let mut run = 0;
        let mut previous: Option<NaiveDate> = None;
        for date in self.daily_dates() {
            run = match previous {
                Some(prev) if date - prev == Duration::days(1) => run + 1,
                _ => 1,
            };
            longest = longest.max(run);
            previous = Some(date);
        }
        longest
    }

    /// Reconcile two copies (e.g. local and a sync mirror). Commutative and
    /// idempotent: per-date entries are merged, totals recomputed.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut completed_puzzles = self.completed_puzzles.clone();
        for (date, theirs) in &other.completed_puzzles {
            completed_puzzles
                .entry(*date)
                .and_modify(|ours| *ours = ours.merged(theirs))
                .or_insert_with(|| theirs.clone());
        }
        let mut merged = Self {
            completed_puzzles,
            last_played_date: self.last_played_date.max(other.last_played_date),
            ..Self::default()
        };
        merged.recompute_totals();

        merged.current_streak = match merged.last_played_date {
            Some(last) if merged.run_ending_at(last) > 0 => merged.run_ending_at(last),
            last => [self, other]
                .iter()
                .filter(|s| s.last_played_date == last)
                .map(|s| s.current_streak)
                .max()
                .unwrap_or(0),
        };
        merged.longest_streak = self
            .longest_streak
            .max(other.longest_streak)
            .max(merged.longest_run())
            .max(merged.current_streak);
        merged
    }

    /// Rebuild from a blob that no longer parses as a whole, salvaging any
    /// `completedPuzzles` entries that still do.
    #[must_use]
    pub fn recover_from_raw(raw: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        let entries = value.get("completedPuzzles")?.as_object()?;
        let completed_puzzles: BTreeMap<NaiveDate, DayStats> = entries
            .iter()
            .filter_map(|(date, day)| {
                let date = date.parse::<NaiveDate>().ok()?;
                let day = serde_json::from_value::<DayStats>(day.clone()).ok()?;
                Some((date, day))
            })
            .collect();
        if completed_puzzles.is_empty() {
            return None;
        }
        let mut stats = Self {
            completed_puzzles,
            ..Self::default()
        };
        stats.recompute_totals();
        stats.last_played_date = stats.daily_dates().last();
        stats.current_streak = stats
            .last_played_date
            .map_or(0, |last| stats.run_ending_at(last));
        stats.longest_streak = stats.longest_run();
        Some(stats)
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Loads, updates and persists one game's [`AggregateStats`].
#[derive(Debug, Clone)]
pub struct StatsLedger {
    store: JsonStore,
    key: String,
    stats: AggregateStats,
}

impl StatsLedger {
    /// Load stats from `key`. A corrupt blob is quarantined; when its
    /// completed-puzzle map is still readable the totals are rebuilt from it.
    pub async fn load(store: JsonStore, key: String) -> Self {
        let raw = match store.raw().get(&key).await {
            Ok(raw) => raw,
            Err(err) => {
                log::warn!("{key}: stats unreadable ({err}); starting fresh");
                None
            }
        };
        let stats = match raw {
            None => AggregateStats::default(),
            Some(raw) => match serde_json::from_str::<AggregateStats>(&raw) {
                Ok(stats) => stats,
                Err(err) => {
                    store.quarantine(&key, &raw).await;
                    let recovered = AggregateStats::recover_from_raw(&raw);
                    log::warn!(
                        "{key}: stats corrupt ({err}); recovered {} entries",
                        recovered
                            .as_ref()
                            .map_or(0, |s| s.completed_puzzles.len())
                    );
                    recovered.unwrap_or_default()
                }
            },
        };
        Self { store, key, stats }
    }

    #[must_use]
    pub const fn stats(&self) -> &AggregateStats {
        &self.stats
    }

    pub fn record_completion(
        &mut self,
        date: NaiveDate,
        today: NaiveDate,
        day: DayStats,
    ) -> CompletionRecord {
        self.stats.record_completion(date, today, day)
    }

    /// Fold in a copy from an external mirror.
    pub fn merge_external(&mut self, other: &AggregateStats) {
        self.stats = self.stats.merge(other);
    }

    /// Write the current stats.
    ///
    /// # Errors
    ///
    /// Returns the storage error when every tier refuses the write.
    pub async fn persist(&self) -> Result<(), StorageError> {
        self.store.save(&self.key, &self.stats).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn day(time: u32, hints: u32, archive: bool) -> DayStats {
        DayStats {
            completed: true,
            time_seconds: time,
            moves: 5,
            hints_used: hints,
            first_discoveries: 1,
            perfect_solve: hints == 0,
            is_archive: archive,
            timestamp: Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap(),
            checks: 0,
            reveals: 0,
            mistakes: 0,
        }
    }

    #[test]
    fn streak_follows_consecutive_days() {
        let mut stats = AggregateStats::default();
        stats.record_completion(date(1), date(1), day(60, 0, false));
        assert_eq!(stats.current_streak, 1);
        stats.record_completion(date(2), date(2), day(90, 1, false));
        assert_eq!(stats.current_streak, 2);
        stats.record_completion(date(4), date(4), day(30, 0, false));
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.longest_streak, 2);
        assert_eq!(stats.total_completed, 3);
        assert_eq!(stats.perfect_solves, 2);
        assert_eq!(stats.total_hints_used, 1);
        assert_eq!(stats.best_time, Some(30));
        assert_eq!(stats.average_time_seconds(), 60);
    }

    #[test]
    fn repeat_completion_changes_nothing() {
        let mut stats = AggregateStats::default();
        stats.record_completion(date(1), date(1), day(60, 0, false));
        let before = stats.clone();
        let record = stats.record_completion(date(1), date(1), day(10, 0, false));
        assert_eq!(record, CompletionRecord::AlreadyCompleted);
        assert_eq!(stats, before);
    }

    #[test]
    fn archive_completion_leaves_streak_alone() {
        let mut stats = AggregateStats::default();
        stats.record_completion(date(5), date(5), day(60, 0, false));
        let record = stats.record_completion(date(2), date(5), day(40, 0, true));
        assert_eq!(
            record,
            CompletionRecord::Recorded {
                streak_updated: false
            }
        );
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.last_played_date, Some(date(5)));
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.first_discoveries, 2);
    }

    #[test]
    fn effective_streak_decays_after_a_missed_day() {
        let mut stats = AggregateStats::default();
        stats.record_completion(date(1), date(1), day(60, 0, false));
        assert_eq!(stats.effective_streak(date(2)), 1);
        assert_eq!(stats.effective_streak(date(3)), 0);
        assert_eq!(stats.current_streak, 1);
    }

    #[test]
    fn merge_keeps_faster_entry_and_min_counters() {
        let mut a = day(90, 0, false);
        a.checks = 2;
        let mut b = day(60, 1, false);
        b.checks = 5;
        b.mistakes = 1;
        let merged = a.merged(&b);
        assert_eq!(merged.time_seconds, 60);
        assert_eq!(merged.checks, 2);
        assert_eq!(merged.mistakes, 0);
        assert_eq!(a.merged(&b), b.merged(&a));
    }

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let mut x = AggregateStats::default();
        x.record_completion(date(1), date(1), day(60, 0, false));
        x.record_completion(date(2), date(2), day(50, 0, false));
        let mut y = AggregateStats::default();
        y.record_completion(date(2), date(2), day(45, 2, false));
        y.record_completion(date(3), date(3), day(70, 0, false));

        let xy = x.merge(&y);
        assert_eq!(xy, y.merge(&x));
        assert_eq!(x.merge(&xy), xy);
        assert_eq!(xy.merge(&xy), xy);

        assert_eq!(xy.total_completed, 3);
        assert_eq!(xy.completed_puzzles[&date(2)].time_seconds, 45);
        assert_eq!(xy.current_streak, 3);
        assert_eq!(xy.longest_streak, 3);
        assert_eq!(xy.last_played_date, Some(date(3)));
    }

    #[test]
    fn recovers_entries_from_damaged_blob() {
        let raw = serde_json::json!({
            "totalCompleted": "not a number",
            "completedPuzzles": {
                "2025-01-01": serde_json::to_value(day(60, 0, false)).unwrap(),
                "2025-01-02": serde_json::to_value(day(30, 1, false)).unwrap(),
                "garbage": {"completed": 7}
            }
        })
        .to_string();
        assert!(serde_json::from_str::<AggregateStats>(&raw).is_err());
        let stats = AggregateStats::recover_from_raw(&raw).unwrap();
        assert_eq!(stats.total_completed, 2);
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.last_played_date, Some(date(2)));
        assert!(AggregateStats::recover_from_raw("{oops").is_none());
    }

    #[test]
    fn stats_serialize_with_iso_date_keys() {
        let mut stats = AggregateStats::default();
        stats.record_completion(date(4), date(4), day(60, 0, false));
        let value = serde_json::to_value(&stats).unwrap();
        assert!(value["completedPuzzles"]["2025-01-04"]["perfectSolve"].as_bool().unwrap());
        assert_eq!(value["lastPlayedDate"], "2025-01-04");
    }
}
