//! Date and puzzle clock.
//!
//! Puzzle numbers are derived from the player's local calendar date (Wordle
//! style), never from a network clock. Puzzle 1 is `launch_date`.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

use crate::constants::{LAUNCH_DAY, LAUNCH_MONTH, LAUNCH_YEAR, SECONDS_PER_DAY};
use crate::numbers::clamp_i64_to_u32;

const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("malformed date {0:?}, expected YYYY-MM-DD")]
    MalformedDate(String),
}

/// Source of wall-clock time and the player's local offset.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Offset of the player's local timezone at `now()`.
    fn local_offset(&self) -> FixedOffset;

    /// Player-local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().with_timezone(&self.local_offset()).date_naive()
    }
}

/// Host clock in the host's local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_offset(&self) -> FixedOffset {
        *Local::now().offset()
    }
}

/// Clock that only moves when told to. Used by tests and the scenario runner.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    #[must_use]
    pub const fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Start at local noon of `date` in UTC.
    #[must_use]
    pub fn at_date(date: NaiveDate) -> Self {
        let noon = date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();
        Self::new(noon)
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_offset(&self) -> FixedOffset {
        self.offset
    }
}

/// The default launch date (puzzle #1).
#[must_use]
pub fn default_launch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(LAUNCH_YEAR, LAUNCH_MONTH, LAUNCH_DAY).unwrap_or(NaiveDate::MIN)
}

/// Strict `YYYY-MM-DD` parse: zero-padded, no surrounding whitespace.
///
/// # Errors
///
/// Returns `ClockError::MalformedDate` for any other shape or an impossible date.
pub fn parse_iso_date(iso: &str) -> Result<NaiveDate, ClockError> {
    let bytes = iso.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(ClockError::MalformedDate(iso.to_string()));
    }
    NaiveDate::parse_from_str(iso, ISO_DATE_FORMAT)
        .map_err(|_| ClockError::MalformedDate(iso.to_string()))
}

#[must_use]
pub fn format_iso_date(date: NaiveDate) -> String {
    date.format(ISO_DATE_FORMAT).to_string()
}

/// Inclusive puzzle-number range for a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRange {
    pub start: u32,
    pub end: u32,
    pub count: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Maps calendar dates to daily puzzle numbers.
#[derive(Clone)]
pub struct PuzzleClock {
    launch: NaiveDate,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PuzzleClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PuzzleClock")
            .field("launch", &self.launch)
            .finish_non_exhaustive()
    }
}

impl PuzzleClock {
    #[must_use]
    pub fn new(launch: NaiveDate, clock: Arc<dyn Clock>) -> Self {
        Self { launch, clock }
    }

    #[must_use]
    pub const fn launch(&self) -> NaiveDate {
        self.launch
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    #[must_use]
    pub fn current_date_string(&self) -> String {
        format_iso_date(self.today())
    }

    #[must_use]
    pub fn yesterday(&self) -> NaiveDate {
        self.today() - Duration::days(1)
    }

    fn number_for(&self, date: NaiveDate) -> u32 {
        // Local midnight re-read as UTC midnight, so DST never shifts the count.
        let local_midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let launch_midnight = self.launch.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc();
        let seconds = (local_midnight - launch_midnight).num_seconds();
        let days = seconds.div_euclid(SECONDS_PER_DAY);
        clamp_i64_to_u32(days + 1).max(1)
    }

    /// Puzzle number for the player's local today, never below 1.
    #[must_use]
    pub fn current_puzzle_number(&self) -> u32 {
        self.number_for(self.today())
    }

    /// Calendar date of puzzle `n`.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::InvalidArgument` when `n < 1`.
    pub fn date_for_puzzle_number(&self, n: i64) -> Result<NaiveDate, ClockError> {
        if n < 1 {
            return Err(ClockError::InvalidArgument(format!(
                "puzzle number must be >= 1, got {n}"
            )));
        }
        self.launch
            .checked_add_signed(Duration::days(n - 1))
            .ok_or_else(|| ClockError::InvalidArgument(format!("puzzle number {n} out of range")))
    }

    /// ISO form of [`Self::date_for_puzzle_number`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::date_for_puzzle_number`].
    pub fn iso_for_puzzle_number(&self, n: i64) -> Result<String, ClockError> {
        self.date_for_puzzle_number(n).map(format_iso_date)
    }

    /// Puzzle number for an ISO date; dates before launch map to 1.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::MalformedDate` for anything but strict `YYYY-MM-DD`.
    pub fn puzzle_number_for_date(&self, iso: &str) -> Result<u32, ClockError> {
        parse_iso_date(iso).map(|date| self.number_for(date))
    }

    /// Puzzle numbers available in a month, clamped to `[launch, today]`.
    ///
    /// Returns `Ok(None)` when the whole month precedes launch or lies in the future.
    ///
    /// # Errors
    ///
    /// Returns `ClockError::InvalidArgument` for a month outside 1–12.
    pub fn range_for_month(&self, year: i32, month: u32) -> Result<Option<MonthRange>, ClockError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            ClockError::InvalidArgument(format!("invalid month {year}-{month}"))
        })?;
        let next_first = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let last = next_first
            .and_then(|d| d.pred_opt())
            .ok_or_else(|| ClockError::InvalidArgument(format!("invalid month {year}-{month}")))?;

        if last < self.launch {
            return Ok(None);
        }
        let start_date = first.max(self.launch);
        let end_date = last.min(self.today());
        if end_date < start_date {
            return Ok(None);
        }
        let start = self.number_for(start_date);
        let end = self.number_for(end_date);
        Ok(Some(MonthRange {
            start,
            end,
            count: end - start + 1,
            start_date,
            end_date,
        }))
    }

    /// Whether `date` is a past puzzle relative to local today.
    #[must_use]
    pub fn is_archive(&self, date: NaiveDate) -> bool {
        date < self.today()
    }

    /// Month and year of today, for calendar views.
    #[must_use]
    pub fn current_month(&self) -> (i32, u32) {
        let today = self.today();
        (today.year(), today.month())
    }
}
