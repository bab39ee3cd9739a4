//! Combination oracle: canonical, deterministic, single-flight combination.
//!
//! The memo maps every canonical pair ever resolved to its product (or to
//! "does not combine") and is persisted as one JSON blob. Concurrent requests
//! for the same pair share one in-flight computation. Transient source
//! failures are retried with jittered exponential backoff inside an overall
//! budget and never touch the memo. The in-flight table holds only weak
//! handles: once every caller has gone the computation is dropped, so a
//! cancelled combine never leaves a stale entry behind.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::bank::SharedBank;
use crate::clock::Clock;
use crate::constants::{
    LOG_MEMO_PERSIST_FAILED, LOG_SOURCE_EXHAUSTED, LOG_SOURCE_RETRY, RETRY_BASE_DELAY_MS,
    RETRY_FACTOR, RETRY_JITTER, RETRY_MAX_RETRIES, SOURCE_BUDGET_SECS,
};
use crate::element::Element;
use crate::names::{CombinationKey, canonical_name};
use crate::numbers::scale_millis;
use crate::source::{CombinationSource, SourceError, SourceReply};
use crate::storage::{JsonStore, WriteOutcome};

/// Backoff policy for transient source failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub factor: u32,
    /// Retries after the first call.
    pub max_retries: u32,
    /// Fractional jitter, e.g. 0.2 for ±20%.
    pub jitter: f64,
    /// Wall-clock budget for one pair, retries included.
    pub budget_ms: u64,
    pub jitter_seed: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: RETRY_BASE_DELAY_MS,
            factor: RETRY_FACTOR,
            max_retries: RETRY_MAX_RETRIES,
            jitter: RETRY_JITTER,
            budget_ms: SOURCE_BUDGET_SECS * 1_000,
            jitter_seed: 0x00A1_C4E3,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32, rng: &mut impl Rng) -> Duration {
        let growth = u64::from(self.factor).saturating_pow(retry);
        let base = self.base_delay_ms.saturating_mul(growth);
        let spread = if self.jitter > 0.0 {
            1.0 + rng.gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        Duration::from_millis(scale_millis(base, spread))
    }

    #[must_use]
    pub const fn budget(&self) -> Duration {
        Duration::from_millis(self.budget_ms)
    }
}

/// A memoised product as persisted: `{name, glyph}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoEntry {
    pub name: String,
    pub glyph: String,
}

/// Persisted memo blob: canonical key → product, `null` for "does not combine".
pub type MemoBlob = BTreeMap<CombinationKey, Option<MemoEntry>>;

/// `{product, cached, firstDiscovery}` as seen by sessions and persisted in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationResult {
    pub product: Option<Element>,
    pub cached: bool,
    pub first_discovery: bool,
}

/// Tagged outcome of one combine request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CombinationOutcome {
    Product {
        element: Element,
        cached: bool,
        first_discovery: bool,
    },
    /// The pair does not combine.
    Blocked { cached: bool },
    /// The source stayed unreachable; nothing was cached.
    Transient { reason: String },
}

impl CombinationOutcome {
    /// The result record, or `None` for a transient failure.
    #[must_use]
    pub fn result(&self) -> Option<CombinationResult> {
        match self {
            Self::Product {
                element,
                cached,
                first_discovery,
            } => Some(CombinationResult {
                product: Some(element.clone()),
                cached: *cached,
                first_discovery: *first_discovery,
            }),
            Self::Blocked { cached } => Some(CombinationResult {
                product: None,
                cached: *cached,
                first_discovery: false,
            }),
            Self::Transient { .. } => None,
        }
    }

    #[must_use]
    pub const fn is_cached(&self) -> bool {
        match self {
            Self::Product { cached, .. } | Self::Blocked { cached } => *cached,
            Self::Transient { .. } => false,
        }
    }

    #[must_use]
    pub const fn product(&self) -> Option<&Element> {
        match self {
            Self::Product { element, .. } => Some(element),
            _ => None,
        }
    }

    fn as_joined(self) -> Self {
        match self {
            Self::Product {
                element,
                first_discovery,
                ..
            } => Self::Product {
                element,
                cached: true,
                first_discovery,
            },
            Self::Blocked { .. } => Self::Blocked { cached: true },
            transient @ Self::Transient { .. } => transient,
        }
    }
}

const FLUSH_ATTEMPTS: usize = 3;

type InflightCombine = Shared<BoxFuture<'static, CombinationOutcome>>;

struct Flight {
    id: u64,
    handle: WeakShared<BoxFuture<'static, CombinationOutcome>>,
}

#[derive(Default)]
struct OracleState {
    memo: HashMap<CombinationKey, Option<MemoEntry>>,
    inflight: HashMap<CombinationKey, Flight>,
    next_flight: u64,
    version: u64,
    persisted: u64,
}

struct OracleInner {
    source: Arc<dyn CombinationSource>,
    store: JsonStore,
    memo_key: String,
    bank: SharedBank,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    rng: Mutex<ChaCha20Rng>,
    state: Mutex<OracleState>,
}

/// Shared handle; clones refer to the same memo and in-flight table.
#[derive(Clone)]
pub struct CombinationOracle {
    inner: Arc<OracleInner>,
}

impl std::fmt::Debug for CombinationOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("CombinationOracle")
            .field("memo", &state.memo.len())
            .field("inflight", &state.inflight.len())
            .finish_non_exhaustive()
    }
}

/// Removes the in-flight entry when the computation settles or is dropped.
struct SettleGuard {
    inner: Arc<OracleInner>,
    key: CombinationKey,
    id: u64,
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        // A newer flight may already own the key.
        if state.inflight.get(&self.key).is_some_and(|f| f.id == self.id) {
            state.inflight.remove(&self.key);
        }
    }
}

impl CombinationOracle {
    /// Build an oracle, loading the memo from `store` (corrupt blobs are
    /// quarantined and replaced by an empty memo).
    pub async fn load(
        source: Arc<dyn CombinationSource>,
        store: JsonStore,
        bank: SharedBank,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        memo_key: String,
    ) -> Self {
        let blob: MemoBlob = store.load_or_default(&memo_key).await;
        let rng = ChaCha20Rng::seed_from_u64(policy.jitter_seed);
        let state = OracleState {
            memo: blob.into_iter().collect(),
            ..OracleState::default()
        };
        Self {
            inner: Arc::new(OracleInner {
                source,
                store,
                memo_key,
                bank,
                clock,
                policy,
                rng: Mutex::new(rng),
                state: Mutex::new(state),
            }),
        }
    }

    /// Combine two elements. Never fails: transport trouble comes back as
    /// [`CombinationOutcome::Transient`].
    pub async fn combine(&self, a: &Element, b: &Element) -> CombinationOutcome {
        self.combine_names(a.name(), b.name()).await
    }

    /// Combine by display name.
    pub async fn combine_names(&self, a: &str, b: &str) -> CombinationOutcome {
        let key = CombinationKey::new(a, b);
        let pending = {
            let mut state = self.inner.lock_state();
            if let Some(entry) = state.memo.get(&key) {
                return self.inner.from_memo(entry.as_ref(), a, b);
            }
            let live: Option<InflightCombine> =
                state.inflight.get(&key).and_then(|f| f.handle.upgrade());
            if let Some(existing) = live {
                Err(existing)
            } else {
                state.next_flight += 1;
                let id = state.next_flight;
                let compute = Arc::clone(&self.inner)
                    .compute(key.clone(), id, a.to_string(), b.to_string())
                    .boxed()
                    .shared();
                if let Some(handle) = compute.downgrade() {
                    state.inflight.insert(key, Flight { id, handle });
                }
                Ok(compute)
            }
        };
        match pending {
            Ok(leader) => leader.await,
            Err(follower) => follower.await.as_joined(),
        }
    }

    /// Memoised outcome for a pair, if any: `Some(None)` means "does not combine".
    #[must_use]
    pub fn lookup(&self, a: &str, b: &str) -> Option<Option<MemoEntry>> {
        self.inner
            .lock_state()
            .memo
            .get(&CombinationKey::new(a, b))
            .cloned()
    }

    #[must_use]
    pub fn memo_len(&self) -> usize {
        self.inner.lock_state().memo.len()
    }

    /// Pairs with a computation some caller is still waiting on.
    #[must_use]
    pub fn inflight_len(&self) -> usize {
        self.inner
            .lock_state()
            .inflight
            .values()
            .filter(|f| f.handle.upgrade().is_some())
            .count()
    }

    /// Snapshot of the memo in persisted form.
    #[must_use]
    pub fn memo_snapshot(&self) -> MemoBlob {
        self.inner.memo_blob().1
    }

    /// Write the memo if it has unpersisted changes. Returns whether the
    /// stored blob is now current.
    pub async fn flush(&self) -> bool {
        // A background write can supersede ours; the retry queues behind it.
        for _ in 0..FLUSH_ATTEMPTS {
            if self.inner.is_persisted() || self.inner.persist().await {
                return true;
            }
        }
        self.inner.is_persisted()
    }

    #[must_use]
    pub fn memo_key(&self) -> &str {
        &self.inner.memo_key
    }
}

impl OracleInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, OracleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn from_memo(&self, entry: Option<&MemoEntry>, a: &str, b: &str) -> CombinationOutcome {
        match entry {
            Some(entry) => CombinationOutcome::Product {
                element: Element::combined(
                    &entry.name,
                    &entry.glyph,
                    [a, b],
                    false,
                    self.clock.now(),
                ),
                cached: true,
                first_discovery: false,
            },
            None => CombinationOutcome::Blocked { cached: true },
        }
    }

    async fn compute(
        self: Arc<Self>,
        key: CombinationKey,
        id: u64,
        a: String,
        b: String,
    ) -> CombinationOutcome {
        let _settle = SettleGuard {
            inner: Arc::clone(&self),
            key: key.clone(),
            id,
        };
        match self.call_source(&a, &b).await {
            Ok(reply) => {
                let name = self.display_name_for(&reply.name);
                let element = Element::combined(
                    &name,
                    &reply.glyph,
                    [&a, &b],
                    reply.is_global_first_discovery,
                    self.clock.now(),
                );
                self.remember(
                    key,
                    Some(MemoEntry {
                        name: element.name().to_string(),
                        glyph: element.glyph().to_string(),
                    }),
                );
                Arc::clone(&self).schedule_persist();
                CombinationOutcome::Product {
                    element,
                    cached: false,
                    first_discovery: reply.is_global_first_discovery,
                }
            }
            Err(SourceError::PermanentNone) => {
                self.remember(key, None);
                Arc::clone(&self).schedule_persist();
                CombinationOutcome::Blocked { cached: false }
            }
            Err(SourceError::Transient(reason)) => CombinationOutcome::Transient { reason },
        }
    }

    async fn call_source(&self, a: &str, b: &str) -> Result<SourceReply, SourceError> {
        match tokio::time::timeout(self.policy.budget(), self.call_with_retry(a, b)).await {
            Ok(result) => result,
            Err(_) => {
                log::warn!("{LOG_SOURCE_EXHAUSTED}: {a} + {b} exceeded the source budget");
                Err(SourceError::Transient("combination budget exceeded".to_string()))
            }
        }
    }

    async fn call_with_retry(&self, a: &str, b: &str) -> Result<SourceReply, SourceError> {
        let mut retry = 0;
        loop {
            match self.source.combine(a, b).await {
                Err(SourceError::Transient(reason)) => {
                    if retry >= self.policy.max_retries {
                        log::warn!(
                            "{LOG_SOURCE_EXHAUSTED}: {a} + {b} failed after {} attempts: {reason}",
                            retry + 1
                        );
                        return Err(SourceError::Transient(reason));
                    }
                    let delay = {
                        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
                        self.policy.delay_for(retry, &mut *rng)
                    };
                    log::debug!(
                        "{LOG_SOURCE_RETRY}: {a} + {b} attempt {} failed ({reason}); retrying in {delay:?}",
                        retry + 1
                    );
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                settled => return settled,
            }
        }
    }

    /// First-seen casing: the bank wins, then any memoised product.
    fn display_name_for(&self, reported: &str) -> String {
        let canonical = canonical_name(reported);
        if let Some(known) = self
            .bank
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&canonical)
        {
            return known.name().to_string();
        }
        self.lock_state()
            .memo
            .values()
            .flatten()
            .find(|entry| canonical_name(&entry.name) == canonical)
            .map_or_else(|| reported.trim().to_string(), |entry| entry.name.clone())
    }

    fn is_persisted(&self) -> bool {
        let state = self.lock_state();
        state.persisted >= state.version
    }

    fn remember(&self, key: CombinationKey, entry: Option<MemoEntry>) {
        let mut state = self.lock_state();
        state.memo.insert(key, entry);
        state.version += 1;
    }

    fn memo_blob(&self) -> (u64, MemoBlob) {
        let state = self.lock_state();
        let blob = state
            .memo
            .iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        (state.version, blob)
    }

    fn schedule_persist(self: Arc<Self>) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    self.persist().await;
                });
            }
            Err(_) => log::debug!("no async runtime; memo will be written on the next flush"),
        }
    }

    async fn persist(&self) -> bool {
        let (version, blob) = self.memo_blob();
        match self.store.save(&self.memo_key, &blob).await {
            Ok(WriteOutcome::Written) => {
                let mut state = self.lock_state();
                state.persisted = state.persisted.max(version);
                state.persisted >= state.version
            }
            Ok(WriteOutcome::Superseded) => false,
            Err(err) => {
                log::warn!("{LOG_MEMO_PERSIST_FAILED}: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::DiscoveryBank;
    use crate::clock::ManualClock;
    use crate::source::{ScriptedSource, SourceReply};
    use crate::storage::{KeyValueStore, MemoryStore};
    use chrono::NaiveDate;

    struct Fixture {
        oracle: CombinationOracle,
        source: Arc<ScriptedSource>,
        memory: Arc<MemoryStore>,
        bank: SharedBank,
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay_ms: 10,
            ..RetryPolicy::default()
        }
    }

    async fn fixture(source: ScriptedSource) -> Fixture {
        fixture_with(source, Arc::new(MemoryStore::new())).await
    }

    async fn fixture_with(source: ScriptedSource, memory: Arc<MemoryStore>) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_date(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        ));
        let store = JsonStore::new(memory.clone(), "alchemy", clock.clone());
        let bank: SharedBank = Arc::new(Mutex::new(DiscoveryBank::new(clock.now())));
        let source = Arc::new(source);
        let oracle = CombinationOracle::load(
            source.clone(),
            store,
            bank.clone(),
            clock,
            fast_policy(),
            "alchemy_combination_cache".to_string(),
        )
        .await;
        Fixture {
            oracle,
            source,
            memory,
            bank,
        }
    }

    fn steam() -> SourceReply {
        SourceReply::new("Steam", "💨", false)
    }

    #[tokio::test]
    async fn canonical_and_cached_after_first_call() {
        let fx = fixture(ScriptedSource::new().always("fire", "water", steam())).await;
        let first = fx.oracle.combine_names("Fire", "Water").await;
        let second = fx.oracle.combine_names("water", "FIRE").await;
        assert!(!first.is_cached());
        assert!(second.is_cached());
        assert_eq!(first.product().unwrap().id(), second.product().unwrap().id());
        assert_eq!(fx.source.calls(), 1);
        assert_eq!(
            fx.oracle.lookup("fire", "water"),
            Some(Some(MemoEntry {
                name: "Steam".into(),
                glyph: "💨".into()
            }))
        );
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_source_call() {
        let source = ScriptedSource::new()
            .with_latency(Duration::from_millis(20))
            .always("fire", "water", steam());
        let fx = fixture(source).await;
        let (a, b, c) = tokio::join!(
            fx.oracle.combine_names("Fire", "Water"),
            fx.oracle.combine_names("Water", "Fire"),
            fx.oracle.combine_names("fire", "water"),
        );
        assert_eq!(fx.source.calls(), 1);
        assert!(!a.is_cached());
        assert!(b.is_cached() && c.is_cached());
        for outcome in [&a, &b, &c] {
            assert_eq!(outcome.product().unwrap().name(), "Steam");
        }
        assert_eq!(fx.oracle.inflight_len(), 0);
    }

    #[tokio::test]
    async fn permanent_none_is_cached() {
        let fx = fixture(ScriptedSource::new()).await;
        let first = fx.oracle.combine_names("Fire", "Fire").await;
        assert_eq!(first, CombinationOutcome::Blocked { cached: false });
        let second = fx.oracle.combine_names("fire", "FIRE").await;
        assert_eq!(second, CombinationOutcome::Blocked { cached: true });
        assert_eq!(fx.source.calls(), 1);
        assert_eq!(fx.oracle.lookup("fire", "fire"), Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_then_succeed() {
        let source = ScriptedSource::new().script(
            "air",
            "water",
            [
                Err(SourceError::Transient("503".into())),
                Err(SourceError::Transient("503".into())),
                Err(SourceError::Transient("timeout".into())),
                Ok(SourceReply::new("Mist", "🌫", true)),
            ],
        );
        let fx = fixture(source).await;
        let started = tokio::time::Instant::now();
        let outcome = fx.oracle.combine_names("Air", "Water").await;
        assert_eq!(fx.source.calls(), 4);
        match outcome {
            CombinationOutcome::Product {
                element,
                first_discovery,
                cached,
            } => {
                assert_eq!(element.name(), "Mist");
                assert!(first_discovery && element.is_first_discovery());
                assert!(!cached);
            }
            other => panic!("unexpected {other:?}"),
        }
        // 10 + 20 + 40 ms nominal, each within ±20%.
        assert!(started.elapsed() >= Duration::from_millis(56));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_memo_untouched() {
        let source = ScriptedSource::new().script(
            "earth",
            "fire",
            [Err(SourceError::Transient("offline".into()))],
        );
        let fx = fixture(source).await;
        let outcome = fx.oracle.combine_names("Earth", "Fire").await;
        assert!(matches!(outcome, CombinationOutcome::Transient { .. }));
        assert!(outcome.result().is_none());
        assert_eq!(fx.source.calls(), 4);
        assert_eq!(fx.oracle.lookup("earth", "fire"), None);
        assert_eq!(fx.oracle.memo_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn overall_budget_caps_slow_sources() {
        let source = ScriptedSource::new()
            .with_latency(Duration::from_secs(20))
            .always("fire", "water", steam());
        let fx = fixture(source).await;
        let outcome = fx.oracle.combine_names("Fire", "Water").await;
        assert!(matches!(outcome, CombinationOutcome::Transient { .. }));
        assert_eq!(fx.oracle.memo_len(), 0);
    }

    #[tokio::test]
    async fn memo_persists_and_reloads() {
        let memory = Arc::new(MemoryStore::new());
        let fx = fixture_with(
            ScriptedSource::new().always("fire", "water", steam()),
            memory.clone(),
        )
        .await;
        fx.oracle.combine_names("Fire", "Water").await;
        fx.oracle.combine_names("Fire", "Fire").await;
        assert!(fx.oracle.flush().await);
        let raw = fx
            .memory
            .get("alchemy_combination_cache")
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["fire|water"]["name"], "Steam");
        assert!(value["fire|fire"].is_null());

        let reloaded = fixture_with(ScriptedSource::new(), memory).await;
        let outcome = reloaded.oracle.combine_names("Water", "Fire").await;
        assert!(outcome.is_cached());
        assert_eq!(outcome.product().unwrap().name(), "Steam");
        assert_eq!(reloaded.source.calls(), 0);
    }

    #[tokio::test]
    async fn display_casing_follows_first_seen_form() {
        let source = ScriptedSource::new().always("fire", "water", SourceReply::new("STEAM", "💨", false));
        let fx = fixture(source).await;
        fx.bank.lock().unwrap().add(
            Element::combined("Steam", "💨", ["Fire", "Water"], false, chrono::Utc::now()),
            chrono::Utc::now(),
        );
        let outcome = fx.oracle.combine_names("fire", "water").await;
        assert_eq!(outcome.product().unwrap().name(), "Steam");
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_combine_is_dropped_and_retried_fresh() {
        let source = ScriptedSource::new()
            .with_latency(Duration::from_secs(1))
            .always("fire", "water", steam());
        let fx = fixture(source).await;
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            fx.oracle.combine_names("Fire", "Water"),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(fx.oracle.inflight_len(), 0);
        assert!(fx.oracle.inner.lock_state().inflight.is_empty());

        // Past the original budget deadline.
        tokio::time::sleep(Duration::from_secs(20)).await;
        let outcome = fx.oracle.combine_names("Fire", "Water").await;
        assert_eq!(outcome.product().unwrap().name(), "Steam");
        assert!(!outcome.is_cached());
        assert_eq!(fx.source.calls(), 2);
        assert_eq!(fx.oracle.inflight_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn follower_keeps_the_flight_alive_after_the_leader_leaves() {
        let source = ScriptedSource::new()
            .with_latency(Duration::from_millis(100))
            .always("fire", "water", steam());
        let fx = fixture(source).await;
        let leader = tokio::time::timeout(
            Duration::from_millis(10),
            fx.oracle.combine_names("Fire", "Water"),
        );
        let follower = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            fx.oracle.combine_names("Water", "Fire").await
        };
        let (abandoned, joined) = tokio::join!(leader, follower);
        assert!(abandoned.is_err());
        assert_eq!(joined.product().unwrap().name(), "Steam");
        assert!(joined.is_cached());
        assert_eq!(fx.source.calls(), 1);
        assert_eq!(fx.oracle.inflight_len(), 0);
    }

    #[test]
    fn backoff_grows_within_jitter() {
        let policy = RetryPolicy::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        for (retry, nominal) in [(0_u32, 250_u64), (1, 500), (2, 1_000)] {
            let delay = policy.delay_for(retry, &mut rng).as_millis();
            let low = u128::from(nominal) * 8 / 10;
            let high = u128::from(nominal) * 12 / 10;
            assert!((low..=high).contains(&delay), "{delay} outside {low}..={high}");
        }
    }
}
