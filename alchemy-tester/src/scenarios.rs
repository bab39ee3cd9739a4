//! Scenario catalog: end-to-end engine runs with deterministic sources.

use anyhow::{Result, bail, ensure};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use alchemy_game::constants::NO_COMBINATION_MESSAGE;
use alchemy_game::{
    AlchemyEngine, CombinationSource, EngineConfig, EngineContext, EngineError, ManualClock,
    PuzzleDefinition, PuzzleSource, RetryPolicy, RuleTableSource, ScriptedSource, SessionPhase,
    SolutionStep, SourceError, SourceReply, StaticPuzzleSource, TieredStorage,
};

/// Per-iteration inputs.
#[derive(Debug, Clone)]
pub struct ScenarioCtx {
    pub seed: u64,
    pub storage: Arc<TieredStorage>,
    pub verbose: bool,
}

impl ScenarioCtx {
    /// Puzzle date for this seed, within the first four weeks after launch.
    pub fn puzzle_date(&self) -> NaiveDate {
        let offset = i64::try_from(self.seed % 28).unwrap_or(0);
        EngineConfig::default().launch_date + Duration::days(offset)
    }

    fn engine_context(
        &self,
        source: Arc<dyn CombinationSource>,
        puzzles: Arc<dyn PuzzleSource>,
        clock: Arc<ManualClock>,
    ) -> EngineContext {
        let config = EngineConfig {
            retry: RetryPolicy {
                base_delay_ms: 5,
                jitter_seed: self.seed,
                ..RetryPolicy::default()
            },
            ..EngineConfig::default()
        };
        EngineContext::new(Arc::clone(&self.storage), source, puzzles, clock).with_config(config)
    }
}

#[async_trait]
pub trait Scenario: Send + Sync {
    fn key(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn run(&self, ctx: &ScenarioCtx) -> Result<()>;
}

pub fn catalog() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(ColdCombine),
        Box::new(WarmMemo),
        Box::new(SingleFlight),
        Box::new(BlockedPair),
        Box::new(TransientRetry),
        Box::new(StreakTrajectory),
        Box::new(DailySolve),
    ]
}

pub fn get_scenario(name: &str) -> Option<Box<dyn Scenario>> {
    let name = name.to_lowercase();
    catalog().into_iter().find(|s| s.key() == name)
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    catalog()
        .iter()
        .map(|s| (s.key(), s.description()))
        .collect()
}

fn cloud_puzzle() -> PuzzleDefinition {
    PuzzleDefinition {
        number: 0,
        target: "Cloud".into(),
        target_glyph: "☁️".into(),
        par_moves: 2,
        time_limit_seconds: None,
        hints: 2,
        hint_costs_move: true,
        solution_path: vec![
            SolutionStep {
                from: ["Fire".into(), "Water".into()],
                result: "Steam".into(),
            },
            SolutionStep {
                from: ["Steam".into(), "Air".into()],
                result: "Cloud".into(),
            },
        ],
    }
}

fn cloud_source() -> ScriptedSource {
    ScriptedSource::new()
        .always("fire", "water", SourceReply::new("Steam", "♨️", false))
        .always("steam", "air", SourceReply::new("Cloud", "☁️", false))
}

struct Rig {
    engine: AlchemyEngine,
    source: Arc<ScriptedSource>,
    clock: Arc<ManualClock>,
}

async fn rig(ctx: &ScenarioCtx, source: ScriptedSource) -> Rig {
    let source = Arc::new(source);
    let clock = Arc::new(ManualClock::at_date(ctx.puzzle_date()));
    let engine = AlchemyEngine::load(ctx.engine_context(
        source.clone(),
        Arc::new(StaticPuzzleSource::new(vec![cloud_puzzle()])),
        clock.clone(),
    ))
    .await;
    Rig {
        engine,
        source,
        clock,
    }
}

async fn play_pair(engine: &AlchemyEngine, a: &str, b: &str) -> alchemy_game::Result<()> {
    engine.select_element(a).await?;
    engine.select_element(b).await?;
    engine.combine_selected().await.map(|_| ())
}

async fn open_and_start(engine: &AlchemyEngine, date: NaiveDate) -> Result<()> {
    engine.open_puzzle(&date.to_string()).await?;
    engine.start_game().await?;
    Ok(())
}

struct ColdCombine;

#[async_trait]
impl Scenario for ColdCombine {
    fn key(&self) -> &'static str {
        "cold-combine"
    }

    fn description(&self) -> &'static str {
        "First combination of a pair reaches the source once and lands in the bank"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let rig = rig(ctx, cloud_source()).await;
        open_and_start(&rig.engine, ctx.puzzle_date()).await?;
        play_pair(&rig.engine, "Fire", "Water").await?;

        let Some(state) = rig.engine.state() else {
            bail!("session vanished after combining");
        };
        ensure!(rig.source.calls() == 1, "source called {} times", rig.source.calls());
        ensure!(state.moves == 1, "expected 1 move, got {}", state.moves);
        let cached = state.last_result.as_ref().map(|r| r.cached);
        ensure!(cached == Some(false), "cold result reported cached={cached:?}");
        ensure!(
            rig.engine.bank().lock().is_ok_and(|b| b.contains("steam")),
            "steam missing from the bank"
        );
        Ok(())
    }
}

struct WarmMemo;

#[async_trait]
impl Scenario for WarmMemo {
    fn key(&self) -> &'static str {
        "warm-memo"
    }

    fn description(&self) -> &'static str {
        "A pair answered in an earlier run is served from the persisted memo"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let first = rig(ctx, cloud_source()).await;
        open_and_start(&first.engine, ctx.puzzle_date()).await?;
        play_pair(&first.engine, "Fire", "Water").await?;
        ensure!(first.engine.flush().await, "memo flush failed");

        // Any call into this source would come back as "does not combine".
        let second = rig(ctx, ScriptedSource::new()).await;
        second.engine.open_puzzle(&ctx.puzzle_date().to_string()).await?;
        play_pair(&second.engine, "Water", "Fire").await?;

        ensure!(second.source.calls() == 0, "memo miss reached the source");
        let result = second.engine.state().and_then(|s| s.last_result);
        ensure!(
            result.as_ref().is_some_and(|r| r.cached
                && r.product.as_ref().is_some_and(|p| p.name() == "Steam")),
            "expected cached Steam, got {result:?}"
        );
        Ok(())
    }
}

struct SingleFlight;

#[async_trait]
impl Scenario for SingleFlight {
    fn key(&self) -> &'static str {
        "single-flight"
    }

    fn description(&self) -> &'static str {
        "Concurrent requests for the same pair share one source call"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let source = cloud_source().with_latency(StdDuration::from_millis(40));
        let rig = rig(ctx, source).await;
        let other = rig.engine.companion();
        let date = ctx.puzzle_date().to_string();
        rig.engine.open_puzzle(&date).await?;
        other.open_puzzle(&date).await?;
        rig.engine.start_game().await?;
        other.start_game().await?;
        for engine in [&rig.engine, &other] {
            engine.select_element("Fire").await?;
            engine.select_element("Water").await?;
        }

        let (a, b) = tokio::join!(rig.engine.combine_selected(), other.combine_selected());
        a?;
        b?;
        ensure!(
            rig.source.calls() == 1,
            "expected one source call, saw {}",
            rig.source.calls()
        );
        ensure!(rig.engine.oracle().inflight_len() == 0, "in-flight entry leaked");
        Ok(())
    }
}

struct BlockedPair;

#[async_trait]
impl Scenario for BlockedPair {
    fn key(&self) -> &'static str {
        "blocked-pair"
    }

    fn description(&self) -> &'static str {
        "A pair with no product costs a move and leaves the bank untouched"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let rig = rig(ctx, cloud_source()).await;
        open_and_start(&rig.engine, ctx.puzzle_date()).await?;
        let before = rig.engine.bank().lock().map(|b| b.len()).unwrap_or(0);
        play_pair(&rig.engine, "Fire", "Earth").await?;

        let Some(state) = rig.engine.state() else {
            bail!("session vanished after combining");
        };
        let after = rig.engine.bank().lock().map(|b| b.len()).unwrap_or(0);
        ensure!(before == after, "bank grew from {before} to {after}");
        ensure!(state.moves == 1, "expected 1 move, got {}", state.moves);
        ensure!(
            state.combination_error.as_deref() == Some(NO_COMBINATION_MESSAGE),
            "unexpected error {:?}",
            state.combination_error
        );
        ensure!(
            rig.engine.oracle().lookup("earth", "fire") == Some(None),
            "blocked pair not memoised"
        );
        Ok(())
    }
}

struct TransientRetry;

#[async_trait]
impl Scenario for TransientRetry {
    fn key(&self) -> &'static str {
        "transient-retry"
    }

    fn description(&self) -> &'static str {
        "Transient source failures are retried; exhausted retries charge nothing"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let flaky = || Err(SourceError::Transient("503".into()));
        let source = ScriptedSource::new()
            .script(
                "fire",
                "water",
                [flaky(), flaky(), Ok(SourceReply::new("Steam", "♨️", false))],
            )
            .script("earth", "air", [flaky()]);
        let rig = rig(ctx, source).await;
        open_and_start(&rig.engine, ctx.puzzle_date()).await?;

        play_pair(&rig.engine, "Fire", "Water").await?;
        ensure!(rig.source.calls() == 3, "expected 3 calls, saw {}", rig.source.calls());

        match play_pair(&rig.engine, "Earth", "Air").await {
            Err(EngineError::SourceTransient(_)) => {}
            other => bail!("expected a transient failure, got {other:?}"),
        }
        ensure!(rig.source.calls() == 7, "expected 4 more calls, saw {}", rig.source.calls() - 3);
        let moves = rig.engine.state().map_or(0, |s| s.moves);
        ensure!(moves == 1, "failed combine was charged (moves {moves})");
        ensure!(
            rig.engine.oracle().lookup("earth", "air").is_none(),
            "transient failure was memoised"
        );
        Ok(())
    }
}

struct StreakTrajectory;

#[async_trait]
impl Scenario for StreakTrajectory {
    fn key(&self) -> &'static str {
        "streak-trajectory"
    }

    fn description(&self) -> &'static str {
        "Consecutive daily wins build a streak; a skipped day resets it"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let rig = rig(ctx, cloud_source()).await;
        let start = ctx.puzzle_date();
        let mut expected = Vec::new();
        let mut played = 0;
        for (offset, streak) in [(0, 1), (1, 2), (3, 1)] {
            rig.clock.advance(Duration::days(offset - played));
            played = offset;
            let date = start + Duration::days(offset);
            open_and_start(&rig.engine, date).await?;
            play_pair(&rig.engine, "Fire", "Water").await?;
            play_pair(&rig.engine, "Steam", "Air").await?;
            ensure!(
                rig.engine.phase() == Some(SessionPhase::Admire),
                "{date}: target not reached"
            );
            let stats = rig.engine.stats().await;
            expected.push(streak);
            if ctx.verbose {
                println!("     {date}: streak {}", stats.current_streak);
            }
            ensure!(
                stats.current_streak == streak,
                "{date}: streak {} (expected trajectory {expected:?})",
                stats.current_streak
            );
        }
        let stats = rig.engine.stats().await;
        ensure!(stats.longest_streak == 2, "longest {}", stats.longest_streak);
        ensure!(stats.total_completed == 3, "total {}", stats.total_completed);
        Ok(())
    }
}

struct DailySolve;

#[async_trait]
impl Scenario for DailySolve {
    fn key(&self) -> &'static str {
        "daily-solve"
    }

    fn description(&self) -> &'static str {
        "Solve a bundled daily puzzle from its reference path and share it"
    }

    async fn run(&self, ctx: &ScenarioCtx) -> Result<()> {
        let date = ctx.puzzle_date();
        let puzzles = Arc::new(StaticPuzzleSource::bundled());
        let engine = AlchemyEngine::load(ctx.engine_context(
            Arc::new(RuleTableSource::bundled()),
            puzzles.clone(),
            Arc::new(ManualClock::at_date(date)),
        ))
        .await;

        let iso = date.to_string();
        let number = engine.puzzle_clock().puzzle_number_for_date(&iso)?;
        let puzzle = puzzles.get_puzzle_for_date(date, number).await?;
        open_and_start(&engine, date).await?;
        for step in &puzzle.solution_path {
            play_pair(&engine, &step.from[0], &step.from[1]).await?;
        }

        ensure!(
            engine.phase() == Some(SessionPhase::Admire),
            "{} not reached by its own solution",
            puzzle.target
        );
        let share = engine.get_share_text()?;
        if ctx.verbose {
            println!("{share}");
        }
        ensure!(
            share.starts_with(&format!("Daily Alchemy #{number} ")),
            "bad share header: {share}"
        );
        ensure!(
            share.lines().any(|line| line.contains("➡️")),
            "share text has no path: {share}"
        );
        Ok(())
    }
}
