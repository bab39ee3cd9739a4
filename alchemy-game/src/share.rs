//! Share text for a finished puzzle.
//!
//! The layout is consumed by pattern matchers in the wild, so it only ever
//! gains lines at the end:
//!
//! ```text
//! Daily Alchemy #12 🧪
//! ⏱️ 2:05 | 🔁 5 moves (par 4)
//! 🌟 1 first discovery
//! 🔥➕💧➡️♨️
//! ♨️➕💨➡️☁️
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use crate::constants::{SHARE_MAX_PATH_LINES, SHARE_TITLE};
use crate::names::canonical_name;
use crate::session::{CombinationStep, SessionState};

/// Everything the share text is built from.
#[derive(Debug, Clone, Copy)]
pub struct ShareInput<'a> {
    pub puzzle_number: u32,
    pub elapsed_seconds: u32,
    pub moves: u32,
    pub par_moves: u32,
    pub first_discoveries: u32,
    pub hints_used: u32,
    /// Only the steps leading to the target, in play order.
    pub winning_path: &'a [&'a CombinationStep],
}

/// `m:ss`, minutes unbounded.
#[must_use]
pub fn format_elapsed(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// The steps of `path` that the target depends on, in play order. For each
/// product only its first production counts.
#[must_use]
pub fn winning_path<'a>(path: &'a [CombinationStep], target: &str) -> Vec<&'a CombinationStep> {
    let mut producer: HashMap<String, usize> = HashMap::new();
    for (index, step) in path.iter().enumerate() {
        producer.entry(canonical_name(&step.result)).or_insert(index);
    }

    let mut needed: HashSet<usize> = HashSet::new();
    let mut queue = vec![canonical_name(target)];
    while let Some(name) = queue.pop() {
        let Some(&index) = producer.get(&name) else {
            continue;
        };
        if needed.insert(index) {
            queue.extend(path[index].from.iter().map(|parent| canonical_name(parent)));
        }
    }

    let mut steps: Vec<usize> = needed.into_iter().collect();
    steps.sort_unstable();
    steps.into_iter().map(|index| &path[index]).collect()
}

fn plural(count: u32, one: &str, many: &str) -> String {
    if count == 1 {
        format!("{count} {one}")
    } else {
        format!("{count} {many}")
    }
}

/// Render the share text.
#[must_use]
pub fn encode(input: &ShareInput<'_>) -> String {
    let mut out = format!("{SHARE_TITLE} #{} 🧪\n", input.puzzle_number);
    let _ = write!(
        out,
        "⏱️ {} | 🔁 {} (par {})",
        format_elapsed(input.elapsed_seconds),
        plural(input.moves, "move", "moves"),
        input.par_moves
    );
    if input.hints_used > 0 {
        let _ = write!(out, " | 💡 {}", input.hints_used);
    }
    out.push('\n');
    if input.first_discoveries > 0 {
        let _ = writeln!(
            out,
            "🌟 {}",
            plural(input.first_discoveries, "first discovery", "first discoveries")
        );
    }

    let shown = input.winning_path.len().min(SHARE_MAX_PATH_LINES);
    for step in &input.winning_path[..shown] {
        let [a, b, product] = &step.glyphs;
        let _ = writeln!(out, "{a}➕{b}➡️{product}");
    }
    if input.winning_path.len() > shown {
        let _ = writeln!(out, "…+{}", input.winning_path.len() - shown);
    }
    out.truncate(out.trim_end().len());
    out
}

/// Share text for a session state.
#[must_use]
pub fn encode_session(state: &SessionState) -> String {
    let path = winning_path(&state.combination_path, state.target.name());
    encode(&ShareInput {
        puzzle_number: state.puzzle_number,
        elapsed_seconds: state.elapsed,
        moves: state.moves,
        par_moves: state.par_moves,
        first_discoveries: state.first_discoveries,
        hints_used: state.hints_used,
        winning_path: &path,
    })
}
