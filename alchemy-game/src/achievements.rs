//! Threshold achievements derived from [`AggregateStats`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::constants::LOG_ACHIEVEMENT;
use crate::stats::AggregateStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    Streak,
    Total,
    Perfect,
    FirstDiscovery,
}

impl AchievementKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Streak => "streak",
            Self::Total => "total",
            Self::Perfect => "perfect",
            Self::FirstDiscovery => "first_discovery",
        }
    }

    /// The stat compared against this kind's thresholds.
    #[must_use]
    pub const fn measure(self, stats: &AggregateStats) -> u32 {
        match self {
            Self::Streak => stats.longest_streak,
            Self::Total => stats.total_completed,
            Self::Perfect => stats.perfect_solves,
            Self::FirstDiscovery => stats.first_discoveries,
        }
    }
}

impl fmt::Display for AchievementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unlocked threshold, e.g. `streak_7`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: String,
    pub kind: AchievementKind,
    pub threshold: u32,
}

impl Achievement {
    #[must_use]
    pub fn new(kind: AchievementKind, threshold: u32) -> Self {
        Self {
            id: format!("{kind}_{threshold}"),
            kind,
            threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AchievementThresholds {
    pub streak: Vec<u32>,
    pub total: Vec<u32>,
    pub perfect: Vec<u32>,
    pub first_discoveries: Vec<u32>,
}

impl Default for AchievementThresholds {
    fn default() -> Self {
        Self {
            streak: vec![3, 7, 14, 30, 100],
            total: vec![1, 10, 25, 50, 100],
            perfect: vec![1, 10],
            first_discoveries: vec![1, 10, 50],
        }
    }
}

impl AchievementThresholds {
    fn for_kind(&self, kind: AchievementKind) -> &[u32] {
        match kind {
            AchievementKind::Streak => &self.streak,
            AchievementKind::Total => &self.total,
            AchievementKind::Perfect => &self.perfect,
            AchievementKind::FirstDiscovery => &self.first_discoveries,
        }
    }

    /// Every achievement `stats` currently qualifies for.
    #[must_use]
    pub fn reached(&self, stats: &AggregateStats) -> Vec<Achievement> {
        [
            AchievementKind::Streak,
            AchievementKind::Total,
            AchievementKind::Perfect,
            AchievementKind::FirstDiscovery,
        ]
        .into_iter()
        .flat_map(|kind| {
            let value = kind.measure(stats);
            self.for_kind(kind)
                .iter()
                .filter(move |threshold| value >= **threshold)
                .map(move |threshold| Achievement::new(kind, *threshold))
        })
        .collect()
    }
}

/// Persisted set of unlocked achievement ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnlockedAchievements {
    ids: BTreeSet<String>,
}

impl UnlockedAchievements {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Mark newly reached thresholds as unlocked and return only those.
    pub fn check(
        &mut self,
        stats: &AggregateStats,
        thresholds: &AchievementThresholds,
    ) -> Vec<Achievement> {
        thresholds
            .reached(stats)
            .into_iter()
            .filter(|achievement| self.ids.insert(achievement.id.clone()))
            .inspect(|achievement| log::info!("{LOG_ACHIEVEMENT}: {}", achievement.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_follow_kind_and_threshold() {
        assert_eq!(Achievement::new(AchievementKind::Streak, 7).id, "streak_7");
        assert_eq!(
            Achievement::new(AchievementKind::FirstDiscovery, 1).id,
            "first_discovery_1"
        );
    }

    #[test]
    fn unlocks_are_one_shot() {
        let thresholds = AchievementThresholds::default();
        let mut unlocked = UnlockedAchievements::default();
        let mut stats = AggregateStats {
            total_completed: 1,
            longest_streak: 3,
            ..AggregateStats::default()
        };
        let first: Vec<_> = unlocked
            .check(&stats, &thresholds)
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(first, vec!["streak_3", "total_1"]);
        assert!(unlocked.check(&stats, &thresholds).is_empty());

        stats.perfect_solves = 1;
        let next = unlocked.check(&stats, &thresholds);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].kind, AchievementKind::Perfect);
        assert_eq!(unlocked.len(), 3);
    }

    #[test]
    fn serializes_as_plain_id_array() {
        let mut unlocked = UnlockedAchievements::default();
        let stats = AggregateStats {
            total_completed: 10,
            ..AggregateStats::default()
        };
        unlocked.check(&stats, &AchievementThresholds::default());
        let json = serde_json::to_string(&unlocked).unwrap();
        assert_eq!(json, r#"["total_1","total_10"]"#);
        let back: UnlockedAchievements = serde_json::from_str(&json).unwrap();
        assert!(back.contains("total_10"));
    }
}
