// src/progress.rs

//! # Completion Tracker
//!
//! Records which achievements, goals and steps have been completed during a
//! scan. Markers are structured keys rather than concatenated strings, so
//! `(1, 23)` and `(12, 3)` are always distinct identities.
//!
//! The log is append-only and ordered; a marker is stored at most once.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{HashMap, HashSet};

/// Position of a step inside the catalog: (achievement, goal, step).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepKey {
    pub achievement: usize,
    pub goal: usize,
    pub step: usize,
}

impl StepKey {
    pub fn new(achievement: usize, goal: usize, step: usize) -> Self {
        Self { achievement, goal, step }
    }
}

/// A record that one catalog node has been completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProgressMarker {
    Achievement(usize),
    Goal(usize, usize),
    Step(usize, usize, usize),
}

impl ProgressMarker {
    fn indices(&self) -> Vec<usize> {
        match *self {
            ProgressMarker::Achievement(j) => vec![j],
            ProgressMarker::Goal(j, k) => vec![j, k],
            ProgressMarker::Step(j, k, l) => vec![j, k, l],
        }
    }
}

impl From<StepKey> for ProgressMarker {
    fn from(key: StepKey) -> Self {
        ProgressMarker::Step(key.achievement, key.goal, key.step)
    }
}

// Markers travel as index arrays: [j], [j, k] or [j, k, l].
impl Serialize for ProgressMarker {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.indices().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProgressMarker {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let indices = Vec::<usize>::deserialize(deserializer)?;
        match indices.as_slice() {
            [j] => Ok(ProgressMarker::Achievement(*j)),
            [j, k] => Ok(ProgressMarker::Goal(*j, *k)),
            [j, k, l] => Ok(ProgressMarker::Step(*j, *k, *l)),
            other => Err(serde::de::Error::custom(format!(
                "progress marker must have 1 to 3 indices, got {}",
                other.len()
            ))),
        }
    }
}

/// Ordered, duplicate-free log of completion markers with per-parent tallies.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    log: Vec<ProgressMarker>,
    seen: HashSet<ProgressMarker>,
    steps_per_goal: HashMap<(usize, usize), usize>,
    goals_per_achievement: HashMap<usize, usize>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a tracker from a previously persisted log. Duplicates are dropped.
    pub fn from_markers<I: IntoIterator<Item = ProgressMarker>>(markers: I) -> Self {
        let mut tracker = Self::new();
        for marker in markers {
            tracker.mark_complete(marker);
        }
        tracker
    }

    /// Appends `marker` unless it is already present. Returns whether it was added.
    pub fn mark_complete(&mut self, marker: ProgressMarker) -> bool {
        if !self.seen.insert(marker) {
            return false;
        }
        match marker {
            ProgressMarker::Step(j, k, _) => *self.steps_per_goal.entry((j, k)).or_insert(0) += 1,
            ProgressMarker::Goal(j, _) => *self.goals_per_achievement.entry(j).or_insert(0) += 1,
            ProgressMarker::Achievement(_) => {}
        }
        self.log.push(marker);
        true
    }

    pub fn is_complete(&self, marker: ProgressMarker) -> bool {
        self.seen.contains(&marker)
    }

    pub fn count_steps_complete(&self, achievement: usize, goal: usize) -> usize {
        self.steps_per_goal.get(&(achievement, goal)).copied().unwrap_or(0)
    }

    pub fn count_goals_complete(&self, achievement: usize) -> usize {
        self.goals_per_achievement.get(&achievement).copied().unwrap_or(0)
    }

    pub fn markers(&self) -> &[ProgressMarker] {
        &self.log
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    pub fn into_markers(self) -> Vec<ProgressMarker> {
        self.log
    }
}
