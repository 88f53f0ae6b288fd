use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// Threshold-awarded achievement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Badge {
    #[serde(rename = "streak3")]
    Streak3,
    #[serde(rename = "streak7")]
    Streak7,
    #[serde(rename = "points100")]
    Points100,
}

impl Badge {
    pub const ALL: [Badge; 3] = [Badge::Streak3, Badge::Streak7, Badge::Points100];

    /// Whether the badge's threshold is met by the given totals.
    pub fn earned(self, points: u32, streak: u32) -> bool {
        match self {
            Badge::Streak3 => streak >= 3,
            Badge::Streak7 => streak >= 7,
            Badge::Points100 => points >= 100,
        }
    }
}

impl fmt::Display for Badge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Badge::Streak3 => "3-day streak",
            Badge::Streak7 => "7-day streak",
            Badge::Points100 => "100+ points",
        };
        f.write_str(label)
    }
}

/// Derived productivity counters. A cache over the task list, never a source
/// of truth: [`recompute_stats`] rebuilds the whole value from scratch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Stats {
    pub points: u32,
    /// Consecutive days with at least one completion, ending at
    /// `last_completion_date` and counted backward.
    pub streak: u32,
    pub last_completion_date: Option<NaiveDate>,
    pub badges: BTreeSet<Badge>,
}

/// Rebuilds points, streak and badges from the complete task list.
///
/// A day listed in a task's own `exdates` contributes nothing even if it
/// lingers in `completed_dates`: the excluded occurrence is unreachable from
/// the day queries, so it is dropped from every account here as well.
pub fn recompute_stats(tasks: &[Task]) -> Stats {
    let mut completions: u32 = 0;
    let mut completed_days: BTreeSet<NaiveDate> = BTreeSet::new();

    for task in tasks {
        if task.is_instance_based() {
            for day in task.completed_dates.difference(&task.exdates) {
                completions += 1;
                completed_days.insert(*day);
            }
        } else if task.completed && !task.exdates.contains(&task.date) {
            completions += 1;
            completed_days.insert(task.date);
        }
    }

    let points = completions * 10;
    let last_completion_date = completed_days.iter().next_back().copied();

    let mut streak = 0;
    if let Some(last) = last_completion_date {
        let mut cursor = last;
        while completed_days.contains(&cursor) {
            streak += 1;
            let Some(previous) = cursor.pred_opt() else {
                break;
            };
            cursor = previous;
        }
    }

    let badges = Badge::ALL
        .into_iter()
        .filter(|badge| badge.earned(points, streak))
        .collect();

    Stats {
        points,
        streak,
        last_completion_date,
        badges,
    }
}
