use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Legacy recurrence cadence, superseded by [`Task::rrule`] when that is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Repeat {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// A single work item or recurring series definition.
///
/// Serialized camelCase so the persisted blob keeps the documented shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    /// Groups copies of the same task; equals `id` for an originating task.
    pub series_id: u64,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    /// Anchor day: the first possible occurrence, or the sole date for a
    /// non-recurring task.
    pub date: NaiveDate,
    /// Structured recurrence rule text. Kept raw so malformed text can exist
    /// at rest; it is parsed (and possibly demoted) at evaluation time.
    #[serde(default)]
    pub rrule: Option<String>,
    /// Days excluded from occurrence, whichever rule system is in use.
    #[serde(default)]
    pub exdates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub repeat: Repeat,
    /// Inclusive end of the legacy cadence.
    #[serde(default)]
    pub repeat_until: Option<NaiveDate>,
    /// Completion of a non-recurring task.
    #[serde(default)]
    pub completed: bool,
    /// Days on which a recurring task's occurrence was marked done.
    #[serde(default)]
    pub completed_dates: BTreeSet<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Completion is tracked per occurrence day rather than with one boolean.
    pub fn is_instance_based(&self) -> bool {
        self.rrule.is_some() || self.repeat != Repeat::None
    }

    pub fn is_completed_on(&self, date: NaiveDate) -> bool {
        if self.is_instance_based() {
            self.completed_dates.contains(&date)
        } else {
            self.completed
        }
    }
}

/// Input for creating a task. Unset fields take the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
    pub title: String,
    pub notes: String,
    pub date: NaiveDate,
    pub rrule: Option<String>,
    pub exdates: BTreeSet<NaiveDate>,
    pub repeat: Repeat,
    pub repeat_until: Option<NaiveDate>,
    /// Set by the copy operation to keep the new task in the source's series.
    pub series_id: Option<u64>,
}

/// Field-wise update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub notes: Option<String>,
    pub date: Option<NaiveDate>,
    /// Outer `Some` touches the rule (and clears the legacy cadence); the
    /// inner value is the new rule, or `None` to remove it.
    pub rrule: Option<Option<String>>,
    pub exdates: Option<BTreeSet<NaiveDate>>,
    pub repeat: Option<Repeat>,
    pub repeat_until: Option<Option<NaiveDate>>,
}

impl TaskPatch {
    pub(crate) fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = normalize_title(&title);
        }
        if let Some(notes) = self.notes {
            task.notes = notes;
        }
        if let Some(date) = self.date {
            task.date = date;
        }
        if let Some(exdates) = self.exdates {
            task.exdates = exdates;
        }
        if let Some(repeat) = self.repeat {
            task.repeat = repeat;
        }
        if let Some(repeat_until) = self.repeat_until {
            task.repeat_until = repeat_until;
        }
        // A structured rule supersedes the legacy cadence, even when the
        // patch also carried legacy fields.
        if let Some(rrule) = self.rrule {
            task.rrule = rrule;
            task.repeat = Repeat::None;
            task.repeat_until = None;
        }
    }
}

pub(crate) fn normalize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        "Untitled".to_string()
    } else {
        trimmed.to_string()
    }
}
