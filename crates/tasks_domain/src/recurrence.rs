//! Two-tier occurrence test: excluded days win, then the structured rule,
//! then the legacy cadence.

use chrono::{Datelike, NaiveDate};

use crate::rrule::RecurrenceRule;
use crate::task::{Repeat, Task};

/// Whether `task` is due on `date`.
///
/// Total over any task shape: a rule that fails to parse is logged and the
/// legacy cadence takes over, so callers never see an error.
pub fn occurs_on(task: &Task, date: NaiveDate) -> bool {
    if task.exdates.contains(&date) {
        return false;
    }
    if let Some(raw) = task.rrule.as_deref() {
        match RecurrenceRule::parse(raw) {
            Ok(rule) => return rule.occurs_on(task.date, date),
            Err(err) => {
                tracing::debug!(task = task.id, %err, "ignoring unparseable recurrence rule");
            }
        }
    }
    legacy_occurs_on(task, date)
}

fn legacy_occurs_on(task: &Task, date: NaiveDate) -> bool {
    if task.repeat == Repeat::None {
        return date == task.date;
    }
    if date < task.date || task.repeat_until.is_some_and(|until| date > until) {
        return false;
    }
    match task.repeat {
        Repeat::Daily => true,
        Repeat::Weekly => (date - task.date).num_days() % 7 == 0,
        // No month-length adjustment: anchored on the 31st simply never
        // matches shorter months.
        Repeat::Monthly => date.day() == task.date.day(),
        Repeat::None => false,
    }
}
