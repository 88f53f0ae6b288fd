use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates;
use crate::notifications::{NotificationRequest, NotificationSink, PendingSummary};
use crate::recurrence::occurs_on;
use crate::report::{build_report, DailyReport};
use crate::stats::{recompute_stats, Stats};
use crate::storage::{PersistedState, StateStore};
use crate::task::{normalize_title, Task, TaskDraft, TaskPatch};

/// Failure surface of id-addressed operations. Nothing here panics; an
/// unknown id is an answer, not an exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown task id {0}")]
    TaskNotFound(u64),
}

/// Per-day counters behind the month calendar markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthDaySummary {
    pub date: NaiveDate,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

/// In-memory task collection plus the derived stats, with write-through
/// persistence and date-indexed queries built on the recurrence engine.
///
/// Mutations take the single write lock, so they are atomic with respect to
/// each other; a single-actor caller model is assumed throughout.
pub struct TaskService {
    state: RwLock<PersistedState>,
    storage: Option<Box<dyn StateStore>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
}

pub struct TaskServiceBuilder {
    storage: Option<Box<dyn StateStore>>,
    notification_sink: Option<Box<dyn NotificationSink>>,
}

impl TaskServiceBuilder {
    pub fn new() -> Self {
        Self {
            storage: None,
            notification_sink: None,
        }
    }

    pub fn with_storage(mut self, storage: Box<dyn StateStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_notification_sink(mut self, sink: Box<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    /// Loads persisted state when a store is configured. Stats are always
    /// recomputed from the loaded tasks; the stored value is only a cache.
    pub fn build(self) -> TaskService {
        let mut state = self
            .storage
            .as_ref()
            .map(|storage| storage.load())
            .unwrap_or_default();
        state.stats = recompute_stats(&state.tasks);
        TaskService {
            state: RwLock::new(state),
            storage: self.storage,
            notification_sink: self.notification_sink,
        }
    }
}

impl Default for TaskServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskService {
    pub fn builder() -> TaskServiceBuilder {
        TaskServiceBuilder::new()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.read().tasks.clone()
    }

    pub fn get_task(&self, id: u64) -> Option<Task> {
        self.state.read().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn stats(&self) -> Stats {
        self.state.read().stats.clone()
    }

    /// Tasks due on `date`, most recently touched first.
    pub fn tasks_on(&self, date: NaiveDate) -> Vec<Task> {
        let state = self.state.read();
        let mut due: Vec<Task> = state
            .tasks
            .iter()
            .filter(|task| occurs_on(task, date))
            .cloned()
            .collect();
        due.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        due
    }

    pub fn create_task(&self, draft: TaskDraft) -> u64 {
        self.mutate(|tasks| {
            let id = tasks.iter().map(|t| t.id).max().map_or(1, |max| max + 1);
            let now = Utc::now();
            let task = Task {
                id,
                series_id: draft.series_id.unwrap_or(id),
                title: normalize_title(&draft.title),
                notes: draft.notes,
                date: draft.date,
                rrule: draft.rrule,
                exdates: draft.exdates,
                repeat: draft.repeat,
                repeat_until: draft.repeat_until,
                completed: false,
                completed_dates: BTreeSet::new(),
                created_at: now,
                updated_at: now,
            };
            tracing::debug!(id, date = %task.date, "task created");
            // newest first, so `updated_at` ties in the day queries resolve
            // to the most recently created task
            tasks.insert(0, task);
            id
        })
    }

    pub fn update_task(&self, id: u64, patch: TaskPatch) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::TaskNotFound(id))?;
            patch.apply(task);
            task.updated_at = Utc::now();
            Ok(())
        })
    }

    /// New non-recurring task on `date` carrying the source's title, notes
    /// and series link.
    pub fn copy_to_date(&self, id: u64, date: NaiveDate) -> Result<u64, StoreError> {
        let source = self.get_task(id).ok_or(StoreError::TaskNotFound(id))?;
        Ok(self.create_task(TaskDraft {
            title: source.title,
            notes: source.notes,
            date,
            series_id: Some(source.series_id),
            ..TaskDraft::default()
        }))
    }

    pub fn delete_task(&self, id: u64) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            if tasks.len() == before {
                Err(StoreError::TaskNotFound(id))
            } else {
                Ok(())
            }
        })
    }

    /// Removes every task sharing the target's series.
    pub fn delete_series(&self, id: u64) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let series = tasks
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.series_id)
                .ok_or(StoreError::TaskNotFound(id))?;
            tasks.retain(|t| t.series_id != series);
            Ok(())
        })
    }

    /// Excludes one day from a recurring task instead of deleting the record.
    /// The day's completion, if any, stops counting on the next recompute.
    pub fn delete_occurrence(&self, id: u64, date: NaiveDate) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::TaskNotFound(id))?;
            task.exdates.insert(date);
            task.updated_at = Utc::now();
            Ok(())
        })
    }

    /// Flips completion: the sole boolean for a single task, the day's set
    /// membership for an instance-based one. Stats are rebuilt from the full
    /// list afterwards, never patched incrementally.
    pub fn toggle_complete(&self, id: u64, date: NaiveDate) -> Result<(), StoreError> {
        self.mutate(|tasks| {
            let task = tasks
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or(StoreError::TaskNotFound(id))?;
            if task.is_instance_based() {
                if !task.completed_dates.remove(&date) {
                    task.completed_dates.insert(date);
                }
            } else {
                task.completed = !task.completed;
            }
            task.updated_at = Utc::now();
            Ok(())
        })
    }

    pub fn daily_report(&self, date: NaiveDate) -> DailyReport {
        build_report(date, &self.tasks_on(date))
    }

    /// Monday..Sunday strip of day queries around `date`.
    pub fn week_overview(&self, date: NaiveDate) -> Vec<(NaiveDate, Vec<Task>)> {
        dates::week_of(date)
            .into_iter()
            .map(|day| (day, self.tasks_on(day)))
            .collect()
    }

    /// Days of the month with at least one occurrence, with completion
    /// counters for the calendar markers.
    pub fn month_overview(&self, year: i32, month: u32) -> Vec<MonthDaySummary> {
        dates::month_days(year, month)
            .into_iter()
            .filter_map(|day| {
                let due = self.tasks_on(day);
                if due.is_empty() {
                    return None;
                }
                let completed = due.iter().filter(|t| t.is_completed_on(day)).count();
                Some(MonthDaySummary {
                    date: day,
                    total: due.len(),
                    completed,
                    pending: due.len() - completed,
                })
            })
            .collect()
    }

    /// Pending-count view consumed by reminder scheduling.
    pub fn pending_summary(&self, date: NaiveDate) -> PendingSummary {
        let due = self.tasks_on(date);
        let pending: Vec<&Task> = due.iter().filter(|t| !t.is_completed_on(date)).collect();
        PendingSummary {
            date,
            pending: pending.len(),
            leading_titles: pending.iter().take(3).map(|t| t.title.clone()).collect(),
        }
    }

    /// Hands the day's pending summary to the configured sink, if any.
    /// Nothing is scheduled for an all-clear day.
    pub fn notify_pending(&self, date: NaiveDate, at: DateTime<Utc>) {
        let Some(sink) = &self.notification_sink else {
            return;
        };
        let summary = self.pending_summary(date);
        if summary.pending == 0 {
            return;
        }
        sink.schedule(NotificationRequest {
            title: format!("Pending today ({})", summary.pending),
            body: summary.body(),
            scheduled_for: at,
        });
    }

    /// Runs `mutate` under the write lock, rebuilds the stats and writes the
    /// joint snapshot through to storage (best-effort, per the durability
    /// contract).
    fn mutate<T>(&self, mutate: impl FnOnce(&mut Vec<Task>) -> T) -> T {
        let (snapshot, out) = {
            let mut state = self.state.write();
            let out = mutate(&mut state.tasks);
            state.stats = recompute_stats(&state.tasks);
            (state.clone(), out)
        };
        if let Some(storage) = &self.storage {
            storage.save(&snapshot);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::Badge;
    use crate::task::Repeat;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn service() -> TaskService {
        TaskService::builder().build()
    }

    fn draft(title: &str, date: NaiveDate) -> TaskDraft {
        TaskDraft {
            title: title.into(),
            date,
            ..TaskDraft::default()
        }
    }

    #[test]
    fn create_applies_defaults() {
        let service = service();
        let id = service.create_task(draft("Walk", ymd(2024, 1, 10)));
        let task = service.get_task(id).unwrap();
        assert_eq!(task.series_id, id);
        assert_eq!(task.repeat, Repeat::None);
        assert!(!task.completed);
        assert!(task.exdates.is_empty());
        assert!(task.completed_dates.is_empty());

        let second = service.create_task(draft("", ymd(2024, 1, 11)));
        assert_ne!(second, id);
        assert_eq!(service.get_task(second).unwrap().title, "Untitled");
    }

    #[test]
    fn ids_remain_unique_after_delete() {
        let service = service();
        let a = service.create_task(draft("a", ymd(2024, 1, 1)));
        let b = service.create_task(draft("b", ymd(2024, 1, 1)));
        service.delete_task(a).unwrap();
        let c = service.create_task(draft("c", ymd(2024, 1, 1)));
        assert_ne!(c, b);
    }

    #[test]
    fn update_with_rule_clears_legacy_cadence() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Gym".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Weekly,
            repeat_until: Some(ymd(2024, 6, 1)),
            ..TaskDraft::default()
        });
        service
            .update_task(
                id,
                TaskPatch {
                    rrule: Some(Some("FREQ=WEEKLY;BYDAY=MO,TH".into())),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        let task = service.get_task(id).unwrap();
        assert_eq!(task.repeat, Repeat::None);
        assert_eq!(task.repeat_until, None);
        assert!(task.rrule.is_some());
    }

    #[test]
    fn unknown_ids_are_reported() {
        let service = service();
        assert_eq!(
            service.update_task(99, TaskPatch::default()),
            Err(StoreError::TaskNotFound(99))
        );
        assert_eq!(service.delete_task(99), Err(StoreError::TaskNotFound(99)));
        assert_eq!(service.delete_series(99), Err(StoreError::TaskNotFound(99)));
        assert_eq!(
            service.toggle_complete(99, ymd(2024, 1, 1)),
            Err(StoreError::TaskNotFound(99))
        );
        assert_eq!(
            service.copy_to_date(99, ymd(2024, 1, 1)),
            Err(StoreError::TaskNotFound(99))
        );
    }

    #[test]
    fn copy_links_the_series_and_series_delete_removes_both() {
        let service = service();
        let original = service.create_task(draft("Plan sprint", ymd(2024, 1, 8)));
        let copy = service.copy_to_date(original, ymd(2024, 1, 15)).unwrap();

        let copied = service.get_task(copy).unwrap();
        assert_eq!(copied.series_id, original);
        assert_eq!(copied.date, ymd(2024, 1, 15));
        assert_eq!(copied.repeat, Repeat::None);

        // deleting by the copy's id removes the whole series
        service.delete_series(copy).unwrap();
        assert!(service.get_task(original).is_none());
        assert!(service.get_task(copy).is_none());
        assert!(service.tasks().is_empty());
    }

    #[test]
    fn occurrence_delete_is_non_destructive() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Stretch".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Daily,
            ..TaskDraft::default()
        });
        service.delete_occurrence(id, ymd(2024, 1, 5)).unwrap();

        assert_eq!(service.tasks().len(), 1);
        assert!(service.tasks_on(ymd(2024, 1, 5)).is_empty());
        assert_eq!(service.tasks_on(ymd(2024, 1, 4)).len(), 1);
        assert_eq!(service.tasks_on(ymd(2024, 1, 6)).len(), 1);
    }

    #[test]
    fn excluding_a_completed_day_drops_its_contribution() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Stretch".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Daily,
            ..TaskDraft::default()
        });
        service.toggle_complete(id, ymd(2024, 1, 2)).unwrap();
        assert_eq!(service.stats().points, 10);

        service.delete_occurrence(id, ymd(2024, 1, 2)).unwrap();
        let stats = service.stats();
        assert_eq!(stats.points, 0);
        assert_eq!(stats.streak, 0);
        assert_eq!(stats.last_completion_date, None);
    }

    #[test]
    fn toggling_singles_recomputes_stats_end_to_end() {
        let service = service();
        let a = service.create_task(draft("a", ymd(2024, 1, 1)));
        let b = service.create_task(draft("b", ymd(2024, 1, 2)));
        service.toggle_complete(a, ymd(2024, 1, 1)).unwrap();
        service.toggle_complete(b, ymd(2024, 1, 2)).unwrap();

        let stats = service.stats();
        assert_eq!(stats.points, 20);
        assert_eq!(stats.streak, 2);
        assert_eq!(stats.last_completion_date, Some(ymd(2024, 1, 2)));
        assert!(stats.badges.is_empty());

        // toggling back off is a full recompute, not a decrement guess
        service.toggle_complete(b, ymd(2024, 1, 2)).unwrap();
        let stats = service.stats();
        assert_eq!(stats.points, 10);
        assert_eq!(stats.streak, 1);
        assert_eq!(stats.last_completion_date, Some(ymd(2024, 1, 1)));
    }

    #[test]
    fn instance_toggle_flips_day_membership() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Run".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Daily,
            ..TaskDraft::default()
        });
        service.toggle_complete(id, ymd(2024, 1, 3)).unwrap();
        assert!(service.get_task(id).unwrap().is_completed_on(ymd(2024, 1, 3)));
        service.toggle_complete(id, ymd(2024, 1, 3)).unwrap();
        assert!(!service.get_task(id).unwrap().is_completed_on(ymd(2024, 1, 3)));
        // the single-task boolean stays untouched for instance-based tasks
        assert!(!service.get_task(id).unwrap().completed);
    }

    #[test]
    fn day_query_orders_by_most_recently_touched() {
        let service = service();
        let day = ymd(2024, 1, 10);
        let a = service.create_task(draft("a", day));
        let b = service.create_task(draft("b", day));
        service
            .update_task(a, TaskPatch { notes: Some("soon".into()), ..TaskPatch::default() })
            .unwrap();

        let due: Vec<u64> = service.tasks_on(day).iter().map(|t| t.id).collect();
        assert_eq!(due, vec![a, b]);
    }

    #[test]
    fn streak_badges_appear_at_thresholds() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Meditate".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Daily,
            ..TaskDraft::default()
        });
        for day in 1..=3 {
            service.toggle_complete(id, ymd(2024, 1, day)).unwrap();
        }
        assert!(service.stats().badges.contains(&Badge::Streak3));
        assert!(!service.stats().badges.contains(&Badge::Streak7));
    }

    #[test]
    fn daily_report_matches_the_day_query() {
        let service = service();
        let day = ymd(2024, 2, 14);
        let a = service.create_task(draft("done", day));
        let _b = service.create_task(draft("pending", day));
        let _off = service.create_task(draft("elsewhere", ymd(2024, 2, 15)));
        service.toggle_complete(a, day).unwrap();

        let report = service.daily_report(day);
        assert_eq!(report.total, 2);
        assert_eq!(report.completed_count, 1);
        assert_eq!(report.completion_rate, 50);
        assert_eq!(report.completed_titles, vec!["done"]);
        assert_eq!(report.pending_titles, vec!["pending"]);
    }

    #[test]
    fn week_overview_covers_monday_to_sunday() {
        let service = service();
        service.create_task(TaskDraft {
            title: "Standup".into(),
            date: ymd(2024, 1, 1),
            repeat: Repeat::Daily,
            repeat_until: Some(ymd(2024, 1, 3)),
            ..TaskDraft::default()
        });

        let week = service.week_overview(ymd(2024, 1, 4));
        assert_eq!(week.len(), 7);
        assert_eq!(week[0].0, ymd(2024, 1, 1));
        assert_eq!(week[6].0, ymd(2024, 1, 7));
        assert_eq!(week[0].1.len(), 1);
        assert_eq!(week[2].1.len(), 1);
        assert!(week[3].1.is_empty());
    }

    #[test]
    fn month_overview_lists_only_days_with_occurrences() {
        let service = service();
        let id = service.create_task(TaskDraft {
            title: "Review".into(),
            date: ymd(2024, 1, 1),
            rrule: Some("FREQ=WEEKLY;BYDAY=MO".into()),
            ..TaskDraft::default()
        });
        service.toggle_complete(id, ymd(2024, 1, 8)).unwrap();

        let overview = service.month_overview(2024, 1);
        let days: Vec<NaiveDate> = overview.iter().map(|d| d.date).collect();
        assert_eq!(
            days,
            vec![ymd(2024, 1, 1), ymd(2024, 1, 8), ymd(2024, 1, 15), ymd(2024, 1, 22), ymd(2024, 1, 29)]
        );
        let second = &overview[1];
        assert_eq!((second.total, second.completed, second.pending), (1, 1, 0));
    }

    #[test]
    fn pending_summary_keeps_the_first_three_titles() {
        let service = service();
        let day = ymd(2024, 3, 1);
        for title in ["d", "c", "b", "a"] {
            service.create_task(draft(title, day));
        }
        let summary = service.pending_summary(day);
        assert_eq!(summary.pending, 4);
        assert_eq!(summary.leading_titles.len(), 3);
        assert_eq!(summary.leading_titles, vec!["a", "b", "c"]);
    }

    #[test]
    fn notify_pending_formats_the_reminder() {
        use parking_lot::Mutex;
        use std::sync::Arc;

        #[derive(Default)]
        struct CapturingSink(Mutex<Vec<NotificationRequest>>);
        impl NotificationSink for CapturingSink {
            fn schedule(&self, notification: NotificationRequest) {
                self.0.lock().push(notification);
            }
        }
        impl NotificationSink for Arc<CapturingSink> {
            fn schedule(&self, notification: NotificationRequest) {
                self.as_ref().schedule(notification);
            }
        }

        let sink = Arc::new(CapturingSink::default());
        let service = TaskService::builder()
            .with_notification_sink(Box::new(Arc::clone(&sink)))
            .build();

        let day = ymd(2024, 3, 1);
        service.notify_pending(day, Utc::now());
        assert!(sink.0.lock().is_empty(), "all-clear day schedules nothing");

        service.create_task(draft("Water plants", day));
        service.notify_pending(day, Utc::now());
        let scheduled = sink.0.lock();
        assert_eq!(scheduled.len(), 1);
        assert_eq!(scheduled[0].title, "Pending today (1)");
        assert_eq!(scheduled[0].body, "Water plants");
    }
}
