use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::task::Task;

/// One day's totals, consumed by the report and share/export surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub date: NaiveDate,
    pub total: usize,
    pub completed_count: usize,
    /// Rounded percentage; 0 when the day has no occurrences.
    pub completion_rate: u32,
    pub completed_titles: Vec<String>,
    pub pending_titles: Vec<String>,
}

/// Partitions a day's query result into completed and pending titles,
/// preserving the query ordering within each list.
pub fn build_report(date: NaiveDate, tasks: &[Task]) -> DailyReport {
    let total = tasks.len();
    let mut completed_titles = Vec::new();
    let mut pending_titles = Vec::new();
    for task in tasks {
        if task.is_completed_on(date) {
            completed_titles.push(task.title.clone());
        } else {
            pending_titles.push(task.title.clone());
        }
    }
    let completed_count = completed_titles.len();
    let completion_rate = if total == 0 {
        0
    } else {
        ((completed_count as f64 / total as f64) * 100.0).round() as u32
    };
    DailyReport {
        date,
        total,
        completed_count,
        completion_rate,
        completed_titles,
        pending_titles,
    }
}
