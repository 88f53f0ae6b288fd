use std::path::PathBuf;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tasks_domain::dates::{day_key, parse_day_key};
use tasks_domain::storage::JsonFileStore;
use tasks_domain::TaskService;
use tracing::info;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub(crate) store_path: PathBuf,
    pub(crate) date: Option<NaiveDate>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("taskdiary.json"),
            date: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("TASKDIARY_STORE") {
            if !path.trim().is_empty() {
                config.store_path = PathBuf::from(path);
            }
        }
        if let Ok(value) = std::env::var("TASKDIARY_DATE") {
            config.date = parse_day_key(&value);
        }
        Ok(config)
    }
}

pub fn run(config: AppConfig) -> Result<()> {
    let service = TaskService::builder()
        .with_storage(Box::new(JsonFileStore::new(config.store_path.clone())))
        .build();
    let date = config.date.unwrap_or_else(|| Local::now().date_naive());
    info!(store = %config.store_path.display(), date = %day_key(date), "taskdiary state loaded");

    let report = service.daily_report(date);
    println!(
        "{} — {}/{} done ({}%)",
        day_key(report.date),
        report.completed_count,
        report.total,
        report.completion_rate
    );
    for title in &report.completed_titles {
        println!("  [x] {title}");
    }
    for title in &report.pending_titles {
        println!("  [ ] {title}");
    }

    println!();
    println!("Week:");
    for (day, due) in service.week_overview(date) {
        let done = due.iter().filter(|task| task.is_completed_on(day)).count();
        let marker = if day == date { "  <" } else { "" };
        println!("  {}  {:>2} due  {:>2} done{marker}", day_key(day), due.len(), done);
    }

    let stats = service.stats();
    println!();
    println!("Points: {}  Streak: {} day(s)", stats.points, stats.streak);
    if !stats.badges.is_empty() {
        let badges: Vec<String> = stats.badges.iter().map(|badge| badge.to_string()).collect();
        println!("Badges: {}", badges.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_points_at_the_working_directory() {
        let config = AppConfig::default();
        assert_eq!(config.store_path, PathBuf::from("taskdiary.json"));
        assert!(config.date.is_none());
    }
}
