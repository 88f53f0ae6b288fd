use chrono::{Datelike, Duration, NaiveDate};

/// Canonical `YYYY-MM-DD` key for a local calendar day.
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parses a `YYYY-MM-DD` day key. Basic decomposition only; anything that is
/// not a well-formed calendar date yields `None`.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key.trim(), "%Y-%m-%d").ok()
}

/// ISO-style week start: the Monday on or before `date`.
pub fn monday_of_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// The Monday..Sunday strip containing `date`.
pub fn week_of(date: NaiveDate) -> [NaiveDate; 7] {
    let monday = monday_of_week(date);
    std::array::from_fn(|offset| monday + Duration::days(offset as i64))
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return 0;
    };
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match next {
        Some(next) => (next - first).num_days() as u32,
        None => 0,
    }
}

/// Every day of the given month in order, empty for an invalid month.
pub fn month_days(year: i32, month: u32) -> Vec<NaiveDate> {
    (1..=days_in_month(year, month))
        .filter_map(|day| NaiveDate::from_ymd_opt(year, month, day))
        .collect()
}
