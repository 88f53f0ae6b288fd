//! Structured recurrence rules: `FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;...`

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dates::{month_days, monday_of_week};

/// Why a recurrence rule string could not be understood.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    #[error("empty recurrence rule")]
    Empty,
    #[error("malformed token `{0}`")]
    MalformedToken(String),
    #[error("missing FREQ")]
    MissingFrequency,
    #[error("unknown frequency `{0}`")]
    UnknownFrequency(String),
    #[error("unknown key `{0}`")]
    UnknownKey(String),
    #[error("invalid interval `{0}`")]
    InvalidInterval(String),
    #[error("invalid weekday code `{0}`")]
    InvalidWeekday(String),
    #[error("invalid day of month `{0}`")]
    InvalidMonthDay(String),
    #[error("invalid set position `{0}`")]
    InvalidSetPos(String),
    #[error("invalid until value `{0}`")]
    InvalidUntil(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

/// A parsed recurrence definition. The anchor date is not part of the rule;
/// it is supplied per task at evaluation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub freq: Frequency,
    pub interval: u32,
    /// Weekday filter, Monday-first code order preserved as given.
    pub by_day: Vec<Weekday>,
    pub by_month_day: Option<u32>,
    /// 1..=4, or -1 for "last"; combined with `by_day` for monthly rules.
    pub by_set_pos: Option<i32>,
    /// Inclusive end, evaluated as end-of-day.
    pub until: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn parse(input: &str) -> Result<Self, RuleParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RuleParseError::Empty);
        }

        let mut freq = None;
        let mut interval = 1u32;
        let mut by_day = Vec::new();
        let mut by_month_day = None;
        let mut by_set_pos = None;
        let mut until = None;

        for token in input.split(';') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let Some((key, value)) = token.split_once('=') else {
                return Err(RuleParseError::MalformedToken(token.to_string()));
            };
            match key.trim().to_ascii_uppercase().as_str() {
                "FREQ" => freq = Some(parse_frequency(value)?),
                "INTERVAL" => {
                    interval = value
                        .trim()
                        .parse()
                        .ok()
                        .filter(|n| *n >= 1)
                        .ok_or_else(|| RuleParseError::InvalidInterval(value.to_string()))?;
                }
                "BYDAY" => {
                    for code in value.split(',') {
                        let code = code.trim();
                        if code.is_empty() {
                            continue;
                        }
                        let day = parse_weekday(code)
                            .ok_or_else(|| RuleParseError::InvalidWeekday(code.to_string()))?;
                        if !by_day.contains(&day) {
                            by_day.push(day);
                        }
                    }
                }
                "BYMONTHDAY" => {
                    by_month_day = Some(
                        value
                            .trim()
                            .parse()
                            .ok()
                            .filter(|n| (1..=31).contains(n))
                            .ok_or_else(|| RuleParseError::InvalidMonthDay(value.to_string()))?,
                    );
                }
                "BYSETPOS" => {
                    let pos: i32 = value
                        .trim()
                        .parse()
                        .map_err(|_| RuleParseError::InvalidSetPos(value.to_string()))?;
                    if !(1..=4).contains(&pos) && pos != -1 {
                        return Err(RuleParseError::InvalidSetPos(value.to_string()));
                    }
                    by_set_pos = Some(pos);
                }
                "UNTIL" => {
                    until = Some(
                        parse_until(value)
                            .ok_or_else(|| RuleParseError::InvalidUntil(value.to_string()))?,
                    );
                }
                other => return Err(RuleParseError::UnknownKey(other.to_string())),
            }
        }

        let freq = freq.ok_or(RuleParseError::MissingFrequency)?;
        Ok(Self {
            freq,
            interval,
            by_day,
            by_month_day,
            by_set_pos,
            until,
        })
    }

    /// Canonical text form, the shape rule editors consume and produce.
    /// `INTERVAL` is omitted when 1.
    pub fn encode(&self) -> String {
        let mut tokens = vec![format!("FREQ={}", frequency_name(self.freq))];
        if self.interval != 1 {
            tokens.push(format!("INTERVAL={}", self.interval));
        }
        if !self.by_day.is_empty() {
            let codes: Vec<&str> = self.by_day.iter().map(|day| weekday_code(*day)).collect();
            tokens.push(format!("BYDAY={}", codes.join(",")));
        }
        if let Some(day) = self.by_month_day {
            tokens.push(format!("BYMONTHDAY={day}"));
        }
        if let Some(pos) = self.by_set_pos {
            tokens.push(format!("BYSETPOS={pos}"));
        }
        if let Some(until) = self.until {
            tokens.push(format!("UNTIL={}T235959Z", until.format("%Y%m%d")));
        }
        tokens.join(";")
    }

    /// Whether the rule anchored at `start` produces an occurrence on `date`.
    /// Pure and total; `until` is inclusive.
    pub fn occurs_on(&self, start: NaiveDate, date: NaiveDate) -> bool {
        if date < start {
            return false;
        }
        if self.until.is_some_and(|until| date > until) {
            return false;
        }
        let interval = i64::from(self.interval.max(1));
        match self.freq {
            Frequency::Daily => (date - start).num_days() % interval == 0,
            Frequency::Weekly => {
                let weeks = (monday_of_week(date) - monday_of_week(start)).num_days() / 7;
                if weeks % interval != 0 {
                    return false;
                }
                if self.by_day.is_empty() {
                    date.weekday() == start.weekday()
                } else {
                    self.by_day.contains(&date.weekday())
                }
            }
            Frequency::Monthly => {
                let months = i64::from(date.year() - start.year()) * 12
                    + i64::from(date.month())
                    - i64::from(start.month());
                if months % interval != 0 {
                    return false;
                }
                if let Some(pos) = self.by_set_pos.filter(|_| !self.by_day.is_empty()) {
                    nth_matching_day(date.year(), date.month(), &self.by_day, pos) == Some(date)
                } else if !self.by_day.is_empty() {
                    self.by_day.contains(&date.weekday())
                } else if let Some(day) = self.by_month_day {
                    date.day() == day
                } else {
                    date.day() == start.day()
                }
            }
        }
    }
}

/// The Nth (or last, `pos == -1`) day of the month whose weekday is in `by_day`.
fn nth_matching_day(year: i32, month: u32, by_day: &[Weekday], pos: i32) -> Option<NaiveDate> {
    let matches: Vec<NaiveDate> = month_days(year, month)
        .into_iter()
        .filter(|day| by_day.contains(&day.weekday()))
        .collect();
    if pos == -1 {
        matches.last().copied()
    } else {
        let index = usize::try_from(pos).ok()?.checked_sub(1)?;
        matches.get(index).copied()
    }
}

fn parse_frequency(value: &str) -> Result<Frequency, RuleParseError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "DAILY" => Ok(Frequency::Daily),
        "WEEKLY" => Ok(Frequency::Weekly),
        "MONTHLY" => Ok(Frequency::Monthly),
        other => Err(RuleParseError::UnknownFrequency(other.to_string())),
    }
}

fn frequency_name(freq: Frequency) -> &'static str {
    match freq {
        Frequency::Daily => "DAILY",
        Frequency::Weekly => "WEEKLY",
        Frequency::Monthly => "MONTHLY",
    }
}

fn parse_weekday(code: &str) -> Option<Weekday> {
    match code.to_ascii_uppercase().as_str() {
        "MO" => Some(Weekday::Mon),
        "TU" => Some(Weekday::Tue),
        "WE" => Some(Weekday::Wed),
        "TH" => Some(Weekday::Thu),
        "FR" => Some(Weekday::Fri),
        "SA" => Some(Weekday::Sat),
        "SU" => Some(Weekday::Sun),
        _ => None,
    }
}

fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// `UNTIL` carries date-only precision: `YYYYMMDDT235959Z`, the time suffix
/// always end-of-day. A bare `YYYYMMDD` is accepted too.
fn parse_until(value: &str) -> Option<NaiveDate> {
    let digits = value.trim().split('T').next()?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}
