use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    pub scheduled_for: DateTime<Utc>,
}

/// Platform-specific notification adapters will implement this trait.
/// Delivery, OS registration and cadence all live on the other side.
pub trait NotificationSink: Send + Sync {
    fn schedule(&self, notification: NotificationRequest);
}

/// Read-only pending view handed to reminder scheduling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub date: NaiveDate,
    pub pending: usize,
    /// Up to the first three pending titles, in query order.
    pub leading_titles: Vec<String>,
}

impl PendingSummary {
    /// Reminder body: leading titles joined with a separator, `+N` for the
    /// remainder.
    pub fn body(&self) -> String {
        if self.leading_titles.is_empty() {
            return format!("{} pending task(s).", self.pending);
        }
        let rest = self.pending.saturating_sub(self.leading_titles.len());
        let mut body = self.leading_titles.join(" · ");
        if rest > 0 {
            body.push_str(&format!(" · +{rest}"));
        }
        body
    }
}
