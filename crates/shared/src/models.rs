use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;

pub const NO_NOTES_ALIASES: [&str; 5] = ["無", "none", "n/a", "", "n"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

impl Importance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "高",
            Self::Medium => "中",
            Self::Low => "低",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "高" => Some(Self::High),
            "中" => Some(Self::Medium),
            "低" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn valid_labels() -> &'static str {
        "「高」、「中」或「低」"
    }

    pub(crate) fn from_record(value: &str) -> Result<Self, StoreError> {
        Self::parse_label(value).ok_or_else(|| {
            StoreError::InvalidData(format!("unknown importance persisted: {value}"))
        })
    }
}

impl Default for Importance {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Meeting,
    Activity,
    Reminder,
    Task,
    Other,
}

impl Category {
    pub const ALL: [Self; 5] = [
        Self::Meeting,
        Self::Activity,
        Self::Reminder,
        Self::Task,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meeting => "會議",
            Self::Activity => "活動",
            Self::Reminder => "提醒",
            Self::Task => "任務",
            Self::Other => "其他",
        }
    }

    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim() {
            "會議" => Some(Self::Meeting),
            "活動" => Some(Self::Activity),
            "提醒" => Some(Self::Reminder),
            "任務" => Some(Self::Task),
            "其他" => Some(Self::Other),
            _ => None,
        }
    }

    pub(crate) fn from_record(value: &str) -> Result<Self, StoreError> {
        Self::parse_label(value)
            .ok_or_else(|| StoreError::InvalidData(format!("unknown category persisted: {value}")))
    }
}

impl Default for Category {
    fn default() -> Self {
        Self::Activity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    NotReminded,
    Reminded,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotReminded => "未提醒",
            Self::Reminded => "已提醒",
        }
    }

    pub(crate) fn from_record(value: &str) -> Result<Self, StoreError> {
        match value {
            "未提醒" => Ok(Self::NotReminded),
            "已提醒" => Ok(Self::Reminded),
            _ => Err(StoreError::InvalidData(format!(
                "unknown reminder status persisted: {value}"
            ))),
        }
    }
}

/// A committed event as returned by the records service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub name: String,
    pub time: DateTime<Utc>,
    pub category: Category,
    pub importance: Importance,
    pub notes: String,
    pub reminder_status: ReminderStatus,
}

/// A validated event ready to be written to the records service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub name: String,
    pub time: DateTime<Utc>,
    pub category: Category,
    pub importance: Importance,
    pub notes: String,
}

/// A partially-built event attached to an in-progress creation flow.
///
/// `None` means "not yet provided", which is distinct from an empty string:
/// notes explicitly skipped by the user are `Some(String::new())`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    pub time: Option<DateTime<Utc>>,
    pub importance: Option<Importance>,
    pub category: Option<Category>,
    pub name: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingField {
    Name,
}

impl MissingField {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "活動名稱",
        }
    }
}

impl EventDraft {
    /// Fills every still-unset selectable field with its default. Idempotent:
    /// a field the user already supplied is never overwritten.
    pub fn fill_defaults(&mut self, now: DateTime<Utc>) {
        if self.time.is_none() {
            self.time = Some(truncate_to_minute(now));
        }
        if self.importance.is_none() {
            self.importance = Some(Importance::default());
        }
        if self.category.is_none() {
            self.category = Some(Category::default());
        }
    }

    pub fn into_new_event(mut self, now: DateTime<Utc>) -> Result<NewEvent, MissingField> {
        self.fill_defaults(now);

        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(MissingField::Name),
        };

        Ok(NewEvent {
            name,
            time: self.time.unwrap_or_else(|| truncate_to_minute(now)),
            category: self.category.unwrap_or_default(),
            importance: self.importance.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
        })
    }
}

/// Normalizes the "no notes" aliases to an empty string, keeping any other
/// input as literal note text.
pub fn normalize_notes(input: &str) -> String {
    let trimmed = input.trim();
    let lowered = trimmed.to_lowercase();
    if NO_NOTES_ALIASES
        .iter()
        .any(|alias| lowered == alias.to_lowercase())
    {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Event times carry minute precision; seconds and below are discarded.
pub fn truncate_to_minute(value: DateTime<Utc>) -> DateTime<Utc> {
    value
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Category, EventDraft, Importance, MissingField, normalize_notes};

    #[test]
    fn importance_labels_round_trip_over_the_closed_set() {
        for importance in [Importance::High, Importance::Medium, Importance::Low] {
            assert_eq!(
                Importance::parse_label(importance.as_str()),
                Some(importance)
            );
        }
        assert_eq!(Importance::parse_label("極高"), None);
    }

    #[test]
    fn category_labels_round_trip_over_the_closed_set() {
        for category in Category::ALL {
            assert_eq!(Category::parse_label(category.as_str()), Some(category));
        }
        assert_eq!(Category::parse_label("雜項"), None);
    }

    #[test]
    fn no_notes_aliases_normalize_to_empty() {
        for alias in ["無", "none", "N/A", "", "n", "  N  "] {
            assert_eq!(normalize_notes(alias), "");
        }
        assert_eq!(normalize_notes("帶簡報"), "帶簡報");
    }

    #[test]
    fn fill_defaults_is_idempotent_and_keeps_user_values() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 1, 10, 30, 45)
            .single()
            .expect("valid datetime");
        let chosen = Utc
            .with_ymd_and_hms(2025, 6, 2, 14, 0, 0)
            .single()
            .expect("valid datetime");

        let mut draft = EventDraft {
            time: Some(chosen),
            ..EventDraft::default()
        };

        draft.fill_defaults(now);
        draft.fill_defaults(now);

        assert_eq!(draft.time, Some(chosen));
        assert_eq!(draft.importance, Some(Importance::Medium));
        assert_eq!(draft.category, Some(Category::Activity));
    }

    #[test]
    fn default_time_is_truncated_to_the_minute() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 1, 10, 30, 45)
            .single()
            .expect("valid datetime");

        let mut draft = EventDraft::default();
        draft.fill_defaults(now);

        let time = draft.time.expect("default time set");
        assert_eq!(time.to_rfc3339(), "2025-06-01T10:30:00+00:00");
    }

    #[test]
    fn commit_without_name_reports_the_missing_field() {
        let now = Utc
            .with_ymd_and_hms(2025, 6, 1, 10, 0, 0)
            .single()
            .expect("valid datetime");

        let draft = EventDraft::default();
        assert_eq!(draft.into_new_event(now), Err(MissingField::Name));
    }
}
