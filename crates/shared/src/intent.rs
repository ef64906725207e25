use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;

use crate::flow::FlowVariant;
use crate::query::RelativeWindow;

pub const DATE_FORMAT: &str = "%Y/%m/%d";
pub const DATETIME_FORMAT: &str = "%Y/%m/%d %H:%M";
pub const PICKER_DATE_FORMAT: &str = "%Y-%m-%d";
pub const PICKER_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// `新增(活動)? <name> <date>[ <time>][ [category]][ [importance]][ [notes]]`
static CREATE_COMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)^新增(?:活動)?\s+(.+?)\s+(\d{4}/\d{1,2}/\d{1,2}(?:\s+\d{1,2}:\d{1,2})?)\s*(?:\[([^\]]+)\])?\s*(?:\[([^\]]+)\])?\s*(?:\[([^\]]*)\])?$",
    )
    .expect("create command pattern compiles")
});

/// Every inbound delivery is parsed into exactly one of these intents before
/// any state is touched; the flow engine and query resolver dispatch on the
/// pair `(current step, intent)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    StartGuidedCreation,
    OpenStructuredForm,
    OpenQueryMenu,
    ManualRemind,
    Help,
    CancelFlow,
    /// Preset time choice text, `選擇時間:<YYYY/MM/DD HH:MM>`; the payload is
    /// validated at the date-time step so a bad value re-prompts there.
    TimeChoice { raw: String },
    /// Picker-provided date-time for the active creation flow.
    PickDateTime { time: NaiveDateTime },
    SetImportance { label: String },
    SetCategory { label: String },
    Confirm { variant: FlowVariant },
    Cancel { variant: FlowVariant },
    CreateCommand(Box<ParsedCreateCommand>),
    MalformedCreateCommand,
    QueryCommand {
        start: NaiveDate,
        end: Option<NaiveDate>,
    },
    MalformedQueryCommand { reason: QueryCommandError },
    QueryDate { date: NaiveDate },
    QueryRelative(RelativeWindow),
    StartDateRange,
    PickRangeStart { date: NaiveDate },
    PickRangeEnd { date: NaiveDate },
    FreeText { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCreateCommand {
    pub name: String,
    pub time: NaiveDateTime,
    pub category_label: Option<String>,
    pub importance_label: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCommandError {
    MissingStart,
    BadStart,
    BadEnd,
}

impl QueryCommandError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingStart => "請提供開始日期",
            Self::BadStart => "開始日期格式不正確，請使用 YYYY/MM/DD 格式",
            Self::BadEnd => "結束日期格式不正確，請使用 YYYY/MM/DD 格式",
        }
    }
}

/// Structured parameters delivered alongside a postback by the platform
/// (date/datetime picker results), not embedded in the data string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostbackParams {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
}

impl PostbackParams {
    fn picked_date(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?;
        NaiveDate::parse_from_str(raw, PICKER_DATE_FORMAT).ok()
    }

    fn picked_datetime(&self) -> Option<NaiveDateTime> {
        let raw = self.datetime.as_deref()?;
        NaiveDateTime::parse_from_str(raw, PICKER_DATETIME_FORMAT).ok()
    }
}

impl Intent {
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();

        match text {
            "設定活動" => return Self::StartGuidedCreation,
            "查詢活動" => return Self::OpenQueryMenu,
            "手動提醒" => return Self::ManualRemind,
            "幫助" | "help" => return Self::Help,
            "取消" | "取消設定活動" => return Self::CancelFlow,
            _ => {}
        }

        if let Some(raw) = text.strip_prefix("選擇時間:") {
            return Self::TimeChoice {
                raw: raw.trim().to_string(),
            };
        }
        if let Some(label) = text.strip_prefix("重要性:") {
            return Self::SetImportance {
                label: label.trim().to_string(),
            };
        }
        if let Some(label) = text.strip_prefix("分類:") {
            return Self::SetCategory {
                label: label.trim().to_string(),
            };
        }
        if let Some(rest) = text.strip_prefix("查詢活動:") {
            return parse_query_command(rest);
        }
        if let Some(rest) = text.strip_prefix("設定活動:") {
            return parse_create_command(rest.trim());
        }
        if text.starts_with("新增") {
            return parse_create_command(text);
        }

        Self::FreeText {
            text: text.to_string(),
        }
    }

    pub fn from_postback(data: &str, params: &PostbackParams) -> Option<Self> {
        let fields = parse_postback_data(data);
        let action = fields.get("action")?.as_str();

        match action {
            "open_structured_form" => Some(Self::OpenStructuredForm),
            "open_query_form" => Some(Self::OpenQueryMenu),
            "select_time" => params.picked_datetime().map(|time| Self::PickDateTime { time }),
            "set_importance" => fields.get("value").map(|value| Self::SetImportance {
                label: value.clone(),
            }),
            "set_category" => fields.get("value").map(|value| Self::SetCategory {
                label: value.clone(),
            }),
            "confirm_event" => Some(Self::Confirm {
                variant: FlowVariant::Guided,
            }),
            "confirm_event_structured" => Some(Self::Confirm {
                variant: FlowVariant::Structured,
            }),
            "cancel_event" => Some(Self::Cancel {
                variant: FlowVariant::Guided,
            }),
            "cancel_event_structured" => Some(Self::Cancel {
                variant: FlowVariant::Structured,
            }),
            "query_date" => params.picked_date().map(|date| Self::QueryDate { date }),
            "query_today" => Some(Self::QueryRelative(RelativeWindow::Today)),
            "query_next7days" => Some(Self::QueryRelative(RelativeWindow::Next7Days)),
            "query_month" => Some(Self::QueryRelative(RelativeWindow::ThisMonth)),
            "query_year" => Some(Self::QueryRelative(RelativeWindow::ThisYear)),
            "select_date_range" => Some(Self::StartDateRange),
            "select_start_date" => params
                .picked_date()
                .map(|date| Self::PickRangeStart { date }),
            "select_end_date" => params.picked_date().map(|date| Self::PickRangeEnd { date }),
            _ => None,
        }
    }
}

/// Flat `key=value[&key=value...]` postback payload.
fn parse_postback_data(data: &str) -> HashMap<String, String> {
    data.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

fn parse_query_command(rest: &str) -> Intent {
    let mut parts = rest.splitn(2, ',');
    let start_raw = parts.next().unwrap_or("").trim();
    if start_raw.is_empty() {
        return Intent::MalformedQueryCommand {
            reason: QueryCommandError::MissingStart,
        };
    }

    let Ok(start) = NaiveDate::parse_from_str(start_raw, DATE_FORMAT) else {
        return Intent::MalformedQueryCommand {
            reason: QueryCommandError::BadStart,
        };
    };

    let end = match parts.next().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(end_raw) => match NaiveDate::parse_from_str(end_raw, DATE_FORMAT) {
            Ok(end) => Some(end),
            Err(_) => {
                return Intent::MalformedQueryCommand {
                    reason: QueryCommandError::BadEnd,
                };
            }
        },
        None => None,
    };

    Intent::QueryCommand { start, end }
}

fn parse_create_command(text: &str) -> Intent {
    let Some(captures) = CREATE_COMMAND.captures(text) else {
        return Intent::MalformedCreateCommand;
    };

    let name = captures[1].trim().to_string();
    let date_raw = captures[2].trim();

    // A date without a clock defaults to 09:00.
    let time = if date_raw.contains(' ') {
        NaiveDateTime::parse_from_str(date_raw, DATETIME_FORMAT).ok()
    } else {
        NaiveDate::parse_from_str(date_raw, DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(9, 0, 0))
    };
    let Some(time) = time else {
        return Intent::MalformedCreateCommand;
    };

    let optional = |index: usize| {
        captures
            .get(index)
            .map(|capture| capture.as_str().trim().to_string())
    };

    Intent::CreateCommand(Box::new(ParsedCreateCommand {
        name,
        time,
        category_label: optional(3).filter(|value| !value.is_empty()),
        importance_label: optional(4).filter(|value| !value.is_empty()),
        notes: optional(5).filter(|value| !value.is_empty()),
    }))
}
