use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::models::Event;
use crate::timezone::format_event_time;
use crate::transport::{Message, PickerMode, QuickReplyAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeWindow {
    Today,
    Next7Days,
    ThisMonth,
    ThisYear,
}

/// A UTC-day-aligned query range: `[start_day 00:00:00, end_day 23:59:59]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub start_day: NaiveDate,
    pub end_day: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndBeforeStart;

impl DayRange {
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start_day: day,
            end_day: day,
        }
    }

    pub fn span(start_day: NaiveDate, end_day: NaiveDate) -> Result<Self, EndBeforeStart> {
        if end_day < start_day {
            return Err(EndBeforeStart);
        }
        Ok(Self { start_day, end_day })
    }

    /// Relative windows are computed from the current UTC date; month and
    /// year boundaries come from calendar arithmetic, not fixed day counts.
    pub fn relative(window: RelativeWindow, today: NaiveDate) -> Self {
        match window {
            RelativeWindow::Today => Self::single_day(today),
            RelativeWindow::Next7Days => Self {
                start_day: today,
                end_day: today + chrono::Days::new(7),
            },
            RelativeWindow::ThisMonth => {
                let start_day = today.with_day(1).unwrap_or(today);
                let end_day = NaiveDate::from_ymd_opt(
                    today.year(),
                    today.month(),
                    days_in_month(today.year(), today.month()),
                )
                .unwrap_or(today);
                Self { start_day, end_day }
            }
            RelativeWindow::ThisYear => Self {
                start_day: NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap_or(today),
                end_day: NaiveDate::from_ymd_opt(today.year(), 12, 31).unwrap_or(today),
            },
        }
    }

    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start_day
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
    }

    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end_day
            .and_hms_opt(23, 59, 59)
            .unwrap_or_default()
            .and_utc()
    }

    pub fn is_single_day(&self) -> bool {
        self.start_day == self.end_day
    }

    fn header(&self) -> String {
        let mut header = format!("📅 {} ", self.start_day.format("%Y/%m/%d"));
        if !self.is_single_day() {
            header.push_str(&format!("到 {} ", self.end_day.format("%Y/%m/%d")));
        }
        header
    }
}

/// Renders the store's pre-sorted result list; an empty result produces an
/// explicit no-events message rather than an empty list.
pub fn render_query_results(range: &DayRange, events: &[Event], display_time_zone: &str) -> String {
    if events.is_empty() {
        return format!("{}沒有找到任何活動", range.header());
    }

    let mut message = format!("{}的活動（共 {} 項）：\n\n", range.header(), events.len());
    for event in events {
        message.push_str(&format!(
            "{}     {} ({})\n[{}]",
            event.name,
            format_event_time(event.time, display_time_zone),
            event.importance.as_str(),
            event.category.as_str(),
        ));
        if !event.notes.is_empty() {
            message.push_str(&format!(" {}", event.notes));
        }
        message.push_str("\n\n");
    }

    message
}

/// The query menu: pick a single day, build a range over two turns, or run
/// one of the fixed relative windows.
pub fn query_menu_message() -> Message {
    Message::with_quick_replies(
        "📅 活動查詢\n請選擇查詢方式，或直接輸入格式如：\n查詢活動:2025/06/01,2025/06/30",
        vec![
            QuickReplyAction::picker("選擇單日日期", "action=query_date", PickerMode::Date),
            QuickReplyAction::postback("選擇範圍日期", "action=select_date_range"),
            QuickReplyAction::postback("查詢今天", "action=query_today"),
            QuickReplyAction::postback("查詢後7天", "action=query_next7days"),
            QuickReplyAction::postback("查詢本月", "action=query_month"),
            QuickReplyAction::postback("查詢本年", "action=query_year"),
        ],
    )
}

pub fn start_date_picker_message() -> Message {
    Message::with_quick_replies(
        "📆 選擇日期範圍\n請先選擇開始日期",
        vec![QuickReplyAction::picker(
            "選擇開始日期",
            "action=select_start_date",
            PickerMode::Date,
        )],
    )
}

pub fn end_date_picker_message(start_day: NaiveDate) -> Message {
    Message::with_quick_replies(
        format!(
            "📆 選擇日期範圍\n開始日期: {}\n請選擇結束日期",
            start_day.format("%Y/%m/%d")
        ),
        vec![QuickReplyAction::picker(
            "選擇結束日期",
            "action=select_end_date",
            PickerMode::Date,
        )],
    )
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1);
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let first_of_next_month = NaiveDate::from_ymd_opt(next_year, next_month, 1);

    match (first_of_month, first_of_next_month) {
        (Some(first), Some(next)) => (next - first).num_days().max(1) as u32,
        _ => 31,
    }
}
