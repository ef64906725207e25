use chrono::{DateTime, Days, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confirm;
use crate::intent::{DATETIME_FORMAT, Intent};
use crate::models::{Category, EventDraft, Importance, normalize_notes};
use crate::timezone::{format_event_time, parse_time_zone_or_default};
use crate::transport::{Message, PickerMode, QuickReplyAction};

pub const CANCEL_TEXT: &str = "取消設定活動";

/// Which presentation drives the creation dialogue. Both variants share the
/// same states and transition logic; they differ only in which inputs the
/// selecting phase accepts out of order and in how prompts are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVariant {
    Guided,
    Structured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    SelectingDateTime,
    SelectingImportance,
    SelectingCategory,
    WaitingForName,
    WaitingForNotes,
    WaitingForConfirmation,
}

impl FlowStep {
    fn is_selecting(&self) -> bool {
        matches!(
            self,
            Self::SelectingDateTime | Self::SelectingImportance | Self::SelectingCategory
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreationFlow {
    pub variant: FlowVariant,
    pub step: FlowStep,
    pub draft: EventDraft,
}

impl CreationFlow {
    pub fn new(variant: FlowVariant) -> Self {
        Self {
            variant,
            step: FlowStep::SelectingDateTime,
            draft: EventDraft::default(),
        }
    }
}

/// Starts the guided variant and returns its opening prompts.
pub fn start_guided(now: DateTime<Utc>, display_time_zone: &str) -> (CreationFlow, Vec<Message>) {
    let flow = CreationFlow::new(FlowVariant::Guided);
    let messages = vec![
        Message::text(
            "請按照以下步驟設定活動：\n1. 選擇日期和時間\n2. 選擇活動重要性\n3. 選擇活動分類\n4. 輸入活動名稱和備註",
        ),
        time_selection_prompt(now, display_time_zone),
    ];
    (flow, messages)
}

/// Starts the structured variant: one form message whose buttons set the
/// selectable fields in any order.
pub fn start_structured() -> (CreationFlow, Vec<Message>) {
    let flow = CreationFlow::new(FlowVariant::Structured);
    (flow, vec![structured_form_prompt()])
}

/// Advances the flow by one inbound intent. Input that does not match the
/// current step re-prompts without touching the draft or the step.
pub fn advance(
    flow: &mut CreationFlow,
    intent: &Intent,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    match intent {
        Intent::PickDateTime { time } => {
            apply_time(flow, naive_as_utc(*time), now, display_time_zone)
        }
        Intent::TimeChoice { raw } => match NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT) {
            Ok(time) => apply_time(flow, naive_as_utc(time), now, display_time_zone),
            Err(_) => vec![Message::text("時間格式不正確，請重新選擇")],
        },
        Intent::SetImportance { label } => apply_importance(flow, label, now, display_time_zone),
        Intent::SetCategory { label } => apply_category(flow, label, now, display_time_zone),
        Intent::FreeText { text } => apply_free_text(flow, text, now, display_time_zone),
        _ => step_prompt(flow, now, display_time_zone),
    }
}

/// The prompt restating what the current step expects; used both to advance
/// the dialogue and to recover from non-matching input.
pub fn step_prompt(
    flow: &CreationFlow,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    match (flow.variant, flow.step) {
        (FlowVariant::Structured, step) if step.is_selecting() => vec![structured_form_prompt()],
        (_, FlowStep::SelectingDateTime) => vec![time_selection_prompt(now, display_time_zone)],
        (_, FlowStep::SelectingImportance) => vec![importance_prompt(&flow.draft, display_time_zone)],
        (_, FlowStep::SelectingCategory) => vec![category_prompt(&flow.draft, display_time_zone)],
        (_, FlowStep::WaitingForName) => vec![name_prompt(&flow.draft, display_time_zone)],
        (_, FlowStep::WaitingForNotes) => vec![notes_prompt()],
        (_, FlowStep::WaitingForConfirmation) => {
            confirm::confirmation_messages(&flow.draft, flow.variant, display_time_zone)
        }
    }
}

fn accepts_selecting_input(flow: &CreationFlow, expected: FlowStep) -> bool {
    match flow.variant {
        FlowVariant::Guided => flow.step == expected,
        FlowVariant::Structured => flow.step.is_selecting(),
    }
}

fn apply_time(
    flow: &mut CreationFlow,
    time: DateTime<Utc>,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    if !accepts_selecting_input(flow, FlowStep::SelectingDateTime) {
        return step_prompt(flow, now, display_time_zone);
    }

    flow.draft.time = Some(time);
    match flow.variant {
        FlowVariant::Guided => {
            flow.step = FlowStep::SelectingImportance;
            vec![importance_prompt(&flow.draft, display_time_zone)]
        }
        FlowVariant::Structured => vec![Message::text(format!(
            "已選擇時間: {}\n請繼續選擇重要性和分類",
            format_event_time(time, display_time_zone)
        ))],
    }
}

fn apply_importance(
    flow: &mut CreationFlow,
    label: &str,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    if !accepts_selecting_input(flow, FlowStep::SelectingImportance) {
        return step_prompt(flow, now, display_time_zone);
    }

    let Some(importance) = Importance::parse_label(label) else {
        return vec![Message::text(format!(
            "無效的重要性: {label}。請使用{}。",
            Importance::valid_labels()
        ))];
    };

    flow.draft.importance = Some(importance);
    match flow.variant {
        FlowVariant::Guided => {
            flow.step = FlowStep::SelectingCategory;
            vec![category_prompt(&flow.draft, display_time_zone)]
        }
        FlowVariant::Structured => vec![Message::text(format!(
            "已選擇重要性: {}\n請繼續選擇分類",
            importance.as_str()
        ))],
    }
}

fn apply_category(
    flow: &mut CreationFlow,
    label: &str,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    if !accepts_selecting_input(flow, FlowStep::SelectingCategory) {
        return step_prompt(flow, now, display_time_zone);
    }

    let Some(category) = Category::parse_label(label) else {
        let valid = Category::ALL
            .iter()
            .map(|category| format!("「{}」", category.as_str()))
            .collect::<Vec<_>>()
            .join("、");
        return vec![Message::text(format!("無效的分類: {label}。請使用{valid}。"))];
    };

    flow.draft.category = Some(category);
    // Structured fields may arrive in any order; before name entry every
    // still-unset field gets its default (idempotent, never overwrites).
    if flow.variant == FlowVariant::Structured {
        flow.draft.fill_defaults(now);
    }
    flow.step = FlowStep::WaitingForName;

    match flow.variant {
        FlowVariant::Guided => vec![name_prompt(&flow.draft, display_time_zone)],
        FlowVariant::Structured => vec![Message::with_quick_replies(
            format!("已選擇分類: {}\n\n請直接輸入活動名稱：", category.as_str()),
            vec![QuickReplyAction::text("取消", CANCEL_TEXT)],
        )],
    }
}

fn apply_free_text(
    flow: &mut CreationFlow,
    text: &str,
    now: DateTime<Utc>,
    display_time_zone: &str,
) -> Vec<Message> {
    match flow.step {
        FlowStep::WaitingForName => {
            let name = text.trim();
            if name.is_empty() {
                return vec![name_prompt(&flow.draft, display_time_zone)];
            }
            flow.draft.name = Some(name.to_string());
            flow.step = FlowStep::WaitingForNotes;
            vec![notes_prompt()]
        }
        FlowStep::WaitingForNotes => {
            flow.draft.notes = Some(normalize_notes(text));
            flow.step = FlowStep::WaitingForConfirmation;
            confirm::confirmation_messages(&flow.draft, flow.variant, display_time_zone)
        }
        _ => step_prompt(flow, now, display_time_zone),
    }
}

/// User-picked date-times are interpreted as UTC at minute precision.
fn naive_as_utc(time: NaiveDateTime) -> DateTime<Utc> {
    time.and_utc()
}

fn progress_text(draft: &EventDraft, display_time_zone: &str) -> String {
    let mut lines = String::from("您已設定：\n");
    if let Some(time) = draft.time {
        lines.push_str(&format!("時間: {}\n", format_event_time(time, display_time_zone)));
    }
    if let Some(importance) = draft.importance {
        lines.push_str(&format!("重要性: {}\n", importance.as_str()));
    }
    if let Some(category) = draft.category {
        lines.push_str(&format!("分類: {}\n", category.as_str()));
    }
    lines.push('\n');
    lines
}

fn time_selection_prompt(now: DateTime<Utc>, display_time_zone: &str) -> Message {
    let tz = parse_time_zone_or_default(display_time_zone);
    let local_today = now.with_timezone(&tz).date_naive();
    let local_tomorrow = local_today + Days::new(1);
    let today = local_today.format("%Y/%m/%d");
    let tomorrow = local_tomorrow.format("%Y/%m/%d");

    let mut quick_replies = vec![QuickReplyAction::picker(
        "自訂時間",
        "action=select_time",
        PickerMode::DateTime,
    )];
    for hour in ["08:00", "10:00", "12:00", "14:00", "17:00"] {
        quick_replies.push(QuickReplyAction::text(
            format!("今天{}點", hour[..2].trim_start_matches('0')),
            format!("選擇時間:{today} {hour}"),
        ));
    }
    for hour in ["08:00", "12:00", "14:00", "16:00"] {
        quick_replies.push(QuickReplyAction::text(
            format!("明天{}點", hour[..2].trim_start_matches('0')),
            format!("選擇時間:{tomorrow} {hour}"),
        ));
    }

    Message::with_quick_replies(
        "📅 設定活動 (步驟 1/4)\n請選擇活動的日期和時間：",
        quick_replies,
    )
}

fn importance_prompt(draft: &EventDraft, display_time_zone: &str) -> Message {
    let chosen_time = draft
        .time
        .map(|time| format_event_time(time, display_time_zone))
        .unwrap_or_default();

    Message::with_quick_replies(
        format!("📅 設定活動 (步驟 2/4)\n您選擇的時間是: {chosen_time}\n\n請選擇活動的重要性等級："),
        vec![
            QuickReplyAction::text("高重要性", "重要性:高"),
            QuickReplyAction::text("中重要性", "重要性:中"),
            QuickReplyAction::text("低重要性", "重要性:低"),
        ],
    )
}

fn category_prompt(draft: &EventDraft, display_time_zone: &str) -> Message {
    Message::with_quick_replies(
        format!(
            "{}📅 設定活動 (步驟 3/4)\n請選擇活動分類：",
            progress_text(draft, display_time_zone)
        ),
        Category::ALL
            .iter()
            .map(|category| {
                QuickReplyAction::text(category.as_str(), format!("分類:{}", category.as_str()))
            })
            .collect(),
    )
}

fn name_prompt(draft: &EventDraft, display_time_zone: &str) -> Message {
    Message::with_quick_replies(
        format!("{}請輸入活動名稱：", progress_text(draft, display_time_zone)),
        vec![QuickReplyAction::text("取消", CANCEL_TEXT)],
    )
}

fn notes_prompt() -> Message {
    Message::with_quick_replies(
        "請直接輸入備註，或選擇「取消備註」跳過：",
        vec![QuickReplyAction::text("取消備註", "無")],
    )
}

fn structured_form_prompt() -> Message {
    let mut quick_replies = vec![QuickReplyAction::picker(
        "選擇日期時間",
        "action=select_time",
        PickerMode::DateTime,
    )];
    for importance in [Importance::High, Importance::Medium, Importance::Low] {
        quick_replies.push(QuickReplyAction::postback(
            format!("重要性:{}", importance.as_str()),
            format!("action=set_importance&value={}", importance.as_str()),
        ));
    }
    for category in Category::ALL {
        quick_replies.push(QuickReplyAction::postback(
            format!("分類:{}", category.as_str()),
            format!("action=set_category&value={}", category.as_str()),
        ));
    }
    quick_replies.push(QuickReplyAction::text("取消", CANCEL_TEXT));

    Message::with_quick_replies(
        "📅 活動設定\n可依任意順序選擇日期時間、重要性與分類；選定分類後輸入活動名稱。未選擇的欄位會採用預設值（時間：現在、重要性：中、分類：活動）。",
        quick_replies,
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{CreationFlow, FlowStep, FlowVariant, advance, start_guided, start_structured};
    use crate::intent::Intent;
    use crate::models::{Category, Importance};

    fn now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
            .single()
            .expect("valid datetime")
    }

    fn time_choice(raw: &str) -> Intent {
        Intent::TimeChoice {
            raw: raw.to_string(),
        }
    }

    #[test]
    fn guided_flow_advances_through_the_steps_in_order() {
        let (mut flow, _) = start_guided(now(), "UTC");
        assert_eq!(flow.step, FlowStep::SelectingDateTime);

        advance(&mut flow, &time_choice("2025/06/01 08:00"), now(), "UTC");
        assert_eq!(flow.step, FlowStep::SelectingImportance);
        assert!(flow.draft.time.is_some());

        advance(
            &mut flow,
            &Intent::SetImportance {
                label: "高".to_string(),
            },
            now(),
            "UTC",
        );
        assert_eq!(flow.step, FlowStep::SelectingCategory);
        assert_eq!(flow.draft.importance, Some(Importance::High));

        advance(
            &mut flow,
            &Intent::SetCategory {
                label: "會議".to_string(),
            },
            now(),
            "UTC",
        );
        assert_eq!(flow.step, FlowStep::WaitingForName);

        advance(
            &mut flow,
            &Intent::FreeText {
                text: "團隊會議".to_string(),
            },
            now(),
            "UTC",
        );
        assert_eq!(flow.step, FlowStep::WaitingForNotes);

        advance(
            &mut flow,
            &Intent::FreeText {
                text: "無".to_string(),
            },
            now(),
            "UTC",
        );
        assert_eq!(flow.step, FlowStep::WaitingForConfirmation);
        assert_eq!(flow.draft.notes.as_deref(), Some(""));
    }

    #[test]
    fn invalid_importance_is_rejected_with_the_valid_labels() {
        let (mut flow, _) = start_guided(now(), "UTC");
        advance(&mut flow, &time_choice("2025/06/01 08:00"), now(), "UTC");

        let replies = advance(
            &mut flow,
            &Intent::SetImportance {
                label: "極高".to_string(),
            },
            now(),
            "UTC",
        );

        assert_eq!(flow.step, FlowStep::SelectingImportance);
        assert!(replies[0].text.contains("無效的重要性: 極高"));
        assert!(replies[0].text.contains("「高」、「中」或「低」"));
    }

    #[test]
    fn invalid_time_text_re_prompts_without_advancing() {
        let (mut flow, _) = start_guided(now(), "UTC");

        let replies = advance(&mut flow, &time_choice("not a time"), now(), "UTC");

        assert_eq!(flow.step, FlowStep::SelectingDateTime);
        assert_eq!(flow.draft.time, None);
        assert!(replies[0].text.contains("時間格式不正確"));
    }

    #[test]
    fn out_of_order_input_re_prompts_and_keeps_collected_fields() {
        let (mut flow, _) = start_guided(now(), "UTC");
        advance(&mut flow, &time_choice("2025/06/01 08:00"), now(), "UTC");
        let saved_time = flow.draft.time;

        // A category arriving while importance is expected must not advance.
        let replies = advance(
            &mut flow,
            &Intent::SetCategory {
                label: "會議".to_string(),
            },
            now(),
            "UTC",
        );

        assert_eq!(flow.step, FlowStep::SelectingImportance);
        assert_eq!(flow.draft.time, saved_time);
        assert_eq!(flow.draft.category, None);
        assert!(replies[0].text.contains("重要性"));
    }

    #[test]
    fn structured_flow_accepts_fields_in_any_order() {
        let (mut flow, _) = start_structured();

        advance(
            &mut flow,
            &Intent::SetImportance {
                label: "低".to_string(),
            },
            now(),
            "UTC",
        );
        assert_eq!(flow.draft.importance, Some(Importance::Low));
        assert!(flow.step.is_selecting());

        advance(
            &mut flow,
            &Intent::SetCategory {
                label: "任務".to_string(),
            },
            now(),
            "UTC",
        );

        assert_eq!(flow.step, FlowStep::WaitingForName);
        assert_eq!(flow.draft.category, Some(Category::Task));
        // Unset time was defaulted to "now" by the category gate; the
        // user-picked importance survived.
        assert_eq!(flow.draft.time, Some(now()));
        assert_eq!(flow.draft.importance, Some(Importance::Low));
    }

    #[test]
    fn structured_default_fill_never_overwrites_user_values() {
        let (mut flow, _) = start_structured();
        let picked = Utc
            .with_ymd_and_hms(2025, 6, 2, 14, 0, 0)
            .single()
            .expect("valid datetime");

        advance(
            &mut flow,
            &Intent::PickDateTime {
                time: picked.naive_utc(),
            },
            now(),
            "UTC",
        );
        advance(
            &mut flow,
            &Intent::SetCategory {
                label: "活動".to_string(),
            },
            now(),
            "UTC",
        );

        assert_eq!(flow.draft.time, Some(picked));
        assert_eq!(flow.draft.importance, Some(Importance::Medium));
    }

    #[test]
    fn free_text_name_and_reprompt_on_selecting_steps() {
        let mut flow = CreationFlow::new(FlowVariant::Guided);

        let replies = advance(
            &mut flow,
            &Intent::FreeText {
                text: "太早的名稱".to_string(),
            },
            now(),
            "UTC",
        );

        assert_eq!(flow.step, FlowStep::SelectingDateTime);
        assert_eq!(flow.draft.name, None);
        assert!(replies[0].text.contains("日期和時間"));
    }
}
