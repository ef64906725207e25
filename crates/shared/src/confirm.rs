use crate::flow::FlowVariant;
use crate::models::{EventDraft, NewEvent};
use crate::timezone::format_event_time;
use crate::transport::{Message, QuickReplyAction};

/// Renders the pending draft as a human-readable summary.
pub fn render_summary(draft: &EventDraft, display_time_zone: &str) -> String {
    let mut summary = String::from("請確認活動資訊:\n\n");
    if let Some(time) = draft.time {
        summary.push_str(&format!("時間: {}\n", format_event_time(time, display_time_zone)));
    }
    if let Some(importance) = draft.importance {
        summary.push_str(&format!("重要性: {}\n", importance.as_str()));
    }
    if let Some(category) = draft.category {
        summary.push_str(&format!("分類: {}\n", category.as_str()));
    }
    if let Some(name) = draft.name.as_deref() {
        summary.push_str(&format!("活動名稱: {name}\n"));
    }
    match draft.notes.as_deref() {
        Some("") | None => summary.push_str("備註: (無備註)\n"),
        Some(notes) => summary.push_str(&format!("備註: {notes}\n")),
    }
    summary
}

/// Exactly two actions, each encoding which flow variant it applies to.
pub fn confirm_cancel_actions(variant: FlowVariant) -> Vec<QuickReplyAction> {
    let suffix = match variant {
        FlowVariant::Guided => "",
        FlowVariant::Structured => "_structured",
    };

    vec![
        QuickReplyAction::postback("取消", format!("action=cancel_event{suffix}")),
        QuickReplyAction::postback("確認", format!("action=confirm_event{suffix}")),
    ]
}

pub fn confirmation_messages(
    draft: &EventDraft,
    variant: FlowVariant,
    display_time_zone: &str,
) -> Vec<Message> {
    vec![Message::with_quick_replies(
        render_summary(draft, display_time_zone),
        confirm_cancel_actions(variant),
    )]
}

pub fn commit_success_message(event: &NewEvent, display_time_zone: &str) -> String {
    let mut message = format!(
        "✅ 活動已設定成功！\n\n活動名稱: {}\n時間: {}\n分類: {}\n重要性: {}",
        event.name,
        format_event_time(event.time, display_time_zone),
        event.category.as_str(),
        event.importance.as_str(),
    );
    if !event.notes.is_empty() {
        message.push_str(&format!("\n備註: {}", event.notes));
    }
    message
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{commit_success_message, confirmation_messages, render_summary};
    use crate::flow::FlowVariant;
    use crate::models::{Category, EventDraft, Importance, NewEvent};
    use crate::transport::QuickReplyAction;

    fn draft() -> EventDraft {
        EventDraft {
            time: Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).single(),
            importance: Some(Importance::High),
            category: Some(Category::Meeting),
            name: Some("團隊會議".to_string()),
            notes: Some(String::new()),
        }
    }

    #[test]
    fn summary_lists_every_present_field() {
        let summary = render_summary(&draft(), "UTC");
        assert!(summary.contains("時間: 2025/06/02 14:00"));
        assert!(summary.contains("重要性: 高"));
        assert!(summary.contains("分類: 會議"));
        assert!(summary.contains("活動名稱: 團隊會議"));
        assert!(summary.contains("備註: (無備註)"));
    }

    #[test]
    fn confirmation_offers_exactly_confirm_and_cancel() {
        let messages = confirmation_messages(&draft(), FlowVariant::Structured, "UTC");
        assert_eq!(messages.len(), 1);

        let actions = &messages[0].quick_replies;
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            QuickReplyAction::postback("取消", "action=cancel_event_structured")
        );
        assert_eq!(
            actions[1],
            QuickReplyAction::postback("確認", "action=confirm_event_structured")
        );
    }

    #[test]
    fn success_message_includes_notes_only_when_present() {
        let mut event = NewEvent {
            name: "開會".to_string(),
            time: Utc
                .with_ymd_and_hms(2025, 6, 2, 14, 0, 0)
                .single()
                .expect("valid datetime"),
            category: Category::Meeting,
            importance: Importance::Medium,
            notes: String::new(),
        };
        assert!(!commit_success_message(&event, "UTC").contains("備註"));

        event.notes = "帶簡報".to_string();
        assert!(commit_success_message(&event, "UTC").contains("備註: 帶簡報"));
    }
}
