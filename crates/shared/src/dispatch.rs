use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::confirm;
use crate::flow::{self, FlowStep, FlowVariant};
use crate::intent::{Intent, ParsedCreateCommand, PostbackParams, QueryCommandError};
use crate::models::{Category, Importance, NewEvent, normalize_notes, truncate_to_minute};
use crate::query::{
    DayRange, end_date_picker_message, query_menu_message, render_query_results,
    start_date_picker_message,
};
use crate::reminder;
use crate::session::{Session, SessionStore};
use crate::store::EventStore;
use crate::transport::{Message, MessagingTransport, QuickReplyAction};

const STORE_WRITE_FAILED: &str = "活動設定失敗，請稍後再試";
const QUERY_FAILED: &str = "查詢失敗，請稍後再試";

/// One inbound delivery from the messaging channel, already unwrapped from
/// the webhook envelope.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub user_id: String,
    pub reply_token: String,
    pub kind: InboundKind,
}

#[derive(Debug, Clone)]
pub enum InboundKind {
    Text { text: String },
    Postback { data: String, params: PostbackParams },
}

/// Routes every inbound delivery: one parsing stage produces an [`Intent`],
/// the session entry is locked for the whole turn, and the transition logic
/// decides replies plus store effects.
pub struct Dispatcher {
    sessions: SessionStore,
    store: Arc<dyn EventStore>,
    transport: Arc<dyn MessagingTransport>,
    reminder_recipients: Vec<String>,
    display_time_zone: String,
}

impl Dispatcher {
    pub fn new(
        session_ttl_seconds: u64,
        store: Arc<dyn EventStore>,
        transport: Arc<dyn MessagingTransport>,
        reminder_recipients: Vec<String>,
        display_time_zone: String,
    ) -> Self {
        Self {
            sessions: SessionStore::new(session_ttl_seconds),
            store,
            transport,
            reminder_recipients,
            display_time_zone,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one delivery end to end, replying through the transport.
    pub async fn handle_event(&self, event: InboundEvent, now: DateTime<Utc>) {
        let intent = match &event.kind {
            InboundKind::Text { text } => Intent::from_text(text),
            InboundKind::Postback { data, params } => {
                match Intent::from_postback(data, params) {
                    Some(intent) => intent,
                    None => {
                        warn!(user_id = %event.user_id, data = %data, "unrecognized postback action");
                        let replies = vec![main_menu_message("無法處理此操作，請選擇功能：")];
                        self.send_reply(&event, replies).await;
                        return;
                    }
                }
            }
        };

        let replies = self.replies_for(&event.user_id, &intent, now).await;
        self.send_reply(&event, replies).await;
    }

    async fn send_reply(&self, event: &InboundEvent, replies: Vec<Message>) {
        if replies.is_empty() {
            return;
        }
        if let Err(err) = self.transport.reply(&event.reply_token, &replies).await {
            error!(user_id = %event.user_id, "failed to reply: {err}");
        }
    }

    async fn replies_for(&self, user_id: &str, intent: &Intent, now: DateTime<Utc>) -> Vec<Message> {
        // Session-free intents first; everything else runs under the user's
        // session lock so concurrent deliveries for one user cannot race.
        match intent {
            Intent::Help => return vec![help_message()],
            Intent::ManualRemind => return self.manual_remind(now).await,
            Intent::OpenQueryMenu => return vec![query_menu_message()],
            Intent::StartDateRange => return vec![start_date_picker_message()],
            Intent::QueryCommand { start, end } => {
                let range = match end {
                    Some(end) => match DayRange::span(*start, *end) {
                        Ok(range) => range,
                        Err(_) => return vec![Message::text("結束日期不能早於開始日期，請重新選擇")],
                    },
                    None => DayRange::single_day(*start),
                };
                return self.run_query(range).await;
            }
            Intent::MalformedQueryCommand { reason } => return vec![query_usage_message(*reason)],
            Intent::QueryDate { date } => return self.run_query(DayRange::single_day(*date)).await,
            Intent::QueryRelative(window) => {
                let range = DayRange::relative(*window, now.date_naive());
                return self.run_query(range).await;
            }
            Intent::CreateCommand(parsed) => return self.one_shot_create(parsed, now).await,
            Intent::MalformedCreateCommand => return vec![create_usage_message()],
            _ => {}
        }

        let entry = self.sessions.entry(user_id).await;
        let mut session = entry.lock().await;
        session.last_activity = now;

        match intent {
            Intent::StartGuidedCreation => {
                let (creation, messages) = flow::start_guided(now, &self.display_time_zone);
                session.creation = Some(creation);
                messages
            }
            Intent::OpenStructuredForm => {
                let (creation, messages) = flow::start_structured();
                session.creation = Some(creation);
                messages
            }
            Intent::CancelFlow => {
                if session.creation.take().is_some() {
                    info!(user_id = %user_id, "creation flow cancelled");
                    vec![Message::text("已取消活動設定")]
                } else {
                    vec![main_menu_message("目前沒有進行中的活動設定。請選擇功能：")]
                }
            }
            Intent::Cancel { variant } => self.handle_cancel(&mut session, *variant, user_id),
            Intent::Confirm { variant } => {
                self.handle_confirm(&mut session, *variant, user_id, now).await
            }
            Intent::PickRangeStart { date } => {
                session.pending_query_start = Some(*date);
                vec![end_date_picker_message(*date)]
            }
            Intent::PickRangeEnd { date } => self.finish_range_query(&mut session, *date).await,
            Intent::PickDateTime { .. }
            | Intent::TimeChoice { .. }
            | Intent::SetImportance { .. }
            | Intent::SetCategory { .. } => match session.creation.as_mut() {
                Some(creation) => flow::advance(creation, intent, now, &self.display_time_zone),
                None => vec![main_menu_message("請先開始設定活動。請選擇功能：")],
            },
            Intent::FreeText { text } => match session.creation.as_mut() {
                Some(creation) => flow::advance(creation, intent, now, &self.display_time_zone),
                None => vec![main_menu_message(text)],
            },
            // Session-free intents were handled above.
            _ => Vec::new(),
        }
    }

    fn handle_cancel(
        &self,
        session: &mut Session,
        variant: FlowVariant,
        user_id: &str,
    ) -> Vec<Message> {
        match session.creation.as_ref() {
            Some(creation) if creation.variant == variant => {
                session.creation = None;
                info!(user_id = %user_id, "creation flow cancelled");
                vec![Message::text("已取消活動設定")]
            }
            _ => vec![Message::text("無法取消，目前沒有進行中的活動設定")],
        }
    }

    async fn handle_confirm(
        &self,
        session: &mut Session,
        variant: FlowVariant,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        let Some(creation) = session
            .creation
            .as_mut()
            .filter(|creation| creation.variant == variant)
        else {
            return vec![Message::text("無法確認活動，請重新設定")];
        };

        let new_event = match creation.draft.clone().into_new_event(now) {
            Ok(new_event) => new_event,
            Err(missing) => {
                // Missing required input rejects the confirmation but keeps
                // the draft so the user can supply the field.
                creation.step = FlowStep::WaitingForName;
                let mut messages = vec![Message::text(format!(
                    "缺少{}，無法確認。請補齊後再確認。",
                    missing.label()
                ))];
                messages.extend(flow::step_prompt(creation, now, &self.display_time_zone));
                return messages;
            }
        };

        match self.store.create_event(&new_event).await {
            Ok(event_id) => {
                info!(user_id = %user_id, event_id = %event_id, "event committed");
                session.creation = None;
                vec![Message::text(confirm::commit_success_message(
                    &new_event,
                    &self.display_time_zone,
                ))]
            }
            Err(err) => {
                error!(user_id = %user_id, "failed to commit event: {err}");
                // The draft survives a store failure so the user can retry
                // the confirmation or cancel explicitly.
                vec![Message::with_quick_replies(
                    format!("{STORE_WRITE_FAILED}。您的草稿已保留，可再次確認或取消。"),
                    confirm::confirm_cancel_actions(variant),
                )]
            }
        }
    }

    async fn finish_range_query(
        &self,
        session: &mut Session,
        end_day: chrono::NaiveDate,
    ) -> Vec<Message> {
        let Some(start_day) = session.pending_query_start else {
            return vec![Message::text("請先選擇開始日期")];
        };

        let range = match DayRange::span(start_day, end_day) {
            Ok(range) => range,
            // The pending start survives so the user only re-picks the end.
            Err(_) => return vec![Message::text("結束日期不能早於開始日期，請重新選擇")],
        };

        let replies = self.run_query(range).await;
        let query_succeeded = replies
            .first()
            .is_none_or(|message| message.text != QUERY_FAILED);
        if query_succeeded {
            session.pending_query_start = None;
        }
        replies
    }

    async fn run_query(&self, range: DayRange) -> Vec<Message> {
        match self
            .store
            .query_range(range.start_utc(), range.end_utc())
            .await
        {
            Ok(events) => vec![Message::text(render_query_results(
                &range,
                &events,
                &self.display_time_zone,
            ))],
            Err(err) => {
                error!("failed to query events: {err}");
                vec![Message::text(QUERY_FAILED)]
            }
        }
    }

    async fn one_shot_create(&self, parsed: &ParsedCreateCommand, now: DateTime<Utc>) -> Vec<Message> {
        let importance = match parsed.importance_label.as_deref() {
            Some(label) => match Importance::parse_label(label) {
                Some(importance) => importance,
                None => {
                    return vec![Message::text(format!(
                        "無效的重要性: {label}。請使用{}。",
                        Importance::valid_labels()
                    ))];
                }
            },
            None => Importance::default(),
        };

        let category = match parsed.category_label.as_deref() {
            Some(label) => match Category::parse_label(label) {
                Some(category) => category,
                None => {
                    let valid = Category::ALL
                        .iter()
                        .map(|category| format!("「{}」", category.as_str()))
                        .collect::<Vec<_>>()
                        .join("、");
                    return vec![Message::text(format!("無效的分類: {label}。請使用{valid}。"))];
                }
            },
            None => Category::default(),
        };

        let new_event = NewEvent {
            name: parsed.name.clone(),
            time: truncate_to_minute(parsed.time.and_utc()),
            category,
            importance,
            notes: parsed
                .notes
                .as_deref()
                .map(normalize_notes)
                .unwrap_or_default(),
        };

        match self.store.create_event(&new_event).await {
            Ok(event_id) => {
                info!(event_id = %event_id, "event committed via command");
                vec![Message::text(confirm::commit_success_message(
                    &new_event,
                    &self.display_time_zone,
                ))]
            }
            Err(err) => {
                error!("failed to commit command event: {err}");
                vec![Message::text(STORE_WRITE_FAILED)]
            }
        }
    }

    async fn manual_remind(&self, now: DateTime<Utc>) -> Vec<Message> {
        let outcome = reminder::run_once(
            self.store.as_ref(),
            self.transport.as_ref(),
            &self.reminder_recipients,
            &self.display_time_zone,
            now,
        )
        .await;

        if let Err(err) = &outcome {
            error!("manual reminder run failed: {err}");
        }

        vec![Message::text(reminder::manual_outcome(&outcome))]
    }
}

fn main_menu_actions() -> Vec<QuickReplyAction> {
    vec![
        QuickReplyAction::text("設定活動", "設定活動"),
        QuickReplyAction::text("查詢活動", "查詢活動"),
        QuickReplyAction::text("手動提醒", "手動提醒"),
    ]
}

fn main_menu_message(text: &str) -> Message {
    Message::with_quick_replies(text, main_menu_actions())
}

fn help_message() -> Message {
    let text = "📅 活動管理 Bot 使用說明 📅\n\n\
🔸 互動方式:\n\
   - 「設定活動」將引導您完成活動設定的步驟\n\
   - 「查詢活動」提供多種方式查詢活動\n\n\
🔸 指令方式:\n\
1️⃣ 設定活動:\n\
   格式: 新增活動 活動名稱 YYYY/MM/DD HH:MM [分類] [重要性] [備註]\n\
   範例: 新增活動 團隊會議 2025/01/25 14:00 [會議] [高] [討論年度計劃]\n\n\
2️⃣ 查詢活動:\n\
   格式: 查詢活動:[開始日期],[結束日期]\n\
   範例: 查詢活動:2025/01/01,2025/12/31\n\
   也可以只指定一天: 查詢活動:2025/12/25\n\n\
3️⃣ 手動提醒:\n\
   直接發送「手動提醒」，立即依重要性檢查並發送活動提醒\n\n\
🔔 自動提醒每天早上定時檢查未來 7 天內的活動並依重要性發送提醒。";

    Message::with_quick_replies(text, main_menu_actions())
}

fn create_usage_message() -> Message {
    Message::text(
        "請使用以下格式新增活動：\n\n新增活動 活動名稱 YYYY/MM/DD HH:MM [分類] [重要性] [備註]\n\n例如：\n新增活動 開會 2025/01/01 14:30 [會議] [高] [準備簡報]",
    )
}

fn query_usage_message(reason: QueryCommandError) -> Message {
    Message::text(format!(
        "❌ 查詢活動錯誤: {}\n\n正確格式: 查詢活動:[開始日期],[結束日期]\n範例: 查詢活動:2025/06/01,2025/06/30",
        reason.message()
    ))
}
