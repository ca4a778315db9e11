use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::push::{ErrorDetails, PushMessage, Ticket};

/// Notification kinds the Patch mobile client knows how to render and
/// deep-link. The wire tag doubles as the push category identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    RequestAssigned,
    RequestUpdated,
    ChatMessage,
    Announcement,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestAssigned => "request_assigned",
            Self::RequestUpdated => "request_updated",
            Self::ChatMessage => "chat_message",
            Self::Announcement => "announcement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request_assigned" => Some(Self::RequestAssigned),
            "request_updated" => Some(Self::RequestUpdated),
            "chat_message" => Some(Self::ChatMessage),
            "announcement" => Some(Self::Announcement),
            _ => None,
        }
    }
}

/// Outbound notification metadata, before any record exists for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationInput {
    pub kind: NotificationKind,
    pub to: String,
    pub body: String,
    pub payload: Value,
}

/// The persisted unit of work: payload, latest ticket, receipt, and retry
/// bookkeeping. After any send attempt exactly one of `success_ticket` and
/// `error_ticket` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub to: String,
    pub body: String,
    pub payload: Value,
    pub sent_count: i32,
    pub next_send_at: Option<OffsetDateTime>,
    /// Ticket id from the latest accepted submission.
    pub success_ticket: Option<String>,
    pub error_ticket: Option<ErrorDetails>,
    pub error_receipt: Option<ErrorDetails>,
    pub created_at: OffsetDateTime,
}

impl NotificationRecord {
    pub fn materialize(input: NotificationInput, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: input.kind,
            to: input.to,
            body: input.body,
            payload: input.payload,
            sent_count: 0,
            next_send_at: None,
            success_ticket: None,
            error_ticket: None,
            error_receipt: None,
            created_at: now,
        }
    }

    /// Build the gateway message for this record: fixed delivery sound, the
    /// payload merged with the kind tag, and the kind as the category id.
    pub fn to_push_message(&self) -> PushMessage {
        let mut data = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };
        data.insert(
            "type".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );

        PushMessage {
            to: self.to.clone(),
            sound: "default".to_string(),
            body: self.body.clone(),
            data: Value::Object(data),
            category_id: self.kind.as_str().to_string(),
        }
    }

    /// Fold one send attempt's ticket into the record: bump the attempt count,
    /// push the retry slot out by `backoff_base^sent_count` minutes, and keep
    /// exactly one of the ticket fields. A fresh attempt also clears any
    /// receipt error left over from the previous ticket.
    pub fn record_attempt(&mut self, ticket: &Ticket, now: OffsetDateTime, backoff_base: u32) {
        self.sent_count += 1;
        self.next_send_at = Some(now + backoff_delay(backoff_base, self.sent_count));
        self.error_receipt = None;
        match ticket {
            Ticket::Ok { id } => {
                self.success_ticket = Some(id.clone());
                self.error_ticket = None;
            }
            Ticket::Error { details, .. } => {
                self.error_ticket = Some(details.clone());
                self.success_ticket = None;
            }
        }
    }

    pub fn is_retry_eligible(&self, now: OffsetDateTime) -> bool {
        (self.error_ticket.is_some() || self.error_receipt.is_some())
            && self.next_send_at.is_some_and(|at| at <= now)
    }

    /// A record is receipt-pending until its ticket's receipt resolves; a
    /// transient receipt error removes it from the polling set until resent.
    pub fn is_receipt_pending(&self) -> bool {
        self.success_ticket.is_some() && self.error_receipt.is_none()
    }
}

/// `backoff_base^sent_count` minutes. The exponent saturates well past the
/// point where the cleanup sweep would have purged the record anyway.
pub fn backoff_delay(backoff_base: u32, sent_count: i32) -> Duration {
    let exponent = sent_count.clamp(1, 16) as u32;
    Duration::minutes(i64::from(backoff_base).saturating_pow(exponent))
}
