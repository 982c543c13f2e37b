//! Chat domain types
//!
//! A chat is a two-party conversation, optionally scoped to a project. The
//! participant pair is stored ordered (`participant_a < participant_b`) so a
//! pair maps to a single row per project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

pub const MAX_MESSAGE_CHARS: usize = 4000;

/// Order a participant pair the way the `chats` table stores it.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Trimmed message body, or a reason it can't be sent.
pub fn validate_body(body: &str) -> Result<&str, String> {
    let body = body.trim();
    if body.is_empty() {
        return Err("Message must not be empty".to_string());
    }
    if body.chars().count() > MAX_MESSAGE_CHARS {
        return Err(format!(
            "Message must be at most {MAX_MESSAGE_CHARS} characters"
        ));
    }
    Ok(body)
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ChatRow {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participant_a == user_id || self.participant_b == user_id
    }

    pub fn counterpart(&self, user_id: Uuid) -> Uuid {
        if self.participant_a == user_id {
            self.participant_b
        } else {
            self.participant_a
        }
    }
}

/// Chat list entry from the caller's point of view
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatSummaryRow {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub counterpart_id: Uuid,
    pub counterpart_name: String,
    pub counterpart_role: String,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatCounterpart {
    pub id: Uuid,
    pub name: String,
    pub role: Option<Role>,
    pub online: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub counterpart: ChatCounterpart,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
}

impl ChatSummary {
    pub fn from_row(row: ChatSummaryRow, online: bool) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            counterpart: ChatCounterpart {
                id: row.counterpart_id,
                name: row.counterpart_name,
                role: row.counterpart_role.parse().ok(),
                online,
            },
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub attachment_url: Option<String>,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartChatRequest {
    pub participant_id: Uuid,
    #[serde(default)]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
    #[serde(default)]
    pub attachment_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_order_is_stable() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ordered_pair(a, b), ordered_pair(b, a));
        let (lo, hi) = ordered_pair(a, b);
        assert!(lo <= hi);
    }

    #[test]
    fn body_validation() {
        assert_eq!(validate_body("  hello  "), Ok("hello"));
        assert!(validate_body("   ").is_err());
        assert!(validate_body(&"x".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
        assert!(validate_body(&"é".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }

    #[test]
    fn counterpart_lookup() {
        let (a, b) = ordered_pair(Uuid::new_v4(), Uuid::new_v4());
        let chat = ChatRow {
            id: Uuid::new_v4(),
            project_id: None,
            participant_a: a,
            participant_b: b,
            last_message_at: None,
            created_at: Utc::now(),
        };
        assert_eq!(chat.counterpart(a), b);
        assert_eq!(chat.counterpart(b), a);
        assert!(chat.has_participant(a));
        assert!(!chat.has_participant(Uuid::new_v4()));
    }
}
