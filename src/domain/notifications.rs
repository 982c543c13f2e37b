//! Notification domain types
//!
//! In-app notifications, persisted and pushed live over the WebSocket hub.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    // Project lifecycle
    ProjectSubmitted,
    DesignerAssigned,
    ProjectStatusChanged,

    // Designer suggestions
    SuggestionAdded,
    SuggestionReviewed,

    // Quotations
    QuotationReceived,
    QuotationAccepted,
    QuotationRejected,

    // Chat
    NewMessage,

    System,
}

text_enum!(NotificationType {
    ProjectSubmitted => "project_submitted",
    DesignerAssigned => "designer_assigned",
    ProjectStatusChanged => "project_status_changed",
    SuggestionAdded => "suggestion_added",
    SuggestionReviewed => "suggestion_reviewed",
    QuotationReceived => "quotation_received",
    QuotationAccepted => "quotation_accepted",
    QuotationRejected => "quotation_rejected",
    NewMessage => "new_message",
    System => "system",
});

pub const NOTIFICATION_COLUMNS: &str =
    "id, user_id, type, title, message, data, is_read, read_at, created_at";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification to be created
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: Option<String>,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: Option<bool>,
    #[serde(default, rename = "type")]
    pub notification_type: Option<NotificationType>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkReadRequest {
    #[serde(default)]
    pub notification_ids: Option<Vec<Uuid>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_match_serde() {
        for ty in NotificationType::ALL {
            let json = serde_json::to_string(ty).unwrap();
            assert_eq!(json.trim_matches('"'), ty.as_str());
        }
    }

    #[test]
    fn query_accepts_type_filter() {
        let q: NotificationQuery =
            serde_json::from_str(r#"{"type":"quotation_received","unread_only":true}"#).unwrap();
        assert_eq!(q.notification_type, Some(NotificationType::QuotationReceived));
        assert_eq!(q.unread_only, Some(true));
    }
}
