//! Notification service
//!
//! Routes call these helpers after a state change commits. Each helper
//! persists the notification and pushes it to the recipient's live
//! connections. Failures are logged and swallowed so they never fail the
//! request that triggered them.

use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::app::AppState;
use crate::domain::notifications::{
    NewNotification, Notification, NotificationType, NOTIFICATION_COLUMNS,
};
use crate::domain::projects::ProjectStatus;
use crate::domain::suggestions::SuggestionStatus;
use crate::services::realtime::{RealtimeHub, ServerEvent};

/// Insert a notification and push it over the hub.
pub async fn create_notification(
    db: &PgPool,
    hub: &RealtimeHub,
    new: NewNotification,
) -> Result<Notification, sqlx::Error> {
    let notification = sqlx::query_as::<_, Notification>(&format!(
        r#"
        INSERT INTO notifications (id, user_id, type, title, message, data)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {NOTIFICATION_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(new.notification_type.as_str())
    .bind(&new.title)
    .bind(&new.message)
    .bind(&new.data)
    .fetch_one(db)
    .await?;

    let delivered = hub.send_to_user(
        notification.user_id,
        &ServerEvent::Notification {
            notification: notification.clone(),
        },
    );

    tracing::info!(
        user_id = %notification.user_id,
        notification_type = %new.notification_type,
        notification_id = %notification.id,
        delivered,
        "Notification created"
    );

    Ok(notification)
}

/// Fire-and-log variant used by the typed helpers below.
pub async fn notify(state: &AppState, new: NewNotification) {
    let user_id = new.user_id;
    let notification_type = new.notification_type;
    if let Err(e) = create_notification(&state.db, &state.hub, new).await {
        tracing::error!(
            user_id = %user_id,
            notification_type = %notification_type,
            error = %e,
            "Failed to create notification"
        );
    }
}

pub async fn notify_project_submitted(
    state: &AppState,
    designer_id: Uuid,
    project_id: Uuid,
    project_title: &str,
) {
    notify(
        state,
        NewNotification {
            user_id: designer_id,
            notification_type: NotificationType::ProjectSubmitted,
            title: "Project submitted".to_string(),
            message: Some(format!("'{}' has been submitted for design", project_title)),
            data: json!({ "project_id": project_id }),
        },
    )
    .await
}

pub async fn notify_designer_assigned(
    state: &AppState,
    designer_id: Uuid,
    project_id: Uuid,
    project_title: &str,
) {
    notify(
        state,
        NewNotification {
            user_id: designer_id,
            notification_type: NotificationType::DesignerAssigned,
            title: "New project assigned".to_string(),
            message: Some(format!("You have been assigned to '{}'", project_title)),
            data: json!({ "project_id": project_id }),
        },
    )
    .await
}

pub async fn notify_status_changed(
    state: &AppState,
    recipients: &[Uuid],
    project_id: Uuid,
    project_title: &str,
    from: ProjectStatus,
    to: ProjectStatus,
) {
    for user_id in recipients {
        notify(
            state,
            NewNotification {
                user_id: *user_id,
                notification_type: NotificationType::ProjectStatusChanged,
                title: "Project status updated".to_string(),
                message: Some(format!("'{}' moved from {} to {}", project_title, from, to)),
                data: json!({
                    "project_id": project_id,
                    "from_status": from.as_str(),
                    "to_status": to.as_str(),
                }),
            },
        )
        .await;
    }
}

pub async fn notify_suggestion_added(
    state: &AppState,
    customer_id: Uuid,
    project_id: Uuid,
    suggestion_id: Uuid,
    material_name: &str,
) {
    notify(
        state,
        NewNotification {
            user_id: customer_id,
            notification_type: NotificationType::SuggestionAdded,
            title: "New material suggestion".to_string(),
            message: Some(format!("Your designer suggested {}", material_name)),
            data: json!({ "project_id": project_id, "suggestion_id": suggestion_id }),
        },
    )
    .await
}

pub async fn notify_suggestion_reviewed(
    state: &AppState,
    designer_id: Uuid,
    project_id: Uuid,
    suggestion_id: Uuid,
    material_name: &str,
    status: SuggestionStatus,
) {
    notify(
        state,
        NewNotification {
            user_id: designer_id,
            notification_type: NotificationType::SuggestionReviewed,
            title: format!("Suggestion {}", status),
            message: Some(format!("The customer {} {}", status, material_name)),
            data: json!({
                "project_id": project_id,
                "suggestion_id": suggestion_id,
                "status": status.as_str(),
            }),
        },
    )
    .await
}

pub async fn notify_quotation_received(
    state: &AppState,
    customer_id: Uuid,
    project_id: Uuid,
    quotation_id: Uuid,
    quotation_number: &str,
    total: Decimal,
) {
    notify(
        state,
        NewNotification {
            user_id: customer_id,
            notification_type: NotificationType::QuotationReceived,
            title: "New quotation received".to_string(),
            message: Some(format!("Quotation {} for ₹{}", quotation_number, total)),
            data: json!({
                "project_id": project_id,
                "quotation_id": quotation_id,
                "quotation_number": quotation_number,
                "total": total.to_string(),
            }),
        },
    )
    .await
}

pub async fn notify_quotation_accepted(
    state: &AppState,
    seller_id: Uuid,
    project_id: Uuid,
    quotation_id: Uuid,
    quotation_number: &str,
) {
    notify(
        state,
        NewNotification {
            user_id: seller_id,
            notification_type: NotificationType::QuotationAccepted,
            title: "Quotation accepted".to_string(),
            message: Some(format!("Your quotation {} was accepted", quotation_number)),
            data: json!({
                "project_id": project_id,
                "quotation_id": quotation_id,
                "quotation_number": quotation_number,
            }),
        },
    )
    .await
}

pub async fn notify_quotation_rejected(
    state: &AppState,
    seller_id: Uuid,
    project_id: Uuid,
    quotation_id: Uuid,
    quotation_number: &str,
    reason: Option<&str>,
) {
    let message = match reason {
        Some(reason) => format!("Your quotation {} was declined: {}", quotation_number, reason),
        None => format!("Your quotation {} was declined", quotation_number),
    };
    notify(
        state,
        NewNotification {
            user_id: seller_id,
            notification_type: NotificationType::QuotationRejected,
            title: "Quotation declined".to_string(),
            message: Some(message),
            data: json!({
                "project_id": project_id,
                "quotation_id": quotation_id,
                "quotation_number": quotation_number,
                "reason": reason,
            }),
        },
    )
    .await
}

pub async fn notify_new_message(
    state: &AppState,
    recipient_id: Uuid,
    chat_id: Uuid,
    sender_name: &str,
    preview: &str,
) {
    notify(
        state,
        NewNotification {
            user_id: recipient_id,
            notification_type: NotificationType::NewMessage,
            title: format!("New message from {}", sender_name),
            message: Some(message_preview(preview)),
            data: json!({ "chat_id": chat_id, "sender_name": sender_name }),
        },
    )
    .await
}

const PREVIEW_CHARS: usize = 120;

fn message_preview(body: &str) -> String {
    if body.chars().count() <= PREVIEW_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(PREVIEW_CHARS).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previews_are_truncated_on_char_boundaries() {
        assert_eq!(message_preview("hello"), "hello");
        let long = "नमस्ते ".repeat(40);
        let preview = message_preview(&long);
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }
}
