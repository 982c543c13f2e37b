//! Notification routes
//!
//! In-app notifications for the current user: list, read state, cleanup.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, MessageResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::notifications::{
    MarkReadRequest, Notification, NotificationQuery, UnreadCountResponse, NOTIFICATION_COLUMNS,
};
use crate::error::ApiError;

/// GET /api/notifications
pub async fn list_notifications(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let unread_only = filter.unread_only.unwrap_or(false);
    let notification_type = filter.notification_type.map(|t| t.as_str());

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM notifications
        WHERE user_id = $1
          AND ($2::bool = FALSE OR is_read = FALSE)
          AND ($3::text IS NULL OR type = $3)
        "#,
    )
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(notification_type)
    .fetch_one(&state.db)
    .await?;

    let notifications = sqlx::query_as::<_, Notification>(&format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS} FROM notifications
        WHERE user_id = $1
          AND ($2::bool = FALSE OR is_read = FALSE)
          AND ($3::text IS NULL OR type = $3)
        ORDER BY created_at DESC, id
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(auth.user_id)
    .bind(unread_only)
    .bind(notification_type)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    Ok(Paginated::new(notifications, &pagination, total))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
    )
    .bind(auth.user_id)
    .fetch_one(&state.db)
    .await?;

    Ok(DataResponse::new(UnreadCountResponse { count }))
}

/// GET /api/notifications/:id
pub async fn get_notification(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = sqlx::query_as::<_, Notification>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1 AND user_id = $2"
    ))
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(DataResponse::new(notification))
}

/// PUT /api/notifications/:id/read
///
/// Marking an already-read notification is a no-op.
pub async fn mark_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let notification = sqlx::query_as::<_, Notification>(&format!(
        r#"
        UPDATE notifications
        SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
        WHERE id = $1 AND user_id = $2
        RETURNING {NOTIFICATION_COLUMNS}
        "#
    ))
    .bind(notification_id)
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification not found"))?;

    Ok(DataResponse::new(notification))
}

/// PUT /api/notifications/read-all
pub async fn mark_all_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query(
        "UPDATE notifications SET is_read = TRUE, read_at = NOW() WHERE user_id = $1 AND is_read = FALSE",
    )
    .bind(auth.user_id)
    .execute(&state.db)
    .await?;

    tracing::debug!(user_id = %auth.user_id, marked = result.rows_affected(), "Notifications marked read");
    Ok(MessageResponse::new(format!(
        "{} notification(s) marked as read",
        result.rows_affected()
    )))
}

/// POST /api/notifications/mark-read
pub async fn mark_batch_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let ids = req.notification_ids.unwrap_or_default();
    if ids.is_empty() {
        return Err(ApiError::validation(
            "notification_ids",
            "At least one notification id is required",
        ));
    }

    let result = sqlx::query(
        r#"
        UPDATE notifications SET is_read = TRUE, read_at = NOW()
        WHERE user_id = $1 AND id = ANY($2) AND is_read = FALSE
        "#,
    )
    .bind(auth.user_id)
    .bind(&ids)
    .execute(&state.db)
    .await?;

    Ok(MessageResponse::new(format!(
        "{} notification(s) marked as read",
        result.rows_affected()
    )))
}

/// DELETE /api/notifications/:id
pub async fn delete_notification(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(notification_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(notification_id)
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(NoContent)
}

/// DELETE /api/notifications
///
/// Removes read notifications only; unread ones stay.
pub async fn delete_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sqlx::query("DELETE FROM notifications WHERE user_id = $1 AND is_read = TRUE")
        .bind(auth.user_id)
        .execute(&state.db)
        .await?;

    Ok(MessageResponse::new(format!(
        "{} notification(s) deleted",
        result.rows_affected()
    )))
}
