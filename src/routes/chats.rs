//! Chat routes
//!
//! Messages are stored first and then pushed to both participants through
//! the realtime hub. Offline recipients get a notification instead.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, MessageResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::chat::{
    ordered_pair, validate_body, ChatMessage, ChatRow, ChatSummary, ChatSummaryRow,
    SendMessageRequest, StartChatRequest,
};
use crate::domain::clean_opt;
use crate::error::ApiError;
use crate::routes::projects::load_project;
use crate::services::notifications;
use crate::services::realtime::ServerEvent;

const CHAT_COLUMNS: &str = "id, project_id, participant_a, participant_b, last_message_at, created_at";
const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, body, attachment_url, is_read, read_at, created_at";

/// Load a chat the user takes part in. Other users get a 404.
pub(crate) async fn load_chat_for(
    db: &PgPool,
    chat_id: Uuid,
    user_id: Uuid,
) -> Result<ChatRow, ApiError> {
    sqlx::query_as::<_, ChatRow>(&format!("SELECT {CHAT_COLUMNS} FROM chats WHERE id = $1"))
        .bind(chat_id)
        .fetch_optional(db)
        .await?
        .filter(|chat| chat.has_participant(user_id))
        .ok_or_else(|| ApiError::not_found("Chat not found"))
}

/// Everyone who shares at least one chat with `user_id`.
pub(crate) async fn chat_partners(db: &PgPool, user_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT CASE WHEN participant_a = $1 THEN participant_b ELSE participant_a END
        FROM chats
        WHERE participant_a = $1 OR participant_b = $1
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

async fn mark_read(db: &PgPool, chat_id: Uuid, reader_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE chat_messages SET is_read = TRUE, read_at = NOW()
        WHERE chat_id = $1 AND sender_id <> $2 AND is_read = FALSE
        "#,
    )
    .bind(chat_id)
    .bind(reader_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

/// POST /api/chats
pub async fn start_chat(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.participant_id == auth.user_id {
        return Err(ApiError::validation(
            "participant_id",
            "You cannot start a chat with yourself",
        ));
    }

    let active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM users WHERE id = $1")
        .bind(req.participant_id)
        .fetch_optional(&state.db)
        .await?;
    match active {
        Some(true) => {}
        Some(false) => return Err(ApiError::bad_request("This user is no longer active")),
        None => return Err(ApiError::not_found("User not found")),
    }

    if let Some(project_id) = req.project_id {
        let project = load_project(&state.db, project_id).await?;
        if !project.can_view(auth.user_id, auth.role) {
            return Err(ApiError::not_found("Project not found"));
        }
    }

    let (a, b) = ordered_pair(auth.user_id, req.participant_id);

    sqlx::query(
        r#"
        INSERT INTO chats (participant_a, participant_b, project_id)
        VALUES ($1, $2, $3)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(a)
    .bind(b)
    .bind(req.project_id)
    .execute(&state.db)
    .await?;

    let chat = sqlx::query_as::<_, ChatRow>(&format!(
        r#"
        SELECT {CHAT_COLUMNS} FROM chats
        WHERE participant_a = $1 AND participant_b = $2 AND project_id IS NOT DISTINCT FROM $3
        "#
    ))
    .bind(a)
    .bind(b)
    .bind(req.project_id)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        chat_id = %chat.id,
        user_id = %auth.user_id,
        participant_id = %req.participant_id,
        "Chat opened"
    );

    let summary = summary_for(&state, chat.id, auth.user_id).await?;
    Ok(Created(summary))
}

const SUMMARY_SELECT: &str = r#"
    SELECT c.id, c.project_id,
           u.id AS counterpart_id, u.name AS counterpart_name, u.role AS counterpart_role,
           lm.body AS last_message, c.last_message_at,
           (SELECT COUNT(*) FROM chat_messages m
             WHERE m.chat_id = c.id AND m.sender_id <> $1 AND m.is_read = FALSE) AS unread_count,
           c.created_at
    FROM chats c
    JOIN users u
      ON u.id = CASE WHEN c.participant_a = $1 THEN c.participant_b ELSE c.participant_a END
    LEFT JOIN LATERAL (
        SELECT body FROM chat_messages
        WHERE chat_id = c.id
        ORDER BY created_at DESC
        LIMIT 1
    ) lm ON TRUE
    WHERE (c.participant_a = $1 OR c.participant_b = $1)
"#;

async fn summary_for(
    state: &AppState,
    chat_id: Uuid,
    user_id: Uuid,
) -> Result<ChatSummary, ApiError> {
    let row = sqlx::query_as::<_, ChatSummaryRow>(&format!("{SUMMARY_SELECT} AND c.id = $2"))
        .bind(user_id)
        .bind(chat_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;
    let online = state.hub.is_online(row.counterpart_id);
    Ok(ChatSummary::from_row(row, online))
}

/// GET /api/chats
pub async fn list_chats(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = sqlx::query_as::<_, ChatSummaryRow>(&format!(
        "{SUMMARY_SELECT} ORDER BY COALESCE(c.last_message_at, c.created_at) DESC"
    ))
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await?;

    let counterparts: Vec<Uuid> = rows.iter().map(|r| r.counterpart_id).collect();
    let online = state.hub.online_among(&counterparts);

    let chats: Vec<ChatSummary> = rows
        .into_iter()
        .map(|row| {
            let is_online = online.contains(&row.counterpart_id);
            ChatSummary::from_row(row, is_online)
        })
        .collect();
    Ok(DataResponse::new(chats))
}

/// GET /api/chats/:id/messages
pub async fn list_messages(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    load_chat_for(&state.db, chat_id, auth.user_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE chat_id = $1")
        .bind(chat_id)
        .fetch_one(&state.db)
        .await?;

    let messages = sqlx::query_as::<_, ChatMessage>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS} FROM chat_messages
        WHERE chat_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(chat_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let marked = mark_read(&state.db, chat_id, auth.user_id).await?;
    if marked > 0 {
        tracing::debug!(chat_id = %chat_id, marked, "Marked messages read");
    }

    Ok(Paginated::new(messages, &pagination, total))
}

/// POST /api/chats/:id/messages
pub async fn send_message(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = load_chat_for(&state.db, chat_id, auth.user_id).await?;
    let body = validate_body(&req.body).map_err(|msg| ApiError::validation("body", msg))?;
    let recipient_id = chat.counterpart(auth.user_id);

    let mut tx = state.db.begin().await?;
    let message = sqlx::query_as::<_, ChatMessage>(&format!(
        r#"
        INSERT INTO chat_messages (chat_id, sender_id, body, attachment_url)
        VALUES ($1, $2, $3, $4)
        RETURNING {MESSAGE_COLUMNS}
        "#
    ))
    .bind(chat_id)
    .bind(auth.user_id)
    .bind(body)
    .bind(clean_opt(req.attachment_url))
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE chats SET last_message_at = $2 WHERE id = $1")
        .bind(chat_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    let event = ServerEvent::ChatMessage {
        chat_id,
        message: message.clone(),
    };
    let delivered = state
        .hub
        .send_to_users(&[auth.user_id, recipient_id], &event);

    tracing::debug!(
        chat_id = %chat_id,
        message_id = %message.id,
        delivered,
        "Chat message sent"
    );

    if !state.hub.is_online(recipient_id) {
        let sender_name: String = sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await?
            .unwrap_or_default();
        notifications::notify_new_message(&state, recipient_id, chat_id, &sender_name, body)
            .await;
    }

    Ok(Created(message))
}

/// POST /api/chats/:id/read
pub async fn mark_chat_read(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(chat_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_chat_for(&state.db, chat_id, auth.user_id).await?;
    let marked = mark_read(&state.db, chat_id, auth.user_id).await?;
    Ok(MessageResponse::new(format!("{marked} message(s) marked as read")))
}
