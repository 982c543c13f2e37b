//! Designer suggestion routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::{AuthContext, RequireAuth};
use crate::domain::clean_opt;
use crate::domain::suggestions::{
    ReviewSuggestionRequest, SuggestionInput, SuggestionListQuery, SuggestionResponse,
    SuggestionRow, SuggestionStatus, SUGGESTION_COLUMNS,
};
use crate::domain::Role;
use crate::error::ApiError;
use crate::routes::projects::{load_project, load_visible_project};
use crate::services::notifications;

async fn load_suggestion(state: &AppState, suggestion_id: Uuid) -> Result<SuggestionRow, ApiError> {
    sqlx::query_as::<_, SuggestionRow>(&format!(
        "SELECT {SUGGESTION_COLUMNS} FROM designer_suggestions WHERE id = $1"
    ))
    .bind(suggestion_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Suggestion not found"))
}

/// The author may change a suggestion only until the customer reviews it.
async fn load_own_pending(
    state: &AppState,
    suggestion_id: Uuid,
    auth: &AuthContext,
) -> Result<SuggestionRow, ApiError> {
    let row = load_suggestion(state, suggestion_id).await?;
    if row.designer_id != auth.user_id {
        return Err(ApiError::forbidden("Only the author can change this suggestion"));
    }
    if row.status != SuggestionStatus::Pending.as_str() {
        return Err(ApiError::bad_request(
            "Suggestion has already been reviewed",
        ));
    }
    Ok(row)
}

/// POST /api/projects/:id/suggestions
pub async fn create_suggestion(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<SuggestionInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Designer)?;
    let project = load_visible_project(&state.db, project_id, &auth).await?;
    if !project.is_assigned_designer(auth.user_id) {
        return Err(ApiError::forbidden(
            "Only the assigned designer can add suggestions",
        ));
    }
    if !project.status.accepts_suggestions() {
        return Err(ApiError::bad_request(format!(
            "Suggestions cannot be added while the project is {}",
            project.status
        )));
    }
    req.validate(true)
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, SuggestionRow>(&format!(
        r#"
        INSERT INTO designer_suggestions (project_id, designer_id, room_name, material_name,
            category, brand, description, quantity, unit, estimated_unit_price, image_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING {SUGGESTION_COLUMNS}
        "#
    ))
    .bind(project_id)
    .bind(auth.user_id)
    .bind(clean_opt(req.room_name))
    .bind(clean_opt(req.material_name))
    .bind(clean_opt(req.category))
    .bind(clean_opt(req.brand))
    .bind(clean_opt(req.description))
    .bind(req.quantity)
    .bind(clean_opt(req.unit))
    .bind(req.estimated_unit_price)
    .bind(clean_opt(req.image_url))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        project_id = %project_id,
        suggestion_id = %row.id,
        designer_id = %auth.user_id,
        "Suggestion added"
    );

    notifications::notify_suggestion_added(
        &state,
        project.customer_id,
        project_id,
        row.id,
        &row.material_name,
    )
    .await;

    Ok(Created(SuggestionResponse::from(row)))
}

/// GET /api/projects/:id/suggestions
pub async fn list_suggestions(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(filter): Query<SuggestionListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_project(&state.db, project_id, &auth).await?;

    let rows = sqlx::query_as::<_, SuggestionRow>(&format!(
        r#"
        SELECT {SUGGESTION_COLUMNS} FROM designer_suggestions
        WHERE project_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at, id
        "#
    ))
    .bind(project_id)
    .bind(filter.status.map(|s| s.as_str()))
    .fetch_all(&state.db)
    .await?;

    let suggestions: Vec<SuggestionResponse> =
        rows.into_iter().map(SuggestionResponse::from).collect();
    Ok(DataResponse::new(suggestions))
}

/// PUT /api/suggestions/:id
pub async fn update_suggestion(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<Uuid>,
    Json(req): Json<SuggestionInput>,
) -> Result<impl IntoResponse, ApiError> {
    load_own_pending(&state, suggestion_id, &auth).await?;
    req.validate(false)
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, SuggestionRow>(&format!(
        r#"
        UPDATE designer_suggestions SET
            room_name = COALESCE($2, room_name),
            material_name = COALESCE($3, material_name),
            category = COALESCE($4, category),
            brand = COALESCE($5, brand),
            description = COALESCE($6, description),
            quantity = COALESCE($7, quantity),
            unit = COALESCE($8, unit),
            estimated_unit_price = COALESCE($9, estimated_unit_price),
            image_url = COALESCE($10, image_url),
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {SUGGESTION_COLUMNS}
        "#
    ))
    .bind(suggestion_id)
    .bind(clean_opt(req.room_name))
    .bind(clean_opt(req.material_name))
    .bind(clean_opt(req.category))
    .bind(clean_opt(req.brand))
    .bind(clean_opt(req.description))
    .bind(req.quantity)
    .bind(clean_opt(req.unit))
    .bind(req.estimated_unit_price)
    .bind(clean_opt(req.image_url))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Suggestion has already been reviewed"))?;

    tracing::info!(suggestion_id = %suggestion_id, "Suggestion updated");
    Ok(DataResponse::new(SuggestionResponse::from(row)))
}

/// DELETE /api/suggestions/:id
pub async fn delete_suggestion(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_own_pending(&state, suggestion_id, &auth).await?;

    let deleted = sqlx::query(
        "DELETE FROM designer_suggestions WHERE id = $1 AND status = 'pending'",
    )
    .bind(suggestion_id)
    .execute(&state.db)
    .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::bad_request("Suggestion has already been reviewed"));
    }

    tracing::info!(suggestion_id = %suggestion_id, "Suggestion deleted");
    Ok(NoContent)
}

/// POST /api/suggestions/:id/review
pub async fn review_suggestion(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(suggestion_id): Path<Uuid>,
    Json(req): Json<ReviewSuggestionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;
    if req.status == SuggestionStatus::Pending {
        return Err(ApiError::validation(
            "status",
            "Review status must be approved or rejected",
        ));
    }

    let existing = load_suggestion(&state, suggestion_id).await?;
    let project = load_project(&state.db, existing.project_id).await?;
    if !project.is_owner(auth.user_id) {
        return Err(ApiError::not_found("Suggestion not found"));
    }

    let row = sqlx::query_as::<_, SuggestionRow>(&format!(
        r#"
        UPDATE designer_suggestions
        SET status = $2, customer_note = $3, updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING {SUGGESTION_COLUMNS}
        "#
    ))
    .bind(suggestion_id)
    .bind(req.status.as_str())
    .bind(clean_opt(req.note))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Suggestion has already been reviewed"))?;

    tracing::info!(
        suggestion_id = %suggestion_id,
        status = %req.status,
        "Suggestion reviewed"
    );

    notifications::notify_suggestion_reviewed(
        &state,
        row.designer_id,
        row.project_id,
        row.id,
        &row.material_name,
        req.status,
    )
    .await;

    Ok(DataResponse::new(SuggestionResponse::from(row)))
}
