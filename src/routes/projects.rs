//! Project routes
//!
//! Project CRUD, submission, designer assignment and the status machine.
//! Every status change goes through [`apply_transition`] so it is checked
//! against the current row and recorded in `project_status_history`.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{AuthContext, RequireAuth};
use crate::domain::projects::{
    Actor, AssignDesignerRequest, CreateProjectRequest, Project, ProjectDetail, ProjectListQuery,
    ProjectRow, ProjectStatus, StatusHistoryEntry, UpdateProjectRequest, UpdateStatusRequest,
    PROJECT_COLUMNS,
};
use crate::domain::Role;
use crate::error::ApiError;
use crate::services::notifications;

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) async fn load_project(db: &PgPool, project_id: Uuid) -> Result<Project, ApiError> {
    sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
    ))
    .bind(project_id)
    .fetch_optional(db)
    .await?
    .map(Project::from)
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Row-locked read inside a transaction.
pub(crate) async fn lock_project(
    conn: &mut PgConnection,
    project_id: Uuid,
) -> Result<Project, ApiError> {
    sqlx::query_as::<_, ProjectRow>(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1 FOR UPDATE"
    ))
    .bind(project_id)
    .fetch_optional(conn)
    .await?
    .map(Project::from)
    .ok_or_else(|| ApiError::not_found("Project not found"))
}

/// Load a project the caller may read. Hidden projects answer 404 so their
/// existence does not leak.
pub(crate) async fn load_visible_project(
    db: &PgPool,
    project_id: Uuid,
    auth: &AuthContext,
) -> Result<Project, ApiError> {
    let project = load_project(db, project_id).await?;
    if !project.can_view(auth.user_id, auth.role) {
        return Err(ApiError::not_found("Project not found"));
    }
    Ok(project)
}

/// Load a project the caller owns.
pub(crate) async fn load_owned_project(
    db: &PgPool,
    project_id: Uuid,
    auth: &AuthContext,
) -> Result<Project, ApiError> {
    let project = load_visible_project(db, project_id, auth).await?;
    if !project.is_owner(auth.user_id) {
        return Err(ApiError::forbidden("Only the project owner can do this"));
    }
    Ok(project)
}

/// Move a project from `from` to `to` and record the change. Fails with 400
/// when `actor` may not make that move, and 409 when the row is no longer in
/// `from`.
pub(crate) async fn apply_transition(
    conn: &mut PgConnection,
    project_id: Uuid,
    from: ProjectStatus,
    to: ProjectStatus,
    actor: Actor,
    changed_by: Option<Uuid>,
) -> Result<(), ApiError> {
    if !from.can_transition(to, actor) {
        return Err(ApiError::bad_request(format!(
            "Cannot move a project from {from} to {to}"
        )));
    }

    let result = sqlx::query(
        r#"
        UPDATE projects
        SET status = $3,
            submitted_at = CASE WHEN $3 = 'submitted' THEN COALESCE(submitted_at, NOW())
                                ELSE submitted_at END,
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        "#,
    )
    .bind(project_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::conflict(
            "Project status changed in the meantime, reload and try again",
        ));
    }

    sqlx::query(
        r#"
        INSERT INTO project_status_history (project_id, from_status, to_status, changed_by)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(project_id)
    .bind(from.as_str())
    .bind(to.as_str())
    .bind(changed_by)
    .execute(&mut *conn)
    .await?;

    tracing::info!(
        project_id = %project_id,
        from = %from,
        to = %to,
        changed_by = ?changed_by,
        "Project status changed"
    );

    Ok(())
}

async fn counts(db: &PgPool, project_id: Uuid) -> Result<(i64, i64), sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM measurements WHERE project_id = $1),
            (SELECT COUNT(*) FROM project_images WHERE project_id = $1)
        "#,
    )
    .bind(project_id)
    .fetch_one(db)
    .await
}

async fn detail(
    db: &PgPool,
    project: Project,
    auth: &AuthContext,
) -> Result<ProjectDetail, ApiError> {
    let (measurement_count, image_count) = counts(db, project.id).await?;
    let allowed_transitions = project.transitions_for(auth.user_id, auth.role);
    Ok(ProjectDetail {
        project,
        measurement_count,
        image_count,
        allowed_transitions,
    })
}

/// Submission needs at least one measurement to quote against.
async fn ensure_submittable(db: &PgPool, project_id: Uuid) -> Result<(), ApiError> {
    let (measurements, _) = counts(db, project_id).await?;
    if measurements == 0 {
        return Err(ApiError::bad_request(
            "Add at least one measurement before submitting the project",
        ));
    }
    Ok(())
}

// ============================================================================
// CRUD
// ============================================================================

/// POST /api/projects
pub async fn create_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;
    let req = req
        .validate()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        INSERT INTO projects (customer_id, title, description, property_type, address, city,
                              state_code, budget)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(auth.user_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.property_type)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.state_code)
    .bind(req.budget)
    .fetch_one(&state.db)
    .await?;

    let project = Project::from(row);
    tracing::info!(project_id = %project.id, user_id = %auth.user_id, "Project created");

    Ok(Created(detail(&state.db, project, &auth).await?))
}

/// GET /api/projects
pub async fn list_projects(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
    Query(filter): Query<ProjectListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let scope = match auth.role {
        Role::Customer => "customer_id = $1",
        Role::Designer => "designer_id = $1",
        Role::Seller => {
            "(status IN ('submitted', 'design_in_progress', 'quoted') OR seller_id = $1)"
        }
    };
    let status = filter.status.map(|s| s.as_str());

    let total: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM projects WHERE {scope} AND ($2::text IS NULL OR status = $2)"
    ))
    .bind(auth.user_id)
    .bind(status)
    .fetch_one(&state.db)
    .await?;

    let rows = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        SELECT {PROJECT_COLUMNS} FROM projects
        WHERE {scope} AND ($2::text IS NULL OR status = $2)
        ORDER BY updated_at DESC
        LIMIT $3 OFFSET $4
        "#
    ))
    .bind(auth.user_id)
    .bind(status)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let projects: Vec<Project> = rows.into_iter().map(Project::from).collect();
    Ok(Paginated::new(projects, &pagination, total))
}

/// GET /api/projects/:id
pub async fn get_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_visible_project(&state.db, project_id, &auth).await?;
    Ok(DataResponse::new(detail(&state.db, project, &auth).await?))
}

/// PUT /api/projects/:id
pub async fn update_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    if !project.status.is_editable() {
        return Err(ApiError::bad_request("Project can only be edited while in draft"));
    }
    let req = req
        .validate()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, ProjectRow>(&format!(
        r#"
        UPDATE projects SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            property_type = COALESCE($4, property_type),
            address = COALESCE($5, address),
            city = COALESCE($6, city),
            state_code = COALESCE($7, state_code),
            budget = COALESCE($8, budget),
            updated_at = NOW()
        WHERE id = $1 AND status = 'draft'
        RETURNING {PROJECT_COLUMNS}
        "#
    ))
    .bind(project_id)
    .bind(&req.title)
    .bind(&req.description)
    .bind(&req.property_type)
    .bind(&req.address)
    .bind(&req.city)
    .bind(&req.state_code)
    .bind(req.budget)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Project can only be edited while in draft"))?;

    tracing::info!(project_id = %project_id, "Project updated");
    Ok(DataResponse::new(
        detail(&state.db, Project::from(row), &auth).await?,
    ))
}

/// DELETE /api/projects/:id
pub async fn delete_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    if !project.status.is_editable() {
        return Err(ApiError::bad_request("Only draft projects can be deleted"));
    }

    let public_ids: Vec<String> =
        sqlx::query_scalar("SELECT public_id FROM project_images WHERE project_id = $1")
            .bind(project_id)
            .fetch_all(&state.db)
            .await?;

    let deleted = sqlx::query("DELETE FROM projects WHERE id = $1 AND status = 'draft'")
        .bind(project_id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::bad_request("Only draft projects can be deleted"));
    }

    if !public_ids.is_empty() {
        let media = state.media.clone();
        tokio::spawn(async move {
            for public_id in public_ids {
                if let Err(e) = media.destroy(&public_id).await {
                    tracing::warn!(public_id = %public_id, error = %e, "Failed to remove project image");
                }
            }
        });
    }

    tracing::info!(project_id = %project_id, "Project deleted");
    Ok(NoContent)
}

// ============================================================================
// Lifecycle
// ============================================================================

/// POST /api/projects/:id/submit
pub async fn submit_project(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    if project.status != ProjectStatus::Draft {
        return Err(ApiError::bad_request("Only draft projects can be submitted"));
    }
    ensure_submittable(&state.db, project_id).await?;

    let mut tx = state.db.begin().await?;
    let locked = lock_project(&mut tx, project_id).await?;
    apply_transition(
        &mut tx,
        project_id,
        ProjectStatus::Draft,
        ProjectStatus::Submitted,
        Actor::User(Role::Customer),
        Some(auth.user_id),
    )
    .await?;
    // A designer picked while drafting starts work right away
    if locked.designer_id.is_some() {
        apply_transition(
            &mut tx,
            project_id,
            ProjectStatus::Submitted,
            ProjectStatus::DesignInProgress,
            Actor::System,
            Some(auth.user_id),
        )
        .await?;
    }
    tx.commit().await?;

    if let Some(designer_id) = locked.designer_id {
        notifications::notify_project_submitted(&state, designer_id, project_id, &project.title)
            .await;
    }

    let project = load_project(&state.db, project_id).await?;
    Ok(DataResponse::new(detail(&state.db, project, &auth).await?))
}

/// POST /api/projects/:id/designer
pub async fn assign_designer(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<AssignDesignerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    if !project.status.accepts_designer() {
        return Err(ApiError::bad_request(format!(
            "Project is {} and can no longer change designer",
            project.status
        )));
    }

    let is_designer: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND role = 'designer' AND is_active)",
    )
    .bind(req.designer_id)
    .fetch_one(&state.db)
    .await?;
    if !is_designer {
        return Err(ApiError::validation(
            "designer_id",
            "No active designer with this id",
        ));
    }

    let mut tx = state.db.begin().await?;
    let locked = lock_project(&mut tx, project_id).await?;
    if !locked.status.accepts_designer() {
        return Err(ApiError::conflict("Project status changed, please retry"));
    }
    sqlx::query("UPDATE projects SET designer_id = $2, updated_at = NOW() WHERE id = $1")
        .bind(project_id)
        .bind(req.designer_id)
        .execute(&mut *tx)
        .await?;
    if let Some(next) = locked.status.on_designer_assigned() {
        apply_transition(
            &mut tx,
            project_id,
            locked.status,
            next,
            Actor::System,
            Some(auth.user_id),
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        project_id = %project_id,
        designer_id = %req.designer_id,
        "Designer assigned"
    );

    notifications::notify_designer_assigned(&state, req.designer_id, project_id, &project.title)
        .await;

    let project = load_project(&state.db, project_id).await?;
    Ok(DataResponse::new(detail(&state.db, project, &auth).await?))
}

/// PATCH /api/projects/:id/status
pub async fn update_status(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_visible_project(&state.db, project_id, &auth).await?;
    let from = project.status;
    let to = req.status;

    if from.is_terminal() {
        return Err(ApiError::bad_request(format!("Project is already {from}")));
    }
    if !project.transitions_for(auth.user_id, auth.role).contains(&to) {
        return Err(if from.can_transition(to, Actor::User(auth.role)) {
            ApiError::forbidden("You are not allowed to change this project's status")
        } else {
            ApiError::bad_request(format!("Cannot move a project from {} to {}", from, to))
        });
    }

    if to == ProjectStatus::Submitted {
        ensure_submittable(&state.db, project_id).await?;
    }

    let mut tx = state.db.begin().await?;
    apply_transition(
        &mut tx,
        project_id,
        from,
        to,
        Actor::User(auth.role),
        Some(auth.user_id),
    )
    .await?;
    tx.commit().await?;

    let recipients = project.stakeholders_except(auth.user_id);
    notifications::notify_status_changed(&state, &recipients, project_id, &project.title, from, to)
        .await;

    let project = load_project(&state.db, project_id).await?;
    Ok(DataResponse::new(detail(&state.db, project, &auth).await?))
}

/// GET /api/projects/:id/history
pub async fn status_history(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_project(&state.db, project_id, &auth).await?;

    let history = sqlx::query_as::<_, StatusHistoryEntry>(
        r#"
        SELECT id, from_status, to_status, changed_by, created_at
        FROM project_status_history
        WHERE project_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(history))
}
