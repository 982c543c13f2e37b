//! Measurement routes
//!
//! Room dimensions belong to a project and can only change while it is a
//! draft. Anyone who can see the project can read them.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::{AuthContext, RequireAuth};
use crate::domain::clean_opt;
use crate::domain::measurements::{
    CreateMeasurementRequest, MeasurementList, MeasurementResponse, MeasurementRow,
    UpdateMeasurementRequest,
};
use crate::domain::projects::Project;
use crate::error::ApiError;
use crate::routes::projects::{load_owned_project, load_project, load_visible_project};

const MEASUREMENT_COLUMNS: &str = "id, project_id, room_name, room_type, length, width, height, \
    unit, notes, created_at, updated_at";

fn ensure_draft(project: &Project) -> Result<(), ApiError> {
    if !project.status.is_editable() {
        return Err(ApiError::bad_request(
            "Measurements can only be changed while the project is in draft",
        ));
    }
    Ok(())
}

/// Resolve a measurement and its project, requiring the caller to own a draft.
async fn load_editable(
    state: &AppState,
    measurement_id: Uuid,
    auth: &AuthContext,
) -> Result<MeasurementRow, ApiError> {
    let row = sqlx::query_as::<_, MeasurementRow>(&format!(
        "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE id = $1"
    ))
    .bind(measurement_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Measurement not found"))?;

    let project = load_project(&state.db, row.project_id).await?;
    if !project.is_owner(auth.user_id) {
        return Err(ApiError::not_found("Measurement not found"));
    }
    ensure_draft(&project)?;
    Ok(row)
}

/// POST /api/projects/:id/measurements
pub async fn create_measurement(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<CreateMeasurementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    ensure_draft(&project)?;
    req.validate()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, MeasurementRow>(&format!(
        r#"
        INSERT INTO measurements (project_id, room_name, room_type, length, width, height, unit, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {MEASUREMENT_COLUMNS}
        "#
    ))
    .bind(project_id)
    .bind(req.room_name.trim())
    .bind(clean_opt(req.room_type))
    .bind(req.length)
    .bind(req.width)
    .bind(req.height)
    .bind(req.unit.as_str())
    .bind(clean_opt(req.notes))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        project_id = %project_id,
        measurement_id = %row.id,
        "Measurement added"
    );

    Ok(Created(MeasurementResponse::from(row)))
}

/// GET /api/projects/:id/measurements
pub async fn list_measurements(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_project(&state.db, project_id, &auth).await?;

    let rows = sqlx::query_as::<_, MeasurementRow>(&format!(
        "SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE project_id = $1 ORDER BY created_at, id"
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    let measurements = rows.into_iter().map(MeasurementResponse::from).collect();
    Ok(DataResponse::new(MeasurementList::new(measurements)))
}

/// PUT /api/measurements/:id
pub async fn update_measurement(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(measurement_id): Path<Uuid>,
    Json(req): Json<UpdateMeasurementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    load_editable(&state, measurement_id, &auth).await?;
    req.validate()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    let row = sqlx::query_as::<_, MeasurementRow>(&format!(
        r#"
        UPDATE measurements SET
            room_name = COALESCE($2, room_name),
            room_type = COALESCE($3, room_type),
            length = COALESCE($4, length),
            width = COALESCE($5, width),
            height = COALESCE($6, height),
            unit = COALESCE($7, unit),
            notes = COALESCE($8, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {MEASUREMENT_COLUMNS}
        "#
    ))
    .bind(measurement_id)
    .bind(req.room_name.as_deref().map(str::trim))
    .bind(clean_opt(req.room_type))
    .bind(req.length)
    .bind(req.width)
    .bind(req.height)
    .bind(req.unit.map(|u| u.as_str()))
    .bind(clean_opt(req.notes))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(measurement_id = %measurement_id, "Measurement updated");
    Ok(DataResponse::new(MeasurementResponse::from(row)))
}

/// DELETE /api/measurements/:id
pub async fn delete_measurement(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(measurement_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_editable(&state, measurement_id, &auth).await?;

    sqlx::query("DELETE FROM measurements WHERE id = $1")
        .bind(measurement_id)
        .execute(&state.db)
        .await?;

    tracing::info!(measurement_id = %measurement_id, "Measurement deleted");
    Ok(NoContent)
}
