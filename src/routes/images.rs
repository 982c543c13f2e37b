//! Project photo routes
//!
//! Files are sniffed and size-checked locally, then pushed to the media host.
//! Only the returned URL and asset id are stored.

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::clean_opt;
use crate::domain::images::{validate_upload, ImageUpload, ProjectImage};
use crate::domain::projects::ProjectStatus;
use crate::error::ApiError;
use crate::routes::projects::{load_owned_project, load_project, load_visible_project};

const IMAGE_COLUMNS: &str = "id, project_id, uploaded_by, url, public_id, caption, room_name, \
    content_type, size_bytes, created_at";

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("Upload exceeds the allowed size".to_string())
    } else {
        ApiError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
    }
}

/// Collect the `file`, `caption` and `room_name` parts.
async fn read_upload(mut multipart: Multipart, max_bytes: usize) -> Result<ImageUpload, ApiError> {
    let mut file: Option<(String, Option<String>, Vec<u8>)> = None;
    let mut caption = None;
    let mut room_name = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if bytes.len() > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "Image exceeds the maximum size of {} bytes",
                        max_bytes
                    )));
                }
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("caption") => caption = Some(field.text().await.map_err(multipart_error)?),
            Some("room_name") => room_name = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let (file_name, declared_type, bytes) =
        file.ok_or_else(|| ApiError::validation("file", "An image file is required"))?;

    let content_type = validate_upload(declared_type.as_deref(), &bytes, max_bytes)
        .map_err(|msg| ApiError::validation("file", msg))?;

    Ok(ImageUpload {
        file_name,
        content_type: content_type.to_string(),
        bytes,
        caption: clean_opt(caption),
        room_name: clean_opt(room_name),
    })
}

/// POST /api/projects/:id/images
pub async fn upload_image(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let project = load_owned_project(&state.db, project_id, &auth).await?;
    if !matches!(
        project.status,
        ProjectStatus::Draft | ProjectStatus::Submitted
    ) {
        return Err(ApiError::bad_request(
            "Images can only be added while the project is draft or submitted",
        ));
    }

    let upload = read_upload(multipart, state.settings.max_upload_bytes).await?;
    let asset = state.media.upload(project_id, &upload).await?;

    let inserted = sqlx::query_as::<_, ProjectImage>(&format!(
        r#"
        INSERT INTO project_images (project_id, uploaded_by, url, public_id, caption, room_name,
                                    content_type, size_bytes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING {IMAGE_COLUMNS}
        "#
    ))
    .bind(project_id)
    .bind(auth.user_id)
    .bind(&asset.secure_url)
    .bind(&asset.public_id)
    .bind(&upload.caption)
    .bind(&upload.room_name)
    .bind(&upload.content_type)
    .bind(upload.bytes.len() as i64)
    .fetch_one(&state.db)
    .await;

    let image = match inserted {
        Ok(image) => image,
        Err(e) => {
            // Don't leave an orphaned asset behind
            if let Err(cleanup) = state.media.destroy(&asset.public_id).await {
                tracing::warn!(public_id = %asset.public_id, error = %cleanup, "Failed to remove orphaned image");
            }
            return Err(e.into());
        }
    };

    tracing::info!(
        project_id = %project_id,
        image_id = %image.id,
        size_bytes = image.size_bytes,
        "Project image uploaded"
    );

    Ok(Created(image))
}

/// GET /api/projects/:id/images
pub async fn list_images(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    load_visible_project(&state.db, project_id, &auth).await?;

    let images = sqlx::query_as::<_, ProjectImage>(&format!(
        "SELECT {IMAGE_COLUMNS} FROM project_images WHERE project_id = $1 ORDER BY created_at, id"
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await?;

    Ok(DataResponse::new(images))
}

/// DELETE /api/images/:id
pub async fn delete_image(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let image = sqlx::query_as::<_, ProjectImage>(&format!(
        "SELECT {IMAGE_COLUMNS} FROM project_images WHERE id = $1"
    ))
    .bind(image_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Image not found"))?;

    let project = load_project(&state.db, image.project_id).await?;
    if !project.is_owner(auth.user_id) {
        return Err(ApiError::not_found("Image not found"));
    }

    if let Err(e) = state.media.destroy(&image.public_id).await {
        tracing::warn!(
            image_id = %image_id,
            public_id = %image.public_id,
            error = %e,
            "Failed to remove image from media host"
        );
    }

    sqlx::query("DELETE FROM project_images WHERE id = $1")
        .bind(image_id)
        .execute(&state.db)
        .await?;

    tracing::info!(image_id = %image_id, project_id = %image.project_id, "Project image deleted");
    Ok(NoContent)
}
