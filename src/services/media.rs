//! Client for the third-party media host that stores project photos.
//!
//! Uploads and deletions are signed: the request parameters (excluding the
//! file and the API key) are sorted by name, joined as `k=v&k=v`, suffixed
//! with the API secret and hashed with SHA-256.

use anyhow::{Context, Result};
use backoff::{future::retry, ExponentialBackoff};
use chrono::Utc;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument, warn};

use crate::config::Settings;
use crate::domain::images::ImageUpload;
use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host unreachable: {0}")]
    Unavailable(String),

    #[error("media host rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected media host response: {0}")]
    InvalidResponse(String),
}

impl From<MediaError> for ApiError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::Rejected { status, message } if status == 400 => {
                ApiError::BadRequest(format!("Image rejected by media host: {}", message))
            }
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

/// Stored asset returned by a successful upload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedAsset {
    pub secure_url: String,
    pub public_id: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct HostErrorBody {
    error: HostErrorDetail,
}

#[derive(Debug, Deserialize)]
struct HostErrorDetail {
    message: String,
}

#[derive(Clone)]
pub struct MediaClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

/// Hex SHA-256 over the sorted params plus the secret.
pub fn sign_params(params: &[(&str, &str)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(300),
        max_interval: Duration::from_secs(4),
        max_elapsed_time: Some(Duration::from_secs(20)),
        ..Default::default()
    }
}

/// 5xx, 429 and transport failures are worth another attempt.
/// A response we could not make sense of; retrying won't help.
fn malformed(e: impl std::fmt::Display) -> backoff::Error<MediaError> {
    backoff::Error::permanent(MediaError::InvalidResponse(e.to_string()))
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

impl MediaClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.media_timeout_seconds))
            .build()
            .context("Failed to create media HTTP client")?;

        let base_url = format!(
            "{}/{}",
            settings.media_api_base_url.trim_end_matches('/'),
            settings.media_cloud_name
        );

        tracing::info!(base_url = %base_url, "Media client initialized");

        Ok(Self {
            client,
            base_url,
            api_key: settings.media_api_key.clone(),
            api_secret: settings.media_api_secret.clone(),
            folder: settings.media_upload_folder.clone(),
        })
    }

    fn project_folder(&self, project_id: uuid::Uuid) -> String {
        format!("{}/{}", self.folder.trim_end_matches('/'), project_id)
    }

    async fn error_from(response: reqwest::Response) -> MediaError {
        let status = response.status();
        let message = response
            .json::<HostErrorBody>()
            .await
            .map(|b| b.error.message)
            .unwrap_or_else(|_| status.to_string());
        MediaError::Rejected {
            status: status.as_u16(),
            message,
        }
    }

    /// Upload an image into the project's folder, retrying transient failures.
    #[instrument(skip(self, upload), fields(size = upload.bytes.len()))]
    pub async fn upload(
        &self,
        project_id: uuid::Uuid,
        upload: &ImageUpload,
    ) -> Result<UploadedAsset, MediaError> {
        let url = format!("{}/image/upload", self.base_url);
        let folder = self.project_folder(project_id);
        let (url, folder) = (&url, &folder);

        retry(retry_policy(), move || async move {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign_params(
                &[("folder", folder.as_str()), ("timestamp", timestamp.as_str())],
                &self.api_secret,
            );

            let file = multipart::Part::bytes(upload.bytes.clone())
                .file_name(upload.file_name.clone())
                .mime_str(&upload.content_type)
                .map_err(malformed)?;

            let form = multipart::Form::new()
                .part("file", file)
                .text("api_key", self.api_key.clone())
                .text("timestamp", timestamp)
                .text("folder", folder.clone())
                .text("signature_algorithm", "sha256")
                .text("signature", signature);

            debug!(url = %url, "Uploading image to media host");

            let response = self
                .client
                .post(url)
                .multipart(form)
                .send()
                .await
                .map_err(|e| {
                    warn!(error = %e, "Media upload attempt failed");
                    backoff::Error::transient(MediaError::Unavailable(e.to_string()))
                })?;

            let status = response.status();
            if status.is_success() {
                return response.json::<UploadedAsset>().await.map_err(malformed);
            }

            let err = Self::error_from(response).await;
            if is_transient(status) {
                warn!(status = %status, "Media host returned a transient error");
                Err(backoff::Error::transient(err))
            } else {
                error!(status = %status, error = %err, "Media host rejected upload");
                Err(backoff::Error::permanent(err))
            }
        })
        .await
    }

    /// Remove a stored asset. A missing asset counts as success.
    #[instrument(skip(self))]
    pub async fn destroy(&self, public_id: &str) -> Result<(), MediaError> {
        let url = format!("{}/image/destroy", self.base_url);
        let url = &url;

        retry(retry_policy(), move || async move {
            let timestamp = Utc::now().timestamp().to_string();
            let signature = sign_params(
                &[("public_id", public_id), ("timestamp", timestamp.as_str())],
                &self.api_secret,
            );

            let params = [
                ("public_id", public_id.to_string()),
                ("timestamp", timestamp),
                ("api_key", self.api_key.clone()),
                ("signature_algorithm", "sha256".to_string()),
                ("signature", signature),
            ];

            let response = self
                .client
                .post(url)
                .form(&params)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(MediaError::Unavailable(e.to_string())))?;

            let status = response.status();
            if status.is_success() {
                let body = response.json::<DestroyResponse>().await.map_err(malformed)?;
                return match body.result.as_str() {
                    "ok" | "not found" => Ok(()),
                    other => Err(backoff::Error::permanent(MediaError::InvalidResponse(
                        format!("destroy returned '{}'", other),
                    ))),
                };
            }

            let err = Self::error_from(response).await;
            if is_transient(status) {
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            }
        })
        .await
    }

    /// Reachability probe; any HTTP answer means the host is up.
    pub async fn health_check(&self) -> Result<()> {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .context("Media host unreachable")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_order_independent() {
        let a = sign_params(&[("timestamp", "1700000000"), ("folder", "p/1")], "secret");
        let b = sign_params(&[("folder", "p/1"), ("timestamp", "1700000000")], "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn signature_matches_manual_digest() {
        let expected = {
            let mut h = Sha256::new();
            h.update(b"folder=p/1&timestamp=1700000000secret");
            hex::encode(h.finalize())
        };
        assert_eq!(
            sign_params(&[("timestamp", "1700000000"), ("folder", "p/1")], "secret"),
            expected
        );
    }

    #[test]
    fn empty_params_are_not_signed() {
        assert_eq!(
            sign_params(&[("folder", ""), ("timestamp", "1")], "s"),
            sign_params(&[("timestamp", "1")], "s")
        );
    }

    #[test]
    fn secret_changes_signature() {
        let params = [("timestamp", "1")];
        assert_ne!(sign_params(&params, "one"), sign_params(&params, "two"));
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::BAD_REQUEST));
        assert!(!is_transient(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn rejected_upload_maps_to_client_error() {
        let err: ApiError = MediaError::Rejected {
            status: 400,
            message: "Invalid image file".into(),
        }
        .into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = MediaError::Unavailable("timeout".into()).into();
        assert!(matches!(err, ApiError::BadGateway(_)));
    }
}
