use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/webp"];

/// Project photo hosted on the media service
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectImage {
    pub id: Uuid,
    pub project_id: Uuid,
    pub uploaded_by: Uuid,
    pub url: String,
    #[serde(skip_serializing)]
    pub public_id: String,
    pub caption: Option<String>,
    pub room_name: Option<String>,
    pub content_type: String,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
}

/// Validated upload awaiting transfer to the media host
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
    pub room_name: Option<String>,
}

/// Sniff the real format from magic bytes so a renamed file can't slip through.
pub fn detect_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Check declared type, sniffed type and size.
pub fn validate_upload(
    declared_type: Option<&str>,
    bytes: &[u8],
    max_bytes: usize,
) -> Result<&'static str, String> {
    if bytes.is_empty() {
        return Err("Uploaded file is empty".to_string());
    }
    if bytes.len() > max_bytes {
        return Err(format!(
            "Image exceeds the maximum size of {} bytes",
            max_bytes
        ));
    }
    let detected = detect_image_type(bytes)
        .ok_or_else(|| "Only JPEG, PNG and WebP images are allowed".to_string())?;
    if let Some(declared) = declared_type {
        let declared = if declared == "image/jpg" { "image/jpeg" } else { declared };
        if !ALLOWED_IMAGE_TYPES.contains(&declared) {
            return Err(format!("Content type {declared} is not allowed"));
        }
        if declared != detected {
            return Err("File content does not match its declared type".to_string());
        }
    }
    Ok(detected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0];

    #[test]
    fn sniffs_formats() {
        assert_eq!(detect_image_type(PNG), Some("image/png"));
        assert_eq!(detect_image_type(JPEG), Some("image/jpeg"));
        assert_eq!(detect_image_type(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(detect_image_type(b"%PDF-1.7"), None);
    }

    #[test]
    fn rejects_mismatched_declared_type() {
        assert!(validate_upload(Some("image/jpeg"), PNG, 1024).is_err());
        assert_eq!(validate_upload(Some("image/png"), PNG, 1024), Ok("image/png"));
        assert_eq!(validate_upload(Some("image/jpg"), JPEG, 1024), Ok("image/jpeg"));
    }

    #[test]
    fn rejects_oversized_and_empty() {
        assert!(validate_upload(None, PNG, 4).is_err());
        assert!(validate_upload(None, &[], 1024).is_err());
    }

    #[test]
    fn rejects_disallowed_types() {
        assert!(validate_upload(Some("image/gif"), PNG, 1024).is_err());
        assert!(validate_upload(None, b"GIF89a....", 1024).is_err());
    }
}
