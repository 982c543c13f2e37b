//! Account domain types
//!
//! A user has exactly one role and one matching profile row
//! (customers, sellers or designers).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

use super::profiles::{CustomerProfileInput, DesignerProfileInput, SellerProfileInput};

pub const MIN_PASSWORD_LENGTH: usize = 8;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{10,13}$").expect("valid phone regex"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Seller,
    Designer,
}

text_enum!(Role {
    Customer => "customer",
    Seller => "seller",
    Designer => "designer",
});

/// Account as stored in `users`
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of an account, never carries the password hash
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserResponse {
    type Error = String;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse()?,
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub role: Role,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub password: String,
    #[serde(default)]
    pub customer: Option<CustomerProfileInput>,
    #[serde(default)]
    pub seller: Option<SellerProfileInput>,
    #[serde(default)]
    pub designer: Option<DesignerProfileInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// Lower-case and trim an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

/// Phone numbers are stored without spaces or dashes.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let compact: String = phone
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    PHONE_RE.is_match(&compact).then_some(compact)
}

pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        ));
    }
    if password.trim().is_empty() {
        return Err("Password must not be blank".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails() {
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
        assert!(is_valid_email("asha@example.com"));
        assert!(!is_valid_email("asha@example"));
        assert!(!is_valid_email("asha example@x.com"));
    }

    #[test]
    fn phones() {
        assert_eq!(
            normalize_phone("+91 98765-43210").as_deref(),
            Some("+919876543210")
        );
        assert_eq!(normalize_phone("12345"), None);
    }

    #[test]
    fn password_length() {
        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("long-enough").is_ok());
    }

    #[test]
    fn role_deserializes_from_snake_case() {
        let role: Role = serde_json::from_str("\"designer\"").unwrap();
        assert_eq!(role, Role::Designer);
        assert_eq!(role.to_string(), "designer");
    }

    #[test]
    fn user_row_with_unknown_role_is_rejected() {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "X".into(),
            email: "x@example.com".into(),
            phone: None,
            password_hash: "hash".into(),
            role: "admin".into(),
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(UserResponse::try_from(row).is_err());
    }
}
