//! Authentication routes
//!
//! Local accounts: registration, login, current user and password change.

use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, MessageResponse};
use crate::app::AppState;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};
use crate::auth::RequireAuth;
use crate::domain::profiles::{
    CustomerProfileInput, DesignerProfileInput, RoleProfile, SellerProfileInput,
};
use crate::domain::users::{
    is_valid_email, normalize_email, normalize_phone, validate_password_strength, AuthResponse,
    ChangePasswordRequest, LoginRequest, RegisterRequest, UserResponse, UserRow,
};
use crate::domain::Role;
use crate::error::ApiError;
use crate::routes::profiles::{fetch_profile, invalidate_directory};

pub(crate) const USER_COLUMNS: &str = "id, name, email, phone, password_hash, role, is_active, \
     last_login_at, created_at, updated_at";

const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
    pub profile: Option<RoleProfile>,
}

fn to_response(row: UserRow) -> Result<UserResponse, ApiError> {
    UserResponse::try_from(row).map_err(ApiError::internal)
}

fn issue_auth(state: &AppState, user: UserResponse) -> Result<AuthResponse, ApiError> {
    let token = state.jwt.issue(user.id, user.role, &user.email)?;
    Ok(AuthResponse {
        token,
        token_type: "Bearer",
        expires_in: state.jwt.ttl_seconds(),
        user,
    })
}

async fn insert_profile(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    name: &str,
    req: &RegisterRequest,
) -> Result<(), ApiError> {
    match req.role {
        Role::Customer => {
            let profile = req
                .customer
                .clone()
                .unwrap_or_default()
                .normalized()
                .map_err(|(field, msg)| ApiError::validation(field, msg))?;
            sqlx::query(
                "INSERT INTO customers (user_id, address, city, state, pincode) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user_id)
            .bind(&profile.address)
            .bind(&profile.city)
            .bind(&profile.state)
            .bind(&profile.pincode)
            .execute(&mut **tx)
            .await?;
        }
        Role::Seller => {
            let seller = req
                .seller
                .clone()
                .unwrap_or_else(SellerProfileInput::default)
                .validate(name)
                .map_err(|(field, msg)| ApiError::validation(field, msg))?;
            sqlx::query(
                r#"
                INSERT INTO sellers (user_id, business_name, gstin, pan, address, state_code)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(user_id)
            .bind(&seller.business_name)
            .bind(&seller.gstin)
            .bind(&seller.pan)
            .bind(&seller.address)
            .bind(&seller.state_code)
            .execute(&mut **tx)
            .await
            .map_err(|e| ApiError::from(e).on_duplicate("This GSTIN is already registered"))?;
        }
        Role::Designer => {
            let designer = req
                .designer
                .clone()
                .unwrap_or_else(DesignerProfileInput::default)
                .normalized()
                .map_err(|(field, msg)| ApiError::validation(field, msg))?;
            sqlx::query(
                r#"
                INSERT INTO designers (user_id, specialization, experience_years, portfolio_url, bio)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(user_id)
            .bind(&designer.specialization)
            .bind(designer.experience_years)
            .bind(&designer.portfolio_url)
            .bind(&designer.bio)
            .execute(&mut **tx)
            .await?;
        }
    }
    Ok(())
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 120 {
        return Err(ApiError::validation("name", "Name must be 1-120 characters"));
    }

    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        return Err(ApiError::validation("email", "Invalid email address"));
    }

    let phone = match req.phone.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(raw) => Some(
            normalize_phone(raw)
                .ok_or_else(|| ApiError::validation("phone", "Invalid phone number"))?,
        ),
        None => None,
    };

    validate_password_strength(&req.password)
        .map_err(|msg| ApiError::validation("password", msg))?;

    // Fail fast on a bad customer profile before paying for the hash
    if req.role == Role::Customer {
        req.customer
            .clone()
            .unwrap_or_else(CustomerProfileInput::default)
            .normalized()
            .map_err(|(field, msg)| ApiError::validation(field, msg))?;
    }

    let password_hash = hash_password_blocking(req.password.clone()).await?;

    let mut tx = state.db.begin().await?;

    let user = sqlx::query_as::<_, UserRow>(&format!(
        r#"
        INSERT INTO users (name, email, phone, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(&password_hash)
    .bind(req.role.as_str())
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| ApiError::from(e).on_duplicate("An account with this email already exists"))?;

    insert_profile(&mut tx, user.id, &name, &req).await?;

    tx.commit().await?;

    if req.role != Role::Customer {
        invalidate_directory(&state, req.role).await;
    }

    tracing::info!(user_id = %user.id, role = %req.role, "User registered");

    let response = issue_auth(&state, to_response(user)?)?;
    Ok(Created(response))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);

    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = $1"
    ))
    .bind(&email)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::unauthorized(INVALID_CREDENTIALS))?;

    let matches = verify_password_blocking(req.password, user.password_hash.clone()).await?;
    if !matches {
        tracing::info!(user_id = %user.id, "Login failed: wrong password");
        return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
    }

    if !user.is_active {
        return Err(ApiError::forbidden("This account has been deactivated"));
    }

    sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
        .bind(user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "User logged in");

    let response = issue_auth(&state, to_response(user)?)?;
    Ok(DataResponse::new(response))
}

/// GET /api/auth/me
pub async fn me(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let user = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(auth.user_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::unauthorized("Account no longer exists"))?;

    let user = to_response(user)?;
    let profile = fetch_profile(&state.db, user.id, user.role).await?;

    Ok(DataResponse::new(MeResponse { user, profile }))
}

/// PUT /api/auth/password
pub async fn change_password(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password_strength(&req.new_password)
        .map_err(|msg| ApiError::validation("new_password", msg))?;
    if req.new_password == req.current_password {
        return Err(ApiError::validation(
            "new_password",
            "New password must differ from the current one",
        ));
    }

    let stored: String = sqlx::query_scalar("SELECT password_hash FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    if !verify_password_blocking(req.current_password, stored).await? {
        return Err(ApiError::validation(
            "current_password",
            "Current password is incorrect",
        ));
    }

    let new_hash = hash_password_blocking(req.new_password).await?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(auth.user_id)
        .bind(&new_hash)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %auth.user_id, "Password changed");

    Ok(MessageResponse::new("Password updated"))
}
