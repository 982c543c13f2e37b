//! Role profile routes
//!
//! Own-profile read/update for each role, plus the public seller and designer
//! directories served through the Redis cache.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{DataResponse, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::RequireAuth;
use crate::domain::profiles::{
    CustomerProfile, CustomerProfileInput, DesignerProfile, DesignerProfileInput, PublicDesigner,
    PublicSeller, RoleProfile, SellerProfile, SellerProfileInput,
};
use crate::domain::Role;
use crate::error::ApiError;
use crate::services::cache::keys;

const CUSTOMER_SELECT: &str = r#"
    SELECT u.id AS user_id, u.name, u.email, u.phone,
           c.address, c.city, c.state, c.pincode, c.updated_at
    FROM customers c
    JOIN users u ON u.id = c.user_id
    WHERE c.user_id = $1
"#;

const SELLER_SELECT: &str = r#"
    SELECT u.id AS user_id, u.name, u.email, u.phone,
           s.business_name, s.gstin, s.pan, s.address, s.state_code, s.updated_at
    FROM sellers s
    JOIN users u ON u.id = s.user_id
    WHERE s.user_id = $1
"#;

const DESIGNER_SELECT: &str = r#"
    SELECT u.id AS user_id, u.name, u.email, u.phone,
           d.specialization, d.experience_years, d.portfolio_url, d.bio, d.updated_at
    FROM designers d
    JOIN users u ON u.id = d.user_id
    WHERE d.user_id = $1
"#;

const PUBLIC_SELLER_SELECT: &str = r#"
    SELECT s.user_id, u.name, s.business_name, s.gstin, s.state_code,
           (SELECT COUNT(*) FROM projects p
             WHERE p.seller_id = s.user_id AND p.status = 'completed') AS completed_projects
    FROM sellers s
    JOIN users u ON u.id = s.user_id
    WHERE u.is_active
"#;

const PUBLIC_DESIGNER_SELECT: &str = r#"
    SELECT d.user_id, u.name, d.specialization, d.experience_years, d.portfolio_url, d.bio,
           (SELECT COUNT(*) FROM projects p
             WHERE p.designer_id = d.user_id
               AND p.status NOT IN ('completed', 'cancelled')) AS active_projects
    FROM designers d
    JOIN users u ON u.id = d.user_id
    WHERE u.is_active
"#;

/// Load the profile row that matches `role`.
pub(crate) async fn fetch_profile(
    db: &PgPool,
    user_id: Uuid,
    role: Role,
) -> Result<Option<RoleProfile>, sqlx::Error> {
    let profile = match role {
        Role::Customer => sqlx::query_as::<_, CustomerProfile>(CUSTOMER_SELECT)
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .map(RoleProfile::Customer),
        Role::Seller => sqlx::query_as::<_, SellerProfile>(SELLER_SELECT)
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .map(RoleProfile::Seller),
        Role::Designer => sqlx::query_as::<_, DesignerProfile>(DESIGNER_SELECT)
            .bind(user_id)
            .fetch_optional(db)
            .await?
            .map(RoleProfile::Designer),
    };
    Ok(profile)
}

pub(crate) async fn invalidate_directory(state: &AppState, role: Role) {
    state.cache.invalidate(&keys::directory_pattern(role)).await;
}

// ============================================================================
// Customer
// ============================================================================

/// GET /api/customers/me
pub async fn get_customer_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;

    let profile = sqlx::query_as::<_, CustomerProfile>(CUSTOMER_SELECT)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer profile not found"))?;

    Ok(DataResponse::new(profile))
}

/// PUT /api/customers/me
pub async fn update_customer_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CustomerProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Customer)?;
    let input = req
        .normalized()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    sqlx::query(
        r#"
        INSERT INTO customers (user_id, address, city, state, pincode)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            address = EXCLUDED.address,
            city = EXCLUDED.city,
            state = EXCLUDED.state,
            pincode = EXCLUDED.pincode,
            updated_at = NOW()
        "#,
    )
    .bind(auth.user_id)
    .bind(&input.address)
    .bind(&input.city)
    .bind(&input.state)
    .bind(&input.pincode)
    .execute(&state.db)
    .await?;

    let profile = sqlx::query_as::<_, CustomerProfile>(CUSTOMER_SELECT)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(user_id = %auth.user_id, "Customer profile updated");
    Ok(DataResponse::new(profile))
}

// ============================================================================
// Seller
// ============================================================================

/// GET /api/sellers/me
pub async fn get_seller_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;

    let profile = sqlx::query_as::<_, SellerProfile>(SELLER_SELECT)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Seller profile not found"))?;

    Ok(DataResponse::new(profile))
}

/// PUT /api/sellers/me
pub async fn update_seller_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<SellerProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;

    let account_name: String = sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    let details = req
        .validate(&account_name)
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    sqlx::query(
        r#"
        INSERT INTO sellers (user_id, business_name, gstin, pan, address, state_code)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (user_id) DO UPDATE SET
            business_name = EXCLUDED.business_name,
            gstin = EXCLUDED.gstin,
            pan = EXCLUDED.pan,
            address = EXCLUDED.address,
            state_code = EXCLUDED.state_code,
            updated_at = NOW()
        "#,
    )
    .bind(auth.user_id)
    .bind(&details.business_name)
    .bind(&details.gstin)
    .bind(&details.pan)
    .bind(&details.address)
    .bind(&details.state_code)
    .execute(&state.db)
    .await
    .map_err(|e| ApiError::from(e).on_duplicate("This GSTIN is already registered"))?;

    invalidate_directory(&state, Role::Seller).await;

    let profile = sqlx::query_as::<_, SellerProfile>(SELLER_SELECT)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(
        user_id = %auth.user_id,
        has_gstin = profile.gstin.is_some(),
        "Seller profile updated"
    );
    Ok(DataResponse::new(profile))
}

/// GET /api/sellers
pub async fn list_sellers(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key = keys::directory_page(Role::Seller, pagination.page(), pagination.per_page());
    if let Some(cached) = state.cache.get::<Paginated<PublicSeller>>(&cache_key).await {
        return Ok(cached);
    }

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sellers s JOIN users u ON u.id = s.user_id WHERE u.is_active",
    )
    .fetch_one(&state.db)
    .await?;

    let sellers = sqlx::query_as::<_, PublicSeller>(&format!(
        "{PUBLIC_SELLER_SELECT} ORDER BY s.business_name, s.user_id LIMIT $1 OFFSET $2"
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let page = Paginated::new(sellers, &pagination, total);
    if let Err(e) = state.cache.set(&cache_key, &page).await {
        tracing::warn!(error = %e, key = %cache_key, "Failed to cache seller directory");
    }

    Ok(page)
}

/// GET /api/sellers/:id
pub async fn get_seller(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let seller = sqlx::query_as::<_, PublicSeller>(&format!(
        "{PUBLIC_SELLER_SELECT} AND s.user_id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Seller not found"))?;

    Ok(DataResponse::new(seller))
}

// ============================================================================
// Designer
// ============================================================================

/// GET /api/designers/me
pub async fn get_designer_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Designer)?;

    let profile = sqlx::query_as::<_, DesignerProfile>(DESIGNER_SELECT)
        .bind(auth.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Designer profile not found"))?;

    Ok(DataResponse::new(profile))
}

/// PUT /api/designers/me
pub async fn update_designer_profile(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<DesignerProfileInput>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Designer)?;
    let input = req
        .normalized()
        .map_err(|(field, msg)| ApiError::validation(field, msg))?;

    sqlx::query(
        r#"
        INSERT INTO designers (user_id, specialization, experience_years, portfolio_url, bio)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (user_id) DO UPDATE SET
            specialization = EXCLUDED.specialization,
            experience_years = EXCLUDED.experience_years,
            portfolio_url = EXCLUDED.portfolio_url,
            bio = EXCLUDED.bio,
            updated_at = NOW()
        "#,
    )
    .bind(auth.user_id)
    .bind(&input.specialization)
    .bind(input.experience_years)
    .bind(&input.portfolio_url)
    .bind(&input.bio)
    .execute(&state.db)
    .await?;

    invalidate_directory(&state, Role::Designer).await;

    let profile = sqlx::query_as::<_, DesignerProfile>(DESIGNER_SELECT)
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    tracing::info!(user_id = %auth.user_id, "Designer profile updated");
    Ok(DataResponse::new(profile))
}

/// GET /api/designers
pub async fn list_designers(
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let cache_key =
        keys::directory_page(Role::Designer, pagination.page(), pagination.per_page());
    if let Some(cached) = state.cache.get::<Paginated<PublicDesigner>>(&cache_key).await {
        return Ok(cached);
    }

    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM designers d JOIN users u ON u.id = d.user_id WHERE u.is_active",
    )
    .fetch_one(&state.db)
    .await?;

    let designers = sqlx::query_as::<_, PublicDesigner>(&format!(
        "{PUBLIC_DESIGNER_SELECT} ORDER BY d.experience_years DESC NULLS LAST, u.name, d.user_id \
         LIMIT $1 OFFSET $2"
    ))
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let page = Paginated::new(designers, &pagination, total);
    if let Err(e) = state.cache.set(&cache_key, &page).await {
        tracing::warn!(error = %e, key = %cache_key, "Failed to cache designer directory");
    }

    Ok(page)
}

/// GET /api/designers/:id
pub async fn get_designer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let designer = sqlx::query_as::<_, PublicDesigner>(&format!(
        "{PUBLIC_DESIGNER_SELECT} AND d.user_id = $1"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Designer not found"))?;

    Ok(DataResponse::new(designer))
}
