//! Quotation routes
//!
//! Sellers price a project, send the quotation to the customer, and the
//! customer accepts or rejects it. Sending, accepting and rejecting move the
//! project through the status machine inside the same transaction.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use sqlx::PgConnection;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::{Created, DataResponse, NoContent, Paginated, PaginationParams};
use crate::app::AppState;
use crate::auth::{AuthContext, RequireAuth};
use crate::domain::clean_opt;
use crate::domain::projects::{Actor, Project, ProjectStatus};
use crate::domain::quotations::{
    self, Pricing, PreviewRequest, QuotationRequest, QuotationResponse, QuotationRow,
    QuotationStatus, RejectQuotationRequest, OPEN_QUOTATION_KEY, QUOTATION_COLUMNS,
    QUOTATION_NUMBER_KEY,
};
use crate::domain::{tax, Role};
use crate::error::ApiError;
use crate::routes::projects::{apply_transition, load_project, load_visible_project, lock_project};
use crate::services::notifications;

const MAX_VALIDITY_DAYS: i64 = 90;

/// Fresh ids tried when a quotation number is already taken
const NUMBER_ATTEMPTS: u32 = 3;

/// GSTIN and place of business of a quoting seller
#[derive(Debug, sqlx::FromRow)]
struct SellerTaxInfo {
    gstin: Option<String>,
    state_code: Option<String>,
}

impl SellerTaxInfo {
    /// Registered state: the explicit code, else the GSTIN prefix.
    fn state(&self) -> Option<&str> {
        self.state_code
            .as_deref()
            .or_else(|| self.gstin.as_deref().map(tax::gstin_state_code))
    }
}

async fn seller_tax_info(state: &AppState, seller_id: Uuid) -> Result<SellerTaxInfo, ApiError> {
    let info = sqlx::query_as::<_, SellerTaxInfo>(
        "SELECT gstin, state_code FROM sellers WHERE user_id = $1",
    )
    .bind(seller_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Complete your seller profile before quoting"))?;

    match info.gstin.as_deref() {
        Some(gstin) if tax::validate_gstin(gstin).is_ok() => Ok(info),
        _ => Err(ApiError::bad_request(
            "A valid GSTIN is required on your seller profile to issue quotations",
        )),
    }
}

fn price(req: &QuotationRequest, is_interstate: bool) -> Result<Pricing, ApiError> {
    quotations::compute(&req.pricing_input(is_interstate))
        .map_err(|e| ApiError::validation(e.field(), e.to_string()))
}

fn validity_days(req: &QuotationRequest, default_days: i64) -> Result<i64, ApiError> {
    let days = req.validity_days.unwrap_or(default_days);
    if !(1..=MAX_VALIDITY_DAYS).contains(&days) {
        return Err(ApiError::validation(
            "validity_days",
            format!("Validity must be between 1 and {MAX_VALIDITY_DAYS} days"),
        ));
    }
    Ok(days)
}

async fn load_quotation(state: &AppState, quotation_id: Uuid) -> Result<QuotationRow, ApiError> {
    sqlx::query_as::<_, QuotationRow>(&format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = $1"
    ))
    .bind(quotation_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::not_found("Quotation not found"))
}

async fn lock_quotation(
    conn: &mut PgConnection,
    quotation_id: Uuid,
) -> Result<QuotationRow, ApiError> {
    sqlx::query_as::<_, QuotationRow>(&format!(
        "SELECT {QUOTATION_COLUMNS} FROM quotations WHERE id = $1 FOR UPDATE"
    ))
    .bind(quotation_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Quotation not found"))
}

/// The authoring seller's draft.
async fn load_own_draft(
    state: &AppState,
    quotation_id: Uuid,
    auth: &AuthContext,
) -> Result<QuotationRow, ApiError> {
    let row = load_quotation(state, quotation_id).await?;
    if row.seller_id != auth.user_id {
        return Err(ApiError::not_found("Quotation not found"));
    }
    if row.status() != QuotationStatus::Draft {
        return Err(ApiError::bad_request("Only draft quotations can be changed"));
    }
    Ok(row)
}

/// A sent quotation on a project the caller owns, plus that project.
async fn load_for_response(
    state: &AppState,
    quotation_id: Uuid,
    auth: &AuthContext,
) -> Result<(QuotationRow, Project), ApiError> {
    auth.require_role(Role::Customer)?;
    let row = load_quotation(state, quotation_id).await?;
    let project = load_project(&state.db, row.project_id).await?;
    if !project.is_owner(auth.user_id) || !row.status().visible_to_customer() {
        return Err(ApiError::not_found("Quotation not found"));
    }
    if row.status() != QuotationStatus::Sent {
        return Err(ApiError::bad_request(format!(
            "Quotation is already {}",
            row.status()
        )));
    }
    Ok((row, project))
}

/// POST /api/projects/:id/quotations
pub async fn create_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Json(req): Json<QuotationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;
    let seller = seller_tax_info(&state, auth.user_id).await?;
    let project = load_visible_project(&state.db, project_id, &auth).await?;
    if !project.status.is_open_for_quotation() {
        return Err(ApiError::bad_request(format!(
            "Project is {} and not accepting quotations",
            project.status
        )));
    }

    let is_interstate = quotations::is_interstate(seller.state(), project.state_code.as_deref());
    let pricing = price(&req, is_interstate)?;
    let days = validity_days(&req, state.settings.quotation_default_validity_days)?;

    let now = Utc::now();
    let valid_until = now + Duration::days(days);
    let notes = clean_opt(req.notes);
    let terms = clean_opt(req.terms);

    let mut attempt = 0;
    let row = loop {
        attempt += 1;
        let id = Uuid::new_v4();
        let number = quotations::quotation_number(id, now);

        let inserted = sqlx::query_as::<_, QuotationRow>(&format!(
            r#"
            INSERT INTO quotations (id, quotation_number, project_id, seller_id, items,
                gst_rate, is_interstate, subtotal, cgst_amount, sgst_amount, igst_amount,
                gst_amount, labor_charges, transport_charges, discount, total, valid_until,
                notes, terms)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19)
            RETURNING {QUOTATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&number)
        .bind(project_id)
        .bind(auth.user_id)
        .bind(sqlx::types::Json(&pricing.items))
        .bind(pricing.gst.rate)
        .bind(pricing.is_interstate)
        .bind(pricing.subtotal)
        .bind(pricing.gst.cgst)
        .bind(pricing.gst.sgst)
        .bind(pricing.gst.igst)
        .bind(pricing.gst.total)
        .bind(pricing.labor_charges)
        .bind(pricing.transport_charges)
        .bind(pricing.discount)
        .bind(pricing.total)
        .bind(valid_until)
        .bind(&notes)
        .bind(&terms)
        .fetch_one(&state.db)
        .await;

        match inserted.map_err(ApiError::from) {
            Ok(row) => break row,
            Err(e) if e.is_duplicate_on(QUOTATION_NUMBER_KEY) && attempt < NUMBER_ATTEMPTS => {
                tracing::warn!(
                    quotation_number = %number,
                    attempt,
                    "Quotation number taken, retrying"
                );
            }
            Err(e) => {
                return Err(e.on_duplicate_of(
                    OPEN_QUOTATION_KEY,
                    "You already have an open quotation for this project",
                ));
            }
        }
    };

    tracing::info!(
        quotation_id = %row.id,
        quotation_number = %row.quotation_number,
        project_id = %project_id,
        seller_id = %auth.user_id,
        total = %row.total,
        "Quotation created"
    );

    Ok(Created(QuotationResponse::from(row)))
}

/// POST /api/quotations/preview
pub async fn preview_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;

    let is_interstate = match req.project_id {
        Some(project_id) => {
            let project = load_visible_project(&state.db, project_id, &auth).await?;
            let seller_state = sqlx::query_scalar::<_, Option<String>>(
                "SELECT COALESCE(state_code, LEFT(gstin, 2)) FROM sellers WHERE user_id = $1",
            )
            .bind(auth.user_id)
            .fetch_optional(&state.db)
            .await?
            .flatten();
            quotations::is_interstate(seller_state.as_deref(), project.state_code.as_deref())
        }
        None => req.is_interstate.unwrap_or(false),
    };

    let pricing = price(&req.quotation, is_interstate)?;
    Ok(DataResponse::new(pricing))
}

/// GET /api/projects/:id/quotations
pub async fn list_project_quotations(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_any(&[Role::Customer, Role::Seller])?;
    let project = load_visible_project(&state.db, project_id, &auth).await?;

    let rows = match auth.role {
        Role::Customer => {
            sqlx::query_as::<_, QuotationRow>(&format!(
                r#"
                SELECT {QUOTATION_COLUMNS} FROM quotations
                WHERE project_id = $1 AND status <> 'draft'
                ORDER BY sent_at DESC NULLS LAST, created_at DESC
                "#
            ))
            .bind(project.id)
            .fetch_all(&state.db)
            .await?
        }
        _ => {
            sqlx::query_as::<_, QuotationRow>(&format!(
                r#"
                SELECT {QUOTATION_COLUMNS} FROM quotations
                WHERE project_id = $1 AND seller_id = $2
                ORDER BY created_at DESC
                "#
            ))
            .bind(project.id)
            .bind(auth.user_id)
            .fetch_all(&state.db)
            .await?
        }
    };

    let quotations: Vec<QuotationResponse> =
        rows.into_iter().map(QuotationResponse::from).collect();
    Ok(DataResponse::new(quotations))
}

/// GET /api/quotations/:id
pub async fn get_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let row = load_quotation(&state, quotation_id).await?;

    let allowed = match auth.role {
        Role::Seller => row.seller_id == auth.user_id,
        Role::Customer => {
            row.status().visible_to_customer()
                && load_project(&state.db, row.project_id)
                    .await?
                    .is_owner(auth.user_id)
        }
        Role::Designer => false,
    };
    if !allowed {
        return Err(ApiError::not_found("Quotation not found"));
    }

    Ok(DataResponse::new(QuotationResponse::from(row)))
}

/// GET /api/quotations/mine
pub async fn my_quotations(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Query(pagination): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quotations WHERE seller_id = $1")
        .bind(auth.user_id)
        .fetch_one(&state.db)
        .await?;

    let rows = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        SELECT {QUOTATION_COLUMNS} FROM quotations
        WHERE seller_id = $1
        ORDER BY created_at DESC, id
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(auth.user_id)
    .bind(pagination.limit())
    .bind(pagination.offset())
    .fetch_all(&state.db)
    .await?;

    let data = rows.into_iter().map(QuotationResponse::from).collect();
    Ok(Paginated::new(data, &pagination, total))
}

/// PUT /api/quotations/:id
pub async fn update_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
    Json(req): Json<QuotationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;
    let existing = load_own_draft(&state, quotation_id, &auth).await?;
    let pricing = price(&req, existing.is_interstate)?;

    // Validity is only reset when the seller asks for it
    let valid_until = match req.validity_days {
        Some(_) => {
            let days = validity_days(&req, state.settings.quotation_default_validity_days)?;
            Utc::now() + Duration::days(days)
        }
        None => existing.valid_until,
    };

    let row = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        UPDATE quotations SET
            items = $2, gst_rate = $3, subtotal = $4, cgst_amount = $5, sgst_amount = $6,
            igst_amount = $7, gst_amount = $8, labor_charges = $9, transport_charges = $10,
            discount = $11, total = $12, valid_until = $13,
            notes = COALESCE($14, notes), terms = COALESCE($15, terms),
            updated_at = NOW()
        WHERE id = $1 AND status = 'draft'
        RETURNING {QUOTATION_COLUMNS}
        "#
    ))
    .bind(quotation_id)
    .bind(sqlx::types::Json(&pricing.items))
    .bind(pricing.gst.rate)
    .bind(pricing.subtotal)
    .bind(pricing.gst.cgst)
    .bind(pricing.gst.sgst)
    .bind(pricing.gst.igst)
    .bind(pricing.gst.total)
    .bind(pricing.labor_charges)
    .bind(pricing.transport_charges)
    .bind(pricing.discount)
    .bind(pricing.total)
    .bind(valid_until)
    .bind(clean_opt(req.notes))
    .bind(clean_opt(req.terms))
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::bad_request("Only draft quotations can be changed"))?;

    tracing::info!(quotation_id = %quotation_id, total = %row.total, "Quotation updated");
    Ok(DataResponse::new(QuotationResponse::from(row)))
}

/// DELETE /api/quotations/:id
pub async fn delete_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;
    load_own_draft(&state, quotation_id, &auth).await?;

    let deleted = sqlx::query("DELETE FROM quotations WHERE id = $1 AND status = 'draft'")
        .bind(quotation_id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(ApiError::bad_request("Only draft quotations can be deleted"));
    }

    tracing::info!(quotation_id = %quotation_id, "Quotation deleted");
    Ok(NoContent)
}

/// POST /api/quotations/:id/send
pub async fn send_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require_role(Role::Seller)?;

    let mut tx = state.db.begin().await?;
    let current = lock_quotation(&mut tx, quotation_id).await?;
    if current.seller_id != auth.user_id {
        return Err(ApiError::not_found("Quotation not found"));
    }
    if current.status() != QuotationStatus::Draft {
        return Err(ApiError::bad_request(format!(
            "Quotation is already {}",
            current.status()
        )));
    }
    if current.is_expired_at(Utc::now()) {
        return Err(ApiError::bad_request(
            "Quotation validity has lapsed, update it before sending",
        ));
    }

    let project = lock_project(&mut tx, current.project_id).await?;
    if !project.status.is_open_for_quotation() {
        return Err(ApiError::bad_request(format!(
            "Project is {} and not accepting quotations",
            project.status
        )));
    }

    let row = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        UPDATE quotations SET status = 'sent', sent_at = NOW(), updated_at = NOW()
        WHERE id = $1
        RETURNING {QUOTATION_COLUMNS}
        "#
    ))
    .bind(quotation_id)
    .fetch_one(&mut *tx)
    .await?;

    if matches!(
        project.status,
        ProjectStatus::Submitted | ProjectStatus::DesignInProgress
    ) {
        apply_transition(
            &mut tx,
            project.id,
            project.status,
            ProjectStatus::Quoted,
            Actor::System,
            None,
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        quotation_id = %quotation_id,
        project_id = %project.id,
        "Quotation sent"
    );

    notifications::notify_quotation_received(
        &state,
        project.customer_id,
        project.id,
        row.id,
        &row.quotation_number,
        row.total,
    )
    .await;

    Ok(DataResponse::new(QuotationResponse::from(row)))
}

/// Sibling quotation closed when another one is accepted
#[derive(Debug, sqlx::FromRow)]
struct ClosedQuotation {
    id: Uuid,
    seller_id: Uuid,
    quotation_number: String,
}

/// POST /api/quotations/:id/accept
pub async fn accept_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let (existing, _) = load_for_response(&state, quotation_id, &auth).await?;

    if existing.is_expired_at(Utc::now()) {
        sqlx::query(
            "UPDATE quotations SET status = 'expired', updated_at = NOW() WHERE id = $1 AND status = 'sent'",
        )
        .bind(quotation_id)
        .execute(&state.db)
        .await?;
        tracing::info!(quotation_id = %quotation_id, "Quotation expired before acceptance");
        return Err(ApiError::bad_request("This quotation has expired"));
    }

    let mut tx = state.db.begin().await?;
    let project = lock_project(&mut tx, existing.project_id).await?;
    if project.status != ProjectStatus::Quoted {
        return Err(ApiError::bad_request(format!(
            "Project is {} and cannot accept quotations",
            project.status
        )));
    }

    let row = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        UPDATE quotations SET status = 'accepted', responded_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'sent'
        RETURNING {QUOTATION_COLUMNS}
        "#
    ))
    .bind(quotation_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::conflict("Quotation was answered in the meantime"))?;

    let closed = sqlx::query_as::<_, ClosedQuotation>(
        r#"
        UPDATE quotations
        SET status = 'rejected', responded_at = NOW(), updated_at = NOW(),
            rejection_reason = 'Another quotation was accepted'
        WHERE project_id = $1 AND id <> $2 AND status = 'sent'
        RETURNING id, seller_id, quotation_number
        "#,
    )
    .bind(project.id)
    .bind(quotation_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE projects SET seller_id = $2, accepted_quotation_id = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(project.id)
    .bind(row.seller_id)
    .bind(row.id)
    .execute(&mut *tx)
    .await?;

    apply_transition(
        &mut tx,
        project.id,
        ProjectStatus::Quoted,
        ProjectStatus::Accepted,
        Actor::System,
        Some(auth.user_id),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        quotation_id = %quotation_id,
        project_id = %project.id,
        seller_id = %row.seller_id,
        rejected_others = closed.len(),
        "Quotation accepted"
    );

    notifications::notify_quotation_accepted(
        &state,
        row.seller_id,
        project.id,
        row.id,
        &row.quotation_number,
    )
    .await;
    for other in &closed {
        notifications::notify_quotation_rejected(
            &state,
            other.seller_id,
            project.id,
            other.id,
            &other.quotation_number,
            Some("Another quotation was accepted"),
        )
        .await;
    }

    Ok(DataResponse::new(QuotationResponse::from(row)))
}

/// POST /api/quotations/:id/reject
pub async fn reject_quotation(
    auth: RequireAuth,
    State(state): State<Arc<AppState>>,
    Path(quotation_id): Path<Uuid>,
    body: Option<Json<RejectQuotationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let (existing, _) = load_for_response(&state, quotation_id, &auth).await?;
    let reason = clean_opt(body.and_then(|Json(req)| req.reason));

    let mut tx = state.db.begin().await?;
    let project = lock_project(&mut tx, existing.project_id).await?;

    let row = sqlx::query_as::<_, QuotationRow>(&format!(
        r#"
        UPDATE quotations
        SET status = 'rejected', rejection_reason = $2, responded_at = NOW(), updated_at = NOW()
        WHERE id = $1 AND status = 'sent'
        RETURNING {QUOTATION_COLUMNS}
        "#
    ))
    .bind(quotation_id)
    .bind(&reason)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::conflict("Quotation was answered in the meantime"))?;

    let still_sent: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM quotations WHERE project_id = $1 AND status = 'sent'",
    )
    .bind(project.id)
    .fetch_one(&mut *tx)
    .await?;

    if still_sent == 0 && project.status == ProjectStatus::Quoted {
        apply_transition(
            &mut tx,
            project.id,
            ProjectStatus::Quoted,
            ProjectStatus::Submitted,
            Actor::System,
            None,
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        quotation_id = %quotation_id,
        project_id = %project.id,
        "Quotation rejected"
    );

    notifications::notify_quotation_rejected(
        &state,
        row.seller_id,
        project.id,
        row.id,
        &row.quotation_number,
        reason.as_deref(),
    )
    .await;

    Ok(DataResponse::new(QuotationResponse::from(row)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(validity_days: Option<i64>) -> QuotationRequest {
        QuotationRequest {
            items: Vec::new(),
            gst_rate: None,
            labor_charges: None,
            transport_charges: None,
            discount: None,
            validity_days,
            notes: None,
            terms: None,
        }
    }

    #[test]
    fn validity_falls_back_to_default() {
        assert_eq!(validity_days(&request(None), 30).unwrap(), 30);
        assert_eq!(validity_days(&request(Some(7)), 30).unwrap(), 7);
    }

    #[test]
    fn validity_out_of_range_is_rejected() {
        assert!(validity_days(&request(Some(0)), 30).is_err());
        assert!(validity_days(&request(Some(91)), 30).is_err());
    }

    #[test]
    fn seller_state_prefers_explicit_code() {
        let info = SellerTaxInfo {
            gstin: Some("29ABCDE1234F1Z5".into()),
            state_code: Some("27".into()),
        };
        assert_eq!(info.state(), Some("27"));

        let from_gstin = SellerTaxInfo {
            gstin: Some("29ABCDE1234F1Z5".into()),
            state_code: None,
        };
        assert_eq!(from_gstin.state(), Some("29"));
    }

    #[test]
    fn empty_items_fail_pricing() {
        let err = price(&request(None), false).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[test]
    fn huge_line_items_are_a_validation_error() {
        let mut req = request(None);
        req.items.push(quotations::QuotationItemInput {
            description: "Italian marble flooring".into(),
            hsn_code: None,
            quantity: "1000000000000000".parse().unwrap(),
            unit: Some("sqft".into()),
            unit_price: "1000000000000000".parse().unwrap(),
        });

        match price(&req, false).unwrap_err() {
            ApiError::Validation { field, .. } => assert_eq!(field, "items"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
