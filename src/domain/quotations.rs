//! Quotation pricing and lifecycle
//!
//! Pricing rules:
//! - `subtotal = Σ quantity × unit_price`
//! - `gst = subtotal × rate / 100`, split evenly into CGST/SGST for intra-state
//!   supply, or charged entirely as IGST for inter-state supply
//! - `total = subtotal + gst + labor + transport − discount`
//!
//! Every stored figure is rounded half away from zero to paise.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::tax;

pub const MAX_ITEMS: usize = 200;

/// Unique index allowing one draft or sent quotation per seller and project
pub const OPEN_QUOTATION_KEY: &str = "quotations_open_per_seller_key";
pub const QUOTATION_NUMBER_KEY: &str = "quotations_number_key";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotationStatus {
    #[default]
    Draft,
    Sent,
    Accepted,
    Rejected,
    Expired,
}

text_enum!(QuotationStatus {
    Draft => "draft",
    Sent => "sent",
    Accepted => "accepted",
    Rejected => "rejected",
    Expired => "expired",
});

impl QuotationStatus {
    /// Draft and sent quotations still count as the seller's live offer.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Draft | Self::Sent)
    }

    /// Customers never see a seller's drafts.
    pub fn visible_to_customer(self) -> bool {
        self != Self::Draft
    }
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Largest figure the NUMERIC(14,2) money columns hold
fn max_amount() -> Decimal {
    Decimal::new(99_999_999_999_999, 2)
}

/// Round to paise and keep within the storable range. `None` means the
/// arithmetic itself overflowed.
fn bounded(value: Option<Decimal>, field: &'static str) -> Result<Decimal, PricingError> {
    value
        .map(money)
        .filter(|v| *v <= max_amount())
        .ok_or(PricingError::AmountTooLarge(field))
}

/// Line item as submitted by the seller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationItemInput {
    pub description: String,
    #[serde(default)]
    pub hsn_code: Option<String>,
    pub quantity: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    pub unit_price: Decimal,
}

/// Line item as stored, with its computed total
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotationItem {
    pub description: String,
    pub hsn_code: Option<String>,
    pub quantity: Decimal,
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    #[error("A quotation needs at least one item")]
    NoItems,
    #[error("A quotation can have at most {MAX_ITEMS} items")]
    TooManyItems,
    #[error("Item {0}: description is required")]
    MissingDescription(usize),
    #[error("Item {0}: quantity must be greater than zero")]
    InvalidQuantity(usize),
    #[error("Item {0}: unit price must not be negative")]
    NegativePrice(usize),
    #[error("Item {0}: HSN/SAC code must be 4 to 8 digits")]
    InvalidHsn(usize),
    #[error("GST rate must be one of 0, 5, 12, 18 or 28 percent")]
    InvalidGstRate,
    #[error("{0} must not be negative")]
    NegativeCharge(&'static str),
    #[error("Discount cannot exceed the quotation amount")]
    DiscountTooLarge,
    #[error("{0} exceeds the largest supported amount")]
    AmountTooLarge(&'static str),
}

impl PricingError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::NoItems | Self::TooManyItems => "items",
            Self::MissingDescription(_)
            | Self::InvalidQuantity(_)
            | Self::NegativePrice(_)
            | Self::InvalidHsn(_) => "items",
            Self::InvalidGstRate => "gst_rate",
            Self::NegativeCharge(field) | Self::AmountTooLarge(field) => field,
            Self::DiscountTooLarge => "discount",
        }
    }
}

/// Everything needed to price a quotation
#[derive(Debug, Clone)]
pub struct PricingInput<'a> {
    pub items: &'a [QuotationItemInput],
    pub gst_rate: Decimal,
    pub is_interstate: bool,
    pub labor_charges: Decimal,
    pub transport_charges: Decimal,
    pub discount: Decimal,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GstBreakdown {
    pub rate: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub igst: Decimal,
    pub total: Decimal,
}

impl GstBreakdown {
    /// Split `gst_amount` for the place of supply. For intra-state supply SGST
    /// takes whatever is left after rounding CGST so the halves always add up.
    pub fn split(rate: Decimal, gst_amount: Decimal, is_interstate: bool) -> Self {
        if is_interstate {
            return Self {
                rate,
                cgst: Decimal::ZERO,
                sgst: Decimal::ZERO,
                igst: gst_amount,
                total: gst_amount,
            };
        }
        let cgst = money(gst_amount / Decimal::TWO);
        Self {
            rate,
            cgst,
            sgst: gst_amount - cgst,
            igst: Decimal::ZERO,
            total: gst_amount,
        }
    }
}

/// Priced quotation figures
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pricing {
    pub items: Vec<QuotationItem>,
    pub subtotal: Decimal,
    pub gst: GstBreakdown,
    pub is_interstate: bool,
    pub labor_charges: Decimal,
    pub transport_charges: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

fn valid_hsn(code: &str) -> bool {
    (4..=8).contains(&code.len()) && code.chars().all(|c| c.is_ascii_digit())
}

/// Validate and price a quotation.
pub fn compute(input: &PricingInput<'_>) -> Result<Pricing, PricingError> {
    if input.items.is_empty() {
        return Err(PricingError::NoItems);
    }
    if input.items.len() > MAX_ITEMS {
        return Err(PricingError::TooManyItems);
    }
    if !tax::is_valid_gst_rate(input.gst_rate) {
        return Err(PricingError::InvalidGstRate);
    }
    for (field, value) in [
        ("labor_charges", input.labor_charges),
        ("transport_charges", input.transport_charges),
        ("discount", input.discount),
    ] {
        if value < Decimal::ZERO {
            return Err(PricingError::NegativeCharge(field));
        }
    }

    let mut items = Vec::with_capacity(input.items.len());
    for (idx, item) in input.items.iter().enumerate() {
        let position = idx + 1;
        let description = item.description.trim();
        if description.is_empty() {
            return Err(PricingError::MissingDescription(position));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(PricingError::InvalidQuantity(position));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(PricingError::NegativePrice(position));
        }
        let hsn_code = item
            .hsn_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if matches!(&hsn_code, Some(c) if !valid_hsn(c)) {
            return Err(PricingError::InvalidHsn(position));
        }

        items.push(QuotationItem {
            description: description.to_string(),
            hsn_code,
            quantity: item.quantity,
            unit: item.unit.clone(),
            unit_price: bounded(Some(item.unit_price), "items")?,
            line_total: bounded(item.quantity.checked_mul(item.unit_price), "items")?,
        });
    }

    let subtotal = items.iter().try_fold(Decimal::ZERO, |acc, i| {
        bounded(acc.checked_add(i.line_total), "items")
    })?;
    let gst_amount = bounded(
        subtotal
            .checked_mul(input.gst_rate)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED)),
        "gst_rate",
    )?;
    let gst = GstBreakdown::split(input.gst_rate, gst_amount, input.is_interstate);

    let labor_charges = bounded(Some(input.labor_charges), "labor_charges")?;
    let transport_charges = bounded(Some(input.transport_charges), "transport_charges")?;
    let discount = bounded(Some(input.discount), "discount")?;

    let gross = bounded(
        subtotal
            .checked_add(gst_amount)
            .and_then(|v| v.checked_add(labor_charges))
            .and_then(|v| v.checked_add(transport_charges)),
        "total",
    )?;
    if discount > gross {
        return Err(PricingError::DiscountTooLarge);
    }

    Ok(Pricing {
        items,
        subtotal,
        gst,
        is_interstate: input.is_interstate,
        labor_charges,
        transport_charges,
        discount,
        total: gross - discount,
    })
}

/// Inter-state supply when both state codes are known and differ.
pub fn is_interstate(seller_state: Option<&str>, place_of_supply: Option<&str>) -> bool {
    matches!((seller_state, place_of_supply), (Some(a), Some(b)) if a != b)
}

/// `QT-<YYYYMM>-<first 8 hex of id>`
pub fn quotation_number(id: Uuid, at: DateTime<Utc>) -> String {
    let hex = id.simple().to_string();
    format!(
        "QT-{:04}{:02}-{}",
        at.year(),
        at.month(),
        hex[..8].to_ascii_uppercase()
    )
}

// ============================================================================
// Persistence and DTOs
// ============================================================================

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QuotationRow {
    pub id: Uuid,
    pub quotation_number: String,
    pub project_id: Uuid,
    pub seller_id: Uuid,
    pub items: sqlx::types::Json<Vec<QuotationItem>>,
    pub gst_rate: Decimal,
    pub is_interstate: bool,
    pub subtotal: Decimal,
    pub cgst_amount: Decimal,
    pub sgst_amount: Decimal,
    pub igst_amount: Decimal,
    pub gst_amount: Decimal,
    pub labor_charges: Decimal,
    pub transport_charges: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: String,
    pub valid_until: DateTime<Utc>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub rejection_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const QUOTATION_COLUMNS: &str = "id, quotation_number, project_id, seller_id, items, \
    gst_rate, is_interstate, subtotal, cgst_amount, sgst_amount, igst_amount, gst_amount, \
    labor_charges, transport_charges, discount, total, status, valid_until, notes, terms, \
    rejection_reason, sent_at, responded_at, created_at, updated_at";

impl QuotationRow {
    pub fn status(&self) -> QuotationStatus {
        self.status.parse().unwrap_or_default()
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.valid_until < now
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotationResponse {
    pub id: Uuid,
    pub quotation_number: String,
    pub project_id: Uuid,
    pub seller_id: Uuid,
    pub items: Vec<QuotationItem>,
    pub subtotal: Decimal,
    pub gst: GstBreakdown,
    pub is_interstate: bool,
    pub labor_charges: Decimal,
    pub transport_charges: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub status: QuotationStatus,
    pub valid_until: DateTime<Utc>,
    pub notes: Option<String>,
    pub terms: Option<String>,
    pub rejection_reason: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<QuotationRow> for QuotationResponse {
    fn from(row: QuotationRow) -> Self {
        let status = row.status();
        Self {
            gst: GstBreakdown {
                rate: row.gst_rate,
                cgst: row.cgst_amount,
                sgst: row.sgst_amount,
                igst: row.igst_amount,
                total: row.gst_amount,
            },
            status,
            id: row.id,
            quotation_number: row.quotation_number,
            project_id: row.project_id,
            seller_id: row.seller_id,
            items: row.items.0,
            subtotal: row.subtotal,
            is_interstate: row.is_interstate,
            labor_charges: row.labor_charges,
            transport_charges: row.transport_charges,
            discount: row.discount,
            total: row.total,
            valid_until: row.valid_until,
            notes: row.notes,
            terms: row.terms,
            rejection_reason: row.rejection_reason,
            sent_at: row.sent_at,
            responded_at: row.responded_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuotationRequest {
    pub items: Vec<QuotationItemInput>,
    #[serde(default)]
    pub gst_rate: Option<Decimal>,
    #[serde(default)]
    pub labor_charges: Option<Decimal>,
    #[serde(default)]
    pub transport_charges: Option<Decimal>,
    #[serde(default)]
    pub discount: Option<Decimal>,
    /// Days from now; defaults to the configured validity
    #[serde(default)]
    pub validity_days: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub terms: Option<String>,
}

impl QuotationRequest {
    pub fn pricing_input(&self, is_interstate: bool) -> PricingInput<'_> {
        PricingInput {
            items: &self.items,
            gst_rate: self
                .gst_rate
                .unwrap_or_else(|| Decimal::from(tax::DEFAULT_GST_RATE)),
            is_interstate,
            labor_charges: self.labor_charges.unwrap_or_default(),
            transport_charges: self.transport_charges.unwrap_or_default(),
            discount: self.discount.unwrap_or_default(),
        }
    }
}

/// Preview request: pricing plus an explicit place-of-supply hint
#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    #[serde(flatten)]
    pub quotation: QuotationRequest,
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub is_interstate: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RejectQuotationRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn item(qty: &str, price: &str) -> QuotationItemInput {
        QuotationItemInput {
            description: "Modular wardrobe".into(),
            hsn_code: Some("9403".into()),
            quantity: d(qty),
            unit: Some("nos".into()),
            unit_price: d(price),
        }
    }

    fn input(items: &[QuotationItemInput]) -> PricingInput<'_> {
        PricingInput {
            items,
            gst_rate: d("18"),
            is_interstate: false,
            labor_charges: Decimal::ZERO,
            transport_charges: Decimal::ZERO,
            discount: Decimal::ZERO,
        }
    }

    #[test]
    fn gst_split_evenly_between_cgst_and_sgst() {
        let items = [item("2", "10000")];
        let pricing = compute(&input(&items)).unwrap();
        assert_eq!(pricing.subtotal, d("20000"));
        assert_eq!(pricing.gst.total, d("3600"));
        assert_eq!(pricing.gst.cgst, d("1800"));
        assert_eq!(pricing.gst.sgst, d("1800"));
        assert_eq!(pricing.gst.igst, Decimal::ZERO);
        assert_eq!(pricing.total, d("23600"));
    }

    #[test]
    fn interstate_supply_uses_igst() {
        let items = [item("1", "5000")];
        let mut inp = input(&items);
        inp.is_interstate = true;
        let pricing = compute(&inp).unwrap();
        assert_eq!(pricing.gst.igst, d("900"));
        assert_eq!(pricing.gst.cgst, Decimal::ZERO);
        assert_eq!(pricing.gst.sgst, Decimal::ZERO);
    }

    #[test]
    fn total_adds_charges_and_subtracts_discount() {
        let items = [item("3", "1500"), item("1.5", "800")];
        let mut inp = input(&items);
        inp.labor_charges = d("2500");
        inp.transport_charges = d("750");
        inp.discount = d("1000");
        let pricing = compute(&inp).unwrap();
        // 4500 + 1200
        assert_eq!(pricing.subtotal, d("5700"));
        assert_eq!(pricing.gst.total, d("1026"));
        assert_eq!(pricing.total, d("8976"));
        assert_eq!(pricing.items[1].line_total, d("1200"));
    }

    #[test]
    fn odd_paise_go_to_sgst() {
        // 18% of 100.05 = 18.009 -> 18.01; halves 9.01 + 9.00
        let items = [item("1", "100.05")];
        let pricing = compute(&input(&items)).unwrap();
        assert_eq!(pricing.gst.total, d("18.01"));
        assert_eq!(pricing.gst.cgst, d("9.01"));
        assert_eq!(pricing.gst.sgst, d("9.00"));
        assert_eq!(pricing.gst.cgst + pricing.gst.sgst, pricing.gst.total);
    }

    #[test]
    fn zero_rated_supply() {
        let items = [item("1", "999")];
        let mut inp = input(&items);
        inp.gst_rate = Decimal::ZERO;
        let pricing = compute(&inp).unwrap();
        assert_eq!(pricing.gst.total, Decimal::ZERO);
        assert_eq!(pricing.total, d("999"));
    }

    #[test]
    fn rejects_invalid_input() {
        assert_eq!(compute(&input(&[])).unwrap_err(), PricingError::NoItems);

        let items = [item("0", "10")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::InvalidQuantity(1)
        );

        let items = [item("1", "10"), item("1", "-1")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::NegativePrice(2)
        );

        let mut bad_hsn = item("1", "10");
        bad_hsn.hsn_code = Some("94A3".into());
        assert_eq!(
            compute(&input(&[bad_hsn])).unwrap_err(),
            PricingError::InvalidHsn(1)
        );

        let items = [item("1", "10")];
        let mut inp = input(&items);
        inp.gst_rate = d("10");
        assert_eq!(compute(&inp).unwrap_err(), PricingError::InvalidGstRate);

        let mut inp = input(&items);
        inp.labor_charges = d("-5");
        let err = compute(&inp).unwrap_err();
        assert_eq!(err, PricingError::NegativeCharge("labor_charges"));
        assert_eq!(err.field(), "labor_charges");
    }

    #[test]
    fn discount_cannot_exceed_gross() {
        let items = [item("1", "100")];
        let mut inp = input(&items);
        inp.discount = d("118");
        assert_eq!(compute(&inp).unwrap().total, Decimal::ZERO);
        inp.discount = d("118.01");
        assert_eq!(compute(&inp).unwrap_err(), PricingError::DiscountTooLarge);
    }

    #[test]
    fn oversized_amounts_are_rejected() {
        let items = [item("1000000000000000", "1000000000000000")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::AmountTooLarge("items")
        );

        // Past what Decimal can represent at all
        let items = [item("79228162514264337593543950335", "2")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::AmountTooLarge("items")
        );

        // Each line fits, the sum does not
        let items = [item("1", "999999999999.99"), item("1", "1")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::AmountTooLarge("items")
        );

        // Subtotal fits, adding GST does not
        let items = [item("1", "900000000000")];
        assert_eq!(
            compute(&input(&items)).unwrap_err(),
            PricingError::AmountTooLarge("total")
        );

        let items = [item("1", "10")];
        let mut inp = input(&items);
        inp.transport_charges = d("1000000000000");
        let err = compute(&inp).unwrap_err();
        assert_eq!(err, PricingError::AmountTooLarge("transport_charges"));
        assert_eq!(err.field(), "transport_charges");
    }

    #[test]
    fn largest_storable_total_is_accepted() {
        let items = [item("1", "999999999999.99")];
        let mut inp = input(&items);
        inp.gst_rate = Decimal::ZERO;
        assert_eq!(compute(&inp).unwrap().total, d("999999999999.99"));
    }

    #[test]
    fn interstate_detection() {
        assert!(is_interstate(Some("27"), Some("29")));
        assert!(!is_interstate(Some("27"), Some("27")));
        assert!(!is_interstate(None, Some("27")));
        assert!(!is_interstate(Some("27"), None));
    }

    #[test]
    fn quotation_numbers() {
        let id = Uuid::parse_str("a1b2c3d4-0000-4000-8000-000000000000").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 9, 10, 0, 0).unwrap();
        assert_eq!(quotation_number(id, at), "QT-202603-A1B2C3D4");
    }

    #[test]
    fn status_flags() {
        assert!(QuotationStatus::Draft.is_open());
        assert!(QuotationStatus::Sent.is_open());
        assert!(!QuotationStatus::Expired.is_open());
        assert!(!QuotationStatus::Draft.visible_to_customer());
        assert!(QuotationStatus::Rejected.visible_to_customer());
    }
}
