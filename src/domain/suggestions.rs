//! Designer material suggestions
//!
//! A designer assigned to a project proposes materials; the customer approves
//! or rejects each one. Suggestions are immutable once reviewed.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

text_enum!(SuggestionStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SuggestionRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub designer_id: Uuid,
    pub room_name: Option<String>,
    pub material_name: String,
    pub category: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub estimated_unit_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub status: String,
    pub customer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const SUGGESTION_COLUMNS: &str = "id, project_id, designer_id, room_name, material_name, \
    category, brand, description, quantity, unit, estimated_unit_price, image_url, status, \
    customer_note, created_at, updated_at";

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub designer_id: Uuid,
    pub room_name: Option<String>,
    pub material_name: String,
    pub category: String,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit: Option<String>,
    pub estimated_unit_price: Option<Decimal>,
    pub estimated_total: Option<Decimal>,
    pub image_url: Option<String>,
    pub status: SuggestionStatus,
    pub customer_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn estimated_total(quantity: Option<Decimal>, unit_price: Option<Decimal>) -> Option<Decimal> {
    Some(
        (quantity? * unit_price?).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
    )
}

impl From<SuggestionRow> for SuggestionResponse {
    fn from(row: SuggestionRow) -> Self {
        Self {
            estimated_total: estimated_total(row.quantity, row.estimated_unit_price),
            status: row.status.parse().unwrap_or_default(),
            id: row.id,
            project_id: row.project_id,
            designer_id: row.designer_id,
            room_name: row.room_name,
            material_name: row.material_name,
            category: row.category,
            brand: row.brand,
            description: row.description,
            quantity: row.quantity,
            unit: row.unit,
            estimated_unit_price: row.estimated_unit_price,
            image_url: row.image_url,
            customer_note: row.customer_note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SuggestionInput {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub material_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub estimated_unit_price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl SuggestionInput {
    /// `creating` requires material name and category; updates may omit them.
    pub fn validate(&self, creating: bool) -> Result<(), (&'static str, String)> {
        for (field, value) in [
            ("material_name", &self.material_name),
            ("category", &self.category),
        ] {
            match value {
                None if creating => return Err((field, format!("{field} is required"))),
                Some(v) if v.trim().is_empty() => {
                    return Err((field, format!("{field} must not be blank")))
                }
                _ => {}
            }
        }
        if matches!(self.quantity, Some(q) if q <= Decimal::ZERO) {
            return Err(("quantity", "Quantity must be greater than zero".to_string()));
        }
        if matches!(self.estimated_unit_price, Some(p) if p < Decimal::ZERO) {
            return Err((
                "estimated_unit_price",
                "Price must not be negative".to_string(),
            ));
        }
        if let Some(raw) = &self.image_url {
            if Url::parse(raw).map(|u| u.scheme() != "https").unwrap_or(true) {
                return Err(("image_url", "Image URL must be an https URL".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewSuggestionRequest {
    pub status: SuggestionStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SuggestionListQuery {
    #[serde(default)]
    pub status: Option<SuggestionStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_needs_both_figures() {
        assert_eq!(
            estimated_total(Some(Decimal::new(125, 1)), Some(Decimal::from(80))),
            Some(Decimal::from(1000))
        );
        assert_eq!(estimated_total(None, Some(Decimal::from(80))), None);
        assert_eq!(estimated_total(Some(Decimal::ONE), None), None);
    }

    #[test]
    fn create_requires_name_and_category() {
        let input = SuggestionInput {
            material_name: Some("Italian marble".into()),
            ..Default::default()
        };
        assert_eq!(input.validate(true).unwrap_err().0, "category");
        assert!(input.validate(false).is_ok());
    }

    #[test]
    fn rejects_bad_numbers_and_urls() {
        let base = SuggestionInput {
            material_name: Some("Oak veneer".into()),
            category: Some("wood".into()),
            ..Default::default()
        };
        let bad_qty = SuggestionInput {
            quantity: Some(Decimal::ZERO),
            ..base.clone()
        };
        assert_eq!(bad_qty.validate(true).unwrap_err().0, "quantity");

        let bad_url = SuggestionInput {
            image_url: Some("http://example.com/a.png".into()),
            ..base.clone()
        };
        assert_eq!(bad_url.validate(true).unwrap_err().0, "image_url");

        assert!(base.validate(true).is_ok());
    }
}
