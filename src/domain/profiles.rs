//! Role profile domain types
//!
//! Customer, seller and designer details live in their own tables keyed by
//! `user_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use super::clean_opt;
use super::tax::{self, TaxIdError};

// ============================================================================
// Customer
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerProfileInput {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub pincode: Option<String>,
}

impl CustomerProfileInput {
    pub fn normalized(self) -> Result<Self, (&'static str, String)> {
        let pincode = clean_opt(self.pincode);
        if let Some(pin) = &pincode {
            let valid = pin.len() == 6
                && pin.chars().all(|c| c.is_ascii_digit())
                && !pin.starts_with('0');
            if !valid {
                return Err(("pincode", "Pincode must be 6 digits".to_string()));
            }
        }
        Ok(Self {
            address: clean_opt(self.address),
            city: clean_opt(self.city),
            state: clean_opt(self.state),
            pincode,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Seller
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SellerProfileInput {
    #[serde(default)]
    pub business_name: Option<String>,
    #[serde(default)]
    pub gstin: Option<String>,
    #[serde(default)]
    pub pan: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub state_code: Option<String>,
}

/// Validated seller details ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerDetails {
    pub business_name: String,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub address: Option<String>,
    pub state_code: Option<String>,
}

impl SellerProfileInput {
    /// Validate tax identifiers and derive the state code from the GSTIN.
    ///
    /// `fallback_name` is used when no business name is supplied (registration
    /// falls back to the account name).
    pub fn validate(self, fallback_name: &str) -> Result<SellerDetails, (&'static str, String)> {
        let business_name = clean_opt(self.business_name)
            .unwrap_or_else(|| fallback_name.trim().to_string());
        if business_name.is_empty() {
            return Err(("business_name", "Business name is required".to_string()));
        }

        let (gstin, pan) = tax::validate_pair(self.gstin.as_deref(), self.pan.as_deref())
            .map_err(|e| {
                let field = match e {
                    TaxIdError::PanFormat | TaxIdError::PanMismatch => "pan",
                    _ => "gstin",
                };
                (field, e.to_string())
            })?;

        let state_code = match (&gstin, clean_opt(self.state_code)) {
            (Some(g), Some(sc)) if sc != tax::gstin_state_code(g) => {
                return Err((
                    "state_code",
                    "State code does not match the GSTIN".to_string(),
                ));
            }
            (Some(g), _) => Some(tax::gstin_state_code(g).to_string()),
            (None, Some(sc)) if !tax::validate_state_code(&sc) => {
                return Err(("state_code", "Invalid GST state code".to_string()));
            }
            (None, sc) => sc,
        };

        Ok(SellerDetails {
            business_name,
            gstin,
            pan,
            address: clean_opt(self.address),
            state_code,
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SellerProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub business_name: String,
    pub gstin: Option<String>,
    pub pan: Option<String>,
    pub address: Option<String>,
    pub state_code: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Directory entry: contact details stay private
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicSeller {
    pub user_id: Uuid,
    pub name: String,
    pub business_name: String,
    pub gstin: Option<String>,
    pub state_code: Option<String>,
    pub completed_projects: i64,
}

// ============================================================================
// Designer
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DesignerProfileInput {
    #[serde(default)]
    pub specialization: Option<String>,
    #[serde(default)]
    pub experience_years: Option<i32>,
    #[serde(default)]
    pub portfolio_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl DesignerProfileInput {
    pub fn normalized(self) -> Result<Self, (&'static str, String)> {
        if let Some(years) = self.experience_years {
            if !(0..=80).contains(&years) {
                return Err((
                    "experience_years",
                    "Experience must be between 0 and 80 years".to_string(),
                ));
            }
        }
        let portfolio_url = clean_opt(self.portfolio_url);
        if let Some(raw) = &portfolio_url {
            let ok = Url::parse(raw)
                .map(|u| matches!(u.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !ok {
                return Err(("portfolio_url", "Portfolio URL must be http(s)".to_string()));
            }
        }
        Ok(Self {
            specialization: clean_opt(self.specialization),
            experience_years: self.experience_years,
            portfolio_url,
            bio: clean_opt(self.bio),
        })
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DesignerProfile {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub specialization: Option<String>,
    pub experience_years: Option<i32>,
    pub portfolio_url: Option<String>,
    pub bio: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PublicDesigner {
    pub user_id: Uuid,
    pub name: String,
    pub specialization: Option<String>,
    pub experience_years: Option<i32>,
    pub portfolio_url: Option<String>,
    pub bio: Option<String>,
    pub active_projects: i64,
}

/// Whichever profile matches the account's role
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoleProfile {
    Customer(CustomerProfile),
    Seller(SellerProfile),
    Designer(DesignerProfile),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seller_state_code_comes_from_gstin() {
        let details = SellerProfileInput {
            business_name: Some("Shree Interiors".into()),
            gstin: Some("27aapfu0939f1zv".into()),
            ..Default::default()
        }
        .validate("Asha")
        .unwrap();
        assert_eq!(details.state_code.as_deref(), Some("27"));
        assert_eq!(details.gstin.as_deref(), Some("27AAPFU0939F1ZV"));
    }

    #[test]
    fn seller_state_code_must_agree_with_gstin() {
        let err = SellerProfileInput {
            gstin: Some("27AAPFU0939F1ZV".into()),
            state_code: Some("29".into()),
            ..Default::default()
        }
        .validate("Asha")
        .unwrap_err();
        assert_eq!(err.0, "state_code");
    }

    #[test]
    fn seller_pan_mismatch_points_at_pan() {
        let err = SellerProfileInput {
            gstin: Some("27AAPFU0939F1ZV".into()),
            pan: Some("ABCDE1234F".into()),
            ..Default::default()
        }
        .validate("Asha")
        .unwrap_err();
        assert_eq!(err.0, "pan");
    }

    #[test]
    fn seller_business_name_falls_back_to_account_name() {
        let details = SellerProfileInput::default().validate(" Asha Traders ").unwrap();
        assert_eq!(details.business_name, "Asha Traders");
        assert_eq!(details.gstin, None);
    }

    #[test]
    fn customer_pincode() {
        assert!(CustomerProfileInput {
            pincode: Some("411001".into()),
            ..Default::default()
        }
        .normalized()
        .is_ok());
        assert!(CustomerProfileInput {
            pincode: Some("011001".into()),
            ..Default::default()
        }
        .normalized()
        .is_err());
    }

    #[test]
    fn designer_portfolio_must_be_web_url() {
        assert!(DesignerProfileInput {
            portfolio_url: Some("ftp://example.com".into()),
            ..Default::default()
        }
        .normalized()
        .is_err());
        assert!(DesignerProfileInput {
            portfolio_url: Some("https://behance.net/asha".into()),
            experience_years: Some(6),
            ..Default::default()
        }
        .normalized()
        .is_ok());
    }
}
