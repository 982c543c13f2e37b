//! Room measurement domain types
//!
//! Dimensions are stored in the unit the customer entered; areas are always
//! reported in square feet.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Largest accepted dimension in any unit
pub const MAX_DIMENSION: i64 = 10_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    #[default]
    Ft,
    M,
    In,
    Cm,
}

text_enum!(LengthUnit {
    Ft => "ft",
    M => "m",
    In => "in",
    Cm => "cm",
});

impl LengthUnit {
    /// Feet per one unit
    fn feet_factor(self) -> Decimal {
        match self {
            Self::Ft => Decimal::ONE,
            // 1 m = 3.28084 ft
            Self::M => Decimal::new(328084, 5),
            // 1 in = 1/12 ft
            Self::In => Decimal::ONE / Decimal::from(12),
            // 1 cm = 0.0328084 ft
            Self::Cm => Decimal::new(328084, 7),
        }
    }

    pub fn to_feet(self, value: Decimal) -> Decimal {
        value * self.feet_factor()
    }
}

fn round_area(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Floor area in square feet
pub fn floor_area_sqft(length: Decimal, width: Decimal, unit: LengthUnit) -> Decimal {
    round_area(unit.to_feet(length) * unit.to_feet(width))
}

/// Area of the four walls, 2·(l + w)·h, in square feet
pub fn wall_area_sqft(
    length: Decimal,
    width: Decimal,
    height: Decimal,
    unit: LengthUnit,
) -> Decimal {
    let perimeter = Decimal::TWO * (unit.to_feet(length) + unit.to_feet(width));
    round_area(perimeter * unit.to_feet(height))
}

/// Dimension must be positive and at most [`MAX_DIMENSION`].
pub fn validate_dimension(
    field: &'static str,
    value: Decimal,
) -> Result<(), (&'static str, String)> {
    if value <= Decimal::ZERO {
        return Err((field, format!("{field} must be greater than zero")));
    }
    if value > Decimal::from(MAX_DIMENSION) {
        return Err((field, format!("{field} must be at most {MAX_DIMENSION}")));
    }
    Ok(())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MeasurementRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub room_name: String,
    pub room_type: Option<String>,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Option<Decimal>,
    pub unit: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub room_name: String,
    pub room_type: Option<String>,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Option<Decimal>,
    pub unit: LengthUnit,
    pub notes: Option<String>,
    pub floor_area_sqft: Decimal,
    pub wall_area_sqft: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MeasurementRow> for MeasurementResponse {
    fn from(row: MeasurementRow) -> Self {
        let unit: LengthUnit = row.unit.parse().unwrap_or_default();
        Self {
            floor_area_sqft: floor_area_sqft(row.length, row.width, unit),
            wall_area_sqft: row
                .height
                .map(|h| wall_area_sqft(row.length, row.width, h, unit)),
            id: row.id,
            project_id: row.project_id,
            room_name: row.room_name,
            room_type: row.room_type,
            length: row.length,
            width: row.width,
            height: row.height,
            unit,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeasurementList {
    pub measurements: Vec<MeasurementResponse>,
    pub total_floor_area_sqft: Decimal,
    pub total_wall_area_sqft: Decimal,
}

impl MeasurementList {
    pub fn new(measurements: Vec<MeasurementResponse>) -> Self {
        let total_floor_area_sqft = measurements.iter().map(|m| m.floor_area_sqft).sum();
        let total_wall_area_sqft = measurements.iter().filter_map(|m| m.wall_area_sqft).sum();
        Self {
            measurements,
            total_floor_area_sqft,
            total_wall_area_sqft,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMeasurementRequest {
    pub room_name: String,
    #[serde(default)]
    pub room_type: Option<String>,
    pub length: Decimal,
    pub width: Decimal,
    #[serde(default)]
    pub height: Option<Decimal>,
    #[serde(default)]
    pub unit: LengthUnit,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateMeasurementRequest {
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        if self.room_name.trim().is_empty() {
            return Err(("room_name", "Room name is required".to_string()));
        }
        validate_dimension("length", self.length)?;
        validate_dimension("width", self.width)?;
        if let Some(h) = self.height {
            validate_dimension("height", h)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateMeasurementRequest {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub length: Option<Decimal>,
    #[serde(default)]
    pub width: Option<Decimal>,
    #[serde(default)]
    pub height: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<LengthUnit>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl UpdateMeasurementRequest {
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        if matches!(&self.room_name, Some(n) if n.trim().is_empty()) {
            return Err(("room_name", "Room name must not be blank".to_string()));
        }
        for (field, value) in [
            ("length", self.length),
            ("width", self.width),
            ("height", self.height),
        ] {
            if let Some(v) = value {
                validate_dimension(field, v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn floor_area_in_feet() {
        assert_eq!(floor_area_sqft(d("12"), d("10"), LengthUnit::Ft), d("120.00"));
    }

    #[test]
    fn floor_area_converts_metres() {
        // 4m x 3m = 12 m² = 129.17 ft²
        assert_eq!(floor_area_sqft(d("4"), d("3"), LengthUnit::M), d("129.17"));
    }

    #[test]
    fn floor_area_converts_inches() {
        assert_eq!(floor_area_sqft(d("144"), d("120"), LengthUnit::In), d("120.00"));
    }

    #[test]
    fn wall_area() {
        // 2 * (12 + 10) * 9 = 396
        assert_eq!(
            wall_area_sqft(d("12"), d("10"), d("9"), LengthUnit::Ft),
            d("396.00")
        );
    }

    #[test]
    fn dimensions_are_bounded() {
        assert!(validate_dimension("length", d("0")).is_err());
        assert!(validate_dimension("length", d("-1")).is_err());
        assert!(validate_dimension("length", d("10001")).is_err());
        assert!(validate_dimension("length", d("0.5")).is_ok());
    }

    #[test]
    fn list_totals_skip_missing_heights() {
        let now = Utc::now();
        let row = |height: Option<Decimal>| MeasurementRow {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            room_name: "Bedroom".into(),
            room_type: None,
            length: d("10"),
            width: d("10"),
            height,
            unit: "ft".into(),
            notes: None,
            created_at: now,
            updated_at: now,
        };
        let list = MeasurementList::new(vec![row(Some(d("10"))).into(), row(None).into()]);
        assert_eq!(list.total_floor_area_sqft, d("200"));
        assert_eq!(list.total_wall_area_sqft, d("400"));
    }

    #[test]
    fn create_request_validation() {
        let req = CreateMeasurementRequest {
            room_name: "  ".into(),
            room_type: None,
            length: d("10"),
            width: d("10"),
            height: None,
            unit: LengthUnit::Ft,
            notes: None,
        };
        assert_eq!(req.validate().unwrap_err().0, "room_name");
    }
}
