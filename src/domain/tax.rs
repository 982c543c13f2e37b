//! Indian tax identifiers and GST rate slabs
//!
//! GSTIN layout: 2-digit state code, 10-character PAN, entity number,
//! the literal `Z`, and a checksum character.

use regex::Regex;
use rust_decimal::Decimal;
use std::sync::LazyLock;

static GSTIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$").expect("valid GSTIN regex")
});

static PAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").expect("valid PAN regex"));

/// Rates accepted on a quotation, in percent.
pub const GST_SLABS: [u32; 5] = [0, 5, 12, 18, 28];

pub const DEFAULT_GST_RATE: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaxIdError {
    #[error("Invalid GSTIN format")]
    GstinFormat,
    #[error("GSTIN state code {0} is not a valid GST state code")]
    GstinStateCode(String),
    #[error("Invalid PAN format")]
    PanFormat,
    #[error("PAN does not match the PAN embedded in the GSTIN")]
    PanMismatch,
}

/// Upper-case and trim user input before validation.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

fn is_valid_state_code(code: &str) -> bool {
    match code.parse::<u8>() {
        Ok(n) => (1..=38).contains(&n) || n == 97 || n == 99,
        Err(_) => false,
    }
}

/// Validate a normalized GSTIN.
pub fn validate_gstin(gstin: &str) -> Result<(), TaxIdError> {
    if !GSTIN_RE.is_match(gstin) {
        return Err(TaxIdError::GstinFormat);
    }
    let state = &gstin[..2];
    if !is_valid_state_code(state) {
        return Err(TaxIdError::GstinStateCode(state.to_string()));
    }
    Ok(())
}

/// Validate a normalized PAN.
pub fn validate_pan(pan: &str) -> Result<(), TaxIdError> {
    if PAN_RE.is_match(pan) {
        Ok(())
    } else {
        Err(TaxIdError::PanFormat)
    }
}

/// Two-digit state code of a GSTIN that has already passed validation.
pub fn gstin_state_code(gstin: &str) -> &str {
    &gstin[..2]
}

/// Characters 3-12 of a GSTIN carry the holder's PAN.
pub fn gstin_pan(gstin: &str) -> &str {
    &gstin[2..12]
}

/// Validate an optional GSTIN / PAN pair, returning normalized values.
pub fn validate_pair(
    gstin: Option<&str>,
    pan: Option<&str>,
) -> Result<(Option<String>, Option<String>), TaxIdError> {
    let gstin = gstin.map(normalize).filter(|s| !s.is_empty());
    let pan = pan.map(normalize).filter(|s| !s.is_empty());

    if let Some(g) = &gstin {
        validate_gstin(g)?;
    }
    if let Some(p) = &pan {
        validate_pan(p)?;
    }
    if let (Some(g), Some(p)) = (&gstin, &pan) {
        if gstin_pan(g) != p {
            return Err(TaxIdError::PanMismatch);
        }
    }
    Ok((gstin, pan))
}

/// Validate a standalone 2-digit state code such as a project's place of supply.
pub fn validate_state_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_digit()) && is_valid_state_code(code)
}

pub fn is_valid_gst_rate(rate: Decimal) -> bool {
    GST_SLABS.iter().any(|slab| Decimal::from(*slab) == rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GSTIN: &str = "27AAPFU0939F1ZV";

    #[test]
    fn accepts_well_formed_gstin() {
        assert_eq!(validate_gstin(GSTIN), Ok(()));
        assert_eq!(gstin_state_code(GSTIN), "27");
        assert_eq!(gstin_pan(GSTIN), "AAPFU0939F");
    }

    #[test]
    fn rejects_malformed_gstin() {
        assert_eq!(validate_gstin("27AAPFU0939F1YV"), Err(TaxIdError::GstinFormat));
        assert_eq!(validate_gstin("27AAPFU0939F1Z"), Err(TaxIdError::GstinFormat));
        assert_eq!(validate_gstin("27aapfu0939f1zv"), Err(TaxIdError::GstinFormat));
        assert_eq!(
            validate_gstin("45AAPFU0939F1ZV"),
            Err(TaxIdError::GstinStateCode("45".into()))
        );
        assert_eq!(
            validate_gstin("00AAPFU0939F1ZV"),
            Err(TaxIdError::GstinStateCode("00".into()))
        );
    }

    #[test]
    fn pan_format() {
        assert_eq!(validate_pan("AAPFU0939F"), Ok(()));
        assert_eq!(validate_pan("AAPF0939F"), Err(TaxIdError::PanFormat));
        assert_eq!(validate_pan("1APFU0939F"), Err(TaxIdError::PanFormat));
    }

    #[test]
    fn pair_is_normalized_and_cross_checked() {
        let (g, p) = validate_pair(Some(" 27aapfu0939f1zv "), Some("aapfu0939f")).unwrap();
        assert_eq!(g.as_deref(), Some(GSTIN));
        assert_eq!(p.as_deref(), Some("AAPFU0939F"));

        assert_eq!(
            validate_pair(Some(GSTIN), Some("ABCDE1234F")),
            Err(TaxIdError::PanMismatch)
        );

        assert_eq!(validate_pair(Some("  "), None), Ok((None, None)));
    }

    #[test]
    fn state_codes() {
        assert!(validate_state_code("07"));
        assert!(validate_state_code("97"));
        assert!(!validate_state_code("7"));
        assert!(!validate_state_code("40"));
        assert!(!validate_state_code("ab"));
    }

    #[test]
    fn gst_slabs() {
        assert!(is_valid_gst_rate(Decimal::from(18)));
        assert!(is_valid_gst_rate(Decimal::new(500, 2)));
        assert!(!is_valid_gst_rate(Decimal::from(10)));
    }
}
