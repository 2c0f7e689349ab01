//! Normalization of heterogeneous upstream field names
//!
//! The platform's guest records spell contact fields several different ways
//! depending on contract type and export path. The candidate lists are data,
//! ordered by preference; the first non-empty value wins.

use serde_json::Value;

/// Known spellings of the mobile number field, in preference order.
pub const MOBILE_ALIASES: &[&str] = &["mobile", "phone", "telephone", "guestsMobile", "linkPhone"];

/// Known spellings of the identity-card number field, in preference order.
pub const ID_CARD_ALIASES: &[&str] = &["idCard", "idCardNo", "cardNo", "certificateNo", "idNumber"];

/// Return the first non-empty string value among `candidates` in `record`.
///
/// Numeric values are accepted and rendered as strings; null, missing, and
/// empty-string fields are skipped.
pub fn first_non_empty(record: &Value, candidates: &[&str]) -> Option<String> {
    for key in candidates {
        match record.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.trim().to_string()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

/// Normalized contact fields extracted from one raw guest record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContactFields {
    pub mobile: Option<String>,
    pub id_card: Option<String>,
}

pub fn normalize_contact(record: &Value) -> ContactFields {
    ContactFields {
        mobile: first_non_empty(record, MOBILE_ALIASES),
        id_card: first_non_empty(record, ID_CARD_ALIASES),
    }
}
