//! Snapshot-side domain types mirroring upstream occupancy state
//!
//! One `Tenant` row per upstream occupancy entry. The snapshot is fully
//! replaced on every sync cycle; the upstream numeric id is the stable key.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Type};

/// Fixed tag set maintained on the dashboard side. The master record is
/// authoritative for this value; it only ever flows master -> snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Tag {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "22级工程硕博士")]
    Cohort2022,
    #[serde(rename = "23级工程硕博士")]
    Cohort2023,
    #[serde(rename = "24级工程硕博士")]
    Cohort2024,
    #[serde(rename = "实习实践")]
    Internship,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::None => "",
            Tag::Cohort2022 => "22级工程硕博士",
            Tag::Cohort2023 => "23级工程硕博士",
            Tag::Cohort2024 => "24级工程硕博士",
            Tag::Internship => "实习实践",
        }
    }

    /// Parse a tag value, rejecting anything outside the fixed set.
    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "" => Ok(Tag::None),
            "22级工程硕博士" => Ok(Tag::Cohort2022),
            "23级工程硕博士" => Ok(Tag::Cohort2023),
            "24级工程硕博士" => Ok(Tag::Cohort2024),
            "实习实践" => Ok(Tag::Internship),
            other => Err(format!("Invalid tag value: {other}")),
        }
    }
}

impl Type<sqlx::Sqlite> for Tag {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <String as Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'q> Encode<'q, sqlx::Sqlite> for Tag {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as Encode<sqlx::Sqlite>>::encode(self.as_str().to_string(), buf)
    }
}

impl<'r> Decode<'r, sqlx::Sqlite> for Tag {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as Decode<sqlx::Sqlite>>::decode(value)?;
        Tag::parse(&s).map_err(Into::into)
    }
}

/// One snapshot row, keyed by the upstream numeric identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: i64,
    pub guests_id: Option<String>,
    pub house_id: Option<i64>,
    pub house_name: String,
    pub tenant_name: String,
    pub mobile: Option<String>,
    pub id_card: Option<String>,
    pub is_main: bool,
    pub floor: i64,
    pub room_number: i64,
    pub tag: Tag,
    pub updated_at: DateTime<Utc>,
}

static ROOM_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)$").expect("valid regex"));

/// Derive `(floor, room_number)` from a house name like `"A-305"`.
///
/// The trailing digit run after the final dash is the room number. The floor
/// is the first two digits when the run is longer than three digits
/// (`"A-1205"` -> floor 12), otherwise the first digit (`"A-305"` -> floor 3).
/// House names without a digit suffix map to `(0, 0)`.
pub fn derive_room(house_name: &str) -> (i64, i64) {
    let Some(caps) = ROOM_SUFFIX.captures(house_name.trim()) else {
        return (0, 0);
    };
    let digits = &caps[1];
    let room_number = digits.parse::<i64>().unwrap_or(0);
    let floor_len = if digits.len() > 3 { 2 } else { 1 };
    let floor = digits[..floor_len].parse::<i64>().unwrap_or(0);
    (floor, room_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("A-305", 3, 305)]
    #[case("A-1205", 12, 1205)]
    #[case("B座-101", 1, 101)]
    #[case("C-0809", 8, 809)]
    #[case("宿舍楼", 0, 0)]
    #[case("", 0, 0)]
    #[case("A-", 0, 0)]
    fn derives_floor_and_room_from_house_name(
        #[case] house_name: &str,
        #[case] floor: i64,
        #[case] room: i64,
    ) {
        assert_eq!(derive_room(house_name), (floor, room));
    }

    #[test]
    fn tag_round_trips_through_parse() {
        for tag in [
            Tag::None,
            Tag::Cohort2022,
            Tag::Cohort2023,
            Tag::Cohort2024,
            Tag::Internship,
        ] {
            assert_eq!(Tag::parse(tag.as_str()), Ok(tag));
        }
    }

    #[test]
    fn tag_rejects_values_outside_the_fixed_set() {
        assert!(Tag::parse("25级工程硕博士").is_err());
        assert!(Tag::parse("visitor").is_err());
    }

    #[test]
    fn tag_serializes_as_its_literal_string() {
        assert_eq!(
            serde_json::to_string(&Tag::Internship).unwrap(),
            "\"实习实践\""
        );
        assert_eq!(serde_json::to_string(&Tag::None).unwrap(), "\"\"");
    }
}
