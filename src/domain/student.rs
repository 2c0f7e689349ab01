//! Master-side domain types: long-lived student identity records
//!
//! Students outlive any single sync cycle. The reconciler owns all mutations;
//! records are never deleted, only marked checked-out with their occupancy
//! list cleared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::tenant::Tag;

/// One occupied room for a student. A student with several rooms has exactly
/// one entry flagged as the primary occupancy (the first room encountered
/// during reconciliation).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    pub room_number: i64,
    pub is_main: bool,
}

/// Authoritative student master record, independently keyed from the
/// snapshot. Platform back-references are written once and never overwritten
/// by later syncs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub mobile: Option<String>,
    pub id_card: Option<String>,
    pub platform_tenant_id: Option<i64>,
    pub platform_house_id: Option<i64>,
    pub platform_guests_id: Option<String>,
    pub is_checked_in: bool,
    pub occupancies: Vec<Occupancy>,
    pub tag: Tag,
    pub updated_at: DateTime<Utc>,
}

/// A new master record about to be created by the reconciler. Creation is
/// gated on at least one identity field being present, so unidentifiable
/// ghost records can never enter the store.
#[derive(Debug, Clone)]
pub struct NewStudent {
    pub name: String,
    pub mobile: Option<String>,
    pub id_card: Option<String>,
}

/// Deduplicate an accumulated room list by room number, preserving first-seen
/// order and flagging the first room as the primary occupancy.
pub fn dedup_occupancies(rooms: &[i64]) -> Vec<Occupancy> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for &room_number in rooms {
        if seen.insert(room_number) {
            out.push(Occupancy {
                room_number,
                is_main: out.is_empty(),
            });
        }
    }
    out
}
