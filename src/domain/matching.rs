//! Identity matching between snapshot rows and student master records
//!
//! The two stores are independently keyed, so matching is fuzzy by design.
//! The precedence is strict and short-circuits on the first hit:
//! 1. stored platform-tenant-id, or mobile + name both equal
//! 2. case-insensitive exact name, accepted only when exactly one student
//!    carries the name (ambiguous names are never auto-resolved)
//! 3. no match: creation is allowed only with identity evidence present
//!
//! Everything here is pure; the reconciler owns the writes.

use crate::domain::student::Student;
use crate::domain::tenant::Tenant;

/// Outcome of matching one snapshot row against the full master set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Matched an existing student (master record id).
    Matched(i64),
    /// Two or more students share the candidate name; treated as no-match
    /// so the row is never guessed onto an existing student.
    AmbiguousName,
    /// No student matched.
    NoMatch,
}

/// Tier 1: exact platform binding, or mobile + name both equal.
pub fn matches_platform_binding(tenant: &Tenant, student: &Student) -> bool {
    if student.platform_tenant_id == Some(tenant.id) {
        return true;
    }
    match (&student.mobile, &tenant.mobile) {
        (Some(a), Some(b)) if !a.is_empty() && a == b => student.name == tenant.tenant_name,
        _ => false,
    }
}

/// Tier 2: case-insensitive exact-name equality.
pub fn matches_name(tenant: &Tenant, student: &Student) -> bool {
    !tenant.tenant_name.is_empty()
        && student.name.to_lowercase() == tenant.tenant_name.to_lowercase()
}

/// Tier 3 gate: a new master record may only be created when at least one of
/// mobile / id-card is present on the snapshot row.
pub fn has_identity_evidence(tenant: &Tenant) -> bool {
    tenant.mobile.as_deref().is_some_and(|m| !m.is_empty())
        || tenant.id_card.as_deref().is_some_and(|c| !c.is_empty())
}

/// Match one snapshot row against the master set with strict tier precedence.
pub fn match_tenant(tenant: &Tenant, students: &[Student]) -> MatchOutcome {
    if let Some(student) = students
        .iter()
        .find(|student| matches_platform_binding(tenant, student))
    {
        return MatchOutcome::Matched(student.id);
    }

    if tenant.tenant_name.is_empty() {
        return MatchOutcome::NoMatch;
    }

    let mut by_name = students.iter().filter(|student| matches_name(tenant, student));
    match (by_name.next(), by_name.next()) {
        (Some(student), None) => MatchOutcome::Matched(student.id),
        (Some(_), Some(_)) => MatchOutcome::AmbiguousName,
        _ => MatchOutcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tenant::Tag;
    use chrono::Utc;

    fn student(id: i64, name: &str) -> Student {
        Student {
            id,
            name: name.to_string(),
            mobile: None,
            id_card: None,
            platform_tenant_id: None,
            platform_house_id: None,
            platform_guests_id: None,
            is_checked_in: false,
            occupancies: Vec::new(),
            tag: Tag::None,
            updated_at: Utc::now(),
        }
    }

    fn tenant(id: i64, name: &str) -> Tenant {
        Tenant {
            id,
            guests_id: None,
            house_id: None,
            house_name: "A-305".to_string(),
            tenant_name: name.to_string(),
            mobile: None,
            id_card: None,
            is_main: true,
            floor: 3,
            room_number: 305,
            tag: Tag::None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn platform_id_wins_over_ambiguous_duplicate_name() {
        let mut bound = student(1, "张三");
        bound.platform_tenant_id = Some(42);
        let duplicate = student(2, "张三");

        let row = tenant(42, "张三");
        assert_eq!(
            match_tenant(&row, &[duplicate, bound]),
            MatchOutcome::Matched(1)
        );
    }

    #[test]
    fn mobile_plus_name_matches_without_platform_binding() {
        let mut known = student(7, "李四");
        known.mobile = Some("13800000000".to_string());

        let mut row = tenant(99, "李四");
        row.mobile = Some("13800000000".to_string());
        assert_eq!(match_tenant(&row, &[known]), MatchOutcome::Matched(7));
    }

    #[test]
    fn mobile_match_requires_matching_name_too() {
        let mut known = student(7, "李四");
        known.mobile = Some("13800000000".to_string());

        let mut row = tenant(99, "王五");
        row.mobile = Some("13800000000".to_string());
        assert_eq!(match_tenant(&row, &[known]), MatchOutcome::NoMatch);
    }

    #[test]
    fn unique_name_fallback_is_case_insensitive() {
        let known = student(3, "Alice Zhang");
        let row = tenant(5, "alice zhang");
        assert_eq!(match_tenant(&row, &[known]), MatchOutcome::Matched(3));
    }

    #[test]
    fn duplicate_names_are_reported_ambiguous_not_resolved() {
        let a = student(1, "王五");
        let b = student(2, "王五");
        let row = tenant(5, "王五");
        assert_eq!(match_tenant(&row, &[a, b]), MatchOutcome::AmbiguousName);
    }

    #[test]
    fn empty_mobiles_never_match_each_other() {
        let mut known = student(1, "赵六");
        known.mobile = Some(String::new());
        let mut row = tenant(5, "another name");
        row.mobile = Some(String::new());
        assert_eq!(match_tenant(&row, &[known]), MatchOutcome::NoMatch);
    }

    #[test]
    fn identity_evidence_gate() {
        let mut row = tenant(5, "张三");
        assert!(!has_identity_evidence(&row));
        row.mobile = Some("139".to_string());
        assert!(has_identity_evidence(&row));
        row.mobile = None;
        row.id_card = Some("110101200001010011".to_string());
        assert!(has_identity_evidence(&row));
        row.id_card = Some(String::new());
        assert!(!has_identity_evidence(&row));
    }
}
