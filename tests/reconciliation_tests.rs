//! End-to-end reconciliation over a real in-memory database: several sync
//! cycles worth of snapshot changes flowing into the student master store.

use chrono::Utc;
use tenant_sync_lib::application::{Reconciler, SnapshotSynchronizer};
use tenant_sync_lib::domain::{NewStudent, Tag};
use tenant_sync_lib::infrastructure::extractor::ExtractedTenant;
use tenant_sync_lib::infrastructure::{
    CreateResult, DatabaseConnection, StudentRepository, TenantRepository,
};

struct Harness {
    synchronizer: SnapshotSynchronizer,
    reconciler: Reconciler,
    tenants: TenantRepository,
    students: StudentRepository,
}

async fn harness() -> Harness {
    let db = DatabaseConnection::new("sqlite::memory:").await.unwrap();
    db.migrate().await.unwrap();
    let tenants = TenantRepository::new(db.pool().clone());
    let students = StudentRepository::new(db.pool().clone());
    Harness {
        synchronizer: SnapshotSynchronizer::new(tenants.clone()),
        reconciler: Reconciler::new(tenants.clone(), students.clone()),
        tenants,
        students,
    }
}

fn extracted(id: i64, name: &str, house: &str, mobile: Option<&str>) -> ExtractedTenant {
    ExtractedTenant {
        id,
        guests_id: Some(format!("g-{id}")),
        house_id: Some(1),
        house_name: house.to_string(),
        tenant_name: name.to_string(),
        mobile: mobile.map(str::to_string),
        id_card: None,
        is_main: true,
    }
}

#[tokio::test]
async fn full_cycle_creates_checks_in_and_checks_out() {
    let h = harness().await;

    // Cycle 1: two tenants move in.
    h.synchronizer
        .synchronize(&[
            extracted(1, "张三", "A-305", Some("13100000001")),
            extracted(2, "李四", "A-1205", Some("13100000002")),
        ])
        .await
        .unwrap();
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.checked_out, 0);

    let all = h.students.get_all().await.unwrap();
    assert!(all.iter().all(|s| s.is_checked_in));
    let zhang = all.iter().find(|s| s.name == "张三").unwrap();
    assert_eq!(zhang.occupancies[0].room_number, 305);
    assert_eq!(zhang.platform_tenant_id, Some(1));

    // Cycle 2: 李四 moved out upstream.
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13100000001"))])
        .await
        .unwrap();
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.created, 0);
    assert_eq!(report.checked_out, 1);

    let li = h.students.get_all().await.unwrap().into_iter().find(|s| s.name == "李四").unwrap();
    assert!(!li.is_checked_in);
    assert!(li.occupancies.is_empty());
    // Master record survives checkout; the platform binding stays.
    assert_eq!(li.platform_tenant_id, Some(2));
}

#[tokio::test]
async fn empty_extraction_never_wipes_checked_in_students() {
    let h = harness().await;
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13100000001"))])
        .await
        .unwrap();
    h.reconciler.reconcile().await.unwrap();

    // Upstream hiccup: nothing extracted. Snapshot is kept, so the student
    // stays checked in after the next reconciliation.
    let report = h.synchronizer.synchronize(&[]).await.unwrap();
    assert!(report.skipped);
    let recon = h.reconciler.reconcile().await.unwrap();
    assert_eq!(recon.checked_out, 0);

    let student = &h.students.get_all().await.unwrap()[0];
    assert!(student.is_checked_in);
}

#[tokio::test]
async fn snapshot_contact_fields_win_over_stored_values() {
    let h = harness().await;
    let CreateResult::Created(id) = h
        .students
        .create(&NewStudent {
            name: "张三".to_string(),
            mobile: Some("13100000001".to_string()),
            id_card: None,
        })
        .await
        .unwrap()
    else {
        panic!("expected creation");
    };

    // The platform now reports a new mobile number; name still matches
    // uniquely, so the row reconciles onto the same student.
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13900000009"))])
        .await
        .unwrap();
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.matched, 1);
    assert_eq!(report.contact_updated, 1);

    let student = h.students.get_by_id(id).await.unwrap().unwrap();
    assert_eq!(student.mobile.as_deref(), Some("13900000009"));
}

#[tokio::test]
async fn tag_corrections_survive_subsequent_cycles() {
    let h = harness().await;
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13100000001"))])
        .await
        .unwrap();
    h.reconciler.reconcile().await.unwrap();

    let student_id = h.students.get_all().await.unwrap()[0].id;
    h.students.set_tag(student_id, Tag::Cohort2024).await.unwrap();
    h.reconciler.reconcile().await.unwrap();
    assert_eq!(h.tenants.get_by_id(1).await.unwrap().unwrap().tag, Tag::Cohort2024);

    // Another upstream sync replaces the snapshot row; the corrected tag
    // must still be there afterwards.
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13100000001"))])
        .await
        .unwrap();
    let row = h.tenants.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(row.tag, Tag::Cohort2024);

    let recon = h.reconciler.reconcile().await.unwrap();
    assert_eq!(recon.tags_corrected, 0, "tag already agrees, nothing to correct");
}

#[tokio::test]
async fn duplicate_mobile_rows_do_not_abort_the_batch() {
    let h = harness().await;
    // Two snapshot rows with different names but the same mobile: the first
    // creates, the second fails the uniqueness constraint and is skipped
    // while the rest of the batch still reconciles.
    h.synchronizer
        .synchronize(&[
            extracted(1, "张三", "A-305", Some("13100000001")),
            extracted(2, "李四", "A-306", Some("13100000001")),
            extracted(3, "王五", "A-307", Some("13100000003")),
        ])
        .await
        .unwrap();
    let report = h.reconciler.reconcile().await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.skipped, 1);

    let names: Vec<String> = h
        .students
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["张三", "王五"]);
}

#[tokio::test]
async fn updated_at_moves_forward_on_rewrites() {
    let h = harness().await;
    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-305", Some("13100000001"))])
        .await
        .unwrap();
    let before = h.tenants.get_by_id(1).await.unwrap().unwrap().updated_at;

    h.synchronizer
        .synchronize(&[extracted(1, "张三", "A-306", Some("13100000001"))])
        .await
        .unwrap();
    let after = h.tenants.get_by_id(1).await.unwrap().unwrap();
    assert_eq!(after.room_number, 306);
    assert!(after.updated_at >= before);
    assert!(after.updated_at <= Utc::now());
}
