//! Reconciliation: snapshot rows -> student master records
//!
//! Runs over the persisted snapshot, never over raw extraction output, so a
//! re-run after a crash reconciles exactly what was stored. Per row: match
//! with strict tier precedence, create only on identity evidence, bind
//! platform references once, let snapshot contact fields win, and flow the
//! master-side tag back onto the snapshot. After the pass, occupancies are
//! written for everyone seen and every checked-in student absent from the
//! snapshot is checked out.

use std::collections::HashMap;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::domain::matching::{has_identity_evidence, match_tenant, MatchOutcome};
use crate::domain::student::{dedup_occupancies, NewStudent, Student};
use crate::domain::tenant::Tenant;
use crate::infrastructure::student_repository::{CreateResult, StudentRepository};
use crate::infrastructure::tenant_repository::TenantRepository;

/// Counters for one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub matched: u64,
    pub created: u64,
    pub contact_updated: u64,
    pub tags_corrected: u64,
    pub checked_out: u64,
    /// Rows left untouched: unmatched rows without identity evidence, and
    /// creation conflicts.
    pub skipped: u64,
}

pub struct Reconciler {
    tenants: TenantRepository,
    students: StudentRepository,
}

impl Reconciler {
    pub fn new(tenants: TenantRepository, students: StudentRepository) -> Self {
        Self { tenants, students }
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let snapshot = self.tenants.get_all().await?;
        let mut students = self.students.get_all().await?;
        let mut report = ReconcileReport::default();

        // Matched student ids in first-seen order, and the rooms accumulated
        // for each (room order follows snapshot order: floor, then room).
        let mut active_ids: Vec<i64> = Vec::new();
        let mut rooms: HashMap<i64, Vec<i64>> = HashMap::new();

        for tenant in &snapshot {
            let student_id = match match_tenant(tenant, &students) {
                MatchOutcome::Matched(id) => {
                    report.matched += 1;
                    id
                }
                // An ambiguous name is treated exactly like no match: never
                // auto-resolved onto an existing student, but still eligible
                // for creation when the row carries identity evidence.
                unmatched => {
                    if unmatched == MatchOutcome::AmbiguousName {
                        warn!(
                            "⚠️ Name '{}' is ambiguous in the master store, treating row {} as unmatched",
                            tenant.tenant_name, tenant.id
                        );
                    }
                    if !has_identity_evidence(tenant) {
                        debug!(
                            "Row {} ('{}') has no identity evidence, not creating",
                            tenant.id, tenant.tenant_name
                        );
                        report.skipped += 1;
                        continue;
                    }
                    match self.create_student(tenant).await? {
                        Some(id) => {
                            report.created += 1;
                            // Make the new record visible to later rows in
                            // this same pass.
                            if let Some(student) = self.students.get_by_id(id).await? {
                                students.push(student);
                            }
                            id
                        }
                        None => {
                            report.skipped += 1;
                            continue;
                        }
                    }
                }
            };

            self.apply_row(tenant, student_id, &mut students, &mut report).await?;

            if !active_ids.contains(&student_id) {
                active_ids.push(student_id);
            }
            rooms.entry(student_id).or_default().push(tenant.room_number);
        }

        for &student_id in &active_ids {
            let occupancies = dedup_occupancies(&rooms[&student_id]);
            self.students.set_checked_in(student_id, &occupancies).await?;
        }

        report.checked_out = self.students.check_out_absent(&active_ids).await?;

        info!(
            "🔄 Reconciled {} snapshot row(s): {} matched, {} created, {} contact updates, {} tag corrections, {} checked out, {} skipped",
            snapshot.len(),
            report.matched,
            report.created,
            report.contact_updated,
            report.tags_corrected,
            report.checked_out,
            report.skipped
        );
        Ok(report)
    }

    async fn create_student(&self, tenant: &Tenant) -> Result<Option<i64>> {
        let new = NewStudent {
            name: tenant.tenant_name.clone(),
            mobile: tenant.mobile.clone(),
            id_card: tenant.id_card.clone(),
        };
        match self.students.create(&new).await? {
            CreateResult::Created(id) => {
                info!("➕ Created student '{}' (id {})", new.name, id);
                Ok(Some(id))
            }
            CreateResult::Conflict => {
                warn!(
                    "⚠️ Creation for '{}' rejected by a uniqueness constraint, skipping row {}",
                    new.name, tenant.id
                );
                Ok(None)
            }
        }
    }

    /// Per-row writes for a matched student: one-shot platform binding,
    /// snapshot-wins contact fields, master-wins tag backflow.
    async fn apply_row(
        &self,
        tenant: &Tenant,
        student_id: i64,
        students: &mut [Student],
        report: &mut ReconcileReport,
    ) -> Result<()> {
        self.students
            .bind_platform_refs(student_id, tenant.id, tenant.house_id, tenant.guests_id.as_deref())
            .await?;

        let Some(student) = students.iter_mut().find(|s| s.id == student_id) else {
            return Ok(());
        };

        // Contact fields: the snapshot is authoritative where it has a value;
        // a missing snapshot field never erases a stored one.
        let mobile = tenant.mobile.clone().or_else(|| student.mobile.clone());
        let id_card = tenant.id_card.clone().or_else(|| student.id_card.clone());
        if mobile != student.mobile || id_card != student.id_card {
            match self
                .students
                .update_contact(student_id, mobile.as_deref(), id_card.as_deref())
                .await
            {
                Ok(()) => {
                    student.mobile = mobile;
                    student.id_card = id_card;
                    report.contact_updated += 1;
                }
                Err(e) => {
                    // Most likely another student already holds the number.
                    warn!(
                        "⚠️ Contact update for student {} failed, keeping stored values: {}",
                        student_id, e
                    );
                }
            }
        }

        // Tags flow master -> snapshot, never the other way.
        if tenant.tag != student.tag {
            self.tenants.update_tag(tenant.id, student.tag).await?;
            report.tags_corrected += 1;
        }

        Ok(())
    }
}
