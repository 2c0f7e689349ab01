//! Sync orchestration: one full acquisition-to-reconciliation cycle
//!
//! The service owns the stage progression
//! `AcquiringSession -> Extracting -> Synchronizing -> Reconciling` plus the
//! single-flight trigger guard. Concurrent triggers are rejected, never
//! queued; the guard is released on every exit path, success or failure.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{error, info};

use crate::application::reconciler::{ReconcileReport, Reconciler};
use crate::application::snapshot_sync::{SnapshotReport, SnapshotSynchronizer};
use crate::domain::sync_cycle::{SyncCycleState, SyncStage, TriggerGuard};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::diagnostics::DiagnosticsSink;
use crate::infrastructure::extractor::{ExtractError, GuestListClient};
use crate::infrastructure::session::{FormLoginAcquirer, SessionAcquirer, SessionError};
use crate::infrastructure::student_repository::StudentRepository;
use crate::infrastructure::tenant_repository::TenantRepository;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A trigger arrived while another cycle held the guard.
    #[error("A sync cycle is already running")]
    AlreadyRunning,

    #[error("Session acquisition failed: {0}")]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Pagination ended on a transport error and the abort policy is on.
    #[error("Extraction truncated after page {pages_fetched}, aborting cycle")]
    ExtractionTruncated { pages_fetched: u32 },

    #[error("Snapshot synchronization failed: {0}")]
    Snapshot(#[source] anyhow::Error),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[source] anyhow::Error),
}

/// Summary of one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub cycle_id: String,
    pub pages_fetched: u32,
    pub records_extracted: usize,
    pub truncated: bool,
    pub snapshot: SnapshotReport,
    /// Absent for fetch-only runs.
    pub reconciliation: Option<ReconcileReport>,
}

pub struct SyncService {
    config: AppConfig,
    acquirer: Arc<dyn SessionAcquirer>,
    guest_list: GuestListClient,
    synchronizer: SnapshotSynchronizer,
    reconciler: Reconciler,
    diagnostics: DiagnosticsSink,
    guard: TriggerGuard,
    /// Cookie header of the most recent confirmed session, kept for
    /// diagnostic reuse.
    last_session: RwLock<Option<String>>,
}

impl SyncService {
    pub fn new(config: AppConfig, pool: SqlitePool) -> Result<Self, SyncError> {
        let acquirer = Arc::new(FormLoginAcquirer::new(config.platform.clone(), &config.sync)?);
        Self::with_acquirer(config, pool, acquirer)
    }

    /// Construction with an injected acquirer (test seam).
    pub fn with_acquirer(
        config: AppConfig,
        pool: SqlitePool,
        acquirer: Arc<dyn SessionAcquirer>,
    ) -> Result<Self, SyncError> {
        let guest_list = GuestListClient::new(
            config.platform.clone(),
            Duration::from_secs(config.sync.request_timeout_seconds),
        )?;
        let tenants = TenantRepository::new(pool.clone());
        let students = StudentRepository::new(pool);
        let diagnostics =
            DiagnosticsSink::new(&config.sync.diagnostics_dir, config.sync.sample_cap);

        Ok(Self {
            config,
            acquirer,
            guest_list,
            synchronizer: SnapshotSynchronizer::new(tenants.clone()),
            reconciler: Reconciler::new(tenants, students),
            diagnostics,
            guard: TriggerGuard::new(),
            last_session: RwLock::new(None),
        })
    }

    /// Run one full cycle: acquire, extract, synchronize, reconcile.
    pub async fn run_sync(&self) -> Result<CycleSummary, SyncError> {
        self.run(true).await
    }

    /// Acquisition and extraction only; diagnostics are written but nothing
    /// is persisted to the stores.
    pub async fn run_fetch_only(&self) -> Result<CycleSummary, SyncError> {
        self.run(false).await
    }

    /// Cookie header of the last confirmed session, if any cycle got that far.
    pub fn last_session_string(&self) -> Option<String> {
        self.last_session.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    async fn run(&self, persist: bool) -> Result<CycleSummary, SyncError> {
        let cooldown = Duration::from_secs(self.config.sync.trigger_cooldown_seconds);
        if !self.guard.try_acquire(cooldown) {
            return Err(SyncError::AlreadyRunning);
        }

        let mut state = SyncCycleState::begin();
        info!("🚀 Sync cycle {} started (persist: {})", state.cycle_id, persist);

        let outcome = self.execute(&mut state, persist).await;
        self.guard.release();

        match outcome {
            Ok(summary) => {
                state.advance(SyncStage::Idle);
                info!(
                    "✅ Sync cycle {} finished: {} record(s) over {} page(s)",
                    summary.cycle_id, summary.records_extracted, summary.pages_fetched
                );
                Ok(summary)
            }
            Err(e) => {
                state.fail(e.to_string());
                error!("❌ Sync cycle {} failed at {:?}: {}", state.cycle_id, state.stage, e);
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        state: &mut SyncCycleState,
        persist: bool,
    ) -> Result<CycleSummary, SyncError> {
        state.advance(SyncStage::AcquiringSession);
        let session = self.acquirer.acquire().await?;
        if let Ok(mut last) = self.last_session.write() {
            *last = Some(session.session_string());
        }

        state.advance(SyncStage::Extracting);
        let extraction = self.guest_list.fetch_all(&session).await;
        state.pages_fetched = extraction.pages_fetched;
        state.records_extracted = extraction.tenants.len() as u32;

        // Diagnostics reflect the extraction even when the rest of the cycle
        // does not run.
        self.diagnostics
            .record_extraction(&extraction.stats, &extraction.tenants)
            .await;

        if extraction.truncated && self.config.sync.abort_on_short_page {
            return Err(SyncError::ExtractionTruncated {
                pages_fetched: extraction.pages_fetched,
            });
        }

        let mut summary = CycleSummary {
            cycle_id: state.cycle_id.clone(),
            pages_fetched: extraction.pages_fetched,
            records_extracted: extraction.tenants.len(),
            truncated: extraction.truncated,
            snapshot: SnapshotReport::default(),
            reconciliation: None,
        };
        if !persist {
            return Ok(summary);
        }

        state.advance(SyncStage::Synchronizing);
        summary.snapshot = self
            .synchronizer
            .synchronize(&extraction.tenants)
            .await
            .map_err(SyncError::Snapshot)?;
        state.snapshot_upserted = summary.snapshot.upserted;
        state.snapshot_deleted = summary.snapshot.deleted;

        state.advance(SyncStage::Reconciling);
        summary.reconciliation =
            Some(self.reconciler.reconcile().await.map_err(SyncError::Reconcile)?);

        Ok(summary)
    }
}
