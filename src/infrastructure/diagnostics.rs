//! Diagnostics sink: operational visibility artifacts
//!
//! Writes extraction statistics and a capped sample of extracted records to
//! the diagnostics directory, overwritten each cycle. Failures here are
//! logged and swallowed; diagnostics never affect sync control flow.

use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::infrastructure::extractor::{ExtractedTenant, ExtractionStats};

const STATS_FILE: &str = "guests-stats.json";
const SAMPLE_FILE: &str = "guests-sample.json";

pub struct DiagnosticsSink {
    dir: PathBuf,
    sample_cap: usize,
}

impl DiagnosticsSink {
    pub fn new(dir: impl AsRef<Path>, sample_cap: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            sample_cap,
        }
    }

    /// Persist stats and sample for the latest extraction. Best effort.
    pub async fn record_extraction(&self, stats: &ExtractionStats, tenants: &[ExtractedTenant]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Could not create diagnostics directory {:?}: {}", self.dir, e);
            return;
        }

        self.write_json(STATS_FILE, &json!(stats)).await;

        let sample: Vec<_> = tenants
            .iter()
            .take(self.sample_cap)
            .map(|tenant| {
                json!({
                    "id": tenant.id,
                    "tenantName": tenant.tenant_name,
                    "houseName": tenant.house_name,
                    "mobile": tenant.mobile,
                    "idCard": tenant.id_card,
                    "isMain": tenant.is_main,
                })
            })
            .collect();
        self.write_json(SAMPLE_FILE, &json!(sample)).await;

        info!(
            "📈 Diagnostics written: {} record(s) sampled of {}",
            sample.len(),
            stats.guests_count
        );
    }

    async fn write_json(&self, file_name: &str, value: &serde_json::Value) {
        let path = self.dir.join(file_name);
        let rendered = match serde_json::to_string_pretty(value) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!("Could not serialize diagnostics {}: {}", file_name, e);
                return;
            }
        };
        if let Err(e) = tokio::fs::write(&path, rendered).await {
            warn!("Could not write diagnostics file {:?}: {}", path, e);
        }
    }
}
