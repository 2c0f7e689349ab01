//! Paginated guest-list extraction
//!
//! Drives the undocumented list endpoint to exhaustion: page 1 upward with a
//! fixed page size, accumulating records while the platform keeps answering
//! success with a non-empty page. Any other outcome ends pagination. A
//! transport failure mid-run truncates the extraction; whether that aborts
//! the cycle is a policy decision taken by the sync service, not here.
//! Records leave this module normalized and typed.

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::normalize;
use crate::infrastructure::config::PlatformConfig;
use crate::infrastructure::session::{PlatformSession, PLATFORM_OK};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// One normalized occupancy record, not yet written to the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedTenant {
    pub id: i64,
    pub guests_id: Option<String>,
    pub house_id: Option<i64>,
    pub house_name: String,
    pub tenant_name: String,
    pub mobile: Option<String>,
    pub id_card: Option<String>,
    pub is_main: bool,
}

/// Extraction statistics persisted by the diagnostics sink.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionStats {
    pub guests_count: usize,
    pub with_mobile: usize,
    pub with_id_card: usize,
    pub sample_keys: Vec<String>,
}

/// Result of one extraction run.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub tenants: Vec<ExtractedTenant>,
    pub stats: ExtractionStats,
    pub pages_fetched: u32,
    /// True when pagination ended on a transport error rather than on a
    /// normal empty/non-success page. Statistics still reflect what was
    /// actually obtained.
    pub truncated: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GuestListRequest<'a> {
    page_size: u32,
    guests_name: &'a str,
    contract_type: i64,
    contract_id: i64,
    page_number: u32,
}

#[derive(Debug, Deserialize)]
struct GuestListEnvelope {
    code: i64,
    data: Option<GuestListPage>,
}

#[derive(Debug, Deserialize)]
struct GuestListPage {
    records: Option<Vec<Value>>,
}

/// Client for the paginated guest-list endpoint.
pub struct GuestListClient {
    client: Client,
    platform: PlatformConfig,
}

impl GuestListClient {
    pub fn new(platform: PlatformConfig, request_timeout: Duration) -> Result<Self, ExtractError> {
        let client = ClientBuilder::new()
            .timeout(request_timeout)
            .user_agent("tenant-sync/0.2 (occupancy dashboard backend)")
            .gzip(true)
            .build()
            .map_err(ExtractError::ClientBuild)?;
        Ok(Self { client, platform })
    }

    /// Fetch the complete unfiltered record list for the configured contract.
    pub async fn fetch_all(&self, session: &PlatformSession) -> ExtractionOutcome {
        let url = self.platform.endpoint(&self.platform.guests_list_path);
        let mut raw_records: Vec<Value> = Vec::new();
        let mut page_number = 1u32;
        let mut truncated = false;

        loop {
            let request = GuestListRequest {
                page_size: self.platform.page_size,
                guests_name: "",
                contract_type: self.platform.contract_type,
                contract_id: self.platform.contract_id,
                page_number,
            };

            let page_records = match self.fetch_page(&url, session, &request).await {
                Ok(records) => records,
                Err(e) => {
                    warn!("Page {} request failed, truncating extraction: {}", page_number, e);
                    truncated = true;
                    break;
                }
            };

            match page_records {
                Some(records) if !records.is_empty() => {
                    debug!("Page {}: {} records", page_number, records.len());
                    raw_records.extend(records);
                    page_number += 1;
                }
                _ => break, // empty page or non-success code: normal termination
            }
        }

        let pages_fetched = page_number.saturating_sub(1);
        let stats = build_stats(&raw_records);
        let tenants = raw_records
            .iter()
            .filter_map(|record| typed_record(record))
            .collect::<Vec<_>>();

        info!(
            "📋 Extraction finished: {} records over {} page(s){}",
            tenants.len(),
            pages_fetched,
            if truncated { " (truncated)" } else { "" }
        );

        ExtractionOutcome {
            tenants,
            stats,
            pages_fetched,
            truncated,
        }
    }

    /// One page request. `Ok(None)` means the platform answered but did not
    /// deliver a usable page (non-success HTTP status or code).
    async fn fetch_page(
        &self,
        url: &str,
        session: &PlatformSession,
        request: &GuestListRequest<'_>,
    ) -> Result<Option<Vec<Value>>, reqwest::Error> {
        let mut builder = self
            .client
            .post(url)
            .header(reqwest::header::COOKIE, session.session_string())
            .json(request);

        // The platform expects the session tokens repeated as plain headers.
        for token in ["_ams_token", "_common_token"] {
            if let Some(value) = session.cookie(token) {
                builder = builder.header(token, value);
            }
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            debug!("Guest list HTTP status {} on page {}", response.status(), request.page_number);
            return Ok(None);
        }

        let envelope = response.json::<GuestListEnvelope>().await?;
        if envelope.code != PLATFORM_OK {
            debug!("Guest list code {} on page {}", envelope.code, request.page_number);
            return Ok(None);
        }

        Ok(Some(envelope.data.and_then(|d| d.records).unwrap_or_default()))
    }
}

/// Type one raw record, normalizing the aliased contact fields. Rows without
/// an id or a tenant name cannot participate in sync and are dropped.
pub fn typed_record(record: &Value) -> Option<ExtractedTenant> {
    let id = record.get("id").and_then(Value::as_i64)?;
    let tenant_name = record
        .get("tenantName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty());
    let Some(tenant_name) = tenant_name else {
        warn!("Dropping record {} without a tenant name", id);
        return None;
    };

    let contact = normalize::normalize_contact(record);

    Some(ExtractedTenant {
        id,
        guests_id: record
            .get("guestsId")
            .and_then(Value::as_str)
            .map(str::to_string),
        house_id: record.get("houseId").and_then(Value::as_i64),
        house_name: record
            .get("houseName")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tenant_name: tenant_name.to_string(),
        mobile: contact.mobile,
        id_card: contact.id_card,
        is_main: record.get("isMain").and_then(Value::as_i64) == Some(1)
            || record.get("isMain").and_then(Value::as_bool) == Some(true),
    })
}

fn build_stats(raw_records: &[Value]) -> ExtractionStats {
    let sample_keys = raw_records
        .first()
        .and_then(Value::as_object)
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default();

    let contacts: Vec<_> = raw_records.iter().map(normalize::normalize_contact).collect();
    ExtractionStats {
        guests_count: raw_records.len(),
        with_mobile: contacts.iter().filter(|c| c.mobile.is_some()).count(),
        with_id_card: contacts.iter().filter(|c| c.id_card.is_some()).count(),
        sample_keys,
    }
}
