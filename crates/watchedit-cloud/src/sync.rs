use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use watchedit_core::sync::{merge_records, should_sync, MergeReport};
use watchedit_core::{AppConfig, Database};

use crate::error::Result;
use crate::http::{CloudClient, UploadPayload};

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub report: MergeReport,
    pub works: usize,
    pub tags: usize,
    pub last_sync: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub device_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub should_sync: bool,
}

impl SyncStatus {
    /// Local view only; does not contact the endpoint.
    pub fn load(db: &Database, config: &AppConfig) -> Result<Self> {
        let last_sync = db.last_sync()?;
        Ok(Self {
            endpoint: config.cloud_endpoint(),
            device_id: db.device_id()?,
            last_sync,
            should_sync: should_sync(last_sync, Utc::now()),
        })
    }
}

/// Download, merge, upload, then commit locally. Local records change only
/// after the merged set has been accepted by the endpoint.
pub struct CloudSync<'a> {
    client: CloudClient,
    db: &'a Database,
    in_progress: AtomicBool,
}

impl<'a> CloudSync<'a> {
    pub fn new(client: CloudClient, db: &'a Database) -> Self {
        Self {
            client,
            db,
            in_progress: AtomicBool::new(false),
        }
    }

    /// Advisory flag; overlapping calls are not rejected.
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn run(&self) -> Result<SyncOutcome> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            tracing::warn!("a sync is already in progress");
        }
        let result = self.sync_once().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn sync_once(&self) -> Result<SyncOutcome> {
        let device_id = self.db.device_id()?;
        let local = self.db.snapshot()?;

        let remote = self.client.fetch(&device_id).await?;
        let (merged, report) = merge_records(&local, &remote);
        tracing::info!(
            added = report.added_works,
            replaced = report.replaced_works,
            kept_local = report.kept_local,
            added_tags = report.added_tags,
            "merged remote records"
        );

        merged.validate()?;

        self.client
            .upload(&UploadPayload::new(&merged, &device_id))
            .await?;

        self.db.replace_all(&merged)?;
        let now = Utc::now();
        self.db.set_last_sync(now)?;

        Ok(SyncOutcome {
            report,
            works: merged.works.len(),
            tags: merged.tags.len(),
            last_sync: now,
        })
    }

    pub async fn health(&self) -> Result<()> {
        self.client.health().await
    }
}
