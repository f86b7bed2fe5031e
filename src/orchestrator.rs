//! Runs a full export: login, navigation, every period, then the merge.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::credentials::PortalAccess;
use crate::download::DownloadRecord;
use crate::merge::{merge_downloads, MergeOutcome};
use crate::period::Period;
use crate::portal::{export_period, login, navigate, select_branch, ExportContext, PortalDriver};

/// What happened at the merge step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum MergeStatus {
    /// Merging was turned off for this run.
    Skipped,
    /// No period produced a file.
    NothingDownloaded,
    Completed(MergeOutcome),
    Failed(String),
}

/// Result of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub records: Vec<DownloadRecord>,
    pub merge: MergeStatus,
}

impl RunReport {
    /// Number of periods that produced a file.
    pub fn downloaded(&self) -> usize {
        self.records.iter().filter(|r| r.is_saved()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.records.iter().filter(|r| !r.is_saved())
    }
}

/// Drives one portal session through a list of periods.
pub struct ExportOrchestrator<D: PortalDriver> {
    driver: D,
    config: ResolvedConfig,
    clock: Arc<dyn Clock>,
    merge: bool,
}

impl<D: PortalDriver> ExportOrchestrator<D> {
    pub fn new(driver: D, config: ResolvedConfig) -> Self {
        Self {
            driver,
            config,
            clock: Arc::new(SystemClock),
            merge: true,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_merge(mut self, merge: bool) -> Self {
        self.merge = merge;
        self
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Log in, reach the report screen and export every period in order.
    ///
    /// Only setup failures (download directory, login, navigation) are
    /// errors. Individual periods fail into their [`DownloadRecord`].
    pub async fn run(&self, access: &PortalAccess, periods: &[Period]) -> Result<RunReport> {
        let config = &self.config;
        let download_dir = config.ensure_download_dir()?;

        login(&self.driver, access, &config.portal, &config.timing)
            .await
            .context("Login failed")?;
        select_branch(&self.driver, &access.branch, &config.timing).await;
        navigate(&self.driver, &config.menu, &config.timing)
            .await
            .context("Could not reach the report screen")?;

        let ctx = ExportContext {
            form: &config.export,
            timing: &config.timing,
            download: &config.download,
            download_dir,
        };
        let records = self.export_all(&ctx, periods).await;

        let merge = if !self.merge {
            MergeStatus::Skipped
        } else if !records.iter().any(DownloadRecord::is_saved) {
            warn!("No period downloaded; skipping merge");
            MergeStatus::NothingDownloaded
        } else {
            match merge_downloads(download_dir, &config.merge, self.clock.as_ref()) {
                Ok(outcome) => MergeStatus::Completed(outcome),
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "Merge failed");
                    MergeStatus::Failed(format!("{err:#}"))
                }
            }
        };

        Ok(RunReport { records, merge })
    }

    async fn export_all(&self, ctx: &ExportContext<'_>, periods: &[Period]) -> Vec<DownloadRecord> {
        let total = periods.len();
        let mut records = Vec::with_capacity(total);

        for (i, period) in periods.iter().enumerate() {
            info!(
                "Period {}/{}: {} to {}",
                i + 1,
                total,
                period.start_label,
                period.end_label
            );
            let record = export_period(&self.driver, ctx, period).await;
            records.push(record);

            if i + 1 < total {
                crate::portal::pause(self.config.timing.between_periods).await;
            }
        }

        let downloaded = records.iter().filter(|r| r.is_saved()).count();
        info!(downloaded, total, "Export finished");
        records
    }
}
