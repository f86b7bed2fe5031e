//! Detecting finished browser downloads and giving them period names.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::DownloadConfig;
use crate::period::Period;

/// What happened to one period's export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum DownloadOutcome {
    /// Final path of the downloaded (and possibly renamed) file.
    Saved(PathBuf),
    /// Why the period produced no file.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadRecord {
    pub period: Period,
    pub outcome: DownloadOutcome,
}

impl DownloadRecord {
    pub fn saved(period: Period, path: PathBuf) -> Self {
        Self {
            period,
            outcome: DownloadOutcome::Saved(path),
        }
    }

    pub fn failed(period: Period, reason: impl Into<String>) -> Self {
        Self {
            period,
            outcome: DownloadOutcome::Failed(reason.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.outcome {
            DownloadOutcome::Saved(path) => Some(path),
            DownloadOutcome::Failed(_) => None,
        }
    }

    pub fn is_saved(&self) -> bool {
        matches!(self.outcome, DownloadOutcome::Saved(_))
    }
}

/// Watches a directory for the next completed download.
///
/// Take the snapshot with [`DownloadWatch::start`] *before* triggering the
/// download; anything already present is ignored.
#[derive(Debug)]
pub struct DownloadWatch {
    dir: PathBuf,
    baseline: BTreeSet<String>,
    timeout: Duration,
    poll: Duration,
    partial_suffix: String,
}

impl DownloadWatch {
    pub fn start(dir: &Path, config: &DownloadConfig) -> Result<Self> {
        let baseline = if dir.exists() {
            list_names(dir)?
        } else {
            BTreeSet::new()
        };
        debug!(dir = %dir.display(), existing = baseline.len(), "Download snapshot taken");
        Ok(Self {
            dir: dir.to_path_buf(),
            baseline,
            timeout: config.timeout,
            poll: config.poll_interval,
            partial_suffix: config.partial_suffix.clone(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The first new, fully written file name in `current`, if any.
    ///
    /// A name is still in progress when it carries the partial suffix or a
    /// `{name}{suffix}` sibling exists. Hidden files are browser scratch
    /// files and never count.
    pub fn completed_candidate(&self, current: &BTreeSet<String>) -> Option<String> {
        let suffix = self.partial_suffix.as_str();
        current
            .iter()
            .filter(|name| !self.baseline.contains(*name))
            .filter(|name| !name.starts_with('.'))
            .find(|name| {
                suffix.is_empty()
                    || (!name.ends_with(suffix) && !current.contains(&format!("{name}{suffix}")))
            })
            .cloned()
    }

    /// Poll until a completed download appears or the timeout passes.
    ///
    /// Directory read errors are logged and polling continues.
    pub async fn wait(&self) -> Option<String> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match list_names(&self.dir) {
                Ok(current) => {
                    if let Some(name) = self.completed_candidate(&current) {
                        info!(file = %name, "Download completed");
                        return Some(name);
                    }
                }
                Err(err) => {
                    warn!(dir = %self.dir.display(), error = %err, "Could not read download directory");
                }
            }

            if Instant::now() >= deadline {
                warn!(
                    dir = %self.dir.display(),
                    timeout = %crate::duration::format_duration(self.timeout),
                    "Timed out waiting for download"
                );
                return None;
            }
            tokio::time::sleep(self.poll.max(Duration::from_millis(10))).await;
        }
    }
}

fn list_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.insert(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Rename `downloaded` in `dir` to `{period_name}{ext}`, keeping its extension.
///
/// Returns the resulting name. The original name is kept when the target
/// already exists or the rename fails.
pub fn rename_download(dir: &Path, downloaded: &str, period_name: &str) -> String {
    let extension = Path::new(downloaded)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let target = format!("{period_name}{extension}");
    if target == downloaded {
        return target;
    }

    let target_path = dir.join(&target);
    if target_path.exists() {
        warn!(file = %downloaded, target = %target, "Rename target exists; keeping download name");
        return downloaded.to_string();
    }

    match std::fs::rename(dir.join(downloaded), &target_path) {
        Ok(()) => {
            info!(from = %downloaded, to = %target, "Renamed download");
            target
        }
        Err(err) => {
            warn!(file = %downloaded, error = %err, "Could not rename download");
            downloaded.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn watch(baseline: &[&str]) -> DownloadWatch {
        DownloadWatch {
            dir: PathBuf::from("."),
            baseline: baseline.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::ZERO,
            poll: Duration::ZERO,
            partial_suffix: ".crdownload".to_string(),
        }
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn ignores_existing_and_partial_files() {
        let watch = watch(&["old.xlsx"]);
        assert_eq!(
            watch.completed_candidate(&names(&["old.xlsx", "new.xlsx.crdownload"])),
            None
        );
    }

    #[test]
    fn file_with_partial_sibling_is_not_done() {
        let watch = watch(&[]);
        assert_eq!(
            watch.completed_candidate(&names(&["report.xlsx", "report.xlsx.crdownload"])),
            None
        );
        assert_eq!(
            watch.completed_candidate(&names(&["report.xlsx"])),
            Some("report.xlsx".to_string())
        );
    }

    #[test]
    fn hidden_files_never_count() {
        let watch = watch(&[]);
        assert_eq!(watch.completed_candidate(&names(&[".com.google.Chrome.x"])), None);
    }

    #[test]
    fn rename_keeps_extension() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("Reporte.xlsx"), b"data")?;

        let name = rename_download(dir.path(), "Reporte.xlsx", "20210101_20210331");
        assert_eq!(name, "20210101_20210331.xlsx");
        assert!(dir.path().join("20210101_20210331.xlsx").exists());
        assert!(!dir.path().join("Reporte.xlsx").exists());
        Ok(())
    }

    #[test]
    fn rename_refuses_to_overwrite() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("Reporte.xlsx"), b"new")?;
        std::fs::write(dir.path().join("20210101_20210331.xlsx"), b"old")?;

        let name = rename_download(dir.path(), "Reporte.xlsx", "20210101_20210331");
        assert_eq!(name, "Reporte.xlsx");
        assert_eq!(
            std::fs::read(dir.path().join("20210101_20210331.xlsx"))?,
            b"old"
        );
        Ok(())
    }

    #[test]
    fn rename_missing_source_keeps_name() {
        let dir = TempDir::new().unwrap();
        assert_eq!(rename_download(dir.path(), "gone.xlsx", "p"), "gone.xlsx");
    }
}
