//! Progress Ledger: the durable record of which jobs are done.
//!
//! Persisted as a human-readable JSON file (default `progress.json`):
//!
//! ```json
//! {
//!   "completed_jobs": { "<job_id>": { "title": "…", "completed_at": "2026-01-01 10:00:00", "downloads": 2 } },
//!   "total_downloads": 2,
//!   "started_at": "2026-01-01 09:58:12"
//! }
//! ```
//!
//! A job id present in `completed_jobs` is skipped on every future run.
//! `total_downloads` always equals the sum of the per-job `downloads`.
//!
//! ## Crash safety
//!
//! Every mutation is written as a whole file to `{path}.tmp`, synced, then
//! renamed over the ledger, so a reader (or a restart after a kill) sees
//! either the previous state or the new one, never a half-written job entry.
//! In-memory state only changes once the write succeeded.

use crate::core::error::{HarvestError, HarvestResult};
use crate::core::types::{CompletedJob, LedgerStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn now_stamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// On-disk shape of the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerData {
    #[serde(default)]
    pub completed_jobs: BTreeMap<String, CompletedJob>,
    #[serde(default)]
    pub total_downloads: u64,
    #[serde(default)]
    pub started_at: Option<String>,
}

impl LedgerData {
    fn downloads_sum(&self) -> u64 {
        self.completed_jobs.values().map(|job| job.downloads).sum()
    }
}

#[derive(Debug)]
pub struct ProgressLedger {
    path: PathBuf,
    data: LedgerData,
}

impl ProgressLedger {
    /// Load the ledger at `path`. A missing file is a fresh, empty ledger.
    ///
    /// An unreadable or unparsable file is an error rather than a silent
    /// reset: throwing it away would re-download every completed job.
    pub fn load(path: impl Into<PathBuf>) -> HarvestResult<Self> {
        let path = path.into();
        if !path.exists() {
            info!("progress_ledger: no ledger at {}; starting fresh", path.display());
            return Ok(Self {
                path,
                data: LedgerData::default(),
            });
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            HarvestError::Ledger(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut data: LedgerData = serde_json::from_str(&content).map_err(|e| {
            HarvestError::Ledger(format!(
                "failed to parse {}: {} (fix or remove the file to continue)",
                path.display(),
                e
            ))
        })?;

        let sum = data.downloads_sum();
        if data.total_downloads != sum {
            warn!(
                "progress_ledger: total_downloads {} disagrees with per-job sum {}; using the sum",
                data.total_downloads, sum
            );
            data.total_downloads = sum;
        }

        info!(
            "progress_ledger: resumed {}; {} jobs completed, {} batch downloads",
            path.display(),
            data.completed_jobs.len(),
            data.total_downloads
        );
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data(&self) -> &LedgerData {
        &self.data
    }

    pub fn is_completed(&self, job_id: &str) -> bool {
        self.data.completed_jobs.contains_key(job_id)
    }

    pub fn completed_ids(&self) -> impl Iterator<Item = &str> {
        self.data.completed_jobs.keys().map(String::as_str)
    }

    /// Record the first start time. Later calls are no-ops.
    pub fn mark_started(&mut self) -> HarvestResult<()> {
        if self.data.started_at.is_some() {
            return Ok(());
        }
        let mut next = self.data.clone();
        next.started_at = Some(now_stamp());
        self.commit(next)
    }

    /// Record a finished job together with its download count in one write.
    ///
    /// Re-marking an id replaces its entry; the aggregate is adjusted so the
    /// sum invariant holds either way.
    pub fn mark_complete(&mut self, job_id: &str, title: &str, downloads: u64) -> HarvestResult<()> {
        let mut next = self.data.clone();
        let previous = next.completed_jobs.insert(
            job_id.to_string(),
            CompletedJob {
                title: title.to_string(),
                completed_at: now_stamp(),
                downloads,
            },
        );
        let previous_downloads = previous.map(|job| job.downloads).unwrap_or(0);
        next.total_downloads = next.total_downloads.saturating_sub(previous_downloads) + downloads;
        self.commit(next)
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            completed: self.data.completed_jobs.len(),
            total_downloads: self.data.total_downloads,
            started_at: self.data.started_at.clone(),
        }
    }

    /// Clear the ledger back to its empty shape and persist that.
    pub fn reset(&mut self) -> HarvestResult<()> {
        self.commit(LedgerData::default())?;
        info!("progress_ledger: reset {}", self.path.display());
        Ok(())
    }

    fn commit(&mut self, next: LedgerData) -> HarvestResult<()> {
        write_atomically(&self.path, &next)?;
        self.data = next;
        Ok(())
    }
}

/// Write to `{path}.tmp`, sync, then rename over `path`.
fn write_atomically(path: &Path, data: &LedgerData) -> HarvestResult<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| HarvestError::Ledger(format!("serialization failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            HarvestError::Ledger(format!("failed to create {}: {}", parent.display(), e))
        })?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);

    let write = || -> std::io::Result<()> {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
    };
    write().map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        HarvestError::Ledger(format!("failed to write {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remarking_a_job_keeps_sum_invariant() {
        let dir = tempfile::tempdir().unwrap();
        let mut ledger = ProgressLedger::load(dir.path().join("progress.json")).unwrap();
        ledger.mark_complete("J1", "First", 3).unwrap();
        ledger.mark_complete("J1", "First", 1).unwrap();
        assert_eq!(ledger.stats().total_downloads, 1);
        assert_eq!(ledger.stats().completed, 1);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let mut ledger = ProgressLedger::load(&path).unwrap();
        ledger.mark_complete("J1", "First", 1).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("progress.json.tmp").exists());
    }

    #[test]
    fn timestamp_format_is_human_readable() {
        let stamp = now_stamp();
        assert!(chrono::NaiveDateTime::parse_from_str(&stamp, TIMESTAMP_FORMAT).is_ok());
    }
}
