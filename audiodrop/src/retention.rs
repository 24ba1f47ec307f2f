use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::interval;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::RetentionPolicy;
use crate::status::JobRegistry;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files inspected.
    pub scanned: usize,
    pub deleted: usize,
    /// Entries that could not be read or removed.
    pub failed: usize,
}

/// Delete every regular file under `root` last modified more than `max_age` ago.
pub fn sweep(root: &Path, max_age: Duration) -> SweepReport {
    sweep_at(root, max_age, SystemTime::now())
}

/// [`sweep`] against an explicit clock.
///
/// A file modified exactly at `now - max_age` is kept. Directories are never
/// removed, even when the sweep leaves them empty.
pub fn sweep_at(root: &Path, max_age: Duration, now: SystemTime) -> SweepReport {
    let mut report = SweepReport::default();
    let Some(cutoff) = now.checked_sub(max_age) else {
        return report;
    };

    for entry in WalkDir::new(root).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "skipping unreadable entry");
                report.failed += 1;
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        report.scanned += 1;

        let modified = match entry.metadata().map_err(std::io::Error::from).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot read modification time");
                report.failed += 1;
                continue;
            }
        };

        if modified < cutoff {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(path = %entry.path().display(), "deleted expired file");
                    report.deleted += 1;
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "failed to delete expired file");
                    report.failed += 1;
                }
            }
        }
    }

    report
}

/// Periodic retention sweep over the storage root, independent of job traffic.
pub struct RetentionSweeper {
    root: PathBuf,
    policy: RetentionPolicy,
    every: Duration,
    registry: Arc<JobRegistry>,
}

impl RetentionSweeper {
    pub fn new(
        root: PathBuf,
        policy: RetentionPolicy,
        every: Duration,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            root,
            policy,
            every,
            registry,
        }
    }

    /// Run one sweep on the blocking pool, then forget job records past retention.
    pub async fn run_once(&self) -> SweepReport {
        let root = self.root.clone();
        let max_age = self.policy.max_age();
        let report = match tokio::task::spawn_blocking(move || sweep(&root, max_age)).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "retention sweep panicked");
                SweepReport::default()
            }
        };
        let pruned = self.registry.prune_older_than(max_age);

        info!(
            root = %self.root.display(),
            retention = %self.policy,
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            pruned_jobs = pruned,
            tracked_jobs = self.registry.len(),
            "retention sweep completed"
        );
        report
    }

    /// Start the background sweep. The first sweep runs immediately.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
