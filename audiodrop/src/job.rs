use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive::{archive_file_name, build_archive};
use crate::extract::{find_audio_files, ExtractedFile, Extraction, Extractor};
use crate::link::{archive_link, file_link};
use crate::notify::Notifier;
use crate::status::{JobRegistry, JobState};
use crate::storage::{create_workspace, WorkspaceGuard};

/// A form submission: what to extract and who to tell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    pub source_url: String,
    pub recipient: String,
}

/// One end-to-end processing of a submission.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Owned exclusively by this job until it finishes.
    pub workspace: PathBuf,
    pub submission: Submission,
    pub started_at: DateTime<Utc>,
}

/// What a job publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A lone extracted file, served from the job workspace.
    Single(ExtractedFile),
    /// Several files packed into one archive at the top of the storage root.
    Archive { name: String },
}

impl Artifact {
    pub fn link(&self, base_url: &str, job_id: Uuid) -> String {
        match self {
            Artifact::Single(file) => file_link(base_url, job_id, &file.name),
            Artifact::Archive { name } => archive_link(base_url, name),
        }
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Link emailed to the recipient.
    Delivered { link: String },
    /// The extractor failed; its diagnostic was emailed to the recipient.
    ExtractionFailed { diagnostic: String },
    /// The extractor succeeded but left no audio. Nobody is notified.
    NoOutput,
    /// Local failure (workspace, enumeration, archive). Logged only.
    Aborted { reason: String },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Delivered { link } => JobState::Succeeded { link: link.clone() },
            JobOutcome::ExtractionFailed { diagnostic } => JobState::Failed {
                reason: format!("extraction failed: {diagnostic}"),
            },
            JobOutcome::NoOutput => JobState::Failed {
                reason: "no audio produced".into(),
            },
            JobOutcome::Aborted { reason } => JobState::Failed {
                reason: reason.clone(),
            },
        }
    }
}

/// Drives a submission from extraction to notification.
pub struct JobRunner {
    storage_root: PathBuf,
    base_url: String,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    registry: Arc<JobRegistry>,
}

impl JobRunner {
    pub fn new(
        storage_root: PathBuf,
        base_url: impl Into<String>,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
        registry: Arc<JobRegistry>,
    ) -> Self {
        Self {
            storage_root,
            base_url: base_url.into(),
            extractor,
            notifier,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Run job `id` to completion and record the outcome in the registry.
    #[tracing::instrument(skip_all, fields(job_id = %id))]
    pub async fn run(&self, id: Uuid, submission: Submission) -> JobOutcome {
        self.registry.update(id, JobState::Running);
        let outcome = self.execute(id, submission).await;

        match &outcome {
            JobOutcome::Delivered { link } => info!(%link, "job delivered"),
            JobOutcome::ExtractionFailed { .. } => warn!("job failed during extraction"),
            JobOutcome::NoOutput => warn!("job produced no audio, recipient not notified"),
            JobOutcome::Aborted { reason } => error!(%reason, "job aborted"),
        }

        self.registry.update(id, outcome.state());
        outcome
    }

    async fn execute(&self, id: Uuid, submission: Submission) -> JobOutcome {
        let workspace = match create_workspace(&self.storage_root, id) {
            Ok(path) => path,
            Err(e) => {
                return JobOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
        };
        let job = Job {
            id,
            workspace,
            submission,
            started_at: Utc::now(),
        };
        let guard = WorkspaceGuard::new(job.workspace.clone());
        let recipient = job.submission.recipient.as_str();

        let failure = match self
            .extractor
            .extract(&job.submission.source_url, guard.path())
            .await
        {
            Ok(Extraction::Completed) => None,
            Ok(Extraction::Failed { diagnostic }) => Some(diagnostic),
            Err(e) => Some(e.to_string()),
        };
        if let Some(diagnostic) = failure {
            self.notifier
                .send(recipient, &format!("Extraction failed:\n{diagnostic}"))
                .await;
            return JobOutcome::ExtractionFailed { diagnostic };
        }

        let mut files = match find_audio_files(guard.path()) {
            Ok(files) => files,
            Err(e) => {
                return JobOutcome::Aborted {
                    reason: format!("failed to list extracted files: {e}"),
                };
            }
        };

        let artifact = match files.len() {
            0 => return JobOutcome::NoOutput,
            1 => Artifact::Single(files.remove(0)),
            count => {
                let name = archive_file_name(recipient, id, &Local::now());
                let dest = self.storage_root.join(&name);
                let inputs: Vec<PathBuf> = files.into_iter().map(|f| f.path).collect();
                let built =
                    tokio::task::spawn_blocking(move || build_archive(&inputs, &dest)).await;
                match built {
                    Ok(Ok(())) => info!(archive = %name, files = count, "archive built"),
                    Ok(Err(e)) => {
                        return JobOutcome::Aborted {
                            reason: format!("failed to build archive: {e}"),
                        };
                    }
                    Err(e) => {
                        return JobOutcome::Aborted {
                            reason: format!("archive task failed: {e}"),
                        };
                    }
                }
                Artifact::Archive { name }
            }
        };
        guard.keep();

        let link = artifact.link(&self.base_url, id);
        self.notifier
            .send(recipient, &format!("Download your files here: {link}"))
            .await;

        let elapsed = Utc::now() - job.started_at;
        info!(
            %recipient,
            elapsed_ms = elapsed.num_milliseconds(),
            "download link sent"
        );
        JobOutcome::Delivered { link }
    }
}
