//! In-memory job status store, so a submitter can poll for the outcome
//! instead of relying on email alone.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Lifecycle of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Running,
    Succeeded { link: String },
    Failed { reason: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: Uuid,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Job id → status.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted job as pending.
    pub fn register(&self, id: Uuid) {
        let now = Utc::now();
        let status = JobStatus {
            id,
            state: JobState::Pending,
            submitted_at: now,
            updated_at: now,
        };
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, status);
    }

    /// Move a job to `state`. Unknown ids are registered on the fly.
    pub fn update(&self, id: Uuid, state: JobState) {
        let now = Utc::now();
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let status = jobs.entry(id).or_insert_with(|| JobStatus {
            id,
            state: JobState::Pending,
            submitted_at: now,
            updated_at: now,
        });
        status.state = state;
        status.updated_at = now;
    }

    pub fn remove(&self, id: Uuid) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);
    }

    pub fn get(&self, id: Uuid) -> Option<JobStatus> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget finished jobs last updated more than `max_age` ago.
    /// Returns the number of records dropped.
    pub fn prune_older_than(&self, max_age: Duration) -> usize {
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, status| !(status.state.is_terminal() && status.updated_at < cutoff));
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_then_transition() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        assert_eq!(registry.get(id).unwrap().state, JobState::Pending);

        registry.update(id, JobState::Running);
        registry.update(
            id,
            JobState::Succeeded {
                link: "http://h/download/x".into(),
            },
        );
        let status = registry.get(id).unwrap();
        assert!(status.state.is_terminal());
        assert!(status.updated_at >= status.submitted_at);
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove() {
        let registry = JobRegistry::new();
        let id = Uuid::new_v4();
        registry.register(id);
        registry.remove(id);
        assert!(registry.get(id).is_none());
    }

    #[test]
    fn test_prune_keeps_active_and_recent() {
        let registry = JobRegistry::new();
        let running = Uuid::new_v4();
        let done = Uuid::new_v4();
        registry.register(running);
        registry.update(running, JobState::Running);
        registry.update(
            done,
            JobState::Failed {
                reason: "no audio produced".into(),
            },
        );

        assert_eq!(registry.prune_older_than(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(registry.prune_older_than(Duration::ZERO), 1);
        assert!(registry.get(running).is_some());
        assert!(registry.get(done).is_none());
    }

    #[test]
    fn test_status_serializes_flat() {
        let registry = JobRegistry::new();
        let id = Uuid::nil();
        registry.update(
            id,
            JobState::Failed {
                reason: "boom".into(),
            },
        );
        let json = serde_json::to_value(registry.get(id).unwrap()).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["reason"], "boom");
        assert_eq!(json["id"], "00000000-0000-0000-0000-000000000000");
    }
}
