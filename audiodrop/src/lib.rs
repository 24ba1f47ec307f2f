//! Audio extraction service: video URL in, emailed download link out.
//!
//! **audiodrop** accepts a media URL and an email address, extracts the audio
//! with yt-dlp in the background, publishes the result under a storage root
//! (a single mp3, or a zip when the source yields several), and emails the
//! download link. Published files expire after a retention window.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # #[tokio::main]
//! # async fn main() -> audiodrop::Result<()> {
//! use audiodrop::{App, ServerConfig, SmtpNotifier, YtDlp};
//!
//! let config = ServerConfig::new().storage_root("public");
//! let notifier = SmtpNotifier::new(&config.smtp)?;
//! let app = App::new(&config, Arc::new(YtDlp::default()), Arc::new(notifier))?;
//!
//! app.sweeper.start();
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app.router).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod extract;
pub mod http;
pub mod job;
pub mod link;
pub mod notify;
pub mod queue;
pub mod retention;
pub mod status;
pub mod storage;

pub use config::{RetentionPolicy, ServerConfig, SmtpConfig};
pub use error::{Error, Result};
pub use extract::{Extraction, Extractor, YtDlp};
pub use job::{JobOutcome, JobRunner, Submission};
pub use notify::{Notifier, SmtpNotifier};
pub use retention::RetentionSweeper;
pub use status::{JobRegistry, JobState, JobStatus};

use std::sync::Arc;

use axum::Router;

use crate::http::AppState;
use crate::queue::JobQueue;

/// A wired service: the HTTP router plus the retention sweeper to start
/// alongside it.
pub struct App {
    pub router: Router,
    pub sweeper: RetentionSweeper,
}

impl App {
    /// Create the storage root if needed and wire every component.
    ///
    /// Must be called from within a tokio runtime (the job workers are spawned here).
    pub fn new(
        config: &ServerConfig,
        extractor: Arc<dyn Extractor>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_root)?;

        let registry = Arc::new(JobRegistry::new());
        let runner = Arc::new(JobRunner::new(
            config.storage_root.clone(),
            config.base_url.clone(),
            extractor,
            notifier,
            registry.clone(),
        ));
        let queue = JobQueue::new(runner, config.max_concurrent_jobs, config.queue_capacity);

        let state = Arc::new(AppState {
            storage_root: config.storage_root.clone(),
            queue,
            registry: registry.clone(),
        });
        let sweeper = RetentionSweeper::new(
            config.storage_root.clone(),
            config.retention,
            config.sweep_interval,
            registry,
        );

        Ok(Self {
            router: http::router(state),
            sweeper,
        })
    }
}
