use std::path::PathBuf;

/// All errors that can occur in audiodrop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create workspace {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("extractor not found: {program}, install with: pip install yt-dlp")]
    ExtractorNotFound { program: String },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("mail error: {0}")]
    Mail(String),

    #[error("job queue is full, try again later")]
    QueueFull,

    #[error("job queue is closed")]
    QueueClosed,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
