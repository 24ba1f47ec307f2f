use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use audiodrop::{App, RetentionPolicy, ServerConfig, SmtpConfig, SmtpNotifier, YtDlp};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "audiodrop", about = "Extract audio from video URLs and email download links")]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    bind: String,

    /// Directory for job workspaces and archives, served under /download and /public.
    #[arg(long, env = "STORAGE_ROOT", default_value = "public")]
    storage_root: PathBuf,

    /// Origin used in emailed download links.
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// yt-dlp executable.
    #[arg(long, env = "YTDLP_PATH", default_value = "yt-dlp")]
    ytdlp: String,

    /// Seconds before a running extraction is killed.
    #[arg(long, env = "EXTRACT_TIMEOUT_SECS", default_value = "600")]
    extract_timeout: u64,

    /// Jobs processed at the same time.
    #[arg(long, env = "MAX_CONCURRENT_JOBS", default_value = "4")]
    max_concurrent_jobs: usize,

    /// Jobs allowed to wait; further submissions get 503.
    #[arg(long, env = "JOB_QUEUE_SIZE", default_value = "64")]
    queue_size: usize,

    /// Seconds between retention sweeps.
    #[arg(long, env = "SWEEP_INTERVAL_SECS", default_value = "3600")]
    sweep_interval: u64,

    /// Days to keep published files (invalid values fall back to 7).
    #[arg(long, env = "FILE_RETENTION_DAYS")]
    retention_days: Option<String>,

    /// SMTP relay host.
    #[arg(long, env = "SMTP_HOST", default_value = "smtp.gmail.com")]
    smtp_host: String,

    /// SMTP relay port (STARTTLS).
    #[arg(long, env = "SMTP_PORT", default_value = "587")]
    smtp_port: u16,

    /// SMTP login, also used as the sender address.
    #[arg(long, env = "EMAIL_USER")]
    email_user: Option<String>,

    /// SMTP password.
    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    email_password: Option<String>,

    /// Run one retention sweep over the storage root and exit.
    #[arg(long)]
    sweep_only: bool,
}

impl Cli {
    fn config(&self) -> ServerConfig {
        ServerConfig::new()
            .storage_root(self.storage_root.clone())
            .base_url(self.base_url.clone())
            .max_concurrent_jobs(self.max_concurrent_jobs)
            .queue_capacity(self.queue_size)
            .retention(RetentionPolicy::from_days_str(self.retention_days.as_deref()))
            .sweep_interval(Duration::from_secs(self.sweep_interval))
            .smtp(
                SmtpConfig::new()
                    .host(self.smtp_host.clone())
                    .port(self.smtp_port)
                    .credentials(self.email_user.clone(), self.email_password.clone()),
            )
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("audiodrop=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config();

    if cli.sweep_only {
        let report = audiodrop::retention::sweep(&config.storage_root, config.retention.max_age());
        eprintln!(
            "Sweep complete: {} files scanned, {} deleted, {} failed (retention: {})",
            report.scanned, report.deleted, report.failed, config.retention
        );
        return;
    }

    if let Err(e) = serve(&cli, &config).await {
        error!(error = %e, "server failed");
        std::process::exit(1);
    }
}

async fn serve(cli: &Cli, config: &ServerConfig) -> audiodrop::Result<()> {
    let extractor = YtDlp::new(cli.ytdlp.clone()).timeout(Duration::from_secs(cli.extract_timeout));
    let notifier = SmtpNotifier::new(&config.smtp)?;
    let app = App::new(config, Arc::new(extractor), Arc::new(notifier))?;

    let sweeper = app.sweeper.start();
    let listener = tokio::net::TcpListener::bind(&cli.bind).await?;

    info!(
        addr = %cli.bind,
        storage_root = %config.storage_root.display(),
        base_url = %config.base_url,
        extractor = %cli.ytdlp,
        max_concurrent_jobs = config.max_concurrent_jobs,
        queue_size = config.queue_capacity,
        retention = %config.retention,
        "server ready and accepting connections"
    );

    axum::serve(listener, app.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C"),
        _ = terminate => info!("received terminate signal"),
    }

    info!("shutting down gracefully");
}
