//! Run a single job against the real yt-dlp and print the message that would be emailed.
//!
//! Usage: cargo run --example extract_once -- <video-url> [storage-dir]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use audiodrop::{JobRegistry, JobRunner, Notifier, Submission, YtDlp};

struct PrintNotifier;

#[async_trait]
impl Notifier for PrintNotifier {
    async fn send(&self, to: &str, body: &str) {
        println!("To: {to}\n\n{body}");
    }
}

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let url = args.next().expect("usage: extract_once <video-url> [storage-dir]");
    let root = args.next().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("public"));

    let runner = JobRunner::new(
        root,
        "http://localhost:8080",
        Arc::new(YtDlp::default()),
        Arc::new(PrintNotifier),
        Arc::new(JobRegistry::new()),
    );

    let outcome = runner
        .run(
            uuid::Uuid::new_v4(),
            Submission {
                source_url: url,
                recipient: "you@example.com".into(),
            },
        )
        .await;
    eprintln!("{outcome:?}");
}
