use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Hard limit on a single extractor run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Titles are capped at 100 bytes so file names stay within filesystem limits.
const OUTPUT_TEMPLATE: &str = "%(title).100B.%(ext)s";

/// Extension of the files a job publishes.
pub const AUDIO_EXTENSION: &str = "mp3";

/// An audio file left in a job workspace by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: PathBuf,
    /// Base name, as it appears in download links and archives.
    pub name: String,
}

/// How an extractor run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The tool exited successfully. Its output, if any, is in the output directory.
    Completed,
    /// The tool failed. `diagnostic` is forwarded to the user as-is.
    Failed { diagnostic: String },
}

/// Out-of-process audio extraction.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract audio from `url` into `output_dir`.
    ///
    /// Returns `Err` only when the tool could not be run at all.
    async fn extract(&self, url: &str, output_dir: &Path) -> Result<Extraction>;
}

/// yt-dlp, invoked as `{program} {leading args} -x --audio-format mp3 -o {template} -- {url}`.
///
/// The URL is handed over untouched; judging it is left to yt-dlp.
///
/// # Security
/// - The URL follows `--`, so it is never read as an option
/// - Arguments are passed via `.arg()` (no shell expansion)
/// - The child is killed when the timeout elapses
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self {
            program: "yt-dlp".into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl YtDlp {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Arguments placed before the extraction flags, e.g. `["-m", "yt_dlp"]`
    /// when `program` is a Python interpreter.
    pub fn leading_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn output_template(output_dir: &Path) -> Result<String> {
    output_dir
        .join(OUTPUT_TEMPLATE)
        .to_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidPath("output directory path contains invalid UTF-8".into()))
}

#[async_trait]
impl Extractor for YtDlp {
    async fn extract(&self, url: &str, output_dir: &Path) -> Result<Extraction> {
        let template = output_template(output_dir)?;
        info!(%url, output_dir = %output_dir.display(), "extracting audio");

        let child = tokio::process::Command::new(&self.program)
            .args(&self.leading_args)
            .args(["-x", "--audio-format", AUDIO_EXTENSION, "-o", &template, "--"])
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ExtractorNotFound {
                    program: self.program.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                warn!(%url, timeout_secs = self.timeout.as_secs(), "extractor timed out, killed");
                return Ok(Extraction::Failed {
                    diagnostic: format!(
                        "extraction timed out after {} seconds",
                        self.timeout.as_secs()
                    ),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                %url,
                status = %output.status,
                stdout = %String::from_utf8_lossy(&output.stdout),
                stderr = %stderr,
                "extractor failed"
            );
            return Ok(Extraction::Failed { diagnostic: stderr });
        }

        debug!(%url, "extractor finished");
        Ok(Extraction::Completed)
    }
}

/// List the audio files directly inside `dir`, sorted by name.
pub fn find_audio_files(dir: &Path) -> Result<Vec<ExtractedFile>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_audio = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(AUDIO_EXTENSION));
        if !is_audio {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            warn!(path = %path.display(), "skipping audio file with non UTF-8 name");
            continue;
        };
        files.push(ExtractedFile { path, name });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_output_template_scoped_to_dir() {
        let template = output_template(Path::new("/srv/public/job")).unwrap();
        assert_eq!(template, "/srv/public/job/%(title).100B.%(ext)s");
    }

    #[test]
    fn test_find_audio_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.mp3"), b"b").unwrap();
        fs::write(dir.path().join("a.MP3"), b"a").unwrap();
        fs::write(dir.path().join("cover.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("partial.mp3.part"), b"part").unwrap();
        fs::create_dir(dir.path().join("nested.mp3")).unwrap();

        let files = find_audio_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.MP3", "b.mp3"]);
        assert_eq!(files[1].path, dir.path().join("b.mp3"));
    }

    #[test]
    fn test_find_audio_files_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_audio_files(dir.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = YtDlp::new("/nonexistent/yt-dlp");
        let err = ytdlp
            .extract("https://example.com/v1", dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExtractorNotFound { .. }));
    }

    /// Runs `script` through `sh -c` in place of yt-dlp; the extractor
    /// arguments arrive as `$1..$7` with the output template in `$5`.
    #[cfg(unix)]
    fn scripted(script: &str) -> YtDlp {
        YtDlp::new("sh").leading_args(["-c", script, "yt-dlp"])
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passes_expected_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted(r#"printf '%s\n' "$@" > "$(dirname "$5")/args.txt""#);
        let result = ytdlp.extract("https://example.com/v1", dir.path()).await.unwrap();
        assert_eq!(result, Extraction::Completed);

        let args = fs::read_to_string(dir.path().join("args.txt")).unwrap();
        let template = format!("{}/%(title).100B.%(ext)s", dir.path().display());
        let expected = ["-x", "--audio-format", "mp3", "-o", &template, "--", "https://example.com/v1"];
        assert_eq!(args.lines().collect::<Vec<_>>(), expected);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_url_without_scheme_reaches_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted(r#"[ "$7" = "youtube.com/watch?v=abc" ] && printf 'ID3' > "$(dirname "$5")/song.mp3""#);
        let result = ytdlp.extract("youtube.com/watch?v=abc", dir.path()).await.unwrap();
        assert_eq!(result, Extraction::Completed);
        assert_eq!(find_audio_files(dir.path()).unwrap().len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_option_like_url_follows_separator() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted(r#"[ "$6" = "--" ] && [ "$7" = "--exec rm" ] && echo "ERROR: unsupported URL: $7" >&2; exit 1"#);
        let result = ytdlp.extract("--exec rm", dir.path()).await.unwrap();
        assert_eq!(
            result,
            Extraction::Failed {
                diagnostic: "ERROR: unsupported URL: --exec rm\n".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_url_is_left_to_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted(r#"[ -z "$7" ] && echo "ERROR: no URL given" >&2; exit 2"#);
        let result = ytdlp.extract("", dir.path()).await.unwrap();
        assert_eq!(
            result,
            Extraction::Failed {
                diagnostic: "ERROR: no URL given\n".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_writes_output_into_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted(r#"printf 'ID3' > "$(dirname "$5")/song.mp3""#);
        let result = ytdlp.extract("https://example.com/v1", dir.path()).await.unwrap();
        assert_eq!(result, Extraction::Completed);

        let files = find_audio_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "song.mp3");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_forwards_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted("echo 'network error' >&2; exit 1");
        let result = ytdlp.extract("https://example.com/v1", dir.path()).await.unwrap();
        assert_eq!(
            result,
            Extraction::Failed {
                diagnostic: "network error\n".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let ytdlp = scripted("sleep 30").timeout(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = ytdlp.extract("https://example.com/v1", dir.path()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(matches!(result, Extraction::Failed { diagnostic } if diagnostic.contains("timed out")));
    }
}
