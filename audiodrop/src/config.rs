use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Retention window applied when `FILE_RETENTION_DAYS` is unset or unusable.
pub const DEFAULT_RETENTION_DAYS: u64 = 7;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// How long published files are kept before the retention sweep deletes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    days: u64,
}

impl RetentionPolicy {
    /// A policy keeping files for `days` days. Zero falls back to the default.
    pub fn days(days: u64) -> Self {
        if days == 0 {
            Self::default()
        } else {
            Self { days }
        }
    }

    /// Parse a raw day count as found in the environment.
    ///
    /// Anything that is not a positive integer silently yields the default.
    pub fn from_days_str(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<u64>().ok())
            .map(Self::days)
            .unwrap_or_default()
    }

    pub fn as_days(&self) -> u64 {
        self.days
    }

    /// Maximum file age before deletion.
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.days.saturating_mul(SECS_PER_DAY))
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} days", self.days)
    }
}

/// Mail transport login.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    /// `None` when `EMAIL_USER` / `EMAIL_PASSWORD` are not both set.
    pub credentials: Option<Credentials>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".into(),
            port: 587,
            credentials: None,
        }
    }
}

impl SmtpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set credentials. Both parts must be non-empty, otherwise the
    /// notifier runs without credentials and only logs.
    pub fn credentials(mut self, user: Option<String>, password: Option<String>) -> Self {
        self.credentials = match (user, password) {
            (Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => {
                Some(Credentials { user, password })
            }
            _ => None,
        };
        self
    }
}

/// Builder for the service configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared scratch space and public download namespace.
    pub storage_root: PathBuf,
    /// Externally reachable origin used when building download links.
    pub base_url: String,
    pub max_concurrent_jobs: usize,
    pub queue_capacity: usize,
    pub retention: RetentionPolicy,
    pub sweep_interval: Duration,
    pub smtp: SmtpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("public"),
            base_url: "http://localhost:8080".into(),
            max_concurrent_jobs: 4,
            queue_capacity: 64,
            retention: RetentionPolicy::default(),
            sweep_interval: Duration::from_secs(3600),
            smtp: SmtpConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = root.into();
        self
    }

    /// Set the link origin. A trailing slash is dropped.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// At least one job always runs.
    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n.max(1);
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }

    pub fn retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_secs(1));
        self
    }

    pub fn smtp(mut self, smtp: SmtpConfig) -> Self {
        self.smtp = smtp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_default_is_seven_days() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.as_days(), 7);
        assert_eq!(policy.max_age(), Duration::from_secs(7 * 86_400));
    }

    #[test]
    fn test_retention_parses_valid_days() {
        assert_eq!(RetentionPolicy::from_days_str(Some("3")).as_days(), 3);
        assert_eq!(RetentionPolicy::from_days_str(Some(" 30 ")).as_days(), 30);
    }

    #[test]
    fn test_retention_invalid_falls_back() {
        for raw in ["", "abc", "-2", "1.5", "7d", "0"] {
            assert_eq!(
                RetentionPolicy::from_days_str(Some(raw)).as_days(),
                DEFAULT_RETENTION_DAYS,
                "input {raw:?}"
            );
        }
        assert_eq!(RetentionPolicy::from_days_str(None).as_days(), DEFAULT_RETENTION_DAYS);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let config = ServerConfig::new().base_url("https://audio.example.com/");
        assert_eq!(config.base_url, "https://audio.example.com");
    }

    #[test]
    fn test_concurrency_clamped_to_one() {
        let config = ServerConfig::new().max_concurrent_jobs(0).queue_capacity(0);
        assert_eq!(config.max_concurrent_jobs, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_smtp_credentials_require_both_parts() {
        let smtp = SmtpConfig::new().credentials(Some("me@example.com".into()), None);
        assert!(smtp.credentials.is_none());

        let smtp = SmtpConfig::new().credentials(Some("".into()), Some("secret".into()));
        assert!(smtp.credentials.is_none());

        let smtp = SmtpConfig::new().credentials(Some("me@example.com".into()), Some("secret".into()));
        assert_eq!(smtp.credentials.unwrap().user, "me@example.com");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials {
            user: "me".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
    }
}
