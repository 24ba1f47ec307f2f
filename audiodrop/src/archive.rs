use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tracing::{debug, warn};
use uuid::Uuid;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use crate::error::{Error, Result};

/// Archive name for a job: `{local-part}_{YYYYMMDDHHMMSS}_{job id}.zip`.
///
/// The local-part is everything before the first `@` of the recipient (the
/// whole string when there is none). Characters outside `[A-Za-z0-9._+-]`
/// are replaced with `_` so the name cannot leave the storage root.
pub fn archive_file_name<Tz>(recipient: &str, job_id: Uuid, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let local_part = recipient.split('@').next().unwrap_or_default();
    let safe: String = local_part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // ".." alone would still be a path component
    let safe = if safe.chars().all(|c| c == '.') && !safe.is_empty() {
        safe.replace('.', "_")
    } else {
        safe
    };
    format!("{safe}_{}_{job_id}.zip", at.format("%Y%m%d%H%M%S"))
}

/// Base name used for an archive entry.
fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidPath(format!("no file name in {}", path.display())))
}

fn write_archive(files: &[PathBuf], dest: &Path) -> Result<()> {
    let out = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(out));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let name = entry_name(path)?;
        let mut input = File::open(path)?;
        zip.start_file(name.as_str(), options)?;
        std::io::copy(&mut input, &mut zip)?;
        debug!(entry = %name, "added archive entry");
    }

    let mut out = zip.finish()?;
    out.flush()?;
    Ok(())
}

/// Create a deflate-compressed zip at `dest` holding each of `files` under its
/// base name. An existing archive at `dest` is replaced.
///
/// The archive is written next to `dest` with a `.part` suffix and renamed
/// into place, so a failed build never leaves a truncated archive behind.
pub fn build_archive(files: &[PathBuf], dest: &Path) -> Result<()> {
    let mut tmp_name = dest.as_os_str().to_owned();
    tmp_name.push(".part");
    let tmp_path = PathBuf::from(tmp_name);

    match write_archive(files, &tmp_path) {
        Ok(()) => {
            std::fs::rename(&tmp_path, dest)?;
            debug!(path = %dest.display(), entries = files.len(), "archive written");
            Ok(())
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(&tmp_path) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %tmp_path.display(), error = %rm, "failed to remove partial archive");
                }
            }
            Err(e)
        }
    }
}
