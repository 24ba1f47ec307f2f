//! Download links handed out by email.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use uuid::Uuid;

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

fn segment(s: &str) -> String {
    utf8_percent_encode(s, SEGMENT).to_string()
}

/// Link to a single published file: `{base}/download/{job id}/{file name}`.
pub fn file_link(base_url: &str, job_id: Uuid, file_name: &str) -> String {
    format!(
        "{}/download/{job_id}/{}",
        base_url.trim_end_matches('/'),
        segment(file_name)
    )
}

/// Link to an archive at the top of the storage root: `{base}/download/{archive}`.
pub fn archive_link(base_url: &str, archive_name: &str) -> String {
    format!(
        "{}/download/{}",
        base_url.trim_end_matches('/'),
        segment(archive_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_link() {
        let id = Uuid::nil();
        assert_eq!(
            file_link("http://localhost:8080", id, "song.mp3"),
            format!("http://localhost:8080/download/{id}/song.mp3")
        );
    }

    #[test]
    fn test_file_link_encodes_spaces() {
        let link = file_link("http://localhost:8080/", Uuid::nil(), "My Song (live).mp3");
        assert!(link.ends_with("/My%20Song%20(live).mp3"));
        assert!(!link.contains("//download"));
    }

    #[test]
    fn test_file_link_encodes_reserved() {
        let link = file_link("http://h", Uuid::nil(), "a#b?c%d.mp3");
        assert!(link.ends_with("/a%23b%3Fc%25d.mp3"));
    }

    #[test]
    fn test_archive_link() {
        assert_eq!(
            archive_link("https://audio.example.com", "alice_20260309140507_x.zip"),
            "https://audio.example.com/download/alice_20260309140507_x.zip"
        );
    }
}
