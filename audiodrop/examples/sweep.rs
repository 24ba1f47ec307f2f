//! Delete files older than N days under a directory.
//!
//! Usage: cargo run --example sweep -- <dir> [days]

use std::path::PathBuf;

use audiodrop::RetentionPolicy;

fn main() {
    let mut args = std::env::args().skip(1);
    let dir = PathBuf::from(args.next().expect("usage: sweep <dir> [days]"));
    let policy = RetentionPolicy::from_days_str(args.next().as_deref());

    let report = audiodrop::retention::sweep(&dir, policy.max_age());
    println!(
        "{} scanned, {} deleted, {} failed (retention: {policy})",
        report.scanned, report.deleted, report.failed
    );
}
