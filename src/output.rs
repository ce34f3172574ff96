//! CLI output formatting.
//!
//! A finished build prints a short inventory of what went into the archive:
//!
//! ```text
//! Archive → site.ark
//!     Main page: A/index.html
//! Namespaces
//!     - 3 entries
//!     A 12 entries (2 redirects)
//!     I 7 entries
//!     M 8 entries
//! Content types
//!     text/html: 10
//!     image/png: 7
//! Wrote 30 entries in 3 clusters, 1.2 MiB
//! ```
//!
//! Each `format_*` function returns `Vec<String>` for testability and has a
//! `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::archive::ArchiveStats;
use crate::metadata::MimeCounters;
use crate::namespace::{ARTICLE, ArchiveUrl};
use std::path::Path;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count, binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

fn plural(n: u64, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

pub fn format_build_summary(
    stats: &ArchiveStats,
    counters: &MimeCounters,
    main_page: &ArchiveUrl,
    output: &Path,
) -> Vec<String> {
    let mut lines = vec![
        format!("Archive → {}", output.display()),
        format!("{}Main page: {main_page}", indent(1)),
    ];

    if !stats.namespaces.is_empty() {
        lines.push("Namespaces".to_string());
        for (namespace, count) in &stats.namespaces {
            let mut line = format!("{}{namespace} {}", indent(1), plural(*count, "entry", "entries"));
            if *namespace == ARTICLE && stats.redirects > 0 {
                line.push_str(&format!(" ({})", plural(stats.redirects, "redirect", "redirects")));
            }
            lines.push(line);
        }
    }

    if counters.total() > 0 {
        lines.push("Content types".to_string());
        for (mime_type, count) in counters.iter() {
            lines.push(format!("{}{mime_type}: {count}", indent(1)));
        }
    }

    lines.push(format!(
        "Wrote {} in {}, {}",
        plural(stats.entries(), "entry", "entries"),
        plural(stats.clusters, "cluster", "clusters"),
        format_bytes(stats.archive_bytes)
    ));
    lines
}

pub fn print_build_summary(
    stats: &ArchiveStats,
    counters: &MimeCounters,
    main_page: &ArchiveUrl,
    output: &Path,
) {
    for line in format_build_summary(stats, counters, main_page, output) {
        println!("{line}");
    }
}
