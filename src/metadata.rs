//! Archive metadata.
//!
//! Every archive carries a fixed set of `M/<key>` entries, emitted first and
//! always in this order:
//!
//! | Key | Payload |
//! |-----|---------|
//! | `Language` | configured string |
//! | `Publisher` | configured string |
//! | `Creator` | configured string |
//! | `Title` | configured string |
//! | `Description` | configured string |
//! | `Date` | build date, `YYYY-MM-DD` |
//! | `Favicon` | raw bytes of the favicon file |
//! | `Counter` | `mime=count;` per content type, first-seen order |
//!
//! `Date` and `Counter` are computed when their payload is fetched, not when
//! the entry is created. The counter in particular is only complete once
//! every file entry has been streamed, which is why storage engines must
//! fetch payloads after draining the entry stream.

use crate::config::BuildConfig;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKey {
    Language,
    Publisher,
    Creator,
    Title,
    Description,
    Date,
    Favicon,
    Counter,
}

impl MetadataKey {
    /// All keys in emission order.
    pub const ALL: [MetadataKey; 8] = [
        MetadataKey::Language,
        MetadataKey::Publisher,
        MetadataKey::Creator,
        MetadataKey::Title,
        MetadataKey::Description,
        MetadataKey::Date,
        MetadataKey::Favicon,
        MetadataKey::Counter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetadataKey::Language => "Language",
            MetadataKey::Publisher => "Publisher",
            MetadataKey::Creator => "Creator",
            MetadataKey::Title => "Title",
            MetadataKey::Description => "Description",
            MetadataKey::Date => "Date",
            MetadataKey::Favicon => "Favicon",
            MetadataKey::Counter => "Counter",
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-MIME-type file counts, kept in the order types were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeCounters {
    counts: Vec<(String, u64)>,
}

impl MimeCounters {
    pub fn increment(&mut self, mime_type: &str) {
        match self.counts.iter_mut().find(|(m, _)| m == mime_type) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((mime_type.to_string(), 1)),
        }
    }

    pub fn get(&self, mime_type: &str) -> u64 {
        self.counts
            .iter()
            .find(|(m, _)| m == mime_type)
            .map_or(0, |(_, c)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(m, c)| (m.as_str(), *c))
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|(_, c)| c).sum()
    }

    /// `text/html=3;image/png=1;`
    pub fn format(&self) -> String {
        self.iter().map(|(m, c)| format!("{m}={c};")).collect()
    }
}

/// Today's date as `YYYY-MM-DD`, local time.
pub fn build_date() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Payload of a metadata entry.
///
/// `root` is the source directory the favicon path is relative to.
pub fn payload(
    key: MetadataKey,
    config: &BuildConfig,
    root: &Path,
    counters: &MimeCounters,
) -> io::Result<Vec<u8>> {
    let text = match key {
        MetadataKey::Language => config.language.clone(),
        MetadataKey::Publisher => config.publisher.clone(),
        MetadataKey::Creator => config.creator.clone(),
        MetadataKey::Title => config.title.clone(),
        MetadataKey::Description => config.description.clone(),
        MetadataKey::Date => build_date(),
        MetadataKey::Favicon => return fs::read(root.join(&config.favicon)),
        MetadataKey::Counter => counters.format(),
    };
    Ok(text.into_bytes())
}
