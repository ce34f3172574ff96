//! Entries of the archive stream.

use crate::metadata::MetadataKey;
use crate::mime;
use crate::namespace::{ARTICLE, ArchiveUrl, METADATA};
use crate::template::Page;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Metadata(MetadataKey),
    /// Points at another entry. `line` is the redirects-file line it came
    /// from, if any.
    Redirect {
        target: ArchiveUrl,
        line: Option<String>,
    },
    /// Content read from `path` on disk.
    File { path: PathBuf },
}

/// One item of the archive: a metadata key, a redirect or a content file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub kind: EntryKind,
    pub url: ArchiveUrl,
    pub title: String,
    pub mime_type: String,
}

impl Entry {
    /// `favicon_mime` is only used for the `Favicon` key.
    pub fn metadata(key: MetadataKey, favicon_mime: &str) -> Self {
        let mime_type = match key {
            MetadataKey::Favicon => favicon_mime,
            _ => mime::TEXT_PLAIN,
        };
        Self {
            kind: EntryKind::Metadata(key),
            url: ArchiveUrl::new(METADATA, key.name()),
            title: key.name().to_string(),
            mime_type: mime_type.to_string(),
        }
    }

    /// Parse a `url<TAB>title<TAB>target` redirects-file line. Extra fields
    /// are ignored; fewer than three give `None`.
    pub fn from_redirect_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let (url, title, target) = (fields.next()?, fields.next()?, fields.next()?);
        Some(Self {
            kind: EntryKind::Redirect {
                target: ArchiveUrl::new(ARTICLE, target),
                line: Some(line.to_string()),
            },
            url: ArchiveUrl::new(ARTICLE, url),
            title: title.to_string(),
            mime_type: String::new(),
        })
    }

    pub fn namespace(&self) -> char {
        self.url.namespace
    }

    /// Identifier used in logs, `/<namespace>/<url>`.
    pub fn aid(&self) -> String {
        self.url.full()
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.kind, EntryKind::Redirect { .. })
    }

    pub fn redirect_target(&self) -> Option<&ArchiveUrl> {
        match &self.kind {
            EntryKind::Redirect { target, .. } => Some(target),
            _ => None,
        }
    }

    /// The view of this entry templates render against.
    pub fn page(&self) -> Page {
        Page {
            namespace: self.url.namespace,
            url: self.url.url.clone(),
            title: self.title.clone(),
            mime_type: self.mime_type.clone(),
        }
    }
}
