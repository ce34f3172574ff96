//! Extension-based file type classification.
//!
//! The archive only needs a MIME type to pick a namespace and decide which
//! payload transforms apply, so classification is a lookup on the lowercased
//! extension. Paths are percent-decoded first: links inside documents are
//! usually URL-encoded while the files on disk are not.

use std::path::Path;

pub const TEXT_HTML: &str = "text/html";
pub const HTML_TEMPLATE: &str = "text/x-html-template";
pub const TEXT_CSS: &str = "text/css";
pub const TEXT_PLAIN: &str = "text/plain";
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Font types that stylesheets get inlined as `data:` URIs.
pub const EMBEDDABLE_FONTS: &[&str] = &[
    "application/font-ttf",
    "application/font-woff",
    "application/font-woff2",
    "application/vnd.ms-opentype",
    "application/vnd.ms-fontobject",
];

const EXTENSIONS: &[(&str, &str)] = &[
    ("html", TEXT_HTML),
    ("htm", TEXT_HTML),
    ("tmpl", HTML_TEMPLATE),
    ("css", TEXT_CSS),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", TEXT_PLAIN),
    ("xml", "text/xml"),
    ("vtt", "text/vtt"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    ("ttf", "application/font-ttf"),
    ("woff", "application/font-woff"),
    ("woff2", "application/font-woff2"),
    ("otf", "application/vnd.ms-opentype"),
    ("eot", "application/vnd.ms-fontobject"),
    ("mp3", "audio/mpeg"),
    ("mp4", "video/mp4"),
    ("ogg", "application/ogg"),
    ("webm", "video/webm"),
];

/// MIME type for a path or URL, by extension.
pub fn mime_type_for(path: &str) -> &'static str {
    let decoded = percent_decode(path);
    let ext = Path::new(&decoded)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

pub fn is_html(mime: &str) -> bool {
    mime.starts_with(TEXT_HTML)
}

pub fn is_html_template(mime: &str) -> bool {
    mime.starts_with(HTML_TEMPLATE)
}

pub fn is_css(mime: &str) -> bool {
    mime.starts_with(TEXT_CSS)
}

pub fn is_embeddable_font(mime: &str) -> bool {
    EMBEDDABLE_FONTS.contains(&mime)
}

/// Decode `%XX` escapes. Invalid escapes are kept as-is.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]))
        {
            out.push((hi << 4) | lo);
            i += 3;
            continue;
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_by_extension() {
        assert_eq!(mime_type_for("index.html"), TEXT_HTML);
        assert_eq!(mime_type_for("dir/page.HTM"), TEXT_HTML);
    }

    #[test]
    fn fonts_are_embeddable() {
        assert!(is_embeddable_font(mime_type_for("fonts/x.woff")));
        assert!(is_embeddable_font(mime_type_for("fonts/x.ttf")));
        assert!(!is_embeddable_font(mime_type_for("img/x.png")));
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(mime_type_for("README"), OCTET_STREAM);
        assert_eq!(mime_type_for("archive.xyz"), OCTET_STREAM);
    }

    #[test]
    fn encoded_paths_are_decoded_before_lookup() {
        assert_eq!(mime_type_for("my%20photo.png"), "image/png");
        assert_eq!(percent_decode("a%2Fb%20c"), "a/b c");
    }

    #[test]
    fn invalid_escape_kept_verbatim() {
        assert_eq!(percent_decode("100%zz"), "100%zz");
        assert_eq!(percent_decode("trailing%2"), "trailing%2");
    }
}
