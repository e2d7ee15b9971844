//! File extension to MIME type mapping.

use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

const TABLE: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("md", "text/plain; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
];

/// Resolve the content type for a path by its extension.
///
/// Matching is case-sensitive; unknown or missing extensions map to
/// `application/octet-stream`.
pub fn for_path(path: impl AsRef<Path>) -> &'static str {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            TABLE
                .iter()
                .find(|(known, _)| *known == ext)
                .map(|(_, mime)| *mime)
        })
        .unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions() {
        assert_eq!(for_path("a/b/image.png"), "image/png");
        assert_eq!(for_path("photo.jpeg"), "image/jpeg");
        assert_eq!(for_path("photo.jpg"), "image/jpeg");
        assert_eq!(for_path("index.html"), "text/html; charset=utf-8");
        assert_eq!(for_path("README.md"), "text/plain; charset=utf-8");
        assert_eq!(for_path("diagram.svg"), "image/svg+xml");
    }

    #[test]
    fn unknown_or_missing_extension_is_octet_stream() {
        assert_eq!(for_path("archive.tar.zst"), OCTET_STREAM);
        assert_eq!(for_path("Makefile"), OCTET_STREAM);
    }

    #[test]
    fn extension_match_is_case_sensitive() {
        assert_eq!(for_path("IMAGE.PNG"), OCTET_STREAM);
    }
}
