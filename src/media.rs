//! Media types and resource filename hygiene.

/// Extensions accepted by `add_image`. Parsed archives may carry other
/// image types (bmp, tiff); those are resolvable through
/// [`mime_for_extension`] but cannot be added through the build API.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp"];

/// Map a lowercase file extension to its media type.
/// `application/octet-stream` is the last resort for unknown extensions.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "xhtml" | "html" | "htm" => "application/xhtml+xml",
        "css" => "text/css",
        "ncx" => "application/x-dtbncx+xml",
        _ => "application/octet-stream",
    }
}

/// Lowercase extension of a filename, if any.
pub fn extension(filename: &str) -> Option<String> {
    let base = basename(filename);
    base.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Final path component.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Sanitize a resource filename: final component only, lower-cased,
/// restricted to alphanumerics plus `.`, `_`, `-`, with leading and
/// trailing dots stripped.
pub fn sanitize_filename(filename: &str) -> String {
    let base = basename(filename);
    let kept: String = base
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches('.').to_string()
}
