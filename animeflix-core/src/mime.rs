use std::path::Path;

/// File extensions picked up by directory import.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "webm", "mov"];

pub const DEFAULT_MIME: &str = "application/octet-stream";

/// Guess a video content type from a file extension.
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "flv" => "video/x-flv",
        "wmv" => "video/x-ms-wmv",
        "m4v" => "video/x-m4v",
        "mpg" | "mpeg" => "video/mpeg",
        "3gp" => "video/3gpp",
        "ogv" => "video/ogg",
        "ts" | "mts" | "m2ts" => "video/mp2t",
        _ => DEFAULT_MIME,
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(mime_for_extension)
        .unwrap_or(DEFAULT_MIME)
}

pub fn is_video_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Extension for a stored file, derived from the uploader-supplied name.
///
/// Only short ASCII alphanumeric extensions survive; anything else yields an
/// empty string so the name can never introduce separators or traversal.
pub fn sanitized_extension(original_name: &str) -> String {
    let Some((_, ext)) = original_name.rsplit_once('.') else {
        return String::new();
    };
    if ext.is_empty()
        || ext.len() > 8
        || !ext.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return String::new();
    }
    format!(".{}", ext.to_ascii_lowercase())
}
