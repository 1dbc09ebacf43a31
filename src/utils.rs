use std::path::Path;

use chrono::Utc;

pub trait PathExt {
    fn ext_lower(&self) -> String;
}

impl PathExt for Path {
    fn ext_lower(&self) -> String {
        self.extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default()
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Reduces a client-supplied file stem to `[A-Za-z0-9._-]` and bounds its
/// length so generated identities stay inside filesystem name limits.
pub fn sanitize_stem(stem: &str) -> String {
    let mut cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.truncate(80);
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "video".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_lower_normalizes_case_and_missing_extensions() {
        assert_eq!(Path::new("clip.MP4").ext_lower(), "mp4");
        assert_eq!(Path::new("clip").ext_lower(), "");
    }

    #[test]
    fn sanitize_stem_replaces_unsafe_characters() {
        assert_eq!(sanitize_stem("my movie (1)!"), "my_movie__1__");
        assert_eq!(sanitize_stem("家族旅行"), "____");
    }

    #[test]
    fn sanitize_stem_never_returns_empty_or_dot_names() {
        assert_eq!(sanitize_stem(""), "video");
        assert_eq!(sanitize_stem("..."), "video");
    }

    #[test]
    fn sanitize_stem_bounds_length() {
        let long = "a".repeat(500);
        assert_eq!(sanitize_stem(&long).len(), 80);
    }
}
