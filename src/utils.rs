use chrono::{DateTime, TimeZone, Utc};
use std::path::PathBuf;
use url::Url;

/// Configuration required to run the history-restore pipeline.
/// This decouples the logic from how the arguments were parsed (CLI/Config file).
#[derive(Clone)]
pub struct RestoreConfig {
    pub history_dir: PathBuf,
    pub restore_path: String,
    pub output_dir: PathBuf,
    pub start_ms: i64,
    pub end_ms: i64,
    pub quiet: bool,
}

/// Configuration for the chat-database extraction pipeline.
#[derive(Clone)]
pub struct ExtractConfig {
    pub db_path: PathBuf,
    pub filter: Option<String>,
    pub output_dir: PathBuf,
    pub quiet: bool,
}

/// Decode a `file://` URI into a plain filesystem path.
/// Non-URI input (or a URI that does not map to a path) is returned as-is.
pub fn decode_file_uri(raw: &str) -> String {
    if let Ok(url) = Url::parse(raw)
        && url.scheme() == "file"
    {
        if let Ok(path) = url.to_file_path() {
            return path.to_string_lossy().into_owned();
        }
        // Percent-decoded fallback for URIs the platform refuses to map.
        return url.path().to_string();
    }
    raw.to_string()
}

/// Normalize a path string for lexical comparison: decode `file://` URIs,
/// expand `~`, unify separators, resolve `.`/`..` segments, and strip any
/// trailing separator.
pub fn normalize_path(raw: &str) -> String {
    let mut s = if raw.starts_with("file://") {
        decode_file_uri(raw)
    } else {
        raw.to_string()
    };
    s = s.replace('\\', "/");

    if s == "~" || s.starts_with("~/") {
        if let Some(home) = dirs::home_dir() {
            let home = home.to_string_lossy().replace('\\', "/");
            s = format!("{}{}", home, &s[1..]);
        }
    }

    let absolute = s.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in s.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Whether `path` is lexically contained under `root`.
/// Both arguments are normalized before comparison; containment is a plain
/// prefix check with a separator appended to the root.
pub fn is_under(path: &str, root: &str) -> bool {
    let path = normalize_path(path);
    let root = normalize_path(root);
    path == root || path.starts_with(&format!("{root}/"))
}

/// The portion of `path` below `root`, or `None` when `path` is not under it.
/// A path equal to the root yields an empty string.
pub fn relative_to(path: &str, root: &str) -> Option<String> {
    let path = normalize_path(path);
    let root = normalize_path(root);
    if path == root {
        return Some(String::new());
    }
    path.strip_prefix(&format!("{root}/")).map(str::to_string)
}

/// Render an epoch-milliseconds timestamp for log lines and summaries.
pub fn format_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => format!("{ms}ms"),
    }
}

/// Epoch milliseconds for a UTC datetime.
pub fn to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_file_uris() {
        assert_eq!(
            decode_file_uri("file:///home/user/My%20Project"),
            "/home/user/My Project"
        );
        assert_eq!(decode_file_uri("/plain/path"), "/plain/path");
    }

    #[test]
    fn normalizes_separators_and_dots() {
        assert_eq!(normalize_path("/a/b/../c/./d/"), "/a/c/d");
        assert_eq!(normalize_path("/a//b/"), "/a/b");
        assert_eq!(normalize_path("file:///x/y%20z"), "/x/y z");
    }

    #[test]
    fn containment_is_component_wise() {
        assert!(is_under("/p/a.txt", "/p"));
        assert!(is_under("/p/sub/a.txt", "/p/"));
        assert!(is_under("/p", "/p"));
        // "/pq" must not match root "/p"
        assert!(!is_under("/pq/a.txt", "/p"));
        assert!(!is_under("/other/a.txt", "/p"));
    }

    #[test]
    fn relativizes_against_root() {
        assert_eq!(relative_to("/p/sub/a.txt", "/p"), Some("sub/a.txt".into()));
        assert_eq!(relative_to("/p", "/p"), Some(String::new()));
        assert_eq!(relative_to("/q/a.txt", "/p"), None);
    }
}
