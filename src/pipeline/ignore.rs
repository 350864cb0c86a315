//! Decides which requests bypass capture entirely.

use crate::model::MonitorSettings;

/// Extensions served as static assets.
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "bmp", "avif",
    "woff", "woff2", "ttf", "otf", "eot",
];

/// Mount point of the monitor's own API when no base path is configured.
const DEFAULT_OWN_PREFIX: &str = "/api";

fn starts_with_ignore_case(path: &str, prefix: &str) -> bool {
    path.len() >= prefix.len()
        && path.is_char_boundary(prefix.len())
        && path[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// `path` is `prefix` itself or a path below it.
fn under_prefix(path: &str, prefix: &str) -> bool {
    starts_with_ignore_case(path, prefix)
        && matches!(path.as_bytes().get(prefix.len()), None | Some(b'/' | b'?'))
}

pub fn is_static_asset(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => STATIC_EXTENSIONS
            .iter()
            .any(|known| known.eq_ignore_ascii_case(extension)),
        _ => false,
    }
}

/// Normalized prefix under which the monitor itself is served.
pub fn own_prefix(base_path: &str) -> String {
    let trimmed = base_path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_OWN_PREFIX.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Rules apply in order: configured ignore prefixes, the monitor's own
/// prefix, then the static-asset denylist when enabled.
pub fn should_ignore(path: &str, settings: &MonitorSettings, base_path: &str) -> bool {
    let configured = settings
        .ignore_paths
        .iter()
        .map(|prefix| prefix.trim())
        .filter(|prefix| !prefix.is_empty())
        .any(|prefix| starts_with_ignore_case(path, prefix));
    if configured {
        return true;
    }

    if under_prefix(path, &own_prefix(base_path)) {
        return true;
    }

    settings.ignore_static_files && is_static_asset(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_prefixes_are_case_insensitive() {
        let settings = MonitorSettings {
            ignore_paths: vec!["/Health".into()],
            ..MonitorSettings::default()
        };
        assert!(should_ignore("/health/live", &settings, "/_reqlens"));
        assert!(should_ignore("/HEALTH", &settings, "/_reqlens"));
        assert!(!should_ignore("/orders", &settings, "/_reqlens"));
    }

    #[test]
    fn own_base_path_is_never_captured() {
        let settings = MonitorSettings::default();
        assert!(should_ignore("/_reqlens/api/logs", &settings, "/_reqlens/"));
        assert!(should_ignore("/api/logs", &settings, ""));
        assert_eq!(own_prefix("monitor/"), "/monitor");
    }

    #[test]
    fn own_base_path_matches_whole_segments() {
        let settings = MonitorSettings::default();
        assert!(should_ignore("/_reqlens", &settings, "/_reqlens"));
        assert!(!should_ignore("/_reqlens-admin", &settings, "/_reqlens"));
        assert!(!should_ignore("/_reqlensfoo/x", &settings, "/_reqlens"));
        assert!(!should_ignore("/apiary", &settings, ""));
    }

    #[test]
    fn static_assets_follow_the_flag() {
        let mut settings = MonitorSettings::default();
        assert!(should_ignore("/assets/site.CSS", &settings, "/_reqlens"));
        assert!(should_ignore("/fonts/a.woff2", &settings, "/_reqlens"));
        assert!(!should_ignore("/orders/1.5", &settings, "/_reqlens"));
        assert!(!should_ignore("/.env", &settings, "/_reqlens"));

        settings.ignore_static_files = false;
        assert!(!should_ignore("/assets/site.css", &settings, "/_reqlens"));
    }
}
