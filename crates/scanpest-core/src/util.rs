//! Small helpers shared by the config, model and remote layers.

/// Trimmed text, or `None` when absent or blank.
///
/// Profile values and environment variables go through this so that `"  "`
/// and a missing value mean the same thing.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Whether `value` is an absolute `http`/`https` URL. The scheme is matched
/// case-insensitively.
pub fn is_http_url(value: &str) -> bool {
    value.split_once("://").is_some_and(|(scheme, rest)| {
        !rest.is_empty()
            && (scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https"))
    })
}

/// Milliseconds since the Unix epoch, the unit of every stored timestamp.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
