use std::sync::LazyLock;

use regex::Regex;

static VENDOR_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(amazon\s+|aws\s+)").expect("valid vendor prefix regex"));

/// Canonicalizes a display name such as `"AWS Lambda"` into a comparable key (`"lambda"`).
///
/// Lowercases and trims the name, drops one leading `amazon`/`aws` token and then
/// every character that isn't an ASCII lowercase letter or digit.
pub fn normalize_service_name(name: &str) -> String {
    let lowered = name.to_lowercase();
    let stripped = VENDOR_PREFIX.replace(lowered.trim(), "");
    stripped
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}
