use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static PARENTHESIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\([^)]*\) *").expect("parenthesized suffix pattern is valid"));

/// Serialize a serde-backed enum into its string name (e.g. "heat-cool").
pub fn serde_enum_name<T: Serialize>(val: &T) -> Option<String> {
    serde_json::to_value(val).ok()?.as_str().map(|s| s.to_string())
}

/// Drop parenthesized qualifiers like "(Downstairs)" together with the spaces around them.
pub fn strip_parenthesized(name: &str) -> String {
    PARENTHESIZED.replace_all(name, "").into_owned()
}

/// Render a reading the way the API reports it: whole numbers without a
/// fractional part, half degrees with one. Missing readings show as "--".
pub fn format_reading(value: Option<f64>) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{}", v),
        _ => "--".to_string(),
    }
}
