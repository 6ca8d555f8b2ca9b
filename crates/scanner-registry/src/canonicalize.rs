//! # RFC 8785 JSON Canonicalization Scheme (JCS)
//!
//! Deterministic JSON serialization, used to derive stable cache keys from
//! structured inputs (provider query parameters, manifest fragments) so that
//! semantically identical values always hash identically regardless of key
//! order or incidental whitespace.
//!
//! ## RFC 8785 summary
//!
//! 1. Object keys sorted lexicographically by UTF-16 code unit.
//! 2. Numbers in minimal representation.
//! 3. Strings with minimal escaping.
//! 4. No insignificant whitespace.
//! 5. Arrays keep their original element order.
//!
//! References: RFC 8785 <https://www.rfc-editor.org/rfc/rfc8785>.

use scanner_core::Fingerprint;

/// Canonicalizes a JSON value according to RFC 8785.
pub fn canonicalize(value: &serde_json::Value) -> String {
    canonicalize_value(value)
}

/// Derives a stable cache key from a JSON value: canonicalize, then
/// fingerprint. Two values that canonicalize identically always share a key.
pub fn cache_key(value: &serde_json::Value) -> String {
    Fingerprint::of_bytes(canonicalize(value).as_bytes()).0
}

fn canonicalize_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => canonicalize_number(n),
        serde_json::Value::String(s) => canonicalize_string(s),
        serde_json::Value::Array(arr) => canonicalize_array(arr),
        serde_json::Value::Object(obj) => canonicalize_object(obj),
    }
}

fn canonicalize_number(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    if let Some(u) = n.as_u64() {
        return u.to_string();
    }
    if let Some(f) = n.as_f64() {
        if f.fract() == 0.0 && f.abs() < (i64::MAX as f64) {
            return (f as i64).to_string();
        }
        if f.is_nan() || f.is_infinite() {
            return "null".to_string();
        }
        return format!("{f}");
    }
    n.to_string()
}

fn canonicalize_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');
    for ch in s.chars() {
        match ch {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\x08' => result.push_str("\\b"),
            '\x0C' => result.push_str("\\f"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c < '\x20' => result.push_str(&format!("\\u{:04x}", c as u32)),
            c => result.push(c),
        }
    }
    result.push('"');
    result
}

fn canonicalize_array(arr: &[serde_json::Value]) -> String {
    let elements: Vec<String> = arr.iter().map(canonicalize_value).collect();
    format!("[{}]", elements.join(","))
}

fn canonicalize_object(obj: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut entries: Vec<(&String, &serde_json::Value)> = obj.iter().collect();
    entries.sort_by(|(a, _), (b, _)| compare_utf16(a, b));
    let pairs: Vec<String> = entries
        .iter()
        .map(|(k, v)| format!("{}:{}", canonicalize_string(k), canonicalize_value(v)))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn compare_utf16(a: &str, b: &str) -> std::cmp::Ordering {
    let a_utf16: Vec<u16> = a.encode_utf16().collect();
    let b_utf16: Vec<u16> = b.encode_utf16().collect();
    a_utf16.cmp(&b_utf16)
}
