//! Minimal field-path grammar shared by field definitions and projectors.
//!
//! Accepted: dot-separated keys (alnum, `_`, `-`) with an optional single
//! `[index]` at the end of a segment, e.g. `members[0].name`.

#![forbid(unsafe_code)]

use serde_json::Value;

/// Normalize a field path: strips one leading `.`, rejects wildcards/filters
/// and anything outside the grammar. Returns `None` when invalid.
pub fn normalize_path(jp: &str) -> Option<String> {
    if jp.contains('?') || jp.contains('*') { return None; }
    let s = jp.strip_prefix('.').unwrap_or(jp);
    if s.is_empty() { return None; }
    for seg in s.split('.') {
        if seg.is_empty() { return None; }
        let bytes = seg.as_bytes();
        let mut open_idx: Option<usize> = None;
        for (i, ch) in bytes.iter().enumerate() {
            match *ch as char {
                '[' => {
                    if open_idx.is_some() || i == 0 { return None; }
                    open_idx = Some(i);
                }
                ']' => match open_idx {
                    Some(start) => {
                        if i != bytes.len() - 1 { return None; }
                        if start + 1 >= i { return None; }
                        if !seg[start + 1..i].chars().all(|c| c.is_ascii_digit()) { return None; }
                    }
                    None => return None,
                },
                c => {
                    if open_idx.is_none() && !(c.is_ascii_alphanumeric() || c == '_' || c == '-') {
                        return None;
                    }
                }
            }
        }
        if open_idx.is_some() && !seg.ends_with(']') { return None; }
    }
    Some(s.to_string())
}

/// Follow a normalized path through `root`. Missing keys, out-of-range
/// indices and type mismatches all yield `None`.
pub fn extract_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in path.split('.') {
        if seg.is_empty() { return None; }
        let (key, idx_opt) = match seg.find('[') {
            Some(brk) => {
                let end = seg.get(brk + 1..)?.find(']')? + brk + 1;
                let idx: usize = seg[brk + 1..end].parse().ok()?;
                (&seg[..brk], Some(idx))
            }
            None => (seg, None),
        };
        cur = match cur {
            Value::Object(map) => map.get(key)?,
            _ => return None,
        };
        if let Some(i) = idx_opt {
            cur = match cur {
                Value::Array(arr) => arr.get(i)?,
                _ => return None,
            };
        }
    }
    Some(cur)
}

/// Render a scalar as text: strings verbatim, numbers and bools via their
/// JSON form. Null, arrays and objects have no scalar rendering.
pub fn render_scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_simple_paths() {
        assert_eq!(normalize_path(".name"), Some("name".to_string()));
        assert_eq!(normalize_path("members[0].name"), Some("members[0].name".to_string()));
        assert_eq!(normalize_path("object-type_2"), Some("object-type_2".to_string()));
    }

    #[test]
    fn normalize_rejects_invalid_paths() {
        assert!(normalize_path("").is_none());
        assert!(normalize_path(".").is_none());
        assert!(normalize_path("members.*").is_none());
        assert!(normalize_path("members[0][1]").is_none());
        assert!(normalize_path("members[]").is_none());
        assert!(normalize_path("members[x]").is_none());
        assert!(normalize_path("a..b").is_none());
        assert!(normalize_path("[0]").is_none());
        assert!(normalize_path("a b").is_none());
    }

    #[test]
    fn extract_follows_keys_and_indices() {
        let v = serde_json::json!({
            "name": "The Band",
            "members": [{ "name": "Ann" }, { "name": "Bo" }],
            "size": 2
        });
        assert_eq!(extract_path(&v, "name"), Some(&serde_json::json!("The Band")));
        assert_eq!(extract_path(&v, "members[1].name"), Some(&serde_json::json!("Bo")));
        assert!(extract_path(&v, "members[5].name").is_none());
        assert!(extract_path(&v, "size.value").is_none());
        assert!(extract_path(&v, "name[0]").is_none());
    }

    #[test]
    fn render_scalar_covers_json_scalars() {
        assert_eq!(render_scalar(&serde_json::json!("x")), Some("x".to_string()));
        assert_eq!(render_scalar(&serde_json::json!(3)), Some("3".to_string()));
        assert_eq!(render_scalar(&serde_json::json!(1.5)), Some("1.5".to_string()));
        assert_eq!(render_scalar(&serde_json::json!(false)), Some("false".to_string()));
        assert!(render_scalar(&serde_json::Value::Null).is_none());
        assert!(render_scalar(&serde_json::json!([1])).is_none());
        assert!(render_scalar(&serde_json::json!({"a": 1})).is_none());
    }
}
