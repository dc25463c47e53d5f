//! JSON Pointer paths over a merged config document.

use serde_json::Value;

/// Every scalar in `doc` with its JSON Pointer, in key order. Empty
/// mappings and sequences contribute nothing.
pub(crate) fn scalar_leaves(doc: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    walk(doc, String::new(), &mut out);
    out
}

fn walk<'v>(v: &'v Value, path: String, out: &mut Vec<(String, &'v Value)>) {
    match v {
        Value::Object(map) => {
            for (key, child) in map {
                walk(child, format!("{path}/{}", escape(key)), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk(child, format!("{path}/{i}"), out);
            }
        }
        scalar if path.is_empty() => out.push(("/".to_string(), scalar)),
        scalar => out.push((path, scalar)),
    }
}

/// RFC 6901 token escaping.
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Whether `section` is `pointer` itself or one of its ancestors. "/" is the
/// ancestor of everything; "/tax" does not cover "/taxes".
pub(crate) fn covers(section: &str, pointer: &str) -> bool {
    section == "/"
        || pointer == section
        || pointer
            .strip_prefix(section)
            .is_some_and(|rest| rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_cover_whole_tokens_only() {
        assert!(covers("/tax", "/tax/default_rule/long_term_rate"));
        assert!(covers("/tax", "/tax"));
        assert!(!covers("/tax", "/taxes/x"));
        assert!(covers("/", "/job/base_value"));
    }

    #[test]
    fn leaf_pointers_escape_and_resolve() {
        let doc = serde_json::json!({"a/b": {"c~d": 1}, "list": [true], "empty": {}});
        let leaves = scalar_leaves(&doc);
        let paths: Vec<&str> = leaves.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["/a~1b/c~0d", "/list/0"]);
        assert_eq!(doc.pointer(paths[0]), Some(&serde_json::json!(1)));
    }
}
