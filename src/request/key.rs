//! Request identity derivation and query-string serialization.
//!
//! Both the in-flight tracker and the cache need to recognize "the same
//! request" regardless of the order in which callers inserted params or body
//! fields. Serialization sorts object keys at every nesting level and writes
//! arrays in a fixed notation, so equal descriptors always produce equal
//! strings.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::descriptor::RequestDescriptor;

/// Separator between identity components.
const IDENTITY_SEPARATOR: &str = "&";

/// Notation for array values in a query string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayFormat {
    /// `ids[]=1&ids[]=2`
    Brackets,
    /// `ids=1,2`
    Comma,
    /// `ids[0]=1&ids[1]=2`
    Indices,
    /// `ids=1&ids=2`
    #[default]
    Repeat,
}

/// Serialize a JSON value into a sorted, percent-encoded query string.
///
/// Objects and arrays expand into `key=value` pairs. Strings and other
/// scalars at the top level have no key to attach to and are encoded as-is.
pub fn stringify(value: &Value, format: ArrayFormat) -> String {
    match value {
        Value::Null => String::new(),
        Value::Object(map) => stringify_map(map, format),
        Value::Array(items) => {
            let mut pairs = Vec::new();
            for (idx, item) in items.iter().enumerate() {
                push_pairs(&mut pairs, &idx.to_string(), item, format);
            }
            pairs.join("&")
        }
        scalar => encode(&scalar_text(scalar)),
    }
}

/// Serialize a params map into a sorted query string.
pub fn stringify_map(map: &Map<String, Value>, format: ArrayFormat) -> String {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    let mut pairs = Vec::new();
    for key in keys {
        push_pairs(&mut pairs, &encode(key), &map[key], format);
    }
    pairs.join("&")
}

/// Stable identity of a request for in-flight tracking.
///
/// `METHOD&url&body&params`, with body and params serialized in repeat form.
pub fn identity_key(descriptor: &RequestDescriptor) -> String {
    let body = descriptor
        .body
        .as_ref()
        .map(|body| stringify(body, ArrayFormat::Repeat))
        .unwrap_or_default();
    let params = stringify_map(&descriptor.params, ArrayFormat::Repeat);
    [
        descriptor.method.as_str(),
        descriptor.url.as_str(),
        body.as_str(),
        params.as_str(),
    ]
    .join(IDENTITY_SEPARATOR)
}

fn push_pairs(pairs: &mut Vec<String>, prefix: &str, value: &Value, format: ArrayFormat) {
    match value {
        Value::Null => pairs.push(format!("{prefix}=")),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                let nested = format!("{prefix}[{}]", encode(key));
                push_pairs(pairs, &nested, &map[key], format);
            }
        }
        Value::Array(items) => push_array(pairs, prefix, items, format),
        scalar => pairs.push(format!("{prefix}={}", encode(&scalar_text(scalar)))),
    }
}

fn push_array(pairs: &mut Vec<String>, prefix: &str, items: &[Value], format: ArrayFormat) {
    match format {
        ArrayFormat::Repeat => {
            for item in items {
                push_pairs(pairs, prefix, item, format);
            }
        }
        ArrayFormat::Brackets => {
            let nested = format!("{prefix}[]");
            for item in items {
                push_pairs(pairs, &nested, item, format);
            }
        }
        ArrayFormat::Indices => {
            for (idx, item) in items.iter().enumerate() {
                push_pairs(pairs, &format!("{prefix}[{idx}]"), item, format);
            }
        }
        ArrayFormat::Comma => {
            if items.is_empty() {
                return;
            }
            // Comma form only makes sense for scalars; nested values fall back to indices.
            if items.iter().all(is_scalar) {
                let joined = items
                    .iter()
                    .map(|item| encode(&scalar_text(item)))
                    .collect::<Vec<_>>()
                    .join(",");
                pairs.push(format!("{prefix}={joined}"));
            } else {
                push_array(pairs, prefix, items, ArrayFormat::Indices);
            }
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::descriptor::Method;
    use serde_json::json;

    #[test]
    fn object_keys_are_sorted_at_every_level() {
        let a = json!({"b": 2, "a": {"y": 1, "x": 0}});
        let b = json!({"a": {"x": 0, "y": 1}, "b": 2});
        assert_eq!(stringify(&a, ArrayFormat::Repeat), "a[x]=0&a[y]=1&b=2");
        assert_eq!(
            stringify(&a, ArrayFormat::Repeat),
            stringify(&b, ArrayFormat::Repeat)
        );
    }

    #[test]
    fn array_formats_follow_their_notation() {
        let value = json!({"ids": [1, 2]});
        assert_eq!(stringify(&value, ArrayFormat::Repeat), "ids=1&ids=2");
        assert_eq!(stringify(&value, ArrayFormat::Brackets), "ids[]=1&ids[]=2");
        assert_eq!(stringify(&value, ArrayFormat::Indices), "ids[0]=1&ids[1]=2");
        assert_eq!(stringify(&value, ArrayFormat::Comma), "ids=1,2");
    }

    #[test]
    fn comma_format_falls_back_to_indices_for_nested_items() {
        let value = json!({"rows": [{"id": 1}]});
        assert_eq!(stringify(&value, ArrayFormat::Comma), "rows[0][id]=1");
    }

    #[test]
    fn values_are_percent_encoded_and_nulls_kept() {
        let value = json!({"q": "a b&c", "empty": null, "flag": true});
        assert_eq!(
            stringify(&value, ArrayFormat::Repeat),
            "empty=&flag=true&q=a%20b%26c"
        );
    }

    #[test]
    fn top_level_scalars_encode_without_key() {
        assert_eq!(stringify(&json!("plain text"), ArrayFormat::Repeat), "plain%20text");
        assert_eq!(stringify(&Value::Null, ArrayFormat::Repeat), "");
    }

    #[test]
    fn identity_ignores_param_and_body_key_order() {
        let first = RequestDescriptor::post("/orders")
            .param("a", 1)
            .param("b", 2)
            .json(json!({"x": [1, 2], "y": {"k": "v"}}));
        let second = RequestDescriptor::post("/orders")
            .param("b", 2)
            .param("a", 1)
            .json(json!({"y": {"k": "v"}, "x": [1, 2]}));
        assert_eq!(identity_key(&first), identity_key(&second));
        assert_eq!(identity_key(&first), "POST&/orders&x=1&x=2&y[k]=v&a=1&b=2");
    }

    #[test]
    fn identity_distinguishes_method_url_and_values() {
        let base = RequestDescriptor::get("/users").param("page", 1);
        let other_page = RequestDescriptor::get("/users").param("page", 2);
        let other_method = RequestDescriptor::new(Method::Delete, "/users").param("page", 1);
        assert_ne!(identity_key(&base), identity_key(&other_page));
        assert_ne!(identity_key(&base), identity_key(&other_method));
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn identity_is_stable_under_param_reordering(
                entries in proptest::collection::btree_map(
                    proptest::string::string_regex("[a-z]{1,6}").expect("regex"),
                    proptest::string::string_regex("[ -~]{0,12}").expect("regex"),
                    0..8
                )
            ) {
                let mut forward = RequestDescriptor::get("/search");
                for (key, value) in entries.iter() {
                    forward = forward.param(key.clone(), value.clone());
                }
                let mut backward = RequestDescriptor::get("/search");
                for (key, value) in entries.iter().rev() {
                    backward = backward.param(key.clone(), value.clone());
                }
                prop_assert_eq!(identity_key(&forward), identity_key(&backward));
            }
        }
    }
}
