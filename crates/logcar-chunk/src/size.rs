//! Virtual string-length of JSON values, used as an O(n) proxy for serialized size

use serde_json::Value;

/// Returns the virtual length of a JSON value.
///
/// Strings count characters (not bytes, not escaped length); arrays sum their
/// elements; mappings sum key length plus value length per entry; every other
/// value counts the characters of its string representation.
pub fn virtual_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.iter().map(virtual_len).sum(),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.chars().count() + virtual_len(v))
            .sum(),
        other => other.to_string().chars().count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_counts_chars() {
        assert_eq!(virtual_len(&json!("hello")), 5);
        assert_eq!(virtual_len(&json!("")), 0);
        // multi-byte characters count once each
        assert_eq!(virtual_len(&json!("héllo")), 5);
    }

    #[test]
    fn scalars_use_string_form() {
        assert_eq!(virtual_len(&json!(null)), 4);
        assert_eq!(virtual_len(&json!(true)), 4);
        assert_eq!(virtual_len(&json!(false)), 5);
        assert_eq!(virtual_len(&json!(1234)), 4);
    }

    #[test]
    fn array_sums_elements() {
        assert_eq!(virtual_len(&json!(["ab", "cde", 7])), 6);
        assert_eq!(virtual_len(&json!([])), 0);
    }

    #[test]
    fn mapping_sums_keys_and_values() {
        // "a" (1) + "xyz" (3) + "bb" (2) + 10 (2)
        assert_eq!(virtual_len(&json!({"a": "xyz", "bb": 10})), 8);
        assert_eq!(virtual_len(&json!({})), 0);
    }

    #[test]
    fn nesting_is_recursive() {
        let v = json!({"outer": {"inner": [1, 2, 3]}});
        // "outer" (5) + "inner" (5) + 1+1+1
        assert_eq!(virtual_len(&v), 13);
    }
}
