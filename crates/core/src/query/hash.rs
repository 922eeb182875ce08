//! Deterministic query fingerprints.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::QueryKey;

/// Compute the fingerprint of a query key.
///
/// The key is serialized as canonical JSON (object keys sorted at every
/// depth) and hashed with SHA-256, so `{"a":1,"b":2}` and `{"b":2,"a":1}`
/// produce the same fingerprint.
pub fn compute_query_hash(key: &QueryKey) -> String {
    let canonical = Value::Array(key.parts().iter().map(canonicalize).collect());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_stability() {
        let hash1 = compute_query_hash(&QueryKey::from("/test"));
        let hash2 = compute_query_hash(&QueryKey::from("/test"));
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_ignores_object_key_order() {
        let a = QueryKey::new([json!("todos"), json!({"page": 1, "filter": {"done": true, "owner": "me"}})]);
        let b = QueryKey::new([json!("todos"), json!({"filter": {"owner": "me", "done": true}, "page": 1})]);
        assert_eq!(compute_query_hash(&a), compute_query_hash(&b));
    }

    #[test]
    fn test_hash_respects_array_order() {
        let a = QueryKey::new([json!("todos"), json!(1)]);
        let b = QueryKey::new([json!(1), json!("todos")]);
        assert_ne!(compute_query_hash(&a), compute_query_hash(&b));
    }

    #[test]
    fn test_hash_different_params() {
        let a = QueryKey::new([json!("todos"), json!({"page": 1})]);
        let b = QueryKey::new([json!("todos"), json!({"page": 2})]);
        assert_ne!(compute_query_hash(&a), compute_query_hash(&b));
    }

    #[test]
    fn test_hash_format() {
        let hash = compute_query_hash(&QueryKey::from("/test"));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
