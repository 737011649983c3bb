//! Encoding of session blobs stored in a single record field.
//!
//! Values and options are written as JSON so any `Serialize` type placed in a
//! session survives a round trip through the backend. Decoding goes through
//! simd-json, which parses in place and needs an owned, mutable buffer.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a value or options blob for storage
pub fn serialize<T: Serialize + ?Sized>(src: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(src)
        .map_err(|e| Error::serialization(format!("Cannot serialize value: {}", e)))
}

/// Deserialize a blob previously produced by [`serialize`]
pub fn deserialize<T: DeserializeOwned>(src: &[u8]) -> Result<T> {
    if src.is_empty() {
        return Err(Error::serialization("Cannot deserialize value: empty blob"));
    }

    let mut bytes = src.to_vec();
    simd_json::from_slice(&mut bytes)
        .map_err(|e| Error::serialization(format!("Cannot deserialize value: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::{json, Map, Value};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        username: String,
        password: String,
        permissions: Vec<String>,
    }

    #[test]
    fn test_heterogeneous_values_round_trip() {
        let account = Account {
            username: "test_user".to_string(),
            password: "test_pass".to_string(),
            permissions: vec!["perm_a".to_string(), "perm_b".to_string()],
        };

        let mut values = Map::new();
        values.insert("auth".to_string(), serde_json::to_value(&account).unwrap());
        values.insert("count".to_string(), json!(42));
        values.insert("ratio".to_string(), json!(0.5));
        values.insert("active".to_string(), json!(true));
        values.insert("nothing".to_string(), Value::Null);
        values.insert("_flash".to_string(), json!(["foo", {"kind": 1}]));

        let blob = serialize(&values).unwrap();
        let decoded: Map<String, Value> = deserialize(&blob).unwrap();

        assert_eq!(decoded, values);
        let restored: Account = serde_json::from_value(decoded["auth"].clone()).unwrap();
        assert_eq!(restored, account);
    }

    #[test]
    fn test_corrupted_blob_is_an_error() {
        let result: Result<Map<String, Value>> = deserialize(b"{\"values\": [");
        assert!(matches!(result, Err(Error::Serialization(_))));

        let result: Result<Map<String, Value>> = deserialize(b"");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let blob = serialize(&json!(["not", "a", "map"])).unwrap();
        let result: Result<Map<String, Value>> = deserialize(&blob);
        assert!(result.is_err());
    }
}
