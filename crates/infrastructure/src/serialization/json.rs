//! Stable JSON helpers.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::ser::{PrettyFormatter, Serializer};

/// Error type for serialization operations.
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// JSON serialization failed.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// JSON deserialization failed.
    #[error("JSON deserialization failed: {0}")]
    Deserialize(serde_json::Error),

    /// UTF-8 encoding error.
    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Serializes a value to pretty JSON with a trailing newline.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_stable<T: Serialize + ?Sized>(value: &T) -> Result<String, SerializationError> {
    let mut buffer = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"  ");
    let mut serializer = Serializer::with_formatter(&mut buffer, formatter);
    value.serialize(&mut serializer)?;

    let mut json = String::from_utf8(buffer)?;
    json.push('\n');
    Ok(json)
}

/// Same as [`to_json_stable`], as bytes ready for a file write.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_json_stable_bytes<T: Serialize + ?Sized>(
    value: &T,
) -> Result<Vec<u8>, SerializationError> {
    to_json_stable(value).map(String::into_bytes)
}

/// Deserializes JSON from bytes.
///
/// # Errors
///
/// Returns an error if the JSON is invalid or doesn't match the expected type.
pub fn from_json_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    serde_json::from_slice(bytes).map_err(SerializationError::Deserialize)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    #[test]
    fn output_is_sorted_indented_and_newline_terminated() {
        let values = BTreeMap::from([("token", "abc"), ("role", "admin")]);

        let json = to_json_stable(&values).unwrap();

        assert_eq!(json, "{\n  \"role\": \"admin\",\n  \"token\": \"abc\"\n}\n");
    }

    #[test]
    fn reads_back_what_it_writes() {
        let values = BTreeMap::from([("token".to_string(), "abc".to_string())]);
        let bytes = to_json_stable_bytes(&values).unwrap();

        let parsed: BTreeMap<String, String> = from_json_bytes(&bytes).unwrap();

        assert_eq!(parsed, values);
    }

    #[test]
    fn rejects_invalid_json() {
        let result = from_json_bytes::<BTreeMap<String, String>>(b"{\"token\": }");
        assert!(matches!(result, Err(SerializationError::Deserialize(_))));
    }
}
