use serde_json::Value;
use thiserror::Error;

/// Per-entry decode failure. Non-fatal everywhere: callers log the entry
/// and skip it, so one malformed record never takes down a whole decode.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    #[error("field '{0}' has an unexpected type")]
    BadType(&'static str),
}

/// Coerces an identifier field to a string. On-chain addresses arrive
/// either as a plain string or wrapped as `{ "id": "0x..." }`.
pub(crate) fn id_string(value: Option<&Value>, name: &'static str) -> Result<String, DecodeError> {
    match value {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Object(map)) => map
            .get("id")
            .and_then(|id| id.as_str())
            .map(str::to_owned)
            .ok_or(DecodeError::BadType(name)),
        Some(_) => Err(DecodeError::BadType(name)),
    }
}

/// Coerces a numeric field to u64. The fullnode encodes u64 values as
/// decimal strings in move object content, but plain numbers also occur.
pub(crate) fn u64_field(value: Option<&Value>, name: &'static str) -> Result<u64, DecodeError> {
    match value {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::Number(n)) => n.as_u64().ok_or(DecodeError::BadType(name)),
        Some(Value::String(s)) => s.parse().map_err(|_| DecodeError::BadType(name)),
        Some(_) => Err(DecodeError::BadType(name)),
    }
}

/// Normalizes a Move `vector<u8>` text field: either already a string, or
/// an array of byte values mapped one byte per character.
pub(crate) fn byte_string(value: Option<&Value>, name: &'static str) -> Result<String, DecodeError> {
    match value {
        None | Some(Value::Null) => Err(DecodeError::MissingField(name)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Array(bytes)) => {
            let mut out = String::with_capacity(bytes.len());
            for byte in bytes {
                let byte = byte
                    .as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .ok_or(DecodeError::BadType(name))?;
                out.push(byte as u8 as char);
            }
            Ok(out)
        }
        Some(_) => Err(DecodeError::BadType(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_string_plain_and_wrapped() {
        assert_eq!(id_string(Some(&json!("0xabc")), "id").unwrap(), "0xabc");
        assert_eq!(
            id_string(Some(&json!({ "id": "0xabc" })), "id").unwrap(),
            "0xabc"
        );
        assert_eq!(id_string(None, "id"), Err(DecodeError::MissingField("id")));
        assert_eq!(
            id_string(Some(&json!(7)), "id"),
            Err(DecodeError::BadType("id"))
        );
        assert_eq!(
            id_string(Some(&json!({ "other": 1 })), "id"),
            Err(DecodeError::BadType("id"))
        );
    }

    #[test]
    fn test_u64_field_string_or_number() {
        assert_eq!(u64_field(Some(&json!("1700000000000")), "ts").unwrap(), 1_700_000_000_000);
        assert_eq!(u64_field(Some(&json!(42)), "ts").unwrap(), 42);
        assert_eq!(
            u64_field(Some(&json!("not a number")), "ts"),
            Err(DecodeError::BadType("ts"))
        );
        assert_eq!(u64_field(None, "ts"), Err(DecodeError::MissingField("ts")));
    }

    #[test]
    fn test_byte_string_from_byte_array() {
        assert_eq!(
            byte_string(Some(&json!([85, 83, 68, 67])), "coin_type").unwrap(),
            "USDC"
        );
        assert_eq!(
            byte_string(Some(&json!("0x2::sui::SUI")), "coin_type").unwrap(),
            "0x2::sui::SUI"
        );
        assert_eq!(
            byte_string(Some(&json!([85, 300])), "coin_type"),
            Err(DecodeError::BadType("coin_type"))
        );
    }
}
