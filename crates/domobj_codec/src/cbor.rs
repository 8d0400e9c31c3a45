//! CBOR encoding helpers.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes any serializable value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut buffer = Vec::new();
    ciborium::ser::into_writer(value, &mut buffer)
        .map_err(|e| CodecError::encoding_failed(e.to_string()))?;
    Ok(buffer)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR
/// for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::de::from_reader(bytes).map_err(|e| CodecError::decoding_failed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObjectId, StorageKey, Value};
    use proptest::prelude::*;

    #[test]
    fn garbage_fails_to_decode() {
        let result: CodecResult<Value> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn object_id_values_survive_encoding() {
        let value = Value::ObjectId(ObjectId::new("Order", StorageKey::Text("o-1".into())));
        let bytes = to_cbor(&value).unwrap();
        assert_eq!(from_cbor::<Value>(&bytes).unwrap(), value);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            ".{0,16}".prop_map(Value::Text),
            prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
            any::<i64>().prop_map(|k| Value::ObjectId(ObjectId::new("C", StorageKey::Integer(k)))),
        ]
    }

    proptest! {
        #[test]
        fn values_decode_to_themselves(value in value_strategy()) {
            let bytes = to_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor::<Value>(&bytes).unwrap(), value);
        }
    }
}
