//! CBOR codec backed by `ciborium`.

use crate::error::{CodecError, CodecResult};
use crate::Codec;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes values as CBOR.
#[derive(Debug, Clone, Copy, Default)]
pub struct CborCodec;

impl Codec for CborCodec {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(value, &mut bytes).map_err(CodecError::encoding)?;
        Ok(bytes)
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        ciborium::de::from_reader(bytes).map_err(CodecError::decoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Profile {
        name: String,
        visits: u32,
        tags: Vec<String>,
    }

    #[test]
    fn roundtrip_struct() {
        let profile = Profile {
            name: "ada".into(),
            visits: 3,
            tags: vec!["admin".into()],
        };
        let bytes = CborCodec.encode(&profile).unwrap();
        let decoded: Profile = CborCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, profile);
    }

    #[test]
    fn small_integer_is_one_byte() {
        assert_eq!(CborCodec.encode(&7u8).unwrap(), vec![0x07]);
    }

    #[test]
    fn decode_type_mismatch_fails() {
        let bytes = CborCodec.encode("text").unwrap();
        let result: CodecResult<u64> = CborCodec.decode(&bytes);
        assert!(matches!(result, Err(CodecError::DecodingFailed { .. })));
    }

    #[test]
    fn decode_truncated_input_fails() {
        let bytes = CborCodec.encode(&vec![1u64, 2, 3]).unwrap();
        let result: CodecResult<Vec<u64>> = CborCodec.decode(&bytes[..bytes.len() - 1]);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn maps_survive_encoding(map in proptest::collection::btree_map(".{0,8}", any::<i64>(), 0..16)) {
            let bytes = CborCodec.encode(&map).unwrap();
            let decoded: BTreeMap<String, i64> = CborCodec.decode(&bytes).unwrap();
            prop_assert_eq!(decoded, map);
        }
    }
}
