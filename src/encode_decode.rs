//!
//! Contains wrappers around the logic to encode and decode lookup-table snapshots into bytes,
//! abstracting away the format.
//!

#[cfg(not(any(feature = "bincode", feature = "msgpack")))]
compile_error!("census_store needs at least one of the `bincode` or `msgpack` features");

/// Wraps an interface to an encode / decode format
///
/// NOTE: It's unlikely you will want to implement this trait.  Instead use one of the existing
/// implementations: [BincodeCoder](crate::BincodeCoder) and [MsgPackCoder](crate::MsgPackCoder),
/// or use [DefaultCoder](crate::DefaultCoder)
///
/// NOTE: Record stores don't go through a Coder.  Their layout is fixed by the
/// [RecordSchema](crate::RecordSchema), because a record's byte length must not depend on its values.
pub trait Coder: Clone + Send + Sync + 'static {

    /// Create a new coder
    fn new() -> Self;

    /// Encodes an arbitrary structure to bytes
    fn encode_to_buf<T: serde::ser::Serialize>(&self, obj: &T) -> Result<Vec<u8>, String>;

    /// Decodes an arbitrary structure from bytes
    fn decode_from_bytes<T: serde::de::DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String>;
}

#[cfg(feature = "bincode")]
pub(crate) mod bincode_interface {
    use super::*;
    use bincode::Options;
    use bincode::config::*;

    #[derive(Clone)]
    pub struct BincodeCoder {
        varint_coder: WithOtherEndian<WithOtherIntEncoding<DefaultOptions, VarintEncoding>, LittleEndian>,
    }

    impl Coder for BincodeCoder {

        fn new() -> Self {
            Self {
                varint_coder: bincode::DefaultOptions::new().with_varint_encoding().with_little_endian(),
            }
        }
        fn encode_to_buf<T: serde::ser::Serialize>(&self, obj: &T) -> Result<Vec<u8>, String> {
            self.varint_coder.serialize(obj).map_err(|e| format!("Encode error: {e}"))
        }
        fn decode_from_bytes<T: serde::de::DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
            self.varint_coder.deserialize(bytes).map_err(|e| format!("Decode error: {e}"))
        }
    }
}

#[cfg(feature = "msgpack")]
pub(crate) mod msgpack_interface {
    use super::*;

    #[derive(Clone)]
    pub struct MsgPackCoder;

    impl Coder for MsgPackCoder {
        fn new() -> Self {
            Self
        }
        fn encode_to_buf<T: serde::ser::Serialize>(&self, obj: &T) -> Result<Vec<u8>, String> {
            rmp_serde::encode::to_vec(obj).map_err(|e| format!("Encode error: {e}"))
        }
        fn decode_from_bytes<T: serde::de::DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
            rmp_serde::decode::from_slice(bytes).map_err(|e| format!("Decode error: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn roundtrip<C : Coder>() {
        let coder = C::new();
        let mut map = HashMap::new();
        map.insert("E01000001".to_string(), 7u32);
        let bytes = coder.encode_to_buf(&(vec![Some(3u32), None], map.clone())).unwrap();
        let decoded : (Vec<Option<u32>>, HashMap<String, u32>) = coder.decode_from_bytes(&bytes).unwrap();
        assert_eq!(decoded, (vec![Some(3), None], map));
        assert!(coder.decode_from_bytes::<(Vec<Option<u32>>, HashMap<String, u32>)>(&bytes[..bytes.len() - 1]).is_err());
    }

    #[cfg(feature = "bincode")]
    #[test]
    fn test_bincode_coder() {
        roundtrip::<crate::BincodeCoder>();
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_coder() {
        roundtrip::<crate::MsgPackCoder>();
    }
}
