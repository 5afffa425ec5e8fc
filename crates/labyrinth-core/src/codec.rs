//! Byte <-> string codec used at every serialization boundary.
//!
//! Keys, MACs, ciphertexts and root keys travel as strings both on the wire
//! and in persisted sessions. The codec is an explicit value handed to each
//! boundary call rather than process-wide state, so an unconfigured codec is
//! unrepresentable.

use base64::{Engine, engine::general_purpose::STANDARD};
use labyrinth_crypto::{PrivateKey, PublicKey};

use crate::error::CodecError;

/// Round-trip-exact conversion between bytes and text.
pub trait BytesCodec: Send + Sync {
    /// Encode bytes as text.
    fn encode(&self, bytes: &[u8]) -> String;

    /// Decode text produced by [`encode`](Self::encode).
    fn decode(&self, encoded: &str) -> Result<Vec<u8>, CodecError>;

    /// Decode a fixed-size field.
    fn decode_array<const N: usize>(&self, encoded: &str) -> Result<[u8; N], CodecError> {
        let bytes = self.decode(encoded)?;
        <[u8; N]>::try_from(bytes.as_slice())
            .map_err(|_| CodecError::InvalidLength { expected: N, actual: bytes.len() })
    }

    /// Decode a public key.
    fn decode_public_key(&self, encoded: &str) -> Result<PublicKey, CodecError> {
        Ok(PublicKey::from_bytes(&self.decode(encoded)?)?)
    }

    /// Decode a private key. For persistence and escrow only.
    fn decode_private_key(&self, encoded: &str) -> Result<PrivateKey, CodecError> {
        let bytes = zeroize::Zeroizing::new(self.decode(encoded)?);
        Ok(PrivateKey::from_bytes(&bytes)?)
    }

    /// Encode a private key. For persistence and escrow only.
    fn encode_private_key(&self, key: &PrivateKey) -> String {
        self.encode(key.to_bytes().as_slice())
    }
}

/// Standard padded base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl BytesCodec for Base64Codec {
    fn encode(&self, bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    fn decode(&self, encoded: &str) -> Result<Vec<u8>, CodecError> {
        STANDARD
            .decode(encoded)
            .map_err(|err| CodecError::InvalidEncoding { reason: err.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use labyrinth_crypto::CryptoError;

    use super::*;

    #[test]
    fn base64_roundtrip() {
        let codec = Base64Codec;
        let bytes = [0u8, 1, 2, 253, 254, 255];
        assert_eq!(codec.decode(&codec.encode(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn empty_input_roundtrips() {
        let codec = Base64Codec;
        assert_eq!(codec.encode(&[]), "");
        assert!(codec.decode("").unwrap().is_empty());
    }

    #[test]
    fn invalid_text_is_rejected() {
        assert!(matches!(Base64Codec.decode("not*base64"), Err(CodecError::InvalidEncoding { .. })));
    }

    #[test]
    fn fixed_size_field_checks_length() {
        let codec = Base64Codec;
        let encoded = codec.encode(&[7u8; 31]);

        assert_eq!(
            codec.decode_array::<32>(&encoded),
            Err(CodecError::InvalidLength { expected: 32, actual: 31 })
        );
        assert_eq!(codec.decode_array::<31>(&encoded).unwrap(), [7u8; 31]);
    }

    #[test]
    fn keys_roundtrip() {
        let codec = Base64Codec;
        let private = PrivateKey::from_seed(&[9; 32]);

        let restored = codec.decode_private_key(&codec.encode_private_key(&private)).unwrap();
        let public = codec.decode_public_key(&codec.encode(private.public_key().as_bytes())).unwrap();

        assert_eq!(restored.public_key(), private.public_key());
        assert_eq!(public, private.public_key());
    }

    #[test]
    fn short_public_key_is_rejected() {
        let codec = Base64Codec;
        assert_eq!(
            codec.decode_public_key(&codec.encode(&[1; 16])),
            Err(CodecError::InvalidKey(CryptoError::InvalidKeyLength { expected: 32, actual: 16 }))
        );
    }
}
