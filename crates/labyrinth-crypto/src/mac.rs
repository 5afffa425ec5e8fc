//! Message authentication using HMAC-SHA256

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC output size in bytes
pub const MAC_LENGTH: usize = 32;

/// Compute `HMAC-SHA256(key, data)`.
pub fn mac(data: &[u8], key: &[u8]) -> [u8; MAC_LENGTH] {
    let Ok(mut hmac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    hmac.update(data);

    let mut tag = [0u8; MAC_LENGTH];
    tag.copy_from_slice(&hmac.finalize().into_bytes());
    tag
}

/// Check `tag` against `HMAC-SHA256(key, data)` in constant time.
pub fn verify_mac(data: &[u8], key: &[u8], tag: &[u8]) -> bool {
    let Ok(mut hmac) = HmacSha256::new_from_slice(key) else {
        unreachable!("HMAC-SHA256 accepts any key size");
    };
    hmac.update(data);
    hmac.verify_slice(tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_message_same_mac() {
        let key = [0x11u8; 32];
        assert_eq!(mac(b"Example of a message", &key), mac(b"Example of a message", &key));
    }

    #[test]
    fn different_message_different_mac() {
        let key = [0x11u8; 32];
        assert_ne!(mac(b"Example of a message", &key), mac(b"Same length message ", &key));
    }

    #[test]
    fn different_key_different_mac() {
        assert_ne!(mac(b"data", &[0x01; 32]), mac(b"data", &[0x02; 32]));
    }

    #[test]
    fn verify_accepts_own_tag() {
        let tag = mac(b"data", b"key");
        assert!(verify_mac(b"data", b"key", &tag));
    }

    #[test]
    fn verify_rejects_modified_tag() {
        let mut tag = mac(b"data", b"key");
        tag[0] ^= 0x01;
        assert!(!verify_mac(b"data", b"key", &tag));
        assert!(!verify_mac(b"data", b"key", &tag[..16]));
    }

    #[test]
    fn rfc4231_test_case_2() {
        let tag = mac(b"what do ya want for nothing?", b"Jefe");
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
