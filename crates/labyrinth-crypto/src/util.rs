//! Byte helpers shared by the protocol layers

/// Latin-1 bytes of a protocol label.
///
/// Labels and decimal sequence ids are ASCII, so this is the UTF-8 encoding
/// for every string the protocol feeds into a KDF or AEAD.
pub fn ascii_bytes(label: &str) -> Vec<u8> {
    label.as_bytes().to_vec()
}

/// Concatenate byte slices into one buffer.
pub fn concat(parts: &[&[u8]]) -> Vec<u8> {
    let total = parts.iter().map(|part| part.len()).sum();
    let mut out = Vec::with_capacity(total);
    for part in parts {
        out.extend_from_slice(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_preserves_order() {
        assert_eq!(concat(&[b"ab", b"", b"c"]), b"abc");
    }

    #[test]
    fn concat_of_nothing_is_empty() {
        assert!(concat(&[]).is_empty());
    }

    #[test]
    fn ascii_label_bytes() {
        assert_eq!(ascii_bytes("epoch_7"), b"epoch_7");
    }
}
