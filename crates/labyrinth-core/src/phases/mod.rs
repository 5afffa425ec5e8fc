//! Protocol phases.
//!
//! Each phase is a short sequence of server round-trips around pure key
//! derivations. Phases never retry and never mutate shared state other than
//! the epoch chain handed to them; epochs committed before a failure stay
//! committed.
//!
//! # Derivations
//!
//! ```text
//! (chaining key, distribution psk) = HKDF(root_N, info = "epoch_chaining_<N>_<epoch id>")
//! root_{N+1}                       = HKDF(entropy, salt = chaining key, info = "epoch_root_key")
//! entropy ciphertext               = PKE(aad = "epoch_<N+1>", psk = distribution psk)
//! ```

mod authenticate;
mod join_epoch;
mod open_first_epoch;
mod open_new_epoch;

use labyrinth_crypto::{KEY_LENGTH, kdf::kdf_key, kdf_two_keys, util::ascii_bytes};
use zeroize::Zeroizing;

pub use self::{
    authenticate::{
        authenticate_device_to_epoch, epoch_device_mac, register_device_in_epoch,
        verify_epoch_device_mac,
    },
    join_epoch::{JoiningIdentity, chain_forward},
    open_first_epoch::{FirstEpoch, open_first_epoch},
    open_new_epoch::open_new_epoch_based_on_current,
};
use crate::epoch::{Epoch, ROOT_KEY_LENGTH, SequenceId};

/// Length of distributed epoch entropy
pub const ENTROPY_LENGTH: usize = 32;

/// Keys binding a rotation to its predecessor epoch.
pub(crate) struct ChainingKeys {
    /// Salt for the next root key
    pub(crate) chaining_key: Zeroizing<Vec<u8>>,
    /// Pre-shared key for entropy distribution
    pub(crate) distribution_psk: Zeroizing<Vec<u8>>,
}

/// Derive the chaining key and distribution psk of `epoch`.
pub(crate) fn derive_chaining_keys(epoch: &Epoch) -> ChainingKeys {
    let info = format!("epoch_chaining_{}_{}", epoch.sequence_id(), epoch.id());

    let Ok((chaining_key, distribution_psk)) =
        kdf_two_keys(epoch.root_key(), None, &ascii_bytes(&info), KEY_LENGTH, KEY_LENGTH)
    else {
        unreachable!("64 bytes is within the HKDF-SHA256 output limit");
    };

    ChainingKeys {
        chaining_key: Zeroizing::new(chaining_key),
        distribution_psk: Zeroizing::new(distribution_psk),
    }
}

/// Root key of the epoch following the one `chaining_key` was derived from.
pub(crate) fn derive_root_key(entropy: &[u8], chaining_key: &[u8]) -> [u8; ROOT_KEY_LENGTH] {
    kdf_key(entropy, Some(chaining_key), b"epoch_root_key")
}

/// AAD binding distributed entropy to the epoch it opens.
pub(crate) fn entropy_aad(sequence_id: SequenceId) -> Vec<u8> {
    ascii_bytes(&format!("epoch_{sequence_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chaining_keys_depend_on_epoch_id() {
        let a = derive_chaining_keys(&Epoch::new("epoch-1", SequenceId::new(3), [1; 32]));
        let b = derive_chaining_keys(&Epoch::new("epoch-2", SequenceId::new(3), [1; 32]));

        assert_ne!(*a.chaining_key, *b.chaining_key);
        assert_ne!(*a.distribution_psk, *b.distribution_psk);
    }

    #[test]
    fn chaining_key_and_psk_differ() {
        let keys = derive_chaining_keys(&Epoch::new("epoch-1", SequenceId::GENESIS, [9; 32]));

        assert_eq!(keys.chaining_key.len(), KEY_LENGTH);
        assert_eq!(keys.distribution_psk.len(), KEY_LENGTH);
        assert_ne!(*keys.chaining_key, *keys.distribution_psk);
    }

    #[test]
    fn root_key_is_salted_by_chaining_key() {
        let entropy = [5u8; ENTROPY_LENGTH];
        assert_ne!(derive_root_key(&entropy, &[1; 32]), derive_root_key(&entropy, &[2; 32]));
    }

    #[test]
    fn entropy_aad_names_epoch() {
        assert_eq!(entropy_aad(SequenceId::new(12)), b"epoch_12");
    }
}
