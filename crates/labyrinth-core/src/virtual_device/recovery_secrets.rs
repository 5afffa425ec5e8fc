//! Escrow of the virtual device's secrets under the recovery-derived key.
//!
//! Four fields, each sealed independently with AES-256-GCM under the same
//! key, a fresh random nonce and a field-specific aad:
//!
//! | Field                     | AAD                                         |
//! |---------------------------|---------------------------------------------|
//! | epoch sequence id (ASCII) | `virtual_device:epoch_anon_id`              |
//! | epoch root key            | `virtual_device:epoch_root_key`             |
//! | device key (encoded)      | `virtual_device:virtual_device_private_key` |
//! | epoch storage key (enc.)  | `virtual_device:epoch_storage_key_priv`     |
//!
//! The aads keep a ciphertext from being swapped into another field.

use labyrinth_crypto::{CryptoError, aead, util::ascii_bytes};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{
    codec::BytesCodec,
    env::Environment,
    epoch::{ROOT_KEY_LENGTH, SequenceId},
    error::{CodecError, LabyrinthError, RecoveryError},
    key_bundle::{CommonPrivateKeyBundle, CommonPublicKeyBundle, VirtualDeviceKeyBundle},
};

const EPOCH_SEQUENCE_ID_AAD: &str = "virtual_device:epoch_anon_id";
const EPOCH_ROOT_KEY_AAD: &str = "virtual_device:epoch_root_key";
const DEVICE_KEY_AAD: &str = "virtual_device:virtual_device_private_key";
const EPOCH_STORAGE_KEY_AAD: &str = "virtual_device:epoch_storage_key_priv";

/// Sealed virtual device secrets as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedRecoverySecrets {
    /// Sealed decimal sequence id
    pub encrypted_epoch_sequence_id: Vec<u8>,
    /// Sealed root key
    pub encrypted_epoch_root_key: Vec<u8>,
    /// Sealed epoch storage private key
    pub encrypted_epoch_storage_key_priv: Vec<u8>,
    /// Sealed device private key
    pub encrypted_device_key_priv: Vec<u8>,
}

/// Plaintext recovered from the escrow.
pub struct RecoveredSecrets {
    /// Virtual device keys, checked against the server's public bundle
    pub key_bundle: VirtualDeviceKeyBundle,
    /// Sequence id of the escrowed epoch
    pub sequence_id: SequenceId,
    /// Root key of the escrowed epoch
    pub root_key: Zeroizing<[u8; ROOT_KEY_LENGTH]>,
}

impl EncryptedRecoverySecrets {
    /// Seal the virtual device's private keys and one epoch.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength`: `decryption_key` is not an AES-256 key
    pub fn encrypt(
        decryption_key: &[u8],
        sequence_id: SequenceId,
        root_key: &[u8; ROOT_KEY_LENGTH],
        private: &CommonPrivateKeyBundle,
        codec: &impl BytesCodec,
        env: &impl Environment,
    ) -> Result<Self, CryptoError> {
        let seal = |aad: &str, plaintext: &[u8]| {
            aead::encrypt(decryption_key, &env.random_array(), &ascii_bytes(aad), plaintext)
        };

        let device_key = Zeroizing::new(codec.encode_private_key(&private.device_key));
        let epoch_storage_key = Zeroizing::new(codec.encode_private_key(&private.epoch_storage_key));

        Ok(Self {
            encrypted_epoch_sequence_id: seal(
                EPOCH_SEQUENCE_ID_AAD,
                &ascii_bytes(&sequence_id.to_string()),
            )?,
            encrypted_epoch_root_key: seal(EPOCH_ROOT_KEY_AAD, root_key)?,
            encrypted_device_key_priv: seal(DEVICE_KEY_AAD, device_key.as_bytes())?,
            encrypted_epoch_storage_key_priv: seal(
                EPOCH_STORAGE_KEY_AAD,
                epoch_storage_key.as_bytes(),
            )?,
        })
    }

    /// Open the escrow and check it against the public bundle the server
    /// vouches for.
    ///
    /// # Errors
    ///
    /// - `Crypto(DecryptionFailed)`: wrong key or tampered field
    /// - `Recovery(CorruptedRecoverySecrets)`: plaintext is malformed, or
    ///   the reconstructed public bundle differs from `expected`
    pub fn decrypt(
        &self,
        decryption_key: &[u8],
        expected: &CommonPublicKeyBundle,
        codec: &impl BytesCodec,
    ) -> Result<RecoveredSecrets, LabyrinthError> {
        let open = |aad: &str, ciphertext: &[u8]| {
            aead::decrypt(decryption_key, &ascii_bytes(aad), ciphertext).map(Zeroizing::new)
        };
        let corrupted = || LabyrinthError::from(RecoveryError::CorruptedRecoverySecrets);

        let sequence_id = open(EPOCH_SEQUENCE_ID_AAD, &self.encrypted_epoch_sequence_id)?;
        let sequence_id: SequenceId = std::str::from_utf8(&sequence_id)
            .map_err(|_| corrupted())?
            .parse()
            .map_err(|_| corrupted())?;

        let root_key = open(EPOCH_ROOT_KEY_AAD, &self.encrypted_epoch_root_key)?;
        let root_key: [u8; ROOT_KEY_LENGTH] =
            root_key.as_slice().try_into().map_err(|_| corrupted())?;

        let decode_key = |plaintext: &[u8]| {
            std::str::from_utf8(plaintext)
                .ok()
                .and_then(|encoded| codec.decode_private_key(encoded).ok())
                .ok_or_else(corrupted)
        };
        let device_key = decode_key(&open(DEVICE_KEY_AAD, &self.encrypted_device_key_priv)?)?;
        let epoch_storage_key =
            decode_key(&open(EPOCH_STORAGE_KEY_AAD, &self.encrypted_epoch_storage_key_priv)?)?;

        let key_bundle =
            VirtualDeviceKeyBundle::from_private(CommonPrivateKeyBundle { device_key, epoch_storage_key });

        // Device key, storage key signature and storage key must all match
        if &key_bundle.public != expected {
            return Err(corrupted());
        }

        Ok(RecoveredSecrets { key_bundle, sequence_id, root_key: Zeroizing::new(root_key) })
    }

    /// Wire form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> EncryptedRecoverySecretsSerialized {
        EncryptedRecoverySecretsSerialized {
            encrypted_epoch_sequence_id: codec.encode(&self.encrypted_epoch_sequence_id),
            encrypted_epoch_root_key: codec.encode(&self.encrypted_epoch_root_key),
            encrypted_epoch_storage_key_priv: codec.encode(&self.encrypted_epoch_storage_key_priv),
            encrypted_device_key_priv: codec.encode(&self.encrypted_device_key_priv),
        }
    }

    /// Parse the wire form.
    pub fn deserialize(
        serialized: &EncryptedRecoverySecretsSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            encrypted_epoch_sequence_id: codec.decode(&serialized.encrypted_epoch_sequence_id)?,
            encrypted_epoch_root_key: codec.decode(&serialized.encrypted_epoch_root_key)?,
            encrypted_epoch_storage_key_priv: codec
                .decode(&serialized.encrypted_epoch_storage_key_priv)?,
            encrypted_device_key_priv: codec.decode(&serialized.encrypted_device_key_priv)?,
        })
    }
}

/// Wire form of [`EncryptedRecoverySecrets`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecoverySecretsSerialized {
    /// Encoded sealed sequence id
    pub encrypted_epoch_sequence_id: String,
    /// Encoded sealed root key
    pub encrypted_epoch_root_key: String,
    /// Encoded sealed epoch storage key
    pub encrypted_epoch_storage_key_priv: String,
    /// Encoded sealed device key
    pub encrypted_device_key_priv: String,
}
