//! Virtual device and recovery code.
//!
//! The virtual device is a permanent member of every epoch that exists only
//! as escrowed secrets. Its id and escrow key are derived from the recovery
//! code, so whoever holds the code can rebuild it on a fresh device:
//!
//! ```text
//! recovery code ──HKDF(info = "BackupRecoveryCode_v<ver>_<ident>_<user>")──► 48 bytes
//!                                                                    ├─ [0..16)  virtual device id
//!                                                                    └─ [16..48) escrow key
//! ```
//!
//! # Recovery Code Layout
//!
//! 40 ASCII characters: version, identifier, 34 entropy characters from a
//! 32-symbol alphabet, then 4 reserved error-correction characters. The KDF
//! input is characters `[3, 37)`, which is what deployed codes were
//! derived from.

mod recovery_secrets;

use std::fmt;

use labyrinth_crypto::{kdf_two_keys, util::ascii_bytes};
use tracing::{debug, info};
use zeroize::Zeroizing;

pub use self::recovery_secrets::{
    EncryptedRecoverySecrets, EncryptedRecoverySecretsSerialized, RecoveredSecrets,
};
use crate::{
    codec::BytesCodec,
    env::Environment,
    epoch::Epoch,
    error::{LabyrinthError, RecoveryError},
    key_bundle::{CommonPublicKeyBundle, VirtualDeviceKeyBundle},
    server::{GetVirtualDeviceRecoverySecretsBody, LabyrinthServerClient},
};

/// Length of a recovery code in characters
pub const RECOVERY_CODE_LENGTH: usize = 40;

/// Length of the virtual device id in bytes
pub const VIRTUAL_DEVICE_ID_LENGTH: usize = 16;

/// Length of the escrow key in bytes
pub const DECRYPTION_KEY_LENGTH: usize = 32;

const VERSION_NUMBER: char = '1';
const IDENTIFIER: char = '0';
const ENTROPY_LENGTH: usize = 34;
const ERROR_CORRECTION_PLACEHOLDER: &str = "XXXX";
const ALPHABET: &[u8; 32] = b"ACDEFHJKLMNPQRSTUVWXYZ0123456789";
const KDF_INPUT_START: usize = 3;
const KDF_INPUT_END: usize = 37;

/// Human-transcribable secret that rebuilds the virtual device.
#[derive(Clone)]
pub struct RecoveryCode(Zeroizing<String>);

impl RecoveryCode {
    /// Generate a fresh code.
    pub fn generate(env: &impl Environment) -> Self {
        let entropy: Zeroizing<[u8; ENTROPY_LENGTH]> = Zeroizing::new(env.random_array());

        let mut code = String::with_capacity(RECOVERY_CODE_LENGTH);
        code.push(VERSION_NUMBER);
        code.push(IDENTIFIER);
        code.extend(entropy.iter().map(|byte| ALPHABET[usize::from(*byte) % ALPHABET.len()] as char));
        // TODO: replace the placeholder with a real error-correction code
        code.push_str(ERROR_CORRECTION_PLACEHOLDER);

        debug_assert_eq!(code.len(), RECOVERY_CODE_LENGTH);
        Self(Zeroizing::new(code))
    }

    /// Accept user input as a recovery code.
    ///
    /// # Errors
    ///
    /// - `InvalidRecoveryCodeFormat`: not 40 ASCII characters
    pub fn parse(code: &str) -> Result<Self, RecoveryError> {
        if code.chars().count() != RECOVERY_CODE_LENGTH {
            return Err(RecoveryError::InvalidRecoveryCodeFormat {
                reason: "recovery code has to be 40 characters long",
            });
        }
        if !code.is_ascii() {
            return Err(RecoveryError::InvalidRecoveryCodeFormat {
                reason: "recovery code may only contain ASCII characters",
            });
        }
        Ok(Self(Zeroizing::new(code.to_owned())))
    }

    /// The code as shown to the user.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the virtual device id and escrow key for `user_id`.
    pub fn derive_secrets(&self, user_id: &str) -> VirtualDeviceSecrets {
        let code = self.0.as_bytes();
        let ikm = &code[KDF_INPUT_START..KDF_INPUT_END];
        let info = format!("BackupRecoveryCode_v{}_{}_{user_id}", code[0] as char, code[1] as char);

        let Ok((id, decryption_key)) = kdf_two_keys(
            ikm,
            None,
            &ascii_bytes(&info),
            VIRTUAL_DEVICE_ID_LENGTH,
            DECRYPTION_KEY_LENGTH,
        ) else {
            unreachable!("48 bytes is within the HKDF-SHA256 output limit");
        };
        let decryption_key = Zeroizing::new(decryption_key);

        let Ok(id) = <[u8; VIRTUAL_DEVICE_ID_LENGTH]>::try_from(id.as_slice()) else {
            unreachable!("kdf_two_keys returns the requested lengths");
        };
        let Ok(decryption_key) = <[u8; DECRYPTION_KEY_LENGTH]>::try_from(decryption_key.as_slice())
        else {
            unreachable!("kdf_two_keys returns the requested lengths");
        };

        VirtualDeviceSecrets { id, decryption_key: Zeroizing::new(decryption_key) }
    }
}

impl fmt::Debug for RecoveryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecoveryCode(..)")
    }
}

/// Identity and escrow key derived from a recovery code.
pub struct VirtualDeviceSecrets {
    /// Virtual device id, known to the server
    pub id: [u8; VIRTUAL_DEVICE_ID_LENGTH],
    /// Escrow key, never leaves the client
    pub decryption_key: Zeroizing<[u8; DECRYPTION_KEY_LENGTH]>,
}

/// A freshly created virtual device with its recovery material.
pub struct InitializedVirtualDevice {
    /// The virtual device
    pub virtual_device: VirtualDevice,
    /// Escrow key derived from `recovery_code`
    pub decryption_key: Zeroizing<[u8; DECRYPTION_KEY_LENGTH]>,
    /// Code to hand to the user
    pub recovery_code: RecoveryCode,
}

/// Recovery-code-derived principal that receives every epoch.
#[derive(Debug, Clone)]
pub struct VirtualDevice {
    id: [u8; VIRTUAL_DEVICE_ID_LENGTH],
    key_bundle: VirtualDeviceKeyBundle,
}

impl VirtualDevice {
    /// Create a virtual device with a fresh recovery code and fresh keys.
    pub fn initialize(user_id: &str, env: &impl Environment) -> InitializedVirtualDevice {
        let recovery_code = RecoveryCode::generate(env);
        let VirtualDeviceSecrets { id, decryption_key } = recovery_code.derive_secrets(user_id);
        let key_bundle = VirtualDeviceKeyBundle::generate(env);

        InitializedVirtualDevice {
            virtual_device: Self { id, key_bundle },
            decryption_key,
            recovery_code,
        }
    }

    /// Rebuild the virtual device from its recovery code.
    ///
    /// Returns the virtual device and the escrowed (genesis) epoch. Newer
    /// epochs are obtained by chaining forward as the virtual device.
    ///
    /// # Errors
    ///
    /// - `Recovery(InvalidRecoveryCodeFormat)`: malformed code
    /// - `Crypto(DecryptionFailed)`: escrow does not open under the code
    /// - `Recovery(CorruptedRecoverySecrets)`: escrow disagrees with the
    ///   virtual device the server vouches for
    pub async fn from_recovery_code(
        user_id: &str,
        recovery_code: &str,
        client: &impl LabyrinthServerClient,
        codec: &impl BytesCodec,
    ) -> Result<(Self, Epoch), LabyrinthError> {
        let VirtualDeviceSecrets { id, decryption_key } =
            RecoveryCode::parse(recovery_code)?.derive_secrets(user_id);

        let response = client
            .get_virtual_device_recovery_secrets(GetVirtualDeviceRecoverySecretsBody {
                virtual_device_id: codec.encode(&id),
            })
            .await?;

        let sealed = EncryptedRecoverySecrets::deserialize(
            &response.virtual_device_encrypted_recovery_secrets,
            codec,
        )?;
        let expected = CommonPublicKeyBundle::deserialize(
            &response.expected_virtual_device_public_key_bundle,
            codec,
        )?;
        let RecoveredSecrets { key_bundle, sequence_id, root_key } =
            sealed.decrypt(decryption_key.as_slice(), &expected, codec)?;

        debug!(epoch_id = %response.epoch_id, %sequence_id, "virtual device escrow opened");
        info!("virtual device recovered");

        Ok((Self { id, key_bundle }, Epoch::new(response.epoch_id, sequence_id, *root_key)))
    }

    /// Derived 16-byte id.
    pub fn id(&self) -> &[u8; VIRTUAL_DEVICE_ID_LENGTH] {
        &self.id
    }

    /// Keys of the virtual device.
    pub fn key_bundle(&self) -> &VirtualDeviceKeyBundle {
        &self.key_bundle
    }
}
