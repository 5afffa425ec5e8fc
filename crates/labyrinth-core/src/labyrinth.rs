//! Lifecycle facade: initialize, recover, resume, and per-message keys.
//!
//! A [`Labyrinth`] owns this device and its epoch chain. Every constructor
//! leaves it caught up with the server's newest epoch; every resume path
//! (recovery and deserialization) then reports activity and rotates the
//! epoch when the server says some device has gone quiet for too long.
//!
//! Calls on one instance must be serialized by the caller.

use labyrinth_crypto::{aead, kdf::kdf_key, util::ascii_bytes};
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use crate::{
    codec::BytesCodec,
    device::{Device, DeviceSerialized},
    env::Environment,
    epoch::{Epoch, EpochChain, EpochChainSerialized, SequenceId},
    error::{EpochChainError, LabyrinthError},
    key_bundle::DeviceKeyBundle,
    phases::{
        FirstEpoch, JoiningIdentity, authenticate_device_to_epoch, chain_forward,
        open_first_epoch, open_new_epoch_based_on_current, register_device_in_epoch,
    },
    server::LabyrinthServerClient,
    virtual_device::{InitializedVirtualDevice, RecoveryCode, VirtualDevice},
};

/// Version tag mixed into every message key.
const CIPHER_VERSION: u32 = 1;

/// Ready-state Labyrinth session for one device.
#[derive(Debug)]
pub struct Labyrinth<E: Environment, C: BytesCodec> {
    device: Device,
    epoch_chain: EpochChain,
    env: E,
    codec: C,
}

impl<E: Environment, C: BytesCodec> Labyrinth<E, C> {
    /// Whether the account already has a genesis epoch.
    ///
    /// Decides between [`initialize`](Self::initialize) and
    /// [`from_recovery_code`](Self::from_recovery_code) for a fresh device.
    pub async fn check_if_labyrinth_is_initialized(
        client: &impl LabyrinthServerClient,
    ) -> Result<bool, LabyrinthError> {
        Ok(client.check_if_labyrinth_is_initialized().await?.is_initialized)
    }

    /// Create the account: virtual device, recovery code and genesis epoch.
    ///
    /// The returned recovery code is the only way to recover the account
    /// without a device and must be shown to the user.
    pub async fn initialize(
        user_id: &str,
        client: &impl LabyrinthServerClient,
        env: E,
        codec: C,
    ) -> Result<(Self, RecoveryCode), LabyrinthError> {
        let InitializedVirtualDevice { virtual_device, decryption_key, recovery_code } =
            VirtualDevice::initialize(user_id, &env);

        let FirstEpoch { device, epoch } = open_first_epoch(
            DeviceKeyBundle::generate(&env),
            &virtual_device,
            decryption_key.as_slice(),
            client,
            &codec,
            &env,
        )
        .await?;

        let mut epoch_chain = EpochChain::new();
        epoch_chain.add(epoch)?;

        info!(device_id = device.id(), "labyrinth initialized");
        Ok((Self { device, epoch_chain, env, codec }, recovery_code))
    }

    /// Join the account as a new device using the recovery code.
    ///
    /// # Errors
    ///
    /// - `Recovery(InvalidRecoveryCodeFormat)`: code is not 40 ASCII characters
    /// - `Transport(NotFound)`: no virtual device for this code and user
    /// - `Crypto(DecryptionFailed)`: escrow does not open under this code
    /// - `Recovery(CorruptedRecoverySecrets)`: escrow contradicts the server's
    ///   virtual device
    pub async fn from_recovery_code(
        user_id: &str,
        recovery_code: &str,
        client: &impl LabyrinthServerClient,
        env: E,
        codec: C,
    ) -> Result<Self, LabyrinthError> {
        let (virtual_device, escrowed_epoch) =
            VirtualDevice::from_recovery_code(user_id, recovery_code, client, &codec).await?;

        let mut epoch_chain = EpochChain::new();
        epoch_chain.add(escrowed_epoch)?;
        chain_forward(JoiningIdentity::VirtualDevice(&virtual_device), &mut epoch_chain, client, &codec)
            .await?;

        let device = register_device_in_epoch(
            DeviceKeyBundle::generate(&env),
            epoch_chain.get_newest()?,
            client,
            &codec,
        )
        .await?;

        info!(
            device_id = device.id(),
            sequence_id = %epoch_chain.get_newest()?.sequence_id(),
            "labyrinth recovered"
        );

        let mut labyrinth = Self { device, epoch_chain, env, codec };
        labyrinth.after_resume(client).await?;
        Ok(labyrinth)
    }

    /// Resume a persisted session and catch up with the server.
    ///
    /// The device authenticates to the newest epoch only if it joined new
    /// epochs during this call.
    pub async fn deserialize(
        serialized: &LabyrinthSerialized,
        client: &impl LabyrinthServerClient,
        env: E,
        codec: C,
    ) -> Result<Self, LabyrinthError> {
        let device = Device::deserialize(&serialized.this_device, &codec)?;
        let mut epoch_chain = EpochChain::deserialize(&serialized.epoch_chain, &codec)?;

        let persisted_newest = epoch_chain.get_newest()?.sequence_id();
        chain_forward(JoiningIdentity::Device(&device), &mut epoch_chain, client, &codec).await?;

        let newest = epoch_chain.get_newest()?;
        if newest.sequence_id() > persisted_newest {
            authenticate_device_to_epoch(&device, newest, client, &codec).await?;
        }

        info!(
            device_id = device.id(),
            from = %persisted_newest,
            to = %newest.sequence_id(),
            "labyrinth resumed"
        );

        let mut labyrinth = Self { device, epoch_chain, env, codec };
        labyrinth.after_resume(client).await?;
        Ok(labyrinth)
    }

    /// Persisted form of this session.
    pub fn serialize(&self) -> LabyrinthSerialized {
        LabyrinthSerialized {
            this_device: self.device.serialize(&self.codec),
            epoch_chain: self.epoch_chain.serialize(&self.codec),
        }
    }

    /// Encrypt `plaintext` for `thread_id` under the key of epoch
    /// `epoch_sequence_id`.
    ///
    /// Returns `nonce ‖ ciphertext ‖ tag` with a fresh random nonce.
    ///
    /// # Errors
    ///
    /// - `EpochChain(EpochDoesNotExist)`: epoch is not held by this device
    pub fn encrypt(
        &self,
        thread_id: &str,
        epoch_sequence_id: SequenceId,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, LabyrinthError> {
        let epoch = self.epoch_chain.get_epoch(epoch_sequence_id)?;
        let key = message_key(epoch, thread_id);
        let nonce = self.env.random_array();

        Ok(aead::encrypt(key.as_slice(), &nonce, &message_aad(thread_id), plaintext)?)
    }

    /// Decrypt a ciphertext produced by [`encrypt`](Self::encrypt) on any
    /// device of the account.
    ///
    /// # Errors
    ///
    /// - `EpochChain(EpochDoesNotExist)`: epoch is not held by this device
    /// - `Crypto(DecryptionFailed)`: wrong thread, wrong epoch, or tampering
    pub fn decrypt(
        &self,
        thread_id: &str,
        epoch_sequence_id: SequenceId,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, LabyrinthError> {
        let epoch = self.epoch_chain.get_epoch(epoch_sequence_id)?;
        let key = message_key(epoch, thread_id);

        Ok(aead::decrypt(key.as_slice(), &message_aad(thread_id), ciphertext)?)
    }

    /// Open a new epoch now, regardless of device activity.
    pub async fn rotate_epoch(
        &mut self,
        client: &impl LabyrinthServerClient,
    ) -> Result<SequenceId, LabyrinthError> {
        let opened = open_new_epoch_based_on_current(
            self.epoch_chain.get_newest()?,
            &self.device,
            client,
            &self.codec,
            &self.env,
        )
        .await?;

        let sequence_id = opened.sequence_id();
        self.epoch_chain.add(opened)?;
        Ok(sequence_id)
    }

    /// Sequence id of the newest epoch this device holds.
    pub fn newest_epoch_sequence_id(&self) -> Result<SequenceId, EpochChainError> {
        Ok(self.epoch_chain.get_newest()?.sequence_id())
    }

    /// Server-assigned id of the newest epoch this device holds.
    pub fn newest_epoch_id(&self) -> Result<&str, EpochChainError> {
        Ok(self.epoch_chain.get_newest()?.id())
    }

    /// This device.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Epochs held by this device.
    pub fn epoch_chain(&self) -> &EpochChain {
        &self.epoch_chain
    }

    async fn after_resume(&mut self, client: &impl LabyrinthServerClient) -> Result<(), LabyrinthError> {
        client.notify_about_device_activity(self.device.id()).await?;

        let exceeded = client
            .check_if_any_device_exceed_inactivity_limit()
            .await?
            .did_any_device_exceed_inactivity_limit;
        if exceeded {
            info!(device_id = self.device.id(), "inactive device detected, rotating epoch");
            self.rotate_epoch(client).await?;
        }
        Ok(())
    }
}

fn message_key(epoch: &Epoch, thread_id: &str) -> Zeroizing<[u8; 32]> {
    let info = format!(
        "message_key_in_epoch_{}_cipher_version_{CIPHER_VERSION}_{thread_id}",
        epoch.sequence_id()
    );
    Zeroizing::new(kdf_key(epoch.root_key(), None, &ascii_bytes(&info)))
}

fn message_aad(thread_id: &str) -> Vec<u8> {
    ascii_bytes(&format!("message_thread_{thread_id}"))
}

/// Persisted session: this device and the epochs it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabyrinthSerialized {
    /// This device with its private keys
    pub this_device: DeviceSerialized,
    /// Epochs held by this device
    #[serde(rename = "epochStorage")]
    pub epoch_chain: EpochChainSerialized,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Base64Codec, env::SystemEnv};

    fn labyrinth() -> Labyrinth<SystemEnv, Base64Codec> {
        let env = SystemEnv::new();
        let mut epoch_chain = EpochChain::new();
        epoch_chain.add(Epoch::new("epoch-0", SequenceId::GENESIS, [1; 32])).unwrap();
        epoch_chain.add(Epoch::new("epoch-1", SequenceId::new(1), [2; 32])).unwrap();

        Labyrinth {
            device: Device::new("device-0", DeviceKeyBundle::generate(&env)),
            epoch_chain,
            env,
            codec: Base64Codec,
        }
    }

    #[test]
    fn message_roundtrip() {
        let labyrinth = labyrinth();
        let ciphertext = labyrinth.encrypt("thread-a", SequenceId::GENESIS, b"hello").unwrap();

        assert_eq!(labyrinth.decrypt("thread-a", SequenceId::GENESIS, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn message_is_bound_to_thread_and_epoch() {
        let labyrinth = labyrinth();
        let ciphertext = labyrinth.encrypt("thread-a", SequenceId::GENESIS, b"hello").unwrap();

        assert!(matches!(
            labyrinth.decrypt("thread-b", SequenceId::GENESIS, &ciphertext),
            Err(LabyrinthError::Crypto(_))
        ));
        assert!(matches!(
            labyrinth.decrypt("thread-a", SequenceId::new(1), &ciphertext),
            Err(LabyrinthError::Crypto(_))
        ));
    }

    #[test]
    fn unknown_epoch_is_reported() {
        let labyrinth = labyrinth();
        let err = labyrinth.encrypt("thread-a", SequenceId::new(7), b"hello").unwrap_err();

        assert_eq!(
            err,
            LabyrinthError::EpochChain(EpochChainError::EpochDoesNotExist {
                sequence_id: SequenceId::new(7)
            })
        );
    }

    #[test]
    fn nonces_are_fresh() {
        let labyrinth = labyrinth();
        let a = labyrinth.encrypt("thread-a", SequenceId::GENESIS, b"hello").unwrap();
        let b = labyrinth.encrypt("thread-a", SequenceId::GENESIS, b"hello").unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn message_key_label() {
        let epoch = Epoch::new("epoch-3", SequenceId::new(3), [9; 32]);
        let expected = kdf_key(&[9; 32], None, b"message_key_in_epoch_3_cipher_version_1_t");

        assert_eq!(*message_key(&epoch, "t"), expected);
        assert_eq!(message_aad("t"), b"message_thread_t");
    }

    #[test]
    fn accessors_report_newest() {
        let labyrinth = labyrinth();

        assert_eq!(labyrinth.newest_epoch_sequence_id().unwrap(), SequenceId::new(1));
        assert_eq!(labyrinth.newest_epoch_id().unwrap(), "epoch-1");
        assert_eq!(labyrinth.device().id(), "device-0");
        assert_eq!(labyrinth.epoch_chain().len(), 2);
    }

    #[test]
    fn serialized_session_survives_cbor() {
        let labyrinth = labyrinth();
        let serialized = labyrinth.serialize();

        let mut bytes = Vec::new();
        ciborium::into_writer(&serialized, &mut bytes).unwrap();
        let restored: LabyrinthSerialized = ciborium::from_reader(bytes.as_slice()).unwrap();

        assert_eq!(restored, serialized);
        let chain = EpochChain::deserialize(&restored.epoch_chain, &Base64Codec).unwrap();
        assert_eq!(chain.get_newest().unwrap(), labyrinth.epoch_chain().get_newest().unwrap());
    }

    #[test]
    fn persisted_field_names_match_deployed_layout() {
        let mut bytes = Vec::new();
        ciborium::into_writer(&labyrinth().serialize(), &mut bytes).unwrap();
        let value: ciborium::Value = ciborium::from_reader(bytes.as_slice()).unwrap();

        let keys: Vec<&str> =
            value.as_map().unwrap().iter().filter_map(|(key, _)| key.as_text()).collect();
        assert_eq!(keys, ["thisDevice", "epochStorage"]);
    }
}
