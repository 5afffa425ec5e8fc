//! Forward chaining: catch up from the newest known epoch to the server's
//! newest epoch, one epoch at a time.

use labyrinth_crypto::{CryptoError, PrivateKey, pke};
use tracing::debug;
use zeroize::Zeroizing;

use super::{ENTROPY_LENGTH, derive_chaining_keys, derive_root_key, entropy_aad};
use crate::{
    codec::BytesCodec,
    device::Device,
    epoch::{Epoch, EpochChain, SequenceId},
    error::{EpochChainError, LabyrinthError},
    key_bundle::DevicePublicKeyBundle,
    server::{GetNewerEpochJoinDataResponse, LabyrinthServerClient},
    virtual_device::VirtualDevice,
};

/// Principal that receives distributed epoch entropy.
///
/// Selects the join data capability once, at the call site.
#[derive(Debug, Clone, Copy)]
pub enum JoiningIdentity<'a> {
    /// A registered physical device
    Device(&'a Device),
    /// The virtual device being recovered
    VirtualDevice(&'a VirtualDevice),
}

impl JoiningIdentity<'_> {
    fn epoch_storage_key(&self) -> &PrivateKey {
        match self {
            Self::Device(device) => &device.key_bundle().private.common.epoch_storage_key,
            Self::VirtualDevice(virtual_device) => {
                &virtual_device.key_bundle().private.epoch_storage_key
            },
        }
    }

    async fn fetch_join_data(
        &self,
        sequence_id: SequenceId,
        client: &impl LabyrinthServerClient,
    ) -> Result<GetNewerEpochJoinDataResponse, LabyrinthError> {
        let response = match self {
            Self::Device(device) => {
                client.get_newer_epoch_join_data_for_device(sequence_id, device.id()).await?
            },
            Self::VirtualDevice(_) => {
                client.get_newer_epoch_join_data_for_virtual_device(sequence_id).await?
            },
        };
        Ok(response)
    }
}

/// Join every epoch newer than the chain's newest, appending each.
///
/// Each joined epoch is committed before the next is requested, so a
/// failure leaves the chain at the last successfully joined epoch.
///
/// # Errors
///
/// - `InvalidEpochStorageAuthKey`: a sender's auth key is not signed by its
///   device key
/// - `Crypto(DecryptionFailed)`: entropy was not encrypted to this identity
///   under the expected epoch
/// - `EpochChain(NoEpochExists)`: chain is empty
pub async fn chain_forward(
    identity: JoiningIdentity<'_>,
    chain: &mut EpochChain,
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
) -> Result<(), LabyrinthError> {
    let newest = client.get_newest_epoch_sequence_id().await?.newest_epoch_sequence_id;

    loop {
        let known = chain.get_newest()?;
        if known.sequence_id() >= newest {
            return Ok(());
        }
        let next = join_newer_epoch(identity, known, client, codec).await?;
        chain.add(next)?;
    }
}

async fn join_newer_epoch(
    identity: JoiningIdentity<'_>,
    known: &Epoch,
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
) -> Result<Epoch, LabyrinthError> {
    let Some(newer_sequence_id) = known.sequence_id().next() else {
        return Err(EpochChainError::OmittedEpoch {
            expected_older: None,
            expected_newer: None,
            actual: known.sequence_id(),
        }
        .into());
    };

    let response = identity.fetch_join_data(newer_sequence_id, client).await?;

    let sender = DevicePublicKeyBundle::deserialize(&response.sender_device_public_key_bundle, codec)?;
    if !sender.has_valid_epoch_storage_auth_key() {
        return Err(LabyrinthError::InvalidEpochStorageAuthKey);
    }

    let keys = derive_chaining_keys(known);
    let ciphertext = codec.decode(&response.encrypted_epoch_entropy)?;
    let entropy = Zeroizing::new(pke::decrypt(
        identity.epoch_storage_key(),
        &sender.epoch_storage_auth_key,
        &keys.distribution_psk,
        &entropy_aad(newer_sequence_id),
        &ciphertext,
    )?);
    if entropy.len() != ENTROPY_LENGTH {
        return Err(CryptoError::InvalidKeyLength { expected: ENTROPY_LENGTH, actual: entropy.len() }
            .into());
    }

    let root_key = derive_root_key(&entropy, &keys.chaining_key);
    debug!(epoch_id = %response.epoch_id, sequence_id = %newer_sequence_id, "joined epoch");

    Ok(Epoch::new(response.epoch_id, newer_sequence_id, root_key))
}
