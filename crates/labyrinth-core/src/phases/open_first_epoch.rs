//! Genesis: open epoch 0 with the first device and the virtual device.

use tracing::info;
use zeroize::Zeroizing;

use super::authenticate::epoch_device_mac;
use crate::{
    codec::BytesCodec,
    device::Device,
    env::Environment,
    epoch::{Epoch, ROOT_KEY_LENGTH, SequenceId},
    error::LabyrinthError,
    key_bundle::DeviceKeyBundle,
    server::{FirstEpochMembershipProof, LabyrinthServerClient, OpenFirstEpochBody},
    virtual_device::{EncryptedRecoverySecrets, VirtualDevice},
};

/// Outcome of [`open_first_epoch`].
#[derive(Debug)]
pub struct FirstEpoch {
    /// The first device under its server-assigned id
    pub device: Device,
    /// The genesis epoch
    pub epoch: Epoch,
}

/// Open the account's genesis epoch.
///
/// Draws a fresh root key, escrows it with the virtual device's private keys
/// under `decryption_key`, and registers both principals in one request.
pub async fn open_first_epoch(
    key_bundle: DeviceKeyBundle,
    virtual_device: &VirtualDevice,
    decryption_key: &[u8],
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
    env: &impl Environment,
) -> Result<FirstEpoch, LabyrinthError> {
    let sequence_id = SequenceId::GENESIS;
    let root_key: Zeroizing<[u8; ROOT_KEY_LENGTH]> = Zeroizing::new(env.random_array());

    let virtual_device_public = &virtual_device.key_bundle().public;
    let virtual_device_mac =
        epoch_device_mac(sequence_id, &root_key, &virtual_device_public.device_key);
    let device_mac = epoch_device_mac(sequence_id, &root_key, &key_bundle.public.common.device_key);

    let escrow = EncryptedRecoverySecrets::encrypt(
        decryption_key,
        sequence_id,
        &root_key,
        &virtual_device.key_bundle().private,
        codec,
        env,
    )?;

    let response = client
        .open_first_epoch(OpenFirstEpochBody {
            virtual_device_id: codec.encode(virtual_device.id()),
            virtual_device_encrypted_recovery_secrets: escrow.serialize(codec),
            virtual_device_public_key_bundle: virtual_device_public.serialize(codec),
            device_public_key_bundle: key_bundle.public.serialize(codec),
            first_epoch_membership_proof: FirstEpochMembershipProof {
                epoch_device_mac: codec.encode(&device_mac),
                epoch_virtual_device_mac: codec.encode(&virtual_device_mac),
            },
        })
        .await?;

    info!(device_id = %response.device_id, epoch_id = %response.epoch_id, "first epoch opened");

    Ok(FirstEpoch {
        device: Device::new(response.device_id, key_bundle),
        epoch: Epoch::new(response.epoch_id, sequence_id, *root_key),
    })
}
