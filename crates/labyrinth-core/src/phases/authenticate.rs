//! Membership MACs and device authentication to an epoch.
//!
//! A membership MAC proves that whoever published it knew the epoch's root
//! key when they bound a device key to it. The server stores the MACs and
//! gates join data on them without ever learning a root key.
//!
//! ```text
//! mac_key = HKDF(root_N, info = "epoch_devices_<N>")
//! mac     = HMAC-SHA256(key = device_key_x25519, data = mac_key)
//! ```
//!
//! The HMAC key and data order is fixed by deployed clients and servers.

use labyrinth_crypto::{
    PublicKey,
    kdf::kdf_key,
    mac::{MAC_LENGTH, mac, verify_mac},
    util::ascii_bytes,
};
use tracing::debug;

use crate::{
    codec::BytesCodec,
    device::Device,
    epoch::{Epoch, ROOT_KEY_LENGTH, SequenceId},
    error::LabyrinthError,
    key_bundle::DeviceKeyBundle,
    server::{
        AuthenticateDeviceToEpochAndRegisterDeviceBody, AuthenticateDeviceToEpochBody,
        LabyrinthServerClient,
    },
};

/// Membership MAC of `device_key` in the epoch `(sequence_id, root_key)`.
pub fn epoch_device_mac(
    sequence_id: SequenceId,
    root_key: &[u8; ROOT_KEY_LENGTH],
    device_key: &PublicKey,
) -> [u8; MAC_LENGTH] {
    let mac_key = derive_mac_key(sequence_id, root_key);
    mac(&mac_key, &device_key.to_x25519_bytes())
}

/// Check a published membership MAC in constant time.
pub fn verify_epoch_device_mac(epoch: &Epoch, device_key: &PublicKey, published: &[u8]) -> bool {
    let mac_key = derive_mac_key(epoch.sequence_id(), epoch.root_key());
    verify_mac(&mac_key, &device_key.to_x25519_bytes(), published)
}

fn derive_mac_key(sequence_id: SequenceId, root_key: &[u8; ROOT_KEY_LENGTH]) -> [u8; 32] {
    kdf_key(root_key, None, &ascii_bytes(&format!("epoch_devices_{sequence_id}")))
}

/// Publish this device's membership MAC for `epoch`.
pub async fn authenticate_device_to_epoch(
    device: &Device,
    epoch: &Epoch,
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
) -> Result<(), LabyrinthError> {
    let device_key = &device.key_bundle().public.common.device_key;
    let tag = epoch_device_mac(epoch.sequence_id(), epoch.root_key(), device_key);

    client
        .authenticate_device_to_epoch(epoch.id(), device.id(), AuthenticateDeviceToEpochBody {
            epoch_device_mac: codec.encode(&tag),
        })
        .await?;

    debug!(device_id = device.id(), sequence_id = %epoch.sequence_id(), "authenticated to epoch");
    Ok(())
}

/// Register a new device that already holds `epoch`'s root key.
///
/// Returns the device under its server-assigned id.
pub async fn register_device_in_epoch(
    key_bundle: DeviceKeyBundle,
    epoch: &Epoch,
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
) -> Result<Device, LabyrinthError> {
    let tag = epoch_device_mac(
        epoch.sequence_id(),
        epoch.root_key(),
        &key_bundle.public.common.device_key,
    );

    let response = client
        .authenticate_device_to_epoch_and_register_device(
            epoch.id(),
            AuthenticateDeviceToEpochAndRegisterDeviceBody {
                device_public_key_bundle: key_bundle.public.serialize(codec),
                epoch_device_mac: codec.encode(&tag),
            },
        )
        .await?;

    debug!(
        device_id = %response.assigned_device_id,
        sequence_id = %epoch.sequence_id(),
        "device registered"
    );
    Ok(Device::new(response.assigned_device_id, key_bundle))
}
