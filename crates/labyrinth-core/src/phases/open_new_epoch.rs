//! Rotation: open the epoch following the current one and distribute fresh
//! entropy to every verified member.

use std::collections::BTreeMap;

use labyrinth_crypto::pke;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::{
    ENTROPY_LENGTH, authenticate::epoch_device_mac, derive_chaining_keys, derive_root_key,
    entropy_aad, verify_epoch_device_mac,
};
use crate::{
    codec::BytesCodec,
    device::Device,
    env::Environment,
    epoch::Epoch,
    error::{EpochChainError, LabyrinthError},
    key_bundle::{CommonPublicKeyBundle, CommonPublicKeyBundleSerialized},
    server::{
        EncryptedNewEpochEntropyForEveryDeviceInEpoch, LabyrinthServerClient,
        NewEpochMembershipProof, OpenNewEpochBasedOnCurrentBody,
    },
};

/// Open the epoch following `current` on behalf of `device`.
///
/// Members whose membership MAC or storage key signature does not verify
/// against `current` are left out of the new epoch. The virtual device is
/// never left out: if it fails verification the rotation is refused.
///
/// # Errors
///
/// - `InvalidVirtualDeviceServerRepresentation`: server's virtual device
///   entry does not verify
/// - `EpochChain(OmittedEpoch)`: sequence space exhausted
pub async fn open_new_epoch_based_on_current(
    current: &Epoch,
    device: &Device,
    client: &impl LabyrinthServerClient,
    codec: &impl BytesCodec,
    env: &impl Environment,
) -> Result<Epoch, LabyrinthError> {
    let Some(new_sequence_id) = current.sequence_id().next() else {
        return Err(EpochChainError::OmittedEpoch {
            expected_older: None,
            expected_newer: None,
            actual: current.sequence_id(),
        }
        .into());
    };

    let (members, keys) = tokio::join!(client.get_devices_in_epoch(current.id()), async {
        derive_chaining_keys(current)
    });
    let members = members?;

    let Some(virtual_device) = verified_member(
        &members.virtual_device.mac,
        &members.virtual_device.key_bundle,
        current,
        codec,
    ) else {
        return Err(LabyrinthError::InvalidVirtualDeviceServerRepresentation);
    };

    let entropy: Zeroizing<[u8; ENTROPY_LENGTH]> = Zeroizing::new(env.random_array());
    let aad = entropy_aad(new_sequence_id);
    let sender_auth = &device.key_bundle().private.epoch_storage_auth_key;
    let seal = |recipient: &CommonPublicKeyBundle| {
        pke::encrypt(
            &recipient.epoch_storage_key,
            sender_auth,
            &keys.distribution_psk,
            &aad,
            entropy.as_slice(),
            &env.random_array(),
        )
        .map(|ciphertext| codec.encode(&ciphertext))
    };

    let mut device_id_to_encrypted_new_epoch_entropy_map = BTreeMap::new();
    for member in &members.devices {
        let Some(bundle) = verified_member(&member.mac, &member.key_bundle, current, codec) else {
            warn!(device_id = %member.id, sequence_id = %current.sequence_id(), "excluding unverified device");
            continue;
        };
        device_id_to_encrypted_new_epoch_entropy_map.insert(member.id.clone(), seal(&bundle)?);
    }
    let virtual_device_encrypted_new_epoch_entropy = seal(&virtual_device)?;

    let root_key = derive_root_key(entropy.as_slice(), &keys.chaining_key);
    let this_device_mac = epoch_device_mac(
        new_sequence_id,
        &root_key,
        &device.key_bundle().public.common.device_key,
    );
    let virtual_device_mac = epoch_device_mac(new_sequence_id, &root_key, &virtual_device.device_key);

    let recipients = device_id_to_encrypted_new_epoch_entropy_map.len();
    let response = client
        .open_new_epoch_based_on_current(current.id(), device.id(), OpenNewEpochBasedOnCurrentBody {
            encrypted_new_epoch_entropy_for_every_device_in_epoch:
                EncryptedNewEpochEntropyForEveryDeviceInEpoch {
                    device_id_to_encrypted_new_epoch_entropy_map,
                    virtual_device_encrypted_new_epoch_entropy,
                },
            new_epoch_membership_proof: NewEpochMembershipProof {
                epoch_this_device_mac: codec.encode(&this_device_mac),
                epoch_virtual_device_mac: codec.encode(&virtual_device_mac),
            },
        })
        .await?;

    info!(
        epoch_id = %response.opened_epoch_id,
        sequence_id = %new_sequence_id,
        recipients,
        "opened new epoch"
    );

    Ok(Epoch::new(response.opened_epoch_id, new_sequence_id, root_key))
}

/// Parse a member entry and check it belongs in `epoch`.
///
/// `None` when the bundle does not decode, the storage key is not signed by
/// the device key, or the membership MAC does not verify.
fn verified_member(
    mac: &str,
    key_bundle: &CommonPublicKeyBundleSerialized,
    epoch: &Epoch,
    codec: &impl BytesCodec,
) -> Option<CommonPublicKeyBundle> {
    let bundle = CommonPublicKeyBundle::deserialize(key_bundle, codec).ok()?;
    let mac = codec.decode(mac).ok()?;

    let valid = bundle.has_valid_epoch_storage_key()
        && verify_epoch_device_mac(epoch, &bundle.device_key, &mac);
    valid.then_some(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codec::Base64Codec, env::SystemEnv, epoch::SequenceId, key_bundle::CommonPrivateKeyBundle};

    fn member(epoch: &Epoch) -> (String, CommonPublicKeyBundleSerialized) {
        let codec = Base64Codec;
        let public = CommonPrivateKeyBundle::generate(&SystemEnv::new()).public_bundle();
        let mac = epoch_device_mac(epoch.sequence_id(), epoch.root_key(), &public.device_key);
        (codec.encode(&mac), public.serialize(&codec))
    }

    #[test]
    fn verified_member_accepts_valid_entry() {
        let epoch = Epoch::new("epoch-1", SequenceId::new(2), [7; 32]);
        let (mac, bundle) = member(&epoch);

        assert!(verified_member(&mac, &bundle, &epoch, &Base64Codec).is_some());
    }

    #[test]
    fn verified_member_rejects_mac_from_other_epoch() {
        let epoch = Epoch::new("epoch-1", SequenceId::new(2), [7; 32]);
        let previous = Epoch::new("epoch-0", SequenceId::new(1), [6; 32]);
        let (mac, bundle) = member(&previous);

        assert!(verified_member(&mac, &bundle, &epoch, &Base64Codec).is_none());
    }

    #[test]
    fn verified_member_rejects_unsigned_storage_key() {
        let codec = Base64Codec;
        let epoch = Epoch::new("epoch-1", SequenceId::new(2), [7; 32]);
        let (mac, mut bundle) = member(&epoch);
        let other = CommonPrivateKeyBundle::generate(&SystemEnv::new()).public_bundle();
        bundle.epoch_storage_key_pub = codec.encode(other.epoch_storage_key.as_bytes());

        assert!(verified_member(&mac, &bundle, &epoch, &codec).is_none());
    }

    #[test]
    fn verified_member_rejects_garbage() {
        let epoch = Epoch::new("epoch-1", SequenceId::new(2), [7; 32]);
        let (_, bundle) = member(&epoch);

        assert!(verified_member("not base64!", &bundle, &epoch, &Base64Codec).is_none());
    }
}
