//! Server collaborator interface and wire DTOs.
//!
//! One capability per protocol step. Byte fields are codec-encoded strings
//! and sequence ids are decimal strings, so every DTO serializes to the same
//! camelCase JSON shape the deployed server speaks. Implementations own
//! transport concerns (retries, timeouts); the protocol never retries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    epoch::SequenceId,
    error::TransportError,
    key_bundle::{CommonPublicKeyBundleSerialized, DevicePublicKeyBundleSerialized},
    virtual_device::EncryptedRecoverySecretsSerialized,
};

/// Capability set of the Labyrinth server.
#[async_trait]
pub trait LabyrinthServerClient: Send + Sync {
    /// Create the account's genesis epoch, first device and virtual device.
    async fn open_first_epoch(
        &self,
        body: OpenFirstEpochBody,
    ) -> Result<OpenFirstEpochResponse, TransportError>;

    /// Join data for a device: entropy of epoch `newer_epoch_sequence_id`
    /// encrypted to `device_id`.
    async fn get_newer_epoch_join_data_for_device(
        &self,
        newer_epoch_sequence_id: SequenceId,
        device_id: &str,
    ) -> Result<GetNewerEpochJoinDataResponse, TransportError>;

    /// Join data for the virtual device.
    async fn get_newer_epoch_join_data_for_virtual_device(
        &self,
        newer_epoch_sequence_id: SequenceId,
    ) -> Result<GetNewerEpochJoinDataResponse, TransportError>;

    /// Historical epoch data for backward chaining.
    ///
    /// Part of the server surface but never called: backward chaining is not
    /// part of the protocol contract.
    async fn get_older_epoch_join_data(
        &self,
        older_epoch_sequence_id: SequenceId,
    ) -> Result<GetOlderEpochJoinDataResponse, TransportError>;

    /// Sequence id of the account's newest epoch.
    async fn get_newest_epoch_sequence_id(
        &self,
    ) -> Result<GetNewestEpochSequenceIdResponse, TransportError>;

    /// Prove `device_id` knows the root key of `epoch_id`.
    async fn authenticate_device_to_epoch(
        &self,
        epoch_id: &str,
        device_id: &str,
        body: AuthenticateDeviceToEpochBody,
    ) -> Result<(), TransportError>;

    /// Escrowed virtual device secrets and the public bundle the server
    /// vouches for.
    async fn get_virtual_device_recovery_secrets(
        &self,
        body: GetVirtualDeviceRecoverySecretsBody,
    ) -> Result<GetVirtualDeviceRecoverySecretsResponse, TransportError>;

    /// Members of `epoch_id` with their membership MACs.
    async fn get_devices_in_epoch(
        &self,
        epoch_id: &str,
    ) -> Result<GetDevicesInEpochResponse, TransportError>;

    /// Open the epoch following `current_epoch_id`.
    async fn open_new_epoch_based_on_current(
        &self,
        current_epoch_id: &str,
        this_device_id: &str,
        body: OpenNewEpochBasedOnCurrentBody,
    ) -> Result<OpenNewEpochBasedOnCurrentResponse, TransportError>;

    /// Register a new device already holding `epoch_id`'s root key.
    async fn authenticate_device_to_epoch_and_register_device(
        &self,
        epoch_id: &str,
        body: AuthenticateDeviceToEpochAndRegisterDeviceBody,
    ) -> Result<AuthenticateDeviceToEpochAndRegisterDeviceResponse, TransportError>;

    /// Whether the account already has a genesis epoch.
    async fn check_if_labyrinth_is_initialized(
        &self,
    ) -> Result<CheckIfLabyrinthIsInitializedResponse, TransportError>;

    /// Record that `device_id` is alive.
    async fn notify_about_device_activity(&self, device_id: &str) -> Result<(), TransportError>;

    /// Whether any device of the account has been idle too long.
    async fn check_if_any_device_exceed_inactivity_limit(
        &self,
    ) -> Result<CheckIfAnyDeviceExceedInactivityLimitResponse, TransportError>;
}

/// Membership MACs for the genesis epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstEpochMembershipProof {
    /// MAC over the first device's key
    pub epoch_device_mac: String,
    /// MAC over the virtual device's key
    pub epoch_virtual_device_mac: String,
}

/// Request body of `open_first_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFirstEpochBody {
    /// Encoded 16-byte virtual device id
    pub virtual_device_id: String,
    /// Escrowed virtual device secrets
    pub virtual_device_encrypted_recovery_secrets: EncryptedRecoverySecretsSerialized,
    /// Virtual device public keys
    pub virtual_device_public_key_bundle: CommonPublicKeyBundleSerialized,
    /// First device public keys
    pub device_public_key_bundle: DevicePublicKeyBundleSerialized,
    /// Genesis membership MACs
    pub first_epoch_membership_proof: FirstEpochMembershipProof,
}

/// Response of `open_first_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFirstEpochResponse {
    /// Id assigned to the first device
    pub device_id: String,
    /// Id assigned to the genesis epoch
    pub epoch_id: String,
}

/// Response of both `get_newer_epoch_join_data_*` capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNewerEpochJoinDataResponse {
    /// Id of the newer epoch
    pub epoch_id: String,
    /// Authenticated-PKE ciphertext of the new epoch entropy
    pub encrypted_epoch_entropy: String,
    /// Bundle of the device that opened the epoch
    pub sender_device_public_key_bundle: DevicePublicKeyBundleSerialized,
}

/// Response of `get_older_epoch_join_data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetOlderEpochJoinDataResponse {
    /// Id of the older epoch
    pub epoch_id: String,
    /// Encrypted sequence id
    pub encrypted_epoch_sequence_id: String,
    /// Encrypted root key
    pub encrypted_epoch_root_key: String,
}

/// Response of `get_newest_epoch_sequence_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetNewestEpochSequenceIdResponse {
    /// Newest sequence id
    pub newest_epoch_sequence_id: SequenceId,
}

/// Request body of `authenticate_device_to_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateDeviceToEpochBody {
    /// Membership MAC of the device in the epoch
    pub epoch_device_mac: String,
}

/// Request body of `get_virtual_device_recovery_secrets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVirtualDeviceRecoverySecretsBody {
    /// Encoded 16-byte virtual device id
    pub virtual_device_id: String,
}

/// Response of `get_virtual_device_recovery_secrets`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetVirtualDeviceRecoverySecretsResponse {
    /// Id of the escrowed (genesis) epoch
    pub epoch_id: String,
    /// Escrowed secrets
    pub virtual_device_encrypted_recovery_secrets: EncryptedRecoverySecretsSerialized,
    /// Public bundle the server vouches for
    pub expected_virtual_device_public_key_bundle: CommonPublicKeyBundleSerialized,
}

/// A device listed by `get_devices_in_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInEpochSerialized {
    /// Device id
    pub id: String,
    /// Published membership MAC in the epoch
    pub mac: String,
    /// Receive-side keys
    pub key_bundle: CommonPublicKeyBundleSerialized,
}

/// The virtual device as listed by `get_devices_in_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualDeviceInEpochSerialized {
    /// Published membership MAC in the epoch
    pub mac: String,
    /// Receive-side keys
    pub key_bundle: CommonPublicKeyBundleSerialized,
}

/// Response of `get_devices_in_epoch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetDevicesInEpochResponse {
    /// Physical members
    pub devices: Vec<DeviceInEpochSerialized>,
    /// The virtual device
    pub virtual_device: VirtualDeviceInEpochSerialized,
}

/// New epoch entropy encrypted to every verified member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedNewEpochEntropyForEveryDeviceInEpoch {
    /// Ciphertext per device id
    pub device_id_to_encrypted_new_epoch_entropy_map: BTreeMap<String, String>,
    /// Ciphertext for the virtual device
    pub virtual_device_encrypted_new_epoch_entropy: String,
}

/// Membership MACs for a newly opened epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEpochMembershipProof {
    /// MAC over the opening device's key
    pub epoch_this_device_mac: String,
    /// MAC over the virtual device's key
    pub epoch_virtual_device_mac: String,
}

/// Request body of `open_new_epoch_based_on_current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenNewEpochBasedOnCurrentBody {
    /// Fan-out ciphertexts
    pub encrypted_new_epoch_entropy_for_every_device_in_epoch:
        EncryptedNewEpochEntropyForEveryDeviceInEpoch,
    /// New epoch membership MACs
    pub new_epoch_membership_proof: NewEpochMembershipProof,
}

/// Response of `open_new_epoch_based_on_current`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenNewEpochBasedOnCurrentResponse {
    /// Id assigned to the new epoch
    pub opened_epoch_id: String,
}

/// Request body of `authenticate_device_to_epoch_and_register_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateDeviceToEpochAndRegisterDeviceBody {
    /// Public keys of the new device
    pub device_public_key_bundle: DevicePublicKeyBundleSerialized,
    /// Membership MAC of the new device in the epoch
    pub epoch_device_mac: String,
}

/// Response of `authenticate_device_to_epoch_and_register_device`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateDeviceToEpochAndRegisterDeviceResponse {
    /// Id assigned to the new device
    pub assigned_device_id: String,
}

/// Response of `check_if_labyrinth_is_initialized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIfLabyrinthIsInitializedResponse {
    /// Whether a genesis epoch exists
    pub is_initialized: bool,
}

/// Response of `check_if_any_device_exceed_inactivity_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIfAnyDeviceExceedInactivityLimitResponse {
    /// Whether any device has been idle past the limit
    pub did_any_device_exceed_inactivity_limit: bool,
}
