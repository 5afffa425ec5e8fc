#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

//! In-memory Labyrinth server.
//!
//! Behaves like the deployed server at the [`LabyrinthServerClient`]
//! interface: it stores only public bundles, MACs and ciphertexts, assigns
//! ids, gates join data on what was addressed to the caller, and tracks
//! device activity on the environment clock. It never sees a root key.
//!
//! Test hooks corrupt stored data the way a malicious or buggy server would.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use labyrinth_core::{
    Environment, SequenceId, TransportError,
    key_bundle::{CommonPublicKeyBundleSerialized, DevicePublicKeyBundleSerialized},
    server::{
        AuthenticateDeviceToEpochAndRegisterDeviceBody,
        AuthenticateDeviceToEpochAndRegisterDeviceResponse, AuthenticateDeviceToEpochBody,
        CheckIfAnyDeviceExceedInactivityLimitResponse, CheckIfLabyrinthIsInitializedResponse,
        DeviceInEpochSerialized, GetDevicesInEpochResponse, GetNewerEpochJoinDataResponse,
        GetNewestEpochSequenceIdResponse, GetOlderEpochJoinDataResponse,
        GetVirtualDeviceRecoverySecretsBody, GetVirtualDeviceRecoverySecretsResponse,
        LabyrinthServerClient, OpenFirstEpochBody, OpenFirstEpochResponse,
        OpenNewEpochBasedOnCurrentBody, OpenNewEpochBasedOnCurrentResponse,
        VirtualDeviceInEpochSerialized,
    },
    virtual_device::EncryptedRecoverySecretsSerialized,
};
use tracing::{debug, info};

/// Server policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryServerConfig {
    /// Idle time after which a device counts as inactive
    pub inactivity_limit: Duration,
}

impl Default for MemoryServerConfig {
    fn default() -> Self {
        Self { inactivity_limit: Duration::from_secs(30 * 24 * 60 * 60) }
    }
}

/// Shared handle to one in-memory account.
///
/// Clones talk to the same account.
#[derive(Clone)]
pub struct MemoryServer<E: Environment> {
    env: E,
    config: MemoryServerConfig,
    inner: Arc<Mutex<MemoryServerInner<E::Instant>>>,
}

struct MemoryServerInner<I> {
    account: Option<Account>,
    devices: BTreeMap<String, StoredDevice<I>>,
    /// Indexed by sequence id
    epochs: Vec<StoredEpoch>,
    next_device_id: u64,
    next_epoch_id: u64,
}

struct Account {
    virtual_device_id: String,
    virtual_device_bundle: CommonPublicKeyBundleSerialized,
    escrow: EncryptedRecoverySecretsSerialized,
}

struct StoredDevice<I> {
    bundle: DevicePublicKeyBundleSerialized,
    last_active: I,
}

struct StoredEpoch {
    id: String,
    sequence_id: SequenceId,
    /// Membership MACs by device id
    device_macs: BTreeMap<String, String>,
    virtual_device_mac: String,
    join_data: Option<JoinData>,
}

/// Entropy distributed when an epoch was opened by rotation.
struct JoinData {
    sender: DevicePublicKeyBundleSerialized,
    for_devices: BTreeMap<String, String>,
    for_virtual_device: String,
}

impl<I> MemoryServerInner<I> {
    fn epoch_by_id(&self, epoch_id: &str) -> Result<&StoredEpoch, TransportError> {
        self.epochs.iter().find(|epoch| epoch.id == epoch_id).ok_or_else(|| not_found(epoch_id))
    }

    fn epoch_by_id_mut(&mut self, epoch_id: &str) -> Result<&mut StoredEpoch, TransportError> {
        self.epochs
            .iter_mut()
            .find(|epoch| epoch.id == epoch_id)
            .ok_or_else(|| not_found(epoch_id))
    }

    fn epoch_by_sequence_id(&self, sequence_id: SequenceId) -> Result<&StoredEpoch, TransportError> {
        usize::try_from(sequence_id.value())
            .ok()
            .and_then(|index| self.epochs.get(index))
            .ok_or_else(|| not_found(&format!("epoch {sequence_id}")))
    }

    fn newest_epoch(&self) -> Result<&StoredEpoch, TransportError> {
        self.epochs.last().ok_or_else(|| not_found("account"))
    }

    fn assign_device_id(&mut self) -> String {
        let id = format!("device-{}", self.next_device_id);
        self.next_device_id += 1;
        id
    }

    fn assign_epoch_id(&mut self) -> String {
        let id = format!("epoch-{}", self.next_epoch_id);
        self.next_epoch_id += 1;
        id
    }
}

fn not_found(what: &str) -> TransportError {
    TransportError::NotFound { what: what.to_owned() }
}

fn rejected(reason: &str) -> TransportError {
    TransportError::Rejected { reason: reason.to_owned() }
}

impl<E: Environment> MemoryServer<E> {
    /// Create an empty server reading time from `env`.
    pub fn new(env: E, config: MemoryServerConfig) -> Self {
        Self {
            env,
            config,
            inner: Arc::new(Mutex::new(MemoryServerInner {
                account: None,
                devices: BTreeMap::new(),
                epochs: Vec::new(),
                next_device_id: 0,
                next_epoch_id: 0,
            })),
        }
    }

    /// Number of registered devices.
    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    /// Ids of registered devices.
    pub fn device_ids(&self) -> Vec<String> {
        self.lock().devices.keys().cloned().collect()
    }

    /// Number of opened epochs.
    pub fn epoch_count(&self) -> usize {
        self.lock().epochs.len()
    }

    /// Replace the virtual device's public bundle with one whose keys are
    /// swapped, as a server substituting the virtual device would.
    ///
    /// Returns false if no account exists.
    pub fn tamper_virtual_device_bundle(&self) -> bool {
        let mut inner = self.lock();
        let Some(account) = inner.account.as_mut() else {
            return false;
        };
        let bundle = &mut account.virtual_device_bundle;
        std::mem::swap(&mut bundle.device_key_pub, &mut bundle.epoch_storage_key_pub);
        true
    }

    /// Corrupt the escrowed root key ciphertext.
    ///
    /// Returns false if no account exists.
    pub fn tamper_escrow(&self) -> bool {
        let mut inner = self.lock();
        let Some(account) = inner.account.as_mut() else {
            return false;
        };
        flip_first_char(&mut account.escrow.encrypted_epoch_root_key);
        true
    }

    /// Swap the newest rotation sender's auth key with its storage key, so
    /// the auth key signature no longer verifies.
    ///
    /// Returns false if the newest epoch was not opened by rotation.
    pub fn tamper_join_data_sender(&self) -> bool {
        let mut inner = self.lock();
        let Some(join_data) = inner.epochs.last_mut().and_then(|epoch| epoch.join_data.as_mut())
        else {
            return false;
        };
        let sender = &mut join_data.sender;
        std::mem::swap(&mut sender.epoch_storage_auth_key_pub, &mut sender.common.epoch_storage_key_pub);
        true
    }

    /// Replace the membership MAC `device_id` published for the newest epoch.
    ///
    /// Returns false if the device is not a member of the newest epoch.
    pub fn tamper_device_mac(&self, device_id: &str, mac: &str) -> bool {
        let mut inner = self.lock();
        let Some(stored) =
            inner.epochs.last_mut().and_then(|epoch| epoch.device_macs.get_mut(device_id))
        else {
            return false;
        };
        mac.clone_into(stored);
        true
    }

    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// simulation code.
    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, MemoryServerInner<E::Instant>> {
        self.inner.lock().expect("Mutex poisoned")
    }

    fn is_inactive(&self, device: &StoredDevice<E::Instant>, now: E::Instant) -> bool {
        now - device.last_active > self.config.inactivity_limit
    }
}

/// Change one base64 character so the string still decodes.
fn flip_first_char(encoded: &mut String) {
    let replacement = if encoded.starts_with('A') { "B" } else { "A" };
    if !encoded.is_empty() {
        encoded.replace_range(..1, replacement);
    }
}

#[async_trait]
impl<E: Environment> LabyrinthServerClient for MemoryServer<E> {
    async fn open_first_epoch(
        &self,
        body: OpenFirstEpochBody,
    ) -> Result<OpenFirstEpochResponse, TransportError> {
        let now = self.env.now();
        let mut inner = self.lock();
        if inner.account.is_some() {
            return Err(rejected("labyrinth is already initialized"));
        }

        let device_id = inner.assign_device_id();
        let epoch_id = inner.assign_epoch_id();

        inner.account = Some(Account {
            virtual_device_id: body.virtual_device_id,
            virtual_device_bundle: body.virtual_device_public_key_bundle,
            escrow: body.virtual_device_encrypted_recovery_secrets,
        });
        inner.devices.insert(device_id.clone(), StoredDevice {
            bundle: body.device_public_key_bundle,
            last_active: now,
        });
        inner.epochs.push(StoredEpoch {
            id: epoch_id.clone(),
            sequence_id: SequenceId::GENESIS,
            device_macs: BTreeMap::from([(
                device_id.clone(),
                body.first_epoch_membership_proof.epoch_device_mac,
            )]),
            virtual_device_mac: body.first_epoch_membership_proof.epoch_virtual_device_mac,
            join_data: None,
        });

        info!(%device_id, %epoch_id, "account created");
        Ok(OpenFirstEpochResponse { device_id, epoch_id })
    }

    async fn get_newer_epoch_join_data_for_device(
        &self,
        newer_epoch_sequence_id: SequenceId,
        device_id: &str,
    ) -> Result<GetNewerEpochJoinDataResponse, TransportError> {
        let inner = self.lock();
        let epoch = inner.epoch_by_sequence_id(newer_epoch_sequence_id)?;
        let join_data = epoch.join_data.as_ref().ok_or_else(|| not_found("join data"))?;
        let entropy = join_data
            .for_devices
            .get(device_id)
            .ok_or_else(|| not_found(&format!("join data for {device_id}")))?;

        Ok(GetNewerEpochJoinDataResponse {
            epoch_id: epoch.id.clone(),
            encrypted_epoch_entropy: entropy.clone(),
            sender_device_public_key_bundle: join_data.sender.clone(),
        })
    }

    async fn get_newer_epoch_join_data_for_virtual_device(
        &self,
        newer_epoch_sequence_id: SequenceId,
    ) -> Result<GetNewerEpochJoinDataResponse, TransportError> {
        let inner = self.lock();
        let epoch = inner.epoch_by_sequence_id(newer_epoch_sequence_id)?;
        let join_data = epoch.join_data.as_ref().ok_or_else(|| not_found("join data"))?;

        Ok(GetNewerEpochJoinDataResponse {
            epoch_id: epoch.id.clone(),
            encrypted_epoch_entropy: join_data.for_virtual_device.clone(),
            sender_device_public_key_bundle: join_data.sender.clone(),
        })
    }

    async fn get_older_epoch_join_data(
        &self,
        _older_epoch_sequence_id: SequenceId,
    ) -> Result<GetOlderEpochJoinDataResponse, TransportError> {
        Err(rejected("backward chaining is not supported"))
    }

    async fn get_newest_epoch_sequence_id(
        &self,
    ) -> Result<GetNewestEpochSequenceIdResponse, TransportError> {
        let inner = self.lock();
        Ok(GetNewestEpochSequenceIdResponse {
            newest_epoch_sequence_id: inner.newest_epoch()?.sequence_id,
        })
    }

    async fn authenticate_device_to_epoch(
        &self,
        epoch_id: &str,
        device_id: &str,
        body: AuthenticateDeviceToEpochBody,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        if !inner.devices.contains_key(device_id) {
            return Err(not_found(device_id));
        }

        let epoch = inner.epoch_by_id_mut(epoch_id)?;
        epoch.device_macs.insert(device_id.to_owned(), body.epoch_device_mac);

        debug!(%device_id, %epoch_id, "device authenticated");
        Ok(())
    }

    async fn get_virtual_device_recovery_secrets(
        &self,
        body: GetVirtualDeviceRecoverySecretsBody,
    ) -> Result<GetVirtualDeviceRecoverySecretsResponse, TransportError> {
        let inner = self.lock();
        let account = inner
            .account
            .as_ref()
            .filter(|account| account.virtual_device_id == body.virtual_device_id)
            .ok_or_else(|| not_found("virtual device"))?;
        let genesis = inner.epoch_by_sequence_id(SequenceId::GENESIS)?;

        Ok(GetVirtualDeviceRecoverySecretsResponse {
            epoch_id: genesis.id.clone(),
            virtual_device_encrypted_recovery_secrets: account.escrow.clone(),
            expected_virtual_device_public_key_bundle: account.virtual_device_bundle.clone(),
        })
    }

    async fn get_devices_in_epoch(
        &self,
        epoch_id: &str,
    ) -> Result<GetDevicesInEpochResponse, TransportError> {
        let inner = self.lock();
        let account = inner.account.as_ref().ok_or_else(|| not_found("account"))?;
        let epoch = inner.epoch_by_id(epoch_id)?;

        let devices = epoch
            .device_macs
            .iter()
            .filter_map(|(id, mac)| {
                let device = inner.devices.get(id)?;
                Some(DeviceInEpochSerialized {
                    id: id.clone(),
                    mac: mac.clone(),
                    key_bundle: device.bundle.common.clone(),
                })
            })
            .collect();

        Ok(GetDevicesInEpochResponse {
            devices,
            virtual_device: VirtualDeviceInEpochSerialized {
                mac: epoch.virtual_device_mac.clone(),
                key_bundle: account.virtual_device_bundle.clone(),
            },
        })
    }

    async fn open_new_epoch_based_on_current(
        &self,
        current_epoch_id: &str,
        this_device_id: &str,
        body: OpenNewEpochBasedOnCurrentBody,
    ) -> Result<OpenNewEpochBasedOnCurrentResponse, TransportError> {
        let now = self.env.now();
        let mut inner = self.lock();

        let current = inner.newest_epoch()?;
        if current.id != current_epoch_id {
            return Err(rejected("only the newest epoch can be rotated"));
        }
        if !current.device_macs.contains_key(this_device_id) {
            return Err(rejected("device is not a member of the current epoch"));
        }
        let Some(sender) = inner.devices.get(this_device_id).map(|device| device.bundle.clone())
        else {
            return Err(not_found(this_device_id));
        };
        let Some(sequence_id) = current.sequence_id.next() else {
            return Err(rejected("sequence space exhausted"));
        };

        let evicted: Vec<String> = inner
            .devices
            .iter()
            .filter(|(id, device)| id.as_str() != this_device_id && self.is_inactive(device, now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in &evicted {
            inner.devices.remove(id);
            info!(device_id = %id, "inactive device evicted");
        }

        let entropy = body.encrypted_new_epoch_entropy_for_every_device_in_epoch;
        let for_devices = entropy
            .device_id_to_encrypted_new_epoch_entropy_map
            .into_iter()
            .filter(|(id, _)| inner.devices.contains_key(id))
            .collect();

        let epoch_id = inner.assign_epoch_id();
        inner.epochs.push(StoredEpoch {
            id: epoch_id.clone(),
            sequence_id,
            device_macs: BTreeMap::from([(
                this_device_id.to_owned(),
                body.new_epoch_membership_proof.epoch_this_device_mac,
            )]),
            virtual_device_mac: body.new_epoch_membership_proof.epoch_virtual_device_mac,
            join_data: Some(JoinData {
                sender,
                for_devices,
                for_virtual_device: entropy.virtual_device_encrypted_new_epoch_entropy,
            }),
        });

        info!(%epoch_id, %sequence_id, opened_by = %this_device_id, "epoch opened");
        Ok(OpenNewEpochBasedOnCurrentResponse { opened_epoch_id: epoch_id })
    }

    async fn authenticate_device_to_epoch_and_register_device(
        &self,
        epoch_id: &str,
        body: AuthenticateDeviceToEpochAndRegisterDeviceBody,
    ) -> Result<AuthenticateDeviceToEpochAndRegisterDeviceResponse, TransportError> {
        let now = self.env.now();
        let mut inner = self.lock();
        if inner.newest_epoch()?.id != epoch_id {
            return Err(rejected("devices register against the newest epoch"));
        }

        let device_id = inner.assign_device_id();
        inner.devices.insert(device_id.clone(), StoredDevice {
            bundle: body.device_public_key_bundle,
            last_active: now,
        });
        inner.epoch_by_id_mut(epoch_id)?.device_macs.insert(device_id.clone(), body.epoch_device_mac);

        info!(%device_id, %epoch_id, "device registered");
        Ok(AuthenticateDeviceToEpochAndRegisterDeviceResponse { assigned_device_id: device_id })
    }

    async fn check_if_labyrinth_is_initialized(
        &self,
    ) -> Result<CheckIfLabyrinthIsInitializedResponse, TransportError> {
        Ok(CheckIfLabyrinthIsInitializedResponse { is_initialized: self.lock().account.is_some() })
    }

    async fn notify_about_device_activity(&self, device_id: &str) -> Result<(), TransportError> {
        let now = self.env.now();
        let mut inner = self.lock();
        let device = inner.devices.get_mut(device_id).ok_or_else(|| not_found(device_id))?;
        device.last_active = now;
        Ok(())
    }

    async fn check_if_any_device_exceed_inactivity_limit(
        &self,
    ) -> Result<CheckIfAnyDeviceExceedInactivityLimitResponse, TransportError> {
        let now = self.env.now();
        let inner = self.lock();
        let exceeded = inner.devices.values().any(|device| self.is_inactive(device, now));

        Ok(CheckIfAnyDeviceExceedInactivityLimitResponse {
            did_any_device_exceed_inactivity_limit: exceeded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SimEnv;

    #[test]
    fn flip_keeps_length_and_changes_value() {
        let mut encoded = String::from("AAAB");
        flip_first_char(&mut encoded);
        assert_eq!(encoded, "BAAB");

        flip_first_char(&mut encoded);
        assert_eq!(encoded, "AAAB");
    }

    #[test]
    fn default_inactivity_limit_is_thirty_days() {
        assert_eq!(MemoryServerConfig::default().inactivity_limit, Duration::from_secs(2_592_000));
    }

    #[tokio::test]
    async fn empty_server_is_uninitialized() {
        let server = MemoryServer::new(SimEnv::new(), MemoryServerConfig::default());

        let response = server.check_if_labyrinth_is_initialized().await.unwrap();
        assert!(!response.is_initialized);
        assert!(matches!(
            server.get_newest_epoch_sequence_id().await,
            Err(TransportError::NotFound { .. })
        ));
        assert!(!server.tamper_escrow());
        assert!(!server.tamper_virtual_device_bundle());
    }

    #[tokio::test]
    async fn backward_chaining_is_refused() {
        let server = MemoryServer::new(SimEnv::new(), MemoryServerConfig::default());

        assert!(matches!(
            server.get_older_epoch_join_data(SequenceId::GENESIS).await,
            Err(TransportError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_device_activity_is_not_found() {
        let server = MemoryServer::new(SimEnv::new(), MemoryServerConfig::default());

        assert_eq!(
            server.notify_about_device_activity("device-9").await,
            Err(TransportError::NotFound { what: "device-9".to_owned() })
        );
    }
}
