//! Self-certifying key bundles for devices and the virtual device.
//!
//! Every bundle carries a device key plus sub-keys whose public halves are
//! signed by that device key under a dedicated use-case byte:
//!
//! ```text
//! device key ──sign(0x30)──► epoch storage key       "I can receive"
//!            └─sign(0x31)──► epoch storage auth key  "I may distribute"
//! ```
//!
//! Virtual devices only ever receive epoch entropy, so their bundle is the
//! common part alone. Physical devices embed the common part and add the
//! auth key used when they open a new epoch.

use labyrinth_crypto::{PrivateKey, PublicKey};
use serde::{Deserialize, Serialize};

use crate::{codec::BytesCodec, env::Environment, error::CodecError};

/// Use-case byte for the epoch storage key signature
pub const EPOCH_STORAGE_KEY_USE_CASE: u8 = 0x30;

/// Use-case byte for the epoch storage auth key signature
pub const EPOCH_STORAGE_AUTH_KEY_USE_CASE: u8 = 0x31;

/// Private keys shared by devices and the virtual device.
#[derive(Debug, Clone)]
pub struct CommonPrivateKeyBundle {
    /// Identity key, signs the sub-keys
    pub device_key: PrivateKey,
    /// Receives distributed epoch entropy
    pub epoch_storage_key: PrivateKey,
}

impl CommonPrivateKeyBundle {
    /// Generate fresh keys.
    pub fn generate(env: &impl Environment) -> Self {
        Self {
            device_key: PrivateKey::from_seed(&env.random_array()),
            epoch_storage_key: PrivateKey::from_seed(&env.random_array()),
        }
    }

    /// Derive the self-signed public bundle.
    pub fn public_bundle(&self) -> CommonPublicKeyBundle {
        let epoch_storage_key = self.epoch_storage_key.public_key();
        let epoch_storage_key_sig = self
            .device_key
            .sign(EPOCH_STORAGE_KEY_USE_CASE, &epoch_storage_key.to_x25519_bytes())
            .to_vec();

        CommonPublicKeyBundle {
            device_key: self.device_key.public_key(),
            epoch_storage_key,
            epoch_storage_key_sig,
        }
    }
}

/// Public keys shared by devices and the virtual device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonPublicKeyBundle {
    /// Identity key
    pub device_key: PublicKey,
    /// Encryption target for epoch entropy
    pub epoch_storage_key: PublicKey,
    /// `device_key` signature over the storage key's X25519 bytes
    pub epoch_storage_key_sig: Vec<u8>,
}

impl CommonPublicKeyBundle {
    /// Whether the storage key is signed by the device key.
    pub fn has_valid_epoch_storage_key(&self) -> bool {
        self.device_key.verify(
            &self.epoch_storage_key_sig,
            EPOCH_STORAGE_KEY_USE_CASE,
            &self.epoch_storage_key.to_x25519_bytes(),
        )
    }

    /// Wire form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> CommonPublicKeyBundleSerialized {
        CommonPublicKeyBundleSerialized {
            device_key_pub: codec.encode(self.device_key.as_bytes()),
            epoch_storage_key_pub: codec.encode(self.epoch_storage_key.as_bytes()),
            epoch_storage_key_sig: codec.encode(&self.epoch_storage_key_sig),
        }
    }

    /// Parse the wire form. Signatures are not checked here.
    pub fn deserialize(
        serialized: &CommonPublicKeyBundleSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            device_key: codec.decode_public_key(&serialized.device_key_pub)?,
            epoch_storage_key: codec.decode_public_key(&serialized.epoch_storage_key_pub)?,
            epoch_storage_key_sig: codec.decode(&serialized.epoch_storage_key_sig)?,
        })
    }
}

/// Wire form of [`CommonPublicKeyBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonPublicKeyBundleSerialized {
    /// Encoded device key
    pub device_key_pub: String,
    /// Encoded epoch storage key
    pub epoch_storage_key_pub: String,
    /// Encoded signature
    pub epoch_storage_key_sig: String,
}

/// Private keys of a physical device.
#[derive(Debug, Clone)]
pub struct DevicePrivateKeyBundle {
    /// Keys shared with the virtual device layout
    pub common: CommonPrivateKeyBundle,
    /// Authenticates entropy this device distributes
    pub epoch_storage_auth_key: PrivateKey,
}

impl DevicePrivateKeyBundle {
    /// Generate fresh keys.
    pub fn generate(env: &impl Environment) -> Self {
        Self {
            common: CommonPrivateKeyBundle::generate(env),
            epoch_storage_auth_key: PrivateKey::from_seed(&env.random_array()),
        }
    }

    /// Derive the self-signed public bundle.
    pub fn public_bundle(&self) -> DevicePublicKeyBundle {
        let epoch_storage_auth_key = self.epoch_storage_auth_key.public_key();
        let epoch_storage_auth_key_sig = self
            .common
            .device_key
            .sign(EPOCH_STORAGE_AUTH_KEY_USE_CASE, &epoch_storage_auth_key.to_x25519_bytes())
            .to_vec();

        DevicePublicKeyBundle {
            common: self.common.public_bundle(),
            epoch_storage_auth_key,
            epoch_storage_auth_key_sig,
        }
    }

    /// Persisted form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> DevicePrivateKeyBundleSerialized {
        DevicePrivateKeyBundleSerialized {
            device_key_priv: codec.encode_private_key(&self.common.device_key),
            epoch_storage_key_priv: codec.encode_private_key(&self.common.epoch_storage_key),
            epoch_storage_auth_key_priv: codec.encode_private_key(&self.epoch_storage_auth_key),
        }
    }

    /// Restore from the persisted form.
    pub fn deserialize(
        serialized: &DevicePrivateKeyBundleSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            common: CommonPrivateKeyBundle {
                device_key: codec.decode_private_key(&serialized.device_key_priv)?,
                epoch_storage_key: codec.decode_private_key(&serialized.epoch_storage_key_priv)?,
            },
            epoch_storage_auth_key: codec
                .decode_private_key(&serialized.epoch_storage_auth_key_priv)?,
        })
    }
}

/// Public keys of a physical device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePublicKeyBundle {
    /// Keys shared with the virtual device layout
    pub common: CommonPublicKeyBundle,
    /// Sender key for distributed entropy
    pub epoch_storage_auth_key: PublicKey,
    /// `device_key` signature over the auth key's X25519 bytes
    pub epoch_storage_auth_key_sig: Vec<u8>,
}

impl DevicePublicKeyBundle {
    /// Whether the auth key is signed by the device key.
    pub fn has_valid_epoch_storage_auth_key(&self) -> bool {
        self.common.device_key.verify(
            &self.epoch_storage_auth_key_sig,
            EPOCH_STORAGE_AUTH_KEY_USE_CASE,
            &self.epoch_storage_auth_key.to_x25519_bytes(),
        )
    }

    /// Wire form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> DevicePublicKeyBundleSerialized {
        DevicePublicKeyBundleSerialized {
            common: self.common.serialize(codec),
            epoch_storage_auth_key_pub: codec.encode(self.epoch_storage_auth_key.as_bytes()),
            epoch_storage_auth_key_sig: codec.encode(&self.epoch_storage_auth_key_sig),
        }
    }

    /// Parse the wire form. Signatures are not checked here.
    pub fn deserialize(
        serialized: &DevicePublicKeyBundleSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            common: CommonPublicKeyBundle::deserialize(&serialized.common, codec)?,
            epoch_storage_auth_key: codec.decode_public_key(&serialized.epoch_storage_auth_key_pub)?,
            epoch_storage_auth_key_sig: codec.decode(&serialized.epoch_storage_auth_key_sig)?,
        })
    }
}

/// Wire form of [`DevicePublicKeyBundle`]: the common fields plus the auth key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePublicKeyBundleSerialized {
    /// Common fields, flattened into the same object
    #[serde(flatten)]
    pub common: CommonPublicKeyBundleSerialized,
    /// Encoded auth key
    pub epoch_storage_auth_key_pub: String,
    /// Encoded signature
    pub epoch_storage_auth_key_sig: String,
}

/// Persisted form of [`DevicePrivateKeyBundle`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePrivateKeyBundleSerialized {
    /// Encoded device key
    pub device_key_priv: String,
    /// Encoded epoch storage key
    pub epoch_storage_key_priv: String,
    /// Encoded epoch storage auth key
    pub epoch_storage_auth_key_priv: String,
}

impl std::fmt::Debug for DevicePrivateKeyBundleSerialized {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DevicePrivateKeyBundleSerialized(..)")
    }
}

/// A physical device's private and public keys.
#[derive(Debug, Clone)]
pub struct DeviceKeyBundle {
    /// Private keys
    pub private: DevicePrivateKeyBundle,
    /// Public keys derived from `private`
    pub public: DevicePublicKeyBundle,
}

impl DeviceKeyBundle {
    /// Generate a fresh bundle.
    pub fn generate(env: &impl Environment) -> Self {
        Self::from_private(DevicePrivateKeyBundle::generate(env))
    }

    /// Complete a bundle from its private keys.
    pub fn from_private(private: DevicePrivateKeyBundle) -> Self {
        let public = private.public_bundle();
        Self { private, public }
    }

    /// Persisted form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> DeviceKeyBundleSerialized {
        DeviceKeyBundleSerialized {
            private: self.private.serialize(codec),
            public: self.public.serialize(codec),
        }
    }

    /// Restore from the persisted form.
    pub fn deserialize(
        serialized: &DeviceKeyBundleSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            private: DevicePrivateKeyBundle::deserialize(&serialized.private, codec)?,
            public: DevicePublicKeyBundle::deserialize(&serialized.public, codec)?,
        })
    }
}

/// Persisted form of [`DeviceKeyBundle`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceKeyBundleSerialized {
    /// Private half
    #[serde(rename = "priv")]
    pub private: DevicePrivateKeyBundleSerialized,
    /// Public half
    #[serde(rename = "pub")]
    pub public: DevicePublicKeyBundleSerialized,
}

/// The virtual device's private and public keys.
#[derive(Debug, Clone)]
pub struct VirtualDeviceKeyBundle {
    /// Private keys
    pub private: CommonPrivateKeyBundle,
    /// Public keys derived from `private`
    pub public: CommonPublicKeyBundle,
}

impl VirtualDeviceKeyBundle {
    /// Generate a fresh bundle.
    pub fn generate(env: &impl Environment) -> Self {
        Self::from_private(CommonPrivateKeyBundle::generate(env))
    }

    /// Complete a bundle from its private keys.
    pub fn from_private(private: CommonPrivateKeyBundle) -> Self {
        let public = private.public_bundle();
        Self { private, public }
    }
}
