//! The physical device running this Labyrinth instance.

use serde::{Deserialize, Serialize};

use crate::{
    codec::BytesCodec,
    error::CodecError,
    key_bundle::{DeviceKeyBundle, DeviceKeyBundleSerialized},
};

/// A registered device: server-assigned id plus its key bundle.
#[derive(Debug, Clone)]
pub struct Device {
    id: String,
    key_bundle: DeviceKeyBundle,
}

impl Device {
    /// Pair a server-assigned id with a key bundle.
    pub fn new(id: impl Into<String>, key_bundle: DeviceKeyBundle) -> Self {
        Self { id: id.into(), key_bundle }
    }

    /// Server-assigned id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Keys of this device.
    pub fn key_bundle(&self) -> &DeviceKeyBundle {
        &self.key_bundle
    }

    /// Persisted form.
    pub fn serialize(&self, codec: &impl BytesCodec) -> DeviceSerialized {
        DeviceSerialized { id: self.id.clone(), key_bundle: self.key_bundle.serialize(codec) }
    }

    /// Restore from the persisted form.
    pub fn deserialize(
        serialized: &DeviceSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, CodecError> {
        Ok(Self::new(
            serialized.id.clone(),
            DeviceKeyBundle::deserialize(&serialized.key_bundle, codec)?,
        ))
    }
}

/// Persisted form of [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSerialized {
    /// Server-assigned id
    pub id: String,
    /// Persisted key bundle
    pub key_bundle: DeviceKeyBundleSerialized,
}
