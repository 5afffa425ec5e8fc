//! Epochs and the gap-free epoch chain.
//!
//! An epoch is one 32-byte root key at one position of the account's key
//! sequence. The chain stores a contiguous run of them:
//!
//! ```text
//! oldest                      newest
//!   │                           │
//!   ▼                           ▼
//! ┌───┐   ┌───┐   ┌───┐       ┌───┐
//! │ s │ ─ │s+1│ ─ │s+2│ ─ … ─ │ n │      add() extends either end by one
//! └───┘   └───┘   └───┘       └───┘
//! ```
//!
//! # Invariants
//!
//! - A non-empty chain's sequence ids are exactly `[oldest, newest]`
//! - Epochs are immutable once added
//! - A failed `add` leaves the chain unchanged

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use zeroize::Zeroize;

use crate::{
    codec::BytesCodec,
    error::{EpochChainError, LabyrinthError},
};

/// Length of every epoch root key
pub const ROOT_KEY_LENGTH: usize = 32;

/// Position of an epoch in the account's key sequence.
///
/// Travels as a canonical decimal string on the wire and in persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SequenceId(u64);

impl SequenceId {
    /// Sequence id of the first epoch
    pub const GENESIS: Self = Self(0);

    /// Wrap a raw sequence number.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw sequence number.
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Following sequence id, `None` when the sequence space is exhausted.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }

    /// Preceding sequence id, `None` for genesis.
    pub fn previous(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SequenceId {
    type Err = EpochChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EpochChainError::InvalidSequenceId { value: s.to_owned() };

        if let Some(magnitude) = s.strip_prefix('-') {
            return if !magnitude.is_empty() && magnitude.bytes().all(|b| b.is_ascii_digit()) {
                Err(EpochChainError::NegativeSequenceId)
            } else {
                Err(invalid())
            };
        }

        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        // "007" and "7" would name different map keys
        if s.len() > 1 && s.starts_with('0') {
            return Err(invalid());
        }

        s.parse::<u64>().map(Self).map_err(|_| invalid())
    }
}

impl Serialize for SequenceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SequenceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}

/// One root key at one position of the chain.
///
/// The root key is zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Epoch {
    id: String,
    sequence_id: SequenceId,
    root_key: [u8; ROOT_KEY_LENGTH],
}

impl Epoch {
    /// Create an epoch from its server-assigned id.
    pub fn new(id: impl Into<String>, sequence_id: SequenceId, root_key: [u8; ROOT_KEY_LENGTH]) -> Self {
        Self { id: id.into(), sequence_id, root_key }
    }

    /// Opaque server-assigned id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Position in the chain.
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    /// Shared root key.
    pub fn root_key(&self) -> &[u8; ROOT_KEY_LENGTH] {
        &self.root_key
    }
}

impl Drop for Epoch {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Epoch")
            .field("id", &self.id)
            .field("sequence_id", &self.sequence_id)
            .finish_non_exhaustive()
    }
}

/// Append-only, gap-free ledger of epochs keyed by sequence id.
#[derive(Debug, Clone, Default)]
pub struct EpochChain {
    epochs: BTreeMap<SequenceId, Epoch>,
}

impl EpochChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an epoch directly before the oldest or directly after the newest.
    ///
    /// The first epoch of an empty chain may have any sequence id.
    ///
    /// # Errors
    ///
    /// - `EpochAlreadyExists`: sequence id is already stored
    /// - `OmittedEpoch`: sequence id is not adjacent to either end
    pub fn add(&mut self, epoch: Epoch) -> Result<(), EpochChainError> {
        let sequence_id = epoch.sequence_id();
        if self.epochs.contains_key(&sequence_id) {
            return Err(EpochChainError::EpochAlreadyExists { sequence_id });
        }

        if let (Some(oldest), Some(newest)) = (self.oldest_id(), self.newest_id()) {
            let expected_older = oldest.previous();
            let expected_newer = newest.next();

            if Some(sequence_id) != expected_older && Some(sequence_id) != expected_newer {
                return Err(EpochChainError::OmittedEpoch {
                    expected_older,
                    expected_newer,
                    actual: sequence_id,
                });
            }
        }

        self.epochs.insert(sequence_id, epoch);
        debug_assert!(self.is_contiguous());
        Ok(())
    }

    /// Epoch with the given sequence id.
    ///
    /// # Errors
    ///
    /// - `EpochDoesNotExist`: not stored
    pub fn get_epoch(&self, sequence_id: SequenceId) -> Result<&Epoch, EpochChainError> {
        self.epochs.get(&sequence_id).ok_or(EpochChainError::EpochDoesNotExist { sequence_id })
    }

    /// Oldest stored epoch.
    ///
    /// # Errors
    ///
    /// - `NoEpochExists`: chain is empty
    pub fn get_oldest(&self) -> Result<&Epoch, EpochChainError> {
        self.epochs.values().next().ok_or(EpochChainError::NoEpochExists)
    }

    /// Newest stored epoch.
    ///
    /// # Errors
    ///
    /// - `NoEpochExists`: chain is empty
    pub fn get_newest(&self) -> Result<&Epoch, EpochChainError> {
        self.epochs.values().next_back().ok_or(EpochChainError::NoEpochExists)
    }

    /// Whether an epoch with this sequence id is stored.
    pub fn is_epoch_present(&self, sequence_id: SequenceId) -> bool {
        self.epochs.contains_key(&sequence_id)
    }

    /// Number of stored epochs.
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    /// Whether the chain holds no epoch.
    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Epochs from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Epoch> {
        self.epochs.values()
    }

    /// Persisted form, byte fields encoded through `codec`.
    pub fn serialize(&self, codec: &impl BytesCodec) -> EpochChainSerialized {
        EpochChainSerialized {
            oldest_epoch_sequence_id: self.oldest_id(),
            newest_epoch_sequence_id: self.newest_id(),
            sequence_id_to_epoch: self
                .epochs
                .iter()
                .map(|(sequence_id, epoch)| {
                    let serialized = EpochSerialized {
                        id: epoch.id.clone(),
                        sequence_id: *sequence_id,
                        root_key: codec.encode(&epoch.root_key),
                    };
                    (sequence_id.to_string(), serialized)
                })
                .collect(),
        }
    }

    /// Restore a chain, re-validating every invariant.
    ///
    /// # Errors
    ///
    /// - `EpochChain`: map key disagrees with the embedded sequence id, the
    ///   ids leave a gap, or the persisted bounds do not match
    /// - `Codec`: a root key does not decode to 32 bytes
    pub fn deserialize(
        serialized: &EpochChainSerialized,
        codec: &impl BytesCodec,
    ) -> Result<Self, LabyrinthError> {
        let mut epochs = Vec::with_capacity(serialized.sequence_id_to_epoch.len());
        for (key, epoch) in &serialized.sequence_id_to_epoch {
            let sequence_id: SequenceId = key.parse()?;
            if sequence_id != epoch.sequence_id {
                return Err(EpochChainError::InvalidSequenceId { value: key.clone() }.into());
            }
            let root_key = codec.decode_array::<ROOT_KEY_LENGTH>(&epoch.root_key)?;
            epochs.push(Epoch::new(epoch.id.clone(), sequence_id, root_key));
        }

        // Map keys sort as strings, "10" before "9"
        epochs.sort_by_key(Epoch::sequence_id);

        let mut chain = Self::new();
        for epoch in epochs {
            chain.add(epoch)?;
        }

        if chain.oldest_id() != serialized.oldest_epoch_sequence_id
            || chain.newest_id() != serialized.newest_epoch_sequence_id
        {
            return Err(EpochChainError::BoundsMismatch {
                oldest: serialized.oldest_epoch_sequence_id,
                newest: serialized.newest_epoch_sequence_id,
            }
            .into());
        }

        Ok(chain)
    }

    fn oldest_id(&self) -> Option<SequenceId> {
        self.epochs.keys().next().copied()
    }

    fn newest_id(&self) -> Option<SequenceId> {
        self.epochs.keys().next_back().copied()
    }

    fn is_contiguous(&self) -> bool {
        match (self.oldest_id(), self.newest_id()) {
            (Some(oldest), Some(newest)) => {
                (newest.value() - oldest.value()) as usize + 1 == self.epochs.len()
            },
            _ => self.epochs.is_empty(),
        }
    }
}

/// Persisted epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSerialized {
    /// Server-assigned id
    pub id: String,
    /// Decimal sequence id
    pub sequence_id: SequenceId,
    /// Codec-encoded root key
    pub root_key: String,
}

/// Persisted epoch chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochChainSerialized {
    /// Newest sequence id, `None` for an empty chain
    pub newest_epoch_sequence_id: Option<SequenceId>,
    /// Oldest sequence id, `None` for an empty chain
    pub oldest_epoch_sequence_id: Option<SequenceId>,
    /// Epochs keyed by decimal sequence id
    pub sequence_id_to_epoch: BTreeMap<String, EpochSerialized>,
}
