//! Error types for the Labyrinth protocol core.
//!
//! One enum per layer: epoch chain invariants, recovery code handling, the
//! byte codec and the server transport. [`LabyrinthError`] is the umbrella
//! returned by the protocol phases and the orchestrator, and adds the trust
//! failures that only a compromised or buggy server can cause.

use labyrinth_crypto::CryptoError;
use thiserror::Error;

use crate::epoch::SequenceId;

/// Violations of the epoch chain invariants.
///
/// Local logic errors: never retryable, they indicate protocol misuse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EpochChainError {
    /// No epoch with this sequence id is stored
    #[error("epoch with sequence id {sequence_id} does not exist")]
    EpochDoesNotExist {
        /// Requested sequence id
        sequence_id: SequenceId,
    },

    /// An epoch with this sequence id is already stored
    #[error("epoch with sequence id {sequence_id} already exists")]
    EpochAlreadyExists {
        /// Duplicate sequence id
        sequence_id: SequenceId,
    },

    /// Epoch would leave a gap in the chain
    #[error("omitted epoch: got sequence id {actual}, expected one directly adjacent to the chain")]
    OmittedEpoch {
        /// `oldest - 1`, or `None` when the chain already starts at zero
        expected_older: Option<SequenceId>,
        /// `newest + 1`, or `None` when the sequence space is exhausted
        expected_newer: Option<SequenceId>,
        /// Sequence id that was offered
        actual: SequenceId,
    },

    /// Chain is empty
    #[error("no epoch exists")]
    NoEpochExists,

    /// Sequence id text is a negative number
    #[error("there cannot be an epoch with negative sequence id")]
    NegativeSequenceId,

    /// Sequence id text is not a canonical decimal integer
    #[error("invalid sequence id: {value:?}")]
    InvalidSequenceId {
        /// Offending text
        value: String,
    },

    /// Persisted oldest/newest pointers disagree with the stored epochs
    #[error("persisted chain bounds {oldest:?}..={newest:?} do not match stored epochs")]
    BoundsMismatch {
        /// Persisted oldest pointer
        oldest: Option<SequenceId>,
        /// Persisted newest pointer
        newest: Option<SequenceId>,
    },
}

/// Recovery code and escrow failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecoveryError {
    /// Recovery code is malformed; re-prompt the user
    #[error("invalid recovery code format: {reason}")]
    InvalidRecoveryCodeFormat {
        /// What is wrong with the code
        reason: &'static str,
    },

    /// Decrypted escrow does not match the virtual device the server vouches
    /// for
    #[error("message history recovery secrets have been corrupted")]
    CorruptedRecoverySecrets,
}

/// Byte codec failures at a serialization boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Text is not valid for the codec
    #[error("invalid encoding: {reason}")]
    InvalidEncoding {
        /// Decoder message
        reason: String,
    },

    /// Decoded bytes have the wrong length for a fixed-size field
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Required length
        expected: usize,
        /// Decoded length
        actual: usize,
    },

    /// Decoded bytes are not a valid key
    #[error("invalid key: {0}")]
    InvalidKey(#[from] CryptoError),
}

/// Failures reported by the server collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request could not be delivered or the response could not be read
    #[error("request failed: {reason}")]
    Request {
        /// Transport message
        reason: String,
    },

    /// Server has no such resource
    #[error("not found: {what}")]
    NotFound {
        /// Missing resource
        what: String,
    },

    /// Server refused the request
    #[error("rejected: {reason}")]
    Rejected {
        /// Server message
        reason: String,
    },
}

/// Errors returned by protocol phases and the orchestrator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabyrinthError {
    /// Epoch chain invariant violated
    #[error(transparent)]
    EpochChain(#[from] EpochChainError),

    /// Recovery code or escrow failure
    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    /// Primitive crypto failure, including AEAD authentication failures
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Malformed field at a serialization boundary
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Server collaborator failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Join data sender's epoch storage auth key is not signed by its device
    /// key
    #[error("sender epoch storage auth key is corrupted")]
    InvalidEpochStorageAuthKey,

    /// Server's view of the virtual device fails membership or signature
    /// checks
    #[error("epoch can't be opened when virtual device server representation is invalid")]
    InvalidVirtualDeviceServerRepresentation,
}

impl LabyrinthError {
    /// Returns true if the user can fix this by retrying with other input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Recovery(RecoveryError::InvalidRecoveryCodeFormat { .. }))
    }

    /// Returns true if this error signals a compromised or buggy server.
    ///
    /// Trust violations abort the operation and must never be retried
    /// silently.
    pub fn is_trust_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidEpochStorageAuthKey
                | Self::InvalidVirtualDeviceServerRepresentation
                | Self::Recovery(RecoveryError::CorruptedRecoverySecrets)
        )
    }

    /// Returns true if this error is transient and may succeed on retry.
    ///
    /// Only transport failures qualify. Epochs committed before the failure
    /// stay committed, so a retry resumes from the last joined epoch.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Request { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_code_format_is_user_error() {
        let err: LabyrinthError =
            RecoveryError::InvalidRecoveryCodeFormat { reason: "too short" }.into();
        assert!(err.is_user_error());
        assert!(!err.is_trust_violation());
        assert!(!err.is_transient());
    }

    #[test]
    fn trust_violations() {
        assert!(LabyrinthError::InvalidEpochStorageAuthKey.is_trust_violation());
        assert!(LabyrinthError::InvalidVirtualDeviceServerRepresentation.is_trust_violation());
        assert!(LabyrinthError::from(RecoveryError::CorruptedRecoverySecrets).is_trust_violation());
        assert!(!LabyrinthError::from(CryptoError::DecryptionFailed).is_trust_violation());
    }

    #[test]
    fn only_request_failures_are_transient() {
        let request: LabyrinthError = TransportError::Request { reason: "reset".into() }.into();
        let rejected: LabyrinthError = TransportError::Rejected { reason: "stale".into() }.into();
        let chain: LabyrinthError = EpochChainError::NoEpochExists.into();

        assert!(request.is_transient());
        assert!(!rejected.is_transient());
        assert!(!chain.is_transient());
    }

    #[test]
    fn omitted_epoch_message_names_offered_id() {
        let err = EpochChainError::OmittedEpoch {
            expected_older: None,
            expected_newer: Some(SequenceId::new(3)),
            actual: SequenceId::new(7),
        };
        assert!(err.to_string().contains("got sequence id 7"));
    }
}
