//! Fuzz target for restoring a persisted epoch chain
//!
//! Persisted sessions come back from storage the library does not control.
//! Every structural rule of the chain must be re-checked on load.
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A restored chain is contiguous and its bounds match the persisted ones
//! - Serializing a restored chain and restoring it again is lossless

#![no_main]

use std::collections::BTreeMap;

use arbitrary::Arbitrary;
use labyrinth_core::{Base64Codec, EpochChain, EpochChainSerialized, SequenceId};
use labyrinth_core::epoch::EpochSerialized;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct PersistedEpoch {
    key: KeyChoice,
    id: String,
    sequence_id: u8,
    root_key: RootKeyChoice,
}

#[derive(Debug, Arbitrary)]
enum KeyChoice {
    Matching,
    Raw(String),
}

#[derive(Debug, Arbitrary)]
enum RootKeyChoice {
    Valid([u8; 32]),
    Raw(String),
}

#[derive(Debug, Arbitrary)]
struct PersistedChain {
    epochs: Vec<PersistedEpoch>,
    oldest: Option<u8>,
    newest: Option<u8>,
}

fuzz_target!(|input: PersistedChain| {
    let codec = Base64Codec;
    let mut sequence_id_to_epoch = BTreeMap::new();
    for epoch in input.epochs {
        let key = match epoch.key {
            KeyChoice::Matching => epoch.sequence_id.to_string(),
            KeyChoice::Raw(key) => key,
        };
        let root_key = match epoch.root_key {
            RootKeyChoice::Valid(bytes) => labyrinth_core::BytesCodec::encode(&codec, &bytes),
            RootKeyChoice::Raw(text) => text,
        };
        sequence_id_to_epoch.insert(
            key,
            EpochSerialized {
                id: epoch.id,
                sequence_id: SequenceId::new(u64::from(epoch.sequence_id)),
                root_key,
            },
        );
    }

    let serialized = EpochChainSerialized {
        oldest_epoch_sequence_id: input.oldest.map(|id| SequenceId::new(u64::from(id))),
        newest_epoch_sequence_id: input.newest.map(|id| SequenceId::new(u64::from(id))),
        sequence_id_to_epoch,
    };

    let Ok(chain) = EpochChain::deserialize(&serialized, &codec) else {
        return;
    };

    let ids: Vec<u64> = chain.iter().map(|epoch| epoch.sequence_id().value()).collect();
    assert!(ids.windows(2).all(|pair| pair[1] == pair[0] + 1), "gap in restored chain: {ids:?}");
    assert_eq!(chain.len(), serialized.sequence_id_to_epoch.len());

    let again = chain.serialize(&codec);
    let restored = EpochChain::deserialize(&again, &codec).expect("restored chain reloads");
    assert_eq!(restored.serialize(&codec), again);
});
