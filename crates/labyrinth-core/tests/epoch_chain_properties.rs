//! Property-based tests for the epoch chain
//!
//! These tests verify invariants that must hold for all inputs:
//!
//! 1. **Contiguity**: any sequence of boundary extensions yields exactly the
//!    inserted interval
//! 2. **No gaps**: an id not adjacent to either boundary is rejected
//! 3. **No duplicates**: an id already stored is rejected
//! 4. **Persistence**: a serialized chain restores to the same epochs, and
//!    any removed interior epoch is detected

use labyrinth_core::{
    Base64Codec, BytesCodec, Epoch, EpochChain, EpochChainError, LabyrinthError, SequenceId,
};
use proptest::prelude::*;

fn epoch(sequence_id: u64) -> Epoch {
    let mut root_key = [0u8; 32];
    root_key[..8].copy_from_slice(&sequence_id.to_le_bytes());
    Epoch::new(format!("epoch-{sequence_id}"), SequenceId::new(sequence_id), root_key)
}

/// Start id plus a list of directions: `true` extends newest, `false` oldest.
fn extensions() -> impl Strategy<Value = (u64, Vec<bool>)> {
    (64u64..1_000_000, prop::collection::vec(any::<bool>(), 0..48))
}

fn build(start: u64, directions: &[bool]) -> (EpochChain, u64, u64) {
    let mut chain = EpochChain::new();
    chain.add(epoch(start)).unwrap();

    let (mut oldest, mut newest) = (start, start);
    for &towards_newest in directions {
        if towards_newest {
            newest += 1;
            chain.add(epoch(newest)).unwrap();
        } else {
            oldest -= 1;
            chain.add(epoch(oldest)).unwrap();
        }
    }
    (chain, oldest, newest)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Property: boundary extensions always leave the exact interval
    #[test]
    fn prop_extensions_stay_contiguous((start, directions) in extensions()) {
        let (chain, oldest, newest) = build(start, &directions);

        prop_assert_eq!(chain.len() as u64, newest - oldest + 1);
        prop_assert_eq!(chain.get_oldest()?.sequence_id(), SequenceId::new(oldest));
        prop_assert_eq!(chain.get_newest()?.sequence_id(), SequenceId::new(newest));

        let ids: Vec<u64> = chain.iter().map(|epoch| epoch.sequence_id().value()).collect();
        let expected: Vec<u64> = (oldest..=newest).collect();
        prop_assert_eq!(ids, expected);
    }

    /// Property: a non-adjacent id is rejected and the chain is unchanged
    #[test]
    fn prop_gap_always_fails(
        (start, directions) in extensions(),
        distance in 2u64..1000,
        towards_newest in any::<bool>(),
    ) {
        let (mut chain, oldest, newest) = build(start, &directions);
        let target = if towards_newest { newest + distance } else { oldest.saturating_sub(distance) };
        prop_assume!(target + 1 < oldest || target > newest + 1);

        let result = chain.add(epoch(target));
        let is_omitted = matches!(result, Err(EpochChainError::OmittedEpoch { .. }));
        prop_assert!(is_omitted);
        prop_assert_eq!(chain.len() as u64, newest - oldest + 1);
    }

    /// Property: re-adding any stored id fails with `EpochAlreadyExists`
    #[test]
    fn prop_duplicate_always_fails(
        (start, directions) in extensions(),
        pick in any::<prop::sample::Index>(),
    ) {
        let (mut chain, oldest, newest) = build(start, &directions);
        let target = oldest + pick.index((newest - oldest + 1) as usize) as u64;

        prop_assert_eq!(
            chain.add(epoch(target)),
            Err(EpochChainError::EpochAlreadyExists { sequence_id: SequenceId::new(target) })
        );
    }

    /// Property: serialization restores every epoch byte for byte
    #[test]
    fn prop_serialized_chain_restores((start, directions) in extensions()) {
        let codec = Base64Codec;
        let (chain, _, _) = build(start, &directions);

        let restored = EpochChain::deserialize(&chain.serialize(&codec), &codec)?;
        prop_assert_eq!(restored.len(), chain.len());
        for (a, b) in restored.iter().zip(chain.iter()) {
            prop_assert_eq!(a, b);
        }
    }

    /// Property: dropping an interior epoch from the persisted form is detected
    #[test]
    fn prop_serialized_gap_is_detected(
        start in 0u64..1_000_000,
        len in 3u64..32,
        pick in any::<prop::sample::Index>(),
    ) {
        let codec = Base64Codec;
        let (chain, _, _) = build(start, &vec![true; (len - 1) as usize]);
        let interior = start + 1 + pick.index((len - 2) as usize) as u64;

        let mut serialized = chain.serialize(&codec);
        serialized.sequence_id_to_epoch.remove(&interior.to_string());

        let result = EpochChain::deserialize(&serialized, &codec);
        let is_omitted = matches!(
            result,
            Err(LabyrinthError::EpochChain(EpochChainError::OmittedEpoch { .. }))
        );
        prop_assert!(is_omitted);
    }

    /// Property: canonical decimal strings round-trip through `SequenceId`
    #[test]
    fn prop_sequence_id_decimal_roundtrip(value in any::<u64>()) {
        let id = SequenceId::new(value);
        prop_assert_eq!(id.to_string().parse::<SequenceId>()?, id);
    }
}

#[test]
fn negative_sequence_id_is_rejected() {
    assert_eq!("-3".parse::<SequenceId>(), Err(EpochChainError::NegativeSequenceId));
}

#[test]
fn empty_chain_operations_fail() {
    let chain = EpochChain::new();
    assert_eq!(chain.get_oldest().unwrap_err(), EpochChainError::NoEpochExists);
    assert_eq!(chain.get_newest().unwrap_err(), EpochChainError::NoEpochExists);
}

#[test]
fn root_key_encoding_is_codec_output() {
    let codec = Base64Codec;
    let mut chain = EpochChain::new();
    chain.add(epoch(0)).unwrap();

    let serialized = chain.serialize(&codec);
    assert_eq!(serialized.sequence_id_to_epoch["0"].root_key, codec.encode(epoch(0).root_key()));
}
