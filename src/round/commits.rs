//! Seed Commit Store
//!
//! Per-round commitments, keyed by sequence id and uniquely indexed by
//! value. Sequence id 0 is the operator's proof commitment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::hash::{Hash256, StateHasher};

/// Sequence id reserved for the operator's proof commitment.
pub const PROOF_SEQUENCE_ID: u64 = 0;

/// Storage cost of one stored seed, released when it is deleted.
pub const RAM_COST_PER_SEED: i64 = 312;

/// One stored commitment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedCommit {
    /// Insertion order id.
    pub sequence_id: u64,
    /// Committed value.
    pub value: Hash256,
}

/// Accounting entry produced whenever a commit is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCredit {
    /// Which commit was deleted.
    pub sequence_id: u64,
    /// Resource units released.
    pub amount: i64,
}

/// Commitments for one round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStore {
    by_id: BTreeMap<u64, Hash256>,
    by_value: BTreeMap<Hash256, u64>,
    next_id: u64,
}

impl CommitStore {
    /// Create a store holding only the proof commitment.
    pub fn with_proof(proof_hash: Hash256) -> Self {
        let mut store = Self {
            by_id: BTreeMap::new(),
            by_value: BTreeMap::new(),
            next_id: PROOF_SEQUENCE_ID + 1,
        };
        store.by_id.insert(PROOF_SEQUENCE_ID, proof_hash);
        store.by_value.insert(proof_hash, PROOF_SEQUENCE_ID);
        store
    }

    /// The proof commitment, if still present.
    pub fn proof(&self) -> Option<Hash256> {
        self.by_id.get(&PROOF_SEQUENCE_ID).copied()
    }

    /// Is this value already stored?
    pub fn contains_value(&self, value: &Hash256) -> bool {
        self.by_value.contains_key(value)
    }

    /// Append a new commitment.
    ///
    /// Returns the assigned sequence id, or `None` if the value is taken.
    pub fn append(&mut self, value: Hash256) -> Option<u64> {
        if self.contains_value(&value) {
            return None;
        }
        let id = self.next_id;
        self.by_id.insert(id, value);
        self.by_value.insert(value, id);
        self.next_id += 1;
        Some(id)
    }

    /// Look up a commitment by id.
    pub fn get(&self, sequence_id: u64) -> Option<SeedCommit> {
        self.by_id.get(&sequence_id).map(|value| SeedCommit {
            sequence_id,
            value: *value,
        })
    }

    /// Delete a commitment, releasing `cost` resource units.
    pub fn consume(&mut self, sequence_id: u64, cost: i64) -> Option<(SeedCommit, ResourceCredit)> {
        let value = self.by_id.remove(&sequence_id)?;
        self.by_value.remove(&value);
        Some((
            SeedCommit { sequence_id, value },
            ResourceCredit {
                sequence_id,
                amount: cost,
            },
        ))
    }

    /// Id the next append will receive.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of stored commitments (proof included).
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Stored commitments in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = SeedCommit> + '_ {
        self.by_id.iter().map(|(id, value)| SeedCommit {
            sequence_id: *id,
            value: *value,
        })
    }

    /// Feed into a state fingerprint.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.next_id);
        hasher.update_u64(self.by_id.len() as u64);
        for (id, value) in &self.by_id {
            hasher.update_u64(*id);
            hasher.update_hash(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::sha256;

    #[test]
    fn test_proof_reserved_at_zero() {
        let proof = sha256(b"proof");
        let store = CommitStore::with_proof(proof);

        assert_eq!(store.proof(), Some(proof));
        assert_eq!(store.next_id(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_append_assigns_sequential_ids() {
        let mut store = CommitStore::with_proof(sha256(b"proof"));

        assert_eq!(store.append(sha256(b"a")), Some(1));
        assert_eq!(store.append(sha256(b"b")), Some(2));
        assert_eq!(store.append(sha256(b"c")), Some(3));

        let ids: Vec<u64> = store.iter().map(|c| c.sequence_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_duplicate_values_rejected() {
        let proof = sha256(b"proof");
        let mut store = CommitStore::with_proof(proof);

        assert!(store.append(sha256(b"a")).is_some());
        assert_eq!(store.append(sha256(b"a")), None);

        // The proof hash is part of the same index
        assert_eq!(store.append(proof), None);
        assert_eq!(store.next_id(), 2);
    }

    #[test]
    fn test_consume_releases_credit() {
        let mut store = CommitStore::with_proof(sha256(b"proof"));
        let seed = sha256(b"a");
        store.append(seed);

        let (commit, credit) = store.consume(1, RAM_COST_PER_SEED).unwrap();
        assert_eq!(commit.value, seed);
        assert_eq!(credit.amount, RAM_COST_PER_SEED);
        assert_eq!(credit.sequence_id, 1);

        assert!(store.get(1).is_none());
        assert!(!store.contains_value(&seed));
        assert!(store.consume(1, RAM_COST_PER_SEED).is_none());

        // Ids never get reused
        assert_eq!(store.append(sha256(b"b")), Some(2));
    }
}
