//! The conflict index: `ConflictSet[input] = { tx : input in inputs(tx) }`.
//!
//! Grounded on `sleet::spend_map::SpendMap`, which maintains exactly this
//! relation (there: `UTXOId -> HashSet<TxHash>`) for Avalanche-style
//! double-spend detection. This module generalizes it from UTXO-specific
//! spend tracking to the spec's arbitrary `InputId`, and switches the
//! per-input bucket from a `HashSet` to a `BTreeSet` so that `conflicts()`
//! returns its answer in the ascending-ID order the decision procedure
//! requires for determinism (§4.4 / §9 "conflict iteration order
//! determinism").

use std::collections::{BTreeSet, HashMap};

use crate::id::Id;
use crate::tx::Transaction;

/// Maps each input ID to the set of transaction IDs currently registered
/// as consuming it.
#[derive(Default)]
pub struct ConflictIndex {
    inner: HashMap<Id, BTreeSet<Id>>,
}

impl ConflictIndex {
    pub fn new() -> Self {
        ConflictIndex { inner: HashMap::new() }
    }

    /// Registers `tx` against every input it consumes. Idempotent:
    /// registering the same transaction twice has no further effect.
    pub fn register(&mut self, tx: &Transaction) {
        for input in tx.inputs().iter() {
            self.inner.entry(*input).or_insert_with(BTreeSet::new).insert(tx.id());
        }
    }

    /// Returns the transactions that conflict with `tx`: the union over
    /// its inputs of each input's conflict set, minus `tx` itself, in
    /// ascending ID order.
    pub fn conflicts(&self, tx: &Transaction) -> BTreeSet<Id> {
        let mut result = BTreeSet::new();
        for input in tx.inputs().iter() {
            if let Some(set) = self.inner.get(input) {
                result.extend(set.iter().copied());
            }
        }
        result.remove(&tx.id());
        result
    }

    /// Removes `tx_id` from every conflict set for the given inputs,
    /// pruning any input whose set becomes empty.
    pub fn forget(&mut self, tx_id: Id, inputs: &BTreeSet<Id>) {
        for input in inputs.iter() {
            if let Some(set) = self.inner.get_mut(input) {
                set.remove(&tx_id);
                if set.is_empty() {
                    self.inner.remove(input);
                }
            }
        }
    }

    /// Number of distinct inputs currently tracked. Used by tests to
    /// assert the register/forget round-trip law.
    pub fn tracked_inputs(&self) -> usize {
        self.inner.len()
    }
}
