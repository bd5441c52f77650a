//! Vertices: DAG nodes carrying an ordered sequence of transactions.

use std::fmt;
use std::sync::Arc;

use crate::id::Id;
use crate::tx::{AlwaysValid, Transaction, Verifier};

/// A vertex: addressed by an [`Id`], referencing a set of parent vertex
/// IDs, carrying an ordered sequence of [`Transaction`]s.
///
/// As with [`Transaction`], the vertex's `Status` is not stored on this
/// struct; it lives in the engine's status map. `Vertex` is immutable
/// data once constructed.
#[derive(Clone)]
pub struct Vertex {
    id: Id,
    /// Parent vertex IDs, kept sorted ascending (§3: "ordered-by-ID set
    /// of parent vertex IDs").
    parents: Vec<Id>,
    /// 1 + max(parent heights), or 1 if no parents. Computed by the DAG
    /// store at submission time, not by the caller, so it cannot disagree
    /// with the store's view of the graph.
    height: u64,
    txs: Vec<Transaction>,
    payload: Arc<Vec<u8>>,
    /// Caller-assigned priority stored on the vertex itself (§3f). This is
    /// distinct from the batch-time priority a [`crate::scheduler::ParallelVertex`]
    /// carries — the latter is what the scheduler actually orders on.
    priority: u64,
    verifier: Arc<dyn Verifier>,
}

impl fmt::Debug for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Vertex")
            .field("id", &self.id)
            .field("parents", &self.parents)
            .field("height", &self.height)
            .field("txs", &self.txs.len())
            .field("priority", &self.priority)
            .finish()
    }
}

impl Vertex {
    /// Constructs a vertex. `height` is not supplied here: it is derived
    /// by the DAG store from the registered parents at submission time
    /// (see [`crate::dag::DagStore::submit`]), which is the only place
    /// the true parent heights are known.
    pub fn new(
        id: Id,
        mut parents: Vec<Id>,
        txs: Vec<Transaction>,
        payload: Vec<u8>,
        priority: u64,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        parents.sort();
        parents.dedup();
        Vertex { id, parents, height: 0, txs, payload: Arc::new(payload), priority, verifier }
    }

    /// Convenience constructor for a vertex with no structural validation
    /// of its own (only its transactions are individually verified).
    pub fn trivial(id: Id, parents: Vec<Id>, txs: Vec<Transaction>, priority: u64) -> Self {
        Vertex::new(id, parents, txs, Vec::new(), priority, Arc::new(AlwaysValid))
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parents(&self) -> &[Id] {
        &self.parents
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub(crate) fn set_height(&mut self, height: u64) {
        self.height = height;
    }

    pub fn txs(&self) -> &[Transaction] {
        &self.txs
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn priority(&self) -> u64 {
        self.priority
    }

    /// Runs the vertex's own (structural) verifier; does not verify its
    /// contained transactions (see [`crate::scheduler`]).
    pub fn verify(&self) -> Result<(), crate::tx::VerificationError> {
        self.verifier.verify()
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Vertex {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parents_are_sorted_and_deduplicated() {
        let a = Id::from_hash([3u8; 32]);
        let b = Id::from_hash([1u8; 32]);
        let v = Vertex::trivial(Id::generate(), vec![a, b, a], vec![], 0);
        assert_eq!(v.parents(), &[b, a]);
    }
}
