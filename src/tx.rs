//! Transactions: the decision unit carrying a set of consumed input IDs.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::id::Id;

/// An opaque identifier naming a resource a transaction consumes. Two
/// transactions sharing any input ID conflict (see [`crate::conflict`]).
pub type InputId = Id;

/// The outcome of a verifier's validity check, opaque to the engine
/// (§7: "the specific sub-kind is opaque to the engine").
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct VerificationError(pub String);

impl VerificationError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        VerificationError(reason.into())
    }
}

/// A transaction or vertex verifier.
///
/// Implementations receive only their own captures (no engine state) and
/// must be safe to invoke concurrently from multiple worker tasks under
/// shared read-only access — hence `Send + Sync`.
pub trait Verifier: Send + Sync {
    fn verify(&self) -> Result<(), VerificationError>;
}

/// A verifier that always succeeds. Used by callers that have no
/// validation logic of their own (e.g. a genesis vertex).
pub struct AlwaysValid;

impl Verifier for AlwaysValid {
    fn verify(&self) -> Result<(), VerificationError> {
        Ok(())
    }
}

/// A verifier built from a plain closure, for callers that want to inline
/// a check rather than define a named type.
pub struct FnVerifier<F>(pub F)
where
    F: Fn() -> Result<(), VerificationError> + Send + Sync;

impl<F> Verifier for FnVerifier<F>
where
    F: Fn() -> Result<(), VerificationError> + Send + Sync,
{
    fn verify(&self) -> Result<(), VerificationError> {
        (self.0)()
    }
}

/// A transaction: addressed by an [`Id`], carrying a finite immutable set
/// of consumed [`InputId`]s, an opaque payload, and a verifier.
///
/// The transaction's lifecycle `Status` is not stored here — it lives in
/// the engine's own status map (see [`crate::dag::DagStore`]), because
/// callers must not be able to mutate a submitted transaction's
/// observable state. `Transaction` itself is immutable data.
#[derive(Clone)]
pub struct Transaction {
    id: Id,
    inputs: Arc<BTreeSet<InputId>>,
    payload: Arc<Vec<u8>>,
    verifier: Arc<dyn Verifier>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl Transaction {
    pub fn new(
        id: Id,
        inputs: impl IntoIterator<Item = InputId>,
        payload: Vec<u8>,
        verifier: Arc<dyn Verifier>,
    ) -> Self {
        Transaction {
            id,
            inputs: Arc::new(inputs.into_iter().collect()),
            payload: Arc::new(payload),
            verifier,
        }
    }

    /// Convenience constructor for a transaction with no validation logic.
    pub fn trivial(id: Id, inputs: impl IntoIterator<Item = InputId>) -> Self {
        Transaction::new(id, inputs, Vec::new(), Arc::new(AlwaysValid))
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn inputs(&self) -> &BTreeSet<InputId> {
        &self.inputs
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Runs the transaction's verifier. Safe to call concurrently on the
    /// same or different transactions.
    pub fn verify(&self) -> Result<(), VerificationError> {
        self.verifier.verify()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Transaction {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failing_verifier_surfaces_its_reason() {
        let tx = Transaction::new(
            Id::generate(),
            vec![],
            vec![],
            Arc::new(FnVerifier(|| Err(VerificationError::new("bad signature")))),
        );
        let err = tx.verify().unwrap_err();
        assert_eq!(err.0, "bad signature");
    }

    #[test]
    fn inputs_are_deduplicated_and_ordered() {
        let a = Id::from_hash([2u8; 32]);
        let b = Id::from_hash([1u8; 32]);
        let tx = Transaction::trivial(Id::generate(), vec![a, b, a]);
        let ordered: Vec<_> = tx.inputs().iter().cloned().collect();
        assert_eq!(ordered, vec![b, a]);
    }
}
