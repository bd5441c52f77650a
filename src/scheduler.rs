//! The parallel verification scheduler (§4.3).
//!
//! Farms vertex (and contained transaction) verification out across a
//! bounded worker set. There is no direct teacher analogue — `sleet` is
//! actor-based and verifies transactions one at a time on receipt — so
//! the concurrency primitives here are grounded instead on the bare
//! `tokio::sync::Semaphore` + `tokio::spawn` admission pattern used
//! throughout the wider pack's async executors (e.g. the level-by-level
//! DAG executor in `other_examples`), and the priority-ordered admission
//! is grounded on `priority_queue`, which `zfx_subzero::ice::dissemination`
//! already depends on for exactly this kind of "highest priority goes
//! first" bookkeeping.

use std::cmp::Reverse;
use std::sync::Arc;

use priority_queue::PriorityQueue;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::id::Id;
use crate::tx::VerificationError;
use crate::vertex::Vertex;

/// A vertex paired with the batch-time priority the scheduler orders on.
///
/// This is the single definition the design notes (§9) call for,
/// replacing the teacher-pattern's drifting "VertexAdapter" /
/// "ParallelVertex" duplicate: `Vertex` already carries its own stored
/// priority (§3f), and `ParallelVertex` is the scheduler-facing capability
/// pairing a vertex with the priority this particular batch submission
/// should be ordered by — the two may differ (e.g. a caller re-submitting
/// the same vertex at a higher urgency).
pub struct ParallelVertex {
    pub vertex: Vertex,
    pub priority: u64,
}

impl ParallelVertex {
    pub fn new(vertex: Vertex, priority: u64) -> Self {
        ParallelVertex { vertex, priority }
    }

    /// Uses the vertex's own stored priority as the batch priority.
    pub fn from_vertex(vertex: Vertex) -> Self {
        let priority = vertex.priority();
        ParallelVertex { vertex, priority }
    }
}

/// Per-vertex verification outcome.
pub enum VertexOutcome {
    /// The vertex's own structural verifier failed: the vertex and every
    /// contained transaction are rejected.
    VertexFailed(VerificationError),
    /// The vertex verified; each contained transaction's own result is
    /// reported in vertex-declared order. A transaction failure here
    /// rejects only that transaction.
    TxResults(Vec<(Id, Result<(), VerificationError>)>),
}

/// One vertex's result, tagged with its position in the original batch
/// (needed to report "the first failure by batch index", not by
/// completion order).
pub struct BatchItemResult {
    pub batch_index: usize,
    pub vertex_id: Id,
    pub outcome: VertexOutcome,
}

pub struct BatchOutcome {
    pub results: Vec<BatchItemResult>,
    pub cancelled: bool,
}

impl BatchOutcome {
    /// The earliest (by original batch position) item that contains any
    /// failure, vertex- or transaction-level.
    pub fn first_failure(&self) -> Option<&BatchItemResult> {
        self.results
            .iter()
            .filter(|r| match &r.outcome {
                VertexOutcome::VertexFailed(_) => true,
                VertexOutcome::TxResults(results) => results.iter().any(|(_, r)| r.is_err()),
            })
            .min_by_key(|r| r.batch_index)
    }
}

/// Verifies a batch of vertices across at most `max_workers` concurrent
/// tasks, admitted in descending-priority / ascending-ID order (§4.3
/// item 1), and drains every admitted task to completion regardless of
/// individual failures (§4.3 item 3) — only cancellation suppresses
/// further admission (§4.3 "Cancellation").
pub async fn verify_batch(
    batch: Vec<ParallelVertex>,
    max_workers: usize,
    cancel: CancellationToken,
) -> BatchOutcome {
    let max_workers = max_workers.max(1);

    let mut indexed: Vec<Option<ParallelVertex>> = Vec::with_capacity(batch.len());
    let mut admission: PriorityQueue<usize, (u64, Reverse<Id>)> = PriorityQueue::new();
    for (batch_index, pv) in batch.into_iter().enumerate() {
        // Priority key pops highest `priority` first; `Reverse(id)` breaks
        // ties toward the *smallest* vertex ID, matching §4.3 item 1
        // ("descending priority ... ties broken by ascending vertex ID").
        let key = (pv.priority, Reverse(pv.vertex.id()));
        indexed.push(Some(pv));
        admission.push(batch_index, key);
    }

    let semaphore = Arc::new(Semaphore::new(max_workers));
    let mut join_set = tokio::task::JoinSet::new();
    let mut cancelled = false;

    while let Some((batch_index, _priority)) = admission.pop() {
        let pv = indexed[batch_index].take().expect("each batch index admitted once");
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => permit.expect("semaphore never closed"),
        };
        let vertex_id = pv.vertex.id();
        debug!(vertex = %vertex_id, priority = pv.priority, batch_index, "admitting vertex for verification");
        join_set.spawn(async move {
            let _permit = permit;
            let outcome = verify_one(&pv.vertex);
            BatchItemResult { batch_index, vertex_id, outcome }
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(item) => {
                if let VertexOutcome::VertexFailed(e) = &item.outcome {
                    warn!(vertex = %item.vertex_id, error = %e, "vertex verification failed");
                }
                results.push(item);
            }
            Err(join_err) => {
                warn!(error = %join_err, "verification task panicked");
            }
        }
    }
    results.sort_by_key(|r| r.batch_index);

    BatchOutcome { results, cancelled }
}

fn verify_one(vertex: &Vertex) -> VertexOutcome {
    if let Err(e) = vertex.verify() {
        return VertexOutcome::VertexFailed(e);
    }
    let tx_results =
        vertex.txs().iter().map(|tx| (tx.id(), tx.verify())).collect::<Vec<_>>();
    VertexOutcome::TxResults(tx_results)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tx::{AlwaysValid, FnVerifier, Transaction};
    use std::sync::Mutex;

    fn vertex_with_priority(id: [u8; 32], priority: u64) -> Vertex {
        Vertex::trivial(Id::from_hash(id), vec![], vec![], priority)
    }

    #[tokio::test]
    async fn admits_in_descending_priority_then_ascending_id_order() {
        let order: Arc<Mutex<Vec<Id>>> = Arc::new(Mutex::new(Vec::new()));

        let make = |hash: [u8; 32], priority: u64, order: Arc<Mutex<Vec<Id>>>| {
            let id = Id::from_hash(hash);
            let verifier = FnVerifier(move || {
                order.lock().unwrap().push(id);
                Ok(())
            });
            ParallelVertex::new(
                Vertex::new(id, vec![], vec![], vec![], priority, Arc::new(verifier)),
                priority,
            )
        };

        let batch = vec![
            make([1; 32], 1, order.clone()),
            make([2; 32], 100, order.clone()),
            make([3; 32], 50, order.clone()),
        ];

        let outcome = verify_batch(batch, 1, CancellationToken::new()).await;
        assert!(!outcome.cancelled);
        assert!(outcome.first_failure().is_none());

        let observed = order.lock().unwrap().clone();
        assert_eq!(
            observed,
            vec![Id::from_hash([2; 32]), Id::from_hash([3; 32]), Id::from_hash([1; 32])]
        );
    }

    #[tokio::test]
    async fn vertex_failure_rejects_whole_vertex() {
        let bad = Vertex::new(
            Id::from_hash([9; 32]),
            vec![],
            vec![Transaction::trivial(Id::from_hash([10; 32]), vec![])],
            vec![],
            0,
            Arc::new(FnVerifier(|| Err(VerificationError::new("malformed")))),
        );
        let outcome = verify_batch(vec![ParallelVertex::new(bad, 0)], 2, CancellationToken::new()).await;
        match &outcome.results[0].outcome {
            VertexOutcome::VertexFailed(_) => {}
            _ => panic!("expected vertex failure"),
        }
    }

    #[tokio::test]
    async fn tx_failure_is_local_and_siblings_still_run() {
        let failing_tx = Transaction::new(
            Id::from_hash([1; 32]),
            vec![],
            vec![],
            Arc::new(FnVerifier(|| Err(VerificationError::new("bad tx")))),
        );
        let ok_tx = Transaction::new(Id::from_hash([2; 32]), vec![], vec![], Arc::new(AlwaysValid));
        let v = Vertex::trivial(Id::from_hash([3; 32]), vec![], vec![failing_tx, ok_tx], 0);

        let outcome = verify_batch(vec![ParallelVertex::new(v, 0)], 2, CancellationToken::new()).await;
        match &outcome.results[0].outcome {
            VertexOutcome::TxResults(results) => {
                assert_eq!(results.len(), 2);
                assert!(results[0].1.is_err());
                assert!(results[1].1.is_ok());
            }
            _ => panic!("expected tx-level results"),
        }
        assert!(outcome.first_failure().is_some());
    }

    #[tokio::test]
    async fn cancellation_stops_further_admission() {
        let token = CancellationToken::new();
        token.cancel();
        let batch: Vec<_> =
            (0..3u8).map(|i| ParallelVertex::from_vertex(vertex_with_priority([i; 32], 0))).collect();
        let outcome = verify_batch(batch, 1, token).await;
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }
}
