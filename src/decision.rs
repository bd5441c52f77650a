//! The decision procedure (§4.4): drives `Processing` transactions and
//! vertices toward `Accepted`/`Rejected` by repeatedly sweeping the
//! decidable vertices until a fixpoint is reached.
//!
//! There is no teacher analogue for this exact rule (the teacher's
//! `sleet` component runs genuine Avalanche repeated-sampling consensus,
//! which this crate's Non-goals explicitly exclude); the traversal
//! itself is grounded on `graph::dag::DAG::leaves` plus
//! `sleet::spend_map::SpendMap::conflicting_txs`, generalized here into a
//! deterministic, sampling-free acceptance rule over [`crate::conflict::ConflictIndex`]
//! and [`crate::dag::DagStore`]. Unlike a plain leaf sweep, the traversal
//! set ([`crate::dag::DagStore::decidable_vertices`]) advances past each
//! vertex once its children are terminal, so interior vertices get
//! decided as the tips above them resolve rather than being stuck behind
//! a frontier that never moves.

use std::collections::BTreeSet;

use tracing::debug;

use crate::conflict::ConflictIndex;
use crate::dag::DagStore;
use crate::error::Error;
use crate::id::Id;
use crate::status::Status;

/// Report produced by one call to [`run`]: how many rounds it took to
/// reach a fixpoint and which transactions/vertices changed status.
#[derive(Debug, Default)]
pub struct DecisionOutcome {
    pub rounds: u32,
    pub accepted_txs: Vec<Id>,
    pub rejected_txs: Vec<Id>,
    pub accepted_vertices: Vec<Id>,
    pub rejected_vertices: Vec<Id>,
}

impl DecisionOutcome {
    fn merge(&mut self, other: DecisionOutcome) {
        self.rounds += other.rounds;
        self.accepted_txs.extend(other.accepted_txs);
        self.rejected_txs.extend(other.rejected_txs);
        self.accepted_vertices.extend(other.accepted_vertices);
        self.rejected_vertices.extend(other.rejected_vertices);
    }
}

/// Runs the decision procedure to a fixpoint (§4.4): repeatedly sweeps
/// the decidable vertices (§4.4 step 3 — tips first, then their parents
/// as children resolve) in ascending vertex-ID order, deciding every
/// still-`Processing` transaction in vertex-declared order by checking
/// whether any of its conflicters is already `Accepted`, then applying
/// the vertex cascade rule once every contained transaction is
/// terminal. Stops once a full sweep makes no further progress.
pub fn run(dag: &mut DagStore, conflicts: &ConflictIndex) -> Result<DecisionOutcome, Error> {
    let mut outcome = DecisionOutcome::default();
    loop {
        let round = run_round(dag, conflicts)?;
        let progressed = !round.accepted_txs.is_empty()
            || !round.rejected_txs.is_empty()
            || !round.accepted_vertices.is_empty()
            || !round.rejected_vertices.is_empty();
        outcome.merge(round);
        if !progressed {
            return Ok(outcome);
        }
    }
}

fn run_round(dag: &mut DagStore, conflicts: &ConflictIndex) -> Result<DecisionOutcome, Error> {
    let mut outcome = DecisionOutcome { rounds: 1, ..Default::default() };
    let frontier = dag.decidable_vertices();

    for vertex_id in frontier {
        let vertex = dag.get_vertex(&vertex_id)?.clone();

        // First-seen-wins (§4.4): a transaction is accepted as soon as none
        // of its conflicters is already Accepted, and every other still-
        // Processing conflicter is rejected in the same step — they can
        // never win once one of their set has been accepted.
        for tx in vertex.txs() {
            if dag.tx_status(&tx.id()) != Some(Status::Processing) {
                continue;
            }
            let conflicters = conflicts.conflicts(tx);
            if accepted_any(dag, &conflicters) {
                continue;
            }
            dag.update_tx_status(tx.id(), Status::Accepted)?;
            debug!(tx = %tx.id(), "transaction accepted");
            outcome.accepted_txs.push(tx.id());

            for conflicter in &conflicters {
                if dag.tx_status(conflicter) == Some(Status::Processing) {
                    dag.update_tx_status(*conflicter, Status::Rejected)?;
                    debug!(tx = %conflicter, "transaction rejected: conflicter accepted");
                    outcome.rejected_txs.push(*conflicter);
                }
            }
        }

        // The pass above only rejects conflicters of a transaction decided
        // in this same vertex. A transaction whose conflicter was accepted
        // in an earlier-ID vertex (already fully decided, so never
        // revisited) still needs to resolve here.
        for tx in vertex.txs() {
            if dag.tx_status(&tx.id()) != Some(Status::Processing) {
                continue;
            }
            let conflicters = conflicts.conflicts(tx);
            if accepted_any(dag, &conflicters) {
                dag.update_tx_status(tx.id(), Status::Rejected)?;
                debug!(tx = %tx.id(), "transaction rejected: conflicter already accepted");
                outcome.rejected_txs.push(tx.id());
            }
        }

        if dag.vertex_status(&vertex_id)? == Status::Processing {
            if let Some(cascaded) = cascade(dag, &vertex_id, vertex.txs())? {
                match cascaded {
                    Status::Accepted => outcome.accepted_vertices.push(vertex_id),
                    Status::Rejected => outcome.rejected_vertices.push(vertex_id),
                    Status::Processing => unreachable!(),
                }
            }
        }
    }

    Ok(outcome)
}

/// Whether any member of `conflicters` is already `Accepted`.
fn accepted_any(dag: &DagStore, conflicters: &BTreeSet<Id>) -> bool {
    conflicters.iter().any(|c| dag.tx_status(c) == Some(Status::Accepted))
}

/// The vertex cascade rule (§4.4): once every contained transaction is
/// terminal, the vertex is Accepted if at least one of them is Accepted,
/// otherwise (all Rejected) the vertex is Rejected. A vertex with no
/// transactions is Accepted as soon as it is considered (vacuously "all
/// terminal").
fn cascade(
    dag: &mut DagStore,
    vertex_id: &Id,
    txs: &[crate::tx::Transaction],
) -> Result<Option<Status>, Error> {
    let statuses: Vec<Status> = txs.iter().map(|tx| dag.tx_status(&tx.id())).collect::<Option<_>>().unwrap_or_default();
    if statuses.len() != txs.len() || !statuses.iter().all(Status::is_terminal) {
        return Ok(None);
    }
    let next = if statuses.is_empty() || statuses.iter().any(|s| *s == Status::Accepted) {
        Status::Accepted
    } else {
        Status::Rejected
    };
    dag.update_vertex_status(*vertex_id, next)?;
    debug!(vertex = %vertex_id, status = ?next, "vertex decided");
    Ok(Some(next))
}
