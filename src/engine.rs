//! The thread-safe engine handle (§6 External Interfaces): the single
//! entry point that ties the DAG store, conflict index, scheduler,
//! decision procedure and worker pool together behind one writer lock.
//!
//! Grounded on the overall shape of `zfx_subzero`'s top-level actors
//! (each of `sleet`, `hail`, `ice` wraps its state behind a single
//! `actix` mailbox so all mutation serializes through one address); this
//! crate has no actor runtime, so the same "one lock, one linearization
//! point" discipline (§5, §9 "unbounded shared-state mutation under a
//! single coarse lock ... acceptable for correctness") is expressed with
//! a plain `tokio::sync::RwLock` guarding DAG + conflict-index state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::conflict::ConflictIndex;
use crate::dag::DagStore;
use crate::decision::{self, DecisionOutcome};
use crate::error::Error;
use crate::id::Id;
use crate::scheduler::{self, BatchOutcome, ParallelVertex};
use crate::status::Status;
use crate::vertex::Vertex;

/// Tunables for an [`Engine`] (§10.3). `max_workers` is clamped to a
/// minimum of 1 (§4.3: "MaxWorkers ... minimum 1").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub max_workers: usize,
    pub task_queue_capacity: usize,
    pub decision_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_workers: 4,
            task_queue_capacity: 100,
            decision_interval: Duration::from_millis(200),
        }
    }
}

impl EngineConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }
}

/// Running counters an embedder can snapshot for observability (§10.5),
/// deliberately not wired to any metrics exporter here (that remains an
/// external collaborator's concern per §1).
#[derive(Default)]
pub struct EngineStats {
    vertices_submitted: AtomicU64,
    txs_accepted: AtomicU64,
    txs_rejected: AtomicU64,
    decision_rounds_run: AtomicU64,
}

/// A point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStatsSnapshot {
    pub vertices_submitted: u64,
    pub txs_accepted: u64,
    pub txs_rejected: u64,
    pub decision_rounds_run: u64,
}

impl EngineStats {
    fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            vertices_submitted: self.vertices_submitted.load(Ordering::Relaxed),
            txs_accepted: self.txs_accepted.load(Ordering::Relaxed),
            txs_rejected: self.txs_rejected.load(Ordering::Relaxed),
            decision_rounds_run: self.decision_rounds_run.load(Ordering::Relaxed),
        }
    }
}

struct EngineState {
    dag: DagStore,
    conflicts: ConflictIndex,
}

/// The report produced by [`Engine::process_vertex`] /
/// [`Engine::batch_process_vertices`] (§10.5: "the distilled spec only
/// says 'Result'; this crate's own enrichment").
#[derive(Debug, Default)]
pub struct VerifyOutcome {
    /// Vertex IDs whose structural verifier failed (vertex + all its
    /// txs rejected).
    pub failed_vertices: Vec<Id>,
    /// Transaction IDs whose own verifier failed (only that tx rejected).
    pub failed_txs: Vec<Id>,
    /// Whether the batch was cancelled before completion.
    pub cancelled: bool,
}

impl VerifyOutcome {
    /// Whether any failure (vertex- or transaction-level) was recorded.
    pub fn has_failures(&self) -> bool {
        !self.failed_vertices.is_empty() || !self.failed_txs.is_empty()
    }
}

/// The thread-safe engine handle (§6 `NewEngine`).
pub struct Engine {
    state: RwLock<EngineState>,
    config: EngineConfig,
    stats: EngineStats,
}

impl Engine {
    /// `NewEngine(logger, max_workers)`. The logger is not a parameter
    /// here: this crate instruments itself with `tracing` spans/events
    /// directly (§10.1) rather than accepting an injected logger handle,
    /// the idiomatic Rust rendition of "pass a logger in" used throughout
    /// the teacher's actors (which instead receive their `tracing`
    /// context ambiently via the installed global subscriber).
    pub fn new(config: EngineConfig) -> Self {
        let max_workers = config.max_workers;
        let config = config.with_max_workers(max_workers);
        info!(max_workers = config.max_workers, "engine constructed");
        Engine {
            state: RwLock::new(EngineState { dag: DagStore::new(), conflicts: ConflictIndex::new() }),
            config,
            stats: EngineStats::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// `Engine.ProcessVertex(ctx, vertex)`: submits a single vertex and
    /// verifies it in a one-element batch.
    pub async fn process_vertex(
        &self,
        vertex: Vertex,
        cancel: CancellationToken,
    ) -> Result<VerifyOutcome, Error> {
        self.batch_process_vertices(vec![vertex], cancel).await
    }

    /// `Engine.BatchProcessVertices(ctx, [vertex])`: submits every
    /// vertex to the DAG store (§4.1 Submit semantics: unknown parents
    /// or a cycle fail the whole call before any verification runs),
    /// then verifies the batch via the scheduler (§4.3), applying its
    /// per-item outcome back onto transaction/vertex status and feeding
    /// successfully-verified transactions into the conflict index
    /// (§4.3 item 4).
    pub async fn batch_process_vertices(
        &self,
        vertices: Vec<Vertex>,
        cancel: CancellationToken,
    ) -> Result<VerifyOutcome, Error> {
        let max_workers = self.config.max_workers;
        let mut guard = self.state.write().await;

        for vertex in vertices.iter() {
            guard.dag.submit(vertex.clone())?;
            self.stats.vertices_submitted.fetch_add(1, Ordering::Relaxed);
        }

        let batch: Vec<ParallelVertex> =
            vertices.into_iter().map(ParallelVertex::from_vertex).collect();

        let BatchOutcome { results, cancelled } =
            scheduler::verify_batch(batch, max_workers, cancel).await;

        let mut outcome = VerifyOutcome { cancelled, ..Default::default() };

        for item in results {
            match item.outcome {
                scheduler::VertexOutcome::VertexFailed(reason) => {
                    guard.dag.update_vertex_status(item.vertex_id, Status::Rejected)?;
                    let vertex = guard.dag.get_vertex(&item.vertex_id)?.clone();
                    for tx in vertex.txs() {
                        if guard.dag.tx_status(&tx.id()) == Some(Status::Processing) {
                            guard.dag.update_tx_status(tx.id(), Status::Rejected)?;
                            self.stats.txs_rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    debug!(vertex = %item.vertex_id, error = %reason, "vertex rejected: structural verification failed");
                    outcome.failed_vertices.push(item.vertex_id);
                }
                scheduler::VertexOutcome::TxResults(tx_results) => {
                    let vertex = guard.dag.get_vertex(&item.vertex_id)?.clone();
                    for (tx, (tx_id, result)) in vertex.txs().iter().zip(tx_results.into_iter()) {
                        debug_assert_eq!(tx.id(), tx_id);
                        match result {
                            Ok(()) => guard.conflicts.register(tx),
                            Err(_) => {
                                guard.dag.update_tx_status(tx_id, Status::Rejected)?;
                                self.stats.txs_rejected.fetch_add(1, Ordering::Relaxed);
                                outcome.failed_txs.push(tx_id);
                            }
                        }
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// `Engine.DecideTxs(ctx)`: runs the decision procedure (§4.4) to a
    /// fixpoint, holding the writer lock for the whole call (§4.4
    /// Concurrency; §9's resolution of the open question about whether
    /// `run_consensus` should yield mid-round).
    pub async fn decide_txs(&self) -> Result<DecisionOutcome, Error> {
        let mut guard = self.state.write().await;
        let EngineState { dag, conflicts } = &mut *guard;
        let outcome = decision::run(dag, conflicts)?;
        self.stats.decision_rounds_run.fetch_add(outcome.rounds as u64, Ordering::Relaxed);
        self.stats.txs_accepted.fetch_add(outcome.accepted_txs.len() as u64, Ordering::Relaxed);
        self.stats.txs_rejected.fetch_add(outcome.rejected_txs.len() as u64, Ordering::Relaxed);
        Ok(outcome)
    }

    /// `Engine.RunConsensus(ctx, interval)`: spawns a background task
    /// that invokes [`Engine::decide_txs`] every `interval`, stopping
    /// cooperatively when `cancel` fires (§10.5 supplemented feature).
    /// The returned handle can be `.await`ed to observe the loop's exit,
    /// or dropped to let it run detached.
    pub fn run_consensus(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("consensus loop stopped: context cancelled");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = engine.decide_txs().await {
                            tracing::error!(error = %e, "decision round failed");
                        }
                    }
                }
            }
        })
    }

    /// Convenience wrapper over [`Engine::run_consensus`] using this
    /// engine's configured `decision_interval` (§10.3) as the tick
    /// period, for callers that don't need a per-call override of §6's
    /// `RunConsensus(ctx, interval)` interval parameter.
    pub fn run_consensus_with_configured_interval(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        self.run_consensus(self.config.decision_interval, cancel)
    }

    /// `Engine.GetFrontier()`.
    pub async fn frontier(&self) -> Vec<Id> {
        self.state.read().await.dag.frontier()
    }

    /// `Engine.Size()`.
    pub async fn size(&self) -> usize {
        self.state.read().await.dag.size()
    }

    /// `Dag.GetVertex(id)`, surfaced directly on the engine for callers
    /// that only need to look up submitted state.
    pub async fn vertex_status(&self, id: Id) -> Result<Status, Error> {
        self.state.read().await.dag.vertex_status(&id)
    }

    pub async fn tx_status(&self, id: Id) -> Option<Status> {
        self.state.read().await.dag.tx_status(&id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tx::Transaction;

    fn vertex(id: [u8; 32], parents: Vec<[u8; 32]>, txs: Vec<Transaction>) -> Vertex {
        Vertex::trivial(Id::from_hash(id), parents.into_iter().map(Id::from_hash).collect(), txs, 0)
    }

    #[tokio::test]
    async fn process_and_decide_accepts_unconflicted_tx() {
        let engine = Engine::new(EngineConfig::default());
        let t = Transaction::trivial(Id::from_hash([1; 32]), vec![]);
        let v = vertex([10; 32], vec![], vec![t.clone()]);

        let outcome =
            engine.process_vertex(v, CancellationToken::new()).await.unwrap();
        assert!(!outcome.has_failures());

        let decision = engine.decide_txs().await.unwrap();
        assert!(decision.accepted_txs.contains(&t.id()));
        assert_eq!(engine.vertex_status(Id::from_hash([10; 32])).await.unwrap(), Status::Accepted);
        assert_eq!(engine.size().await, 1);
    }

    #[tokio::test]
    async fn conflicting_pair_resolves_to_one_winner() {
        let engine = Engine::new(EngineConfig::default());
        let a = Transaction::trivial(Id::from_hash([1; 32]), vec![Id::from_hash([0xA; 32])]);
        let b = Transaction::trivial(Id::from_hash([2; 32]), vec![Id::from_hash([0xA; 32])]);
        let va = vertex([10; 32], vec![], vec![a.clone()]);
        let vb = vertex([11; 32], vec![], vec![b.clone()]);

        engine
            .batch_process_vertices(vec![va, vb], CancellationToken::new())
            .await
            .unwrap();
        engine.decide_txs().await.unwrap();

        let statuses = (engine.tx_status(a.id()).await, engine.tx_status(b.id()).await);
        assert!(
            statuses == (Some(Status::Accepted), Some(Status::Rejected))
                || statuses == (Some(Status::Rejected), Some(Status::Accepted))
        );
    }

    #[tokio::test]
    async fn unknown_parent_fails_batch_before_any_verification() {
        let engine = Engine::new(EngineConfig::default());
        let v = vertex([20; 32], vec![[99; 32]], vec![]);
        let err =
            engine.batch_process_vertices(vec![v], CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::UnknownVertex(_)));
        assert_eq!(engine.size().await, 0);
    }

    #[tokio::test]
    async fn decide_txs_is_idempotent_at_fixpoint() {
        let engine = Engine::new(EngineConfig::default());
        let t = Transaction::trivial(Id::from_hash([1; 32]), vec![]);
        let v = vertex([10; 32], vec![], vec![t]);
        engine.process_vertex(v, CancellationToken::new()).await.unwrap();

        let first = engine.decide_txs().await.unwrap();
        let second = engine.decide_txs().await.unwrap();
        assert!(!first.accepted_txs.is_empty());
        assert!(second.accepted_txs.is_empty());
        assert!(second.rejected_txs.is_empty());
    }

    #[tokio::test]
    async fn run_consensus_with_configured_interval_drives_decisions_to_completion() {
        let engine = Arc::new(Engine::new(
            EngineConfig::default().with_max_workers(1),
        ));
        let t = Transaction::trivial(Id::from_hash([1; 32]), vec![]);
        let v = vertex([10; 32], vec![], vec![t.clone()]);
        engine.process_vertex(v, CancellationToken::new()).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = engine.run_consensus_with_configured_interval(cancel.clone());

        let mut attempts = 0;
        loop {
            if engine.tx_status(t.id()).await == Some(Status::Accepted) {
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "consensus loop never accepted the transaction");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        cancel.cancel();
        handle.await.unwrap();
    }
}
