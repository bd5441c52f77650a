//! The in-process worker pool (§4.5): decouples submission of arbitrary
//! verification tasks from their execution, with a bounded queue, a
//! dynamically-managed worker set, and a task-result lookup.
//!
//! There is no direct teacher analogue for this exact shape (the
//! teacher's actor-based components dispatch work via `actix` mailboxes
//! rather than a task-channel-plus-dispatch-loop), so this module is
//! grounded on the bounded `tokio::sync::mpsc` channel shared by N
//! spawned dispatch loops pattern used by `ruvnet-daa`'s
//! `swarm-test::batch_tools::BatchExecutor`, generalized from its
//! ad-hoc `Vec<AgentTask>` queue into the bounded channel and explicit
//! worker-registry §4.5 calls for. Concurrency here is bounded by
//! `num_loops`, not a `Semaphore`: each dispatch loop processes one task
//! at a time end to end, so the loop count alone caps in-flight tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, error, warn};

use crate::error::Error;

/// A unit of work submitted to the pool. The `id`'s first byte drives
/// the deterministic worker-selection rule (§4.5 "Selection determinism").
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub payload: Vec<u8>,
    pub submitted_at: std::time::SystemTime,
}

impl Task {
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Task { id: id.into(), payload, submitted_at: std::time::SystemTime::now() }
    }

    /// Builds a task with a fresh UUID-v4 task ID (§4.5 "Task { id:
    /// string (UUID-like) ... }"), for callers that don't already carry
    /// an ID of their own.
    pub fn generate(payload: Vec<u8>) -> Self {
        Task::new(uuid::Uuid::new_v4().to_string(), payload)
    }
}

/// The outcome of a worker processing a [`Task`].
#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: String,
    pub output: Vec<u8>,
    pub error_kind: Option<String>,
    pub started_at: std::time::SystemTime,
    pub finished_at: std::time::SystemTime,
}

/// What a caller gets back from [`WorkerPool::get_result`] for a task
/// that hasn't produced a [`TaskResult`] yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Processing,
}

/// A worker capability: anything that can process a [`Task`] into a
/// [`TaskResult`]. Implementations are invoked from within a spawned
/// dispatch loop and so must be `Send + Sync`.
#[async_trait::async_trait]
pub trait Worker: Send + Sync {
    async fn process_task(&self, task: &Task) -> Result<Vec<u8>, Error>;
}

/// Decouples task submission from execution: a bounded channel feeds N
/// dispatch loops, each of which pops a task, snapshots the current
/// worker registry, selects a worker via `task.id`'s first byte modulo
/// the registry size (§4.5 "Selection determinism"), and records the
/// result.
pub struct WorkerPool {
    workers: Arc<RwLock<HashMap<String, Arc<dyn Worker>>>>,
    results: Arc<Mutex<HashMap<String, TaskResult>>>,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    receiver: Mutex<Option<mpsc::Receiver<Task>>>,
    loops: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl WorkerPool {
    /// `capacity` bounds the pending-task queue (§4.5 "TaskChan...
    /// capacity configured, default 100"); `Submit` blocks once it is
    /// full.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        WorkerPool {
            workers: Arc::new(RwLock::new(HashMap::new())),
            results: Arc::new(Mutex::new(HashMap::new())),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Builds a pool sized from an [`crate::engine::EngineConfig`]'s
    /// `task_queue_capacity` (§10.3), for embedders that provision the
    /// pool and the engine from the same tunables.
    pub fn from_config(config: &crate::engine::EngineConfig) -> Self {
        WorkerPool::new(config.task_queue_capacity)
    }

    pub async fn add_worker(&self, id: impl Into<String>, worker: Arc<dyn Worker>) {
        self.workers.write().await.insert(id.into(), worker);
    }

    pub async fn remove_worker(&self, id: &str) {
        self.workers.write().await.remove(id);
    }

    pub async fn worker_count(&self) -> usize {
        self.workers.read().await.len()
    }

    /// Pushes `task` onto the bounded queue. Blocks (cooperatively,
    /// i.e. `.await`s) while the queue is full, matching §4.5's "Submit
    /// ... Blocks when full".
    pub async fn submit_task(&self, task: Task) -> Result<(), Error> {
        let sender = self.sender.lock().await.clone();
        match sender {
            Some(sender) => sender.send(task).await.map_err(|_| Error::PoolStopped),
            None => Err(Error::PoolStopped),
        }
    }

    /// Spawns `num_loops` dispatch loops. Each pops a task from the
    /// shared receiver, snapshots the worker registry, and dispatches
    /// deterministically by `task.id[0] mod worker_count` (§4.5,
    /// §9 "Worker selection by task.id[0] mod N" — kept as-is per the
    /// design note's explicit allowance to substitute a different
    /// dispatcher, since nothing here is load-bearing for the decision
    /// procedure's determinism contract).
    pub async fn start(self: &Arc<Self>, num_loops: usize) {
        let receiver = self.receiver.lock().await.take();
        let receiver = match receiver {
            Some(r) => r,
            None => return,
        };
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(num_loops.max(1));
        for loop_id in 0..num_loops.max(1) {
            let pool = self.clone();
            let receiver = receiver.clone();
            handles.push(tokio::spawn(async move {
                pool.dispatch_loop(loop_id, receiver).await;
            }));
        }
        *self.loops.lock().await = handles;
    }

    async fn dispatch_loop(&self, loop_id: usize, receiver: Arc<Mutex<mpsc::Receiver<Task>>>) {
        loop {
            let task = {
                let mut rx = receiver.lock().await;
                rx.recv().await
            };
            let task = match task {
                Some(t) => t,
                None => {
                    debug!(loop_id, "dispatch loop draining: channel closed");
                    return;
                }
            };

            let snapshot: Vec<(String, Arc<dyn Worker>)> =
                self.workers.read().await.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

            if snapshot.is_empty() {
                warn!(task_id = %task.id, "no workers registered, recording NoWorkers result");
                let now = std::time::SystemTime::now();
                self.results.lock().await.insert(
                    task.id.clone(),
                    TaskResult {
                        task_id: task.id.clone(),
                        output: Vec::new(),
                        error_kind: Some(Error::NoWorkers.to_string()),
                        started_at: now,
                        finished_at: now,
                    },
                );
                continue;
            }

            let first_byte = task.id.as_bytes().first().copied().unwrap_or(0) as usize;
            let mut workers = snapshot;
            workers.sort_by(|a, b| a.0.cmp(&b.0));
            let index = first_byte % workers.len();
            let (worker_id, worker) = &workers[index];

            let started_at = std::time::SystemTime::now();
            let outcome = worker.process_task(&task).await;
            let finished_at = std::time::SystemTime::now();

            let result = match outcome {
                Ok(output) => TaskResult {
                    task_id: task.id.clone(),
                    output,
                    error_kind: None,
                    started_at,
                    finished_at,
                },
                Err(e) => {
                    error!(task_id = %task.id, worker = %worker_id, error = %e, "worker failed task");
                    TaskResult {
                        task_id: task.id.clone(),
                        output: Vec::new(),
                        error_kind: Some(e.to_string()),
                        started_at,
                        finished_at,
                    }
                }
            };
            self.results.lock().await.insert(task.id.clone(), result);
        }
    }

    /// Returns the recorded result, or [`ResultStatus::Processing`] if
    /// none has landed yet (§4.5 GetResult). Never errors on an unknown
    /// ID: an ID the pool has never seen is indistinguishable, to the
    /// caller, from one still in flight.
    pub async fn get_result(&self, task_id: &str) -> Result<TaskResult, ResultStatus> {
        match self.results.lock().await.get(task_id) {
            Some(r) => Ok(r.clone()),
            None => Err(ResultStatus::Processing),
        }
    }

    /// Closes the submission channel (any further `submit_task` call
    /// returns `Error::PoolStopped`) and waits for every dispatch loop to
    /// drain its remaining tasks and exit.
    pub async fn stop(&self) {
        self.sender.lock().await.take();
        let handles = std::mem::take(&mut *self.loops.lock().await);
        futures::future::join_all(handles).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct EchoWorker;

    #[async_trait::async_trait]
    impl Worker for EchoWorker {
        async fn process_task(&self, task: &Task) -> Result<Vec<u8>, Error> {
            Ok(task.payload.clone())
        }
    }

    struct TaggedWorker(Vec<u8>);

    #[async_trait::async_trait]
    impl Worker for TaggedWorker {
        async fn process_task(&self, _task: &Task) -> Result<Vec<u8>, Error> {
            Ok(self.0.clone())
        }
    }

    struct FailingWorker;

    #[async_trait::async_trait]
    impl Worker for FailingWorker {
        async fn process_task(&self, _task: &Task) -> Result<Vec<u8>, Error> {
            Err(Error::VerificationFailed(crate::id::Id::zero(), "boom".into()))
        }
    }

    #[test]
    fn generated_task_ids_are_unique() {
        let a = Task::generate(vec![]);
        let b = Task::generate(vec![]);
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn from_config_uses_the_configured_queue_capacity() {
        let config = crate::engine::EngineConfig::default();
        let pool = WorkerPool::from_config(&config);
        assert_eq!(pool.worker_count().await, 0);
    }

    /// A task submitted before `start` has popped it at all (no dispatch
    /// loop has run yet) is still "processing": nothing has looked at the
    /// (empty) worker registry for it.
    #[tokio::test]
    async fn unstarted_pool_leaves_submitted_task_processing() {
        let pool = Arc::new(WorkerPool::new(4));
        pool.submit_task(Task::new("ab", vec![1, 2, 3])).await.unwrap();
        assert_eq!(pool.get_result("ab").await.unwrap_err(), ResultStatus::Processing);
    }

    /// Once a dispatch loop pops a task and finds no registered workers,
    /// it records an explicit `NoWorkers` result rather than leaving the
    /// task processing forever (§4.5's redesigned, more observable
    /// behaviour).
    #[tokio::test]
    async fn task_popped_with_no_workers_records_no_workers_error() {
        let pool = Arc::new(WorkerPool::new(4));
        pool.start(1).await;
        pool.submit_task(Task::new("ab", vec![1, 2, 3])).await.unwrap();

        let mut attempts = 0;
        loop {
            if let Ok(result) = pool.get_result("ab").await {
                assert_eq!(result.error_kind.as_deref(), Some(Error::NoWorkers.to_string().as_str()));
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "result never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn registered_worker_processes_and_records_result() {
        let pool = Arc::new(WorkerPool::new(4));
        pool.add_worker("w1", Arc::new(EchoWorker)).await;
        pool.start(1).await;
        pool.submit_task(Task::new("xy", vec![9, 9])).await.unwrap();

        let mut attempts = 0;
        loop {
            if let Ok(result) = pool.get_result("xy").await {
                assert_eq!(result.output, vec![9, 9]);
                assert!(result.error_kind.is_none());
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "result never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn failing_worker_records_error_kind() {
        let pool = Arc::new(WorkerPool::new(4));
        pool.add_worker("w1", Arc::new(FailingWorker)).await;
        pool.start(1).await;
        pool.submit_task(Task::new("zz", vec![])).await.unwrap();

        let mut attempts = 0;
        loop {
            if let Ok(result) = pool.get_result("zz").await {
                assert!(result.error_kind.is_some());
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "result never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn selection_is_deterministic_given_worker_count() {
        let pool = Arc::new(WorkerPool::new(4));
        // Registry is dispatched in ascending worker-ID order; "a" < "b".
        pool.add_worker("a", Arc::new(TaggedWorker(b"from-a".to_vec()))).await;
        pool.add_worker("b", Arc::new(TaggedWorker(b"from-b".to_vec()))).await;
        pool.start(1).await;

        // "A" = 0x41 = 65, 65 % 2 == 1 -> second worker in sorted order ("b").
        pool.submit_task(Task::new("Atask", vec![])).await.unwrap();

        let mut attempts = 0;
        loop {
            if let Ok(result) = pool.get_result("Atask").await {
                assert_eq!(result.output, b"from-b".to_vec());
                break;
            }
            attempts += 1;
            assert!(attempts < 100, "result never appeared");
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }
}
