//! The DAG store (§4.1): the vertex set, the bidirectional parent/child
//! edge relation, the frontier, and the status of every vertex and
//! transaction the engine has ever admitted.
//!
//! Grounded on `graph::dag::DAG<V>` for the edge bookkeeping (see
//! [`edges::EdgeMap`]), generalized here to also own the vertex payloads
//! themselves and the status flags §5 calls out as shared mutable state.
//! All mutating operations are taken under the engine's single writer
//! lock (held by [`crate::engine::Engine`]); this module itself assumes
//! `&mut self` exclusivity and is not internally synchronized — that is
//! deliberate, mirroring the teacher's "one coarse lock" design (§9).

mod edges;

use std::collections::HashMap;

use crate::error::Error;
use crate::id::Id;
use crate::status::Status;
use crate::vertex::Vertex;

use edges::EdgeMap;

pub struct DagStore {
    vertices: HashMap<Id, Vertex>,
    edges: EdgeMap<Id>,
    vertex_status: HashMap<Id, Status>,
    tx_status: HashMap<Id, Status>,
}

impl Default for DagStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DagStore {
    pub fn new() -> Self {
        DagStore {
            vertices: HashMap::new(),
            edges: EdgeMap::new(),
            vertex_status: HashMap::new(),
            tx_status: HashMap::new(),
        }
    }

    /// Submits a vertex (§4.1 Submit). Idempotent: re-submitting an
    /// already-known vertex ID is a no-op that returns `Ok(())`.
    ///
    /// Validates that every parent is already registered
    /// (`Error::UnknownVertex` otherwise), then checks that admitting the
    /// vertex would not create a cycle (`Error::DagInvariantViolated`
    /// otherwise). Height is computed as `1 + max(parent heights)`, or
    /// `1` for a parentless (genesis) vertex.
    pub fn submit(&mut self, mut vertex: Vertex) -> Result<(), Error> {
        if self.vertices.contains_key(&vertex.id()) {
            return Ok(());
        }

        let missing = self.edges.missing(vertex.parents());
        if let Some(missing_parent) = missing.into_iter().next() {
            return Err(Error::UnknownVertex(missing_parent));
        }

        if self.edges.would_cycle(&vertex.id(), vertex.parents()) {
            return Err(Error::DagInvariantViolated(format!(
                "vertex {} would be its own ancestor",
                vertex.id()
            )));
        }

        let height = vertex
            .parents()
            .iter()
            .map(|p| self.vertices.get(p).map(|v| v.height()).unwrap_or(0))
            .max()
            .map(|h| h + 1)
            .unwrap_or(1);
        vertex.set_height(height);

        let id = vertex.id();
        let parents = vertex.parents().to_vec();

        self.vertex_status.entry(id).or_insert(Status::Processing);
        for tx in vertex.txs() {
            self.tx_status.entry(tx.id()).or_insert(Status::Processing);
        }

        self.edges.insert(id, parents);
        self.vertices.insert(id, vertex);
        Ok(())
    }

    pub fn get_vertex(&self, id: &Id) -> Result<&Vertex, Error> {
        self.vertices.get(id).ok_or(Error::UnknownVertex(*id))
    }

    pub fn vertex_status(&self, id: &Id) -> Result<Status, Error> {
        self.vertex_status.get(id).copied().ok_or(Error::UnknownVertex(*id))
    }

    pub fn tx_status(&self, id: &Id) -> Option<Status> {
        self.tx_status.get(id).copied()
    }

    /// Frontier (§4.1): vertices with no registered children, in
    /// ascending-ID order. This is the structural DAG frontier exposed by
    /// `GetFrontier` (§6) — the current tips, regardless of status.
    pub fn frontier(&self) -> Vec<Id> {
        let mut f = self.edges.frontier();
        f.sort();
        f
    }

    /// Vertices eligible for a decision round (§4.4 step 3): still
    /// `Processing`, with every child already terminal. A tip (no
    /// children) is vacuously eligible, so this starts out equal to
    /// [`DagStore::frontier`] and then advances inward, round by round, as
    /// children resolve — unlike `frontier`, which never changes once the
    /// DAG shape is fixed. Returned in ascending-ID order.
    pub fn decidable_vertices(&self) -> Vec<Id> {
        let mut eligible: Vec<Id> = self
            .vertices
            .keys()
            .filter(|id| {
                self.vertex_status.get(id).copied() == Some(Status::Processing)
                    && self.edges.children(id).iter().all(|child| {
                        matches!(self.vertex_status.get(child), Some(status) if status.is_terminal())
                    })
            })
            .copied()
            .collect();
        eligible.sort();
        eligible
    }

    pub fn update_vertex_status(&mut self, id: Id, next: Status) -> Result<(), Error> {
        let current = self.vertex_status(&id)?;
        if !current.can_transition_to(next) {
            return Err(Error::InvalidStatusTransition(id, current, next));
        }
        self.vertex_status.insert(id, next);
        Ok(())
    }

    pub fn update_tx_status(&mut self, id: Id, next: Status) -> Result<(), Error> {
        let current = self.tx_status.get(&id).copied().ok_or(Error::UnknownVertex(id))?;
        if !current.can_transition_to(next) {
            return Err(Error::InvalidStatusTransition(id, current, next));
        }
        self.tx_status.insert(id, next);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.vertices.len()
    }

    pub fn contains_vertex(&self, id: &Id) -> bool {
        self.vertices.contains_key(id)
    }
}
