//! The in-memory graph over which the hierarchy is built and queried.
//!
//! Vertices and edges are addressed by OSM node id (`u64`), never by
//! index into an internal array: the constructor and search carry ids
//! through `HashMap`s rather than holding direct references into a
//! `Vec`, so that vertex deletion during contraction (see
//! [`crate::contraction`]) never invalidates a handle another part of
//! the graph is holding.

use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ChError, ChResult};

pub type VertexId = u64;

/// A sentinel meaning "no predecessor" in path-reconstruction parent
/// maps, matching the original engine's use of the maximum `uint64_t`
/// value rather than a signed `-1`.
pub const NO_PREDECESSOR: VertexId = u64::MAX;

/// A contracted-graph vertex: its adjacency (by weight, both shortcuts
/// and original edges are folded together here), its contraction order,
/// and a running count of neighbors already contracted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vertex {
    pub in_edges: FxHashMap<VertexId, f64>,
    pub out_edges: FxHashMap<VertexId, f64>,
    /// Contraction rank. Meaningful only after [`crate::contraction::contract_graph`]
    /// has run; `0` beforehand.
    pub order: u64,
    /// Number of this vertex's neighbors already removed during
    /// contraction. Feeds the deleted-neighbors term of the priority
    /// heuristic.
    pub deleted_neighbors: u64,
}

/// The geographic detail of one directed original (non-shortcut) edge:
/// the OSM shape nodes between its endpoints and its two weights.
/// Shortcut edges have no entry here — they live only in the adjacency
/// maps and the shortcut table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub start: VertexId,
    pub end: VertexId,
    /// Intermediate OSM node ids between `start` and `end`, in travel
    /// order, excluding both endpoints.
    pub nodes: Vec<VertexId>,
    pub time_weight: f64,
    pub distance_weight: f64,
}

/// A directed, weighted multigraph with per-vertex contraction order,
/// per-edge geographic detail, and a shortcut table recording which
/// vertex each shortcut edge passes through.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    vertices: FxHashMap<VertexId, Vertex>,
    edges: FxHashMap<VertexId, FxHashMap<VertexId, Edge>>,
    /// (u, v) -> w such that the shortcut edge u->v represents the
    /// two-hop path u->w->v.
    shortcuts: FxHashMap<VertexId, FxHashMap<VertexId, VertexId>>,
    locations: FxHashMap<VertexId, (f64, f64)>,
    num_edges: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    fn vertex_entry(&mut self, id: VertexId) -> &mut Vertex {
        self.vertices.entry(id).or_default()
    }

    /// Registers (or overwrites) the latitude/longitude of a node id.
    /// Used both for routable vertices and for the shape nodes that
    /// appear only inside [`Edge::nodes`].
    pub fn add_location(&mut self, id: VertexId, lat: f64, lon: f64) {
        self.locations.insert(id, (lat, lon));
    }

    pub fn location(&self, id: VertexId) -> Option<(f64, f64)> {
        self.locations.get(&id).copied()
    }

    /// Adds a geographic edge with full shape-node detail. If
    /// `bidirectional`, a mirrored edge `end -> start` is also inserted
    /// with its shape-node list reversed. `primary_weight` selects which
    /// of `time_weight`/`distance_weight` is used as the adjacency-map
    /// weight that the constructor and search actually route on; the
    /// other is carried for later use (e.g. reporting distance alongside
    /// a time-optimal route).
    #[allow(clippy::too_many_arguments)]
    pub fn add_edge(
        &mut self,
        start: VertexId,
        end: VertexId,
        nodes: Vec<VertexId>,
        time_weight: f64,
        distance_weight: f64,
        bidirectional: bool,
        primary_is_time: bool,
    ) -> ChResult<()> {
        if !time_weight.is_finite() || time_weight < 0.0 {
            return Err(ChError::InvalidInput(format!(
                "time_weight must be finite and non-negative, got {time_weight}"
            )));
        }
        if !distance_weight.is_finite() || distance_weight < 0.0 {
            return Err(ChError::InvalidInput(format!(
                "distance_weight must be finite and non-negative, got {distance_weight}"
            )));
        }
        let primary = if primary_is_time { time_weight } else { distance_weight };
        self.insert_directed_edge(start, end, nodes.clone(), time_weight, distance_weight, primary)?;
        if bidirectional {
            let mut reversed = nodes;
            reversed.reverse();
            self.insert_directed_edge(end, start, reversed, time_weight, distance_weight, primary)?;
        }
        Ok(())
    }

    /// Adds a simple edge with no geographic shape, just a scalar weight
    /// used as both the time and distance weight. Convenient for tests
    /// and for any non-OSM-derived graph.
    pub fn add_edge_simple(
        &mut self,
        start: VertexId,
        end: VertexId,
        weight: f64,
        bidirectional: bool,
    ) -> ChResult<()> {
        self.add_edge(start, end, Vec::new(), weight, weight, bidirectional, true)
    }

    fn insert_directed_edge(
        &mut self,
        start: VertexId,
        end: VertexId,
        nodes: Vec<VertexId>,
        time_weight: f64,
        distance_weight: f64,
        adjacency_weight: f64,
    ) -> ChResult<()> {
        let is_new = !self
            .edges
            .get(&start)
            .map(|m| m.contains_key(&end))
            .unwrap_or(false);
        self.edges.entry(start).or_default().insert(
            end,
            Edge { start, end, nodes, time_weight, distance_weight },
        );
        self.vertex_entry(start).out_edges.insert(end, adjacency_weight);
        self.vertex_entry(end).in_edges.insert(start, adjacency_weight);
        if is_new {
            self.num_edges += 1;
        }
        Ok(())
    }

    /// True if a direct (possibly shortcut) edge `start -> end` exists in
    /// the adjacency map. This does not require a geographic [`Edge`]
    /// record — it is true for shortcuts too, matching the original
    /// engine's `edgeExists`, which checks `out_edges` rather than the
    /// edge-detail table.
    pub fn edge_exists(&self, start: VertexId, end: VertexId) -> bool {
        self.vertices
            .get(&start)
            .map(|v| v.out_edges.contains_key(&end))
            .unwrap_or(false)
    }

    /// Removes a non-shortcut adjacency entry and its geographic detail.
    /// Fails with [`ChError::InvalidInput`] if no such edge exists.
    /// `num_edges` is decremented on every successful removal.
    pub fn remove_edge(&mut self, start: VertexId, end: VertexId) -> ChResult<()> {
        if !self.edge_exists(start, end) {
            return Err(ChError::InvalidInput(format!(
                "no edge {start} -> {end} to remove"
            )));
        }
        if let Some(v) = self.vertices.get_mut(&start) {
            v.out_edges.remove(&end);
        }
        if let Some(v) = self.vertices.get_mut(&end) {
            v.in_edges.remove(&start);
        }
        if let Some(inner) = self.edges.get_mut(&start) {
            inner.remove(&end);
        }
        self.num_edges -= 1;
        Ok(())
    }

    /// Records a shortcut edge `u -> v` through `w`, with the given
    /// aggregate weight, in both the adjacency maps and the shortcut
    /// table. Overwrites any existing shortcut or edge between the same
    /// endpoints with a worse weight; callers (the constructor) are
    /// expected to have already checked that the shortcut is necessary.
    pub fn add_shortcut(&mut self, u: VertexId, v: VertexId, through: VertexId, weight: f64) -> ChResult<()> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ChError::InvalidInput(format!(
                "shortcut weight must be finite and non-negative, got {weight}"
            )));
        }
        self.vertex_entry(u).out_edges.insert(v, weight);
        self.vertex_entry(v).in_edges.insert(u, weight);
        self.shortcuts.entry(u).or_default().insert(v, through);
        self.num_edges += 1;
        Ok(())
    }

    pub fn is_shortcut(&self, u: VertexId, v: VertexId) -> bool {
        self.shortcuts
            .get(&u)
            .map(|m| m.contains_key(&v))
            .unwrap_or(false)
    }

    /// Returns the through-vertex of the shortcut `u -> v`, if any.
    pub fn shortcut_through(&self, u: VertexId, v: VertexId) -> Option<VertexId> {
        self.shortcuts.get(&u).and_then(|m| m.get(&v)).copied()
    }

    /// Assigns a vertex's contraction order. Called exactly once per
    /// vertex by the constructor, in increasing order of rank.
    pub fn add_ordering(&mut self, id: VertexId, order: u64) -> ChResult<()> {
        match self.vertices.entry(id) {
            Entry::Occupied(mut e) => {
                e.get_mut().order = order;
                Ok(())
            }
            Entry::Vacant(_) => Err(ChError::InvalidInput(format!(
                "cannot assign order to unknown vertex {id}"
            ))),
        }
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(&id)
    }

    pub fn edge_detail(&self, start: VertexId, end: VertexId) -> Option<&Edge> {
        self.edges.get(&start).and_then(|m| m.get(&end))
    }

    pub fn get_num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn get_num_edges(&self) -> u64 {
        self.num_edges
    }

    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices.keys().copied()
    }

    pub(crate) fn vertices_ref(&self) -> &FxHashMap<VertexId, Vertex> {
        &self.vertices
    }

    /// Removes, for every vertex, any outgoing or incoming edge whose
    /// other endpoint has a strictly lower order than the vertex itself.
    /// Run once, after contraction completes, so that the bidirectional
    /// search's upward-only relaxation (see [`crate::query`]) never needs
    /// to check order at query time for edges that could never be taken
    /// anyway.
    ///
    /// Matches the original engine's `optimizeEdges`, which prunes both
    /// adjacency maps by the same per-vertex rule: a vertex keeps a
    /// neighbor entry, in either `out_edges` or `in_edges`, only if that
    /// neighbor's order is strictly greater than its own. Applied
    /// independently at both endpoints of every original directed edge,
    /// this removes exactly the entries that the upward-only relaxation
    /// (see [`crate::query`]) would have skipped anyway.
    pub fn optimize_edges(&mut self) {
        let orders: FxHashMap<VertexId, u64> =
            self.vertices.iter().map(|(id, v)| (*id, v.order)).collect();
        for (id, vertex) in self.vertices.iter_mut() {
            let own_order = orders[id];
            vertex
                .out_edges
                .retain(|neighbor, _| orders.get(neighbor).copied().unwrap_or(0) > own_order);
            vertex
                .in_edges
                .retain(|neighbor, _| orders.get(neighbor).copied().unwrap_or(0) > own_order);
        }
    }

    /// Serializes the full graph (vertices, edges, shortcuts, locations)
    /// to `path` via `bincode`.
    pub fn save(&self, path: impl AsRef<Path>) -> ChResult<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            ChError::InvalidInput(format!("failed to create graph file: {e}"))
        })?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .map_err(|e| ChError::CorruptState(format!("failed to serialize graph: {e}")))
    }

    /// Deserializes a graph previously written by [`Graph::save`].
    pub fn load(path: impl AsRef<Path>) -> ChResult<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            ChError::InvalidInput(format!("failed to open graph file: {e}"))
        })?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader)
            .map_err(|e| ChError::CorruptState(format!("failed to deserialize graph: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_edge_simple_bidirectional_updates_both_adjacencies() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 5.0, true).unwrap();
        assert_eq!(g.vertex(1).unwrap().out_edges[&2], 5.0);
        assert_eq!(g.vertex(2).unwrap().out_edges[&1], 5.0);
        assert_eq!(g.get_num_edges(), 2);
    }

    #[test]
    fn rejects_negative_weight() {
        let mut g = Graph::new();
        assert!(matches!(
            g.add_edge_simple(1, 2, -1.0, false),
            Err(ChError::InvalidInput(_))
        ));
    }

    #[test]
    fn remove_edge_decrements_count_and_fails_when_absent() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 5.0, false).unwrap();
        assert_eq!(g.get_num_edges(), 1);
        g.remove_edge(1, 2).unwrap();
        assert_eq!(g.get_num_edges(), 0);
        assert!(!g.edge_exists(1, 2));
        assert!(matches!(g.remove_edge(1, 2), Err(ChError::InvalidInput(_))));
    }

    #[test]
    fn add_shortcut_is_visible_as_an_edge_but_not_geographic_detail() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 1.0, false).unwrap();
        g.add_edge_simple(2, 3, 1.0, false).unwrap();
        g.add_shortcut(1, 3, 2, 2.0).unwrap();
        assert!(g.edge_exists(1, 3));
        assert!(g.is_shortcut(1, 3));
        assert_eq!(g.shortcut_through(1, 3), Some(2));
        assert!(g.edge_detail(1, 3).is_none());
    }

    #[test]
    fn optimize_edges_prunes_downward_edges_from_both_maps() {
        // Vertex 1 has the lower order (0), vertex 2 the higher (1). The
        // rule is per-map and per-vertex: a vertex keeps an adjacency
        // entry (out or in) only if the *other* endpoint has a higher
        // order than itself. So vertex 1 (order 0) keeps its entry for
        // vertex 2 (order 1) in both maps, while vertex 2 (order 1) keeps
        // nothing naming vertex 1 (order 0) in either map.
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 1.0, true).unwrap();
        g.add_ordering(1, 0).unwrap();
        g.add_ordering(2, 1).unwrap();
        g.optimize_edges();
        assert!(g.vertex(1).unwrap().out_edges.contains_key(&2));
        assert!(g.vertex(1).unwrap().in_edges.contains_key(&2));
        assert!(!g.vertex(2).unwrap().out_edges.contains_key(&1));
        assert!(!g.vertex(2).unwrap().in_edges.contains_key(&1));
    }

    #[test]
    fn round_trips_through_bincode() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 3.0, true).unwrap();
        g.add_location(1, 48.8, 2.3);
        g.add_shortcut(1, 3, 2, 4.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");
        g.save(&path).unwrap();
        let loaded = Graph::load(&path).unwrap();
        assert_eq!(loaded.get_num_vertices(), g.get_num_vertices());
        assert_eq!(loaded.get_num_edges(), g.get_num_edges());
        assert_eq!(loaded.location(1), Some((48.8, 2.3)));
        assert_eq!(loaded.shortcut_through(1, 3), Some(2));
    }
}
