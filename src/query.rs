//! Point-to-point shortest-path queries over a contracted graph.
//!
//! [`shortest_path`] runs a bidirectional search that shares a single
//! priority queue between the forward and backward frontiers, each entry
//! tagged with which direction it belongs to. Popping always expands
//! whichever frontier is globally cheapest next, not "alternate forward
//! then backward" — that is what makes sharing one queue meaningfully
//! different from running two independent Dijkstras side by side. When
//! `standard` is false (the common case), relaxation is additionally
//! restricted to edges leading to a higher-order vertex, which is exact
//! once the graph has been contracted (see [`crate::contraction`]) and
//! is what makes the search fast.

use rustc_hash::FxHashMap;

use crate::error::{ChError, ChResult};
use crate::graph::{Graph, VertexId, NO_PREDECESSOR};
use crate::heap::{Direction, HeapElement, MinHeap};

struct SearchState {
    dist: FxHashMap<VertexId, f64>,
    prev: FxHashMap<VertexId, VertexId>,
    settled: std::collections::HashSet<VertexId>,
}

impl SearchState {
    fn new() -> Self {
        Self { dist: FxHashMap::default(), prev: FxHashMap::default(), settled: std::collections::HashSet::new() }
    }
}

struct BidirectionalSearch<'a> {
    graph: &'a Graph,
    standard: bool,
    forward: SearchState,
    backward: SearchState,
    queue: MinHeap<OrderedHeapElement>,
}

/// Gives [`HeapElement`] the total order [`MinHeap`] requires, ordered
/// by `.value` alone (direction never participates in comparison,
/// matching the original engine's heap-element ordering).
#[derive(Debug, Clone)]
struct OrderedHeapElement(HeapElement);

impl PartialEq for OrderedHeapElement {
    fn eq(&self, other: &Self) -> bool {
        self.0.value == other.0.value
    }
}
impl Eq for OrderedHeapElement {}
impl PartialOrd for OrderedHeapElement {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OrderedHeapElement {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.value.partial_cmp(&other.0.value).expect("distances are never NaN")
    }
}

impl<'a> BidirectionalSearch<'a> {
    fn new(graph: &'a Graph, source: VertexId, target: VertexId, standard: bool) -> ChResult<Self> {
        if graph.vertex(source).is_none() {
            return Err(ChError::InvalidInput(format!("unknown source vertex {source}")));
        }
        if graph.vertex(target).is_none() {
            return Err(ChError::InvalidInput(format!("unknown target vertex {target}")));
        }
        let mut queue = MinHeap::with_capacity(64);
        let mut forward = SearchState::new();
        let mut backward = SearchState::new();
        forward.dist.insert(source, 0.0);
        forward.prev.insert(source, NO_PREDECESSOR);
        backward.dist.insert(target, 0.0);
        backward.prev.insert(target, NO_PREDECESSOR);
        queue.push(OrderedHeapElement(HeapElement::with_direction(source, 0.0, Direction::Forward)));
        queue.push(OrderedHeapElement(HeapElement::with_direction(target, 0.0, Direction::Backward)));
        Ok(Self { graph, standard, forward, backward, queue })
    }

    fn state(&self, backward: bool) -> &SearchState {
        if backward { &self.backward } else { &self.forward }
    }

    fn state_mut(&mut self, backward: bool) -> &mut SearchState {
        if backward { &mut self.backward } else { &mut self.forward }
    }

    /// Returns the adjacency a vertex should expand through for the
    /// given direction: outgoing edges going forward, incoming edges
    /// going backward (walking an edge `u -> v` backward means standing
    /// at `v` and looking for a `u` that could reach it).
    fn allowed_edges(&self, vertex_id: VertexId, backward: bool) -> Option<&FxHashMap<VertexId, f64>> {
        let vertex = self.graph.vertex(vertex_id)?;
        Some(if backward { &vertex.in_edges } else { &vertex.out_edges })
    }

    fn relax(&mut self, vertex_id: VertexId, backward: bool) {
        let Some(edges) = self.allowed_edges(vertex_id, backward) else { return };
        let edges: Vec<(VertexId, f64)> = edges.iter().map(|(&k, &v)| (k, v)).collect();
        let base_dist = *self.state(backward).dist.get(&vertex_id).unwrap_or(&f64::INFINITY);
        let own_order = self.graph.vertex(vertex_id).map(|v| v.order).unwrap_or(0);

        for (neighbor, weight) in edges {
            debug_assert!(weight >= 0.0, "corrupted graph: negative edge weight {vertex_id} -> {neighbor}");
            if !self.standard {
                let neighbor_order = self.graph.vertex(neighbor).map(|v| v.order).unwrap_or(0);
                if neighbor_order < own_order {
                    continue;
                }
            }
            let candidate = base_dist + weight;
            debug_assert!(candidate >= 0.0, "corrupted graph: negative tentative distance at {neighbor}");
            let state = self.state_mut(backward);
            let improves = state.dist.get(&neighbor).map(|&d| candidate < d).unwrap_or(true);
            if improves {
                state.dist.insert(neighbor, candidate);
                state.prev.insert(neighbor, vertex_id);
                self.queue
                    .push(OrderedHeapElement(HeapElement::with_direction(neighbor, candidate, dir(backward))));
            }
        }
    }

    /// Runs the search to completion and returns the meeting vertex and
    /// total cost, or `None` if source and target are disconnected.
    fn run(&mut self) -> (Option<VertexId>, f64) {
        let mut best_cost = f64::INFINITY;
        let mut meeting: Option<VertexId> = None;

        while let Ok(top) = self.queue.peek() {
            if top.0.value >= best_cost {
                break;
            }
            let current = self.queue.pop().expect("peeked above").0;
            let backward = matches!(current.direction, Some(Direction::Backward));
            if self.state(backward).settled.contains(&current.id) {
                continue;
            }
            self.state_mut(backward).settled.insert(current.id);

            self.relax(current.id, backward);

            if self.state(!backward).settled.contains(&current.id) {
                let total = self.forward.dist.get(&current.id).copied().unwrap_or(f64::INFINITY)
                    + self.backward.dist.get(&current.id).copied().unwrap_or(f64::INFINITY);
                if total < best_cost {
                    best_cost = total;
                    meeting = Some(current.id);
                }
            }

            if self.queue.is_empty() {
                break;
            }
        }

        (meeting, best_cost)
    }

    /// Walks `forward.prev` from `meeting`'s predecessor back to
    /// `source` (reversed), then `backward.prev` from `meeting` forward
    /// to `target`, so the meeting vertex appears exactly once,
    /// contributed by the backward half.
    fn reconstruct(&self, meeting: VertexId) -> Vec<VertexId> {
        let mut forward_half = Vec::new();
        let mut cursor = self.forward.prev.get(&meeting).copied().unwrap_or(NO_PREDECESSOR);
        // Walk predecessors of `meeting`'s forward-side parent back to the source.
        if cursor != NO_PREDECESSOR {
            forward_half.push(cursor);
            while let Some(&p) = self.forward.prev.get(&cursor) {
                if p == NO_PREDECESSOR {
                    break;
                }
                cursor = p;
                forward_half.push(cursor);
            }
        }
        forward_half.reverse();

        let mut backward_half = vec![meeting];
        let mut cursor = meeting;
        while let Some(&p) = self.backward.prev.get(&cursor) {
            if p == NO_PREDECESSOR {
                break;
            }
            backward_half.push(p);
            cursor = p;
        }

        forward_half.into_iter().chain(backward_half).collect()
    }
}

fn dir(backward: bool) -> Direction {
    if backward { Direction::Backward } else { Direction::Forward }
}

/// Unpacks all shortcuts between `start` and `end` into the sequence of
/// original vertex ids they pass through, via an explicit stack rather
/// than recursion (shortcut chains can be deep on a large hierarchy).
fn unpack_shortcut(graph: &Graph, start: VertexId, end: VertexId) -> Vec<VertexId> {
    let mut result = Vec::new();
    let mut stack: Vec<(VertexId, VertexId)> = vec![(start, end)];
    while let Some((a, b)) = stack.pop() {
        if let Some(through) = graph.shortcut_through(a, b) {
            // Push in reverse so popping processes (a, through) before (through, b).
            stack.push((through, b));
            stack.push((a, through));
        } else {
            result.push(a);
        }
    }
    result
}

/// Unpacks every shortcut edge in a reconstructed vertex-id path into
/// the full sequence of original (non-shortcut) vertex ids, using one
/// shared stack and a mutable anchor that walks the path left to right.
fn unpack_path(graph: &Graph, path: &[VertexId]) -> Vec<VertexId> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut anchor = path[0];
    for &next in &path[1..] {
        let unpacked = unpack_shortcut(graph, anchor, next);
        result.extend(unpacked);
        anchor = next;
    }
    result.push(*path.last().unwrap());
    result
}

/// Splices in the OSM shape nodes that lie between each pair of adjacent
/// vertices in a fully unpacked path, so the returned path is ready for
/// routing rather than just naming the graph's intersections.
fn insert_edge_nodes(graph: &Graph, path: &[VertexId]) -> Vec<VertexId> {
    if path.is_empty() {
        return Vec::new();
    }
    let mut result = vec![path[0]];
    for window in path.windows(2) {
        let (a, b) = (window[0], window[1]);
        if let Some(edge) = graph.edge_detail(a, b) {
            result.extend(edge.nodes.iter().copied());
        }
        result.push(b);
    }
    result
}

/// Finds the shortest path from `source` to `target`.
///
/// If `standard` is true, runs plain bidirectional Dijkstra (every edge
/// is eligible for relaxation); otherwise runs the upward-only search
/// that is exact against a contracted graph and much faster. Returns the
/// full vertex sequence (with shape nodes spliced in) and its cost, or
/// an empty sequence with cost `-1.0` if `source` and `target` are not
/// connected — that is not an error, just a negative result.
#[tracing::instrument(skip(graph))]
pub fn shortest_path(
    graph: &Graph,
    source: VertexId,
    target: VertexId,
    standard: bool,
) -> ChResult<(Vec<VertexId>, f64)> {
    if graph.vertex(source).is_none() {
        return Err(ChError::InvalidInput(format!("unknown source vertex {source}")));
    }
    if graph.vertex(target).is_none() {
        return Err(ChError::InvalidInput(format!("unknown target vertex {target}")));
    }
    if source == target {
        return Ok((vec![source], 0.0));
    }
    let mut search = BidirectionalSearch::new(graph, source, target, standard)?;
    let (meeting, cost) = search.run();
    let Some(meeting) = meeting else {
        return Ok((Vec::new(), -1.0));
    };
    let path = search.reconstruct(meeting);
    let unpacked = unpack_path(graph, &path);
    let full = insert_edge_nodes(graph, &unpacked);
    Ok((full, cost))
}

/// Converts a vertex-id path (as returned by [`shortest_path`]) into a
/// sequence of (lat, lon) coordinates, skipping ids with no registered
/// location.
pub fn path_to_coordinates(graph: &Graph, path: &[VertexId]) -> Vec<(f64, f64)> {
    path.iter().filter_map(|&id| graph.location(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChConfig;
    use crate::contraction::contract_graph;

    #[test]
    fn triangle_picks_the_direct_edge() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 5.0, false).unwrap();
        g.add_edge_simple(2, 3, 7.0, false).unwrap();
        g.add_edge_simple(1, 3, 1.0, false).unwrap();
        contract_graph(&mut g, &ChConfig::default()).unwrap();
        let (path, cost) = shortest_path(&g, 1, 3, false).unwrap();
        assert_eq!(path, vec![1, 3]);
        assert_eq!(cost, 1.0);
    }

    #[test]
    fn unreachable_target_returns_empty_path_and_negative_cost() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 1.0, false).unwrap();
        g.add_edge_simple(4, 1, 1.0, false).unwrap();
        g.add_edge_simple(3, 5, 1.0, false).unwrap();
        contract_graph(&mut g, &ChConfig::default()).unwrap();
        let (path, cost) = shortest_path(&g, 3, 1, false).unwrap();
        assert!(path.is_empty());
        assert_eq!(cost, -1.0);
    }

    #[test]
    fn directed_diamond_takes_the_only_valid_orientation() {
        let mut g = Graph::new();
        g.add_edge_simple(1, 2, 2.0, false).unwrap();
        g.add_edge_simple(2, 3, 3.0, false).unwrap();
        g.add_edge_simple(1, 3, 10.0, false).unwrap();
        g.add_edge_simple(3, 4, 4.0, false).unwrap();
        contract_graph(&mut g, &ChConfig::default()).unwrap();
        let (path, cost) = shortest_path(&g, 1, 4, false).unwrap();
        assert_eq!(path, vec![1, 2, 3, 4]);
        assert_eq!(cost, 9.0);
    }

    #[test]
    fn unknown_vertex_is_invalid_input() {
        let g = Graph::new();
        let err = shortest_path(&g, 1, 2, false).unwrap_err();
        assert!(matches!(err, ChError::InvalidInput(_)));
    }

    #[test]
    fn unknown_vertex_is_invalid_input_even_when_source_equals_target() {
        let g = Graph::new();
        let err = shortest_path(&g, 1, 1, false).unwrap_err();
        assert!(matches!(err, ChError::InvalidInput(_)));
    }

    #[test]
    fn standard_and_ch_restricted_search_agree() {
        let mut g = Graph::new();
        for (a, b, w) in [
            (1, 2, 2.0),
            (2, 5, 1.0),
            (5, 6, 1.0),
            (1, 3, 1.0),
            (3, 4, 1.0),
            (4, 7, 1.0),
            (7, 6, 1.0),
            (6, 5, 1.0),
            (5, 2, 1.0),
        ] {
            g.add_edge_simple(a, b, w, false).unwrap();
        }
        let baseline = shortest_path(&g, 1, 6, true).unwrap();
        contract_graph(&mut g, &ChConfig::default()).unwrap();
        let ch_restricted = shortest_path(&g, 1, 6, false).unwrap();
        assert_eq!(baseline.1, ch_restricted.1);
    }
}
