//! Contraction Hierarchies preprocessing and bidirectional shortest-path
//! queries over a static, weighted, directed road network.
//!
//! Four pieces make up the core:
//!
//! - [`heap`] — the binary min-heap used by both preprocessing and
//!   queries.
//! - [`graph`] — the in-memory graph: vertices, geographic edges, the
//!   shortcut table, and node locations.
//! - [`contraction`] — [`contraction::contract_graph`], which assigns
//!   every vertex a contraction order and inserts shortcut edges.
//! - [`query`] — [`query::shortest_path`], the bidirectional search that
//!   exploits the hierarchy to answer queries quickly, and
//!   [`query::path_to_coordinates`] for turning a result into
//!   coordinates.
//!
//! OSM parsing, edge weighting, persistence formats beyond the built-in
//! `bincode` round-trip, and CLI/server entry points live outside this
//! crate; it consumes and produces plain vertex ids and weights.

pub mod config;
pub mod contraction;
pub mod error;
pub mod graph;
pub mod heap;
pub mod query;

pub use config::ChConfig;
pub use contraction::{contract_graph, ContractionStats};
pub use error::{ChError, ChResult};
pub use graph::{Edge, Graph, Vertex, VertexId, NO_PREDECESSOR};
pub use heap::{Direction, HeapElement, MinHeap};
pub use query::{path_to_coordinates, shortest_path};
