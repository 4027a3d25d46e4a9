//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `node`: arena-backed binary forest nodes with cross-tree twin links.
//! - `forest`: component lists, rho bookkeeping, work-list discovery.
//! - `lca`: Euler-tour + sparse-table lowest-common-ancestor index.
//! - `undo`: reversible edit log backing the in-place search.
//! - `sync`: leaf and interior twin synchronization, cluster points.
//! - `newick`: label↔id mapping, canonical serialization and round-trip.
//! - `approx`: linear-time 3-approximation of the rSPR distance.
//! - `search`: exact branch-and-bound with iterative deepening.
//! - `cluster`: cluster decomposition and rejoining.
//! - `io`: reading Newick tree files, writing distance matrices.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod approx;
pub mod cluster;
pub mod forest;
pub mod io;
pub mod lca;
pub mod newick;
pub mod node;
pub mod search;
pub mod sync;
pub mod undo;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use forest::Forest;
pub use newick::LabelMap;
pub use node::{Arena, NodeId};
pub use search::{Config, Distance, Problem, Search, Solution};

/// Errors surfaced at the crate boundary. Budget and search-limit
/// exhaustion are not errors (see [`Distance::ExceedsMax`]); internal
/// invariant violations panic instead of being reported.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to parse tree: {0}")]
    Parse(String),
    #[error("input tree is not binary (node of degree {degree})")]
    NotBinary { degree: usize },
    #[error("input tree has an unlabeled leaf")]
    UnlabeledLeaf,
    #[error("input trees share no leaf labels")]
    DisjointLeafSets,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
