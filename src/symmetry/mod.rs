//! Symmetric-SpMV preprocessing pipeline
//!
//! The pipeline runs once per engine: partition the rows into balanced
//! slabs, compress each slab to its strict lower triangle plus diagonal,
//! build the conflict graph over blocked rows, color it with load
//! balancing, and compile the coloring into per-thread row ranges and
//! dependency sets.

pub mod coloring;
pub mod compress;
pub mod graph;
pub mod partition;
pub mod schedule;

pub use coloring::{balance_colors, coloring_is_valid, greedy_color, ordering};
pub use compress::{
    build_conflict_map, compress_global, compress_slab, compress_slabs, group_rows_by_color,
    AprioriData, ConflictMap, ThreadData,
};
pub use graph::{build_apriori_graph, build_graph, ConflictGraph, WeightedVertex};
pub use partition::{split_by_bandwidth, split_by_nnz};
pub use schedule::{compile_schedule, compute_deps};
