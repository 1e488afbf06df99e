//! Conflict-graph construction
//!
//! Vertices are blocked rows (`blk_factor` rows per vertex). An edge means
//! a write conflict on the output vector can occur between the two blocks:
//! either a direct conflict (a mirrored write lands below the writer's
//! slab) or an indirect one (two rows of different threads store a nonzero
//! in the same column and both mirror into it). Parallel edges are
//! tolerated by the colorer.

use log::{debug, info};

use crate::symmetry::compress::{AprioriData, ThreadData};

/// A conflict-graph vertex: a block of rows with its owning thread and its
/// nonzero weight
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedVertex {
    /// Block id
    pub vid: usize,
    /// Thread owning the block's rows
    pub tid: usize,
    /// Strict-lower (plus sidecar, in hybrid mode) nonzeros in the block
    pub nnz: usize,
}

/// Undirected conflict graph over blocked rows
#[derive(Debug)]
pub struct ConflictGraph {
    /// Adjacency lists; parallel edges possible
    pub adj: Vec<Vec<usize>>,
    /// Vertex weights and ownership
    pub vertices: Vec<WeightedVertex>,
}

impl ConflictGraph {
    /// Number of vertices
    pub fn len(&self) -> usize {
        self.adj.len()
    }

    /// Whether the graph has no vertices
    pub fn is_empty(&self) -> bool {
        self.adj.is_empty()
    }
}

/// Builds the conflict graph over the compressed slabs
///
/// Direct conflicts connect a block to the block of every column its rows
/// reach below their slab. Indirect conflicts connect blocks of different
/// threads that store a nonzero in the same column block. Construction
/// walks the threads in tid order so the result is deterministic.
pub fn build_graph(
    data: &[ThreadData],
    row_split: &[usize],
    blk_bits: u32,
    hybrid: bool,
) -> ConflictGraph {
    let n_rows = *row_split.last().expect("row_split must not be empty");
    let blk_factor = 1usize << blk_bits;
    let n_blocks = n_rows.div_ceil(blk_factor).max(1);

    let start = std::time::Instant::now();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n_blocks];
    let mut vertices: Vec<WeightedVertex> = (0..n_blocks)
        .map(|vid| WeightedVertex { vid, tid: 0, nnz: 0 })
        .collect();
    // Per column block: the row blocks (and their threads) that store a
    // nonzero in it
    let mut indirect: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n_blocks];

    for (tid, td) in data.iter().enumerate() {
        let row_offset = td.row_offset;
        for i in 0..td.n_rows {
            let blk_row = (i + row_offset) >> blk_bits;
            vertices[blk_row].tid = tid;
            vertices[blk_row].nnz += td.row_ptr[i + 1] - td.row_ptr[i];
            if hybrid {
                vertices[blk_row].nnz += td.row_ptr_high[i + 1] - td.row_ptr_high[i];
            }

            let mut prev_blk_col = usize::MAX;
            for j in td.row_ptr[i]..td.row_ptr[i + 1] {
                let col = td.col_idx[j];
                let blk_col = col >> blk_bits;
                // A nonzero below the slab races with the column's owner
                if col < row_offset {
                    adj[blk_row].push(blk_col);
                    adj[blk_col].push(blk_row);
                }

                // Mark potential indirect conflicts once per column block
                if blk_col != prev_blk_col {
                    indirect[blk_col].push((blk_row, tid));
                }
                prev_blk_col = blk_col;
            }
        }
    }

    // Two rows of different threads writing the same column block conflict
    // even without a direct edge
    for entries in &indirect {
        for (a, &(row_a, tid_a)) in entries.iter().enumerate() {
            for &(row_b, tid_b) in &entries[a + 1..] {
                if row_a != row_b && tid_a != tid_b {
                    adj[row_a].push(row_b);
                    adj[row_b].push(row_a);
                }
            }
        }
    }

    debug!(
        "graph assembly: {:.6}s, blocking factor {}",
        start.elapsed().as_secs_f64(),
        blk_factor
    );
    info!(
        "conflict graph has {} vertices and {} edge endpoints",
        n_blocks,
        adj.iter().map(Vec::len).sum::<usize>()
    );

    ConflictGraph { adj, vertices }
}

/// Builds the thread-blind conflict graph for the a-priori strategy
///
/// Here the coloring must make any two rows of one color safe to run
/// concurrently under any partition, so indirect edges connect same-column
/// blocks regardless of ownership.
pub fn build_apriori_graph(apriori: &AprioriData, blk_bits: u32) -> Vec<Vec<usize>> {
    let n_rows = apriori.row_ptr.len() - 1;
    let blk_factor = 1usize << blk_bits;
    let n_blocks = n_rows.div_ceil(blk_factor).max(1);

    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n_blocks];
    let mut indirect: Vec<Vec<usize>> = vec![Vec::new(); n_blocks];

    for i in 0..n_rows {
        let blk_row = i >> blk_bits;
        let mut prev_blk_col = usize::MAX;
        for j in apriori.row_ptr[i]..apriori.row_ptr[i + 1] {
            let blk_col = apriori.col_idx[j] >> blk_bits;
            adj[blk_row].push(blk_col);
            adj[blk_col].push(blk_row);
            if blk_col != prev_blk_col {
                indirect[blk_col].push(blk_row);
            }
            prev_blk_col = blk_col;
        }
    }

    for entries in &indirect {
        for (a, &row_a) in entries.iter().enumerate() {
            for &row_b in &entries[a + 1..] {
                if row_a != row_b {
                    adj[row_a].push(row_b);
                    adj[row_b].push(row_a);
                }
            }
        }
    }

    adj
}
