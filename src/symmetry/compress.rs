//! Symmetric compression
//!
//! Extracts, per thread, the strict lower triangle and the diagonal of the
//! thread's row slab into private CSR storage. Column indices stay in the
//! global column space; rows are 0-indexed within the slab. The hybrid
//! sidecar and the auxiliary structures of the indexed-reduction and
//! a-priori strategies are built here as well.

use std::collections::{BTreeMap, BTreeSet};

use log::info;
use rayon::prelude::*;

use crate::matrix::CsrMatrix;

/// Per-thread symmetric compression record
///
/// Holds the slab's strict-lower CSR, its diagonal, the optional
/// high-bandwidth sidecar, and the schedule artifacts filled in by the
/// coloring and schedule passes.
#[derive(Debug, Default)]
pub struct ThreadData {
    /// Rows in this slab
    pub n_rows: usize,
    /// First global row of the slab
    pub row_offset: usize,

    /// Row pointers of the strict lower triangle (slab-local rows)
    pub row_ptr: Vec<usize>,
    /// Column indices of the strict lower triangle (global columns)
    pub col_idx: Vec<usize>,
    /// Values of the strict lower triangle
    pub values: Vec<f64>,
    /// Diagonal values, zero where the matrix stores none
    pub diagonal: Vec<f64>,
    /// Nonzeros in the strict lower triangle of this slab
    pub nnz_lower: usize,
    /// Stored diagonal entries in this slab
    pub nnz_diag: usize,

    /// Row pointers of the high-bandwidth sidecar (hybrid only)
    pub row_ptr_high: Vec<usize>,
    /// Column indices of the high-bandwidth sidecar
    pub col_idx_high: Vec<usize>,
    /// Values of the high-bandwidth sidecar
    pub values_high: Vec<f64>,
    /// Nonzeros in the sidecar
    pub nnz_high: usize,

    /// Color count of the compiled schedule
    pub n_colors: usize,
    /// Total ranges over all colors
    pub n_ranges: usize,
    /// Range offsets per color, length `n_colors + 1`
    pub range_ptr: Vec<usize>,
    /// First slab-local row of each range
    pub range_start: Vec<usize>,
    /// Last slab-local row of each range (inclusive)
    pub range_end: Vec<usize>,
    /// For each color, the threads whose previous color phase must complete
    /// before this thread may proceed
    pub deps: Vec<Vec<usize>>,

    /// First conflict-map entry this thread reduces
    pub map_start: usize,
    /// One past the last conflict-map entry this thread reduces
    pub map_end: usize,
}

/// Flattened list of cross-thread conflict targets for the indexed
/// reduction
///
/// Entry `k` says: shadow vector of thread `cpu[k]` holds a pending
/// contribution for output row `pos[k]`.
#[derive(Debug)]
pub struct ConflictMap {
    /// Output row of each conflict entry
    pub pos: Vec<usize>,
    /// Source thread of each conflict entry
    pub cpu: Vec<usize>,
}

impl ConflictMap {
    /// Number of conflict entries
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    /// Whether there are no conflict entries
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }
}

/// Global artifacts of the a-priori conflict-free strategy
///
/// The lower triangle is kept in one global CSR (original row order) and
/// rows are re-grouped by color: `row_ind[color_ptr[c]..color_ptr[c + 1]]`
/// are the rows of color `c`, ascending.
#[derive(Debug)]
pub struct AprioriData {
    /// Row pointers of the global strict lower triangle
    pub row_ptr: Vec<usize>,
    /// Column indices of the global strict lower triangle
    pub col_idx: Vec<usize>,
    /// Values of the global strict lower triangle
    pub values: Vec<f64>,
    /// Global diagonal, zero where the matrix stores none
    pub diagonal: Vec<f64>,
    /// Row offsets per color, length `n_colors + 1`
    pub color_ptr: Vec<usize>,
    /// Rows grouped by color
    pub row_ind: Vec<usize>,
    /// Number of colors
    pub n_colors: usize,
    /// Nonzeros in the lower triangle
    pub nnz_lower: usize,
    /// Stored diagonal entries
    pub nnz_diag: usize,
}

/// Compresses one thread's slab: strict lower triangle plus diagonal, and
/// the high-bandwidth sidecar when a high part is given
pub fn compress_slab(
    matrix: &CsrMatrix<f64>,
    high: Option<&CsrMatrix<f64>>,
    row_split: &[usize],
    tid: usize,
) -> ThreadData {
    let row_offset = row_split[tid];
    let n_rows = row_split[tid + 1] - row_offset;

    let mut row_ptr = vec![0usize; n_rows + 1];
    let mut diagonal = vec![0.0f64; n_rows];
    let nnz_estimate = (matrix.row_ptr[row_split[tid + 1]] - matrix.row_ptr[row_offset]) / 2;
    let mut col_idx = Vec::with_capacity(nnz_estimate);
    let mut values = Vec::with_capacity(nnz_estimate);
    let mut nnz_diag = 0usize;

    for i in row_offset..row_split[tid + 1] {
        for j in matrix.row_ptr[i]..matrix.row_ptr[i + 1] {
            let col = matrix.col_idx[j];
            if col < i {
                row_ptr[i + 1 - row_offset] += 1;
                col_idx.push(col);
                values.push(matrix.values[j]);
            } else if col == i {
                diagonal[i - row_offset] = matrix.values[j];
                nnz_diag += 1;
            }
        }
    }

    for i in 1..=n_rows {
        row_ptr[i] += row_ptr[i - 1];
    }
    assert_eq!(row_ptr[n_rows], values.len());

    let mut data = ThreadData {
        n_rows,
        row_offset,
        nnz_lower: values.len(),
        nnz_diag,
        row_ptr,
        col_idx,
        values,
        diagonal,
        ..ThreadData::default()
    };

    if let Some(high) = high {
        let mut row_ptr_high = vec![0usize; n_rows + 1];
        let mut col_idx_high = Vec::new();
        let mut values_high = Vec::new();
        for i in row_offset..row_split[tid + 1] {
            for j in high.row_ptr[i]..high.row_ptr[i + 1] {
                row_ptr_high[i + 1 - row_offset] += 1;
                col_idx_high.push(high.col_idx[j]);
                values_high.push(high.values[j]);
            }
        }
        for i in 1..=n_rows {
            row_ptr_high[i] += row_ptr_high[i - 1];
        }
        data.nnz_high = values_high.len();
        data.row_ptr_high = row_ptr_high;
        data.col_idx_high = col_idx_high;
        data.values_high = values_high;
    }

    data
}

/// Compresses every slab in parallel
///
/// Each worker builds the buffers it will later own (first-touch
/// discipline under a NUMA-aware allocator).
pub fn compress_slabs(
    matrix: &CsrMatrix<f64>,
    high: Option<&CsrMatrix<f64>>,
    row_split: &[usize],
) -> Vec<ThreadData> {
    let n_threads = row_split.len() - 1;
    info!("converting CSR format to SSS format");

    (0..n_threads)
        .into_par_iter()
        .map(|tid| compress_slab(matrix, high, row_split, tid))
        .collect()
}

/// Builds the conflict map for the indexed-reduction strategy and assigns
/// each thread its reduction window
///
/// The map lists, ordered by output row, every (row, source thread) pair
/// where a thread's shadow vector holds a contribution for a row below its
/// slab. The windows partition the map so that all entries of one output
/// row land in the same window.
pub fn build_conflict_map(data: &mut [ThreadData], row_split: &[usize]) -> ConflictMap {
    let n_threads = data.len();

    // Ordered map: output row -> set of source threads
    let mut global_map: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    for (tid, td) in data.iter().enumerate().skip(1) {
        for i in 0..td.n_rows {
            for j in td.row_ptr[i]..td.row_ptr[i + 1] {
                let col = td.col_idx[j];
                if col < row_split[tid] {
                    global_map.entry(col).or_default().insert(tid);
                }
            }
        }
    }

    let n_conflicts: usize = global_map.values().map(BTreeSet::len).sum();
    let mut pos = Vec::with_capacity(n_conflicts);
    let mut cpu = Vec::with_capacity(n_conflicts);
    for (&col, tids) in &global_map {
        for &tid in tids {
            pos.push(col);
            cpu.push(tid);
        }
    }

    // Split reduction work among threads so that conflicts to the same row
    // are assigned to the same thread
    let target = n_conflicts.div_ceil(n_threads).max(1);
    let mut bounds = vec![0usize; n_threads + 1];
    let mut t = 0usize;
    let mut in_window = 0usize;
    let mut consumed = 0usize;
    for tids in global_map.values() {
        if t + 1 < n_threads && in_window >= target {
            bounds[t + 1] = consumed;
            t += 1;
            in_window = 0;
        }
        in_window += tids.len();
        consumed += tids.len();
    }
    for b in bounds.iter_mut().skip(t + 1) {
        *b = n_conflicts;
    }

    for (tid, td) in data.iter_mut().enumerate() {
        td.map_start = bounds[tid];
        td.map_end = bounds[tid + 1];
    }

    info!("detected {} total direct conflicts", n_conflicts);
    ConflictMap { pos, cpu }
}

/// Extracts the global strict lower triangle and diagonal for the a-priori
/// strategy
///
/// Coloring artifacts (`color_ptr`, `row_ind`) are filled in by the caller
/// once the tid-blind conflict graph has been colored.
pub fn compress_global(matrix: &CsrMatrix<f64>) -> AprioriData {
    let n_rows = matrix.n_rows;
    let mut row_ptr = vec![0usize; n_rows + 1];
    let mut diagonal = vec![0.0f64; n_rows];
    let mut col_idx = Vec::with_capacity(matrix.nnz() / 2);
    let mut values = Vec::with_capacity(matrix.nnz() / 2);
    let mut nnz_diag = 0usize;

    for i in 0..n_rows {
        for j in matrix.row_ptr[i]..matrix.row_ptr[i + 1] {
            let col = matrix.col_idx[j];
            if col < i {
                row_ptr[i + 1] += 1;
                col_idx.push(col);
                values.push(matrix.values[j]);
            } else if col == i {
                diagonal[i] = matrix.values[j];
                nnz_diag += 1;
            }
        }
    }
    for i in 1..=n_rows {
        row_ptr[i] += row_ptr[i - 1];
    }
    assert_eq!(row_ptr[n_rows], values.len());

    AprioriData {
        nnz_lower: values.len(),
        nnz_diag,
        row_ptr,
        col_idx,
        values,
        diagonal,
        color_ptr: Vec::new(),
        row_ind: Vec::new(),
        n_colors: 0,
    }
}

/// Groups the rows of the a-priori lower triangle by color
pub fn group_rows_by_color(apriori: &mut AprioriData, color: &[usize], n_colors: usize, blk_bits: u32) {
    let n_rows = apriori.row_ptr.len() - 1;
    let mut row_ind_per_color: Vec<Vec<usize>> = vec![Vec::new(); n_colors];
    for i in 0..n_rows {
        row_ind_per_color[color[i >> blk_bits]].push(i);
    }

    let mut color_ptr = vec![0usize; n_colors + 1];
    for c in 0..n_colors {
        color_ptr[c + 1] = color_ptr[c] + row_ind_per_color[c].len();
    }
    assert_eq!(color_ptr[n_colors], n_rows);

    let mut row_ind = Vec::with_capacity(n_rows);
    for rows in &row_ind_per_color {
        // Rows were collected in ascending order per color
        row_ind.extend_from_slice(rows);
    }

    apriori.color_ptr = color_ptr;
    apriori.row_ind = row_ind;
    apriori.n_colors = n_colors;
}
