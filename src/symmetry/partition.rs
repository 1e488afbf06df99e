//! Row partitioning for the worker threads
//!
//! `split_by_nnz` assigns each thread a contiguous slab of rows carrying
//! roughly the same number of nonzeros under the selected storage scheme
//! (full rows, strict lower triangle, or lower triangle plus the
//! high-bandwidth sidecar). `split_by_bandwidth` performs the hybrid
//! low/high clustering that precedes partitioning in hybrid mode.

use log::info;

use crate::matrix::CsrMatrix;

/// Splits the rows into `n_threads` contiguous slabs balanced by nonzero
/// count
///
/// Returns `row_split` of length `n_threads + 1` with `row_split[0] == 0`
/// and `row_split[n_threads] == n_rows`. In symmetric mode only strict
/// lower-triangular nonzeros are counted; with a high-bandwidth part its
/// per-row counts are added on top. Split points land on multiples of
/// `blk_factor` so that no conflict-graph block straddles two threads.
/// Trailing slabs may be empty.
pub fn split_by_nnz(
    matrix: &CsrMatrix<f64>,
    high: Option<&CsrMatrix<f64>>,
    symmetric: bool,
    n_threads: usize,
    blk_factor: usize,
) -> Vec<usize> {
    let n_rows = matrix.n_rows;
    let mut row_split = vec![0usize; n_threads + 1];

    if n_threads == 1 {
        row_split[1] = n_rows;
        return row_split;
    }

    if symmetric {
        info!(
            "splitting lower triangular part of matrix into {} partitions",
            n_threads
        );
    } else {
        info!("splitting full matrix into {} partitions", n_threads);
    }

    let mut nnz_total = if symmetric {
        (matrix.nnz() - matrix.count_diagonal()) / 2
    } else {
        matrix.nnz()
    };
    if let Some(high) = high {
        nnz_total += high.nnz();
    }
    let nnz_per_split = nnz_total / n_threads;

    let mut curr_nnz = 0usize;
    let mut split_count = 0usize;
    for i in 0..n_rows {
        let row_nnz = if symmetric {
            let mut lower = 0;
            for j in matrix.row_ptr[i]..matrix.row_ptr[i + 1] {
                if matrix.col_idx[j] < i {
                    lower += 1;
                }
            }
            lower
        } else {
            matrix.row_ptr[i + 1] - matrix.row_ptr[i]
        };
        curr_nnz += row_nnz;
        if let Some(high) = high {
            curr_nnz += high.row_ptr[i + 1] - high.row_ptr[i];
        }

        if curr_nnz >= nnz_per_split && (i + 1) % blk_factor == 0 {
            split_count += 1;
            if split_count <= n_threads {
                row_split[split_count] = i + 1;
            }
            curr_nnz = 0;
        }
    }

    // The running sum may never reach the target for the tail rows; any
    // remaining rows always land in the last non-empty slab, and unused
    // trailing slabs stay empty.
    for split in row_split.iter_mut().skip(split_count.min(n_threads - 1) + 1) {
        *split = n_rows;
    }

    debug_assert_eq!(row_split[0], 0);
    debug_assert_eq!(row_split[n_threads], n_rows);
    debug_assert!(row_split.windows(2).all(|w| w[0] <= w[1]));

    row_split
}

/// Clusters the matrix into low- and high-bandwidth nonzeros
///
/// An entry (i, j) is high-bandwidth when `|i - j| >= threshold`. The low
/// part is returned first and feeds symmetric compression; the high part
/// is kept in non-symmetric form and later sliced per thread.
pub fn split_by_bandwidth(
    matrix: &CsrMatrix<f64>,
    threshold: usize,
) -> (CsrMatrix<f64>, CsrMatrix<f64>) {
    info!("clustering matrix into low and high bandwidth nonzeros");

    let n_rows = matrix.n_rows;
    let mut row_ptr_low = vec![0usize; n_rows + 1];
    let mut row_ptr_high = vec![0usize; n_rows + 1];
    let mut col_idx_low = Vec::new();
    let mut col_idx_high = Vec::new();
    let mut values_low = Vec::new();
    let mut values_high = Vec::new();

    for i in 0..n_rows {
        for j in matrix.row_ptr[i]..matrix.row_ptr[i + 1] {
            let col = matrix.col_idx[j];
            if col.abs_diff(i) < threshold {
                row_ptr_low[i + 1] += 1;
                col_idx_low.push(col);
                values_low.push(matrix.values[j]);
            } else {
                row_ptr_high[i + 1] += 1;
                col_idx_high.push(col);
                values_high.push(matrix.values[j]);
            }
        }
    }

    for i in 1..=n_rows {
        row_ptr_low[i] += row_ptr_low[i - 1];
        row_ptr_high[i] += row_ptr_high[i - 1];
    }
    assert_eq!(row_ptr_low[n_rows], values_low.len());
    assert_eq!(row_ptr_high[n_rows], values_high.len());

    let low = CsrMatrix::new(n_rows, matrix.n_cols, row_ptr_low, col_idx_low, values_low);
    let high = CsrMatrix::new(n_rows, matrix.n_cols, row_ptr_high, col_idx_high, values_high);
    (low, high)
}
