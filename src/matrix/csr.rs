//! Compressed Sparse Row (CSR) matrix format implementation

use std::fmt;
use num_traits::Num;

/// A sparse matrix in Compressed Sparse Row (CSR) format
///
/// Nonzeros are laid out row-major across two parallel arrays, `col_idx`
/// and `values`, with `row_ptr[i]..row_ptr[i + 1]` delimiting the slice
/// that belongs to row `i` (so `row_ptr` holds `n_rows + 1` offsets and
/// ends at the nonzero count).
///
/// Column indices within a row are expected in ascending order; the
/// preprocessing pipeline relies on this to separate the strict lower
/// triangle from the diagonal in a single pass.
#[derive(Clone)]
pub struct CsrMatrix<T> {
    /// Number of rows in the matrix
    pub n_rows: usize,

    /// Number of columns in the matrix
    pub n_cols: usize,

    /// Row pointers (size: n_rows + 1)
    /// row_ptr[i] is the index in col_idx and values where row i starts
    /// row_ptr[n_rows] is equal to nnz
    pub row_ptr: Vec<usize>,

    /// Column indices (size: nnz)
    pub col_idx: Vec<usize>,

    /// Non-zero values (size: nnz)
    pub values: Vec<T>,
}

impl<T> CsrMatrix<T>
where
    T: Copy + Num,
{
    /// Creates a new CSR matrix with the given dimensions and data
    ///
    /// # Panics
    ///
    /// Panics if the three arrays do not describe a well-formed CSR
    /// matrix: `row_ptr` needs one entry per row plus the closing
    /// sentinel, which must equal the shared length of `col_idx` and
    /// `values`; row offsets may never decrease; and no column index may
    /// reach `n_cols`.
    pub fn new(
        n_rows: usize,
        n_cols: usize,
        row_ptr: Vec<usize>,
        col_idx: Vec<usize>,
        values: Vec<T>,
    ) -> Self {
        assert_eq!(
            row_ptr.len(),
            n_rows + 1,
            "expected one row offset per row plus the closing sentinel"
        );
        assert_eq!(
            col_idx.len(),
            values.len(),
            "every stored value needs a matching column index"
        );
        assert_eq!(
            row_ptr[n_rows],
            col_idx.len(),
            "the closing row offset must equal the nonzero count"
        );

        for i in 0..n_rows {
            assert!(
                row_ptr[i] <= row_ptr[i + 1],
                "row offsets may never decrease"
            );
        }

        for &col in &col_idx {
            assert!(
                col < n_cols,
                "column index {} reaches past the {} declared columns",
                col,
                n_cols
            );
        }

        Self {
            n_rows,
            n_cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Returns the number of non-zero elements in the matrix
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Returns an iterator over the non-zero elements in row i
    ///
    /// Each item is a tuple (col_idx, value) representing a non-zero element
    pub fn row_iter(&self, i: usize) -> impl Iterator<Item = (usize, &T)> {
        assert!(i < self.n_rows, "row {} of a {}-row matrix", i, self.n_rows);

        let start = self.row_ptr[i];
        let end = self.row_ptr[i + 1];

        self.col_idx[start..end]
            .iter()
            .zip(&self.values[start..end])
            .map(|(&col, val)| (col, val))
    }

    /// Creates an empty matrix with the given dimensions
    pub fn zeros(n_rows: usize, n_cols: usize) -> Self {
        Self {
            n_rows,
            n_cols,
            row_ptr: vec![0; n_rows + 1],
            col_idx: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Creates an identity matrix of the given size
    pub fn identity(n: usize) -> Self {
        let row_ptr = (0..=n).collect();
        let col_idx = (0..n).collect();
        let values = vec![T::one(); n];

        Self {
            n_rows: n,
            n_cols: n,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Counts the explicitly stored diagonal entries
    pub fn count_diagonal(&self) -> usize {
        let mut n_diag = 0;
        for i in 0..self.n_rows {
            for j in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[j] == i {
                    n_diag += 1;
                }
            }
        }
        n_diag
    }

    /// Checks whether the matrix is numerically symmetric
    ///
    /// For every stored entry (i, j) with j < i, the mirrored entry (j, i)
    /// must be stored with an equal value. Requires sorted column indices
    /// within each row. Non-square matrices are never symmetric.
    pub fn is_symmetric(&self) -> bool
    where
        T: PartialEq,
    {
        if self.n_rows != self.n_cols {
            return false;
        }

        for i in 0..self.n_rows {
            for j in self.row_ptr[i]..self.row_ptr[i + 1] {
                let col = self.col_idx[j];
                if col >= i {
                    break;
                }
                let mirror = &self.col_idx[self.row_ptr[col]..self.row_ptr[col + 1]];
                match mirror.binary_search(&i) {
                    Ok(pos) => {
                        if self.values[self.row_ptr[col] + pos] != self.values[j] {
                            return false;
                        }
                    }
                    Err(_) => return false,
                }
            }
        }

        true
    }
}

impl<T: fmt::Debug + Copy + Num> fmt::Debug for CsrMatrix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "CsrMatrix {{")?;
        writeln!(f, "  dimensions: {} × {}", self.n_rows, self.n_cols)?;
        writeln!(f, "  nnz: {}", self.nnz())?;

        let max_rows_to_print = 5.min(self.n_rows);
        for i in 0..max_rows_to_print {
            let entries: Vec<_> = self.row_iter(i).collect();
            writeln!(f, "  row {}: {:?}", i, entries)?;
        }
        if self.n_rows > max_rows_to_print {
            writeln!(f, "  ...")?;
        }
        write!(f, "}}")
    }
}
