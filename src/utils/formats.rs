//! Utilities for converting between our matrix format and external libraries

use crate::matrix::CsrMatrix;
use num_traits::Num;
use sprs::CsMat;

/// Converts our CSR matrix format to sprs CsMat format
pub fn to_sprs<T>(matrix: &CsrMatrix<T>) -> CsMat<T>
where
    T: Copy + Num + Default,
{
    CsMat::new(
        (matrix.n_rows, matrix.n_cols),
        matrix.row_ptr.clone(),
        matrix.col_idx.clone(),
        matrix.values.clone(),
    )
}

/// Converts a sprs CsMat to our CSR matrix format
pub fn from_sprs<T>(matrix: CsMat<T>) -> CsrMatrix<T>
where
    T: Copy + Num + Default,
{
    // Ensure matrix is in CSR format
    let matrix = if matrix.is_csr() {
        matrix
    } else {
        matrix.to_csr()
    };

    let shape = matrix.shape();
    let (indptr, indices, data) = matrix.into_raw_storage();

    CsrMatrix::new(shape.0, shape.1, indptr, indices, data)
}
