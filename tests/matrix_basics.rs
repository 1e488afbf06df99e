//! Basic tests for the matrix container, Matrix Market I/O, and format
//! conversions

use symspmv::mmio::{read_matrix, triplets_to_csr, write_matrix};
use symspmv::{from_sprs, to_sprs, CsrMatrix, Error};

#[test]
fn test_matrix_creation_csr() {
    let matrix = CsrMatrix::new(
        3,
        3,
        vec![0, 2, 3, 5],
        vec![0, 1, 1, 0, 2],
        vec![1.0, 2.0, 3.0, 4.0, 5.0],
    );

    assert_eq!(matrix.n_rows, 3);
    assert_eq!(matrix.n_cols, 3);
    assert_eq!(matrix.nnz(), 5);

    let first_row: Vec<_> = matrix.row_iter(0).collect();
    assert_eq!(first_row.len(), 2);
    assert_eq!(first_row[0].0, 0);
    assert_eq!(*first_row[0].1, 1.0);
    assert_eq!(first_row[1].0, 1);
    assert_eq!(*first_row[1].1, 2.0);

    let second_row: Vec<_> = matrix.row_iter(1).collect();
    assert_eq!(second_row.len(), 1);
    assert_eq!(second_row[0].0, 1);

    let third_row: Vec<_> = matrix.row_iter(2).collect();
    assert_eq!(third_row.len(), 2);
    assert_eq!(third_row[0].0, 0);
    assert_eq!(third_row[1].0, 2);
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("symspmv_{}_{}.mtx", name, std::process::id()))
}

#[test]
fn test_mmio_round_trip_general() {
    let matrix = triplets_to_csr(
        3,
        4,
        vec![(0, 0, 1.5), (0, 3, -2.0), (1, 1, 3.0), (2, 0, 4.25)],
    );
    let path = temp_path("round_trip");
    write_matrix(&path, &matrix).unwrap();

    let (back, symmetric) = read_matrix(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(!symmetric);
    assert_eq!(back.n_rows, 3);
    assert_eq!(back.n_cols, 4);
    assert_eq!(back.row_ptr, matrix.row_ptr);
    assert_eq!(back.col_idx, matrix.col_idx);
    assert_eq!(back.values, matrix.values);
}

#[test]
fn test_mmio_symmetric_expansion() {
    // Lower triangle of
    // [2 1 0]
    // [1 3 0]
    // [0 0 4]
    let content = "%%MatrixMarket matrix coordinate real symmetric\n\
                   % a comment line\n\
                   3 3 4\n\
                   1 1 2.0\n\
                   2 1 1.0\n\
                   2 2 3.0\n\
                   3 3 4.0\n";
    let path = temp_path("symmetric");
    std::fs::write(&path, content).unwrap();

    let (matrix, symmetric) = read_matrix(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(symmetric);
    // The off-diagonal entry is mirrored
    assert_eq!(matrix.nnz(), 5);
    assert!(matrix.is_symmetric());
    let row0: Vec<_> = matrix.row_iter(0).map(|(c, &v)| (c, v)).collect();
    assert_eq!(row0, vec![(0, 2.0), (1, 1.0)]);
}

#[test]
fn test_mmio_pattern_field() {
    let content = "%%MatrixMarket matrix coordinate pattern general\n\
                   2 2 2\n\
                   1 1\n\
                   2 2\n";
    let path = temp_path("pattern");
    std::fs::write(&path, content).unwrap();

    let (matrix, _) = read_matrix(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(matrix.values, vec![1.0, 1.0]);
}

#[test]
fn test_mmio_rejects_bad_banner() {
    let path = temp_path("bad_banner");
    std::fs::write(&path, "%%MatrixMarket matrix array real general\n2 2\n").unwrap();
    let err = read_matrix(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, Error::Format { .. }));
}

#[test]
fn test_mmio_rejects_out_of_range_index() {
    let content = "%%MatrixMarket matrix coordinate real general\n\
                   2 2 1\n\
                   3 1 1.0\n";
    let path = temp_path("out_of_range");
    std::fs::write(&path, content).unwrap();
    let err = read_matrix(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, Error::IndexOutOfRange { .. }));
}

#[test]
fn test_mmio_rejects_descending_rows() {
    let content = "%%MatrixMarket matrix coordinate real general\n\
                   2 2 2\n\
                   2 1 1.0\n\
                   1 1 1.0\n";
    let path = temp_path("descending");
    std::fs::write(&path, content).unwrap();
    let err = read_matrix(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(err, Error::NonAscendingRows { .. }));
}

#[test]
fn test_sprs_conversion_round_trip() {
    let matrix = triplets_to_csr(3, 3, vec![(0, 1, 2.0), (1, 0, 2.0), (2, 2, 5.0)]);
    let sprs_matrix = to_sprs(&matrix);
    assert_eq!(sprs_matrix.nnz(), 3);

    let back = from_sprs(sprs_matrix);
    assert_eq!(back.row_ptr, matrix.row_ptr);
    assert_eq!(back.col_idx, matrix.col_idx);
    assert_eq!(back.values, matrix.values);
}
