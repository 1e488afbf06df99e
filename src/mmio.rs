//! Matrix Market coordinate format reader and writer
//!
//! Reads the `coordinate` flavor of the Matrix Market exchange format into
//! a full CSR matrix. For files declared `symmetric` only the lower
//! triangle is stored on disk; the reader mirrors the off-diagonal entries
//! so the result is always the full matrix, and reports the header's
//! symmetry flag to the caller.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::matrix::CsrMatrix;

/// Numeric field of a Matrix Market file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Real,
    Integer,
    Pattern,
}

/// Reads a matrix in Matrix Market coordinate format
///
/// Returns the full CSR matrix and whether the file declared itself
/// symmetric. Entries must appear in ascending row order; indices are
/// converted from the file's 1-based convention.
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<(CsrMatrix<f64>, bool)> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines().enumerate();

    // Banner: %%MatrixMarket matrix coordinate <field> <symmetry>
    let (line_no, banner) = match lines.next() {
        Some((n, line)) => (n + 1, line?),
        None => {
            return Err(Error::Format {
                line: 1,
                msg: "empty file".into(),
            })
        }
    };
    let (field, symmetric) = parse_banner(&banner, line_no)?;

    // Skip comments, read the size line
    let mut size_line = None;
    for (n, line) in lines.by_ref() {
        let line = line?;
        if line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        size_line = Some((n + 1, line));
        break;
    }
    let (line_no, size_line) = size_line.ok_or(Error::Format {
        line: line_no,
        msg: "missing size line".into(),
    })?;

    let dims: Vec<&str> = size_line.split_whitespace().collect();
    if dims.len() != 3 {
        return Err(Error::Format {
            line: line_no,
            msg: format!("size line must have 3 fields, got {}", dims.len()),
        });
    }
    let n_rows = parse_number::<usize>(dims[0], line_no, "number of rows")?;
    let n_cols = parse_number::<usize>(dims[1], line_no, "number of columns")?;
    let n_entries = parse_number::<usize>(dims[2], line_no, "number of entries")?;

    if symmetric && n_rows != n_cols {
        return Err(Error::Format {
            line: line_no,
            msg: format!("symmetric matrix must be square, got {}x{}", n_rows, n_cols),
        });
    }

    // Read the coordinate entries
    let mut triplets: Vec<(usize, usize, f64)> = Vec::with_capacity(n_entries);
    let mut prev_row = 0usize;

    for (n, line) in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = n + 1;

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let expected = if field == Field::Pattern { 2 } else { 3 };
        if parts.len() < expected {
            return Err(Error::Format {
                line: line_no,
                msg: format!("entry must have {} fields, got {}", expected, parts.len()),
            });
        }

        let row = parse_number::<usize>(parts[0], line_no, "row index")?;
        let col = parse_number::<usize>(parts[1], line_no, "column index")?;
        if row == 0 || row > n_rows || col == 0 || col > n_cols {
            return Err(Error::IndexOutOfRange {
                row: row.wrapping_sub(1),
                col: col.wrapping_sub(1),
                n_rows,
                n_cols,
            });
        }
        // Convert from 1-indexed to 0-indexed
        let row = row - 1;
        let col = col - 1;

        if !triplets.is_empty() && row < prev_row {
            return Err(Error::NonAscendingRows { row, prev: prev_row });
        }
        prev_row = row;

        let val = match field {
            Field::Pattern => 1.0,
            _ => parse_number::<f64>(parts[2], line_no, "value")?,
        };

        triplets.push((row, col, val));
    }

    if triplets.len() != n_entries {
        return Err(Error::Format {
            line: line_no,
            msg: format!(
                "header declares {} entries but the file contains {}",
                n_entries,
                triplets.len()
            ),
        });
    }

    // Mirror the implicit upper triangle of a symmetric file
    if symmetric {
        let stored = triplets.len();
        for k in 0..stored {
            let (row, col, val) = triplets[k];
            if row != col {
                triplets.push((col, row, val));
            }
        }
    }

    Ok((triplets_to_csr(n_rows, n_cols, triplets), symmetric))
}

/// Writes a matrix in Matrix Market coordinate format (general symmetry)
pub fn write_matrix<P: AsRef<Path>>(path: P, matrix: &CsrMatrix<f64>) -> Result<()> {
    let mut file = BufWriter::new(File::create(path)?);

    writeln!(file, "%%MatrixMarket matrix coordinate real general")?;
    writeln!(file, "{} {} {}", matrix.n_rows, matrix.n_cols, matrix.nnz())?;

    for i in 0..matrix.n_rows {
        for j in matrix.row_ptr[i]..matrix.row_ptr[i + 1] {
            // Convert to the format's 1-based indices
            writeln!(file, "{} {} {}", i + 1, matrix.col_idx[j] + 1, matrix.values[j])?;
        }
    }

    Ok(())
}

/// Builds a CSR matrix from (row, col, value) triplets
///
/// The triplets may arrive unsorted; they are sorted by (row, col) here.
pub fn triplets_to_csr(
    n_rows: usize,
    n_cols: usize,
    mut triplets: Vec<(usize, usize, f64)>,
) -> CsrMatrix<f64> {
    triplets.sort_unstable_by_key(|&(row, col, _)| (row, col));

    let mut row_ptr = vec![0usize; n_rows + 1];
    let mut col_idx = Vec::with_capacity(triplets.len());
    let mut values = Vec::with_capacity(triplets.len());

    for &(row, col, val) in &triplets {
        row_ptr[row + 1] += 1;
        col_idx.push(col);
        values.push(val);
    }
    for i in 1..=n_rows {
        row_ptr[i] += row_ptr[i - 1];
    }

    CsrMatrix::new(n_rows, n_cols, row_ptr, col_idx, values)
}

fn parse_banner(banner: &str, line: usize) -> Result<(Field, bool)> {
    let tokens: Vec<String> = banner.split_whitespace().map(str::to_lowercase).collect();
    if tokens.len() != 5 || tokens[0] != "%%matrixmarket" {
        return Err(Error::Format {
            line,
            msg: "expected banner '%%MatrixMarket matrix coordinate <field> <symmetry>'".into(),
        });
    }
    if tokens[1] != "matrix" || tokens[2] != "coordinate" {
        return Err(Error::Format {
            line,
            msg: format!("only 'matrix coordinate' data is supported, got '{} {}'", tokens[1], tokens[2]),
        });
    }
    let field = match tokens[3].as_str() {
        "real" => Field::Real,
        "integer" => Field::Integer,
        "pattern" => Field::Pattern,
        other => {
            return Err(Error::Format {
                line,
                msg: format!("unsupported field type '{}'", other),
            })
        }
    };
    let symmetric = match tokens[4].as_str() {
        "general" => false,
        "symmetric" => true,
        other => {
            return Err(Error::Format {
                line,
                msg: format!("unsupported symmetry '{}'", other),
            })
        }
    };
    Ok((field, symmetric))
}

fn parse_number<T: std::str::FromStr>(token: &str, line: usize, what: &str) -> Result<T> {
    token.parse().map_err(|_| Error::Format {
        line,
        msg: format!("invalid {}: '{}'", what, token),
    })
}
