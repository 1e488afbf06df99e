//! # symspmv: Conflict-Free Symmetric SpMV for Multicore CPUs
//!
//! symspmv accelerates repeated sparse matrix-vector multiplication
//! (SpMV) for symmetric matrices on shared-memory multicore CPUs. It
//! stores only the strict lower triangle plus the diagonal, halving
//! memory traffic, and schedules the mirrored writes so that threads
//! never contend on the output vector.
//!
//! ## Overview
//!
//! A symmetric multiply writes both `y[i]` and `y[col]` for every stored
//! off-diagonal entry, so a naive parallelization races on overlapping
//! output rows. This library resolves the races at preprocessing time:
//!
//! 1. **Partitioning**: rows are split into per-thread slabs with
//!    balanced lower-triangular nonzero counts.
//! 2. **Symmetric compression**: each thread extracts its slab's strict
//!    lower triangle and diagonal into private CSR storage.
//! 3. **Conflict graph**: an undirected graph over (blocked) rows records
//!    every pair of rows whose mirrored writes can collide across
//!    threads, directly or through a shared column.
//! 4. **Coloring**: a greedy distance-1 coloring with per-thread load
//!    balancing groups the rows into conflict-free phases.
//! 5. **Schedule compilation**: each thread's rows are compacted into
//!    per-color ranges, and each color learns which other threads must
//!    finish their previous phase first.
//!
//! At execution time the distinguished kernel walks the color phases with
//! point-to-point completion flags instead of barriers, so a thread only
//! waits for the neighbors it actually conflicts with.
//!
//! Alternative strategies (atomic adds, per-thread shadow vectors with
//! full or indexed reduction, globally colored phases) are selectable for
//! comparison, along with a hybrid mode that keeps far-off-diagonal
//! nonzeros in a separate non-symmetric sidecar to preserve locality.
//!
//! ## Usage
//!
//! ```
//! use symspmv::{Engine, EngineOptions, Tuning};
//!
//! // Assemble a small symmetric matrix (full CSR)
//! let matrix = symspmv::mmio::triplets_to_csr(
//!     3,
//!     3,
//!     vec![
//!         (0, 0, 2.0), (0, 1, 1.0),
//!         (1, 0, 1.0), (1, 1, 3.0), (1, 2, 1.0),
//!         (2, 1, 1.0), (2, 2, 4.0),
//!     ],
//! );
//!
//! let mut engine = Engine::from_csr(matrix, EngineOptions::with_threads(2)).unwrap();
//! engine.tune(Tuning::Enabled);
//!
//! let x = vec![1.0, 1.0, 1.0];
//! let mut y = vec![0.0; 3];
//! engine.multiply(&mut y, &x);
//! assert_eq!(y, vec![3.0, 5.0, 5.0]);
//! ```
//!
//! Matrices can also be loaded directly from Matrix Market files with
//! [`Engine::from_file`], which reconciles the file's symmetry flag with
//! the caller's options.

pub mod constants;
pub mod engine;
pub mod error;
pub mod matrix;
pub mod mmio;
pub mod symmetry;
pub mod utils;

mod kernels;

// Re-export primary components
pub use engine::Engine;
pub use error::{Error, Result};
pub use matrix::{
    reference_spmv, CsrMatrix, EngineOptions, KernelStrategy, OrderingHeuristic, Platform, Tuning,
};
pub use mmio::{read_matrix, write_matrix};
pub use utils::{from_sprs, to_sprs};
