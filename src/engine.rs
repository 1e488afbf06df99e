//! The SpMV engine: preprocessing pipeline and kernel dispatch
//!
//! An engine is built once from a matrix, tuned once to install a kernel,
//! and then drives any number of `y = A * x` multiplies. All preprocessing
//! artifacts live for the engine's lifetime and are released together.

use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::AtomicBool;

use log::{info, warn};

use crate::error::Result;
use crate::matrix::{CsrMatrix, EngineOptions, KernelStrategy, Tuning};
use crate::mmio;
use crate::symmetry::{
    balance_colors, build_apriori_graph, build_conflict_map, build_graph, coloring_is_valid,
    compile_schedule, compress_global, compress_slabs, greedy_color, group_rows_by_color,
    ordering, split_by_bandwidth, split_by_nnz, AprioriData, ConflictMap, ThreadData,
};

/// The kernel installed by `tune`
///
/// Selection happens once; the multiply hot path dispatches over this tag
/// with a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KernelKind {
    /// Row-parallel CSR multiply, no preprocessing
    Vanilla,
    /// CSR multiply over the nnz-balanced row partition
    SplitNnz,
    /// Single-threaded symmetric multiply
    SymSerial,
    /// Symmetric multiply with atomic adds on conflicting writes
    SymAtomics,
    /// Symmetric multiply with per-thread shadow vectors and a full
    /// reduction
    SymEffectiveRanges,
    /// Symmetric multiply with shadow vectors and an indexed reduction
    SymLocalVectorsIndexing,
    /// Color phases over the globally colored lower triangle
    SymConflictFreeApriori,
    /// Per-thread color schedule with barrier or point-to-point sync
    SymConflictFree,
    /// Color schedule plus the high-bandwidth sidecar
    SymConflictFreeHyb,
}

/// Symmetric SpMV engine for multicore CPUs
///
/// ```
/// use symspmv::{Engine, EngineOptions, Tuning};
///
/// // [2 1 0]
/// // [1 3 1]
/// // [0 1 4]
/// let matrix = symspmv::mmio::triplets_to_csr(
///     3,
///     3,
///     vec![
///         (0, 0, 2.0), (0, 1, 1.0),
///         (1, 0, 1.0), (1, 1, 3.0), (1, 2, 1.0),
///         (2, 1, 1.0), (2, 2, 4.0),
///     ],
/// );
///
/// let mut engine = Engine::from_csr(matrix, EngineOptions::with_threads(2)).unwrap();
/// engine.tune(Tuning::Enabled);
///
/// let x = vec![1.0; 3];
/// let mut y = vec![0.0; 3];
/// engine.multiply(&mut y, &x);
/// assert_eq!(y, vec![3.0, 5.0, 5.0]);
/// ```
pub struct Engine {
    pub(crate) options: EngineOptions,
    pub(crate) n_rows: usize,
    pub(crate) n_cols: usize,
    pub(crate) nnz: usize,
    pub(crate) symmetric: bool,
    pub(crate) hybrid: bool,

    /// Full CSR; dropped once symmetric compression has consumed it
    pub(crate) csr: Option<CsrMatrix<f64>>,
    /// High-bandwidth part awaiting per-thread slicing (hybrid only)
    pub(crate) csr_high: Option<CsrMatrix<f64>>,

    pub(crate) row_split: Vec<usize>,
    pub(crate) thread_data: Vec<ThreadData>,
    pub(crate) apriori: Option<AprioriData>,
    pub(crate) cnfl_map: Option<ConflictMap>,

    pub(crate) nnz_lower: usize,
    pub(crate) nnz_diag: usize,
    pub(crate) n_colors: usize,
    pub(crate) n_ranges: usize,

    /// done[t][c]: thread t has finished color phase c in the current
    /// multiply; reset at the head of every multiply
    pub(crate) done: Vec<Vec<AtomicBool>>,
    pub(crate) kernel: KernelKind,
    tuned: bool,
}

impl Engine {
    /// Builds an engine from a Matrix Market file
    ///
    /// The file's symmetry flag is reconciled with the caller's
    /// `options.symmetric` assertion; when they disagree the engine falls
    /// back to plain CSR with a diagnostic.
    pub fn from_file<P: AsRef<Path>>(path: P, options: EngineOptions) -> Result<Self> {
        let (matrix, file_symmetric) = mmio::read_matrix(path)?;
        Self::build(matrix, Some(file_symmetric), options)
    }

    /// Builds an engine from an assembled full CSR matrix
    ///
    /// When `options.symmetric` is set, the matrix is probed structurally;
    /// a non-symmetric matrix falls back to plain CSR with a diagnostic.
    pub fn from_csr(matrix: CsrMatrix<f64>, options: EngineOptions) -> Result<Self> {
        Self::build(matrix, None, options)
    }

    fn build(
        matrix: CsrMatrix<f64>,
        file_symmetric: Option<bool>,
        options: EngineOptions,
    ) -> Result<Self> {
        options.validate()?;

        let symmetric = if options.symmetric {
            let confirmed = file_symmetric.unwrap_or(false) || matrix.is_symmetric();
            if confirmed {
                info!("using SSS format to store the sparse matrix");
            } else {
                warn!("matrix is not symmetric, rolling back to CSR format");
            }
            confirmed
        } else {
            info!("using CSR format to store the sparse matrix");
            false
        };

        let mut hybrid = options.hybrid;
        if hybrid && options.n_threads == 1 {
            hybrid = false;
        }
        if hybrid && !(symmetric && options.strategy == KernelStrategy::ConflictFreeAposteriori) {
            warn!("high-bandwidth splitting requires the symmetric a-posteriori strategy, disabling it");
            hybrid = false;
        }

        let n_rows = matrix.n_rows;
        let n_cols = matrix.n_cols;
        let nnz = matrix.nnz();

        let (csr, csr_high) = if hybrid {
            let (low, high) = split_by_bandwidth(&matrix, options.bandwidth_threshold);
            (low, Some(high))
        } else {
            (matrix, None)
        };

        let row_split = split_by_nnz(
            &csr,
            csr_high.as_ref(),
            symmetric,
            options.n_threads,
            options.blk_factor,
        );

        Ok(Self {
            options,
            n_rows,
            n_cols,
            nnz,
            symmetric,
            hybrid,
            csr: Some(csr),
            csr_high,
            row_split,
            thread_data: Vec::new(),
            apriori: None,
            cnfl_map: None,
            nnz_lower: 0,
            nnz_diag: 0,
            n_colors: 0,
            n_ranges: 0,
            done: Vec::new(),
            kernel: KernelKind::Vanilla,
            tuned: false,
        })
    }

    /// Installs the execution kernel
    ///
    /// With `Tuning::None` the engine keeps the row-parallel CSR multiply
    /// and returns `false`. Otherwise the symmetric preprocessing pipeline
    /// runs for the strategy chosen at build time and the matching kernel
    /// is installed. Only the first call has any effect; the engine is
    /// immutable afterwards.
    pub fn tune(&mut self, tuning: Tuning) -> bool {
        if self.tuned {
            return self.kernel != KernelKind::Vanilla;
        }
        self.tuned = true;

        if tuning == Tuning::None {
            self.kernel = KernelKind::Vanilla;
            return false;
        }

        if !self.symmetric {
            self.kernel = KernelKind::SplitNnz;
            return true;
        }

        self.compress_symmetry();
        true
    }

    /// Runs the symmetric preprocessing pipeline for the configured
    /// strategy and installs the kernel
    fn compress_symmetry(&mut self) {
        let matrix = self.csr.take().expect("full CSR present before compression");
        let high = self.csr_high.take();
        let n_threads = self.options.n_threads;
        let blk_bits = self.options.blk_bits();

        if n_threads == 1 {
            self.thread_data = compress_slabs(&matrix, None, &self.row_split);
            self.sum_slab_counters();
            self.kernel = KernelKind::SymSerial;
            return;
        }

        if self.options.strategy == KernelStrategy::ConflictFreeApriori {
            info!("compressing for symmetry using a priori conflict-free SpMV");
            let mut apriori = compress_global(&matrix);
            self.nnz_lower = apriori.nnz_lower;
            self.nnz_diag = apriori.nnz_diag;

            let adj = build_apriori_graph(&apriori, blk_bits);
            let (color, n_colors) = greedy_color(&adj, None);
            debug_assert!(coloring_is_valid(&adj, &color), "coloring left a conflict");
            group_rows_by_color(&mut apriori, &color, n_colors, blk_bits);

            self.n_colors = n_colors;
            self.apriori = Some(apriori);
            self.kernel = KernelKind::SymConflictFreeApriori;
            return;
        }

        self.thread_data = compress_slabs(&matrix, high.as_ref(), &self.row_split);
        self.sum_slab_counters();

        match self.options.strategy {
            KernelStrategy::Atomics => {
                info!("compressing for symmetry using atomics");
                self.kernel = KernelKind::SymAtomics;
            }
            KernelStrategy::EffectiveRanges => {
                info!("compressing for symmetry using effective ranges of local vectors");
                self.kernel = KernelKind::SymEffectiveRanges;
            }
            KernelStrategy::LocalVectorsIndexing => {
                info!("compressing for symmetry using local vectors indexing");
                self.cnfl_map = Some(build_conflict_map(&mut self.thread_data, &self.row_split));
                self.kernel = KernelKind::SymLocalVectorsIndexing;
            }
            KernelStrategy::ConflictFreeAposteriori => {
                info!("compressing for symmetry using a posteriori conflict-free SpMV");
                let g = build_graph(&self.thread_data, &self.row_split, blk_bits, self.hybrid);
                let order = ordering(&g, self.options.ordering, n_threads);
                let (mut color, n_colors) = greedy_color(&g.adj, Some(&order));
                balance_colors(
                    &g,
                    &mut color,
                    n_colors,
                    n_threads,
                    self.options.balancing_steps,
                );
                debug_assert!(coloring_is_valid(&g.adj, &color), "balancing left a conflict");

                compile_schedule(
                    &mut self.thread_data,
                    &g,
                    &color,
                    n_colors,
                    &self.row_split,
                    blk_bits,
                );
                self.n_colors = n_colors;
                self.n_ranges = self.thread_data.iter().map(|td| td.n_ranges).sum();
                self.done = (0..n_threads)
                    .map(|_| (0..n_colors).map(|_| AtomicBool::new(false)).collect())
                    .collect();
                self.kernel = if self.hybrid {
                    KernelKind::SymConflictFreeHyb
                } else {
                    KernelKind::SymConflictFree
                };
            }
            KernelStrategy::ConflictFreeApriori => unreachable!("handled above"),
        }
    }

    fn sum_slab_counters(&mut self) {
        self.nnz_lower = self.thread_data.iter().map(|td| td.nnz_lower).sum();
        self.nnz_diag = self.thread_data.iter().map(|td| td.nnz_diag).sum();
    }

    /// Computes `y = A * x`
    ///
    /// `y` is fully overwritten. Panics when the vector lengths do not
    /// match the matrix dimensions.
    pub fn multiply(&self, y: &mut [f64], x: &[f64]) {
        assert_eq!(y.len(), self.n_rows, "output length must equal n_rows");
        assert_eq!(x.len(), self.n_cols, "input length must equal n_cols");

        match self.kernel {
            KernelKind::Vanilla => self.mv_vanilla(y, x),
            KernelKind::SplitNnz => self.mv_split_nnz(y, x),
            KernelKind::SymSerial => self.mv_sym_serial(y, x),
            KernelKind::SymAtomics => self.mv_sym_atomics(y, x),
            KernelKind::SymEffectiveRanges => self.mv_sym_effective_ranges(y, x),
            KernelKind::SymLocalVectorsIndexing => self.mv_sym_local_vectors_indexing(y, x),
            KernelKind::SymConflictFreeApriori => self.mv_sym_conflict_free_apriori(y, x),
            KernelKind::SymConflictFree => self.mv_sym_conflict_free(y, x),
            KernelKind::SymConflictFreeHyb => self.mv_sym_conflict_free_hyb(y, x),
        }
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Nonzeros of the input matrix
    pub fn nnz(&self) -> usize {
        self.nnz
    }

    /// Whether the engine stores the matrix in symmetric (SSS) form
    pub fn symmetric(&self) -> bool {
        self.symmetric
    }

    /// Number of worker threads
    pub fn n_threads(&self) -> usize {
        self.options.n_threads
    }

    /// The row partition; thread `t` owns rows
    /// `row_split[t]..row_split[t + 1]`
    pub fn row_split(&self) -> &[usize] {
        &self.row_split
    }

    /// Colors of the compiled schedule (0 before tuning, and for the
    /// strategies that need none)
    pub fn n_colors(&self) -> usize {
        self.n_colors
    }

    /// Name of the installed kernel
    pub fn kernel_name(&self) -> &'static str {
        match self.kernel {
            KernelKind::Vanilla => "vanilla",
            KernelKind::SplitNnz => "split_nnz",
            KernelKind::SymSerial => "sym_serial",
            KernelKind::SymAtomics => "sym_atomics",
            KernelKind::SymEffectiveRanges => "sym_effective_ranges",
            KernelKind::SymLocalVectorsIndexing => "sym_local_vectors_indexing",
            KernelKind::SymConflictFreeApriori => "sym_conflict_free_apriori",
            KernelKind::SymConflictFree => "sym_conflict_free",
            KernelKind::SymConflictFreeHyb => "sym_conflict_free_hyb",
        }
    }

    /// Bytes of matrix and schedule storage held by the engine
    pub fn size_bytes(&self) -> usize {
        let idx = size_of::<usize>();
        let val = size_of::<f64>();
        let mut size = 0;

        if let Some(csr) = &self.csr {
            size += csr.row_ptr.len() * idx + csr.col_idx.len() * idx + csr.values.len() * val;
        }
        if let Some(high) = &self.csr_high {
            size += high.row_ptr.len() * idx + high.col_idx.len() * idx + high.values.len() * val;
        }
        size += self.row_split.len() * idx;

        for td in &self.thread_data {
            size += td.row_ptr.len() * idx + td.col_idx.len() * idx + td.values.len() * val;
            size += td.diagonal.len() * val;
            size += td.row_ptr_high.len() * idx
                + td.col_idx_high.len() * idx
                + td.values_high.len() * val;
            size += td.range_ptr.len() * idx
                + td.range_start.len() * idx
                + td.range_end.len() * idx;
            size += td.deps.iter().map(|d| d.len() * idx).sum::<usize>();
        }

        if let Some(ap) = &self.apriori {
            size += ap.row_ptr.len() * idx + ap.col_idx.len() * idx + ap.values.len() * val;
            size += ap.diagonal.len() * val;
            size += ap.color_ptr.len() * idx + ap.row_ind.len() * idx;
        }
        if let Some(map) = &self.cnfl_map {
            size += map.len() * (2 * idx);
        }

        size
    }
}
