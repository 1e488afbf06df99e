//! Configuration options for the SpMV engine

use crate::constants::{
    DEFAULT_BALANCING_STEPS, DEFAULT_BANDWIDTH_THRESHOLD, DEFAULT_BLK_FACTOR, MAX_THREADS,
};
use crate::error::{Error, Result};

/// The allocation/execution target of the engine
///
/// Only the CPU target is in scope; the enum exists so that preprocessing
/// artifacts carry their target with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// Shared-memory multicore CPU
    #[default]
    Cpu,
}

/// Whether the engine should build the tuned, partitioned execution paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tuning {
    /// No preprocessing beyond CSR assembly; row-parallel multiply
    None,
    /// Full preprocessing for the strategy selected at build time
    #[default]
    Enabled,
}

/// Strategy for resolving write conflicts in symmetric SpMV
///
/// A symmetric multiply writes both `y[i]` and `y[col]` per stored
/// off-diagonal entry, so threads contend on overlapping output rows.
/// Each strategy resolves the contention differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelStrategy {
    /// Hardware atomic adds on potentially-conflicting writes
    Atomics,
    /// Per-thread shadow vectors covering [0, row_split[t]), reduced after
    /// a barrier
    EffectiveRanges,
    /// Shadow vectors with an indexed reduction that visits only the
    /// columns that actually conflict
    LocalVectorsIndexing,
    /// Global row coloring computed before partitioning; color phases
    /// separated by barriers
    ConflictFreeApriori,
    /// Per-thread row ranges grouped by color with inter-thread dependency
    /// sets; the production path
    #[default]
    ConflictFreeAposteriori,
}

/// Vertex-visit order for the greedy colorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingHeuristic {
    /// Colors vertices in a round-robin fashion among threads, in the
    /// order they appear in the graph representation
    #[default]
    FirstFitRoundRobin,
    /// Colors vertices in increasing row size
    ShortestRow,
    /// Round-robin among threads, in increasing row size order
    ShortestRowRoundRobin,
    /// Colors vertices in decreasing row size
    LongestRow,
    /// Round-robin among threads, in decreasing row size order
    LongestRowRoundRobin,
}

/// Configuration for engine construction
///
/// The defaults describe the production configuration: symmetric
/// compression with the a-posteriori conflict-free kernel in
/// point-to-point signaling mode, one conflict-graph vertex per row.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Allocation/execution target
    pub platform: Platform,

    /// Caller's assertion that the matrix is symmetric; reconciled against
    /// the input (file header or structural check) at construction
    pub symmetric: bool,

    /// Store far-off-diagonal nonzeros in a separate non-symmetric sidecar;
    /// forced off when `n_threads == 1`
    pub hybrid: bool,

    /// Gates the partitioned/conflict-free execution paths
    pub tuning: Tuning,

    /// Conflict-resolution strategy for the symmetric kernels
    pub strategy: KernelStrategy,

    /// Use a barrier between color phases instead of point-to-point
    /// completion flags
    pub use_barrier: bool,

    /// Number of worker threads; must be in [1, MAX_THREADS]
    pub n_threads: usize,

    /// Rows per conflict-graph vertex; must be a power of two
    pub blk_factor: usize,

    /// Column distance beyond which a nonzero counts as high-bandwidth in
    /// hybrid mode
    pub bandwidth_threshold: usize,

    /// Number of deviance-reduction passes after coloring
    pub balancing_steps: usize,

    /// Vertex-visit order for the greedy colorer
    pub ordering: OrderingHeuristic,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            platform: Platform::Cpu,
            symmetric: true,
            hybrid: false,
            tuning: Tuning::Enabled,
            strategy: KernelStrategy::ConflictFreeAposteriori,
            use_barrier: false,
            n_threads: num_cpus::get().min(MAX_THREADS),
            blk_factor: DEFAULT_BLK_FACTOR,
            bandwidth_threshold: DEFAULT_BANDWIDTH_THRESHOLD,
            balancing_steps: DEFAULT_BALANCING_STEPS,
            ordering: OrderingHeuristic::default(),
        }
    }
}

impl EngineOptions {
    /// Creates options for a fixed thread count, leaving everything else at
    /// its default
    pub fn with_threads(n_threads: usize) -> Self {
        Self {
            n_threads,
            ..Self::default()
        }
    }

    /// log2 of the blocking factor
    pub fn blk_bits(&self) -> u32 {
        self.blk_factor.trailing_zeros()
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.n_threads == 0 {
            return Err(Error::Config("thread count must be at least 1".into()));
        }
        if self.n_threads > MAX_THREADS {
            return Err(Error::Config(format!(
                "thread count {} exceeds the maximum of {}",
                self.n_threads, MAX_THREADS
            )));
        }
        if self.blk_factor == 0 || !self.blk_factor.is_power_of_two() {
            return Err(Error::Config(format!(
                "blocking factor must be a power of two, got {}",
                self.blk_factor
            )));
        }
        Ok(())
    }
}
