//! SpMV execution kernels
//!
//! Every kernel computes `y = A * x`, with the symmetric variants
//! reconstructing the full matrix from the stored lower triangle plus
//! diagonal: each stored off-diagonal entry contributes once to its own
//! row and once, mirrored, to its column's row.
//!
//! The parallel symmetric kernels run as SPMD regions: exactly
//! `n_threads` scoped threads, thread `t` bound to row slab `t`, with
//! `std::sync::Barrier` standing in for the phase boundaries. Writes that
//! several threads aim at the same output slice go through `SharedSlice`;
//! each unsafe call site states the disjointness argument that makes it
//! sound.

use std::sync::atomic::Ordering;
use std::sync::Barrier;

use rayon::prelude::*;

use crate::constants::APRIORI_CHUNK_ROWS;
use crate::engine::Engine;
use crate::utils::{chunk_bounds, PerThread, SharedSlice};

impl Engine {
    /// Runs `f(tid)` on exactly `n_threads` threads: the calling thread
    /// plus `n_threads - 1` scoped workers
    fn run_workers<F>(&self, f: F)
    where
        F: Fn(usize) + Sync,
    {
        let n_threads = self.options.n_threads;
        std::thread::scope(|s| {
            for tid in 1..n_threads {
                let f = &f;
                s.spawn(move || f(tid));
            }
            f(0);
        });
    }

    /// Row-parallel CSR multiply; the untuned default
    pub(crate) fn mv_vanilla(&self, y: &mut [f64], x: &[f64]) {
        let a = self.csr.as_ref().expect("vanilla kernel needs the full CSR");
        let chunk = self.n_rows.div_ceil(self.options.n_threads).max(1);

        y.par_chunks_mut(chunk).enumerate().for_each(|(ci, y_chunk)| {
            let base = ci * chunk;
            for (k, y_i) in y_chunk.iter_mut().enumerate() {
                let i = base + k;
                let mut y_tmp = 0.0;
                for j in a.row_ptr[i]..a.row_ptr[i + 1] {
                    y_tmp += a.values[j] * x[a.col_idx[j]];
                }
                *y_i = y_tmp;
            }
        });
    }

    /// CSR multiply over the nnz-balanced row partition
    pub(crate) fn mv_split_nnz(&self, y: &mut [f64], x: &[f64]) {
        let a = self.csr.as_ref().expect("split_nnz kernel needs the full CSR");
        let n_threads = self.options.n_threads;

        // Carve y into the per-thread slabs; each worker owns its slice
        let mut slabs = Vec::with_capacity(n_threads);
        let mut rest = y;
        for t in 0..n_threads {
            let (slab, tail) = rest.split_at_mut(self.row_split[t + 1] - self.row_split[t]);
            slabs.push((self.row_split[t], slab));
            rest = tail;
        }
        debug_assert!(rest.is_empty());

        slabs.into_par_iter().for_each(|(row_offset, slab)| {
            for (k, y_i) in slab.iter_mut().enumerate() {
                let i = row_offset + k;
                let mut y_tmp = 0.0;
                for j in a.row_ptr[i]..a.row_ptr[i + 1] {
                    y_tmp += a.values[j] * x[a.col_idx[j]];
                }
                *y_i = y_tmp;
            }
        });
    }

    /// Single-threaded symmetric multiply over the compressed lower
    /// triangle
    pub(crate) fn mv_sym_serial(&self, y: &mut [f64], x: &[f64]) {
        let data = &self.thread_data[0];

        // Ascending row order means y[col] (col < i) is already finalized
        // by the time row i mirrors into it, and y[i] receives no mirrored
        // contribution before its own pass.
        for i in 0..data.n_rows {
            let mut y_tmp = data.diagonal[i] * x[i];
            for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                let col = data.col_idx[j];
                let val = data.values[j];
                y_tmp += val * x[col];
                y[col] += val * x[i];
            }
            y[i] = y_tmp;
        }
    }

    /// Symmetric multiply with atomic adds on the output
    pub(crate) fn mv_sym_atomics(&self, y: &mut [f64], x: &[f64]) {
        let barrier = Barrier::new(self.options.n_threads);
        let y_shared = SharedSlice::new(y);

        self.run_workers(|tid| {
            let data = &self.thread_data[tid];
            let row_offset = data.row_offset;

            for i in 0..data.n_rows {
                // SAFETY: slot i + row_offset lies in this thread's slab
                // and mirrored writes only start after the barrier.
                unsafe { y_shared.write(i + row_offset, data.diagonal[i] * x[i + row_offset]) };
            }
            barrier.wait();

            for i in 0..data.n_rows {
                let mut y_tmp = 0.0;
                for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                    let col = data.col_idx[j];
                    let val = data.values[j];
                    y_tmp += val * x[col];
                    // SAFETY: col may lie in any slab; every post-barrier
                    // update in this kernel is atomic.
                    unsafe { y_shared.atomic_add(col, val * x[i + row_offset]) };
                }
                // The owned row can receive concurrent mirrored adds from
                // later rows of other slabs, so this add is atomic too.
                // SAFETY: as above.
                unsafe { y_shared.atomic_add(i + row_offset, y_tmp) };
            }
        });
    }

    /// Symmetric multiply with per-thread shadow vectors reduced over
    /// their full effective range
    pub(crate) fn mv_sym_effective_ranges(&self, y: &mut [f64], x: &[f64]) {
        let n_threads = self.options.n_threads;
        let n_rows = self.n_rows;
        let barrier = Barrier::new(n_threads);
        let y_shared = SharedSlice::new(y);
        let shadows: PerThread<Vec<f64>> = PerThread::from_fn(n_threads, |_| Vec::new());

        self.run_workers(|tid| {
            let data = &self.thread_data[tid];
            let row_offset = data.row_offset;

            {
                // SAFETY: slot tid is touched only by its owning thread
                // until the barrier after the compute phase.
                let y_local = unsafe { shadows.get_mut(tid) };
                *y_local = vec![0.0; self.row_split[tid]];

                for i in 0..data.n_rows {
                    // SAFETY: slab-local slot, no mirrored writes yet.
                    unsafe { y_shared.write(i + row_offset, data.diagonal[i] * x[i + row_offset]) };
                }
                barrier.wait();

                for i in 0..data.n_rows {
                    let mut y_tmp = 0.0;
                    for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                        let col = data.col_idx[j];
                        let val = data.values[j];
                        y_tmp += val * x[col];
                        let mirrored = val * x[i + row_offset];
                        if col < row_offset {
                            y_local[col] += mirrored;
                        } else {
                            // col < i + row_offset, so the write stays in
                            // this thread's slab.
                            // SAFETY: slab-local slot.
                            unsafe { y_shared.add(col, mirrored) };
                        }
                    }
                    // SAFETY: slab-local slot.
                    unsafe { y_shared.add(i + row_offset, y_tmp) };
                }
            }
            barrier.wait();

            // Reduction of conflicts phase: threads take disjoint chunks of
            // the output and fold in every shadow vector covering them
            let (lo, hi) = chunk_bounds(n_rows, tid, n_threads);
            for src in 1..n_threads {
                // SAFETY: the barrier ordered all writes to shadow src
                // before this read.
                let shadow = unsafe { shadows.get(src) };
                let end = hi.min(self.row_split[src]);
                for i in lo..end {
                    // SAFETY: chunks are disjoint across threads.
                    unsafe { y_shared.add(i, shadow[i]) };
                }
            }
        });
    }

    /// Symmetric multiply with shadow vectors and a reduction that walks
    /// only the conflicting columns
    pub(crate) fn mv_sym_local_vectors_indexing(&self, y: &mut [f64], x: &[f64]) {
        let n_threads = self.options.n_threads;
        let map = self
            .cnfl_map
            .as_ref()
            .expect("indexed reduction needs the conflict map");
        let barrier = Barrier::new(n_threads);
        let y_shared = SharedSlice::new(y);
        let shadows: PerThread<Vec<f64>> = PerThread::from_fn(n_threads, |_| Vec::new());

        self.run_workers(|tid| {
            let data = &self.thread_data[tid];
            let row_offset = data.row_offset;

            {
                // SAFETY: slot tid is touched only by its owning thread
                // until the barrier after the compute phase.
                let y_local = unsafe { shadows.get_mut(tid) };
                *y_local = vec![0.0; self.row_split[tid]];

                for i in 0..data.n_rows {
                    // SAFETY: slab-local slot, no mirrored writes yet.
                    unsafe { y_shared.write(i + row_offset, data.diagonal[i] * x[i + row_offset]) };
                }
                barrier.wait();

                for i in 0..data.n_rows {
                    let mut y_tmp = 0.0;
                    for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                        let col = data.col_idx[j];
                        let val = data.values[j];
                        y_tmp += val * x[col];
                        let mirrored = val * x[i + row_offset];
                        if col < row_offset {
                            y_local[col] += mirrored;
                        } else {
                            // SAFETY: slab-local slot (col < i + row_offset).
                            unsafe { y_shared.add(col, mirrored) };
                        }
                    }
                    // SAFETY: slab-local slot.
                    unsafe { y_shared.add(i + row_offset, y_tmp) };
                }
            }
            barrier.wait();

            // Indexed reduction: cost is O(#conflicts), not O(row_split[t])
            for k in data.map_start..data.map_end {
                let src = map.cpu[k];
                let row = map.pos[k];
                // SAFETY: the barrier ordered shadow writes before these
                // reads; map windows are disjoint across threads and keep
                // all entries of one output row in a single window.
                unsafe { y_shared.add(row, shadows.get(src)[row]) };
            }
        });
    }

    /// Color phases over the globally colored lower triangle, separated by
    /// barriers
    pub(crate) fn mv_sym_conflict_free_apriori(&self, y: &mut [f64], x: &[f64]) {
        let n_threads = self.options.n_threads;
        let ap = self
            .apriori
            .as_ref()
            .expect("a-priori kernel needs its global arrays");
        let barrier = Barrier::new(n_threads);
        let y_shared = SharedSlice::new(y);

        self.run_workers(|tid| {
            // Mirrored contributions accumulate into y, so it starts from
            // zero rather than from the diagonal phase
            let (lo, hi) = chunk_bounds(self.n_rows, tid, n_threads);
            for i in lo..hi {
                // SAFETY: zeroing chunks are disjoint across threads.
                unsafe { y_shared.write(i, 0.0) };
            }
            barrier.wait();

            for c in 0..ap.n_colors {
                let rows = &ap.row_ind[ap.color_ptr[c]..ap.color_ptr[c + 1]];
                let n_chunks = rows.len().div_ceil(APRIORI_CHUNK_ROWS);
                let mut chunk = tid;
                while chunk < n_chunks {
                    let start = chunk * APRIORI_CHUNK_ROWS;
                    let end = (start + APRIORI_CHUNK_ROWS).min(rows.len());
                    for &row in &rows[start..end] {
                        let mut y_tmp = ap.diagonal[row] * x[row];
                        for j in ap.row_ptr[row]..ap.row_ptr[row + 1] {
                            let col = ap.col_idx[j];
                            let val = ap.values[j];
                            y_tmp += val * x[col];
                            // SAFETY: rows of one color are pairwise
                            // non-conflicting whatever their thread, and
                            // phases are separated by barriers.
                            unsafe { y_shared.add(col, val * x[row]) };
                        }
                        // SAFETY: as above.
                        unsafe { y_shared.add(row, y_tmp) };
                    }
                    chunk += n_threads;
                }
                barrier.wait();
            }
        });
    }

    /// The distinguished kernel: per-thread color schedule, barrier or
    /// point-to-point synchronization between phases
    pub(crate) fn mv_sym_conflict_free(&self, y: &mut [f64], x: &[f64]) {
        let n_threads = self.options.n_threads;
        let use_barrier = self.options.use_barrier;

        if !use_barrier {
            // False indicates that the thread is still computing
            for flags in &self.done {
                for flag in flags {
                    flag.store(false, Ordering::Relaxed);
                }
            }
        }

        let barrier = Barrier::new(n_threads);
        let y_shared = SharedSlice::new(y);

        self.run_workers(|tid| {
            let data = &self.thread_data[tid];
            let row_offset = data.row_offset;

            for i in 0..data.n_rows {
                // SAFETY: slab-local slot; mirrored writes start only
                // after the barrier below makes the diagonal visible.
                unsafe { y_shared.write(i + row_offset, data.diagonal[i] * x[i + row_offset]) };
            }
            barrier.wait();

            for c in 0..self.n_colors {
                if !use_barrier {
                    // Wait until my dependencies have finished the
                    // previous phase
                    for &dep in &data.deps[c] {
                        while !self.done[dep][c - 1].load(Ordering::Acquire) {
                            std::hint::spin_loop();
                        }
                    }
                }

                for r in data.range_ptr[c]..data.range_ptr[c + 1] {
                    for i in data.range_start[r]..=data.range_end[r] {
                        let mut y_tmp = 0.0;
                        for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                            let col = data.col_idx[j];
                            let val = data.values[j];
                            y_tmp += val * x[col];
                            // SAFETY: within a color phase the coloring
                            // invariant keeps cross-thread writes disjoint;
                            // consecutive phases are ordered by the
                            // dependency flags (or the barrier).
                            unsafe { y_shared.add(col, val * x[i + row_offset]) };
                        }
                        // SAFETY: as above; the owned row is part of this
                        // thread's color-c write set.
                        unsafe { y_shared.add(i + row_offset, y_tmp) };
                    }
                }

                if use_barrier {
                    barrier.wait();
                } else {
                    // Inform threads that depend on me that I have
                    // completed this phase
                    self.done[tid][c].store(true, Ordering::SeqCst);
                }
            }
        });
    }

    /// Color schedule plus the high-bandwidth sidecar; barrier mode only
    pub(crate) fn mv_sym_conflict_free_hyb(&self, y: &mut [f64], x: &[f64]) {
        let n_threads = self.options.n_threads;
        let barrier = Barrier::new(n_threads);
        let y_shared = SharedSlice::new(y);

        self.run_workers(|tid| {
            let data = &self.thread_data[tid];
            let row_offset = data.row_offset;

            for i in 0..data.n_rows {
                // SAFETY: slab-local slot, no mirrored writes yet.
                unsafe { y_shared.write(i + row_offset, data.diagonal[i] * x[i + row_offset]) };
            }
            barrier.wait();

            for c in 0..self.n_colors {
                for r in data.range_ptr[c]..data.range_ptr[c + 1] {
                    for i in data.range_start[r]..=data.range_end[r] {
                        let mut y_tmp = 0.0;
                        for j in data.row_ptr[i]..data.row_ptr[i + 1] {
                            let col = data.col_idx[j];
                            let val = data.values[j];
                            y_tmp += val * x[col];
                            // SAFETY: coloring invariant within the phase,
                            // barriers between phases.
                            unsafe { y_shared.add(col, val * x[i + row_offset]) };
                        }

                        // The sidecar was never symmetry-compressed: read
                        // only, no mirrored write
                        for j in data.row_ptr_high[i]..data.row_ptr_high[i + 1] {
                            y_tmp += data.values_high[j] * x[data.col_idx_high[j]];
                        }

                        // SAFETY: as above.
                        unsafe { y_shared.add(i + row_offset, y_tmp) };
                    }
                }
                barrier.wait();
            }
        });
    }
}
