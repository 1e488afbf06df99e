//! Color-schedule compilation
//!
//! Turns a colored conflict graph into per-thread execution artifacts: for
//! every color, the maximal runs of consecutive owned rows (stored in
//! slab-local coordinates, inclusive ends), and the set of threads whose
//! previous color phase must complete before this thread may start the
//! color.

use rayon::prelude::*;

use crate::symmetry::compress::ThreadData;
use crate::symmetry::graph::ConflictGraph;

/// Compiles row ranges and dependency sets into every thread's record
pub fn compile_schedule(
    data: &mut [ThreadData],
    g: &ConflictGraph,
    color: &[usize],
    n_colors: usize,
    row_split: &[usize],
    blk_bits: u32,
) {
    let deps = compute_deps(g, color, n_colors, row_split.len() - 1);

    data.par_iter_mut().enumerate().for_each(|(tid, td)| {
        compile_ranges(td, color, n_colors, row_split, tid, blk_bits);
        td.deps = deps[tid].clone();
        td.n_colors = n_colors;
    });
}

/// Groups a thread's rows by color into maximal consecutive runs
fn compile_ranges(
    td: &mut ThreadData,
    color: &[usize],
    n_colors: usize,
    row_split: &[usize],
    tid: usize,
    blk_bits: u32,
) {
    // Active row indices per color, ascending
    let mut row_ind: Vec<Vec<usize>> = vec![Vec::new(); n_colors];
    for i in row_split[tid]..row_split[tid + 1] {
        row_ind[color[i >> blk_bits]].push(i);
    }

    let row_offset = row_split[tid];
    let mut range_ptr = vec![0usize; n_colors + 1];
    let mut range_start = Vec::new();
    let mut range_end = Vec::new();

    for (c, rows) in row_ind.iter().enumerate() {
        let mut n_ranges = 0usize;
        let mut iter = rows.iter().copied();
        if let Some(first) = iter.next() {
            let mut run_start = first;
            let mut prev = first;
            for row in iter {
                if row - prev > 1 {
                    range_start.push(run_start - row_offset);
                    range_end.push(prev - row_offset);
                    n_ranges += 1;
                    run_start = row;
                }
                prev = row;
            }
            range_start.push(run_start - row_offset);
            range_end.push(prev - row_offset);
            n_ranges += 1;
        }
        range_ptr[c + 1] = range_ptr[c] + n_ranges;
    }

    assert_eq!(range_ptr[n_colors], range_start.len());
    td.n_ranges = range_start.len();
    td.range_ptr = range_ptr;
    td.range_start = range_start;
    td.range_end = range_end;
}

/// Computes, for every thread and color, the threads it must wait for
///
/// Thread `t` starting color `c` must wait for thread `t'` iff some vertex
/// of `t` colored `c` neighbors a vertex of `t'` colored `c - 1`.
pub fn compute_deps(
    g: &ConflictGraph,
    color: &[usize],
    n_colors: usize,
    n_threads: usize,
) -> Vec<Vec<Vec<usize>>> {
    let mut conflicts = vec![vec![vec![false; n_threads]; n_threads]; n_colors];

    for v in 0..g.len() {
        let c = color[v];
        if c == 0 {
            continue;
        }
        for &n in &g.adj[v] {
            // Mark who v's owner waits for before proceeding to color c
            if color[n] + 1 == c && g.vertices[v].tid != g.vertices[n].tid {
                conflicts[c][g.vertices[v].tid][g.vertices[n].tid] = true;
            }
        }
    }

    (0..n_threads)
        .map(|t| {
            (0..n_colors)
                .map(|c| {
                    (0..n_threads)
                        .filter(|&other| conflicts[c][t][other])
                        .collect()
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::graph::WeightedVertex;

    fn thread_data(row_split: &[usize], tid: usize) -> ThreadData {
        ThreadData {
            n_rows: row_split[tid + 1] - row_split[tid],
            row_offset: row_split[tid],
            ..ThreadData::default()
        }
    }

    #[test]
    fn test_ranges_split_on_gaps() {
        // Thread 0 owns rows 0..6; colors alternate 0,0,1,0,0,1
        let row_split = vec![0, 6];
        let mut td = thread_data(&row_split, 0);
        let color = vec![0, 0, 1, 0, 0, 1];
        compile_ranges(&mut td, &color, 2, &row_split, 0, 0);

        assert_eq!(td.n_ranges, 4);
        // Color 0: [0,1] and [3,4]; color 1: [2,2] and [5,5]
        assert_eq!(td.range_ptr, vec![0, 2, 4]);
        assert_eq!(td.range_start, vec![0, 3, 2, 5]);
        assert_eq!(td.range_end, vec![1, 4, 2, 5]);
    }

    #[test]
    fn test_ranges_cover_all_owned_rows() {
        let row_split = vec![0, 3, 7];
        let color = vec![0, 1, 0, 1, 1, 0, 0];
        for tid in 0..2 {
            let mut td = thread_data(&row_split, tid);
            compile_ranges(&mut td, &color, 2, &row_split, tid, 0);
            let covered: usize = td
                .range_start
                .iter()
                .zip(&td.range_end)
                .map(|(&s, &e)| e - s + 1)
                .sum();
            assert_eq!(covered, td.n_rows);
        }
    }

    #[test]
    fn test_empty_color_has_no_ranges() {
        let row_split = vec![0, 2];
        let mut td = thread_data(&row_split, 0);
        let color = vec![2, 2];
        compile_ranges(&mut td, &color, 3, &row_split, 0, 0);
        assert_eq!(td.range_ptr, vec![0, 0, 0, 2]);
    }

    #[test]
    fn test_deps_cross_thread_only() {
        // Vertices 0 (t0, color 0) - 1 (t0, color 1) - 2 (t1, color 0):
        // edge (1, 2) crosses threads and colors, edge (0, 1) does not
        // cross threads
        let adj = vec![vec![1], vec![0, 2], vec![1]];
        let vertices = vec![
            WeightedVertex { vid: 0, tid: 0, nnz: 1 },
            WeightedVertex { vid: 1, tid: 0, nnz: 1 },
            WeightedVertex { vid: 2, tid: 1, nnz: 1 },
        ];
        let g = ConflictGraph { adj, vertices };
        let color = vec![0, 1, 0];

        let deps = compute_deps(&g, &color, 2, 2);
        // Thread 0 must wait for thread 1 before color 1
        assert_eq!(deps[0][1], vec![1]);
        // No other dependencies anywhere
        assert!(deps[0][0].is_empty());
        assert!(deps[1][0].is_empty());
        assert!(deps[1][1].is_empty());
    }
}
