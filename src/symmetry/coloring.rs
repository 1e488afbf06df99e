//! Distance-1 graph coloring with load balancing
//!
//! A sequential greedy pass assigns each vertex the smallest color unused
//! by its neighbors, growing the palette on demand. An optional
//! deviance-reduction pass then evens out the per-thread nonzero load
//! across color classes by re-coloring vertices into lighter, still-legal
//! colors.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use log::{debug, info};

use crate::matrix::OrderingHeuristic;
use crate::symmetry::graph::ConflictGraph;

/// Greedy distance-1 coloring
///
/// Visits vertices in `order` (or natural order when `None`) and assigns
/// the smallest color not marked by a neighbor. Returns the color map and
/// the palette size. Tolerates parallel edges.
pub fn greedy_color(adj: &[Vec<usize>], order: Option<&[usize]>) -> (Vec<usize>, usize) {
    let n_vertices = adj.len();
    let mut max_color = 0usize;

    // Uncolored vertices carry the largest representable color so that
    // marking a neighbor's color is always a valid index into `mark`.
    let sentinel = n_vertices.saturating_sub(1);
    let mut color = vec![sentinel; n_vertices];

    // mark[c] == i means color c is taken by a neighbor of the vertex
    // visited at step i; i increases monotonically so no reset is needed
    let mut mark = vec![usize::MAX; n_vertices];

    for i in 0..n_vertices {
        let v = order.map_or(i, |ord| ord[i]);

        for &n in &adj[v] {
            mark[color[n]] = i;
        }

        // Smallest color not used by any neighbor
        let mut c = 0;
        while c < max_color && mark[c] == i {
            c += 1;
        }
        if c == max_color {
            // All colors are used up. Add one more color
            max_color += 1;
        }

        color[v] = c;
    }

    info!("graph coloring uses {} colors", max_color.max(1));
    (color, max_color.max(usize::from(n_vertices > 0)))
}

/// Produces the vertex-visit order for the greedy pass
pub fn ordering(g: &ConflictGraph, heuristic: OrderingHeuristic, n_threads: usize) -> Vec<usize> {
    match heuristic {
        OrderingHeuristic::FirstFitRoundRobin => round_robin(g, n_threads, |list| list),
        OrderingHeuristic::ShortestRow => {
            let mut order: Vec<usize> = (0..g.len()).collect();
            order.sort_by_key(|&v| (g.vertices[v].nnz, v));
            order
        }
        OrderingHeuristic::ShortestRowRoundRobin => round_robin(g, n_threads, |mut list| {
            list.sort_by_key(|&v| (g.vertices[v].nnz, v));
            list
        }),
        OrderingHeuristic::LongestRow => {
            let mut order: Vec<usize> = (0..g.len()).collect();
            order.sort_by_key(|&v| (Reverse(g.vertices[v].nnz), v));
            order
        }
        OrderingHeuristic::LongestRowRoundRobin => round_robin(g, n_threads, |mut list| {
            list.sort_by_key(|&v| (Reverse(g.vertices[v].nnz), v));
            list
        }),
    }
}

/// Interleaves the threads' vertex lists one vertex at a time
fn round_robin(
    g: &ConflictGraph,
    n_threads: usize,
    arrange: impl Fn(Vec<usize>) -> Vec<usize>,
) -> Vec<usize> {
    let mut per_thread: Vec<Vec<usize>> = vec![Vec::new(); n_threads];
    for v in 0..g.len() {
        per_thread[g.vertices[v].tid].push(v);
    }
    let per_thread: Vec<Vec<usize>> = per_thread.into_iter().map(&arrange).collect();

    let mut order = Vec::with_capacity(g.len());
    let mut cursor = vec![0usize; n_threads];
    while order.len() < g.len() {
        for t in 0..n_threads {
            if cursor[t] < per_thread[t].len() {
                order.push(per_thread[t][cursor[t]]);
                cursor[t] += 1;
            }
        }
    }
    order
}

/// Per-thread deviance reduction over the color classes
///
/// For each thread, finds the color with the largest positive deviation
/// from the mean load and tries to move its vertices (smallest block id
/// first) into the lightest color not used by any of the vertex's
/// neighbors. The threads are processed in tid order; moves only re-color
/// a thread's own vertices, so the coloring stays valid throughout.
pub fn balance_colors(
    g: &ConflictGraph,
    color: &mut [usize],
    n_colors: usize,
    n_threads: usize,
    steps: usize,
) {
    if n_colors < 2 {
        return;
    }
    info!("balancing load across {} colors", n_colors);

    for tid in 0..n_threads {
        let mut total_load = 0usize;
        let mut load = vec![0usize; n_colors];
        let mut bin: Vec<BinaryHeap<Reverse<usize>>> = vec![BinaryHeap::new(); n_colors];

        // Find total weight and vertices per color for this thread
        for v in 0..g.len() {
            if g.vertices[v].tid == tid {
                total_load += g.vertices[v].nnz;
                load[color[v]] += g.vertices[v].nnz;
                bin[color[v]].push(Reverse(v));
            }
        }
        if total_load == 0 {
            continue;
        }
        let mean_load = total_load / n_colors;

        debug!(
            "T{} load distribution before balancing = {:?}",
            tid,
            load_shares(&load, total_load)
        );

        for _step in 0..steps {
            // Color with the largest positive deviation
            let max_c = (0..n_colors)
                .max_by_key(|&c| load[c] as isize - mean_load as isize)
                .expect("palette is non-empty");

            // The deviance reduction heuristic moves vertices from the
            // overloaded color to another legal color with lower load.
            // A vertex cannot be placed in the same color as a neighbor.
            let mut stay = Vec::new();
            while load[max_c] as isize - mean_load as isize > 0 {
                let Some(Reverse(v)) = bin[max_c].pop() else {
                    break;
                };

                let mut used = vec![false; n_colors];
                used[max_c] = true;
                for &n in &g.adj[v] {
                    used[color[n]] = true;
                }

                // Re-color with the lightest eligible color
                let mut min_c = max_c;
                let mut min_load = load[max_c];
                for c in 0..n_colors {
                    if !used[c] && load[c] < min_load {
                        min_c = c;
                        min_load = load[c];
                    }
                }

                if min_c != max_c {
                    color[v] = min_c;
                    load[max_c] -= g.vertices[v].nnz;
                    load[min_c] += g.vertices[v].nnz;
                    bin[min_c].push(Reverse(v));
                } else {
                    stay.push(Reverse(v));
                }
            }
            for v in stay {
                bin[max_c].push(v);
            }
        }

        debug!(
            "T{} load distribution after balancing = {:?}",
            tid,
            load_shares(&load, total_load)
        );
    }

    debug_assert!(color.iter().all(|&c| c < n_colors));
}

fn load_shares(load: &[usize], total: usize) -> Vec<f64> {
    load.iter().map(|&l| l as f64 / total as f64).collect()
}

/// Checks that no edge connects two vertices of the same color
pub fn coloring_is_valid(adj: &[Vec<usize>], color: &[usize]) -> bool {
    adj.iter()
        .enumerate()
        .all(|(v, neighbors)| neighbors.iter().all(|&n| n == v || color[n] != color[v]))
}
