//! End-to-end engine tests: every strategy against the reference multiply,
//! the boundary cases, and the small hand-checked scenarios

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use symspmv::mmio::triplets_to_csr;
use symspmv::{
    reference_spmv, CsrMatrix, Engine, EngineOptions, KernelStrategy, Tuning,
};

fn random_symmetric(n: usize, density: f64, seed: u64) -> CsrMatrix<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut triplets = Vec::new();
    for i in 0..n {
        for j in 0..i {
            if rng.gen::<f64>() < density {
                let v: f64 = rng.gen_range(-1.0..1.0);
                triplets.push((i, j, v));
                triplets.push((j, i, v));
            }
        }
        triplets.push((i, i, rng.gen_range(1.0..2.0)));
    }
    triplets_to_csr(n, n, triplets)
}

fn random_vector(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        let tol = 1e-10 * e.abs().max(1.0);
        assert!(
            (a - e).abs() <= tol,
            "y[{}] = {} differs from reference {}",
            i,
            a,
            e
        );
    }
}

fn options(n_threads: usize, strategy: KernelStrategy, use_barrier: bool) -> EngineOptions {
    EngineOptions {
        n_threads,
        strategy,
        use_barrier,
        ..EngineOptions::default()
    }
}

const ALL_STRATEGIES: [KernelStrategy; 5] = [
    KernelStrategy::Atomics,
    KernelStrategy::EffectiveRanges,
    KernelStrategy::LocalVectorsIndexing,
    KernelStrategy::ConflictFreeApriori,
    KernelStrategy::ConflictFreeAposteriori,
];

#[test]
fn test_all_strategies_match_reference() {
    let matrix = random_symmetric(300, 0.05, 1);
    let x = random_vector(300, 2);
    let expected = reference_spmv(&matrix, &x);

    for n_threads in [1usize, 2, 4] {
        for strategy in ALL_STRATEGIES {
            for use_barrier in [false, true] {
                let mut engine =
                    Engine::from_csr(matrix.clone(), options(n_threads, strategy, use_barrier))
                        .unwrap();
                assert!(engine.tune(Tuning::Enabled));

                let mut y = vec![0.0; 300];
                engine.multiply(&mut y, &x);
                assert_close(&y, &expected);

                // Repeated multiplies reuse the schedule
                let mut y2 = vec![0.0; 300];
                engine.multiply(&mut y2, &x);
                assert_eq!(y, y2);
            }
        }
    }
}

#[test]
fn test_scenario_diagonal_two_rows() {
    // A = [[3, 0], [0, 5]], two threads: one color, no dependencies
    let matrix = triplets_to_csr(2, 2, vec![(0, 0, 3.0), (1, 1, 5.0)]);
    let mut engine = Engine::from_csr(
        matrix,
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    engine.tune(Tuning::Enabled);

    assert_eq!(engine.n_colors(), 1);
    let mut y = vec![0.0; 2];
    engine.multiply(&mut y, &[1.0, 1.0]);
    assert_eq!(y, vec![3.0, 5.0]);
}

fn tridiag_3x3() -> CsrMatrix<f64> {
    // [2 1 0]
    // [1 3 1]
    // [0 1 4]
    triplets_to_csr(
        3,
        3,
        vec![
            (0, 0, 2.0),
            (0, 1, 1.0),
            (1, 0, 1.0),
            (1, 1, 3.0),
            (1, 2, 1.0),
            (2, 1, 1.0),
            (2, 2, 4.0),
        ],
    )
}

#[test]
fn test_scenario_serial() {
    let mut engine = Engine::from_csr(
        tridiag_3x3(),
        options(1, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    engine.tune(Tuning::Enabled);

    assert_eq!(engine.kernel_name(), "sym_serial");
    let mut y = vec![0.0; 3];
    engine.multiply(&mut y, &[1.0, 1.0, 1.0]);
    assert_eq!(y, vec![3.0, 5.0, 5.0]);
}

#[test]
fn test_scenario_two_thread_conflict_free() {
    let mut engine = Engine::from_csr(
        tridiag_3x3(),
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    engine.tune(Tuning::Enabled);

    assert_eq!(engine.row_split(), &[0, 2, 3]);
    assert_eq!(engine.n_colors(), 2);
    let mut y = vec![0.0; 3];
    engine.multiply(&mut y, &[1.0, 1.0, 1.0]);
    assert_eq!(y, vec![3.0, 5.0, 5.0]);
}

#[test]
fn test_scenario_indirect_conflict() {
    // Diagonal plus (2,0) and (3,0); rows 2 and 3 mirror into column 0
    let matrix = triplets_to_csr(
        4,
        4,
        vec![
            (0, 0, 1.0),
            (0, 2, 1.0),
            (0, 3, 1.0),
            (1, 1, 1.0),
            (2, 0, 1.0),
            (2, 2, 1.0),
            (3, 0, 1.0),
            (3, 3, 1.0),
        ],
    );
    let mut engine = Engine::from_csr(
        matrix,
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    engine.tune(Tuning::Enabled);

    // The partitioner puts rows 2 and 3 in different slabs, so their
    // mirrored writes into column 0 force two colors
    assert_eq!(engine.n_colors(), 2);
    let mut y = vec![0.0; 4];
    engine.multiply(&mut y, &[1.0; 4]);
    assert_eq!(y, vec![3.0, 1.0, 2.0, 2.0]);
}

#[test]
fn test_scenario_hybrid_threshold() {
    // 5x5 tridiagonal plus the far-off-diagonal pair (4,0)/(0,4)
    let mut triplets = Vec::new();
    for i in 0..5usize {
        if i > 0 {
            triplets.push((i, i - 1, 1.0));
            triplets.push((i - 1, i, 1.0));
        }
        triplets.push((i, i, 2.0));
    }
    triplets.push((4, 0, 7.0));
    triplets.push((0, 4, 7.0));
    let matrix = triplets_to_csr(5, 5, triplets);
    let x = vec![1.0; 5];
    let expected = reference_spmv(&matrix, &x);

    let mut opts = options(2, KernelStrategy::ConflictFreeAposteriori, true);
    opts.hybrid = true;
    opts.bandwidth_threshold = 2;
    let mut engine = Engine::from_csr(matrix, opts).unwrap();
    engine.tune(Tuning::Enabled);

    assert_eq!(engine.kernel_name(), "sym_conflict_free_hyb");
    let mut y = vec![0.0; 5];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);
}

#[test]
fn test_hybrid_with_everything_in_band_matches_plain() {
    let matrix = random_symmetric(100, 0.05, 5);
    let x = random_vector(100, 6);

    let mut opts = options(3, KernelStrategy::ConflictFreeAposteriori, true);
    opts.hybrid = true;
    // Threshold beyond the matrix size: the sidecar stays empty
    opts.bandwidth_threshold = 1000;
    let mut hybrid_engine = Engine::from_csr(matrix.clone(), opts).unwrap();
    hybrid_engine.tune(Tuning::Enabled);

    let mut plain_engine = Engine::from_csr(
        matrix,
        options(3, KernelStrategy::ConflictFreeAposteriori, true),
    )
    .unwrap();
    plain_engine.tune(Tuning::Enabled);

    let mut y_hybrid = vec![0.0; 100];
    let mut y_plain = vec![0.0; 100];
    hybrid_engine.multiply(&mut y_hybrid, &x);
    plain_engine.multiply(&mut y_plain, &x);
    assert_eq!(y_hybrid, y_plain);
}

#[test]
fn test_diagonal_only_matrix_all_strategies() {
    let matrix = triplets_to_csr(6, 6, (0..6).map(|i| (i, i, (i + 1) as f64)).collect());
    let x = vec![2.0; 6];
    let expected: Vec<f64> = (0..6).map(|i| 2.0 * (i + 1) as f64).collect();

    for strategy in ALL_STRATEGIES {
        let mut engine = Engine::from_csr(matrix.clone(), options(3, strategy, false)).unwrap();
        engine.tune(Tuning::Enabled);
        let mut y = vec![0.0; 6];
        engine.multiply(&mut y, &x);
        assert_eq!(y, expected, "strategy {:?}", strategy);
    }
}

#[test]
fn test_empty_rows_in_a_slab() {
    // Rows 3..6 store nothing at all; point-to-point signaling must not
    // deadlock on the idle slab
    let matrix = triplets_to_csr(
        9,
        9,
        vec![
            (0, 0, 2.0),
            (1, 1, 2.0),
            (2, 0, 1.0),
            (0, 2, 1.0),
            (2, 2, 2.0),
            (6, 6, 2.0),
            (7, 0, 1.0),
            (0, 7, 1.0),
            (7, 7, 2.0),
            (8, 8, 2.0),
        ],
    );
    let x = random_vector(9, 8);
    let expected = reference_spmv(&matrix, &x);

    let mut engine = Engine::from_csr(
        matrix,
        options(3, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    engine.tune(Tuning::Enabled);

    let mut y = vec![0.0; 9];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);
}

#[test]
fn test_non_symmetric_fallback() {
    // Caller asserts symmetry but the matrix is not symmetric: the engine
    // must roll back to CSR and still produce correct results
    let matrix = triplets_to_csr(
        3,
        3,
        vec![(0, 0, 1.0), (0, 2, 5.0), (1, 1, 2.0), (2, 2, 3.0)],
    );
    let x = vec![1.0, 2.0, 3.0];
    let expected = reference_spmv(&matrix, &x);

    let mut engine = Engine::from_csr(
        matrix,
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    assert!(!engine.symmetric());
    assert!(engine.tune(Tuning::Enabled));
    assert_eq!(engine.kernel_name(), "split_nnz");

    let mut y = vec![0.0; 3];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);
}

#[test]
fn test_rectangular_matrix() {
    let matrix = triplets_to_csr(2, 4, vec![(0, 0, 1.0), (0, 3, 2.0), (1, 1, 3.0)]);
    let x = vec![1.0, 1.0, 1.0, 1.0];
    let expected = reference_spmv(&matrix, &x);

    let mut engine = Engine::from_csr(matrix, options(2, KernelStrategy::Atomics, false)).unwrap();
    assert!(!engine.symmetric());
    engine.tune(Tuning::Enabled);

    let mut y = vec![0.0; 2];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);
}

#[test]
fn test_untuned_engine_runs_vanilla() {
    let matrix = random_symmetric(50, 0.1, 9);
    let x = random_vector(50, 10);
    let expected = reference_spmv(&matrix, &x);

    let engine = Engine::from_csr(
        matrix.clone(),
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    assert_eq!(engine.kernel_name(), "vanilla");
    let mut y = vec![0.0; 50];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);

    // Tuning::None keeps the vanilla kernel and reports it
    let mut engine = Engine::from_csr(
        matrix,
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    assert!(!engine.tune(Tuning::None));
    assert_eq!(engine.kernel_name(), "vanilla");
}

#[test]
fn test_multiply_overwrites_stale_output() {
    let matrix = random_symmetric(80, 0.08, 12);
    let x = random_vector(80, 13);
    let expected = reference_spmv(&matrix, &x);

    for strategy in ALL_STRATEGIES {
        let mut engine = Engine::from_csr(matrix.clone(), options(2, strategy, false)).unwrap();
        engine.tune(Tuning::Enabled);
        let mut y = vec![1e30; 80];
        engine.multiply(&mut y, &x);
        assert_close(&y, &expected);
    }
}

#[test]
fn test_preprocessing_idempotence() {
    let matrix = random_symmetric(120, 0.06, 17);
    let x = random_vector(120, 18);

    let build = || {
        let mut engine = Engine::from_csr(
            matrix.clone(),
            options(4, KernelStrategy::ConflictFreeAposteriori, false),
        )
        .unwrap();
        engine.tune(Tuning::Enabled);
        engine
    };

    let engine_a = build();
    let engine_b = build();
    assert_eq!(engine_a.row_split(), engine_b.row_split());
    assert_eq!(engine_a.n_colors(), engine_b.n_colors());

    // Identical schedules make the floating-point order identical
    let mut y_a = vec![0.0; 120];
    let mut y_b = vec![0.0; 120];
    engine_a.multiply(&mut y_a, &x);
    engine_b.multiply(&mut y_b, &x);
    assert_eq!(y_a, y_b);
}

#[test]
fn test_size_bytes_reflects_compression() {
    let matrix = random_symmetric(100, 0.1, 19);
    let mut engine = Engine::from_csr(
        matrix,
        options(2, KernelStrategy::ConflictFreeAposteriori, false),
    )
    .unwrap();
    let before = engine.size_bytes();
    assert!(before > 0);
    engine.tune(Tuning::Enabled);
    // The full CSR is dropped; the compressed form stores roughly half
    // the off-diagonal entries plus schedule metadata
    assert!(engine.size_bytes() < before);
}

#[test]
fn test_blocked_conflict_graph() {
    // blk_factor > 1 groups rows into blocks but must not change results
    let matrix = random_symmetric(200, 0.05, 21);
    let x = random_vector(200, 22);
    let expected = reference_spmv(&matrix, &x);

    let mut opts = options(3, KernelStrategy::ConflictFreeAposteriori, false);
    opts.blk_factor = 4;
    let mut engine = Engine::from_csr(matrix, opts).unwrap();
    engine.tune(Tuning::Enabled);

    let mut y = vec![0.0; 200];
    engine.multiply(&mut y, &x);
    assert_close(&y, &expected);
}

#[test]
#[should_panic(expected = "input length must equal n_cols")]
fn test_input_length_mismatch_panics() {
    let matrix = triplets_to_csr(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0)]);
    let engine = Engine::from_csr(matrix, EngineOptions::with_threads(1)).unwrap();
    let mut y = vec![0.0; 2];
    engine.multiply(&mut y, &[1.0]);
}

#[test]
fn test_invalid_configurations_rejected() {
    let matrix = triplets_to_csr(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0)]);
    assert!(Engine::from_csr(matrix.clone(), EngineOptions::with_threads(0)).is_err());
    assert!(Engine::from_csr(matrix.clone(), EngineOptions::with_threads(64)).is_err());

    let mut opts = EngineOptions::with_threads(2);
    opts.blk_factor = 6;
    assert!(Engine::from_csr(matrix, opts).is_err());
}
