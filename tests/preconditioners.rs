//! Preconditioner cores exercised through their public surface

mod common;

use common::{column, laplacian_csr, ref_device};
use sparmat::precond::{ilu0, parilu, BlockJacobi, Isai, TriangleSide};
use sparmat::prelude::*;

type RefCsr = Csr<ReferenceExecutor, f64, i64>;
type RefDense = Dense<ReferenceExecutor, f64>;

// 5x5 with a 2-block and a 3-block on the diagonal
fn block_matrix() -> RefCsr {
    RefCsr::from_host_data(
        Dim2::new(5, 5),
        &[0, 3, 5, 7, 10, 13],
        &[0, 1, 4, 0, 1, 2, 3, 2, 3, 4, 0, 3, 4],
        &[
            4.0, -2.0, -2.0, -1.0, 4.0, 4.0, -2.0, -1.0, 4.0, -2.0, -1.0, -1.0, 4.0,
        ],
        &ref_device(),
    )
    .unwrap()
}

#[test]
fn block_jacobi_inverts_the_block_diagonal() {
    let device = ref_device();
    let a = block_matrix();
    let bj = BlockJacobi::build_with_blocks(&a, vec![0, 2, 5], false).unwrap();
    assert_eq!(bj.num_blocks(), 2);

    // applying the preconditioner to D x recovers x for the
    // block-diagonal part D
    let x0 = [1.0, -1.0, 2.0, 0.5, -0.5];
    // compute D x0 by hand from the two diagonal blocks
    let d_x = [
        4.0 * x0[0] - 2.0 * x0[1],
        -1.0 * x0[0] + 4.0 * x0[1],
        4.0 * x0[2] - 2.0 * x0[3],
        -1.0 * x0[2] + 4.0 * x0[3] - 2.0 * x0[4],
        -1.0 * x0[3] + 4.0 * x0[4],
    ];
    let b = column::<ReferenceExecutor>(&d_x, &device);
    let mut x = RefDense::new(Dim2::new(5, 1), &device).unwrap();
    bj.apply(&b, &mut x).unwrap();
    common::assert_close(&x.to_row_major_vec(), &x0, 1e-12);
}

#[test]
fn block_jacobi_accelerates_richardson() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(16, &device);
    let bj = BlockJacobi::build(&a, 4, false).unwrap();

    let b = column::<ReferenceExecutor>(&vec![1.0; 16], &device);
    let mut x = RefDense::new(Dim2::new(16, 1), &device).unwrap();
    let mut r = b.clone();

    let norm0 = r.compute_norm2().unwrap().to_row_major_vec()[0];
    for _ in 0..150 {
        // x += B r; r = b - A x
        let mut correction = RefDense::new(Dim2::new(16, 1), &device).unwrap();
        bj.apply(&r, &mut correction).unwrap();
        x.add_scaled(1.0, &correction).unwrap();
        r = b.clone();
        a.apply_scaled(-1.0, &x, 1.0, &mut r).unwrap();
    }
    let norm = r.compute_norm2().unwrap().to_row_major_vec()[0];
    assert!(
        norm < norm0 * 1e-2,
        "preconditioned iteration stalled: {} vs {}",
        norm,
        norm0
    );
}

#[test]
fn ilu_factors_solve_the_tridiagonal_system() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(8, &device);
    let factors = ilu0(&a).unwrap();

    // tridiagonal pattern has no fill-in, so the solve is exact
    let x0: Vec<f64> = (0..8).map(|i| (i as f64) - 3.5).collect();
    let x0_dense = column::<ReferenceExecutor>(&x0, &device);
    let mut b = RefDense::new(Dim2::new(8, 1), &device).unwrap();
    a.apply(&x0_dense, &mut b).unwrap();

    let mut x = RefDense::new(Dim2::new(8, 1), &device).unwrap();
    factors.solve(&b, &mut x).unwrap();
    common::assert_close(&x.to_row_major_vec(), &x0, 1e-10);
}

#[test]
fn parilu_sweeps_approach_the_sequential_factors() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(10, &device);
    let exact = ilu0(&a).unwrap();

    // successive sweep counts tighten toward the sequential factors
    let coarse = parilu(&a, 2).unwrap();
    let fine = parilu(&a, 25).unwrap();
    let exact_u = exact.u.values().to_vec();
    let err = |candidate: &RefCsr| -> f64 {
        candidate
            .values()
            .to_vec()
            .iter()
            .zip(&exact_u)
            .map(|(g, w)| (g - w).abs())
            .fold(0.0, f64::max)
    };
    assert!(err(&fine.u) < 1e-8);
    assert!(err(&fine.u) <= err(&coarse.u));
}

#[test]
fn isai_improves_on_the_triangular_factor() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(12, &device);
    let factors = ilu0(&a).unwrap();
    let isai = Isai::build(&factors.l, TriangleSide::Lower).unwrap();

    // M approximates L^-1 on L's pattern: M L restricted to that
    // pattern is the identity
    let product = isai.inverse().spgemm(&factors.l).unwrap();
    let dense = product.to_dense().unwrap();
    let n = 12;
    let host = dense.to_row_major_vec();
    let row_ptrs = factors.l.row_ptrs().to_vec();
    let col_idxs = factors.l.col_idxs().to_vec();
    for r in 0..n {
        for k in row_ptrs[r]..row_ptrs[r + 1] {
            let c = col_idxs[k as usize] as usize;
            let expected = if r == c { 1.0 } else { 0.0 };
            assert!(
                (host[r * n + c] - expected).abs() < 1e-10,
                "pattern entry ({}, {})",
                r,
                c
            );
        }
    }
}

#[test]
fn adaptive_block_jacobi_keeps_apply_accuracy() {
    let device = ref_device();
    let a = block_matrix();
    let full = BlockJacobi::build_with_blocks(&a, vec![0, 2, 5], false).unwrap();
    let adaptive = BlockJacobi::build_with_blocks(&a, vec![0, 2, 5], true).unwrap();

    let b = column::<ReferenceExecutor>(&[1.0, 2.0, 3.0, 4.0, 5.0], &device);
    let mut x_full = RefDense::new(Dim2::new(5, 1), &device).unwrap();
    let mut x_adaptive = RefDense::new(Dim2::new(5, 1), &device).unwrap();
    full.apply(&b, &mut x_full).unwrap();
    adaptive.apply(&b, &mut x_adaptive).unwrap();

    // reduced storage rounds through single precision
    common::assert_close(
        &x_adaptive.to_row_major_vec(),
        &x_full.to_row_major_vec(),
        1e-6,
    );
}
