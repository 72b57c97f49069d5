//! SpMV consistency across formats, strategies, and executors

mod common;

use common::{assert_close, column, laplacian_csr, ref_device};
use sparmat::prelude::*;

type RefCsr = Csr<ReferenceExecutor, f64, i64>;
type RefDense = Dense<ReferenceExecutor, f64>;

/// 5x5 system with rows owned non-contiguously in the distributed
/// variant of this scenario; y = A x is checked against the literal
/// expectation
fn five_by_five() -> (MatrixData<f64, i64>, Vec<f64>, Vec<f64>) {
    let data = MatrixData::from_entries(
        Dim2::new(5, 5),
        [
            (0i64, 4i64, 1.0),
            (1, 1, 2.0),
            (1, 4, 1.5),
            (2, 0, -6.0),
            (2, 3, 4.0),
            (3, 3, 2.0),
            (4, 1, 4.0),
            (4, 4, 4.0),
        ],
    );
    let x = vec![-3.0, 3.0, -5.0, 5.0, 1.0];
    let y = vec![1.0, 7.5, 38.0, 10.0, 16.0];
    (data, x, y)
}

#[test]
fn csr_spmv_5x5_literal() {
    let device = ref_device();
    let (data, x, expected) = five_by_five();
    let a = RefCsr::read(&data, &device).unwrap();
    let b = column::<ReferenceExecutor>(&x, &device);
    let mut y = RefDense::new(Dim2::new(5, 1), &device).unwrap();
    a.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, 1e-14);
}

#[test]
fn all_formats_agree_on_the_same_product() {
    let device = ref_device();
    let (data, x, expected) = five_by_five();
    let b = column::<ReferenceExecutor>(&x, &device);
    let mut y = RefDense::new(Dim2::new(5, 1), &device).unwrap();
    let tol = 1e-13;

    let csr = RefCsr::read(&data, &device).unwrap();
    csr.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);

    let coo = Coo::<ReferenceExecutor, f64, i64>::read(&data, &device).unwrap();
    coo.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);

    let ell = Ell::<ReferenceExecutor, f64, i64>::read(&data, &device).unwrap();
    ell.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);

    let sellp =
        Sellp::<ReferenceExecutor, f64, i64>::read_with_config(&data, 2, 2, &device).unwrap();
    sellp.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);

    let hybrid = Hybrid::<ReferenceExecutor, f64, i64>::read_with_strategy(
        &data,
        HybridStrategy::ColumnLimit { columns: 1 },
        &device,
    )
    .unwrap();
    hybrid.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);

    let dense = RefDense::read(&data, &device).unwrap();
    dense.apply(&b, &mut y).unwrap();
    assert_close(&y.to_row_major_vec(), &expected, tol);
}

#[test]
fn every_csr_strategy_computes_the_same_product() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(40, &device);
    let x: Vec<f64> = (0..40).map(|i| (i as f64) * 0.25 - 3.0).collect();
    let b = column::<ReferenceExecutor>(&x, &device);

    let mut expected = RefDense::new(Dim2::new(40, 1), &device).unwrap();
    a.apply(&b, &mut expected).unwrap();
    let expected = expected.to_row_major_vec();

    for strategy in [
        CsrStrategy::Classical,
        CsrStrategy::LoadBalance,
        CsrStrategy::MergePath,
        CsrStrategy::Sparselib,
        CsrStrategy::Automatical,
    ] {
        let a = laplacian_csr::<ReferenceExecutor>(40, &device)
            .with_strategy(strategy)
            .unwrap();
        let mut y = RefDense::new(Dim2::new(40, 1), &device).unwrap();
        a.apply(&b, &mut y).unwrap();
        assert_close(&y.to_row_major_vec(), &expected, 1e-12);
    }
}

#[test]
fn host_executor_matches_reference_oracle() {
    // executor invariance: the parallel host executor and the serial
    // reference executor compute the same result on cloned data
    let rdev = ref_device();
    let hdev = HostExecutor::default_device();
    let a_ref = laplacian_csr::<ReferenceExecutor>(101, &rdev);
    let x: Vec<f64> = (0..101).map(|i| ((i * 7 % 13) as f64) - 6.0).collect();
    let b_ref = column::<ReferenceExecutor>(&x, &rdev);

    let mut y_ref = RefDense::new(Dim2::new(101, 1), &rdev).unwrap();
    a_ref.apply(&b_ref, &mut y_ref).unwrap();

    let a_host = a_ref.clone_to::<HostExecutor>(&hdev).unwrap();
    let b_host = b_ref.clone_to::<HostExecutor>(&hdev).unwrap();
    let mut y_host = Dense::<HostExecutor, f64>::new(Dim2::new(101, 1), &hdev).unwrap();
    a_host.apply(&b_host, &mut y_host).unwrap();

    assert_close(&y_host.to_row_major_vec(), &y_ref.to_row_major_vec(), 1e-12);

    // the load-balanced strategies too, which chunk differently on the
    // parallel executor
    for strategy in [CsrStrategy::LoadBalance, CsrStrategy::MergePath] {
        let a_host = a_host.clone().with_strategy(strategy).unwrap();
        let mut y = Dense::<HostExecutor, f64>::new(Dim2::new(101, 1), &hdev).unwrap();
        a_host.apply(&b_host, &mut y).unwrap();
        assert_close(&y.to_row_major_vec(), &y_ref.to_row_major_vec(), 1e-12);
    }
}

#[test]
fn block_spmv_processes_columns_independently() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(8, &device);
    // two right-hand sides at once
    let b_cols = [
        [1.0, 0.0, 2.0, -1.0, 0.5, 3.0, -2.0, 1.0],
        [0.0, 1.0, -1.0, 2.0, -0.5, 0.0, 4.0, -3.0],
    ];
    let mut b_data = Vec::new();
    for r in 0..8 {
        b_data.push(b_cols[0][r]);
        b_data.push(b_cols[1][r]);
    }
    let b = RefDense::from_slice(Dim2::new(8, 2), &b_data, &device).unwrap();
    let mut y = RefDense::new(Dim2::new(8, 2), &device).unwrap();
    a.apply(&b, &mut y).unwrap();

    // each column must equal its standalone product
    for (c, col) in b_cols.iter().enumerate() {
        let b1 = column::<ReferenceExecutor>(col, &device);
        let mut y1 = RefDense::new(Dim2::new(8, 1), &device).unwrap();
        a.apply(&b1, &mut y1).unwrap();
        let block = y.to_row_major_vec();
        let standalone = y1.to_row_major_vec();
        for r in 0..8 {
            assert!((block[r * 2 + c] - standalone[r]).abs() < 1e-13);
        }
    }
}

#[test]
fn scaled_apply_composes_linearly() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(6, &device);
    let b = column::<ReferenceExecutor>(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &device);
    let mut x = column::<ReferenceExecutor>(&[1.0; 6], &device);
    // x = 2 A b - x
    a.apply_scaled(2.0, &b, -1.0, &mut x).unwrap();

    let mut plain = RefDense::new(Dim2::new(6, 1), &device).unwrap();
    a.apply(&b, &mut plain).unwrap();
    let want: Vec<f64> = plain
        .to_row_major_vec()
        .into_iter()
        .map(|v| 2.0 * v - 1.0)
        .collect();
    assert_close(&x.to_row_major_vec(), &want, 1e-13);
}

#[test]
fn permutation_laws_hold() {
    let device = ref_device();
    let a = laplacian_csr::<ReferenceExecutor>(5, &device);
    let p = Permutation::<ReferenceExecutor, i64>::from_indices(
        &[4, 2, 0, 1, 3],
        PermuteMask::Row,
        &device,
    )
    .unwrap();

    // P composed with its inverse is the identity
    let roundtrip = a.row_permute(&p).unwrap().inverse_row_permute(&p).unwrap();
    assert_eq!(roundtrip.write(), a.write());

    // inverse_row_permute(P, A) == row_permute(P^-1, A)
    let by_inverse = a.row_permute(&p.inverse().unwrap()).unwrap();
    let direct = a.inverse_row_permute(&p).unwrap();
    assert_eq!(by_inverse.write(), direct.write());

    // column laws mirror the row laws
    let col_roundtrip = a
        .column_permute(&p)
        .unwrap()
        .inverse_column_permute(&p)
        .unwrap();
    assert_eq!(col_roundtrip.write(), a.write());
}

#[test]
fn dense_and_csr_permutes_agree() {
    let device = ref_device();
    let csr = laplacian_csr::<ReferenceExecutor>(5, &device);
    let dense = csr.to_dense().unwrap();
    let p = Permutation::<ReferenceExecutor, i64>::from_indices(
        &[1, 3, 0, 4, 2],
        PermuteMask::Row,
        &device,
    )
    .unwrap();
    let via_csr = csr.row_permute(&p).unwrap().to_dense().unwrap();
    let via_dense = dense.row_permute(&p).unwrap();
    assert_eq!(via_csr.to_row_major_vec(), via_dense.to_row_major_vec());

    let via_csr = csr.column_permute(&p).unwrap().to_dense().unwrap();
    let via_dense = dense.column_permute(&p).unwrap();
    assert_eq!(via_csr.to_row_major_vec(), via_dense.to_row_major_vec());
}
