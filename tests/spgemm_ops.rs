//! SpGEMM behavior: literal tier-1 case, long-row tier against dense,
//! pattern correctness, and two-pass coherence

mod common;

use common::ref_device;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sparmat::linop::LinOp;
use sparmat::prelude::*;

type RefCsr = Csr<ReferenceExecutor, f64, i64>;
type RefDense = Dense<ReferenceExecutor, f64>;

#[test]
fn tier1_literal_product() {
    let device = ref_device();
    // A = [[1, 2], [0, 3]], B = [[4, 0], [0, 5]]
    let a = RefCsr::from_host_data(
        Dim2::new(2, 2),
        &[0, 2, 3],
        &[0, 1, 1],
        &[1.0, 2.0, 3.0],
        &device,
    )
    .unwrap();
    let b = RefCsr::from_host_data(
        Dim2::new(2, 2),
        &[0, 1, 2],
        &[0, 1],
        &[4.0, 5.0],
        &device,
    )
    .unwrap();
    let c = a.spgemm(&b).unwrap();
    // C = [[4, 10], [0, 15]] with per-row counts {2, 1}
    assert_eq!(c.row_ptrs().to_vec(), vec![0, 2, 3]);
    assert_eq!(c.col_idxs().to_vec(), vec![0, 1, 1]);
    assert_eq!(c.values().to_vec(), vec![4.0, 10.0, 15.0]);
}

/// Random CSR with roughly `avg_row_nnz` entries per row
fn random_csr(
    rng: &mut StdRng,
    rows: usize,
    cols: usize,
    avg_row_nnz: usize,
    device: &common::RefDevice,
) -> RefCsr {
    let mut data = MatrixData::<f64, i64>::new(Dim2::new(rows, cols));
    for r in 0..rows {
        let nnz = 1 + rng.gen_range(0..2 * avg_row_nnz);
        let mut picked: Vec<usize> = (0..nnz).map(|_| rng.gen_range(0..cols)).collect();
        picked.sort_unstable();
        picked.dedup();
        for col in picked {
            data.push(r as i64, col as i64, rng.gen_range(-1.0..1.0));
        }
    }
    RefCsr::read(&data, device).unwrap()
}

#[test]
fn tier3_long_row_matches_dense_product() {
    let device = ref_device();
    let mut rng = StdRng::seed_from_u64(0x5eed);

    // A: one row with 256 non-zeros over 256 columns
    let mut a_data = MatrixData::<f64, i64>::new(Dim2::new(1, 256));
    for col in 0..256 {
        a_data.push(0, col as i64, rng.gen_range(-1.0..1.0));
    }
    let a = RefCsr::read(&a_data, &device).unwrap();
    let b = random_csr(&mut rng, 256, 256, 16, &device);

    let c = a.spgemm(&b).unwrap();

    // dense comparison row
    let a_dense = a.to_dense().unwrap();
    let b_dense = b.to_dense().unwrap();
    let mut expected = RefDense::new(Dim2::new(1, 256), &device).unwrap();
    a_dense.apply(&b_dense, &mut expected).unwrap();
    let expected = expected.to_row_major_vec();

    let max_b = b
        .values()
        .to_vec()
        .iter()
        .fold(0.0f64, |m, v| m.max(v.abs()));
    let tol = f64::EPSILON * 256.0 * max_b.max(1.0) * 16.0;

    let got = c.to_dense().unwrap().to_row_major_vec();
    for (i, (g, w)) in got.iter().zip(&expected).enumerate() {
        assert!((g - w).abs() <= tol, "column {}: {} vs {}", i, g, w);
    }
}

#[test]
fn spgemm_equals_dense_product_elementwise() {
    let device = ref_device();
    let mut rng = StdRng::seed_from_u64(42);
    let a = random_csr(&mut rng, 20, 30, 4, &device);
    let b = random_csr(&mut rng, 30, 25, 4, &device);

    let c = a.spgemm(&b).unwrap();

    let a_dense = a.to_dense().unwrap();
    let b_dense = b.to_dense().unwrap();
    let mut expected = RefDense::new(Dim2::new(20, 25), &device).unwrap();
    a_dense.apply(&b_dense, &mut expected).unwrap();

    let got = c.to_dense().unwrap().to_row_major_vec();
    common::assert_close(&got, &expected.to_row_major_vec(), 1e-12);
}

#[test]
fn result_pattern_covers_structural_nonzeros() {
    let device = ref_device();
    // structural product: every column reachable through a shared inner
    // index appears in the result pattern
    let a = RefCsr::from_host_data(
        Dim2::new(2, 3),
        &[0, 2, 3],
        &[0, 2, 1],
        &[1.0, 1.0, 1.0],
        &device,
    )
    .unwrap();
    let b = RefCsr::from_host_data(
        Dim2::new(3, 3),
        &[0, 2, 3, 4],
        &[0, 1, 2, 1],
        &[1.0, 1.0, 1.0, 1.0],
        &device,
    )
    .unwrap();
    let c = a.spgemm(&b).unwrap();
    // row 0 reaches B rows 0 and 2: columns {0, 1}
    // row 1 reaches B row 1: column {2}
    assert_eq!(c.row_ptrs().to_vec(), vec![0, 2, 3]);
    assert_eq!(c.col_idxs().to_vec(), vec![0, 1, 2]);
}

#[test]
fn two_pass_coherence_row_ptrs_match_row_lengths() {
    let device = ref_device();
    let mut rng = StdRng::seed_from_u64(7);
    let a = random_csr(&mut rng, 60, 60, 6, &device);
    let c = a.spgemm(&a).unwrap();

    let row_ptrs = c.row_ptrs().to_vec();
    let col_idxs = c.col_idxs().to_vec();
    assert_eq!(*row_ptrs.last().unwrap() as usize, c.nnz());
    // every row's columns are strictly increasing, so the counted
    // positions and the written positions coincide
    for r in 0..60 {
        let row = &col_idxs[row_ptrs[r] as usize..row_ptrs[r + 1] as usize];
        assert!(row.windows(2).all(|w| w[0] < w[1]), "row {} unsorted", r);
    }
}

#[test]
fn all_tiers_agree_through_the_public_api() {
    let device = ref_device();
    let mut rng = StdRng::seed_from_u64(1234);
    let b = random_csr(&mut rng, 150, 40, 3, &device);

    // three A matrices whose single row has short, medium, and long
    // fan-in over the same B
    for fan_in in [20usize, 80, 150] {
        let mut a_data = MatrixData::<f64, i64>::new(Dim2::new(1, 150));
        for k in 0..fan_in {
            a_data.push(0, k as i64, 1.0 + k as f64 / 100.0);
        }
        let a = RefCsr::read(&a_data, &device).unwrap();
        let c = a.spgemm(&b).unwrap();

        let a_dense = a.to_dense().unwrap();
        let b_dense = b.to_dense().unwrap();
        let mut expected = RefDense::new(Dim2::new(1, 40), &device).unwrap();
        a_dense.apply(&b_dense, &mut expected).unwrap();
        common::assert_close(
            &c.to_dense().unwrap().to_row_major_vec(),
            &expected.to_row_major_vec(),
            1e-10,
        );
    }
}

#[test]
fn advanced_spgemm_scales_and_accumulates() {
    let device = ref_device();
    let a = RefCsr::from_host_data(
        Dim2::new(2, 2),
        &[0, 1, 2],
        &[0, 1],
        &[2.0, 3.0],
        &device,
    )
    .unwrap();
    let d = RefCsr::from_host_data(
        Dim2::new(2, 2),
        &[0, 1, 2],
        &[1, 0],
        &[10.0, 20.0],
        &device,
    )
    .unwrap();
    // C = 2 * A * A + 1 * D
    let c = a.spgemm_advanced(2.0, &a, 1.0, &d).unwrap();
    let dense = c.to_dense().unwrap().to_row_major_vec();
    assert_eq!(dense, vec![8.0, 10.0, 20.0, 18.0]);
}

#[test]
fn work_estimate_bounds_the_merge_size() {
    let device = ref_device();
    let mut rng = StdRng::seed_from_u64(99);
    let a = random_csr(&mut rng, 30, 30, 4, &device);
    let b = random_csr(&mut rng, 30, 30, 4, &device);
    let estimate = a.spgemm_work_estimate(&b);
    let c = a.spgemm(&b).unwrap();
    // the merged output can never exceed the total merge work
    assert!(c.nnz() <= estimate);
}

#[test]
fn spgemm_on_host_executor_matches_reference() {
    let rdev = ref_device();
    let hdev = HostExecutor::default_device();
    let mut rng = StdRng::seed_from_u64(2024);
    let a = random_csr(&mut rng, 50, 50, 5, &rdev);
    let b = random_csr(&mut rng, 50, 50, 5, &rdev);
    let c_ref = a.spgemm(&b).unwrap();

    let a_host = a.clone_to::<HostExecutor>(&hdev).unwrap();
    let b_host = b.clone_to::<HostExecutor>(&hdev).unwrap();
    let c_host = a_host.spgemm(&b_host).unwrap();

    assert_eq!(c_host.row_ptrs().to_vec(), c_ref.row_ptrs().to_vec());
    assert_eq!(c_host.col_idxs().to_vec(), c_ref.col_idxs().to_vec());
    common::assert_close(&c_host.values().to_vec(), &c_ref.values().to_vec(), 1e-12);
}
