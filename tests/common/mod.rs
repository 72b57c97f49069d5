//! Shared helpers for the integration suites
#![allow(dead_code)]

use sparmat::prelude::*;

pub type RefDevice = <ReferenceExecutor as Executor>::Device;

pub fn ref_device() -> RefDevice {
    ReferenceExecutor::default_device()
}

/// 1-D Laplacian (SPD tridiagonal): diag = 2, off-diag = -1
pub fn laplacian_csr<E: Executor>(n: usize, device: &E::Device) -> Csr<E, f64, i64> {
    let mut row_ptrs = Vec::with_capacity(n + 1);
    let mut col_idxs = Vec::new();
    let mut values = Vec::new();
    row_ptrs.push(0i64);
    for i in 0..n {
        if i > 0 {
            col_idxs.push(i as i64 - 1);
            values.push(-1.0f64);
        }
        col_idxs.push(i as i64);
        values.push(2.0);
        if i < n - 1 {
            col_idxs.push(i as i64 + 1);
            values.push(-1.0);
        }
        row_ptrs.push(col_idxs.len() as i64);
    }
    Csr::from_host_data(Dim2::square(n), &row_ptrs, &col_idxs, &values, device)
        .expect("laplacian construction")
}

/// Column vector as a `n x 1` dense matrix
pub fn column<E: Executor>(data: &[f64], device: &E::Device) -> Dense<E, f64> {
    Dense::from_slice(Dim2::new(data.len(), 1), data, device).expect("column construction")
}

/// Assert two value slices agree within `tol`
pub fn assert_close(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len(), "length mismatch");
    for (i, (g, w)) in got.iter().zip(want).enumerate() {
        assert!(
            (g - w).abs() <= tol,
            "entry {}: got {}, want {} (tol {})",
            i,
            g,
            w,
            tol
        );
    }
}
