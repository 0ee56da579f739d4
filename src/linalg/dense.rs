//! Dense matrix helpers.
//!
//! Dense problem data is stored in `faer::Mat`. The kernels here are the
//! small matrix-vector products the IPM needs; the heavy lifting (the
//! pivoted LDL^T factorization) is delegated to faer itself in
//! `dense_kkt`.

use faer::Mat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::nrm2;

/// y = A x
pub fn gemv(a: &Mat<f64>, x: &[f64], y: &mut [f64]) {
    assert_eq!(a.ncols(), x.len());
    assert_eq!(a.nrows(), y.len());
    y.fill(0.0);
    for j in 0..a.ncols() {
        let xj = x[j];
        for i in 0..a.nrows() {
            y[i] += a[(i, j)] * xj;
        }
    }
}

/// y = A^T x
pub fn gemv_transpose(a: &Mat<f64>, x: &[f64], y: &mut [f64]) {
    assert_eq!(a.nrows(), x.len());
    assert_eq!(a.ncols(), y.len());
    for j in 0..a.ncols() {
        let mut acc = 0.0;
        for i in 0..a.nrows() {
            acc += a[(i, j)] * x[i];
        }
        y[j] = acc;
    }
}

/// y = Q x for Q referenced through its lower triangle only.
pub fn hemv_lower(q: &Mat<f64>, x: &[f64], y: &mut [f64]) {
    let n = q.nrows();
    assert_eq!(q.ncols(), n);
    assert_eq!(x.len(), n);
    assert_eq!(y.len(), n);
    y.fill(0.0);
    for j in 0..n {
        y[j] += q[(j, j)] * x[j];
        for i in (j + 1)..n {
            let v = q[(i, j)];
            y[i] += v * x[j];
            y[j] += v * x[i];
        }
    }
}

/// Maximum absolute column sum.
pub fn one_norm(a: &Mat<f64>) -> f64 {
    let mut max_col = 0.0_f64;
    for j in 0..a.ncols() {
        let mut sum = 0.0;
        for i in 0..a.nrows() {
            sum += a[(i, j)].abs();
        }
        max_col = max_col.max(sum);
    }
    max_col
}

/// Maximum absolute column sum of a matrix referenced through its lower
/// triangle only.
pub fn hermitian_one_norm_lower(q: &Mat<f64>) -> f64 {
    let n = q.nrows();
    let mut col_sums = vec![0.0_f64; n];
    for j in 0..n {
        col_sums[j] += q[(j, j)].abs();
        for i in (j + 1)..n {
            let v = q[(i, j)].abs();
            col_sums[j] += v;
            col_sums[i] += v;
        }
    }
    col_sums.iter().fold(0.0_f64, |acc, &x| acc.max(x))
}

/// Estimate the two-norm of a (rows x cols) operator by power iteration on
/// B^T B, driving the matvecs through the supplied closures.
///
/// A fixed seed keeps the estimate deterministic across runs and
/// processes.
pub fn two_norm_estimate<F, G>(
    rows: usize,
    cols: usize,
    basis_size: usize,
    apply: F,
    apply_transpose: G,
) -> f64
where
    F: Fn(&[f64], &mut [f64]),
    G: Fn(&[f64], &mut [f64]),
{
    if rows == 0 || cols == 0 {
        return 0.0;
    }

    let mut rng = ChaCha8Rng::seed_from_u64(0x6f72_7468);
    let mut v: Vec<f64> = (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let v_norm = nrm2(&v);
    if v_norm == 0.0 {
        return 0.0;
    }
    for vi in v.iter_mut() {
        *vi /= v_norm;
    }

    let mut w = vec![0.0; rows];
    let mut u = vec![0.0; cols];
    let mut lambda = 0.0;
    for _ in 0..basis_size.max(1) {
        apply(&v, &mut w);
        apply_transpose(&w, &mut u);
        lambda = nrm2(&u);
        if lambda <= f64::MIN_POSITIVE {
            return 0.0;
        }
        for i in 0..cols {
            v[i] = u[i] / lambda;
        }
    }
    lambda.sqrt()
}

/// Estimate the two-norm of a symmetric operator by power iteration.
pub fn symmetric_two_norm_estimate<F>(n: usize, basis_size: usize, apply: F) -> f64
where
    F: Fn(&[f64], &mut [f64]),
{
    // For symmetric Q the singular values are |eigenvalues|, so the
    // general estimator applied with B = B^T = Q is exact in the limit.
    two_norm_estimate(n, n, basis_size, &apply, &apply)
}
