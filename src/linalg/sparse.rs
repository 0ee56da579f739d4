//! Sparse matrix helpers.
//!
//! All sparse problem data lives in CSC (Compressed Sparse Column) format,
//! the storage expected by the sparse direct solver. Symmetric matrices in
//! the problem (Q) carry their full pattern; the KKT system stores its
//! upper triangle only.

use sprs::{CsMat, TriMat};

/// Sparse matrix in CSC format.
pub type SparseCsc = CsMat<f64>;

/// Build a sparse CSC matrix from (row, col, value) triplets.
///
/// Duplicate entries are summed.
pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> SparseCsc
where
    I: IntoIterator<Item = (usize, usize, f64)>,
{
    let mut tri = TriMat::new((nrows, ncols));
    for (i, j, v) in triplets {
        tri.add_triplet(i, j, v);
    }
    tri.to_csc()
}

/// y = A x
pub fn spmv(a: &SparseCsc, x: &[f64], y: &mut [f64]) {
    assert_eq!(a.cols(), x.len());
    assert_eq!(a.rows(), y.len());
    y.fill(0.0);
    for col in 0..a.cols() {
        if let Some(col_view) = a.outer_view(col) {
            let xj = x[col];
            for (row, &val) in col_view.iter() {
                y[row] += val * xj;
            }
        }
    }
}

/// y = A^T x
pub fn spmv_transpose(a: &SparseCsc, x: &[f64], y: &mut [f64]) {
    assert_eq!(a.rows(), x.len());
    assert_eq!(a.cols(), y.len());
    for col in 0..a.cols() {
        let mut acc = 0.0;
        if let Some(col_view) = a.outer_view(col) {
            for (row, &val) in col_view.iter() {
                acc += val * x[row];
            }
        }
        y[col] = acc;
    }
}

/// y = Q x for Q stored with its full symmetric pattern.
pub fn spmv_symmetric(q: &SparseCsc, x: &[f64], y: &mut [f64]) {
    spmv(q, x, y);
}

/// Maximum absolute column sum.
pub fn one_norm(a: &SparseCsc) -> f64 {
    let mut max_col = 0.0_f64;
    for col in 0..a.cols() {
        let mut sum = 0.0;
        if let Some(col_view) = a.outer_view(col) {
            for (_, &val) in col_view.iter() {
                sum += val.abs();
            }
        }
        max_col = max_col.max(sum);
    }
    max_col
}

/// Check that a square matrix carries an explicitly symmetric pattern and
/// values, i.e. every stored (i, j, v) has a matching (j, i, v).
pub fn is_explicitly_symmetric(q: &SparseCsc, rel_tol: f64) -> bool {
    if q.rows() != q.cols() {
        return false;
    }
    use std::collections::BTreeMap;
    let mut entries = BTreeMap::new();
    for (&val, (row, col)) in q.iter() {
        entries.insert((row, col), val);
    }
    for (&(row, col), &val) in &entries {
        let mirror = entries.get(&(col, row)).copied().unwrap_or(0.0);
        let scale = val.abs().max(mirror.abs()).max(1.0);
        if (val - mirror).abs() > rel_tol * scale {
            return false;
        }
    }
    true
}
