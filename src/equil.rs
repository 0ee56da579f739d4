//! Stacked Ruiz equilibration.
//!
//! Balances the row norms of A and G and the column norms of the stacked
//! matrix [A; G] by alternating diagonal rescaling sweeps, then applies
//! the accumulated scalings to (Q, b, c, h) and to any warm-start
//! iterates. The scalings are stored as divisors: the scaled problem is
//!
//! ```text
//! A <- D_A^-1 A D^-1,  G <- D_G^-1 G D^-1,  Q <- D^-1 Q D^-1,
//! b <- D_A^-1 b,       h <- D_G^-1 h,       c <- D^-1 c.
//! ```

use faer::Mat;
use sprs::TriMat;

use crate::linalg::sparse::SparseCsc;
use crate::problem::{EquilCtrl, Iterates};

/// Diagonal scalings produced by the equilibration sweep.
#[derive(Debug, Clone)]
pub struct RuizScaling {
    /// Row scaling of A (length m)
    pub d_row_a: Vec<f64>,
    /// Row scaling of G (length k)
    pub d_row_g: Vec<f64>,
    /// Column scaling of [A; G] (length n)
    pub d_col: Vec<f64>,
}

impl RuizScaling {
    /// Identity scaling (no equilibration applied).
    pub fn identity(n: usize, m: usize, k: usize) -> Self {
        Self {
            d_row_a: vec![1.0; m],
            d_row_g: vec![1.0; k],
            d_col: vec![1.0; n],
        }
    }

    /// Transform warm-start iterates into the scaled space:
    /// x <- D x, s <- D_G^-1 s, y <- D_A y, z <- D_G z.
    pub fn scale_warm_start(&self, vars: &mut Iterates, primal_init: bool, dual_init: bool) {
        if primal_init {
            for (xi, di) in vars.x.iter_mut().zip(self.d_col.iter()) {
                *xi *= di;
            }
            for (si, di) in vars.s.iter_mut().zip(self.d_row_g.iter()) {
                *si /= di;
            }
        }
        if dual_init {
            for (yi, di) in vars.y.iter_mut().zip(self.d_row_a.iter()) {
                *yi *= di;
            }
            for (zi, di) in vars.z.iter_mut().zip(self.d_row_g.iter()) {
                *zi *= di;
            }
        }
    }

    /// Undo the scaling on the final iterates:
    /// x <- D^-1 x, y <- D_A^-1 y, z <- D_G^-1 z, s <- D_G s.
    pub fn unscale(&self, vars: &mut Iterates) {
        for (xi, di) in vars.x.iter_mut().zip(self.d_col.iter()) {
            *xi /= di;
        }
        for (yi, di) in vars.y.iter_mut().zip(self.d_row_a.iter()) {
            *yi /= di;
        }
        for (zi, di) in vars.z.iter_mut().zip(self.d_row_g.iter()) {
            *zi /= di;
        }
        for (si, di) in vars.s.iter_mut().zip(self.d_row_g.iter()) {
            *si *= di;
        }
    }

    fn accumulate(&mut self, d_a: &[f64], d_g: &[f64], d_c: &[f64]) {
        for (acc, d) in self.d_row_a.iter_mut().zip(d_a.iter()) {
            *acc *= d;
        }
        for (acc, d) in self.d_row_g.iter_mut().zip(d_g.iter()) {
            *acc *= d;
        }
        for (acc, d) in self.d_col.iter_mut().zip(d_c.iter()) {
            *acc *= d;
        }
    }
}

/// Per-sweep divisor sqrt(norm), guarding empty rows and columns.
#[inline]
fn sweep_factor(norm: f64) -> f64 {
    if norm > 1e-12 {
        norm.sqrt()
    } else {
        1.0
    }
}

/// True once every nonzero row/column infinity norm sits within `tol`
/// of one.
fn norms_converged(row_a: &[f64], row_g: &[f64], col: &[f64], tol: f64) -> bool {
    row_a
        .iter()
        .chain(row_g.iter())
        .chain(col.iter())
        .all(|&nrm| nrm == 0.0 || (nrm - 1.0).abs() <= tol)
}

/// Equilibrate dense problem data in place.
pub fn equilibrate_dense(
    q: &mut Mat<f64>,
    a: &mut Mat<f64>,
    g: &mut Mat<f64>,
    b: &mut [f64],
    c: &mut [f64],
    h: &mut [f64],
    ctrl: &EquilCtrl,
) -> RuizScaling {
    let m = a.nrows();
    let k = g.nrows();
    let n = a.ncols();

    let mut scaling = RuizScaling::identity(n, m, k);
    let mut row_a = vec![0.0_f64; m];
    let mut row_g = vec![0.0_f64; k];
    let mut col = vec![0.0_f64; n];

    for _ in 0..ctrl.max_iters {
        row_a.fill(0.0);
        row_g.fill(0.0);
        col.fill(0.0);
        for j in 0..n {
            for i in 0..m {
                let v = a[(i, j)].abs();
                row_a[i] = row_a[i].max(v);
                col[j] = col[j].max(v);
            }
            for i in 0..k {
                let v = g[(i, j)].abs();
                row_g[i] = row_g[i].max(v);
                col[j] = col[j].max(v);
            }
        }

        if norms_converged(&row_a, &row_g, &col, ctrl.tol) {
            break;
        }

        let d_a: Vec<f64> = row_a.iter().map(|&v| sweep_factor(v)).collect();
        let d_g: Vec<f64> = row_g.iter().map(|&v| sweep_factor(v)).collect();
        let d_c: Vec<f64> = col.iter().map(|&v| sweep_factor(v)).collect();

        for j in 0..n {
            for i in 0..m {
                a[(i, j)] /= d_a[i] * d_c[j];
            }
            for i in 0..k {
                g[(i, j)] /= d_g[i] * d_c[j];
            }
        }

        scaling.accumulate(&d_a, &d_g, &d_c);
    }

    // Q <- D^-1 Q D^-1 on the referenced lower triangle.
    for j in 0..n {
        for i in j..n {
            q[(i, j)] /= scaling.d_col[i] * scaling.d_col[j];
        }
    }
    apply_vector_scalings(b, c, h, &scaling);
    scaling
}

/// Equilibrate sparse problem data in place.
pub fn equilibrate_sparse(
    q: &mut SparseCsc,
    a: &mut SparseCsc,
    g: &mut SparseCsc,
    b: &mut [f64],
    c: &mut [f64],
    h: &mut [f64],
    ctrl: &EquilCtrl,
) -> RuizScaling {
    let m = a.rows();
    let k = g.rows();
    let n = a.cols();

    let mut scaling = RuizScaling::identity(n, m, k);
    let mut row_a = vec![0.0_f64; m];
    let mut row_g = vec![0.0_f64; k];
    let mut col = vec![0.0_f64; n];

    for _ in 0..ctrl.max_iters {
        row_a.fill(0.0);
        row_g.fill(0.0);
        col.fill(0.0);
        for (&val, (row, c_)) in a.iter() {
            let v = val.abs();
            row_a[row] = row_a[row].max(v);
            col[c_] = col[c_].max(v);
        }
        for (&val, (row, c_)) in g.iter() {
            let v = val.abs();
            row_g[row] = row_g[row].max(v);
            col[c_] = col[c_].max(v);
        }

        if norms_converged(&row_a, &row_g, &col, ctrl.tol) {
            break;
        }

        let d_a: Vec<f64> = row_a.iter().map(|&v| sweep_factor(v)).collect();
        let d_g: Vec<f64> = row_g.iter().map(|&v| sweep_factor(v)).collect();
        let d_c: Vec<f64> = col.iter().map(|&v| sweep_factor(v)).collect();

        *a = scale_sparse(a, &d_a, &d_c);
        *g = scale_sparse(g, &d_g, &d_c);

        scaling.accumulate(&d_a, &d_g, &d_c);
    }

    *q = scale_sparse(q, &scaling.d_col, &scaling.d_col);
    apply_vector_scalings(b, c, h, &scaling);
    scaling
}

fn apply_vector_scalings(b: &mut [f64], c: &mut [f64], h: &mut [f64], scaling: &RuizScaling) {
    for (bi, di) in b.iter_mut().zip(scaling.d_row_a.iter()) {
        *bi /= di;
    }
    for (hi, di) in h.iter_mut().zip(scaling.d_row_g.iter()) {
        *hi /= di;
    }
    for (ci, di) in c.iter_mut().zip(scaling.d_col.iter()) {
        *ci /= di;
    }
}

/// result = diag(d_row)^-1 M diag(d_col)^-1
fn scale_sparse(mat: &SparseCsc, d_row: &[f64], d_col: &[f64]) -> SparseCsc {
    let mut tri = TriMat::new((mat.rows(), mat.cols()));
    for (&val, (row, col)) in mat.iter() {
        tri.add_triplet(row, col, val / (d_row[row] * d_col[col]));
    }
    tri.to_csc()
}
