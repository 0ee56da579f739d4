//! Residual and objective evaluation.
//!
//! Everything the convergence gate consumes is computed here once per
//! iteration: primal/dual objectives, the duality product, the three
//! residual vectors with their relative norms, and the DIMACS-style
//! aggregate error.

use crate::ipm::QpBackend;
use crate::linalg::{dot, nrm2};
use crate::problem::Iterates;

/// Norms of the problem vectors, snapshotted once after equilibration.
#[derive(Debug, Clone, Copy)]
pub struct DataNorms {
    pub b_nrm2: f64,
    pub c_nrm2: f64,
    pub h_nrm2: f64,
}

/// Relative objective gap |p - d| / (max(|p|, |d|) + 1).
pub fn relative_objective_gap(primal_obj: f64, dual_obj: f64) -> f64 {
    (primal_obj - dual_obj).abs() / (primal_obj.abs().max(dual_obj.abs()) + 1.0)
}

/// Relative complementarity gap. The sentinel value 2 signals an
/// inadmissible sign configuration (primal objective nonnegative while the
/// dual objective is nonpositive).
pub fn relative_complementarity_gap(primal_obj: f64, dual_obj: f64, duality_product: f64) -> f64 {
    if primal_obj < 0.0 {
        duality_product / -primal_obj
    } else if dual_obj > 0.0 {
        duality_product / dual_obj
    } else {
        2.0
    }
}

/// Per-iteration residual state. Buffers are allocated once and reused.
pub struct Residuals {
    /// A x - b
    pub rb: Vec<f64>,
    /// Q x + A^T y + G^T z + c
    pub rc: Vec<f64>,
    /// G x + s - h
    pub rh: Vec<f64>,

    pub rb_nrm2: f64,
    pub rc_nrm2: f64,
    pub rh_nrm2: f64,

    /// || r_b ||_2 / (1 + || b ||_2), and analogues
    pub rb_conv: f64,
    pub rc_conv: f64,
    pub rh_conv: f64,

    pub primal_obj: f64,
    pub dual_obj: f64,

    /// s^T z
    pub duality_product: f64,
    /// s^T z / k
    pub mu: f64,

    pub rel_obj_gap: f64,
    pub rel_comp_gap: f64,

    /// max(rb_conv, rc_conv, rh_conv)
    pub infeas_error: f64,
    /// max(infeas_error, rel_obj_gap, rel_comp_gap)
    pub dimacs_error: f64,

    /// Q x, kept for the objective and reused by callers
    qx: Vec<f64>,
    scratch_n: Vec<f64>,
}

impl Residuals {
    pub fn new(n: usize, m: usize, k: usize) -> Self {
        Self {
            rb: vec![0.0; m],
            rc: vec![0.0; n],
            rh: vec![0.0; k],
            rb_nrm2: 0.0,
            rc_nrm2: 0.0,
            rh_nrm2: 0.0,
            rb_conv: 0.0,
            rc_conv: 0.0,
            rh_conv: 0.0,
            primal_obj: 0.0,
            dual_obj: 0.0,
            duality_product: 0.0,
            mu: 0.0,
            rel_obj_gap: 0.0,
            rel_comp_gap: 0.0,
            infeas_error: 0.0,
            dimacs_error: 0.0,
            qx: vec![0.0; n],
            scratch_n: vec![0.0; n],
        }
    }

    /// Evaluate all residuals and gaps at the current iterate.
    pub fn compute<B: QpBackend>(&mut self, qp: &B, vars: &Iterates, norms: &DataNorms) {
        let (n, m, k) = qp.dims();
        let b = qp.b();
        let c = qp.c();
        let h = qp.h();

        // Objectives and duality measure.
        qp.mul_q(&vars.x, &mut self.qx);
        let xtqx = dot(&vars.x, &self.qx);
        self.primal_obj = 0.5 * xtqx + dot(c, &vars.x);
        self.dual_obj = -0.5 * xtqx - dot(b, &vars.y) - dot(h, &vars.z);

        self.duality_product = dot(&vars.s, &vars.z);
        self.mu = if k > 0 {
            self.duality_product / k as f64
        } else {
            0.0
        };

        // r_b = A x - b
        qp.mul_a(&vars.x, &mut self.rb);
        for i in 0..m {
            self.rb[i] -= b[i];
        }

        // r_c = Q x + A^T y + G^T z + c
        for i in 0..n {
            self.rc[i] = self.qx[i] + c[i];
        }
        qp.mul_at(&vars.y, &mut self.scratch_n);
        for i in 0..n {
            self.rc[i] += self.scratch_n[i];
        }
        qp.mul_gt(&vars.z, &mut self.scratch_n);
        for i in 0..n {
            self.rc[i] += self.scratch_n[i];
        }

        // r_h = G x + s - h
        qp.mul_g(&vars.x, &mut self.rh);
        for i in 0..k {
            self.rh[i] += vars.s[i] - h[i];
        }

        self.rb_nrm2 = nrm2(&self.rb);
        self.rc_nrm2 = nrm2(&self.rc);
        self.rh_nrm2 = nrm2(&self.rh);

        self.rb_conv = self.rb_nrm2 / (1.0 + norms.b_nrm2);
        self.rc_conv = self.rc_nrm2 / (1.0 + norms.c_nrm2);
        self.rh_conv = self.rh_nrm2 / (1.0 + norms.h_nrm2);

        self.rel_obj_gap = relative_objective_gap(self.primal_obj, self.dual_obj);
        self.rel_comp_gap =
            relative_complementarity_gap(self.primal_obj, self.dual_obj, self.duality_product);

        self.infeas_error = self.rb_conv.max(self.rc_conv).max(self.rh_conv);
        self.dimacs_error = self
            .infeas_error
            .max(self.rel_obj_gap)
            .max(self.rel_comp_gap);
    }
}
