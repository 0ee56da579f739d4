//! Problem data structures, solver configuration, and the storage
//! backends.
//!
//! The solver works with the affine conic formulation
//!
//! ```text
//! minimize    (1/2) x^T Q x + c^T x
//! subject to  A x = b,  G x + s = h,  s >= 0,
//! ```
//!
//! with dual variables y (equalities) and z >= 0 (inequalities).
//!
//! # Dimensions
//!
//! - `n`: primal variables (length of x and c)
//! - `m`: equality constraints (rows of A, length of b and y)
//! - `k`: inequality constraints (rows of G, length of h, s, and z)

use faer::Mat;

use crate::equil::{self, RuizScaling};
use crate::error::SolverError;
use crate::ipm::QpBackend;
use crate::linalg::dense::{self, symmetric_two_norm_estimate, two_norm_estimate};
use crate::linalg::dense_kkt::DenseKkt;
use crate::linalg::kkt::SparseKkt;
use crate::linalg::sparse::{self, SparseCsc};

/// Dense problem data. Q is referenced through its lower triangle only;
/// anything above the diagonal is ignored.
#[derive(Clone)]
pub struct DenseQp {
    /// Quadratic cost (n x n, PSD, lower triangle referenced)
    pub q: Mat<f64>,
    /// Equality constraint matrix (m x n)
    pub a: Mat<f64>,
    /// Inequality constraint matrix (k x n)
    pub g: Mat<f64>,
    /// Equality right-hand side (length m)
    pub b: Vec<f64>,
    /// Linear cost (length n)
    pub c: Vec<f64>,
    /// Inequality right-hand side (length k)
    pub h: Vec<f64>,
}

/// Sparse problem data in CSC format. Q must carry its full symmetric
/// pattern; this is asserted at ingestion.
#[derive(Clone)]
pub struct SparseQp {
    /// Quadratic cost (n x n, PSD, explicitly symmetric)
    pub q: SparseCsc,
    /// Equality constraint matrix (m x n)
    pub a: SparseCsc,
    /// Inequality constraint matrix (k x n)
    pub g: SparseCsc,
    /// Equality right-hand side (length m)
    pub b: Vec<f64>,
    /// Linear cost (length n)
    pub c: Vec<f64>,
    /// Inequality right-hand side (length k)
    pub h: Vec<f64>,
}

/// Primal-dual iterates. Read on entry when the corresponding init flag is
/// set, written with the solution on success.
#[derive(Debug, Clone)]
pub struct Iterates {
    /// Primal variables (length n)
    pub x: Vec<f64>,
    /// Equality duals (length m)
    pub y: Vec<f64>,
    /// Inequality duals (length k), z > 0 inside the loop
    pub z: Vec<f64>,
    /// Primal slacks (length k), s > 0 inside the loop
    pub s: Vec<f64>,
}

impl Iterates {
    /// Zero-initialized iterates with the right shapes.
    pub fn zeros(n: usize, m: usize, k: usize) -> Self {
        Self {
            x: vec![0.0; n],
            y: vec![0.0; m],
            z: vec![0.0; k],
            s: vec![0.0; k],
        }
    }

    pub(crate) fn check_dims(&self, n: usize, m: usize, k: usize) -> Result<(), SolverError> {
        if self.x.len() != n || self.y.len() != m || self.z.len() != k || self.s.len() != k {
            return Err(SolverError::InvalidProblem(format!(
                "iterate shapes ({}, {}, {}, {}) do not match problem dims n={}, m={}, k={}",
                self.x.len(),
                self.y.len(),
                self.z.len(),
                self.s.len(),
                n,
                m,
                k
            )));
        }
        Ok(())
    }
}

/// Centrality rule: (mu, mu_aff, alpha_aff_pri, alpha_aff_dual) -> sigma.
pub type CentralityRule = fn(f64, f64, f64, f64) -> f64;

/// Mehrotra's centering heuristic, sigma = (mu_aff / mu)^3. The value is
/// deliberately not clipped here; the caller decides what to do with
/// out-of-range sigma.
pub fn mehrotra_centrality(mu: f64, mu_aff: f64, _alpha_pri: f64, _alpha_dual: f64) -> f64 {
    if mu <= 0.0 || !mu.is_finite() || !mu_aff.is_finite() {
        return 0.0;
    }
    (mu_aff / mu).max(0.0).powi(3)
}

/// Parameters for the two-stage regularized refinement solve.
#[derive(Debug, Clone, Copy)]
pub struct RegSolveCtrl {
    /// Relative residual target for each KKT solve
    pub rel_tol: f64,
    /// Refinement iteration cap per stage
    pub max_refine_its: usize,
    /// Print per-step refinement residuals
    pub progress: bool,
}

impl Default for RegSolveCtrl {
    fn default() -> Self {
        Self {
            rel_tol: f64::EPSILON.sqrt(),
            max_refine_its: 8,
            progress: false,
        }
    }
}

/// Parameters for the stacked Ruiz equilibration sweep.
#[derive(Debug, Clone, Copy)]
pub struct EquilCtrl {
    /// Sweep cap
    pub max_iters: usize,
    /// Row/column norms within `tol` of one stop the sweep early
    pub tol: f64,
}

impl Default for EquilCtrl {
    fn default() -> Self {
        Self {
            max_iters: 6,
            tol: 0.01,
        }
    }
}

/// Solver configuration.
#[derive(Debug, Clone)]
pub struct IpmCtrl {
    /// Treat the input (x, s) as a warm start
    pub primal_init: bool,
    /// Treat the input (y, z) as a warm start
    pub dual_init: bool,
    /// Mehrotra-style positive shift of (s, z) in the initializer
    pub standard_init_shift: bool,
    /// Stacked Ruiz equilibration of (A, G, Q, b, c, h)
    pub outer_equil: bool,

    /// Hard iteration cap
    pub max_its: usize,
    /// Target for max of the three relative residual norms
    pub infeasibility_tol: f64,
    /// Target for the relative objective gap
    pub relative_objective_gap_tol: f64,
    /// Target for the relative complementarity gap
    pub relative_complementarity_gap_tol: f64,
    /// Minimum DIMACS progress ratio for continuing once tolerances hold
    pub min_dimacs_decrease_ratio: f64,

    /// Fraction-to-boundary back-off, in (0, 1)
    pub max_step_ratio: f64,
    /// Force alpha_pri = alpha_dual = min of the two
    pub force_same_step: bool,
    /// Add the dsAff o dzAff corrector term to r_mu
    pub mehrotra: bool,
    /// Centering parameter rule
    pub centrality_rule: CentralityRule,

    /// Inner SQD regularization on the x-block diagonal
    pub x_reg_small: f64,
    /// Inner SQD regularization on the y-block diagonal
    pub y_reg_small: f64,
    /// Inner SQD regularization on the z-block diagonal
    pub z_reg_small: f64,
    /// Refinement-stage regularization on the x-block, scaled by the
    /// stacked norm estimate
    pub x_reg_large: f64,
    /// Refinement-stage regularization on the y-block
    pub y_reg_large: f64,
    /// Refinement-stage regularization on the z-block
    pub z_reg_large: f64,

    /// Fast first-stage solve before the conservative refinement
    pub two_stage: bool,
    /// Inner refinement parameters
    pub solve_ctrl: RegSolveCtrl,
    /// Power-iteration steps for the two-norm estimates of Q, A, G
    pub two_norm_krylov_basis_size: usize,
    /// Equilibration sweep parameters
    pub equil_ctrl: EquilCtrl,

    /// Per-iteration progress output
    pub print: bool,
    /// Phase timing output
    pub time: bool,
    /// Check the affine direction against the linearized KKT residuals
    pub check_residuals: bool,
}

impl Default for IpmCtrl {
    fn default() -> Self {
        let eps = f64::EPSILON;
        Self {
            primal_init: false,
            dual_init: false,
            standard_init_shift: true,
            outer_equil: true,
            max_its: 100,
            infeasibility_tol: 1e-8,
            relative_objective_gap_tol: 1e-8,
            relative_complementarity_gap_tol: 1e-8,
            min_dimacs_decrease_ratio: 0.99,
            max_step_ratio: 0.99,
            force_same_step: true,
            mehrotra: true,
            centrality_rule: mehrotra_centrality,
            x_reg_small: eps.powf(0.75),
            y_reg_small: eps.powf(0.75),
            z_reg_small: eps.powf(0.75),
            x_reg_large: eps.sqrt(),
            y_reg_large: eps.sqrt(),
            z_reg_large: eps.sqrt(),
            two_stage: true,
            solve_ctrl: RegSolveCtrl::default(),
            two_norm_krylov_basis_size: 15,
            equil_ctrl: EquilCtrl::default(),
            print: false,
            time: false,
            check_residuals: false,
        }
    }
}

impl IpmCtrl {
    pub(crate) fn validate(&self) -> Result<(), SolverError> {
        if !(self.max_step_ratio > 0.0 && self.max_step_ratio < 1.0) {
            return Err(SolverError::InvalidProblem(format!(
                "max_step_ratio must lie in (0, 1), got {}",
                self.max_step_ratio
            )));
        }
        for (name, tol) in [
            ("infeasibility_tol", self.infeasibility_tol),
            ("relative_objective_gap_tol", self.relative_objective_gap_tol),
            (
                "relative_complementarity_gap_tol",
                self.relative_complementarity_gap_tol,
            ),
            ("solve_ctrl.rel_tol", self.solve_ctrl.rel_tol),
        ] {
            if !(tol > 0.0) {
                return Err(SolverError::InvalidProblem(format!(
                    "{} must be positive, got {}",
                    name, tol
                )));
            }
        }
        for (name, reg) in [
            ("x_reg_small", self.x_reg_small),
            ("y_reg_small", self.y_reg_small),
            ("z_reg_small", self.z_reg_small),
            ("x_reg_large", self.x_reg_large),
            ("y_reg_large", self.y_reg_large),
            ("z_reg_large", self.z_reg_large),
        ] {
            if !(reg >= 0.0) {
                return Err(SolverError::InvalidProblem(format!(
                    "{} must be nonnegative, got {}",
                    name, reg
                )));
            }
        }
        Ok(())
    }
}

/// Final solve diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct SolveStats {
    /// Iterations completed
    pub iterations: usize,
    /// Final primal objective
    pub primal_obj: f64,
    /// Final dual objective
    pub dual_obj: f64,
    /// Final relative objective gap
    pub rel_obj_gap: f64,
    /// Final relative complementarity gap
    pub rel_comp_gap: f64,
    /// Final max relative residual norm
    pub infeas_error: f64,
    /// Final DIMACS error
    pub dimacs_error: f64,
    /// Final barrier parameter
    pub mu: f64,
}

impl DenseQp {
    fn check_dims(&self) -> Result<(), SolverError> {
        let n = self.a.ncols();
        let m = self.a.nrows();
        let k = self.g.nrows();
        if self.q.nrows() != n || self.q.ncols() != n {
            return Err(SolverError::InvalidProblem(format!(
                "Q has shape {}x{}, expected {}x{}",
                self.q.nrows(),
                self.q.ncols(),
                n,
                n
            )));
        }
        if self.g.ncols() != n {
            return Err(SolverError::InvalidProblem(format!(
                "G has {} cols, expected {}",
                self.g.ncols(),
                n
            )));
        }
        if self.b.len() != m || self.c.len() != n || self.h.len() != k {
            return Err(SolverError::InvalidProblem(format!(
                "vector lengths (b={}, c={}, h={}) do not match dims m={}, n={}, k={}",
                self.b.len(),
                self.c.len(),
                self.h.len(),
                m,
                n,
                k
            )));
        }
        Ok(())
    }
}

impl SparseQp {
    fn check_dims(&self) -> Result<(), SolverError> {
        let n = self.a.cols();
        let m = self.a.rows();
        let k = self.g.rows();
        if self.q.rows() != n || self.q.cols() != n {
            return Err(SolverError::InvalidProblem(format!(
                "Q has shape {}x{}, expected {}x{}",
                self.q.rows(),
                self.q.cols(),
                n,
                n
            )));
        }
        if !sparse::is_explicitly_symmetric(&self.q, 1e-12) {
            return Err(SolverError::InvalidProblem(
                "sparse Q must be explicitly symmetric (full pattern)".into(),
            ));
        }
        if self.g.cols() != n {
            return Err(SolverError::InvalidProblem(format!(
                "G has {} cols, expected {}",
                self.g.cols(),
                n
            )));
        }
        if self.b.len() != m || self.c.len() != n || self.h.len() != k {
            return Err(SolverError::InvalidProblem(format!(
                "vector lengths (b={}, c={}, h={}) do not match dims m={}, n={}, k={}",
                self.b.len(),
                self.c.len(),
                self.h.len(),
                m,
                n,
                k
            )));
        }
        Ok(())
    }
}

impl QpBackend for DenseQp {
    type Kkt = DenseKkt;

    fn dims(&self) -> (usize, usize, usize) {
        (self.a.ncols(), self.a.nrows(), self.g.nrows())
    }

    fn validate(&self) -> Result<(), SolverError> {
        self.check_dims()
    }

    fn b(&self) -> &[f64] {
        &self.b
    }
    fn c(&self) -> &[f64] {
        &self.c
    }
    fn h(&self) -> &[f64] {
        &self.h
    }

    fn mul_q(&self, x: &[f64], out: &mut [f64]) {
        dense::hemv_lower(&self.q, x, out);
    }
    fn mul_a(&self, x: &[f64], out: &mut [f64]) {
        dense::gemv(&self.a, x, out);
    }
    fn mul_at(&self, y: &[f64], out: &mut [f64]) {
        dense::gemv_transpose(&self.a, y, out);
    }
    fn mul_g(&self, x: &[f64], out: &mut [f64]) {
        dense::gemv(&self.g, x, out);
    }
    fn mul_gt(&self, z: &[f64], out: &mut [f64]) {
        dense::gemv_transpose(&self.g, z, out);
    }

    fn equilibrate(&mut self, ctrl: &EquilCtrl) -> RuizScaling {
        equil::equilibrate_dense(
            &mut self.q,
            &mut self.a,
            &mut self.g,
            &mut self.b,
            &mut self.c,
            &mut self.h,
            ctrl,
        )
    }

    fn build_kkt(&self, ctrl: &IpmCtrl) -> Result<Self::Kkt, SolverError> {
        Ok(DenseKkt::new(&self.q, &self.a, &self.g, ctrl))
    }

    fn log_norms(&self, _ctrl: &IpmCtrl) {
        println!(
            "|| Q ||_1 = {:.6e}",
            dense::hermitian_one_norm_lower(&self.q)
        );
        println!("|| A ||_1 = {:.6e}", dense::one_norm(&self.a));
        println!("|| G ||_1 = {:.6e}", dense::one_norm(&self.g));
    }
}

impl QpBackend for SparseQp {
    type Kkt = SparseKkt;

    fn dims(&self) -> (usize, usize, usize) {
        (self.a.cols(), self.a.rows(), self.g.rows())
    }

    fn validate(&self) -> Result<(), SolverError> {
        self.check_dims()
    }

    fn b(&self) -> &[f64] {
        &self.b
    }
    fn c(&self) -> &[f64] {
        &self.c
    }
    fn h(&self) -> &[f64] {
        &self.h
    }

    fn mul_q(&self, x: &[f64], out: &mut [f64]) {
        sparse::spmv_symmetric(&self.q, x, out);
    }
    fn mul_a(&self, x: &[f64], out: &mut [f64]) {
        sparse::spmv(&self.a, x, out);
    }
    fn mul_at(&self, y: &[f64], out: &mut [f64]) {
        sparse::spmv_transpose(&self.a, y, out);
    }
    fn mul_g(&self, x: &[f64], out: &mut [f64]) {
        sparse::spmv(&self.g, x, out);
    }
    fn mul_gt(&self, z: &[f64], out: &mut [f64]) {
        sparse::spmv_transpose(&self.g, z, out);
    }

    fn equilibrate(&mut self, ctrl: &EquilCtrl) -> RuizScaling {
        equil::equilibrate_sparse(
            &mut self.q,
            &mut self.a,
            &mut self.g,
            &mut self.b,
            &mut self.c,
            &mut self.h,
            ctrl,
        )
    }

    fn build_kkt(&self, ctrl: &IpmCtrl) -> Result<Self::Kkt, SolverError> {
        let norm_scale = self.stacked_norm_estimate(ctrl.two_norm_krylov_basis_size);
        SparseKkt::new(&self.q, &self.a, &self.g, ctrl, norm_scale)
    }

    fn log_norms(&self, ctrl: &IpmCtrl) {
        let basis = ctrl.two_norm_krylov_basis_size;
        let n = self.a.cols();
        println!(
            "|| Q ||_2 estimate: {:.6e}",
            symmetric_two_norm_estimate(n, basis, |x, y| sparse::spmv_symmetric(&self.q, x, y))
        );
        println!(
            "|| A ||_2 estimate: {:.6e}",
            two_norm_estimate(
                self.a.rows(),
                n,
                basis,
                |x, y| sparse::spmv(&self.a, x, y),
                |x, y| sparse::spmv_transpose(&self.a, x, y),
            )
        );
        println!(
            "|| G ||_2 estimate: {:.6e}",
            two_norm_estimate(
                self.g.rows(),
                n,
                basis,
                |x, y| sparse::spmv(&self.g, x, y),
                |x, y| sparse::spmv_transpose(&self.g, x, y),
            )
        );
    }
}

impl SparseQp {
    /// Two-norm estimate of the stacked problem data, plus one; scales the
    /// large regularization.
    pub(crate) fn stacked_norm_estimate(&self, basis: usize) -> f64 {
        let n = self.a.cols();
        let est_q =
            symmetric_two_norm_estimate(n, basis, |x, y| sparse::spmv_symmetric(&self.q, x, y));
        let est_a = two_norm_estimate(
            self.a.rows(),
            n,
            basis,
            |x, y| sparse::spmv(&self.a, x, y),
            |x, y| sparse::spmv_transpose(&self.a, x, y),
        );
        let est_g = two_norm_estimate(
            self.g.rows(),
            n,
            basis,
            |x, y| sparse::spmv(&self.g, x, y),
            |x, y| sparse::spmv_transpose(&self.g, x, y),
        );
        est_q + est_a + est_g + 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;

    #[test]
    fn test_sparse_validation_rejects_asymmetric_q() {
        let qp = SparseQp {
            q: from_triplets(2, 2, vec![(0, 1, 1.0)]),
            a: from_triplets(0, 2, vec![]),
            g: from_triplets(1, 2, vec![(0, 0, 1.0)]),
            b: vec![],
            c: vec![0.0, 0.0],
            h: vec![1.0],
        };
        assert!(qp.validate().is_err());
    }

    #[test]
    fn test_sparse_validation_accepts_symmetric_q() {
        let qp = SparseQp {
            q: from_triplets(2, 2, vec![(0, 1, 1.0), (1, 0, 1.0), (0, 0, 2.0)]),
            a: from_triplets(0, 2, vec![]),
            g: from_triplets(1, 2, vec![(0, 0, 1.0)]),
            b: vec![],
            c: vec![0.0, 0.0],
            h: vec![1.0],
        };
        assert!(qp.validate().is_ok());
    }

    #[test]
    fn test_dense_validation_rejects_bad_shapes() {
        let qp = DenseQp {
            q: Mat::zeros(2, 2),
            a: Mat::zeros(1, 2),
            g: Mat::zeros(1, 2),
            b: vec![0.0, 0.0], // wrong: m = 1
            c: vec![0.0, 0.0],
            h: vec![0.0],
        };
        assert!(qp.validate().is_err());
    }

    #[test]
    fn test_ctrl_validation() {
        let mut ctrl = IpmCtrl::default();
        assert!(ctrl.validate().is_ok());
        ctrl.max_step_ratio = 1.0;
        assert!(ctrl.validate().is_err());

        let mut ctrl = IpmCtrl::default();
        ctrl.x_reg_large = -1.0;
        assert!(ctrl.validate().is_err());
    }

    #[test]
    fn test_mehrotra_centrality() {
        // mu_aff far below mu: aggressive step, sigma near zero.
        assert!(mehrotra_centrality(1.0, 1e-3, 0.9, 0.9) < 1e-8);
        // No progress: sigma near one.
        assert!((mehrotra_centrality(1.0, 1.0, 0.0, 0.0) - 1.0).abs() < 1e-12);
        // Degenerate mu.
        assert_eq!(mehrotra_centrality(0.0, 1.0, 0.5, 0.5), 0.0);
    }
}
