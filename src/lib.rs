//! Orthant: a primal-dual interior-point solver for convex quadratic
//! programs in affine conic form
//!
//! ```text
//! minimize    (1/2) x^T Q x + c^T x
//! subject to  A x = b,  G x + s = h,  s >= 0,
//! ```
//!
//! with dual variables y (equalities) and z >= 0 (inequalities). The
//! inequality cone is the nonnegative orthant; the direct form is the
//! special case G = -I, h = 0.
//!
//! # Algorithm
//!
//! A Mehrotra predictor-corrector method: each iteration linearizes the
//! regularized KKT conditions, factors one symmetric quasi-definite
//! saddle-point matrix, and reuses the factorization for the affine
//! (predictor) and combined (corrector) directions. Supporting machinery:
//!
//! - **Stacked Ruiz equilibration** of [A; G] for conditioning
//! - **Static/dynamic KKT split** in the sparse path, so the symbolic
//!   factorization amortizes over all iterations
//! - **Two-stage regularized solves** with iterative refinement against
//!   the unregularized system
//! - **DIMACS-style convergence gating** on relative residuals and gaps
//!
//! # Backends
//!
//! Problem data is either dense ([`DenseQp`], factored by faer's pivoted
//! Bunch-Kaufman LDL^T) or sparse CSC ([`SparseQp`], factored by a
//! CAMD-ordered sparse LDL^T). The driver is generic over the
//! [`ipm::QpBackend`] capability trait.
//!
//! # Example
//!
//! ```ignore
//! use orthant::{ipm_sparse, IpmCtrl, Iterates, SparseQp};
//! use orthant::linalg::sparse::from_triplets;
//!
//! // min x1 + x2  s.t.  x = (1, 1), x >= 0
//! let qp = SparseQp {
//!     q: from_triplets(2, 2, vec![]),
//!     a: from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0)]),
//!     g: from_triplets(2, 2, vec![(0, 0, -1.0), (1, 1, -1.0)]),
//!     b: vec![1.0, 1.0],
//!     c: vec![1.0, 1.0],
//!     h: vec![0.0, 0.0],
//! };
//! let mut vars = Iterates::zeros(2, 2, 2);
//! let stats = ipm_sparse(&qp, &mut vars, &IpmCtrl::default())?;
//! ```

#![warn(clippy::all)]
#![allow(clippy::too_many_arguments)]

pub mod equil;
pub mod error;
pub mod ipm;
pub mod linalg;
pub mod problem;

pub use error::SolverError;
pub use ipm::{ipm_dense, ipm_sparse};
pub use problem::{
    mehrotra_centrality, CentralityRule, DenseQp, EquilCtrl, IpmCtrl, Iterates, RegSolveCtrl,
    SolveStats, SparseQp,
};
