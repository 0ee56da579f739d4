//! Solver error types.

use thiserror::Error;

/// Errors surfaced by the IPM driver and its linear-algebra collaborators.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Problem data or control parameters failed validation.
    #[error("invalid problem: {0}")]
    InvalidProblem(String),

    /// s or z left the cone interior at the top of an iteration.
    #[error("{s_nonpos} entries of s were nonpositive and {z_nonpos} entries of z were nonpositive")]
    InvalidIterate {
        /// Number of nonpositive entries of s
        s_nonpos: usize,
        /// Number of nonpositive entries of z
        z_nonpos: usize,
    },

    /// The KKT factorization broke down.
    #[error("KKT factorization failed: {0}")]
    FactorizationFailure(String),

    /// Iterative refinement could not reach the requested relative tolerance.
    #[error("refinement stalled at relative residual {rel_residual:.3e}")]
    RefinementFailure {
        /// Best relative residual reached by the two-stage solve
        rel_residual: f64,
    },

    /// Both primal and dual step lengths collapsed to zero.
    #[error("zero step in both primal and dual directions")]
    StagnatedStep,

    /// The iteration cap was reached with tolerances unmet.
    #[error("maximum number of iterations ({0}) exceeded without achieving tolerances")]
    IterationLimit(usize),
}
