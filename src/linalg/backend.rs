//! Backend trait for the per-iteration KKT factor/solve cycle.

use crate::error::SolverError;

/// One KKT system per driver invocation: factored once per IPM iteration
/// with the current slack/dual pair, then solved twice (affine and
/// combined right-hand sides) against the same factorization.
pub trait KktSystem {
    /// Refactor the system for the current iterates. Sparse
    /// implementations perform their symbolic analysis on the first call
    /// and reuse it afterwards; only numeric values change.
    fn factor(&mut self, s: &[f64], z: &[f64]) -> Result<(), SolverError>;

    /// Solve J d = rhs in place; `d` holds the right-hand side on entry
    /// and the solution on return, ordered as (x-block, y-block, z-block).
    fn solve(&mut self, d: &mut [f64]) -> Result<(), SolverError>;
}
