//! Sparse LDL^T factorization wrapper.
//!
//! Thin interface over the `ldl` crate for symmetric quasi-definite
//! systems stored as upper-triangle CSC arrays. The elimination tree is
//! computed once per sparsity pattern; subsequent factorizations are
//! numeric-only, which is what lets the IPM amortize the symbolic phase
//! over all of its iterations.

use crate::error::SolverError;

/// Persistent LDL factorization state for a fixed sparsity pattern.
pub struct SparseLdl {
    n: usize,

    /// Column pointers and row indices of the upper triangle (frozen).
    a_p: Vec<usize>,
    a_i: Vec<usize>,

    /// Elimination tree and per-column nonzero counts of L.
    etree: Vec<Option<usize>>,
    l_nz: Vec<usize>,

    /// L in CSC format plus D and its inverse.
    l_p: Vec<usize>,
    l_i: Vec<usize>,
    l_x: Vec<f64>,
    d: Vec<f64>,
    d_inv: Vec<f64>,

    /// Reusable factorization workspaces.
    bwork: Vec<ldl::Marker>,
    iwork: Vec<usize>,
    fwork: Vec<f64>,

    factored: bool,
}

impl SparseLdl {
    /// Run the symbolic analysis for the pattern given by (`a_p`, `a_i`),
    /// the upper triangle of an n x n matrix in CSC form.
    pub fn new(n: usize, a_p: Vec<usize>, a_i: Vec<usize>) -> Result<Self, SolverError> {
        assert_eq!(a_p.len(), n + 1);

        let mut work = vec![0usize; n];
        let mut l_nz = vec![0usize; n];
        let mut etree = vec![None; n];

        ldl::etree(n, &a_p, &a_i, &mut work, &mut l_nz, &mut etree).map_err(|_| {
            SolverError::FactorizationFailure(
                "elimination tree construction failed (pattern is not upper triangular)".into(),
            )
        })?;

        let nnz_l: usize = l_nz.iter().sum();

        Ok(Self {
            n,
            a_p,
            a_i,
            etree,
            l_nz,
            l_p: vec![0; n + 1],
            l_i: vec![0; nnz_l],
            l_x: vec![0.0; nnz_l],
            d: vec![0.0; n],
            d_inv: vec![0.0; n],
            bwork: vec![ldl::Marker::Unused; n],
            iwork: vec![0; 3 * n],
            fwork: vec![0.0; n],
            factored: false,
        })
    }

    /// Numeric factorization with fresh values on the frozen pattern.
    pub fn refactor(&mut self, a_x: &[f64]) -> Result<(), SolverError> {
        assert_eq!(a_x.len(), self.a_i.len());

        self.bwork.fill(ldl::Marker::Unused);
        self.iwork.fill(0);
        self.fwork.fill(0.0);

        ldl::factor(
            self.n,
            &self.a_p,
            &self.a_i,
            a_x,
            &mut self.l_p,
            &mut self.l_i,
            &mut self.l_x,
            &mut self.d,
            &mut self.d_inv,
            &self.l_nz,
            &self.etree,
            &mut self.bwork,
            &mut self.iwork,
            &mut self.fwork,
        )
        .map_err(|_| SolverError::FactorizationFailure("numeric LDL breakdown".into()))?;

        for i in 0..self.n {
            if self.d[i] == 0.0 || !self.d[i].is_finite() {
                self.factored = false;
                return Err(SolverError::FactorizationFailure(format!(
                    "pivot {} is {} after factorization",
                    i, self.d[i]
                )));
            }
        }

        self.factored = true;
        Ok(())
    }

    /// Solve L D L^T x = b. `x` holds b on entry and the solution on
    /// return.
    pub fn solve_in_place(&self, x: &mut [f64]) {
        assert!(self.factored, "solve before successful factorization");
        assert_eq!(x.len(), self.n);
        ldl::solve(self.n, &self.l_p, &self.l_i, &self.l_x, &self.d_inv, x);
    }

    /// Pivots of the most recent factorization.
    pub fn pivots(&self) -> &[f64] {
        &self.d
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;

    fn upper_csc_arrays(
        n: usize,
        triplets: Vec<(usize, usize, f64)>,
    ) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let mat = from_triplets(n, n, triplets);
        let indptr = mat.indptr();
        (
            indptr.raw_storage().to_vec(),
            mat.indices().to_vec(),
            mat.data().to_vec(),
        )
    }

    #[test]
    fn test_positive_definite_solve() {
        // [[2, 1], [1, 2]] x = [3, 3] has solution [1, 1].
        let (a_p, a_i, a_x) = upper_csc_arrays(2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 2.0)]);

        let mut ldl = SparseLdl::new(2, a_p, a_i).unwrap();
        ldl.refactor(&a_x).unwrap();

        let mut x = vec![3.0, 3.0];
        ldl.solve_in_place(&mut x);
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_quasi_definite_solve() {
        // Saddle system [[1, 0, 1], [0, 1, 1], [1, 1, -1]].
        let (a_p, a_i, a_x) = upper_csc_arrays(
            3,
            vec![
                (0, 0, 1.0),
                (1, 1, 1.0),
                (0, 2, 1.0),
                (1, 2, 1.0),
                (2, 2, -1.0),
            ],
        );

        let mut ldl = SparseLdl::new(3, a_p, a_i).unwrap();
        ldl.refactor(&a_x).unwrap();

        // D must carry both signs for a quasi-definite matrix.
        assert!(ldl.pivots().iter().any(|&d| d > 0.0));
        assert!(ldl.pivots().iter().any(|&d| d < 0.0));

        let b = vec![1.0, 2.0, 1.0];
        let mut x = b.clone();
        ldl.solve_in_place(&mut x);

        // Residual check against the full symmetric matrix.
        let full = [
            [1.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, -1.0],
        ];
        for i in 0..3 {
            let mut ax = 0.0;
            for j in 0..3 {
                ax += full[i][j] * x[j];
            }
            assert!((ax - b[i]).abs() < 1e-12, "residual row {}", i);
        }
    }

    #[test]
    fn test_refactor_reuses_pattern() {
        let (a_p, a_i, a_x) = upper_csc_arrays(2, vec![(0, 0, 2.0), (0, 1, 1.0), (1, 1, 2.0)]);
        let mut ldl = SparseLdl::new(2, a_p, a_i).unwrap();
        ldl.refactor(&a_x).unwrap();

        // Same pattern, scaled values.
        let a_x2: Vec<f64> = a_x.iter().map(|v| 2.0 * v).collect();
        ldl.refactor(&a_x2).unwrap();

        let mut x = vec![6.0, 6.0];
        ldl.solve_in_place(&mut x);
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_fails() {
        let (a_p, a_i, a_x) = upper_csc_arrays(2, vec![(0, 0, 1.0), (0, 1, 1.0), (1, 1, 1.0)]);
        let mut ldl = SparseLdl::new(2, a_p, a_i).unwrap();
        // [[1, 1], [1, 1]] is singular: the second pivot vanishes.
        assert!(ldl.refactor(&a_x).is_err());
    }
}
