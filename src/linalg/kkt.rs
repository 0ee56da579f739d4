//! Sparse KKT system assembly and solution.
//!
//! The saddle-point matrix for the affine-form QP is
//!
//! ```text
//!     [ Q + gx I      A^T          G^T        ]
//! J = [    A        -gy I           0         ]
//!     [    G           0     -(Z^-1 S + gz I) ]
//! ```
//!
//! with small regularizers (gx, gy, gz) folded into a static part that is
//! assembled exactly once. Only the z-block diagonal changes between
//! iterations, so the sparsity pattern is frozen and the symbolic
//! factorization amortizes over the whole IPM run.
//!
//! Factorization additionally applies a signed large-regularization
//! diagonal tau (positive on x-rows, negative on y- and z-rows, scaled by
//! a two-norm estimate of the problem stack): the factored matrix is
//! J_fact = J_orig + diag(tau), while the unregularized J_orig is retained
//! and iterative refinement solves against it.

use sprs::TriMat;
use sprs_suitesparse_camd::try_camd;

use super::backend::KktSystem;
use super::ldl::SparseLdl;
use super::nrm2;
use super::sparse::SparseCsc;
use crate::error::SolverError;
use crate::problem::{IpmCtrl, RegSolveCtrl};

/// || rhs - J x ||_2 for J stored as upper-triangle CSC arrays, leaving
/// the residual vector in `resid`.
fn residual_into(
    colptr: &[usize],
    rowval: &[usize],
    vals: &[f64],
    rhs: &[f64],
    x: &[f64],
    resid: &mut [f64],
) -> f64 {
    symm_matvec_upper(colptr, rowval, vals, x, resid);
    for i in 0..rhs.len() {
        resid[i] = rhs[i] - resid[i];
    }
    nrm2(resid)
}

/// y = J x for J stored as upper-triangle CSC arrays.
fn symm_matvec_upper(colptr: &[usize], rowval: &[usize], vals: &[f64], x: &[f64], y: &mut [f64]) {
    y.fill(0.0);
    let n = colptr.len() - 1;
    for col in 0..n {
        let xj = x[col];
        for idx in colptr[col]..colptr[col + 1] {
            let row = rowval[idx];
            let v = vals[idx];
            y[row] += v * xj;
            if row != col {
                y[col] += v * x[row];
            }
        }
    }
}

/// Permute an upper-triangle CSC matrix into upper-triangle CSC under the
/// symmetric permutation `iperm` (old index -> new index), sorting each
/// column by row.
fn permute_upper(
    n: usize,
    colptr: &[usize],
    rowval: &[usize],
    vals: &[f64],
    iperm: &[usize],
) -> (Vec<usize>, Vec<usize>, Vec<f64>) {
    let nnz = vals.len();
    let mut counts = vec![0usize; n];
    for col in 0..n {
        for idx in colptr[col]..colptr[col + 1] {
            let nr = iperm[rowval[idx]];
            let nc = iperm[col];
            counts[nr.max(nc)] += 1;
        }
    }

    let mut new_colptr = vec![0usize; n + 1];
    for c in 0..n {
        new_colptr[c + 1] = new_colptr[c] + counts[c];
    }

    let mut new_rowval = vec![0usize; nnz];
    let mut new_vals = vec![0.0; nnz];
    counts.fill(0);
    for col in 0..n {
        for idx in colptr[col]..colptr[col + 1] {
            let nr = iperm[rowval[idx]];
            let nc = iperm[col];
            let (r, c) = if nr <= nc { (nr, nc) } else { (nc, nr) };
            let pos = new_colptr[c] + counts[c];
            new_rowval[pos] = r;
            new_vals[pos] = vals[idx];
            counts[c] += 1;
        }
    }

    // Sort columns by row index.
    for c in 0..n {
        let start = new_colptr[c];
        let end = new_colptr[c + 1];
        let mut order: Vec<usize> = (start..end).collect();
        order.sort_by_key(|&i| new_rowval[i]);
        let rows: Vec<usize> = order.iter().map(|&i| new_rowval[i]).collect();
        let vs: Vec<f64> = order.iter().map(|&i| new_vals[i]).collect();
        new_rowval[start..end].copy_from_slice(&rows);
        new_vals[start..end].copy_from_slice(&vs);
    }

    (new_colptr, new_rowval, new_vals)
}

/// Sparse KKT solver with a frozen pattern and a persistent LDL handle.
pub struct SparseKkt {
    n: usize,
    m: usize,
    k: usize,

    /// Permutation: `perm[new] = old`.
    perm: Vec<usize>,

    /// Permuted static pattern and values (upper triangle).
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    static_vals: Vec<f64>,

    /// Position of the diagonal entry of original row i in `static_vals`.
    diag_pos: Vec<usize>,

    /// Signed large regularization, indexed by original row.
    reg_large: Vec<f64>,

    /// Values of J_orig (static + dynamic diagonal) and J_fact
    /// (J_orig + diag(tau)), refreshed each factorization.
    orig_vals: Vec<f64>,
    fact_vals: Vec<f64>,

    ldl: SparseLdl,

    two_stage: bool,
    solve_ctrl: RegSolveCtrl,

    /// Scratch for permuted right-hand sides and refinement.
    rhs_perm: Vec<f64>,
    sol_perm: Vec<f64>,
    resid: Vec<f64>,
    corr: Vec<f64>,
    trial: Vec<f64>,
}

impl SparseKkt {
    /// Assemble the static KKT part for (Q, A, G) and prepare the ordering
    /// and symbolic factorization. `norm_scale` is the two-norm estimate
    /// of the stacked problem data (plus one) that scales the large
    /// regularization.
    pub fn new(
        q: &SparseCsc,
        a: &SparseCsc,
        g: &SparseCsc,
        ctrl: &IpmCtrl,
        norm_scale: f64,
    ) -> Result<Self, SolverError> {
        let n = a.cols();
        let m = a.rows();
        let k = g.rows();
        let order = n + m + k;

        // Static entries, upper triangle. Every diagonal entry is added
        // explicitly (even when its regularizer is zero) so the pattern is
        // closed under the per-iteration diagonal update.
        let mut tri = TriMat::new((order, order));
        for (&val, (row, col)) in q.iter() {
            if row <= col {
                tri.add_triplet(row, col, val);
            }
        }
        for i in 0..n {
            tri.add_triplet(i, i, ctrl.x_reg_small);
        }
        for (&val, (row, col)) in a.iter() {
            tri.add_triplet(col, n + row, val);
        }
        for j in 0..m {
            tri.add_triplet(n + j, n + j, -ctrl.y_reg_small);
        }
        for (&val, (row, col)) in g.iter() {
            tri.add_triplet(col, n + m + row, val);
        }
        for i in 0..k {
            tri.add_triplet(n + m + i, n + m + i, -ctrl.z_reg_small);
        }
        let j_static: SparseCsc = tri.to_csc();

        // Fill-reducing ordering on the static pattern; identity when CAMD
        // is unavailable for the pattern.
        let (perm, iperm) = match try_camd(j_static.structure_view()) {
            Ok(p) => (p.vec(), p.inv_vec()),
            Err(_) => ((0..order).collect::<Vec<_>>(), (0..order).collect()),
        };

        let indptr = j_static.indptr();
        let (colptr, rowval, static_vals) = permute_upper(
            order,
            indptr.raw_storage(),
            j_static.indices(),
            j_static.data(),
            &iperm,
        );

        // Diagonal positions, indexed by original row.
        let mut diag_pos = vec![usize::MAX; order];
        for (orig, &new) in iperm.iter().enumerate() {
            for idx in colptr[new]..colptr[new + 1] {
                if rowval[idx] == new {
                    diag_pos[orig] = idx;
                    break;
                }
            }
        }
        debug_assert!(diag_pos.iter().all(|&p| p != usize::MAX));

        let mut reg_large = vec![0.0; order];
        for (i, r) in reg_large.iter_mut().enumerate() {
            *r = if i < n {
                ctrl.x_reg_large
            } else if i < n + m {
                -ctrl.y_reg_large
            } else {
                -ctrl.z_reg_large
            } * norm_scale;
        }

        let ldl = SparseLdl::new(order, colptr.clone(), rowval.clone())?;

        let nnz = static_vals.len();
        Ok(Self {
            n,
            m,
            k,
            perm,
            colptr,
            rowval,
            static_vals,
            diag_pos,
            reg_large,
            orig_vals: vec![0.0; nnz],
            fact_vals: vec![0.0; nnz],
            ldl,
            two_stage: ctrl.two_stage,
            solve_ctrl: ctrl.solve_ctrl,
            rhs_perm: vec![0.0; order],
            sol_perm: vec![0.0; order],
            resid: vec![0.0; order],
            corr: vec![0.0; order],
            trial: vec![0.0; order],
        })
    }

    fn order(&self) -> usize {
        self.n + self.m + self.k
    }

    /// One pass of factored-solve plus iterative refinement against
    /// J_orig. In conservative mode the correction is halved when it fails
    /// to reduce the residual. Returns (met_tolerance, relative residual).
    fn refined_solve(&mut self, conservative: bool) -> (bool, f64) {
        let order = self.order();
        let b_norm = nrm2(&self.rhs_perm);
        if b_norm == 0.0 {
            self.sol_perm.fill(0.0);
            return (true, 0.0);
        }

        self.sol_perm.copy_from_slice(&self.rhs_perm);
        self.ldl.solve_in_place(&mut self.sol_perm);

        let mut rel_res = residual_into(
            &self.colptr,
            &self.rowval,
            &self.orig_vals,
            &self.rhs_perm,
            &self.sol_perm,
            &mut self.resid,
        ) / b_norm;
        if !rel_res.is_finite() {
            return (false, f64::INFINITY);
        }

        for it in 0..self.solve_ctrl.max_refine_its {
            if rel_res <= self.solve_ctrl.rel_tol {
                break;
            }

            self.corr.copy_from_slice(&self.resid);
            self.ldl.solve_in_place(&mut self.corr);

            if conservative {
                let mut step = 1.0;
                let mut improved = false;
                for _ in 0..4 {
                    for i in 0..order {
                        self.trial[i] = self.sol_perm[i] + step * self.corr[i];
                    }
                    let trial_rel = residual_into(
                        &self.colptr,
                        &self.rowval,
                        &self.orig_vals,
                        &self.rhs_perm,
                        &self.trial,
                        &mut self.resid,
                    ) / b_norm;
                    if trial_rel.is_finite() && trial_rel < rel_res {
                        self.sol_perm.copy_from_slice(&self.trial);
                        // `resid` is now consistent with the accepted trial
                        rel_res = trial_rel;
                        improved = true;
                        break;
                    }
                    step *= 0.5;
                }
                if !improved {
                    break;
                }
            } else {
                for i in 0..order {
                    self.trial[i] = self.sol_perm[i] + self.corr[i];
                }
                let new_rel = residual_into(
                    &self.colptr,
                    &self.rowval,
                    &self.orig_vals,
                    &self.rhs_perm,
                    &self.trial,
                    &mut self.resid,
                ) / b_norm;
                if !new_rel.is_finite() || new_rel >= rel_res {
                    break;
                }
                self.sol_perm.copy_from_slice(&self.trial);
                rel_res = new_rel;
            }

            if self.solve_ctrl.progress {
                eprintln!("  refine {:2}: rel residual {:.3e}", it + 1, rel_res);
            }
        }

        (rel_res <= self.solve_ctrl.rel_tol, rel_res)
    }
}

impl KktSystem for SparseKkt {
    fn factor(&mut self, s: &[f64], z: &[f64]) -> Result<(), SolverError> {
        assert_eq!(s.len(), self.k);
        assert_eq!(z.len(), self.k);

        self.orig_vals.copy_from_slice(&self.static_vals);
        for i in 0..self.k {
            self.orig_vals[self.diag_pos[self.n + self.m + i]] -= s[i] / z[i];
        }

        self.fact_vals.copy_from_slice(&self.orig_vals);
        for i in 0..self.order() {
            self.fact_vals[self.diag_pos[i]] += self.reg_large[i];
        }

        self.ldl.refactor(&self.fact_vals)
    }

    fn solve(&mut self, d: &mut [f64]) -> Result<(), SolverError> {
        let order = self.order();
        assert_eq!(d.len(), order);

        for new in 0..order {
            self.rhs_perm[new] = d[self.perm[new]];
        }

        let (mut met, mut rel_res) = if self.two_stage {
            self.refined_solve(false)
        } else {
            (false, f64::INFINITY)
        };
        if !met {
            let (met2, rel2) = self.refined_solve(true);
            met = met2;
            rel_res = rel2;
        }
        if !met {
            return Err(SolverError::RefinementFailure { rel_residual: rel_res });
        }

        for new in 0..order {
            d[self.perm[new]] = self.sol_perm[new];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::sparse::from_triplets;
    use crate::problem::IpmCtrl;

    fn small_ctrl() -> IpmCtrl {
        IpmCtrl {
            x_reg_small: 1e-10,
            y_reg_small: 1e-10,
            z_reg_small: 1e-10,
            x_reg_large: 1e-8,
            y_reg_large: 1e-8,
            z_reg_large: 1e-8,
            ..IpmCtrl::default()
        }
    }

    #[test]
    fn test_factor_and_solve_small_qp() {
        // n = 2, m = 1, k = 2:
        //   Q = I, A = [1, 1], G = -I.
        let q = from_triplets(2, 2, vec![(0, 0, 1.0), (1, 1, 1.0)]);
        let a = from_triplets(1, 2, vec![(0, 0, 1.0), (0, 1, 1.0)]);
        let g = from_triplets(2, 2, vec![(0, 0, -1.0), (1, 1, -1.0)]);

        let ctrl = small_ctrl();
        let mut kkt = SparseKkt::new(&q, &a, &g, &ctrl, 1.0).unwrap();

        let s = vec![1.0, 2.0];
        let z = vec![1.0, 0.5];
        kkt.factor(&s, &z).unwrap();

        let rhs = vec![1.0, -1.0, 0.5, 0.0, 2.0];
        let mut d = rhs.clone();
        kkt.solve(&mut d).unwrap();

        // Verify against the dense J (ignoring the small regularizers,
        // which sit far below the check tolerance).
        let full = [
            [1.0, 0.0, 1.0, -1.0, 0.0],
            [0.0, 1.0, 1.0, 0.0, -1.0],
            [1.0, 1.0, 0.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0, -1.0, 0.0],
            [0.0, -1.0, 0.0, 0.0, -4.0],
        ];
        for i in 0..5 {
            let mut jd = 0.0;
            for j in 0..5 {
                jd += full[i][j] * d[j];
            }
            assert!(
                (jd - rhs[i]).abs() < 1e-6,
                "row {}: J d = {}, rhs = {}",
                i,
                jd,
                rhs[i]
            );
        }
    }

    #[test]
    fn test_refactor_across_iterations() {
        let q = from_triplets(1, 1, vec![(0, 0, 2.0)]);
        let a = from_triplets(0, 1, vec![]);
        let g = from_triplets(1, 1, vec![(0, 0, -1.0)]);

        let ctrl = small_ctrl();
        let mut kkt = SparseKkt::new(&q, &a, &g, &ctrl, 1.0).unwrap();

        for (si, zi) in [(1.0, 1.0), (0.5, 2.0), (1e-3, 1e3)] {
            kkt.factor(&[si], &[zi]).unwrap();
            let mut d = vec![1.0, 1.0];
            kkt.solve(&mut d).unwrap();

            // J = [[2, -1], [-1, -s/z]], J^-1 = [[-h, 1], [1, 2]] / det
            let h = si / zi;
            let det = -2.0 * h - 1.0;
            let expect0 = (1.0 - h) / det;
            let expect1 = 3.0 / det;
            assert!((d[0] - expect0).abs() < 1e-6, "dx {} vs {}", d[0], expect0);
            assert!((d[1] - expect1).abs() < 1e-6, "dz {} vs {}", d[1], expect1);
        }
    }

    #[test]
    fn test_zero_rhs() {
        let q = from_triplets(1, 1, vec![(0, 0, 1.0)]);
        let a = from_triplets(0, 1, vec![]);
        let g = from_triplets(1, 1, vec![(0, 0, -1.0)]);
        let ctrl = small_ctrl();
        let mut kkt = SparseKkt::new(&q, &a, &g, &ctrl, 1.0).unwrap();
        kkt.factor(&[1.0], &[1.0]).unwrap();
        let mut d = vec![0.0, 0.0];
        kkt.solve(&mut d).unwrap();
        assert_eq!(d, vec![0.0, 0.0]);
    }
}
