//! Dense KKT system assembly and solution.
//!
//! The dense path rebuilds the full saddle matrix every iteration and
//! factors it with faer's pivoted Bunch-Kaufman LDL^T. The factorization
//! is reused for the affine and the combined right-hand side; no
//! large-regularization split is needed because the pivoted factorization
//! handles the quasi-definite structure directly.

use faer::linalg::solvers::{Lblt, Solve};
use faer::{Mat, Side};

use super::all_finite;
use super::backend::KktSystem;
use crate::error::SolverError;
use crate::problem::IpmCtrl;

/// Dense KKT solver. Owns equilibrated copies of the problem matrices so
/// the saddle matrix can be reassembled from scratch each iteration.
pub struct DenseKkt {
    n: usize,
    m: usize,
    k: usize,

    q: Mat<f64>,
    a: Mat<f64>,
    g: Mat<f64>,

    x_reg: f64,
    y_reg: f64,
    z_reg: f64,

    j: Mat<f64>,
    fact: Option<Lblt<f64>>,
}

impl DenseKkt {
    pub fn new(q: &Mat<f64>, a: &Mat<f64>, g: &Mat<f64>, ctrl: &IpmCtrl) -> Self {
        let n = a.ncols();
        let m = a.nrows();
        let k = g.nrows();
        let order = n + m + k;
        Self {
            n,
            m,
            k,
            q: q.clone(),
            a: a.clone(),
            g: g.clone(),
            x_reg: ctrl.x_reg_small,
            y_reg: ctrl.y_reg_small,
            z_reg: ctrl.z_reg_small,
            j: Mat::zeros(order, order),
            fact: None,
        }
    }
}

impl KktSystem for DenseKkt {
    fn factor(&mut self, s: &[f64], z: &[f64]) -> Result<(), SolverError> {
        assert_eq!(s.len(), self.k);
        assert_eq!(z.len(), self.k);
        let (n, m, k) = (self.n, self.m, self.k);

        let order = n + m + k;
        for col in 0..order {
            for row in 0..order {
                self.j[(row, col)] = 0.0;
            }
        }

        // (1,1): Q (lower-Hermitian storage, mirrored) + gx I
        for col in 0..n {
            self.j[(col, col)] = self.q[(col, col)] + self.x_reg;
            for row in (col + 1)..n {
                let v = self.q[(row, col)];
                self.j[(row, col)] = v;
                self.j[(col, row)] = v;
            }
        }

        // (2,1) / (1,2): A and A^T
        for row in 0..m {
            for col in 0..n {
                let v = self.a[(row, col)];
                self.j[(n + row, col)] = v;
                self.j[(col, n + row)] = v;
            }
        }

        // (2,2): -gy I
        for row in 0..m {
            self.j[(n + row, n + row)] = -self.y_reg;
        }

        // (3,1) / (1,3): G and G^T
        for row in 0..k {
            for col in 0..n {
                let v = self.g[(row, col)];
                self.j[(n + m + row, col)] = v;
                self.j[(col, n + m + row)] = v;
            }
        }

        // (3,3): -(Z^-1 S + gz I)
        for i in 0..k {
            self.j[(n + m + i, n + m + i)] = -(s[i] / z[i] + self.z_reg);
        }

        self.fact = Some(Lblt::new(self.j.as_ref(), Side::Lower));
        Ok(())
    }

    fn solve(&mut self, d: &mut [f64]) -> Result<(), SolverError> {
        let order = self.n + self.m + self.k;
        assert_eq!(d.len(), order);

        let fact = self
            .fact
            .as_ref()
            .ok_or_else(|| SolverError::FactorizationFailure("solve before factor".into()))?;

        let rhs = Mat::from_fn(order, 1, |i, _| d[i]);
        let sol = fact.solve(rhs.as_ref());
        for i in 0..order {
            d[i] = sol[(i, 0)];
        }

        // A pivoted LDL^T of an indefinite-but-singular matrix surfaces as
        // non-finite entries in the solution rather than as an error from
        // the factorization itself.
        if !all_finite(d) {
            return Err(SolverError::FactorizationFailure(
                "dense LDL produced non-finite solution".into(),
            ));
        }
        Ok(())
    }
}
