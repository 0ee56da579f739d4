//! Interior point method driver.
//!
//! Mehrotra predictor-corrector loop over the affine conic QP form. The
//! driver is generic over a storage backend: all problem access goes
//! through the `QpBackend` capability bundle (matvecs, equilibration, KKT
//! construction), so the same control flow serves the dense and the
//! sparse paths.

pub mod initialize;
pub mod residuals;
pub mod step;

use std::time::{Duration, Instant};

use crate::equil::RuizScaling;
use crate::error::SolverError;
use crate::linalg::backend::KktSystem;
use crate::linalg::{axpy, count_nonpos, nrm2};
use crate::problem::{DenseQp, EquilCtrl, IpmCtrl, Iterates, SolveStats, SparseQp};
use initialize::initialize;
use residuals::{DataNorms, Residuals};
use step::{direction_residual, expand_solution, kkt_rhs, max_step_in_orthant, mu_after_affine_step};

/// Capability bundle a storage backend provides to the driver.
///
/// The four storage layouts of the original system (dense/sparse, local/
/// distributed) differ only in how they implement these operations; the
/// driver logic is shared.
pub trait QpBackend {
    /// Per-backend KKT solver.
    type Kkt: KktSystem;

    /// (n, m, k): variables, equalities, inequalities.
    fn dims(&self) -> (usize, usize, usize);

    /// Check shapes and backend-specific structural requirements.
    fn validate(&self) -> Result<(), SolverError>;

    fn b(&self) -> &[f64];
    fn c(&self) -> &[f64];
    fn h(&self) -> &[f64];

    /// out = Q x (symmetric product)
    fn mul_q(&self, x: &[f64], out: &mut [f64]);
    /// out = A x
    fn mul_a(&self, x: &[f64], out: &mut [f64]);
    /// out = A^T y
    fn mul_at(&self, y: &[f64], out: &mut [f64]);
    /// out = G x
    fn mul_g(&self, x: &[f64], out: &mut [f64]);
    /// out = G^T z
    fn mul_gt(&self, z: &[f64], out: &mut [f64]);

    /// Scale (A, G, Q, b, c, h) in place, returning the scalings.
    fn equilibrate(&mut self, ctrl: &EquilCtrl) -> RuizScaling;

    /// Build the per-invocation KKT system for the (equilibrated) data.
    fn build_kkt(&self, ctrl: &IpmCtrl) -> Result<Self::Kkt, SolverError>;

    /// Problem-norm diagnostics for the `print` path.
    fn log_norms(&self, ctrl: &IpmCtrl);
}

#[derive(Default)]
struct PhaseTimers {
    equil: Duration,
    init: Duration,
    factor: Duration,
    solve: Duration,
}

/// Solve the QP held in a dense backend. The problem is copied once so
/// equilibration never mutates the caller's data; `vars` is read according
/// to the init flags and overwritten with the solution.
pub fn ipm_dense(
    qp: &DenseQp,
    vars: &mut Iterates,
    ctrl: &IpmCtrl,
) -> Result<SolveStats, SolverError> {
    let mut work = qp.clone();
    run(&mut work, vars, ctrl)
}

/// Solve the QP held in a sparse backend.
pub fn ipm_sparse(
    qp: &SparseQp,
    vars: &mut Iterates,
    ctrl: &IpmCtrl,
) -> Result<SolveStats, SolverError> {
    let mut work = qp.clone();
    run(&mut work, vars, ctrl)
}

/// Backend-generic driver. `qp` is the working copy and is mutated by
/// equilibration.
pub fn run<B: QpBackend>(
    qp: &mut B,
    vars: &mut Iterates,
    ctrl: &IpmCtrl,
) -> Result<SolveStats, SolverError> {
    ctrl.validate()?;
    qp.validate()?;
    let (n, m, k) = qp.dims();
    vars.check_dims(n, m, k)?;

    let mut timers = PhaseTimers::default();

    // Equilibrate the working copy and bring any warm start along.
    let scaling = if ctrl.outer_equil {
        let t = Instant::now();
        let scaling = qp.equilibrate(&ctrl.equil_ctrl);
        scaling.scale_warm_start(vars, ctrl.primal_init, ctrl.dual_init);
        timers.equil = t.elapsed();
        scaling
    } else {
        RuizScaling::identity(n, m, k)
    };

    let norms = DataNorms {
        b_nrm2: nrm2(qp.b()),
        c_nrm2: nrm2(qp.c()),
        h_nrm2: nrm2(qp.h()),
    };
    if ctrl.print {
        qp.log_norms(ctrl);
        println!("|| b ||_2 = {:.6e}", norms.b_nrm2);
        println!("|| c ||_2 = {:.6e}", norms.c_nrm2);
        println!("|| h ||_2 = {:.6e}", norms.h_nrm2);
    }

    let mut kkt = qp.build_kkt(ctrl)?;

    {
        let t = Instant::now();
        initialize(qp, &mut kkt, vars, ctrl)?;
        timers.init = t.elapsed();
    }

    let mut res = Residuals::new(n, m, k);
    let mut rmu = vec![0.0; k];
    let mut d = vec![0.0; n + m + k];

    let mut dx_aff = vec![0.0; n];
    let mut dy_aff = vec![0.0; m];
    let mut dz_aff = vec![0.0; k];
    let mut ds_aff = vec![0.0; k];
    let mut dx = vec![0.0; n];
    let mut dy = vec![0.0; m];
    let mut dz = vec![0.0; k];
    let mut ds = vec![0.0; k];

    // Scratch for the optional direction-residual checks.
    let mut err_n = vec![0.0; n];
    let mut err_n2 = vec![0.0; n];
    let mut err_m = vec![0.0; m];
    let mut err_k = vec![0.0; k];

    let mut dimacs_error = 1.0_f64;
    let mut iterations = 0;

    for num_its in 0..=ctrl.max_its {
        iterations = num_its;

        // s and z must stay strictly inside the cone.
        let s_nonpos = count_nonpos(&vars.s);
        let z_nonpos = count_nonpos(&vars.z);
        if s_nonpos > 0 || z_nonpos > 0 {
            return Err(SolverError::InvalidIterate { s_nonpos, z_nonpos });
        }

        res.compute(qp, vars, &norms);
        let dimacs_error_old = dimacs_error;
        dimacs_error = res.dimacs_error;

        if ctrl.print {
            if num_its == 0 {
                println!(
                    "{:>4} {:>12} {:>12} {:>12} {:>12} {:>12} {:>12}",
                    "iter", "mu", "prim-inf", "dual-inf", "conic-inf", "obj-gap", "comp-gap"
                );
            }
            println!(
                "{:4} {:12.4e} {:12.4e} {:12.4e} {:12.4e} {:12.4e} {:12.4e}",
                num_its,
                res.mu,
                res.rb_conv,
                res.rc_conv,
                res.rh_conv,
                res.rel_obj_gap,
                res.rel_comp_gap
            );
        }

        let met_tolerances = res.infeas_error <= ctrl.infeasibility_tol
            && res.rel_comp_gap <= ctrl.relative_complementarity_gap_tol
            && res.rel_obj_gap <= ctrl.relative_objective_gap_tol;
        if met_tolerances {
            if dimacs_error >= ctrl.min_dimacs_decrease_ratio * dimacs_error_old {
                // Tolerances hold and the last iteration made no
                // significant progress.
                break;
            } else if num_its == ctrl.max_its {
                break;
            }
        } else if num_its == ctrl.max_its {
            return Err(SolverError::IterationLimit(ctrl.max_its));
        }

        // Affine search direction
        // =======================

        // r_mu = s o z
        for i in 0..k {
            rmu[i] = vars.s[i] * vars.z[i];
        }

        {
            let t = Instant::now();
            if let Err(err) = kkt.factor(&vars.s, &vars.z) {
                if met_tolerances {
                    break;
                }
                return Err(err);
            }
            timers.factor += t.elapsed();
        }

        kkt_rhs(&res.rc, &res.rb, &res.rh, &rmu, &vars.z, &mut d);
        {
            let t = Instant::now();
            if let Err(err) = kkt.solve(&mut d) {
                if met_tolerances {
                    break;
                }
                return Err(err);
            }
            timers.solve += t.elapsed();
        }
        expand_solution(
            n, m, &d, &rmu, &vars.s, &vars.z, &mut dx_aff, &mut dy_aff, &mut dz_aff, &mut ds_aff,
        );

        if ctrl.check_residuals && ctrl.print {
            qp.mul_a(&dx_aff, &mut err_m);
            let db_err = direction_residual(&res.rb, &err_m, res.rb_nrm2);

            qp.mul_q(&dx_aff, &mut err_n);
            qp.mul_at(&dy_aff, &mut err_n2);
            for i in 0..n {
                err_n[i] += err_n2[i];
            }
            qp.mul_gt(&dz_aff, &mut err_n2);
            for i in 0..n {
                err_n[i] += err_n2[i];
            }
            let dc_err = direction_residual(&res.rc, &err_n, res.rc_nrm2);

            qp.mul_g(&dx_aff, &mut err_k);
            for i in 0..k {
                err_k[i] += ds_aff[i];
            }
            let dh_err = direction_residual(&res.rh, &err_k, res.rh_nrm2);

            println!(
                "affine direction residuals: b {:.3e}, c {:.3e}, h {:.3e}",
                db_err, dc_err, dh_err
            );
        }

        // Centrality parameter
        // ====================
        let mut alpha_aff_pri = max_step_in_orthant(&vars.s, &ds_aff, 1.0);
        let mut alpha_aff_dual = max_step_in_orthant(&vars.z, &dz_aff, 1.0);
        if ctrl.force_same_step {
            let unified = alpha_aff_pri.min(alpha_aff_dual);
            alpha_aff_pri = unified;
            alpha_aff_dual = unified;
        }
        let mu_aff = mu_after_affine_step(
            &vars.s,
            &ds_aff,
            &vars.z,
            &dz_aff,
            alpha_aff_pri,
            alpha_aff_dual,
        );
        let sigma = (ctrl.centrality_rule)(res.mu, mu_aff, alpha_aff_pri, alpha_aff_dual);
        if ctrl.print {
            println!(
                "alpha_aff_pri = {:.6}, alpha_aff_dual = {:.6}, mu_aff = {:.4e}, sigma = {:.4e}",
                alpha_aff_pri, alpha_aff_dual, mu_aff, sigma
            );
        }

        // Combined direction
        // ==================
        for i in 0..k {
            rmu[i] -= sigma * res.mu;
            if ctrl.mehrotra {
                rmu[i] += ds_aff[i] * dz_aff[i];
            }
        }

        kkt_rhs(&res.rc, &res.rb, &res.rh, &rmu, &vars.z, &mut d);
        {
            let t = Instant::now();
            if let Err(err) = kkt.solve(&mut d) {
                if met_tolerances {
                    break;
                }
                return Err(err);
            }
            timers.solve += t.elapsed();
        }
        expand_solution(
            n, m, &d, &rmu, &vars.s, &vars.z, &mut dx, &mut dy, &mut dz, &mut ds,
        );

        // Step lengths and update
        // =======================
        let cap = 1.0 / ctrl.max_step_ratio;
        let mut alpha_pri =
            (ctrl.max_step_ratio * max_step_in_orthant(&vars.s, &ds, cap)).min(1.0);
        let mut alpha_dual =
            (ctrl.max_step_ratio * max_step_in_orthant(&vars.z, &dz, cap)).min(1.0);
        if ctrl.force_same_step {
            let unified = alpha_pri.min(alpha_dual);
            alpha_pri = unified;
            alpha_dual = unified;
        }
        if ctrl.print {
            println!("alpha_pri = {:.6}, alpha_dual = {:.6}", alpha_pri, alpha_dual);
        }

        axpy(alpha_pri, &dx, &mut vars.x);
        axpy(alpha_pri, &ds, &mut vars.s);
        axpy(alpha_dual, &dy, &mut vars.y);
        axpy(alpha_dual, &dz, &mut vars.z);

        if alpha_pri == 0.0 && alpha_dual == 0.0 {
            if met_tolerances {
                break;
            }
            return Err(SolverError::StagnatedStep);
        }
    }

    if ctrl.outer_equil {
        scaling.unscale(vars);
    }

    if ctrl.time {
        println!("equilibration: {:.6} s", timers.equil.as_secs_f64());
        println!("initialization: {:.6} s", timers.init.as_secs_f64());
        println!("factorizations: {:.6} s", timers.factor.as_secs_f64());
        println!("solves: {:.6} s", timers.solve.as_secs_f64());
    }

    Ok(SolveStats {
        iterations,
        primal_obj: res.primal_obj,
        dual_obj: res.dual_obj,
        rel_obj_gap: res.rel_obj_gap,
        rel_comp_gap: res.rel_comp_gap,
        infeas_error: res.infeas_error,
        dimacs_error: res.dimacs_error,
        mu: res.mu,
    })
}
