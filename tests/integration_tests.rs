//! End-to-end solver tests.
//!
//! Each scenario is posed in both storage backends and checked against its
//! analytic solution.

use faer::Mat;
use orthant::linalg::sparse::from_triplets;
use orthant::{ipm_dense, ipm_sparse, DenseQp, IpmCtrl, Iterates, SolverError, SparseQp};

fn dense_from_rows(rows: usize, cols: usize, entries: &[(usize, usize, f64)]) -> Mat<f64> {
    let mut mat = Mat::<f64>::zeros(rows, cols);
    for &(i, j, v) in entries {
        mat[(i, j)] = v;
    }
    mat
}

struct Scenario {
    dense: DenseQp,
    sparse: SparseQp,
    n: usize,
    m: usize,
    k: usize,
    x_expected: Vec<f64>,
    obj_expected: f64,
    /// Accuracy of x at the convergence gate. Strict-complementarity
    /// failures (the box QP) leave x at O(sqrt(mu)) when the gaps meet
    /// their targets, so the degenerate scenario gets a looser bound.
    x_tol: f64,
}

/// min x1 + x2  s.t.  x = (1, 1), x >= 0. Q = 0 degenerates to an LP.
fn lp_square() -> Scenario {
    let eye = vec![(0, 0, 1.0), (1, 1, 1.0)];
    let neg_eye = vec![(0, 0, -1.0), (1, 1, -1.0)];
    Scenario {
        dense: DenseQp {
            q: Mat::zeros(2, 2),
            a: dense_from_rows(2, 2, &eye),
            g: dense_from_rows(2, 2, &neg_eye),
            b: vec![1.0, 1.0],
            c: vec![1.0, 1.0],
            h: vec![0.0, 0.0],
        },
        sparse: SparseQp {
            q: from_triplets(2, 2, vec![]),
            a: from_triplets(2, 2, eye),
            g: from_triplets(2, 2, neg_eye),
            b: vec![1.0, 1.0],
            c: vec![1.0, 1.0],
            h: vec![0.0, 0.0],
        },
        n: 2,
        m: 2,
        k: 2,
        x_expected: vec![1.0, 1.0],
        obj_expected: 2.0,
        x_tol: 1e-5,
    }
}

/// min x^2 - 4x  s.t.  x >= 0. Minimizer x = 2, objective -4.
fn scalar_qp() -> Scenario {
    Scenario {
        dense: DenseQp {
            q: dense_from_rows(1, 1, &[(0, 0, 2.0)]),
            a: Mat::zeros(0, 1),
            g: dense_from_rows(1, 1, &[(0, 0, -1.0)]),
            b: vec![],
            c: vec![-4.0],
            h: vec![0.0],
        },
        sparse: SparseQp {
            q: from_triplets(1, 1, vec![(0, 0, 2.0)]),
            a: from_triplets(0, 1, vec![]),
            g: from_triplets(1, 1, vec![(0, 0, -1.0)]),
            b: vec![],
            c: vec![-4.0],
            h: vec![0.0],
        },
        n: 1,
        m: 0,
        k: 1,
        x_expected: vec![2.0],
        obj_expected: -4.0,
        x_tol: 1e-5,
    }
}

/// min (1/2)||x||^2  s.t.  0 <= x <= 1. Minimizer x = 0.
fn box_qp() -> Scenario {
    let eye = vec![(0, 0, 1.0), (1, 1, 1.0)];
    let box_rows = vec![(0, 0, 1.0), (1, 1, 1.0), (2, 0, -1.0), (3, 1, -1.0)];
    Scenario {
        dense: DenseQp {
            q: dense_from_rows(2, 2, &eye),
            a: Mat::zeros(0, 2),
            g: dense_from_rows(4, 2, &box_rows),
            b: vec![],
            c: vec![0.0, 0.0],
            h: vec![1.0, 1.0, 0.0, 0.0],
        },
        sparse: SparseQp {
            q: from_triplets(2, 2, eye),
            a: from_triplets(0, 2, vec![]),
            g: from_triplets(4, 2, box_rows),
            b: vec![],
            c: vec![0.0, 0.0],
            h: vec![1.0, 1.0, 0.0, 0.0],
        },
        n: 2,
        m: 0,
        k: 4,
        x_expected: vec![0.0, 0.0],
        obj_expected: 0.0,
        x_tol: 1e-3,
    }
}

/// min (1/2)||x||^2  s.t.  x1 + x2 + x3 = 3, x >= 0. Minimizer (1, 1, 1).
fn equality_qp() -> Scenario {
    let eye = vec![(0, 0, 1.0), (1, 1, 1.0), (2, 2, 1.0)];
    let neg_eye = vec![(0, 0, -1.0), (1, 1, -1.0), (2, 2, -1.0)];
    let row = vec![(0, 0, 1.0), (0, 1, 1.0), (0, 2, 1.0)];
    Scenario {
        dense: DenseQp {
            q: dense_from_rows(3, 3, &eye),
            a: dense_from_rows(1, 3, &row),
            g: dense_from_rows(3, 3, &neg_eye),
            b: vec![3.0],
            c: vec![0.0, 0.0, 0.0],
            h: vec![0.0, 0.0, 0.0],
        },
        sparse: SparseQp {
            q: from_triplets(3, 3, eye),
            a: from_triplets(1, 3, row),
            g: from_triplets(3, 3, neg_eye),
            b: vec![3.0],
            c: vec![0.0, 0.0, 0.0],
            h: vec![0.0, 0.0, 0.0],
        },
        n: 3,
        m: 1,
        k: 3,
        x_expected: vec![1.0, 1.0, 1.0],
        obj_expected: 1.5,
        x_tol: 1e-5,
    }
}

fn base_ctrl() -> IpmCtrl {
    IpmCtrl::default()
}

/// The box QP's primal and dual objectives both vanish at the optimum, so
/// the relative complementarity measure is pinned at its sentinel value;
/// gate convergence on the objective gap instead.
fn degenerate_gap_ctrl() -> IpmCtrl {
    IpmCtrl {
        relative_complementarity_gap_tol: 2.5,
        ..IpmCtrl::default()
    }
}

fn ctrl_for(scenario: &Scenario) -> IpmCtrl {
    if scenario.obj_expected == 0.0 {
        degenerate_gap_ctrl()
    } else {
        base_ctrl()
    }
}

fn check_solution(scenario: &Scenario, vars: &Iterates, label: &str) {
    for (i, (&xi, &xe)) in vars.x.iter().zip(scenario.x_expected.iter()).enumerate() {
        assert!(
            (xi - xe).abs() < scenario.x_tol,
            "{}: x[{}] = {} expected {}",
            label,
            i,
            xi,
            xe
        );
    }
    for (i, &si) in vars.s.iter().enumerate() {
        assert!(si > 0.0, "{}: s[{}] = {} not positive", label, i, si);
    }
    for (i, &zi) in vars.z.iter().enumerate() {
        assert!(zi > 0.0, "{}: z[{}] = {} not positive", label, i, zi);
    }
}

fn solve_both(scenario: &Scenario, ctrl: &IpmCtrl) -> (Iterates, Iterates) {
    let mut dense_vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    let stats = ipm_dense(&scenario.dense, &mut dense_vars, ctrl).expect("dense solve failed");
    assert!(
        (stats.primal_obj - scenario.obj_expected).abs() < 1e-5,
        "dense objective {} expected {}",
        stats.primal_obj,
        scenario.obj_expected
    );

    let mut sparse_vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    let stats = ipm_sparse(&scenario.sparse, &mut sparse_vars, ctrl).expect("sparse solve failed");
    assert!(
        (stats.primal_obj - scenario.obj_expected).abs() < 1e-5,
        "sparse objective {} expected {}",
        stats.primal_obj,
        scenario.obj_expected
    );

    (dense_vars, sparse_vars)
}

#[test]
fn test_lp_square() {
    let scenario = lp_square();
    let ctrl = ctrl_for(&scenario);
    let (dense_vars, sparse_vars) = solve_both(&scenario, &ctrl);
    check_solution(&scenario, &dense_vars, "dense lp");
    check_solution(&scenario, &sparse_vars, "sparse lp");
}

#[test]
fn test_scalar_qp() {
    let scenario = scalar_qp();
    let ctrl = ctrl_for(&scenario);
    let (dense_vars, sparse_vars) = solve_both(&scenario, &ctrl);
    check_solution(&scenario, &dense_vars, "dense scalar");
    check_solution(&scenario, &sparse_vars, "sparse scalar");
}

#[test]
fn test_box_qp() {
    let scenario = box_qp();
    let ctrl = ctrl_for(&scenario);
    let (dense_vars, sparse_vars) = solve_both(&scenario, &ctrl);
    check_solution(&scenario, &dense_vars, "dense box");
    check_solution(&scenario, &sparse_vars, "sparse box");
}

#[test]
fn test_equality_qp() {
    let scenario = equality_qp();
    let ctrl = ctrl_for(&scenario);
    let (dense_vars, sparse_vars) = solve_both(&scenario, &ctrl);
    check_solution(&scenario, &dense_vars, "dense equality");
    check_solution(&scenario, &sparse_vars, "sparse equality");
}

#[test]
fn test_dense_and_sparse_agree() {
    for scenario in [lp_square(), scalar_qp(), box_qp(), equality_qp()] {
        let ctrl = ctrl_for(&scenario);
        let (dense_vars, sparse_vars) = solve_both(&scenario, &ctrl);
        for i in 0..scenario.n {
            assert!(
                (dense_vars.x[i] - sparse_vars.x[i]).abs() < scenario.x_tol,
                "backends disagree at x[{}]: {} vs {}",
                i,
                dense_vars.x[i],
                sparse_vars.x[i]
            );
        }
    }
}

#[test]
fn test_warm_start_idempotence() {
    // Solve the box QP, then re-enter with the solution and a zero
    // iteration budget: the solver must report convergence and hand the
    // iterates back unchanged.
    let scenario = box_qp();
    let ctrl = ctrl_for(&scenario);

    let mut vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    ipm_sparse(&scenario.sparse, &mut vars, &ctrl).expect("initial solve failed");

    let warm_ctrl = IpmCtrl {
        primal_init: true,
        dual_init: true,
        max_its: 0,
        ..ctrl
    };
    let reentry = vars.clone();
    let stats = ipm_sparse(&scenario.sparse, &mut vars, &warm_ctrl)
        .expect("warm re-entry did not report convergence");
    assert_eq!(stats.iterations, 0);

    for i in 0..scenario.n {
        assert!(
            (vars.x[i] - reentry.x[i]).abs() < 1e-10,
            "x[{}] changed on zero-iteration re-entry",
            i
        );
    }
    for i in 0..scenario.k {
        assert!((vars.s[i] - reentry.s[i]).abs() < 1e-10);
        assert!((vars.z[i] - reentry.z[i]).abs() < 1e-10);
    }
}

#[test]
fn test_equilibration_invariance() {
    for scenario in [lp_square(), scalar_qp(), box_qp(), equality_qp()] {
        let ctrl_on = ctrl_for(&scenario);
        let ctrl_off = IpmCtrl {
            outer_equil: false,
            ..ctrl_for(&scenario)
        };

        let mut with_equil = Iterates::zeros(scenario.n, scenario.m, scenario.k);
        ipm_sparse(&scenario.sparse, &mut with_equil, &ctrl_on).expect("equilibrated solve failed");
        let mut without_equil = Iterates::zeros(scenario.n, scenario.m, scenario.k);
        ipm_sparse(&scenario.sparse, &mut without_equil, &ctrl_off)
            .expect("unequilibrated solve failed");

        for i in 0..scenario.n {
            assert!(
                (with_equil.x[i] - without_equil.x[i]).abs() < 1e-6,
                "equilibration changed x[{}]: {} vs {}",
                i,
                with_equil.x[i],
                without_equil.x[i]
            );
        }
    }
}

#[test]
fn test_zero_iteration_cold_start_hits_limit() {
    let scenario = lp_square();
    let ctrl = IpmCtrl {
        max_its: 0,
        ..base_ctrl()
    };
    let mut vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    let err = ipm_sparse(&scenario.sparse, &mut vars, &ctrl).unwrap_err();
    assert!(matches!(err, SolverError::IterationLimit(0)), "got {:?}", err);
}

#[test]
fn test_nonpositive_warm_start_rejected() {
    let scenario = lp_square();
    let ctrl = IpmCtrl {
        primal_init: true,
        dual_init: true,
        ..base_ctrl()
    };
    let mut vars = Iterates {
        x: vec![1.0, 1.0],
        y: vec![0.0, 0.0],
        z: vec![1.0, 1.0],
        s: vec![0.0, 1.0], // s[0] on the boundary
    };
    let err = ipm_sparse(&scenario.sparse, &mut vars, &ctrl).unwrap_err();
    match err {
        SolverError::InvalidIterate { s_nonpos, z_nonpos } => {
            assert_eq!(s_nonpos, 1);
            assert_eq!(z_nonpos, 0);
        }
        other => panic!("expected InvalidIterate, got {:?}", other),
    }
}

#[test]
fn test_gradient_identity_at_convergence() {
    // || Q x + A^T y + G^T z + c ||_2 / (1 + || c ||_2) <= tol on the
    // returned (unscaled) iterates.
    let scenario = scalar_qp();
    let ctrl = ctrl_for(&scenario);
    let mut vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    ipm_sparse(&scenario.sparse, &mut vars, &ctrl).expect("solve failed");

    // n = 1, k = 1: gradient residual is 2x - z - 4.
    let grad = 2.0 * vars.x[0] - vars.z[0] - 4.0;
    let tol = ctrl.infeasibility_tol * (1.0 + 4.0);
    assert!(
        grad.abs() / (1.0 + 4.0) <= tol.max(1e-6),
        "gradient identity violated: {}",
        grad
    );

    // Complementarity: s^T z / k is at the barrier's floor.
    let comp = vars.s[0] * vars.z[0];
    assert!(comp < 1e-6, "complementarity {} too large", comp);
}

#[test]
fn test_force_same_step_toggle() {
    // Both step policies must reach the same optimum.
    let scenario = equality_qp();
    let mut ctrl = ctrl_for(&scenario);
    ctrl.force_same_step = false;
    let mut vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    ipm_sparse(&scenario.sparse, &mut vars, &ctrl).expect("independent-step solve failed");
    check_solution(&scenario, &vars, "independent steps");
}

#[test]
fn test_without_mehrotra_corrector() {
    // Pure predictor steps with the centering shift still converge, if
    // more slowly.
    let scenario = scalar_qp();
    let mut ctrl = ctrl_for(&scenario);
    ctrl.mehrotra = false;
    ctrl.max_its = 200;
    let mut vars = Iterates::zeros(scenario.n, scenario.m, scenario.k);
    ipm_sparse(&scenario.sparse, &mut vars, &ctrl).expect("no-corrector solve failed");
    check_solution(&scenario, &vars, "no corrector");
}
