//! Default iterate initialization.
//!
//! Cold starts solve two systems against the KKT matrix taken at unit
//! scaling (s = z = 1):
//!
//! - primal: rhs (0; b; h) yields the minimum-norm solution of
//!   A x = b, G x + s = h, with s recovered as the negated z-block;
//! - dual: rhs (-c; 0; 0) yields (y, z) closest to dual feasibility.
//!
//! The slack and inequality-dual candidates are then shifted into the cone
//! interior. Warm-started components (per `primal_init` / `dual_init`)
//! are left untouched.

use crate::error::SolverError;
use crate::ipm::QpBackend;
use crate::linalg::backend::KktSystem;
use crate::linalg::min_entry;
use crate::problem::{IpmCtrl, Iterates};

/// Shift v strictly inside the nonnegative orthant. The standard rule
/// shifts the whole vector so its minimum lands at one whenever it sits at
/// or below sqrt(eps); the alternative clips elementwise.
fn shift_into_cone(v: &mut [f64], standard: bool) {
    if v.is_empty() {
        return;
    }
    let floor = f64::EPSILON.sqrt();
    if standard {
        let vmin = min_entry(v);
        if vmin <= floor {
            let shift = 1.0 - vmin;
            for vi in v.iter_mut() {
                *vi += shift;
            }
        }
    } else {
        for vi in v.iter_mut() {
            if *vi < floor {
                *vi = floor;
            }
        }
    }
}

/// Populate (x, y, z, s), honoring the warm-start flags.
pub fn initialize<B: QpBackend>(
    qp: &B,
    kkt: &mut B::Kkt,
    vars: &mut Iterates,
    ctrl: &IpmCtrl,
) -> Result<(), SolverError> {
    if ctrl.primal_init && ctrl.dual_init {
        return Ok(());
    }

    let (n, m, k) = qp.dims();
    let ones = vec![1.0; k];
    kkt.factor(&ones, &ones)?;

    let mut d = vec![0.0; n + m + k];

    if !ctrl.primal_init {
        d[..n].fill(0.0);
        d[n..n + m].copy_from_slice(qp.b());
        d[n + m..].copy_from_slice(qp.h());
        kkt.solve(&mut d)?;
        vars.x.copy_from_slice(&d[..n]);
        for i in 0..k {
            vars.s[i] = -d[n + m + i];
        }
    }

    if !ctrl.dual_init {
        for i in 0..n {
            d[i] = -qp.c()[i];
        }
        d[n..].fill(0.0);
        kkt.solve(&mut d)?;
        vars.y.copy_from_slice(&d[n..n + m]);
        vars.z.copy_from_slice(&d[n + m..]);
    }

    if !ctrl.primal_init {
        shift_into_cone(&mut vars.s, ctrl.standard_init_shift);
    }
    if !ctrl.dual_init {
        shift_into_cone(&mut vars.z, ctrl.standard_init_shift);
    }
    Ok(())
}
