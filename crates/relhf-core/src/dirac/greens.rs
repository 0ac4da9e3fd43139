//! Green's-function solution of the inhomogeneous Dirac equation
//! (H − ε)X = S.
//!
//! With u regular at the origin, w regular at infinity and the (constant)
//! Wronskian W = u_f·w_g − w_f·u_g:
//!
//! X(r) = −(α/W)·[u(r)·∫_r^∞ w·S dr′ + w(r)·∫_0^r u·S dr′]

use super::adams::{ALR, AdamsError, practical_infinity};
use super::bound::BoundStateSolver;
use super::matrix::DiracMatrix;
use super::spinor::DiracSpinor;
use crate::numerics::special::integration::{cumulative_from_origin, cumulative_to_infinity};

/// Fraction of pinf at which the Wronskian is evaluated.
const WRONSKIAN_POINT: f64 = 0.65;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GreensError {
    #[error("inhomogeneous solve needs a bound energy, got {0:.6e}")]
    ContinuumEnergy(f64),
    #[error("Wronskian vanishes at index {index} ({value:.3e})")]
    ZeroWronskian { index: usize, value: f64 },
    #[error(transparent)]
    Integration(#[from] AdamsError),
}

/// Homogeneous solution regular at the origin, integrated over [0, pinf).
pub fn regular_at_origin(
    solver: &BoundStateSolver,
    template: &DiracSpinor,
    en: f64,
    v: &[f64],
    h_mag: Option<&[f64]>,
) -> Result<DiracSpinor, GreensError> {
    if en >= 0.0 {
        return Err(GreensError::ContinuumEnergy(en));
    }
    let mut x0 = DiracSpinor::zeroed_like(template);
    let grid = x0.grid_handle();
    let hd = DiracMatrix::new(&grid, v, h_mag, x0.kappa, en, solver.alpha());
    let pinf = practical_infinity(en, v, grid.r(), ALR);
    solver
        .integrator()
        .outward(&hd, &mut x0.f, &mut x0.g, pinf - 1)?;
    x0.en = en;
    x0.pinf = pinf;
    x0.zero_beyond_pinf();
    Ok(x0)
}

/// Homogeneous solution regular at infinity, integrated over [0, pinf).
pub fn regular_at_infinity(
    solver: &BoundStateSolver,
    template: &DiracSpinor,
    en: f64,
    v: &[f64],
    h_mag: Option<&[f64]>,
) -> Result<DiracSpinor, GreensError> {
    if en >= 0.0 {
        return Err(GreensError::ContinuumEnergy(en));
    }
    let mut xinf = DiracSpinor::zeroed_like(template);
    let grid = xinf.grid_handle();
    let hd = DiracMatrix::new(&grid, v, h_mag, xinf.kappa, en, solver.alpha());
    let pinf = practical_infinity(en, v, grid.r(), ALR);
    solver
        .integrator()
        .inward(&hd, &mut xinf.f, &mut xinf.g, pinf, 0)?;
    xinf.en = en;
    xinf.pinf = pinf;
    Ok(xinf)
}

/// Combines the two homogeneous solutions with the source `s`.
pub fn green_solution(
    x0: &DiracSpinor,
    xinf: &DiracSpinor,
    s: &DiracSpinor,
    alpha: f64,
) -> Result<DiracSpinor, GreensError> {
    let pinf = x0.pinf.min(xinf.pinf);
    let index = (WRONSKIAN_POINT * pinf as f64) as usize;
    let wronskian = x0.f[index] * xinf.g[index] - xinf.f[index] * x0.g[index];
    if wronskian == 0.0 || !wronskian.is_finite() {
        return Err(GreensError::ZeroWronskian {
            index,
            value: wronskian,
        });
    }

    let grid = x0.grid();
    let drdu = grid.drdu();
    let source_end = pinf.min(s.pinf);
    let weight = |a: &DiracSpinor, i: usize| {
        if i < source_end {
            (a.f[i] * s.f[i] + a.g[i] * s.g[i]) * drdu[i]
        } else {
            0.0
        }
    };
    let inner_y: Vec<f64> = (0..pinf).map(|i| weight(x0, i)).collect();
    let outer_y: Vec<f64> = (0..pinf).map(|i| weight(xinf, i)).collect();
    let inner = cumulative_from_origin(&inner_y, grid.du());
    let outer = cumulative_to_infinity(&outer_y, grid.du());

    let mut x = DiracSpinor::zeroed_like(s);
    x.en = x0.en;
    x.pinf = pinf;
    let factor = -alpha / wronskian;
    for i in 0..pinf {
        x.f[i] = factor * (x0.f[i] * outer[i] + xinf.f[i] * inner[i]);
        x.g[i] = factor * (x0.g[i] * outer[i] + xinf.g[i] * inner[i]);
    }
    Ok(x)
}

/// Solves (H − ε)X = S for X regular at both ends, with H built from the
/// local potential `v` and optional off-diagonal term.
pub fn solve_inhomogeneous(
    solver: &BoundStateSolver,
    s: &DiracSpinor,
    en: f64,
    v: &[f64],
    h_mag: Option<&[f64]>,
) -> Result<DiracSpinor, GreensError> {
    let x0 = regular_at_origin(solver, s, en, v, h_mag)?;
    let xinf = regular_at_infinity(solver, s, en, v, h_mag)?;
    green_solution(&x0, &xinf, s, solver.alpha())
}
