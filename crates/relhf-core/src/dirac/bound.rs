//! Bound-state eigenvalue search for the radial Dirac equation.

use super::adams::{
    ALR, AdamsError, AdamsIntegrator, D_CTP, classical_turning_point, join_in_out,
    matching_energy_correction, practical_infinity,
};
use super::matrix::DiracMatrix;
use super::spinor::{DiracSpinor, count_sign_changes};
use crate::numerics::special::integration::integrate_radial;
use std::sync::Arc;
use tracing::{trace, warn};

pub const MAX_ITS: usize = 99;
/// Largest fractional energy step per iteration.
pub const FRAC_DE: f64 = 0.12;
const EPS_FLOOR: f64 = 1.0e-15;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BoundStateError {
    #[error("{symbol}: energy search reached non-negative energy {energy:.6e}")]
    UnboundEnergy { symbol: String, energy: f64 },
    #[error(
        "{symbol}: found {found} nodes, need {required}, after {iterations} iterations (energy {energy:.6e})"
    )]
    NodeCountUnreachable {
        symbol: String,
        found: i32,
        required: i32,
        iterations: usize,
        energy: f64,
    },
    #[error("{symbol}: trial solution has non-positive norm {norm2:.3e}")]
    NonPositiveNorm { symbol: String, norm2: f64 },
    #[error(transparent)]
    Integration(#[from] AdamsError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum SearchState {
    Searching,
    Refining,
    Converged,
    Failed,
}

/// Energy bracket built from node counts: `high_en` is an energy found to
/// give too many nodes, `low_en` one with too few.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackEnGuess {
    pub count_toomany: usize,
    pub count_toofew: usize,
    pub high_en: Option<f64>,
    pub low_en: Option<f64>,
}

impl TrackEnGuess {
    /// Records the node outcome at `en` and returns the next trial energy.
    pub fn next_energy(&mut self, en: f64, too_many: bool) -> f64 {
        if too_many {
            self.count_toomany += 1;
            self.high_en = Some(self.high_en.map_or(en, |high| high.min(en)));
            let next = en * (1.0 + FRAC_DE);
            match self.low_en {
                Some(low) if next <= low => 0.5 * (en + low),
                _ => next,
            }
        } else {
            self.count_toofew += 1;
            self.low_en = Some(self.low_en.map_or(en, |low| low.max(en)));
            let next = en * (1.0 - FRAC_DE);
            match self.high_en {
                Some(high) if next >= high => 0.5 * (en + high),
                _ => next,
            }
        }
    }

    /// Keeps a refined energy strictly inside the bracket.
    pub fn clamp(&self, en: f64, proposed: f64) -> f64 {
        match (self.low_en, self.high_en) {
            (Some(low), _) if proposed <= low => 0.5 * (en + low),
            (_, Some(high)) if proposed >= high => 0.5 * (en + high),
            _ => proposed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct BoundStateReport {
    pub state: SearchState,
    pub iterations: usize,
    pub eps: f64,
    pub en: f64,
    pub nodes: i32,
}

impl BoundStateReport {
    pub fn converged(&self) -> bool {
        self.state == SearchState::Converged
    }
}

struct TrialSolution {
    f: Vec<f64>,
    g: Vec<f64>,
    dg: Vec<f64>,
    pinf: usize,
    ctp: usize,
}

/// Shooting solver: outward and inward Adams-Moulton solutions matched at
/// the classical turning point, with the energy adjusted by node counting
/// and then by first-order perturbation theory.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundStateSolver {
    integrator: AdamsIntegrator,
    alpha: f64,
    max_its: usize,
}

impl BoundStateSolver {
    pub fn new(integrator: AdamsIntegrator, alpha: f64) -> Self {
        Self {
            integrator,
            alpha,
            max_its: MAX_ITS,
        }
    }

    pub fn with_max_its(mut self, max_its: usize) -> Self {
        self.max_its = max_its.max(1);
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn integrator(&self) -> &AdamsIntegrator {
        &self.integrator
    }

    /// Solves for the bound state with `psi`'s (n, κ) in potential `v`,
    /// starting from `en_guess`. Converges when |δε/ε| < 10^(−log_eps).
    ///
    /// Exhausting the iteration budget with the right node count is not an
    /// error: the orbital keeps the last solution and the report says
    /// `Failed`.
    pub fn solve(
        &self,
        psi: &mut DiracSpinor,
        en_guess: f64,
        v: &[f64],
        h_mag: Option<&[f64]>,
        log_eps: i32,
    ) -> Result<BoundStateReport, BoundStateError> {
        if en_guess >= 0.0 {
            return Err(BoundStateError::UnboundEnergy {
                symbol: psi.symbol(),
                energy: en_guess,
            });
        }
        let grid = psi.grid_handle();
        let eps_goal = 10.0_f64.powi(-log_eps).max(EPS_FLOOR);
        let required = psi.required_nodes();

        let mut track = TrackEnGuess::default();
        let mut state = SearchState::Searching;
        let mut en = en_guess;
        let mut t_eps = 1.0;
        let mut last: Option<(TrialSolution, f64)> = None;
        let mut nodes = -1;
        let mut iterations = 0;

        for its in 1..=self.max_its {
            iterations = its;
            let hd = DiracMatrix::new(&grid, v, h_mag, psi.kappa, en, self.alpha);
            let trial = self.trial_solution(&hd)?;
            nodes = count_sign_changes(&trial.f[..trial.pinf]);

            if nodes != required {
                state = SearchState::Searching;
                let next = track.next_energy(en, nodes > required);
                t_eps = ((next - en) / en).abs();
                trace!(orbital = %psi.symbol(), its, en, nodes, required, "node search");
                en = next;
                continue;
            }

            state = SearchState::Refining;
            let density: Vec<f64> = trial
                .f
                .iter()
                .zip(&trial.g)
                .map(|(f, g)| f * f + g * g)
                .collect();
            let norm2 = integrate_radial(&grid, &density, trial.pinf);
            if !(norm2 > 0.0) {
                return Err(BoundStateError::NonPositiveNorm {
                    symbol: psi.symbol(),
                    norm2,
                });
            }

            let de = matching_energy_correction(&trial.f, &trial.dg, trial.ctp, self.alpha, norm2)
                .clamp(-FRAC_DE * en.abs(), FRAC_DE * en.abs());
            let next = track.clamp(en, en + de);
            t_eps = ((next - en) / en).abs();
            trace!(orbital = %psi.symbol(), its, en, de, "energy refinement");
            let solved_at = en;
            en = next;
            last = Some((trial, norm2));

            if t_eps < eps_goal || (next - solved_at).abs() <= f64::EPSILON * solved_at.abs() {
                state = SearchState::Converged;
                break;
            }
        }

        if en >= 0.0 {
            return Err(BoundStateError::UnboundEnergy {
                symbol: psi.symbol(),
                energy: en,
            });
        }

        let Some((trial, norm2)) = last.filter(|_| state != SearchState::Searching) else {
            return Err(BoundStateError::NodeCountUnreachable {
                symbol: psi.symbol(),
                found: nodes,
                required,
                iterations,
                energy: en,
            });
        };

        if state != SearchState::Converged {
            state = SearchState::Failed;
            warn!(
                orbital = %psi.symbol(),
                iterations,
                eps = t_eps,
                goal = eps_goal,
                "bound-state search did not converge"
            );
        }

        psi.f = trial.f;
        psi.g = trial.g;
        psi.pinf = trial.pinf;
        psi.scale(1.0 / norm2.sqrt());
        psi.zero_beyond_pinf();
        psi.en = en;
        psi.eps = t_eps;
        psi.its = iterations;

        Ok(BoundStateReport {
            state,
            iterations,
            eps: t_eps,
            en,
            nodes,
        })
    }

    fn trial_solution(&self, hd: &DiracMatrix<'_>) -> Result<TrialSolution, AdamsError> {
        let grid = hd.grid();
        let size = grid.num_points();
        let pinf = practical_infinity(hd.en(), hd.v(), grid.r(), ALR);
        let ctp = classical_turning_point(hd.en(), hd.v(), pinf, self.integrator.order())?;

        let mut f = vec![0.0; size];
        let mut g = vec![0.0; size];
        self.integrator.outward(hd, &mut f, &mut g, ctp + D_CTP)?;

        let mut f_in = vec![0.0; size];
        let mut g_in = vec![0.0; size];
        self.integrator
            .inward(hd, &mut f_in, &mut g_in, pinf, ctp - D_CTP)?;

        let dg = join_in_out(&mut f, &mut g, &f_in, &g_in, ctp, pinf)?;
        Ok(TrialSolution {
            f,
            g,
            dg,
            pinf,
            ctp,
        })
    }
}

/// Convenience wrapper: a fresh orbital (n, κ) solved in `v`.
pub fn solve_new_orbital(
    solver: &BoundStateSolver,
    n: i32,
    kappa: i32,
    grid: Arc<crate::numerics::radial::RadialGrid>,
    v: &[f64],
    en_guess: f64,
    log_eps: i32,
) -> Result<DiracSpinor, BoundStateError> {
    let mut psi = DiracSpinor::new(n, kappa, grid);
    solver.solve(&mut psi, en_guess, v, None, log_eps)?;
    Ok(psi)
}
