//! Driven perturbation of a single orbital in a frozen core.
//!
//! Solves (H₀ + v_l + V_ex − ε_a − ω)δF = −h·F_a, where the exchange of δF
//! with the core is iterated to self-consistency.

use crate::dirac::bound::BoundStateSolver;
use crate::dirac::greens::{GreensError, solve_inhomogeneous};
use crate::dirac::spinor::DiracSpinor;
use crate::domain::RelhfError;
use crate::hf::{ExchangePotentialBuilder, HartreeFock, OrbitalSlot, RampedDamp, YkSource};
use serde::Serialize;
use tracing::{debug, warn};

const DAMPING: RampedDamp = RampedDamp::new(0.8, 0.33, 3, 15);
const TIGHT_EPS: f64 = 1.0e-8;
const TIGHT_MAX_ITS: usize = 100;
const LOOSE_MAX_ITS: usize = 30;

/// Linear operator on spinors, such as a correlation potential or the
/// Breit interaction.
pub trait LinearOperator: Send + Sync {
    fn apply(&self, psi: &DiracSpinor) -> DiracSpinor;
}

impl<F> LinearOperator for F
where
    F: Fn(&DiracSpinor) -> DiracSpinor + Send + Sync,
{
    fn apply(&self, psi: &DiracSpinor) -> DiracSpinor {
        self(psi)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum MixedStatesError {
    #[error("driving frequency {omega:.6e} puts {symbol} at non-negative energy {energy:.6e}")]
    ContinuumEnergy {
        symbol: String,
        omega: f64,
        energy: f64,
    },
    #[error(transparent)]
    Greens(#[from] GreensError),
}

impl From<MixedStatesError> for RelhfError {
    fn from(error: MixedStatesError) -> Self {
        RelhfError::computation("RUN.MIXED_STATES", error.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixedStatesReport {
    pub iterations: usize,
    pub eps: f64,
    pub converged: bool,
    pub norm2: f64,
}

/// Mixed-states solver bound to a frozen core and its local potential.
pub struct MixedStatesSolver<'a> {
    solver: &'a BoundStateSolver,
    core: &'a [DiracSpinor],
    vl: Vec<f64>,
    exchange: ExchangePotentialBuilder,
    k_cut: Option<i32>,
    h_mag: Option<&'a [f64]>,
    sigma: Option<&'a dyn LinearOperator>,
    breit: Option<&'a dyn LinearOperator>,
}

impl<'a> MixedStatesSolver<'a> {
    pub fn new(
        solver: &'a BoundStateSolver,
        core: &'a [DiracSpinor],
        vl: Vec<f64>,
        exchange: ExchangePotentialBuilder,
    ) -> Self {
        Self {
            solver,
            core,
            vl,
            exchange,
            k_cut: None,
            h_mag: None,
            sigma: None,
            breit: None,
        }
    }

    /// Uses the converged core, v_nuc + v_dir and the exchange settings of
    /// a finished run.
    pub fn from_hartree_fock(hf: &'a HartreeFock) -> Self {
        let wf = hf.wavefunction();
        Self::new(
            wf.solver(),
            &wf.core,
            wf.local_potential(None),
            *hf.exchange_builder(),
        )
    }

    pub fn with_k_cut(mut self, k_cut: i32) -> Self {
        self.k_cut = (k_cut > 0).then_some(k_cut);
        self
    }

    pub fn with_h_mag(mut self, h_mag: &'a [f64]) -> Self {
        self.h_mag = Some(h_mag);
        self
    }

    pub fn with_sigma(mut self, sigma: &'a dyn LinearOperator) -> Self {
        self.sigma = Some(sigma);
        self
    }

    pub fn with_breit(mut self, breit: &'a dyn LinearOperator) -> Self {
        self.breit = Some(breit);
        self
    }

    /// Iterates `df` towards the solution driven by `h_fa` = h·F_a at
    /// frequency `omega`. A zero `df` is first seeded by the solve without
    /// exchange.
    pub fn solve(
        &self,
        df: &mut DiracSpinor,
        fa: &DiracSpinor,
        omega: f64,
        h_fa: &DiracSpinor,
        eps_target: f64,
    ) -> Result<MixedStatesReport, MixedStatesError> {
        let en = fa.en + omega;
        if en >= 0.0 {
            return Err(MixedStatesError::ContinuumEnergy {
                symbol: fa.symbol(),
                omega,
                energy: en,
            });
        }
        let max_its = if eps_target < TIGHT_EPS {
            TIGHT_MAX_ITS
        } else {
            LOOSE_MAX_ITS
        };
        let minus_h_fa = h_fa * -1.0;

        if df.norm2() == 0.0 {
            *df = self.relabel(
                solve_inhomogeneous(self.solver, &minus_h_fa, en, &self.vl, self.h_mag)?,
                df,
            );
        }

        let source = YkSource::OnTheFly { k_cut: self.k_cut };
        let mut report = MixedStatesReport {
            iterations: 0,
            eps: f64::INFINITY,
            converged: false,
            norm2: df.norm2(),
        };
        for its in 0..=max_its {
            let vx = self
                .exchange
                .approx_local(df, OrbitalSlot::Outside, self.core, source);
            let v: Vec<f64> = self.vl.iter().zip(&vx).map(|(vl, vx)| vl + vx).collect();

            let mut rhs = df.times_potential(&vx)
                - &self.exchange.exact_action(df, OrbitalSlot::Outside, self.core, source)
                - h_fa;
            if let Some(sigma) = self.sigma {
                rhs -= &sigma.apply(df);
            }
            if let Some(breit) = self.breit {
                rhs -= &breit.apply(df);
            }

            let norm_before = df.norm2();
            let previous = df.clone();
            let solution = self.relabel(
                solve_inhomogeneous(self.solver, &rhs, en, &v, self.h_mag)?,
                df,
            );
            let damping = if its == 0 { 0.0 } else { DAMPING.at(its) };
            *df = solution * (1.0 - damping) + &(&previous * damping);

            let norm2 = df.norm2();
            let eps = if norm2 == 0.0 {
                0.0
            } else {
                ((norm2 - norm_before) / norm2).abs()
            };
            report = MixedStatesReport {
                iterations: its + 1,
                eps,
                converged: eps < eps_target,
                norm2,
            };
            debug!(iteration = its + 1, damping, eps, "mixed-states iteration");
            if report.converged || its == max_its {
                break;
            }
        }
        if !report.converged {
            warn!(
                orbital = %fa.symbol(),
                omega,
                eps = report.eps,
                iterations = report.iterations,
                "mixed states did not converge"
            );
        }
        Ok(report)
    }

    /// Keeps the quantum numbers and occupation of `template` on a fresh
    /// Green's solution.
    fn relabel(&self, mut solution: DiracSpinor, template: &DiracSpinor) -> DiracSpinor {
        solution.n = template.n;
        solution.kappa = template.kappa;
        solution.occ_frac = template.occ_frac;
        solution.en = template.en;
        solution
    }
}

#[cfg(test)]
mod tests {
    use super::{MixedStatesError, MixedStatesSolver};
    use crate::common::config::RunConfig;
    use crate::common::constants::ALPHA;
    use crate::dirac::adams::{AdamsIntegrator, DEFAULT_ORDER};
    use crate::dirac::bound::{BoundStateSolver, solve_new_orbital};
    use crate::dirac::spinor::DiracSpinor;
    use crate::hf::{ExchangePotentialBuilder, HartreeFock};
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    fn hydrogen() -> (BoundStateSolver, Vec<f64>, DiracSpinor) {
        let solver = BoundStateSolver::new(AdamsIntegrator::new(DEFAULT_ORDER).expect("order"), ALPHA);
        let grid = Arc::new(RadialGrid::new(1.0e-6, 80.0, 3000, GridKind::LogLinear { b: 4.0 }).expect("grid"));
        let v: Vec<f64> = grid.r().iter().map(|r| -1.0 / r).collect();
        let fa = solve_new_orbital(&solver, 1, -1, grid, &v, -0.5, 15).expect("1s");
        (solver, v, fa)
    }

    #[test]
    fn constant_perturbation_without_core_scales_the_orbital() {
        let (solver, v, fa) = hydrogen();
        let mixed = MixedStatesSolver::new(&solver, &[], v, ExchangePotentialBuilder::default());
        let (c, omega) = (0.3, 0.1);
        let h_fa = &fa * c;
        let mut df = DiracSpinor::zeroed_like(&fa);

        let report = mixed.solve(&mut df, &fa, omega, &h_fa, 1.0e-10).expect("mixed states");
        assert!(report.converged);
        let expected = &fa * (c / omega);
        let residual = (df.clone() - &expected).norm2().sqrt();
        assert!(residual < 1.0e-5 * (c / omega), "residual {residual}");
    }

    #[test]
    fn continuum_frequency_is_rejected() {
        let (solver, v, fa) = hydrogen();
        let mixed = MixedStatesSolver::new(&solver, &[], v, ExchangePotentialBuilder::default());
        let mut df = DiracSpinor::zeroed_like(&fa);
        let error = mixed.solve(&mut df, &fa, 0.6, &fa, 1.0e-6).expect_err("above threshold");
        assert!(matches!(error, MixedStatesError::ContinuumEnergy { .. }));
    }

    #[test]
    fn operator_terms_enter_the_source() {
        let (solver, v, fa) = hydrogen();
        let (c, omega, s) = (0.3, 0.1, 0.05);
        let sigma = move |psi: &DiracSpinor| psi * s;
        let mixed = MixedStatesSolver::new(&solver, &[], v, ExchangePotentialBuilder::default())
            .with_sigma(&sigma);
        let mut df = DiracSpinor::zeroed_like(&fa);
        let report = mixed
            .solve(&mut df, &fa, omega, &(&fa * c), 1.0e-10)
            .expect("mixed states");
        assert!(report.converged);
        // (ε_a − ε_a − ω)δF = −cF_a − sδF gives δF = c/(ω − s)·F_a.
        let expected = &fa * (c / (omega - s));
        assert!((df - &expected).norm2().sqrt() < 1.0e-4 * (c / (omega - s)));
    }

    #[test]
    fn core_exchange_converges_for_a_frozen_core() {
        let mut config = RunConfig::default();
        config.nucleus.z = 3;
        config.hartree_fock.method = "ApproxHF".to_string();
        let mut hf = HartreeFock::from_config(&config).expect("engine");
        hf.run("1s2").expect("core");
        hf.run_valence("2s").expect("valence");

        let fa = hf.valence()[0].clone();
        let mixed = MixedStatesSolver::from_hartree_fock(&hf).with_k_cut(4);
        let mut df = DiracSpinor::zeroed_like(&fa);
        let r = hf.wavefunction().grid().r().to_vec();
        let h_fa = fa.times_potential(&r);
        let report = mixed.solve(&mut df, &fa, 0.05, &h_fa, 1.0e-6).expect("mixed states");
        assert!(report.converged, "eps {}", report.eps);
        assert!(report.norm2 > 0.0 && report.norm2.is_finite());
    }
}
