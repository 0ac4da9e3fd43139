//! The atom: nucleus, starting potentials, configuration strings and the
//! orbital container shared by the self-consistent field engine.

pub mod configuration;
pub mod nucleus;
pub mod parametric;

pub use configuration::{ConfigurationError, ShellOccupancy, parse_core, parse_valence};
pub use nucleus::{NuclearModel, Nucleus, NucleusError};
pub use parametric::ParametricPotential;

use crate::dirac::adams::AdamsIntegrator;
use crate::dirac::bound::{BoundStateError, BoundStateReport, BoundStateSolver};
use crate::dirac::spinor::DiracSpinor;
use crate::numerics::radial::RadialGrid;
use std::sync::Arc;
use tracing::debug;

/// Fraction of a solved j = l − ½ energy used as the guess for j = l + ½.
const NEXT_KAPPA_GUESS: f64 = 0.95;

/// Orbitals of one atom on a shared grid, with the nuclear and direct
/// potentials they were solved in.
#[derive(Debug, Clone)]
pub struct Wavefunction {
    grid: Arc<RadialGrid>,
    nucleus: Nucleus,
    alpha: f64,
    vnuc: Vec<f64>,
    pub vdir: Vec<f64>,
    pub core: Vec<DiracSpinor>,
    pub valence: Vec<DiracSpinor>,
    solver: BoundStateSolver,
}

impl Wavefunction {
    pub fn new(
        grid: Arc<RadialGrid>,
        nucleus: Nucleus,
        alpha: f64,
        integrator: AdamsIntegrator,
    ) -> Self {
        let vnuc = nucleus.potential(grid.r());
        let size = grid.num_points();
        Self {
            grid,
            nucleus,
            alpha,
            vnuc,
            vdir: vec![0.0; size],
            core: Vec::new(),
            valence: Vec::new(),
            solver: BoundStateSolver::new(integrator, alpha),
        }
    }

    pub fn grid(&self) -> &RadialGrid {
        &self.grid
    }

    pub fn grid_handle(&self) -> Arc<RadialGrid> {
        Arc::clone(&self.grid)
    }

    pub fn nucleus(&self) -> &Nucleus {
        &self.nucleus
    }

    pub fn z(&self) -> u32 {
        self.nucleus.z()
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn vnuc(&self) -> &[f64] {
        &self.vnuc
    }

    pub fn solver(&self) -> &BoundStateSolver {
        &self.solver
    }

    /// v_nuc + v_dir (+ v_ex when given).
    pub fn local_potential(&self, vex: Option<&[f64]>) -> Vec<f64> {
        let mut v: Vec<f64> = self
            .vnuc
            .iter()
            .zip(&self.vdir)
            .map(|(vn, vd)| vn + vd)
            .collect();
        if let Some(vex) = vex {
            for (value, ex) in v.iter_mut().zip(vex) {
                *value += ex;
            }
        }
        v
    }

    /// Bound-state solve of `psi` in the local potential plus `vex`.
    pub fn solve_dirac(
        &self,
        psi: &mut DiracSpinor,
        en_guess: f64,
        vex: Option<&[f64]>,
        log_eps: i32,
    ) -> Result<BoundStateReport, BoundStateError> {
        let v = self.local_potential(vex);
        self.solver.solve(psi, en_guess, &v, None, log_eps)
    }

    /// Replaces the core with the orbitals of `shells`, each solved in the
    /// current local potential from a screened-hydrogen energy guess.
    pub fn solve_initial_core(
        &mut self,
        shells: &[ShellOccupancy],
        log_eps: i32,
    ) -> Result<(), BoundStateError> {
        self.core.clear();
        let z = self.nucleus.charge();
        let mut total = 0.0;
        for shell in shells {
            let num = f64::from(shell.electrons);
            let z_eff = if shell.l == 0 {
                z - total - num
            } else {
                1.0 + z - total - 0.5 * num
            }
            .max(1.0);
            total += num;

            let n = f64::from(shell.n);
            let mut en_guess = -0.5 * (z_eff / n).powi(2);
            if shell.n > 1 {
                en_guess *= 0.5;
            }
            for kappa in shell.kappas() {
                let mut psi = DiracSpinor::new(shell.n, kappa, self.grid_handle());
                psi.occ_frac = shell.occupation_fraction();
                let report = self.solve_dirac(&mut psi, en_guess, None, log_eps)?;
                debug!(orbital = %psi.symbol(), en = psi.en, its = report.iterations, "initial core orbital");
                en_guess = NEXT_KAPPA_GUESS * psi.en;
                self.core.push(psi);
            }
        }
        Ok(())
    }

    pub fn num_core_electrons(&self) -> f64 {
        self.core.iter().map(DiracSpinor::num_electrons).sum()
    }

    pub fn core_index(&self, n: i32, kappa: i32) -> Option<usize> {
        self.core
            .iter()
            .position(|psi| psi.n == n && psi.kappa == kappa)
    }

    pub fn valence_index(&self, n: i32, kappa: i32) -> Option<usize> {
        self.valence
            .iter()
            .position(|psi| psi.n == n && psi.kappa == kappa)
    }

    /// Core then valence, each group sorted by energy.
    pub fn orbitals_by_energy(&self) -> Vec<&DiracSpinor> {
        let mut core: Vec<&DiracSpinor> = self.core.iter().collect();
        core.sort_by(|a, b| a.en.total_cmp(&b.en));
        let mut valence: Vec<&DiracSpinor> = self.valence.iter().collect();
        valence.sort_by(|a, b| a.en.total_cmp(&b.en));
        core.extend(valence);
        core
    }
}

#[cfg(test)]
mod tests {
    use super::{Nucleus, ParametricPotential, Wavefunction, parse_core};
    use crate::common::constants::ALPHA;
    use crate::dirac::adams::{AdamsIntegrator, DEFAULT_ORDER};
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    fn neon_like() -> Wavefunction {
        let grid = Arc::new(
            RadialGrid::new(1.0e-6, 60.0, 3000, GridKind::LogLinear { b: 4.0 }).expect("grid"),
        );
        Wavefunction::new(
            grid,
            Nucleus::point(10).expect("nucleus"),
            ALPHA,
            AdamsIntegrator::new(DEFAULT_ORDER).expect("order"),
        )
    }

    #[test]
    fn initial_core_in_green_potential() {
        let mut wf = neon_like();
        wf.vdir = ParametricPotential::default_green(10).electronic_potential(9.0, wf.grid().r());
        let shells = parse_core("[Ne]").expect("core");
        wf.solve_initial_core(&shells, 8).expect("initial core");

        let symbols: Vec<String> = wf.core.iter().map(|psi| psi.symbol()).collect();
        assert_eq!(symbols, vec!["1s_1/2", "2s_1/2", "2p_1/2", "2p_3/2"]);
        assert!((wf.num_core_electrons() - 10.0).abs() < 1.0e-12);
        for psi in &wf.core {
            assert!(psi.en < 0.0);
            assert_eq!(psi.count_nodes(), psi.required_nodes());
            assert!((psi.norm2() - 1.0).abs() < 1.0e-8);
        }
        // Screening lifts the 1s well above the bare −Z²/2.
        assert!(wf.core[0].en > -50.0 && wf.core[0].en < -25.0);
        assert_eq!(wf.core_index(2, -2), Some(3));
        assert_eq!(wf.orbitals_by_energy()[0].symbol(), "1s_1/2");
    }

    #[test]
    fn local_potential_adds_exchange_when_given() {
        let wf = neon_like();
        let vex = vec![0.5; wf.grid().num_points()];
        let plain = wf.local_potential(None);
        let shifted = wf.local_potential(Some(&vex));
        assert!(
            plain
                .iter()
                .zip(&shifted)
                .all(|(a, b)| (b - a - 0.5).abs() < 1.0e-12 * a.abs().max(1.0))
        );
    }
}
