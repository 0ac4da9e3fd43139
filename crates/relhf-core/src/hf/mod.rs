//! Self-consistent Dirac-Hartree-Fock engine.
//!
//! The core is iterated in a local approximation to exchange, then (for the
//! full method) refined with the exact non-local exchange through the
//! inhomogeneous solver. Valence orbitals are solved one at a time in the
//! frozen core.

pub mod damping;
pub mod energy;
pub mod exchange;
pub mod method;
pub mod orthog;

pub use damping::{IterationState, RampedDamp, core_eta, valence_eta};
pub use energy::core_energy;
pub use exchange::{ExchangeConfig, ExchangePotentialBuilder, OrbitalSlot, YkSource};
pub use method::{HfMethod, MethodStrategy, parse_eps};
pub use orthog::{orthonormalise_core, orthonormalise_wrt_core};

use crate::atom::{
    ConfigurationError, Nucleus, NucleusError, ShellOccupancy, Wavefunction, parse_core,
    parse_valence,
};
use crate::common::batch::try_map_batch;
use crate::common::config::{ConfigError, HartreeFockSettings, RunConfig};
use crate::common::constants::ALPHA;
use crate::coulomb::CoulombTable;
use crate::dirac::adams::{AdamsError, AdamsIntegrator, DEFAULT_ORDER};
use crate::dirac::bound::BoundStateError;
use crate::dirac::greens::{GreensError, green_solution, regular_at_infinity, regular_at_origin};
use crate::dirac::spinor::DiracSpinor;
use crate::domain::RelhfError;
use crate::numerics::radial::{GridKind, RadialGrid, RadialGridError};
use crate::numerics::fractional_change;
use damping::mix_into;
use orthog::CORE_SWEEPS;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

pub const MAX_HART_ITS: usize = 64;
/// Core-loop target when the exact-exchange refinement follows.
const PRE_REFINE_EPS: f64 = 1.0e-5;
/// Iterations before the "getting worse" escape is allowed.
const WORSE_GRACE: usize = 20;
/// Grid stride of the first-order energy-shift estimate.
const DE_STRIDE: usize = 5;
const LOG_EPS_CORE_LOOP: i32 = 6;
const LOG_EPS_INITIAL: i32 = 5;
const LOG_EPS_FINAL: i32 = 15;
/// Worsening factor relative to the best epsilon seen during refinement.
const REFINE_WORSE_FACTOR: f64 = 1.5;
/// Refinement stops at once when epsilon exceeds the best seen by this factor.
const REFINE_DIVERGE_FACTOR: f64 = 10.0;
/// Multipoles kept in the exchange response of the normalisation steps.
const RESPONSE_K_CUT: i32 = 0;
const CORE_REFINE_DAMP: RampedDamp = RampedDamp::new(0.65, 0.3, 5, 20);
const CORE_REFINE_EXTRA: f64 = 0.4;
const CORE_REFINE_MAX_WORSE: usize = 3;
const VALENCE_REFINE_DAMP: RampedDamp = RampedDamp::new(0.7, 0.2, 5, 20);
const VALENCE_REFINE_EXTRA: f64 = 0.1;
const VALENCE_REFINE_MAX_WORSE: usize = 2;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum HartreeFockError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Grid(#[from] RadialGridError),
    #[error(transparent)]
    Nucleus(#[from] NucleusError),
    #[error(transparent)]
    Integrator(#[from] AdamsError),
    #[error(transparent)]
    BoundState(#[from] BoundStateError),
    #[error(transparent)]
    Greens(#[from] GreensError),
    #[error("valence orbital {0} is already in the core")]
    ValenceInCore(String),
}

impl From<HartreeFockError> for RelhfError {
    fn from(error: HartreeFockError) -> Self {
        match &error {
            HartreeFockError::Config(inner) => inner.clone().into(),
            HartreeFockError::Configuration(_) | HartreeFockError::ValenceInCore(_) => {
                RelhfError::input_validation("INPUT.CONFIGURATION", error.to_string())
            }
            HartreeFockError::Grid(_) => RelhfError::input_validation("INPUT.GRID", error.to_string()),
            HartreeFockError::Nucleus(_) => {
                RelhfError::input_validation("INPUT.NUCLEUS", error.to_string())
            }
            HartreeFockError::Integrator(_) => {
                RelhfError::computation("RUN.INTEGRATOR", error.to_string())
            }
            HartreeFockError::BoundState(_) => {
                RelhfError::computation("RUN.ENERGY_SEARCH", error.to_string())
            }
            HartreeFockError::Greens(_) => RelhfError::computation("RUN.GREENS", error.to_string()),
        }
    }
}

/// Outcome of one self-consistent loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopOutcome {
    pub iterations: usize,
    pub eps: f64,
    pub converged: bool,
    pub worst_orbital: Option<String>,
}

impl LoopOutcome {
    fn trivial() -> Self {
        Self {
            iterations: 0,
            eps: 0.0,
            converged: true,
            worst_orbital: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrbitalSummary {
    pub symbol: String,
    pub n: i32,
    pub kappa: i32,
    pub en: f64,
    pub occupation: f64,
    pub eps: f64,
    pub iterations: usize,
    pub nodes: i32,
    pub core: bool,
}

impl OrbitalSummary {
    fn new(psi: &DiracSpinor, core: bool) -> Self {
        Self {
            symbol: psi.symbol(),
            n: psi.n,
            kappa: psi.kappa,
            en: psi.en,
            occupation: psi.occ_frac,
            eps: psi.eps,
            iterations: psi.its,
            nodes: psi.count_nodes(),
            core,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HartreeFockReport {
    pub method: HfMethod,
    pub z: u32,
    pub eps_target: f64,
    pub core_loop: LoopOutcome,
    pub core_refinement: Option<LoopOutcome>,
    pub valence: Vec<LoopOutcome>,
    pub core_energy: f64,
    pub orbitals: Vec<OrbitalSummary>,
}

impl HartreeFockReport {
    pub fn converged(&self) -> bool {
        self.core_loop.converged && self.valence.iter().all(|outcome| outcome.converged)
    }
}

#[derive(Debug)]
pub struct HartreeFock {
    wf: Wavefunction,
    method: HfMethod,
    strategy: Box<dyn MethodStrategy>,
    eps_hf: f64,
    explicit_orthog_core: bool,
    explicit_orthog_valence: bool,
    exchange: ExchangePotentialBuilder,
    table: CoulombTable,
    vex_core: Vec<Vec<f64>>,
    vex_valence: HashMap<(i32, i32), Vec<f64>>,
    core_loop: LoopOutcome,
    core_refinement: Option<LoopOutcome>,
    valence_loops: Vec<LoopOutcome>,
}

impl HartreeFock {
    pub fn new(wf: Wavefunction, settings: &HartreeFockSettings) -> Result<Self, HartreeFockError> {
        let method: HfMethod = settings.method.parse()?;
        let exchange = ExchangePotentialBuilder::new(ExchangeConfig {
            ratio_threshold: settings.exchange_threshold,
            ..ExchangeConfig::default()
        });
        Ok(Self {
            wf,
            method,
            strategy: method.strategy(),
            eps_hf: parse_eps(settings.eps_hf),
            explicit_orthog_core: settings.explicit_orthog_core,
            explicit_orthog_valence: settings.explicit_orthog_valence,
            table: CoulombTable::new(exchange.config().skip_zero),
            exchange,
            vex_core: Vec::new(),
            vex_valence: HashMap::new(),
            core_loop: LoopOutcome::trivial(),
            core_refinement: None,
            valence_loops: Vec::new(),
        })
    }

    /// Builds the grid, nucleus and engine described by a run configuration.
    pub fn from_config(config: &RunConfig) -> Result<Self, HartreeFockError> {
        config.validate()?;
        let kind = match config.grid.b {
            Some(b) if b > 0.0 => GridKind::LogLinear { b },
            _ => GridKind::Logarithmic,
        };
        let grid = RadialGrid::new(config.grid.r0, config.grid.rmax, config.grid.points, kind)?;
        let nucleus = Nucleus::from_config(config.nucleus.z, config.nucleus.mass_number)?;
        let wf = Wavefunction::new(
            Arc::new(grid),
            nucleus,
            ALPHA * config.hartree_fock.alpha_scale,
            AdamsIntegrator::new(DEFAULT_ORDER)?,
        );
        Self::new(wf, &config.hartree_fock)
    }

    pub fn method(&self) -> HfMethod {
        self.method
    }

    pub fn eps_hf(&self) -> f64 {
        self.eps_hf
    }

    pub fn wavefunction(&self) -> &Wavefunction {
        &self.wf
    }

    pub fn into_wavefunction(self) -> Wavefunction {
        self.wf
    }

    pub fn core(&self) -> &[DiracSpinor] {
        &self.wf.core
    }

    pub fn valence(&self) -> &[DiracSpinor] {
        &self.wf.valence
    }

    pub fn table(&self) -> &CoulombTable {
        &self.table
    }

    pub fn exchange_builder(&self) -> &ExchangePotentialBuilder {
        &self.exchange
    }

    pub fn vdir(&self) -> &[f64] {
        &self.wf.vdir
    }

    /// Local exchange potential last used for `psi`, if it is a known orbital.
    pub fn vex(&self, psi: &DiracSpinor) -> Option<&[f64]> {
        if let Some(index) = self.wf.core_index(psi.n, psi.kappa) {
            return self.vex_core.get(index).map(Vec::as_slice);
        }
        self.vex_valence
            .get(&(psi.n, psi.kappa))
            .map(Vec::as_slice)
    }

    /// Exact exchange action of the core on `psi`, recognising core orbitals.
    pub fn vex_action(&self, psi: &DiracSpinor) -> DiracSpinor {
        if !self.strategy.include_exchange() {
            return DiracSpinor::zeroed_like(psi);
        }
        let slot = self
            .wf
            .core_index(psi.n, psi.kappa)
            .map_or(OrbitalSlot::Outside, OrbitalSlot::Core);
        let source = match slot {
            OrbitalSlot::Core(_) => YkSource::Table(&self.table),
            OrbitalSlot::Outside => YkSource::OnTheFly { k_cut: None },
        };
        self.exchange.exact_action(psi, slot, &self.wf.core, source)
    }

    /// Sets up the core described by `core` and iterates it to
    /// self-consistency (or just solves it, for parametric methods).
    pub fn run(&mut self, core: &str) -> Result<HartreeFockReport, HartreeFockError> {
        let shells = parse_core(core)?;
        info!(
            method = %self.method,
            z = self.wf.z(),
            core = %core,
            eps = self.eps_hf,
            "starting Hartree-Fock"
        );
        self.starting_approximation(&shells)?;
        if self.strategy.self_consistent() {
            self.hartree_fock_core()?;
        } else {
            self.table.form_core_core(&self.wf.core);
            self.vex_core = vec![vec![0.0; self.size()]; self.wf.core.len()];
            self.core_loop = LoopOutcome::trivial();
        }
        let report = self.report();
        info!(
            iterations = report.core_loop.iterations,
            eps = report.core_loop.eps,
            energy = report.core_energy,
            "core finished"
        );
        Ok(report)
    }

    /// Adds and solves every valence orbital listed in `valence`.
    pub fn run_valence(&mut self, valence: &str) -> Result<HartreeFockReport, HartreeFockError> {
        for (n, kappa) in parse_valence(valence)? {
            self.solve_new_valence(n, kappa)?;
        }
        Ok(self.report())
    }

    pub fn report(&self) -> HartreeFockReport {
        let mut orbitals: Vec<OrbitalSummary> = self
            .wf
            .core
            .iter()
            .map(|psi| OrbitalSummary::new(psi, true))
            .collect();
        orbitals.extend(self.wf.valence.iter().map(|psi| OrbitalSummary::new(psi, false)));
        HartreeFockReport {
            method: self.method,
            z: self.wf.z(),
            eps_target: self.eps_hf,
            core_loop: self.core_loop.clone(),
            core_refinement: self.core_refinement.clone(),
            valence: self.valence_loops.clone(),
            core_energy: self.core_energy(),
            orbitals,
        }
    }

    pub fn core_energy(&self) -> f64 {
        core_energy(&self.wf.core, &self.table)
    }

    fn size(&self) -> usize {
        self.wf.grid().num_points()
    }

    fn starting_approximation(&mut self, shells: &[ShellOccupancy]) -> Result<(), HartreeFockError> {
        let num_electrons: f64 = shells.iter().map(|shell| f64::from(shell.electrons)).sum();
        self.wf.vdir =
            self.strategy
                .starting_potential(self.wf.z(), self.wf.grid().r(), num_electrons);
        let log_eps = if self.strategy.self_consistent() {
            LOG_EPS_INITIAL
        } else {
            LOG_EPS_FINAL
        };
        self.wf.solve_initial_core(shells, log_eps)?;
        self.wf.valence.clear();
        self.vex_valence.clear();
        self.valence_loops.clear();
        self.core_refinement = None;
        Ok(())
    }

    fn local_exchange_core(&self) -> Vec<Vec<f64>> {
        if self.strategy.include_exchange() {
            self.exchange.approx_local_core(&self.wf.core, &self.table)
        } else {
            vec![vec![0.0; self.size()]; self.wf.core.len()]
        }
    }

    /// Self-consistency loop over the core in the local exchange
    /// approximation, followed by the exact-exchange refinement when the
    /// method asks for it.
    pub fn hartree_fock_core(&mut self) -> Result<LoopOutcome, HartreeFockError> {
        if self.wf.core.is_empty() {
            self.wf.vdir = vec![0.0; self.size()];
            self.vex_core.clear();
            self.table.clear();
            self.core_loop = LoopOutcome::trivial();
            return Ok(self.core_loop.clone());
        }

        let refine = self.strategy.refine(self.wf.core.len());
        let eps_target = if refine { PRE_REFINE_EPS } else { self.eps_hf };

        self.table.form_core_core(&self.wf.core);
        self.vex_core = self.local_exchange_core();

        let mut outcome = LoopOutcome {
            iterations: 0,
            eps: f64::INFINITY,
            converged: false,
            worst_orbital: None,
        };
        let mut prev_eps = f64::INFINITY;
        for hits in 1..=MAX_HART_ITS {
            let eta = core_eta(hits);
            let vdir_old = self.wf.vdir.clone();
            let vex_old = std::mem::take(&mut self.vex_core);

            self.table.form_core_core(&self.wf.core);
            let mut vdir = direct_potential(&self.wf.core, &self.table, self.size());
            mix_into(&mut vdir, &vdir_old, eta);
            self.wf.vdir = vdir;
            let mut vex = self.local_exchange_core();
            for (new, old) in vex.iter_mut().zip(&vex_old) {
                mix_into(new, old, eta);
            }
            self.vex_core = vex;

            let wf = &self.wf;
            let vex = &self.vex_core;
            let solved = try_map_batch(wf.core.len(), |a| {
                let mut psi = wf.core[a].clone();
                let en_old = psi.en;
                let dv: Vec<f64> = (0..wf.vdir.len())
                    .map(|i| wf.vdir[i] - vdir_old[i] + vex[a][i] - vex_old[a][i])
                    .collect();
                let de = energy_shift(&psi, &dv);
                let guess = if en_old < -de { en_old + de } else { en_old };
                wf.solve_dirac(&mut psi, guess, Some(&vex[a]), LOG_EPS_CORE_LOOP)?;
                let eps = fractional_change(psi.en, en_old);
                Ok::<_, HartreeFockError>((psi, eps))
            })?;

            let (eps, worst) = worst_of(solved.iter().map(|(psi, eps)| (psi, *eps)));
            self.wf.core = solved.into_iter().map(|(psi, _)| psi).collect();
            if self.explicit_orthog_core {
                orthonormalise_core(&mut self.wf.core, CORE_SWEEPS);
            }
            debug!(iteration = hits, eta, eps, worst = %worst, "core iteration");

            outcome.iterations = hits;
            outcome.eps = eps;
            outcome.worst_orbital = Some(worst);
            let getting_worse = hits > WORSE_GRACE && eps > prev_eps && eps < PRE_REFINE_EPS;
            if eps < eps_target || getting_worse {
                outcome.converged = true;
                break;
            }
            prev_eps = eps;
        }

        self.final_core_solve()?;
        if !outcome.converged {
            warn!(
                iterations = outcome.iterations,
                eps = outcome.eps,
                worst = outcome.worst_orbital.as_deref().unwrap_or("-"),
                "core did not converge"
            );
        }
        self.core_loop = outcome.clone();

        if refine {
            let refinement = self.refine_core_orbitals_exchange()?;
            self.core_loop.converged = refinement.converged;
            self.core_refinement = Some(refinement);
        }
        Ok(self.core_loop.clone())
    }

    fn final_core_solve(&mut self) -> Result<(), HartreeFockError> {
        let wf = &self.wf;
        let vex = &self.vex_core;
        let solved = try_map_batch(wf.core.len(), |a| {
            let mut psi = wf.core[a].clone();
            let en = psi.en;
            wf.solve_dirac(&mut psi, en, Some(&vex[a]), LOG_EPS_FINAL)?;
            Ok::<_, HartreeFockError>(psi)
        })?;
        self.wf.core = solved;
        if self.explicit_orthog_core {
            orthonormalise_core(&mut self.wf.core, CORE_SWEEPS);
        }
        self.table.form_core_core(&self.wf.core);
        Ok(())
    }

    /// Exact-exchange refinement of the whole core.
    ///
    /// Each iteration solves (H_l − ε)X = −(v₀ + V_ex)φ for every orbital
    /// against a snapshot of the previous iteration. Oscillation aborts the
    /// stage and restores the best core seen.
    pub fn refine_core_orbitals_exchange(&mut self) -> Result<LoopOutcome, HartreeFockError> {
        let count = self.wf.core.len();
        if count < 2 || !self.strategy.include_exchange() {
            return Ok(LoopOutcome::trivial());
        }

        let f_core = (count as f64 - 1.0) / count as f64;
        let core0 = self.wf.core.clone();
        let vex0 = self.vex_core.clone();
        let vd0 = self.wf.vdir.clone();

        let mut state = IterationState::default();
        let mut extra = 0.0;
        let mut best = (f64::INFINITY, self.wf.core.clone(), self.wf.vdir.clone());
        let mut outcome = LoopOutcome {
            iterations: 0,
            eps: f64::INFINITY,
            converged: false,
            worst_orbital: None,
        };

        for it in 0..MAX_HART_ITS {
            state.index = it;
            state.damping = CORE_REFINE_DAMP.at(it) + extra;

            let vd = self.wf.vdir.clone();
            let vl: Vec<f64> = self
                .wf
                .vnuc()
                .iter()
                .zip(&vd)
                .map(|(vn, v)| vn + f_core * v)
                .collect();
            let v0: Vec<f64> = vd.iter().map(|v| (1.0 - f_core) * v).collect();

            let previous = &self.wf.core;
            let table = &self.table;
            let damping = state.damping;
            let this = &*self;
            let updated = try_map_batch(count, |a| {
                let phi = &previous[a];
                let phi0 = &core0[a];
                let vx_phi =
                    this.exchange
                        .exact_action(phi, OrbitalSlot::Core(a), previous, YkSource::Table(table));
                let numerator = phi0.overlap(&vx_phi) - phi.overlap(&phi0.times_potential(&vex0[a]))
                    + phi0.overlap(&phi.times_potential(&vd))
                    - phi.overlap(&phi0.times_potential(&vd0));
                let en = phi0.en + numerator / phi.overlap(phi0);

                let nonlocal = phi.times_potential(&v0) + &vx_phi;
                let response = |d: &DiracSpinor| {
                    d.times_potential(&v0)
                        + &this.exchange.exact_action(
                            d,
                            OrbitalSlot::Core(a),
                            previous,
                            YkSource::OnTheFly { k_cut: Some(RESPONSE_K_CUT) },
                        )
                };
                let x = this.hf_orbital(phi, en, &vl, &nonlocal, Some(&response))?;
                let en_new = x.en;

                let mut next = x * (1.0 - damping) + &(phi * damping);
                next.en = en_new;
                next.eps = fractional_change(en_new, phi.en);
                next.its = it + 1;
                next.pinf = phi.pinf.max(next.pinf);
                next.zero_beyond_pinf();
                Ok::<_, HartreeFockError>(next)
            });
            let updated = match updated {
                Ok(updated) => updated,
                Err(error) => {
                    warn!(iteration = it + 1, %error, best = best.0, "core refinement step failed, keeping best");
                    break;
                }
            };

            let (eps, worst) = worst_of(updated.iter().map(|psi| (psi, psi.eps)));
            self.wf.core = updated;
            if self.explicit_orthog_core {
                orthonormalise_core(&mut self.wf.core, CORE_SWEEPS);
            } else {
                for psi in &mut self.wf.core {
                    psi.normalise();
                }
            }
            self.table.form_core_core(&self.wf.core);
            self.wf.vdir = direct_potential(&self.wf.core, &self.table, self.size());

            state.record(eps, WORSE_GRACE, REFINE_WORSE_FACTOR);
            outcome.iterations = it + 1;
            outcome.eps = eps;
            outcome.worst_orbital = Some(worst.clone());
            debug!(iteration = it + 1, damping, eps, worst = %worst, "core refinement");

            if eps < best.0 {
                best = (eps, self.wf.core.clone(), self.wf.vdir.clone());
            }
            if eps < self.eps_hf {
                outcome.converged = true;
                break;
            }
            if state.worse_count > 0 {
                extra = if extra > 0.0 { 0.0 } else { CORE_REFINE_EXTRA };
            }
            if state.worse_count > CORE_REFINE_MAX_WORSE || state.diverging(REFINE_DIVERGE_FACTOR) {
                info!(iteration = it + 1, eps, best = best.0, "core refinement oscillating, keeping best");
                break;
            }
        }

        if !outcome.converged && best.0 < outcome.eps {
            let (eps, core, vdir) = best;
            self.wf.core = core;
            self.wf.vdir = vdir;
            self.table.form_core_core(&self.wf.core);
            outcome.eps = eps;
        }
        if !outcome.converged {
            warn!(
                iterations = outcome.iterations,
                eps = outcome.eps,
                worst = outcome.worst_orbital.as_deref().unwrap_or("-"),
                "core refinement did not reach target"
            );
        }
        self.vex_core = self.local_exchange_core();
        Ok(outcome)
    }

    /// Adds valence orbital (n, κ), solves it in the frozen core and returns
    /// its index in the valence list.
    pub fn solve_new_valence(&mut self, n: i32, kappa: i32) -> Result<usize, HartreeFockError> {
        let mut psi = DiracSpinor::new(n, kappa, self.wf.grid_handle());
        if self.wf.core_index(n, kappa).is_some() {
            return Err(HartreeFockError::ValenceInCore(psi.symbol()));
        }
        psi.occ_frac = 1.0 / psi.twojp1();
        let z_ion = (self.wf.nucleus().charge() - self.wf.num_core_electrons()).max(1.0);
        let guess = -0.5 * (z_ion / f64::from(n)).powi(2);
        self.wf.solve_dirac(&mut psi, guess, None, LOG_EPS_FINAL)?;

        let index = match self.wf.valence_index(n, kappa) {
            Some(index) => {
                self.wf.valence[index] = psi;
                index
            }
            None => {
                self.wf.valence.push(psi);
                self.wf.valence.len() - 1
            }
        };
        let outcome = self.solve_valence(index)?;
        self.valence_loops.push(outcome);
        Ok(index)
    }

    /// Iterates valence orbital `index` to self-consistency with the core's
    /// exchange, then refines it with exact exchange for the full method.
    pub fn solve_valence(&mut self, index: usize) -> Result<LoopOutcome, HartreeFockError> {
        let key = {
            let psi = &self.wf.valence[index];
            (psi.n, psi.kappa)
        };
        let size = self.size();
        if self.wf.core.is_empty() || !self.strategy.include_exchange() {
            let mut psi = self.wf.valence[index].clone();
            let en = psi.en;
            self.wf.solve_dirac(&mut psi, en, None, LOG_EPS_FINAL)?;
            self.wf.valence[index] = psi;
            self.vex_valence.insert(key, vec![0.0; size]);
            return Ok(LoopOutcome::trivial());
        }

        let refine = self.strategy.refine_valence();
        let eps_target = if refine { PRE_REFINE_EPS } else { self.eps_hf };

        self.table
            .form_core_valence(&self.wf.core, &self.wf.valence[index]);
        let mut vex = self.exchange.approx_local(
            &self.wf.valence[index],
            OrbitalSlot::Outside,
            &self.wf.core,
            YkSource::Table(&self.table),
        );

        let mut outcome = LoopOutcome {
            iterations: 0,
            eps: f64::INFINITY,
            converged: false,
            worst_orbital: Some(self.wf.valence[index].symbol()),
        };
        let mut prev_eps = f64::INFINITY;
        for hits in 1..=MAX_HART_ITS {
            let eta = valence_eta(hits);
            let vex_old = vex;
            let mut psi = self.wf.valence[index].clone();
            self.table.form_core_valence(&self.wf.core, &psi);
            vex = self.exchange.approx_local(
                &psi,
                OrbitalSlot::Outside,
                &self.wf.core,
                YkSource::Table(&self.table),
            );
            mix_into(&mut vex, &vex_old, eta);

            let en_old = psi.en;
            let dv: Vec<f64> = vex.iter().zip(&vex_old).map(|(new, old)| new - old).collect();
            let de = energy_shift(&psi, &dv);
            let guess = if en_old < -de { en_old + de } else { en_old };
            self.wf.solve_dirac(&mut psi, guess, Some(&vex), LOG_EPS_FINAL)?;
            if self.explicit_orthog_valence {
                orthonormalise_wrt_core(&mut psi, &self.wf.core);
            }
            let eps = fractional_change(psi.en, en_old);
            self.wf.valence[index] = psi;
            debug!(iteration = hits, eta, eps, orbital = ?key, "valence iteration");

            outcome.iterations = hits;
            outcome.eps = eps;
            let getting_worse = hits > WORSE_GRACE && eps >= prev_eps && eps < PRE_REFINE_EPS;
            if eps < eps_target || getting_worse {
                outcome.converged = true;
                break;
            }
            prev_eps = eps;
        }

        let mut psi = self.wf.valence[index].clone();
        let en = psi.en;
        self.wf.solve_dirac(&mut psi, en, Some(&vex), LOG_EPS_FINAL)?;
        if self.explicit_orthog_valence {
            orthonormalise_wrt_core(&mut psi, &self.wf.core);
        }
        self.wf.valence[index] = psi;
        self.vex_valence.insert(key, vex);

        if !outcome.converged {
            warn!(
                iterations = outcome.iterations,
                eps = outcome.eps,
                orbital = outcome.worst_orbital.as_deref().unwrap_or("-"),
                "valence orbital did not converge"
            );
        }
        if refine {
            let refinement = self.refine_valence_orbital_exchange(index)?;
            outcome.converged = refinement.converged;
            outcome.eps = refinement.eps;
            outcome.iterations += refinement.iterations;
        }
        self.table
            .form_core_valence(&self.wf.core, &self.wf.valence[index]);
        Ok(outcome)
    }

    /// Exact-exchange refinement of one valence orbital in the frozen core.
    pub fn refine_valence_orbital_exchange(&mut self, index: usize) -> Result<LoopOutcome, HartreeFockError> {
        if self.wf.core.is_empty() || !self.strategy.include_exchange() {
            return Ok(LoopOutcome::trivial());
        }
        let phi0 = self.wf.valence[index].clone();
        let vex0 = self
            .vex_valence
            .get(&(phi0.n, phi0.kappa))
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.size()]);
        let vl = self.wf.local_potential(None);

        let mut state = IterationState::default();
        let mut extra = 0.0;
        let mut best = (f64::INFINITY, phi0.clone());
        let mut outcome = LoopOutcome {
            iterations: 0,
            eps: f64::INFINITY,
            converged: false,
            worst_orbital: Some(phi0.symbol()),
        };

        for it in 0..MAX_HART_ITS {
            state.index = it;
            state.damping = VALENCE_REFINE_DAMP.at(it) + extra;

            let phi = self.wf.valence[index].clone();
            self.table.form_core_valence(&self.wf.core, &phi);
            let core = &self.wf.core;
            let vx_phi =
                self.exchange
                    .exact_action(&phi, OrbitalSlot::Outside, core, YkSource::Table(&self.table));
            let en = phi0.en
                + (phi0.overlap(&vx_phi) - phi.overlap(&phi0.times_potential(&vex0)))
                    / phi.overlap(&phi0);

            let response = |d: &DiracSpinor| {
                self.exchange.exact_action(
                    d,
                    OrbitalSlot::Outside,
                    core,
                    YkSource::OnTheFly { k_cut: Some(RESPONSE_K_CUT) },
                )
            };
            let x = match self.hf_orbital(&phi, en, &vl, &vx_phi, Some(&response)) {
                Ok(x) => x,
                Err(error) => {
                    warn!(iteration = it + 1, %error, best = best.0, "valence refinement step failed, keeping best");
                    break;
                }
            };
            let en_new = x.en;

            let damping = state.damping;
            let mut next = x * (1.0 - damping) + &(&phi * damping);
            next.en = en_new;
            next.pinf = phi.pinf.max(next.pinf);
            next.zero_beyond_pinf();
            if self.explicit_orthog_valence {
                orthonormalise_wrt_core(&mut next, &self.wf.core);
            } else {
                next.normalise();
            }
            let eps = fractional_change(next.en, phi.en);
            next.eps = eps;
            next.its = it + 1;
            self.wf.valence[index] = next;

            state.record(eps, WORSE_GRACE, REFINE_WORSE_FACTOR);
            outcome.iterations = it + 1;
            outcome.eps = eps;
            debug!(iteration = it + 1, damping, eps, "valence refinement");

            if eps < best.0 {
                best = (eps, self.wf.valence[index].clone());
            }
            if it > 0 && eps < self.eps_hf {
                outcome.converged = true;
                break;
            }
            if state.worse_count > 0 {
                extra = if extra > 0.0 { 0.0 } else { VALENCE_REFINE_EXTRA };
            }
            if state.worse_count > VALENCE_REFINE_MAX_WORSE || state.diverging(REFINE_DIVERGE_FACTOR) {
                info!(iteration = it + 1, eps, best = best.0, "valence refinement oscillating, keeping best");
                break;
            }
        }

        if !outcome.converged && best.0 < outcome.eps {
            outcome.eps = best.0;
            self.wf.valence[index] = best.1;
        }
        if !outcome.converged {
            warn!(
                iterations = outcome.iterations,
                eps = outcome.eps,
                orbital = outcome.worst_orbital.as_deref().unwrap_or("-"),
                "valence refinement did not reach target"
            );
        }
        Ok(outcome)
    }

    /// Solves (H_l − ε)X = −N for the non-local term N = V·φ, then adjusts
    /// ε by Newton steps on ⟨X|X⟩ = 1.
    ///
    /// Each step moves X along δX, the first-order change per unit energy,
    /// from (H_l − ε)δX = X − R·δX with `response` as R (taken as zero when
    /// absent). The homogeneous solutions at the starting energy are reused
    /// throughout.
    pub fn hf_orbital(
        &self,
        phi: &DiracSpinor,
        en_guess: f64,
        vl: &[f64],
        nonlocal: &DiracSpinor,
        response: Option<&dyn Fn(&DiracSpinor) -> DiracSpinor>,
    ) -> Result<DiracSpinor, HartreeFockError> {
        let solver = self.wf.solver();
        let alpha = solver.alpha();
        let mut en = if en_guess < 0.0 { en_guess } else { phi.en };

        let x0 = regular_at_origin(solver, phi, en, vl, None)?;
        let xinf = regular_at_infinity(solver, phi, en, vl, None)?;
        let mut x = green_solution(&x0, &xinf, &(nonlocal * -1.0), alpha)?;
        let mut dx = green_solution(&x0, &xinf, &x, alpha)?;

        let mut eps = f64::INFINITY;
        let mut tries = 0;
        while tries < MAX_HART_ITS {
            let slope = x.overlap(&dx);
            if slope == 0.0 || !slope.is_finite() {
                break;
            }
            let mut delta = -0.5 * (x.norm2() - 1.0) / slope;
            if en + delta >= 0.0 {
                delta = -0.5 * en;
            }
            en += delta;
            x += &(&dx * delta);
            tries += 1;
            eps = (delta / en).abs();
            if eps < self.eps_hf {
                break;
            }
            dx = match response {
                Some(response) => green_solution(&x0, &xinf, &(x.clone() - &response(&dx)), alpha)?,
                None => green_solution(&x0, &xinf, &x, alpha)?,
            };
        }
        trace!(orbital = %phi.symbol(), tries, eps, en, "hf orbital");
        x.en = en;
        x.eps = eps;
        x.its = tries;
        x.n = phi.n;
        x.kappa = phi.kappa;
        x.occ_frac = phi.occ_frac;
        Ok(x)
    }
}

/// v_dir = Σ_b (2j_b+1)·occ_b·y⁰_bb.
pub fn direct_potential(core: &[DiracSpinor], table: &CoulombTable, size: usize) -> Vec<f64> {
    let mut vdir = vec![0.0; size];
    for (b, psi) in core.iter().enumerate() {
        let weight = psi.num_electrons();
        let y0 = match table.y0_core(b) {
            Some(y0) => y0.to_vec(),
            None => crate::coulomb::yk_ab(0, psi, psi),
        };
        for (value, y) in vdir.iter_mut().zip(&y0) {
            *value += weight * y;
        }
    }
    vdir
}

/// First-order energy shift ⟨f|δv|f⟩ sampled on every fifth point.
fn energy_shift(psi: &DiracSpinor, dv: &[f64]) -> f64 {
    let grid = psi.grid();
    let drdu = grid.drdu();
    let end = psi.pinf.min(dv.len());
    let sum: f64 = (0..end)
        .step_by(DE_STRIDE)
        .map(|i| dv[i] * psi.f[i] * psi.f[i] * drdu[i])
        .sum();
    sum * grid.du() * DE_STRIDE as f64
}

fn worst_of<'a>(items: impl Iterator<Item = (&'a DiracSpinor, f64)>) -> (f64, String) {
    items.fold((0.0, String::from("-")), |(eps, name), (psi, value)| {
        if value >= eps {
            (value, psi.symbol())
        } else {
            (eps, name)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{HartreeFock, HartreeFockError, HfMethod, direct_potential, energy_shift};
    use crate::common::config::{ConfigError, RunConfig};
    use crate::common::constants::ALPHA;
    use crate::coulomb::{CoulombTable, yk_ab};
    use crate::dirac::bound::solve_new_orbital;

    fn config(z: u32, method: &str) -> RunConfig {
        let mut config = RunConfig::default();
        config.nucleus.z = z;
        config.hartree_fock.method = method.to_string();
        config
    }

    fn exact_dirac_coulomb(n: i32, kappa: i32, z: f64) -> f64 {
        let az = ALPHA * z;
        let k = f64::from(kappa.abs());
        let gamma = (k * k - az * az).sqrt();
        let x = (az / (f64::from(n) - k + gamma)).powi(2);
        (1.0 / (1.0 + x).sqrt() - 1.0) / (ALPHA * ALPHA)
    }

    #[test]
    fn unknown_method_is_fatal() {
        let error = HartreeFock::from_config(&config(2, "Slater")).expect_err("unknown method");
        assert_eq!(
            error,
            HartreeFockError::Config(ConfigError::UnknownMethod("Slater".to_string()))
        );
    }

    #[test]
    fn empty_core_is_hydrogen_like() {
        let mut hf = HartreeFock::from_config(&config(3, "HartreeFock")).expect("engine");
        let report = hf.run("").expect("empty core");
        assert!(report.core_loop.converged);
        assert!(hf.vdir().iter().all(|v| *v == 0.0));

        hf.run_valence("2s").expect("valence");
        let psi = &hf.valence()[0];
        let exact = exact_dirac_coulomb(2, -1, 3.0);
        assert!((psi.en - exact).abs() < 1.0e-7 * exact.abs(), "{} vs {exact}", psi.en);
        assert_eq!(hf.core_energy(), 0.0);
    }

    #[test]
    fn helium_ground_state() {
        let mut hf = HartreeFock::from_config(&config(2, "HartreeFock")).expect("engine");
        let report = hf.run("1s2").expect("helium");
        assert!(report.converged());
        let psi = &hf.core()[0];
        assert_eq!(psi.count_nodes(), 0);
        assert!((psi.norm2() - 1.0).abs() < 1.0e-10);
        assert!((psi.en + 0.918).abs() < 2.0e-3, "1s energy {}", psi.en);
        assert!((report.core_energy + 2.8617).abs() < 5.0e-3, "total {}", report.core_energy);
        // A single orbital has no partner, so no refinement stage runs.
        assert!(report.core_refinement.is_none());
    }

    #[test]
    fn hartree_method_has_no_exchange() {
        let mut hf = HartreeFock::from_config(&config(3, "Hartree")).expect("engine");
        hf.run("1s2").expect("lithium ion");
        let psi = hf.core()[0].clone();
        assert!(hf.vex(&psi).expect("vex").iter().all(|v| *v == 0.0));
        // Without exchange the electron also repels itself: far less bound
        // than the Hartree-Fock value of about -2.79.
        assert!(psi.en < 0.0 && psi.en > -2.5, "1s energy {}", psi.en);
        assert_eq!(hf.vex_action(&psi).norm2(), 0.0);
    }

    #[test]
    fn converged_core_is_a_fixed_point() {
        let mut hf = HartreeFock::from_config(&config(4, "ApproxHF")).expect("engine");
        hf.run("1s2,2s2").expect("beryllium");
        let before: Vec<f64> = hf.core().iter().map(|psi| psi.en).collect();
        hf.hartree_fock_core().expect("second pass");
        for (psi, en) in hf.core().iter().zip(&before) {
            assert!(((psi.en - en) / en).abs() < 1.0e-6, "{} moved", psi.symbol());
            assert_eq!(psi.count_nodes(), psi.required_nodes());
        }
    }

    #[test]
    fn parametric_methods_skip_the_loop() {
        let mut hf = HartreeFock::from_config(&config(10, "GreenPRM")).expect("engine");
        let report = hf.run("[Ne]").expect("neon");
        assert_eq!(report.method, HfMethod::GreenPRM);
        assert_eq!(report.core_loop.iterations, 0);
        assert_eq!(hf.core().len(), 4);
        assert!(hf.core().iter().all(|psi| psi.en < 0.0));
    }

    #[test]
    fn direct_potential_sums_occupied_monopoles() {
        let mut hf = HartreeFock::from_config(&config(4, "GreenPRM")).expect("engine");
        hf.run("1s2,2s1").expect("core");
        let core = hf.core();
        let vdir = direct_potential(core, &CoulombTable::new(true), hf.wavefunction().grid().num_points());
        let y1 = yk_ab(0, &core[0], &core[0]);
        let y2 = yk_ab(0, &core[1], &core[1]);
        let i = 1500;
        assert!((vdir[i] - (2.0 * y1[i] + y2[i])).abs() < 1.0e-12 * vdir[i].abs());
    }

    #[test]
    fn normalisation_steps_converge_quadratically() {
        let hf = HartreeFock::from_config(&config(1, "Hartree")).expect("engine");
        let wf = hf.wavefunction();
        let vl = wf.vnuc().to_vec();
        let w: Vec<f64> = wf.grid().r().iter().map(|r| -0.3 * (-r).exp()).collect();
        let v: Vec<f64> = vl.iter().zip(&w).map(|(vn, wi)| vn + wi).collect();
        let phi = solve_new_orbital(wf.solver(), 1, -1, wf.grid_handle(), &v, -0.6, 15)
            .expect("bound state");

        // (H_l − E)φ = −w·φ, so the normalised solution sits at E.
        let nonlocal = phi.times_potential(&w);
        let x = hf
            .hf_orbital(&phi, phi.en * 1.001, &vl, &nonlocal, None)
            .expect("hf orbital");
        // Halving steps would need tens of iterations from a 1e-3 offset.
        assert!(x.its <= 6, "{} Newton steps", x.its);
        assert!((x.norm2() - 1.0).abs() < 1.0e-10, "norm {}", x.norm2());
        assert!(((x.en - phi.en) / phi.en).abs() < 1.0e-4, "{} vs {}", x.en, phi.en);
        assert!(x.overlap(&phi) > 0.9999);
    }

    #[test]
    fn failed_refinement_step_keeps_previous_core() {
        let mut hf = HartreeFock::from_config(&config(4, "ApproxHF")).expect("engine");
        hf.run("1s2,2s2").expect("beryllium");
        for psi in &mut hf.wf.core {
            psi.en = 1.0;
        }
        let before: Vec<Vec<f64>> = hf.core().iter().map(|psi| psi.f.clone()).collect();

        let outcome = hf
            .refine_core_orbitals_exchange()
            .expect("continuum energies end the stage without an error");
        assert!(!outcome.converged);
        for (psi, f) in hf.core().iter().zip(&before) {
            assert_eq!(&psi.f, f, "{} changed", psi.symbol());
        }
    }

    #[test]
    fn energy_shift_is_expectation_of_constant_shift() {
        let mut hf = HartreeFock::from_config(&config(2, "Hartree")).expect("engine");
        hf.run("1s2").expect("helium");
        let psi = &hf.core()[0];
        let dv = vec![0.01; hf.wavefunction().grid().num_points()];
        // Large component only, so slightly below 0.01.
        let de = energy_shift(psi, &dv);
        assert!((de - 0.01).abs() < 1.0e-4);
    }
}
