//! Exchange with the core: a local approximation for the main loop and the
//! exact non-local action for refinement.
//!
//! [V_ex F_a](r) = −Σ_b x_b Σ_k L_k(a,b)·y^k_ab(r)·F_b(r)

use crate::common::batch::map_batch;
use crate::coulomb::{CoulombTable, YkTerm, yk_terms};
use crate::dirac::spinor::DiracSpinor;
use std::borrow::Cow;

pub const DEFAULT_RATIO_THRESHOLD: f64 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeConfig {
    /// Points with |f_a| below this carry no partner contribution in the
    /// local approximation.
    pub ratio_threshold: f64,
    /// Skip multipoles with a vanishing angular factor and points with a
    /// vanishing ratio. Results are the same either way.
    pub skip_zero: bool,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            ratio_threshold: DEFAULT_RATIO_THRESHOLD,
            skip_zero: true,
        }
    }
}

/// Where the orbital being acted on lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrbitalSlot {
    /// Index into the core list.
    Core(usize),
    /// Valence orbital or any other spinor outside the core.
    Outside,
}

/// Where y^k_ab comes from.
#[derive(Debug, Clone, Copy)]
pub enum YkSource<'a> {
    /// Precomputed pairs; anything missing is evaluated on the fly.
    Table(&'a CoulombTable),
    /// Evaluated per call, with multipoles capped at `k_cut` when given.
    OnTheFly { k_cut: Option<i32> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExchangePotentialBuilder {
    config: ExchangeConfig,
}

impl ExchangePotentialBuilder {
    pub fn new(config: ExchangeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ExchangeConfig {
        self.config
    }

    /// Local potential v_ex,a with v_ex,a·F_a ≈ V_ex F_a.
    ///
    /// Partners contribute where |f_a| clears the ratio threshold. A core
    /// orbital's interaction with itself is exact and carries no occupation
    /// factor.
    pub fn approx_local(
        &self,
        a: &DiracSpinor,
        slot: OrbitalSlot,
        core: &[DiracSpinor],
        source: YkSource<'_>,
    ) -> Vec<f64> {
        let size = a.grid().num_points();
        let mut vex = vec![0.0; size];
        let mut ratio = vec![0.0; size];

        for (b_index, b) in core.iter().enumerate() {
            if slot == OrbitalSlot::Core(b_index) {
                continue;
            }
            let terms = self.pair_terms(a, slot, b, b_index, source);
            let x_b = b.twojp1() * b.occ_frac;
            let irmax = a.pinf.min(b.pinf).min(size);

            ratio.fill(0.0);
            for i in 0..irmax {
                if a.f[i].abs() < self.config.ratio_threshold {
                    continue;
                }
                let fa2 = a.f[i] * a.f[i] + a.g[i] * a.g[i];
                ratio[i] = -x_b * (a.f[i] * b.f[i] + a.g[i] * b.g[i]) / fa2;
            }

            for term in terms.iter() {
                if self.config.skip_zero && term.lk == 0.0 {
                    continue;
                }
                for i in 0..irmax {
                    if self.config.skip_zero && ratio[i] == 0.0 {
                        continue;
                    }
                    vex[i] += term.lk * term.yk[i] * ratio[i];
                }
            }
        }

        if let OrbitalSlot::Core(a_index) = slot {
            let terms = self.pair_terms(a, slot, a, a_index, source);
            let x_a = a.twojp1();
            for term in terms.iter() {
                if self.config.skip_zero && term.lk == 0.0 {
                    continue;
                }
                for (value, yk) in vex.iter_mut().zip(&term.yk) {
                    *value -= term.lk * yk * x_a;
                }
            }
        }
        vex
    }

    /// Local exchange potentials for every core orbital, one batch item per
    /// orbital.
    pub fn approx_local_core(&self, core: &[DiracSpinor], table: &CoulombTable) -> Vec<Vec<f64>> {
        map_batch(core.len(), |a| {
            self.approx_local(&core[a], OrbitalSlot::Core(a), core, YkSource::Table(table))
        })
    }

    /// Exact non-local exchange action V_ex F_a.
    pub fn exact_action(
        &self,
        a: &DiracSpinor,
        slot: OrbitalSlot,
        core: &[DiracSpinor],
        source: YkSource<'_>,
    ) -> DiracSpinor {
        let mut action = DiracSpinor::zeroed_like(a);
        let size = a.grid().num_points();

        for (b_index, b) in core.iter().enumerate() {
            let same = match slot {
                OrbitalSlot::Core(a_index) => a_index == b_index,
                OrbitalSlot::Outside => false,
            };
            let x_b = if same {
                b.twojp1()
            } else {
                b.twojp1() * b.occ_frac
            };
            let terms = self.pair_terms(a, slot, b, b_index, source);
            let irmax = b.pinf.min(size);
            for term in terms.iter() {
                if self.config.skip_zero && term.lk == 0.0 {
                    continue;
                }
                let factor = -x_b * term.lk;
                for i in 0..irmax {
                    let v = factor * term.yk[i];
                    action.f[i] += v * b.f[i];
                    action.g[i] += v * b.g[i];
                }
            }
        }
        action
    }

    fn pair_terms<'t>(
        &self,
        a: &DiracSpinor,
        slot: OrbitalSlot,
        b: &DiracSpinor,
        b_index: usize,
        source: YkSource<'t>,
    ) -> Cow<'t, [YkTerm]> {
        let k_cut = match source {
            YkSource::Table(table) => {
                let cached = match slot {
                    OrbitalSlot::Core(a_index) => table.core_core(a_index, b_index),
                    OrbitalSlot::Outside => table.core_valence(a, b_index),
                };
                if let Some(terms) = cached {
                    return Cow::Borrowed(terms);
                }
                None
            }
            YkSource::OnTheFly { k_cut } => k_cut,
        };
        Cow::Owned(yk_terms(a, b, self.config.skip_zero, k_cut))
    }
}

#[cfg(test)]
mod tests {
    use super::{ExchangeConfig, ExchangePotentialBuilder, OrbitalSlot, YkSource};
    use crate::coulomb::{CoulombTable, lk_coefficient, yk_ab};
    use crate::dirac::spinor::DiracSpinor;
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    fn grid() -> Arc<RadialGrid> {
        Arc::new(RadialGrid::new(1.0e-6, 60.0, 3000, GridKind::LogLinear { b: 4.0 }).expect("grid"))
    }

    fn orbital(grid: &Arc<RadialGrid>, n: i32, kappa: i32, shape: impl Fn(f64) -> f64) -> DiracSpinor {
        let mut psi = DiracSpinor::new(n, kappa, Arc::clone(grid));
        for (i, r) in grid.r().iter().enumerate() {
            psi.f[i] = shape(*r);
            psi.g[i] = 0.01 * shape(*r) / (1.0 + r);
        }
        psi.normalise();
        psi
    }

    fn neon_like_core(grid: &Arc<RadialGrid>) -> Vec<DiracSpinor> {
        vec![
            orbital(grid, 1, -1, |r| r * (-9.0 * r).exp()),
            orbital(grid, 2, -1, |r| r * (1.0 - 2.0 * r) * (-2.0 * r).exp()),
            orbital(grid, 2, 1, |r| r * r * (-2.0 * r).exp()),
            orbital(grid, 2, -2, |r| r * r * (-2.1 * r).exp()),
        ]
    }

    fn builder(skip_zero: bool) -> ExchangePotentialBuilder {
        ExchangePotentialBuilder::new(ExchangeConfig {
            skip_zero,
            ..ExchangeConfig::default()
        })
    }

    #[test]
    fn zero_skip_does_not_change_results() {
        let grid = grid();
        let core = neon_like_core(&grid);
        let valence = orbital(&grid, 3, 2, |r| r * r * r * (-0.7 * r).exp());

        let mut skipping = CoulombTable::new(true);
        skipping.form_core_core(&core);
        skipping.form_core_valence(&core, &valence);
        let mut full = CoulombTable::new(false);
        full.form_core_core(&core);
        full.form_core_valence(&core, &valence);

        let fast = builder(true).approx_local_core(&core, &skipping);
        let slow = builder(false).approx_local_core(&core, &full);
        for (a, b) in fast.iter().zip(&slow) {
            assert!(a.iter().zip(b).all(|(x, y)| (x - y).abs() <= 1.0e-14 * x.abs().max(1.0)));
        }

        let fast_v = builder(true).approx_local(&valence, OrbitalSlot::Outside, &core, YkSource::Table(&skipping));
        let slow_v = builder(false).approx_local(&valence, OrbitalSlot::Outside, &core, YkSource::Table(&full));
        assert!(fast_v.iter().zip(&slow_v).all(|(x, y)| (x - y).abs() <= 1.0e-14 * x.abs().max(1.0)));

        let fast_x = builder(true).exact_action(&valence, OrbitalSlot::Outside, &core, YkSource::OnTheFly { k_cut: None });
        let slow_x = builder(false).exact_action(&valence, OrbitalSlot::Outside, &core, YkSource::OnTheFly { k_cut: None });
        assert!((fast_x - &slow_x).norm2() < 1.0e-28);
    }

    #[test]
    fn single_orbital_core_keeps_only_the_self_term() {
        let grid = grid();
        let core = vec![orbital(&grid, 1, -1, |r| r * (-1.7 * r).exp())];
        let mut table = CoulombTable::new(true);
        table.form_core_core(&core);

        let vex = builder(true).approx_local(&core[0], OrbitalSlot::Core(0), &core, YkSource::Table(&table));
        // L_0(1s,1s) = 1/2 and 2j+1 = 2: the self term is −y⁰.
        let y0 = yk_ab(0, &core[0], &core[0]);
        assert!(vex.iter().zip(&y0).all(|(v, y)| (v + y).abs() < 1.0e-14 * y.abs().max(1.0)));

        // The exact action of the same core reproduces v_ex·F there.
        let action = builder(true).exact_action(&core[0], OrbitalSlot::Core(0), &core, YkSource::Table(&table));
        let local = core[0].times_potential(&vex);
        assert!((action - &local).norm2() < 1.0e-24);
    }

    #[test]
    fn empty_core_gives_zero_exchange() {
        let grid = grid();
        let valence = orbital(&grid, 2, -1, |r| r * (1.0 - 0.5 * r) * (-0.5 * r).exp());
        let table = CoulombTable::new(true);
        let vex = builder(true).approx_local(&valence, OrbitalSlot::Outside, &[], YkSource::Table(&table));
        assert!(vex.iter().all(|v| *v == 0.0));
        let action = builder(true).exact_action(&valence, OrbitalSlot::Outside, &[], YkSource::OnTheFly { k_cut: None });
        assert_eq!(action.norm2(), 0.0);
    }

    #[test]
    fn ratio_threshold_masks_small_amplitudes() {
        let grid = grid();
        let core = vec![orbital(&grid, 1, -1, |r| r * (-3.0 * r).exp())];
        let a = orbital(&grid, 2, 1, |r| r * r * (-1.0 * r).exp());
        let source = YkSource::OnTheFly { k_cut: None };

        let vex = builder(true).approx_local(&a, OrbitalSlot::Outside, &core, source);
        let y1 = yk_ab(1, &a, &core[0]);
        let l1 = lk_coefficient(1, a.kappa, core[0].kappa);
        let b = &core[0];
        for (i, v) in vex.iter().enumerate().take(a.pinf.min(b.pinf)) {
            if a.f[i].abs() < 1.0e-3 {
                assert_eq!(*v, 0.0, "masked point {i}");
            } else {
                let fa2 = a.f[i] * a.f[i] + a.g[i] * a.g[i];
                let expected = -2.0 * l1 * y1[i] * (a.f[i] * b.f[i] + a.g[i] * b.g[i]) / fa2;
                assert!((v - expected).abs() <= 1.0e-12 * expected.abs().max(1.0e-12));
            }
        }

        let loose = ExchangePotentialBuilder::new(ExchangeConfig {
            ratio_threshold: 0.05,
            skip_zero: true,
        })
        .approx_local(&a, OrbitalSlot::Outside, &core, source);
        let masked = |v: &[f64]| v.iter().filter(|x| **x == 0.0).count();
        assert!(masked(loose.as_slice()) > masked(vex.as_slice()));
    }
}
