//! Coulomb screening functions y^k_ab(r) and their cache.
//!
//! y^k_ab(r) = ∫ r_<^k / r_>^{k+1} ρ_ab(r′) dr′ with ρ_ab = f_a f_b + g_a g_b,
//! split into an inner integral weighted by r′^k and an outer one weighted
//! by r′^{−k−1}.

pub mod angular;

use crate::common::batch::map_batch;
use crate::dirac::spinor::DiracSpinor;
use crate::numerics::special::integration::{cumulative_from_origin, cumulative_to_infinity};
use std::collections::HashMap;
use tracing::trace;

pub use angular::{k_range, lk_coefficient, parity_allowed};

/// One multipole of a pair: y^k(r) and its angular factor L_k.
#[derive(Debug, Clone, PartialEq)]
pub struct YkTerm {
    pub k: i32,
    pub lk: f64,
    pub yk: Vec<f64>,
}

/// y^k_ab(r) on the full grid. Beyond the shorter practical infinity only
/// the monopole-like tail A/r^{k+1} survives.
pub fn yk_ab(k: i32, a: &DiracSpinor, b: &DiracSpinor) -> Vec<f64> {
    let grid = a.grid();
    let r = grid.r();
    let drdu = grid.drdu();
    let size = grid.num_points();
    let pinf = a.pinf.min(b.pinf).min(size);

    let rho: Vec<f64> = (0..pinf)
        .map(|i| (a.f[i] * b.f[i] + a.g[i] * b.g[i]) * drdu[i])
        .collect();
    let inner_y: Vec<f64> = rho
        .iter()
        .zip(r)
        .map(|(rho, r)| rho * r.powi(k))
        .collect();
    let outer_y: Vec<f64> = rho
        .iter()
        .zip(r)
        .map(|(rho, r)| rho / r.powi(k + 1))
        .collect();
    let inner = cumulative_from_origin(&inner_y, grid.du());
    let outer = cumulative_to_infinity(&outer_y, grid.du());

    let total = inner.last().copied().unwrap_or(0.0);
    (0..size)
        .map(|i| {
            if i < pinf {
                inner[i] / r[i].powi(k + 1) + r[i].powi(k) * outer[i]
            } else {
                total / r[i].powi(k + 1)
            }
        })
        .collect()
}

/// Every multipole coupling `a` and `b`, capped at `k_cut` when given.
///
/// With `skip_zero` the parity-forbidden multipoles (L_k = 0) are left out;
/// otherwise they are carried with a zero factor.
pub fn yk_terms(
    a: &DiracSpinor,
    b: &DiracSpinor,
    skip_zero: bool,
    k_cut: Option<i32>,
) -> Vec<YkTerm> {
    let range = k_range(a.kappa, b.kappa);
    let k_max = k_cut.map_or(*range.end(), |cut| cut.min(*range.end()));
    (*range.start()..=k_max)
        .filter_map(|k| {
            let lk = lk_coefficient(k, a.kappa, b.kappa);
            if skip_zero && lk == 0.0 {
                return None;
            }
            Some(YkTerm {
                k,
                lk,
                yk: yk_ab(k, a, b),
            })
        })
        .collect()
}

/// Cache of y^k functions between core pairs and between valence orbitals
/// and the core. Entries are stale once amplitudes change; rebuild with
/// [`CoulombTable::form_core_core`] / [`CoulombTable::form_core_valence`].
#[derive(Debug, Clone, Default)]
pub struct CoulombTable {
    skip_zero: bool,
    core_core: HashMap<(usize, usize), Vec<YkTerm>>,
    core_valence: HashMap<(i32, i32, usize), Vec<YkTerm>>,
}

impl CoulombTable {
    pub fn new(skip_zero: bool) -> Self {
        Self {
            skip_zero,
            ..Self::default()
        }
    }

    pub fn skip_zero(&self) -> bool {
        self.skip_zero
    }

    /// Recomputes every unordered core pair.
    pub fn form_core_core(&mut self, core: &[DiracSpinor]) {
        let pairs: Vec<(usize, usize)> = (0..core.len())
            .flat_map(|a| (a..core.len()).map(move |b| (a, b)))
            .collect();
        let skip_zero = self.skip_zero;
        let terms = map_batch(pairs.len(), |index| {
            let (a, b) = pairs[index];
            yk_terms(&core[a], &core[b], skip_zero, None)
        });
        self.core_core = pairs.into_iter().zip(terms).collect();
        trace!(pairs = self.core_core.len(), "core-core Coulomb table rebuilt");
    }

    /// Recomputes the pairs between `valence` and each core orbital.
    pub fn form_core_valence(&mut self, core: &[DiracSpinor], valence: &DiracSpinor) {
        let skip_zero = self.skip_zero;
        let terms = map_batch(core.len(), |b| yk_terms(valence, &core[b], skip_zero, None));
        for (b, terms) in terms.into_iter().enumerate() {
            self.core_valence
                .insert((valence.n, valence.kappa, b), terms);
        }
    }

    pub fn core_core(&self, a: usize, b: usize) -> Option<&[YkTerm]> {
        self.core_core
            .get(&(a.min(b), a.max(b)))
            .map(Vec::as_slice)
    }

    pub fn core_valence(&self, valence: &DiracSpinor, b: usize) -> Option<&[YkTerm]> {
        self.core_valence
            .get(&(valence.n, valence.kappa, b))
            .map(Vec::as_slice)
    }

    /// y⁰_bb for core orbital `b`.
    pub fn y0_core(&self, b: usize) -> Option<&[f64]> {
        self.core_core(b, b)?
            .iter()
            .find(|term| term.k == 0)
            .map(|term| term.yk.as_slice())
    }

    pub fn clear(&mut self) {
        self.core_core.clear();
        self.core_valence.clear();
    }
}
