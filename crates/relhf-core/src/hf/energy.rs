//! Total core energy from orbital energies minus the double-counted
//! electron-electron interaction.

use crate::common::batch::map_batch;
use crate::coulomb::{CoulombTable, YkTerm, yk_terms};
use crate::dirac::spinor::DiracSpinor;
use crate::numerics::stable_sum;
use std::borrow::Cow;

/// E = Σ_a [x_a ε_a − ½(E_dir,a − E_exch,a)] with x = (2j+1)·occ.
///
/// Pairs missing from `table` are evaluated on the fly.
pub fn core_energy(core: &[DiracSpinor], table: &CoulombTable) -> f64 {
    let terms = |a: usize, b: usize| pair_terms(core, table, a, b);
    let per_orbital = map_batch(core.len(), |a| {
        let fa = &core[a];
        let xa = fa.num_electrons();

        let direct: f64 = core
            .iter()
            .enumerate()
            .map(|(b, fb)| {
                let xb = fb.num_electrons();
                let y0 = terms(b, b);
                y0.iter()
                    .find(|term| term.k == 0)
                    .map_or(0.0, |term| xa * xb * fa.overlap(&fa.times_potential(&term.yk)))
            })
            .sum();

        let exchange: f64 = core[..=a]
            .iter()
            .enumerate()
            .map(|(b, fb)| {
                let xb = fb.num_electrons();
                let weight = if a == b { 1.0 } else { 2.0 };
                terms(a, b)
                    .iter()
                    .filter(|term| term.lk != 0.0)
                    .map(|term| weight * xa * xb * term.lk * fa.overlap(&fb.times_potential(&term.yk)))
                    .sum::<f64>()
            })
            .sum();

        xa * fa.en - 0.5 * (direct - exchange)
    });
    stable_sum(&per_orbital)
}

fn pair_terms<'a>(
    core: &'a [DiracSpinor],
    table: &'a CoulombTable,
    a: usize,
    b: usize,
) -> Cow<'a, [YkTerm]> {
    match table.core_core(a, b) {
        Some(terms) => Cow::Borrowed(terms),
        None => Cow::Owned(yk_terms(&core[a], &core[b], true, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::core_energy;
    use crate::coulomb::CoulombTable;
    use crate::dirac::spinor::DiracSpinor;
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    #[test]
    fn two_electron_shell_counts_repulsion_once() {
        let grid = Arc::new(RadialGrid::new(1.0e-6, 50.0, 4000, GridKind::LogLinear { b: 4.0 }).expect("grid"));
        let zeta: f64 = 1.6875;
        let mut psi = DiracSpinor::new(1, -1, Arc::clone(&grid));
        for (i, r) in grid.r().iter().enumerate() {
            psi.f[i] = 2.0 * zeta.powf(1.5) * r * (-zeta * r).exp();
        }
        psi.en = -0.9;
        let core = vec![psi];

        let mut table = CoulombTable::new(true);
        table.form_core_core(&core);
        // 2ε − J with J = F0(1s,1s) = 5ζ/8.
        let expected = 2.0 * -0.9 - 5.0 * zeta / 8.0;
        assert!((core_energy(&core, &table) - expected).abs() < 1.0e-7);
        assert!((core_energy(&core, &CoulombTable::new(true)) - expected).abs() < 1.0e-7);
    }

    #[test]
    fn empty_core_has_zero_energy() {
        assert_eq!(core_energy(&[], &CoulombTable::new(true)), 0.0);
    }
}
