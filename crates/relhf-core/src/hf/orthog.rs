//! Orthonormalisation of same-kappa orbitals.

use crate::dirac::spinor::DiracSpinor;

/// Symmetric sweeps over the core used by [`orthonormalise_core`].
pub const CORE_SWEEPS: usize = 2;

/// Makes same-kappa core orbitals mutually orthogonal and normalised.
///
/// Each pair sheds half its overlap onto the other so that no orbital is
/// singled out as the reference; a few sweeps converge to an orthonormal set.
pub fn orthonormalise_core(core: &mut [DiracSpinor], sweeps: usize) {
    for _ in 0..sweeps {
        for a in 0..core.len() {
            for b in (a + 1)..core.len() {
                if core[a].kappa != core[b].kappa {
                    continue;
                }
                let (head, tail) = core.split_at_mut(b);
                let (fa, fb) = (&mut head[a], &mut tail[0]);
                let overlap = fa.overlap(fb);
                let from_b = &*fb * (0.5 * overlap);
                let from_a = &*fa * (0.5 * overlap);
                *fa -= &from_b;
                *fb -= &from_a;
            }
        }
        for psi in core.iter_mut() {
            psi.normalise();
        }
    }
}

/// Projects out every same-kappa core orbital from `psi`, then normalises.
pub fn orthonormalise_wrt_core(psi: &mut DiracSpinor, core: &[DiracSpinor]) {
    let kappa = psi.kappa;
    for b in core.iter().filter(|b| b.kappa == kappa) {
        let overlap = psi.overlap(b);
        *psi -= &(b * overlap);
    }
    psi.normalise();
}

#[cfg(test)]
mod tests {
    use super::{orthonormalise_core, orthonormalise_wrt_core};
    use crate::dirac::spinor::DiracSpinor;
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    fn s_like(grid: &Arc<RadialGrid>, n: i32, zeta: f64) -> DiracSpinor {
        let mut psi = DiracSpinor::new(n, -1, Arc::clone(grid));
        for (i, r) in grid.r().iter().enumerate() {
            psi.f[i] = r.powi(n) * (-zeta * r).exp();
        }
        psi.normalise();
        psi
    }

    #[test]
    fn core_sweeps_orthonormalise_same_kappa() {
        let grid = Arc::new(RadialGrid::new(1.0e-5, 50.0, 2000, GridKind::Logarithmic).expect("grid"));
        let mut core = vec![s_like(&grid, 1, 2.0), s_like(&grid, 2, 1.0), s_like(&grid, 3, 0.7)];
        assert!(core[0].overlap(&core[1]).abs() > 0.1);

        orthonormalise_core(&mut core, 6);
        for a in 0..core.len() {
            assert!((core[a].norm2() - 1.0).abs() < 1.0e-10);
            for b in (a + 1)..core.len() {
                assert!(core[a].overlap(&core[b]).abs() < 1.0e-6, "<{a}|{b}>");
            }
        }
    }

    #[test]
    fn projection_removes_core_overlap() {
        let grid = Arc::new(RadialGrid::new(1.0e-5, 50.0, 2000, GridKind::Logarithmic).expect("grid"));
        let core = vec![s_like(&grid, 1, 2.0)];
        let mut valence = s_like(&grid, 2, 0.6);
        let mut other_kappa = valence.clone();
        other_kappa.kappa = 1;
        let before = other_kappa.clone();

        orthonormalise_wrt_core(&mut valence, &core);
        orthonormalise_wrt_core(&mut other_kappa, &core);
        assert!(valence.overlap(&core[0]).abs() < 1.0e-12);
        assert!((valence.norm2() - 1.0).abs() < 1.0e-12);
        assert!((other_kappa.clone() - &before).norm2() < 1.0e-24);
    }
}
