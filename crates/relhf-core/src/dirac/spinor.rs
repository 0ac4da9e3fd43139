use crate::numerics::radial::RadialGrid;
use crate::numerics::special::integration::integrate_product;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use std::sync::Arc;

const SPECTROSCOPIC: [char; 8] = ['s', 'p', 'd', 'f', 'g', 'h', 'i', 'k'];

/// Single-particle radial Dirac orbital: large component `f`, small
/// component `g`, sampled on a shared radial grid.
///
/// Values at and beyond `pinf` are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct DiracSpinor {
    pub n: i32,
    pub kappa: i32,
    pub en: f64,
    pub f: Vec<f64>,
    pub g: Vec<f64>,
    pub pinf: usize,
    pub occ_frac: f64,
    pub eps: f64,
    pub its: usize,
    grid: Arc<RadialGrid>,
}

impl DiracSpinor {
    pub fn new(n: i32, kappa: i32, grid: Arc<RadialGrid>) -> Self {
        let size = grid.num_points();
        Self {
            n,
            kappa,
            en: 0.0,
            f: vec![0.0; size],
            g: vec![0.0; size],
            pinf: size,
            occ_frac: 1.0,
            eps: 0.0,
            its: 0,
            grid,
        }
    }

    /// Zero-amplitude spinor with the same quantum numbers and grid.
    pub fn zeroed_like(other: &Self) -> Self {
        let mut spinor = Self::new(other.n, other.kappa, Arc::clone(&other.grid));
        spinor.en = other.en;
        spinor.occ_frac = other.occ_frac;
        spinor
    }

    pub fn grid(&self) -> &RadialGrid {
        &self.grid
    }

    pub fn grid_handle(&self) -> Arc<RadialGrid> {
        Arc::clone(&self.grid)
    }

    pub fn l(&self) -> i32 {
        l_of_kappa(self.kappa)
    }

    pub fn twoj(&self) -> i32 {
        twoj_of_kappa(self.kappa)
    }

    pub fn twojp1(&self) -> f64 {
        f64::from(self.twoj() + 1)
    }

    /// Number of electrons in the subshell, (2j+1)·occupation.
    pub fn num_electrons(&self) -> f64 {
        self.twojp1() * self.occ_frac
    }

    /// Nodes expected for a bound state: n - l - 1.
    pub fn required_nodes(&self) -> i32 {
        self.n - self.l() - 1
    }

    pub fn symbol(&self) -> String {
        let letter = usize::try_from(self.l())
            .ok()
            .and_then(|l| SPECTROSCOPIC.get(l).copied())
            .unwrap_or('?');
        format!("{}{}_{}/2", self.n, letter, self.twoj())
    }

    /// Radial overlap ∫(f₁f₂ + g₁g₂) dr.
    pub fn overlap(&self, other: &Self) -> f64 {
        let count = self.pinf.min(other.pinf);
        integrate_product(&self.grid, &self.f, &other.f, count)
            + integrate_product(&self.grid, &self.g, &other.g, count)
    }

    pub fn norm2(&self) -> f64 {
        self.overlap(self)
    }

    /// Scales to unit norm; a zero spinor is left untouched.
    pub fn normalise(&mut self) -> f64 {
        let norm2 = self.norm2();
        if norm2 > 0.0 {
            self.scale(1.0 / norm2.sqrt());
        }
        norm2
    }

    pub fn scale(&mut self, factor: f64) {
        for value in self.f.iter_mut().chain(self.g.iter_mut()) {
            *value *= factor;
        }
    }

    /// Sign changes of `f` between the origin and `pinf`.
    pub fn count_nodes(&self) -> i32 {
        count_sign_changes(&self.f[..self.pinf.min(self.f.len())])
    }

    pub fn zero_beyond_pinf(&mut self) {
        let pinf = self.pinf.min(self.f.len());
        self.f[pinf..].fill(0.0);
        self.g[pinf..].fill(0.0);
    }

    /// Pointwise product with a local potential, v(r)·F(r).
    pub fn times_potential(&self, v: &[f64]) -> Self {
        let mut out = self.clone();
        for (index, value) in v.iter().enumerate().take(out.f.len()) {
            out.f[index] *= value;
            out.g[index] *= value;
        }
        out
    }

    /// Largest |f| over the grid, used to scale sign tests.
    pub fn max_abs_f(&self) -> f64 {
        self.f.iter().fold(0.0_f64, |acc, value| acc.max(value.abs()))
    }
}

pub fn l_of_kappa(kappa: i32) -> i32 {
    if kappa > 0 { kappa } else { -kappa - 1 }
}

pub fn twoj_of_kappa(kappa: i32) -> i32 {
    2 * kappa.abs() - 1
}

pub(crate) fn count_sign_changes(values: &[f64]) -> i32 {
    let mut nodes = 0;
    let mut last_sign = 0.0;
    for &value in values {
        if value == 0.0 {
            continue;
        }
        let sign = value.signum();
        if last_sign != 0.0 && sign != last_sign {
            nodes += 1;
        }
        last_sign = sign;
    }
    nodes
}

impl AddAssign<&DiracSpinor> for DiracSpinor {
    fn add_assign(&mut self, rhs: &DiracSpinor) {
        for (lhs, value) in self.f.iter_mut().zip(&rhs.f) {
            *lhs += value;
        }
        for (lhs, value) in self.g.iter_mut().zip(&rhs.g) {
            *lhs += value;
        }
        self.pinf = self.pinf.max(rhs.pinf);
    }
}

impl SubAssign<&DiracSpinor> for DiracSpinor {
    fn sub_assign(&mut self, rhs: &DiracSpinor) {
        for (lhs, value) in self.f.iter_mut().zip(&rhs.f) {
            *lhs -= value;
        }
        for (lhs, value) in self.g.iter_mut().zip(&rhs.g) {
            *lhs -= value;
        }
        self.pinf = self.pinf.max(rhs.pinf);
    }
}

impl Add<&DiracSpinor> for DiracSpinor {
    type Output = DiracSpinor;

    fn add(mut self, rhs: &DiracSpinor) -> DiracSpinor {
        self += rhs;
        self
    }
}

impl Sub<&DiracSpinor> for DiracSpinor {
    type Output = DiracSpinor;

    fn sub(mut self, rhs: &DiracSpinor) -> DiracSpinor {
        self -= rhs;
        self
    }
}

impl Mul<f64> for DiracSpinor {
    type Output = DiracSpinor;

    fn mul(mut self, rhs: f64) -> DiracSpinor {
        self.scale(rhs);
        self
    }
}

impl Mul<f64> for &DiracSpinor {
    type Output = DiracSpinor;

    fn mul(self, rhs: f64) -> DiracSpinor {
        self.clone() * rhs
    }
}

#[cfg(test)]
mod tests {
    use super::{DiracSpinor, l_of_kappa, twoj_of_kappa};
    use crate::numerics::radial::{GridKind, RadialGrid};
    use std::sync::Arc;

    fn grid() -> Arc<RadialGrid> {
        Arc::new(RadialGrid::new(1.0e-6, 50.0, 1500, GridKind::Logarithmic).expect("grid"))
    }

    fn hydrogen_1s(grid: &Arc<RadialGrid>) -> DiracSpinor {
        let mut spinor = DiracSpinor::new(1, -1, Arc::clone(grid));
        for (index, r) in grid.r().iter().enumerate() {
            spinor.f[index] = 2.0 * r * (-r).exp();
        }
        spinor
    }

    #[test]
    fn quantum_numbers_follow_kappa() {
        assert_eq!((l_of_kappa(-1), twoj_of_kappa(-1)), (0, 1));
        assert_eq!((l_of_kappa(1), twoj_of_kappa(1)), (1, 1));
        assert_eq!((l_of_kappa(-2), twoj_of_kappa(-2)), (1, 3));
        assert_eq!((l_of_kappa(2), twoj_of_kappa(2)), (2, 3));

        let grid = grid();
        let spinor = DiracSpinor::new(3, 2, grid);
        assert_eq!(spinor.symbol(), "3d_3/2");
        assert_eq!(spinor.required_nodes(), 0);
        assert!((spinor.num_electrons() - 4.0).abs() < 1.0e-15);
    }

    #[test]
    fn analytic_orbital_is_normalised() {
        let grid = grid();
        let mut spinor = hydrogen_1s(&grid);
        assert!((spinor.norm2() - 1.0).abs() < 1.0e-10);

        spinor.scale(3.0);
        let before = spinor.normalise();
        assert!((before - 9.0).abs() < 1.0e-9);
        assert!((spinor.norm2() - 1.0).abs() < 1.0e-12);
    }

    #[test]
    fn arithmetic_combines_components() {
        let grid = grid();
        let a = hydrogen_1s(&grid);
        let doubled = a.clone() + &a;
        let zero = doubled.clone() - &(&a * 2.0);

        assert!((doubled.norm2() - 4.0).abs() < 1.0e-9);
        assert!(zero.f.iter().all(|value| value.abs() < 1.0e-15));
    }

    #[test]
    fn nodes_and_cutoff() {
        let grid = grid();
        let mut spinor = DiracSpinor::new(2, -1, Arc::clone(&grid));
        for (index, r) in grid.r().iter().enumerate() {
            spinor.f[index] = r * (1.0 - 0.5 * r) * (-0.5 * r).exp();
        }
        assert_eq!(spinor.count_nodes(), 1);

        spinor.pinf = grid.index_at_or_above(1.0);
        spinor.zero_beyond_pinf();
        assert_eq!(spinor.count_nodes(), 0);
        assert!(spinor.f[spinor.pinf..].iter().all(|value| *value == 0.0));
    }

    #[test]
    fn potential_product_is_pointwise() {
        let grid = grid();
        let spinor = hydrogen_1s(&grid);
        let v: Vec<f64> = grid.r().iter().map(|r| -1.0 / r).collect();

        // <1s| -1/r |1s> = -1
        let expectation = spinor.overlap(&spinor.times_potential(&v));
        assert!((expectation + 1.0).abs() < 1.0e-9);
    }
}
