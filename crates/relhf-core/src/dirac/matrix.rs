use super::spinor::DiracSpinor;
use crate::numerics::radial::RadialGrid;

/// Local coefficients of the radial Dirac equation at fixed (κ, ε, v):
///
/// df/du = a·f − b·g,  dg/du = −c·f + d·g
///
/// with a = (−κ/r + H_mag)·dr/du, d = −a, b = −α(ε + 2c² − v)·dr/du and
/// c = α(ε − v)·dr/du, where c = 1/α.
#[derive(Debug, Clone, Copy)]
pub struct DiracMatrix<'a> {
    grid: &'a RadialGrid,
    v: &'a [f64],
    h_mag: Option<&'a [f64]>,
    kappa: f64,
    en: f64,
    alpha: f64,
    c2: f64,
}

impl<'a> DiracMatrix<'a> {
    pub fn new(
        grid: &'a RadialGrid,
        v: &'a [f64],
        h_mag: Option<&'a [f64]>,
        kappa: i32,
        en: f64,
        alpha: f64,
    ) -> Self {
        Self {
            grid,
            v,
            h_mag,
            kappa: f64::from(kappa),
            en,
            alpha,
            c2: 1.0 / (alpha * alpha),
        }
    }

    pub fn grid(&self) -> &RadialGrid {
        self.grid
    }

    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    pub fn en(&self) -> f64 {
        self.en
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn v(&self) -> &[f64] {
        self.v
    }

    pub fn a(&self, i: usize) -> f64 {
        let h_mag = self.h_mag.map_or(0.0, |h| h[i]);
        (-self.kappa / self.grid.r()[i] + h_mag) * self.grid.drdu()[i]
    }

    pub fn b(&self, i: usize) -> f64 {
        -self.alpha * (self.en + 2.0 * self.c2 - self.v[i]) * self.grid.drdu()[i]
    }

    pub fn c(&self, i: usize) -> f64 {
        self.alpha * (self.en - self.v[i]) * self.grid.drdu()[i]
    }

    pub fn d(&self, i: usize) -> f64 {
        -self.a(i)
    }

    /// (df/du, dg/du) at grid point `i` for amplitudes (f, g).
    pub fn derivative(&self, i: usize, f: f64, g: f64) -> (f64, f64) {
        (
            self.a(i) * f - self.b(i) * g,
            -self.c(i) * f + self.d(i) * g,
        )
    }

    /// Contribution of a driving term S to (df/du, dg/du) for the
    /// inhomogeneous equation (H − ε)F = S.
    pub fn source_derivative(&self, i: usize, source: &DiracSpinor) -> (f64, f64) {
        let jacobian = self.alpha * self.grid.drdu()[i];
        (jacobian * source.g[i], -jacobian * source.f[i])
    }
}
