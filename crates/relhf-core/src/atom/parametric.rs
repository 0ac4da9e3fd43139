//! Parametric screening potentials used as starting approximations.
//!
//! Both give the electronic part only; the nuclear term is added separately.
//! At large r they tend to `screening/r`, at the origin to a constant.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParametricPotential {
    /// Ω(r) = 1/(H·(e^{r/d} − 1) + 1), v = S·(1 − Ω)/r.
    Green { h: f64, d: f64 },
    /// v = S·(1 − e^{−g·r}/(1 + t·r)²)/r.
    Tietz { t: f64, g: f64 },
}

impl ParametricPotential {
    pub fn default_green(z: u32) -> Self {
        let d = 0.4;
        Self::Green {
            h: d * f64::from(z.saturating_sub(1)).powf(0.4),
            d,
        }
    }

    pub fn default_tietz(z: u32) -> Self {
        let scale = f64::from(z).powf(0.4);
        Self::Tietz {
            t: 0.2 * scale,
            g: 0.6 * scale,
        }
    }

    /// Electronic potential of `screening` electrons on the radial points `r`.
    pub fn electronic_potential(&self, screening: f64, r: &[f64]) -> Vec<f64> {
        match *self {
            Self::Green { h, d } => r
                .iter()
                .map(|&r| {
                    let omega = 1.0 / (h * (r / d).exp_m1() + 1.0);
                    screening * (1.0 - omega) / r
                })
                .collect(),
            Self::Tietz { t, g } => r
                .iter()
                .map(|&r| {
                    let shield = (-g * r).exp() / (1.0 + t * r).powi(2);
                    screening * (1.0 - shield) / r
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ParametricPotential;

    #[test]
    fn potentials_screen_the_requested_charge() {
        for potential in [
            ParametricPotential::default_green(11),
            ParametricPotential::default_tietz(11),
        ] {
            let v = potential.electronic_potential(10.0, &[1.0e-6, 1.0, 60.0]);
            assert!(v[0].is_finite() && v[0] > 0.0);
            assert!(v[1] > 0.0 && v[1] < 10.0);
            assert!((v[2] * 60.0 - 10.0).abs() < 1.0e-6, "{potential:?}: {}", v[2] * 60.0);
        }
    }

    #[test]
    fn green_potential_is_finite_at_origin() {
        let potential = ParametricPotential::default_green(20);
        let ParametricPotential::Green { h, d } = potential else {
            panic!("expected Green parameters");
        };
        let v = potential.electronic_potential(18.0, &[1.0e-9]);
        assert!((v[0] - 18.0 * h / d).abs() < 1.0e-5 * v[0]);
    }

    #[test]
    fn hydrogen_has_no_green_screening() {
        let v = ParametricPotential::default_green(1).electronic_potential(0.0, &[0.1, 1.0]);
        assert!(v.iter().all(|value| *value == 0.0));
    }
}
