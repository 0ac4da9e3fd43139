use crate::common::constants::{BOHR_FM, R0_FM};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NuclearModel {
    Point,
    /// Uniformly charged sphere of the given radius (bohr).
    UniformSphere { radius: f64 },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum NucleusError {
    #[error("nuclear charge must be in 1..=137, got {0}")]
    InvalidCharge(u32),
    #[error("mass number must be > 0, got {0}")]
    InvalidMassNumber(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nucleus {
    z: u32,
    model: NuclearModel,
}

impl Nucleus {
    pub fn point(z: u32) -> Result<Self, NucleusError> {
        if !(1..=137).contains(&z) {
            return Err(NucleusError::InvalidCharge(z));
        }
        Ok(Self {
            z,
            model: NuclearModel::Point,
        })
    }

    /// Uniform sphere with radius r_N = 1.2·A^(1/3) fm.
    pub fn with_mass_number(z: u32, mass_number: f64) -> Result<Self, NucleusError> {
        if !(mass_number > 0.0) {
            return Err(NucleusError::InvalidMassNumber(mass_number));
        }
        let mut nucleus = Self::point(z)?;
        nucleus.model = NuclearModel::UniformSphere {
            radius: R0_FM * mass_number.cbrt() / BOHR_FM,
        };
        Ok(nucleus)
    }

    pub fn from_config(z: u32, mass_number: Option<f64>) -> Result<Self, NucleusError> {
        match mass_number {
            Some(mass_number) => Self::with_mass_number(z, mass_number),
            None => Self::point(z),
        }
    }

    pub fn z(&self) -> u32 {
        self.z
    }

    pub fn charge(&self) -> f64 {
        f64::from(self.z)
    }

    pub fn model(&self) -> NuclearModel {
        self.model
    }

    /// Nuclear potential −Z/r, flattened inside a finite nucleus to
    /// −Z/(2R)·(3 − r²/R²).
    pub fn potential(&self, r: &[f64]) -> Vec<f64> {
        let z = self.charge();
        match self.model {
            NuclearModel::Point => r.iter().map(|r| -z / r).collect(),
            NuclearModel::UniformSphere { radius } => r
                .iter()
                .map(|&r| {
                    if r < radius {
                        let x = r / radius;
                        -z / (2.0 * radius) * (3.0 - x * x)
                    } else {
                        -z / r
                    }
                })
                .collect(),
        }
    }
}
