//! Self-consistent field variants as strategy objects.

use crate::atom::parametric::ParametricPotential;
use crate::common::config::ConfigError;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum HfMethod {
    HartreeFock,
    ApproxHF,
    Hartree,
    GreenPRM,
    TietzPRM,
}

impl HfMethod {
    pub const ALL: [Self; 5] = [
        Self::HartreeFock,
        Self::ApproxHF,
        Self::Hartree,
        Self::GreenPRM,
        Self::TietzPRM,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::HartreeFock => "HartreeFock",
            Self::ApproxHF => "ApproxHF",
            Self::Hartree => "Hartree",
            Self::GreenPRM => "GreenPRM",
            Self::TietzPRM => "TietzPRM",
        }
    }

    pub fn strategy(self) -> Box<dyn MethodStrategy> {
        match self {
            Self::HartreeFock => Box::new(SelfConsistent {
                exchange: true,
                refine: true,
            }),
            Self::ApproxHF => Box::new(SelfConsistent {
                exchange: true,
                refine: false,
            }),
            Self::Hartree => Box::new(SelfConsistent {
                exchange: false,
                refine: false,
            }),
            Self::GreenPRM => Box::new(Parametric::Green),
            Self::TietzPRM => Box::new(Parametric::Tietz),
        }
    }
}

impl Display for HfMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HfMethod {
    type Err = ConfigError;

    fn from_str(source: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|method| method.name() == source.trim())
            .ok_or_else(|| ConfigError::UnknownMethod(source.to_string()))
    }
}

/// Convergence target from a dual-meaning value: an epsilon when |v| < 1,
/// otherwise the negative decimal exponent of one.
pub fn parse_eps(value: f64) -> f64 {
    if value.abs() < 1.0 {
        value.abs()
    } else {
        10.0_f64.powf(-value)
    }
}

/// What a method does at each stage of the run.
pub trait MethodStrategy: std::fmt::Debug + Send + Sync {
    /// Electronic starting potential for `num_core_electrons` around charge `z`.
    fn starting_potential(&self, z: u32, r: &[f64], num_core_electrons: f64) -> Vec<f64>;

    fn include_exchange(&self) -> bool;

    /// Whether the core is iterated to self-consistency.
    fn self_consistent(&self) -> bool;

    /// Whether the non-local exchange refinement follows the local-exchange
    /// iterations for a core of `core_size` orbitals.
    fn refine(&self, core_size: usize) -> bool;

    /// Whether valence orbitals get the non-local exchange refinement.
    fn refine_valence(&self) -> bool;
}

/// Screening charge for a starting potential: the other electrons of a
/// neutral atom, never more than the core holds.
fn screening(z: u32, num_core_electrons: f64) -> f64 {
    f64::from(z.saturating_sub(1)).min(num_core_electrons)
}

#[derive(Debug)]
struct SelfConsistent {
    exchange: bool,
    refine: bool,
}

impl MethodStrategy for SelfConsistent {
    fn starting_potential(&self, z: u32, r: &[f64], num_core_electrons: f64) -> Vec<f64> {
        ParametricPotential::default_green(z)
            .electronic_potential(screening(z, num_core_electrons), r)
    }

    fn include_exchange(&self) -> bool {
        self.exchange
    }

    fn self_consistent(&self) -> bool {
        true
    }

    fn refine(&self, core_size: usize) -> bool {
        self.refine && core_size > 1
    }

    fn refine_valence(&self) -> bool {
        self.refine
    }
}

#[derive(Debug)]
enum Parametric {
    Green,
    Tietz,
}

impl MethodStrategy for Parametric {
    fn starting_potential(&self, z: u32, r: &[f64], num_core_electrons: f64) -> Vec<f64> {
        let potential = match self {
            Self::Green => ParametricPotential::default_green(z),
            Self::Tietz => ParametricPotential::default_tietz(z),
        };
        potential.electronic_potential(screening(z, num_core_electrons), r)
    }

    fn include_exchange(&self) -> bool {
        false
    }

    fn self_consistent(&self) -> bool {
        false
    }

    fn refine(&self, _core_size: usize) -> bool {
        false
    }

    fn refine_valence(&self) -> bool {
        false
    }
}
