//! Radial Dirac equation: orbitals, the local equation, the Adams-Moulton
//! integrator, the bound-state search and the inhomogeneous solve.

pub mod adams;
pub mod bound;
pub mod greens;
pub mod matrix;
pub mod spinor;

pub use adams::{AdamsError, AdamsIntegrator, DEFAULT_ORDER};
pub use bound::{BoundStateError, BoundStateReport, BoundStateSolver, SearchState, TrackEnGuess};
pub use greens::{GreensError, green_solution, regular_at_infinity, regular_at_origin, solve_inhomogeneous};
pub use matrix::DiracMatrix;
pub use spinor::DiracSpinor;
