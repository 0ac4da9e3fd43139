//! Relativistic Dirac-Hartree-Fock solver for closed-core atoms.
//!
//! The crate is layered leaves-first: the radial grid and quadrature in
//! [`numerics`], the radial Dirac machinery in [`dirac`], Coulomb integrals in
//! [`coulomb`], the atom model in [`atom`], the self-consistent field engine in
//! [`hf`] and the driven-perturbation solver in [`mixed`].

pub mod atom;
pub mod common;
pub mod coulomb;
pub mod dirac;
pub mod domain;
pub mod hf;
pub mod mixed;
pub mod numerics;
