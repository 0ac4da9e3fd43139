pub mod integration;
pub mod wigner;
