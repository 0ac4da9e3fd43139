//! Angular factors of the exchange interaction between two orbitals.

use crate::dirac::spinor::{l_of_kappa, twoj_of_kappa};
use crate::numerics::special::wigner::{Wigner3jInput, wigner_3j};
use std::ops::RangeInclusive;

/// Multipoles coupling (κa, κb): |ja − jb| ..= ja + jb.
pub fn k_range(kappa_a: i32, kappa_b: i32) -> RangeInclusive<i32> {
    let (two_ja, two_jb) = (twoj_of_kappa(kappa_a), twoj_of_kappa(kappa_b));
    (two_ja - two_jb).abs() / 2..=(two_ja + two_jb) / 2
}

pub fn parity_allowed(la: i32, lb: i32, k: i32) -> bool {
    (la + lb + k) % 2 == 0
}

/// L_k(a, b) = (ja jb k; −½ ½ 0)² when la + lb + k is even, zero otherwise.
pub fn lk_coefficient(k: i32, kappa_a: i32, kappa_b: i32) -> f64 {
    if !parity_allowed(l_of_kappa(kappa_a), l_of_kappa(kappa_b), k) {
        return 0.0;
    }
    let symbol = wigner_3j(Wigner3jInput::new(
        twoj_of_kappa(kappa_a),
        twoj_of_kappa(kappa_b),
        2 * k,
        -1,
        1,
        0,
    ));
    symbol * symbol
}
