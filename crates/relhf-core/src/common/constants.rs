//! Physical constants in atomic units.

/// Inverse fine-structure constant (CODATA 2018).
pub const ALPHA_INV: f64 = 137.035_999_084_f64;
pub const ALPHA: f64 = 1.0 / ALPHA_INV;
pub const ALPHA2: f64 = ALPHA * ALPHA;
/// Speed of light squared, c² = 1/α².
pub const C2: f64 = ALPHA_INV * ALPHA_INV;
/// Nuclear radius parameter r_N = R0_FM·A^(1/3).
pub const R0_FM: f64 = 1.2_f64;
pub const BOHR_FM: f64 = 52_917.721_090_3_f64;
pub const HARTREE_EV: f64 = 27.211_386_245_988_f64;

#[cfg(test)]
mod tests {
    use super::{ALPHA, ALPHA_INV, ALPHA2, BOHR_FM, C2, HARTREE_EV, R0_FM};

    #[test]
    fn constants_match_expected_relationships() {
        assert!((ALPHA * ALPHA_INV - 1.0).abs() <= f64::EPSILON);
        assert!((ALPHA2 * C2 - 1.0).abs() <= 1.0e-15);
    }

    #[test]
    fn physics_constants_remain_finite_and_positive() {
        for value in [ALPHA, ALPHA2, C2, R0_FM, BOHR_FM, HARTREE_EV] {
            assert!(value.is_finite());
            assert!(value > 0.0);
        }
    }
}
