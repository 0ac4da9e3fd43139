pub mod radial;
pub mod special;

pub use radial::{GridKind, RadialGrid, RadialGridError};
pub use special::integration::{
    cumulative_from_origin, cumulative_to_infinity, integrate_product, integrate_radial,
};
pub use special::wigner::{Wigner3jInput, wigner_3j};

fn kahan_add(sum: &mut f64, correction: &mut f64, value: f64) {
    let corrected = value - *correction;
    let next = *sum + corrected;
    *correction = (next - *sum) - corrected;
    *sum = next;
}

pub fn stable_sum(values: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut correction = 0.0;

    for &value in values {
        kahan_add(&mut sum, &mut correction, value);
    }

    sum
}

/// Fractional change |(new - old)/new|, or the absolute change when `new` is zero.
pub fn fractional_change(new: f64, old: f64) -> f64 {
    if new == 0.0 {
        (new - old).abs()
    } else {
        ((new - old) / new).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::{fractional_change, stable_sum};

    #[test]
    fn stable_sum_recovers_small_terms() {
        let mut values = vec![1.0e16];
        values.extend(std::iter::repeat_n(1.0, 1000));
        values.push(-1.0e16);
        assert_eq!(stable_sum(&values), 1000.0);
    }

    #[test]
    fn fractional_change_handles_zero() {
        assert!((fractional_change(-2.0, -1.0) - 0.5).abs() < 1.0e-15);
        assert_eq!(fractional_change(0.0, 0.25), 0.25);
    }
}
