//! Quadrature over the uniform grid variable u.
//!
//! Integrands passed here already include the Jacobian dr/du, so
//! ∫ y(r) dr = ∫ y(r(u)) dr/du du.

use crate::numerics::radial::RadialGrid;
use crate::numerics::stable_sum;

/// End-point weights of the extended Simpson-type rule, O(du⁴).
const END_WEIGHTS: [f64; 3] = [3.0 / 8.0, 7.0 / 6.0, 23.0 / 24.0];

/// Integrates sampled values `values[i]·dr/du[i]` over the first `count`
/// grid points.
pub fn integrate_radial(grid: &RadialGrid, values: &[f64], count: usize) -> f64 {
    let count = count.min(values.len()).min(grid.num_points());
    let drdu = grid.drdu();
    let weighted: Vec<f64> = (0..count)
        .map(|index| values[index] * drdu[index] * end_weight(index, count))
        .collect();
    grid.du() * stable_sum(&weighted)
}

/// Integrates the product a(r)·b(r) over the first `count` points.
pub fn integrate_product(grid: &RadialGrid, a: &[f64], b: &[f64], count: usize) -> f64 {
    let count = count.min(a.len()).min(b.len()).min(grid.num_points());
    let drdu = grid.drdu();
    let weighted: Vec<f64> = (0..count)
        .map(|index| a[index] * b[index] * drdu[index] * end_weight(index, count))
        .collect();
    grid.du() * stable_sum(&weighted)
}

fn end_weight(index: usize, count: usize) -> f64 {
    if count < 2 * END_WEIGHTS.len() {
        return if index == 0 || index + 1 == count {
            0.5
        } else {
            1.0
        };
    }
    let from_end = count - 1 - index;
    if index < END_WEIGHTS.len() {
        END_WEIGHTS[index]
    } else if from_end < END_WEIGHTS.len() {
        END_WEIGHTS[from_end]
    } else {
        1.0
    }
}

/// Integral over each interval [u_i, u_{i+1}] of `y` (Jacobian included),
/// using four-point Lagrange interpolation: O(du⁵) per interval.
fn interval_integrals(y: &[f64], du: f64) -> Vec<f64> {
    let n = y.len();
    if n < 2 {
        return Vec::new();
    }
    if n < 4 {
        return y
            .windows(2)
            .map(|pair| 0.5 * du * (pair[0] + pair[1]))
            .collect();
    }

    let c = du / 24.0;
    let mut intervals = Vec::with_capacity(n - 1);
    intervals.push(c * (9.0 * y[0] + 19.0 * y[1] - 5.0 * y[2] + y[3]));
    for i in 1..n - 2 {
        intervals.push(c * (-y[i - 1] + 13.0 * y[i] + 13.0 * y[i + 1] - y[i + 2]));
    }
    let i = n - 2;
    intervals.push(c * (9.0 * y[i + 1] + 19.0 * y[i] - 5.0 * y[i - 1] + y[i - 2]));
    intervals
}

/// Running integral from the first point: `out[i] = ∫_{u_0}^{u_i} y du`.
pub fn cumulative_from_origin(y: &[f64], du: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(y.len());
    if y.is_empty() {
        return out;
    }
    out.push(0.0);
    let mut running = 0.0;
    for piece in interval_integrals(y, du) {
        running += piece;
        out.push(running);
    }
    out
}

/// Running integral to the last point: `out[i] = ∫_{u_i}^{u_last} y du`.
pub fn cumulative_to_infinity(y: &[f64], du: f64) -> Vec<f64> {
    let n = y.len();
    let mut out = vec![0.0; n];
    if n == 0 {
        return out;
    }
    let pieces = interval_integrals(y, du);
    let mut running = 0.0;
    for i in (0..n - 1).rev() {
        running += pieces[i];
        out[i] = running;
    }
    out
}
