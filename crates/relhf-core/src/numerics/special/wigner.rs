#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wigner3jInput {
    pub two_j1: i32,
    pub two_j2: i32,
    pub two_j3: i32,
    pub two_m1: i32,
    pub two_m2: i32,
    pub two_m3: i32,
}

impl Wigner3jInput {
    pub fn new(
        two_j1: i32,
        two_j2: i32,
        two_j3: i32,
        two_m1: i32,
        two_m2: i32,
        two_m3: i32,
    ) -> Self {
        Self {
            two_j1,
            two_j2,
            two_j3,
            two_m1,
            two_m2,
            two_m3,
        }
    }

    fn is_allowed(&self) -> bool {
        let Self {
            two_j1,
            two_j2,
            two_j3,
            two_m1,
            two_m2,
            two_m3,
        } = *self;

        if two_j1 < 0 || two_j2 < 0 || two_j3 < 0 {
            return false;
        }
        if two_m1 + two_m2 + two_m3 != 0 {
            return false;
        }
        if two_m1.abs() > two_j1 || two_m2.abs() > two_j2 || two_m3.abs() > two_j3 {
            return false;
        }
        if (two_j1 - two_m1).rem_euclid(2) != 0
            || (two_j2 - two_m2).rem_euclid(2) != 0
            || (two_j3 - two_m3).rem_euclid(2) != 0
        {
            return false;
        }
        if (two_j1 + two_j2 + two_j3).rem_euclid(2) != 0 {
            return false;
        }
        two_j3 <= two_j1 + two_j2 && two_j3 >= (two_j1 - two_j2).abs()
    }
}

/// Wigner 3j symbol from doubled quantum numbers (`two_j = 3` means j = 3/2),
/// evaluated with the Racah sum in log-factorial form.
pub fn wigner_3j(input: Wigner3jInput) -> f64 {
    if !input.is_allowed() {
        return 0.0;
    }

    let Wigner3jInput {
        two_j1,
        two_j2,
        two_j3,
        two_m1,
        two_m2,
        two_m3,
    } = input;

    // Every combination below is even once the selection rules hold.
    let half = |value: i32| value / 2;
    let triangle = [
        half(two_j1 + two_j2 - two_j3),
        half(two_j1 - two_j2 + two_j3),
        half(-two_j1 + two_j2 + two_j3),
    ];
    let projections = [
        half(two_j1 + two_m1),
        half(two_j1 - two_m1),
        half(two_j2 + two_m2),
        half(two_j2 - two_m2),
        half(two_j3 + two_m3),
        half(two_j3 - two_m3),
    ];

    let mut prefactor = -ln_factorial(half(two_j1 + two_j2 + two_j3) + 1);
    for value in triangle.iter().chain(projections.iter()) {
        prefactor += ln_factorial(*value);
    }
    prefactor *= 0.5;

    let t_min = 0
        .max(half(two_j2 - two_j3 - two_m1))
        .max(half(two_j1 - two_j3 + two_m2));
    let t_max = triangle[0]
        .min(half(two_j1 - two_m1))
        .min(half(two_j2 + two_m2));

    let mut sum = 0.0;
    for t in t_min..=t_max {
        let denominator = ln_factorial(t)
            + ln_factorial(half(two_j3 - two_j2 + two_m1) + t)
            + ln_factorial(half(two_j3 - two_j1 - two_m2) + t)
            + ln_factorial(triangle[0] - t)
            + ln_factorial(half(two_j1 - two_m1) - t)
            + ln_factorial(half(two_j2 + two_m2) - t);
        let sign = if t % 2 == 0 { 1.0 } else { -1.0 };
        sum += sign * (prefactor - denominator).exp();
    }

    if half(two_j1 - two_j2 - two_m3).rem_euclid(2) != 0 {
        -sum
    } else {
        sum
    }
}

fn ln_factorial(n: i32) -> f64 {
    (2..=n.max(0)).map(|value| f64::from(value).ln()).sum()
}
