//! Damping schedules and per-loop iteration bookkeeping.

/// Damping that moves linearly from `start` to `end` between iterations
/// `begin` and `finish`, constant outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampedDamp {
    pub start: f64,
    pub end: f64,
    pub begin: usize,
    pub finish: usize,
}

impl RampedDamp {
    pub const fn new(start: f64, end: f64, begin: usize, finish: usize) -> Self {
        Self {
            start,
            end,
            begin,
            finish,
        }
    }

    pub fn at(&self, iteration: usize) -> f64 {
        if iteration <= self.begin {
            return self.start;
        }
        if iteration >= self.finish {
            return self.end;
        }
        let span = (self.finish - self.begin) as f64;
        let x = (iteration - self.begin) as f64 / span;
        self.start + x * (self.end - self.start)
    }
}

/// Weight of the new potential in the core self-consistency loop.
pub fn core_eta(iteration: usize) -> f64 {
    match iteration {
        0 | 1 => 1.0,
        2 | 3 => 0.35,
        4..=15 => 0.7,
        16..=31 => 0.525,
        _ => 0.35,
    }
}

/// Weight of the new potential in the valence loop.
pub fn valence_eta(iteration: usize) -> f64 {
    if iteration >= 4 { 0.7 } else { 0.35 }
}

/// `new·eta + old·(1 − eta)` written into `new`.
pub fn mix_into(new: &mut [f64], old: &[f64], eta: f64) {
    for (value, previous) in new.iter_mut().zip(old) {
        *value = eta * *value + (1.0 - eta) * previous;
    }
}

/// Loop state threaded through each self-consistent iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationState {
    pub index: usize,
    pub damping: f64,
    pub eps: f64,
    pub best_eps: f64,
    pub worse_count: usize,
}

impl Default for IterationState {
    fn default() -> Self {
        Self {
            index: 0,
            damping: 0.0,
            eps: f64::INFINITY,
            best_eps: f64::INFINITY,
            worse_count: 0,
        }
    }
}

impl IterationState {
    /// Records this iteration's epsilon. Once past `grace` iterations, an
    /// epsilon above `tolerance`·best counts as a worsening step; any other
    /// step resets the counter.
    pub fn record(&mut self, eps: f64, grace: usize, tolerance: f64) {
        self.eps = eps;
        if self.index > grace && eps > tolerance * self.best_eps {
            self.worse_count += 1;
        } else {
            self.worse_count = 0;
        }
        if eps < self.best_eps {
            self.best_eps = eps;
        }
    }

    /// Whether the latest epsilon sits more than `factor` above the best one.
    /// Applies from the first iteration, with no grace period.
    pub fn diverging(&self, factor: f64) -> bool {
        self.best_eps.is_finite() && self.eps > factor * self.best_eps
    }
}
