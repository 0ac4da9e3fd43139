use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub enum GridKind {
    /// r = r0·e^u.
    Logarithmic,
    /// u = r + b·ln(r): logarithmic near the origin, linear beyond `b`.
    LogLinear { b: f64 },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum RadialGridError {
    #[error("radial grid needs at least {minimum} points, got {actual}")]
    TooFewPoints { minimum: usize, actual: usize },
    #[error("radial grid bounds must satisfy 0 < r0 < rmax, got r0={r0}, rmax={rmax}")]
    InvalidBounds { r0: f64, rmax: f64 },
    #[error("log-linear parameter b must be finite and > 0, got {0}")]
    InvalidTurnover(f64),
    #[error("log-linear inversion failed to converge at point {index}")]
    InversionFailed { index: usize },
}

pub const MIN_GRID_POINTS: usize = 32;

/// Radial grid over a uniform variable u with constant step `du`.
///
/// Integrals over r are evaluated as sums over u with the Jacobian dr/du.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialGrid {
    r: Vec<f64>,
    drdu: Vec<f64>,
    du: f64,
    kind: GridKind,
}

impl RadialGrid {
    pub fn new(r0: f64, rmax: f64, num_points: usize, kind: GridKind) -> Result<Self, RadialGridError> {
        if num_points < MIN_GRID_POINTS {
            return Err(RadialGridError::TooFewPoints {
                minimum: MIN_GRID_POINTS,
                actual: num_points,
            });
        }
        if !(r0.is_finite() && rmax.is_finite() && r0 > 0.0 && rmax > r0) {
            return Err(RadialGridError::InvalidBounds { r0, rmax });
        }

        match kind {
            GridKind::Logarithmic => Ok(Self::logarithmic(r0, rmax, num_points)),
            GridKind::LogLinear { b } => Self::log_linear(r0, rmax, num_points, b),
        }
    }

    /// Picks a log-linear grid when `b` is a positive number and a
    /// logarithmic grid otherwise.
    pub fn from_turnover(
        r0: f64,
        rmax: f64,
        num_points: usize,
        b: Option<f64>,
    ) -> Result<Self, RadialGridError> {
        let kind = match b {
            Some(b) if b > 0.0 => GridKind::LogLinear { b },
            _ => GridKind::Logarithmic,
        };
        Self::new(r0, rmax, num_points, kind)
    }

    fn logarithmic(r0: f64, rmax: f64, num_points: usize) -> Self {
        let du = (rmax / r0).ln() / (num_points - 1) as f64;
        let r: Vec<f64> = (0..num_points)
            .map(|index| r0 * (index as f64 * du).exp())
            .collect();
        let drdu = r.clone();
        Self {
            r,
            drdu,
            du,
            kind: GridKind::Logarithmic,
        }
    }

    fn log_linear(r0: f64, rmax: f64, num_points: usize, b: f64) -> Result<Self, RadialGridError> {
        if !(b.is_finite() && b > 0.0) {
            return Err(RadialGridError::InvalidTurnover(b));
        }

        let u_of = |radius: f64| radius + b * radius.ln();
        let u0 = u_of(r0);
        let du = (u_of(rmax) - u0) / (num_points - 1) as f64;

        let mut r = Vec::with_capacity(num_points);
        let mut drdu = Vec::with_capacity(num_points);
        let mut radius = r0;
        for index in 0..num_points {
            let target = u0 + index as f64 * du;
            let mut converged = index == 0;
            let mut iteration = 0;
            while !converged && iteration < 60 {
                let delta = (u_of(radius) - target) / (1.0 + b / radius);
                let mut next = radius - delta;
                if next <= 0.0 {
                    next = 0.5 * radius;
                }
                converged = (next - radius).abs() <= 1.0e-12 * next;
                radius = next;
                iteration += 1;
            }
            if !converged {
                return Err(RadialGridError::InversionFailed { index });
            }
            if index + 1 == num_points {
                radius = rmax;
            }
            r.push(radius);
            drdu.push(radius / (radius + b));
        }

        Ok(Self {
            r,
            drdu,
            du,
            kind: GridKind::LogLinear { b },
        })
    }

    pub fn r(&self) -> &[f64] {
        &self.r
    }

    pub fn drdu(&self) -> &[f64] {
        &self.drdu
    }

    pub fn du(&self) -> f64 {
        self.du
    }

    pub fn kind(&self) -> GridKind {
        self.kind
    }

    pub fn num_points(&self) -> usize {
        self.r.len()
    }

    pub fn r0(&self) -> f64 {
        self.r[0]
    }

    pub fn rmax(&self) -> f64 {
        self.r[self.r.len() - 1]
    }

    /// Index of the first grid point at or beyond `radius`, clamped to the grid.
    pub fn index_at_or_above(&self, radius: f64) -> usize {
        self.r
            .partition_point(|&point| point < radius)
            .min(self.r.len() - 1)
    }
}
