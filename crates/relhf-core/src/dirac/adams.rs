//! Adams-Moulton integration of the radial Dirac equation.
//!
//! Outward solutions start from a power series about the origin, inward
//! solutions from an asymptotic expansion at the practical infinity. Both are
//! continued with a K-step Adams-Moulton corrector; because the system is
//! linear the implicit corrector is solved exactly at every step.

use super::matrix::DiracMatrix;

/// Default number of Adams-Moulton steps.
pub const DEFAULT_ORDER: usize = 7;
/// Practical infinity: outermost point with (v − ε)·r² ≤ `ALR`.
pub const ALR: f64 = 550.0;
/// Half-width of the matching window around the turning point.
pub const D_CTP: usize = 4;
/// Maximum number of terms of the inward asymptotic expansion.
pub const NX: usize = 15;
pub const NX_EPS: f64 = 1.0e-12;
/// Terms of the outward power series.
const SERIES_TERMS: usize = 14;
const SERIES_EPS: f64 = 1.0e-16;
/// Below this effective charge the origin is treated as non-singular.
const ZERO_CHARGE: f64 = 1.0e-8;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AdamsError {
    #[error("Adams-Moulton order must be in 5..=8, got {0}")]
    UnsupportedOrder(usize),
    #[error("grid too short for matching: need {needed} points below practical infinity, got {available}")]
    GridTooShort { needed: usize, available: usize },
    #[error("integration produced a non-finite amplitude at index {index}")]
    NonFiniteAmplitude { index: usize },
    #[error("inward solution vanishes across the matching window at index {ctp}")]
    ZeroAmplitude { ctp: usize },
    #[error("asymptotic expansion needs a bound energy, got {0}")]
    UnboundEnergy(f64),
}

/// Coefficients of the K-step Adams-Moulton formula
/// y_{n+1} = y_n + du/D·(β_new·y'_{n+1} + Σ_j β_j·y'_{n+1−K+j}).
#[derive(Debug, Clone, PartialEq)]
pub struct AdamsCoefficients {
    old: Vec<f64>,
    new: f64,
    denominator: f64,
}

impl AdamsCoefficients {
    pub fn new(order: usize) -> Result<Self, AdamsError> {
        let (old, new, denominator): (&[f64], f64, f64) = match order {
            5 => (&[27.0, -173.0, 482.0, -798.0, 1427.0], 475.0, 1440.0),
            6 => (
                &[-863.0, 6312.0, -20211.0, 37504.0, -46461.0, 65112.0],
                19087.0,
                60480.0,
            ),
            7 => (
                &[
                    1375.0, -11351.0, 41499.0, -88547.0, 123133.0, -121797.0, 139849.0,
                ],
                36799.0,
                120960.0,
            ),
            8 => (
                &[
                    -33953.0, 312874.0, -1291214.0, 3146338.0, -5033120.0, 5595358.0,
                    -4604594.0, 4467094.0,
                ],
                1070017.0,
                3628800.0,
            ),
            _ => return Err(AdamsError::UnsupportedOrder(order)),
        };

        Ok(Self {
            old: old.iter().map(|value| value / denominator).collect(),
            new: new / denominator,
            denominator,
        })
    }

    pub fn order(&self) -> usize {
        self.old.len()
    }

    pub fn denominator(&self) -> f64 {
        self.denominator
    }
}

/// Outermost point (exclusive bound) where the bound-state amplitude is
/// still numerically significant.
pub fn practical_infinity(en: f64, v: &[f64], r: &[f64], alr: f64) -> usize {
    let mut i = r.len() - 1;
    while i > 0 && (v[i] - en) * r[i] * r[i] > alr {
        i -= 1;
    }
    i + 1
}

/// Outermost point below `pinf` where v < ε, kept far enough from both ends
/// that the seeds and the matching window fit.
pub fn classical_turning_point(
    en: f64,
    v: &[f64],
    pinf: usize,
    order: usize,
) -> Result<usize, AdamsError> {
    let low = order + D_CTP + 1;
    let needed = 2 * (order + D_CTP + 2);
    if pinf < needed {
        return Err(AdamsError::GridTooShort {
            needed,
            available: pinf,
        });
    }
    let high = pinf - order - D_CTP - 2;
    let ctp = (0..pinf).rev().find(|&i| v[i] < en).unwrap_or(low);
    Ok(ctp.clamp(low, high))
}

/// Matching-window weight at offset `delta` from the turning point.
pub fn window_weight(delta: isize) -> f64 {
    let delta = delta as f64;
    1.0 / (delta * delta + 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdamsIntegrator {
    coefficients: AdamsCoefficients,
}

impl AdamsIntegrator {
    pub fn new(order: usize) -> Result<Self, AdamsError> {
        Ok(Self {
            coefficients: AdamsCoefficients::new(order)?,
        })
    }

    pub fn order(&self) -> usize {
        self.coefficients.order()
    }

    /// Regular-at-origin solution on [0, nf].
    pub fn outward(
        &self,
        hd: &DiracMatrix<'_>,
        f: &mut [f64],
        g: &mut [f64],
        nf: usize,
    ) -> Result<(), AdamsError> {
        let k = self.order();
        origin_series(hd, f, g, k);
        if nf >= k {
            self.adams_moulton(hd, f, g, k, nf, false)?;
        }
        Ok(())
    }

    /// Regular-at-infinity solution on [nf, pinf); zero beyond.
    pub fn inward(
        &self,
        hd: &DiracMatrix<'_>,
        f: &mut [f64],
        g: &mut [f64],
        pinf: usize,
        nf: usize,
    ) -> Result<(), AdamsError> {
        let k = self.order();
        f[pinf..].fill(0.0);
        g[pinf..].fill(0.0);
        asymptotic_series(hd, f, g, pinf, k)?;
        let start = pinf - k - 1;
        if nf <= start {
            self.adams_moulton(hd, f, g, start, nf, true)?;
        }
        Ok(())
    }

    fn adams_moulton(
        &self,
        hd: &DiracMatrix<'_>,
        f: &mut [f64],
        g: &mut [f64],
        ni: usize,
        nf: usize,
        inward: bool,
    ) -> Result<(), AdamsError> {
        let k = self.order();
        let inc: isize = if inward { -1 } else { 1 };
        let du = hd.grid().du() * inc as f64;
        let beta_old: Vec<f64> = self.coefficients.old.iter().map(|b| du * b).collect();
        let h0 = du * self.coefficients.new;

        let mut df = Vec::with_capacity(k);
        let mut dg = Vec::with_capacity(k);
        for j in 0..k {
            let index = (ni as isize - inc * (k - j) as isize) as usize;
            let (dfi, dgi) = hd.derivative(index, f[index], g[index]);
            df.push(dfi);
            dg.push(dgi);
        }

        let mut i = ni as isize;
        loop {
            let index = i as usize;
            let previous = (i - inc) as usize;
            let mut sf = f[previous];
            let mut sg = g[previous];
            for j in 0..k {
                sf += beta_old[j] * df[j];
                sg += beta_old[j] * dg[j];
            }

            let (a, b, c, d) = (hd.a(index), hd.b(index), hd.c(index), hd.d(index));
            let det = (1.0 - h0 * a) * (1.0 - h0 * d) - h0 * h0 * b * c;
            let fi = ((1.0 - h0 * d) * sf - h0 * b * sg) / det;
            let gi = ((1.0 - h0 * a) * sg - h0 * c * sf) / det;
            if !(fi.is_finite() && gi.is_finite()) {
                return Err(AdamsError::NonFiniteAmplitude { index });
            }
            f[index] = fi;
            g[index] = gi;

            df.rotate_left(1);
            dg.rotate_left(1);
            let (dfi, dgi) = hd.derivative(index, fi, gi);
            df[k - 1] = dfi;
            dg[k - 1] = dgi;

            if index == nf {
                break;
            }
            i += inc;
        }
        Ok(())
    }
}

/// Seeds points [0, count) with r^γ·Σ (pₘ, qₘ)·r^m for a potential
/// −Z/r + V₀ fitted to the first two grid points.
fn origin_series(hd: &DiracMatrix<'_>, f: &mut [f64], g: &mut [f64], count: usize) {
    let r = hd.grid().r();
    let v = hd.v();
    let alpha = hd.alpha();
    let kappa = hd.kappa();

    let z = (v[1] - v[0]) / (1.0 / r[0] - 1.0 / r[1]);
    let (z, v0) = if z.abs() < ZERO_CHARGE {
        (0.0, v[0])
    } else {
        (z, v[0] + z / r[0])
    };
    let zeta = alpha * z;
    let gamma = (kappa * kappa - zeta * zeta).sqrt();
    let e1 = alpha * (hd.en() + 2.0 / (alpha * alpha) - v0);
    let e2 = alpha * (hd.en() - v0);

    let mut p = [0.0; SERIES_TERMS];
    let mut q = [0.0; SERIES_TERMS];
    if zeta == 0.0 {
        if kappa < 0.0 {
            p[0] = 1.0;
        } else {
            q[0] = 1.0;
        }
    } else {
        p[0] = 1.0;
        q[0] = (gamma + kappa) / zeta;
    }
    for m in 1..SERIES_TERMS {
        let mf = m as f64;
        let det = mf * (2.0 * gamma + mf);
        let rhs_f = e1 * q[m - 1];
        let rhs_g = -e2 * p[m - 1];
        p[m] = ((gamma + mf - kappa) * rhs_f + zeta * rhs_g) / det;
        q[m] = ((gamma + mf + kappa) * rhs_g - zeta * rhs_f) / det;
    }

    for i in 0..count {
        let mut ps = 0.0;
        let mut qs = 0.0;
        let mut rm = 1.0;
        for m in 0..SERIES_TERMS {
            ps += p[m] * rm;
            qs += q[m] * rm;
            if m > 0 && (p[m] * rm).abs().max((q[m] * rm).abs()) < SERIES_EPS * ps.abs().max(qs.abs()) {
                break;
            }
            rm *= r[i];
        }
        let prefactor = r[i].powf(gamma);
        f[i] = prefactor * ps;
        g[i] = prefactor * qs;
    }
}

/// Seeds points [pinf − count, pinf) with the large-r expansion
/// r^σ·e^{−λr}·Σ (aₖ, bₖ)·r^{−k} for a potential −Z_ion/r.
fn asymptotic_series(
    hd: &DiracMatrix<'_>,
    f: &mut [f64],
    g: &mut [f64],
    pinf: usize,
    count: usize,
) -> Result<(), AdamsError> {
    let en = hd.en();
    if en >= 0.0 {
        return Err(AdamsError::UnboundEnergy(en));
    }
    let r = hd.grid().r();
    let alpha = hd.alpha();
    let kappa = hd.kappa();
    let outer = pinf - 1;
    let z_ion = -hd.v()[outer] * r[outer];

    let zeta = alpha * z_ion;
    let e1 = alpha * en + 2.0 / alpha;
    let e2 = alpha * en;
    let lambda = (-en * (2.0 + alpha * alpha * en)).sqrt();
    let sigma = (1.0 + alpha * alpha * en) * z_ion / lambda;
    let null_b = -lambda / e1;

    let mut a = [0.0; NX + 1];
    let mut b = [0.0; NX + 1];
    a[0] = 1.0;
    b[0] = null_b;
    for k in 1..=NX {
        let kf = k as f64;
        let y1 = -(sigma - kf + 1.0 + kappa) * a[k - 1] + zeta * b[k - 1];
        let particular = -y1 / lambda;
        let phi_particular = -particular * (e2 * (sigma - kf + kappa) + lambda * zeta);
        let phi_null = -2.0 * lambda * lambda * kf / e1;
        let c = -phi_particular / phi_null;
        a[k] = c + particular;
        b[k] = c * null_b;
    }

    for i in pinf - count..pinf {
        let mut fs = 0.0;
        let mut gs = 0.0;
        let mut rk = 1.0;
        for k in 0..=NX {
            fs += a[k] / rk;
            gs += b[k] / rk;
            if (a[k] / rk).abs().max((b[k] / rk).abs()) < NX_EPS {
                break;
            }
            rk *= r[i];
        }
        let prefactor = (sigma * r[i].ln() - lambda * r[i]).exp();
        f[i] = prefactor * fs;
        g[i] = prefactor * gs;
    }
    Ok(())
}

/// Joins an outward solution (`f`, `g`, valid up to ctp + D_CTP) to an
/// inward one (`f_in`, `g_in`, valid down to ctp − D_CTP).
///
/// The inward solution is scaled so the large components agree across the
/// window; the returned vector holds the small-component discontinuity
/// g_out − g_in over the window.
pub fn join_in_out(
    f: &mut [f64],
    g: &mut [f64],
    f_in: &[f64],
    g_in: &[f64],
    ctp: usize,
    pinf: usize,
) -> Result<Vec<f64>, AdamsError> {
    let start = ctp - D_CTP;
    let end = ctp + D_CTP;

    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for i in start..=end {
        if f_in[i] != 0.0 {
            let w = window_weight(i as isize - ctp as isize);
            weighted += w * f[i] / f_in[i];
            total_weight += w;
        }
    }
    let rescale = weighted / total_weight;
    if total_weight == 0.0 || !rescale.is_finite() || rescale == 0.0 {
        return Err(AdamsError::ZeroAmplitude { ctp });
    }

    let mut dg = Vec::with_capacity(2 * D_CTP + 1);
    for i in start..=end {
        dg.push(g[i] - rescale * g_in[i]);
        f[i] = 0.5 * (f[i] + rescale * f_in[i]);
        g[i] = 0.5 * (g[i] + rescale * g_in[i]);
    }
    for i in end + 1..pinf {
        f[i] = rescale * f_in[i];
        g[i] = rescale * g_in[i];
    }
    f[pinf..].fill(0.0);
    g[pinf..].fill(0.0);
    Ok(dg)
}

/// First-order energy correction from the small-component discontinuity:
/// δε = ⟨f·Δg⟩_window / (α·⟨F|F⟩).
pub fn matching_energy_correction(f: &[f64], dg: &[f64], ctp: usize, alpha: f64, norm2: f64) -> f64 {
    let start = ctp - D_CTP;
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (offset, jump) in dg.iter().enumerate() {
        let w = window_weight(offset as isize - D_CTP as isize);
        weighted += w * f[start + offset] * jump;
        total_weight += w;
    }
    weighted / total_weight / (alpha * norm2)
}
