//! Ideal observer of the speech-based envelope power spectrum model (sEPSM).
//!
//! Converts an SNRenv value into percent correct. The SNRenv is mapped to a
//! sensitivity index `d' = k * snrenv^q` and compared with the decision
//! threshold of an observer that picks the best of `m` response alternatives.
//! For large `m` the maximum of `m` standard normal variables is well
//! described by an extreme-value distribution, whose location and spread
//! become the mean and the internal part of the psychometric spread:
//!
//! ```text
//! u_m     = Φ⁻¹(1 − 1/m)
//! sigma_m = 1.28255 / u_m
//! mu_m    = u_m + 0.577 / u_m
//! pc      = 100 · Φ(d'; mu_m, sqrt(sigma_s² + sigma_m² + sigma_loss²))
//! ```
//!
//! `k`, `q` and `sigma_s` are calibrated against measured data with
//! [`IdealObs::fit_obs`]; `m` is a property of the speech material.

use thiserror::Error;
use tracing::debug;

use crate::config::IdealObsConfig;
use crate::core::levenberg_marquardt::{Bounds, LeastSquaresProblem, LevenbergMarquardt, SolverError};
use crate::core::psychometric::{cdf_unchecked, standard_normal_pdf, standard_normal_quantile};

/// Default response-set size.
pub const DEFAULT_M: f64 = 8000.0;

/// Starting point of a fit when a parameter is not set.
pub const INITIAL_K: f64 = 1.095_445_115_010_332_2; // sqrt(1.2)
pub const INITIAL_Q: f64 = 0.5;
pub const INITIAL_SIGMA_S: f64 = 0.6;

/// `q` must stay strictly positive during a fit.
const Q_FLOOR: f64 = 1e-9;

/// Errors of the ideal observer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IdealObsError {
    #[error("parameter `{name}` is not set; fit the observer or set it explicitly")]
    NotFitted { name: &'static str },
    #[error("invalid value for `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("snrenv must be finite and non-negative, got {value} at index {index}")]
    InvalidSnrEnv { index: usize, value: f64 },
    #[error("percent correct must be finite, got {value} at index {index}")]
    InvalidPercentCorrect { index: usize, value: f64 },
    #[error("snrenv has {snrenv} values but pc_observed has {pc}")]
    LengthMismatch { snrenv: usize, pc: usize },
    #[error("{points} data points cannot constrain {params} free parameters")]
    InsufficientData { points: usize, params: usize },
    #[error("fit failed: {0}")]
    FitFailed(#[from] SolverError),
}

/// The four observer parameters. `k`, `q` and `sigma_s` are `None` until set or fitted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealObsParams {
    pub k: Option<f64>,
    pub q: Option<f64>,
    pub sigma_s: Option<f64>,
    pub m: f64,
}

impl IdealObsParams {
    pub fn new(k: f64, q: f64, sigma_s: f64, m: f64) -> Self {
        Self {
            k: Some(k),
            q: Some(q),
            sigma_s: Some(sigma_s),
            m,
        }
    }

    pub fn unfit(m: f64) -> Self {
        Self {
            k: None,
            q: None,
            sigma_s: None,
            m,
        }
    }

    pub fn is_fit(&self) -> bool {
        self.k.is_some() && self.q.is_some() && self.sigma_s.is_some()
    }

    fn validate(&self) -> Result<(), IdealObsError> {
        if let Some(k) = self.k {
            if !k.is_finite() {
                return Err(IdealObsError::InvalidParameter { name: "k", value: k });
            }
        }
        if let Some(q) = self.q {
            if !(q.is_finite() && q > 0.0) {
                return Err(IdealObsError::InvalidParameter { name: "q", value: q });
            }
        }
        if let Some(s) = self.sigma_s {
            if !(s.is_finite() && s >= 0.0) {
                return Err(IdealObsError::InvalidParameter {
                    name: "sigma_s",
                    value: s,
                });
            }
        }
        if !(self.m.is_finite() && self.m > 0.0) {
            return Err(IdealObsError::InvalidParameter {
                name: "m",
                value: self.m,
            });
        }
        Ok(())
    }

    fn require(&self) -> Result<(f64, f64, f64), IdealObsError> {
        let k = self.k.ok_or(IdealObsError::NotFitted { name: "k" })?;
        let q = self.q.ok_or(IdealObsError::NotFitted { name: "q" })?;
        let sigma_s = self.sigma_s.ok_or(IdealObsError::NotFitted { name: "sigma_s" })?;
        Ok((k, q, sigma_s))
    }
}

impl Default for IdealObsParams {
    fn default() -> Self {
        Self::unfit(DEFAULT_M)
    }
}

/// Partial parameter update; `None` leaves a parameter unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ParamsUpdate {
    pub k: Option<f64>,
    pub q: Option<f64>,
    pub sigma_s: Option<f64>,
    pub m: Option<f64>,
}

impl ParamsUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn k(mut self, k: f64) -> Self {
        self.k = Some(k);
        self
    }

    pub fn q(mut self, q: f64) -> Self {
        self.q = Some(q);
        self
    }

    pub fn sigma_s(mut self, sigma_s: f64) -> Self {
        self.sigma_s = Some(sigma_s);
        self
    }

    pub fn m(mut self, m: f64) -> Self {
        self.m = Some(m);
        self
    }
}

impl From<IdealObsParams> for ParamsUpdate {
    fn from(p: IdealObsParams) -> Self {
        Self {
            k: p.k,
            q: p.q,
            sigma_s: p.sigma_s,
            m: Some(p.m),
        }
    }
}

/// Options of [`IdealObs::fit_obs_with`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FitOptions {
    /// External spread held fixed during the fit.
    pub sigma_loss: f64,
    /// Pin `sigma_s` to this value and fit only `k` and `q`.
    pub fixed_sigma_s: Option<f64>,
    /// Response-set size to fit with; stored only if the fit succeeds.
    pub m: Option<f64>,
}

/// Location and internal spread of the m-alternative decision threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Threshold {
    mean: f64,
    spread: f64,
}

impl Threshold {
    fn for_alternatives(m: f64) -> Result<Self, IdealObsError> {
        let invalid = IdealObsError::InvalidParameter { name: "m", value: m };
        if !(m.is_finite() && m > 1.0) {
            return Err(invalid);
        }
        let u = -standard_normal_quantile(1.0 / m);
        if !(u.is_finite() && u > 0.0) {
            return Err(invalid);
        }
        Ok(Self {
            mean: u + 0.577 / u,
            spread: 1.282_55 / u,
        })
    }
}

#[inline]
fn sensitivity(snrenv: f64, k: f64, q: f64) -> f64 {
    k * snrenv.powf(q)
}

fn check_sigma_loss(sigma_loss: f64) -> Result<(), IdealObsError> {
    if !(sigma_loss.is_finite() && sigma_loss >= 0.0) {
        return Err(IdealObsError::InvalidParameter {
            name: "sigma_loss",
            value: sigma_loss,
        });
    }
    Ok(())
}

fn check_snrenv(snrenv: &[f64]) -> Result<(), IdealObsError> {
    match snrenv.iter().position(|v| !(v.is_finite() && *v >= 0.0)) {
        Some(index) => Err(IdealObsError::InvalidSnrEnv {
            index,
            value: snrenv[index],
        }),
        None => Ok(()),
    }
}

/// Ideal observer with mutable parameter state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdealObs {
    params: IdealObsParams,
}

impl IdealObs {
    /// Unfit observer with `m = 8000`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer pre-seeded with `params`.
    pub fn with_params(params: IdealObsParams) -> Result<Self, IdealObsError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn from_config(cfg: &IdealObsConfig) -> Result<Self, IdealObsError> {
        Self::with_params(IdealObsParams {
            k: cfg.k,
            q: cfg.q,
            sigma_s: cfg.sigma_s,
            m: cfg.m,
        })
    }

    pub fn get_params(&self) -> IdealObsParams {
        self.params
    }

    /// Apply a partial update. Nothing changes if the merged parameters are invalid.
    pub fn set_params(&mut self, update: ParamsUpdate) -> Result<(), IdealObsError> {
        let merged = IdealObsParams {
            k: update.k.or(self.params.k),
            q: update.q.or(self.params.q),
            sigma_s: update.sigma_s.or(self.params.sigma_s),
            m: update.m.unwrap_or(self.params.m),
        };
        merged.validate()?;
        self.params = merged;
        Ok(())
    }

    /// Percent correct for every SNRenv value (linear scale, `>= 0`).
    pub fn snrenv_to_pc(&self, snrenv: &[f64], sigma_loss: f64) -> Result<Vec<f64>, IdealObsError> {
        let (k, q, sigma_s) = self.params.require()?;
        check_sigma_loss(sigma_loss)?;
        check_snrenv(snrenv)?;
        let threshold = Threshold::for_alternatives(self.params.m)?;
        let sigma = (sigma_s * sigma_s + threshold.spread * threshold.spread + sigma_loss * sigma_loss).sqrt();
        Ok(snrenv
            .iter()
            .map(|&s| 100.0 * cdf_unchecked(sensitivity(s, k, q), threshold.mean, sigma))
            .collect())
    }

    /// Fit `k`, `q` and `sigma_s` to observed percent-correct scores.
    pub fn fit_obs(
        &mut self,
        snrenv: &[f64],
        pc_observed: &[f64],
        sigma_loss: f64,
    ) -> Result<IdealObsParams, IdealObsError> {
        self.fit_obs_with(
            snrenv,
            pc_observed,
            &FitOptions {
                sigma_loss,
                ..FitOptions::default()
            },
        )
    }

    /// Fit with explicit options. On error the current parameters are kept.
    pub fn fit_obs_with(
        &mut self,
        snrenv: &[f64],
        pc_observed: &[f64],
        opts: &FitOptions,
    ) -> Result<IdealObsParams, IdealObsError> {
        if snrenv.len() != pc_observed.len() {
            return Err(IdealObsError::LengthMismatch {
                snrenv: snrenv.len(),
                pc: pc_observed.len(),
            });
        }
        check_snrenv(snrenv)?;
        if let Some(index) = pc_observed.iter().position(|v| !v.is_finite()) {
            return Err(IdealObsError::InvalidPercentCorrect {
                index,
                value: pc_observed[index],
            });
        }
        check_sigma_loss(opts.sigma_loss)?;
        if let Some(s) = opts.fixed_sigma_s {
            if !(s.is_finite() && s >= 0.0) {
                return Err(IdealObsError::InvalidParameter {
                    name: "sigma_s",
                    value: s,
                });
            }
        }

        let m = opts.m.unwrap_or(self.params.m);
        let threshold = Threshold::for_alternatives(m)?;
        let problem = ObserverFit {
            snrenv,
            pc: pc_observed,
            threshold,
            sigma_loss: opts.sigma_loss,
            fixed_sigma_s: opts.fixed_sigma_s,
        };
        let n_free = problem.n_params();
        if snrenv.len() < n_free {
            return Err(IdealObsError::InsufficientData {
                points: snrenv.len(),
                params: n_free,
            });
        }

        let k0 = self.params.k.unwrap_or(INITIAL_K);
        let q0 = self.params.q.unwrap_or(INITIAL_Q).max(Q_FLOOR);
        let mut initial = vec![k0, q0];
        let mut bounds = vec![Bounds::FREE, Bounds::at_least(Q_FLOOR)];
        if opts.fixed_sigma_s.is_none() {
            let s0 = self.params.sigma_s.unwrap_or(INITIAL_SIGMA_S);
            initial.push(s0 * s0);
            bounds.push(Bounds::at_least(0.0));
        }

        let solution = LevenbergMarquardt::new().minimize(&problem, &initial, &bounds)?;
        let (k, q, var_s) = problem.unpack(&solution.params);
        debug!(
            iterations = solution.iterations,
            cost = solution.cost,
            k,
            q,
            sigma_s = var_s.sqrt(),
            "ideal observer fit converged"
        );

        let fitted = IdealObsParams::new(k, q, var_s.sqrt(), m);
        fitted.validate()?;
        self.params = fitted;
        Ok(fitted)
    }
}

/// Least-squares problem over `[k, q]` or `[k, q, sigma_s²]`.
struct ObserverFit<'a> {
    snrenv: &'a [f64],
    pc: &'a [f64],
    threshold: Threshold,
    sigma_loss: f64,
    fixed_sigma_s: Option<f64>,
}

impl ObserverFit<'_> {
    /// `(k, q, sigma_s²)` from the solver's parameter vector.
    fn unpack(&self, p: &[f64]) -> (f64, f64, f64) {
        let var_s = match self.fixed_sigma_s {
            Some(s) => s * s,
            None => p[2],
        };
        (p[0], p[1], var_s)
    }

    fn sigma(&self, var_s: f64) -> f64 {
        (var_s + self.threshold.spread * self.threshold.spread + self.sigma_loss * self.sigma_loss).sqrt()
    }
}

impl LeastSquaresProblem for ObserverFit<'_> {
    fn n_params(&self) -> usize {
        if self.fixed_sigma_s.is_some() { 2 } else { 3 }
    }

    fn n_residuals(&self) -> usize {
        self.snrenv.len()
    }

    fn residuals(&self, p: &[f64], out: &mut [f64]) {
        let (k, q, var_s) = self.unpack(p);
        let sigma = self.sigma(var_s);
        for ((o, &s), &pc) in out.iter_mut().zip(self.snrenv).zip(self.pc) {
            *o = 100.0 * cdf_unchecked(sensitivity(s, k, q), self.threshold.mean, sigma) - pc;
        }
    }

    fn jacobian(&self, p: &[f64], out: &mut [f64]) {
        let (k, q, var_s) = self.unpack(p);
        let sigma = self.sigma(var_s);
        let n = self.n_params();
        for (row, &s) in self.snrenv.iter().enumerate() {
            let s_q = s.powf(q);
            let z = (k * s_q - self.threshold.mean) / sigma;
            let scale = 100.0 * standard_normal_pdf(z) / sigma;
            let d = &mut out[row * n..(row + 1) * n];
            // Saturated or overflowing rows carry no gradient.
            if scale == 0.0 || !z.is_finite() || !s_q.is_finite() {
                d.fill(0.0);
                continue;
            }
            d[0] = scale * s_q;
            // s^q * ln(s) -> 0 as s -> 0
            d[1] = if s > 0.0 { scale * k * s_q * s.ln() } else { 0.0 };
            if n == 3 {
                d[2] = -scale * z / (2.0 * sigma);
            }
        }
    }
}
