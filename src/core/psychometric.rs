//! Normal-CDF psychometric function.
//!
//! Evaluated through the complementary error function so the result is the
//! exact normal CDF up to floating-point precision. The ideal observer's
//! fitted parameters are only meaningful relative to this function.

use std::f64::consts::{PI, SQRT_2};

use statrs::function::erf::{erfc, erfc_inv};
use thiserror::Error;

/// Errors returned for an invalid normal distribution.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum PsychometricError {
    #[error("standard deviation must be finite and > 0, got {0}")]
    InvalidSigma(f64),
    #[error("mean must be finite, got {0}")]
    InvalidMean(f64),
}

fn check_distribution(mu: f64, sigma: f64) -> Result<(), PsychometricError> {
    if !mu.is_finite() {
        return Err(PsychometricError::InvalidMean(mu));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(PsychometricError::InvalidSigma(sigma));
    }
    Ok(())
}

/// `P(X <= x)` for `X ~ Normal(mu, sigma)`; caller guarantees `sigma > 0`.
#[inline]
pub(crate) fn cdf_unchecked(x: f64, mu: f64, sigma: f64) -> f64 {
    0.5 * erfc((mu - x) / (sigma * SQRT_2))
}

/// Normal CDF at a single point.
pub fn normal_cdf(x: f64, mu: f64, sigma: f64) -> Result<f64, PsychometricError> {
    check_distribution(mu, sigma)?;
    Ok(cdf_unchecked(x, mu, sigma))
}

/// Psychometric function: the normal CDF evaluated at every element of `x`.
pub fn psy_fn(x: &[f64], mu: f64, sigma: f64) -> Result<Vec<f64>, PsychometricError> {
    check_distribution(mu, sigma)?;
    Ok(x.iter().map(|&xi| cdf_unchecked(xi, mu, sigma)).collect())
}

/// Standard normal density.
#[inline]
pub fn standard_normal_pdf(z: f64) -> f64 {
    (-0.5 * z * z).exp() / (2.0 * PI).sqrt()
}

/// Standard normal quantile (inverse CDF) for `p` in `(0, 1)`.
pub fn standard_normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn half_at_the_mean() {
        for &(mu, sigma) in &[(0.0, 1.0), (3.2, 0.4), (-7.0, 12.0)] {
            let p = psy_fn(&[mu], mu, sigma).unwrap();
            assert_eq!(p[0], 0.5);
        }
    }

    #[test]
    fn matches_reference_values() {
        let p = psy_fn(&[-1.96, -1.0, 0.0, 1.0, 2.0], 0.0, 1.0).unwrap();
        let target = [
            0.024_997_895_148_220_435,
            0.158_655_253_931_457_05,
            0.5,
            0.841_344_746_068_542_9,
            0.977_249_868_051_820_8,
        ];
        for (a, b) in p.iter().zip(target.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn shifts_and_scales() {
        let a = normal_cdf(2.5, 1.0, 0.5).unwrap();
        let b = normal_cdf(3.0, 0.0, 1.0).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
    }

    #[test]
    fn monotone_in_x() {
        let x: Vec<f64> = (0..400).map(|i| -10.0 + i as f64 * 0.05).collect();
        let p = psy_fn(&x, 0.3, 1.7).unwrap();
        assert!(p.windows(2).all(|w| w[1] >= w[0]));
        assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn rejects_bad_sigma() {
        assert_eq!(
            psy_fn(&[0.0], 0.0, 0.0),
            Err(PsychometricError::InvalidSigma(0.0))
        );
        assert_eq!(
            normal_cdf(0.0, 0.0, -1.0),
            Err(PsychometricError::InvalidSigma(-1.0))
        );
        assert!(psy_fn(&[0.0], f64::NAN, 1.0).is_err());
    }

    #[test]
    fn quantile_inverts_cdf() {
        assert_abs_diff_eq!(standard_normal_quantile(0.975), 1.959_963_984_540_054, epsilon = 1e-9);
        for &p in &[1e-4, 0.1, 0.5, 0.9, 0.999_875] {
            let z = standard_normal_quantile(p);
            assert_abs_diff_eq!(cdf_unchecked(z, 0.0, 1.0), p, epsilon = 1e-12);
        }
    }

    #[test]
    fn pdf_peak() {
        assert_abs_diff_eq!(standard_normal_pdf(0.0), 0.398_942_280_401_432_7, epsilon = 1e-15);
    }
}
