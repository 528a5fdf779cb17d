//! Bounded Levenberg-Marquardt for small dense least-squares problems.
//!
//! Minimizes `Σ r_i(p)²` for problems with a handful of parameters and tens of
//! residuals. The normal equations are damped with Marquardt scaling,
//! `(JᵀJ + λ·diag(JᵀJ)) δ = −Jᵀr`, and solved directly. Box bounds are
//! handled by projection plus an active set: a parameter sitting on a bound
//! whose gradient points out of the box is held fixed for that iteration.
//! Each step is shortened so that no parameter moves by more than
//! `max_relative_step · max(|x_i|, 1)`, and a trial point is only accepted
//! when both its residuals and its Jacobian are finite.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A nonlinear least-squares problem.
pub trait LeastSquaresProblem {
    fn n_params(&self) -> usize;

    fn n_residuals(&self) -> usize;

    /// Write `r(params)` into `out` (length `n_residuals`).
    fn residuals(&self, params: &[f64], out: &mut [f64]);

    /// Write the Jacobian into `out`, row-major `n_residuals x n_params`.
    fn jacobian(&self, params: &[f64], out: &mut [f64]);
}

/// Optional lower/upper bound of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub lower: Option<f64>,
    pub upper: Option<f64>,
}

impl Bounds {
    pub const FREE: Bounds = Bounds {
        lower: None,
        upper: None,
    };

    pub fn at_least(lower: f64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    #[inline]
    fn project(&self, x: f64) -> f64 {
        let x = match self.lower {
            Some(lo) if x < lo => lo,
            _ => x,
        };
        match self.upper {
            Some(hi) if x > hi => hi,
            _ => x,
        }
    }

    /// True when `x` sits on a bound and descent along `-gradient` would leave the box.
    #[inline]
    fn blocks(&self, x: f64, gradient: f64) -> bool {
        let on_lower = matches!(self.lower, Some(lo) if x <= lo);
        let on_upper = matches!(self.upper, Some(hi) if x >= hi);
        (on_lower && gradient > 0.0) || (on_upper && gradient < 0.0)
    }
}

/// Solver failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("{residuals} residuals cannot determine {params} parameters")]
    Underdetermined { params: usize, residuals: usize },
    #[error("residuals or Jacobian became non-finite at iteration {iteration}")]
    NonFinite { iteration: usize },
    #[error("normal equations are singular at iteration {iteration}")]
    SingularSystem { iteration: usize },
    #[error("no convergence after {iterations} iterations (cost {cost:e})")]
    DidNotConverge { iterations: usize, cost: f64 },
}

/// Result of a successful minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub params: Vec<f64>,
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
}

/// Solver settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    pub max_iterations: usize,
    /// Relative cost reduction below which an accepted step ends the search.
    pub ftol: f64,
    /// Relative step length below which the search ends.
    pub xtol: f64,
    /// Projected-gradient magnitude (relative to `1 + cost`) treated as stationary.
    pub gtol: f64,
    pub initial_lambda: f64,
    /// Largest move of a parameter in one step, relative to `max(|x_i|, 1)`.
    pub max_relative_step: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-14,
            xtol: 1e-12,
            gtol: 1e-12,
            initial_lambda: 1e-3,
            max_relative_step: 1.0,
        }
    }
}

const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e16;

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

impl LevenbergMarquardt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Minimize `problem` from `initial`, keeping every parameter inside `bounds`.
    pub fn minimize<P: LeastSquaresProblem + ?Sized>(
        &self,
        problem: &P,
        initial: &[f64],
        bounds: &[Bounds],
    ) -> Result<Solution, SolverError> {
        let n = problem.n_params();
        let m = problem.n_residuals();
        if initial.len() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                actual: initial.len(),
            });
        }
        if bounds.len() != n {
            return Err(SolverError::DimensionMismatch {
                expected: n,
                actual: bounds.len(),
            });
        }
        if m < n {
            return Err(SolverError::Underdetermined {
                params: n,
                residuals: m,
            });
        }

        let mut x: Vec<f64> = initial
            .iter()
            .zip(bounds)
            .map(|(&v, b)| b.project(v))
            .collect();
        let mut r = vec![0.0; m];
        problem.residuals(&x, &mut r);
        if !all_finite(&r) {
            return Err(SolverError::NonFinite { iteration: 0 });
        }
        let mut cost = sum_sq(&r);

        let mut jac = vec![0.0; m * n];
        problem.jacobian(&x, &mut jac);
        if !all_finite(&jac) {
            return Err(SolverError::NonFinite { iteration: 0 });
        }
        let mut jac_trial = vec![0.0; m * n];
        let mut jtj = vec![0.0; n * n];
        let mut grad = vec![0.0; n];
        let mut trial = vec![0.0; n];
        let mut r_trial = vec![0.0; m];
        let mut lambda = self.initial_lambda;

        for iteration in 1..=self.max_iterations {
            normal_equations(&jac, &r, m, n, &mut jtj, &mut grad);

            let free: Vec<usize> = (0..n)
                .filter(|&i| !bounds[i].blocks(x[i], grad[i]))
                .collect();
            let grad_norm = free.iter().map(|&i| grad[i].abs()).fold(0.0, f64::max);
            if free.is_empty() || grad_norm <= self.gtol * (1.0 + cost) {
                return Ok(Solution {
                    params: x,
                    cost,
                    iterations: iteration,
                });
            }

            loop {
                let mut delta = damped_step(&jtj, &grad, &free, n, lambda)
                    .ok_or(SolverError::SingularSystem { iteration })?;
                let shrink = free
                    .iter()
                    .zip(&delta)
                    .map(|(&i, d)| self.max_relative_step * x[i].abs().max(1.0) / d.abs())
                    .fold(1.0, f64::min);
                delta.iter_mut().for_each(|d| *d *= shrink);

                trial.copy_from_slice(&x);
                for (&i, d) in free.iter().zip(&delta) {
                    trial[i] = bounds[i].project(x[i] + d);
                }
                let step_norm = x
                    .iter()
                    .zip(&trial)
                    .map(|(a, b)| (b - a) * (b - a))
                    .sum::<f64>()
                    .sqrt();
                let x_norm = sum_sq(&x).sqrt();
                let step_negligible = step_norm <= self.xtol * (x_norm + self.xtol);

                problem.residuals(&trial, &mut r_trial);
                let mut cost_trial = if all_finite(&r_trial) {
                    sum_sq(&r_trial)
                } else {
                    f64::INFINITY
                };
                if cost_trial < cost {
                    problem.jacobian(&trial, &mut jac_trial);
                    if !all_finite(&jac_trial) {
                        cost_trial = f64::INFINITY;
                    }
                }

                if cost_trial < cost {
                    let reduction = (cost - cost_trial) / cost.max(f64::MIN_POSITIVE);
                    std::mem::swap(&mut x, &mut trial);
                    std::mem::swap(&mut r, &mut r_trial);
                    std::mem::swap(&mut jac, &mut jac_trial);
                    cost = cost_trial;
                    lambda = (lambda / 10.0).max(LAMBDA_MIN);
                    if reduction <= self.ftol || step_negligible {
                        return Ok(Solution {
                            params: x,
                            cost,
                            iterations: iteration,
                        });
                    }
                    break;
                }

                // No usable decrease: shorten the step. A vanishing step or
                // saturated damping means the current point is already the minimum.
                lambda *= 10.0;
                if step_negligible || lambda > LAMBDA_MAX {
                    return Ok(Solution {
                        params: x,
                        cost,
                        iterations: iteration,
                    });
                }
            }
        }

        Err(SolverError::DidNotConverge {
            iterations: self.max_iterations,
            cost,
        })
    }
}

// ---------------------------------------------------------------------------
// Linear algebra helpers
// ---------------------------------------------------------------------------

fn all_finite(v: &[f64]) -> bool {
    v.iter().all(|x| x.is_finite())
}

fn sum_sq(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// `jtj = JᵀJ` and `grad = Jᵀr`.
fn normal_equations(jac: &[f64], r: &[f64], m: usize, n: usize, jtj: &mut [f64], grad: &mut [f64]) {
    jtj.fill(0.0);
    grad.fill(0.0);
    for row in 0..m {
        let j_row = &jac[row * n..(row + 1) * n];
        for a in 0..n {
            grad[a] += j_row[a] * r[row];
            for b in a..n {
                jtj[a * n + b] += j_row[a] * j_row[b];
            }
        }
    }
    for a in 0..n {
        for b in 0..a {
            jtj[a * n + b] = jtj[b * n + a];
        }
    }
}

/// Solve the damped system restricted to the `free` parameters.
fn damped_step(jtj: &[f64], grad: &[f64], free: &[usize], n: usize, lambda: f64) -> Option<Vec<f64>> {
    let k = free.len();
    let mut a = vec![0.0; k * k];
    let mut b = vec![0.0; k];
    for (row, &i) in free.iter().enumerate() {
        for (col, &j) in free.iter().enumerate() {
            a[row * k + col] = jtj[i * n + j];
        }
        a[row * k + row] += lambda * jtj[i * n + i];
        b[row] = -grad[i];
    }
    solve_dense(&mut a, &mut b, k)
}

/// Gaussian elimination with partial pivoting; `a` is row-major `k x k`.
/// Returns `None` for a numerically singular matrix.
fn solve_dense(a: &mut [f64], b: &mut [f64], k: usize) -> Option<Vec<f64>> {
    let scale = a.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let tiny = f64::EPSILON * scale;

    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&p, &q| a[p * k + col].abs().total_cmp(&a[q * k + col].abs()))?;
        if a[pivot_row * k + col].abs() <= tiny {
            return None;
        }
        if pivot_row != col {
            for c in 0..k {
                a.swap(col * k + c, pivot_row * k + c);
            }
            b.swap(col, pivot_row);
        }
        let pivot = a[col * k + col];
        for row in col + 1..k {
            let factor = a[row * k + col] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in col..k {
                a[row * k + c] -= factor * a[col * k + c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; k];
    for row in (0..k).rev() {
        let tail: f64 = (row + 1..k).map(|c| a[row * k + c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row * k + row];
    }
    Some(x)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
