use rustfft::{num_complex::Complex64, num_traits::Zero, FftPlanner};

/// Hilbert envelope (magnitude of the analytic signal)
pub fn hilbert_envelope(input: &[f64]) -> Vec<f64> {
    analytic_signal(input).iter().map(|c| c.norm()).collect()
}

/// Analytic signal (FFT-based), same length as the input.
pub fn analytic_signal(input: &[f64]) -> Vec<Complex64> {
    let n = input.len();
    if n == 0 {
        return Vec::new();
    }

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut x: Vec<Complex64> = input.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut x);

    // DC and (even n) Nyquist are kept, positive bins doubled, negative bins zeroed.
    let positive_end = (n + 1) / 2;
    for (i, xi) in x.iter_mut().enumerate() {
        if i == 0 || (n % 2 == 0 && i == n / 2) {
            continue;
        }
        if i < positive_end {
            *xi *= 2.0;
        } else {
            *xi = Complex64::zero();
        }
    }

    ifft.process(&mut x);

    // rustfft does not scale the inverse transform
    let scale = 1.0 / n as f64;
    for xi in x.iter_mut() {
        *xi *= scale;
    }
    x
}
