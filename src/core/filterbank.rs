//! Frequency-domain filterbanks: rectangular n-th-octave bands and the EPSM
//! modulation filterbank, plus the SNRenv combination across channels.

use rustfft::{num_complex::Complex64, FftPlanner};
use thiserror::Error;

use crate::core::util::linspace;

/// Q-factor of the modulation band-pass filters.
const MOD_Q: f64 = 1.0;
/// Order of the modulation low-pass (Butterworth) filter.
const MOD_LP_ORDER: i32 = 3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterbankError {
    #[error("input signal is empty")]
    EmptySignal,
    #[error("sample rate must be finite and > 0, got {0}")]
    InvalidSampleRate(f64),
    #[error("band width must be finite and > 0, got {0}")]
    InvalidWidth(f64),
    #[error("frequency must be finite and > 0, got {0}")]
    InvalidFrequency(f64),
    #[error("envelope has no DC power; modulation powers are normalized by it")]
    ZeroDcPower,
    #[error("length mismatch: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("noise power must be finite and > 0, got {value} in channel {channel}")]
    InvalidNoisePower { channel: usize, value: f64 },
}

fn check_sample_rate(fs: f64) -> Result<(), FilterbankError> {
    if fs.is_finite() && fs > 0.0 {
        Ok(())
    } else {
        Err(FilterbankError::InvalidSampleRate(fs))
    }
}

fn check_frequencies(freqs: &[f64]) -> Result<(), FilterbankError> {
    match freqs.iter().find(|f| !(f.is_finite() && **f > 0.0)) {
        Some(&f) => Err(FilterbankError::InvalidFrequency(f)),
        None => Ok(()),
    }
}

fn forward_fft(x: &[f64]) -> Vec<Complex64> {
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(x.len());
    let mut buf: Vec<Complex64> = x.iter().map(|&v| Complex64::new(v, 0.0)).collect();
    fft.process(&mut buf);
    buf
}

/// One-sided power spectrum `|X|²/n` over bins `0..=n/2`, non-DC bins doubled.
fn one_sided_power(spectrum: &[Complex64]) -> Vec<f64> {
    let n = spectrum.len();
    let mut power: Vec<f64> = spectrum[..n / 2 + 1]
        .iter()
        .map(|c| c.norm_sqr() / n as f64)
        .collect();
    for p in power.iter_mut().skip(1) {
        *p *= 2.0;
    }
    power
}

// ---------------------------------------------------------
// n-th-octave filtering
// ---------------------------------------------------------

/// Exact base-2 centre frequencies `1000 · 2^(i/width)` inside `[f_min, f_max]`.
pub fn noctave_center_freqs(f_min: f64, f_max: f64, width: f64) -> Result<Vec<f64>, FilterbankError> {
    check_frequencies(&[f_min, f_max])?;
    if !(width.is_finite() && width > 0.0) {
        return Err(FilterbankError::InvalidWidth(width));
    }
    let first = (width * (f_min / 1000.0).log2()).ceil() as i64;
    let last = (width * (f_max / 1000.0).log2()).floor() as i64;
    Ok((first..=last)
        .map(|i| 1000.0 * 2f64.powf(i as f64 / width))
        .collect())
}

/// Rectangular 1/`width`-octave filtering; returns the RMS of `x` in each band.
///
/// Band edges are `f_c · 2^(±1/(2·width))`. Edges at or above Nyquist are
/// dropped and the bands that lose an edge report 0.
pub fn noctave_filtering(
    x: &[f64],
    center_f: &[f64],
    fs: f64,
    width: f64,
) -> Result<Vec<f64>, FilterbankError> {
    if x.is_empty() {
        return Err(FilterbankError::EmptySignal);
    }
    check_sample_rate(fs)?;
    if !(width.is_finite() && width > 0.0) {
        return Err(FilterbankError::InvalidWidth(width));
    }
    check_frequencies(center_f)?;
    if center_f.is_empty() {
        return Ok(Vec::new());
    }

    let n = x.len();
    let power = one_sided_power(&forward_fft(x));
    let n_bins = power.len();

    let half_band = 2f64.powf(1.0 / (2.0 * width));
    let nyquist = fs / 2.0;
    let edges: Vec<usize> = std::iter::once(center_f[0] / half_band)
        .chain(center_f.iter().map(|&fc| fc * half_band))
        .filter(|&f| f < nyquist)
        .map(|f| (f / nyquist * n_bins as f64).floor() as usize)
        .collect();

    let mut out = vec![0.0; center_f.len()];
    for (band, pair) in edges.windows(2).enumerate() {
        let lo = pair[0].min(n_bins);
        let hi = pair[1].min(n_bins);
        if hi > lo {
            out[band] = (power[lo..hi].iter().sum::<f64>() / n as f64).sqrt();
        }
    }
    Ok(out)
}

// ---------------------------------------------------------
// Modulation filterbank
// ---------------------------------------------------------

/// Squared magnitude of modulation channel `k` at frequency `f >= 0`.
fn mod_channel_power_gain(k: usize, f: f64, modf: &[f64]) -> f64 {
    if k == 0 {
        1.0 / (1.0 + (f / modf[0]).powi(2 * MOD_LP_ORDER))
    } else if f == 0.0 {
        0.0
    } else {
        let fc = modf[k];
        let detune = MOD_Q * (f / fc - fc / f);
        1.0 / (1.0 + detune * detune)
    }
}

/// Complex transfer function of channel `k` at signed frequency `f`.
fn mod_channel_response(k: usize, f: f64, modf: &[f64]) -> Complex64 {
    if k == 0 {
        Complex64::new(mod_channel_power_gain(0, f.abs(), modf).sqrt(), 0.0)
    } else if f == 0.0 {
        Complex64::new(0.0, 0.0)
    } else {
        let fc = modf[k];
        Complex64::new(1.0, 0.0) / Complex64::new(1.0, MOD_Q * (f / fc - fc / f))
    }
}

/// Powers and filtered envelopes of the modulation filterbank.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModFilterbankOutput {
    /// AC power per channel, normalized by the envelope's DC power.
    pub powers: Vec<f64>,
    /// Filtered time-domain envelope per channel.
    pub envelopes: Vec<Vec<f64>>,
}

struct ModSpectrum {
    spectrum: Vec<Complex64>,
    freqs_pos: Vec<f64>,
    powers: Vec<f64>,
}

fn mod_spectrum(envelope: &[f64], fs: f64, modf: &[f64]) -> Result<ModSpectrum, FilterbankError> {
    if envelope.is_empty() {
        return Err(FilterbankError::EmptySignal);
    }
    check_sample_rate(fs)?;
    check_frequencies(modf)?;

    let n = envelope.len();
    let spectrum = forward_fft(envelope);
    let power = one_sided_power(&spectrum);
    let freqs_pos = linspace(0.0, fs / 2.0, power.len());

    // Halved so that a fully modulated tone has an AC power of 1.
    let dc_power = power[0] / n as f64 / 2.0;
    if !(dc_power > 0.0) {
        return Err(FilterbankError::ZeroDcPower);
    }

    let powers = (0..modf.len())
        .map(|k| {
            let ac: f64 = power
                .iter()
                .zip(&freqs_pos)
                .skip(1)
                .map(|(&p, &f)| p * mod_channel_power_gain(k, f, modf))
                .sum();
            ac / n as f64 / dc_power
        })
        .collect();

    Ok(ModSpectrum {
        spectrum,
        freqs_pos,
        powers,
    })
}

/// EPSM modulation filterbank: envelope power in each modulation channel.
///
/// Channel 0 is a third-order Butterworth low-pass at `modf[0]`; the others
/// are Q=1 band-pass filters centred on `modf[k]`.
pub fn mod_filterbank(envelope: &[f64], fs: f64, modf: &[f64]) -> Result<Vec<f64>, FilterbankError> {
    Ok(mod_spectrum(envelope, fs, modf)?.powers)
}

/// Modulation filterbank that also returns the filtered envelopes.
pub fn mod_filterbank_envelopes(
    envelope: &[f64],
    fs: f64,
    modf: &[f64],
) -> Result<ModFilterbankOutput, FilterbankError> {
    let ModSpectrum {
        spectrum,
        freqs_pos,
        powers,
    } = mod_spectrum(envelope, fs, modf)?;
    let n = spectrum.len();
    let n_pos = freqs_pos.len();

    // Negative-frequency bins mirror the positive axis.
    let signed_freq = |i: usize| if i < n_pos { freqs_pos[i] } else { -freqs_pos[n - i] };

    let mut planner = FftPlanner::<f64>::new();
    let ifft = planner.plan_fft_inverse(n);
    let scale = 1.0 / n as f64;
    let envelopes = (0..modf.len())
        .map(|k| {
            let mut buf: Vec<Complex64> = spectrum
                .iter()
                .enumerate()
                .map(|(i, &x)| x * mod_channel_response(k, signed_freq(i), modf))
                .collect();
            ifft.process(&mut buf);
            buf.iter().map(|c| c.re * scale).collect()
        })
        .collect();

    Ok(ModFilterbankOutput { powers, envelopes })
}

// ---------------------------------------------------------
// SNRenv
// ---------------------------------------------------------

/// Combined SNRenv: per channel `max(P_mix − P_noise, 0) / P_noise`, then the
/// root-sum-of-squares over channels.
pub fn snr_env(mix_powers: &[f64], noise_powers: &[f64]) -> Result<f64, FilterbankError> {
    if mix_powers.len() != noise_powers.len() {
        return Err(FilterbankError::LengthMismatch {
            left: mix_powers.len(),
            right: noise_powers.len(),
        });
    }
    let mut sum_sq = 0.0;
    for (channel, (&mix, &noise)) in mix_powers.iter().zip(noise_powers).enumerate() {
        if !(noise.is_finite() && noise > 0.0) {
            return Err(FilterbankError::InvalidNoisePower { channel, value: noise });
        }
        let snr = (mix - noise).max(0.0) / noise;
        sum_sq += snr * snr;
    }
    Ok(sum_sq.sqrt())
}
