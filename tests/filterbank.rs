use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use intelligibility::core::filterbank::{
    mod_filterbank, mod_filterbank_envelopes, noctave_center_freqs, noctave_filtering, snr_env,
};
use intelligibility::core::hilbert::hilbert_envelope;
use intelligibility::core::util::sine;

const MODF: [f64; 7] = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0];

#[test]
fn mod_filtering_for_simple_signal() {
    let signal = [1.0, 0.0, 1.0, 0.0, 1.0];
    let target = [
        6.697_852_98e-18,
        6.063_758_59e-06,
        2.425_553_85e-05,
        9.703_022_12e-05,
        3.882_499_57e-04,
        1.555_064_96e-03,
        6.253_296_63e-03,
    ];
    let p = mod_filterbank(&signal, 2205.0, &MODF).unwrap();
    assert_eq!(p.len(), target.len());
    for (a, b) in p.iter().zip(target.iter()) {
        assert_relative_eq!(a, b, max_relative = 1e-2);
    }
}

#[test]
fn third_octave_rms_of_a_tone() {
    let fs = 22050.0;
    let cf = noctave_center_freqs(63.0, 8000.0, 3.0).unwrap();
    assert_eq!(cf.len(), 21);
    let x = sine(fs, 1000.0, 22050);
    let rms = noctave_filtering(&x, &cf, fs, 3.0).unwrap();
    let band = cf.iter().position(|&f| (f - 1000.0).abs() < 1e-9).unwrap();
    assert_relative_eq!(rms[band], std::f64::consts::FRAC_1_SQRT_2, max_relative = 1e-9);
    let total: f64 = rms.iter().map(|r| r * r).sum();
    assert_relative_eq!(total, 0.5, max_relative = 1e-9);
}

#[test]
fn noise_lowers_snr_env_of_a_modulated_carrier() {
    let fs = 8000.0;
    let n = 16000;
    let carrier = sine(fs, 1000.0, n);
    let modulator = sine(fs, 4.0, n);
    let clean: Vec<f64> = carrier
        .iter()
        .zip(&modulator)
        .map(|(c, m)| c * (1.0 + 0.8 * m))
        .collect();
    let mut rng = StdRng::seed_from_u64(3);
    let noise: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
    let p_noise = mod_filterbank(&hilbert_envelope(&noise), fs, &MODF).unwrap();

    let snr_at = |gain: f64| {
        let mix: Vec<f64> = clean.iter().zip(&noise).map(|(c, v)| c + gain * v).collect();
        let p_mix = mod_filterbank(&hilbert_envelope(&mix), fs, &MODF).unwrap();
        snr_env(&p_mix, &p_noise).unwrap()
    };
    let quiet = snr_at(0.05);
    let loud = snr_at(2.0);
    assert!(quiet.is_finite());
    assert!(quiet > loud, "{quiet} <= {loud}");
}

#[test]
fn filtered_envelopes_have_input_length() {
    let fs = 1000.0;
    let env: Vec<f64> = sine(fs, 16.0, 2000).iter().map(|s| 1.0 + 0.5 * s).collect();
    let out = mod_filterbank_envelopes(&env, fs, &MODF).unwrap();
    assert_eq!(out.envelopes.len(), MODF.len());
    for e in &out.envelopes {
        assert_eq!(e.len(), env.len());
    }
    // 16 Hz channel passes the modulation: amplitude 0.5.
    let peak = out.envelopes[4].iter().cloned().fold(f64::MIN, f64::max);
    assert_relative_eq!(peak, 0.5, max_relative = 1e-2);
}
