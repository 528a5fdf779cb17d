//! Level arithmetic. Powers use `10·log10`, amplitudes `20·log10`; log
//! conversions clamp at [`EPS_POWER`] so silence maps to -200 dB.

pub const EPS_POWER: f64 = 1e-20;

pub fn db_to_power_ratio(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

pub fn db_to_amp_ratio(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

pub fn power_to_db(p: f64) -> f64 {
    10.0 * p.max(EPS_POWER).log10()
}

pub fn amp_to_db(a: f64) -> f64 {
    20.0 * a.max(EPS_POWER.sqrt()).log10()
}

/// Root-mean-square of a signal; 0 for an empty slice.
pub fn rms(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
}

/// Level of `x` in dB when an RMS of 1 is presented at `ref_level` dB.
pub fn level_db(x: &[f64], ref_level: f64) -> f64 {
    amp_to_db(rms(x)) + ref_level
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ratios_invert_the_db_scales() {
        for db in [-40.0, -6.0, 0.0, 3.0, 74.0] {
            assert_abs_diff_eq!(power_to_db(db_to_power_ratio(db)), db, epsilon = 1e-10);
            assert_abs_diff_eq!(amp_to_db(db_to_amp_ratio(db)), db, epsilon = 1e-10);
        }
    }

    #[test]
    fn silence_is_floored() {
        assert_eq!(power_to_db(0.0), -200.0);
        assert_eq!(amp_to_db(0.0), -200.0);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn level_is_relative_to_unit_rms() {
        assert_abs_diff_eq!(level_db(&[1.0, -1.0, 1.0, -1.0], 74.0), 74.0, epsilon = 1e-12);
        assert_abs_diff_eq!(level_db(&[0.5; 8], 74.0), 74.0 - 6.020_599_913, epsilon = 1e-8);
    }
}
