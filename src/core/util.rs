/// `num` evenly spaced values from `start` to `stop` inclusive (numpy `linspace`).
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            let mut out: Vec<f64> = (0..num).map(|i| start + step * i as f64).collect();
            out[num - 1] = stop;
            out
        }
    }
}

/// Generate log-spaced values between start and stop (inclusive)
pub fn logspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    linspace(start.log10(), stop.log10(), num)
        .into_iter()
        .map(|e| 10f64.powf(e))
        .collect()
}

/// Generate sine wave samples
pub fn sine(fs: f64, f: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * std::f64::consts::PI * f * (i as f64) / fs).sin())
        .collect()
}

/// Average the channels of a channel-major signal into one.
pub fn mono_mix(channels: &[Vec<f64>]) -> Vec<f64> {
    let Some(len) = channels.iter().map(Vec::len).min() else {
        return Vec::new();
    };
    let scale = 1.0 / channels.len() as f64;
    (0..len)
        .map(|i| channels.iter().map(|ch| ch[i]).sum::<f64>() * scale)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linspace_endpoints() {
        let v = linspace(0.0, 1102.5, 3);
        assert_eq!(v, vec![0.0, 551.25, 1102.5]);
        assert_eq!(linspace(2.0, 5.0, 1), vec![2.0]);
        assert!(linspace(2.0, 5.0, 0).is_empty());
    }

    #[test]
    fn logspace_decades() {
        let v = logspace(0.01, 100.0, 5);
        for (a, b) in v.iter().zip([0.01, 0.1, 1.0, 10.0, 100.0]) {
            assert!((a / b - 1.0).abs() < 1e-12, "{a} vs {b}");
        }
    }

    #[test]
    fn mono_mix_averages() {
        let m = mono_mix(&[vec![1.0, 0.0, 2.0], vec![0.0, 1.0]]);
        assert_eq!(m, vec![0.5, 0.5]);
        assert!(mono_mix(&[]).is_empty());
    }
}
