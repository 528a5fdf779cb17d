// Entry point: headless commands around the ideal observer and the filterbanks.
use std::error::Error;
use std::fs;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use intelligibility::cli::{parse_data, Args, Command};
use intelligibility::config::AppConfig;
use intelligibility::core::db::{amp_to_db, db_to_power_ratio, level_db, power_to_db};
use intelligibility::core::filterbank::{mod_filterbank, noctave_center_freqs, noctave_filtering};
use intelligibility::core::hilbert::hilbert_envelope;
use intelligibility::core::ideal_obs::{FitOptions, IdealObs};
use intelligibility::core::util::mono_mix;
use intelligibility::material::{read_wav, Material};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = AppConfig::load_or_default(&args.config);

    match run(&args.command, &cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: &Command, cfg: &AppConfig) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Fit {
            data,
            sigma_loss,
            fixed_sigma_s,
        } => {
            let text = fs::read_to_string(data)?;
            let (snrenv, pc) = parse_data(&text)?;
            info!(points = snrenv.len(), path = %data.display(), "fitting ideal observer");

            let mut obs = IdealObs::from_config(&cfg.ideal_obs)?;
            let opts = FitOptions {
                sigma_loss: *sigma_loss,
                fixed_sigma_s: *fixed_sigma_s,
                m: None,
            };
            let p = obs.fit_obs_with(&snrenv, &pc, &opts)?;
            if !p.is_fit() {
                return Err("fit left observer parameters unset".into());
            }
            let predicted = obs.snrenv_to_pc(&snrenv, *sigma_loss)?;
            let rmse = (predicted
                .iter()
                .zip(&pc)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                / pc.len() as f64)
                .sqrt();

            println!("[ideal_obs]");
            println!("k = {}", p.k.unwrap_or(f64::NAN));
            println!("q = {}", p.q.unwrap_or(f64::NAN));
            println!("sigma_s = {}", p.sigma_s.unwrap_or(f64::NAN));
            println!("m = {}", p.m);
            println!("# rmse = {rmse:.4}");
        }
        Command::Predict {
            snrenv,
            sigma_loss,
            db,
        } => {
            let obs = IdealObs::from_config(&cfg.ideal_obs)?;
            let linear: Vec<f64> = if *db {
                snrenv.iter().map(|&v| db_to_power_ratio(v)).collect()
            } else {
                snrenv.clone()
            };
            let pc = obs.snrenv_to_pc(&linear, *sigma_loss)?;
            for (input, p) in snrenv.iter().zip(&pc) {
                println!("{input}\t{p:.4}");
            }
        }
        Command::Analyze { wav } => {
            let (fs, channels) = read_wav(wav)?;
            let x = mono_mix(&channels);
            let fs = f64::from(fs);
            let fb = &cfg.filterbank;
            info!(path = %wav.display(), samples = x.len(), fs, "analyzing");

            let center_f = noctave_center_freqs(fb.center_f_min, fb.center_f_max, fb.third_octave_width)?;
            let band_rms = noctave_filtering(&x, &center_f, fs, fb.third_octave_width)?;
            println!("# overall_level_db\t{:.2}", level_db(&x, cfg.material.ref_level));
            println!("# band_hz\tlevel_db");
            for (f, r) in center_f.iter().zip(&band_rms) {
                println!("{f:.1}\t{:.2}", amp_to_db(*r) + cfg.material.ref_level);
            }

            let envelope = hilbert_envelope(&x);
            let powers = mod_filterbank(&envelope, fs, &fb.modf)?;
            println!("# modf_hz\tpower_db");
            for (f, p) in fb.modf.iter().zip(&powers) {
                println!("{f}\t{:.2}", power_to_db(*p));
            }
        }
        Command::Files { limit } => {
            let material = Material::from_config(&cfg.material);
            let names = material.files_list()?;
            info!(material = %material.name, count = names.len(), dir = %material.sentences_dir().display(), "corpus");
            for name in names.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{name}");
            }
        }
    }
    Ok(())
}
