use clap::{Parser, Subcommand};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to config TOML
    #[arg(long, default_value = "intelligibility.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fit the ideal observer to measured scores
    Fit {
        /// Two-column text file: snrenv and percent correct
        data: PathBuf,

        /// External spread held fixed during the fit
        #[arg(long, default_value_t = 0.0)]
        sigma_loss: f64,

        /// Pin sigma_s and fit only k and q
        #[arg(long)]
        fixed_sigma_s: Option<f64>,
    },

    /// Predict percent correct with the [ideal_obs] parameters of the config
    Predict {
        #[arg(required = true, allow_negative_numbers = true)]
        snrenv: Vec<f64>,

        #[arg(long, default_value_t = 0.0)]
        sigma_loss: f64,

        /// Read the SNRenv values in dB
        #[arg(long, default_value_t = false)]
        db: bool,
    },

    /// Third-octave levels and modulation powers of a WAV file
    Analyze { wav: PathBuf },

    /// List the sentence files of the configured material
    Files {
        /// Show at most this many files
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("line {line}: expected two columns, found {found}")]
    Columns { line: usize, found: usize },
    #[error("line {line}: cannot parse `{token}` as a number")]
    Number { line: usize, token: String },
}

/// Parse `snrenv pc` pairs separated by whitespace or commas. `#` starts a comment.
pub fn parse_data(text: &str) -> Result<(Vec<f64>, Vec<f64>), DataError> {
    let mut snrenv = Vec::new();
    let mut pc = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
            .collect();
        if tokens.len() != 2 {
            return Err(DataError::Columns {
                line: idx + 1,
                found: tokens.len(),
            });
        }
        let parse = |t: &str| {
            t.parse::<f64>().map_err(|_| DataError::Number {
                line: idx + 1,
                token: t.to_string(),
            })
        };
        snrenv.push(parse(tokens[0])?);
        pc.push(parse(tokens[1])?);
    }
    Ok((snrenv, pc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commented_csv_and_whitespace() {
        let text = "# snrenv pc\n0.01, 0.28\n\n1.0\t18.6  # mid\n100 99.2\n";
        let (s, p) = parse_data(text).unwrap();
        assert_eq!(s, vec![0.01, 1.0, 100.0]);
        assert_eq!(p, vec![0.28, 18.6, 99.2]);
    }

    #[test]
    fn reports_bad_lines() {
        assert_eq!(
            parse_data("1 2\n3\n"),
            Err(DataError::Columns { line: 2, found: 1 })
        );
        assert_eq!(
            parse_data("1 x\n"),
            Err(DataError::Number {
                line: 1,
                token: "x".to_string()
            })
        );
    }

    #[test]
    fn predict_accepts_negative_db() {
        let args = Args::try_parse_from(["intelligibility", "predict", "--db", "-3", "6"]).unwrap();
        assert_eq!(args.config, "intelligibility.toml");
        assert_eq!(
            args.command,
            Command::Predict {
                snrenv: vec![-3.0, 6.0],
                sigma_loss: 0.0,
                db: true
            }
        );
    }
}
