//! Speech-material corpora on disk: sentence files, speech-shaped noise and
//! presentation level.

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};
use rand::Rng;
use rustfft::{num_complex::Complex64, FftPlanner};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::MaterialConfig;
use crate::core::db::{db_to_amp_ratio, rms};
use crate::core::util::mono_mix;

#[derive(Debug, Error)]
pub enum MaterialError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode WAV file {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    #[error("no speech-shaped noise path set")]
    SsnPathUnset,
    #[error("speech-shaped noise not loaded; call load_ssn first")]
    SsnNotLoaded,
    #[error("noise of {available} samples is too short for a random {requested}-sample segment")]
    NoiseTooShort { requested: usize, available: usize },
    #[error("no speech files found in {0}")]
    EmptyCorpus(PathBuf),
    #[error("requested length must be > 0")]
    InvalidLength,
}

/// Read a WAV file as channel-major samples in [-1, 1].
///
/// Integer PCM is divided by its full scale `2^(bits-1)`; float PCM is kept.
/// Returns the sample rate alongside the channels.
pub fn read_wav(path: &Path) -> Result<(u32, Vec<Vec<f64>>), MaterialError> {
    let wav_err = |source| MaterialError::Wav {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();
    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Int => {
            let full_scale = (1u64 << (spec.bits_per_sample - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(wav_err)?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
    };

    let n_ch = usize::from(spec.channels.max(1));
    let mut channels = vec![Vec::with_capacity(interleaved.len() / n_ch); n_ch];
    for frame in interleaved.chunks_exact(n_ch) {
        for (ch, &s) in channels.iter_mut().zip(frame) {
            ch.push(s);
        }
    }
    Ok((spec.sample_rate, channels))
}

/// A speech corpus laid out as `root_path/path_to_sentences/*.wav`, with an
/// optional speech-shaped noise (SSN) file under `root_path`.
#[derive(Debug, Clone)]
pub struct Material {
    pub fs: u32,
    pub root_path: PathBuf,
    pub path_to_sentences: PathBuf,
    pub path_to_maskers: Option<PathBuf>,
    /// Level (dB) of a sentence with an RMS of 1.
    pub ref_level: f64,
    pub name: String,
    ssn_path: Option<PathBuf>,
    ssn: Option<Vec<f64>>,
}

impl Material {
    pub fn new(fs: u32, root_path: impl Into<PathBuf>, path_to_sentences: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root_path: root_path.into(),
            path_to_sentences: path_to_sentences.into(),
            path_to_maskers: None,
            ref_level: 74.0,
            name: String::new(),
            ssn_path: None,
            ssn: None,
        }
    }

    /// Build from configuration. The SSN path is recorded but not loaded.
    pub fn from_config(cfg: &MaterialConfig) -> Self {
        let mut material = Self::new(cfg.fs, &cfg.root_path, &cfg.path_to_sentences);
        material.path_to_maskers = cfg.path_to_maskers.as_ref().map(PathBuf::from);
        material.ref_level = cfg.ref_level;
        material.name = cfg.name.clone();
        if let Some(ssn) = &cfg.path_to_ssn {
            material.set_ssn_path(ssn);
        }
        material
    }

    pub fn sentences_dir(&self) -> PathBuf {
        self.root_path.join(&self.path_to_sentences)
    }

    pub fn ssn_path(&self) -> Option<&Path> {
        self.ssn_path.as_deref()
    }

    /// Record the SSN path (relative to `root_path`). Any loaded noise is dropped.
    pub fn set_ssn_path(&mut self, path: impl Into<PathBuf>) {
        self.ssn_path = Some(path.into());
        self.ssn = None;
    }

    pub fn is_ssn_loaded(&self) -> bool {
        self.ssn.is_some()
    }

    /// Read the SSN file. Multichannel noise is mixed down to mono.
    pub fn load_ssn(&mut self) -> Result<(), MaterialError> {
        let rel = self.ssn_path.as_ref().ok_or(MaterialError::SsnPathUnset)?;
        let path = self.root_path.join(rel);
        let (fs, channels) = read_wav(&path)?;
        if fs != self.fs {
            warn!(path = %path.display(), file_fs = fs, fs = self.fs, "SSN sample rate differs from material");
        }
        let noise = if channels.len() == 1 {
            channels.into_iter().next().unwrap_or_default()
        } else {
            mono_mix(&channels)
        };
        debug!(path = %path.display(), samples = noise.len(), "loaded SSN");
        self.ssn = Some(noise);
        Ok(())
    }

    /// Sorted file names of the sentence directory.
    pub fn files_list(&self) -> Result<Vec<String>, MaterialError> {
        let dir = self.sentences_dir();
        let entries = fs::read_dir(&dir).map_err(|source| MaterialError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| MaterialError::Io {
                path: dir.clone(),
                source,
            })?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Read one sentence file by name, channel-major.
    pub fn load_file(&self, name: &str) -> Result<Vec<Vec<f64>>, MaterialError> {
        let path = self.sentences_dir().join(name);
        let (fs, channels) = read_wav(&path)?;
        if fs != self.fs {
            warn!(path = %path.display(), file_fs = fs, fs = self.fs, "sentence sample rate differs from material");
        }
        Ok(channels)
    }

    /// Lazily read the first `n` sentence files; all of them for `None` or `Some(0)`.
    pub fn load_files(
        &self,
        n: Option<usize>,
    ) -> Result<impl Iterator<Item = Result<Vec<Vec<f64>>, MaterialError>> + '_, MaterialError> {
        let names = self.files_list()?;
        let take = match n {
            Some(n) if n > 0 => n,
            _ => names.len(),
        };
        Ok(names.into_iter().take(take).map(move |name| self.load_file(&name)))
    }

    /// The whole loaded noise.
    pub fn ssn_full(&self) -> Result<&[f64], MaterialError> {
        self.ssn.as_deref().ok_or(MaterialError::SsnNotLoaded)
    }

    /// Random SSN segment of `len` samples, starting in `[len, noise_len - len)`.
    pub fn ssn_segment<R: Rng + ?Sized>(&self, len: usize, rng: &mut R) -> Result<Vec<f64>, MaterialError> {
        let noise = self.ssn_full()?;
        if len == 0 {
            return Err(MaterialError::InvalidLength);
        }
        let available = noise.len();
        if available <= 2 * len {
            return Err(MaterialError::NoiseTooShort {
                requested: len,
                available,
            });
        }
        let start = rng.random_range(len..available - len);
        Ok(noise[start..start + len].to_vec())
    }

    /// Random SSN segment as long as `x`.
    pub fn ssn_like<R: Rng + ?Sized>(&self, x: &[f64], rng: &mut R) -> Result<Vec<f64>, MaterialError> {
        self.ssn_segment(x.len(), rng)
    }

    /// Scale `x` so that it is presented at `level` dB, relative to `ref_level`.
    pub fn set_level(&self, x: &[f64], level: f64) -> Vec<f64> {
        let gain = db_to_amp_ratio(level - self.ref_level);
        x.iter().map(|v| v * gain).collect()
    }

    /// Synthesize `len` samples of SSN from the long-term average spectrum of
    /// `sentences` (mono), with random phase, at the sentences' mean RMS.
    pub fn create_ssn<R: Rng + ?Sized>(
        &self,
        sentences: &[Vec<f64>],
        len: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, MaterialError> {
        if len == 0 {
            return Err(MaterialError::InvalidLength);
        }
        let voiced: Vec<&Vec<f64>> = sentences.iter().filter(|s| !s.is_empty()).collect();
        if voiced.is_empty() {
            return Err(MaterialError::EmptyCorpus(self.sentences_dir()));
        }

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(len);
        let ifft = planner.plan_fft_inverse(len);

        // Long-term average power spectrum over len-sample frames.
        let mut ltass = vec![0.0; len];
        let mut frames = 0usize;
        let mut buf = vec![Complex64::new(0.0, 0.0); len];
        for s in &voiced {
            for frame in s.chunks(len) {
                buf.iter_mut().for_each(|c| *c = Complex64::new(0.0, 0.0));
                for (b, &v) in buf.iter_mut().zip(frame) {
                    b.re = v;
                }
                fft.process(&mut buf);
                for (acc, c) in ltass.iter_mut().zip(&buf) {
                    *acc += c.norm_sqr();
                }
                frames += 1;
            }
        }

        // Hermitian spectrum with random phase; DC and Nyquist stay real.
        let mut spectrum = vec![Complex64::new(0.0, 0.0); len];
        let half = len / 2;
        for i in 0..=half {
            let mag = (ltass[i] / frames as f64).sqrt();
            let real_bin = i == 0 || (len % 2 == 0 && i == half);
            spectrum[i] = if real_bin {
                Complex64::new(mag, 0.0)
            } else {
                let phase = rng.random_range(0.0..std::f64::consts::TAU);
                Complex64::from_polar(mag, phase)
            };
            if i > 0 && !real_bin {
                spectrum[len - i] = spectrum[i].conj();
            }
        }
        ifft.process(&mut spectrum);
        let mut noise: Vec<f64> = spectrum.iter().map(|c| c.re).collect();

        let target = voiced.iter().map(|s| rms(s)).sum::<f64>() / voiced.len() as f64;
        let current = rms(&noise);
        if current > 0.0 {
            let gain = target / current;
            noise.iter_mut().for_each(|v| *v *= gain);
        }
        info!(frames, len, rms = target, "created speech-shaped noise");
        Ok(noise)
    }
}
