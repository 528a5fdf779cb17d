use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

/// Speech corpus layout and presentation reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    #[serde(default = "MaterialConfig::default_fs")]
    pub fs: u32,
    #[serde(default = "MaterialConfig::default_root_path")]
    pub root_path: String,
    #[serde(default = "MaterialConfig::default_path_to_sentences")]
    pub path_to_sentences: String,
    #[serde(default)]
    pub path_to_maskers: Option<String>,
    #[serde(default = "MaterialConfig::default_path_to_ssn")]
    pub path_to_ssn: Option<String>,
    #[serde(default = "MaterialConfig::default_ref_level")]
    pub ref_level: f64,
    #[serde(default = "MaterialConfig::default_name")]
    pub name: String,
}

impl MaterialConfig {
    fn default_fs() -> u32 {
        22_050
    }
    fn default_root_path() -> String {
        "../stimuli/clue".to_string()
    }
    fn default_path_to_sentences() -> String {
        "sentencesWAV22".to_string()
    }
    fn default_path_to_ssn() -> Option<String> {
        Some("SSN_CLUE22.wav".to_string())
    }
    fn default_ref_level() -> f64 {
        74.0
    }
    fn default_name() -> String {
        "CLUE".to_string()
    }
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            fs: Self::default_fs(),
            root_path: Self::default_root_path(),
            path_to_sentences: Self::default_path_to_sentences(),
            path_to_maskers: None,
            path_to_ssn: Self::default_path_to_ssn(),
            ref_level: Self::default_ref_level(),
            name: Self::default_name(),
        }
    }
}

/// Observer parameters used by `predict`. Unset values mean "not fitted yet".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdealObsConfig {
    #[serde(default)]
    pub k: Option<f64>,
    #[serde(default)]
    pub q: Option<f64>,
    #[serde(default)]
    pub sigma_s: Option<f64>,
    #[serde(default = "IdealObsConfig::default_m")]
    pub m: f64,
}

impl IdealObsConfig {
    fn default_m() -> f64 {
        crate::core::ideal_obs::DEFAULT_M
    }
}

impl Default for IdealObsConfig {
    fn default() -> Self {
        Self {
            k: None,
            q: None,
            sigma_s: None,
            m: Self::default_m(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterbankConfig {
    #[serde(default = "FilterbankConfig::default_third_octave_width")]
    pub third_octave_width: f64,
    #[serde(default = "FilterbankConfig::default_center_f_min")]
    pub center_f_min: f64,
    #[serde(default = "FilterbankConfig::default_center_f_max")]
    pub center_f_max: f64,
    #[serde(default = "FilterbankConfig::default_modf")]
    pub modf: Vec<f64>,
}

impl FilterbankConfig {
    fn default_third_octave_width() -> f64 {
        3.0
    }
    fn default_center_f_min() -> f64 {
        63.0
    }
    fn default_center_f_max() -> f64 {
        8000.0
    }
    fn default_modf() -> Vec<f64> {
        vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]
    }
}

impl Default for FilterbankConfig {
    fn default() -> Self {
        Self {
            third_octave_width: Self::default_third_octave_width(),
            center_f_min: Self::default_center_f_min(),
            center_f_max: Self::default_center_f_max(),
            modf: Self::default_modf(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub material: MaterialConfig,
    #[serde(default)]
    pub ideal_obs: IdealObsConfig,
    #[serde(default)]
    pub filterbank: FilterbankConfig,
}

impl AppConfig {
    fn format_f64_compact(x: f64) -> String {
        let mut s = format!("{:.6}", x);
        while s.contains('.') && s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
        if s.is_empty() { "0".to_string() } else { s }
    }

    /// Every value line commented out; table headers kept.
    fn commented(text: &str) -> String {
        let mut commented = String::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                commented.push('\n');
            } else if trimmed.starts_with('[') && trimmed.ends_with(']') && !trimmed.contains('=') {
                commented.push_str(line);
                commented.push('\n');
            } else {
                let mut out_line = line.to_string();
                if let Some((lhs, rhs)) = line.split_once('=') {
                    let rhs_trim = rhs.trim();
                    let has_decimal = rhs_trim.contains('.');
                    if (has_decimal || rhs_trim.contains('e') || rhs_trim.contains('E'))
                        && !rhs_trim.contains('"')
                    {
                        if let Ok(val) = rhs_trim.parse::<f64>() {
                            let mut formatted = Self::format_f64_compact(val);
                            if has_decimal && !formatted.contains('.') {
                                formatted.push_str(".0");
                            }
                            out_line = format!("{} = {}", lhs.trim(), formatted);
                        }
                    }
                }
                commented.push_str("# ");
                commented.push_str(&out_line);
                commented.push('\n');
            }
        }
        commented
    }

    /// Read `path`, or write a commented default file there if it is missing.
    /// Unreadable or invalid files fall back to defaults with a warning.
    pub fn load_or_default(path: &str) -> Self {
        let path_obj = Path::new(path);
        if path_obj.exists() {
            match fs::read_to_string(path_obj) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(cfg) => return cfg,
                    Err(err) => {
                        warn!("Failed to parse config {path}: {err}. Using defaults.");
                    }
                },
                Err(err) => {
                    warn!("Failed to read config {path}: {err}. Using defaults.");
                }
            }
            return Self::default();
        }

        let default_cfg = Self::default();
        match toml::to_string_pretty(&default_cfg) {
            Ok(text) => {
                if let Err(err) = fs::write(path_obj, Self::commented(&text)) {
                    warn!("Failed to write default config to {path}: {err}");
                }
            }
            Err(err) => warn!("Failed to serialize default config: {err}; continuing with defaults"),
        }
        default_cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn unique_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!(
            "intelligibility_config_test_{}_{}",
            name,
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        p
    }

    #[test]
    fn load_or_default_writes_defaults_cleanly() {
        let path = unique_path("defaults.toml");
        let path_str = path.to_string_lossy().to_string();
        let _ = fs::remove_file(&path);

        let cfg = AppConfig::load_or_default(&path_str);
        assert!(path.exists(), "config file should be created");
        assert_eq!(cfg.material.fs, 22_050);
        assert_eq!(cfg.material.name, "CLUE");
        assert_eq!(cfg.material.path_to_ssn.as_deref(), Some("SSN_CLUE22.wav"));
        assert_eq!(cfg.ideal_obs.m, 8000.0);
        assert!(cfg.ideal_obs.k.is_none());
        assert_eq!(cfg.filterbank.modf.len(), 7);

        let contents = fs::read_to_string(&path).expect("read written config");
        assert!(contents.contains("[material]"), "table headers stay active");
        assert!(contents.contains("# ref_level = 74.0"), "should write commented ref_level");
        assert!(contents.contains("# m = 8000.0"), "should write commented m");
        assert!(contents.contains("# name = \"CLUE\""), "should write commented name");

        // The commented file parses back to the defaults.
        let reread = AppConfig::load_or_default(&path_str);
        assert_eq!(reread, AppConfig::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn load_or_default_reads_existing() {
        let path = unique_path("custom.toml");
        let path_str = path.to_string_lossy().to_string();
        let text = r#"
[material]
fs = 16000
root_path = "/data/dantale"
ref_level = 65.0

[ideal_obs]
k = 1.5
q = 0.5
sigma_s = 0.6
m = 50.0
"#;
        fs::write(&path, text).unwrap();

        let cfg = AppConfig::load_or_default(&path_str);
        assert_eq!(cfg.material.fs, 16_000);
        assert_eq!(cfg.material.root_path, "/data/dantale");
        assert_eq!(cfg.material.ref_level, 65.0);
        assert_eq!(cfg.material.path_to_sentences, "sentencesWAV22");
        assert_eq!(cfg.ideal_obs.k, Some(1.5));
        assert_eq!(cfg.ideal_obs.m, 50.0);
        assert_eq!(cfg.filterbank, FilterbankConfig::default());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let path = unique_path("broken.toml");
        let path_str = path.to_string_lossy().to_string();
        fs::write(&path, "[ideal_obs\nk = ").unwrap();
        assert_eq!(AppConfig::load_or_default(&path_str), AppConfig::default());
        let _ = fs::remove_file(&path);
    }
}
