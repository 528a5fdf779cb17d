use std::fs;
use std::path::PathBuf;

use intelligibility::config::{AppConfig, FilterbankConfig, IdealObsConfig, MaterialConfig};
use intelligibility::IdealObs;

fn unique_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "intelligibility_config_restore_{}_{}",
        name,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    path
}

fn custom() -> AppConfig {
    AppConfig {
        material: MaterialConfig {
            fs: 20_000,
            root_path: "/corpora/dantale".to_string(),
            path_to_sentences: "wav".to_string(),
            path_to_maskers: Some("maskers".to_string()),
            path_to_ssn: Some("ssn.wav".to_string()),
            ref_level: 65.0,
            name: "DANTALE".to_string(),
        },
        ideal_obs: IdealObsConfig {
            k: Some(1.2),
            q: Some(0.4),
            sigma_s: Some(0.5),
            m: 50.0,
        },
        filterbank: FilterbankConfig {
            third_octave_width: 1.0,
            center_f_min: 125.0,
            center_f_max: 4000.0,
            modf: vec![1.0, 4.0, 16.0],
        },
    }
}

#[test]
fn config_roundtrip_default_toml() {
    let default_cfg = AppConfig::default();
    let text = toml::to_string_pretty(&default_cfg).expect("serialize default");
    let parsed: AppConfig = toml::from_str(&text).expect("parse default");
    assert_eq!(parsed, default_cfg);
}

#[test]
fn config_load_custom_values() {
    let path = unique_path("custom.toml");
    let path_str = path.to_string_lossy().to_string();
    let text = toml::to_string_pretty(&custom()).expect("serialize custom");
    fs::write(&path, text).expect("write custom config");

    let loaded = AppConfig::load_or_default(&path_str);
    assert_eq!(loaded, custom());

    let obs = IdealObs::from_config(&loaded.ideal_obs).expect("valid observer section");
    assert_eq!(obs.get_params().m, 50.0);

    let _ = fs::remove_file(&path);
}

#[test]
fn config_missing_file_fallback() {
    let path = unique_path("missing.toml");
    let path_str = path.to_string_lossy().to_string();
    let _ = fs::remove_file(&path);

    let loaded = AppConfig::load_or_default(&path_str);
    assert!(path.exists(), "missing config should be created");
    assert_eq!(loaded, AppConfig::default());

    let _ = fs::remove_file(&path);
}

#[test]
fn config_partial_sections_keep_defaults() {
    let text = r#"
[ideal_obs]
k = 3.0
"#;
    let parsed: AppConfig = toml::from_str(text).expect("parse partial config");
    assert_eq!(parsed.ideal_obs.k, Some(3.0));
    assert_eq!(parsed.ideal_obs.m, 8000.0);
    assert_eq!(parsed.material, MaterialConfig::default());
}
