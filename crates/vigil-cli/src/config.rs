use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use vigil_core::matcher::DEFAULT_MATCH_TOLERANCE;
use vigil_core::{LivenessConfig, Strategy};

/// CLI configuration: defaults, then an optional TOML file, then `VIGIL_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Engine thresholds and window sizes (`[liveness]` table).
    pub liveness: LivenessConfig,
    /// Path to the SQLite enrollment database.
    pub db_path: PathBuf,
    /// Maximum embedding distance accepted as a match.
    pub match_tolerance: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            liveness: LivenessConfig::default(),
            db_path: default_db_path(),
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
        }
    }
}

impl Config {
    /// Load configuration from `path` (if given) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.liveness
            .validate()
            .context("invalid liveness configuration")?;
        check_tolerance(self.match_tolerance)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `VIGIL_*` variables. Unparseable values are
    /// ignored with a warning.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let liveness = &mut self.liveness;
        if let Some(v) = lookup("VIGIL_STRATEGY") {
            match v.as_str() {
                "landmarks" => liveness.strategy = Strategy::Landmarks,
                "depth_texture" | "depth-texture" => liveness.strategy = Strategy::DepthTexture,
                other => tracing::warn!(value = other, "ignoring unknown VIGIL_STRATEGY"),
            }
        }
        env_parse(&lookup, "VIGIL_HISTORY_LENGTH", &mut liveness.history_length);
        env_parse(&lookup, "VIGIL_EAR_STD_THRESHOLD", &mut liveness.ear_std_threshold);
        env_parse(
            &lookup,
            "VIGIL_HEAD_MOVE_STD_THRESHOLD",
            &mut liveness.head_move_std_threshold,
        );
        env_parse(
            &lookup,
            "VIGIL_STATIC_Z_STD_THRESHOLD",
            &mut liveness.static_z_std_threshold,
        );
        env_parse(
            &lookup,
            "VIGIL_FOURIER_PEAK_THRESHOLD",
            &mut liveness.fourier_peak_threshold,
        );
        env_parse(&lookup, "VIGIL_MATCH_TOLERANCE", &mut self.match_tolerance);
        if let Some(v) = lookup("VIGIL_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}

/// A match tolerance must be a finite, non-negative distance.
pub fn check_tolerance(tolerance: f32) -> Result<()> {
    if !tolerance.is_finite() || tolerance < 0.0 {
        bail!("match tolerance must be finite and >= 0, got {tolerance}");
    }
    Ok(())
}

/// `$XDG_DATA_HOME/vigil/faces.db`, falling back to `~/.local/share`.
fn default_db_path() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("vigil")
        .join("faces.db")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("VIGIL_STRATEGY", "depth_texture"),
            ("VIGIL_HISTORY_LENGTH", "12"),
            ("VIGIL_EAR_STD_THRESHOLD", "0.02"),
            ("VIGIL_MATCH_TOLERANCE", "0.45"),
            ("VIGIL_DB_PATH", "/var/lib/vigil/test.db"),
        ]));
        assert_eq!(config.liveness.strategy, Strategy::DepthTexture);
        assert_eq!(config.liveness.history_length, 12);
        assert_eq!(config.liveness.ear_std_threshold, 0.02);
        assert_eq!(config.match_tolerance, 0.45);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/vigil/test.db"));
    }

    #[test]
    fn test_bad_env_value_keeps_default() {
        let mut config = Config::default();
        config.apply_env(lookup(&[
            ("VIGIL_HISTORY_LENGTH", "many"),
            ("VIGIL_STRATEGY", "vibes"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_toml_file() {
        let dir = std::env::temp_dir().join(format!(
            "vigil-config-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vigil.toml");
        std::fs::write(
            &path,
            "match_tolerance = 0.5\n\n[liveness]\n\
             history_length = 8\nfourier_peak_threshold = 240.0\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.match_tolerance, 0.5);
        assert_eq!(config.liveness.history_length, 8);
        assert_eq!(config.liveness.fourier_peak_threshold, 240.0);
        assert_eq!(config.liveness.crop_padding, 10);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bad_match_tolerance_rejected() {
        for tolerance in [-0.1, f32::NAN, f32::INFINITY] {
            let config = Config {
                match_tolerance: tolerance,
                ..Config::default()
            };
            assert!(config.validate().is_err(), "tolerance {tolerance}");
        }
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_file_values_rejected_on_load() {
        let dir = std::env::temp_dir().join(format!(
            "vigil-config-test-invalid-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vigil.toml");
        std::fs::write(&path, "[liveness]\nhistory_length = 0\n").unwrap();

        assert!(Config::load(Some(&path)).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
