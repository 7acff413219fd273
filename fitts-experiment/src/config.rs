use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session parameters. Defaults are the standard protocol; a JSON file
/// may override any subset of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub seed: u64,
    /// Amplitudes (A), centre-to-centre distance in pixels
    pub distances: Vec<u32>,
    /// Target widths (W) in pixels
    pub widths: Vec<u32>,
    pub repetitions: usize,
    pub practice_targets: usize,
    pub break_interval: usize,
    pub countdown_ms: u64,
    pub frame_rate: u32,
    pub output_dir: PathBuf,
    pub device_uri: String,
    pub font_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            distances: vec![200, 400, 600, 800],
            widths: vec![30, 50, 70],
            repetitions: 10,
            practice_targets: 3,
            break_interval: 20,
            countdown_ms: 3000,
            frame_rate: 60,
            output_dir: PathBuf::from("data"),
            device_uri: "any:?debugLevel=2".to_string(),
            font_path: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.distances.is_empty() || self.distances.contains(&0) {
            return invalid("distances must be a non-empty set of positive values");
        }
        if self.widths.is_empty() || self.widths.contains(&0) {
            return invalid("widths must be a non-empty set of positive values");
        }
        if self.repetitions == 0 {
            return invalid("repetitions must be at least 1");
        }
        if self.practice_targets == 0 {
            return invalid("practice_targets must be at least 1");
        }
        if self.break_interval == 0 {
            return invalid("break_interval must be at least 1");
        }
        if self.frame_rate == 0 {
            return invalid("frame_rate must be at least 1");
        }
        Ok(())
    }

    /// Every condition times every repetition.
    pub fn total_experiment_targets(&self) -> usize {
        self.distances.len() * self.widths.len() * self.repetitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_protocol_has_120_targets() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_experiment_targets(), 120);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "seed": 7, "widths": [20, 40] }}"#).unwrap();

        let config = SessionConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.widths, vec![20, 40]);
        assert_eq!(config.distances, vec![200, 400, 600, 800]);
        assert_eq!(config.break_interval, 20);
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ seed: ").unwrap();
        assert!(matches!(
            SessionConfig::from_json_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_degenerate_designs() {
        let mut config = SessionConfig::default();
        config.break_interval = 0;
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.widths.clear();
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.distances = vec![200, 0];
        assert!(config.validate().is_err());
    }
}
