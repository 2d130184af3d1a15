use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core_modules::diff_algorithm::AlgorithmKind;
use crate::error::ConfigurationError;

/// Engine configuration. Built once and never mutated by the engine.
///
/// In TOML every key is optional; durations are given in seconds and may be
/// fractional:
///
/// ```toml
/// cell_divisor = 32
/// algorithm = "summed_rgb_cells"
/// test_frame_interval = 2.5
/// mask_path = "masks/driveway.bmp"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MotionConfig {
    /// Cells per row and per column; the grid has `cell_divisor²` cells.
    #[serde(default = "default_cell_divisor")]
    pub cell_divisor: u32,
    /// Per-pixel gate for the RGB-family deltas. In pixel-count mode the
    /// changed-pixel total must also exceed it.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Fixed changed-pixel count that marks a cell as changed. When absent the
    /// value is derived from `cell_pixel_percentage`.
    #[serde(default)]
    pub cell_pixel_threshold: Option<u32>,
    #[serde(default = "default_cell_pixel_percentage")]
    pub cell_pixel_percentage: u32,
    /// Motion is declared when more cells than this changed.
    #[serde(default = "default_cell_count_threshold")]
    pub cell_count_threshold: u32,
    /// Baseline age that triggers a refresh. Zero disables refreshing.
    #[serde(default = "default_test_frame_interval", deserialize_with = "de_seconds")]
    pub test_frame_interval: Duration,
    /// Quiet period after the last detection before a refresh is allowed.
    #[serde(default = "default_test_frame_cooldown", deserialize_with = "de_seconds")]
    pub test_frame_cooldown: Duration,
    #[serde(default)]
    pub mask_path: Option<PathBuf>,
    #[serde(default)]
    pub algorithm: AlgorithmKind,
    /// Hue distance, as a fraction of a full turn, above which an HSV pixel changed.
    #[serde(default = "default_hue_variance")]
    pub hue_variance: f32,
    /// Stop scanning once the changed-pixel total passes `threshold`.
    /// Only honoured in pixel-count mode.
    #[serde(default)]
    pub early_exit: bool,
    /// Proximity only: score the largest connected group of changed cells
    /// instead of the plain changed-cell count.
    #[serde(default)]
    pub proximity_clustering: bool,
    #[serde(default)]
    pub visualize: bool,
    /// Worker threads for the diff pool. Defaults to one per logical CPU.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            cell_divisor: default_cell_divisor(),
            threshold: default_threshold(),
            cell_pixel_threshold: None,
            cell_pixel_percentage: default_cell_pixel_percentage(),
            cell_count_threshold: default_cell_count_threshold(),
            test_frame_interval: default_test_frame_interval(),
            test_frame_cooldown: default_test_frame_cooldown(),
            mask_path: None,
            algorithm: AlgorithmKind::default(),
            hue_variance: default_hue_variance(),
            early_exit: false,
            proximity_clustering: false,
            visualize: false,
            workers: None,
        }
    }
}

impl MotionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigurationError> {
        let config: MotionConfig =
            toml::from_str(content).map_err(|e| ConfigurationError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.cell_divisor == 0 {
            return Err(ConfigurationError::ZeroDivisor);
        }
        if self.cell_pixel_percentage > 100 {
            return Err(ConfigurationError::Invalid(format!(
                "cell_pixel_percentage must be within 0..=100, got {}",
                self.cell_pixel_percentage
            )));
        }
        if !(self.hue_variance > 0.0 && self.hue_variance <= 0.5) {
            return Err(ConfigurationError::Invalid(format!(
                "hue_variance must be within (0, 0.5], got {}",
                self.hue_variance
            )));
        }
        if self.workers == Some(0) {
            return Err(ConfigurationError::Invalid(
                "workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Changed-pixel count at which a cell counts as changed, never below one.
    pub fn resolve_cell_pixel_threshold(&self, pixels_per_cell: u64) -> u32 {
        let derived = || (pixels_per_cell * self.cell_pixel_percentage as u64 / 100) as u32;
        self.cell_pixel_threshold.unwrap_or_else(derived).max(1)
    }
}

fn de_seconds<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(seconds).map_err(serde::de::Error::custom)
}

// Default value functions
fn default_cell_divisor() -> u32 {
    32
}
fn default_threshold() -> u32 {
    130
}
fn default_cell_pixel_percentage() -> u32 {
    50
}
fn default_cell_count_threshold() -> u32 {
    20
}
fn default_test_frame_interval() -> Duration {
    Duration::from_secs(3)
}
fn default_test_frame_cooldown() -> Duration {
    Duration::from_secs(3)
}
fn default_hue_variance() -> f32 {
    30.0 / 360.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = MotionConfig::default();
        assert_eq!(config.cell_divisor, 32);
        assert_eq!(config.threshold, 130);
        assert_eq!(config.cell_count_threshold, 20);
        assert_eq!(config.cell_pixel_percentage, 50);
        assert_eq!(config.test_frame_interval, Duration::from_secs(3));
        assert_eq!(config.test_frame_cooldown, Duration::from_secs(3));
        assert_eq!(config.algorithm, AlgorithmKind::SummedRgb);
        assert!(config.mask_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        assert_eq!(MotionConfig::from_toml_str("").unwrap(), MotionConfig::default());
    }

    #[test]
    fn parses_fractional_seconds_and_algorithm_names() {
        let config = MotionConfig::from_toml_str(
            r#"
            cell_divisor = 16
            algorithm = "normalized_rgb_cells"
            test_frame_interval = 2.5
            test_frame_cooldown = 0
            mask_path = "mask.bmp"
            workers = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.cell_divisor, 16);
        assert_eq!(config.algorithm, AlgorithmKind::NormalizedRgbCells);
        assert_eq!(config.test_frame_interval, Duration::from_millis(2500));
        assert_eq!(config.test_frame_cooldown, Duration::ZERO);
        assert_eq!(config.mask_path.as_deref(), Some(Path::new("mask.bmp")));
        assert_eq!(config.workers, Some(3));
    }

    #[test]
    fn negative_duration_is_a_parse_error() {
        assert!(matches!(
            MotionConfig::from_toml_str("test_frame_interval = -1.0"),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn unknown_algorithm_is_a_parse_error() {
        assert!(matches!(
            MotionConfig::from_toml_str("algorithm = \"optical_flow\""),
            Err(ConfigurationError::Parse(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero = MotionConfig { cell_divisor: 0, ..Default::default() };
        assert!(matches!(zero.validate(), Err(ConfigurationError::ZeroDivisor)));

        let percentage = MotionConfig { cell_pixel_percentage: 101, ..Default::default() };
        assert!(matches!(percentage.validate(), Err(ConfigurationError::Invalid(_))));

        let hue = MotionConfig { hue_variance: 0.0, ..Default::default() };
        assert!(matches!(hue.validate(), Err(ConfigurationError::Invalid(_))));

        let workers = MotionConfig { workers: Some(0), ..Default::default() };
        assert!(matches!(workers.validate(), Err(ConfigurationError::Invalid(_))));
    }

    #[test]
    fn cell_pixel_threshold_is_fixed_or_derived() {
        let derived = MotionConfig::default();
        assert_eq!(derived.resolve_cell_pixel_threshold(300), 150);

        let fixed = MotionConfig { cell_pixel_threshold: Some(42), ..Default::default() };
        assert_eq!(fixed.resolve_cell_pixel_threshold(300), 42);

        let tiny = MotionConfig { cell_pixel_percentage: 0, ..Default::default() };
        assert_eq!(tiny.resolve_cell_pixel_threshold(300), 1);
    }

    #[test]
    fn load_reads_a_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "threshold = 90\nvisualize = true").unwrap();

        let config = MotionConfig::load(file.path()).unwrap();
        assert_eq!(config.threshold, 90);
        assert!(config.visualize);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MotionConfig::load(&dir.path().join("absent.toml")),
            Err(ConfigurationError::ReadFile(..))
        ));
    }
}
