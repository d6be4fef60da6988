use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// TOML-backed map tuning loaded from disk.
/// Every section is optional; missing keys fall back to the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FileConfig {
    pub motion: MotionConfig,
    pub fetch: FetchConfig,
    pub clustering: ClusteringConfig,
    pub popups: PopupConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MotionConfig {
    /// Minimum movement before a refetch is considered.
    pub threshold_meters: f64,
    /// Quiet period after the last qualifying movement.
    pub debounce_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold_meters: 100.0,
            debounce_ms: 500,
        }
    }
}

impl MotionConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct FetchConfig {
    pub radius_meters: f64,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            radius_meters: 1_000.0,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ClusteringConfig {
    /// Screen-space radius; markers closer than this collapse into a cluster.
    pub radius_px: f64,
    /// Web Mercator tile edge in pixels.
    pub tile_size: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            radius_px: 80.0,
            tile_size: 256.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PopupConfig {
    /// Entries shown in a cluster's aggregate popup.
    pub aggregate_limit: usize,
    /// First z-index handed out to an opened popup.
    pub z_index_base: u64,
}

impl Default for PopupConfig {
    fn default() -> Self {
        Self {
            aggregate_limit: 5,
            z_index_base: 1_000,
        }
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert_eq!(config.motion.threshold_meters, 100.0);
        assert_eq!(config.motion.debounce(), Duration::from_millis(500));
        assert_eq!(config.clustering.radius_px, 80.0);
        assert_eq!(config.popups.aggregate_limit, 5);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: FileConfig = toml::from_str(
            r#"
            [motion]
            threshold_meters = 50.0

            [popups]
            z_index_base = 400
            "#,
        )
        .unwrap();
        assert_eq!(config.motion.threshold_meters, 50.0);
        assert_eq!(config.motion.debounce_ms, 500);
        assert_eq!(config.popups.z_index_base, 400);
        assert_eq!(config.popups.aggregate_limit, 5);
        assert_eq!(config.fetch.radius_meters, 1_000.0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: std::result::Result<FileConfig, _> = toml::from_str(
            r#"
            [motion]
            treshold_meters = 50.0
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn load_config_reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[clustering]\nradius_px = 60.0").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.clustering.radius_px, 60.0);
    }

    #[test]
    fn bundled_sample_matches_defaults() {
        let config: FileConfig = toml::from_str(include_str!("../../../config/nearcast.toml")).unwrap();
        let defaults = FileConfig::default();
        assert_eq!(config.motion.threshold_meters, defaults.motion.threshold_meters);
        assert_eq!(config.fetch.timeout_secs, defaults.fetch.timeout_secs);
        assert_eq!(config.clustering.tile_size, defaults.clustering.tile_size);
        assert_eq!(config.popups.z_index_base, defaults.popups.z_index_base);
    }

    #[test]
    fn load_config_missing_file_has_context() {
        let err = load_config(Path::new("/nonexistent/nearcast.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
