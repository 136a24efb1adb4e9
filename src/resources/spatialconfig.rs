//! Spatial configuration resource.
//!
//! Settings loaded from an INI file, with safe defaults when the file or a key
//! is missing.
//!
//! # Configuration File Format
//!
//! ```ini
//! [transform]
//! strict_invariants = false
//!
//! [grid]
//! default_tile_size = 1
//!
//! [net]
//! publish_lerp = true
//!
//! [demo]
//! ticks = 120
//! entities = 16
//! seed = 7
//! ```

use bevy_ecs::prelude::*;
use configparser::ini::Ini;
use log::info;
use std::path::PathBuf;

const DEFAULT_STRICT_INVARIANTS: bool = cfg!(debug_assertions);
const DEFAULT_TILE_SIZE: u16 = 1;
const DEFAULT_PUBLISH_LERP: bool = true;
const DEFAULT_DEMO_TICKS: u32 = 120;
const DEFAULT_DEMO_ENTITIES: u32 = 16;
const DEFAULT_DEMO_SEED: u64 = 7;
const DEFAULT_CONFIG_PATH: &str = "./spatial.ini";

/// Spatial configuration resource.
///
/// `strict_invariants` selects the invariant-violation policy: panic when set,
/// otherwise log and queue the offending entity for deletion. It defaults to
/// on in debug builds.
#[derive(Resource, Debug, Clone)]
pub struct SpatialConfig {
    /// Panic on invariant violations instead of recovering.
    pub strict_invariants: bool,
    /// Tile size used by grids spawned without an explicit size.
    pub default_tile_size: u16,
    /// Send lerp frames to the render bridge each tick.
    pub publish_lerp: bool,
    /// Demo: number of ticks to simulate.
    pub demo_ticks: u32,
    /// Demo: number of wandering entities.
    pub demo_entities: u32,
    /// Demo: random walk seed.
    pub demo_seed: u64,
    /// Path to the configuration file.
    pub config_path: PathBuf,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialConfig {
    /// Create a new configuration with safe default values.
    pub fn new() -> Self {
        Self {
            strict_invariants: DEFAULT_STRICT_INVARIANTS,
            default_tile_size: DEFAULT_TILE_SIZE,
            publish_lerp: DEFAULT_PUBLISH_LERP,
            demo_ticks: DEFAULT_DEMO_TICKS,
            demo_entities: DEFAULT_DEMO_ENTITIES,
            demo_seed: DEFAULT_DEMO_SEED,
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
        }
    }

    /// Create a new configuration with a custom config file path.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
            ..Self::new()
        }
    }

    /// Same defaults with an explicit violation policy.
    pub fn tolerant() -> Self {
        Self {
            strict_invariants: false,
            ..Self::new()
        }
    }

    /// Load configuration from the INI file.
    ///
    /// Missing values retain their current (default) values.
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(&mut self) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .load(&self.config_path)
            .map_err(|e| format!("Failed to load config file: {}", e))?;
        self.apply(&config);
        Ok(())
    }

    /// Load configuration from INI text.
    pub fn load_from_str(&mut self, text: &str) -> Result<(), String> {
        let mut config = Ini::new();
        config
            .read(text.to_string())
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        self.apply(&config);
        Ok(())
    }

    fn apply(&mut self, config: &Ini) {
        // [transform] section
        if let Some(strict) = config.getbool("transform", "strict_invariants").ok().flatten() {
            self.strict_invariants = strict;
        }

        // [grid] section
        if let Some(size) = config.getuint("grid", "default_tile_size").ok().flatten() {
            self.default_tile_size = size.clamp(1, u64::from(u16::MAX)) as u16;
        }

        // [net] section
        if let Some(publish) = config.getbool("net", "publish_lerp").ok().flatten() {
            self.publish_lerp = publish;
        }

        // [demo] section
        if let Some(ticks) = config.getuint("demo", "ticks").ok().flatten() {
            self.demo_ticks = ticks as u32;
        }
        if let Some(entities) = config.getuint("demo", "entities").ok().flatten() {
            self.demo_entities = entities as u32;
        }
        if let Some(seed) = config.getuint("demo", "seed").ok().flatten() {
            self.demo_seed = seed;
        }

        info!(
            "Loaded spatial config: strict={}, tile_size={}, publish_lerp={}, demo {} ticks x {} entities (seed {})",
            self.strict_invariants,
            self.default_tile_size,
            self.publish_lerp,
            self.demo_ticks,
            self.demo_entities,
            self.demo_seed
        );
    }

    /// Save configuration to the INI file.
    ///
    /// Creates the file if it doesn't exist.
    pub fn save_to_file(&self) -> Result<(), String> {
        let mut config = Ini::new();

        config.set("transform", "strict_invariants", Some(self.strict_invariants.to_string()));
        config.set("grid", "default_tile_size", Some(self.default_tile_size.to_string()));
        config.set("net", "publish_lerp", Some(self.publish_lerp.to_string()));
        config.set("demo", "ticks", Some(self.demo_ticks.to_string()));
        config.set("demo", "entities", Some(self.demo_entities.to_string()));
        config.set("demo", "seed", Some(self.demo_seed.to_string()));

        config
            .write(&self.config_path)
            .map_err(|e| format!("Failed to save config file: {}", e))?;

        info!("Saved spatial config to {:?}", self.config_path);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let mut config = SpatialConfig::new();
        config
            .load_from_str("[grid]\ndefault_tile_size = 2\n")
            .unwrap();
        assert_eq!(config.default_tile_size, 2);
        assert_eq!(config.demo_ticks, DEFAULT_DEMO_TICKS);
        assert_eq!(config.strict_invariants, DEFAULT_STRICT_INVARIANTS);
    }

    #[test]
    fn reads_every_section() {
        let mut config = SpatialConfig::new();
        config
            .load_from_str(
                "[transform]\nstrict_invariants = false\n[net]\npublish_lerp = false\n[demo]\nticks = 5\nentities = 3\nseed = 42\n",
            )
            .unwrap();
        assert!(!config.strict_invariants);
        assert!(!config.publish_lerp);
        assert_eq!(config.demo_ticks, 5);
        assert_eq!(config.demo_entities, 3);
        assert_eq!(config.demo_seed, 42);
    }

    #[test]
    fn zero_tile_size_is_clamped() {
        let mut config = SpatialConfig::new();
        config.load_from_str("[grid]\ndefault_tile_size = 0\n").unwrap();
        assert_eq!(config.default_tile_size, 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        let mut config = SpatialConfig::with_path("/nonexistent/spatial.ini");
        assert!(config.load_from_file().is_err());
        assert_eq!(config.demo_seed, DEFAULT_DEMO_SEED);
    }
}
