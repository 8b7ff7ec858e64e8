use anyhow::{Context, Result};
use fumen_audio::AudioConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    /// Directory holding clap.wav, chord_clap.wav and beat_tick.wav.
    pub assets_dir: PathBuf,
    pub pitch: f64,
    pub note_claps: bool,
    pub chord_claps: bool,
    pub long_note_ends: bool,
    pub beat_ticks: bool,
    /// Same-button collision window, in milliseconds.
    pub collision_zone_ms: u64,
    pub audio: AudioConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            pitch: 1.0,
            note_claps: true,
            chord_claps: false,
            long_note_ends: false,
            beat_ticks: false,
            collision_zone_ms: 1000,
            audio: AudioConfig::default(),
        }
    }
}

impl PlayerConfig {
    /// Loads config from a specified path.
    /// Returns default config if file doesn't exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid player config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.pitch, 1.0);
        assert!(config.note_claps);
        assert!(!config.beat_ticks);
        assert_eq!(config.collision_zone_ms, 1000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("player.json");

        let mut config = PlayerConfig::default();
        config.beat_ticks = true;
        config.pitch = 1.5;
        config.audio.buffer_retries = 4;
        config.save_to(&path).unwrap();

        let loaded = PlayerConfig::load_from(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let dir = tempdir().unwrap();
        let config = PlayerConfig::load_from(dir.path().join("nope.json")).unwrap();
        assert_eq!(config, PlayerConfig::default());
    }
}
