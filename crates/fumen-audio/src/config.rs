use std::fs;
use std::path::Path;
use std::time::Duration;

use fumen_timing::RationalTime;
use serde::{Deserialize, Serialize};

use crate::error::AudioError;

/// The streaming worker needs at least this many buffers per source.
pub const MIN_BUFFERS_PER_SOURCE: usize = 3;

/// Audio streaming configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sleep between two polls of the streaming worker, in milliseconds.
    pub processing_interval_ms: u64,
    /// Buffers in each source's ring (at least 3).
    pub buffers_per_source: usize,
    /// Attempts at getting data from a stream before giving up on it.
    pub buffer_retries: u32,
    /// Length of one music buffer in milliseconds.
    pub music_buffer_ms: u64,
    /// Length of one effect (clap, tick) buffer in milliseconds.
    pub effect_buffer_ms: u64,
    /// Master volume (0.0 - 1.0).
    pub master_volume: f32,
    /// Subtract the measured output latency from the precise position.
    pub latency_compensation: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            processing_interval_ms: 10,
            buffers_per_source: MIN_BUFFERS_PER_SOURCE,
            buffer_retries: 2,
            music_buffer_ms: 1000,
            effect_buffer_ms: 1000,
            master_volume: 1.0,
            latency_compensation: true,
        }
    }
}

impl AudioConfig {
    /// Loads config from `path`, or defaults when the file does not exist.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|source| AudioError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), AudioError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| AudioError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn processing_interval(&self) -> Duration {
        Duration::from_millis(self.processing_interval_ms)
    }

    pub fn buffers_per_source(&self) -> usize {
        self.buffers_per_source.max(MIN_BUFFERS_PER_SOURCE)
    }

    pub fn music_buffer_length(&self) -> RationalTime {
        RationalTime::new(self.music_buffer_ms.max(1), 1000)
    }

    pub fn effect_buffer_length(&self) -> RationalTime {
        RationalTime::new(self.effect_buffer_ms.max(1), 1000)
    }
}
