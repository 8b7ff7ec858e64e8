//! Buffer-queue audio output.
//!
//! A source plays the buffers queued on it in order. Played buffers become
//! "processed" and stay on the queue until unqueued, so the caller can
//! refill and requeue them. A playing source that runs out of buffers stops.

mod device;
mod mixer;

pub use device::OutputDevice;
pub use mixer::MixerBackend;

use std::time::Duration;

use crate::error::AudioError;

/// Handle for a source created by a backend.
pub type SourceId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// A block of interleaved samples queued on a source. `tag` is chosen by
/// the caller and comes back unchanged when the buffer is unqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBuffer {
    pub tag: usize,
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(tag: usize) -> Self {
        Self {
            tag,
            samples: Vec::new(),
            channels: 1,
            sample_rate: 44100,
        }
    }
}

/// Abstraction over buffer-queue audio backends.
/// Implementations: MixerBackend (software mixer, cpal or manual output).
pub trait AudioBackend: Send + Sync {
    fn create_source(&self) -> Result<SourceId, AudioError>;
    fn delete_source(&self, source: SourceId) -> Result<(), AudioError>;

    fn queue_buffer(&self, source: SourceId, buffer: AudioBuffer) -> Result<(), AudioError>;
    /// Remove and return the buffers that finished playing.
    fn unqueue_processed(&self, source: SourceId) -> Result<Vec<AudioBuffer>, AudioError>;
    fn processed_count(&self, source: SourceId) -> Result<usize, AudioError>;

    /// Start or resume every source at once.
    fn play_all(&self, sources: &[SourceId]) -> Result<(), AudioError>;
    fn pause_all(&self, sources: &[SourceId]) -> Result<(), AudioError>;
    /// Stop every source; all their queued buffers become processed.
    fn stop_all(&self, sources: &[SourceId]) -> Result<(), AudioError>;

    fn state(&self, source: SourceId) -> Result<SourceState, AudioError>;

    /// Playback speed factor, also shifting the pitch.
    fn set_pitch(&self, source: SourceId, pitch: f32) -> Result<(), AudioError>;

    /// Set volume (0.0..=1.0).
    fn set_gain(&self, source: SourceId, gain: f32) -> Result<(), AudioError>;

    /// Interleaved samples already played from the buffers still queued.
    fn offset_samples(&self, source: SourceId) -> Result<i64, AudioError>;

    /// Delay between handing samples to the device and hearing them.
    fn latency(&self) -> Duration;
}
