use fumen_timing::RationalTime;

use crate::error::AudioError;

/// One block of audio handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Interleaved samples, whole frames only.
    pub samples: &'a [i16],
    /// False once the stream has nothing after these samples.
    pub more: bool,
}

impl<'a> Chunk<'a> {
    pub fn more(samples: &'a [i16]) -> Self {
        Self { samples, more: true }
    }

    pub fn last(samples: &'a [i16]) -> Self {
        Self { samples, more: false }
    }

    pub fn end() -> Self {
        Self::last(&[])
    }
}

/// A logical audio stream driven by the synced engine.
///
/// Times given to a stream are on its own clock: for streams that keep their
/// natural pitch the engine already divided music time by the pitch.
pub trait StreamSource: Send {
    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;

    /// Produce the next block of samples.
    fn get_data(&mut self) -> Result<Chunk<'_>, AudioError>;

    /// Continue from `seconds` on the next [`StreamSource::get_data`].
    fn seek(&mut self, seconds: &RationalTime) -> Result<(), AudioError>;

    /// Time at which the stream runs out, on its own clock. While looping,
    /// every stream wraps back to zero at the longest known length.
    fn length(&self) -> Option<RationalTime> {
        None
    }

    /// Called when the stream ended while looping is on and no stream knows
    /// its length. Returns the sample offset playback restarts from, or
    /// `None` if the stream cannot loop.
    fn on_loop(&mut self) -> Result<Option<i64>, AudioError> {
        Ok(None)
    }

    /// The engine's pitch factor changed.
    fn on_pitch_change(&mut self, _pitch: &RationalTime) {}
}
