use std::sync::Arc;

use fumen_timing::{RationalTime, TimingMap};

use super::EffectClock;
use crate::error::AudioError;
use crate::sound_buffer::SoundBuffer;
use crate::stream::{Chunk, StreamSource};

/// A tick on every whole beat.
pub struct BeatTicks {
    clock: EffectClock,
}

impl BeatTicks {
    pub fn new(tick: SoundBuffer, timing: Arc<TimingMap>, buffer_length: &RationalTime) -> Self {
        Self {
            clock: EffectClock::new(tick, timing, buffer_length),
        }
    }

    pub fn with_timing(mut self, timing: Arc<TimingMap>) -> Self {
        self.clock.set_timing(timing);
        self
    }

    pub fn with_pitch(mut self, pitch: RationalTime) -> Self {
        self.clock.set_pitch(pitch);
        self
    }
}

impl StreamSource for BeatTicks {
    fn channel_count(&self) -> u16 {
        self.clock.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn get_data(&mut self) -> Result<Chunk<'_>, AudioError> {
        let (low, high) = self.clock.upcoming_beats();
        let beats: Vec<RationalTime> = match (low.ceil().floor_to_i64(), high.floor_to_i64()) {
            (Some(first), Some(last)) => (first..=last).map(RationalTime::from).collect(),
            _ => Vec::new(),
        };
        Ok(self.clock.render(&beats))
    }

    fn seek(&mut self, seconds: &RationalTime) -> Result<(), AudioError> {
        self.clock.seek(seconds);
        Ok(())
    }

    fn on_pitch_change(&mut self, pitch: &RationalTime) {
        self.clock.set_pitch(pitch.clone());
    }
}
