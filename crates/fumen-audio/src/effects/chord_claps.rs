use std::sync::Arc;

use fumen_notes::NoteStore;
use fumen_timing::{RationalTime, TimingMap};

use super::{EffectClock, note_starts_between};
use crate::error::AudioError;
use crate::sound_buffer::SoundBuffer;
use crate::stream::{Chunk, StreamSource};

/// A clap on every instant where two or more notes start together.
pub struct ChordClaps {
    clock: EffectClock,
    notes: Arc<NoteStore>,
}

impl ChordClaps {
    pub fn new(
        clap: SoundBuffer,
        timing: Arc<TimingMap>,
        notes: Arc<NoteStore>,
        buffer_length: &RationalTime,
    ) -> Self {
        Self {
            clock: EffectClock::new(clap, timing, buffer_length),
            notes,
        }
    }

    pub fn with_chart(mut self, timing: Arc<TimingMap>, notes: Arc<NoteStore>) -> Self {
        self.clock.set_timing(timing);
        self.notes = notes;
        self
    }

    pub fn with_pitch(mut self, pitch: RationalTime) -> Self {
        self.clock.set_pitch(pitch);
        self
    }
}

impl StreamSource for ChordClaps {
    fn channel_count(&self) -> u16 {
        self.clock.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn get_data(&mut self) -> Result<Chunk<'_>, AudioError> {
        let (low, high) = self.clock.upcoming_beats();
        let chords: Vec<RationalTime> = note_starts_between(&self.notes, &low, &high)
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(beat, _)| beat)
            .collect();
        Ok(self.clock.render(&chords))
    }

    fn seek(&mut self, seconds: &RationalTime) -> Result<(), AudioError> {
        self.clock.seek(seconds);
        Ok(())
    }

    fn on_pitch_change(&mut self, pitch: &RationalTime) {
        self.clock.set_pitch(pitch.clone());
    }
}
