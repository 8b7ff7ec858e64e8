use std::sync::Arc;

use fumen_notes::NoteStore;
use fumen_timing::{RationalTime, TimingMap};

use super::{EffectClock, note_starts_between};
use crate::error::AudioError;
use crate::sound_buffer::SoundBuffer;
use crate::stream::{Chunk, StreamSource};

/// A clap on every note.
pub struct NoteClaps {
    clock: EffectClock,
    notes: Arc<NoteStore>,
    play_chords: bool,
    play_long_note_ends: bool,
}

impl NoteClaps {
    pub fn new(
        clap: SoundBuffer,
        timing: Arc<TimingMap>,
        notes: Arc<NoteStore>,
        buffer_length: &RationalTime,
    ) -> Self {
        Self {
            clock: EffectClock::new(clap, timing, buffer_length),
            notes,
            play_chords: true,
            play_long_note_ends: false,
        }
    }

    /// When off, instants with several notes are left to [`super::ChordClaps`].
    pub fn play_chords(mut self, enabled: bool) -> Self {
        self.play_chords = enabled;
        self
    }

    /// Also clap when a long note is released.
    pub fn play_long_note_ends(mut self, enabled: bool) -> Self {
        self.play_long_note_ends = enabled;
        self
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

impl StreamSource for NoteClaps {
    fn channel_count(&self) -> u16 {
        self.clock.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn get_data(&mut self) -> Result<Chunk<'_>, AudioError> {
        let (low, high) = self.clock.upcoming_beats();
        let mut beats: Vec<RationalTime> = note_starts_between(&self.notes, &low, &high)
            .into_iter()
            .filter(|(_, count)| self.play_chords || *count == 1)
            .map(|(beat, _)| beat)
            .collect();
        if self.play_long_note_ends {
            self.notes.for_each_in(&low, &high, |note| {
                let end = note.end();
                if note.is_long() && end >= low && end <= high {
                    beats.push(end);
                }
            });
        }
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
