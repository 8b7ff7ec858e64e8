use std::collections::BTreeSet;
use std::sync::Arc;

use fumen_timing::{RationalTime, TimingMap};

use crate::scheduler::copy_samples_at_points;
use crate::sound_buffer::SoundBuffer;
use crate::stream::Chunk;
use crate::time::{samples_to_seconds, seconds_to_samples};

/// Output buffer, trigger set and clock shared by every effect stream.
pub struct EffectClock {
    sample: SoundBuffer,
    timing: Arc<TimingMap>,
    pitch: RationalTime,
    output: Vec<i16>,
    next_buffer_start: i64,
    triggers: BTreeSet<i64>,
}

impl EffectClock {
    pub fn new(sample: SoundBuffer, timing: Arc<TimingMap>, buffer_length: &RationalTime) -> Self {
        let frames = seconds_to_samples(buffer_length, sample.sample_rate(), 1).max(1);
        let len = usize::try_from(frames).unwrap_or(1) * usize::from(sample.channels());
        Self {
            sample,
            timing,
            pitch: RationalTime::one(),
            output: vec![0; len],
            next_buffer_start: 0,
            triggers: BTreeSet::new(),
        }
    }

    pub fn channels(&self) -> u16 {
        self.sample.channels()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample.sample_rate()
    }

    pub fn timing(&self) -> &TimingMap {
        &self.timing
    }

    pub fn pitch(&self) -> &RationalTime {
        &self.pitch
    }

    pub fn set_pitch(&mut self, pitch: RationalTime) {
        self.pitch = pitch;
        self.triggers.clear();
    }

    pub fn set_timing(&mut self, timing: Arc<TimingMap>) {
        self.timing = timing;
        self.triggers.clear();
    }

    /// First sample of the next buffer, on this stream's own clock.
    pub fn next_buffer_start(&self) -> i64 {
        self.next_buffer_start
    }

    pub fn seek(&mut self, seconds: &RationalTime) {
        self.next_buffer_start = seconds_to_samples(seconds, self.sample_rate(), self.channels());
        self.triggers.clear();
    }

    fn music_seconds_at(&self, sample: i64) -> RationalTime {
        samples_to_seconds(sample, self.sample_rate(), self.channels()) * &self.pitch
    }

    /// Sample at which something happening on `beat` starts to sound.
    pub fn sample_at_beat(&self, beat: &RationalTime) -> i64 {
        let seconds = self.timing.seconds_at(beat) / &self.pitch;
        seconds_to_samples(&seconds, self.sample_rate(), self.channels())
    }

    /// Beats covered by the next buffer, widened by one frame at the start
    /// so events rounding onto the first sample are not missed.
    pub fn upcoming_beats(&self) -> (RationalTime, RationalTime) {
        let channels = i64::from(self.channels());
        let start = self.next_buffer_start - channels;
        let end = self.next_buffer_start + self.output.len() as i64;
        (
            self.timing.beat_at(&self.music_seconds_at(start)),
            self.timing.beat_at(&self.music_seconds_at(end)),
        )
    }

    /// Render the next buffer. Beats whose sample falls outside it are
    /// ignored, so an event is only ever triggered once.
    pub fn render(&mut self, beats: &[RationalTime]) -> Chunk<'_> {
        let start = self.next_buffer_start;
        let end = start + self.output.len() as i64;
        for beat in beats {
            let sample = self.sample_at_beat(beat);
            if (start..end).contains(&sample) {
                self.triggers.insert(sample);
            }
        }
        copy_samples_at_points(&self.sample, &mut self.output, &mut self.triggers, start);
        self.next_buffer_start = end;
        Chunk::more(&self.output)
    }
}
