use std::path::Path;

use fumen_timing::RationalTime;
use log::debug;

use crate::decoder::{SampleDecoder, SymphoniaDecoder};
use crate::error::AudioError;
use crate::stream::{Chunk, StreamSource};
use crate::time::{samples_to_seconds, seconds_to_samples};

/// The song, decoded while it plays.
///
/// Seeking before zero plays silence until the song starts. With trailing
/// silence set, the stream keeps producing zeros for that long after the
/// song ends.
pub struct MusicStream {
    decoder: Box<dyn SampleDecoder>,
    buffer: Vec<i16>,
    buffer_frames: usize,
    /// Next frame to deliver; negative inside the lead-in.
    frame: i64,
    trailing_silence: i64,
    silence_left: i64,
}

impl MusicStream {
    pub fn open(path: &Path, buffer_length: &RationalTime) -> Result<Self, AudioError> {
        let decoder = SymphoniaDecoder::open(path)?;
        debug!(
            "Opened music {}: {} ch, {} Hz",
            path.display(),
            decoder.channel_count(),
            decoder.sample_rate()
        );
        Ok(Self::from_decoder(Box::new(decoder), buffer_length))
    }

    pub fn from_decoder(decoder: Box<dyn SampleDecoder>, buffer_length: &RationalTime) -> Self {
        let frames = seconds_to_samples(buffer_length, decoder.sample_rate(), 1).max(1);
        Self {
            decoder,
            buffer: Vec::new(),
            buffer_frames: usize::try_from(frames).unwrap_or(1),
            frame: 0,
            trailing_silence: 0,
            silence_left: 0,
        }
    }

    pub fn with_trailing_silence(mut self, length: &RationalTime) -> Self {
        self.trailing_silence = seconds_to_samples(length, self.decoder.sample_rate(), 1).max(0);
        self.silence_left = self.trailing_silence;
        self
    }

    /// Length of the song itself, when known.
    pub fn duration(&self) -> Option<RationalTime> {
        let frames = i64::try_from(self.decoder.frame_count()?).ok()?;
        Some(samples_to_seconds(frames, self.decoder.sample_rate(), 1))
    }

    fn silence(&mut self, frames: usize) -> Chunk<'_> {
        self.buffer.clear();
        self.buffer
            .resize(frames * usize::from(self.decoder.channel_count()), 0);
        Chunk::more(&self.buffer)
    }
}

impl StreamSource for MusicStream {
    fn channel_count(&self) -> u16 {
        self.decoder.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.decoder.sample_rate()
    }

    fn get_data(&mut self) -> Result<Chunk<'_>, AudioError> {
        if self.frame < 0 {
            let frames = self.frame.unsigned_abs().min(self.buffer_frames as u64) as usize;
            self.frame += frames as i64;
            return Ok(self.silence(frames));
        }
        self.buffer.clear();
        let read = self.decoder.read(&mut self.buffer, self.buffer_frames)?;
        if read > 0 {
            self.frame += read as i64;
            return Ok(Chunk::more(&self.buffer));
        }
        if self.silence_left > 0 {
            let frames = self.silence_left.min(self.buffer_frames as i64);
            self.silence_left -= frames;
            self.frame += frames;
            return Ok(self.silence(frames as usize));
        }
        Ok(Chunk::end())
    }

    fn seek(&mut self, seconds: &RationalTime) -> Result<(), AudioError> {
        let frame = seconds_to_samples(seconds, self.decoder.sample_rate(), 1);
        self.frame = frame;
        self.decoder.seek(frame.max(0).unsigned_abs())?;
        let past_end = match self.decoder.frame_count() {
            Some(total) => (frame - i64::try_from(total).unwrap_or(i64::MAX)).max(0),
            None => 0,
        };
        self.silence_left = (self.trailing_silence - past_end).max(0);
        Ok(())
    }

    fn length(&self) -> Option<RationalTime> {
        let silence = samples_to_seconds(self.trailing_silence, self.decoder.sample_rate(), 1);
        Some(self.duration()? + silence)
    }

    fn on_loop(&mut self) -> Result<Option<i64>, AudioError> {
        self.seek(&RationalTime::zero())?;
        Ok(Some(0))
    }
}
