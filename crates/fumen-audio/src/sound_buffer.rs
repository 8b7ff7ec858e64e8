use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::decoder::{SampleDecoder, SymphoniaDecoder};
use crate::error::AudioError;

const READ_CHUNK_FRAMES: usize = 4096;

/// A fully decoded sound, 16-bit interleaved. Cloning shares the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    samples: Arc<[i16]>,
    channels: u16,
    sample_rate: u32,
}

impl SoundBuffer {
    pub fn from_samples(
        samples: Vec<i16>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        if channels == 0 || sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{channels} channels at {sample_rate} Hz"
            )));
        }
        if samples.len() % usize::from(channels) != 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} samples do not make whole {channels}-channel frames",
                samples.len()
            )));
        }
        Ok(Self {
            samples: samples.into(),
            channels,
            sample_rate,
        })
    }

    /// Decode a whole file.
    pub fn from_file(path: &Path) -> Result<Self, AudioError> {
        let mut decoder = SymphoniaDecoder::open(path)?;
        let sound = Self::decode_all(&mut decoder)?;
        debug!(
            "Loaded {}: {} frames, {} ch, {} Hz",
            path.display(),
            sound.frame_count(),
            sound.channels,
            sound.sample_rate
        );
        Ok(sound)
    }

    pub fn decode_all(decoder: &mut dyn SampleDecoder) -> Result<Self, AudioError> {
        let mut samples = Vec::new();
        while decoder.read(&mut samples, READ_CHUNK_FRAMES)? > 0 {}
        Self::from_samples(samples, decoder.channel_count(), decoder.sample_rate())
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / usize::from(self.channels)
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_frames_and_empty_format() {
        assert!(SoundBuffer::from_samples(vec![1, 2, 3], 2, 44100).is_err());
        assert!(SoundBuffer::from_samples(vec![], 0, 44100).is_err());
        assert!(SoundBuffer::from_samples(vec![], 1, 0).is_err());
    }

    #[test]
    fn clones_share_samples() {
        let sound = SoundBuffer::from_samples(vec![1, -1, 2, -2], 2, 8000).unwrap();
        let copy = sound.clone();
        assert_eq!(copy.frame_count(), 2);
        assert!(std::ptr::eq(sound.samples().as_ptr(), copy.samples().as_ptr()));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SoundBuffer::from_file(&dir.path().join("clap.wav"));
        assert!(matches!(result, Err(AudioError::FileOpen { .. })));
    }
}
