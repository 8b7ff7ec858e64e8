use std::fs::File;
use std::io;
use std::path::Path;

use log::warn;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;
use crate::sound_buffer::SoundBuffer;

/// Pull-based source of interleaved 16-bit frames.
pub trait SampleDecoder: Send {
    fn channel_count(&self) -> u16;
    fn sample_rate(&self) -> u32;
    /// Total length in frames, when the container reports it.
    fn frame_count(&self) -> Option<u64>;
    /// Append up to `max_frames` frames to `out`. Returns the number of
    /// frames appended; zero means the end was reached.
    fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError>;
    /// Move to `frame`. Seeking past the end leaves the decoder exhausted.
    fn seek(&mut self, frame: u64) -> Result<(), AudioError>;
}

fn decode_error(err: SymphoniaError) -> AudioError {
    AudioError::StreamDecodeFailure(err.to_string())
}

/// Streaming decoder for any container and codec symphonia knows.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: u16,
    sample_rate: u32,
    frames: Option<u64>,
    pending: Vec<i16>,
    cursor: usize,
    skip: usize,
    exhausted: bool,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let file = File::open(path).map_err(|source| AudioError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }
        let detected = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(decode_error)?;
        let format = detected.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                AudioError::UnsupportedFormat(format!("no audio track in {}", path.display()))
            })?;
        let track_id = track.id;
        let frames = track.codec_params.n_frames;
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(decode_error)?;

        let mut this = Self {
            format,
            decoder,
            track_id,
            channels: 0,
            sample_rate: 0,
            frames,
            pending: Vec::new(),
            cursor: 0,
            skip: 0,
            exhausted: false,
        };
        // The first packet tells the real output layout.
        if !this.decode_packet()? || this.channels == 0 || this.sample_rate == 0 {
            return Err(AudioError::StreamDecodeFailure(format!(
                "no audio frames in {}",
                path.display()
            )));
        }
        Ok(this)
    }

    fn decode_packet(&mut self) -> Result<bool, AudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(decode_error(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let channels = u16::try_from(spec.channels.count()).unwrap_or(0);
                    if self.channels == 0 {
                        self.channels = channels;
                        self.sample_rate = spec.rate;
                    } else if channels != self.channels || spec.rate != self.sample_rate {
                        return Err(AudioError::UnsupportedFormat(
                            "stream changes layout midway".to_string(),
                        ));
                    }
                    let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    self.pending.extend_from_slice(buffer.samples());
                    return Ok(true);
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {e}");
                }
                Err(e) => return Err(decode_error(e)),
            }
        }
    }
}

impl SampleDecoder for SymphoniaDecoder {
    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_count(&self) -> Option<u64> {
        self.frames
    }

    fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError> {
        let channels = usize::from(self.channels);
        let wanted = max_frames * channels;
        let mut written = 0;
        while written < wanted {
            if self.cursor == self.pending.len() {
                self.pending.clear();
                self.cursor = 0;
                if self.exhausted || !self.decode_packet()? {
                    self.exhausted = true;
                    break;
                }
                continue;
            }
            let available = self.pending.len() - self.cursor;
            if self.skip > 0 {
                let skipped = self.skip.min(available);
                self.cursor += skipped;
                self.skip -= skipped;
                continue;
            }
            let count = (wanted - written).min(available);
            out.extend_from_slice(&self.pending[self.cursor..self.cursor + count]);
            self.cursor += count;
            written += count;
        }
        Ok(written / channels)
    }

    fn seek(&mut self, frame: u64) -> Result<(), AudioError> {
        self.pending.clear();
        self.cursor = 0;
        self.skip = 0;
        if self.frames.is_some_and(|total| frame >= total) {
            self.exhausted = true;
            return Ok(());
        }
        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::TimeStamp {
                    ts: frame,
                    track_id: self.track_id,
                },
            )
            .map_err(decode_error)?;
        self.decoder.reset();
        self.exhausted = false;
        let late_by = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.skip = usize::try_from(late_by).unwrap_or(usize::MAX) * usize::from(self.channels);
        Ok(())
    }
}

/// Decoder over an already decoded [`SoundBuffer`].
pub struct MemoryDecoder {
    sound: SoundBuffer,
    frame: usize,
}

impl MemoryDecoder {
    pub fn new(sound: SoundBuffer) -> Self {
        Self { sound, frame: 0 }
    }
}

impl SampleDecoder for MemoryDecoder {
    fn channel_count(&self) -> u16 {
        self.sound.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.sound.sample_rate()
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.sound.frame_count() as u64)
    }

    fn read(&mut self, out: &mut Vec<i16>, max_frames: usize) -> Result<usize, AudioError> {
        let channels = usize::from(self.sound.channels());
        let count = max_frames.min(self.sound.frame_count().saturating_sub(self.frame));
        let start = self.frame * channels;
        out.extend_from_slice(&self.sound.samples()[start..start + count * channels]);
        self.frame += count;
        Ok(count)
    }

    fn seek(&mut self, frame: u64) -> Result<(), AudioError> {
        self.frame = usize::try_from(frame).unwrap_or(usize::MAX).min(self.sound.frame_count());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_decoder_reads_in_chunks() {
        let sound = SoundBuffer::from_samples((0..10).collect(), 2, 100).unwrap();
        let mut decoder = MemoryDecoder::new(sound);
        let mut out = Vec::new();
        assert_eq!(decoder.read(&mut out, 3).unwrap(), 3);
        assert_eq!(out, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(decoder.read(&mut out, 3).unwrap(), 2);
        assert_eq!(decoder.read(&mut out, 3).unwrap(), 0);
        decoder.seek(4).unwrap();
        out.clear();
        assert_eq!(decoder.read(&mut out, 8).unwrap(), 1);
        assert_eq!(out, vec![8, 9]);
        decoder.seek(100).unwrap();
        assert_eq!(decoder.read(&mut out, 8).unwrap(), 0);
    }
}
