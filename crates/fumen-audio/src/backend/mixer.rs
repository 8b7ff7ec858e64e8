use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{AudioBackend, AudioBuffer, OutputDevice, SourceId, SourceState};
use crate::error::AudioError;

const I16_SCALE: f32 = 32768.0;

struct Source {
    state: SourceState,
    pitch: f32,
    gain: f32,
    queue: VecDeque<AudioBuffer>,
    /// Leading buffers of `queue` that were fully played.
    processed: usize,
    /// Fractional frame position inside `queue[processed]`.
    position: f64,
    /// Samples in the processed buffers still on the queue.
    played_in_queue: i64,
}

impl Source {
    fn new() -> Self {
        Self {
            state: SourceState::Initial,
            pitch: 1.0,
            gain: 1.0,
            queue: VecDeque::new(),
            processed: 0,
            position: 0.0,
            played_in_queue: 0,
        }
    }

    fn has_pending(&self) -> bool {
        self.processed < self.queue.len()
    }

    fn skip_finished_buffers(&mut self) {
        while let Some(buffer) = self.queue.get(self.processed) {
            let frames = frame_count(buffer) as f64;
            if self.position < frames {
                break;
            }
            self.position -= frames;
            self.played_in_queue += buffer.samples.len() as i64;
            self.processed += 1;
        }
    }

    /// Next output frame as (left, right), or `None` once starved.
    fn next_frame(&mut self, output_rate: u32) -> Option<(f32, f32)> {
        let buffer = self.queue.get(self.processed)?;
        let frame = read_frame(buffer, self.position);
        let step = f64::from(self.pitch) * f64::from(buffer.sample_rate) / f64::from(output_rate);
        self.position += step;
        self.skip_finished_buffers();
        Some(frame)
    }

    fn offset(&self) -> i64 {
        let current = self
            .queue
            .get(self.processed)
            .map_or(0, |b| self.position.floor() as i64 * i64::from(b.channels));
        self.played_in_queue + current
    }
}

fn frame_count(buffer: &AudioBuffer) -> usize {
    buffer.samples.len() / usize::from(buffer.channels.max(1))
}

/// Linearly interpolated frame at a fractional position; mono is
/// duplicated to both sides and channels past the second are ignored.
fn read_frame(buffer: &AudioBuffer, position: f64) -> (f32, f32) {
    let channels = usize::from(buffer.channels.max(1));
    let frames = frame_count(buffer);
    let index = (position.floor() as usize).min(frames.saturating_sub(1));
    let next = (index + 1).min(frames.saturating_sub(1));
    let fraction = (position - index as f64).clamp(0.0, 1.0) as f32;
    let sample = |frame: usize, channel: usize| {
        let channel = channel.min(channels - 1);
        f32::from(buffer.samples[frame * channels + channel]) / I16_SCALE
    };
    let lerp = |channel: usize| {
        let a = sample(index, channel);
        a + (sample(next, channel) - a) * fraction
    };
    (lerp(0), lerp(1))
}

/// Software mixer state shared between the backend and the output callback.
pub(crate) struct Mixer {
    sources: BTreeMap<SourceId, Source>,
    next_id: SourceId,
    output_rate: u32,
    latency: Duration,
}

impl Mixer {
    pub(crate) fn new(output_rate: u32) -> Self {
        Self {
            sources: BTreeMap::new(),
            next_id: 1,
            output_rate,
            latency: Duration::ZERO,
        }
    }

    pub(crate) fn set_latency(&mut self, latency: Duration) {
        self.latency = latency;
    }

    fn source(&mut self, id: SourceId) -> Result<&mut Source, AudioError> {
        self.sources.get_mut(&id).ok_or(AudioError::UnknownSource(id))
    }

    /// Mix every playing source into `out`, interleaved with `channels`
    /// channels.
    pub(crate) fn render(&mut self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }
        let output_rate = self.output_rate;
        for source in self.sources.values_mut() {
            if source.state != SourceState::Playing {
                continue;
            }
            let gain = source.gain;
            for frame in out.chunks_exact_mut(channels) {
                let Some((left, right)) = source.next_frame(output_rate) else {
                    source.state = SourceState::Stopped;
                    source.position = 0.0;
                    break;
                };
                if channels == 1 {
                    frame[0] += (left + right) * 0.5 * gain;
                } else {
                    frame[0] += left * gain;
                    frame[1] += right * gain;
                }
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }
    }
}

/// [`AudioBackend`] backed by a software mixer.
///
/// Either attached to the shared [`OutputDevice`], or detached and driven
/// with [`MixerBackend::pump`] (tests, offline rendering).
pub struct MixerBackend {
    mixer: Arc<Mutex<Mixer>>,
    device: Option<Arc<OutputDevice>>,
    output_rate: u32,
}

impl MixerBackend {
    /// Attach to the default output device, opening it if needed.
    pub fn open() -> Result<Self, AudioError> {
        let device = OutputDevice::acquire()?;
        Ok(Self {
            mixer: device.mixer(),
            output_rate: device.sample_rate(),
            device: Some(device),
        })
    }

    pub fn detached(output_rate: u32) -> Self {
        Self {
            mixer: Arc::new(Mutex::new(Mixer::new(output_rate))),
            device: None,
            output_rate,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn is_attached(&self) -> bool {
        self.device.is_some()
    }

    /// Render `frames` stereo frames by hand.
    pub fn pump(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        self.lock().render(&mut out, 2);
        out
    }

    /// Override the reported output latency.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().set_latency(latency);
    }

    fn lock(&self) -> MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn for_each_source(
        &self,
        sources: &[SourceId],
        mut f: impl FnMut(&mut Source),
    ) -> Result<(), AudioError> {
        let mut mixer = self.lock();
        if let Some(&missing) = sources.iter().find(|&&id| !mixer.sources.contains_key(&id)) {
            return Err(AudioError::UnknownSource(missing));
        }
        for id in sources {
            f(mixer.source(*id)?);
        }
        Ok(())
    }
}

impl AudioBackend for MixerBackend {
    fn create_source(&self) -> Result<SourceId, AudioError> {
        let mut mixer = self.lock();
        let id = mixer.next_id;
        mixer.next_id = mixer
            .next_id
            .checked_add(1)
            .ok_or_else(|| AudioError::Backend("out of source ids".to_string()))?;
        mixer.sources.insert(id, Source::new());
        Ok(id)
    }

    fn delete_source(&self, source: SourceId) -> Result<(), AudioError> {
        self.lock()
            .sources
            .remove(&source)
            .map(|_| ())
            .ok_or(AudioError::UnknownSource(source))
    }

    fn queue_buffer(&self, source: SourceId, buffer: AudioBuffer) -> Result<(), AudioError> {
        if buffer.channels == 0 || buffer.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(format!(
                "{} channels at {} Hz",
                buffer.channels, buffer.sample_rate
            )));
        }
        self.lock().source(source)?.queue.push_back(buffer);
        Ok(())
    }

    fn unqueue_processed(&self, source: SourceId) -> Result<Vec<AudioBuffer>, AudioError> {
        let mut mixer = self.lock();
        let source = mixer.source(source)?;
        let processed: Vec<AudioBuffer> = source.queue.drain(..source.processed).collect();
        source.played_in_queue -= processed.iter().map(|b| b.samples.len() as i64).sum::<i64>();
        source.processed = 0;
        Ok(processed)
    }

    fn processed_count(&self, source: SourceId) -> Result<usize, AudioError> {
        Ok(self.lock().source(source)?.processed)
    }

    fn play_all(&self, sources: &[SourceId]) -> Result<(), AudioError> {
        self.for_each_source(sources, |source| {
            source.state = if source.has_pending() {
                SourceState::Playing
            } else {
                SourceState::Stopped
            };
        })
    }

    fn pause_all(&self, sources: &[SourceId]) -> Result<(), AudioError> {
        self.for_each_source(sources, |source| {
            if source.state == SourceState::Playing {
                source.state = SourceState::Paused;
            }
        })
    }

    fn stop_all(&self, sources: &[SourceId]) -> Result<(), AudioError> {
        self.for_each_source(sources, |source| {
            source.state = SourceState::Stopped;
            source.position = 0.0;
            source.processed = source.queue.len();
            source.played_in_queue = source.queue.iter().map(|b| b.samples.len() as i64).sum();
        })
    }

    fn state(&self, source: SourceId) -> Result<SourceState, AudioError> {
        Ok(self.lock().source(source)?.state)
    }

    fn set_pitch(&self, source: SourceId, pitch: f32) -> Result<(), AudioError> {
        if !(pitch > 0.0 && pitch.is_finite()) {
            return Err(AudioError::InvalidPitch(pitch.to_string()));
        }
        self.lock().source(source)?.pitch = pitch;
        Ok(())
    }

    fn set_gain(&self, source: SourceId, gain: f32) -> Result<(), AudioError> {
        self.lock().source(source)?.gain = gain.clamp(0.0, 1.0);
        Ok(())
    }

    fn offset_samples(&self, source: SourceId) -> Result<i64, AudioError> {
        Ok(self.lock().source(source)?.offset())
    }

    fn latency(&self) -> Duration {
        self.lock().latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(tag: usize, samples: Vec<i16>, channels: u16, sample_rate: u32) -> AudioBuffer {
        AudioBuffer {
            tag,
            samples,
            channels,
            sample_rate,
        }
    }

    #[test]
    fn plays_queue_in_order_and_reports_processed() {
        let backend = MixerBackend::detached(100);
        let id = backend.create_source().unwrap();
        backend.queue_buffer(id, buffer(0, vec![100; 4], 1, 100)).unwrap();
        backend.queue_buffer(id, buffer(1, vec![200; 4], 1, 100)).unwrap();
        backend.play_all(&[id]).unwrap();

        backend.pump(3);
        assert_eq!(backend.offset_samples(id).unwrap(), 3);
        assert_eq!(backend.processed_count(id).unwrap(), 0);

        backend.pump(3);
        assert_eq!(backend.processed_count(id).unwrap(), 1);
        assert_eq!(backend.offset_samples(id).unwrap(), 6);
        let done = backend.unqueue_processed(id).unwrap();
        assert_eq!(done.iter().map(|b| b.tag).collect::<Vec<_>>(), vec![0]);
        assert_eq!(backend.offset_samples(id).unwrap(), 2);
    }

    #[test]
    fn starved_source_stops() {
        let backend = MixerBackend::detached(100);
        let id = backend.create_source().unwrap();
        backend.queue_buffer(id, buffer(0, vec![1000; 4], 2, 100)).unwrap();
        backend.play_all(&[id]).unwrap();
        let out = backend.pump(4);
        assert!(out[0] > 0.0 && out[3] > 0.0);
        assert_eq!(out[4], 0.0);
        assert_eq!(backend.state(id).unwrap(), SourceState::Stopped);
        assert_eq!(backend.processed_count(id).unwrap(), 1);
    }

    #[test]
    fn pitch_changes_consumption_speed() {
        let backend = MixerBackend::detached(100);
        let id = backend.create_source().unwrap();
        backend.queue_buffer(id, buffer(0, vec![0; 100], 1, 100)).unwrap();
        backend.set_pitch(id, 1.5).unwrap();
        backend.play_all(&[id]).unwrap();
        backend.pump(10);
        assert_eq!(backend.offset_samples(id).unwrap(), 15);
        assert!(backend.set_pitch(id, 0.0).is_err());
    }

    #[test]
    fn resamples_to_output_rate() {
        let backend = MixerBackend::detached(200);
        let id = backend.create_source().unwrap();
        backend.queue_buffer(id, buffer(0, vec![0, 0, 0, 1000], 2, 100)).unwrap();
        backend.play_all(&[id]).unwrap();
        let out = backend.pump(2);
        // Halfway between the first two frames on the right channel.
        assert!((out[3] - 500.0 / 32768.0).abs() < 1e-6);
        assert_eq!(backend.offset_samples(id).unwrap(), 2);
    }

    #[test]
    fn pause_holds_position_and_stop_processes_everything() {
        let backend = MixerBackend::detached(100);
        let id = backend.create_source().unwrap();
        backend.queue_buffer(id, buffer(0, vec![0; 10], 1, 100)).unwrap();
        backend.queue_buffer(id, buffer(1, vec![0; 10], 1, 100)).unwrap();
        backend.play_all(&[id]).unwrap();
        backend.pump(4);
        backend.pause_all(&[id]).unwrap();
        backend.pump(4);
        assert_eq!(backend.offset_samples(id).unwrap(), 4);
        assert_eq!(backend.state(id).unwrap(), SourceState::Paused);

        backend.stop_all(&[id]).unwrap();
        assert_eq!(backend.processed_count(id).unwrap(), 2);
        assert_eq!(backend.unqueue_processed(id).unwrap().len(), 2);
        backend.play_all(&[id]).unwrap();
        assert_eq!(backend.state(id).unwrap(), SourceState::Stopped);
    }

    #[test]
    fn unknown_sources_are_errors() {
        let backend = MixerBackend::detached(100);
        let id = backend.create_source().unwrap();
        backend.delete_source(id).unwrap();
        assert!(matches!(backend.state(id), Err(AudioError::UnknownSource(_))));
        assert!(backend.play_all(&[id]).is_err());
        assert!(backend.delete_source(id).is_err());
    }
}
