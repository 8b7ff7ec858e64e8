//! Several audio streams played in lockstep.
//!
//! A session starts on [`SyncedAudioEngine::play`]: a worker thread takes
//! the streams, queues a ring of buffers per stream on the backend, starts
//! every source with one call and keeps the rings full until the streams run
//! out or the engine stops it. Control operations join the worker before
//! touching the streams, so only one thread ever feeds a stream.

use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fumen_timing::RationalTime;
use log::{debug, error, warn};

use crate::backend::{AudioBackend, AudioBuffer, MixerBackend, SourceId, SourceState};
use crate::config::AudioConfig;
use crate::error::AudioError;
use crate::stream::StreamSource;
use crate::time::{samples_to_seconds, seconds_to_samples};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Paused,
    Playing,
}

/// A stream handed to [`SyncedAudioEngine::update_streams`].
pub struct NewStream {
    source: Box<dyn StreamSource>,
    bypasses_pitch: bool,
}

impl NewStream {
    /// A stream played faster or slower with the engine's pitch.
    pub fn new(source: impl StreamSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            bypasses_pitch: false,
        }
    }

    /// A stream that keeps its natural pitch. It is told about pitch changes
    /// through [`StreamSource::on_pitch_change`] and seeks on its own clock.
    pub fn bypassing_pitch(source: impl StreamSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            bypasses_pitch: true,
        }
    }
}

/// State shared with the worker.
struct Shared {
    is_streaming: bool,
    start_state: Status,
    looping: bool,
    error: Option<AudioError>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What the engine keeps about a stream while the worker owns it.
struct StreamInfo {
    source_id: SourceId,
    channels: u16,
    sample_rate: u32,
    bypasses_pitch: bool,
    gain: f32,
    /// Samples in the buffers already played and unqueued.
    samples_processed: Arc<AtomicI64>,
}

/// A stream with its buffer ring; moves into the worker while playing.
struct EngineStream {
    source: Box<dyn StreamSource>,
    source_id: SourceId,
    bypasses_pitch: bool,
    /// Buffers not queued on the backend.
    pool: Vec<AudioBuffer>,
    buffer_count: usize,
    /// Sample count to restart from once the buffer with that tag has played.
    buffer_seeks: Vec<Option<i64>>,
    finished: bool,
    samples_processed: Arc<AtomicI64>,
    /// Next sample the source hands out, on the stream's own clock.
    position: i64,
    /// Sample at which the stream wraps back to zero while looping.
    loop_end: Option<i64>,
    /// The source ran out before `loop_end`; silence fills the gap.
    exhausted: bool,
    silence_step: i64,
}

impl EngineStream {
    fn new(
        source: Box<dyn StreamSource>,
        source_id: SourceId,
        bypasses_pitch: bool,
        buffer_count: usize,
        buffer_length: &RationalTime,
    ) -> Self {
        let channels = source.channel_count();
        let silence_step = seconds_to_samples(buffer_length, source.sample_rate(), channels)
            .max(i64::from(channels.max(1)));
        Self {
            source,
            source_id,
            bypasses_pitch,
            pool: (0..buffer_count).map(AudioBuffer::new).collect(),
            buffer_count,
            buffer_seeks: vec![None; buffer_count],
            finished: false,
            samples_processed: Arc::new(AtomicI64::new(0)),
            position: 0,
            loop_end: None,
            exhausted: false,
            silence_step,
        }
    }

    fn local_seconds(&self, seconds: &RationalTime, pitch: &RationalTime) -> RationalTime {
        if self.bypasses_pitch {
            seconds / pitch
        } else {
            seconds.clone()
        }
    }

    /// Sample on this stream's clock that plays at music time `seconds`.
    fn samples_at(&self, seconds: &RationalTime, pitch: &RationalTime) -> i64 {
        seconds_to_samples(
            &self.local_seconds(seconds, pitch),
            self.source.sample_rate(),
            self.source.channel_count(),
        )
    }

    /// Music time of the sample count `samples` on this stream's clock.
    fn music_time(&self, samples: i64, pitch: &RationalTime) -> RationalTime {
        let seconds =
            samples_to_seconds(samples, self.source.sample_rate(), self.source.channel_count());
        if self.bypasses_pitch {
            seconds * pitch
        } else {
            seconds
        }
    }

    /// Length in music time, when the source knows it.
    fn music_length(&self, pitch: &RationalTime) -> Option<RationalTime> {
        let length = self.source.length()?;
        Some(if self.bypasses_pitch {
            length * pitch
        } else {
            length
        })
    }

    /// Move the source and the sample accounting to music time `seconds`.
    /// The queue must be empty.
    fn seek_to(&mut self, seconds: &RationalTime, pitch: &RationalTime) -> Result<(), AudioError> {
        self.source.seek(&self.local_seconds(seconds, pitch))?;
        let samples = self.samples_at(seconds, pitch);
        self.position = samples;
        self.finished = false;
        self.exhausted = false;
        self.samples_processed.store(samples, Ordering::SeqCst);
        Ok(())
    }

    fn restart_loop(&mut self) -> Result<(), AudioError> {
        self.source.seek(&RationalTime::zero())?;
        self.position = 0;
        self.exhausted = false;
        Ok(())
    }

    fn has_queued(&self) -> bool {
        self.pool.len() < self.buffer_count
    }

    /// Put back buffers returned by the backend, accounting for the
    /// samples they held.
    fn reclaim(&mut self, buffers: Vec<AudioBuffer>) {
        for buffer in buffers {
            match self.buffer_seeks.get_mut(buffer.tag).and_then(Option::take) {
                Some(restart) => self.samples_processed.store(restart, Ordering::SeqCst),
                None => {
                    self.samples_processed
                        .fetch_add(buffer.samples.len() as i64, Ordering::SeqCst);
                }
            }
            self.pool.push(buffer);
        }
    }

    /// Return every buffer to the pool without counting them.
    fn discard_queue(&mut self, buffers: Vec<AudioBuffer>) {
        self.pool.extend(buffers);
        self.buffer_seeks.iter_mut().for_each(|seek| *seek = None);
    }

    /// Fill free buffers and queue them until the pool is empty or the
    /// stream is done.
    fn refill(
        &mut self,
        backend: &dyn AudioBackend,
        shared: &Mutex<Shared>,
        retries: u32,
    ) -> Result<(), AudioError> {
        while !self.finished {
            let Some(buffer) = self.pool.pop() else {
                break;
            };
            self.fill_and_queue(buffer, backend, shared, retries)?;
        }
        Ok(())
    }

    fn fill_and_queue(
        &mut self,
        mut buffer: AudioBuffer,
        backend: &dyn AudioBackend,
        shared: &Mutex<Shared>,
        retries: u32,
    ) -> Result<(), AudioError> {
        buffer.samples.clear();
        buffer.channels = self.source.channel_count();
        buffer.sample_rate = self.source.sample_rate();
        let mut seek = None;
        let mut looped = false;
        let mut failures = 0;
        loop {
            let looping = lock(shared).looping;
            let until_loop = self
                .loop_end
                .filter(|_| looping)
                .map(|end| end - self.position);
            if until_loop.is_some_and(|left| left <= 0) {
                if looped && buffer.samples.is_empty() {
                    self.finished = true;
                    break;
                }
                if let Err(e) = self.restart_loop() {
                    warn!("Stream could not loop: {e}");
                    lock(shared).error = Some(e);
                    self.finished = true;
                    break;
                }
                seek = Some(0);
                if buffer.samples.is_empty() {
                    // Nothing before the loop point: the buffer starts at it.
                    looped = true;
                    continue;
                }
                break;
            }

            let more = if self.exhausted {
                let Some(left) = until_loop else {
                    self.finished = true;
                    break;
                };
                let silence = left.min(self.silence_step);
                let len = buffer.samples.len() + silence as usize;
                buffer.samples.resize(len, 0);
                self.position += silence;
                if silence == left {
                    continue;
                }
                true
            } else {
                match self.source.get_data() {
                    Ok(chunk) => {
                        let more = chunk.more;
                        let len = chunk.samples.len() as i64;
                        let take = until_loop.map_or(len, |left| left.min(len));
                        buffer
                            .samples
                            .extend_from_slice(&chunk.samples[..take as usize]);
                        self.position += take;
                        if let Some(left) = until_loop {
                            self.exhausted = !more;
                            if take == left || !more {
                                continue;
                            }
                        }
                        more
                    }
                    Err(e) => {
                        failures += 1;
                        warn!("Stream data failed ({failures}/{}): {e}", retries + 1);
                        if failures > retries {
                            lock(shared).error = Some(e);
                            self.finished = true;
                            break;
                        }
                        continue;
                    }
                }
            };
            if more {
                if looped {
                    if let Some(start) = seek.as_mut() {
                        *start += buffer.samples.len() as i64;
                    }
                }
                break;
            }
            // Length unknown: the stream decides where it restarts.
            // An empty stream would loop forever.
            let can_loop = !(looped && buffer.samples.is_empty());
            let restart = if can_loop && looping {
                match self.source.on_loop() {
                    Ok(restart) => restart,
                    Err(e) => {
                        warn!("Stream could not loop: {e}");
                        lock(shared).error = Some(e);
                        None
                    }
                }
            } else {
                None
            };
            match restart {
                Some(start) if buffer.samples.is_empty() => {
                    looped = true;
                    seek = Some(start);
                    self.position = start;
                }
                Some(start) => {
                    seek = Some(start);
                    self.position = start;
                    break;
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }
        if buffer.samples.is_empty() {
            self.pool.push(buffer);
            self.finished = true;
            return Ok(());
        }
        if let Some(slot) = self.buffer_seeks.get_mut(buffer.tag) {
            *slot = seek;
        }
        backend.queue_buffer(self.source_id, buffer)
    }
}

/// The thread feeding the backend during one session.
struct Worker {
    backend: Arc<dyn AudioBackend>,
    shared: Arc<Mutex<Shared>>,
    streams: BTreeMap<String, EngineStream>,
    pitch: RationalTime,
    interval: Duration,
    retries: u32,
}

impl Worker {
    fn run(mut self) -> BTreeMap<String, EngineStream> {
        if let Err(e) = self.session() {
            error!("Audio session aborted: {e}");
            let mut shared = lock(&self.shared);
            shared.error = Some(e);
            shared.is_streaming = false;
        }
        self.streams
    }

    fn session(&mut self) -> Result<(), AudioError> {
        let ids: Vec<SourceId> = self.streams.values().map(|s| s.source_id).collect();
        for stream in self.streams.values_mut() {
            stream.refill(self.backend.as_ref(), &self.shared, self.retries)?;
        }
        {
            let shared = lock(&self.shared);
            if !shared.is_streaming {
                return Ok(());
            }
            self.backend.play_all(&ids)?;
            if shared.start_state == Status::Paused {
                self.backend.pause_all(&ids)?;
            }
        }
        debug!("Audio session started with {} streams", ids.len());

        loop {
            if !lock(&self.shared).is_streaming {
                return Ok(());
            }
            let mut all_done = true;
            let mut starved = Vec::new();
            for (name, stream) in &mut self.streams {
                {
                    let _shared = lock(&self.shared);
                    let played = self.backend.unqueue_processed(stream.source_id)?;
                    stream.reclaim(played);
                }
                stream.refill(self.backend.as_ref(), &self.shared, self.retries)?;
                if self.backend.state(stream.source_id)? != SourceState::Stopped {
                    all_done = false;
                    continue;
                }
                if stream.has_queued() {
                    // Starved before the refill came in.
                    all_done = false;
                    starved.push(name.clone());
                } else if !stream.finished {
                    all_done = false;
                }
            }
            if all_done {
                lock(&self.shared).is_streaming = false;
                debug!("Audio session finished");
                return Ok(());
            }
            if !starved.is_empty() {
                self.restart_starved(&starved)?;
            }
            thread::sleep(self.interval);
        }
    }

    /// Music time of the first stream still playing.
    fn reference_time(&self) -> Result<Option<RationalTime>, AudioError> {
        for stream in self.streams.values() {
            if self.backend.state(stream.source_id)? != SourceState::Playing {
                continue;
            }
            let samples = stream.samples_processed.load(Ordering::SeqCst)
                + self.backend.offset_samples(stream.source_id)?;
            return Ok(Some(stream.music_time(samples, &self.pitch)));
        }
        Ok(None)
    }

    /// Bring starved sources back in line with the others: moved to the
    /// music time of a playing stream, or all restarted together when none
    /// is playing.
    fn restart_starved(&mut self, names: &[String]) -> Result<(), AudioError> {
        let now = {
            let shared = lock(&self.shared);
            if !shared.is_streaming || shared.start_state != Status::Playing {
                return Ok(());
            }
            self.reference_time()?
        };
        let Some(now) = now else {
            let ids: Vec<SourceId> = names
                .iter()
                .filter_map(|name| self.streams.get(name))
                .map(|s| s.source_id)
                .collect();
            debug!("Restarting {} starved streams together", ids.len());
            return self.backend.play_all(&ids);
        };
        for name in names {
            let Some(stream) = self.streams.get_mut(name) else {
                continue;
            };
            debug!("Stream {name:?} starved, resyncing at {now} s");
            {
                let _shared = lock(&self.shared);
                self.backend.stop_all(&[stream.source_id])?;
                let played = self.backend.unqueue_processed(stream.source_id)?;
                stream.discard_queue(played);
                stream.seek_to(&now, &self.pitch)?;
            }
            stream.refill(self.backend.as_ref(), &self.shared, self.retries)?;
            let shared = lock(&self.shared);
            if shared.is_streaming && shared.start_state == Status::Playing {
                self.backend.play_all(&[stream.source_id])?;
            }
        }
        Ok(())
    }
}

/// Plays named streams in sync, with a shared pitch and position.
///
/// The first stream in name order is the clock for
/// [`SyncedAudioEngine::playing_offset`].
pub struct SyncedAudioEngine {
    backend: Arc<dyn AudioBackend>,
    config: AudioConfig,
    shared: Arc<Mutex<Shared>>,
    streams: BTreeMap<String, EngineStream>,
    infos: BTreeMap<String, StreamInfo>,
    worker: Option<JoinHandle<BTreeMap<String, EngineStream>>>,
    pitch: RationalTime,
    volume: f32,
    /// Output latency measured when playback last started.
    lag: RationalTime,
}

impl SyncedAudioEngine {
    pub fn new(backend: Arc<dyn AudioBackend>, config: AudioConfig) -> Self {
        Self {
            backend,
            config,
            shared: Arc::new(Mutex::new(Shared {
                is_streaming: false,
                start_state: Status::Stopped,
                looping: false,
                error: None,
            })),
            streams: BTreeMap::new(),
            infos: BTreeMap::new(),
            worker: None,
            pitch: RationalTime::one(),
            volume: 1.0,
            lag: RationalTime::zero(),
        }
    }

    /// Engine on the default output device.
    pub fn open(config: AudioConfig) -> Result<Self, AudioError> {
        let backend = MixerBackend::open()?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn status(&self) -> Status {
        let shared = lock(&self.shared);
        if shared.is_streaming {
            shared.start_state
        } else {
            Status::Stopped
        }
    }

    pub fn play(&mut self) -> Result<(), AudioError> {
        match self.status() {
            Status::Paused => {
                let ids = self.source_ids();
                {
                    let mut shared = lock(&self.shared);
                    shared.start_state = Status::Playing;
                    self.backend.play_all(&ids)?;
                }
                self.measure_lag();
                return Ok(());
            }
            Status::Playing => self.stop()?,
            // A session that ended on its own still has its worker.
            Status::Stopped if self.worker.is_some() => self.stop()?,
            Status::Stopped => {}
        }
        self.launch(Status::Playing);
        self.measure_lag();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), AudioError> {
        let ids = self.source_ids();
        let mut shared = lock(&self.shared);
        if !shared.is_streaming {
            return Ok(());
        }
        shared.start_state = Status::Paused;
        self.backend.pause_all(&ids)
    }

    /// Stop playback and rewind every stream to the start.
    pub fn stop(&mut self) -> Result<(), AudioError> {
        self.halt();
        self.seek_streams(&RationalTime::zero())
    }

    /// Move every stream to `offset` seconds, keeping the current status.
    pub fn set_playing_offset(&mut self, offset: &RationalTime) -> Result<(), AudioError> {
        let status = self.status();
        self.halt();
        self.seek_streams(offset)?;
        self.relaunch(status);
        Ok(())
    }

    /// Music time of the clock stream, in seconds.
    pub fn playing_offset(&self) -> RationalTime {
        let Some(info) = self.infos.values().next() else {
            return RationalTime::zero();
        };
        let samples = {
            let shared = lock(&self.shared);
            let processed = info.samples_processed.load(Ordering::SeqCst);
            if !shared.is_streaming {
                processed
            } else {
                match self.backend.offset_samples(info.source_id) {
                    Ok(offset) => processed + offset,
                    Err(e) => {
                        warn!("Could not read stream offset: {e}");
                        processed
                    }
                }
            }
        };
        let seconds = samples_to_seconds(samples, info.sample_rate, info.channels);
        if info.bypasses_pitch {
            seconds * &self.pitch
        } else {
            seconds
        }
    }

    /// [`SyncedAudioEngine::playing_offset`] minus the output latency while
    /// playing: the music time being heard right now.
    pub fn precise_playing_offset(&self) -> RationalTime {
        let offset = self.playing_offset();
        if self.status() == Status::Playing {
            offset - &self.lag * &self.pitch
        } else {
            offset
        }
    }

    pub fn pitch(&self) -> &RationalTime {
        &self.pitch
    }

    pub fn set_pitch(&mut self, pitch: RationalTime) -> Result<(), AudioError> {
        if !pitch.is_positive() {
            return Err(AudioError::InvalidPitch(pitch.to_string()));
        }
        self.update_streams(Vec::new(), &[], Some(pitch))
    }

    /// Add, replace and remove streams and change the pitch in one
    /// stop/restart cycle. Playback resumes from the same position.
    pub fn update_streams(
        &mut self,
        to_add: Vec<(String, NewStream)>,
        to_remove: &[&str],
        new_pitch: Option<RationalTime>,
    ) -> Result<(), AudioError> {
        if let Some(pitch) = &new_pitch {
            if !pitch.is_positive() {
                return Err(AudioError::InvalidPitch(pitch.to_string()));
            }
        }
        let pitch = new_pitch.unwrap_or_else(|| self.pitch.clone());
        let offset = self.playing_offset();
        // New streams are ready before anything running is touched.
        let mut added = Vec::with_capacity(to_add.len());
        for (name, new) in to_add {
            match self.prepare_stream(new, &offset, &pitch) {
                Ok((stream, info)) => added.push((name, stream, info)),
                Err(e) => {
                    for (_, stream, _) in added {
                        self.delete_source(stream.source_id);
                    }
                    return Err(e);
                }
            }
        }

        let status = self.status();
        self.halt();

        let mut replaced: BTreeSet<&str> = to_remove.iter().copied().collect();
        replaced.extend(added.iter().map(|(name, _, _)| name.as_str()));
        if let Err(e) = self.retune(&pitch, &offset, &replaced) {
            warn!("Stream update failed, keeping the current streams: {e}");
            let previous = self.pitch.clone();
            if let Err(e) = self.retune(&previous, &offset, &replaced) {
                warn!("Failed to restore the streams: {e}");
            }
            for (_, stream, _) in added {
                self.delete_source(stream.source_id);
            }
            self.relaunch(status);
            return Err(e);
        }
        self.pitch = pitch;

        for name in to_remove {
            self.forget_stream(name);
        }
        for (name, stream, info) in added {
            self.forget_stream(&name);
            debug!("Added stream {name:?} ({} ch, {} Hz)", info.channels, info.sample_rate);
            self.infos.insert(name.clone(), info);
            self.streams.insert(name, stream);
        }
        self.relaunch(status);
        Ok(())
    }

    pub fn add_stream(
        &mut self,
        name: impl Into<String>,
        stream: NewStream,
    ) -> Result<(), AudioError> {
        self.update_streams(vec![(name.into(), stream)], &[], None)
    }

    pub fn remove_stream(&mut self, name: &str) -> Result<(), AudioError> {
        if !self.contains_stream(name) {
            return Err(AudioError::UnknownStream(name.to_string()));
        }
        self.update_streams(Vec::new(), &[name], None)
    }

    pub fn contains_stream(&self, name: &str) -> bool {
        self.infos.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.infos.keys().map(String::as_str)
    }

    pub fn set_looping(&mut self, looping: bool) {
        lock(&self.shared).looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        lock(&self.shared).looping
    }

    /// Volume (0.0 - 1.0) of every stream.
    pub fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.volume = volume.clamp(0.0, 1.0);
        let names: Vec<String> = self.infos.keys().cloned().collect();
        for name in names {
            self.set_stream_volume(&name, self.volume)?;
        }
        Ok(())
    }

    pub fn set_stream_volume(&mut self, name: &str, volume: f32) -> Result<(), AudioError> {
        let info = self
            .infos
            .get_mut(name)
            .ok_or_else(|| AudioError::UnknownStream(name.to_string()))?;
        info.gain = volume.clamp(0.0, 1.0);
        self.backend
            .set_gain(info.source_id, info.gain * self.config.master_volume)
    }

    /// Last error met by the streaming worker, if any.
    pub fn take_error(&mut self) -> Option<AudioError> {
        lock(&self.shared).error.take()
    }

    fn source_ids(&self) -> Vec<SourceId> {
        self.infos.values().map(|info| info.source_id).collect()
    }

    fn measure_lag(&mut self) {
        self.lag = if self.config.latency_compensation {
            RationalTime::from_duration(self.backend.latency())
        } else {
            RationalTime::zero()
        };
    }

    fn launch(&mut self, state: Status) {
        if self.streams.is_empty() {
            return;
        }
        {
            let mut shared = lock(&self.shared);
            shared.is_streaming = true;
            shared.start_state = state;
        }
        let loop_point = self
            .streams
            .values()
            .filter_map(|stream| stream.music_length(&self.pitch))
            .filter(|length| length.is_positive())
            .max();
        if let Some(point) = &loop_point {
            debug!("Streams loop at {point} s");
        }
        for stream in self.streams.values_mut() {
            stream.loop_end = loop_point
                .as_ref()
                .map(|point| stream.samples_at(point, &self.pitch));
        }
        let worker = Worker {
            backend: Arc::clone(&self.backend),
            shared: Arc::clone(&self.shared),
            streams: mem::take(&mut self.streams),
            pitch: self.pitch.clone(),
            interval: self.config.processing_interval(),
            retries: self.config.buffer_retries,
        };
        self.worker = Some(thread::spawn(move || worker.run()));
    }

    fn relaunch(&mut self, status: Status) {
        if status != Status::Stopped {
            self.launch(status);
            if status == Status::Playing {
                self.measure_lag();
            }
        }
    }

    /// End the session and take the streams back, with their buffers.
    fn halt(&mut self) {
        lock(&self.shared).is_streaming = false;
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(streams) => self.streams = streams,
                Err(_) => {
                    error!("Audio worker panicked, dropping its streams");
                    lock(&self.shared).error = Some(AudioError::WorkerPanicked);
                    let lost: Vec<String> = self.infos.keys().cloned().collect();
                    for name in lost {
                        self.forget_stream(&name);
                    }
                }
            }
        }
        let ids: Vec<SourceId> = self.streams.values().map(|s| s.source_id).collect();
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.backend.stop_all(&ids) {
            warn!("Failed to stop audio sources: {e}");
        }
        for stream in self.streams.values_mut() {
            match self.backend.unqueue_processed(stream.source_id) {
                Ok(buffers) => stream.discard_queue(buffers),
                Err(e) => warn!("Failed to unqueue buffers: {e}"),
            }
        }
    }

    fn seek_streams(&mut self, offset: &RationalTime) -> Result<(), AudioError> {
        for stream in self.streams.values_mut() {
            stream.seek_to(offset, &self.pitch)?;
        }
        Ok(())
    }

    /// A new stream with its source, tuned and moved to `offset`.
    fn prepare_stream(
        &self,
        new: NewStream,
        offset: &RationalTime,
        pitch: &RationalTime,
    ) -> Result<(EngineStream, StreamInfo), AudioError> {
        let id = self.backend.create_source()?;
        let mut stream = EngineStream::new(
            new.source,
            id,
            new.bypasses_pitch,
            self.config.buffers_per_source(),
            &self.config.music_buffer_length(),
        );
        let info = StreamInfo {
            source_id: id,
            channels: stream.source.channel_count(),
            sample_rate: stream.source.sample_rate(),
            bypasses_pitch: new.bypasses_pitch,
            gain: self.volume,
            samples_processed: Arc::clone(&stream.samples_processed),
        };
        let ready = self
            .tune(&mut stream, info.gain, pitch)
            .and_then(|()| stream.seek_to(offset, pitch));
        if let Err(e) = ready {
            self.delete_source(id);
            return Err(e);
        }
        Ok((stream, info))
    }

    fn tune(
        &self,
        stream: &mut EngineStream,
        gain: f32,
        pitch: &RationalTime,
    ) -> Result<(), AudioError> {
        let backend_pitch = if stream.bypasses_pitch {
            1.0
        } else {
            pitch.to_f64() as f32
        };
        self.backend.set_pitch(stream.source_id, backend_pitch)?;
        self.backend
            .set_gain(stream.source_id, gain * self.config.master_volume)?;
        stream.source.on_pitch_change(pitch);
        Ok(())
    }

    /// Apply `pitch` to the current streams and move them to `offset`,
    /// leaving out the `skipped` ones. Every stream is tried; the first
    /// error is returned. The worker must be halted.
    fn retune(
        &mut self,
        pitch: &RationalTime,
        offset: &RationalTime,
        skipped: &BTreeSet<&str>,
    ) -> Result<(), AudioError> {
        let mut streams = mem::take(&mut self.streams);
        let mut first_error = None;
        for (name, stream) in &mut streams {
            if skipped.contains(name.as_str()) {
                continue;
            }
            let gain = self.infos.get(name).map_or(self.volume, |info| info.gain);
            let result = self
                .tune(stream, gain, pitch)
                .and_then(|()| stream.seek_to(offset, pitch));
            if let Err(e) = result {
                warn!("Stream {name:?} could not follow the update: {e}");
                first_error.get_or_insert(e);
            }
        }
        self.streams = streams;
        first_error.map_or(Ok(()), Err)
    }

    /// Remove a stream and its source. The worker must be halted.
    fn forget_stream(&mut self, name: &str) {
        let stream = self.streams.remove(name);
        if let Some(info) = self.infos.remove(name) {
            self.delete_source(info.source_id);
            debug!("Removed stream {name:?}");
        } else if let Some(stream) = stream {
            self.delete_source(stream.source_id);
        }
    }

    fn delete_source(&self, id: SourceId) {
        if let Err(e) = self.backend.delete_source(id) {
            warn!("Failed to delete audio source {id}: {e}");
        }
    }
}

impl Drop for SyncedAudioEngine {
    fn drop(&mut self) {
        self.halt();
        let names: Vec<String> = self.infos.keys().cloned().collect();
        for name in names {
            self.forget_stream(&name);
        }
        debug!("Audio engine closed");
    }
}
