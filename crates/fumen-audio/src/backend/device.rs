use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SampleFormat, SizedSample};
use log::{debug, info, warn};

use super::mixer::Mixer;
use crate::error::AudioError;

/// The device currently open, if any user still holds it.
static SHARED_DEVICE: Mutex<Weak<OutputDevice>> = Mutex::new(Weak::new());

/// The process-wide audio output.
///
/// The first [`OutputDevice::acquire`] opens the default cpal output stream;
/// it closes when the last handle is dropped. The stream lives on its own
/// thread since cpal streams cannot move between threads.
pub struct OutputDevice {
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
    channels: u16,
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OutputDevice {
    pub fn acquire() -> Result<Arc<OutputDevice>, AudioError> {
        let mut shared = SHARED_DEVICE.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(device) = shared.upgrade() {
            return Ok(device);
        }
        let device = Arc::new(Self::open()?);
        *shared = Arc::downgrade(&device);
        Ok(device)
    }

    fn open() -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let thread = thread::spawn(move || run_output(ready_tx, shutdown_rx));
        let opened = ready_rx.recv().map_err(|_| {
            AudioError::AudioBackendUnavailable("output thread exited during startup".to_string())
        });
        let (mixer, sample_rate, channels) = match opened.and_then(|result| result) {
            Ok(opened) => opened,
            Err(e) => {
                let _ = thread.join();
                return Err(e);
            }
        };
        info!("Audio output opened: {sample_rate} Hz, {channels} channels");
        Ok(Self {
            mixer,
            sample_rate,
            channels,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub(crate) fn mixer(&self) -> Arc<Mutex<Mixer>> {
        Arc::clone(&self.mixer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Drop for OutputDevice {
    fn drop(&mut self) {
        // Closing the channel wakes the output thread.
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Audio output thread panicked");
            }
        }
        debug!("Audio output closed");
    }
}

type Opened = (Arc<Mutex<Mixer>>, u32, u16);

fn run_output(ready: Sender<Result<Opened, AudioError>>, shutdown: Receiver<()>) {
    let stream = match build_stream() {
        Ok((stream, opened)) => {
            if let Err(e) = stream.play() {
                let _ = ready.send(Err(AudioError::AudioBackendUnavailable(e.to_string())));
                return;
            }
            let _ = ready.send(Ok(opened));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    // Blocks until every sender is gone.
    while shutdown.recv().is_ok() {}
    drop(stream);
}

fn build_stream() -> Result<(cpal::Stream, Opened), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| {
            AudioError::AudioBackendUnavailable("no output device available".to_string())
        })?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::AudioBackendUnavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate)));

    let stream = match sample_format {
        SampleFormat::F32 => build_typed::<f32>(&device, &config, Arc::clone(&mixer)),
        SampleFormat::I16 => build_typed::<i16>(&device, &config, Arc::clone(&mixer)),
        SampleFormat::U16 => build_typed::<u16>(&device, &config, Arc::clone(&mixer)),
        other => Err(AudioError::AudioBackendUnavailable(format!(
            "unsupported output sample format {other}"
        ))),
    }?;
    Ok((stream, (mixer, sample_rate, channels)))
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mixer: Arc<Mutex<Mixer>>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels);
    let mut scratch: Vec<f32> = Vec::new();
    device
        .build_output_stream(
            config,
            move |data: &mut [T], info: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                let timestamp = info.timestamp();
                let mut mixer = mixer.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(latency) = timestamp.playback.duration_since(&timestamp.callback) {
                    mixer.set_latency(latency);
                }
                mixer.render(&mut scratch, channels);
                drop(mixer);
                for (out, sample) in data.iter_mut().zip(&scratch) {
                    *out = T::from_sample(*sample);
                }
            },
            |err| warn!("Audio output stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::AudioBackendUnavailable(e.to_string()))
}
