//! Synced playback of a song and its chart effects.
//!
//! [`SyncedAudioEngine`] drives several [`StreamSource`]s in lockstep on an
//! [`AudioBackend`]: the song ([`MusicStream`]) and the effect streams
//! (claps and beat ticks) that follow the chart at natural pitch.

pub mod backend;
pub mod config;
pub mod decoder;
pub mod effects;
pub mod engine;
pub mod error;
pub mod music;
pub mod scheduler;
pub mod sound_buffer;
pub mod stream;
pub mod time;

pub use backend::{AudioBackend, AudioBuffer, MixerBackend, OutputDevice, SourceId, SourceState};
pub use config::AudioConfig;
pub use decoder::{MemoryDecoder, SampleDecoder, SymphoniaDecoder};
pub use effects::{BeatTicks, ChordClaps, NoteClaps};
pub use engine::{NewStream, Status, SyncedAudioEngine};
pub use error::AudioError;
pub use music::MusicStream;
pub use scheduler::{Slice, compute_slice, copy_samples_at_points};
pub use sound_buffer::SoundBuffer;
pub use stream::{Chunk, StreamSource};
