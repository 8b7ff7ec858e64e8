//! Engine behaviour against a detached mixer, pumped by hand.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use fumen_audio::{
    AudioConfig, AudioError, BeatTicks, MemoryDecoder, MixerBackend, MusicStream, NewStream,
    SoundBuffer, Status, SyncedAudioEngine,
};
use fumen_timing::{RationalTime, TimingMap};

const RATE: u32 = 100;

fn music(frames: usize) -> MusicStream {
    let sound = SoundBuffer::from_samples(vec![1000; frames], 1, RATE).unwrap();
    MusicStream::from_decoder(Box::new(MemoryDecoder::new(sound)), &RationalTime::new(1, 10))
}

fn setup() -> (Arc<MixerBackend>, SyncedAudioEngine) {
    let backend = Arc::new(MixerBackend::detached(RATE));
    let config = AudioConfig {
        processing_interval_ms: 1,
        ..AudioConfig::default()
    };
    let engine = SyncedAudioEngine::new(backend.clone(), config);
    (backend, engine)
}

/// Pump a few frames at a time until `done` holds or about two seconds pass.
fn pump_until(backend: &MixerBackend, mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..2000 {
        if done() {
            return true;
        }
        backend.pump(2);
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_play_pause_play_never_goes_back() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(5000))).unwrap();
    engine.play().unwrap();
    assert_eq!(engine.status(), Status::Playing);

    let mut last = engine.playing_offset();
    let mut check = |engine: &SyncedAudioEngine| {
        let now = engine.playing_offset();
        assert!(now >= last, "offset went from {last} back to {now}");
        last = now;
    };
    for _ in 0..50 {
        backend.pump(3);
        check(&engine);
        thread::sleep(Duration::from_millis(1));
    }
    engine.pause().unwrap();
    assert_eq!(engine.status(), Status::Paused);
    let paused_at = engine.playing_offset();
    for _ in 0..10 {
        backend.pump(10);
        check(&engine);
    }
    assert_eq!(engine.playing_offset(), paused_at);

    engine.play().unwrap();
    assert_eq!(engine.status(), Status::Playing);
    for _ in 0..50 {
        backend.pump(3);
        check(&engine);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(pump_until(&backend, || engine.playing_offset() > paused_at));
}

#[test]
fn test_seek_while_playing_keeps_playing() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.play().unwrap();
    backend.pump(20);

    engine.set_playing_offset(&RationalTime::from(5)).unwrap();
    assert_eq!(engine.status(), Status::Playing);
    assert_eq!(engine.playing_offset(), RationalTime::from(5));
    assert!(pump_until(&backend, || engine.playing_offset() > RationalTime::from(5)));
}

#[test]
fn test_seek_while_paused_stays_paused() {
    let (_backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.play().unwrap();
    engine.pause().unwrap();
    engine.set_playing_offset(&RationalTime::new(7, 2)).unwrap();
    assert_eq!(engine.status(), Status::Paused);
    assert_eq!(engine.playing_offset(), RationalTime::new(7, 2));
}

#[test]
fn test_stop_rewinds() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.play().unwrap();
    assert!(pump_until(&backend, || engine.playing_offset() > RationalTime::zero()));
    engine.stop().unwrap();
    assert_eq!(engine.status(), Status::Stopped);
    assert_eq!(engine.playing_offset(), RationalTime::zero());
}

#[test]
fn test_song_end_stops_at_its_length() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(30))).unwrap();
    engine.play().unwrap();
    assert!(pump_until(&backend, || engine.status() == Status::Stopped));
    assert_eq!(engine.playing_offset(), RationalTime::new(3, 10));
    assert!(engine.take_error().is_none());

    // Playing again starts over.
    engine.play().unwrap();
    assert_eq!(engine.status(), Status::Playing);
    assert_eq!(engine.playing_offset(), RationalTime::zero());
}

#[test]
fn test_looping_keeps_the_song_going() {
    let (backend, mut engine) = setup();
    engine.set_looping(true);
    assert!(engine.is_looping());
    engine.add_stream("music", NewStream::new(music(20))).unwrap();
    engine.play().unwrap();
    for _ in 0..100 {
        backend.pump(3);
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(engine.status(), Status::Playing);
    assert!(engine.playing_offset() < RationalTime::one());

    engine.set_looping(false);
    assert!(pump_until(&backend, || engine.status() == Status::Stopped));
}

fn ticks(buffer_length: RationalTime) -> BeatTicks {
    let tick = SoundBuffer::from_samples(vec![1000], 1, RATE).unwrap();
    BeatTicks::new(tick, Arc::new(TimingMap::default()), &buffer_length)
}

/// Wait for the worker without moving the output.
fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    done()
}

#[test]
fn test_looping_wraps_every_stream_with_the_song() {
    // The clock is the first stream by name; both orders must agree.
    for name in ["a-ticks", "z-ticks"] {
        let (backend, mut engine) = setup();
        engine.set_looping(true);
        engine.add_stream("music", NewStream::new(music(20))).unwrap();
        engine
            .add_stream(name, NewStream::bypassing_pitch(ticks(RationalTime::new(1, 10))))
            .unwrap();
        engine.play().unwrap();
        for _ in 0..150 {
            backend.pump(2);
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(engine.status(), Status::Playing);
        let offset = engine.playing_offset();
        assert!(offset <= RationalTime::new(1, 2), "clock {name} at {offset}");
    }
}

#[test]
fn test_starved_stream_rejoins_the_others() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(5000))).unwrap();
    // One second per buffer: the ticks outlast the music's queue.
    engine
        .add_stream("ticks", NewStream::bypassing_pitch(ticks(RationalTime::one())))
        .unwrap();
    engine.play().unwrap();
    assert!(pump_until(&backend, || engine.playing_offset() > RationalTime::zero()));

    let before = engine.playing_offset();
    backend.pump(50);
    let expected = before + RationalTime::new(1, 2);
    assert!(
        wait_until(|| engine.playing_offset() == expected),
        "music at {}, expected {expected}",
        engine.playing_offset()
    );
    assert_eq!(engine.status(), Status::Playing);
}

#[test]
fn test_pitch_change_keeps_position() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.play().unwrap();
    assert!(pump_until(&backend, || engine.playing_offset() > RationalTime::zero()));
    engine.pause().unwrap();
    let before = engine.playing_offset();

    engine.set_pitch(RationalTime::new(3, 2)).unwrap();
    assert_eq!(engine.pitch(), &RationalTime::new(3, 2));
    assert_eq!(engine.status(), Status::Paused);
    assert_eq!(engine.playing_offset(), before);
}

#[test]
fn test_bypassing_clock_follows_pitch() {
    let (_backend, mut engine) = setup();
    let ticks = ticks(RationalTime::new(1, 10));
    engine.add_stream("a-ticks", NewStream::bypassing_pitch(ticks)).unwrap();
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.set_pitch(RationalTime::from(2)).unwrap();
    engine.set_playing_offset(&RationalTime::from(3)).unwrap();
    assert_eq!(engine.playing_offset(), RationalTime::from(3));
}

#[test]
fn test_streams_can_change_while_playing() {
    let (backend, mut engine) = setup();
    engine.add_stream("music", NewStream::new(music(5000))).unwrap();
    engine.play().unwrap();
    assert!(pump_until(&backend, || engine.playing_offset() > RationalTime::zero()));

    let ticks = ticks(RationalTime::new(1, 10));
    engine.add_stream("ticks", NewStream::bypassing_pitch(ticks)).unwrap();
    assert_eq!(engine.status(), Status::Playing);
    assert_eq!(engine.stream_names().collect::<Vec<_>>(), vec!["music", "ticks"]);

    engine.remove_stream("ticks").unwrap();
    assert_eq!(engine.status(), Status::Playing);
    assert!(!engine.contains_stream("ticks"));
    assert!(matches!(
        engine.set_stream_volume("ticks", 0.5),
        Err(AudioError::UnknownStream(_))
    ));
    engine.set_volume(0.5).unwrap();
}

#[test]
fn test_latency_is_compensated_while_playing() {
    let (backend, mut engine) = setup();
    backend.set_latency(Duration::from_millis(100));
    engine.add_stream("music", NewStream::new(music(2000))).unwrap();
    engine.set_playing_offset(&RationalTime::from(2)).unwrap();
    assert_eq!(engine.precise_playing_offset(), RationalTime::from(2));

    engine.play().unwrap();
    engine.pause().unwrap();
    let offset = engine.playing_offset();
    assert_eq!(engine.precise_playing_offset(), offset);
    engine.play().unwrap();
    let precise = engine.precise_playing_offset();
    let offset = engine.playing_offset();
    assert!(precise < offset);
    assert!(offset - precise <= RationalTime::new(1, 10));
}
