//! Effect streams that play a short sample on chart events.
//!
//! They run at natural pitch whatever the engine's pitch is, so each one
//! converts its own sample clock to music time by multiplying by the pitch.

mod beat_ticks;
mod chord_claps;
mod clock;
mod note_claps;

pub use beat_ticks::BeatTicks;
pub use chord_claps::ChordClaps;
pub use clock::EffectClock;
pub use note_claps::NoteClaps;

use std::collections::BTreeMap;

use fumen_notes::NoteStore;
use fumen_timing::RationalTime;

/// Number of notes starting at each beat of `[low, high]`.
fn note_starts_between(
    notes: &NoteStore,
    low: &RationalTime,
    high: &RationalTime,
) -> BTreeMap<RationalTime, usize> {
    let mut counts = BTreeMap::new();
    notes.for_each_in(low, high, |note| {
        if note.time() >= low && note.time() <= high {
            *counts.entry(note.time().clone()).or_insert(0) += 1;
        }
    });
    counts
}
