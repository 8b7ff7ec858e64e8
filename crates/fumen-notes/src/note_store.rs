use std::collections::BTreeSet;
use std::fmt;

use fumen_timing::{RationalTime, TimingMap};
use log::debug;

use crate::interval_tree::IntervalTree;
use crate::note::Note;

/// The notes of one chart, indexed by their time interval in beats.
///
/// `insert` never lets two notes on the same button overlap in time;
/// `overwriting_insert` makes room by removing the ones in the way.
#[derive(Clone, Default)]
pub struct NoteStore {
    tree: IntervalTree<RationalTime, Note>,
}

impl NoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Notes by ascending start, then end.
    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.tree.iter().map(|(_, _, note)| note)
    }

    pub fn first(&self) -> Option<&Note> {
        self.tree.first().map(|(_, _, note)| note)
    }

    pub fn last(&self) -> Option<&Note> {
        self.tree.last().map(|(_, _, note)| note)
    }

    /// Start of the first note and the latest end of any note.
    pub fn time_bounds(&self) -> Option<(RationalTime, RationalTime)> {
        let first = self.first()?.time().clone();
        let last = self.tree.max_end()?.clone();
        Some((first, last))
    }

    /// Inserts `note` unless an overlapping note on the same button is
    /// already stored. Returns the stored note (the first conflicting one on
    /// failure) and whether `note` went in.
    pub fn insert(&mut self, note: Note) -> (Note, bool) {
        let (start, end) = note.time_bounds();
        let mut conflict = None;
        self.tree.for_each_overlapping(&start, &end, |_, _, _, other| {
            if conflict.is_none() && other.position() == note.position() {
                conflict = Some(other.clone());
            }
        });
        if let Some(conflict) = conflict {
            return (conflict, false);
        }
        self.tree.insert(start, end, note.clone());
        (note, true)
    }

    /// Inserts `note`, first removing every overlapping note on the same
    /// button. Returns the removed notes.
    pub fn overwriting_insert(&mut self, note: Note) -> BTreeSet<Note> {
        let (start, end) = note.time_bounds();
        let removed = self.matching_in(&start, &end, |other| other.position() == note.position());
        for other in &removed {
            self.erase(other);
        }
        if !removed.is_empty() {
            debug!(
                "Inserting note at beat {} replaced {} note(s)",
                note.time(),
                removed.len()
            );
        }
        self.tree.insert(start, end, note);
        removed
    }

    /// Removes the note equal to `note`. Returns whether one was stored.
    pub fn erase(&mut self, note: &Note) -> bool {
        let (start, end) = note.time_bounds();
        match self.tree.find(&start, &end, |other| other == note) {
            Some(id) => self.tree.remove(id).is_some(),
            None => false,
        }
    }

    pub fn find(&self, note: &Note) -> Option<&Note> {
        let (start, end) = note.time_bounds();
        let id = self.tree.find(&start, &end, |other| other == note)?;
        self.tree.get(id).map(|(_, _, note)| note)
    }

    pub fn contains(&self, note: &Note) -> bool {
        self.find(note).is_some()
    }

    /// Calls `f` on every note whose interval meets the closed range
    /// `[start, end]`, in store order.
    pub fn for_each_in(&self, start: &RationalTime, end: &RationalTime, mut f: impl FnMut(&Note)) {
        self.tree
            .for_each_overlapping(start, end, |_, _, _, note| f(note));
    }

    pub fn between(&self, start: &RationalTime, end: &RationalTime) -> NoteStore {
        let mut selection = NoteStore::new();
        self.for_each_in(start, end, |note| {
            let (s, e) = note.time_bounds();
            selection.tree.insert(s, e, note.clone());
        });
        selection
    }

    pub fn count_between(&self, start: &RationalTime, end: &RationalTime) -> usize {
        let mut count = 0;
        self.for_each_in(start, end, |_| count += 1);
        count
    }

    /// True if another stored note, on any button, starts within `threshold`
    /// beats of `note`'s start.
    pub fn is_colliding(&self, note: &Note, threshold: &RationalTime) -> bool {
        let low = note.time() - threshold;
        let high = note.time() + threshold;
        let mut colliding = false;
        self.for_each_in(&low, &high, |other| {
            if other != note && other.time() >= &low && other.time() <= &high {
                colliding = true;
            }
        });
        colliding
    }

    /// True if another note on the same button starts or ends less than
    /// `zone` seconds before `note` starts or after it ends.
    pub fn is_colliding_on_button(
        &self,
        note: &Note,
        timing: &TimingMap,
        zone: &RationalTime,
    ) -> bool {
        let low = timing.beat_at(&(timing.seconds_at(note.time()) - zone));
        let high = timing.beat_at(&(timing.seconds_at(&note.end()) + zone));
        let mut colliding = false;
        self.for_each_in(&low, &high, |other| {
            if other != note && other.position() == note.position() {
                colliding = true;
            }
        });
        colliding
    }

    /// Note counts over `section_count` equal slices of `song_length`
    /// seconds. Notes outside the song land in the nearest slice.
    pub fn density(
        &self,
        timing: &TimingMap,
        section_count: usize,
        song_length: &RationalTime,
    ) -> Vec<usize> {
        let mut sections = vec![0; section_count];
        let Some(last_section) = section_count.checked_sub(1) else {
            return sections;
        };
        for note in self.iter() {
            let index = if song_length.is_positive() {
                let position = timing.seconds_at(note.time()) / song_length
                    * RationalTime::from(section_count);
                position
                    .floor_to_i64()
                    .map_or(last_section, |i| usize::try_from(i).unwrap_or(0))
            } else {
                0
            };
            sections[index.min(last_section)] += 1;
        }
        sections
    }

    /// Inserts every note of `other`, overwriting conflicting notes here.
    /// Returns the notes that were replaced.
    pub fn merge(&mut self, other: NoteStore) -> BTreeSet<Note> {
        let mut removed = BTreeSet::new();
        for (_, _, note) in other.tree.iter() {
            removed.append(&mut self.overwriting_insert(note.clone()));
        }
        removed
    }

    fn matching_in(
        &self,
        start: &RationalTime,
        end: &RationalTime,
        mut matches: impl FnMut(&Note) -> bool,
    ) -> BTreeSet<Note> {
        let mut found = BTreeSet::new();
        self.for_each_in(start, end, |note| {
            if matches(note) {
                found.insert(note.clone());
            }
        });
        found
    }
}

impl PartialEq for NoteStore {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for NoteStore {}

impl fmt::Debug for NoteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl FromIterator<Note> for NoteStore {
    fn from_iter<I: IntoIterator<Item = Note>>(iter: I) -> Self {
        let mut store = NoteStore::new();
        store.extend(iter);
        store
    }
}

impl Extend<Note> for NoteStore {
    /// Conflicting notes are skipped, as with [`NoteStore::insert`].
    fn extend<I: IntoIterator<Item = Note>>(&mut self, iter: I) {
        for note in iter {
            self.insert(note);
        }
    }
}
