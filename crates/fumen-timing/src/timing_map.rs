use log::debug;

use crate::error::TimingError;
use crate::rational::RationalTime;
use crate::tempo::{Anchor, TempoEvent, TimedTempoEvent};

/// Piecewise-linear mapping between beats and seconds.
///
/// Built once from a tempo list and an anchor; edits produce a new map.
/// Events are kept in beat order, and since seconds grow strictly with
/// beats, the same vector is also sorted by seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingMap {
    events: Vec<TimedTempoEvent>,
    anchor: Anchor,
}

impl TimingMap {
    pub fn new(
        events: impl IntoIterator<Item = TempoEvent>,
        anchor: Anchor,
    ) -> Result<Self, TimingError> {
        let mut events: Vec<TempoEvent> = events.into_iter().collect();
        if events.is_empty() {
            return Err(TimingError::EmptyTempoList);
        }
        events.sort_by(|a, b| a.beat().cmp(b.beat()));
        if let Some(pair) = events.windows(2).find(|pair| pair[0].beat() == pair[1].beat()) {
            return Err(TimingError::DuplicateTempoAtBeat(pair[0].beat().clone()));
        }

        let mut timed = Vec::with_capacity(events.len());
        let mut seconds = RationalTime::zero();
        let mut previous: Option<&TempoEvent> = None;
        for event in &events {
            if let Some(prev) = previous {
                seconds += (event.beat() - prev.beat()) * prev.seconds_per_beat();
            }
            timed.push(TimedTempoEvent {
                beat: event.beat().clone(),
                bpm: event.bpm().clone(),
                seconds: seconds.clone(),
            });
            previous = Some(event);
        }

        let mut map = Self { events: timed, anchor };
        let shift = &map.anchor.seconds - map.seconds_at(&map.anchor.beat);
        for event in &mut map.events {
            event.seconds += &shift;
        }
        debug!(
            "Built timing map: {} tempo events, anchor beat {} at {}s",
            map.events.len(),
            map.anchor.beat,
            map.anchor.seconds
        );
        Ok(map)
    }

    /// Single tempo from beat 0, with beat 0 at second 0.
    pub fn constant(bpm: RationalTime) -> Result<Self, TimingError> {
        let event = TempoEvent::new(RationalTime::zero(), bpm)?;
        Self::new([event], Anchor::default())
    }

    fn event_index_for_beat(&self, beat: &RationalTime) -> usize {
        self.events
            .partition_point(|e| &e.beat <= beat)
            .saturating_sub(1)
    }

    fn event_index_for_seconds(&self, seconds: &RationalTime) -> usize {
        self.events
            .partition_point(|e| &e.seconds <= seconds)
            .saturating_sub(1)
    }

    /// Seconds at `beat`. Before the first event the first tempo is
    /// extrapolated backward.
    pub fn seconds_at(&self, beat: &RationalTime) -> RationalTime {
        let event = &self.events[self.event_index_for_beat(beat)];
        &event.seconds + (beat - &event.beat) * RationalTime::from(60) / &event.bpm
    }

    /// Beat at `seconds`, the exact inverse of [`TimingMap::seconds_at`].
    pub fn beat_at(&self, seconds: &RationalTime) -> RationalTime {
        let event = &self.events[self.event_index_for_seconds(seconds)];
        &event.beat + (seconds - &event.seconds) * &event.bpm / RationalTime::from(60)
    }

    pub fn time_between(&self, from: &RationalTime, to: &RationalTime) -> RationalTime {
        self.seconds_at(to) - self.seconds_at(from)
    }

    /// Tempo in effect at `beat`.
    pub fn bpm_at(&self, beat: &RationalTime) -> &RationalTime {
        &self.events[self.event_index_for_beat(beat)].bpm
    }

    /// Tempo in effect at `seconds`.
    pub fn bpm_at_seconds(&self, seconds: &RationalTime) -> &RationalTime {
        &self.events[self.event_index_for_seconds(seconds)].bpm
    }

    pub fn events(&self) -> &[TimedTempoEvent] {
        &self.events
    }

    /// Events whose beat lies in `[first, last]`, in beat order.
    pub fn events_between(&self, first: &RationalTime, last: &RationalTime) -> &[TimedTempoEvent] {
        let start = self.events.partition_point(|e| &e.beat < first);
        let end = self.events.partition_point(|e| &e.beat <= last).max(start);
        &self.events[start..end]
    }

    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    pub fn with_anchor(&self, anchor: Anchor) -> Self {
        // Relative spacing is unchanged, only the shift moves.
        let shift = &anchor.seconds - self.seconds_at(&anchor.beat);
        let events = self
            .events
            .iter()
            .map(|e| TimedTempoEvent {
                beat: e.beat.clone(),
                bpm: e.bpm.clone(),
                seconds: &e.seconds + &shift,
            })
            .collect();
        Self { events, anchor }
    }

    /// New map with `event` added, replacing any event at the same beat.
    pub fn with_event(&self, event: TempoEvent) -> Result<Self, TimingError> {
        let beat = event.beat().clone();
        let events = self
            .events
            .iter()
            .filter(|e| e.beat != beat)
            .map(TimedTempoEvent::to_event)
            .chain(std::iter::once(event));
        Self::new(events, self.anchor.clone())
    }

    /// New map without the event at `beat`. The last event cannot be removed.
    pub fn without_event(&self, beat: &RationalTime) -> Result<Self, TimingError> {
        let events: Vec<TempoEvent> = self
            .events
            .iter()
            .filter(|e| &e.beat != beat)
            .map(TimedTempoEvent::to_event)
            .collect();
        if events.is_empty() {
            return Err(TimingError::EmptyTempoList);
        }
        Self::new(events, self.anchor.clone())
    }
}

impl Default for TimingMap {
    /// 120 BPM from beat 0, beat 0 at second 0.
    fn default() -> Self {
        let event = TimedTempoEvent {
            beat: RationalTime::zero(),
            bpm: RationalTime::from(120),
            seconds: RationalTime::zero(),
        };
        Self {
            events: vec![event],
            anchor: Anchor::default(),
        }
    }
}
