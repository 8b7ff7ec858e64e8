use fumen_timing::RationalTime;

use crate::error::NoteError;
use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TapNote {
    time: RationalTime,
    position: Position,
}

impl TapNote {
    pub fn new(time: RationalTime, position: Position) -> Self {
        Self { time, position }
    }

    pub fn time(&self) -> &RationalTime {
        &self.time
    }

    pub fn position(&self) -> Position {
        self.position
    }
}

/// A held note. The tail starts at `tail_tip` and slides toward `position`,
/// so the tip always sits on the same row or column as the note.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LongNote {
    time: RationalTime,
    position: Position,
    duration: RationalTime,
    tail_tip: Position,
}

impl LongNote {
    pub fn new(
        time: RationalTime,
        position: Position,
        duration: RationalTime,
        tail_tip: Position,
    ) -> Result<Self, NoteError> {
        if duration.is_negative() {
            return Err(NoteError::InvalidLongNoteGeometry(format!(
                "negative duration {duration}"
            )));
        }
        if tail_tip == position {
            return Err(NoteError::InvalidLongNoteGeometry(format!(
                "tail tip {tail_tip} is on the note itself"
            )));
        }
        let same_column = tail_tip.x() == position.x();
        let same_row = tail_tip.y() == position.y();
        if !(same_column ^ same_row) {
            return Err(NoteError::InvalidLongNoteGeometry(format!(
                "tail tip {tail_tip} is not aligned with {position}"
            )));
        }
        Ok(Self {
            time,
            position,
            duration,
            tail_tip,
        })
    }

    pub fn time(&self) -> &RationalTime {
        &self.time
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn duration(&self) -> &RationalTime {
        &self.duration
    }

    pub fn tail_tip(&self) -> Position {
        self.tail_tip
    }

    pub fn end(&self) -> RationalTime {
        &self.time + &self.duration
    }

    /// Number of buttons between the tip and the note.
    pub fn tail_length(&self) -> usize {
        self.tail_tip.x().abs_diff(self.position.x())
            + self.tail_tip.y().abs_diff(self.position.y())
    }

    /// Direction of the tip seen from the note, in degrees clockwise from up.
    pub fn tail_angle(&self) -> u16 {
        if self.tail_tip.x() == self.position.x() {
            if self.tail_tip.y() < self.position.y() { 0 } else { 180 }
        } else if self.tail_tip.x() > self.position.x() {
            90
        } else {
            270
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Note {
    Tap(TapNote),
    Long(LongNote),
}

impl Note {
    pub fn tap(time: RationalTime, position: Position) -> Self {
        Note::Tap(TapNote::new(time, position))
    }

    pub fn long(
        time: RationalTime,
        position: Position,
        duration: RationalTime,
        tail_tip: Position,
    ) -> Result<Self, NoteError> {
        LongNote::new(time, position, duration, tail_tip).map(Note::Long)
    }

    pub fn time(&self) -> &RationalTime {
        match self {
            Note::Tap(tap) => tap.time(),
            Note::Long(long) => long.time(),
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Note::Tap(tap) => tap.position(),
            Note::Long(long) => long.position(),
        }
    }

    pub fn duration(&self) -> RationalTime {
        match self {
            Note::Tap(_) => RationalTime::zero(),
            Note::Long(long) => long.duration().clone(),
        }
    }

    pub fn end(&self) -> RationalTime {
        match self {
            Note::Tap(tap) => tap.time().clone(),
            Note::Long(long) => long.end(),
        }
    }

    pub fn time_bounds(&self) -> (RationalTime, RationalTime) {
        (self.time().clone(), self.end())
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Note::Long(_))
    }
}

impl From<TapNote> for Note {
    fn from(tap: TapNote) -> Self {
        Note::Tap(tap)
    }
}

impl From<LongNote> for Note {
    fn from(long: LongNote) -> Self {
        Note::Long(long)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(x: usize, y: usize) -> Position {
        Position::new(x, y).unwrap()
    }

    #[test]
    fn long_note_geometry_is_validated() {
        let t = RationalTime::from(1);
        let d = RationalTime::from(2);
        assert!(LongNote::new(t.clone(), pos(1, 1), d.clone(), pos(1, 3)).is_ok());
        assert!(LongNote::new(t.clone(), pos(1, 1), RationalTime::zero(), pos(0, 1)).is_ok());
        for (duration, tip) in [
            (RationalTime::from(-1), pos(1, 3)),
            (d.clone(), pos(1, 1)),
            (d.clone(), pos(2, 2)),
        ] {
            assert!(matches!(
                LongNote::new(t.clone(), pos(1, 1), duration, tip),
                Err(NoteError::InvalidLongNoteGeometry(_))
            ));
        }
    }

    #[test]
    fn tail_length_and_angle() {
        let cases = [
            (pos(1, 0), 2, 0),
            (pos(3, 2), 2, 90),
            (pos(1, 3), 1, 180),
            (pos(0, 2), 1, 270),
        ];
        for (tip, length, angle) in cases {
            let note =
                LongNote::new(RationalTime::zero(), pos(1, 2), RationalTime::one(), tip).unwrap();
            assert_eq!(note.tail_length(), length, "tip {tip}");
            assert_eq!(note.tail_angle(), angle, "tip {tip}");
        }
    }

    #[test]
    fn bounds() {
        let tap = Note::tap(RationalTime::new(1, 2), pos(0, 0));
        assert_eq!(tap.time_bounds(), (RationalTime::new(1, 2), RationalTime::new(1, 2)));
        assert_eq!(tap.duration(), RationalTime::zero());
        assert!(!tap.is_long());

        let long =
            Note::long(RationalTime::new(1, 2), pos(0, 0), RationalTime::from(3), pos(0, 3))
                .unwrap();
        assert_eq!(long.end(), RationalTime::new(7, 2));
        assert!(long.is_long());
    }
}
