use anyhow::{Context, Result};
use fumen_notes::{Note, NoteStore, Position};
use fumen_timing::{Anchor, RationalTime, TempoEvent, TimingMap};
use log::{debug, warn};

pub struct Chart {
    pub timing: TimingMap,
    pub notes: NoteStore,
}

impl Chart {
    /// Build the timing map and note store. Without tempo events the chart
    /// runs at 120 BPM. Notes that overlap an earlier note on the same
    /// button are skipped.
    pub fn build(tempo: &[TempoEvent], offset: &RationalTime, notes: &[Note]) -> Result<Self> {
        let events = if tempo.is_empty() {
            vec![TempoEvent::new(RationalTime::zero(), RationalTime::from(120))?]
        } else {
            tempo.to_vec()
        };
        let anchor = Anchor::new(RationalTime::zero(), offset.clone());
        let timing = TimingMap::new(events, anchor).context("Invalid tempo events")?;

        let mut store = NoteStore::new();
        for note in notes {
            let (existing, inserted) = store.insert(note.clone());
            if !inserted {
                warn!(
                    "Skipping note at beat {} on {}: it overlaps the note at beat {}",
                    note.time(),
                    existing.position(),
                    existing.time()
                );
            }
        }
        debug!("Chart has {} notes, {} tempo events", store.len(), timing.events().len());
        Ok(Self {
            timing,
            notes: store,
        })
    }
}

/// Parse `beat:bpm`, e.g. `16:180` or `3/2:90.5`.
pub fn parse_tempo(text: &str) -> Result<TempoEvent, String> {
    let (beat, bpm) = text
        .split_once(':')
        .ok_or_else(|| format!("expected beat:bpm, got {text:?}"))?;
    let beat = parse_beat(beat)?;
    let bpm = parse_number(bpm.trim())?;
    TempoEvent::new(beat, bpm).map_err(|e| e.to_string())
}

/// Parse a tap `beat:button`, buttons numbered 0 to 15 row by row.
pub fn parse_tap(text: &str) -> Result<Note, String> {
    let fields: Vec<&str> = text.split(':').collect();
    let [beat, button] = fields.as_slice() else {
        return Err(format!("expected beat:button, got {text:?}"));
    };
    Ok(Note::tap(parse_beat(beat)?, parse_button(button)?))
}

/// Parse a long note `beat:button:duration:tail`.
pub fn parse_long(text: &str) -> Result<Note, String> {
    let fields: Vec<&str> = text.split(':').collect();
    let [beat, button, duration, tail] = fields.as_slice() else {
        return Err(format!("expected beat:button:duration:tail, got {text:?}"));
    };
    Note::long(
        parse_beat(beat)?,
        parse_button(button)?,
        parse_beat(duration)?,
        parse_button(tail)?,
    )
    .map_err(|e| e.to_string())
}

fn parse_beat(text: &str) -> Result<RationalTime, String> {
    text.trim()
        .parse()
        .map_err(|e| format!("bad beat {text:?}: {e}"))
}

fn parse_button(text: &str) -> Result<Position, String> {
    let index: usize = text
        .trim()
        .parse()
        .map_err(|_| format!("bad button {text:?}"))?;
    Position::from_index(index).map_err(|e| e.to_string())
}

/// A rational (`"3/2"`) or a decimal (`"90.5"`).
fn parse_number(text: &str) -> Result<RationalTime, String> {
    if let Ok(value) = text.parse::<RationalTime>() {
        return Ok(value);
    }
    let value: f64 = text.parse().map_err(|_| format!("bad number {text:?}"))?;
    RationalTime::from_f64_exact(value).ok_or_else(|| format!("bad number {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tempo() {
        let event = parse_tempo("16:180").unwrap();
        assert_eq!(event.beat(), &RationalTime::from(16));
        assert_eq!(event.bpm(), &RationalTime::from(180));

        let event = parse_tempo("3/2:90.5").unwrap();
        assert_eq!(event.beat(), &RationalTime::new(3, 2));
        assert_eq!(event.bpm(), &RationalTime::new(181, 2));

        assert!(parse_tempo("16").is_err());
        assert!(parse_tempo("0:0").is_err());
        assert!(parse_tempo("x:120").is_err());
    }

    #[test]
    fn test_parse_notes() {
        let tap = parse_tap("3/4:5").unwrap();
        assert_eq!(tap, Note::tap(RationalTime::new(3, 4), Position::new(1, 1).unwrap()));
        assert!(parse_tap("1:16").is_err());
        assert!(parse_tap("1").is_err());

        let long = parse_long("2:0:1/2:3").unwrap();
        assert!(long.is_long());
        assert_eq!(long.end(), RationalTime::new(5, 2));
        // The tail must share a row or a column with the note.
        assert!(parse_long("2:0:1:5").is_err());
        assert!(parse_long("2:0:1").is_err());
    }

    #[test]
    fn test_build_chart() {
        let tempo = [parse_tempo("0:120").unwrap(), parse_tempo("4:240").unwrap()];
        let notes = [
            parse_tap("0:0").unwrap(),
            parse_long("1/2:5:2:7").unwrap(),
            parse_tap("1:5").unwrap(),
        ];
        let chart = Chart::build(&tempo, &RationalTime::new(-1, 2), &notes).unwrap();
        assert_eq!(chart.timing.seconds_at(&RationalTime::zero()), RationalTime::new(-1, 2));
        assert_eq!(chart.timing.seconds_at(&RationalTime::from(8)), RationalTime::new(5, 2));
        // The tap at beat 1 overlaps the long note on the same button.
        assert_eq!(chart.notes.len(), 2);
        assert!(chart.notes.last().unwrap().is_long());
    }

    #[test]
    fn test_default_tempo() {
        let chart = Chart::build(&[], &RationalTime::zero(), &[]).unwrap();
        assert_eq!(chart.timing, TimingMap::default());
        assert!(chart.notes.is_empty());
    }
}
