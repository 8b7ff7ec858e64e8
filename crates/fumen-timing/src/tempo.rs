use serde::{Deserialize, Serialize};

use crate::error::TimingError;
use crate::rational::RationalTime;

/// A tempo change: from `beat` onward the chart runs at `bpm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTempoEvent")]
pub struct TempoEvent {
    beat: RationalTime,
    bpm: RationalTime,
}

#[derive(Deserialize)]
struct RawTempoEvent {
    beat: RationalTime,
    bpm: RationalTime,
}

impl TryFrom<RawTempoEvent> for TempoEvent {
    type Error = TimingError;

    fn try_from(raw: RawTempoEvent) -> Result<Self, Self::Error> {
        TempoEvent::new(raw.beat, raw.bpm)
    }
}

impl TempoEvent {
    pub fn new(beat: RationalTime, bpm: RationalTime) -> Result<Self, TimingError> {
        if !bpm.is_positive() {
            return Err(TimingError::NonPositiveBpm { beat, bpm });
        }
        Ok(Self { beat, bpm })
    }

    pub fn beat(&self) -> &RationalTime {
        &self.beat
    }

    pub fn bpm(&self) -> &RationalTime {
        &self.bpm
    }

    /// Seconds taken by one beat at this tempo.
    pub fn seconds_per_beat(&self) -> RationalTime {
        RationalTime::from(60) / &self.bpm
    }
}

/// A point where the chart's beat and the song's clock are pinned together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Anchor {
    pub beat: RationalTime,
    pub seconds: RationalTime,
}

impl Anchor {
    pub fn new(beat: RationalTime, seconds: RationalTime) -> Self {
        Self { beat, seconds }
    }
}

/// A tempo event together with the second at which it starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimedTempoEvent {
    pub beat: RationalTime,
    pub bpm: RationalTime,
    pub seconds: RationalTime,
}

impl TimedTempoEvent {
    pub fn to_event(&self) -> TempoEvent {
        TempoEvent {
            beat: self.beat.clone(),
            bpm: self.bpm.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_positive_bpm() {
        let zero = TempoEvent::new(RationalTime::zero(), RationalTime::zero());
        assert!(matches!(zero, Err(TimingError::NonPositiveBpm { .. })));
        let negative = TempoEvent::new(RationalTime::from(4), RationalTime::from(-120));
        assert_eq!(
            negative,
            Err(TimingError::NonPositiveBpm {
                beat: RationalTime::from(4),
                bpm: RationalTime::from(-120),
            })
        );
    }

    #[test]
    fn seconds_per_beat() {
        let event = TempoEvent::new(RationalTime::zero(), RationalTime::from(180)).unwrap();
        assert_eq!(event.seconds_per_beat(), RationalTime::new(1, 3));
    }

    #[test]
    fn deserialization_validates_bpm() {
        let ok: TempoEvent = serde_json::from_str(r#"{"beat": "1/2", "bpm": 150}"#).unwrap();
        assert_eq!(ok.beat(), &RationalTime::new(1, 2));
        let bad = serde_json::from_str::<TempoEvent>(r#"{"beat": 0, "bpm": "-1"}"#);
        assert!(bad.is_err());
    }
}
