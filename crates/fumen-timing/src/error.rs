use thiserror::Error;

use crate::rational::RationalTime;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimingError {
    #[error("More than one tempo event at beat {0}")]
    DuplicateTempoAtBeat(RationalTime),

    #[error("A timing map needs at least one tempo event")]
    EmptyTempoList,

    #[error("Tempo must be positive, got {bpm} BPM at beat {beat}")]
    NonPositiveBpm { beat: RationalTime, bpm: RationalTime },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRationalError {
    #[error("Empty rational literal")]
    Empty,

    #[error("Invalid integer in rational literal: {0:?}")]
    InvalidInteger(String),

    #[error("Rational literal has a zero denominator")]
    ZeroDenominator,
}
