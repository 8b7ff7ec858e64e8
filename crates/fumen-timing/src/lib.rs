//! Exact beat/seconds conversion for charts with tempo changes.
//!
//! Every quantity is a [`RationalTime`], so converting a beat to seconds and
//! back never drifts.

pub mod error;
pub mod rational;
pub mod tempo;
pub mod timing_map;

pub use error::{ParseRationalError, TimingError};
pub use rational::RationalTime;
pub use tempo::{Anchor, TempoEvent, TimedTempoEvent};
pub use timing_map::TimingMap;
