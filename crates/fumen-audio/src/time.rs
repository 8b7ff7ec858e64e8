//! Conversions between exact seconds and interleaved sample counts.
//!
//! Sample positions are always whole frames (`frames * channels`) and may
//! be negative while a stream plays its lead-in.

use fumen_timing::RationalTime;

/// Pitch factors are kept to a thousandth.
pub const PITCH_RESOLUTION: u32 = 1000;

/// Nearest whole frame to `seconds`, in interleaved samples.
pub fn seconds_to_samples(seconds: &RationalTime, sample_rate: u32, channels: u16) -> i64 {
    let frames = (seconds * RationalTime::from(sample_rate))
        .round_to_i64()
        .unwrap_or(if seconds.is_negative() { i64::MIN } else { i64::MAX });
    frames.saturating_mul(i64::from(channels))
}

pub fn samples_to_seconds(samples: i64, sample_rate: u32, channels: u16) -> RationalTime {
    RationalTime::new(samples, i64::from(sample_rate) * i64::from(channels))
}

/// Pitch factor from a float, rounded to [`PITCH_RESOLUTION`]. `None` unless
/// the result is positive.
pub fn pitch_from_f64(pitch: f64) -> Option<RationalTime> {
    RationalTime::from_f64_approx(pitch, PITCH_RESOLUTION).filter(RationalTime::is_positive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_are_frame_aligned() {
        assert_eq!(seconds_to_samples(&RationalTime::new(1, 2), 44100, 2), 44100);
        // 1/3 s at 44100 Hz is 14700 frames.
        assert_eq!(seconds_to_samples(&RationalTime::new(1, 3), 44100, 2), 29400);
        // 1/9 s is 4900 frames.
        assert_eq!(seconds_to_samples(&RationalTime::new(1, 9), 44100, 1), 4900);
        assert_eq!(seconds_to_samples(&RationalTime::new(1, 100_000), 44100, 2), 0);
        assert_eq!(seconds_to_samples(&RationalTime::new(-1, 2), 48000, 2) % 2, 0);
    }

    #[test]
    fn samples_back_to_seconds() {
        assert_eq!(samples_to_seconds(88200, 44100, 2), RationalTime::one());
        assert_eq!(samples_to_seconds(-22050, 44100, 1), RationalTime::new(-1, 2));
    }

    #[test]
    fn pitch_rounding() {
        assert_eq!(pitch_from_f64(1.25), Some(RationalTime::new(5, 4)));
        assert_eq!(pitch_from_f64(0.3333), Some(RationalTime::new(333, 1000)));
        assert_eq!(pitch_from_f64(0.0), None);
        assert_eq!(pitch_from_f64(-1.0), None);
        assert_eq!(pitch_from_f64(f64::NAN), None);
    }
}
