//! Placement of one-shot samples (claps, ticks) into output buffers.
//!
//! All positions are interleaved sample indices on the stream's own
//! timeline. A trigger keeps playing across buffers until its sample runs
//! out or the next trigger starts.

use std::collections::BTreeSet;

use crate::sound_buffer::SoundBuffer;

/// Part of a trigger's sample that lands in the current buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slice {
    pub start_in_sample: i64,
    pub size: i64,
    pub start_in_buffer: i64,
    pub ends_in_this_buffer: bool,
}

/// Slice of a trigger `[trigger_start, trigger_start + trigger_len)`, cut
/// short at `next_trigger_start`, that overlaps the buffer
/// `[buffer_start, buffer_start + buffer_size)`.
pub fn compute_slice(
    buffer_start: i64,
    buffer_size: i64,
    trigger_start: i64,
    trigger_len: i64,
    next_trigger_start: Option<i64>,
) -> Option<Slice> {
    let buffer_end = buffer_start + buffer_size;
    let trigger_end = trigger_start + trigger_len;
    let deoverlapped_end = next_trigger_start.map_or(trigger_end, |next| next.min(trigger_end));
    let slice_start = trigger_start.max(buffer_start);
    let slice_end = deoverlapped_end.min(buffer_end);
    let size = slice_end - slice_start;
    if deoverlapped_end <= buffer_start || trigger_start >= buffer_end || size <= 0 {
        return None;
    }
    Some(Slice {
        start_in_sample: slice_start - trigger_start,
        size,
        start_in_buffer: slice_start - buffer_start,
        ends_in_this_buffer: deoverlapped_end <= buffer_end,
    })
}

/// Silence `output`, then copy `sample` at every tracked trigger. Triggers
/// that finish in this buffer, or no longer reach it, stop being tracked.
pub fn copy_samples_at_points(
    sample: &SoundBuffer,
    output: &mut [i16],
    triggers: &mut BTreeSet<i64>,
    buffer_start: i64,
) {
    output.fill(0);
    let points: Vec<i64> = triggers.iter().copied().collect();
    let source = sample.samples();
    for (i, &start) in points.iter().enumerate() {
        let next = points.get(i + 1).copied();
        let slice = compute_slice(
            buffer_start,
            output.len() as i64,
            start,
            source.len() as i64,
            next,
        );
        let Some(slice) = slice else {
            triggers.remove(&start);
            continue;
        };
        let from = slice.start_in_sample as usize;
        let to = slice.start_in_buffer as usize;
        let size = slice.size as usize;
        output[to..to + size].copy_from_slice(&source[from..from + size]);
        if slice.ends_in_this_buffer {
            triggers.remove(&start);
        }
    }
}
