use std::collections::BTreeSet;

use fumen_audio::{SoundBuffer, copy_samples_at_points};
use proptest::prelude::*;

const TOTAL: usize = 300;

fn render_at_once(sample: &SoundBuffer, points: &BTreeSet<i64>) -> Vec<i16> {
    let mut triggers = points.clone();
    let mut output = vec![0; TOTAL];
    copy_samples_at_points(sample, &mut output, &mut triggers, 0);
    output
}

/// Triggers join the set only once the buffer holding them is rendered.
fn render_in_pieces(sample: &SoundBuffer, points: &BTreeSet<i64>, sizes: &[usize]) -> Vec<i16> {
    let mut triggers = BTreeSet::new();
    let mut rendered = Vec::with_capacity(TOTAL);
    let mut sizes = sizes.iter().cycle();
    while rendered.len() < TOTAL {
        let start = rendered.len();
        let size = (*sizes.next().unwrap()).min(TOTAL - start);
        let end = start + size;
        triggers.extend(points.range(start as i64..end as i64));
        let mut output = vec![0; size];
        copy_samples_at_points(sample, &mut output, &mut triggers, start as i64);
        rendered.extend(output);
    }
    rendered
}

proptest! {
    #[test]
    fn buffer_size_does_not_change_the_output(
        values in prop::collection::vec(1i16..100, 1..60),
        points in prop::collection::btree_set(0i64..TOTAL as i64, 0..12),
        sizes in prop::collection::vec(1usize..50, 1..8),
    ) {
        let sample = SoundBuffer::from_samples(values, 1, 1000).unwrap();
        prop_assert_eq!(
            render_in_pieces(&sample, &points, &sizes),
            render_at_once(&sample, &points)
        );
    }

    #[test]
    fn every_trigger_starts_with_the_sample(
        values in prop::collection::vec(1i16..100, 1..60),
        points in prop::collection::btree_set(0i64..TOTAL as i64, 1..12),
    ) {
        let sample = SoundBuffer::from_samples(values.clone(), 1, 1000).unwrap();
        let output = render_at_once(&sample, &points);
        for &point in &points {
            prop_assert_eq!(output[point as usize], values[0]);
        }
    }
}
