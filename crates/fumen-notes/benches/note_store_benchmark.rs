use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fumen_notes::{Note, NoteStore, Position};
use fumen_timing::RationalTime;

fn dense_chart() -> NoteStore {
    (0..4000)
        .map(|i: i64| {
            let position = Position::from_index((i as usize * 7) % 16).unwrap();
            Note::tap(RationalTime::new(i, 4), position)
        })
        .collect()
}

fn query_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("note_store");
    let store = dense_chart();

    group.bench_function("count_between_one_measure", |b| {
        let mut beat = 0i64;
        b.iter(|| {
            let start = RationalTime::from(beat % 1000);
            let end = &start + RationalTime::from(4);
            let _ = black_box(store.count_between(&start, &end));
            beat += 3;
        });
    });

    group.bench_function("overwriting_insert", |b| {
        let mut store = store.clone();
        let mut i = 0i64;
        b.iter(|| {
            let note = Note::tap(RationalTime::new(i % 4000, 4), Position::from_index(0).unwrap());
            let _ = black_box(store.overwriting_insert(note));
            i += 13;
        });
    });

    group.finish();
}

fn build_benchmark(c: &mut Criterion) {
    c.bench_function("note_store_build_4000", |b| {
        b.iter(|| black_box(dense_chart()));
    });
}

criterion_group!(benches, query_benchmark, build_benchmark);
criterion_main!(benches);
