//! Timeline primitives shared by the session and interval analyzers

use log::warn;

/// Length of the union of `[onset, offset)` spans.
///
/// Sweeps `+1`/`-1` marks sorted by time, with starts ordered before ends at
/// equal timestamps, and accumulates elapsed time while any span is active.
/// Spans with `offset < onset` are skipped.
pub fn union_length<I>(spans: I) -> f64
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut marks: Vec<(f64, i32)> = Vec::new();
    let mut skipped = 0usize;

    for (onset, offset) in spans {
        if !(offset >= onset) {
            skipped += 1;
            continue;
        }
        marks.push((onset, 1));
        marks.push((offset, -1));
    }

    if skipped > 0 {
        warn!("Skipped {skipped} spans with offset before onset");
    }
    if marks.is_empty() {
        return 0.0;
    }

    marks.sort_by(|a, b| a.0.total_cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut active = 0i32;
    let mut last_time = marks[0].0;
    let mut total = 0.0;

    for (time, delta) in marks {
        if active > 0 && time > last_time {
            total += time - last_time;
        }
        active += delta;
        last_time = time;
    }

    total
}

/// Portion of `[onset, offset)` inside `[start, end)`, if it has positive length
pub fn clip(onset: f64, offset: f64, start: f64, end: f64) -> Option<(f64, f64)> {
    let clipped_onset = onset.max(start);
    let clipped_offset = offset.min(end);
    (clipped_offset > clipped_onset).then_some((clipped_onset, clipped_offset))
}
