/// Measure the minimum observable delta of a time-reading function, in
/// seconds. Invokes `now_ms` `samples` times, collects the strictly
/// positive consecutive differences, and returns the smallest one
/// converted to seconds. Returns `0.0` if no tick boundary was
/// observed within the sample budget (the source never advanced).
pub fn measure_precision_seconds<F: FnMut() -> f64>(mut now_ms: F, samples: usize) -> f64 {
    let mut previous = now_ms();
    let mut min_positive_delta_ms: Option<f64> = None;

    for _ in 1..samples.max(1) {
        let current = now_ms();
        let delta = current - previous;
        if delta > 0.0 {
            min_positive_delta_ms = Some(match min_positive_delta_ms {
                Some(existing) if existing <= delta => existing,
                _ => delta,
            });
        }
        previous = current;
    }

    min_positive_delta_ms.unwrap_or(0.0) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn finds_smallest_positive_step() {
        let readings = [0.0, 0.0, 5.0, 5.0, 8.0, 20.0];
        let idx = Cell::new(0usize);
        let precision = measure_precision_seconds(
            || {
                let i = idx.get();
                idx.set((i + 1).min(readings.len() - 1));
                readings[i]
            },
            readings.len(),
        );
        // smallest strictly positive consecutive diff is 3ms (5 -> 8)
        assert_eq!(precision, 0.003);
    }

    #[test]
    fn constant_source_yields_zero() {
        let precision = measure_precision_seconds(|| 42.0, 10);
        assert_eq!(precision, 0.0);
    }
}
