use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding-window throughput/ETA estimator. Keeps `(tick_time, items_done)`
/// samples for the trailing `window`, recomputed on every progress tick
/// (spec.md §4.3) — sync throughput is bursty enough that a single
/// rolling-average estimate over 30s reads much steadier than instantaneous
/// per-item rate.
pub struct ThroughputWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl ThroughputWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, items_done: u64) {
        let now = Instant::now();
        self.samples.push_back((now, items_done));
        while let Some((t, _)) = self.samples.front() {
            if now.duration_since(*t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn items_per_second(&self) -> f64 {
        let (Some(&(oldest_t, oldest_n)), Some(&(newest_t, newest_n))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = newest_t.duration_since(oldest_t).as_secs_f64();
        if elapsed <= 0.0 || newest_n <= oldest_n {
            return 0.0;
        }
        (newest_n - oldest_n) as f64 / elapsed
    }

    pub fn eta_seconds(&self, items_remaining: u64) -> Option<f64> {
        let rate = self.items_per_second();
        if rate <= 0.0 {
            None
        } else {
            Some(items_remaining as f64 / rate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn zero_samples_yields_no_eta() {
        let w = ThroughputWindow::new(Duration::from_secs(30));
        assert_eq!(w.eta_seconds(100), None);
    }

    #[test]
    fn rate_increases_with_progress() {
        let mut w = ThroughputWindow::new(Duration::from_secs(30));
        w.record(0);
        sleep(Duration::from_millis(20));
        w.record(10);
        assert!(w.items_per_second() > 0.0);
        assert!(w.eta_seconds(10).is_some());
    }
}
