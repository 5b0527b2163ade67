//! Batch progress: how many pairs made it, how many failed, time left

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pairs between two progress lines
const REPORT_EVERY: usize = 10;

/// How a single pair ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Muxed and annotated
    Succeeded,
    /// Recorded in the problem report
    Failed,
}

/// Shared between workers; every finished pair is recorded once
#[derive(Debug)]
pub struct BatchProgress {
    total: usize,
    done: AtomicUsize,
    failed: AtomicUsize,
    started: Instant,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started: Instant::now(),
        }
    }

    /// Counts one finished pair, logging every few pairs and on the last one
    pub fn record(&self, outcome: Outcome) {
        if outcome == Outcome::Failed {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        if done == self.total {
            tracing::info!(
                succeeded = self.succeeded(),
                failed = self.failed(),
                "All {} pairs finished in {}s",
                self.total,
                self.started.elapsed().as_secs()
            );
        } else if done % REPORT_EVERY == 0 {
            let left = remaining(self.started.elapsed(), done, self.total);
            tracing::info!(
                succeeded = self.succeeded(),
                failed = self.failed(),
                "{}/{} pairs, about {}s left",
                done,
                self.total,
                left.as_secs()
            );
        }
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> usize {
        self.done().saturating_sub(self.failed())
    }
}

/// Linear estimate from the average time per finished pair
fn remaining(elapsed: Duration, done: usize, total: usize) -> Duration {
    if done == 0 {
        return Duration::ZERO;
    }
    elapsed / done as u32 * total.saturating_sub(done) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_remaining_is_linear() {
        assert_eq!(remaining(Duration::from_secs(10), 5, 20), Duration::from_secs(30));
        assert_eq!(remaining(Duration::from_secs(10), 20, 20), Duration::ZERO);
        assert_eq!(remaining(Duration::from_secs(10), 0, 20), Duration::ZERO);
    }

    #[test]
    fn test_outcomes_counted_across_workers() {
        let progress = BatchProgress::new(40);
        (0..40).into_par_iter().for_each(|i| {
            let outcome = if i % 4 == 0 { Outcome::Failed } else { Outcome::Succeeded };
            progress.record(outcome);
        });

        assert_eq!(progress.done(), 40);
        assert_eq!(progress.failed(), 10);
        assert_eq!(progress.succeeded(), 30);
    }
}
