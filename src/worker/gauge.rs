use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts of a worker's local jobs at one point of its loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Load {
    /// Fetched but waiting for an execution slot
    pub pending: usize,
    /// Holding an execution slot
    pub running: usize,
    /// Finished since the worker started
    pub completed: usize,
}

impl Load {
    pub fn in_flight(&self) -> usize {
        self.pending + self.running
    }
}

/// Latest [`Load`] of a running worker, readable from other tasks
#[derive(Debug, Default)]
pub struct LoadGauge {
    pending: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicUsize,
    peak_pending: AtomicUsize,
}

impl LoadGauge {
    pub fn record(&self, load: Load) {
        self.pending.store(load.pending, Ordering::Relaxed);
        self.running.store(load.running, Ordering::Relaxed);
        self.completed.store(load.completed, Ordering::Relaxed);
        self.peak_pending.fetch_max(load.pending, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Load {
        Load {
            pending: self.pending.load(Ordering::Relaxed),
            running: self.running.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }

    /// Highest pending count ever recorded
    pub fn peak_pending(&self) -> usize {
        self.peak_pending.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_peak_pending() {
        let gauge = LoadGauge::default();
        gauge.record(Load {
            pending: 3,
            running: 1,
            completed: 0,
        });
        gauge.record(Load {
            pending: 1,
            running: 2,
            completed: 4,
        });

        assert_eq!(gauge.snapshot().pending, 1);
        assert_eq!(gauge.snapshot().in_flight(), 3);
        assert_eq!(gauge.peak_pending(), 3);
    }
}
