use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Lock-free progress shared between the reconstruction workers and observers.
///
/// Workers only ever add completed units; readers derive the percentage from
/// atomic loads and never block.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    completed: AtomicUsize,
    total: AtomicUsize,
    running: AtomicBool,
    finished: AtomicBool,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets progress to zero and flags a run as active.
    pub fn start(&self) {
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(0, Ordering::SeqCst);
        self.finished.store(false, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    /// Sets the amount of work of the active run.
    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn advance(&self, units: usize) {
        if units > 0 {
            self.completed.fetch_add(units, Ordering::AcqRel);
        }
    }

    /// Marks the run as done; the percentage reads 100 afterwards.
    pub fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Ends a failed run; the percentage keeps its last value.
    pub fn abort(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Percentage in `[0, 100]`.
    pub fn percent(&self) -> f32 {
        if self.finished.load(Ordering::Acquire) {
            return 100.0;
        }
        let total = self.total.load(Ordering::Acquire);
        if total == 0 {
            return 0.0;
        }
        let completed = self.completed.load(Ordering::Acquire).min(total);
        (completed as f64 * 100.0 / total as f64) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn percent_tracks_completed_units() {
        let progress = ProgressTracker::new();
        assert_eq!(progress.percent(), 0.0);
        progress.start();
        progress.set_total(200);
        progress.advance(50);
        assert_eq!(progress.percent(), 25.0);
        assert!(progress.is_running());
        progress.finish();
        assert_eq!(progress.percent(), 100.0);
        assert!(!progress.is_running());
    }

    #[test]
    fn abort_stops_without_completing() {
        let progress = ProgressTracker::new();
        progress.start();
        progress.set_total(10);
        progress.advance(3);
        progress.abort();
        assert!(!progress.is_running());
        assert_eq!(progress.percent(), 30.0);
    }

    #[test]
    fn concurrent_advances_are_not_lost() {
        let progress = Arc::new(ProgressTracker::new());
        progress.start();
        progress.set_total(4000);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let progress = progress.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        progress.advance(1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(progress.percent(), 100.0);
    }
}
