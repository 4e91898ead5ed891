//! Cooperative cancellation and progress reporting for long running imports and exports.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag shared between a running task and whoever may want to stop it.
///
/// Tasks poll it between units of work, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Receives a completed fraction in `[0, 1]`
pub type ProgressCallback<'a> = Box<dyn FnMut(f64) + Send + 'a>;

/// Turns a stream of `(done, total)` updates into callbacks at fixed fractional steps.
pub struct ProgressTracker<'a> {
    step: f64,
    next: f64,
    callback: Option<ProgressCallback<'a>>,
}

impl std::fmt::Debug for ProgressTracker<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("step", &self.step)
            .field("next", &self.next)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl<'a> ProgressTracker<'a> {
    /// `step` is clamped to `(0, 1]`
    pub fn new(step: f64, callback: Option<ProgressCallback<'a>>) -> Self {
        let step = if step.is_finite() && step > 0.0 {
            step.min(1.0)
        } else {
            1.0
        };
        Self {
            step,
            next: step,
            callback,
        }
    }

    pub fn silent() -> Self {
        Self::new(1.0, None)
    }

    /// Report progress if `done / total` has crossed the next step.
    pub fn update(&mut self, done: u64, total: u64) {
        if total == 0 || self.next > 1.0 {
            return;
        }
        let fraction = (done as f64 / total as f64).min(1.0);
        if fraction + f64::EPSILON < self.next {
            return;
        }
        while self.next <= fraction + f64::EPSILON {
            self.next += self.step;
        }
        log::trace!("Progress {:.1}%", fraction * 100.0);
        if let Some(callback) = self.callback.as_mut() {
            callback(fraction);
        }
    }

    /// Report completion if the last step was not already reported
    pub fn finish(&mut self) {
        if self.next <= 1.0 + f64::EPSILON {
            self.next = f64::INFINITY;
            if let Some(callback) = self.callback.as_mut() {
                callback(1.0);
            }
        }
    }
}
