/// Receives progress from a running operation.
pub trait ProgressObserver: Send {
    /// Overall completion in `0.0..=1.0`.
    fn set_fraction(&mut self, fraction: f64);

    /// A phase of unknown length started.
    fn begin_indeterminate(&mut self);

    /// The current indeterminate phase ended.
    fn end_indeterminate(&mut self);
}

/// Observer that ignores everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn set_fraction(&mut self, _fraction: f64) {}
    fn begin_indeterminate(&mut self) {}
    fn end_indeterminate(&mut self) {}
}

/// Wraps an observer so reported fractions never decrease.
pub(crate) struct Progress<'a> {
    observer: &'a mut dyn ProgressObserver,
    last: f64,
}

impl<'a> Progress<'a> {
    pub(crate) fn new(observer: &'a mut dyn ProgressObserver) -> Self {
        Self { observer, last: 0.0 }
    }

    pub(crate) fn set(&mut self, fraction: f64) {
        let fraction = if fraction.is_nan() { self.last } else { fraction.clamp(0.0, 1.0) };
        self.last = self.last.max(fraction);
        self.observer.set_fraction(self.last);
    }

    /// Report `done` of `total` steps.
    pub(crate) fn step(&mut self, done: usize, total: usize) {
        if total > 0 {
            self.set(done as f64 / total as f64);
        }
    }

    pub(crate) fn begin_indeterminate(&mut self) {
        self.observer.begin_indeterminate();
    }

    pub(crate) fn end_indeterminate(&mut self) {
        self.observer.end_indeterminate();
    }
}
