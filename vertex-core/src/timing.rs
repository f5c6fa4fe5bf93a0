//! Performance Instrumentation
//!
//! Elapsed-time samples per binding, collected only while gathering is
//! enabled. When it is disabled a [`TimerGuard`] does not read the clock at
//! all, so instrumented code pays one relaxed atomic load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::graph::BindingId;

/// Run `f` and report how long it took.
pub fn measure<R>(f: impl FnOnce() -> R) -> (R, Duration) {
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// Timing samples keyed by binding.
#[derive(Debug, Default)]
pub struct Timings {
    enabled: AtomicBool,
    samples: DashMap<BindingId, Vec<Duration>>,
}

impl Timings {
    /// Create an empty, disabled store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether samples are being gathered.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn gathering on or off. Existing samples are kept.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Start timing `binding`. One sample is recorded when the guard drops,
    /// if gathering was enabled when the guard was created.
    pub fn start(&self, binding: BindingId) -> TimerGuard<'_> {
        let start = self.is_enabled().then(Instant::now);
        TimerGuard {
            timings: self,
            binding,
            start,
        }
    }

    /// Append one sample.
    pub fn record(&self, binding: BindingId, elapsed: Duration) {
        self.samples.entry(binding).or_default().push(elapsed);
    }

    /// Samples recorded for one binding, oldest first.
    pub fn samples(&self, binding: &BindingId) -> Vec<Duration> {
        self.samples
            .get(binding)
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }

    /// Copy of every recorded sample.
    pub fn snapshot(&self) -> HashMap<BindingId, Vec<Duration>> {
        self.samples
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Number of bindings with at least one sample.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check whether no samples are stored.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop every sample.
    pub fn reset(&self) {
        self.samples.clear();
    }

    /// Drop the samples of every binding matching `forget`.
    pub(crate) fn forget(&self, forget: impl Fn(&BindingId) -> bool) {
        self.samples.retain(|binding, _| !forget(binding));
    }
}

/// Records one timing sample on drop.
#[derive(Debug)]
pub struct TimerGuard<'a> {
    timings: &'a Timings,
    binding: BindingId,
    start: Option<Instant>,
}

impl TimerGuard<'_> {
    /// Check whether this guard will record a sample.
    pub fn is_recording(&self) -> bool {
        self.start.is_some()
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            self.timings.record(self.binding, start.elapsed());
        }
    }
}
