use serde::Serialize;
use std::time::Duration;

/// Rolling window of frame durations.
pub struct FrameTimer {
    history: Vec<Duration>,
    index: usize,
    filled: bool,
    total_frames: u64,
    over_budget: u64,
    budget: Duration,
}

/// Snapshot of a [`FrameTimer`] window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameTimings {
    pub window: usize,
    pub total_frames: u64,
    pub average: Duration,
    pub min: Duration,
    pub max: Duration,
    /// Frames, over the whole run, that exceeded the target budget.
    pub over_budget: u64,
}

impl FrameTimer {
    /// `capacity` is clamped to at least one sample.
    pub fn new(capacity: usize, budget: Duration) -> Self {
        Self {
            history: vec![Duration::ZERO; capacity.max(1)],
            index: 0,
            filled: false,
            total_frames: 0,
            over_budget: 0,
            budget,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.history.len();
        if self.index == 0 {
            self.filled = true;
        }
        self.total_frames += 1;
        if !self.budget.is_zero() && dt > self.budget {
            self.over_budget += 1;
        }
    }

    fn window(&self) -> &[Duration] {
        if self.filled {
            &self.history
        } else {
            &self.history[..self.index]
        }
    }

    pub fn average(&self) -> Duration {
        let window = self.window();
        if window.is_empty() {
            return Duration::ZERO;
        }
        window.iter().sum::<Duration>() / window.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.window().iter().copied().max().unwrap_or_default()
    }

    pub fn min(&self) -> Duration {
        self.window().iter().copied().min().unwrap_or_default()
    }

    /// Samples currently in the window.
    pub fn count(&self) -> usize {
        self.window().len()
    }

    pub fn timings(&self) -> FrameTimings {
        FrameTimings {
            window: self.count(),
            total_frames: self.total_frames,
            average: self.average(),
            min: self.min(),
            max: self.max(),
            over_budget: self.over_budget,
        }
    }
}
