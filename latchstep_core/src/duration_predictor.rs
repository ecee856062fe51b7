// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sliding-window duration prediction.

use alloc::collections::VecDeque;

use crate::time::Duration;

/// Predicts the next duration of a recurring phase (update or render) from a
/// fixed-size window of recent measurements.
///
/// The prediction is the maximum over the window. A single slow sample keeps
/// the prediction high until it ages out, which avoids chronic
/// underestimation without letting one outlier dominate forever.
///
/// The window starts filled with the seed value, so early predictions equal
/// the seed until enough real measurements arrive.
#[derive(Clone, Debug)]
pub struct DurationPredictor {
    window: VecDeque<Duration>,
    window_size: usize,
}

impl DurationPredictor {
    /// Creates a predictor with a window of `window_size` samples, all
    /// initialized to `initial_prediction`.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero.
    #[must_use]
    pub fn new(window_size: usize, initial_prediction: Duration) -> Self {
        assert!(window_size > 0, "duration window must hold at least one sample");
        let mut window = VecDeque::with_capacity(window_size);
        window.resize(window_size, initial_prediction);
        Self {
            window,
            window_size,
        }
    }

    /// Pushes a new measurement, evicting the oldest once the window is full.
    pub fn insert_new_measurement(&mut self, duration: Duration) {
        if self.window.len() == self.window_size {
            let _ = self.window.pop_front();
        }
        self.window.push_back(duration);
    }

    /// Returns the worst-case duration over the current window.
    #[must_use]
    pub fn prediction(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    /// Number of samples the window holds.
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }
}
