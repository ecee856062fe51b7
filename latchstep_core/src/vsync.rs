// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display vsync timing.
//!
//! The scheduler reads vsync information through the [`VsyncTiming`] trait and
//! never writes it. [`VsyncTimingState`] is a ready-made implementation that a
//! host shares (via `Rc`) between its display callback, which records each
//! vsync, and the scheduler.

use core::cell::Cell;

use crate::time::{Duration, HostTime};

/// Read-only view of the display's refresh grid.
pub trait VsyncTiming {
    /// Time of the most recent vsync.
    fn last_vsync_time(&self) -> HostTime;

    /// Interval between vsyncs.
    fn vsync_interval(&self) -> Duration;
}

/// Vsync timing updated in place by the host.
#[derive(Debug)]
pub struct VsyncTimingState {
    last_vsync_time: Cell<HostTime>,
    vsync_interval: Cell<Duration>,
}

impl VsyncTimingState {
    /// Roughly 60Hz.
    pub const DEFAULT_INTERVAL: Duration = Duration(16_666_667);

    /// Creates vsync timing with the given grid origin and interval.
    #[must_use]
    pub const fn new(last_vsync_time: HostTime, vsync_interval: Duration) -> Self {
        Self {
            last_vsync_time: Cell::new(last_vsync_time),
            vsync_interval: Cell::new(vsync_interval),
        }
    }

    /// Records a vsync that happened at `time`.
    pub fn set_last_vsync_time(&self, time: HostTime) {
        self.last_vsync_time.set(time);
    }

    /// Updates the refresh interval, e.g. after a mode switch.
    pub fn set_vsync_interval(&self, interval: Duration) {
        self.vsync_interval.set(interval);
    }
}

impl Default for VsyncTimingState {
    fn default() -> Self {
        Self::new(HostTime::ZERO, Self::DEFAULT_INTERVAL)
    }
}

impl VsyncTiming for VsyncTimingState {
    fn last_vsync_time(&self) -> HostTime {
        self.last_vsync_time.get()
    }

    fn vsync_interval(&self) -> Duration {
        self.vsync_interval.get()
    }
}
