// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One-shot wake-up timer contract.
//!
//! The scheduler never blocks. When it needs to run again at a future time it
//! posts a single wake-up through [`WakeupTimer`] and returns. The host event
//! loop owns the real timer and, when it fires, calls
//! [`FrameScheduler::maybe_render_frame`](crate::scheduler::FrameScheduler::maybe_render_frame)
//! on the same thread that delivers every other scheduler call.

use crate::time::HostTime;

/// A clock plus a single cancellable one-shot timer.
pub trait WakeupTimer {
    /// Current time on the host monotonic clock.
    fn now(&self) -> HostTime;

    /// Posts the wake-up for `at`, replacing any wake-up already pending.
    fn schedule_wakeup(&mut self, at: HostTime);

    /// Cancels the pending wake-up, if any.
    fn cancel_wakeup(&mut self);

    /// Returns `true` while a posted wake-up has neither fired nor been
    /// cancelled.
    fn is_wakeup_pending(&self) -> bool;
}
