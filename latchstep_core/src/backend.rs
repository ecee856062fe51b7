// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Collaborator contract for compositor integrations.
//!
//! The scheduler decides *when* things happen; everything that actually
//! touches client state or pixels lives behind two traits:
//!
//! - **[`SessionUpdater`]** applies latched client updates and is told when
//!   they were shown. A compositor typically has one updater per subsystem
//!   that owns client-visible state.
//!
//! - **[`FrameRenderer`]** draws the latched scene and reports render and
//!   presentation progress through the [`FrameTimingsRef`] it is handed.
//!
//! Both are held by the scheduler as `Weak<RefCell<dyn ...>>`. Dropping the
//! owning `Rc` is the supported way to tear a collaborator down; the
//! scheduler skips dead handles without complaint.
//!
//! # Frame loop
//!
//! ```text
//!   wake-up ──► SessionUpdater::update_sessions ──► FrameRenderer::render_scheduled_frame
//!                                                          │
//!                       FrameTimingsRef::on_frame_rendered/presented/dropped
//!                                                          │
//!   SessionUpdater::on_frame_presented ◄── dispatch_presentations
//! ```

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use hashbrown::{HashMap, HashSet};

use crate::frame_timings::FrameTimingsRef;
use crate::id::{Fence, PresentId, SessionId};
use crate::time::{Duration, HostTime};

/// The latest present to apply for each session in a frame.
pub type SessionUpdateMap = BTreeMap<SessionId, PresentId>;

/// Latch times of every present confirmed by a presentation, per session, in
/// submission order.
pub type LatchedTimes = HashMap<SessionId, BTreeMap<PresentId, HostTime>>;

/// Outcome of [`SessionUpdater::update_sessions`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateResults {
    /// Whether any applied update changed what is on screen.
    pub needs_render: bool,
    /// Sessions whose updates could not be applied. The scheduler tears
    /// these down.
    pub sessions_with_failed_updates: HashSet<SessionId>,
}

impl UpdateResults {
    /// Results that request a render and report no failures.
    #[must_use]
    pub fn render() -> Self {
        Self {
            needs_render: true,
            sessions_with_failed_updates: HashSet::new(),
        }
    }

    /// Folds another updater's results into these.
    pub fn merge(&mut self, other: Self) {
        self.needs_render |= other.needs_render;
        self.sessions_with_failed_updates
            .extend(other.sessions_with_failed_updates);
    }
}

/// When a frame was actually shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PresentTimestamps {
    /// Actual presentation time.
    pub presented_time: HostTime,
    /// Vsync interval at the time of presentation.
    pub vsync_interval: Duration,
}

/// Applies latched client updates.
pub trait SessionUpdater {
    /// Applies the given present (and every earlier, squashed present) for
    /// each session. `trace_id` identifies the frame for correlating logs.
    fn update_sessions(&mut self, sessions_to_update: &SessionUpdateMap, trace_id: u64)
    -> UpdateResults;

    /// Tells the updater that the presents in `latched_times` were shown.
    ///
    /// Within a session, present ids arrive in ascending order across calls.
    fn on_frame_presented(
        &mut self,
        latched_times: &LatchedTimes,
        present_timestamps: PresentTimestamps,
    );

    /// Called after the renderer has been handed a frame. Useful for
    /// attributing CPU time to the frame.
    fn on_cpu_work_done(&mut self) {}
}

/// Renders scheduled frames.
pub trait FrameRenderer {
    /// Renders frame `frame_number` for `target_presentation_time`.
    ///
    /// The renderer registers its swapchains on `timings` and reports
    /// render completion and presentation (or drop) for each. It may also
    /// call [`FrameTimingsRef::on_frame_skipped`] when nothing needed
    /// drawing.
    fn render_scheduled_frame(
        &mut self,
        frame_number: u64,
        target_presentation_time: HostTime,
        timings: FrameTimingsRef,
    );

    /// Signals `fences` once every render submitted so far has finished.
    fn signal_fences_when_previous_renders_are_done(&mut self, fences: Vec<Fence>);
}
