// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame timing record.
//!
//! A [`FrameTimings`] is created when the scheduler dispatches a frame to the
//! renderer. The renderer registers one swapchain per output surface and then
//! reports, in any order, when each swapchain finished rendering and when it
//! was presented (or dropped). Once every registered swapchain has reported
//! both, the record finalizes exactly once and fires its completion callback.
//!
//! The scheduler owns the record. The renderer holds a [`FrameTimingsRef`],
//! a weak handle whose methods silently do nothing once the owner has let go.
//!
//! ```text
//!   Active ──(all swapchains rendered + presented/dropped)──► Finalized
//!      │                                                         ▲
//!      └──────────────────────(on_frame_skipped)─────────────────┘
//! ```

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::time::HostTime;

/// Callback fired once, when a [`FrameTimings`] finalizes.
pub type OnFinalized = Box<dyn FnOnce(&FrameTimings)>;

/// Resolved timestamps of a finalized frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Timestamps {
    /// When the frame's updates were latched.
    pub latch_point_time: HostTime,
    /// When applying updates finished.
    pub update_done_time: HostTime,
    /// When rendering started.
    pub render_start_time: HostTime,
    /// When rendering finished: the later of the GPU and CPU completion
    /// signals, or `None` if no swapchain reported a render and no CPU
    /// completion was reported.
    pub render_done_time: Option<HostTime>,
    /// The vsync the frame was aiming for.
    pub target_presentation_time: HostTime,
    /// When the frame was shown, or `None` if it was dropped.
    pub actual_presentation_time: Option<HostTime>,
}

impl Timestamps {
    /// Time spent rendering, if rendering completed.
    #[must_use]
    pub fn render_duration(&self) -> Option<crate::time::Duration> {
        self.render_done_time
            .map(|done| done.saturating_duration_since(self.render_start_time))
    }

    /// Time from latch to the frame being shown, if it was shown.
    #[must_use]
    pub fn latch_to_presentation(&self) -> Option<crate::time::Duration> {
        self.actual_presentation_time
            .map(|shown| shown.saturating_duration_since(self.latch_point_time))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Pending,
    At(HostTime),
    /// Satisfied by a drop rather than a timestamp.
    Dropped,
}

impl Signal {
    const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    const fn time(self) -> Option<HostTime> {
        match self {
            Self::At(t) => Some(t),
            Self::Pending | Self::Dropped => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct SwapchainRecord {
    rendered: Signal,
    presented: Signal,
}

impl SwapchainRecord {
    const PENDING: Self = Self {
        rendered: Signal::Pending,
        presented: Signal::Pending,
    };

    const fn is_complete(&self) -> bool {
        !self.rendered.is_pending() && !self.presented.is_pending()
    }
}

/// Mutable timing record for one frame attempt.
pub struct FrameTimings {
    frame_number: u64,
    target_presentation_time: HostTime,
    latch_point_time: HostTime,
    rendering_started_time: HostTime,
    updates_finished_time: Option<HostTime>,
    rendering_cpu_finished_time: Option<HostTime>,
    swapchains: Vec<SwapchainRecord>,
    actual_presentation_time: Option<HostTime>,
    frame_was_dropped: bool,
    frame_was_skipped: bool,
    finalized: bool,
    on_finalized: Option<OnFinalized>,
}

impl fmt::Debug for FrameTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameTimings")
            .field("frame_number", &self.frame_number)
            .field("target_presentation_time", &self.target_presentation_time)
            .field("latch_point_time", &self.latch_point_time)
            .field("rendering_started_time", &self.rendering_started_time)
            .field("swapchains", &self.swapchains)
            .field("finalized", &self.finalized)
            .finish_non_exhaustive()
    }
}

impl FrameTimings {
    /// Creates an active record.
    ///
    /// # Panics
    ///
    /// Panics if the latch point is after the target presentation time or
    /// rendering starts before the latch point.
    #[must_use]
    pub fn new(
        frame_number: u64,
        target_presentation_time: HostTime,
        latch_point_time: HostTime,
        rendering_started_time: HostTime,
        on_finalized: OnFinalized,
    ) -> Self {
        assert!(
            latch_point_time <= target_presentation_time,
            "latch point {latch_point_time:?} after target {target_presentation_time:?}"
        );
        assert!(
            latch_point_time <= rendering_started_time,
            "rendering started {rendering_started_time:?} before latch {latch_point_time:?}"
        );
        Self {
            frame_number,
            target_presentation_time,
            latch_point_time,
            rendering_started_time,
            updates_finished_time: None,
            rendering_cpu_finished_time: None,
            swapchains: Vec::new(),
            actual_presentation_time: None,
            frame_was_dropped: false,
            frame_was_skipped: false,
            finalized: false,
            on_finalized: Some(on_finalized),
        }
    }

    /// Registers an output surface and returns its swapchain index.
    ///
    /// # Panics
    ///
    /// Panics if the record is already finalized.
    pub fn register_swapchain(&mut self) -> usize {
        assert!(!self.finalized, "swapchain registered after finalization");
        self.swapchains.push(SwapchainRecord::PENDING);
        self.swapchains.len() - 1
    }

    /// Records when applying updates for this frame finished.
    pub fn on_frame_updated(&mut self, time: HostTime) {
        self.updates_finished_time = Some(time);
    }

    /// Records when the CPU side of rendering finished.
    pub fn on_frame_cpu_rendered(&mut self, time: HostTime) {
        self.rendering_cpu_finished_time = Some(
            self.rendering_cpu_finished_time
                .map_or(time, |prev| prev.max(time)),
        );
    }

    /// Records that swapchain `index` finished rendering at `time`.
    ///
    /// A render signal that follows a drop on the same swapchain replaces the
    /// drop placeholder. Signals after finalization are ignored.
    ///
    /// # Panics
    ///
    /// Panics on an unknown index or a second render signal for the same
    /// swapchain.
    pub fn on_frame_rendered(&mut self, index: usize, time: HostTime) {
        if self.finalized {
            return;
        }
        let record = self.record_mut(index);
        assert!(
            !matches!(record.rendered, Signal::At(_)),
            "swapchain {index} reported rendered twice"
        );
        record.rendered = Signal::At(time);
        self.finalize_if_complete();
    }

    /// Records that swapchain `index` was presented at `time`.
    ///
    /// # Panics
    ///
    /// Panics on an unknown index or a second presented/dropped signal for
    /// the same swapchain.
    pub fn on_frame_presented(&mut self, index: usize, time: HostTime) {
        if self.finalized {
            return;
        }
        let record = self.record_mut(index);
        assert!(
            record.presented.is_pending(),
            "swapchain {index} reported presented twice"
        );
        record.presented = Signal::At(time);
        self.finalize_if_complete();
    }

    /// Records that swapchain `index` dropped the frame.
    ///
    /// A drop satisfies both the rendered and presented signals for that
    /// swapchain.
    ///
    /// # Panics
    ///
    /// Panics on an unknown index or a second presented/dropped signal for
    /// the same swapchain.
    pub fn on_frame_dropped(&mut self, index: usize) {
        if self.finalized {
            return;
        }
        let record = self.record_mut(index);
        assert!(
            record.presented.is_pending(),
            "swapchain {index} reported presented twice"
        );
        record.presented = Signal::Dropped;
        if record.rendered.is_pending() {
            record.rendered = Signal::Dropped;
        }
        self.frame_was_dropped = true;
        self.finalize_if_complete();
    }

    /// Marks the whole frame as skipped: nothing needed to be drawn, so every
    /// outstanding swapchain counts as rendered at render start and presented
    /// at the target time.
    pub fn on_frame_skipped(&mut self) {
        if self.finalized {
            return;
        }
        self.frame_was_skipped = true;
        let render_start = self.rendering_started_time;
        let target = self.target_presentation_time;
        for record in &mut self.swapchains {
            if record.rendered.is_pending() {
                record.rendered = Signal::At(render_start);
            }
            if record.presented.is_pending() {
                record.presented = Signal::At(target);
            }
        }
        self.finalize();
    }

    /// The frame number this record belongs to.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The vsync this frame was aiming for.
    #[must_use]
    pub fn target_presentation_time(&self) -> HostTime {
        self.target_presentation_time
    }

    /// When rendering started.
    #[must_use]
    pub fn rendering_started_time(&self) -> HostTime {
        self.rendering_started_time
    }

    /// Number of registered swapchains.
    #[must_use]
    pub fn swapchain_count(&self) -> usize {
        self.swapchains.len()
    }

    /// Whether every contributor has reported.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Whether any swapchain dropped the frame.
    #[must_use]
    pub fn frame_was_dropped(&self) -> bool {
        self.frame_was_dropped
    }

    /// Whether the frame was skipped.
    #[must_use]
    pub fn frame_was_skipped(&self) -> bool {
        self.frame_was_skipped
    }

    /// Current timestamps.
    ///
    /// Before finalization `actual_presentation_time` is always `None`.
    #[must_use]
    pub fn timestamps(&self) -> Timestamps {
        let gpu_done = self
            .swapchains
            .iter()
            .filter_map(|record| record.rendered.time())
            .max();
        let render_done_time = match (gpu_done, self.rendering_cpu_finished_time) {
            (Some(gpu), Some(cpu)) => Some(gpu.max(cpu)),
            (gpu, cpu) => gpu.or(cpu),
        };
        Timestamps {
            latch_point_time: self.latch_point_time,
            update_done_time: self
                .updates_finished_time
                .unwrap_or(self.rendering_started_time),
            render_start_time: self.rendering_started_time,
            render_done_time,
            target_presentation_time: self.target_presentation_time,
            actual_presentation_time: self.actual_presentation_time,
        }
    }

    fn record_mut(&mut self, index: usize) -> &mut SwapchainRecord {
        let count = self.swapchains.len();
        assert!(
            index < count,
            "swapchain index {index} out of range ({count} registered)"
        );
        &mut self.swapchains[index]
    }

    fn finalize_if_complete(&mut self) {
        if !self.swapchains.is_empty() && self.swapchains.iter().all(SwapchainRecord::is_complete)
        {
            self.finalize();
        }
    }

    fn finalize(&mut self) {
        assert!(!self.finalized, "frame {} finalized twice", self.frame_number);
        self.finalized = true;
        self.validate_render_time();

        self.actual_presentation_time = if self.frame_was_dropped {
            None
        } else if self.swapchains.is_empty() {
            Some(self.target_presentation_time)
        } else {
            self.swapchains
                .iter()
                .filter_map(|record| record.presented.time())
                .max()
        };

        if let Some(on_finalized) = self.on_finalized.take() {
            on_finalized(self);
        }
    }

    /// Render-done notifications travel a slower path than presentation
    /// timestamps, so a render time may land after its own present. Clamp it
    /// back to the present time.
    fn validate_render_time(&mut self) {
        for record in &mut self.swapchains {
            if let (Signal::At(rendered), Signal::At(presented)) = (record.rendered, record.presented)
                && rendered > presented
            {
                record.rendered = Signal::At(presented);
            }
        }
    }
}

/// Weak handle to a [`FrameTimings`] owned by the scheduler.
///
/// Every method is a silent no-op once the record has been retired.
#[derive(Clone, Debug)]
pub struct FrameTimingsRef {
    inner: Weak<RefCell<FrameTimings>>,
}

impl FrameTimingsRef {
    /// Creates a weak handle to `timings`.
    #[must_use]
    pub fn new(timings: &Rc<RefCell<FrameTimings>>) -> Self {
        Self {
            inner: Rc::downgrade(timings),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut FrameTimings) -> R) -> Option<R> {
        let timings = self.inner.upgrade()?;
        let mut timings = timings.borrow_mut();
        Some(f(&mut timings))
    }

    /// Whether the underlying record still exists.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// See [`FrameTimings::register_swapchain`]. Returns `None` if the
    /// record is gone.
    pub fn register_swapchain(&self) -> Option<usize> {
        self.with(FrameTimings::register_swapchain)
    }

    /// See [`FrameTimings::on_frame_rendered`].
    pub fn on_frame_rendered(&self, index: usize, time: HostTime) {
        self.with(|t| t.on_frame_rendered(index, time));
    }

    /// See [`FrameTimings::on_frame_presented`].
    pub fn on_frame_presented(&self, index: usize, time: HostTime) {
        self.with(|t| t.on_frame_presented(index, time));
    }

    /// See [`FrameTimings::on_frame_dropped`].
    pub fn on_frame_dropped(&self, index: usize) {
        self.with(|t| t.on_frame_dropped(index));
    }

    /// See [`FrameTimings::on_frame_skipped`].
    pub fn on_frame_skipped(&self) {
        self.with(FrameTimings::on_frame_skipped);
    }

    /// See [`FrameTimings::on_frame_cpu_rendered`].
    pub fn on_frame_cpu_rendered(&self, time: HostTime) {
        self.with(|t| t.on_frame_cpu_rendered(time));
    }

    /// Frame number of the record, if it still exists.
    #[must_use]
    pub fn frame_number(&self) -> Option<u64> {
        self.with(|t| t.frame_number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    type Finalized = Rc<RefCell<Vec<Timestamps>>>;

    fn timings_with_log(swapchains: usize) -> (FrameTimings, Finalized) {
        let log: Finalized = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let mut timings = FrameTimings::new(
            7,
            HostTime(1_000),
            HostTime(100),
            HostTime(200),
            Box::new(move |t: &FrameTimings| sink.borrow_mut().push(t.timestamps())),
        );
        for expected in 0..swapchains {
            assert_eq!(timings.register_swapchain(), expected);
        }
        (timings, log)
    }

    #[test]
    fn single_swapchain_finalizes_after_both_signals() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_rendered(0, HostTime(600));
        assert!(!timings.is_finalized());
        timings.on_frame_presented(0, HostTime(1_000));
        assert!(timings.is_finalized());

        let finalized = log.borrow();
        assert_eq!(finalized.len(), 1, "callback fires exactly once");
        assert_eq!(finalized[0].render_done_time, Some(HostTime(600)));
        assert_eq!(finalized[0].actual_presentation_time, Some(HostTime(1_000)));
    }

    #[test]
    fn arrival_order_does_not_change_result() {
        let (mut a, log_a) = timings_with_log(2);
        a.on_frame_rendered(0, HostTime(500));
        a.on_frame_rendered(1, HostTime(550));
        a.on_frame_presented(0, HostTime(1_000));
        a.on_frame_presented(1, HostTime(1_010));

        let (mut b, log_b) = timings_with_log(2);
        b.on_frame_presented(1, HostTime(1_010));
        b.on_frame_presented(0, HostTime(1_000));
        b.on_frame_rendered(1, HostTime(550));
        b.on_frame_rendered(0, HostTime(500));

        assert_eq!(log_a.borrow().as_slice(), log_b.borrow().as_slice());
        assert_eq!(log_a.borrow()[0].render_done_time, Some(HostTime(550)));
        assert_eq!(
            log_a.borrow()[0].actual_presentation_time,
            Some(HostTime(1_010))
        );
    }

    #[test]
    fn render_done_after_present_is_clamped() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_presented(0, HostTime(1_000));
        timings.on_frame_rendered(0, HostTime(1_200));
        assert_eq!(log.borrow()[0].render_done_time, Some(HostTime(1_000)));
    }

    #[test]
    fn clamp_is_per_swapchain() {
        let (mut timings, log) = timings_with_log(2);
        timings.on_frame_rendered(0, HostTime(900));
        timings.on_frame_presented(0, HostTime(800));
        timings.on_frame_rendered(1, HostTime(850));
        timings.on_frame_presented(1, HostTime(1_000));
        // Swapchain 0 clamps to 800; swapchain 1 keeps 850.
        assert_eq!(log.borrow()[0].render_done_time, Some(HostTime(850)));
    }

    #[test]
    fn cpu_render_done_wins_when_later() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_cpu_rendered(HostTime(700));
        timings.on_frame_rendered(0, HostTime(600));
        timings.on_frame_presented(0, HostTime(1_000));
        assert_eq!(log.borrow()[0].render_done_time, Some(HostTime(700)));
    }

    #[test]
    fn drop_satisfies_both_signals() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_dropped(0);
        assert!(timings.is_finalized());
        assert!(timings.frame_was_dropped());

        let finalized = log.borrow();
        assert_eq!(finalized[0].actual_presentation_time, None);
        assert_eq!(finalized[0].render_done_time, None);
    }

    #[test]
    fn drop_keeps_earlier_render_time() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_rendered(0, HostTime(650));
        timings.on_frame_dropped(0);
        let finalized = log.borrow();
        assert_eq!(finalized[0].render_done_time, Some(HostTime(650)));
        assert_eq!(finalized[0].actual_presentation_time, None);
    }

    #[test]
    fn drop_on_one_swapchain_drops_the_frame() {
        let (mut timings, log) = timings_with_log(2);
        timings.on_frame_dropped(0);
        timings.on_frame_rendered(0, HostTime(640));
        timings.on_frame_rendered(1, HostTime(600));
        timings.on_frame_presented(1, HostTime(1_000));

        let finalized = log.borrow();
        assert_eq!(finalized[0].actual_presentation_time, None);
        assert_eq!(
            finalized[0].render_done_time,
            Some(HostTime(640)),
            "late render signal replaces the drop placeholder"
        );
    }

    #[test]
    fn skip_finalizes_at_target() {
        let (mut timings, log) = timings_with_log(2);
        timings.on_frame_rendered(0, HostTime(300));
        timings.on_frame_skipped();
        assert!(timings.frame_was_skipped());

        let finalized = log.borrow();
        assert_eq!(finalized[0].actual_presentation_time, Some(HostTime(1_000)));
        assert_eq!(finalized[0].render_done_time, Some(HostTime(300)));
    }

    #[test]
    fn skip_without_swapchains() {
        let (mut timings, log) = timings_with_log(0);
        timings.on_frame_skipped();
        assert_eq!(
            log.borrow()[0].actual_presentation_time,
            Some(HostTime(1_000))
        );
    }

    #[test]
    fn signals_after_finalization_are_ignored() {
        let (mut timings, log) = timings_with_log(1);
        timings.on_frame_rendered(0, HostTime(500));
        timings.on_frame_presented(0, HostTime(1_000));
        timings.on_frame_dropped(0);
        timings.on_frame_skipped();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(
            log.borrow()[0].actual_presentation_time,
            Some(HostTime(1_000))
        );
    }

    #[test]
    fn update_done_defaults_to_render_start() {
        let (mut timings, _log) = timings_with_log(1);
        assert_eq!(timings.timestamps().update_done_time, HostTime(200));
        timings.on_frame_updated(HostTime(150));
        assert_eq!(timings.timestamps().update_done_time, HostTime(150));
    }

    #[test]
    #[should_panic(expected = "reported presented twice")]
    fn double_present_is_fatal() {
        let (mut timings, _log) = timings_with_log(2);
        timings.on_frame_presented(0, HostTime(1_000));
        timings.on_frame_presented(0, HostTime(1_001));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn unknown_swapchain_is_fatal() {
        let (mut timings, _log) = timings_with_log(1);
        timings.on_frame_rendered(3, HostTime(1));
    }

    #[test]
    fn weak_handle_is_noop_after_owner_drops() {
        let (timings, log) = timings_with_log(1);
        let owner = Rc::new(RefCell::new(timings));
        let handle = FrameTimingsRef::new(&owner);
        assert!(handle.is_alive());
        assert_eq!(handle.frame_number(), Some(7));

        drop(owner);
        assert!(!handle.is_alive());
        handle.on_frame_rendered(0, HostTime(1));
        handle.on_frame_presented(0, HostTime(2));
        assert_eq!(handle.register_swapchain(), None);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn weak_handle_drives_finalization() {
        let (timings, log) = timings_with_log(0);
        let owner = Rc::new(RefCell::new(timings));
        let handle = FrameTimingsRef::new(&owner);
        let indices = vec![handle.register_swapchain(), handle.register_swapchain()];
        assert_eq!(indices, vec![Some(0), Some(1)]);

        handle.on_frame_rendered(0, HostTime(400));
        handle.on_frame_rendered(1, HostTime(410));
        handle.on_frame_presented(0, HostTime(1_000));
        handle.on_frame_presented(1, HostTime(1_000));
        assert!(owner.borrow().is_finalized());
        assert_eq!(log.borrow().len(), 1);
    }
}
