// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deterministic test doubles for driving a [`FrameScheduler`].
//!
//! Available under `cfg(test)` and the `test-helpers` feature.
//!
//! - [`TestLoop`] is a manual clock with a single wake-up slot.
//! - [`MockSessionUpdater`] and [`MockFrameRenderer`] record every call.
//! - [`SchedulerHarness`] wires them to a scheduler and pumps wake-ups and
//!   presentation dispatch as simulated time advances.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::{Rc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;

use hashbrown::HashSet;

use crate::backend::{
    FrameRenderer, LatchedTimes, PresentTimestamps, SessionUpdateMap, SessionUpdater,
    UpdateResults,
};
use crate::config::FrameSchedulerConfig;
use crate::frame_timings::FrameTimingsRef;
use crate::id::{Fence, SessionId};
use crate::scheduler::FrameScheduler;
use crate::time::{Duration, HostTime};
use crate::timer::WakeupTimer;
use crate::vsync::{VsyncTiming, VsyncTimingState};

#[derive(Debug, Default)]
struct LoopState {
    now: HostTime,
    wakeup: Option<HostTime>,
}

/// Manual clock plus one wake-up slot. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct TestLoop {
    state: Rc<RefCell<LoopState>>,
}

impl TestLoop {
    /// A loop starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward to `time`. Earlier times are ignored.
    pub fn advance_to(&self, time: HostTime) {
        let mut state = self.state.borrow_mut();
        state.now = state.now.max(time);
    }

    /// The posted wake-up, if any.
    #[must_use]
    pub fn pending_wakeup(&self) -> Option<HostTime> {
        self.state.borrow().wakeup
    }

    /// Consumes the wake-up if it is due at the current time.
    pub fn take_due_wakeup(&self) -> bool {
        let mut state = self.state.borrow_mut();
        match state.wakeup {
            Some(at) if at <= state.now => {
                state.wakeup = None;
                true
            }
            _ => false,
        }
    }
}

impl WakeupTimer for TestLoop {
    fn now(&self) -> HostTime {
        self.state.borrow().now
    }

    fn schedule_wakeup(&mut self, at: HostTime) {
        self.state.borrow_mut().wakeup = Some(at);
    }

    fn cancel_wakeup(&mut self) {
        self.state.borrow_mut().wakeup = None;
    }

    fn is_wakeup_pending(&self) -> bool {
        self.state.borrow().wakeup.is_some()
    }
}

/// Records updates and presentation callbacks.
#[derive(Debug)]
pub struct MockSessionUpdater {
    /// What the next `update_sessions` reports for `needs_render`.
    pub needs_render: bool,
    /// Sessions whose updates fail.
    pub failing_sessions: HashSet<SessionId>,
    /// Every `update_sessions` argument, in call order.
    pub updates: Vec<SessionUpdateMap>,
    /// Every `on_frame_presented` call, in call order.
    pub presentations: Vec<(LatchedTimes, PresentTimestamps)>,
    /// Number of `on_cpu_work_done` calls.
    pub cpu_work_done_count: usize,
}

impl Default for MockSessionUpdater {
    fn default() -> Self {
        Self {
            needs_render: true,
            failing_sessions: HashSet::new(),
            updates: Vec::new(),
            presentations: Vec::new(),
            cpu_work_done_count: 0,
        }
    }
}

impl MockSessionUpdater {
    /// Number of `update_sessions` calls.
    #[must_use]
    pub fn update_sessions_call_count(&self) -> usize {
        self.updates.len()
    }

    /// Number of `on_frame_presented` calls.
    #[must_use]
    pub fn on_frame_presented_call_count(&self) -> usize {
        self.presentations.len()
    }
}

impl SessionUpdater for MockSessionUpdater {
    fn update_sessions(
        &mut self,
        sessions_to_update: &SessionUpdateMap,
        _trace_id: u64,
    ) -> UpdateResults {
        self.updates.push(sessions_to_update.clone());
        UpdateResults {
            needs_render: self.needs_render,
            sessions_with_failed_updates: sessions_to_update
                .keys()
                .filter(|session| self.failing_sessions.contains(*session))
                .copied()
                .collect(),
        }
    }

    fn on_frame_presented(
        &mut self,
        latched_times: &LatchedTimes,
        present_timestamps: PresentTimestamps,
    ) {
        self.presentations
            .push((latched_times.clone(), present_timestamps));
    }

    fn on_cpu_work_done(&mut self) {
        self.cpu_work_done_count += 1;
    }
}

/// A frame handed to [`MockFrameRenderer`] that has not been ended yet.
#[derive(Debug)]
pub struct RenderedFrame {
    /// Frame counter.
    pub frame_number: u64,
    /// Target vsync.
    pub target_presentation_time: HostTime,
    timings: FrameTimingsRef,
    swapchain: Option<usize>,
}

/// Renders nothing; frames complete only when the test ends them.
#[derive(Debug, Default)]
pub struct MockFrameRenderer {
    /// Frames rendered but not yet ended, oldest first.
    pub frames: VecDeque<RenderedFrame>,
    /// Number of `render_scheduled_frame` calls.
    pub render_frame_call_count: usize,
    /// Every fence handed over, in order.
    pub signaled_fences: Vec<Fence>,
}

impl MockFrameRenderer {
    /// Completes the oldest frame: rendered and presented at `time`.
    pub fn end_frame(&mut self, time: HostTime) -> Option<u64> {
        let frame = self.frames.pop_front()?;
        if let Some(index) = frame.swapchain {
            frame.timings.on_frame_rendered(index, time);
            frame.timings.on_frame_presented(index, time);
        }
        Some(frame.frame_number)
    }

    /// Drops the oldest frame.
    pub fn drop_frame(&mut self) -> Option<u64> {
        let frame = self.frames.pop_front()?;
        if let Some(index) = frame.swapchain {
            frame.timings.on_frame_dropped(index);
        }
        Some(frame.frame_number)
    }
}

impl FrameRenderer for MockFrameRenderer {
    fn render_scheduled_frame(
        &mut self,
        frame_number: u64,
        target_presentation_time: HostTime,
        timings: FrameTimingsRef,
    ) {
        self.render_frame_call_count += 1;
        let swapchain = timings.register_swapchain();
        self.frames.push_back(RenderedFrame {
            frame_number,
            target_presentation_time,
            timings,
            swapchain,
        });
    }

    fn signal_fences_when_previous_renders_are_done(&mut self, fences: Vec<Fence>) {
        self.signaled_fences.extend(fences);
    }
}

/// A scheduler wired to a [`TestLoop`] and one mock of each collaborator.
#[derive(Debug)]
pub struct SchedulerHarness {
    /// The scheduler under test.
    pub scheduler: FrameScheduler,
    /// Clock and wake-up slot shared with the scheduler.
    pub test_loop: TestLoop,
    /// Vsync state, advanced on the grid as time passes.
    pub vsync: Rc<VsyncTimingState>,
    /// The single session updater.
    pub updater: Rc<RefCell<MockSessionUpdater>>,
    /// The renderer.
    pub renderer: Rc<RefCell<MockFrameRenderer>>,
}

impl SchedulerHarness {
    /// Creates and initializes a scheduler with vsyncs at multiples of
    /// `vsync_interval`, starting at time zero.
    ///
    /// # Panics
    ///
    /// Panics if `config` is invalid.
    #[must_use]
    pub fn new(config: FrameSchedulerConfig, vsync_interval: Duration) -> Self {
        let test_loop = TestLoop::new();
        let vsync = Rc::new(VsyncTimingState::new(HostTime::ZERO, vsync_interval));
        let shared_vsync: Rc<dyn VsyncTiming> = vsync.clone();
        let mut scheduler =
            FrameScheduler::new(config, shared_vsync, Box::new(test_loop.clone()))
                .expect("harness config must be valid");

        let updater = Rc::new(RefCell::new(MockSessionUpdater::default()));
        let renderer = Rc::new(RefCell::new(MockFrameRenderer::default()));
        let weak_updater = Rc::downgrade(&updater);
        let weak_updater: Weak<RefCell<dyn SessionUpdater>> = weak_updater;
        let weak_renderer = Rc::downgrade(&renderer);
        let weak_renderer: Weak<RefCell<dyn FrameRenderer>> = weak_renderer;
        scheduler
            .initialize(weak_renderer, vec![weak_updater])
            .expect("live collaborators");

        Self {
            scheduler,
            test_loop,
            vsync,
            updater,
            renderer,
        }
    }

    /// Current simulated time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.test_loop.now()
    }

    /// Runs every wake-up due up to and including `time`, then leaves the
    /// clock at `time`.
    pub fn run_until(&mut self, time: HostTime) {
        loop {
            self.scheduler.dispatch_presentations();
            match self.test_loop.pending_wakeup() {
                Some(at) if at <= time => {
                    self.advance_clock(at);
                    if self.test_loop.take_due_wakeup() {
                        self.scheduler.maybe_render_frame();
                    }
                }
                _ => break,
            }
        }
        self.advance_clock(time);
    }

    /// Runs for `duration` of simulated time.
    pub fn run_for(&mut self, duration: Duration) {
        let until = self.now().saturating_add(duration);
        self.run_until(until);
    }

    /// Ends the oldest rendered frame at the current time and delivers its
    /// presentation.
    pub fn end_frame(&mut self) -> Option<u64> {
        let now = self.now();
        self.end_frame_at(now)
    }

    /// Ends the oldest rendered frame, presented at `time`.
    pub fn end_frame_at(&mut self, time: HostTime) -> Option<u64> {
        let ended = self.renderer.borrow_mut().end_frame(time);
        self.scheduler.dispatch_presentations();
        ended
    }

    /// Drops the oldest rendered frame and delivers the drop.
    pub fn drop_frame(&mut self) -> Option<u64> {
        let dropped = self.renderer.borrow_mut().drop_frame();
        self.scheduler.dispatch_presentations();
        dropped
    }

    /// Shorthand for the renderer's call count.
    #[must_use]
    pub fn render_frame_call_count(&self) -> usize {
        self.renderer.borrow().render_frame_call_count
    }

    /// Shorthand for the updater's call count.
    #[must_use]
    pub fn update_sessions_call_count(&self) -> usize {
        self.updater.borrow().update_sessions_call_count()
    }

    fn advance_clock(&mut self, time: HostTime) {
        self.test_loop.advance_to(time);
        let interval = self.vsync.vsync_interval();
        if !interval.is_zero() {
            let now = self.test_loop.now().nanos();
            self.vsync
                .set_last_vsync_time(HostTime(now - now % interval.nanos()));
        }
    }
}
