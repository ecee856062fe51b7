// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame scheduling: latching client updates and pacing renders to vsync.
//!
//! The [`FrameScheduler`] owns every pending update request. When a request
//! arrives it asks the [`FramePredictor`] for the latch point of the vsync the
//! request can make, and posts a wake-up for that time. On wake-up it applies
//! every due update through the [`SessionUpdater`]s and, if anything changed,
//! hands a frame to the [`FrameRenderer`]. When the frame's timings finalize,
//! the host calls [`FrameScheduler::dispatch_presentations`], which feeds the
//! measured durations back into the predictor, records statistics, and
//! tells each updater which presents were shown.
//!
//! At most one frame is between dispatch and presentation at any time.
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut scheduler = FrameScheduler::new(config, vsync, Box::new(timer))?;
//! scheduler.initialize(renderer, updaters)?;
//!
//! // protocol layer
//! let present_id = scheduler.register_present(session, fences, None);
//! scheduler.schedule_update_for_session(requested_time, SchedulingIdPair::new(session, present_id), true);
//!
//! // host event loop
//! on_timer_fired(|| scheduler.maybe_render_frame());
//! on_idle(|| scheduler.dispatch_presentations());
//! ```

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::mem;

use hashbrown::HashMap;
use tracing::{debug, info, trace, warn};

use crate::backend::{
    FrameRenderer, LatchedTimes, PresentTimestamps, SessionUpdateMap, SessionUpdater,
    UpdateResults,
};
use crate::config::FrameSchedulerConfig;
use crate::error::{ConfigError, InitError};
use crate::frame_stats::FrameStats;
use crate::frame_timings::{FrameTimings, FrameTimingsRef, Timestamps};
use crate::id::{Fence, PresentId, SchedulingIdPair, SessionId};
use crate::predictor::{FramePredictor, PredictedTimes, PredictionRequest};
use crate::time::{Duration, HostTime};
use crate::timer::WakeupTimer;
use crate::trace::{
    FrameDispatchedEvent, FramePresentedEvent, SessionRemovedEvent, TraceSink, Tracer,
    UpdatesAppliedEvent, WakeupScheduledEvent, WakeupWithoutRenderEvent,
};
use crate::vsync::VsyncTiming;

/// Upper bound on frames whose timings the scheduler owns at once: one
/// rendering and one awaiting presentation confirmation.
pub const MAX_OUTSTANDING_FRAMES: usize = 2;

/// A finalized frame awaiting delivery to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentedFrame {
    /// Frame counter.
    pub frame_number: u64,
    /// Final timestamps.
    pub timestamps: Timestamps,
}

#[derive(Clone, Copy, Debug)]
struct PendingPresentRequest {
    requested_presentation_time: HostTime,
    squashable: bool,
}

/// Sessions and their latest present latched into one frame.
#[derive(Debug)]
struct FrameUpdate {
    frame_number: u64,
    updated_sessions: SessionUpdateMap,
}

/// FIFO shared between the scheduler and the completion callbacks of its
/// frame timings.
#[derive(Clone, Debug, Default)]
struct PresentationQueue(Rc<RefCell<VecDeque<PresentedFrame>>>);

impl PresentationQueue {
    fn push(&self, frame: PresentedFrame) {
        self.0.borrow_mut().push_back(frame);
    }

    fn pop(&self) -> Option<PresentedFrame> {
        self.0.borrow_mut().pop_front()
    }

    fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Decides when to latch client updates, when to render, and which vsync
/// each frame targets.
///
/// All methods run on one thread. The host delivers timer wake-ups through
/// [`maybe_render_frame`](Self::maybe_render_frame) and finalized frames
/// through [`dispatch_presentations`](Self::dispatch_presentations).
pub struct FrameScheduler {
    config: FrameSchedulerConfig,
    vsync: Rc<dyn VsyncTiming>,
    timer: Box<dyn WakeupTimer>,
    predictor: Box<dyn FramePredictor>,
    stats: FrameStats,
    tracer: Tracer,

    frame_renderer: Option<Weak<RefCell<dyn FrameRenderer>>>,
    session_updaters: Vec<Weak<RefCell<dyn SessionUpdater>>>,

    render_continuously: bool,
    /// Set when an update needed rendering but a frame was still in flight.
    render_pending: bool,
    /// Latch point of the posted wake-up.
    wakeup_time: Option<HostTime>,
    next_target_presentation_time: HostTime,

    /// Number the next rendered frame gets. Starts at 1.
    frame_number: u64,
    last_presented_frame_number: u64,
    wakeups_without_render: u64,

    pending_present_requests: BTreeMap<SchedulingIdPair, PendingPresentRequest>,
    /// Registered presents and their latch time once latched.
    presents: BTreeMap<SchedulingIdPair, Option<HostTime>>,
    release_fences: BTreeMap<SchedulingIdPair, Vec<Fence>>,
    /// Sessions whose non-squashable present was latched, keyed to the frame
    /// that latched it. Cleared once that frame is retired.
    sessions_with_unsquashable_updates_pending_presentation: HashMap<SessionId, u64>,
    pending_frame_updates: VecDeque<FrameUpdate>,
    /// Latest present per session from frames that were dropped, delivered
    /// with the next presented frame.
    dropped_frame_carry_over: SessionUpdateMap,

    outstanding_frames: VecDeque<Rc<RefCell<FrameTimings>>>,
    presentation_queue: PresentationQueue,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("config", &self.config)
            .field("frame_number", &self.frame_number)
            .field(
                "last_presented_frame_number",
                &self.last_presented_frame_number,
            )
            .field("render_continuously", &self.render_continuously)
            .field("render_pending", &self.render_pending)
            .field("wakeup_time", &self.wakeup_time)
            .field("pending_requests", &self.pending_present_requests.len())
            .finish_non_exhaustive()
    }
}

impl FrameScheduler {
    /// Creates an uninitialized scheduler.
    ///
    /// Updates may be registered and scheduled before
    /// [`initialize`](Self::initialize); nothing is latched until then.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `config` fails validation.
    pub fn new(
        config: FrameSchedulerConfig,
        vsync: Rc<dyn VsyncTiming>,
        timer: Box<dyn WakeupTimer>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            predictor: config.predictor.build()?,
            stats: FrameStats::new(config.stats),
            tracer: Tracer::none(),
            vsync,
            timer,
            frame_renderer: None,
            session_updaters: Vec::new(),
            render_continuously: config.render_continuously,
            render_pending: false,
            wakeup_time: None,
            next_target_presentation_time: HostTime::ZERO,
            frame_number: 1,
            last_presented_frame_number: 0,
            wakeups_without_render: 0,
            pending_present_requests: BTreeMap::new(),
            presents: BTreeMap::new(),
            release_fences: BTreeMap::new(),
            sessions_with_unsquashable_updates_pending_presentation: HashMap::new(),
            pending_frame_updates: VecDeque::new(),
            dropped_frame_carry_over: BTreeMap::new(),
            outstanding_frames: VecDeque::new(),
            presentation_queue: PresentationQueue::default(),
            config,
        })
    }

    /// Connects the renderer and session updaters and starts scheduling any
    /// updates queued so far.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::NoSessionUpdaters`] for an empty updater list and
    /// [`InitError::RendererGone`] for a dead renderer handle.
    ///
    /// # Panics
    ///
    /// Panics if called a second time.
    pub fn initialize(
        &mut self,
        frame_renderer: Weak<RefCell<dyn FrameRenderer>>,
        session_updaters: Vec<Weak<RefCell<dyn SessionUpdater>>>,
    ) -> Result<(), InitError> {
        assert!(
            self.frame_renderer.is_none(),
            "FrameScheduler initialized twice"
        );
        if session_updaters.is_empty() {
            return Err(InitError::NoSessionUpdaters);
        }
        if frame_renderer.strong_count() == 0 {
            return Err(InitError::RendererGone);
        }
        info!(
            updaters = session_updaters.len(),
            "frame scheduler initialized"
        );
        self.frame_renderer = Some(frame_renderer);
        self.session_updaters = session_updaters;
        self.continue_scheduling();
        Ok(())
    }

    /// Installs a trace sink, replacing any previous one.
    ///
    /// Events only reach the sink when the `trace` feature is enabled.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.tracer.set_sink(sink);
    }

    /// Records `present_id` (or a freshly allocated id) for `session_id`
    /// together with the fences to release once it is latched and the
    /// preceding renders finish.
    pub fn register_present(
        &mut self,
        session_id: SessionId,
        release_fences: Vec<Fence>,
        present_id: Option<PresentId>,
    ) -> PresentId {
        let present_id = present_id.unwrap_or_else(PresentId::next);
        let id = SchedulingIdPair::new(session_id, present_id);
        self.presents.entry(id).or_insert(None);
        if !release_fences.is_empty() {
            self.release_fences
                .entry(id)
                .or_default()
                .extend(release_fences);
        }
        present_id
    }

    /// Queues an update to be shown no earlier than
    /// `requested_presentation_time` and reevaluates the next wake-up.
    ///
    /// A non-squashable update is never folded into a later one; the frame
    /// that latches it latches nothing newer for the session.
    pub fn schedule_update_for_session(
        &mut self,
        requested_presentation_time: HostTime,
        id: SchedulingIdPair,
        squashable: bool,
    ) {
        if !self.presents.contains_key(&id) {
            warn!(?id, "update scheduled for unregistered present; registering it");
            self.presents.insert(id, None);
        }
        self.pending_present_requests.insert(
            id,
            PendingPresentRequest {
                requested_presentation_time,
                squashable,
            },
        );
        if self.is_initialized() {
            self.request_frame(requested_presentation_time);
        }
    }

    /// Purges every pending request, latched time, fence, and in-flight
    /// reference for `session_id`. Idempotent.
    pub fn remove_session(&mut self, session_id: SessionId) {
        self.purge_session(session_id, false);
    }

    /// Predicts up to `max_future_presentation_infos` upcoming latch points
    /// and presentation times, covering at most `requested_prediction_span`
    /// from now. Does not change scheduler state.
    #[must_use]
    pub fn get_future_presentation_infos(
        &self,
        requested_prediction_span: Duration,
    ) -> Vec<PredictedTimes> {
        let start = self.timer.now();
        let end = start.saturating_add(requested_prediction_span);
        let vsync_interval = self.vsync.vsync_interval();
        let cap = self.config.max_future_presentation_infos;

        let mut infos = Vec::with_capacity(cap);
        let mut now = start;
        let mut last_vsync_time = self.vsync.last_vsync_time();
        while infos.len() < cap && now <= end {
            let times = self.predictor.get_prediction(PredictionRequest {
                now,
                requested_presentation_time: HostTime::ZERO,
                last_vsync_time,
                vsync_interval,
            });
            infos.push(times);
            now = times.latch_point_time.saturating_add(Duration(1));
            last_vsync_time = times.presentation_time;
        }
        infos
    }

    /// Turns continuous rendering on or off. While on, a frame is rendered
    /// for every vsync the pipeline can make, whether or not updates arrive.
    pub fn set_render_continuously(&mut self, render_continuously: bool) {
        self.render_continuously = render_continuously;
        if render_continuously && self.is_initialized() {
            self.request_frame(HostTime::ZERO);
        }
    }

    /// Wake-up handler: latches due updates and renders a frame if one is
    /// needed and none is in flight.
    pub fn maybe_render_frame(&mut self) {
        self.wakeup_time = None;
        if !self.is_initialized() {
            debug!("wake-up before initialization ignored");
            return;
        }

        let latch_time = self.timer.now();
        let target_presentation_time = if self.next_target_presentation_time > latch_time {
            self.next_target_presentation_time
        } else {
            // The wake-up ran late and missed its vsync.
            self.predict(latch_time, latch_time).presentation_time
        };

        let needs_render = self.apply_updates(target_presentation_time, latch_time);
        let update_done_time = self.timer.now();
        self.predictor
            .report_update_duration(update_done_time.saturating_duration_since(latch_time));
        if needs_render {
            self.render_pending = true;
        }

        let frame_in_flight = self.frame_in_flight();
        if !self.render_pending && !self.render_continuously && !frame_in_flight {
            self.wakeups_without_render += 1;
            trace!(
                total = self.wakeups_without_render,
                "wake-up without render"
            );
            self.tracer
                .wakeup_without_render(&WakeupWithoutRenderEvent {
                    now: latch_time,
                    total: self.wakeups_without_render,
                });
            // Nothing will be presented to resolve these.
            self.sessions_with_unsquashable_updates_pending_presentation
                .clear();
            self.handle_next_frame_request();
            return;
        }

        if frame_in_flight {
            debug!(
                frame_number = self.frame_number,
                "previous frame still in flight; deferring render"
            );
            return;
        }

        self.render_frame(target_presentation_time, latch_time, update_done_time);
    }

    /// Delivers every finalized frame to
    /// [`on_frame_presented`](Self::on_frame_presented), in order. Returns
    /// how many were delivered.
    pub fn dispatch_presentations(&mut self) -> usize {
        let mut dispatched = 0;
        while let Some(frame) = self.presentation_queue.pop() {
            self.on_frame_presented(frame);
            dispatched += 1;
        }
        dispatched
    }

    /// Retires a finalized frame: records statistics, feeds the render
    /// duration back to the predictor, signals presented updates, and
    /// continues scheduling.
    ///
    /// # Panics
    ///
    /// Panics if frames are not presented in frame-number order or the frame
    /// was never dispatched.
    pub fn on_frame_presented(&mut self, frame: PresentedFrame) {
        let PresentedFrame {
            frame_number,
            timestamps,
        } = frame;
        assert_eq!(
            frame_number,
            self.last_presented_frame_number + 1,
            "frames must be presented in order"
        );
        assert!(
            frame_number < self.frame_number,
            "frame {frame_number} presented before it was rendered"
        );
        self.last_presented_frame_number = frame_number;
        if self
            .outstanding_frames
            .front()
            .is_some_and(|t| t.borrow().frame_number() == frame_number)
        {
            let _ = self.outstanding_frames.pop_front();
        }

        let vsync_interval = self.vsync.vsync_interval();
        let status = self.stats.record_frame(timestamps, vsync_interval);
        if let Some(export) = self.stats.poll_export(self.timer.now()) {
            self.tracer.histogram_export(&export);
        }
        self.tracer.frame_presented(&FramePresentedEvent {
            frame_number,
            timestamps,
            status,
        });
        debug!(
            frame_number,
            ?status,
            actual = ?timestamps.actual_presentation_time,
            "frame presented"
        );

        if let Some(render_duration) = timestamps.render_duration() {
            self.predictor.report_render_duration(render_duration);
        }

        match timestamps.actual_presentation_time {
            Some(presented_time) => self.signal_presented_up_to(
                frame_number,
                PresentTimestamps {
                    presented_time,
                    vsync_interval,
                },
            ),
            None => self.carry_over_dropped_up_to(frame_number),
        }

        self.sessions_with_unsquashable_updates_pending_presentation
            .retain(|_, latched_in| *latched_in > frame_number);
        self.continue_scheduling();
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.frame_renderer.is_some()
    }

    /// Frame statistics.
    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Wake-ups that found nothing to render.
    #[must_use]
    pub fn wakeups_without_render(&self) -> u64 {
        self.wakeups_without_render
    }

    /// Number the next rendered frame will get.
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Number of the last frame retired, or 0 before any.
    #[must_use]
    pub fn last_presented_frame_number(&self) -> u64 {
        self.last_presented_frame_number
    }

    /// Requests waiting to be latched.
    #[must_use]
    pub fn pending_request_count(&self) -> usize {
        self.pending_present_requests.len()
    }

    /// Frames whose timings are still owned by the scheduler.
    #[must_use]
    pub fn outstanding_frame_count(&self) -> usize {
        self.outstanding_frames.len()
    }

    /// Whether finalized frames await
    /// [`dispatch_presentations`](Self::dispatch_presentations).
    #[must_use]
    pub fn has_pending_presentations(&self) -> bool {
        !self.presentation_queue.is_empty()
    }

    /// Whether continuous rendering is on.
    #[must_use]
    pub fn render_continuously(&self) -> bool {
        self.render_continuously
    }

    fn frame_in_flight(&self) -> bool {
        self.last_presented_frame_number + 1 < self.frame_number
    }

    fn predict(&self, now: HostTime, requested_presentation_time: HostTime) -> PredictedTimes {
        self.predictor.get_prediction(PredictionRequest {
            now,
            requested_presentation_time,
            last_vsync_time: self.vsync.last_vsync_time(),
            vsync_interval: self.vsync.vsync_interval(),
        })
    }

    /// Posts a wake-up for the latch point of `requested_presentation_time`
    /// unless an earlier one is already posted.
    fn request_frame(&mut self, requested_presentation_time: HostTime) {
        let now = self.timer.now();
        let PredictedTimes {
            latch_point_time,
            presentation_time,
        } = self.predict(now, requested_presentation_time);

        let earlier_wakeup_posted = self.timer.is_wakeup_pending()
            && self.wakeup_time.is_some_and(|t| t <= latch_point_time);
        if earlier_wakeup_posted {
            return;
        }

        self.timer.cancel_wakeup();
        self.wakeup_time = Some(latch_point_time);
        self.next_target_presentation_time = presentation_time;
        self.timer.schedule_wakeup(latch_point_time);

        debug!(
            ?requested_presentation_time,
            wakeup = ?latch_point_time,
            target = ?presentation_time,
            "wake-up scheduled"
        );
        self.tracer.wakeup_scheduled(&WakeupScheduledEvent {
            now,
            requested_presentation_time,
            target_presentation_time: presentation_time,
            wakeup_time: latch_point_time,
        });
    }

    fn handle_next_frame_request(&mut self) {
        let earliest = self
            .pending_present_requests
            .values()
            .map(|r| r.requested_presentation_time)
            .min();
        if let Some(requested_presentation_time) = earliest {
            self.request_frame(requested_presentation_time);
        }
    }

    fn continue_scheduling(&mut self) {
        if self.render_continuously || self.render_pending {
            self.request_frame(HostTime::ZERO);
        } else {
            self.handle_next_frame_request();
        }
    }

    /// Latches due updates for the frame aimed at `target_presentation_time`
    /// and applies them. Returns whether any updater needs a render.
    fn apply_updates(&mut self, target_presentation_time: HostTime, latch_time: HostTime) -> bool {
        let sessions_to_update = self.collect_updates_for_this_frame(target_presentation_time);
        let mut results = UpdateResults::default();
        if !sessions_to_update.is_empty() {
            self.prepare_updates(&sessions_to_update, latch_time);

            self.session_updaters.retain(|u| u.strong_count() > 0);
            for updater in self.session_updaters.iter().filter_map(Weak::upgrade) {
                results.merge(
                    updater
                        .borrow_mut()
                        .update_sessions(&sessions_to_update, self.frame_number),
                );
            }
        }

        let failed = results.sessions_with_failed_updates.len();
        for session_id in results.sessions_with_failed_updates {
            warn!(?session_id, "session update failed; removing session");
            self.purge_session(session_id, true);
        }

        self.tracer.updates_applied(&UpdatesAppliedEvent {
            frame_number: self.frame_number,
            latch_time,
            sessions_updated: sessions_to_update.len(),
            sessions_failed: failed,
            needs_render: results.needs_render,
            update_duration: self.timer.now().saturating_duration_since(latch_time),
        });
        results.needs_render
    }

    /// Picks the latest due present per session, honoring the squash rules,
    /// and removes the absorbed requests.
    fn collect_updates_for_this_frame(
        &mut self,
        target_presentation_time: HostTime,
    ) -> SessionUpdateMap {
        let mut sessions_to_update = SessionUpdateMap::new();
        let mut current_session = None;
        let mut hit_limit = false;
        let frame_number = self.frame_number;
        let unsquashable = &mut self.sessions_with_unsquashable_updates_pending_presentation;

        self.pending_present_requests.retain(|id, request| {
            if current_session != Some(id.session_id) {
                current_session = Some(id.session_id);
                hit_limit = unsquashable.contains_key(&id.session_id);
            }
            if hit_limit {
                return true;
            }
            if request.requested_presentation_time > target_presentation_time {
                hit_limit = true;
                return true;
            }

            trace!(?id, squashable = request.squashable, "present latched");
            sessions_to_update.insert(id.session_id, id.present_id);
            if !request.squashable {
                hit_limit = true;
                unsquashable.insert(id.session_id, frame_number);
            }
            false
        });
        sessions_to_update
    }

    /// Stamps latch times, hands release fences to the renderer, and queues
    /// the frame's update record.
    fn prepare_updates(&mut self, sessions_to_update: &SessionUpdateMap, latch_time: HostTime) {
        let mut fences = Vec::new();
        for (&session_id, &present_id) in sessions_to_update {
            let range = SchedulingIdPair::session_start(session_id)
                ..=SchedulingIdPair::new(session_id, present_id);

            for latched in self.presents.range_mut(range.clone()).map(|(_, t)| t) {
                if latched.is_none() {
                    *latched = Some(latch_time);
                }
            }

            let fenced: Vec<SchedulingIdPair> =
                self.release_fences.range(range).map(|(id, _)| *id).collect();
            for id in fenced {
                fences.extend(self.release_fences.remove(&id).unwrap_or_default());
            }
        }

        if !fences.is_empty()
            && let Some(renderer) = self.frame_renderer.as_ref().and_then(Weak::upgrade)
        {
            renderer
                .borrow_mut()
                .signal_fences_when_previous_renders_are_done(fences);
        }

        self.pending_frame_updates.push_back(FrameUpdate {
            frame_number: self.frame_number,
            updated_sessions: sessions_to_update.clone(),
        });
    }

    fn render_frame(
        &mut self,
        target_presentation_time: HostTime,
        latch_time: HostTime,
        update_done_time: HostTime,
    ) {
        let frame_number = self.frame_number;
        let render_start_time = self.timer.now();
        let queue = self.presentation_queue.clone();
        let mut timings = FrameTimings::new(
            frame_number,
            target_presentation_time,
            latch_time,
            render_start_time,
            Box::new(move |finalized: &FrameTimings| {
                queue.push(PresentedFrame {
                    frame_number: finalized.frame_number(),
                    timestamps: finalized.timestamps(),
                });
            }),
        );
        timings.on_frame_updated(update_done_time);
        let timings = Rc::new(RefCell::new(timings));
        self.outstanding_frames.push_back(Rc::clone(&timings));
        debug_assert!(
            self.outstanding_frames.len() <= MAX_OUTSTANDING_FRAMES,
            "too many outstanding frames"
        );

        self.frame_number += 1;
        self.render_pending = false;

        if frame_number == 1 {
            info!(target = ?target_presentation_time, "rendering first frame");
        }
        debug!(
            frame_number,
            target = ?target_presentation_time,
            latch = ?latch_time,
            "dispatching frame"
        );
        self.tracer.frame_dispatched(&FrameDispatchedEvent {
            frame_number,
            latch_point_time: latch_time,
            render_start_time,
            target_presentation_time,
        });

        match self.frame_renderer.as_ref().and_then(Weak::upgrade) {
            Some(renderer) => renderer.borrow_mut().render_scheduled_frame(
                frame_number,
                target_presentation_time,
                FrameTimingsRef::new(&timings),
            ),
            None => {
                warn!(frame_number, "frame renderer is gone; skipping frame");
                timings.borrow_mut().on_frame_skipped();
            }
        }

        for updater in self.session_updaters.iter().filter_map(Weak::upgrade) {
            updater.borrow_mut().on_cpu_work_done();
        }

        self.continue_scheduling();
    }

    /// Delivers latch times for every present shown by frames up to
    /// `frame_number`, including presents carried over from dropped frames.
    fn signal_presented_up_to(&mut self, frame_number: u64, timestamps: PresentTimestamps) {
        let mut last_presents = mem::take(&mut self.dropped_frame_carry_over);
        self.drain_frame_updates_up_to(frame_number, &mut last_presents);

        let mut latched_times = LatchedTimes::new();
        for (session_id, present_id) in last_presents {
            let range = SchedulingIdPair::session_start(session_id)
                ..=SchedulingIdPair::new(session_id, present_id);
            let latched: Vec<SchedulingIdPair> = self
                .presents
                .range(range)
                .filter(|(_, t)| t.is_some())
                .map(|(id, _)| *id)
                .collect();

            let mut times = BTreeMap::new();
            for id in latched {
                if let Some(Some(latched_time)) = self.presents.remove(&id) {
                    times.insert(id.present_id, latched_time);
                }
            }
            if !times.is_empty() {
                latched_times.insert(session_id, times);
            }
        }

        if latched_times.is_empty() {
            return;
        }
        for updater in self.session_updaters.iter().filter_map(Weak::upgrade) {
            updater
                .borrow_mut()
                .on_frame_presented(&latched_times, timestamps);
        }
    }

    fn carry_over_dropped_up_to(&mut self, frame_number: u64) {
        let mut carry_over = mem::take(&mut self.dropped_frame_carry_over);
        self.drain_frame_updates_up_to(frame_number, &mut carry_over);
        self.dropped_frame_carry_over = carry_over;
    }

    fn drain_frame_updates_up_to(&mut self, frame_number: u64, into: &mut SessionUpdateMap) {
        while let Some(update) = self.pending_frame_updates.front()
            && update.frame_number <= frame_number
        {
            if let Some(update) = self.pending_frame_updates.pop_front() {
                into.extend(update.updated_sessions);
            }
        }
    }

    fn purge_session(&mut self, session_id: SessionId, update_failed: bool) {
        self.pending_present_requests
            .retain(|id, _| id.session_id != session_id);
        self.presents.retain(|id, _| id.session_id != session_id);
        self.release_fences
            .retain(|id, _| id.session_id != session_id);
        self.sessions_with_unsquashable_updates_pending_presentation
            .remove(&session_id);
        self.dropped_frame_carry_over.remove(&session_id);
        for update in &mut self.pending_frame_updates {
            update.updated_sessions.remove(&session_id);
        }

        debug!(?session_id, update_failed, "session removed");
        self.tracer.session_removed(&SessionRemovedEvent {
            now: self.timer.now(),
            session_id,
            update_failed,
        });
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::config::PredictorConfig;
    use crate::testing::{MockFrameRenderer, MockSessionUpdater, SchedulerHarness, TestLoop};
    use crate::vsync::VsyncTimingState;

    const VSYNC: Duration = Duration::from_millis(100);

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    fn harness() -> SchedulerHarness {
        SchedulerHarness::new(FrameSchedulerConfig::low_latency(), VSYNC)
    }

    fn schedule(h: &mut SchedulerHarness, session: u64, requested: HostTime, squashable: bool) -> PresentId {
        let session_id = SessionId(session);
        let present_id = h.scheduler.register_present(session_id, Vec::new(), None);
        h.scheduler.schedule_update_for_session(
            requested,
            SchedulingIdPair::new(session_id, present_id),
            squashable,
        );
        present_id
    }

    fn uninitialized() -> FrameScheduler {
        FrameScheduler::new(
            FrameSchedulerConfig::low_latency(),
            Rc::new(VsyncTimingState::default()),
            Box::new(TestLoop::new()),
        )
        .expect("valid config")
    }

    #[test]
    fn single_update_renders_once() {
        let mut h = harness();
        schedule(&mut h, 1, HostTime::ZERO, true);

        h.run_for(VSYNC);
        assert_eq!(h.end_frame(), Some(1));

        assert_eq!(h.update_sessions_call_count(), 1);
        assert_eq!(h.render_frame_call_count(), 1);
        assert_eq!(h.scheduler.last_presented_frame_number(), 1);
        assert_eq!(h.updater.borrow().cpu_work_done_count, 1);
    }

    #[test]
    fn request_between_vsyncs_waits_for_next_grid_point() {
        let mut h = harness();
        schedule(&mut h, 1, ms(150), true);

        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 0, "too early after one vsync");

        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 1);
        let target = h.renderer.borrow().frames[0].target_presentation_time;
        assert_eq!(target, ms(200));
    }

    #[test]
    fn at_most_one_frame_in_flight() {
        let mut h = harness();
        for _ in 0..MAX_OUTSTANDING_FRAMES + 3 {
            let now = h.now();
            schedule(&mut h, 1, now, true);
            h.run_for(VSYNC);
        }
        let renders = h.render_frame_call_count();
        assert!(renders <= MAX_OUTSTANDING_FRAMES, "rendered {renders} frames");
        assert_eq!(renders, 1, "never dispatches a second frame before the first is presented");
        assert!(h.scheduler.outstanding_frame_count() <= MAX_OUTSTANDING_FRAMES);

        // Presenting the first frame releases the latched work.
        h.end_frame();
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 2);
    }

    #[test]
    fn squash_stops_at_unsquashable_present() {
        let mut h = harness();
        let _p1 = schedule(&mut h, 1, ms(0), true);
        let _p2 = schedule(&mut h, 1, ms(10), true);
        let p3 = schedule(&mut h, 1, ms(20), false);
        let p4 = schedule(&mut h, 1, ms(30), true);

        h.run_until(ms(150));
        {
            let updater = h.updater.borrow();
            assert_eq!(updater.update_sessions_call_count(), 1);
            assert_eq!(updater.updates[0].get(&SessionId(1)), Some(&p3));
        }
        assert_eq!(h.scheduler.pending_request_count(), 1, "P4 waits");

        h.end_frame();
        h.run_for(VSYNC);
        let updater = h.updater.borrow();
        assert_eq!(updater.update_sessions_call_count(), 2);
        assert_eq!(updater.updates[1].get(&SessionId(1)), Some(&p4));
    }

    #[test]
    fn unsquashable_present_latched_in_flight_blocks_session_until_its_frame() {
        let mut h = harness();
        schedule(&mut h, 1, HostTime::ZERO, true);
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 1, "frame 1 in flight");

        let now = h.now();
        let pa = schedule(&mut h, 2, now, false);
        let pb = schedule(&mut h, 2, now, true);
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 1, "still waiting on frame 1");
        assert_eq!(h.update_sessions_call_count(), 2);
        assert_eq!(h.updater.borrow().updates[1].get(&SessionId(2)), Some(&pa));

        // Retiring frame 1 must not release the hold Pa placed on frame 2.
        h.end_frame();
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 2);
        assert_eq!(
            h.update_sessions_call_count(),
            2,
            "Pb must not join the frame that carries Pa"
        );
        assert_eq!(h.scheduler.pending_request_count(), 1);

        h.end_frame();
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 3);
        let updater = h.updater.borrow();
        assert_eq!(updater.update_sessions_call_count(), 3);
        assert_eq!(updater.updates[2].get(&SessionId(2)), Some(&pb));
    }

    #[test]
    fn sessions_are_collected_independently() {
        let mut h = harness();
        let a = schedule(&mut h, 1, ms(0), false);
        let _a2 = schedule(&mut h, 1, ms(0), true);
        let b = schedule(&mut h, 2, ms(0), true);
        let _late = schedule(&mut h, 3, ms(500), true);

        h.run_until(ms(100));
        let updater = h.updater.borrow();
        let update = &updater.updates[0];
        assert_eq!(update.get(&SessionId(1)), Some(&a));
        assert_eq!(update.get(&SessionId(2)), Some(&b));
        assert!(!update.contains_key(&SessionId(3)), "not due yet");
    }

    #[test]
    fn presentation_callbacks_arrive_in_submission_order() {
        let mut h = harness();
        let mut submitted = Vec::new();
        for _ in 0..4 {
            let now = h.now();
            submitted.push(schedule(&mut h, 1, now, true));
            submitted.push(schedule(&mut h, 1, now, true));
            h.run_for(VSYNC);
            h.end_frame();
        }

        let updater = h.updater.borrow();
        let mut seen = Vec::new();
        let mut last_latch = HostTime::ZERO;
        for (latched, timestamps) in &updater.presentations {
            for (&present_id, &latched_time) in &latched[&SessionId(1)] {
                assert!(latched_time >= last_latch, "latch times never go backwards");
                assert!(latched_time <= timestamps.presented_time);
                last_latch = latched_time;
                seen.push(present_id);
            }
        }
        assert_eq!(seen, submitted, "every present confirmed once, in order");
    }

    #[test]
    fn remove_session_purges_in_flight_state() {
        let mut h = harness();
        let session = SessionId(7);
        let present = h
            .scheduler
            .register_present(session, vec![Fence(1)], None);
        h.scheduler
            .schedule_update_for_session(HostTime::ZERO, SchedulingIdPair::new(session, present), true);
        let _queued = schedule(&mut h, 7, ms(900), true);

        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 1);
        h.scheduler.remove_session(session);
        h.scheduler.remove_session(session);
        assert_eq!(h.scheduler.pending_request_count(), 0);

        h.end_frame();
        assert_eq!(
            h.updater.borrow().on_frame_presented_call_count(),
            0,
            "no callback for a removed session"
        );
        assert_eq!(h.renderer.borrow().signaled_fences, vec![Fence(1)]);
    }

    #[test]
    fn failed_update_tears_session_down() {
        let mut h = harness();
        h.updater
            .borrow_mut()
            .failing_sessions
            .insert(SessionId(2));
        schedule(&mut h, 1, HostTime::ZERO, true);
        schedule(&mut h, 2, HostTime::ZERO, true);
        schedule(&mut h, 2, ms(400), true);

        h.run_for(VSYNC);
        assert_eq!(h.scheduler.pending_request_count(), 0, "session 2 purged");
        h.end_frame();

        let updater = h.updater.borrow();
        let (latched, _) = &updater.presentations[0];
        assert!(latched.contains_key(&SessionId(1)));
        assert!(!latched.contains_key(&SessionId(2)));
    }

    #[test]
    fn fences_are_released_when_latched() {
        let mut h = harness();
        let session = SessionId(1);
        let first = h
            .scheduler
            .register_present(session, vec![Fence(10), Fence(11)], None);
        let second = h.scheduler.register_present(session, vec![Fence(12)], None);
        h.scheduler
            .schedule_update_for_session(HostTime::ZERO, SchedulingIdPair::new(session, first), true);
        h.scheduler
            .schedule_update_for_session(ms(1_000), SchedulingIdPair::new(session, second), true);

        h.run_for(VSYNC);
        assert_eq!(
            h.renderer.borrow().signaled_fences,
            vec![Fence(10), Fence(11)]
        );
    }

    #[test]
    fn dropped_frame_presents_carry_over() {
        let mut h = harness();
        let p1 = schedule(&mut h, 1, HostTime::ZERO, true);
        h.run_for(VSYNC);
        assert_eq!(h.drop_frame(), Some(1));
        assert_eq!(h.updater.borrow().on_frame_presented_call_count(), 0);
        assert_eq!(h.scheduler.stats().summary().dropped_frames, 1);

        let now = h.now();
        let p2 = schedule(&mut h, 1, now, true);
        h.run_for(VSYNC);
        assert_eq!(h.end_frame(), Some(2));

        let updater = h.updater.borrow();
        assert_eq!(updater.on_frame_presented_call_count(), 1);
        let presented: Vec<_> = updater.presentations[0].0[&SessionId(1)]
            .keys()
            .copied()
            .collect();
        assert_eq!(presented, vec![p1, p2]);
    }

    #[test]
    fn wakeup_without_render_reschedules_nothing() {
        let mut h = harness();
        h.updater.borrow_mut().needs_render = false;
        schedule(&mut h, 1, HostTime::ZERO, true);

        h.run_for(VSYNC * 3);
        assert_eq!(h.render_frame_call_count(), 0);
        assert_eq!(h.scheduler.wakeups_without_render(), 1);
        assert_eq!(h.test_loop.pending_wakeup(), None);
    }

    #[test]
    fn earliest_wakeup_wins() {
        let mut h = harness();
        schedule(&mut h, 1, ms(500), true);
        let late = h.test_loop.pending_wakeup().expect("wake-up posted");

        schedule(&mut h, 2, HostTime::ZERO, true);
        let early = h.test_loop.pending_wakeup().expect("wake-up posted");
        assert!(early < late, "new earlier request preempts");

        schedule(&mut h, 3, ms(800), true);
        assert_eq!(h.test_loop.pending_wakeup(), Some(early), "later request never delays");
    }

    #[test]
    fn render_continuously_keeps_rendering() {
        let mut h = harness();
        h.scheduler.set_render_continuously(true);
        for _ in 0..3 {
            h.run_for(VSYNC);
            h.end_frame();
        }
        assert_eq!(h.render_frame_call_count(), 3);
        assert_eq!(h.update_sessions_call_count(), 0, "no updates were pending");

        h.scheduler.set_render_continuously(false);
        h.run_for(VSYNC * 3);
        h.end_frame();
        assert!(h.render_frame_call_count() <= 4);
    }

    #[test]
    fn late_presentation_is_recorded_as_delayed() {
        let mut h = harness();
        schedule(&mut h, 1, HostTime::ZERO, true);
        h.run_for(VSYNC);
        let target = h.renderer.borrow().frames[0].target_presentation_time;
        h.end_frame_at(target + VSYNC + VSYNC / 2);

        let summary = h.scheduler.stats().summary();
        assert_eq!(summary.total_frames, 1);
        assert_eq!(summary.delayed_frames, 1);
    }

    #[test]
    fn unregistered_present_is_auto_registered() {
        let mut h = harness();
        let id = SchedulingIdPair::new(SessionId(4), PresentId(9_999_999));
        h.scheduler.schedule_update_for_session(HostTime::ZERO, id, true);
        h.run_for(VSYNC);
        h.end_frame();
        let updater = h.updater.borrow();
        assert!(updater.presentations[0].0[&SessionId(4)].contains_key(&id.present_id));
    }

    #[test]
    fn updates_scheduled_before_initialize_start_on_initialize() {
        let mut scheduler = uninitialized();
        let present = scheduler.register_present(SessionId(1), Vec::new(), Some(PresentId(5)));
        assert_eq!(present, PresentId(5));
        scheduler.schedule_update_for_session(
            HostTime::ZERO,
            SchedulingIdPair::new(SessionId(1), present),
            true,
        );
        assert_eq!(scheduler.pending_request_count(), 1);
        scheduler.maybe_render_frame();
        assert_eq!(scheduler.frame_number(), 1, "nothing rendered uninitialized");
    }

    #[test]
    fn initialize_rejects_bad_collaborators() {
        let renderer = Rc::new(RefCell::new(MockFrameRenderer::default()));
        let weak_renderer = Rc::downgrade(&renderer);
        let weak_renderer: Weak<RefCell<dyn FrameRenderer>> = weak_renderer;
        let mut scheduler = uninitialized();
        assert_eq!(
            scheduler.initialize(weak_renderer, Vec::new()),
            Err(InitError::NoSessionUpdaters)
        );

        let updater = Rc::new(RefCell::new(MockSessionUpdater::default()));
        let weak_updater = Rc::downgrade(&updater);
        let weak_updater: Weak<RefCell<dyn SessionUpdater>> = weak_updater;
        let gone = Rc::downgrade(&Rc::new(RefCell::new(MockFrameRenderer::default())));
        let gone: Weak<RefCell<dyn FrameRenderer>> = gone;
        assert_eq!(
            scheduler.initialize(gone, vec![weak_updater]),
            Err(InitError::RendererGone)
        );
        assert!(!scheduler.is_initialized());
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn double_initialize_is_fatal() {
        let mut h = harness();
        let updater = Rc::downgrade(&h.updater);
        let updater: Weak<RefCell<dyn SessionUpdater>> = updater;
        let renderer = Rc::downgrade(&h.renderer);
        let renderer: Weak<RefCell<dyn FrameRenderer>> = renderer;
        let _ = h.scheduler.initialize(renderer, vec![updater]);
    }

    #[test]
    #[should_panic(expected = "frames must be presented in order")]
    fn out_of_order_presentation_is_fatal() {
        let mut h = harness();
        let timestamps = Timestamps {
            latch_point_time: HostTime::ZERO,
            update_done_time: HostTime::ZERO,
            render_start_time: HostTime::ZERO,
            render_done_time: None,
            target_presentation_time: ms(100),
            actual_presentation_time: Some(ms(100)),
        };
        h.scheduler.on_frame_presented(PresentedFrame {
            frame_number: 2,
            timestamps,
        });
    }

    #[test]
    fn dead_renderer_skips_frames() {
        let mut h = harness();
        // The scheduler only holds a weak handle.
        h.renderer = Rc::new(RefCell::new(MockFrameRenderer::default()));

        schedule(&mut h, 1, HostTime::ZERO, true);
        h.run_for(VSYNC);
        assert_eq!(
            h.scheduler.last_presented_frame_number(),
            1,
            "skipped frame retires without the renderer"
        );
        assert_eq!(h.updater.borrow().on_frame_presented_call_count(), 1);
    }

    #[test]
    fn dead_updater_is_skipped() {
        let mut h = harness();
        h.updater = Rc::new(RefCell::new(MockSessionUpdater::default()));
        schedule(&mut h, 1, HostTime::ZERO, true);
        h.run_for(VSYNC);
        assert_eq!(h.render_frame_call_count(), 0, "no live updater asked to render");
        assert_eq!(h.scheduler.wakeups_without_render(), 1);
    }

    #[test]
    fn future_presentation_infos_are_bounded_and_increasing() {
        let mut h = SchedulerHarness::new(
            FrameSchedulerConfig::fixed_offset(Duration::from_millis(4)),
            Duration::from_millis(10),
        );
        h.run_until(ms(3));

        let infos = h.scheduler.get_future_presentation_infos(Duration::MAX);
        assert_eq!(infos.len(), FrameSchedulerConfig::DEFAULT_MAX_FUTURE_PRESENTATION_INFOS);
        for pair in infos.windows(2) {
            assert!(pair[0].presentation_time < pair[1].presentation_time);
            assert!(pair[0].latch_point_time < pair[1].latch_point_time);
        }
        for info in &infos {
            assert_eq!(info.presentation_time - info.latch_point_time, Duration::from_millis(4));
            assert_eq!(info.presentation_time.nanos() % 10_000_000, 0, "on the vsync grid");
        }

        let short = h.scheduler.get_future_presentation_infos(Duration::from_millis(15));
        assert!(short.len() < infos.len(), "span bounds the walk");
        assert!(!short.is_empty());
        assert_eq!(h.scheduler.pending_request_count(), 0, "query does not mutate");
    }

    #[test]
    fn constant_predictor_config_is_used() {
        let config = FrameSchedulerConfig {
            predictor: PredictorConfig::Constant {
                vsync_offset: Duration::from_millis(20),
            },
            ..FrameSchedulerConfig::low_latency()
        };
        let mut h = SchedulerHarness::new(config, VSYNC);
        schedule(&mut h, 1, HostTime::ZERO, true);
        assert_eq!(h.test_loop.pending_wakeup(), Some(ms(80)));
    }
}
