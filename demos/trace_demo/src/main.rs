// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated compositor loop that drives the frame scheduler end to end.
//!
//! Two clients submit presents against a 60 Hz display for one simulated
//! second. Session 1 submits every vsync; session 2 submits a non-squashable
//! present every third vsync. Every tenth frame is dropped by the simulated
//! GPU. Events are printed with
//! [`PrettyPrintSink`](latchstep_debug::pretty::PrettyPrintSink) and written
//! to `trace.json` with
//! [`ChromeTraceSink`](latchstep_debug::chrome::ChromeTraceSink).

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Stdout};
use std::rc::{Rc, Weak};

use latchstep_core::backend::{
    FrameRenderer, LatchedTimes, PresentTimestamps, SessionUpdateMap, SessionUpdater,
    UpdateResults,
};
use latchstep_core::config::FrameSchedulerConfig;
use latchstep_core::frame_stats::HistogramExport;
use latchstep_core::frame_timings::FrameTimingsRef;
use latchstep_core::id::{Fence, SchedulingIdPair, SessionId};
use latchstep_core::scheduler::FrameScheduler;
use latchstep_core::time::{Duration, HostTime};
use latchstep_core::timer::WakeupTimer;
use latchstep_core::trace::{
    FrameDispatchedEvent, FramePresentedEvent, SessionRemovedEvent, TraceSink,
    UpdatesAppliedEvent, WakeupScheduledEvent, WakeupWithoutRenderEvent,
};
use latchstep_core::vsync::{VsyncTiming, VsyncTimingState};

use latchstep_debug::chrome::ChromeTraceSink;
use latchstep_debug::pretty::PrettyPrintSink;

const VSYNC_COUNT: u64 = 60;
/// ≈60 Hz.
const VSYNC_INTERVAL: Duration = Duration(16_666_667);
const RENDER_COST: Duration = Duration::from_millis(3);
const DROP_EVERY: u64 = 10;

// -- host timer -------------------------------------------------------------

#[derive(Debug, Default)]
struct TimerState {
    now: HostTime,
    wakeup: Option<HostTime>,
}

/// The host loop's clock and one-shot timer, shared with the scheduler.
#[derive(Clone, Debug, Default)]
struct SimTimer(Rc<RefCell<TimerState>>);

impl SimTimer {
    fn set_now(&self, now: HostTime) {
        self.0.borrow_mut().now = now;
    }

    /// Fires the pending wake-up if it is due before `deadline`.
    fn take_wakeup_before(&self, deadline: HostTime) -> Option<HostTime> {
        let mut state = self.0.borrow_mut();
        match state.wakeup {
            Some(at) if at < deadline => {
                state.wakeup = None;
                Some(at.max(state.now))
            }
            _ => None,
        }
    }
}

impl WakeupTimer for SimTimer {
    fn now(&self) -> HostTime {
        self.0.borrow().now
    }

    fn schedule_wakeup(&mut self, at: HostTime) {
        self.0.borrow_mut().wakeup = Some(at);
    }

    fn cancel_wakeup(&mut self) {
        self.0.borrow_mut().wakeup = None;
    }

    fn is_wakeup_pending(&self) -> bool {
        self.0.borrow().wakeup.is_some()
    }
}

// -- collaborators ----------------------------------------------------------

#[derive(Debug, Default)]
struct Compositor {
    presents_shown: usize,
}

impl SessionUpdater for Compositor {
    fn update_sessions(
        &mut self,
        sessions_to_update: &SessionUpdateMap,
        _trace_id: u64,
    ) -> UpdateResults {
        if sessions_to_update.is_empty() {
            UpdateResults::default()
        } else {
            UpdateResults::render()
        }
    }

    fn on_frame_presented(
        &mut self,
        latched_times: &LatchedTimes,
        _present_timestamps: PresentTimestamps,
    ) {
        self.presents_shown += latched_times.values().map(BTreeMap::len).sum::<usize>();
    }
}

#[derive(Debug)]
struct InFlight {
    frame_number: u64,
    target: HostTime,
    started: HostTime,
    swapchain: Option<usize>,
    timings: FrameTimingsRef,
}

#[derive(Debug)]
struct Gpu {
    clock: SimTimer,
    in_flight: VecDeque<InFlight>,
    fences_released: usize,
}

impl Gpu {
    fn new(clock: SimTimer) -> Self {
        Self {
            clock,
            in_flight: VecDeque::new(),
            fences_released: 0,
        }
    }

    /// Completes every frame that targeted `vsync` or earlier.
    fn on_vsync(&mut self, vsync: HostTime) {
        while let Some(frame) = self.in_flight.front()
            && frame.target <= vsync
        {
            let Some(frame) = self.in_flight.pop_front() else {
                break;
            };
            let Some(index) = frame.swapchain else {
                frame.timings.on_frame_skipped();
                continue;
            };
            if frame.frame_number % DROP_EVERY == 0 {
                frame.timings.on_frame_dropped(index);
            } else {
                let rendered = (frame.started + RENDER_COST).min(vsync);
                frame.timings.on_frame_rendered(index, rendered);
                frame.timings.on_frame_presented(index, vsync);
            }
        }
    }
}

impl FrameRenderer for Gpu {
    fn render_scheduled_frame(
        &mut self,
        frame_number: u64,
        target_presentation_time: HostTime,
        timings: FrameTimingsRef,
    ) {
        let swapchain = timings.register_swapchain();
        self.in_flight.push_back(InFlight {
            frame_number,
            target: target_presentation_time,
            started: self.clock.now(),
            swapchain,
            timings,
        });
    }

    fn signal_fences_when_previous_renders_are_done(&mut self, fences: Vec<Fence>) {
        self.fences_released += fences.len();
    }
}

// -- sinks ------------------------------------------------------------------

/// Forwards every event to the terminal and to the Chrome trace.
struct TeeSink {
    pretty: PrettyPrintSink<Stdout>,
    chrome: Rc<RefCell<ChromeTraceSink>>,
}

impl TraceSink for TeeSink {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        self.pretty.on_wakeup_scheduled(e);
        self.chrome.on_wakeup_scheduled(e);
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        self.pretty.on_updates_applied(e);
        self.chrome.on_updates_applied(e);
    }

    fn on_frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        self.pretty.on_frame_dispatched(e);
        self.chrome.on_frame_dispatched(e);
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        self.pretty.on_frame_presented(e);
        self.chrome.on_frame_presented(e);
    }

    fn on_wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        self.pretty.on_wakeup_without_render(e);
        self.chrome.on_wakeup_without_render(e);
    }

    fn on_session_removed(&mut self, e: &SessionRemovedEvent) {
        self.pretty.on_session_removed(e);
        self.chrome.on_session_removed(e);
    }

    fn on_histogram_export(&mut self, export: &HistogramExport) {
        self.pretty.on_histogram_export(export);
        self.chrome.on_histogram_export(export);
    }
}

fn submit(
    scheduler: &mut FrameScheduler,
    session_id: SessionId,
    requested: HostTime,
    squashable: bool,
    fence: Fence,
) {
    let present_id = scheduler.register_present(session_id, vec![fence], None);
    scheduler.schedule_update_for_session(
        requested,
        SchedulingIdPair::new(session_id, present_id),
        squashable,
    );
}

fn main() {
    let timer = SimTimer::default();
    let vsync = Rc::new(VsyncTimingState::new(HostTime::ZERO, VSYNC_INTERVAL));
    let shared_vsync: Rc<dyn VsyncTiming> = vsync.clone();
    let mut scheduler = FrameScheduler::new(
        FrameSchedulerConfig::low_latency(),
        shared_vsync,
        Box::new(timer.clone()),
    )
    .expect("valid scheduler config");

    let chrome = Rc::new(RefCell::new(ChromeTraceSink::new()));
    scheduler.set_trace_sink(Box::new(TeeSink {
        pretty: PrettyPrintSink::with_writer(std::io::stdout()),
        chrome: Rc::clone(&chrome),
    }));

    let compositor = Rc::new(RefCell::new(Compositor::default()));
    let gpu = Rc::new(RefCell::new(Gpu::new(timer.clone())));
    let weak_compositor = Rc::downgrade(&compositor);
    let weak_compositor: Weak<RefCell<dyn SessionUpdater>> = weak_compositor;
    let weak_gpu = Rc::downgrade(&gpu);
    let weak_gpu: Weak<RefCell<dyn FrameRenderer>> = weak_gpu;
    scheduler
        .initialize(weak_gpu, vec![weak_compositor])
        .expect("collaborators are alive");

    // -- simulated loop ----------------------------------------------------
    let mut next_fence = 0;
    for k in 0..VSYNC_COUNT {
        let vsync_time = HostTime(VSYNC_INTERVAL.nanos() * k);
        timer.set_now(vsync_time);
        vsync.set_last_vsync_time(vsync_time);

        // 1. Display: retire frames that hit this vsync.
        gpu.borrow_mut().on_vsync(vsync_time);
        scheduler.dispatch_presentations();

        // 2. Clients submit.
        next_fence += 1;
        submit(&mut scheduler, SessionId(1), vsync_time, true, Fence(next_fence));
        if k % 3 == 0 {
            next_fence += 1;
            submit(&mut scheduler, SessionId(2), vsync_time, false, Fence(next_fence));
        }

        // 3. Run every wake-up due before the next vsync.
        let next_vsync = vsync_time + VSYNC_INTERVAL;
        while let Some(at) = timer.take_wakeup_before(next_vsync) {
            timer.set_now(at);
            scheduler.maybe_render_frame();
            scheduler.dispatch_presentations();
        }
    }

    // -- report ------------------------------------------------------------
    let summary = scheduler.stats().summary();
    println!(
        "{} frames: {} delayed, {} dropped; {} presents shown, {} fences released",
        summary.total_frames,
        summary.delayed_frames,
        summary.dropped_frames,
        compositor.borrow().presents_shown,
        gpu.borrow().fences_released,
    );

    let path = "trace.json";
    let file = File::create(path).expect("failed to create trace.json");
    let mut writer = BufWriter::new(file);
    chrome
        .borrow()
        .write_to(&mut writer)
        .expect("failed to write Chrome trace");

    println!("Wrote {path} ({} events)", chrome.borrow().events().len());
}
