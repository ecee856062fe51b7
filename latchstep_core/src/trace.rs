// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-loop telemetry.
//!
//! This module provides a [`TraceSink`] trait with one method per scheduler
//! event. All method bodies default to no-ops, so implementing only the
//! events you care about is fine.
//!
//! [`Tracer`] wraps an optional boxed sink. When the `trace` feature is
//! **off**, every `Tracer` method compiles to nothing and an installed sink
//! is dropped unused. When **on**, each method performs a single `Option`
//! branch before dispatching.
//!
//! Diagnostic logging goes through `tracing` independently of this module;
//! sinks are for structured per-frame data.
//!
//! # Crate features
//!
//! - `trace` enables the `Tracer` method bodies (one branch per call).

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::RefCell;

use crate::frame_stats::{FrameStatus, HistogramExport};
use crate::frame_timings::Timestamps;
use crate::id::SessionId;
use crate::time::{Duration, HostTime};

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when the scheduler posts a new wake-up.
#[derive(Clone, Copy, Debug)]
pub struct WakeupScheduledEvent {
    /// When the decision was made.
    pub now: HostTime,
    /// The earliest presentation time among pending requests.
    pub requested_presentation_time: HostTime,
    /// The vsync the frame is predicted to land on.
    pub target_presentation_time: HostTime,
    /// When the scheduler will wake up (the predicted latch point).
    pub wakeup_time: HostTime,
}

/// Emitted after updates were applied on a wake-up.
#[derive(Clone, Copy, Debug)]
pub struct UpdatesAppliedEvent {
    /// The frame the updates were latched for.
    pub frame_number: u64,
    /// Latch time.
    pub latch_time: HostTime,
    /// Sessions that had an update selected.
    pub sessions_updated: usize,
    /// Sessions whose update failed and were torn down.
    pub sessions_failed: usize,
    /// Whether any updater asked for a render.
    pub needs_render: bool,
    /// Time spent applying updates.
    pub update_duration: Duration,
}

/// Emitted when a frame is handed to the renderer.
#[derive(Clone, Copy, Debug)]
pub struct FrameDispatchedEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// Latch time.
    pub latch_point_time: HostTime,
    /// When rendering started.
    pub render_start_time: HostTime,
    /// The vsync the frame aims for.
    pub target_presentation_time: HostTime,
}

/// Emitted when a frame's timings are retired.
#[derive(Clone, Copy, Debug)]
pub struct FramePresentedEvent {
    /// Frame counter.
    pub frame_number: u64,
    /// Final timestamps.
    pub timestamps: Timestamps,
    /// Classification recorded into the statistics.
    pub status: FrameStatus,
}

/// Emitted when a wake-up found nothing to render.
#[derive(Clone, Copy, Debug)]
pub struct WakeupWithoutRenderEvent {
    /// When the wake-up ran.
    pub now: HostTime,
    /// Total wake-ups without render so far, including this one.
    pub total: u64,
}

/// Emitted when a session's state is purged.
#[derive(Clone, Copy, Debug)]
pub struct SessionRemovedEvent {
    /// When the session was removed.
    pub now: HostTime,
    /// The removed session.
    pub session_id: SessionId,
    /// Whether removal was caused by a failed update rather than a host
    /// request.
    pub update_failed: bool,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the scheduler.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a wake-up is posted.
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        _ = e;
    }

    /// Called after updates were applied.
    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        _ = e;
    }

    /// Called when a frame is handed to the renderer.
    fn on_frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        _ = e;
    }

    /// Called when a frame's timings are retired.
    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        _ = e;
    }

    /// Called when a wake-up found nothing to render.
    fn on_wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        _ = e;
    }

    /// Called when a session is removed.
    fn on_session_removed(&mut self, e: &SessionRemovedEvent) {
        _ = e;
    }

    /// Called with each histogram flush.
    fn on_histogram_export(&mut self, export: &HistogramExport) {
        _ = export;
    }
}

/// Lets a host keep a handle to a sink it installed on the scheduler.
impl<S: TraceSink + ?Sized> TraceSink for Rc<RefCell<S>> {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        self.borrow_mut().on_wakeup_scheduled(e);
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        self.borrow_mut().on_updates_applied(e);
    }

    fn on_frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        self.borrow_mut().on_frame_dispatched(e);
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        self.borrow_mut().on_frame_presented(e);
    }

    fn on_wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        self.borrow_mut().on_wakeup_without_render(e);
    }

    fn on_session_removed(&mut self, e: &SessionRemovedEvent) {
        self.borrow_mut().on_session_removed(e);
    }

    fn on_histogram_export(&mut self, export: &HistogramExport) {
        self.borrow_mut().on_histogram_export(export);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Owning wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
/// When **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
#[derive(Default)]
pub struct Tracer {
    #[cfg(feature = "trace")]
    sink: Option<Box<dyn TraceSink>>,
}

impl core::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $event:ident) => {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($event);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = (&$self, $event);
        }
    };
}

impl Tracer {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: Box<dyn TraceSink>) -> Self {
        let mut tracer = Self::none();
        tracer.set_sink(sink);
        tracer
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Replaces the sink.
    #[inline]
    pub fn set_sink(&mut self, sink: Box<dyn TraceSink>) {
        #[cfg(feature = "trace")]
        {
            self.sink = Some(sink);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
        }
    }

    /// Whether events reach a sink.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        #[cfg(feature = "trace")]
        {
            self.sink.is_some()
        }
        #[cfg(not(feature = "trace"))]
        {
            false
        }
    }

    /// Emits a [`WakeupScheduledEvent`].
    #[inline]
    pub fn wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        dispatch!(self, on_wakeup_scheduled, e);
    }

    /// Emits an [`UpdatesAppliedEvent`].
    #[inline]
    pub fn updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        dispatch!(self, on_updates_applied, e);
    }

    /// Emits a [`FrameDispatchedEvent`].
    #[inline]
    pub fn frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        dispatch!(self, on_frame_dispatched, e);
    }

    /// Emits a [`FramePresentedEvent`].
    #[inline]
    pub fn frame_presented(&mut self, e: &FramePresentedEvent) {
        dispatch!(self, on_frame_presented, e);
    }

    /// Emits a [`WakeupWithoutRenderEvent`].
    #[inline]
    pub fn wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        dispatch!(self, on_wakeup_without_render, e);
    }

    /// Emits a [`SessionRemovedEvent`].
    #[inline]
    pub fn session_removed(&mut self, e: &SessionRemovedEvent) {
        dispatch!(self, on_session_removed, e);
    }

    /// Emits a [`HistogramExport`].
    #[inline]
    pub fn histogram_export(&mut self, export: &HistogramExport) {
        dispatch!(self, on_histogram_export, export);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
