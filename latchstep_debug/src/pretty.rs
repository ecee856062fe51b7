// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in milliseconds.

use std::io::Write;

use latchstep_core::frame_stats::{FrameStatus, HistogramExport};
use latchstep_core::time::{Duration, HostTime};
use latchstep_core::trace::{
    FrameDispatchedEvent, FramePresentedEvent, SessionRemovedEvent, TraceSink,
    UpdatesAppliedEvent, WakeupScheduledEvent, WakeupWithoutRenderEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn ms(t: HostTime) -> f64 {
    Duration(t.nanos()).as_millis_f64()
}

fn status_name(status: FrameStatus) -> &'static str {
    match status {
        FrameStatus::OnTime => "on-time",
        FrameStatus::Delayed => "DELAYED",
        FrameStatus::Dropped => "DROPPED",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        let _ = writeln!(
            self.writer,
            "[wakeup] at={:.3}ms target={:.3}ms requested={:.3}ms now={:.3}ms",
            ms(e.wakeup_time),
            ms(e.target_presentation_time),
            ms(e.requested_presentation_time),
            ms(e.now),
        );
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        let _ = writeln!(
            self.writer,
            "[update] frame={} sessions={} failed={} render={} took={:.3}ms",
            e.frame_number,
            e.sessions_updated,
            e.sessions_failed,
            e.needs_render,
            e.update_duration.as_millis_f64(),
        );
    }

    fn on_frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        let _ = writeln!(
            self.writer,
            "[render] frame={} latch={:.3}ms start={:.3}ms target={:.3}ms",
            e.frame_number,
            ms(e.latch_point_time),
            ms(e.render_start_time),
            ms(e.target_presentation_time),
        );
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        let render = e
            .timestamps
            .render_duration()
            .map_or_else(|| "-".to_owned(), |d| format!("{:.3}ms", d.as_millis_f64()));
        let shown = e
            .timestamps
            .actual_presentation_time
            .map_or_else(|| "-".to_owned(), |t| format!("{:.3}ms", ms(t)));
        let _ = writeln!(
            self.writer,
            "[present] frame={} {} render={render} shown={shown}",
            e.frame_number,
            status_name(e.status),
        );
    }

    fn on_wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        let _ = writeln!(
            self.writer,
            "[idle] at={:.3}ms total={}",
            ms(e.now),
            e.total,
        );
    }

    fn on_session_removed(&mut self, e: &SessionRemovedEvent) {
        let reason = if e.update_failed { "update failed" } else { "removed" };
        let _ = writeln!(
            self.writer,
            "[session] at={:.3}ms {:?} {reason}",
            ms(e.now),
            e.session_id,
        );
    }

    fn on_histogram_export(&mut self, export: &HistogramExport) {
        for status in FrameStatus::ALL {
            let _ = writeln!(
                self.writer,
                "[histogram] at={:.3}ms {} render_samples={} latency_samples={}",
                ms(export.exported_at),
                status_name(status),
                export.rendering_time(status).total(),
                export.latch_to_presentation_time(status).total(),
            );
        }
    }
}
