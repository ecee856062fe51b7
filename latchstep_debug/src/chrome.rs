// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`ChromeTraceSink`] converts scheduler events into [Chrome Trace Event
//! Format][spec] objects as they arrive and writes them out on demand.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use latchstep_core::frame_stats::{FrameStatus, HistogramExport};
use latchstep_core::time::{Duration, HostTime};
use latchstep_core::trace::{
    FrameDispatchedEvent, FramePresentedEvent, SessionRemovedEvent, TraceSink,
    UpdatesAppliedEvent, WakeupScheduledEvent, WakeupWithoutRenderEvent,
};

const PID: u32 = 0;
const SCHEDULER_TID: u32 = 0;
const FRAME_TID: u32 = 1;

/// Collects trace events as Chrome Trace Event Format JSON values.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
#[derive(Debug, Default)]
pub struct ChromeTraceSink {
    events: Vec<Value>,
}

impl ChromeTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events collected so far.
    #[must_use]
    pub fn events(&self) -> &[Value] {
        &self.events
    }

    /// Writes the collected events as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }

    fn instant(&mut self, name: &str, cat: &str, ts: HostTime, tid: u32, args: Value) {
        self.events.push(json!({
            "ph": "i",
            "name": name,
            "cat": cat,
            "ts": us(ts),
            "pid": PID,
            "tid": tid,
            "s": "t",
            "args": args,
        }));
    }

    fn complete(&mut self, name: &str, cat: &str, start: HostTime, dur: Duration, args: Value) {
        self.events.push(json!({
            "ph": "X",
            "name": name,
            "cat": cat,
            "ts": us(start),
            "dur": dur.nanos() as f64 / 1000.0,
            "pid": PID,
            "tid": FRAME_TID,
            "args": args,
        }));
    }
}

fn us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

impl TraceSink for ChromeTraceSink {
    fn on_wakeup_scheduled(&mut self, e: &WakeupScheduledEvent) {
        self.instant(
            "WakeupScheduled",
            "Scheduler",
            e.now,
            SCHEDULER_TID,
            json!({
                "wakeup_us": us(e.wakeup_time),
                "target_us": us(e.target_presentation_time),
                "requested_us": us(e.requested_presentation_time),
            }),
        );
    }

    fn on_updates_applied(&mut self, e: &UpdatesAppliedEvent) {
        self.complete(
            "ApplyUpdates",
            "Frame",
            e.latch_time,
            e.update_duration,
            json!({
                "frame_number": e.frame_number,
                "sessions_updated": e.sessions_updated,
                "sessions_failed": e.sessions_failed,
                "needs_render": e.needs_render,
            }),
        );
    }

    fn on_frame_dispatched(&mut self, e: &FrameDispatchedEvent) {
        self.instant(
            "FrameDispatched",
            "Frame",
            e.render_start_time,
            FRAME_TID,
            json!({
                "frame_number": e.frame_number,
                "latch_us": us(e.latch_point_time),
                "target_us": us(e.target_presentation_time),
            }),
        );
    }

    fn on_frame_presented(&mut self, e: &FramePresentedEvent) {
        let t = e.timestamps;
        if let Some(render) = t.render_duration() {
            self.complete(
                "Render",
                "Frame",
                t.render_start_time,
                render,
                json!({ "frame_number": e.frame_number }),
            );
        }
        let (name, ts) = match (e.status, t.actual_presentation_time) {
            (FrameStatus::Dropped, _) | (_, None) => ("FrameDropped", t.target_presentation_time),
            (_, Some(actual)) => ("FramePresented", actual),
        };
        self.instant(
            name,
            "Frame",
            ts,
            FRAME_TID,
            json!({
                "frame_number": e.frame_number,
                "status": format!("{:?}", e.status),
                "target_us": us(t.target_presentation_time),
            }),
        );
    }

    fn on_wakeup_without_render(&mut self, e: &WakeupWithoutRenderEvent) {
        self.instant(
            "WakeupWithoutRender",
            "Scheduler",
            e.now,
            SCHEDULER_TID,
            json!({ "total": e.total }),
        );
    }

    fn on_session_removed(&mut self, e: &SessionRemovedEvent) {
        self.instant(
            "SessionRemoved",
            "Scheduler",
            e.now,
            SCHEDULER_TID,
            json!({
                "session_id": e.session_id.0,
                "update_failed": e.update_failed,
            }),
        );
    }

    fn on_histogram_export(&mut self, export: &HistogramExport) {
        let mut args = serde_json::Map::new();
        for status in FrameStatus::ALL {
            args.insert(
                format!("{status:?}_render"),
                json!(export.rendering_time(status).total()),
            );
            args.insert(
                format!("{status:?}_latency"),
                json!(export.latch_to_presentation_time(status).total()),
            );
        }
        self.events.push(json!({
            "ph": "C",
            "name": "FrameHistogram",
            "cat": "Stats",
            "ts": us(export.exported_at),
            "pid": PID,
            "tid": SCHEDULER_TID,
            "args": Value::Object(args),
        }));
    }
}
