// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rolling statistics over finalized frames.
//!
//! [`FrameStats`] classifies each finalized frame as on time, delayed, or
//! dropped, keeps three bounded FIFO windows of recent frames, and
//! accumulates histograms that are flushed on a fixed interval through
//! [`FrameStats::poll_export`].

use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::{FrameStatsConfig, HistogramConfig};
use crate::frame_timings::Timestamps;
use crate::time::{Duration, HostTime};

/// How a finalized frame turned out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FrameStatus {
    /// Shown within one vsync of its target.
    OnTime,
    /// Shown at least one full vsync after its target.
    Delayed,
    /// Never shown.
    Dropped,
}

impl FrameStatus {
    /// Every status, in histogram order.
    pub const ALL: [Self; 3] = [Self::OnTime, Self::Delayed, Self::Dropped];

    /// Classifies a finalized frame.
    #[must_use]
    pub fn classify(timestamps: &Timestamps, vsync_interval: Duration) -> Self {
        match timestamps.actual_presentation_time {
            None => Self::Dropped,
            Some(actual)
                if actual.saturating_sub(vsync_interval) >= timestamps.target_presentation_time =>
            {
                Self::Delayed
            }
            Some(_) => Self::OnTime,
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::OnTime => 0,
            Self::Delayed => 1,
            Self::Dropped => 2,
        }
    }
}

/// Fixed-width bucket counts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Histogram {
    bucket_width: Duration,
    counts: Vec<u64>,
}

impl Histogram {
    /// Creates an empty histogram.
    ///
    /// # Panics
    ///
    /// Panics if the layout has no buckets or a zero bucket width.
    #[must_use]
    pub fn new(config: HistogramConfig) -> Self {
        assert!(
            config.validate().is_ok(),
            "histogram needs at least one bucket of non-zero width"
        );
        Self {
            bucket_width: config.bucket_width,
            counts: vec![0; config.bucket_count],
        }
    }

    /// Counts one sample.
    pub fn record(&mut self, sample: Duration) {
        let last = self.counts.len() - 1;
        let bucket = usize::try_from(sample.nanos() / self.bucket_width.nanos())
            .map_or(last, |b| b.min(last));
        self.counts[bucket] += 1;
    }

    /// Width of one bucket.
    #[must_use]
    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    /// Per-bucket counts.
    #[must_use]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Total samples counted.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn clear(&mut self) {
        self.counts.fill(0);
    }
}

/// One histogram flush.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistogramExport {
    /// When the flush happened.
    pub exported_at: HostTime,
    rendering_time: [Histogram; 3],
    latch_to_presentation_time: [Histogram; 3],
}

impl HistogramExport {
    /// Render start to render done, for frames with `status`.
    #[must_use]
    pub fn rendering_time(&self, status: FrameStatus) -> &Histogram {
        &self.rendering_time[status.index()]
    }

    /// Latch to actual presentation, for frames with `status`.
    ///
    /// Always empty for [`FrameStatus::Dropped`].
    #[must_use]
    pub fn latch_to_presentation_time(&self, status: FrameStatus) -> &Histogram {
        &self.latch_to_presentation_time[status.index()]
    }
}

/// Totals and window averages for diagnostics output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStatsSummary {
    /// Frames recorded since creation.
    pub total_frames: u64,
    /// Delayed frames recorded since creation.
    pub delayed_frames: u64,
    /// Dropped frames recorded since creation.
    pub dropped_frames: u64,
    /// Frames currently in the all-frames window.
    pub window_frames: usize,
    /// Average render time over the window, if any frame rendered.
    pub average_render_time: Option<Duration>,
    /// Average latch-to-presentation time over the window, if any frame was
    /// shown.
    pub average_latch_to_presentation: Option<Duration>,
}

/// Rolling frame statistics.
#[derive(Debug)]
pub struct FrameStats {
    config: FrameStatsConfig,
    frames: VecDeque<Timestamps>,
    delayed_frames: VecDeque<Timestamps>,
    dropped_frames: VecDeque<Timestamps>,
    total_frames: u64,
    total_delayed: u64,
    total_dropped: u64,
    rendering_time: [Histogram; 3],
    latch_to_presentation_time: [Histogram; 3],
    samples_since_export: u64,
    next_export_at: Option<HostTime>,
}

impl FrameStats {
    /// Creates empty statistics.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails [`FrameStatsConfig::validate`].
    #[must_use]
    pub fn new(config: FrameStatsConfig) -> Self {
        assert!(config.validate().is_ok(), "invalid frame stats config");
        let histograms = || core::array::from_fn(|_| Histogram::new(config.histogram));
        Self {
            frames: VecDeque::with_capacity(config.frame_window),
            delayed_frames: VecDeque::with_capacity(config.delayed_window),
            dropped_frames: VecDeque::with_capacity(config.dropped_window),
            total_frames: 0,
            total_delayed: 0,
            total_dropped: 0,
            rendering_time: histograms(),
            latch_to_presentation_time: histograms(),
            samples_since_export: 0,
            next_export_at: None,
            config,
        }
    }

    /// Records a finalized frame and returns its classification.
    pub fn record_frame(&mut self, timestamps: Timestamps, vsync_interval: Duration) -> FrameStatus {
        let status = FrameStatus::classify(&timestamps, vsync_interval);

        push_bounded(&mut self.frames, self.config.frame_window, timestamps);
        self.total_frames += 1;
        match status {
            FrameStatus::Delayed => {
                push_bounded(&mut self.delayed_frames, self.config.delayed_window, timestamps);
                self.total_delayed += 1;
            }
            FrameStatus::Dropped => {
                push_bounded(&mut self.dropped_frames, self.config.dropped_window, timestamps);
                self.total_dropped += 1;
            }
            FrameStatus::OnTime => {}
        }

        if let Some(render) = timestamps.render_duration() {
            self.rendering_time[status.index()].record(render);
        }
        if let Some(latency) = timestamps.latch_to_presentation() {
            self.latch_to_presentation_time[status.index()].record(latency);
        }
        self.samples_since_export += 1;
        status
    }

    /// Flushes the histograms if the export interval has elapsed.
    ///
    /// The first call only arms the interval. Returns `None` when the
    /// interval has not elapsed or nothing was recorded since the last
    /// flush.
    pub fn poll_export(&mut self, now: HostTime) -> Option<HistogramExport> {
        let interval = self.config.export_interval;
        let due = *self
            .next_export_at
            .get_or_insert_with(|| now.saturating_add(interval));
        if now < due {
            return None;
        }
        self.next_export_at = Some(now.saturating_add(interval));
        if self.samples_since_export == 0 {
            return None;
        }
        self.samples_since_export = 0;

        let export = HistogramExport {
            exported_at: now,
            rendering_time: self.rendering_time.clone(),
            latch_to_presentation_time: self.latch_to_presentation_time.clone(),
        };
        self.rendering_time.iter_mut().for_each(Histogram::clear);
        self.latch_to_presentation_time
            .iter_mut()
            .for_each(Histogram::clear);
        Some(export)
    }

    /// Totals and window averages.
    #[must_use]
    pub fn summary(&self) -> FrameStatsSummary {
        FrameStatsSummary {
            total_frames: self.total_frames,
            delayed_frames: self.total_delayed,
            dropped_frames: self.total_dropped,
            window_frames: self.frames.len(),
            average_render_time: average(self.frames.iter().filter_map(Timestamps::render_duration)),
            average_latch_to_presentation: average(
                self.frames
                    .iter()
                    .filter_map(Timestamps::latch_to_presentation),
            ),
        }
    }

    /// Recent frames, oldest first.
    pub fn frames(&self) -> impl ExactSizeIterator<Item = &Timestamps> {
        self.frames.iter()
    }

    /// Recent delayed frames, oldest first.
    pub fn delayed_frames(&self) -> impl ExactSizeIterator<Item = &Timestamps> {
        self.delayed_frames.iter()
    }

    /// Recent dropped frames, oldest first.
    pub fn dropped_frames(&self) -> impl ExactSizeIterator<Item = &Timestamps> {
        self.dropped_frames.iter()
    }
}

fn push_bounded(window: &mut VecDeque<Timestamps>, capacity: usize, timestamps: Timestamps) {
    if window.len() == capacity {
        let _ = window.pop_front();
    }
    window.push_back(timestamps);
}

fn average(samples: impl Iterator<Item = Duration>) -> Option<Duration> {
    let (sum, count) = samples.fold((0_u128, 0_u64), |(sum, count), d| {
        (sum + u128::from(d.nanos()), count + 1)
    });
    if count == 0 {
        return None;
    }
    let mean = sum / u128::from(count);
    Some(Duration(u64::try_from(mean).unwrap_or(u64::MAX)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const VSYNC: Duration = Duration::from_millis(10);

    fn frame(target_ms: u64, actual_ms: Option<u64>) -> Timestamps {
        let target = HostTime::from_millis(target_ms);
        Timestamps {
            latch_point_time: target - Duration::from_millis(8),
            update_done_time: target - Duration::from_millis(7),
            render_start_time: target - Duration::from_millis(7),
            render_done_time: Some(target - Duration::from_millis(4)),
            target_presentation_time: target,
            actual_presentation_time: actual_ms.map(HostTime::from_millis),
        }
    }

    fn small_config() -> FrameStatsConfig {
        FrameStatsConfig {
            frame_window: 3,
            delayed_window: 2,
            dropped_window: 2,
            export_interval: Duration::from_millis(100),
            histogram: HistogramConfig {
                bucket_width: Duration::from_millis(1),
                bucket_count: 10,
            },
        }
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(
            FrameStatus::classify(&frame(100, Some(100)), VSYNC),
            FrameStatus::OnTime
        );
        assert_eq!(
            FrameStatus::classify(&frame(100, Some(109)), VSYNC),
            FrameStatus::OnTime,
            "less than a full vsync late is still on time"
        );
        assert_eq!(
            FrameStatus::classify(&frame(100, Some(110)), VSYNC),
            FrameStatus::Delayed,
            "exactly one vsync late is delayed"
        );
        assert_eq!(
            FrameStatus::classify(&frame(100, None), VSYNC),
            FrameStatus::Dropped
        );
    }

    #[test]
    fn windows_evict_oldest_first() {
        let mut stats = FrameStats::new(small_config());
        for target in [10, 20, 30, 40] {
            stats.record_frame(frame(target, Some(target)), VSYNC);
        }
        let targets: Vec<_> = stats
            .frames()
            .map(|t| t.target_presentation_time)
            .collect();
        assert_eq!(
            targets,
            [20, 30, 40].map(HostTime::from_millis),
            "window keeps the newest three"
        );
        assert_eq!(stats.summary().total_frames, 4);
    }

    #[test]
    fn status_windows_are_independent() {
        let mut stats = FrameStats::new(small_config());
        stats.record_frame(frame(10, None), VSYNC);
        stats.record_frame(frame(20, Some(40)), VSYNC);
        stats.record_frame(frame(30, None), VSYNC);
        stats.record_frame(frame(40, None), VSYNC);

        assert_eq!(stats.dropped_frames().len(), 2);
        assert_eq!(stats.delayed_frames().len(), 1);
        let summary = stats.summary();
        assert_eq!(summary.dropped_frames, 3);
        assert_eq!(summary.delayed_frames, 1);
    }

    #[test]
    fn export_waits_for_interval_then_clears() {
        let mut stats = FrameStats::new(small_config());
        assert!(stats.poll_export(HostTime::from_millis(0)).is_none(), "arms");

        stats.record_frame(frame(10, Some(10)), VSYNC);
        stats.record_frame(frame(20, None), VSYNC);
        assert!(stats.poll_export(HostTime::from_millis(50)).is_none());

        let export = stats
            .poll_export(HostTime::from_millis(100))
            .expect("interval elapsed with samples");
        assert_eq!(export.exported_at, HostTime::from_millis(100));
        // Render took 3 ms for both frames.
        assert_eq!(export.rendering_time(FrameStatus::OnTime).counts()[3], 1);
        assert_eq!(export.rendering_time(FrameStatus::Dropped).counts()[3], 1);
        // Latch 8 ms before target, shown on target.
        assert_eq!(
            export.latch_to_presentation_time(FrameStatus::OnTime).counts()[8],
            1
        );
        assert_eq!(
            export
                .latch_to_presentation_time(FrameStatus::Dropped)
                .total(),
            0
        );

        stats.record_frame(frame(30, Some(30)), VSYNC);
        let next = stats
            .poll_export(HostTime::from_millis(200))
            .expect("second interval");
        assert_eq!(
            next.rendering_time(FrameStatus::OnTime).total(),
            1,
            "counts were cleared by the previous export"
        );
    }

    #[test]
    fn export_without_samples_is_noop() {
        let mut stats = FrameStats::new(small_config());
        assert!(stats.poll_export(HostTime::from_millis(0)).is_none());
        assert!(stats.poll_export(HostTime::from_millis(500)).is_none());
    }

    #[test]
    fn histogram_overflow_lands_in_last_bucket() {
        let mut histogram = Histogram::new(HistogramConfig {
            bucket_width: Duration::from_millis(1),
            bucket_count: 4,
        });
        histogram.record(Duration::from_millis(2));
        histogram.record(Duration::from_millis(400));
        assert_eq!(histogram.counts(), &[0, 0, 1, 1]);
    }

    #[test]
    fn summary_averages_window() {
        let mut stats = FrameStats::new(small_config());
        assert_eq!(stats.summary().average_render_time, None);

        stats.record_frame(frame(10, Some(10)), VSYNC);
        stats.record_frame(frame(20, Some(30)), VSYNC);
        let summary = stats.summary();
        assert_eq!(summary.average_render_time, Some(Duration::from_millis(3)));
        assert_eq!(
            summary.average_latch_to_presentation,
            Some(Duration::from_millis(13))
        );
    }
}
