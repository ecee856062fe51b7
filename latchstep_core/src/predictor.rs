// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame timing prediction.
//!
//! A [`FramePredictor`] answers one question: given the current time, the
//! client's requested presentation time, and the display's vsync grid, when
//! should the scheduler latch updates and which vsync should the frame land
//! on? Every prediction satisfies:
//!
//! - `presentation_time > now` and `presentation_time >= requested_presentation_time`;
//! - `presentation_time` lies on the grid `last_vsync_time + k * vsync_interval`, `k >= 0`;
//! - `now <= latch_point_time < presentation_time`;
//! - `presentation_time - latch_point_time` equals the predictor's required
//!   frame duration.
//!
//! Two predictors are provided. [`ConstantFramePredictor`] uses a fixed
//! offset. [`WindowedFramePredictor`] learns from reported update and render
//! durations.

use crate::duration_predictor::DurationPredictor;
use crate::time::{Duration, HostTime};

/// Inputs for a single prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PredictionRequest {
    /// Current time.
    pub now: HostTime,
    /// Earliest time the client wants its content shown.
    pub requested_presentation_time: HostTime,
    /// Time of the most recent vsync.
    pub last_vsync_time: HostTime,
    /// Interval between vsyncs.
    pub vsync_interval: Duration,
}

/// A predicted latch point and presentation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PredictedTimes {
    /// When updates should be latched (and the scheduler should wake up).
    pub latch_point_time: HostTime,
    /// The vsync the frame is expected to be shown on.
    pub presentation_time: HostTime,
}

/// Predicts latch points and presentation times, and learns from observed
/// durations.
pub trait FramePredictor {
    /// Reports how long rendering a frame took.
    fn report_render_duration(&mut self, time_to_render: Duration);

    /// Reports how long applying updates took.
    fn report_update_duration(&mut self, time_to_update: Duration);

    /// Computes the latch point and presentation time for `request`.
    fn get_prediction(&self, request: PredictionRequest) -> PredictedTimes;
}

/// Returns the smallest `last_sync_time + n * sync_interval` (`n >= 0`) that
/// is at or after `min_sync_time`.
///
/// A zero interval has no grid, so `min_sync_time` itself is returned.
#[must_use]
pub fn compute_next_sync_time(
    last_sync_time: HostTime,
    sync_interval: Duration,
    min_sync_time: HostTime,
) -> HostTime {
    if last_sync_time >= min_sync_time {
        return last_sync_time;
    }
    if sync_interval.is_zero() {
        return min_sync_time;
    }
    let gap = min_sync_time.nanos() - last_sync_time.nanos();
    let intervals = gap.div_ceil(sync_interval.nanos());
    HostTime(
        last_sync_time
            .nanos()
            .saturating_add(intervals.saturating_mul(sync_interval.nanos())),
    )
}

/// Builds a prediction for a frame that needs `required_frame_duration`
/// between latch and presentation.
///
/// The earliest usable vsync is at least half an interval past the last one,
/// which absorbs jitter in the reported vsync timestamp.
#[must_use]
pub fn compute_prediction_from_duration(
    request: PredictionRequest,
    required_frame_duration: Duration,
) -> PredictedTimes {
    let half_interval = request.last_vsync_time.saturating_add(request.vsync_interval / 2);
    let min_sync_time = half_interval.max(request.now.saturating_add(required_frame_duration));
    let target_vsync = compute_next_sync_time(
        request.last_vsync_time,
        request.vsync_interval,
        min_sync_time,
    );
    let presentation_time = compute_next_sync_time(
        target_vsync,
        request.vsync_interval,
        request.requested_presentation_time.max(request.now),
    );
    PredictedTimes {
        latch_point_time: presentation_time.saturating_sub(required_frame_duration),
        presentation_time,
    }
}

/// Predicts a fixed latch offset before each vsync.
///
/// Reported durations are ignored.
#[derive(Clone, Copy, Debug)]
pub struct ConstantFramePredictor {
    vsync_offset: Duration,
}

impl ConstantFramePredictor {
    /// Creates a predictor that latches `vsync_offset` before presentation.
    ///
    /// # Panics
    ///
    /// Panics if `vsync_offset` is zero.
    #[must_use]
    pub fn new(vsync_offset: Duration) -> Self {
        assert!(!vsync_offset.is_zero(), "vsync offset must be non-zero");
        Self { vsync_offset }
    }

    /// The fixed latch offset.
    #[must_use]
    pub fn vsync_offset(&self) -> Duration {
        self.vsync_offset
    }
}

impl FramePredictor for ConstantFramePredictor {
    fn report_render_duration(&mut self, _time_to_render: Duration) {}

    fn report_update_duration(&mut self, _time_to_update: Duration) {}

    fn get_prediction(&self, request: PredictionRequest) -> PredictedTimes {
        compute_prediction_from_duration(request, self.vsync_offset)
    }
}

/// Predicts the required frame duration from recent update and render costs.
///
/// The required duration is
/// `clamp(min_predicted_frame_duration, update + render + HARDCODED_MARGIN, MAX_PREDICTED_FRAME_DURATION)`,
/// where `update` and `render` are worst cases over independent sliding
/// windows.
#[derive(Clone, Debug)]
pub struct WindowedFramePredictor {
    min_predicted_frame_duration: Duration,
    render_duration_predictor: DurationPredictor,
    update_duration_predictor: DurationPredictor,
}

impl WindowedFramePredictor {
    /// Added to every prediction to absorb scheduling jitter.
    pub const HARDCODED_MARGIN: Duration = Duration::from_micros(500);
    /// Upper bound on the required frame duration, so one catastrophic frame
    /// cannot push predictions several vsyncs out.
    pub const MAX_PREDICTED_FRAME_DURATION: Duration = Duration::from_millis(16);
    /// Samples kept for render durations.
    pub const RENDER_PREDICTION_WINDOW_SIZE: usize = 3;
    /// Samples kept for update durations.
    pub const UPDATE_PREDICTION_WINDOW_SIZE: usize = 1;

    /// Creates a predictor seeded with initial render and update estimates.
    #[must_use]
    pub fn new(
        min_predicted_frame_duration: Duration,
        initial_render_duration: Duration,
        initial_update_duration: Duration,
    ) -> Self {
        Self {
            min_predicted_frame_duration,
            render_duration_predictor: DurationPredictor::new(
                Self::RENDER_PREDICTION_WINDOW_SIZE,
                initial_render_duration,
            ),
            update_duration_predictor: DurationPredictor::new(
                Self::UPDATE_PREDICTION_WINDOW_SIZE,
                initial_update_duration,
            ),
        }
    }

    /// The frame duration the next prediction will use.
    #[must_use]
    pub fn required_frame_duration(&self) -> Duration {
        let predicted = self
            .update_duration_predictor
            .prediction()
            .saturating_add(self.render_duration_predictor.prediction())
            .saturating_add(Self::HARDCODED_MARGIN);
        predicted.clamp_to(
            self.min_predicted_frame_duration,
            Self::MAX_PREDICTED_FRAME_DURATION,
        )
    }
}

impl FramePredictor for WindowedFramePredictor {
    fn report_render_duration(&mut self, time_to_render: Duration) {
        self.render_duration_predictor
            .insert_new_measurement(time_to_render);
    }

    fn report_update_duration(&mut self, time_to_update: Duration) {
        self.update_duration_predictor
            .insert_new_measurement(time_to_update);
    }

    fn get_prediction(&self, request: PredictionRequest) -> PredictedTimes {
        compute_prediction_from_duration(request, self.required_frame_duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    fn request(now: u64, requested: u64, last_vsync: u64, interval: u64) -> PredictionRequest {
        PredictionRequest {
            now: ms(now),
            requested_presentation_time: ms(requested),
            last_vsync_time: ms(last_vsync),
            vsync_interval: Duration::from_millis(interval),
        }
    }

    #[test]
    fn next_sync_time_on_grid() {
        let interval = Duration(10);
        assert_eq!(
            compute_next_sync_time(HostTime(0), interval, HostTime(0)),
            HostTime(0)
        );
        assert_eq!(
            compute_next_sync_time(HostTime(0), interval, HostTime(1)),
            HostTime(10)
        );
        assert_eq!(
            compute_next_sync_time(HostTime(0), interval, HostTime(10)),
            HostTime(10)
        );
        assert_eq!(
            compute_next_sync_time(HostTime(5), interval, HostTime(26)),
            HostTime(35)
        );
        assert_eq!(
            compute_next_sync_time(HostTime(50), interval, HostTime(20)),
            HostTime(50),
            "a last sync already past the minimum is returned as-is"
        );
    }

    #[test]
    fn next_sync_time_without_grid() {
        assert_eq!(
            compute_next_sync_time(HostTime(0), Duration::ZERO, HostTime(7)),
            HostTime(7)
        );
    }

    #[test]
    fn constant_predictor_latches_offset_before_presentation() {
        let mut predictor = ConstantFramePredictor::new(Duration::from_millis(4));
        let req = request(5, 10, 0, 10);

        let times = predictor.get_prediction(req);
        assert_eq!(times.presentation_time, ms(10));
        assert_eq!(times.latch_point_time + Duration::from_millis(4), times.presentation_time);

        predictor.report_render_duration(Duration::from_millis(30));
        predictor.report_update_duration(Duration::from_millis(30));
        let again = predictor.get_prediction(req);
        assert_eq!(again, times, "reported durations are ignored");
    }

    #[test]
    fn half_interval_guard_skips_imminent_vsync() {
        let predictor = ConstantFramePredictor::new(Duration::from_millis(1));
        // now is right after the last vsync; the next vsync (10ms) is viable.
        let times = predictor.get_prediction(request(1, 0, 0, 10));
        assert_eq!(times.presentation_time, ms(10));
        assert_eq!(times.latch_point_time, ms(9));
    }

    #[test]
    fn requested_time_pushes_presentation_out() {
        let predictor = ConstantFramePredictor::new(Duration::from_millis(4));
        let times = predictor.get_prediction(request(0, 150, 0, 100));
        assert_eq!(times.presentation_time, ms(200));
        assert_eq!(times.latch_point_time, ms(196));
    }

    #[test]
    fn windowed_starts_from_seeds_plus_margin() {
        let predictor = WindowedFramePredictor::new(
            Duration::from_millis(1),
            Duration::from_millis(3),
            Duration::from_millis(2),
        );
        assert_eq!(
            predictor.required_frame_duration(),
            Duration::from_millis(5) + WindowedFramePredictor::HARDCODED_MARGIN
        );
    }

    #[test]
    fn windowed_respects_minimum() {
        let predictor =
            WindowedFramePredictor::new(Duration::from_millis(8), Duration::ZERO, Duration::ZERO);
        assert_eq!(predictor.required_frame_duration(), Duration::from_millis(8));
    }

    #[test]
    fn windowed_clamps_catastrophic_render() {
        let mut predictor = WindowedFramePredictor::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
        );
        predictor.report_render_duration(Duration::from_millis(500));
        assert_eq!(
            predictor.required_frame_duration(),
            WindowedFramePredictor::MAX_PREDICTED_FRAME_DURATION
        );

        let times = predictor.get_prediction(request(0, 0, 0, 10));
        assert_eq!(
            times.presentation_time - times.latch_point_time,
            WindowedFramePredictor::MAX_PREDICTED_FRAME_DURATION
        );
        assert_eq!(times.presentation_time, ms(20), "16ms of work needs two vsyncs");
    }

    #[test]
    fn windowed_render_window_forgets_after_three_samples() {
        let mut predictor = WindowedFramePredictor::new(
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::ZERO,
        );
        predictor.report_render_duration(Duration::from_millis(10));
        for _ in 0..WindowedFramePredictor::RENDER_PREDICTION_WINDOW_SIZE {
            predictor.report_render_duration(Duration::from_millis(2));
        }
        assert_eq!(
            predictor.required_frame_duration(),
            Duration::from_millis(2) + WindowedFramePredictor::HARDCODED_MARGIN
        );
    }

    #[test]
    fn windowed_update_window_tracks_latest_sample() {
        let mut predictor = WindowedFramePredictor::new(
            Duration::from_millis(1),
            Duration::ZERO,
            Duration::from_millis(4),
        );
        predictor.report_update_duration(Duration::from_millis(1));
        assert_eq!(
            predictor.required_frame_duration(),
            Duration::from_millis(1) + WindowedFramePredictor::HARDCODED_MARGIN
        );
    }

    #[test]
    fn latch_never_precedes_now() {
        let predictor = ConstantFramePredictor::new(Duration::from_millis(9));
        for now in 0..40 {
            let req = request(now, 0, 0, 10);
            let times = predictor.get_prediction(req);
            assert!(times.latch_point_time >= req.now, "now={now} {times:?}");
            assert!(times.presentation_time > req.now, "now={now} {times:?}");
            assert_eq!(times.presentation_time.nanos() % 10_000_000, 0);
        }
    }
}
