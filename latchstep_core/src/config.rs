// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scheduler configuration.
//!
//! All configuration types are plain `Copy` structs with public fields and
//! `const fn` presets. Hosts start from a preset and override fields as
//! needed, then hand the result to
//! [`FrameScheduler::new`](crate::scheduler::FrameScheduler::new), which
//! validates it.

use alloc::boxed::Box;

use crate::error::ConfigError;
use crate::predictor::{ConstantFramePredictor, FramePredictor, WindowedFramePredictor};
use crate::time::Duration;

/// Which frame predictor the scheduler uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PredictorConfig {
    /// Latch a fixed offset before every vsync.
    Constant {
        /// Time between latch point and presentation.
        vsync_offset: Duration,
    },
    /// Learn the required frame duration from reported durations.
    Windowed {
        /// Lower bound on the predicted frame duration.
        min_predicted_frame_duration: Duration,
        /// Render duration assumed before any measurement arrives.
        initial_render_duration: Duration,
        /// Update duration assumed before any measurement arrives.
        initial_update_duration: Duration,
    },
}

impl PredictorConfig {
    /// Windowed predictor with defaults suited to a 60 Hz display.
    #[must_use]
    pub const fn windowed() -> Self {
        Self::Windowed {
            min_predicted_frame_duration: Duration::from_millis(1),
            initial_render_duration: Duration::from_millis(5),
            initial_update_duration: Duration::from_millis(1),
        }
    }

    /// Checks that the predictor can produce sensible latch points.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroVsyncOffset`] or
    /// [`ConfigError::ZeroMinFrameDuration`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        match *self {
            Self::Constant { vsync_offset } if vsync_offset.is_zero() => {
                Err(ConfigError::ZeroVsyncOffset)
            }
            Self::Windowed {
                min_predicted_frame_duration,
                ..
            } if min_predicted_frame_duration.is_zero() => Err(ConfigError::ZeroMinFrameDuration),
            _ => Ok(()),
        }
    }

    /// Builds the configured predictor.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`validate`](Self::validate).
    pub fn build(&self) -> Result<Box<dyn FramePredictor>, ConfigError> {
        self.validate()?;
        Ok(match *self {
            Self::Constant { vsync_offset } => Box::new(ConstantFramePredictor::new(vsync_offset)),
            Self::Windowed {
                min_predicted_frame_duration,
                initial_render_duration,
                initial_update_duration,
            } => Box::new(WindowedFramePredictor::new(
                min_predicted_frame_duration,
                initial_render_duration,
                initial_update_duration,
            )),
        })
    }
}

/// Bucket layout for the exported histograms.
///
/// Bucket `i` counts samples in `[i * bucket_width, (i + 1) * bucket_width)`;
/// the last bucket also absorbs everything beyond.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistogramConfig {
    /// Width of one bucket.
    pub bucket_width: Duration,
    /// Number of buckets.
    pub bucket_count: usize,
}

impl HistogramConfig {
    /// 1 ms buckets up to 50 ms.
    #[must_use]
    pub const fn millis() -> Self {
        Self {
            bucket_width: Duration::from_millis(1),
            bucket_count: 50,
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::DegenerateHistogram`] for a zero bucket width
    /// or count.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket_width.is_zero() || self.bucket_count == 0 {
            return Err(ConfigError::DegenerateHistogram);
        }
        Ok(())
    }
}

/// Frame statistics windows and export cadence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameStatsConfig {
    /// Most recent frames kept regardless of status.
    pub frame_window: usize,
    /// Most recent delayed frames kept.
    pub delayed_window: usize,
    /// Most recent dropped frames kept.
    pub dropped_window: usize,
    /// How often histograms are flushed.
    pub export_interval: Duration,
    /// Histogram bucket layout.
    pub histogram: HistogramConfig,
}

impl FrameStatsConfig {
    /// Default windows: 200 frames, 100 delayed, 100 dropped, one export per
    /// minute.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            frame_window: 200,
            delayed_window: 100,
            dropped_window: 100,
            export_interval: Duration::from_millis(60_000),
            histogram: HistogramConfig::millis(),
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyStatsWindow`] naming the first empty
    /// window, or the histogram's validation error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (window, size) in [
            ("frame_window", self.frame_window),
            ("delayed_window", self.delayed_window),
            ("dropped_window", self.dropped_window),
        ] {
            if size == 0 {
                return Err(ConfigError::EmptyStatsWindow { window });
            }
        }
        self.histogram.validate()
    }
}

impl Default for FrameStatsConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Configuration for the [`FrameScheduler`](crate::scheduler::FrameScheduler).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameSchedulerConfig {
    /// Frame predictor selection.
    pub predictor: PredictorConfig,
    /// Statistics configuration.
    pub stats: FrameStatsConfig,
    /// Upper bound on entries returned by
    /// [`get_future_presentation_infos`](crate::scheduler::FrameScheduler::get_future_presentation_infos).
    pub max_future_presentation_infos: usize,
    /// Start in continuous-render mode.
    pub render_continuously: bool,
}

impl FrameSchedulerConfig {
    /// Default cap on future presentation infos.
    pub const DEFAULT_MAX_FUTURE_PRESENTATION_INFOS: usize = 8;

    /// Windowed prediction tuned for the lowest latency the measured
    /// durations allow.
    #[must_use]
    pub const fn low_latency() -> Self {
        Self {
            predictor: PredictorConfig::windowed(),
            stats: FrameStatsConfig::standard(),
            max_future_presentation_infos: Self::DEFAULT_MAX_FUTURE_PRESENTATION_INFOS,
            render_continuously: false,
        }
    }

    /// Latch a fixed `vsync_offset` before each vsync.
    #[must_use]
    pub const fn fixed_offset(vsync_offset: Duration) -> Self {
        Self {
            predictor: PredictorConfig::Constant { vsync_offset },
            stats: FrameStatsConfig::standard(),
            max_future_presentation_infos: Self::DEFAULT_MAX_FUTURE_PRESENTATION_INFOS,
            render_continuously: false,
        }
    }

    /// Validates every nested configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.predictor.validate()?;
        self.stats.validate()?;
        if self.max_future_presentation_infos == 0 {
            return Err(ConfigError::ZeroFutureInfoCap);
        }
        Ok(())
    }
}

impl Default for FrameSchedulerConfig {
    fn default() -> Self {
        Self::low_latency()
    }
}
