// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recoverable setup errors.
//!
//! Only configuration and initialization problems surface as values. Contract
//! violations at runtime (frame numbers out of order, double initialization,
//! a swapchain reporting twice) panic, and per-session update failures tear
//! the session down without reporting an error.

/// An invalid configuration value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A constant predictor needs a non-zero offset, otherwise the latch
    /// point would coincide with the presentation time.
    #[error("constant predictor offset must be non-zero")]
    ZeroVsyncOffset,
    /// A windowed predictor needs a non-zero minimum frame duration.
    #[error("minimum predicted frame duration must be non-zero")]
    ZeroMinFrameDuration,
    /// The future presentation walk would return nothing.
    #[error("future presentation info cap must be at least 1")]
    ZeroFutureInfoCap,
    /// A statistics window cannot hold any frames.
    #[error("frame statistics window `{window}` must hold at least one frame")]
    EmptyStatsWindow {
        /// Name of the offending window.
        window: &'static str,
    },
    /// Histograms need at least one bucket of non-zero width.
    #[error("histogram needs at least one bucket of non-zero width")]
    DegenerateHistogram,
}

/// An invalid argument to [`FrameScheduler::initialize`](crate::scheduler::FrameScheduler::initialize).
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InitError {
    /// No session updaters were supplied, so no update could ever apply.
    #[error("at least one session updater is required")]
    NoSessionUpdaters,
    /// The renderer handle was already dead at initialization.
    #[error("frame renderer is no longer alive")]
    RendererGone,
}
