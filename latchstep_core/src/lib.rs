// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame pacing for compositing display servers.
//!
//! `latchstep_core` decides, for a stream of independently submitted client
//! updates, when to latch each update, when to render, and which vsync each
//! frame targets, so that output lands on refresh boundaries with minimal
//! latency. It is `no_std` compatible (with `alloc`) and single-threaded: the
//! host event loop drives it through a one-shot wake-up timer.
//!
//! # Architecture
//!
//! ```text
//!   schedule_update_for_session ──► FramePredictor ──► WakeupTimer
//!                                                          │
//!                 ┌────────────────────────────────────────┘
//!                 ▼
//!   maybe_render_frame ──► SessionUpdater::update_sessions
//!                     └──► FrameRenderer::render_scheduled_frame(FrameTimingsRef)
//!                                                          │
//!                 ┌────────────────────────────────────────┘
//!                 ▼
//!   dispatch_presentations ──► FrameStats, FramePredictor, SessionUpdater::on_frame_presented
//! ```
//!
//! **[`scheduler`]**: the [`FrameScheduler`](scheduler::FrameScheduler)
//! orchestrator. Owns pending requests, coalesces squashable updates, keeps
//! at most one frame in flight, and fans out presentation callbacks in
//! submission order.
//!
//! **[`predictor`]**: [`FramePredictor`](predictor::FramePredictor) with a
//! fixed-offset and a learning implementation, built on
//! [`duration_predictor`].
//!
//! **[`frame_timings`]**: per-frame timing record that finalizes once every
//! swapchain has reported.
//!
//! **[`frame_stats`]**: on-time/delayed/dropped classification, rolling
//! windows, and periodic histogram export.
//!
//! **[`backend`]**: the collaborator traits a compositor implements.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop telemetry, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper. Diagnostic logging uses `tracing`.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one
//!   branch per call site).
//! - `serde` (disabled by default): Derives `Serialize`/`Deserialize` for
//!   configuration and time types.
//! - `test-helpers` (disabled by default): Exposes the [`testing`] module
//!   with a manual clock, mock collaborators, and a scheduler harness.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod backend;
pub mod config;
pub mod duration_predictor;
pub mod error;
pub mod frame_stats;
pub mod frame_timings;
pub mod id;
pub mod predictor;
pub mod scheduler;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod time;
pub mod timer;
pub mod trace;
pub mod vsync;
