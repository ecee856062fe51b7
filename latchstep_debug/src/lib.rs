// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pretty-printing and Chrome trace export for latchstep diagnostics.
//!
//! This crate provides [`TraceSink`](latchstep_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`chrome::ChromeTraceSink`]: collects events and writes Chrome Trace
//!   Event Format JSON.
//!
//! The scheduler takes ownership of its sink. To read a sink back after
//! running, install it as `Box::new(Rc::clone(&shared))` where `shared` is an
//! `Rc<RefCell<...>>`.

pub mod chrome;
pub mod pretty;
