// Copyright 2026 the Latchstep Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identity types for sessions, presents, and release fences.
//!
//! [`SessionId`] identifies an update-producing client. [`PresentId`]
//! identifies one submitted update within a session; ids are allocated from a
//! process-wide counter, so ordering within a session matches submission
//! order. [`SchedulingIdPair`] combines the two and is the key for all
//! pending and in-flight bookkeeping in the scheduler.

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

/// Identifies an update-producing client.
///
/// Unique per live client. The host may reuse an id after calling
/// [`FrameScheduler::remove_session`](crate::scheduler::FrameScheduler::remove_session).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId(pub u64);

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

/// Identifies one submitted update ("present") within a session.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PresentId(pub u64);

static NEXT_PRESENT_ID: AtomicU64 = AtomicU64::new(1);

impl PresentId {
    /// Allocates the next process-wide present id.
    ///
    /// Ids are strictly increasing across calls, from any thread.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_PRESENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for PresentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PresentId({})", self.0)
    }
}

/// A `(SessionId, PresentId)` pair.
///
/// Ordered by session first, then by present, so that a range over one
/// session's entries in an ordered map visits its presents in submission
/// order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchedulingIdPair {
    /// The session that submitted the present.
    pub session_id: SessionId,
    /// The present within that session.
    pub present_id: PresentId,
}

impl SchedulingIdPair {
    /// Creates a new pair.
    #[inline]
    #[must_use]
    pub const fn new(session_id: SessionId, present_id: PresentId) -> Self {
        Self {
            session_id,
            present_id,
        }
    }

    /// The smallest pair belonging to `session_id`.
    #[inline]
    #[must_use]
    pub(crate) const fn session_start(session_id: SessionId) -> Self {
        Self::new(session_id, PresentId(0))
    }
}

impl fmt::Debug for SchedulingIdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.session_id.0, self.present_id.0)
    }
}

/// An opaque release-fence handle.
///
/// The scheduler never inspects fences; it only hands them to the
/// [`FrameRenderer`](crate::backend::FrameRenderer) once the present they
/// belong to is latched.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fence(pub u64);

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fence({})", self.0)
    }
}
