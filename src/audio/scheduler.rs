//! # Playback Scheduler
//!
//! Places decoded response segments on a single output timeline so they play
//! back-to-back with no gaps or overlaps, in the order they were enqueued.
//!
//! ## Timeline:
//! `next_start_time` is the earliest time a new segment may begin. Each enqueue
//! starts the segment at `max(next_start_time, clock_now)` and moves the cursor
//! to that segment's end. If playback went idle and the clock moved past the
//! cursor, the next segment simply starts now. The cursor never decreases,
//! not even when playback is cut.
//!
//! ## Active set:
//! Segments stay in the active set until their own completion is reported.
//! The transition to "nothing playing" is reported exactly once per idle
//! period, by whichever completion empties the set.

use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, trace};

use crate::audio::codec::AudioBuffer;
use crate::device::OutputDevice;
use crate::error::RadioResult;

/// Identifier of one scheduled segment. Never reused within a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg-{}", self.0)
    }
}

/// Where an enqueued segment landed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    pub start_time: f64,
    pub end_time: f64,
}

/// Result of reporting a segment completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackTransition {
    /// Other segments are still scheduled
    StillPlaying,
    /// The last active segment finished; fire the idle cue
    Idle,
    /// Completion for a segment we are not tracking (stale or duplicate)
    Ignored,
}

#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    active: BTreeSet<SegmentId>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a decoded buffer right after everything already queued.
    pub fn enqueue(
        &mut self,
        output: &mut dyn OutputDevice,
        buffer: &AudioBuffer,
    ) -> RadioResult<ScheduledSegment> {
        let now = output.current_time();
        let start_time = self.next_start_time.max(now);
        let id = SegmentId(self.next_id);

        output.schedule(id, buffer, start_time)?;

        // Only advance the timeline once the device accepted the segment
        self.next_id += 1;
        let end_time = start_time + buffer.duration();
        self.next_start_time = end_time;
        self.active.insert(id);

        trace!(
            segment = %id,
            start = start_time,
            end = end_time,
            active = self.active.len(),
            "Segment scheduled"
        );

        Ok(ScheduledSegment { id, start_time, end_time })
    }

    /// Completion handler: drop the segment from the active set.
    pub fn segment_ended(&mut self, id: SegmentId) -> PlaybackTransition {
        if !self.active.remove(&id) {
            return PlaybackTransition::Ignored;
        }

        if self.active.is_empty() {
            debug!(segment = %id, "Playback idle");
            PlaybackTransition::Idle
        } else {
            PlaybackTransition::StillPlaying
        }
    }

    /// Stop every scheduled segment immediately.
    ///
    /// Stopped segments never report completion, so no idle transition
    /// follows. The cursor never moves backwards; it is only pulled up to the
    /// clock. Returns the number of segments that were cut.
    pub fn stop_all(&mut self, output: &mut dyn OutputDevice) -> usize {
        let cut = self.active.len();
        for id in std::mem::take(&mut self.active) {
            output.stop(id);
        }
        self.next_start_time = self.next_start_time.max(output.current_time());
        if cut > 0 {
            debug!(segments = cut, "Stopped scheduled playback");
        }
        cut
    }

    /// Forget the active set without touching a device (device already gone).
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn is_playing(&self) -> bool {
        !self.active.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}
