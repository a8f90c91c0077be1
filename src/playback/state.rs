use std::sync::Arc;

use crate::foundation::core::{Fps, FrameIndex, FrameRange};
use crate::graph::node::NodeId;
use crate::graph::store::NodeGraph;

/// Where the coordinating loop currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing scheduled.
    #[default]
    Idle,
    /// Resolving the next frame and probing the caches.
    Requesting,
    /// Rows are being evaluated on the worker pool.
    ComputingFresh,
    /// A frame-cache hit is being shown.
    ComputingCached,
    /// A computed frame is being stored and uploaded.
    Uploading,
}

/// Flags and counters of the current playback run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackState {
    /// A run is active.
    pub working: bool,
    /// Auto-advance is disabled; the run stops after the frame in flight.
    pub paused: bool,
    /// The run was cancelled.
    pub aborted: bool,
    /// Playback direction.
    pub forward: bool,
    /// Wrap at the range ends.
    pub loop_mode: bool,
    /// Frames left to show, `-1` for unbounded.
    pub frame_requests: i64,
    /// Frames shown since the run started.
    pub frame_request_index: u64,
    /// Re-show the current frame without advancing (zoom or pan refresh).
    pub same_frame: bool,
    /// Fit the viewer to the display window before showing.
    pub fit_to_viewer: bool,
}

impl PlaybackState {
    pub(crate) fn new(loop_mode: bool) -> Self {
        Self {
            working: false,
            paused: false,
            aborted: false,
            forward: true,
            loop_mode,
            frame_requests: 0,
            frame_request_index: 0,
            same_frame: false,
            fit_to_viewer: false,
        }
    }

    /// Count one shown frame.
    pub(crate) fn frame_shown(&mut self) {
        if self.frame_requests > 0 {
            self.frame_requests -= 1;
        }
        self.frame_request_index += 1;
    }

    /// More frames will follow the one just shown.
    pub(crate) fn continues(&self) -> bool {
        self.frame_requests != 0 && !self.paused && !self.aborted
    }
}

/// Playable range and the current-frame cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeline {
    range: Option<FrameRange>,
    current: FrameIndex,
}

impl Timeline {
    /// Empty timeline at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Playable range, `None` before a graph is loaded.
    pub fn range(&self) -> Option<FrameRange> {
        self.range
    }

    /// Last requested or displayed frame.
    pub fn current(&self) -> FrameIndex {
        self.current
    }

    /// Replace the range and clamp the cursor into it.
    pub fn set_range(&mut self, range: Option<FrameRange>) {
        self.range = range;
        if let Some(r) = range {
            self.current = r.clamp(self.current);
        }
    }

    /// Move the cursor. Frames outside the range are refused.
    pub fn seek(&mut self, frame: FrameIndex) -> bool {
        match self.range {
            Some(r) if r.contains(frame) => {
                self.current = frame;
                true
            }
            _ => false,
        }
    }

    /// Frame after the cursor in the given direction, wrapping in loop mode.
    pub fn peek(&self, forward: bool, loop_mode: bool) -> Option<FrameIndex> {
        let r = self.range?;
        let cur = r.clamp(self.current);
        if forward {
            if cur < r.last {
                Some(cur.next())
            } else if loop_mode {
                Some(r.first)
            } else {
                None
            }
        } else if cur > r.first {
            Some(cur.prev())
        } else if loop_mode {
            Some(r.last)
        } else {
            None
        }
    }

    /// Step the cursor. `None` at a range end without loop mode.
    pub fn advance(&mut self, forward: bool, loop_mode: bool) -> Option<FrameIndex> {
        let next = self.peek(forward, loop_mode)?;
        self.current = next;
        Some(next)
    }
}

/// A control request, either called directly on the engine or posted through a
/// [`PlaybackHandle`](crate::PlaybackHandle).
#[derive(Clone, Debug)]
pub enum Request {
    /// Start a run of `frame_count` frames (`-1` = unbounded).
    Start {
        frame_count: i64,
        fit_to_viewer: bool,
        forward: bool,
        same_frame: bool,
    },
    /// Show one frame.
    Seek(FrameIndex),
    /// Show the neighbouring frame.
    Step { forward: bool },
    /// Show the frame `frames` away from the current one.
    StepBy { frames: i64, forward: bool },
    /// Render the output writer's range into its sink.
    Write,
    /// Show the first frame of the range.
    First,
    /// Show the last frame of the range.
    Last,
    /// Re-show the current frame, e.g. after a zoom or pan.
    Refresh,
    /// Finish the frame in flight, then stop.
    Pause,
    /// Cancel the frame in flight and stop.
    Abort,
    /// Replace the graph and re-show the current frame.
    GraphChanged { graph: Arc<NodeGraph>, output: NodeId },
    /// Toggle wrapping at the range ends.
    SetLoopMode(bool),
    /// Change the target rate.
    SetFps(Fps),
}

#[cfg(test)]
#[path = "../../tests/unit/playback/state.rs"]
mod tests;
