use std::sync::Arc;
use std::sync::mpsc::Sender;

use crate::foundation::core::FrameIndex;
use crate::foundation::error::{PlayheadError, PlayheadResult};
use crate::graph::node::NodeId;
use crate::graph::store::NodeGraph;
use crate::playback::state::Request;
use crate::render::rows::JobOutcome;

/// Message drained by the coordinating loop.
pub(crate) enum Inbox {
    Request(Request),
    Frame(JobOutcome),
}

/// Cloneable sender for controlling a [`PlaybackEngine`](crate::PlaybackEngine) from other
/// threads. Requests take effect the next time the engine is polled.
#[derive(Clone, Debug)]
pub struct PlaybackHandle {
    tx: Sender<Inbox>,
}

impl PlaybackHandle {
    pub(crate) fn new(tx: Sender<Inbox>) -> Self {
        Self { tx }
    }

    /// Post any request.
    pub fn send(&self, request: Request) -> PlayheadResult<()> {
        self.tx
            .send(Inbox::Request(request))
            .map_err(|_| PlayheadError::validation("playback engine has shut down"))
    }

    pub fn start(&self, frame_count: i64, forward: bool) -> PlayheadResult<()> {
        self.send(Request::Start {
            frame_count,
            fit_to_viewer: false,
            forward,
            same_frame: false,
        })
    }

    pub fn pause(&self) -> PlayheadResult<()> {
        self.send(Request::Pause)
    }

    pub fn abort(&self) -> PlayheadResult<()> {
        self.send(Request::Abort)
    }

    pub fn seek(&self, frame: FrameIndex) -> PlayheadResult<()> {
        self.send(Request::Seek(frame))
    }

    pub fn step(&self, forward: bool) -> PlayheadResult<()> {
        self.send(Request::Step { forward })
    }

    pub fn step_by(&self, frames: i64, forward: bool) -> PlayheadResult<()> {
        self.send(Request::StepBy { frames, forward })
    }

    /// Start rendering the output writer's range.
    pub fn write(&self) -> PlayheadResult<()> {
        self.send(Request::Write)
    }

    pub fn refresh(&self) -> PlayheadResult<()> {
        self.send(Request::Refresh)
    }

    pub fn set_loop_mode(&self, enabled: bool) -> PlayheadResult<()> {
        self.send(Request::SetLoopMode(enabled))
    }

    /// Announce an edited graph.
    pub fn graph_changed(&self, graph: Arc<NodeGraph>, output: NodeId) -> PlayheadResult<()> {
        self.send(Request::GraphChanged { graph, output })
    }
}
