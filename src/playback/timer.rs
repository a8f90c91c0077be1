use std::time::{Duration, Instant};

use crate::foundation::core::Fps;

/// Paces playback to the target rate and measures the rate actually achieved.
#[derive(Debug)]
pub struct FpsTimer {
    desired: Fps,
    period: Duration,
    next_due: Option<Instant>,
    window_start: Option<Instant>,
    window_frames: u32,
}

impl FpsTimer {
    /// Timer targeting `desired`.
    pub fn new(desired: Fps) -> Self {
        Self {
            desired,
            period: desired.frame_duration(),
            next_due: None,
            window_start: None,
            window_frames: 0,
        }
    }

    /// Target rate.
    pub fn desired(&self) -> Fps {
        self.desired
    }

    /// Change the target rate and restart measuring.
    pub fn set_desired(&mut self, fps: Fps) {
        self.desired = fps;
        self.period = fps.frame_duration();
        self.reset();
    }

    /// Forget the deadline and the measuring window.
    pub fn reset(&mut self) {
        self.next_due = None;
        self.window_start = None;
        self.window_frames = 0;
    }

    /// Count one frame and, when `throttle` is set, sleep until it is due.
    ///
    /// A frame that is more than one period late resynchronizes the schedule instead of
    /// bursting to catch up. Returns the time slept.
    pub fn wait_until_next_frame_due(&mut self, throttle: bool) -> Duration {
        let now = Instant::now();
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
        self.window_frames += 1;

        let due = self.next_due.unwrap_or(now);
        let mut slept = Duration::ZERO;
        let shown_at = if throttle && due > now {
            slept = due - now;
            std::thread::sleep(slept);
            due
        } else {
            now
        };
        self.next_due = Some(if shown_at > due + self.period {
            shown_at + self.period
        } else {
            due + self.period
        });
        slept
    }

    /// Frames per second since the previous readout, then start a new window.
    ///
    /// `None` until at least two frames were counted.
    pub fn actual_frame_rate(&mut self) -> Option<f64> {
        let start = self.window_start?;
        if self.window_frames < 2 {
            return None;
        }
        let elapsed = start.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            f64::from(self.window_frames - 1) / elapsed
        } else {
            self.desired.as_f64()
        };
        self.window_start = Some(Instant::now());
        self.window_frames = 1;
        Some(rate)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/playback/timer.rs"]
mod tests;
