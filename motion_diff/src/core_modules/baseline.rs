// THEORY:
// The `BaselineManager` owns the reference ("test") frame that every new frame is
// compared against, and decides when that reference goes stale.
//
// Key architectural principles:
// 1.  **Explicit state machine**: Uninitialized -> HasBaseline -> (Comparing <-> Refreshing).
//     The state reflects what the most recent pass did, so callers can see at a glance
//     whether a frame was compared or absorbed into the baseline.
// 2.  **Caller-supplied time**: every decision takes a `now: Instant`. Recorded footage
//     can replay its own timestamps and tests can step time without sleeping.
// 3.  **Cooldown**: a stale baseline is only replaced once no motion has been seen for
//     `cooldown`. Refreshing in the middle of an event would absorb the moving object
//     into the reference and hide the rest of the event.
// 4.  **Overwrite, never reallocate**: after the first capture the baseline buffer is
//     reused. A refresh is a `copy_from_slice`.

use std::time::{Duration, Instant};

use crate::core_modules::frame::{Frame, FrameView};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaselineState {
    /// No baseline yet; the next complete frame becomes one.
    Uninitialized,
    /// The baseline was just captured from the first frame.
    HasBaseline,
    /// The last frame was compared against the baseline.
    Comparing,
    /// The last frame replaced the baseline and was not compared.
    Refreshing,
}

/// What `BaselineManager::advance` did with a frame.
#[derive(Debug, Clone, Copy)]
pub enum BaselineStep<'b> {
    Captured,
    Refreshed,
    Compare(FrameView<'b>),
}

/// When a baseline is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Age after which the baseline is replaced. Zero disables refreshing.
    pub interval: Duration,
    /// Quiet time required after the last detection. Zero disables the cooldown.
    pub cooldown: Duration,
}

impl RefreshPolicy {
    pub fn should_refresh(&self, baseline_age: Duration, since_last_motion: Option<Duration>) -> bool {
        if self.interval.is_zero() || baseline_age < self.interval {
            return false;
        }
        if self.cooldown.is_zero() {
            return true;
        }
        match since_last_motion {
            None => true,
            Some(quiet) => quiet >= self.cooldown,
        }
    }
}

#[derive(Debug)]
pub struct BaselineManager {
    policy: RefreshPolicy,
    baseline: Option<Frame>,
    captured_at: Option<Instant>,
    last_motion: Option<Instant>,
    /// Flips on every refresh; the visualizer shows it as a colored marker.
    refresh_toggle: bool,
    state: BaselineState,
}

impl BaselineManager {
    pub fn new(policy: RefreshPolicy) -> Self {
        Self {
            policy,
            baseline: None,
            captured_at: None,
            last_motion: None,
            refresh_toggle: false,
            state: BaselineState::Uninitialized,
        }
    }

    /// Copies the first frame in as the baseline and starts the age timer.
    pub fn capture(&mut self, frame: FrameView<'_>, now: Instant) {
        self.baseline = Some(Frame::from_view(frame));
        self.captured_at = Some(now);
        self.last_motion = None;
        self.state = BaselineState::HasBaseline;
    }

    /// True when the baseline should be replaced by the frame arriving at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        let Some(captured_at) = self.captured_at else {
            return false;
        };
        let age = now.saturating_duration_since(captured_at);
        let quiet = self
            .last_motion
            .map(|last| now.saturating_duration_since(last));
        self.policy.should_refresh(age, quiet)
    }

    /// Replaces the baseline in place with `frame`.
    pub fn refresh(&mut self, frame: FrameView<'_>, now: Instant) {
        match self.baseline.as_mut() {
            Some(baseline) => baseline.overwrite_from(frame),
            None => self.baseline = Some(Frame::from_view(frame)),
        }
        self.captured_at = Some(now);
        self.refresh_toggle = !self.refresh_toggle;
        self.state = BaselineState::Refreshing;
    }

    /// Moves the state machine forward for `frame`: capture it, absorb it as
    /// a refresh, or hand back the baseline it should be compared against.
    pub fn advance(&mut self, frame: FrameView<'_>, now: Instant) -> BaselineStep<'_> {
        match self.baseline {
            None => {
                self.capture(frame, now);
                BaselineStep::Captured
            }
            Some(_) if self.is_due(now) => {
                self.refresh(frame, now);
                BaselineStep::Refreshed
            }
            Some(ref baseline) => BaselineStep::Compare(baseline.view()),
        }
    }

    /// Notes the outcome of a comparison pass.
    pub fn record_pass(&mut self, detected: bool, now: Instant) {
        if detected {
            self.last_motion = Some(now);
        }
        self.state = BaselineState::Comparing;
    }

    pub fn reset(&mut self) {
        self.baseline = None;
        self.captured_at = None;
        self.last_motion = None;
        self.refresh_toggle = false;
        self.state = BaselineState::Uninitialized;
    }

    pub fn baseline(&self) -> Option<&Frame> {
        self.baseline.as_ref()
    }

    pub fn state(&self) -> BaselineState {
        self.state
    }

    pub fn refresh_toggle(&self) -> bool {
        self.refresh_toggle
    }

    pub fn last_motion(&self) -> Option<Instant> {
        self.last_motion
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }
}
