//! Rebuild coalescing.
//!
//! ```text
//! Idle ──request──► Running ──request──► RunningWithPending
//!  ▲                  │  ▲                    │ (further requests absorbed)
//!  └──────finish──────┘  └───────finish───────┘
//! ```

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    Idle,
    Running,
    RunningWithPending,
}

/// Answer to a rebuild request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller owns the build and must call [`RebuildGate::finish`] after it.
    Start,
    /// A build is running; one rebuild will follow it.
    Queued,
    /// A rebuild was already queued; this request is absorbed.
    Absorbed,
}

/// Collapses rebuild requests arriving during a build into one follow-up.
#[derive(Debug)]
pub struct RebuildGate {
    state: Mutex<GateState>,
}

impl RebuildGate {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Idle),
        }
    }

    pub fn request(&self) -> Admission {
        let mut state = self.state.lock();
        match *state {
            GateState::Idle => {
                *state = GateState::Running;
                Admission::Start
            }
            GateState::Running => {
                *state = GateState::RunningWithPending;
                Admission::Queued
            }
            GateState::RunningWithPending => Admission::Absorbed,
        }
    }

    /// Mark the running build done. Returns true when a queued rebuild must
    /// run now; the gate stays in the running state for it.
    pub fn finish(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            GateState::RunningWithPending => {
                *state = GateState::Running;
                true
            }
            GateState::Running | GateState::Idle => {
                *state = GateState::Idle;
                false
            }
        }
    }

    pub fn is_idle(&self) -> bool {
        *self.state.lock() == GateState::Idle
    }
}

impl Default for RebuildGate {
    fn default() -> Self {
        Self::new()
    }
}
