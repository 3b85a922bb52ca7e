use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::state::ControlState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    /// Fresh input arrived within the timeout.
    Armed,
    /// The link went quiet; a safe substitute is emitted every tick.
    Safing,
}

/// Substitutes a safe state when no fresh input arrived within `timeout`.
#[derive(Debug)]
pub struct FailsafeWatchdog {
    timeout: Duration,
    phase: WatchdogPhase,
    last_fresh: Option<Instant>,
    last_delivered: Option<ControlState>,
}

impl FailsafeWatchdog {
    pub fn new(timeout: Duration) -> Self {
        FailsafeWatchdog {
            timeout,
            phase: WatchdogPhase::Armed,
            last_fresh: None,
            last_delivered: None,
        }
    }

    /// A timeout of `multiplier` nominal input periods, so that a single
    /// dropped datagram does not trip the failsafe.
    pub fn recommended_timeout(tick_hz: u32, multiplier: u32) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(tick_hz.max(1))) * multiplier
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    /// Starts the deadline without any input delivered yet.
    pub fn arm(&mut self, now: Instant) {
        self.last_fresh = Some(now);
        self.phase = WatchdogPhase::Armed;
    }

    pub fn is_timed_out(&self, now: Instant) -> bool {
        match self.last_fresh {
            Some(at) => now.saturating_duration_since(at) > self.timeout,
            None => true,
        }
    }

    /// Feeds this tick's ingress result and returns the candidate state.
    ///
    /// `None` means nothing was ever delivered and the deadline has not
    /// passed yet.
    pub fn observe(
        &mut self,
        fresh: Option<ControlState>,
        last_applied: Option<&ControlState>,
        now: Instant,
    ) -> Option<ControlState> {
        if let Some(state) = fresh {
            self.last_fresh = Some(now);
            self.last_delivered = Some(state);
        }
        let timed_out = self.is_timed_out(now);
        let delivered = self.last_delivered.clone();
        self.next_state(delivered, timed_out, last_applied)
    }

    pub fn next_state(
        &mut self,
        last_delivered: Option<ControlState>,
        timed_out: bool,
        last_applied: Option<&ControlState>,
    ) -> Option<ControlState> {
        if !timed_out {
            if self.phase == WatchdogPhase::Safing {
                info!("input restored, watchdog re-armed");
                self.phase = WatchdogPhase::Armed;
            }
            return last_delivered;
        }

        if self.phase == WatchdogPhase::Armed {
            warn!("no input for {:?}, failsafe engaged", self.timeout);
            self.phase = WatchdogPhase::Safing;
        }
        Some(Self::safe_state(last_applied))
    }

    /// Holds the last applied heading, releases both pedals and sets the
    /// handbrake.
    pub fn safe_state(last_applied: Option<&ControlState>) -> ControlState {
        let steering = last_applied.and_then(|s| s.steering).unwrap_or(0.0);
        ControlState {
            handbrake: true,
            ..ControlState::new(steering, -1.0, -1.0)
        }
    }
}
