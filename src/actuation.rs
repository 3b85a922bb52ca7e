//! The vehicle's control loop.
//!
//! Each tick takes at most one fresh state from the inbox, lets the watchdog
//! substitute a safe state when the link is quiet, lets the session recorder
//! substitute a replayed state, and finally writes steering and throttle
//! duty cycles through the [`ActuatorWriter`].

use crossbeam_channel::{Receiver, select, tick};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::actuator::{ActuatorWriter, Channel, DutyCommand, PwmBackend};
use crate::config::VehicleConfig;
use crate::error::{LoopError, StateError};
use crate::inbox::{IngressMode, StateInbox};
use crate::mapper::{DutyRange, combine_brake_accelerator, invert_steering};
use crate::recorder::{RecorderMode, SessionRecorder};
use crate::state::{Axes, ControlState};
use crate::watchdog::FailsafeWatchdog;

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing delivered yet and the watchdog deadline has not passed.
    NoInput,
    /// Same state as the last one applied; no hardware call was made.
    Unchanged,
    /// The effective state could not be actuated.
    Invalid(StateError),
    /// Duties were written. `faulted` lists the channels whose write
    /// failed or that were already latched.
    Applied {
        steering_duty: f64,
        throttle_duty: f64,
        faulted: Vec<Channel>,
    },
    /// The loop has been shut down.
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct Outputs {
    steering: Channel,
    throttle: Channel,
    frequency: f64,
    idle_duty: f64,
    range: DutyRange,
}

pub struct ActuationLoop<B> {
    outputs: Outputs,
    period: Duration,
    writer: ActuatorWriter<B>,
    watchdog: FailsafeWatchdog,
    recorder: SessionRecorder,
    last_applied: Option<ControlState>,
    started: bool,
    shut_down: bool,
}

impl<B: PwmBackend> ActuationLoop<B> {
    pub fn new(config: &VehicleConfig, backend: B) -> Self {
        ActuationLoop {
            outputs: Outputs {
                steering: config.steering(),
                throttle: config.throttle(),
                frequency: config.frequency,
                idle_duty: config.idle_duty,
                range: config.duty_range(),
            },
            period: config.tick_period(),
            writer: ActuatorWriter::new(backend),
            watchdog: FailsafeWatchdog::new(config.watchdog_timeout()),
            recorder: SessionRecorder::new(config.recorder),
            last_applied: None,
            started: false,
            shut_down: false,
        }
    }

    /// Puts both outputs at idle duty and arms the watchdog.
    pub fn start(&mut self, now: Instant) -> Result<(), LoopError> {
        info!(
            "outputs on gpio {} (steering) and {} (throttle) at {} Hz",
            self.outputs.steering, self.outputs.throttle, self.outputs.frequency
        );
        let idle = self.outputs.idle_duty;
        let faulted = self.drive(idle, idle)?;
        if !faulted.is_empty() {
            warn!("starting without gpio {:?}", faulted);
        }
        self.watchdog.arm(now);
        self.started = true;
        Ok(())
    }

    /// Runs one control step with whatever the inbox delivered this tick.
    pub fn tick(&mut self, fresh: Option<ControlState>, now: Instant) -> Result<TickOutcome, LoopError> {
        if self.shut_down {
            return Ok(TickOutcome::Stopped);
        }

        let Some(candidate) = self.watchdog.observe(fresh, self.last_applied.as_ref(), now) else {
            return Ok(TickOutcome::NoInput);
        };

        let (effective, mode_changed) = self.recorder.tick(candidate);
        if mode_changed {
            info!("[MODE] session {:?}", self.recorder.mode());
        }

        if self.last_applied.as_ref() == Some(&effective) {
            return Ok(TickOutcome::Unchanged);
        }

        let axes = match effective.axes() {
            Ok(axes) => axes,
            Err(e) => {
                debug!("state skipped: {}", e);
                return Ok(TickOutcome::Invalid(e));
            }
        };

        let (steering_duty, throttle_duty) = self.duties(&axes);
        trace!("{:.3}\t{:.3}", steering_duty, throttle_duty);

        let driven = self.drive(steering_duty, throttle_duty);
        self.last_applied = Some(effective);
        let faulted = driven?;

        Ok(TickOutcome::Applied {
            steering_duty,
            throttle_duty,
            faulted,
        })
    }

    fn duties(&self, axes: &Axes) -> (f64, f64) {
        let range = self.outputs.range;
        let steering = range.to_duty_percent(invert_steering(axes.steering));
        let throttle = range.to_duty_percent(combine_brake_accelerator(axes.brake, axes.accelerator));
        (steering, throttle)
    }

    /// Writes both channels and returns the ones that could not be written.
    /// A failing channel does not stop the other one; only losing every
    /// channel is an error.
    fn drive(&mut self, steering_duty: f64, throttle_duty: f64) -> Result<Vec<Channel>, LoopError> {
        let outputs = self.outputs;
        let mut faulted = Vec::new();
        for (channel, duty) in [(outputs.steering, steering_duty), (outputs.throttle, throttle_duty)] {
            let command = DutyCommand {
                channel,
                frequency: outputs.frequency,
                duty_percent: outputs.range.clamp(duty),
            };
            if let Err(e) = self.writer.apply(command) {
                trace!("{}", e);
                faulted.push(channel);
            }
        }

        if self.writer.is_faulted(outputs.steering) && self.writer.is_faulted(outputs.throttle) {
            return Err(LoopError::AllChannelsFaulted);
        }
        Ok(faulted)
    }

    /// Drives `tick` from a fixed-period tick source until `stop` fires or
    /// its sender is dropped, then shuts down.
    pub fn run(&mut self, inbox: &StateInbox, stop: &Receiver<()>) -> Result<(), LoopError> {
        if !self.started {
            self.start(Instant::now())?;
        }
        let ticker = tick(self.period);
        info!("control loop running every {:?}", self.period);

        let result = loop {
            select! {
                recv(stop) -> _ => break Ok(()),
                recv(ticker) -> at => {
                    let now = at.unwrap_or_else(|_| Instant::now());
                    if let Err(e) = self.tick(inbox.try_recv(), now) {
                        break Err(e);
                    }
                    inbox.set_mode(self.ingress_mode());
                }
            }
        };

        if let Err(e) = &result {
            warn!("control loop ended: {}", e);
        }
        let shutdown = self.shutdown();
        result.and(shutdown)
    }

    /// Ordered delivery is needed while a session is recorded or played.
    pub fn ingress_mode(&self) -> IngressMode {
        match self.recorder.mode() {
            RecorderMode::Idle => IngressMode::Coalesce,
            RecorderMode::Recording | RecorderMode::Playing => IngressMode::Fifo,
        }
    }

    /// Leaves both outputs at idle duty. Safe to call before `start` and
    /// more than once.
    pub fn shutdown(&mut self) -> Result<(), LoopError> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;
        info!("outputs to idle");
        let idle = self.outputs.idle_duty;
        self.drive(idle, idle).map(|_| ())
    }

    pub fn last_applied(&self) -> Option<&ControlState> {
        self.last_applied.as_ref()
    }

    pub fn watchdog(&self) -> &FailsafeWatchdog {
        &self.watchdog
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut SessionRecorder {
        &mut self.recorder
    }

    pub fn writer(&self) -> &ActuatorWriter<B> {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{DutyEncoding, PwmCall, RecordingBackend};

    const EPS: f64 = 1e-9;

    fn fixture() -> (ActuationLoop<RecordingBackend>, RecordingBackend) {
        let backend = RecordingBackend::new(DutyEncoding::Percent);
        let actuation = ActuationLoop::new(&VehicleConfig::default(), backend.clone());
        (actuation, backend)
    }

    fn applied(outcome: TickOutcome) -> (f64, f64) {
        match outcome {
            TickOutcome::Applied {
                steering_duty,
                throttle_duty,
                ..
            } => (steering_duty, throttle_duty),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn start_drives_idle() {
        let (mut actuation, backend) = fixture();
        actuation.start(Instant::now()).unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                PwmCall::Frequency(Channel(19), 50.0),
                PwmCall::DutyCycle(Channel(19), 7.5),
                PwmCall::Frequency(Channel(12), 50.0),
                PwmCall::DutyCycle(Channel(12), 7.5),
            ]
        );
    }

    #[test]
    fn applies_mapped_duties() {
        let (mut actuation, _) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();

        let state = ControlState::new(0.13, 0.0, 1.0);
        let (steering, throttle) = applied(actuation.tick(Some(state.clone()), t0).unwrap());
        assert!((steering - 7.825).abs() < EPS);
        assert!((throttle - 6.25).abs() < EPS);
        assert_eq!(actuation.last_applied(), Some(&state));
    }

    #[test]
    fn identical_state_is_skipped() {
        let (mut actuation, backend) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();

        let state = ControlState::new(-0.3, -1.0, 0.2);
        actuation.tick(Some(state.clone()), t0).unwrap();
        backend.clear();

        let outcome = actuation.tick(Some(state), t0 + Duration::from_millis(20)).unwrap();
        assert_eq!(outcome, TickOutcome::Unchanged);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn incomplete_state_never_reaches_hardware() {
        let (mut actuation, backend) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        backend.clear();

        let partial = ControlState {
            steering: Some(0.4),
            ..Default::default()
        };
        let outcome = actuation.tick(Some(partial), t0).unwrap();
        assert_eq!(outcome, TickOutcome::Invalid(StateError::Missing("brake")));
        assert!(backend.calls().is_empty());
        assert_eq!(actuation.last_applied(), None);
    }

    #[test]
    fn no_input_before_deadline() {
        let (mut actuation, backend) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        backend.clear();

        assert_eq!(
            actuation.tick(None, t0 + Duration::from_millis(20)).unwrap(),
            TickOutcome::NoInput
        );
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn single_faulted_channel_keeps_the_loop_alive() {
        let (mut actuation, backend) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        backend.fail_channel(Channel(19));
        backend.clear();

        let outcome = actuation.tick(Some(ControlState::new(0.5, -1.0, 1.0)), t0).unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Applied { ref faulted, .. } if *faulted == vec![Channel(19)]
        ));
        assert!(actuation.writer().is_faulted(Channel(19)));
        assert_eq!(backend.calls().len(), 1);

        // a latched channel keeps being reported without touching hardware
        let outcome = actuation
            .tick(Some(ControlState::new(-0.5, -1.0, 0.0)), t0 + Duration::from_millis(20))
            .unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Applied { ref faulted, .. } if *faulted == vec![Channel(19)]
        ));
        assert_eq!(backend.calls().len(), 2);
    }

    #[test]
    fn healthy_outputs_report_no_faults() {
        let (mut actuation, _) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        let outcome = actuation.tick(Some(ControlState::new(0.5, -1.0, 1.0)), t0).unwrap();
        assert!(matches!(outcome, TickOutcome::Applied { ref faulted, .. } if faulted.is_empty()));
    }

    #[test]
    fn losing_every_channel_is_fatal() {
        let (mut actuation, backend) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        backend.fail_channel(Channel(19));
        backend.fail_channel(Channel(12));

        let result = actuation.tick(Some(ControlState::new(0.5, -1.0, 1.0)), t0);
        assert!(matches!(result, Err(LoopError::AllChannelsFaulted)));
    }

    #[test]
    fn shutdown_before_start_still_idles() {
        let (mut actuation, backend) = fixture();
        actuation.shutdown().unwrap();
        assert_eq!(
            backend.calls(),
            vec![
                PwmCall::Frequency(Channel(19), 50.0),
                PwmCall::DutyCycle(Channel(19), 7.5),
                PwmCall::Frequency(Channel(12), 50.0),
                PwmCall::DutyCycle(Channel(12), 7.5),
            ]
        );
        assert_eq!(
            actuation.tick(Some(ControlState::new(0.0, 0.0, 0.0)), Instant::now()).unwrap(),
            TickOutcome::Stopped
        );
        actuation.shutdown().unwrap();
        assert_eq!(backend.calls().len(), 4);
    }

    #[test]
    fn ingress_follows_session_mode() {
        let (mut actuation, _) = fixture();
        let t0 = Instant::now();
        actuation.start(t0).unwrap();
        assert_eq!(actuation.ingress_mode(), IngressMode::Coalesce);

        let record = ControlState {
            record: true,
            ..ControlState::new(0.0, -1.0, -1.0)
        };
        actuation.tick(Some(record), t0).unwrap();
        assert_eq!(actuation.ingress_mode(), IngressMode::Fifo);
    }
}
