//! Remote steering and throttle actuation over UDP.
//!
//! The vehicle runs an [`ActuationLoop`](actuation::ActuationLoop) fed by a
//! [`Subscriber`](transport::Subscriber); the remote shapes operator input
//! into [`ControlState`](state::ControlState)s and sends them with a
//! [`Publisher`](transport::Publisher).

pub mod actuation;
pub mod actuator;
pub mod codec;
pub mod config;
pub mod error;
pub mod inbox;
pub mod input;
pub mod mapper;
pub mod recorder;
pub mod state;
pub mod trace;
pub mod transport;
pub mod watchdog;

pub use actuation::{ActuationLoop, TickOutcome};
pub use actuator::{ActuatorWriter, Channel, DutyCommand, DutyEncoding, PwmBackend, RecordingBackend};
pub use config::VehicleConfig;
pub use state::ControlState;
