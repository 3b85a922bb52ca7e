mod servo;

use anyhow::Result;
use pizdrive::actuator::{DutyEncoding, PwmBackend, RecordingBackend};
use pizdrive::inbox::StateInbox;
use pizdrive::trace::init_tracing;
use pizdrive::transport::{Subscriber, subscriber_thread};
use pizdrive::{ActuationLoop, VehicleConfig};
use servo::ServoController;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const CONFIG_PATH: &str = "vehicle.json";

fn run<B: PwmBackend>(config: &VehicleConfig, backend: B) -> Result<()> {
    let inbox = Arc::new(StateInbox::default());
    let subscriber = Subscriber::bind(("0.0.0.0", config.listen_port), config.receive_timeout())?;
    let listener = subscriber_thread(subscriber, Arc::clone(&inbox))?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let mut actuation = ActuationLoop::new(config, backend);

    if let Some(path) = config.session_path.as_deref() {
        if Path::new(path).exists() {
            match actuation.recorder_mut().load_from(path) {
                Ok(count) => info!("loaded {} recorded states from {}", count, path),
                Err(e) => warn!("session {} not loaded: {}", path, e),
            }
        }
    }

    let result = actuation.run(&inbox, &stop_rx);

    inbox.close();
    if listener.join().is_err() {
        warn!("subscriber thread panicked");
    }

    if let Some(path) = config.session_path.as_deref() {
        if actuation.recorder().has_new_recording() {
            match actuation.recorder().save_to(path) {
                Ok(()) => info!("saved {} recorded states to {}", actuation.recorder().len(), path),
                Err(e) => warn!("session {} not saved: {}", path, e),
            }
        }
    }

    result?;
    info!("vehicle stopped");
    Ok(())
}

fn main() -> Result<()> {
    init_tracing("info");

    let path = env::args().nth(1).unwrap_or_else(|| String::from(CONFIG_PATH));
    let config = VehicleConfig::load_or_default(&path)?;

    if config.dry_run {
        info!("dry run, no GPIO output");
        run(&config, RecordingBackend::new(DutyEncoding::Percent))
    } else {
        let controller = ServoController::new(&[config.steering(), config.throttle()])?;
        run(&config, controller)
    }
}
