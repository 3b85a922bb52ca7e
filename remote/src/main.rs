mod adc;
mod buttons;
mod config;

use adc::AdcReader;
use anyhow::Result;
use buttons::{ButtonReader, Edge};
use config::{BUTTON_PLAY, BUTTON_RECORD, BUTTON_STOP, BUTTON_TURBO, Settings};
use crossbeam_channel::{Receiver, bounded, select, tick};
use pizdrive::ControlState;
use pizdrive::input::{ChangeFilter, RawInput};
use pizdrive::trace::init_tracing;
use pizdrive::transport::Publisher;
use std::env;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const SETTINGS_PATH: &str = "remote.json";
const BUTTON_NAMES: [&str; 4] = ["stop", "turbo", "record", "play"];

/// Sends the latest state every period, or a keepalive while there is none.
fn publisher_thread(
    publisher: Publisher,
    latest: Arc<Mutex<Option<ControlState>>>,
    period: Duration,
    stop: Receiver<()>,
) {
    info!("publishing to {} every {:?}", publisher.target(), period);
    let ticker = tick(period);
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                let state = latest.lock().unwrap_or_else(PoisonError::into_inner).clone();
                match state {
                    Some(state) => publisher.send(&state),
                    None => publisher.send_keepalive(),
                }
            }
        }
    }
}

fn main() -> Result<()> {
    init_tracing("info");
    info!("Starting remote");

    let path = env::args().nth(1).unwrap_or_else(|| String::from(SETTINGS_PATH));
    let mut settings = Settings::new(&path);
    match settings.load() {
        Ok(_) => info!("Loaded {}", path),
        Err(e) => warn!("Error loading {}: {}, using defaults", path, e),
    }
    settings.save()?;

    let mut adc_reader = AdcReader::new()?;
    let mut button_reader = ButtonReader::new(
        &settings.buttons.as_array(),
        Duration::from_millis(settings.debounce_ms),
    )?;

    let publisher = Publisher::connect((settings.vehicle_host.as_str(), settings.vehicle_port))?;
    let latest: Arc<Mutex<Option<ControlState>>> = Arc::new(Mutex::new(None));
    let period = settings.publish_period();

    let (interrupt_tx, interrupt_rx) = bounded(1);
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.try_send(());
    })?;

    // dropping `publisher_stop` ends the publisher thread
    let (publisher_stop, publisher_stop_rx) = bounded::<()>(0);
    let latest_clone = Arc::clone(&latest);
    let publisher_handle = thread::Builder::new()
        .name(String::from("publisher"))
        .spawn(move || publisher_thread(publisher, latest_clone, period, publisher_stop_rx))?;

    let mut filter = ChangeFilter::default();
    let ticker = tick(period);

    let result = loop {
        select! {
            recv(interrupt_rx) -> _ => break Ok(()),
            recv(ticker) -> _ => {
                for (i, edge) in button_reader.read_and_detect_edges().into_iter().enumerate() {
                    if let Some(Edge::Rising) = edge {
                        info!("[EVENT] {} pressed", BUTTON_NAMES[i]);
                    }
                }

                let adc_values = match adc_reader.read_all_channels() {
                    Ok(values) => values,
                    Err(e) => break Err(e),
                };

                let raw = RawInput {
                    steering: adc_values.get(settings.steering.adc).map(|&v| settings.steering.normalize(v)),
                    brake: adc_values.get(settings.brake.adc).map(|&v| settings.brake.normalize(v)),
                    accelerator: adc_values
                        .get(settings.accelerator.adc)
                        .map(|&v| settings.accelerator.normalize(v)),
                    stop: button_reader.is_pressed(BUTTON_STOP),
                    turbo: button_reader.is_pressed(BUTTON_TURBO),
                    record: button_reader.is_pressed(BUTTON_RECORD),
                    play: button_reader.is_pressed(BUTTON_PLAY),
                };

                if let Some(state) = filter.filter(settings.shaper.shape(&raw)) {
                    debug!("{:?}", state);
                    *latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
                }
            }
        }
    };

    drop(publisher_stop);
    if publisher_handle.join().is_err() {
        warn!("publisher thread panicked");
    }

    info!("remote stopped");
    result
}
