mod config;
mod keys;

use dotenv::dotenv;
use log::{debug, info, warn};
use sysinfo::System;
use time::{OffsetDateTime, UtcOffset};
use keyscan_gpio::GpioDriver;
use keyscan_gpio::gpiod::GpiodDriver;
use keyscan_gpio::keypad::{self, ChannelSink, KeyEvent};
use keyscan_gpio::raw::RawGpioDriver;
use crate::config::{Backend, Config};
use crate::keys::KeyCode;

fn log_host() {
    const UNKNOWN_STR: &str = "???";

    info!(
        "Running on {} {} (kernel {})",
        System::name().as_deref().unwrap_or(UNKNOWN_STR),
        System::long_os_version().as_deref().unwrap_or(UNKNOWN_STR),
        System::kernel_version().as_deref().unwrap_or(UNKNOWN_STR),
    );
    info!(
        "Hostname {}, architecture {}",
        System::host_name().as_deref().unwrap_or(UNKNOWN_STR),
        System::cpu_arch(),
    );
}

fn open_gpio(config: &Config) -> eyre::Result<Box<dyn GpioDriver>> {
    let gpio: Box<dyn GpioDriver> = match config.backend {
        Backend::Gpiomem => Box::new(RawGpioDriver::new_gpiomem()?),
        Backend::Mem => Box::new(RawGpioDriver::new_mem()?),
        Backend::Gpiod => Box::new(GpiodDriver::open(&config.chip)?),
    };
    Ok(gpio)
}

fn log_event(event: &KeyEvent<KeyCode>, offset: UtcOffset) {
    let (h, m, s, ms) = OffsetDateTime::now_utc().to_offset(offset).to_hms_milli();
    info!(
        "[{:02}:{:02}:{:02}.{:03}] {} {} (code {})",
        h, m, s, ms,
        event.key,
        if event.pressed { "pressed" } else { "released" },
        event.key.code(),
    );
}

fn main() -> eyre::Result<()> {
    dotenv().ok();
    pretty_env_logger::init();

    info!("keyscan starting...");
    log_host();

    // The offset can only be read reliably while the process is single-threaded.
    let offset = UtcOffset::current_local_offset().unwrap_or_else(|_| {
        warn!("Local time offset unknown, using UTC.");
        UtcOffset::UTC
    });

    debug!("Trying to load config...");
    let config = if let Some(config) = Config::try_load()? {
        info!("Config loaded.");
        config
    } else {
        info!("Config not found. Using default");
        let config = Config::default();
        config.save()?;
        info!("Default config saved.");
        config
    };
    config.validate()?;

    info!("Keypad @ Rows: {:?}, Cols: {:?}", config.row_pins, config.col_pins);

    debug!("Initializing {:?} GPIO driver...", config.backend);
    let gpio = open_gpio(&config)?;
    debug!("{:?} initialized.", gpio);

    let (sink, events) = ChannelSink::<KeyCode>::new();
    let handle = keypad::init(config.keypad_config(), &*gpio, Box::new(sink))?;

    match config.exit_key {
        Some(key) => info!("Listening for keys, release {} to exit.", key),
        None => info!("Listening for keys."),
    }

    for event in events.iter() {
        log_event(&event, offset);

        if !event.pressed && Some(event.key) == config.exit_key {
            info!("Exit key released.");
            break;
        }
    }

    let (completed, failed) = (handle.completed_scans(), handle.failed_scans());
    keypad::shutdown(handle);
    info!("keyscan stopped after {} scans, {} failed.", completed, failed);

    Ok(())
}
