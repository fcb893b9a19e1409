use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use crate::GpioDriver;
use crate::keypad::{
    EventSink, GpioPinMatrix, KeyIdentity, Keymap, KeypadResult, MatrixOptions, PinMatrix, ScanEngine, ScanTiming,
    Scheduler, SchedulerState,
};

/// Everything needed to bring a keypad up.
#[derive(Clone, Debug)]
pub struct KeypadConfig<K> {
    /// Row lines, in row order.
    pub row_pins: Vec<usize>,
    /// Column lines, in column order.
    pub col_pins: Vec<usize>,
    /// Key of every cell, `row_pins.len()` rows of `col_pins.len()` keys.
    pub keymap: Vec<Vec<K>>,
    pub timing: ScanTiming,
    pub settle_delay: Duration,
    pub options: MatrixOptions,
}

impl<K: KeyIdentity> KeypadConfig<K> {
    /// Creates a config with the default timing and electrical options.
    pub fn new(row_pins: Vec<usize>, col_pins: Vec<usize>, keymap: Vec<Vec<K>>) -> Self {
        KeypadConfig {
            row_pins,
            col_pins,
            keymap,
            timing: ScanTiming::default(),
            settle_delay: ScanEngine::<K>::DEFAULT_SETTLE_DELAY,
            options: MatrixOptions::default(),
        }
    }
}

/// A running keypad. Dropping it shuts the keypad down.
#[derive(Debug)]
pub struct KeypadHandle<K> {
    scheduler: Scheduler<K>,
}

/// Brings a keypad up: claims its lines, registers the sink and starts scanning.
///
/// Nothing is left claimed when this fails.
pub fn init<K: KeyIdentity>(
    config: KeypadConfig<K>,
    gpio: &dyn GpioDriver,
    mut sink: Box<dyn EventSink<K>>,
) -> KeypadResult<KeypadHandle<K>> {
    let keymap = Keymap::new(config.keymap)?;
    let engine = ScanEngine::new(keymap, config.row_pins.len(), config.col_pins.len())?
        .with_settle_delay(config.settle_delay);

    debug!("Claiming keypad lines, rows: {:?}, cols: {:?}", config.row_pins, config.col_pins);
    let matrix = Box::new(GpioPinMatrix::acquire(gpio, &config.row_pins, &config.col_pins, config.options)?);

    let capabilities = engine.keymap().capabilities();
    if let Err(e) = sink.register(&capabilities) {
        warn!("Failed to register {:?}: {}", sink, e);
        matrix.release();
        return Err(e.into());
    }
    debug!("Registered {:?} with {} keys.", sink, capabilities.len());

    let scheduler = Scheduler::start(Arc::new(engine), matrix, sink, config.timing)?;
    info!("Keypad loaded.");
    Ok(KeypadHandle { scheduler })
}

/// Stops scanning and gives every line back. See [KeypadHandle::shutdown].
pub fn shutdown<K: KeyIdentity>(handle: KeypadHandle<K>) {
    handle.shutdown();
}

impl<K: KeyIdentity> KeypadHandle<K> {
    /// Cancels the next scan, waits for a running one to finish, then
    /// releases the lines and drops the sink, in that order.
    pub fn shutdown(mut self) {
        if let Some((matrix, sink)) = self.scheduler.stop() {
            matrix.release();
            drop(sink);
        }
        info!("Keypad unloaded.");
    }

    /// Gets the keys currently held down.
    pub fn pressed(&self) -> Vec<K> {
        self.scheduler.engine().pressed()
    }

    pub fn keymap(&self) -> &Keymap<K> {
        self.scheduler.engine().keymap()
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn completed_scans(&self) -> u64 {
        self.scheduler.completed_scans()
    }

    pub fn failed_scans(&self) -> u64 {
        self.scheduler.failed_scans()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGpioDriver;
    use crate::keypad::testing::{wait_for, CollectingSink};
    use crate::keypad::{KeyEvent, KeypadError};
    use crate::GpioError;

    const ROWS: [usize; 4] = [17, 5, 6, 13];
    const COLS: [usize; 4] = [23, 24, 12, 16];

    fn config() -> KeypadConfig<&'static str> {
        let mut config = KeypadConfig::new(
            ROWS.to_vec(),
            COLS.to_vec(),
            vec![
                vec!["1", "2", "3", "A"],
                vec!["4", "5", "6", "B"],
                vec!["7", "8", "9", "C"],
                vec!["BACKSPACE", "0", "KPENTER", "D"],
            ],
        );
        config.timing = ScanTiming {
            initial_delay: Duration::from_millis(5),
            interval: Duration::from_millis(2),
        };
        config
    }

    #[test]
    fn defaults_match_the_reference_wiring() {
        let config = KeypadConfig::new(vec![0], vec![1], vec![vec!['x']]);
        assert_eq!(config.timing.initial_delay, Duration::from_millis(100));
        assert_eq!(config.timing.interval, Duration::from_millis(30));
        assert_eq!(config.settle_delay, Duration::from_micros(10));
    }

    #[test]
    fn registers_capabilities_before_scanning() {
        let gpio = FakeGpioDriver::new(32);
        let sink = CollectingSink::<&'static str>::new();
        let handle = init(config(), &gpio, Box::new(sink.clone())).unwrap();

        let capabilities = sink.capabilities().unwrap();
        assert_eq!(capabilities.len(), 16);
        assert!(capabilities.contains("KPENTER"));
        assert_eq!(handle.keymap().rows(), 4);

        handle.shutdown();
    }

    #[test]
    fn scans_the_hardware_and_releases_it_on_shutdown() {
        let gpio = FakeGpioDriver::new(32);
        let sink = CollectingSink::<&'static str>::new();
        let handle = init(config(), &gpio, Box::new(sink.clone())).unwrap();
        assert_eq!(gpio.in_use().len(), 8);

        // Column 24 reads high whichever row is driven, so the whole column shows up.
        gpio.set_level(24, true);
        assert!(wait_for(|| sink.events().len() == 4));
        assert_eq!(handle.pressed(), vec!["2", "5", "8", "0"]);

        gpio.set_level(24, false);
        assert!(wait_for(|| sink.events().len() == 8));
        assert!(handle.pressed().is_empty());

        handle.shutdown();
        assert!(gpio.in_use().is_empty());
        assert!(gpio.writes().ends_with(&[(17, false), (5, false), (6, false), (13, false)]));

        gpio.set_level(23, true);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(sink.events().len(), 8);
        assert_eq!(
            sink.events()[..4],
            [
                KeyEvent { key: "2", pressed: true },
                KeyEvent { key: "5", pressed: true },
                KeyEvent { key: "8", pressed: true },
                KeyEvent { key: "0", pressed: true },
            ]
        );
    }

    #[test]
    fn rejects_keymap_that_does_not_fit_the_pins() {
        let gpio = FakeGpioDriver::new(32);
        let mut config = config();
        config.col_pins.pop();

        let result = init(config, &gpio, Box::new(CollectingSink::<&'static str>::new()));
        assert!(matches!(result, Err(KeypadError::KeymapShape { cols: 3, .. })));
        assert!(gpio.in_use().is_empty());
    }

    #[test]
    fn failed_line_leaves_nothing_claimed() {
        let gpio = FakeGpioDriver::new(32);
        gpio.break_line(16);
        let sink = CollectingSink::<&'static str>::new();

        let result = init(config(), &gpio, Box::new(sink.clone()));
        assert!(matches!(result, Err(KeypadError::Hardware(GpioError::Io(_)))));
        assert!(gpio.in_use().is_empty());
        assert!(sink.capabilities().is_none());
    }

    #[test]
    fn failed_registration_releases_the_lines() {
        let gpio = FakeGpioDriver::new(32);

        let result = init(config(), &gpio, Box::new(CollectingSink::<&'static str>::refusing()));
        assert!(matches!(result, Err(KeypadError::Hardware(GpioError::Other(_)))));
        assert!(gpio.in_use().is_empty());
    }

    #[test]
    fn dropping_the_handle_shuts_down() {
        let gpio = FakeGpioDriver::new(32);
        let handle = init(config(), &gpio, Box::new(CollectingSink::<&'static str>::new())).unwrap();
        assert!(wait_for(|| handle.completed_scans() >= 1));

        drop(handle);
        assert!(gpio.in_use().is_empty());
    }
}
