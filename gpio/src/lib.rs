pub mod gpiod;
pub mod keypad;
pub mod raw;

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};
use bitvec::vec::BitVec;
use thiserror::Error;

/// A hardware failure while configuring, driving or sampling a GPIO line.
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum GpioError {
    #[error("pin already in use")]
    AlreadyInUse,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("the feature is not supported on this backend")]
    NotSupported,
    #[error("IO error: {0}")]
    Io(std::io::ErrorKind),
    #[error("error: {0}")]
    Other(String),
}

impl From<std::io::Error> for GpioError {
    fn from(err: std::io::Error) -> Self {
        GpioError::Io(err.kind())
    }
}

pub type GpioResult<T> = Result<T, GpioError>;

/// A source of GPIO lines.
///
/// Drivers are cheap handles; every pin they hand out keeps the driver alive
/// and gives its line back when dropped.
pub trait GpioDriver: Debug + Send + Sync {
    /// Gets the amount of GPIO pins available.
    fn count(&self) -> GpioResult<usize>;

    /// Claims the GPIO pin at the given index.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the pin is already claimed.
    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin>>;
}

/// Which lines of a driver are handed out.
///
/// Shared by a driver and every pin it gave out. Checking and marking a line
/// happen under one lock, so a line is never handed out twice.
pub(crate) struct LineClaims {
    used: Mutex<BitVec>,
}

impl LineClaims {
    pub(crate) fn new(count: usize) -> Self {
        LineClaims {
            used: Mutex::new(BitVec::repeat(false, count)),
        }
    }

    /// Marks the line as in use.
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - `GpioError::AlreadyInUse` if the line is already claimed.
    pub(crate) fn claim(&self, index: usize) -> GpioResult<()> {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        if index >= used.len() {
            return Err(GpioError::InvalidArgument);
        }
        if used[index] {
            return Err(GpioError::AlreadyInUse);
        }
        used.set(index, true);
        Ok(())
    }

    pub(crate) fn release(&self, index: usize) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        if index < used.len() {
            used.set(index, false);
        }
    }
}

/// Specifies the active level of the GPIO pin.
///
/// By default, the active level is high.
///
/// Might be software-implemented.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioActiveLevel {
    #[default] High,
    Low,
}

impl GpioActiveLevel {
    /// Gets the real state that will be outputted on the GPIO pin based on the active level and the value.
    pub fn get_state(&self, value: bool) -> bool {
        match self {
            GpioActiveLevel::High => value,
            GpioActiveLevel::Low => !value,
        }
    }
}

/// Specifies the bias of the GPIO pin.
///
/// You can use this to enable pull-up or pull-down resistors.
/// These should work in both input and output modes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioBias {
    #[default] None,
    PullUp,
    PullDown,
}

/// Specifies the drive mode of the GPIO pin.
///
/// Works only in output mode.
///
/// By default, the drive mode is push-pull, which drives the pin high or low with low impedance.
/// There's also open-drain and open-source modes, that leave the pin floating when the output is high or low, respectively.
///
/// Leaving the pin floating might be implemented by setting the pin to input mode.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum GpioDriveMode {
    /// GPIO pin is driven high or low with low impedance.
    #[default] PushPull,
    /// GPIO pin is driven low or left floating when high.
    OpenDrain,
    /// GPIO pin is driven high or left floating when low.
    OpenSource,
}

impl GpioDriveMode {
    /// Gets the real state that will be outputted on the GPIO pin based on the drive mode and the value.
    ///
    /// # Returns
    /// - `Some(true)` if the pin will be driven high.
    /// - `Some(false)` if the pin will be driven low.
    /// - `None` if the pin will be left floating.
    pub fn get_state(&self, value: bool) -> Option<bool> {
        match self {
            GpioDriveMode::PushPull => Some(value),
            GpioDriveMode::OpenDrain => if value { None } else { Some(false) },
            GpioDriveMode::OpenSource => if value { Some(true) } else { None },
        }
    }
}

/// A claimed GPIO line that has not been given a direction yet.
pub trait GpioPin: Debug + Send {
    /// Gets the line number of this pin.
    fn index(&self) -> usize;

    /// Sets the GPIO pin function to input, allowing reading its state.
    fn into_input(self: Box<Self>) -> GpioResult<Box<dyn GpioInput>>;
    /// Sets the GPIO pin function to output, allowing writing its state.
    fn into_output(self: Box<Self>) -> GpioResult<Box<dyn GpioOutput>>;

    /// Gets whether the GPIO pin supports active level.
    fn supports_active_level(&self) -> bool {
        false
    }
    /// Gets the active level of the GPIO pin.
    fn active_level(&self) -> GpioActiveLevel {
        GpioActiveLevel::High
    }
    /// Sets the active level of the GPIO pin.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the pin does not support active level.
    fn set_active_level(&mut self, _level: GpioActiveLevel) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }

    /// Gets whether the GPIO pin supports bias (pull-up/pull-down resistors).
    fn supports_bias(&self) -> bool {
        false
    }
    /// Gets the bias of the GPIO pin.
    fn bias(&self) -> GpioBias {
        GpioBias::None
    }
    /// Sets the bias of the GPIO pin.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the pin does not support bias.
    fn set_bias(&mut self, _bias: GpioBias) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }

    /// Gets whether the GPIO pin supports drive mode (push-pull, open-drain, open-source).
    fn supports_drive_mode(&self) -> bool {
        false
    }
    /// Gets the drive mode of the GPIO pin.
    fn drive_mode(&self) -> GpioDriveMode {
        GpioDriveMode::PushPull
    }
    /// Sets the drive mode of the GPIO pin.
    ///
    /// # Errors
    /// - `GpioError::NotSupported` if the pin does not support drive mode.
    fn set_drive_mode(&mut self, _mode: GpioDriveMode) -> GpioResult<()> {
        Err(GpioError::NotSupported)
    }
}

pub trait GpioInput: Debug + Send {
    /// Reads the state of the GPIO pin.
    fn read(&self) -> GpioResult<bool>;
}

pub trait GpioOutput: Debug + Send {
    /// Writes the state of the GPIO pin.
    fn write(&self, value: bool) -> GpioResult<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Test doubles shared by the unit tests of this crate.

    use super::*;
    use std::collections::BTreeSet;
    use std::fmt::Formatter;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct FakeState {
        in_use: BTreeSet<usize>,
        outputs: Vec<(usize, bool)>,
        levels: BTreeSet<usize>,
        broken: BTreeSet<usize>,
    }

    /// An in-memory `GpioDriver`: lines listed in `broken` fail to claim,
    /// lines listed in `levels` read high.
    #[derive(Clone, Default)]
    pub struct FakeGpioDriver {
        state: Arc<Mutex<FakeState>>,
        count: usize,
    }

    impl FakeGpioDriver {
        pub fn new(count: usize) -> Self {
            Self { state: Arc::default(), count }
        }

        pub fn break_line(&self, index: usize) {
            self.state.lock().unwrap().broken.insert(index);
        }

        pub fn set_level(&self, index: usize, high: bool) {
            let mut state = self.state.lock().unwrap();
            if high {
                state.levels.insert(index);
            } else {
                state.levels.remove(&index);
            }
        }

        pub fn in_use(&self) -> Vec<usize> {
            self.state.lock().unwrap().in_use.iter().copied().collect()
        }

        pub fn writes(&self) -> Vec<(usize, bool)> {
            self.state.lock().unwrap().outputs.clone()
        }
    }

    impl Debug for FakeGpioDriver {
        fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
            write!(f, "FakeGpioDriver({})", self.count)
        }
    }

    impl GpioDriver for FakeGpioDriver {
        fn count(&self) -> GpioResult<usize> {
            Ok(self.count)
        }

        fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin>> {
            if index >= self.count {
                return Err(GpioError::InvalidArgument);
            }
            let mut state = self.state.lock().unwrap();
            if state.broken.contains(&index) {
                return Err(GpioError::Io(std::io::ErrorKind::PermissionDenied));
            }
            if !state.in_use.insert(index) {
                return Err(GpioError::AlreadyInUse);
            }
            Ok(Box::new(FakePin {
                driver: self.clone(),
                index,
                active_level: GpioActiveLevel::High,
            }))
        }
    }

    #[derive(Debug)]
    struct FakePin {
        driver: FakeGpioDriver,
        index: usize,
        active_level: GpioActiveLevel,
    }

    impl GpioPin for FakePin {
        fn index(&self) -> usize {
            self.index
        }

        fn into_input(self: Box<Self>) -> GpioResult<Box<dyn GpioInput>> {
            Ok(self)
        }

        fn into_output(self: Box<Self>) -> GpioResult<Box<dyn GpioOutput>> {
            Ok(self)
        }

        fn supports_active_level(&self) -> bool {
            true
        }

        fn active_level(&self) -> GpioActiveLevel {
            self.active_level
        }

        fn set_active_level(&mut self, level: GpioActiveLevel) -> GpioResult<()> {
            self.active_level = level;
            Ok(())
        }
    }

    impl GpioInput for FakePin {
        fn read(&self) -> GpioResult<bool> {
            let high = self.driver.state.lock().unwrap().levels.contains(&self.index);
            Ok(self.active_level.get_state(high))
        }
    }

    impl GpioOutput for FakePin {
        fn write(&self, value: bool) -> GpioResult<()> {
            let level = self.active_level.get_state(value);
            self.driver.state.lock().unwrap().outputs.push((self.index, level));
            Ok(())
        }
    }

    impl Drop for FakePin {
        fn drop(&mut self) {
            if let Ok(mut state) = self.driver.state.lock() {
                state.in_use.remove(&self.index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn line_is_claimed_once_until_released() {
        let claims = LineClaims::new(4);

        assert_eq!(claims.claim(2), Ok(()));
        assert_eq!(claims.claim(2), Err(GpioError::AlreadyInUse));
        assert_eq!(claims.claim(4), Err(GpioError::InvalidArgument));

        claims.release(2);
        assert_eq!(claims.claim(2), Ok(()));
    }

    #[test]
    fn racing_claims_hand_the_line_out_once() {
        const THREADS: usize = 8;

        for _ in 0..50 {
            let claims = LineClaims::new(32);
            let barrier = Barrier::new(THREADS);

            let granted = thread::scope(|scope| {
                let workers: Vec<_> = (0..THREADS)
                    .map(|_| {
                        scope.spawn(|| {
                            barrier.wait();
                            claims.claim(17)
                        })
                    })
                    .collect();
                workers
                    .into_iter()
                    .map(|worker| worker.join().unwrap())
                    .filter(Result::is_ok)
                    .count()
            });

            assert_eq!(granted, 1);
            assert_eq!(claims.claim(17), Err(GpioError::AlreadyInUse));
        }
    }
}
