//! GpiodDriver implementation for managing GPIO pins through the Linux GPIO character device.
use crate::{
    GpioActiveLevel, GpioBias, GpioDriver, GpioInput, GpioOutput, GpioPin, GpioResult, LineClaims,
};
use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;

struct GpiodInner {
    chip: gpiod::Chip,
    used_pins: LineClaims,
}

/// GpiodDriver is a GPIO driver that uses the gpiod library to manage GPIO pins.
#[derive(Clone)]
pub struct GpiodDriver {
    inner: Arc<GpiodInner>,
}

impl GpiodDriver {
    pub fn new(chip: gpiod::Chip) -> Self {
        let used_pins = LineClaims::new(chip.num_lines() as usize);
        Self {
            inner: Arc::new(GpiodInner { chip, used_pins }),
        }
    }

    /// Opens the chip at `path`, e.g. `/dev/gpiochip0`.
    pub fn open(path: impl AsRef<Path>) -> GpioResult<Self> {
        Ok(Self::new(gpiod::Chip::new(path.as_ref())?))
    }
}

impl Debug for GpiodDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpiodDriver({})", self.inner.chip.name())
    }
}

impl GpioDriver for GpiodDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(self.inner.chip.num_lines() as usize)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin>> {
        self.inner.used_pins.claim(index)?;

        Ok(Box::new(GpiodPin {
            driver: self.clone(),
            pin_index: index,
            active_level: GpioActiveLevel::High,
            bias: GpioBias::None,
        }))
    }
}

impl From<GpioActiveLevel> for gpiod::Active {
    fn from(level: GpioActiveLevel) -> Self {
        match level {
            GpioActiveLevel::High => gpiod::Active::High,
            GpioActiveLevel::Low => gpiod::Active::Low,
        }
    }
}

impl From<GpioBias> for gpiod::Bias {
    fn from(bias: GpioBias) -> Self {
        match bias {
            GpioBias::None => gpiod::Bias::Disable,
            GpioBias::PullUp => gpiod::Bias::PullUp,
            GpioBias::PullDown => gpiod::Bias::PullDown,
        }
    }
}

struct GpiodPin {
    driver: GpiodDriver,
    pin_index: usize,
    active_level: GpioActiveLevel,
    bias: GpioBias,
}

impl Debug for GpiodPin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for GpiodPin {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn into_input(self: Box<Self>) -> GpioResult<Box<dyn GpioInput>> {
        let line = self.driver.inner.chip.request_lines(
            gpiod::Options::input([self.pin_index as u32])
                .consumer(env!("CARGO_PKG_NAME"))
                .active(self.active_level.into())
                .bias(self.bias.into()),
        )?;
        Ok(Box::new(GpiodInput { line, pin: *self }))
    }

    fn into_output(self: Box<Self>) -> GpioResult<Box<dyn GpioOutput>> {
        let line = self.driver.inner.chip.request_lines(
            gpiod::Options::output([self.pin_index as u32])
                .consumer(env!("CARGO_PKG_NAME"))
                .active(self.active_level.into())
                .bias(self.bias.into()),
        )?;
        line.set_values([false])?;
        Ok(Box::new(GpiodOutput { line, pin: *self }))
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

    fn supports_bias(&self) -> bool {
        true
    }

    fn bias(&self) -> GpioBias {
        self.bias
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.bias = bias;
        Ok(())
    }
}

impl Drop for GpiodPin {
    fn drop(&mut self) {
        self.driver.inner.used_pins.release(self.pin_index);
    }
}

struct GpiodInput {
    line: gpiod::Lines<gpiod::Input>,
    pin: GpiodPin,
}

impl Debug for GpiodInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for GpiodInput {
    fn read(&self) -> GpioResult<bool> {
        let values = self.line.get_values([false])?;
        Ok(values[0])
    }
}

struct GpiodOutput {
    line: gpiod::Lines<gpiod::Output>,
    pin: GpiodPin,
}

impl Debug for GpiodOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for GpiodOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        self.line.set_values([value])?;
        Ok(())
    }
}
