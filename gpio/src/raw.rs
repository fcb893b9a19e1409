//! Direct register access to the BCM283x/BCM2711 GPIO block through `/dev/gpiomem` or `/dev/mem`.

use crate::{
    GpioActiveLevel, GpioBias, GpioDriveMode, GpioDriver, GpioError, GpioInput, GpioOutput, GpioPin, GpioResult,
    LineClaims,
};
use log::trace;
use memmap2::{MmapOptions, MmapRaw};
use std::fmt::{Debug, Formatter};
use std::fs::OpenOptions;
use std::sync::Arc;

struct RawGpioInner {
    mmap: MmapRaw,
    used_pins: LineClaims,
}

/// GPIO driver poking the peripheral registers directly.
#[derive(Clone)]
pub struct RawGpioDriver {
    inner: Arc<RawGpioInner>,
}

impl RawGpioDriver {
    const GPIO_BASE: u32 = 0x3F200000;

    const PIN_COUNT: usize = 58;

    fn create(path: &str, offset: u64) -> GpioResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;

        let mmap = MmapOptions::new()
                .offset(offset)
                .len(4096)
                .map_raw(&file)?;

        Ok(RawGpioDriver {
            inner: Arc::new(RawGpioInner {
                mmap,
                used_pins: LineClaims::new(Self::PIN_COUNT),
            }),
        })
    }

    /// Maps the GPIO block through `/dev/gpiomem`, which exposes it at offset zero.
    pub fn new_gpiomem() -> GpioResult<Self> {
        Self::create("/dev/gpiomem", 0)
    }

    /// Maps the GPIO block through `/dev/mem` at the peripheral base address.
    pub fn new_mem() -> GpioResult<Self> {
        Self::create("/dev/mem", Self::GPIO_BASE as u64)
    }

    fn register(&self, word: usize) -> *mut u32 {
        let mmap = self.inner.mmap.as_mut_ptr() as *mut u32;
        unsafe { mmap.add(word) }
    }

    fn check_index(pin_index: usize) -> GpioResult<()> {
        if pin_index >= Self::PIN_COUNT {
            return Err(GpioError::InvalidArgument);
        }
        Ok(())
    }

    pub(crate) fn raw_set_pin_function(&self, pin_index: usize, function: u8) -> GpioResult<()> {
        if function > 0b111 {
            return Err(GpioError::InvalidArgument);
        }
        Self::check_index(pin_index)?;

        // GPFSELn register
        let register_ptr = self.register(pin_index / 10);
        let shift = (pin_index % 10) * 3;

        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b111 << shift);
        register_value |= (function as u32) << shift;
        unsafe { register_ptr.write_volatile(register_value) };

        trace!("Set pin function: pin_index={} function={}", pin_index, function);

        Ok(())
    }

    pub(crate) fn raw_set_pin_output(&self, pin_index: usize, high: bool) -> GpioResult<()> {
        Self::check_index(pin_index)?;

        // GPSETn/GPCLRn register
        let register_ptr = self.register(if high { 0x1c / 4 } else { 0x28 / 4 } + pin_index / 32);
        let shift = pin_index % 32;

        unsafe { register_ptr.write_volatile(1 << shift) };

        Ok(())
    }

    pub(crate) fn raw_get_pin_level(&self, pin_index: usize) -> GpioResult<bool> {
        Self::check_index(pin_index)?;

        // GPLEVn register
        let register_ptr = self.register((0x34 / 4) + pin_index / 32);
        let shift = pin_index % 32;

        let register_value = unsafe { register_ptr.read_volatile() };
        Ok((register_value >> shift) & 1 != 0)
    }

    pub(crate) fn drive_pin(&self, pin_index: usize, high: bool, mode: GpioDriveMode) -> GpioResult<()> {
        match mode.get_state(high) {
            Some(output) => {
                self.raw_set_pin_output(pin_index, output)?;
                self.raw_set_pin_function(pin_index, 1)?; // Output
            }
            None => {
                self.raw_set_pin_function(pin_index, 0)?; // Input, floating
            }
        }

        Ok(())
    }

    pub(crate) fn raw_set_bias(&self, pin_index: usize, bias: GpioBias) -> GpioResult<()> {
        Self::check_index(pin_index)?;

        let bias_value = match bias {
            GpioBias::None => 0b00,
            GpioBias::PullUp => 0b01,
            GpioBias::PullDown => 0b10,
        };

        // GPIO_PUP_PDN_CNTRL_REGn register (yes that is a long name)
        let register_ptr = self.register(0xE4 / 4 + pin_index / 16);
        let shift = (pin_index % 16) * 2;
        let mut register_value = unsafe { register_ptr.read_volatile() };
        register_value &= !(0b11 << shift);
        register_value |= bias_value << shift;

        unsafe { register_ptr.write_volatile(register_value) };

        Ok(())
    }

    pub(crate) fn raw_get_bias(&self, pin_index: usize) -> GpioResult<GpioBias> {
        Self::check_index(pin_index)?;

        let register_ptr = self.register(0xE4 / 4 + pin_index / 16);
        let shift = (pin_index % 16) * 2;
        let register_value = unsafe { register_ptr.read_volatile() };

        match (register_value >> shift) & 0b11 {
            0b00 => Ok(GpioBias::None),
            0b01 => Ok(GpioBias::PullUp),
            0b10 => Ok(GpioBias::PullDown),
            _ => Err(GpioError::NotSupported),
        }
    }

    pub(crate) fn raw_reset(&self, pin_index: usize) -> GpioResult<()> {
        self.raw_set_pin_function(pin_index, 0)?;
        self.raw_set_bias(pin_index, GpioBias::None)?;
        self.raw_set_pin_output(pin_index, false)?;
        Ok(())
    }
}

impl Debug for RawGpioDriver {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawGpioDriver({:?})", self.inner.mmap.as_ptr().addr())
    }
}

impl GpioDriver for RawGpioDriver {
    fn count(&self) -> GpioResult<usize> {
        Ok(Self::PIN_COUNT)
    }

    fn get_pin(&self, index: usize) -> GpioResult<Box<dyn GpioPin>> {
        self.inner.used_pins.claim(index)?;
        let pin = RawGpioPin {
            driver: self.clone(),
            pin_index: index,
            active_level: GpioActiveLevel::High,
            drive_mode: GpioDriveMode::PushPull,
        };
        // Dropping `pin` on failure gives the line back.
        self.raw_reset(index)?;

        Ok(Box::new(pin))
    }
}

struct RawGpioPin {
    driver: RawGpioDriver,
    pin_index: usize,
    active_level: GpioActiveLevel,
    drive_mode: GpioDriveMode,
}

impl Debug for RawGpioPin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[{}]", self.driver, self.pin_index)
    }
}

impl GpioPin for RawGpioPin {
    fn index(&self) -> usize {
        self.pin_index
    }

    fn into_input(self: Box<Self>) -> GpioResult<Box<dyn GpioInput>> {
        self.driver.raw_set_pin_function(self.pin_index, 0)?;
        Ok(Box::new(RawGpioInput { pin: *self }))
    }

    fn into_output(self: Box<Self>) -> GpioResult<Box<dyn GpioOutput>> {
        let output = RawGpioOutput { pin: *self };
        // Start out inactive rather than whatever the latch held.
        output.write(false)?;
        Ok(Box::new(output))
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
        self.driver.raw_get_bias(self.pin_index).unwrap_or(GpioBias::None)
    }

    fn set_bias(&mut self, bias: GpioBias) -> GpioResult<()> {
        self.driver.raw_set_bias(self.pin_index, bias)
    }

    fn supports_drive_mode(&self) -> bool {
        true
    }

    fn drive_mode(&self) -> GpioDriveMode {
        self.drive_mode
    }

    fn set_drive_mode(&mut self, mode: GpioDriveMode) -> GpioResult<()> {
        self.drive_mode = mode;
        Ok(())
    }
}

impl Drop for RawGpioPin {
    fn drop(&mut self) {
        _ = self.driver.raw_set_pin_function(self.pin_index, 0);
        self.driver.inner.used_pins.release(self.pin_index);
    }
}

struct RawGpioInput {
    pin: RawGpioPin,
}

impl Debug for RawGpioInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[input]", self.pin)
    }
}

impl GpioInput for RawGpioInput {
    fn read(&self) -> GpioResult<bool> {
        let level = self.pin.driver.raw_get_pin_level(self.pin.pin_index)?;
        Ok(self.pin.active_level.get_state(level))
    }
}

struct RawGpioOutput {
    pin: RawGpioPin,
}

impl Debug for RawGpioOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}[output]", self.pin)
    }
}

impl GpioOutput for RawGpioOutput {
    fn write(&self, value: bool) -> GpioResult<()> {
        let pin = &self.pin;
        pin.driver.drive_pin(pin.pin_index, pin.active_level.get_state(value), pin.drive_mode)
    }
}
