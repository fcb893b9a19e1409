use std::fmt::{Debug, Formatter};
use log::{debug, warn};
use crate::{GpioActiveLevel, GpioBias, GpioDriveMode, GpioDriver, GpioError, GpioInput, GpioOutput, GpioResult};
use crate::keypad::PinMatrix;

/// Electrical setup of the keypad lines.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct MatrixOptions {
    /// Level that counts as "active", for rows and columns alike.
    pub active_level: GpioActiveLevel,
    /// Bias on the column inputs. Leave at `None` when the board has external resistors.
    pub col_bias: GpioBias,
    /// How rows are driven. Open-drain keeps two pressed keys in one column from shorting rows.
    pub row_drive: GpioDriveMode,
}

/// The `GpioPinMatrix` struct represents a keypad wired to GPIO lines: rows as outputs, columns as inputs.
pub struct GpioPinMatrix {
    rows: Vec<Box<dyn GpioOutput>>,
    cols: Vec<Box<dyn GpioInput>>,
}

impl Debug for GpioPinMatrix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GpioPinMatrix(rows: {:?}, cols: {:?})", self.rows, self.cols)
    }
}

impl GpioPinMatrix {
    /// Claims `row_lines` as outputs, driven inactive, then `col_lines` as inputs.
    ///
    /// Either every line is claimed, or none is: when one fails, the lines
    /// claimed before it are given back before the error is returned.
    pub fn acquire(
        gpio: &dyn GpioDriver,
        row_lines: &[usize],
        col_lines: &[usize],
        options: MatrixOptions,
    ) -> GpioResult<Self> {
        let mut rows = Vec::with_capacity(row_lines.len());
        for &line in row_lines {
            match Self::acquire_row(gpio, line, &options) {
                Ok(output) => rows.push(output),
                Err(e) => {
                    warn!("Failed to claim row line {}: {}; releasing {} row lines.", line, e, rows.len());
                    return Err(e);
                }
            }
        }

        let mut cols = Vec::with_capacity(col_lines.len());
        for &line in col_lines {
            match Self::acquire_col(gpio, line, &options) {
                Ok(input) => cols.push(input),
                Err(e) => {
                    warn!(
                        "Failed to claim column line {}: {}; releasing {} column and {} row lines.",
                        line, e, cols.len(), rows.len(),
                    );
                    return Err(e);
                }
            }
        }

        debug!("Claimed rows {:?} and columns {:?} on {:?}.", row_lines, col_lines, gpio);
        Ok(GpioPinMatrix { rows, cols })
    }

    fn acquire_row(gpio: &dyn GpioDriver, line: usize, options: &MatrixOptions) -> GpioResult<Box<dyn GpioOutput>> {
        let mut pin = gpio.get_pin(line)?;
        if options.active_level != GpioActiveLevel::High {
            pin.set_active_level(options.active_level)?;
        }
        if options.row_drive != GpioDriveMode::PushPull {
            pin.set_drive_mode(options.row_drive)?;
        }
        let output = pin.into_output()?;
        output.write(false)?;
        Ok(output)
    }

    fn acquire_col(gpio: &dyn GpioDriver, line: usize, options: &MatrixOptions) -> GpioResult<Box<dyn GpioInput>> {
        let mut pin = gpio.get_pin(line)?;
        if options.active_level != GpioActiveLevel::High {
            pin.set_active_level(options.active_level)?;
        }
        if options.col_bias != GpioBias::None {
            pin.set_bias(options.col_bias)?;
        }
        pin.into_input()
    }
}

impl PinMatrix for GpioPinMatrix {
    fn rows(&self) -> usize {
        self.rows.len()
    }

    fn cols(&self) -> usize {
        self.cols.len()
    }

    fn set_row(&self, index: usize, level: bool) -> GpioResult<()> {
        self.rows
            .get(index)
            .ok_or(GpioError::InvalidArgument)?
            .write(level)
    }

    fn read_col(&self, index: usize) -> GpioResult<bool> {
        self.cols
            .get(index)
            .ok_or(GpioError::InvalidArgument)?
            .read()
    }

    fn release(self: Box<Self>) {
        for (index, row) in self.rows.iter().enumerate() {
            if let Err(e) = row.write(false) {
                warn!("Failed to drive row {} inactive on release: {}", index, e);
            }
        }
        debug!("Released {:?}.", self);
    }
}
