//! Matrix keypad scanning.
//!
//! A [GpioPinMatrix] owns the row outputs and column inputs, a [ScanEngine]
//! turns sampled levels into press/release [KeyEvent]s, and a [Scheduler]
//! keeps re-running the engine on worker threads until [KeypadHandle::shutdown].

mod driver;
mod engine;
mod gpio;
mod keymap;
mod scheduler;
mod sink;

use std::fmt::Debug;
use thiserror::Error;
use crate::{GpioError, GpioResult};
pub use driver::*;
pub use engine::*;
pub use gpio::*;
pub use keymap::*;
pub use scheduler::*;
pub use sink::*;

/// A logical key identity that a keymap cell can be assigned to.
pub trait KeyIdentity: Copy + Ord + Debug + Send + Sync + 'static {}

impl<T: Copy + Ord + Debug + Send + Sync + 'static> KeyIdentity for T {}

/// A single edge reported by a scan.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct KeyEvent<K> {
    pub key: K,
    /// `true` when the key went down, `false` when it came back up.
    pub pressed: bool,
}

#[derive(Debug, Error)]
pub enum KeypadError {
    #[error("hardware error: {0}")]
    Hardware(#[from] GpioError),
    #[error("keymap has no keys")]
    EmptyKeymap,
    #[error("keymap row {row} has {len} keys, expected {expected}")]
    RaggedKeymap {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("keymap is {keymap_rows}x{keymap_cols}, but the matrix has {rows} rows and {cols} columns")]
    KeymapShape {
        keymap_rows: usize,
        keymap_cols: usize,
        rows: usize,
        cols: usize,
    },
    #[error("failed to spawn the {0} thread: {1}")]
    Spawn(&'static str, std::io::ErrorKind),
}

pub type KeypadResult<T> = Result<T, KeypadError>;

/// The row/column lines of a keypad as seen by the scanner.
///
/// Rows are outputs, columns are inputs. `true` always means the logical
/// active level, whatever the wiring.
pub trait PinMatrix: Debug + Send {
    /// Gets the number of row lines.
    fn rows(&self) -> usize;
    /// Gets the number of column lines.
    fn cols(&self) -> usize;

    /// Drives a row line active (`true`) or inactive (`false`).
    ///
    /// # Errors
    /// - `GpioError::InvalidArgument` if the index is out of range.
    /// - Whatever the underlying line reports when it cannot be driven.
    fn set_row(&self, index: usize, level: bool) -> GpioResult<()>;

    /// Samples a column line.
    ///
    /// # Errors
    /// Same as [PinMatrix::set_row].
    fn read_col(&self, index: usize) -> GpioResult<bool>;

    /// Gives the lines back. Called once, after the last scan.
    fn release(self: Box<Self>) {}
}
