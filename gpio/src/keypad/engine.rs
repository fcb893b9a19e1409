use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use bitvec::vec::BitVec;
use log::trace;
use crate::GpioResult;
use crate::keypad::{EventSink, KeyEvent, KeyIdentity, Keymap, KeypadError, KeypadResult, PinMatrix};

/// Turns raw row/column levels into press and release events.
///
/// Holds the last sampled level of every cell. A scan compares fresh
/// samples against it and reports only the cells that changed, so an
/// unchanged keypad produces no events. There is no debouncing: a single
/// differing sample is taken as the new state.
#[derive(Debug)]
pub struct ScanEngine<K> {
    keymap: Keymap<K>,
    /// One bit per cell, row-major. Locked for the whole of a scan.
    state: Mutex<BitVec>,
    settle_delay: Duration,
}

impl<K: KeyIdentity> ScanEngine<K> {
    pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_micros(10);

    /// Creates an engine with every cell released. Does not touch the hardware.
    ///
    /// # Errors
    /// - `KeypadError::KeymapShape` if the keymap is not `rows` by `cols`.
    pub fn new(keymap: Keymap<K>, rows: usize, cols: usize) -> KeypadResult<Self> {
        if keymap.rows() != rows || keymap.cols() != cols {
            return Err(KeypadError::KeymapShape {
                keymap_rows: keymap.rows(),
                keymap_cols: keymap.cols(),
                rows,
                cols,
            });
        }

        let state = BitVec::repeat(false, keymap.len());
        Ok(ScanEngine {
            keymap,
            state: Mutex::new(state),
            settle_delay: Self::DEFAULT_SETTLE_DELAY,
        })
    }

    /// Sets how long a row is held active before its columns are sampled.
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    pub fn keymap(&self) -> &Keymap<K> {
        &self.keymap
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Performs one full pass over the matrix, reporting every edge to `sink`.
    ///
    /// Rows are swept in ascending order and columns within a row likewise,
    /// which is also the order events are reported in.
    ///
    /// Callers must not scan concurrently; the [Scheduler](crate::keypad::Scheduler)
    /// never does. A second caller that breaks this rule blocks on the state
    /// lock until the running pass ends instead of interleaving with it.
    ///
    /// # Errors
    /// The first failing pin operation aborts the pass. Cells already visited
    /// keep their new state and their events stay reported.
    pub fn scan(&self, matrix: &dyn PinMatrix, sink: &mut dyn EventSink<K>) -> GpioResult<()> {
        let mut state = self.lock_state();
        let rows = self.keymap.rows();

        for row in 0..rows {
            // Drop every row first so the previous one can't bleed into this sample.
            for other in 0..rows {
                matrix.set_row(other, false)?;
            }
            matrix.set_row(row, true)?;
            settle(self.settle_delay);

            for col in 0..self.keymap.cols() {
                let level = matrix.read_col(col)?;
                let Some(cell) = self.keymap.cell(row, col) else {
                    continue;
                };
                let index = self.keymap.index(cell);
                if state[index] == level {
                    continue;
                }

                let event = KeyEvent {
                    key: self.keymap.key(cell),
                    pressed: level,
                };
                trace!("{:?} at {:?}: {}", event.key, cell, if level { "pressed" } else { "released" });
                sink.report(event);
                state.set(index, level);
            }
        }

        Ok(())
    }

    /// Gets the keys currently held down, in row-major order.
    ///
    /// Waits for an in-flight scan to finish.
    pub fn pressed(&self) -> Vec<K> {
        let state = self.lock_state();
        self.keymap
            .cells()
            .filter(|&cell| state[self.keymap.index(cell)])
            .map(|cell| self.keymap.key(cell))
            .collect()
    }

    fn lock_state(&self) -> MutexGuard<'_, BitVec> {
        // Only a panicking sink can poison the lock; the bits are still the last samples written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Spins for `delay` on the calling thread. `thread::sleep` overshoots microsecond delays.
fn settle(delay: Duration) {
    let start = Instant::now();
    while start.elapsed() < delay {
        std::hint::spin_loop();
    }
}
