use std::collections::BTreeSet;
use crate::keypad::{KeyIdentity, KeypadError, KeypadResult};

/// A switch position in the matrix.
///
/// Only handed out by [Keymap::cell] and [Keymap::cells], so it is always in
/// range for the keymap it came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Cell {
    row: usize,
    col: usize,
}

impl Cell {
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }
}

/// Fixed mapping from matrix cell to key identity.
///
/// Several cells may map to the same key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Keymap<K> {
    keys: Vec<K>,
    rows: usize,
    cols: usize,
}

impl<K: KeyIdentity> Keymap<K> {
    /// Builds a keymap from a row-major table.
    ///
    /// # Errors
    /// - `KeypadError::EmptyKeymap` if there are no rows or the first row is empty.
    /// - `KeypadError::RaggedKeymap` if a row differs in length from the first.
    pub fn new(table: Vec<Vec<K>>) -> KeypadResult<Self> {
        let rows = table.len();
        let cols = table.first().map_or(0, Vec::len);
        if cols == 0 {
            return Err(KeypadError::EmptyKeymap);
        }

        let mut keys = Vec::with_capacity(rows * cols);
        for (row, line) in table.into_iter().enumerate() {
            if line.len() != cols {
                return Err(KeypadError::RaggedKeymap {
                    row,
                    len: line.len(),
                    expected: cols,
                });
            }
            keys.extend(line);
        }

        Ok(Keymap { keys, rows, cols })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Gets the cell at `(row, col)`, or `None` if it is outside the keymap.
    pub fn cell(&self, row: usize, col: usize) -> Option<Cell> {
        (row < self.rows && col < self.cols).then_some(Cell { row, col })
    }

    /// Iterates every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..self.rows).flat_map(move |row| (0..self.cols).map(move |col| Cell { row, col }))
    }

    pub fn key(&self, cell: Cell) -> K {
        self.keys[self.index(cell)]
    }

    /// The set of distinct keys this keymap can produce.
    pub fn capabilities(&self) -> BTreeSet<K> {
        self.keys.iter().copied().collect()
    }

    pub(crate) fn index(&self, cell: Cell) -> usize {
        cell.row * self.cols + cell.col
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}
