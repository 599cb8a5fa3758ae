//! Grid geometry and bit matrices.
//!
//! [`GridSpec`] fixes the number of rows and columns of the signal grid and
//! derives its capacity. [`BitMatrix`] is one frame's worth of grid bits,
//! stored row-major so that bit `i` lives at row `i / cols`, column
//! `i % cols`.

use crate::error::SubgridError;

/// Rows and columns of the signal grid.
///
/// Every grid cell carries one bit, and every eight bits carry one
/// character code, so `rows * cols` must be a multiple of 8.
///
/// # Example
///
/// ```
/// use subgrid::GridSpec;
///
/// let grid = GridSpec::new(12, 12)?;
/// assert_eq!(grid.capacity_bits(), 144);
/// assert_eq!(grid.capacity_chars(), 18);
/// # Ok::<(), subgrid::SubgridError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GridSpec {
    rows: u32,
    cols: u32,
}

impl GridSpec {
    /// Create a grid with the given shape.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::InvalidGrid`] if either dimension is zero or
    /// the cell count is not a multiple of 8.
    pub fn new(rows: u32, cols: u32) -> Result<Self, SubgridError> {
        let cells = rows as u64 * cols as u64;
        if rows == 0 || cols == 0 || cells % 8 != 0 {
            return Err(SubgridError::InvalidGrid { rows, cols });
        }
        Ok(Self { rows, cols })
    }

    /// Number of grid rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of grid columns.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Total number of bits one frame carries.
    pub fn capacity_bits(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Number of character codes one packet carries.
    pub fn capacity_chars(&self) -> usize {
        self.capacity_bits() / 8
    }
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { rows: 12, cols: 12 }
    }
}

/// A `rows x cols` matrix of bits in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    grid: GridSpec,
    bits: Vec<bool>,
}

impl BitMatrix {
    /// An all-zero matrix. Embedding it draws nothing.
    pub fn zeros(grid: GridSpec) -> Self {
        Self {
            grid,
            bits: vec![false; grid.capacity_bits()],
        }
    }

    /// Reshape a flat bit slice into a matrix, row-major.
    ///
    /// # Errors
    ///
    /// Returns [`SubgridError::BitLengthMismatch`] if `bits` does not hold
    /// exactly `grid.capacity_bits()` values.
    pub fn from_bits(grid: GridSpec, bits: &[bool]) -> Result<Self, SubgridError> {
        if bits.len() != grid.capacity_bits() {
            return Err(SubgridError::BitLengthMismatch {
                expected: grid.capacity_bits(),
                actual: bits.len(),
            });
        }
        Ok(Self {
            grid,
            bits: bits.to_vec(),
        })
    }

    /// The grid this matrix was shaped for.
    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Read the bit at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the grid.
    pub fn get(&self, row: u32, col: u32) -> bool {
        self.bits[self.offset(row, col)]
    }

    /// Write the bit at `(row, col)`.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are outside the grid.
    pub fn set(&mut self, row: u32, col: u32, value: bool) {
        let offset = self.offset(row, col);
        self.bits[offset] = value;
    }

    /// The flattened, row-major bits.
    pub fn as_bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of set bits (drawn marks).
    pub fn count_ones(&self) -> usize {
        self.bits.iter().filter(|&&bit| bit).count()
    }

    /// `true` if no bit is set.
    pub fn is_blank(&self) -> bool {
        !self.bits.iter().any(|&bit| bit)
    }

    /// Iterate over `(row, col)` of every set bit, row-major.
    pub fn ones(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let cols = self.grid.cols;
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(move |(index, _)| ((index as u32) / cols, (index as u32) % cols))
    }

    fn offset(&self, row: u32, col: u32) -> usize {
        assert!(
            row < self.grid.rows && col < self.grid.cols,
            "cell ({row}, {col}) outside {}x{} grid",
            self.grid.rows,
            self.grid.cols,
        );
        row as usize * self.grid.cols as usize + col as usize
    }
}
