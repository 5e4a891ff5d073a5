//! 5x5 bingo cards
//!
//! Numbers are sampled per column (B:1-15, I:16-30, N:31-45, G:46-60, O:61-75),
//! laid out column-major and stored row-major. The center cell is always FREE.

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

pub const GRID_SIZE: usize = 5;
pub const CELL_COUNT: usize = GRID_SIZE * GRID_SIZE;
pub const FREE_INDEX: usize = 12;
pub const MAX_NUMBER: u8 = 75;

/// Inclusive number range of one card column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnRange {
    pub letter: char,
    pub min: u8,
    pub max: u8,
}

impl ColumnRange {
    pub const fn len(&self) -> usize {
        (self.max - self.min + 1) as usize
    }

    pub const fn contains(&self, number: u8) -> bool {
        number >= self.min && number <= self.max
    }
}

pub const COLUMN_RANGES: [ColumnRange; GRID_SIZE] = [
    ColumnRange { letter: 'B', min: 1, max: 15 },
    ColumnRange { letter: 'I', min: 16, max: 30 },
    ColumnRange { letter: 'N', min: 31, max: 45 },
    ColumnRange { letter: 'G', min: 46, max: 60 },
    ColumnRange { letter: 'O', min: 61, max: 75 },
];

/// Column letter a called number belongs to, e.g. `N` for 40.
pub fn column_letter(number: u8) -> Option<char> {
    COLUMN_RANGES
        .iter()
        .find(|range| range.contains(number))
        .map(|range| range.letter)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cell {
    Free,
    Number(u8),
}

impl Cell {
    pub fn number(self) -> Option<u8> {
        match self {
            Cell::Free => None,
            Cell::Number(n) => Some(n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CardError {
    #[error("card must have {CELL_COUNT} cells, got {0}")]
    InvalidLength(usize),
    #[error("cell {0} must be FREE")]
    FreeCellMissing(usize),
    #[error("only cell {FREE_INDEX} may be FREE, found FREE at {0}")]
    UnexpectedFree(usize),
    #[error("number {number} at cell {index} is outside its column range")]
    OutOfRange { index: usize, number: u8 },
    #[error("number {0} appears more than once")]
    Duplicate(u8),
}

/// Immutable playing card. Serializes as 25 row-major entries, `null` for FREE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Option<u8>>", into = "Vec<Option<u8>>")]
pub struct Card {
    cells: [Cell; CELL_COUNT],
}

impl Card {
    /// Sample a fresh card from `rng`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut column_major = [0u8; CELL_COUNT];
        for (col, range) in COLUMN_RANGES.iter().enumerate() {
            let picks = rand::seq::index::sample(rng, range.len(), GRID_SIZE);
            for (row, offset) in picks.iter().enumerate() {
                column_major[col * GRID_SIZE + row] = range.min + offset as u8;
            }
        }

        let mut cells = [Cell::Free; CELL_COUNT];
        for row in 0..GRID_SIZE {
            for col in 0..GRID_SIZE {
                cells[row * GRID_SIZE + col] = Cell::Number(column_major[col * GRID_SIZE + row]);
            }
        }
        // Whatever was sampled for the center is discarded.
        cells[FREE_INDEX] = Cell::Free;

        Self { cells }
    }

    /// Deterministic card for a seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::generate(&mut StdRng::seed_from_u64(seed))
    }

    pub fn cells(&self) -> &[Cell; CELL_COUNT] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<Cell> {
        self.cells.get(index).copied()
    }

    pub fn number_at(&self, index: usize) -> Option<u8> {
        self.cell(index).and_then(Cell::number)
    }

    pub fn position_of(&self, number: u8) -> Option<usize> {
        self.cells.iter().position(|cell| *cell == Cell::Number(number))
    }

    pub fn column(&self, col: usize) -> [Cell; GRID_SIZE] {
        std::array::from_fn(|row| self.cells[row * GRID_SIZE + col])
    }
}

impl TryFrom<Vec<Option<u8>>> for Card {
    type Error = CardError;

    fn try_from(raw: Vec<Option<u8>>) -> Result<Self, Self::Error> {
        if raw.len() != CELL_COUNT {
            return Err(CardError::InvalidLength(raw.len()));
        }

        let mut cells = [Cell::Free; CELL_COUNT];
        let mut seen = HashSet::with_capacity(CELL_COUNT);
        for (index, value) in raw.into_iter().enumerate() {
            match (index == FREE_INDEX, value) {
                (true, None) => {}
                (true, Some(_)) => return Err(CardError::FreeCellMissing(index)),
                (false, None) => return Err(CardError::UnexpectedFree(index)),
                (false, Some(number)) => {
                    if !COLUMN_RANGES[index % GRID_SIZE].contains(number) {
                        return Err(CardError::OutOfRange { index, number });
                    }
                    if !seen.insert(number) {
                        return Err(CardError::Duplicate(number));
                    }
                    cells[index] = Cell::Number(number);
                }
            }
        }

        Ok(Self { cells })
    }
}

impl From<Card> for Vec<Option<u8>> {
    fn from(card: Card) -> Self {
        card.cells.iter().map(|cell| cell.number()).collect()
    }
}

/// Seed for one card of one seat, derived from the round seed so any card can
/// be regenerated for audit without replaying the whole round.
pub fn card_seed(round_seed: u64, seat_index: u32, card_index: u8) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(b"bingohall:card");
    hasher.update(round_seed.to_le_bytes());
    hasher.update(seat_index.to_le_bytes());
    hasher.update([card_index]);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
