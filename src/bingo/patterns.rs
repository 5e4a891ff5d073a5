//! Win detection
//!
//! A card wins when every cell of one of the twelve lines (five rows, five
//! columns, two diagonals) is marked and every marked number on that line
//! has actually been called. The FREE center counts as marked and called.

use crate::bingo::card::{Card, Cell, GRID_SIZE};
use crate::bingo::types::{CellSet, NumberSet};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "snake_case")]
pub enum PatternKind {
    Row(u8),
    Column(u8),
    Diagonal,
    AntiDiagonal,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Row(i) => write!(f, "row {}", i + 1),
            PatternKind::Column(i) => write!(f, "column {}", i + 1),
            PatternKind::Diagonal => f.write_str("diagonal"),
            PatternKind::AntiDiagonal => f.write_str("anti-diagonal"),
        }
    }
}

/// A line of five cell indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinPattern {
    pub kind: PatternKind,
    pub cells: [usize; GRID_SIZE],
}

impl WinPattern {
    pub fn mask(&self) -> CellSet {
        CellSet::from_mask(self.cells.iter().fold(0u32, |acc, i| acc | (1 << i)))
    }
}

const fn row(r: usize) -> WinPattern {
    WinPattern {
        kind: PatternKind::Row(r as u8),
        cells: [r * 5, r * 5 + 1, r * 5 + 2, r * 5 + 3, r * 5 + 4],
    }
}

const fn column(c: usize) -> WinPattern {
    WinPattern {
        kind: PatternKind::Column(c as u8),
        cells: [c, c + 5, c + 10, c + 15, c + 20],
    }
}

/// Fixed evaluation order: rows, columns, then the two diagonals.
pub static WIN_PATTERNS: [WinPattern; 12] = [
    row(0),
    row(1),
    row(2),
    row(3),
    row(4),
    column(0),
    column(1),
    column(2),
    column(3),
    column(4),
    WinPattern {
        kind: PatternKind::Diagonal,
        cells: [0, 6, 12, 18, 24],
    },
    WinPattern {
        kind: PatternKind::AntiDiagonal,
        cells: [4, 8, 12, 16, 20],
    },
];

fn line_is_complete(card: &Card, marked: CellSet, drawn: NumberSet, pattern: &WinPattern) -> bool {
    if !marked.contains_all(pattern.mask()) {
        return false;
    }
    pattern.cells.iter().all(|&index| match card.cells()[index] {
        Cell::Free => true,
        Cell::Number(n) => drawn.contains(n),
    })
}

/// First completed pattern in evaluation order, if any.
pub fn winning_pattern(card: &Card, marked: CellSet, drawn: NumberSet) -> Option<&'static WinPattern> {
    WIN_PATTERNS
        .iter()
        .find(|pattern| line_is_complete(card, marked, drawn, pattern))
}

pub fn is_winner(card: &Card, marked: CellSet, drawn: NumberSet) -> bool {
    winning_pattern(card, marked, drawn).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bingo::card::FREE_INDEX;

    fn mark_and_draw(card: &Card, cells: &[usize]) -> (CellSet, NumberSet) {
        let mut marked = CellSet::with_free();
        let mut drawn = NumberSet::default();
        for &i in cells {
            marked.insert(i);
            if let Some(n) = card.number_at(i) {
                drawn.insert(n);
            }
        }
        (marked, drawn)
    }

    #[test]
    fn test_pattern_library_shape() {
        assert_eq!(WIN_PATTERNS.len(), 12);
        let through_center = WIN_PATTERNS
            .iter()
            .filter(|p| p.cells.contains(&FREE_INDEX))
            .count();
        // Row 2, column 2 and both diagonals.
        assert_eq!(through_center, 4);
    }

    #[test]
    fn test_every_line_wins() {
        let card = Card::from_seed(11);
        for pattern in WIN_PATTERNS.iter() {
            let (marked, drawn) = mark_and_draw(&card, &pattern.cells);
            assert_eq!(
                winning_pattern(&card, marked, drawn).map(|p| p.kind),
                Some(pattern.kind)
            );
        }
    }

    #[test]
    fn test_free_cell_completes_middle_row() {
        let card = Card::from_seed(3);
        let (marked, drawn) = mark_and_draw(&card, &[10, 11, 13, 14]);
        assert_eq!(
            winning_pattern(&card, marked, drawn).map(|p| p.kind),
            Some(PatternKind::Row(2))
        );
    }

    #[test]
    fn test_four_of_five_is_not_a_win() {
        let card = Card::from_seed(5);
        let (marked, drawn) = mark_and_draw(&card, &[0, 1, 2, 3]);
        assert!(!is_winner(&card, marked, drawn));
    }

    #[test]
    fn test_marks_on_uncalled_numbers_do_not_count() {
        let card = Card::from_seed(8);
        let (mut marked, drawn) = mark_and_draw(&card, &[0, 1, 2, 3]);
        marked.insert(4);
        assert!(!is_winner(&card, marked, drawn));
    }

    #[test]
    fn test_called_numbers_without_marks_do_not_count() {
        let card = Card::from_seed(8);
        let drawn: NumberSet = (0..5).filter_map(|i| card.number_at(i)).collect();
        assert!(!is_winner(&card, CellSet::with_free(), drawn));
    }

    #[test]
    fn test_rows_take_precedence_over_columns() {
        let card = Card::from_seed(21);
        let mut cells: Vec<usize> = WIN_PATTERNS[4].cells.to_vec();
        cells.extend_from_slice(&WIN_PATTERNS[5].cells);
        let (marked, drawn) = mark_and_draw(&card, &cells);
        assert_eq!(
            winning_pattern(&card, marked, drawn).map(|p| p.kind),
            Some(PatternKind::Row(4))
        );
    }

    #[test]
    fn test_pattern_kind_serializes_tagged() {
        let json = serde_json::to_string(&PatternKind::Row(2)).unwrap();
        assert_eq!(json, r#"{"kind":"row","index":2}"#);
        let json = serde_json::to_string(&PatternKind::Diagonal).unwrap();
        assert_eq!(json, r#"{"kind":"diagonal"}"#);
    }
}
