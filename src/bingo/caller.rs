//! Number pool and caller
//!
//! Holds the un-drawn numbers of one round and decides when the next draw is
//! due. The caller never sleeps itself; the owning table task asks for
//! [`NumberCaller::next_draw_at`] and wakes up at that instant.

use crate::bingo::card::MAX_NUMBER;
use crate::bingo::types::NumberSet;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerState {
    /// Round has not started drawing
    Idle,
    Drawing,
    /// Stopped early because a card won
    Halted,
    /// All 75 numbers drawn
    Exhausted,
}

#[derive(Debug)]
pub struct NumberCaller {
    state: CallerState,
    remaining: Vec<u8>,
    drawn: Vec<u8>,
    drawn_set: NumberSet,
    rng: StdRng,
    interval: Duration,
    next_draw_at: Option<Instant>,
}

impl NumberCaller {
    pub fn new(seed: u64, interval: Duration) -> Self {
        Self {
            state: CallerState::Idle,
            remaining: (1..=MAX_NUMBER).collect(),
            drawn: Vec::with_capacity(MAX_NUMBER as usize),
            drawn_set: NumberSet::default(),
            rng: StdRng::seed_from_u64(seed),
            interval,
            next_draw_at: None,
        }
    }

    pub fn state(&self) -> CallerState {
        self.state
    }

    pub fn drawn(&self) -> &[u8] {
        &self.drawn
    }

    pub fn drawn_set(&self) -> NumberSet {
        self.drawn_set
    }

    pub fn last_drawn(&self) -> Option<u8> {
        self.drawn.last().copied()
    }

    /// Instant the next draw is due, while drawing.
    pub fn next_draw_at(&self) -> Option<Instant> {
        match self.state {
            CallerState::Drawing => self.next_draw_at,
            _ => None,
        }
    }

    /// Idle -> Drawing. The first number is due one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        if self.state == CallerState::Idle {
            self.state = CallerState::Drawing;
            self.next_draw_at = Some(now + self.interval);
        }
    }

    /// Pop one uniformly random remaining number.
    ///
    /// Returns `None` unless the caller is drawing. Drawing the last number
    /// moves the caller to `Exhausted`.
    pub fn draw(&mut self, now: Instant) -> Option<u8> {
        if self.state != CallerState::Drawing || self.remaining.is_empty() {
            return None;
        }

        let index = self.rng.gen_range(0..self.remaining.len());
        let number = self.remaining.swap_remove(index);
        self.drawn.push(number);
        self.drawn_set.insert(number);

        if self.remaining.is_empty() {
            self.state = CallerState::Exhausted;
            self.next_draw_at = None;
        } else {
            self.next_draw_at = Some(now + self.interval);
        }
        Some(number)
    }

    /// Stop drawing after a win.
    pub fn halt(&mut self) {
        if self.state == CallerState::Drawing {
            self.state = CallerState::Halted;
        }
        self.next_draw_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_draws_every_number_once_then_exhausts() {
        let now = Instant::now();
        let mut caller = NumberCaller::new(1, Duration::from_secs(4));
        assert_eq!(caller.draw(now), None);

        caller.start(now);
        let mut seen = HashSet::new();
        while let Some(n) = caller.draw(now) {
            assert!((1..=75).contains(&n));
            assert!(seen.insert(n), "{} drawn twice", n);
        }

        assert_eq!(seen.len(), 75);
        assert_eq!(caller.drawn().len(), 75);
        assert_eq!(caller.state(), CallerState::Exhausted);
        assert_eq!(caller.next_draw_at(), None);
    }

    #[test]
    fn test_first_draw_due_after_one_interval() {
        let now = Instant::now();
        let mut caller = NumberCaller::new(2, Duration::from_secs(4));
        assert_eq!(caller.next_draw_at(), None);

        caller.start(now);
        assert_eq!(caller.next_draw_at(), Some(now + Duration::from_secs(4)));

        let later = now + Duration::from_secs(4);
        caller.draw(later);
        assert_eq!(caller.next_draw_at(), Some(later + Duration::from_secs(4)));
    }

    #[test]
    fn test_halt_stops_drawing() {
        let now = Instant::now();
        let mut caller = NumberCaller::new(3, Duration::from_secs(4));
        caller.start(now);
        caller.draw(now);
        caller.halt();

        assert_eq!(caller.state(), CallerState::Halted);
        assert_eq!(caller.draw(now), None);
        assert_eq!(caller.drawn().len(), 1);
        assert_eq!(caller.remaining.len(), 74);
    }

    #[test]
    fn test_same_seed_same_sequence() {
        let now = Instant::now();
        let mut a = NumberCaller::new(99, Duration::from_secs(1));
        let mut b = NumberCaller::new(99, Duration::from_secs(1));
        a.start(now);
        b.start(now);
        for _ in 0..10 {
            assert_eq!(a.draw(now), b.draw(now));
        }
    }
}
