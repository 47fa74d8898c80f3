//! Fixed-capacity experience replay with FIFO eviction.

use std::collections::VecDeque;

use rand::Rng;

use crate::env::{Action, Observation};
use crate::error::{Error, Result};

/// One `(s, a, r, s', done)` record.
#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_state: Observation,
    pub terminal: bool,
}

#[derive(Clone, Debug)]
pub struct ExperienceStore {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ExperienceStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append, evicting the oldest record once the store is full.  A store
    /// of capacity zero keeps nothing.
    pub fn record(&mut self, transition: Transition) {
        if self.capacity == 0 {
            return;
        }
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draw `n` records uniformly with replacement.
    pub fn sample(&self, n: usize, rng: &mut impl Rng) -> Result<Vec<Transition>> {
        if self.buffer.len() < n {
            return Err(Error::InsufficientExperience {
                requested: n,
                available: self.buffer.len(),
            });
        }
        Ok((0..n)
            .map(|_| self.buffer[rng.gen_range(0..self.buffer.len())].clone())
            .collect())
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}
