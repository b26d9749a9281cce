//! Generation tags for the dual-copy catalog.
//!
//! Every dataset exists in exactly two physical copies. One is current (serving
//! reads) and the other is staging (being rebuilt). Per-generation state is held
//! in a [`PerGeneration`] pair indexed by the tag instead of being looked up by
//! formatted names.

use std::{
  fmt,
  ops::{Index, IndexMut},
  sync::atomic::{AtomicU8, Ordering},
};

use serde::{Deserialize, Serialize};

/// One of the two interchangeable copies of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
  A,
  B,
}

impl Generation {
  pub const ALL: [Generation; 2] = [Generation::A, Generation::B];

  /// The generation that is not `self`.
  pub fn other(self) -> Self {
    match self {
      Generation::A => Generation::B,
      Generation::B => Generation::A,
    }
  }

  pub fn index(self) -> usize {
    match self {
      Generation::A => 0,
      Generation::B => 1,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Generation::A => "a",
      Generation::B => "b",
    }
  }

  fn from_bits(bits: u8) -> Self {
    if bits & 1 == 0 { Generation::A } else { Generation::B }
  }
}

impl fmt::Display for Generation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ============================================================================
// Atomic cell
// ============================================================================

/// Lock-free "which generation is current" flag.
///
/// Loads use `Acquire` and stores use `Release`, so a reader that observes a
/// promoted tag also observes everything the promoting task published before
/// the flip.
#[derive(Debug)]
pub struct GenerationCell(AtomicU8);

impl GenerationCell {
  pub fn new(generation: Generation) -> Self {
    Self(AtomicU8::new(generation.index() as u8))
  }

  pub fn load(&self) -> Generation {
    Generation::from_bits(self.0.load(Ordering::Acquire))
  }

  /// Set the current generation, returning the previous one.
  pub fn swap(&self, generation: Generation) -> Generation {
    Generation::from_bits(self.0.swap(generation.index() as u8, Ordering::AcqRel))
  }
}

// ============================================================================
// Per-generation pair
// ============================================================================

/// A value for each generation, addressed by tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerGeneration<T>([T; 2]);

impl<T> PerGeneration<T> {
  pub fn new(a: T, b: T) -> Self {
    Self([a, b])
  }

  pub fn from_fn(mut f: impl FnMut(Generation) -> T) -> Self {
    Self([f(Generation::A), f(Generation::B)])
  }

  pub fn iter(&self) -> impl Iterator<Item = (Generation, &T)> {
    Generation::ALL.into_iter().zip(self.0.iter())
  }
}

impl<T> Index<Generation> for PerGeneration<T> {
  type Output = T;

  fn index(&self, generation: Generation) -> &T {
    &self.0[generation.index()]
  }
}

impl<T> IndexMut<Generation> for PerGeneration<T> {
  fn index_mut(&mut self, generation: Generation) -> &mut T {
    &mut self.0[generation.index()]
  }
}
