//! Generation counter for superseding in-flight builds.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter shared between the watch loop and running builds.
///
/// Every change batch advances the counter. A build holds a [`Ticket`] for
/// the generation it was started for and checks it at module boundaries.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
  pub fn new() -> Self {
    Self::default()
  }

  /// Advance the counter and return the new generation.
  pub fn advance(&self) -> u64 {
    self.0.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn current(&self) -> u64 {
    self.0.load(Ordering::SeqCst)
  }

  /// Ticket pinned to `generation`.
  pub fn ticket(&self, generation: u64) -> Ticket {
    Ticket {
      counter: self.clone(),
      generation,
    }
  }
}

/// A build's claim on one generation.
#[derive(Debug, Clone)]
pub struct Ticket {
  counter: Generation,
  generation: u64,
}

impl Ticket {
  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// A newer generation has been issued.
  pub fn is_stale(&self) -> bool {
    self.counter.current() != self.generation
  }

  pub fn is_current(&self) -> bool {
    !self.is_stale()
  }
}
