//! Globally-unique identifiers for the runtime's addressable entities.
//!
//! `ProcessId`, `ServiceId`, `VarId` and `ChannelId` are thin newtypes over
//! `u64`. Process and channel ids are assigned by the compiler (carried in
//! the `Executable`'s node config); `VarId`s are issued at runtime by the
//! `registry::VariableRegistry`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

macro_rules! def_id {
  ($name:ident) => {
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
    pub struct $name(pub u64);

    impl $name {
      #[inline]
      pub const fn get(&self) -> u64 {
        self.0
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", stringify!($name), self.0)
      }
    }

    impl From<u64> for $name {
      fn from(id: u64) -> Self {
        $name(id)
      }
    }
  };
}

def_id!(ProcessId);
def_id!(ServiceId);
def_id!(VarId);
def_id!(ChannelId);

/// A process-wide monotonic counter, shared by anything that must issue
/// globally unique ids (the `registry::VariableRegistry` is the only user in
/// this core, but the generator is kept standalone per the design note
/// against module-level singleton state).
#[derive(Debug, Default)]
pub struct IdGenerator(AtomicU64);

impl IdGenerator {
  pub const fn new() -> Self {
    IdGenerator(AtomicU64::new(0))
  }

  /// Returns the next id and advances the counter. Safe to call concurrently.
  pub fn next(&self) -> u64 {
    self.0.fetch_add(1, Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn generator_is_monotonic() {
    let idgen = IdGenerator::new();
    let ids: Vec<u64> = (0..8).map(|_| idgen.next()).collect();
    for w in ids.windows(2) {
      assert!(w[0] < w[1]);
    }
  }

  #[test]
  fn id_display() {
    assert_eq!(format!("{}", ProcessId(3)), "ProcessId(3)");
  }
}
