//! The minimal build artifact the Controller needs to address Vars at
//! runtime (§4.5, §9 "the compiler itself is out of scope").
//!
//! A real compiler would also own process/service builders and channel
//! wiring; this crate stops at the routing table a `Controller::get_var`/
//! `set_var` call needs, grounded on `lava.magma.compiler.compiler`'s
//! `NodeConfig`/`ExecVar` split between "what the graph says" and "where it
//! physically lives".

use vec_map::VecMap;

use crate::ids::{ProcessId, ServiceId, VarId};

/// Where one Var physically lives: which Service owns the Process Actor
/// that holds its storage, and that Var's shape (needed to size the
/// data-channel payload on `get_var`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarLocation {
  pub service_id: ServiceId,
  pub process_id: ProcessId,
  pub shape: Vec<usize>,
}

/// Maps every runtime-addressable `VarId` to its physical location.
#[derive(Default)]
pub struct NodeConfig {
  vars: VecMap<VarLocation>,
}

impl NodeConfig {
  pub fn new() -> Self {
    NodeConfig { vars: VecMap::new() }
  }

  pub fn declare_var(&mut self, id: VarId, location: VarLocation) {
    self.vars.insert(id.get() as usize, location);
  }

  pub fn locate(&self, id: VarId) -> Option<&VarLocation> {
    self.vars.get(id.get() as usize)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declares_and_locates_a_var() {
    let mut cfg = NodeConfig::new();
    cfg.declare_var(
      VarId(0),
      VarLocation {
        service_id: ServiceId(0),
        process_id: ProcessId(0),
        shape: vec![1],
      },
    );
    assert_eq!(cfg.locate(VarId(0)).unwrap().process_id, ProcessId(0));
    assert!(cfg.locate(VarId(1)).is_none());
  }
}
