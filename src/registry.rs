//! Process-wide Var registry: id issuance and alias resolution.
//!
//! Grounded on `variable.py`'s `VarServer` singleton, redesigned per this
//! spec's design notes: no module-level mutable singleton, instead a
//! `VariableRegistry` value owned by whoever builds the `Executable`
//! (typically the compiler, held here for `Controller::initialize` and for
//! tests), backed by `crate::ids::IdGenerator`.

use vec_map::VecMap;

use crate::ids::{IdGenerator, ProcessId, VarId};
use crate::var::{AliasError, Var};

/// Error resolving an alias chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AliasCycleError;

impl std::fmt::Display for AliasCycleError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.write_str("alias chain is cyclic")
  }
}

impl std::error::Error for AliasCycleError {}

/// Registers Vars, issues `VarId`s, and resolves alias chains.
#[derive(Default)]
pub struct VariableRegistry {
  id_gen: IdGenerator,
  vars: VecMap<Var>,
  /// `process_id -> ancestor process ids`, used to validate that an alias
  /// target belongs to a strict sub-process. Populated by `declare_process`.
  sub_process_of: VecMap<Vec<ProcessId>>,
}

impl VariableRegistry {
  pub fn new() -> Self {
    VariableRegistry {
      id_gen: IdGenerator::new(),
      vars: VecMap::new(),
      sub_process_of: VecMap::new(),
    }
  }

  /// Declares that `child` is a (possibly indirect) sub-process of every id
  /// in `ancestors`, needed to validate alias targets per §3's invariant.
  pub fn declare_process(&mut self, child: ProcessId, ancestors: Vec<ProcessId>) {
    self.sub_process_of.insert(child.get() as usize, ancestors);
  }

  fn is_strict_sub_process_of(&self, maybe_child: ProcessId, ancestor: ProcessId) -> bool {
    self
      .sub_process_of
      .get(maybe_child.get() as usize)
      .is_some_and(|ancestors| ancestors.contains(&ancestor))
  }

  /// Registers a new Var, issuing it a fresh globally-unique id.
  pub fn register(&mut self, owner: ProcessId, shape: Vec<usize>, init: f64, dtype: crate::var::DType, shareable: bool) -> VarId {
    let id = VarId(self.id_gen.next());
    let var = Var::new(id, owner, shape, init, dtype, shareable);
    self.vars.insert(id.get() as usize, var);
    id
  }

  pub fn get(&self, id: VarId) -> Option<&Var> {
    self.vars.get(id.get() as usize)
  }

  pub fn get_mut(&mut self, id: VarId) -> Option<&mut Var> {
    self.vars.get_mut(id.get() as usize)
  }

  /// Establishes `var.alias(target)`: both Vars must share shape and
  /// shareability, and `target`'s owner must be a strict sub-process of
  /// `var`'s owner (§3 invariant).
  pub fn alias(&mut self, var_id: VarId, target_id: VarId) -> Result<(), AliasError> {
    let (var_owner, var_shape, var_shareable) = {
      let var = self.vars.get(var_id.get() as usize).expect("var_id must be registered");
      (var.owner(), var.shape().to_vec(), var.shareable())
    };
    let target = self.vars.get(target_id.get() as usize).expect("target_id must be registered");
    if target.owner() == var_owner {
      return Err(AliasError::SameProcess);
    }
    if target.shape() != var_shape.as_slice() {
      return Err(AliasError::ShapeMismatch);
    }
    if target.shareable() != var_shareable {
      return Err(AliasError::ShareabilityMismatch);
    }
    if !self.is_strict_sub_process_of(target.owner(), var_owner) {
      return Err(AliasError::NotStrictSubProcess);
    }
    self.vars.get_mut(var_id.get() as usize).unwrap().set_alias_target(target_id);
    Ok(())
  }

  /// Follows an alias chain to its terminal (non-aliased) Var id.
  ///
  /// # Errors
  /// Returns `AliasCycleError` if the chain does not terminate within the
  /// number of currently-registered Vars (a finite bound on any acyclic
  /// chain).
  pub fn resolve_alias(&self, id: VarId) -> Result<VarId, AliasCycleError> {
    let mut current = id;
    let max_hops = self.vars.len() + 1;
    for _ in 0..max_hops {
      match self.vars.get(current.get() as usize).and_then(Var::alias_target) {
        Some(next) => current = next,
        None => return Ok(current),
      }
    }
    Err(AliasCycleError)
  }

  /// Reads a Var, following any alias chain to the owning storage.
  pub fn get_var(&self, id: VarId) -> Option<crate::var::Tensor> {
    let terminal = self.resolve_alias(id).ok()?;
    self.vars.get(terminal.get() as usize).map(Var::read)
  }

  /// Writes a Var, following any alias chain to the owning storage.
  pub fn set_var(&mut self, id: VarId, value: &crate::var::Tensor) -> bool {
    let terminal = match self.resolve_alias(id) {
      Ok(t) => t,
      Err(_) => return false,
    };
    match self.vars.get_mut(terminal.get() as usize) {
      Some(var) => {
        var.write(value);
        true
      }
      None => false,
    }
  }

  /// Test-only: clears all registered Vars and resets the id generator.
  #[cfg(any(test, feature = "test"))]
  pub fn reset(&mut self) {
    *self = VariableRegistry::new();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::var::{DType, Tensor};

  #[test]
  fn alias_delegates_get_set() {
    let mut reg = VariableRegistry::new();
    let parent = ProcessId(0);
    let child = ProcessId(1);
    reg.declare_process(child, vec![parent]);

    let a = reg.register(parent, vec![1], 0.0, DType::F64, true);
    let b = reg.register(child, vec![1], 0.0, DType::F64, true);
    reg.alias(a, b).unwrap();

    reg.set_var(a, &Tensor::new(vec![1], vec![7.0]));
    assert_eq!(reg.get_var(b).unwrap().data(), &[7.0]);
    assert_eq!(reg.get_var(a).unwrap().data(), &[7.0]);
  }

  #[test]
  fn alias_chain_transitive() {
    let mut reg = VariableRegistry::new();
    let p0 = ProcessId(0);
    let p1 = ProcessId(1);
    let p2 = ProcessId(2);
    reg.declare_process(p1, vec![p0]);
    reg.declare_process(p2, vec![p0, p1]);

    let a = reg.register(p0, vec![1], 0.0, DType::F64, true);
    let b = reg.register(p1, vec![1], 0.0, DType::F64, true);
    let c = reg.register(p2, vec![1], 0.0, DType::F64, true);
    reg.alias(a, b).unwrap();
    reg.alias(b, c).unwrap();

    reg.set_var(a, &Tensor::new(vec![1], vec![3.0]));
    assert_eq!(reg.get_var(c).unwrap().data(), &[3.0]);
  }

  #[test]
  fn alias_rejects_non_sub_process() {
    let mut reg = VariableRegistry::new();
    let p0 = ProcessId(0);
    let p1 = ProcessId(1);
    let a = reg.register(p0, vec![1], 0.0, DType::F64, true);
    let b = reg.register(p1, vec![1], 0.0, DType::F64, true);
    assert_eq!(reg.alias(a, b), Err(AliasError::NotStrictSubProcess));
  }

  #[test]
  fn alias_rejects_shape_mismatch() {
    let mut reg = VariableRegistry::new();
    let p0 = ProcessId(0);
    let p1 = ProcessId(1);
    reg.declare_process(p1, vec![p0]);
    let a = reg.register(p0, vec![1], 0.0, DType::F64, true);
    let b = reg.register(p1, vec![2], 0.0, DType::F64, true);
    assert_eq!(reg.alias(a, b), Err(AliasError::ShapeMismatch));
  }
}
