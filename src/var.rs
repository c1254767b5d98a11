//! Persistent, tensor-valued Process state (`Var`).
//!
//! Grounded on `lava.magma.core.process.variable.Var`: a Var is a named,
//! shaped, numeric state slot owned by exactly one Process, optionally
//! shareable with other processes via reference ports, and optionally an
//! *alias* of a Var belonging to a strict sub-process.

use std::fmt;

use crate::ids::VarId;

/// Numeric storage type of a Var, used only to pick the clamp/cast rule on
/// get/set -- the wire encoding always carries `f64` (see `crate::token`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DType {
  I32,
  I64,
  F32,
  F64,
  Bool,
}

impl DType {
  /// Casts a raw `f64` taken off the wire into this dtype's representable
  /// range and back to `f64`, deterministically. This is the "clamped/cast
  /// per dtype's semantics" rule required by Testable Property 3.
  pub fn clamp_cast(&self, value: f64) -> f64 {
    match self {
      DType::I32 => (value.round().clamp(i32::MIN as f64, i32::MAX as f64)) as i32 as f64,
      DType::I64 => (value.round().clamp(i64::MIN as f64, i64::MAX as f64)) as i64 as f64,
      DType::F32 => value as f32 as f64,
      DType::F64 => value,
      DType::Bool => {
        if value != 0.0 {
          1.0
        } else {
          0.0
        }
      }
    }
  }
}

/// Row-major (C order) dense tensor. Kept as a flat buffer plus an explicit
/// shape rather than a nested `Vec<Vec<..>>`, matching the wire contract's
/// "row-major (C) order" element stream.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
  shape: Vec<usize>,
  data: Vec<f64>,
}

impl Tensor {
  pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
    debug_assert_eq!(data.len(), Self::num_elements(&shape), "tensor data length does not match shape");
    Tensor { shape, data }
  }

  /// Broadcasts a scalar initial value to every element of `shape`, mirroring
  /// the compiler behavior described for `Var::init` ("broadcast to shape of
  /// the Var at build").
  pub fn broadcast(shape: Vec<usize>, init: f64) -> Self {
    let len = Self::num_elements(&shape);
    Tensor {
      shape,
      data: vec![init; len],
    }
  }

  pub fn num_elements(shape: &[usize]) -> usize {
    if shape.is_empty() {
      1
    } else {
      shape.iter().product()
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn data(&self) -> &[f64] {
    &self.data
  }

  pub fn data_mut(&mut self) -> &mut [f64] {
    &mut self.data
  }

  pub const fn len(&self) -> usize {
    self.data.len()
  }

  pub const fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Row-major flat index of a multi-dimensional `idx`.
  pub fn flat_index(&self, idx: &[usize]) -> Option<usize> {
    if idx.len() != self.shape.len() {
      return None;
    }
    let mut flat = 0;
    let mut stride = 1;
    for (dim, (&i, &s)) in idx.iter().zip(self.shape.iter()).enumerate().rev() {
      let _ = dim;
      if i >= s {
        return None;
      }
      flat += i * stride;
      stride *= s;
    }
    Some(flat)
  }

  pub fn get_at(&self, idx: &[usize]) -> Option<f64> {
    self.flat_index(idx).map(|f| self.data[f])
  }

  pub fn set_at(&mut self, idx: &[usize], value: f64) -> bool {
    match self.flat_index(idx) {
      Some(f) => {
        self.data[f] = value;
        true
      }
      None => false,
    }
  }
}

/// Error establishing an alias relationship between two Vars (see
/// `Var::alias`, grounded on `variable.py`'s `alias`/`validate_alias`).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AliasError {
  ShapeMismatch,
  ShareabilityMismatch,
  NotStrictSubProcess,
  SameProcess,
}

impl fmt::Display for AliasError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let msg = match self {
      AliasError::ShapeMismatch => "aliased Var shape does not match",
      AliasError::ShareabilityMismatch => "aliased Var shareable flag does not match",
      AliasError::NotStrictSubProcess => "aliased Var's owner is not a strict sub-process",
      AliasError::SameProcess => "aliased Var belongs to the same process",
    };
    f.write_str(msg)
  }
}

impl std::error::Error for AliasError {}

/// A persistent Process variable.
#[derive(Clone, Debug)]
pub struct Var {
  id: VarId,
  owner: crate::ids::ProcessId,
  shape: Vec<usize>,
  dtype: DType,
  shareable: bool,
  storage: Tensor,
  alias_target: Option<VarId>,
}

impl Var {
  pub fn new(id: VarId, owner: crate::ids::ProcessId, shape: Vec<usize>, init: f64, dtype: DType, shareable: bool) -> Self {
    let storage = Tensor::broadcast(shape.clone(), init);
    Var {
      id,
      owner,
      shape,
      dtype,
      shareable,
      storage,
      alias_target: None,
    }
  }

  pub const fn id(&self) -> VarId {
    self.id
  }

  pub const fn owner(&self) -> crate::ids::ProcessId {
    self.owner
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub const fn dtype(&self) -> DType {
    self.dtype
  }

  pub const fn shareable(&self) -> bool {
    self.shareable
  }

  pub const fn alias_target(&self) -> Option<VarId> {
    self.alias_target
  }

  pub const fn set_alias_target(&mut self, target: VarId) {
    self.alias_target = Some(target);
  }

  /// Reads the whole tensor, applying each element's dtype clamp/cast.
  pub fn read(&self) -> Tensor {
    let mut t = self.storage.clone();
    for v in t.data_mut() {
      *v = self.dtype.clamp_cast(*v);
    }
    t
  }

  /// Overwrites the whole tensor with `value`, clamped/cast per dtype.
  pub fn write(&mut self, value: &Tensor) {
    debug_assert_eq!(value.shape(), self.storage.shape());
    for (dst, &src) in self.storage.data_mut().iter_mut().zip(value.data().iter()) {
      *dst = self.dtype.clamp_cast(src);
    }
  }

  pub fn read_at(&self, idx: &[usize]) -> Option<f64> {
    self.storage.get_at(idx).map(|v| self.dtype.clamp_cast(v))
  }

  pub fn write_at(&mut self, idx: &[usize], value: f64) -> bool {
    let value = self.dtype.clamp_cast(value);
    self.storage.set_at(idx, value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ids::ProcessId;

  #[test]
  fn broadcast_fills_shape() {
    let t = Tensor::broadcast(vec![2, 3], 4.0);
    assert_eq!(t.len(), 6);
    assert!(t.data().iter().all(|&v| v == 4.0));
  }

  #[test]
  fn flat_index_row_major() {
    let t = Tensor::broadcast(vec![2, 2], 0.0);
    assert_eq!(t.flat_index(&[0, 0]), Some(0));
    assert_eq!(t.flat_index(&[0, 1]), Some(1));
    assert_eq!(t.flat_index(&[1, 0]), Some(2));
    assert_eq!(t.flat_index(&[1, 1]), Some(3));
    assert_eq!(t.flat_index(&[2, 0]), None);
  }

  #[test]
  fn i32_clamp_cast_saturates() {
    assert_eq!(DType::I32.clamp_cast(1e30), i32::MAX as f64);
    assert_eq!(DType::I32.clamp_cast(-1e30), i32::MIN as f64);
    assert_eq!(DType::I32.clamp_cast(3.7), 4.0);
  }

  #[test]
  fn get_set_round_trip() {
    let mut var = Var::new(VarId(0), ProcessId(0), vec![1], 0.0, DType::F64, true);
    var.write(&Tensor::new(vec![1], vec![11.0]));
    assert_eq!(var.read().data(), &[11.0]);
  }
}
