//! Port kinds and the connection-graph invariants from the data model.
//!
//! Port-topology *construction* (the compiler's job) is out of scope; this
//! module only carries the types and the edge-validity predicate so tests
//! (and an external compiler) can check §3's graph invariant: the port graph
//! is acyclic at the port level and every directed edge respects the kind
//! matrix.

use std::fmt;

/// The four port kinds from the data model.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, strum::EnumIter)]
pub enum PortKind {
  In,
  Out,
  Ref,
  Var,
}

/// A typed, shaped port belonging to a Process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Port {
  pub name: &'static str,
  pub kind: PortKind,
  pub shape: Vec<usize>,
}

impl Port {
  pub const fn new(name: &'static str, kind: PortKind, shape: Vec<usize>) -> Self {
    Port { name, kind, shape }
  }
}

/// Error validating a single directed port-to-port edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EdgeError {
  /// The (source kind, destination kind) pair is not in the allowed matrix.
  IllegalKindPair(PortKind, PortKind),
  /// Source and destination shapes differ.
  ShapeMismatch,
}

impl fmt::Display for EdgeError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      EdgeError::IllegalKindPair(src, dst) => write!(f, "illegal edge {src:?} -> {dst:?}"),
      EdgeError::ShapeMismatch => f.write_str("edge endpoints have mismatched shapes"),
    }
  }
}

impl std::error::Error for EdgeError {}

/// Validates one directed edge against the kind matrix from §3:
/// `Out->In`, `Out->Out` (upward to parent), `In->In` (downward to
/// sub-process), `Ref->Var`, `Ref->Ref`, `Var->Var`; never `Ref` to/from
/// `In`/`Out`.
pub fn validate_edge(src: &Port, dst: &Port) -> Result<(), EdgeError> {
  let allowed = matches!(
    (src.kind, dst.kind),
    (PortKind::Out, PortKind::In)
      | (PortKind::Out, PortKind::Out)
      | (PortKind::In, PortKind::In)
      | (PortKind::Ref, PortKind::Var)
      | (PortKind::Ref, PortKind::Ref)
      | (PortKind::Var, PortKind::Var)
  );
  if !allowed {
    return Err(EdgeError::IllegalKindPair(src.kind, dst.kind));
  }
  if src.shape != dst.shape {
    return Err(EdgeError::ShapeMismatch);
  }
  Ok(())
}

/// Rejects a duplicate edge against a set of already-accepted edges,
/// identified by `(src_name, dst_name)`.
pub fn is_duplicate_edge(accepted: &[(&'static str, &'static str)], src: &Port, dst: &Port) -> bool {
  accepted.contains(&(src.name, dst.name))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn out_to_in_is_legal() {
    let a = Port::new("a_out", PortKind::Out, vec![1]);
    let b = Port::new("b_in", PortKind::In, vec![1]);
    validate_edge(&a, &b).unwrap();
  }

  #[test]
  fn ref_to_in_is_illegal() {
    let a = Port::new("a_ref", PortKind::Ref, vec![1]);
    let b = Port::new("b_in", PortKind::In, vec![1]);
    assert_eq!(validate_edge(&a, &b), Err(EdgeError::IllegalKindPair(PortKind::Ref, PortKind::In)));
  }

  #[test]
  fn mismatched_shape_is_illegal() {
    let a = Port::new("a_out", PortKind::Out, vec![1]);
    let b = Port::new("b_in", PortKind::In, vec![2]);
    assert_eq!(validate_edge(&a, &b), Err(EdgeError::ShapeMismatch));
  }

  #[test]
  fn duplicate_edge_detected() {
    let accepted = vec![("a_out", "b_in")];
    let a = Port::new("a_out", PortKind::Out, vec![1]);
    let b = Port::new("b_in", PortKind::In, vec![1]);
    assert!(is_duplicate_edge(&accepted, &a, &b));
  }

  /// Exhaustively checks every one of the 16 `(src, dst)` kind pairs against
  /// §3's matrix, so the allowed set in `validate_edge` can't silently drift
  /// from `Out->In`, `Out->Out`, `In->In`, `Ref->Var`, `Ref->Ref`, `Var->Var`.
  #[test]
  fn matrix_matches_spec_exactly() {
    use strum::IntoEnumIterator;
    const ALLOWED: [(PortKind, PortKind); 6] = [
      (PortKind::Out, PortKind::In),
      (PortKind::Out, PortKind::Out),
      (PortKind::In, PortKind::In),
      (PortKind::Ref, PortKind::Var),
      (PortKind::Ref, PortKind::Ref),
      (PortKind::Var, PortKind::Var),
    ];
    for src in PortKind::iter() {
      for dst in PortKind::iter() {
        let a = Port::new("src", src, vec![1]);
        let b = Port::new("dst", dst, vec![1]);
        let expect_ok = ALLOWED.contains(&(src, dst));
        assert_eq!(validate_edge(&a, &b).is_ok(), expect_ok, "{src:?} -> {dst:?}");
      }
    }
  }
}
