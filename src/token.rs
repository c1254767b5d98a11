//! Wire tokens exchanged on control, sync, and request channels (§6).
//!
//! Grounded verbatim on `lava.magma.runtime.mgmt_token_enums`:
//! `MGMT_COMMAND`, `MGMT_RESPONSE`, `REQ_TYPE`, and the Loihi `Phase` enum
//! from `model.py`. Each Rust type here is a closed sum type (per the design
//! notes' "dynamic dispatch -> tagged variants" guidance) with `i64`
//! conversions standing in for the single-integer encoding the spec
//! describes.

use std::convert::TryFrom;
use std::fmt;

/// A command sent down a control channel: Controller->Service or
/// Service->Actor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlToken {
  /// Run for `n` steps (`n >= 0`); a Service repurposes this slot to carry a
  /// phase id when it talks to its Process Actors.
  Run(u32),
  Stop,
  Pause,
}

impl From<ControlToken> for i64 {
  fn from(t: ControlToken) -> i64 {
    match t {
      ControlToken::Run(n) => i64::from(n),
      ControlToken::Stop => -1,
      ControlToken::Pause => -2,
    }
  }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UnknownToken(pub i64);

impl fmt::Display for UnknownToken {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "unrecognized protocol token: {}", self.0)
  }
}

impl std::error::Error for UnknownToken {}

impl TryFrom<i64> for ControlToken {
  type Error = UnknownToken;
  fn try_from(v: i64) -> Result<Self, Self::Error> {
    match v {
      n if n >= 0 => Ok(ControlToken::Run(n as u32)),
      -1 => Ok(ControlToken::Stop),
      -2 => Ok(ControlToken::Pause),
      other => Err(UnknownToken(other)),
    }
  }
}

/// The phase a Runtime Service sends to a Process Actor within one time step.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::EnumCount)]
pub enum Phase {
  Spk,
  PreMgmt,
  Lrn,
  PostMgmt,
  Host,
}

impl Phase {
  /// Canonical phase order for one time step (§4.2).
  pub const SEQUENCE: [Phase; 4] = [Phase::Spk, Phase::PreMgmt, Phase::Lrn, Phase::PostMgmt];
}

impl From<Phase> for i64 {
  fn from(p: Phase) -> i64 {
    match p {
      Phase::Spk => 1,
      Phase::PreMgmt => 2,
      Phase::Lrn => 3,
      Phase::PostMgmt => 4,
      Phase::Host => 5,
    }
  }
}

impl TryFrom<i64> for Phase {
  type Error = UnknownToken;
  fn try_from(v: i64) -> Result<Self, Self::Error> {
    match v {
      1 => Ok(Phase::Spk),
      2 => Ok(Phase::PreMgmt),
      3 => Ok(Phase::Lrn),
      4 => Ok(Phase::PostMgmt),
      5 => Ok(Phase::Host),
      other => Err(UnknownToken(other)),
    }
  }
}

/// An acknowledgement sent up an ack channel: Actor->Service or
/// Service->Controller.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AckToken {
  Done,
  Terminated,
  Paused,
}

impl From<AckToken> for i64 {
  fn from(t: AckToken) -> i64 {
    match t {
      AckToken::Done => 0,
      AckToken::Terminated => -1,
      AckToken::Paused => -2,
    }
  }
}

impl TryFrom<i64> for AckToken {
  type Error = UnknownToken;
  fn try_from(v: i64) -> Result<Self, Self::Error> {
    match v {
      0 => Ok(AckToken::Done),
      -1 => Ok(AckToken::Terminated),
      -2 => Ok(AckToken::Paused),
      other => Err(UnknownToken(other)),
    }
  }
}

/// A variable-access request on the request channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReqToken {
  Get,
  Set,
}

impl From<ReqToken> for i64 {
  fn from(t: ReqToken) -> i64 {
    match t {
      ReqToken::Get => 0,
      ReqToken::Set => 1,
    }
  }
}

impl TryFrom<i64> for ReqToken {
  type Error = UnknownToken;
  fn try_from(v: i64) -> Result<Self, Self::Error> {
    match v {
      0 => Ok(ReqToken::Get),
      1 => Ok(ReqToken::Set),
      other => Err(UnknownToken(other)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn control_token_round_trips() {
    for t in [ControlToken::Run(0), ControlToken::Run(7), ControlToken::Stop, ControlToken::Pause] {
      let encoded: i64 = t.into();
      assert_eq!(ControlToken::try_from(encoded).unwrap(), t);
    }
  }

  #[test]
  fn phase_sequence_is_canonical() {
    let encoded: Vec<i64> = Phase::SEQUENCE.iter().map(|&p| p.into()).collect();
    assert_eq!(encoded, vec![1, 2, 3, 4]);
  }

  #[test]
  fn sequence_excludes_only_host() {
    use strum::EnumCount;
    assert_eq!(Phase::SEQUENCE.len(), Phase::COUNT - 1);
  }

  #[test]
  fn unknown_ack_token_errors() {
    assert_eq!(AckToken::try_from(42), Err(UnknownToken(42)));
  }
}
