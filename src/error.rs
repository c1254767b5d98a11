//! Error kinds for the runtime control plane (§7).
//!
//! The teacher splits errors into one enum per subsystem (`channel::SendError`,
//! `process::DefineError`, `session::DefineError`, ...) and composes them at
//! the call site rather than reaching for one crate-wide error type. This
//! module follows the same shape: one enum per concern, plus a top-level
//! `RuntimeError` that the Controller's public operations return, matching
//! §7's propagation rule that Process Actor failures surface transitively as
//! `TERMINATED` up through Service to Controller.

use std::fmt;

use crate::port::EdgeError;
use crate::var::AliasError;

/// Malformed node config, duplicate `var_id`, missing service owner.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
  NotExactlyOneHostNode,
  DuplicateVarId(u64),
  MissingServiceOwner(u64),
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      ConfigError::NotExactlyOneHostNode => f.write_str("node config must name exactly one host node"),
      ConfigError::DuplicateVarId(id) => write!(f, "duplicate var_id in node config: {id}"),
      ConfigError::MissingServiceOwner(id) => write!(f, "var {id} has no owning service"),
    }
  }
}
impl std::error::Error for ConfigError {}

/// Unexpected token on any channel. Fatal: triggers a `stop()`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProtocolError(pub String);

impl fmt::Display for ProtocolError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "protocol error: {}", self.0)
  }
}
impl std::error::Error for ProtocolError {}

/// Controller API called in the wrong state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StateError {
  NotStarted,
  Running,
}

impl fmt::Display for StateError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      StateError::NotStarted => f.write_str("controller is not started"),
      StateError::Running => f.write_str("controller is running"),
    }
  }
}
impl std::error::Error for StateError {}

/// Attempt to bind a reference port to a non-shareable Var.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct VarNotShareableError;

impl fmt::Display for VarNotShareableError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.write_str("variable is not shareable")
  }
}
impl std::error::Error for VarNotShareableError {}

/// Process Actor could not be started.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SpawnError(pub String);

impl fmt::Display for SpawnError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "failed to spawn process actor: {}", self.0)
  }
}
impl std::error::Error for SpawnError {}

/// A user phase callback raised; carried up as `TERMINATED` with this
/// diagnostic payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserCallbackError(pub String);

impl fmt::Display for UserCallbackError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "user callback failed: {}", self.0)
  }
}
impl std::error::Error for UserCallbackError {}

/// Top-level error surfaced synchronously from a pending Controller call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RuntimeError {
  Config(ConfigError),
  Protocol(ProtocolError),
  State(StateError),
  Graph(EdgeError),
  VarNotShareable(VarNotShareableError),
  Alias(AliasError),
  Spawn(SpawnError),
  UserCallback(UserCallbackError),
  /// A control/ack/request/data channel unexpectedly disconnected (EOF).
  Channel(String),
}

impl fmt::Display for RuntimeError {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      RuntimeError::Config(e) => write!(f, "{e}"),
      RuntimeError::Protocol(e) => write!(f, "{e}"),
      RuntimeError::State(e) => write!(f, "{e}"),
      RuntimeError::Graph(e) => write!(f, "{e}"),
      RuntimeError::VarNotShareable(e) => write!(f, "{e}"),
      RuntimeError::Alias(e) => write!(f, "{e}"),
      RuntimeError::Spawn(e) => write!(f, "{e}"),
      RuntimeError::UserCallback(e) => write!(f, "{e}"),
      RuntimeError::Channel(msg) => write!(f, "channel error: {msg}"),
    }
  }
}

impl std::error::Error for RuntimeError {}

impl From<ConfigError> for RuntimeError {
  fn from(e: ConfigError) -> Self {
    RuntimeError::Config(e)
  }
}
impl From<ProtocolError> for RuntimeError {
  fn from(e: ProtocolError) -> Self {
    RuntimeError::Protocol(e)
  }
}
impl From<StateError> for RuntimeError {
  fn from(e: StateError) -> Self {
    RuntimeError::State(e)
  }
}
impl From<EdgeError> for RuntimeError {
  fn from(e: EdgeError) -> Self {
    RuntimeError::Graph(e)
  }
}
impl From<VarNotShareableError> for RuntimeError {
  fn from(e: VarNotShareableError) -> Self {
    RuntimeError::VarNotShareable(e)
  }
}
impl From<AliasError> for RuntimeError {
  fn from(e: AliasError) -> Self {
    RuntimeError::Alias(e)
  }
}
impl From<SpawnError> for RuntimeError {
  fn from(e: SpawnError) -> Self {
    RuntimeError::Spawn(e)
  }
}
impl From<UserCallbackError> for RuntimeError {
  fn from(e: UserCallbackError) -> Self {
    RuntimeError::UserCallback(e)
  }
}
