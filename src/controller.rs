//! The Controller (§4.1): the single user-facing entry point for driving
//! execution and for out-of-band Var access.
//!
//! Grounded on `lava.magma.runtime.runtime.Runtime`'s public surface
//! (`initialize`, `start`, `run`, `wait`, `pause`, `stop`, `get_var`/
//! `set_var`) and on the teacher's `session::Session` state-machine shape
//! (`spearman-apis` `src/session/mod.rs`) for the "operation is illegal in
//! this state" error pattern.

use vec_map::VecMap;

use crate::channel::Channel;
use crate::error::{ProtocolError, RuntimeError, StateError};
use crate::executable::NodeConfig;
use crate::ids::VarId;
use crate::token::{AckToken, ControlToken};
use crate::var::Tensor;
use crate::varproto;
use crate::{channel, ids::ServiceId};

/// How a `start`/`run` call should drive its owned Services.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunCondition {
  /// Run for exactly `num_steps` time steps. If `blocking`, the call does
  /// not return until every Service has acked `DONE`; otherwise the caller
  /// must follow up with `wait()`.
  StepRun { num_steps: u32, blocking: bool },
  /// Run until explicitly `pause()`d or `stop()`ped. Always non-blocking.
  ContinuousRun,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ControllerState {
  Uninitialized,
  Initialized,
  Started,
  Running,
  Paused,
  Stopped,
}

impl ControllerState {
  /// True once `start()` has been called at least once (the "≥ started"
  /// condition §4.1's `get_var`/`set_var` and `stop()` are gated on).
  const fn is_at_least_started(self) -> bool {
    !matches!(self, ControllerState::Uninitialized | ControllerState::Initialized)
  }
}

/// The Controller-facing channel endpoints for one owned Runtime Service.
pub struct ServiceLink {
  pub control_tx: channel::Sender<i64>,
  pub ack_rx: channel::Receiver<i64>,
  pub req_tx: channel::Sender<i64>,
  pub data_tx: channel::Sender<f64>,
  pub data_rx: channel::Receiver<f64>,
}

pub struct Controller {
  state: ControllerState,
  services: VecMap<ServiceLink>,
  node_config: NodeConfig,
  /// Advanced only by a blocking `StepRun`/`wait()` (the Open Question
  /// resolved in favor of: `ContinuousRun` and `pause()` never touch it,
  /// since no single step boundary is observed while continuously running).
  current_ts: u64,
}

impl Controller {
  pub const fn new(services: VecMap<ServiceLink>, node_config: NodeConfig) -> Self {
    Controller {
      state: ControllerState::Uninitialized,
      services,
      node_config,
      current_ts: 0,
    }
  }

  pub const fn current_ts(&self) -> u64 {
    self.current_ts
  }

  pub fn initialize(&mut self) -> Result<(), RuntimeError> {
    if self.state != ControllerState::Uninitialized {
      return Err(StateError::Running.into());
    }
    self.state = ControllerState::Initialized;
    Ok(())
  }

  /// Legal only from `initialized`. Transitions to `started`, then
  /// invokes `run(cond)` (§4.1).
  pub fn start(&mut self, cond: RunCondition) -> Result<(), RuntimeError> {
    if self.state != ControllerState::Initialized {
      return Err(StateError::NotStarted.into());
    }
    self.state = ControllerState::Started;
    self.run(cond)
  }

  pub fn run(&mut self, cond: RunCondition) -> Result<(), RuntimeError> {
    if !self.state.is_at_least_started() {
      return Err(StateError::NotStarted.into());
    }
    self.execute(cond)
  }

  fn execute(&mut self, cond: RunCondition) -> Result<(), RuntimeError> {
    if self.state == ControllerState::Running {
      return Err(StateError::Running.into());
    }
    match cond {
      RunCondition::StepRun { num_steps, blocking } => {
        self.state = ControllerState::Running;
        self.broadcast(ControlToken::Run(num_steps))?;
        if blocking {
          self.await_done()?;
          self.current_ts += u64::from(num_steps);
          self.state = ControllerState::Started;
        }
      }
      RunCondition::ContinuousRun => {
        self.state = ControllerState::Running;
        self.broadcast(ControlToken::Run(u32::MAX))?;
      }
    }
    Ok(())
  }

  /// Blocks for an in-flight non-blocking `StepRun`/`ContinuousRun` batch
  /// to ack `DONE`. Only meaningful after a non-blocking `StepRun`; for a
  /// `ContinuousRun` it will not return until `pause()`/`stop()` interrupts
  /// the batch on the Service side, per §4.2.
  pub fn wait(&mut self) -> Result<(), RuntimeError> {
    self.await_done()?;
    self.state = ControllerState::Started;
    Ok(())
  }

  fn broadcast(&self, token: ControlToken) -> Result<(), RuntimeError> {
    for link in self.services.values() {
      link
        .control_tx
        .send(token.into())
        .map_err(|_| RuntimeError::Channel("runtime service control channel closed".to_string()))?;
    }
    Ok(())
  }

  fn await_done(&mut self) -> Result<(), RuntimeError> {
    for link in self.services.values() {
      let ack = link
        .ack_rx
        .recv()
        .map_err(|_| RuntimeError::Channel("runtime service ack channel closed".to_string()))?;
      match AckToken::try_from(ack) {
        Ok(AckToken::Done) => {}
        Ok(AckToken::Terminated) => {
          self.state = ControllerState::Stopped;
          return Err(ProtocolError("runtime service terminated unexpectedly".to_string()).into());
        }
        _ => return Err(ProtocolError(format!("unexpected ack token: {ack}")).into()),
      }
    }
    Ok(())
  }

  pub fn pause(&mut self) -> Result<(), RuntimeError> {
    if self.state != ControllerState::Running {
      return Err(StateError::NotStarted.into());
    }
    self.broadcast(ControlToken::Pause)?;
    for link in self.services.values() {
      let ack = link
        .ack_rx
        .recv()
        .map_err(|_| RuntimeError::Channel("runtime service ack channel closed".to_string()))?;
      if AckToken::try_from(ack) != Ok(AckToken::Paused) {
        return Err(ProtocolError(format!("expected PAUSED ack, got {ack}")).into());
      }
    }
    self.state = ControllerState::Paused;
    Ok(())
  }

  /// Idempotent: stopping an already-stopped Controller is a no-op.
  pub fn stop(&mut self) -> Result<(), RuntimeError> {
    if self.state == ControllerState::Stopped {
      return Ok(());
    }
    for link in self.services.values() {
      let _ = link.control_tx.send(ControlToken::Stop.into());
    }
    for link in self.services.values() {
      let _ = link.ack_rx.recv();
    }
    self.state = ControllerState::Stopped;
    Ok(())
  }

  fn service_link(&self, service_id: ServiceId) -> Result<&ServiceLink, RuntimeError> {
    self
      .services
      .get(service_id.get() as usize)
      .ok_or_else(|| ProtocolError(format!("no such runtime service: {service_id}")).into())
  }

  /// `get_var`/`set_var` are half-duplex with the phase command stream:
  /// legal only when the Controller is at least `started` and not
  /// currently `running` (§4.1).
  fn check_var_access(&self) -> Result<(), RuntimeError> {
    if self.state == ControllerState::Running {
      return Err(StateError::Running.into());
    }
    if !self.state.is_at_least_started() {
      return Err(StateError::NotStarted.into());
    }
    Ok(())
  }

  /// Reads a Var's current value. Legal only while the Controller is
  /// started and not running (§4.1, Testable Property 2).
  pub fn get_var(&self, var_id: VarId) -> Result<Tensor, RuntimeError> {
    self.check_var_access()?;
    let loc = self
      .node_config
      .locate(var_id)
      .ok_or_else(|| ProtocolError(format!("unknown var_id: {var_id}")))?
      .clone();
    let link = self.service_link(loc.service_id)?;
    link
      .req_tx
      .send(crate::token::ReqToken::Get.into())
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    link
      .req_tx
      .send(loc.process_id.get() as i64)
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    link
      .req_tx
      .send(var_id.get() as i64)
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    varproto::recv_tensor(&link.data_rx, loc.shape)
      .map_err(|_| RuntimeError::Channel("runtime service data channel closed".to_string()))
  }

  /// Writes a Var's current value. Legal only while the Controller is
  /// started and not running (§4.1, Testable Property 2).
  pub fn set_var(&self, var_id: VarId, value: &Tensor) -> Result<(), RuntimeError> {
    self.check_var_access()?;
    let loc = self
      .node_config
      .locate(var_id)
      .ok_or_else(|| ProtocolError(format!("unknown var_id: {var_id}")))?
      .clone();
    let link = self.service_link(loc.service_id)?;
    link
      .req_tx
      .send(crate::token::ReqToken::Set.into())
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    link
      .req_tx
      .send(loc.process_id.get() as i64)
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    link
      .req_tx
      .send(var_id.get() as i64)
      .map_err(|_| RuntimeError::Channel("runtime service request channel closed".to_string()))?;
    varproto::send_tensor(&link.data_tx, value).map_err(|_| RuntimeError::Channel("runtime service data channel closed".to_string()))
  }
}
