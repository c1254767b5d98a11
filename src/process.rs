//! Process Actors (§4.3).
//!
//! Grounded on `lava.magma.core.model.py.model.PyLoihiProcessModel` for the
//! phase dispatch table and on the teacher's `process::Process::run`/
//! `run_asynchronous` for the actor-owns-its-channels, single outer-loop
//! shape (`spearman-apis` `src/process/mod.rs`). The user-facing callback
//! surface (`run_spk`, guards, ...) mirrors §6's upward contract.

use std::convert::TryFrom;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use vec_map::VecMap;

use crate::channel::{self, Channel};
use crate::error::{UserCallbackError, VarNotShareableError};
use crate::ids::{ProcessId, VarId};
use crate::token::{AckToken, Phase, ReqToken};
use crate::var::{Tensor, Var};
use crate::varproto;

/// User-defined per-phase behavior for one Process (§6 upward contract).
/// Every method has a do-nothing/false default, as in the teacher's
/// `Process::initialize`/`terminate` ("does nothing by default, may be
/// overridden").
pub trait ProcessModel: Send {
  fn run_spk(&mut self) {}
  fn run_pre_mgmt(&mut self) {}
  fn run_lrn(&mut self) {}
  fn run_post_mgmt(&mut self) {}
  fn pre_guard(&mut self) -> bool {
    false
  }
  fn lrn_guard(&mut self) -> bool {
    false
  }
  fn post_guard(&mut self) -> bool {
    false
  }
  fn initialize(&mut self) {}
  fn terminate(&mut self) {}
}

/// Either STOP or one phase of the time-step sequence, the only tokens a
/// Process Actor ever receives from its Service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ActorCommand {
  Stop,
  Phase(Phase),
}

impl TryFrom<i64> for ActorCommand {
  type Error = crate::token::UnknownToken;
  fn try_from(v: i64) -> Result<Self, Self::Error> {
    if v == -1 {
      Ok(ActorCommand::Stop)
    } else {
      Phase::try_from(v).map(ActorCommand::Phase)
    }
  }
}

/// One directed shared-memory reference link between a `RefPort` owner and
/// the `VarPort` owner of the Var it reads/writes, grounded on
/// `model.py`'s `PyVarPort.service()`/`_handle_var_ports` loop.
pub struct VarPortService {
  var_id: VarId,
  req_rx: channel::Receiver<i64>,
  data_tx: channel::Sender<f64>,
  data_rx: channel::Receiver<f64>,
}

impl VarPortService {
  /// Services at most one pending request. Returns `true` if work was done.
  fn service_once(&self, vars: &mut VecMap<Var>) -> bool {
    if !self.req_rx.probe() {
      return false;
    }
    let req = match self.req_rx.recv() {
      Ok(r) => r,
      Err(_) => return false,
    };
    match ReqToken::try_from(req) {
      Ok(ReqToken::Get) => {
        if let Some(var) = vars.get(self.var_id.get() as usize) {
          let tensor = var.read();
          let _ = varproto::send_tensor(&self.data_tx, &tensor);
        }
      }
      Ok(ReqToken::Set) => {
        let shape = vars.get(self.var_id.get() as usize).map(|v| v.shape().to_vec()).unwrap_or_default();
        if let Ok(tensor) = varproto::recv_tensor(&self.data_rx, shape)
          && let Some(var) = vars.get_mut(self.var_id.get() as usize) {
            var.write(&tensor);
          }
      }
      Err(_) => {}
    }
    true
  }
}

/// The requesting side of a `RefPort` -> `VarPort` link; held by user
/// `ProcessModel` code to read/write a remote shareable Var.
pub struct RefPortHandle {
  req_tx: channel::Sender<i64>,
  data_tx: channel::Sender<f64>,
  data_rx: channel::Receiver<f64>,
  shape: Vec<usize>,
}

impl RefPortHandle {
  pub fn get(&self) -> Tensor {
    self.req_tx.send(ReqToken::Get.into()).expect("var port disconnected");
    varproto::recv_tensor(&self.data_rx, self.shape.clone()).expect("var port disconnected")
  }

  pub fn set(&self, value: &Tensor) {
    self.req_tx.send(ReqToken::Set.into()).expect("var port disconnected");
    varproto::send_tensor(&self.data_tx, value).expect("var port disconnected");
  }
}

/// Builds one `RefPort` <-> `VarPort` link over three bounded channels
/// (request, get-response data, set-payload data), rejecting the link if
/// the target Var is not `shareable` (§7 `VarNotShareableError`).
pub fn ref_var_link(var: &Var, var_id: VarId, capacity: usize) -> Result<(RefPortHandle, VarPortService), VarNotShareableError> {
  if !var.shareable() {
    return Err(VarNotShareableError);
  }
  let (req_tx, req_rx) = channel::bounded::<i64>(capacity);
  let (get_tx, get_rx) = channel::bounded::<f64>(capacity.max(var.shape().iter().product::<usize>().max(1)));
  let (set_tx, set_rx) = channel::bounded::<f64>(capacity.max(var.shape().iter().product::<usize>().max(1)));
  let handle = RefPortHandle {
    req_tx,
    data_tx: set_tx,
    data_rx: get_rx,
    shape: var.shape().to_vec(),
  };
  let service = VarPortService {
    var_id,
    req_rx,
    data_tx: get_tx,
    data_rx: set_rx,
  };
  Ok((handle, service))
}

/// Channel endpoints a Process Actor owns, wired by whoever spawns it
/// (normally the `service::RuntimeService`).
pub struct ActorChannels {
  pub control_rx: channel::Receiver<i64>,
  pub ack_tx: channel::Sender<i64>,
  pub req_rx: channel::Receiver<i64>,
  pub data_tx: channel::Sender<f64>,
  pub data_rx: channel::Receiver<f64>,
}

/// The runtime incarnation of a Process, executing one `ProcessModel`.
pub struct ProcessActor<M: ProcessModel> {
  id: ProcessId,
  model: M,
  vars: VecMap<Var>,
  /// A Process Actor typically owns a handful of reference ports at most,
  /// so this stays inline rather than heap-allocated in the common case.
  var_ports: smallvec::SmallVec<[VarPortService; 4]>,
  channels: ActorChannels,
  current_ts: u64,
}

impl<M: ProcessModel> ProcessActor<M> {
  pub fn new(id: ProcessId, model: M, vars: VecMap<Var>, var_ports: Vec<VarPortService>, channels: ActorChannels) -> Self {
    ProcessActor {
      id,
      model,
      vars,
      var_ports: smallvec::SmallVec::from_vec(var_ports),
      channels,
      current_ts: 0,
    }
  }

  pub const fn id(&self) -> ProcessId {
    self.id
  }

  pub const fn current_ts(&self) -> u64 {
    self.current_ts
  }

  /// Read-only access to this actor's local Var storage, for tests.
  pub fn var(&self, id: VarId) -> Option<&Var> {
    self.vars.get(id.get() as usize)
  }

  fn service_one_var_request(&mut self) {
    let req = match self.channels.req_rx.recv() {
      Ok(r) => r,
      Err(_) => return,
    };
    match ReqToken::try_from(req) {
      Ok(ReqToken::Get) => {
        let var_id = match self.channels.req_rx.recv() {
          Ok(v) => VarId(v as u64),
          Err(_) => return,
        };
        let tensor = self.vars.get(var_id.get() as usize).map_or_else(|| Tensor::new(vec![0], vec![]), Var::read);
        let _ = varproto::send_tensor(&self.channels.data_tx, &tensor);
      }
      Ok(ReqToken::Set) => {
        let var_id = match self.channels.req_rx.recv() {
          Ok(v) => VarId(v as u64),
          Err(_) => return,
        };
        let shape = self.vars.get(var_id.get() as usize).map(|v| v.shape().to_vec()).unwrap_or_default();
        if let Ok(tensor) = varproto::recv_tensor(&self.channels.data_rx, shape)
          && let Some(var) = self.vars.get_mut(var_id.get() as usize) {
            var.write(&tensor);
          }
      }
      Err(_) => {
        use colored::Colorize;
        log::warn!(
          "process[{:?}] received unknown request token: {}",
          self.id,
          req.to_string().red().bold()
        );
      }
    }
  }

  /// Blocks until the next control token arrives, servicing variable
  /// requests in the meantime. This subsumes the "variable-service mode"
  /// of §4.3: a Process Actor is always willing to service a GET/SET that
  /// arrives while it is not mid-phase, whether that is its initial idle
  /// wait, a `PAUSE`/`HOST` interval, or the gap between time steps.
  fn await_command(&mut self) -> i64 {
    loop {
      if self.channels.control_rx.probe() {
        return self.channels.control_rx.recv().expect("control channel disconnected");
      }
      if self.channels.req_rx.probe() {
        self.service_one_var_request();
        continue;
      }
      thread::yield_now();
    }
  }

  /// Drains pending reference-port traffic until a new control token
  /// arrives, one service tick per owned `VarPort` per round (§4.3,
  /// §9 "coroutine-style servicing loops").
  fn service_var_ports(&mut self) {
    if self.var_ports.is_empty() {
      return;
    }
    loop {
      for vp in &self.var_ports {
        vp.service_once(&mut self.vars);
      }
      if self.channels.control_rx.probe() {
        return;
      }
    }
  }

  fn guarded_call<R, F: FnOnce(&mut M) -> R>(&mut self, f: F) -> Result<R, UserCallbackError> {
    let model = &mut self.model;
    catch_unwind(AssertUnwindSafe(|| f(model))).map_err(|payload| {
      let msg = payload
        .downcast_ref::<&str>()
        .map(std::string::ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "user callback panicked".to_string());
      UserCallbackError(msg)
    })
  }

  fn send_ack(&self, ack: AckToken) {
    let _ = self.channels.ack_tx.send(ack.into());
  }

  fn terminate_with_error(&self, err: UserCallbackError) {
    use colored::Colorize;
    log::warn!("process[{:?}] terminated: {}", self.id, err.to_string().red().bold());
    self.send_ack(AckToken::Terminated);
  }

  /// Starts all owned channels, then runs the outer dispatch loop until
  /// `STOP`, then joins every owned channel (§3 Process Actor lifecycle).
  pub fn run(mut self) {
    self.channels.control_rx.start();
    self.channels.ack_tx.start();
    self.channels.req_rx.start();
    self.channels.data_tx.start();
    self.channels.data_rx.start();

    self.model.initialize();

    loop {
      let token = self.await_command();
      match ActorCommand::try_from(token) {
        Ok(ActorCommand::Stop) => {
          self.send_ack(AckToken::Terminated);
          break;
        }
        Ok(ActorCommand::Phase(Phase::Spk)) => {
          self.current_ts += 1;
          if let Err(e) = self.guarded_call(M::run_spk) {
            self.terminate_with_error(e);
            break;
          }
          self.send_ack(AckToken::Done);
        }
        Ok(ActorCommand::Phase(Phase::PreMgmt)) => {
          let run = self.guarded_call(M::pre_guard);
          match run {
            Ok(true) => {
              if let Err(e) = self.guarded_call(M::run_pre_mgmt) {
                self.terminate_with_error(e);
                break;
              }
            }
            Ok(false) => {}
            Err(e) => {
              self.terminate_with_error(e);
              break;
            }
          }
          self.send_ack(AckToken::Done);
          self.service_var_ports();
        }
        Ok(ActorCommand::Phase(Phase::Lrn)) => {
          let run = self.guarded_call(M::lrn_guard);
          match run {
            Ok(true) => {
              if let Err(e) = self.guarded_call(M::run_lrn) {
                self.terminate_with_error(e);
                break;
              }
            }
            Ok(false) => {}
            Err(e) => {
              self.terminate_with_error(e);
              break;
            }
          }
          self.send_ack(AckToken::Done);
        }
        Ok(ActorCommand::Phase(Phase::PostMgmt)) => {
          let run = self.guarded_call(M::post_guard);
          match run {
            Ok(true) => {
              if let Err(e) = self.guarded_call(M::run_post_mgmt) {
                self.terminate_with_error(e);
                break;
              }
            }
            Ok(false) => {}
            Err(e) => {
              self.terminate_with_error(e);
              break;
            }
          }
          self.send_ack(AckToken::Done);
          self.service_var_ports();
        }
        Ok(ActorCommand::Phase(Phase::Host)) => {
          self.send_ack(AckToken::Paused);
          // remain in variable-service mode until the next control token
          loop {
            if self.channels.control_rx.probe() {
              break;
            }
            if self.channels.req_rx.probe() {
              self.service_one_var_request();
            } else {
              thread::yield_now();
            }
          }
        }
        Err(_) => {
          use colored::Colorize;
          log::warn!(
            "process[{:?}] received unrecognized command token: {}",
            self.id,
            token.to_string().red().bold()
          );
          self.send_ack(AckToken::Terminated);
          break;
        }
      }
    }

    self.model.terminate();
    self.channels.control_rx.join();
    self.channels.ack_tx.join();
    self.channels.req_rx.join();
    self.channels.data_tx.join();
    self.channels.data_rx.join();
  }
}

/// Spawns a Process Actor as an independent execution context (§5: "the
/// Controller, each Service, and each Process Actor run as independent
/// execution contexts").
pub fn spawn<M: ProcessModel + 'static>(actor: ProcessActor<M>) -> thread::JoinHandle<()> {
  thread::Builder::new()
    .name(format!("process-{}", actor.id().get()))
    .spawn(move || actor.run())
    .expect("failed to spawn process actor thread")
}
