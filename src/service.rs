//! Runtime Services (§4.2): one per synchronous domain, sequencing its
//! owned Process Actors through the phase order each time step and
//! forwarding variable-access requests between the Controller and its
//! actors.
//!
//! Grounded on `lava.magma.runtime.runtime.Runtime`'s per-domain
//! `_send_pm_cmd`/`_get_resp_for_run` loop and the teacher's
//! `session::Session::run` top-level dispatch shape (`spearman-apis`
//! `src/session/mod.rs`).

use std::convert::TryFrom;
use std::thread;

use vec_map::VecMap;

use crate::channel::{self, Channel};
use crate::ids::ServiceId;
use crate::token::{AckToken, ControlToken, Phase, ReqToken};
use crate::varproto;

/// What happened after dispatching one control token.
enum Outcome {
  Continue,
  Stopped,
}

/// One owned Process Actor's channel endpoints, from the Service's side.
pub struct ActorLink {
  pub control_tx: channel::Sender<i64>,
  pub ack_rx: channel::Receiver<i64>,
  pub req_tx: channel::Sender<i64>,
  pub data_tx: channel::Sender<f64>,
  pub data_rx: channel::Receiver<f64>,
}

/// The Controller-facing channel endpoints a Service owns.
pub struct UpstreamLink {
  pub control_rx: channel::Receiver<i64>,
  pub ack_tx: channel::Sender<i64>,
  pub req_rx: channel::Receiver<i64>,
  pub data_tx: channel::Sender<f64>,
  pub data_rx: channel::Receiver<f64>,
}

pub struct RuntimeService {
  id: ServiceId,
  upstream: UpstreamLink,
  actors: VecMap<ActorLink>,
}

impl RuntimeService {
  pub const fn new(id: ServiceId, upstream: UpstreamLink, actors: VecMap<ActorLink>) -> Self {
    RuntimeService { id, upstream, actors }
  }

  pub const fn id(&self) -> ServiceId {
    self.id
  }

  fn service_one_var_request(&self) {
    let req = match self.upstream.req_rx.recv() {
      Ok(r) => r,
      Err(_) => return,
    };
    match ReqToken::try_from(req) {
      Ok(ReqToken::Get) => {
        let (process_id, var_id) = match (self.upstream.req_rx.recv(), self.upstream.req_rx.recv()) {
          (Ok(p), Ok(v)) => (p as u64, v),
          _ => return,
        };
        if let Some(link) = self.actors.get(process_id as usize) {
          let _ = link.req_tx.send(ReqToken::Get.into());
          let _ = link.req_tx.send(var_id);
          let _ = varproto::relay_tensor(&link.data_rx, &self.upstream.data_tx);
        }
      }
      Ok(ReqToken::Set) => {
        let (process_id, var_id) = match (self.upstream.req_rx.recv(), self.upstream.req_rx.recv()) {
          (Ok(p), Ok(v)) => (p as u64, v),
          _ => return,
        };
        if let Some(link) = self.actors.get(process_id as usize) {
          let _ = link.req_tx.send(ReqToken::Set.into());
          let _ = link.req_tx.send(var_id);
          let _ = varproto::relay_tensor(&self.upstream.data_rx, &link.data_tx);
        }
      }
      Err(_) => {
        use colored::Colorize;
        log::warn!(
          "service[{:?}] received unknown request token: {}",
          self.id,
          req.to_string().red().bold()
        );
      }
    }
  }

  /// Blocks for the next control token, servicing variable requests
  /// meanwhile -- the Service is in "variable-service mode" any time it is
  /// not mid-batch, same rule as the Process Actor (§4.3).
  fn await_command(&mut self) -> i64 {
    loop {
      if self.upstream.control_rx.probe() {
        return self.upstream.control_rx.recv().expect("control channel disconnected");
      }
      if self.upstream.req_rx.probe() {
        self.service_one_var_request();
        continue;
      }
      thread::yield_now();
    }
  }

  /// Sends one phase to every owned actor and collects their acks. Returns
  /// `false` if any actor reported `TERMINATED` instead of `DONE`.
  fn broadcast_phase(&self, phase: Phase) -> bool {
    for link in self.actors.values() {
      if link.control_tx.send(phase.into()).is_err() {
        return false;
      }
    }
    for link in self.actors.values() {
      match link.ack_rx.recv() {
        Ok(v) if v == i64::from(AckToken::Done) => {}
        _ => return false,
      }
    }
    true
  }

  fn handle_stop(&self) {
    for link in self.actors.values() {
      let _ = link.control_tx.send(ControlToken::Stop.into());
    }
    for link in self.actors.values() {
      let _ = link.ack_rx.recv();
    }
    let _ = self.upstream.ack_tx.send(AckToken::Terminated.into());
  }

  fn handle_pause(&self) {
    for link in self.actors.values() {
      let _ = link.control_tx.send(Phase::Host.into());
    }
    for link in self.actors.values() {
      let _ = link.ack_rx.recv();
    }
    let _ = self.upstream.ack_tx.send(AckToken::Paused.into());
  }

  /// Runs up to `n` time steps, checking for a newly-arrived control token
  /// after each one so a `PAUSE`/`STOP` issued mid-`ContinuousRun` is
  /// honored at the next step boundary rather than after the full count.
  fn handle_run(&mut self, n: u32) -> Outcome {
    for _ in 0..n {
      for phase in Phase::SEQUENCE {
        if !self.broadcast_phase(phase) {
          self.handle_stop();
          return Outcome::Stopped;
        }
      }
      if self.upstream.control_rx.probe() {
        let next = self.upstream.control_rx.recv().expect("control channel disconnected");
        return self.dispatch(next);
      }
    }
    let _ = self.upstream.ack_tx.send(AckToken::Done.into());
    Outcome::Continue
  }

  fn dispatch(&mut self, token: i64) -> Outcome {
    match ControlToken::try_from(token) {
      Ok(ControlToken::Run(n)) => self.handle_run(n),
      Ok(ControlToken::Pause) => {
        self.handle_pause();
        Outcome::Continue
      }
      Ok(ControlToken::Stop) => {
        self.handle_stop();
        Outcome::Stopped
      }
      Err(_) => {
        use colored::Colorize;
        log::warn!(
          "service[{:?}] received unrecognized command token: {}",
          self.id,
          token.to_string().red().bold()
        );
        self.handle_stop();
        Outcome::Stopped
      }
    }
  }

  pub fn run(mut self) {
    self.upstream.control_rx.start();
    self.upstream.ack_tx.start();
    self.upstream.req_rx.start();
    self.upstream.data_tx.start();
    self.upstream.data_rx.start();

    loop {
      let token = self.await_command();
      if matches!(self.dispatch(token), Outcome::Stopped) {
        break;
      }
    }
  }
}

pub fn spawn(service: RuntimeService) -> thread::JoinHandle<()> {
  thread::Builder::new()
    .name(format!("service-{}", service.id().get()))
    .spawn(move || service.run())
    .expect("failed to spawn runtime service thread")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::process::{self, ActorChannels, ProcessActor, ProcessModel};
  use crate::ids::{ProcessId, VarId};
  use crate::var::{DType, Var};
  use vec_map::VecMap;

  struct NoopModel;
  impl ProcessModel for NoopModel {}

  fn spawn_test_actor(id: ProcessId) -> ActorLink {
    let (control_tx, control_rx) = channel::bounded::<i64>(4);
    let (ack_tx, ack_rx) = channel::bounded::<i64>(4);
    let (req_tx, req_rx) = channel::bounded::<i64>(4);
    let (data_tx_actor, data_rx_service) = channel::bounded::<f64>(16);
    let (data_tx_service, data_rx_actor) = channel::bounded::<f64>(16);
    let mut vars = VecMap::new();
    vars.insert(0, Var::new(VarId(0), id, vec![1], 3.0, DType::F64, true));
    let channels = ActorChannels {
      control_rx,
      ack_tx,
      req_rx,
      data_tx: data_tx_actor,
      data_rx: data_rx_actor,
    };
    let actor = ProcessActor::new(id, NoopModel, vars, Vec::new(), channels);
    process::spawn(actor);
    ActorLink {
      control_tx,
      ack_rx,
      req_tx,
      data_tx: data_tx_service,
      data_rx: data_rx_service,
    }
  }

  // Scenario A (§8): LIF -> Dense -> LIF in one sync domain. Actor 1 spikes
  // once its accumulated bias crosses threshold, resetting to zero; Dense
  // scales the spike by its weight; Actor 3 never crosses its own (very
  // high) threshold and just accumulates bias plus whatever Dense forwards.
  // The three actors run concurrently under one `RuntimeService`, so the
  // test is also a check that blocking `recv` on a direct actor-to-actor
  // data channel is enough to order a step's spike production against its
  // consumption without any barrier from the Service.
  struct Lif {
    bias: f64,
    threshold: f64,
    v: f64,
    spike_in: Option<channel::Receiver<f64>>,
    spike_out: Option<channel::Sender<f64>>,
    v_out: std::sync::Arc<std::sync::Mutex<f64>>,
  }
  impl ProcessModel for Lif {
    fn run_spk(&mut self) {
      let input = self.spike_in.as_ref().map_or(0.0, |rx| rx.recv().unwrap_or(0.0));
      self.v += self.bias + input;
      let spike = if self.v >= self.threshold {
        self.v = 0.0;
        1.0
      } else {
        0.0
      };
      if let Some(tx) = &self.spike_out {
        tx.send(spike).unwrap();
      }
      *self.v_out.lock().unwrap() = self.v;
    }
  }

  struct Dense {
    weight: f64,
    spike_in: channel::Receiver<f64>,
    spike_out: channel::Sender<f64>,
  }
  impl ProcessModel for Dense {
    fn run_spk(&mut self) {
      let input = self.spike_in.recv().unwrap_or(0.0);
      self.spike_out.send(input * self.weight).unwrap();
    }
  }

  fn spawn_lif_actor(id: ProcessId, model: Lif) -> ActorLink {
    let (control_tx, control_rx) = channel::bounded::<i64>(4);
    let (ack_tx, ack_rx) = channel::bounded::<i64>(4);
    let (req_tx, req_rx) = channel::bounded::<i64>(4);
    let (data_tx_actor, data_rx_service) = channel::bounded::<f64>(16);
    let (data_tx_service, data_rx_actor) = channel::bounded::<f64>(16);
    let channels = ActorChannels {
      control_rx,
      ack_tx,
      req_rx,
      data_tx: data_tx_actor,
      data_rx: data_rx_actor,
    };
    let actor = ProcessActor::new(id, model, VecMap::new(), Vec::new(), channels);
    process::spawn(actor);
    ActorLink {
      control_tx,
      ack_rx,
      req_tx,
      data_tx: data_tx_service,
      data_rx: data_rx_service,
    }
  }

  #[test]
  fn lif_dense_lif_network_propagates_spikes_in_lockstep() {
    let (a1_to_dense_tx, a1_to_dense_rx) = channel::bounded::<f64>(4);
    let (dense_to_a3_tx, dense_to_a3_rx) = channel::bounded::<f64>(4);
    let v1 = std::sync::Arc::new(std::sync::Mutex::new(0.0));
    let v3 = std::sync::Arc::new(std::sync::Mutex::new(0.0));

    let actor1 = Lif {
      bias: 4.0,
      threshold: 10.0,
      v: 0.0,
      spike_in: None,
      spike_out: Some(a1_to_dense_tx),
      v_out: v1.clone(),
    };
    let actor3 = Lif {
      bias: 4.0,
      threshold: 1000.0,
      v: 0.0,
      spike_in: Some(dense_to_a3_rx),
      spike_out: None,
      v_out: v3.clone(),
    };
    let dense = Dense {
      weight: 2.0,
      spike_in: a1_to_dense_rx,
      spike_out: dense_to_a3_tx,
    };

    let mut actors = VecMap::new();
    actors.insert(0, spawn_lif_actor(ProcessId(0), actor1));
    actors.insert(2, spawn_lif_actor(ProcessId(2), actor3));
    let (control_tx, control_rx) = channel::bounded::<i64>(4);
    let (ack_tx, ack_rx) = channel::bounded::<i64>(4);
    let (req_tx, req_rx) = channel::bounded::<i64>(4);
    let (data_tx_actor, data_rx_service) = channel::bounded::<f64>(16);
    let (data_tx_service, data_rx_actor) = channel::bounded::<f64>(16);
    let dense_channels = ActorChannels {
      control_rx,
      ack_tx,
      req_rx,
      data_tx: data_tx_actor,
      data_rx: data_rx_actor,
    };
    process::spawn(ProcessActor::new(ProcessId(1), dense, VecMap::new(), Vec::new(), dense_channels));
    actors.insert(
      1,
      ActorLink {
        control_tx,
        ack_rx,
        req_tx,
        data_tx: data_tx_service,
        data_rx: data_rx_service,
      },
    );

    let (up_control_tx, up_control_rx) = channel::bounded::<i64>(4);
    let (up_ack_tx, up_ack_rx) = channel::bounded::<i64>(4);
    let (up_req_tx, up_req_rx) = channel::bounded::<i64>(4);
    let (up_data_tx, up_data_rx_unused) = channel::bounded::<f64>(16);
    let (up_data_tx_unused, up_data_rx) = channel::bounded::<f64>(16);
    let _ = (&up_req_tx, &up_data_tx_unused, &up_data_rx_unused);

    let upstream = UpstreamLink {
      control_rx: up_control_rx,
      ack_tx: up_ack_tx,
      req_rx: up_req_rx,
      data_tx: up_data_tx,
      data_rx: up_data_rx,
    };
    let service = RuntimeService::new(ServiceId(0), upstream, actors);
    let handle = spawn(service);

    up_control_tx.send(ControlToken::Run(3).into()).unwrap();
    assert_eq!(up_ack_rx.recv().unwrap(), AckToken::Done.into());

    assert_eq!(*v1.lock().unwrap(), 0.0);
    assert_eq!(*v3.lock().unwrap(), 14.0);

    up_control_tx.send(ControlToken::Stop.into()).unwrap();
    assert_eq!(up_ack_rx.recv().unwrap(), AckToken::Terminated.into());
    handle.join().unwrap();
  }

  #[test]
  fn run_steps_acks_done_for_every_actor() {
    let (up_control_tx, up_control_rx) = channel::bounded::<i64>(4);
    let (up_ack_tx, up_ack_rx) = channel::bounded::<i64>(4);
    let (up_req_tx, up_req_rx) = channel::bounded::<i64>(4);
    let (up_data_tx_to_ctrl, up_data_rx_ctrl) = channel::bounded::<f64>(16);
    let (up_data_tx_ctrl, up_data_rx_from_ctrl) = channel::bounded::<f64>(16);
    let _ = (&up_req_tx, &up_data_tx_ctrl);

    let mut actors = VecMap::new();
    actors.insert(0, spawn_test_actor(ProcessId(0)));

    let upstream = UpstreamLink {
      control_rx: up_control_rx,
      ack_tx: up_ack_tx,
      req_rx: up_req_rx,
      data_tx: up_data_tx_to_ctrl,
      data_rx: up_data_rx_from_ctrl,
    };
    let _ = &up_data_rx_ctrl;
    let service = RuntimeService::new(ServiceId(0), upstream, actors);
    let handle = spawn(service);

    up_control_tx.send(ControlToken::Run(2).into()).unwrap();
    assert_eq!(up_ack_rx.recv().unwrap(), AckToken::Done.into());

    up_control_tx.send(ControlToken::Stop.into()).unwrap();
    assert_eq!(up_ack_rx.recv().unwrap(), AckToken::Terminated.into());
    handle.join().unwrap();
  }
}
