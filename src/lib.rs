//! A synchronous-domain process-actor runtime: a Controller drives one or
//! more Runtime Services, each sequencing a set of Process Actors through a
//! fixed per-time-step phase order over bounded FIFO channels.
//!
//! The [`controller`] module is the single user-facing entry point
//! (`Controller::initialize`/`start`/`run`/`pause`/`stop`/`get_var`/
//! `set_var`); [`process`] and [`service`] are the two execution-context
//! kinds a `Controller` drives; [`registry`], [`var`] and [`port`] describe
//! the persistent-state data model; [`channel`] and [`token`] describe the
//! wire layer everything above is built on.

extern crate log;

extern crate smallvec;
extern crate vec_map;

extern crate colored;
extern crate strum;

///////////////////////////////////////////////////////////////////////////////
//  modules
///////////////////////////////////////////////////////////////////////////////

pub mod channel;
pub mod controller;
pub mod error;
pub mod executable;
pub mod ids;
pub mod port;
pub mod process;
pub mod registry;
pub mod service;
pub mod token;
pub mod var;
pub mod varproto;

///////////////////////////////////////////////////////////////////////////////
//  reexports
///////////////////////////////////////////////////////////////////////////////

pub use channel::Channel;
pub use controller::{Controller, RunCondition};
pub use error::RuntimeError;
pub use ids::{ChannelId, ProcessId, ServiceId, VarId};
pub use process::{ProcessActor, ProcessModel};
pub use registry::VariableRegistry;
pub use service::RuntimeService;
pub use var::{DType, Tensor, Var};
