//! Typed bounded FIFO channels (§4.4).
//!
//! Grounded on the teacher's `channel::Sourcepoint`/`channel::Endpoint`
//! traits (`spearman-apis` `src/channel/mod.rs`), generalized from the
//! teacher's SPSC/sink/source backends down to the single bidirectional
//! bounded-FIFO surface this spec requires, backed by
//! `std::sync::mpsc::sync_channel` the way the teacher's `Sink`/`Source`
//! backends are backed by `std::sync::mpsc`.
//!
//! `probe()` must be non-consuming, but `mpsc::Receiver` only exposes
//! consuming `try_recv`/`recv`. `Endpoint` resolves this with a one-slot
//! peek buffer: `probe()` opportunistically drains one token off the
//! channel into the buffer; `recv()` serves the buffer first.

use std::sync::mpsc::{self, Receiver as MpscReceiver, SyncSender};
use std::sync::Mutex;

/// Sender disconnected, no further messages will ever be received.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecvError;

impl std::fmt::Display for RecvError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.write_str("sender disconnected")
  }
}
impl std::error::Error for RecvError {}

/// Receiver disconnected, message will never be deliverable.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SendError;

impl std::fmt::Display for SendError {
  fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
    f.write_str("receiver disconnected")
  }
}
impl std::error::Error for SendError {}

/// The channel-layer surface every control, sync, request, and data channel
/// in the runtime exposes (§4.4).
pub trait Channel<T>: Send {
  /// May block when the channel is full.
  fn send(&self, token: T) -> Result<(), SendError>;
  /// Blocks until a token is available.
  fn recv(&self) -> Result<T, RecvError>;
  /// Non-blocking; true iff at least one token is queued.
  fn probe(&self) -> bool;
  /// Idempotent endpoint lifecycle. Must be called before any send/recv.
  fn start(&self);
  /// Idempotent; releases underlying resources.
  fn join(&self);
}

/// The send half of a bounded FIFO channel.
pub struct Sender<T> {
  inner: SyncSender<T>,
}

impl<T: Send> Channel<T> for Sender<T> {
  fn send(&self, token: T) -> Result<(), SendError> {
    self.inner.send(token).map_err(|_| SendError)
  }

  fn recv(&self) -> Result<T, RecvError> {
    unreachable!("a Sender endpoint never receives")
  }

  fn probe(&self) -> bool {
    unreachable!("a Sender endpoint is never probed")
  }

  fn start(&self) {
    // Lifecycle is a no-op for the mpsc-backed sender: construction already
    // wires the channel. Kept as an explicit call site per §4.4's contract.
  }

  fn join(&self) {
    // Dropping the Sender disconnects the channel; nothing else to release.
  }
}

/// The receive half of a bounded FIFO channel, with a one-slot peek buffer
/// so `probe()` can be non-consuming.
pub struct Receiver<T> {
  inner: MpscReceiver<T>,
  peeked: Mutex<Option<T>>,
}

impl<T: Send> Channel<T> for Receiver<T> {
  fn send(&self, _token: T) -> Result<(), SendError> {
    unreachable!("a Receiver endpoint never sends")
  }

  fn recv(&self) -> Result<T, RecvError> {
    if let Some(token) = self.peeked.lock().unwrap().take() {
      return Ok(token);
    }
    self.inner.recv().map_err(|_| RecvError)
  }

  fn probe(&self) -> bool {
    let mut slot = self.peeked.lock().unwrap();
    if slot.is_some() {
      return true;
    }
    match self.inner.try_recv() {
      Ok(token) => {
        *slot = Some(token);
        true
      }
      Err(_) => false,
    }
  }

  fn start(&self) {}

  fn join(&self) {}
}

/// Builds a bounded FIFO channel with the given capacity, returning the
/// sender and receiver endpoints (each owned by exactly one actor, per
/// §3's invariant).
pub fn bounded<T: Send>(capacity: usize) -> (Sender<T>, Receiver<T>) {
  let (tx, rx) = mpsc::sync_channel(capacity.max(1));
  (
    Sender { inner: tx },
    Receiver {
      inner: rx,
      peeked: Mutex::new(None),
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn probe_then_recv_does_not_block() {
    let (tx, rx) = bounded::<i32>(4);
    tx.send(7).unwrap();
    assert!(rx.probe());
    assert_eq!(rx.recv().unwrap(), 7);
  }

  #[test]
  fn probe_is_false_when_empty() {
    let (_tx, rx) = bounded::<i32>(4);
    assert!(!rx.probe());
  }

  #[test]
  fn fifo_order_preserved() {
    let (tx, rx) = bounded::<i32>(4);
    tx.send(1).unwrap();
    tx.send(2).unwrap();
    tx.send(3).unwrap();
    assert_eq!(rx.recv().unwrap(), 1);
    assert_eq!(rx.recv().unwrap(), 2);
    assert_eq!(rx.recv().unwrap(), 3);
  }

  #[test]
  fn send_after_drop_errors() {
    let (tx, rx) = bounded::<i32>(1);
    drop(rx);
    assert_eq!(tx.send(1), Err(SendError));
  }

  #[test]
  fn recv_after_drop_errors() {
    let (tx, rx) = bounded::<i32>(1);
    drop(tx);
    assert_eq!(rx.recv(), Err(RecvError));
  }
}
