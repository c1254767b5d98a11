//! Shared encode/decode helpers for the variable data-channel payload
//! (§6): `num_items` followed by `num_items` scalar `f64` tokens in
//! row-major order. Reused by the Controller's `get_var`/`set_var`, the
//! Runtime Service's request-forwarding, the Process Actor's
//! variable-service mode, and reference-port servicing -- every hop in the
//! Controller -> Service -> Process Actor chain speaks this same payload
//! shape (§2).

use crate::channel::{Channel, RecvError, SendError};
use crate::var::Tensor;

/// Sends `tensor`'s element count followed by its elements, in row-major
/// order, on `data_tx`.
pub fn send_tensor<C: Channel<f64>>(data_tx: &C, tensor: &Tensor) -> Result<(), SendError> {
  data_tx.send(tensor.len() as f64)?;
  for &v in tensor.data() {
    data_tx.send(v)?;
  }
  Ok(())
}

/// Receives a tensor payload of the given `shape` off `data_rx`.
pub fn recv_tensor<C: Channel<f64>>(data_rx: &C, shape: Vec<usize>) -> Result<Tensor, RecvError> {
  let num_items = data_rx.recv()? as usize;
  let mut data = Vec::with_capacity(num_items);
  for _ in 0..num_items {
    data.push(data_rx.recv()?);
  }
  Ok(Tensor::new(shape, data))
}

/// Relays one tensor payload from `src` to `dst` without materializing it,
/// used by the Runtime Service to shuttle data-channel bytes between the
/// Controller and a Process Actor.
pub fn relay_tensor<S: Channel<f64>, D: Channel<f64>>(src: &S, dst: &D) -> Result<(), RecvError> {
  let num_items = src.recv()?;
  dst.send(num_items).map_err(|_| RecvError)?;
  let n = num_items as usize;
  for _ in 0..n {
    let v = src.recv()?;
    dst.send(v).map_err(|_| RecvError)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::channel::bounded;

  #[test]
  fn send_recv_tensor_round_trip() {
    let (tx, rx) = bounded::<f64>(16);
    let t = Tensor::new(vec![3], vec![1.0, 2.0, 3.0]);
    send_tensor(&tx, &t).unwrap();
    let out = recv_tensor(&rx, vec![3]).unwrap();
    assert_eq!(out, t);
  }

  #[test]
  fn relay_preserves_payload() {
    let (tx_a, rx_a) = bounded::<f64>(16);
    let (tx_b, rx_b) = bounded::<f64>(16);
    let t = Tensor::new(vec![2], vec![5.0, 6.0]);
    send_tensor(&tx_a, &t).unwrap();
    relay_tensor(&rx_a, &tx_b).unwrap();
    let out = recv_tensor(&rx_b, vec![2]).unwrap();
    assert_eq!(out, t);
  }
}
