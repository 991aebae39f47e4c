use core::fmt::Debug;
use std::sync::Arc;

use super::{Effects, Layer, Snapshot, Timer};
use crate::error::Error;
use crate::exchange::Exchange;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};

/// Object security (RFC 8613) for messages carrying the OSCORE option.
///
/// Every method defaults to leaving the message as it is. An
/// implementation returns [`What::Protection`](crate::error::What::Protection)
/// to refuse a message; an inbound message refused this way is dropped.
pub trait Protect: Debug + Send + Sync {
  /// Protect a request before it is sent
  fn protect_request(&self, _req: &mut Req) -> Result<(), Error> {
    Ok(())
  }

  /// Unprotect a received request
  fn unprotect_request(&self, _req: &mut Req) -> Result<(), Error> {
    Ok(())
  }

  /// Protect a response before it is sent
  fn protect_response(&self, _resp: &mut Resp) -> Result<(), Error> {
    Ok(())
  }

  /// Unprotect a received response
  fn unprotect_response(&self, _resp: &mut Resp) -> Result<(), Error> {
    Ok(())
  }
}

/// [`Protect`] that leaves messages alone
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NoProtection;

impl Protect for NoProtection {}

/// Hands OSCORE messages to the endpoint's [`Protect`] implementation.
///
/// Messages without the OSCORE option pass through untouched.
#[derive(Debug, Clone, Copy)]
pub struct Oscore<L> {
  inner: L,
}

impl<L> Oscore<L> {
  /// Wrap a layer
  pub fn new(inner: L) -> Self {
    Self { inner }
  }
}

impl<L: Layer> Layer for Oscore<L> {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  mut req: Req)
                  -> Result<(), Error> {
    if req.is_oscore() {
      snap.services.protect.protect_request(&mut req)?;
    }

    self.inner.send_request(snap, effects, exchange, req)
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   mut resp: Resp)
                   -> Result<(), Error> {
    if resp.is_oscore() || exchange.current_request().is_oscore() {
      snap.services.protect.protect_response(&mut resp)?;
    }

    self.inner.send_response(snap, effects, exchange, resp)
  }

  fn send_empty(&self,
                snap: &Snapshot,
                effects: &mut Effects,
                exchange: Option<&Arc<Exchange>>,
                msg: EmptyMsg)
                -> Result<(), Error> {
    self.inner.send_empty(snap, effects, exchange, msg)
  }

  fn receive_request(&self,
                     snap: &Snapshot,
                     effects: &mut Effects,
                     exchange: &Arc<Exchange>,
                     req: Req)
                     -> Result<Option<Req>, Error> {
    match self.inner.receive_request(snap, effects, exchange, req)? {
      | Some(mut req) if req.is_oscore() => match snap.services.protect.unprotect_request(&mut req) {
        | Ok(()) => Ok(Some(req)),
        | Err(e) => {
          log::warn!("exchange {}: dropping request from {}: {}",
                     exchange.id(),
                     req.remote(),
                     e);
          Ok(None)
        },
      },
      | other => Ok(other),
    }
  }

  fn receive_response(&self,
                      snap: &Snapshot,
                      effects: &mut Effects,
                      exchange: &Arc<Exchange>,
                      resp: Resp)
                      -> Result<Option<Resp>, Error> {
    match self.inner.receive_response(snap, effects, exchange, resp)? {
      | Some(mut resp) if resp.is_oscore() => match snap.services.protect.unprotect_response(&mut resp) {
        | Ok(()) => Ok(Some(resp)),
        | Err(e) => {
          log::warn!("exchange {}: dropping response from {}: {}",
                     exchange.id(),
                     resp.remote(),
                     e);
          Ok(None)
        },
      },
      | other => Ok(other),
    }
  }

  fn receive_empty(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   msg: EmptyMsg)
                   -> Result<Option<EmptyMsg>, Error> {
    self.inner.receive_empty(snap, effects, exchange, msg)
  }

  fn on_timer(&self,
              snap: &Snapshot,
              effects: &mut Effects,
              exchange: &Arc<Exchange>,
              timer: Timer,
              generation: u64)
              -> Result<(), Error> {
    self.inner.on_timer(snap, effects, exchange, timer, generation)
  }
}
