use std::sync::Arc;

use super::{Effects, Layer, Snapshot, Timer};
use crate::error::{Error, What, When};
use crate::exchange::Exchange;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};

/// Keeps the token of an exchange consistent across its messages.
///
/// Follow-up requests (further blocks, re-registrations) reuse the token
/// the first request was sent with, responses carry the token of the
/// request they answer, and a response whose token doesn't match its
/// exchange is an error.
#[derive(Debug, Clone, Copy)]
pub struct Token<L> {
  inner: L,
}

impl<L> Token<L> {
  /// Wrap a layer
  pub fn new(inner: L) -> Self {
    Self { inner }
  }
}

impl<L: Layer> Layer for Token<L> {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  mut req: Req)
                  -> Result<(), Error> {
    if !req.has_token() {
      let (token, sent) = exchange.read(|s| {
                                    (s.request.has_token().then(|| s.request.token),
                                     s.current_request.id.is_some())
                                  });

      match token {
        | Some(token) => req.set_token(token),
        | None if sent => {
          return Err(When::Sending { to: req.remote(),
                                     id: req.id,
                                     token: req.token }.what(What::Invariant("follow-up request in an exchange without a token")))
        },
        | None => (),
      }
    }

    self.inner.send_request(snap, effects, exchange, req)
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   mut resp: Resp)
                   -> Result<(), Error> {
    if resp.token.is_empty() {
      let token = exchange.read(|s| s.current_request.token);
      if !token.is_empty() {
        resp.token = token;
      }
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
    self.inner.receive_request(snap, effects, exchange, req)
  }

  fn receive_response(&self,
                      snap: &Snapshot,
                      effects: &mut Effects,
                      exchange: &Arc<Exchange>,
                      resp: Resp)
                      -> Result<Option<Resp>, Error> {
    let resp = match self.inner.receive_response(snap, effects, exchange, resp)? {
      | Some(resp) => resp,
      | None => return Ok(None),
    };

    let expected = exchange.read(|s| s.request.token);
    if resp.token != expected {
      log::error!("exchange {}: response token {} but the request was sent with {}",
                  exchange.id(),
                  resp.token,
                  expected);
      return Err(When::Receiving { from: resp.remote() }.what(What::Invariant("response token does not match its exchange")));
    }

    Ok(Some(resp))
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

#[cfg(test)]
mod tests {
  use croak_msg::{Id, Message, Type};

  use super::*;
  use crate::layer::Wire;
  use crate::resp::code;
  use crate::test::{self, Harness};

  #[test]
  fn follow_up_reuses_token() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "a"));
    let layer = Token::new(Wire);

    layer.send_request(&h.snapshot(), &mut vec![], &ex, ex.request())
         .unwrap();
    let token = ex.request().token;

    let next = Req::get(test::remote(), "a");
    let mut fx = vec![];
    layer.send_request(&h.snapshot(), &mut fx, &ex, next).unwrap();

    assert_eq!(test::transmitted(&fx)[0].data().token, token);
  }

  #[test]
  fn mismatched_response_token_is_an_error() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "a"));
    let layer = Token::new(Wire);
    layer.send_request(&h.snapshot(), &mut vec![], &ex, ex.request())
         .unwrap();

    let msg = Message::new(Type::Non,
                           code::CONTENT,
                           Id(1),
                           croak_msg::Token::opaque(b"nope"));
    let err = layer.receive_response(&h.snapshot(), &mut vec![], &ex, test::received_resp(msg))
                   .unwrap_err();
    assert!(err.is_invariant());
  }
}
