use std::sync::Arc;

use croak_msg::Type;

use super::{Effect, Effects, Layer, Snapshot, Timer};
use crate::error::{Error, What, When};
use crate::exchange::Exchange;
use crate::logging::msg_summary;
use crate::net::Addrd;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};

/// The innermost layer.
///
/// Registers outbound messages with the matcher (which assigns message
/// ids and request tokens), serializes them and emits them as
/// [`Effect::Transmit`]. Inbound messages pass through untouched, apart
/// from remembering the request last received.
#[derive(Debug, Default, Clone, Copy)]
pub struct Wire;

fn sending(to: std::net::SocketAddr, msg: &croak_msg::Message) -> When {
  When::Sending { to,
                  id: msg.id,
                  token: msg.token }
}

impl Layer for Wire {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  mut req: Req)
                  -> Result<(), Error> {
    snap.services
        .matcher
        .send_request(exchange, &mut req, &snap.config, &mut *snap.rng())?;

    let token = req.token;
    exchange.update(|s| {
              if !s.request.has_token() {
                s.request.set_token(token);
              }
            });

    let bytes = req.encode(&*snap.services.codec)
                   .map_err(|e| sending(req.remote(), &req).what(What::ToBytes(e)))?;

    log::trace!("-> {} {}", req.remote(), msg_summary(&req));
    effects.push(Effect::Transmit(Addrd(bytes, req.remote())));
    exchange.set_current_request(req);
    Ok(())
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   mut resp: Resp)
                   -> Result<(), Error> {
    snap.services.matcher.send_response(exchange, &mut resp);

    let bytes = resp.encode(&*snap.services.codec)
                    .map_err(|e| sending(resp.remote(), &resp).what(What::ToBytes(e)))?;

    log::trace!("-> {} {}", resp.remote(), msg_summary(&resp));
    effects.push(Effect::Transmit(Addrd(bytes, resp.remote())));

    let done = resp.is_last() && resp.ty != Type::Con;
    exchange.set_current_response(resp);
    if done {
      exchange.set_complete();
    }

    Ok(())
  }

  fn send_empty(&self,
                snap: &Snapshot,
                effects: &mut Effects,
                exchange: Option<&Arc<Exchange>>,
                mut msg: EmptyMsg)
                -> Result<(), Error> {
    snap.services.matcher.send_empty(exchange, &mut msg);
    let codec = &*snap.services.codec;

    let bytes = match (exchange, msg.ty) {
      | (Some(ex), Type::Con) => ex.update(|s| {
                                     s.current_request.id = msg.id;
                                     s.current_request.encode(codec)
                                   }),
      | _ => codec.encode(msg.msg()).map(Arc::new),
    }.map_err(|e| sending(msg.remote(), &msg).what(What::ToBytes(e)))?;

    log::trace!("-> {} {}", msg.remote(), msg_summary(&msg));
    effects.push(Effect::Transmit(Addrd(bytes, msg.remote())));
    Ok(())
  }

  fn receive_request(&self,
                     _: &Snapshot,
                     _: &mut Effects,
                     exchange: &Arc<Exchange>,
                     req: Req)
                     -> Result<Option<Req>, Error> {
    if !req.state().is_duplicate() {
      exchange.set_current_request(req.clone());
    }

    Ok(Some(req))
  }

  fn receive_response(&self,
                      _: &Snapshot,
                      _: &mut Effects,
                      _: &Arc<Exchange>,
                      resp: Resp)
                      -> Result<Option<Resp>, Error> {
    Ok(Some(resp))
  }

  fn receive_empty(&self,
                   _: &Snapshot,
                   _: &mut Effects,
                   _: &Arc<Exchange>,
                   msg: EmptyMsg)
                   -> Result<Option<EmptyMsg>, Error> {
    Ok(Some(msg))
  }

  fn on_timer(&self,
              _: &Snapshot,
              _: &mut Effects,
              exchange: &Arc<Exchange>,
              timer: Timer,
              _: u64)
              -> Result<(), Error> {
    log::warn!("no layer handled {:?} timer of exchange {}", timer, exchange.id());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::{Id, Message};

  use super::*;
  use crate::exchange::Origin;
  use crate::net::SessionId;
  use crate::resp::code;
  use crate::test::{self, Harness};

  #[test]
  fn request_gets_id_and_token_and_is_transmitted() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "a"));
    let mut fx = vec![];

    Wire.send_request(&h.snapshot(), &mut fx, &ex, ex.request())
        .unwrap();

    let sent = test::transmitted(&fx);
    assert_eq!(sent.len(), 1);
    let msg = sent[0].data();
    assert!(msg.id.is_some());
    assert!(!msg.token.is_empty());
    assert_eq!(ex.request().token, msg.token);
    assert_eq!(ex.current_request().id, msg.id);
  }

  #[test]
  fn last_non_confirmable_response_completes() {
    let h = Harness::new();
    let req = Req::get(test::remote(), "a");
    let ex = Arc::new(Exchange::new(Origin::Remote, req.clone(), SessionId::default()));
    let mut resp = Resp::for_request(&req, code::CONTENT);
    resp.set_type(Type::Ack);
    resp.id = Some(Id(3));

    Wire.send_response(&h.snapshot(), &mut vec![], &ex, resp)
        .unwrap();
    assert!(ex.is_complete());
  }

  #[test]
  fn confirmable_response_does_not_complete() {
    let h = Harness::new();
    let req = Req::get(test::remote(), "a");
    let ex = Arc::new(Exchange::new(Origin::Remote, req.clone(), SessionId::default()));
    let mut resp = Resp::for_request(&req, code::CONTENT);
    resp.set_type(Type::Con);

    Wire.send_response(&h.snapshot(), &mut vec![], &ex, resp)
        .unwrap();
    assert!(!ex.is_complete());
    assert!(ex.current_response().and_then(|r| r.id).is_some());
  }

  #[test]
  fn ping_id_is_remembered() {
    let h = Harness::new();
    let ping = Message { ty: Type::Con,
                         ..Default::default() };
    let ex = h.local_exchange(Req::from_msg(ping, test::remote()));
    let mut fx = vec![];

    Wire.send_empty(&h.snapshot(), &mut fx, Some(&ex), EmptyMsg::ping(test::remote()))
        .unwrap();

    let sent = test::transmitted(&fx);
    assert_eq!(ex.current_request().id, sent[0].data().id);
    assert!(ex.current_request().bytes().is_some());
  }
}
