use std::sync::Arc;

use croak_msg::no_repeat::OBSERVE;
use croak_msg::observe::Action;
use croak_msg::{Code, Type};
use embedded_time::duration::Milliseconds;
use rand::Rng;

use super::{schedule, Effects, Layer, Snapshot, Timer};
use crate::error::Error;
use crate::exchange::Exchange;
use crate::observe::{NotificationOrderer, ObserveRelation, Relations};
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};
use crate::retry::YouShould;

/// Max-Age of a notification without the option (RFC 7252 5.10.5)
const DEFAULT_MAX_AGE_SECS: u32 = 60;

fn observable(req: &Req) -> bool {
  req.code == Code::GET || req.code == Code::FETCH
}

/// Observing resources (RFC 7641).
///
/// Server side:
/// - a GET or FETCH with Observe=0 creates a relation, established by the
///   first successful response carrying the Observe option; a response
///   without the option means the resource is not observable
/// - notifications are numbered, and are NON except for an occasional CON
///   checking the observer is still there
/// - while a CON notification is in flight, newer notifications replace
///   each other in a queue; the freshest is sent once the in-flight one
///   is acknowledged or due for retransmission
/// - an error response ends the relation and is sent CON
/// - Observe=1 from the observer ends its relation
///
/// Client side:
/// - notifications older than the freshest one seen are dropped
/// - the registration is refreshed once a notification's Max-Age runs out,
///   after a random back-off
#[derive(Debug, Clone, Copy)]
pub struct Observe<L> {
  inner: L,
}

impl<L> Observe<L> {
  /// Wrap a layer
  pub fn new(inner: L) -> Self {
    Self { inner }
  }
}

impl<L: Layer> Observe<L> {
  fn deregister(snap: &Snapshot, exchange: &Arc<Exchange>, req: &Req) {
    let relations = &snap.services.relations;
    if let Some(rel) = relations.get(req.remote(), req.token) {
      log::debug!("{} stopped observing with token {}", req.remote(), req.token);
      rel.cancel();
      relations.remove(&rel);
      if let Some(old) = rel.exchange().filter(|old| old.id() != exchange.id()) {
        old.set_complete();
      }
    }
  }

  /// The first successful notification establishes the relation
  fn establish(snap: &Snapshot, exchange: &Arc<Exchange>, rel: &Arc<ObserveRelation>) {
    rel.establish();
    if let Some(prev) = Relations::add(&snap.services.relations, exchange, rel.clone()) {
      log::debug!("exchange {}: {} re-registered, replacing its relation",
                  exchange.id(),
                  rel.remote());
      rel.resume(prev.sequence());
      prev.cancel();
      if let Some(old) = prev.exchange() {
        old.set_complete();
      }
    }
  }

  fn notify(&self,
            snap: &Snapshot,
            effects: &mut Effects,
            exchange: &Arc<Exchange>,
            rel: Arc<ObserveRelation>,
            mut resp: Resp)
            -> Result<(), Error> {
    if !rel.is_established() {
      if resp.code.is_success() && resp.observe().is_some() {
        Self::establish(snap, exchange, &rel);
        resp.set_observe(rel.next_sequence());
        resp.set_last(false);
      } else {
        log::debug!("exchange {}: response {} is not a notification, not observing",
                    exchange.id(),
                    resp.code);
        rel.cancel();
        exchange.update(|s| s.relation = None);
      }

      return self.inner.send_response(snap, effects, exchange, resp);
    }

    if !resp.code.is_success() {
      log::debug!("exchange {}: {} ends the relation with {}",
                  exchange.id(),
                  resp.code,
                  rel.remote());
      resp.remove(OBSERVE);
      resp.set_last(true);
      if !resp.is_type_set() {
        resp.set_type(Type::Con);
      }
      rel.cancel();
      snap.services.relations.remove(&rel);
      return self.inner.send_response(snap, effects, exchange, resp);
    }

    resp.set_observe(rel.next_sequence());
    resp.set_last(false);
    if !resp.is_type_set() {
      let ty = if rel.check(snap.time, &snap.config.observe) {
        Type::Con
      } else {
        Type::Non
      };
      resp.set_type(ty);
    }

    if exchange.read(|s| s.retransmission.is_some()) {
      log::trace!("exchange {}: notification in flight, queueing {}",
                  exchange.id(),
                  resp.observe().unwrap_or_default());
      rel.set_next(resp);
      return Ok(());
    }

    self.inner.send_response(snap, effects, exchange, resp)
  }

  fn on_notification(snap: &Snapshot, effects: &mut Effects, exchange: &Arc<Exchange>, mut resp: Resp) -> Option<Resp> {
    let seq = match resp.observe() {
      | Some(n) if resp.code.is_success() => n,
      | _ => {
        exchange.update(|s| {
                  s.orderer = None;
                  s.reregistration = None;
                });
        return Some(resp);
      },
    };

    let max_age = snap.config.observe.notification_max_age;
    let fresh = exchange.update(|s| {
                          s.orderer
                           .get_or_insert_with(NotificationOrderer::default)
                           .is_fresh(seq, snap.time, max_age)
                        });

    if !fresh {
      log::debug!("exchange {}: notification {} from {} is stale, dropped",
                  exchange.id(),
                  seq,
                  resp.remote());
      return None;
    }

    let backoff = snap.config.observe.reregistration_backoff.0;
    let jitter = snap.rng().gen_range(0..=backoff);
    let secs = resp.max_age().unwrap_or(DEFAULT_MAX_AGE_SECS);
    let at = snap.after(Milliseconds(u64::from(secs) * 1000 + jitter));
    let generation = schedule(effects, exchange, Timer::Reregister, at);
    exchange.update(|s| s.reregistration = Some(generation));

    resp.set_last(false);
    Some(resp)
  }
}

impl<L: Layer> Layer for Observe<L> {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  req: Req)
                  -> Result<(), Error> {
    match req.observe_action() {
      | Some(Action::Register) if observable(&req) => exchange.update(|s| {
                                                                 s.orderer.get_or_insert_with(NotificationOrderer::default);
                                                               }),
      | Some(Action::Deregister) => exchange.update(|s| {
                                              s.orderer = None;
                                              s.reregistration = None;
                                            }),
      | _ => (),
    }

    self.inner.send_request(snap, effects, exchange, req)
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   resp: Resp)
                   -> Result<(), Error> {
    match exchange.relation() {
      | Some(rel) if !rel.is_cancelled() => self.notify(snap, effects, exchange, rel, resp),
      | _ => self.inner.send_response(snap, effects, exchange, resp),
    }
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
    let req = match self.inner.receive_request(snap, effects, exchange, req)? {
      | Some(req) => req,
      | None => return Ok(None),
    };

    match req.observe_action() {
      | Some(Action::Register) if observable(&req) && exchange.relation().is_none() => {
        let rel = Arc::new(ObserveRelation::new(exchange, snap.time));
        exchange.update(|s| s.relation = Some(rel));
      },
      | Some(Action::Deregister) if observable(&req) => Self::deregister(snap, exchange, &req),
      | _ => (),
    }

    Ok(Some(req))
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

    if exchange.read(|s| s.orderer.is_none()) {
      return Ok(Some(resp));
    }

    Ok(Self::on_notification(snap, effects, exchange, resp))
  }

  fn receive_empty(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   msg: EmptyMsg)
                   -> Result<Option<EmptyMsg>, Error> {
    let msg = match self.inner.receive_empty(snap, effects, exchange, msg)? {
      | Some(msg) => msg,
      | None => return Ok(None),
    };

    if msg.ty == Type::Ack {
      let next = exchange.relation()
                         .filter(|rel| !rel.is_cancelled())
                         .and_then(|rel| rel.take_next());
      if let Some(next) = next {
        log::trace!("exchange {}: notification acknowledged, sending the queued one",
                    exchange.id());
        self.inner.send_response(snap, effects, exchange, next)?;
      }
    }

    Ok(Some(msg))
  }

  fn on_timer(&self,
              snap: &Snapshot,
              effects: &mut Effects,
              exchange: &Arc<Exchange>,
              timer: Timer,
              generation: u64)
              -> Result<(), Error> {
    match timer {
      | Timer::Retransmit => {
        let current = exchange.read(|s| {
                                s.retransmission
                                 .as_ref()
                                 .filter(|r| r.generation == generation)
                                 .map(|r| (r.id, r.timer.clone()))
                              });
        let (id, mut retry) = match current {
          | Some(cur) if exchange.relation().map(|rel| rel.has_next()).unwrap_or(false) => cur,
          | _ => return self.inner.on_timer(snap, effects, exchange, timer, generation),
        };

        // the replacement spends one attempt of the message in flight
        match retry.what_should_i_do(snap.time) {
          | Ok(YouShould::Retry) => (),
          | _ => return self.inner.on_timer(snap, effects, exchange, timer, generation),
        }

        let mut next = match exchange.relation().and_then(|rel| rel.take_next()) {
          | Some(next) => next,
          | None => return self.inner.on_timer(snap, effects, exchange, timer, generation),
        };

        log::debug!("exchange {}: replacing notification {} in flight with a newer one ({} of {} attempts)",
                    exchange.id(),
                    id,
                    retry.attempts().0,
                    snap.config.msg.con.max_attempts().0);
        next.set_type(Type::Con);
        next.id = Some(id);
        exchange.update(|s| {
                  if let Some(r) = s.retransmission.as_mut() {
                    r.timer = retry;
                  }
                });
        self.inner.send_response(snap, effects, exchange, next)
      },
      | Timer::Reregister => {
        if exchange.read(|s| s.reregistration) != Some(generation)
           || exchange.is_complete()
           || exchange.request().state().is_cancelled()
        {
          return Ok(());
        }

        exchange.update(|s| s.reregistration = None);
        let mut req = exchange.request().follow_up();
        req.set_observe(Action::Register.to_uint());
        log::debug!("exchange {}: refreshing observe registration with {}",
                    exchange.id(),
                    exchange.remote());
        self.inner.send_request(snap, effects, exchange, req)
      },
      | _ => self.inner.on_timer(snap, effects, exchange, timer, generation),
    }
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::{Id, Message, Token as MsgToken};

  use super::*;
  use crate::layer::{Reliability, Token, Wire};
  use crate::resp::code;
  use crate::test::{self, Harness};

  type Stack = Observe<Token<Reliability<Wire>>>;

  fn layer() -> Stack {
    Observe::new(Token::new(Reliability::new(Wire)))
  }

  fn register(h: &Harness) -> (Arc<Exchange>, Req) {
    let mut get = Message::new(Type::Con, Code::GET, Id(1), MsgToken::opaque(b"obs"));
    get.set_path("sensors/temp");
    get.set_observe(0);
    let (ex, req) = h.inbound_request(get);
    let req = layer().receive_request(&h.snapshot(), &mut vec![], &ex, req)
                     .unwrap()
                     .unwrap();
    (ex, req)
  }

  fn notification(req: &Req, payload: &str) -> Resp {
    let mut resp = Resp::for_request(req, code::CONTENT);
    resp.set_observe(0);
    resp.set_payload(payload);
    resp
  }

  fn sent(fx: &Effects) -> Message {
    test::transmitted(fx).remove(0).unwrap()
  }

  #[test]
  fn first_response_establishes_relation() {
    let h = Harness::new();
    let (ex, req) = register(&h);
    assert!(ex.relation().is_some());
    assert!(h.services.relations().is_empty());

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "1"))
           .unwrap();

    let msg = sent(&fx);
    assert_eq!(msg.ty, Type::Ack);
    assert_eq!(msg.observe(), Some(1));
    assert!(!ex.is_complete());
    assert_eq!(h.services.relations().len(), 1);

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "2"))
           .unwrap();
    let msg = sent(&fx);
    assert_eq!(msg.ty, Type::Non);
    assert_eq!(msg.observe(), Some(2));
    assert_eq!(msg.token, MsgToken::opaque(b"obs"));
  }

  #[test]
  fn plain_response_means_not_observable() {
    let h = Harness::new();
    let (ex, req) = register(&h);

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, Resp::for_request(&req, code::CONTENT))
           .unwrap();

    assert!(sent(&fx).observe().is_none());
    assert!(ex.relation().is_none());
    assert!(ex.is_complete());
  }

  #[test]
  fn error_ends_relation() {
    let h = Harness::new();
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "1"))
           .unwrap();

    let mut fx = vec![];
    layer().send_response(&h.snapshot(),
                          &mut fx,
                          &ex,
                          Resp::for_request(&req, code::INTERNAL_SERVER_ERROR))
           .unwrap();

    let msg = sent(&fx);
    assert_eq!(msg.ty, Type::Con);
    assert!(msg.observe().is_none());
    assert!(h.services.relations().is_empty());
  }

  #[test]
  fn notifications_queue_behind_con() {
    let mut h = Harness::new();
    h.config.observe.check_interval_count = 1;
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "0"))
           .unwrap();

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "1"))
           .unwrap();
    let first = sent(&fx);
    assert_eq!(first.ty, Type::Con);

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "2"))
           .unwrap();
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "3"))
           .unwrap();
    assert!(test::transmitted(&fx).is_empty());

    let ack = Message::ack(first.id.unwrap());
    let (ex, ack) = h.inbound_empty(ack).unwrap();
    let mut fx = vec![];
    layer().receive_empty(&h.snapshot(), &mut fx, &ex, ack)
           .unwrap();

    let next = sent(&fx);
    assert_eq!(next.payload_str(), Some("3"));
    assert!(ex.relation().map(|r| !r.has_next()).unwrap());
  }

  #[test]
  fn queued_notification_replaces_retransmission() {
    let mut h = Harness::new();
    h.config.observe.check_interval_count = 1;
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "0"))
           .unwrap();

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "1"))
           .unwrap();
    let first = sent(&fx);
    let (generation, at) = test::scheduled(&fx, Timer::Retransmit).unwrap();
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "2"))
           .unwrap();

    h.time = at;
    let mut fx = vec![];
    layer().on_timer(&h.snapshot(), &mut fx, &ex, Timer::Retransmit, generation)
           .unwrap();

    let msg = sent(&fx);
    assert_eq!(msg.payload_str(), Some("2"));
    assert_eq!(msg.id, first.id);
  }

  #[test]
  fn replacements_share_the_retransmission_budget() {
    let mut h = Harness::new();
    h.config.observe.check_interval_count = 1;
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "0"))
           .unwrap();

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "1"))
           .unwrap();
    let mut transmissions = test::transmitted(&fx).len();
    let mut due = test::scheduled(&fx, Timer::Retransmit);
    let mut gaps = vec![];

    for n in 2..22 {
      let (generation, at) = match due {
        | Some(due) => due,
        | None => break,
      };
      gaps.push(at.0 - h.time.0);
      h.time = at;
      layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, &n.to_string()))
             .unwrap();

      let mut fx = vec![];
      layer().on_timer(&h.snapshot(), &mut fx, &ex, Timer::Retransmit, generation)
             .unwrap();
      transmissions += test::transmitted(&fx).len();
      due = test::scheduled(&fx, Timer::Retransmit);
    }

    let max_retransmit = usize::from(h.config.msg.con.max_retransmit.0);
    assert_eq!(transmissions, 1 + max_retransmit);
    assert!(gaps.windows(2).all(|w| w[1] > w[0]));
    assert!(ex.is_timed_out());
    assert!(ex.is_complete());
    assert!(h.services.relations().is_empty());
  }

  #[test]
  fn queued_non_notification_keeps_the_check_confirmable() {
    let mut h = Harness::new();
    h.config.observe.check_interval_count = 1;
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "0"))
           .unwrap();

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, notification(&req, "1"))
           .unwrap();
    let check = sent(&fx);
    assert_eq!(check.ty, Type::Con);
    let (generation, at) = test::scheduled(&fx, Timer::Retransmit).unwrap();

    let mut non = notification(&req, "2");
    non.set_type(Type::Non);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, non)
           .unwrap();

    h.time = at;
    let mut fx = vec![];
    layer().on_timer(&h.snapshot(), &mut fx, &ex, Timer::Retransmit, generation)
           .unwrap();

    let msg = sent(&fx);
    assert_eq!(msg.ty, Type::Con);
    assert_eq!(msg.id, check.id);
    assert_eq!(msg.payload_str(), Some("2"));
    assert!(test::scheduled(&fx, Timer::Retransmit).is_some());
  }

  #[test]
  fn deregistration_ends_relation() {
    let h = Harness::new();
    let (ex, req) = register(&h);
    layer().send_response(&h.snapshot(), &mut vec![], &ex, notification(&req, "1"))
           .unwrap();

    let mut get = Message::new(Type::Con, Code::GET, Id(2), MsgToken::opaque(b"obs"));
    get.set_path("sensors/temp");
    get.set_observe(1);
    let (cancel, req) = h.inbound_request(get);
    layer().receive_request(&h.snapshot(), &mut vec![], &cancel, req)
           .unwrap();

    assert!(h.services.relations().is_empty());
    assert!(ex.is_complete());
  }

  fn observing(h: &Harness) -> (Arc<Exchange>, Message) {
    let mut req = Req::get(test::remote(), "sensors/temp");
    req.set_observe(0);
    let ex = h.local_exchange(req);
    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();
    (ex, sent(&fx))
  }

  fn notify_client(h: &Harness, sent: &Message, id: u16, seq: u32) -> Option<Resp> {
    let mut msg = Message::new(Type::Non, code::CONTENT, Id(id), sent.token);
    msg.set_observe(seq);
    let (ex, resp) = h.inbound_response(msg)?;
    layer().receive_response(&h.snapshot(), &mut vec![], &ex, resp)
           .unwrap()
  }

  #[test]
  fn stale_notifications_are_dropped() {
    let h = Harness::new();
    let (ex, sent) = observing(&h);

    let first = notify_client(&h, &sent, 10, 16_777_210).unwrap();
    assert!(!first.is_last());
    assert!(notify_client(&h, &sent, 11, 5).is_some());
    assert!(notify_client(&h, &sent, 12, 4).is_none());
    assert!(!ex.is_complete());
  }

  #[test]
  fn registration_is_refreshed() {
    let mut h = Harness::new();
    let (ex, sent) = observing(&h);

    let mut msg = Message::new(Type::Non, code::CONTENT, Id(10), sent.token);
    msg.set_observe(3);
    msg.set_max_age(30);
    let (_, resp) = h.inbound_response(msg).unwrap();
    let mut fx = vec![];
    layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
           .unwrap();

    let (generation, at) = test::scheduled(&fx, Timer::Reregister).unwrap();
    assert!(at.0 >= 30_000 && at.0 <= 32_000);

    h.time = at;
    let mut fx = vec![];
    layer().on_timer(&h.snapshot(), &mut fx, &ex, Timer::Reregister, generation)
           .unwrap();

    let refresh = self::sent(&fx);
    assert_eq!(refresh.token, sent.token);
    assert_eq!(refresh.observe(), Some(0));
    assert_ne!(refresh.id, sent.id);
  }
}
