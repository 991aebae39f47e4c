use std::net::SocketAddr;
use std::sync::Arc;

use croak_msg::observe::Action;
use croak_msg::{Id, Type};

use super::{schedule, Effect, Effects, Layer, Snapshot, Timer};
use crate::error::{Error, What, When};
use crate::exchange::{Exchange, Origin};
use crate::lifecycle::MessageState;
use crate::net::Addrd;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};
use crate::retry::{RetryTimer, YouShould};

/// The CON message of an exchange that is waiting for an ACK
#[derive(Debug, Clone)]
pub(crate) struct Retransmission {
  pub(crate) timer: RetryTimer,
  pub(crate) generation: u64,
  pub(crate) id: Id,
  pub(crate) bytes: Arc<Vec<u8>>,
  pub(crate) remote: SocketAddr,
  pub(crate) state: Arc<MessageState>,
}

/// Message-layer reliability (RFC 7252 section 4).
///
/// - responses without an explicit type are piggybacked on the ACK of a
///   confirmable request when it was not acknowledged yet
/// - CON messages are retransmitted with exponential back-off until
///   acknowledged, rejected, cancelled, or `max_retransmit` is exhausted
/// - CON responses are acknowledged, and answered with a RST when
///   the request they answer was cancelled
/// - duplicate requests are answered by replaying what we sent the
///   first time around
#[derive(Debug, Clone, Copy)]
pub struct Reliability<L> {
  inner: L,
}

impl<L> Reliability<L> {
  /// Wrap a layer
  pub fn new(inner: L) -> Self {
    Self { inner }
  }
}

fn is_registration(req: &Req) -> bool {
  req.observe_action() == Some(Action::Register)
}

impl<L: Layer> Reliability<L> {
  /// Retransmit the CON message that was just sent until it is acknowledged.
  ///
  /// A message sent under the id of the one already in flight replaces it,
  /// and inherits its back-off and the attempts already made.
  fn retransmit_later(snap: &Snapshot,
                      effects: &mut Effects,
                      exchange: &Arc<Exchange>,
                      id: Option<Id>,
                      bytes: Option<Arc<Vec<u8>>>,
                      remote: SocketAddr,
                      state: Arc<MessageState>)
                      -> Result<(), Error> {
    let (id, bytes) = match (id, bytes) {
      | (Some(id), Some(bytes)) => (id, bytes),
      | _ => {
        return Err(When::Sending { to: remote,
                                   id,
                                   token: Default::default() }.what(What::Invariant("a CON message was sent without an id or bytes")))
      },
    };

    let inherited = exchange.read(|s| {
                              s.retransmission
                               .as_ref()
                               .filter(|r| r.id == id && r.remote == remote)
                               .map(|r| r.timer.clone())
                            });
    let timer = match inherited {
      | Some(timer) => {
        log::trace!("exchange {}: {} replaces the message in flight after {} attempts",
                    exchange.id(),
                    id,
                    timer.attempts().0);
        timer
      },
      | None => {
        let con = snap.config.msg.con;
        RetryTimer::new(snap.time,
                        con.retry_strategy(),
                        con.max_attempts(),
                        &mut *snap.rng())
      },
    };
    let generation = schedule(effects, exchange, Timer::Retransmit, timer.next_attempt_at());

    log::trace!("exchange {}: retransmitting {} at {}ms unless acknowledged",
                exchange.id(),
                id,
                timer.next_attempt_at().0);

    exchange.update(|s| {
              s.retransmission = Some(Retransmission { timer,
                                                       generation,
                                                       id,
                                                       bytes,
                                                       remote,
                                                       state })
            });
    Ok(())
  }

  /// Give up on an exchange whose response may never come, unless
  /// something else finishes it first.
  fn expire_later(snap: &Snapshot, effects: &mut Effects, exchange: &Arc<Exchange>) {
    let generation = schedule(effects,
                              exchange,
                              Timer::Expire,
                              snap.after(snap.config.exchange_lifetime()));
    exchange.update(|s| s.expiry = Some(generation));
  }

  fn ack(&self, snap: &Snapshot, effects: &mut Effects, id: Option<Id>, remote: SocketAddr) -> Result<(), Error> {
    match id {
      | Some(id) => self.inner
                        .send_empty(snap, effects, None, EmptyMsg::ack(id, remote)),
      | None => Ok(()),
    }
  }

  fn reset(&self, snap: &Snapshot, effects: &mut Effects, id: Option<Id>, remote: SocketAddr) -> Result<(), Error> {
    match id {
      | Some(id) => self.inner
                        .send_empty(snap, effects, None, EmptyMsg::reset(id, remote)),
      | None => Ok(()),
    }
  }

  fn on_retransmit(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   generation: u64)
                   -> Result<(), Error> {
    let mut retr = match exchange.read(|s| s.retransmission.clone()) {
      | Some(r) if r.generation == generation => r,
      | _ => {
        log::trace!("exchange {}: stale retransmission timer", exchange.id());
        return Ok(());
      },
    };

    let flags = retr.state.flags();
    let cancelled = exchange.origin() == Origin::Local && exchange.request().state().is_cancelled();
    if flags.acknowledged || flags.is_final() || cancelled {
      exchange.update(|s| s.retransmission = None);
      return Ok(());
    }

    match retr.timer.what_should_i_do(snap.time) {
      | Err(nb::Error::WouldBlock) => {
        effects.push(Effect::Schedule { exchange: exchange.clone(),
                                        timer: Timer::Retransmit,
                                        generation,
                                        at: retr.timer.next_attempt_at() });
      },
      | Ok(YouShould::Retry) => {
        let n = retr.state.retransmitting();
        log::debug!("exchange {}: retransmitting {} to {} ({} of {})",
                    exchange.id(),
                    retr.id,
                    retr.remote,
                    n,
                    snap.config.msg.con.max_retransmit.0);

        effects.push(Effect::Transmit(Addrd(retr.bytes.clone(), retr.remote)));
        effects.push(Effect::Schedule { exchange: exchange.clone(),
                                        timer: Timer::Retransmit,
                                        generation,
                                        at: retr.timer.next_attempt_at() });
        exchange.update(|s| {
                  if s.retransmission.as_ref().map(|r| r.generation) == Some(generation) {
                    s.retransmission = Some(retr);
                  }
                });
      },
      | Ok(YouShould::Cry) => {
        log::warn!("exchange {}: {} to {} was never acknowledged, giving up",
                   exchange.id(),
                   retr.id,
                   retr.remote);
        retr.state.set_timed_out();
        exchange.set_timed_out();
      },
      | Err(nb::Error::Other(never)) => match never {},
    }

    Ok(())
  }
}

impl<L: Layer> Layer for Reliability<L> {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  req: Req)
                  -> Result<(), Error> {
    if req.state().is_cancelled() || exchange.request().state().is_cancelled() {
      log::debug!("exchange {}: not sending cancelled request", exchange.id());
      return Ok(());
    }

    let ty = req.ty;
    let registration = is_registration(&req);
    self.inner.send_request(snap, effects, exchange, req)?;

    if ty == Type::Con {
      let cur = exchange.current_request();
      Self::retransmit_later(snap,
                             effects,
                             exchange,
                             cur.id,
                             cur.bytes().cloned(),
                             cur.remote(),
                             cur.state().clone())
    } else {
      if !registration {
        Self::expire_later(snap, effects, exchange);
      }
      Ok(())
    }
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   mut resp: Resp)
                   -> Result<(), Error> {
    if !resp.is_type_set() {
      let req = exchange.current_request();
      match req.ty {
        | Type::Con if req.state().set_acknowledged() => {
          resp.set_type(Type::Ack);
          resp.id = req.id;
        },
        | Type::Con => resp.set_type(Type::Con),
        | _ => resp.set_type(Type::Non),
      }
    }

    let ty = resp.ty;
    self.inner.send_response(snap, effects, exchange, resp)?;

    if ty == Type::Con {
      let cur = exchange.current_response();
      match cur {
        | Some(cur) => Self::retransmit_later(snap,
                                              effects,
                                              exchange,
                                              cur.id,
                                              cur.bytes().cloned(),
                                              cur.remote(),
                                              cur.state().clone()),
        | None => Ok(()),
      }
    } else {
      Ok(())
    }
  }

  fn send_empty(&self,
                snap: &Snapshot,
                effects: &mut Effects,
                exchange: Option<&Arc<Exchange>>,
                msg: EmptyMsg)
                -> Result<(), Error> {
    let ty = msg.ty;

    if let Some(ex) = exchange {
      let cur = ex.current_request();
      if ex.origin() == Origin::Remote && cur.id == msg.id {
        match ty {
          | Type::Ack => {
            cur.state().set_acknowledged();
          },
          | Type::Reset => {
            cur.state().set_rejected();
          },
          | _ => (),
        }
      }
    }

    self.inner.send_empty(snap, effects, exchange, msg)?;

    match (exchange, ty) {
      | (Some(ex), Type::Con) => {
        let cur = ex.current_request();
        Self::retransmit_later(snap,
                               effects,
                               ex,
                               cur.id,
                               cur.bytes().cloned(),
                               cur.remote(),
                               cur.state().clone())
      },
      | (Some(ex), Type::Reset) => {
        ex.set_complete();
        Ok(())
      },
      | _ => Ok(()),
    }
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

    if !req.state().is_duplicate() {
      return Ok(Some(req));
    }

    let replay = exchange.read(|s| {
                           s.current_response
                            .as_ref()
                            .filter(|r| r.ty != Type::Ack || r.id == req.id)
                            .and_then(|r| r.bytes().cloned().map(|b| Addrd(b, r.remote())))
                         });

    let original = exchange.read(|s| s.current_request.state().flags());

    match replay {
      | Some(bytes) => {
        log::debug!("exchange {}: duplicate {} from {}, replaying response",
                    exchange.id(),
                    req.id.unwrap_or_default(),
                    req.remote());
        effects.push(Effect::Transmit(bytes));
      },
      | None if original.acknowledged && req.ty == Type::Con => {
        log::debug!("exchange {}: duplicate {}, acknowledging again",
                    exchange.id(),
                    req.id.unwrap_or_default());
        self.ack(snap, effects, req.id, req.remote())?;
      },
      | None if original.rejected => {
        log::debug!("exchange {}: duplicate {}, rejecting again",
                    exchange.id(),
                    req.id.unwrap_or_default());
        self.reset(snap, effects, req.id, req.remote())?;
      },
      | None => {
        log::debug!("exchange {}: duplicate {} while still processing, dropped",
                    exchange.id(),
                    req.id.unwrap_or_default());
      },
    }

    Ok(None)
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

    let cancelled =
      exchange.request().state().is_cancelled() || exchange.current_request().state().is_cancelled();

    match resp.ty {
      | Type::Con | Type::Non if cancelled => {
        log::debug!("exchange {}: response {} to a cancelled request, rejecting",
                    exchange.id(),
                    resp.id.unwrap_or_default());
        self.reset(snap, effects, resp.id, resp.remote())?;
        exchange.set_complete();
        return Ok(None);
      },
      | Type::Con => self.ack(snap, effects, resp.id, resp.remote())?,
      | _ => (),
    }

    if resp.state().is_duplicate() {
      log::debug!("exchange {}: duplicate response {} dropped",
                  exchange.id(),
                  resp.id.unwrap_or_default());
      return Ok(None);
    }

    let cur = exchange.current_request();
    if resp.ty == Type::Ack {
      cur.state().set_acknowledged();
    }

    exchange.update(|s| {
              if s.retransmission.as_ref().map(|r| r.id) == cur.id {
                s.retransmission = None;
              }
            });

    Ok(Some(resp))
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

    exchange.update(|s| match &s.retransmission {
              | Some(r) if Some(r.id) == msg.id => s.retransmission = None,
              | _ => (),
            });

    // (the state of the message answered, is it a final response?)
    let target = match exchange.origin() {
      | Origin::Local => exchange.read(|s| {
                                   Some(&s.current_request).filter(|r| r.id == msg.id)
                                                           .map(|r| (r.state().clone(), None))
                                 }),
      | Origin::Remote => exchange.read(|s| {
                                    s.current_response
                                     .as_ref()
                                     .filter(|r| r.id == msg.id)
                                     .map(|r| (r.state().clone(), Some(r.is_last())))
                                  }),
    };

    let (state, last) = match target {
      | Some(t) => t,
      | None => {
        log::debug!("exchange {}: {:?} {} answers nothing in flight",
                    exchange.id(),
                    msg.ty,
                    msg.id.unwrap_or_default());
        return Ok(Some(msg));
      },
    };

    match msg.ty {
      | Type::Ack => {
        state.set_acknowledged();
        match last {
          | Some(true) => {
            exchange.set_complete();
          },
          | Some(false) => (),
          | None if !is_registration(&exchange.request()) && !exchange.request().is_empty() => {
            Self::expire_later(snap, effects, exchange)
          },
          | None => (),
        }
      },
      | Type::Reset => {
        log::debug!("exchange {}: {} rejected by {}",
                    exchange.id(),
                    msg.id.unwrap_or_default(),
                    msg.remote());
        state.set_rejected();
        exchange.set_complete();
      },
      | _ => (),
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
      | Timer::Retransmit => self.on_retransmit(snap, effects, exchange, generation),
      | Timer::Expire if exchange.read(|s| s.expiry) == Some(generation) => {
        log::debug!("exchange {}: no response within the exchange lifetime",
                    exchange.id());
        exchange.set_timed_out();
        Ok(())
      },
      | Timer::Expire => Ok(()),
      | _ => self.inner.on_timer(snap, effects, exchange, timer, generation),
    }
  }
}
