use core::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use croak_msg::observe::next_sequence;
use croak_msg::Token;

use crate::config;
use crate::exchange::Exchange;
use crate::req::Req;
use crate::resp::Resp;
use crate::stem::lock;
use crate::time::Millis;

#[derive(Debug)]
struct State {
  established: bool,
  cancelled: bool,
  sequence: u32,
  notifications_since_check: u32,
  last_check: Millis,
  next: Option<Resp>,
}

/// A peer observing one of our resources.
///
/// Created when an Observe=0 request arrives and established once a
/// successful response carrying the Observe option is sent for it. The
/// relation lives as long as the exchange of the registering request.
pub struct ObserveRelation {
  remote: SocketAddr,
  token: Token,
  exchange: Weak<Exchange>,
  state: Mutex<State>,
}

impl fmt::Debug for ObserveRelation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = lock(&self.state);
    f.debug_struct("ObserveRelation")
     .field("remote", &self.remote)
     .field("token", &self.token)
     .field("established", &s.established)
     .field("cancelled", &s.cancelled)
     .field("sequence", &s.sequence)
     .finish()
  }
}

impl ObserveRelation {
  /// A relation for the registering request of `exchange`
  pub fn new(exchange: &Arc<Exchange>, now: Millis) -> Self {
    let req = exchange.request();
    Self { remote: exchange.remote(),
           token: req.token,
           exchange: Arc::downgrade(exchange),
           state: Mutex::new(State { established: false,
                                     cancelled: false,
                                     sequence: 0,
                                     notifications_since_check: 0,
                                     last_check: now,
                                     next: None }) }
  }

  /// The observer and the token it observes with
  pub fn key(&self) -> (SocketAddr, Token) {
    (self.remote, self.token)
  }

  /// The observer
  pub fn remote(&self) -> SocketAddr {
    self.remote
  }

  /// The exchange of the registering request, until it completes
  pub fn exchange(&self) -> Option<Arc<Exchange>> {
    self.exchange.upgrade().filter(|ex| !ex.is_complete())
  }

  /// The registering request
  pub fn request(&self) -> Option<Req> {
    self.exchange.upgrade().map(|ex| ex.request())
  }

  /// Have we sent a notification for this relation yet?
  pub fn is_established(&self) -> bool {
    lock(&self.state).established
  }

  pub(crate) fn establish(&self) {
    lock(&self.state).established = true;
  }

  /// Has the relation ended?
  pub fn is_cancelled(&self) -> bool {
    lock(&self.state).cancelled
  }

  /// End the relation. Yields `false` if it already was.
  pub(crate) fn cancel(&self) -> bool {
    let mut s = lock(&self.state);
    s.next = None;
    !core::mem::replace(&mut s.cancelled, true)
  }

  /// The sequence number for the next notification
  pub(crate) fn next_sequence(&self) -> u32 {
    let mut s = lock(&self.state);
    s.sequence = next_sequence(s.sequence);
    s.sequence
  }

  /// Continue numbering notifications after those of a relation this one replaces
  pub(crate) fn resume(&self, sequence: u32) {
    lock(&self.state).sequence = sequence;
  }

  /// The sequence number of the last notification
  pub fn sequence(&self) -> u32 {
    lock(&self.state).sequence
  }

  /// Should the next notification be confirmable, to check
  /// that the observer is still there?
  ///
  /// Yes once `check_interval_count` notifications were sent since the
  /// last check, or `check_interval_time` has passed, whichever is first.
  pub(crate) fn check(&self, now: Millis, cfg: &config::Observe) -> bool {
    let mut s = lock(&self.state);
    s.notifications_since_check += 1;

    let due = s.notifications_since_check >= cfg.check_interval_count
              || now.0.saturating_sub(s.last_check.0) >= cfg.check_interval_time.0;

    if due {
      s.notifications_since_check = 0;
      s.last_check = now;
    }

    due
  }

  /// Queue a notification to send once the one in transit is
  /// acknowledged, replacing (and yielding) any queued before.
  pub(crate) fn set_next(&self, resp: Resp) -> Option<Resp> {
    lock(&self.state).next.replace(resp)
  }

  /// Take the queued notification
  pub(crate) fn take_next(&self) -> Option<Resp> {
    lock(&self.state).next.take()
  }

  /// Is a notification queued?
  pub fn has_next(&self) -> bool {
    lock(&self.state).next.is_some()
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::exchange::Origin;
  use crate::net::SessionId;
  use crate::resp::code;

  fn relation() -> (Arc<Exchange>, ObserveRelation) {
    let req = Req::get("127.0.0.1:5683".parse().unwrap(), "a");
    let ex = Arc::new(Exchange::new(Origin::Remote, req, SessionId::default()));
    let rel = ObserveRelation::new(&ex, Milliseconds(0));
    (ex, rel)
  }

  #[test]
  fn check_by_count() {
    let (_ex, rel) = relation();
    let cfg = config::Observe { check_interval_count: 3,
                                ..Default::default() };

    let checks = (0..6).map(|n| rel.check(Milliseconds(n), &cfg))
                       .collect::<Vec<_>>();
    assert_eq!(checks, vec![false, false, true, false, false, true]);
  }

  #[test]
  fn check_by_time() {
    let (_ex, rel) = relation();
    let cfg = config::Observe { check_interval_time: Milliseconds(1000),
                                ..Default::default() };

    assert!(!rel.check(Milliseconds(999), &cfg));
    assert!(rel.check(Milliseconds(1000), &cfg));
    assert!(!rel.check(Milliseconds(1500), &cfg));
  }

  #[test]
  fn next_replaces_queued() {
    let (ex, rel) = relation();
    let req = ex.request();
    let mut a = Resp::for_request(&req, code::CONTENT);
    a.set_payload("1");
    let mut b = Resp::for_request(&req, code::CONTENT);
    b.set_payload("2");

    assert!(rel.set_next(a).is_none());
    assert_eq!(rel.set_next(b).map(|r| r.payload.0.clone()), Some(b"1".to_vec()));
    assert_eq!(rel.take_next().map(|r| r.payload.0.clone()), Some(b"2".to_vec()));
    assert!(!rel.has_next());
  }

  #[test]
  fn exchange_gone_once_complete() {
    let (ex, rel) = relation();
    assert!(rel.exchange().is_some());
    ex.set_complete();
    assert!(rel.exchange().is_none());
    assert!(rel.cancel());
    assert!(!rel.cancel());
  }
}
