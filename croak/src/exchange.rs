use core::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::layer::block::BlockStatus;
use crate::layer::reliability::Retransmission;
use crate::matcher::KeyUri;
use crate::net::SessionId;
use crate::observe::{NotificationOrderer, ObserveRelation};
use crate::req::Req;
use crate::resp::Resp;
use crate::stem::{lock, Stem};

/// Who started an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
  /// We sent the request
  Local,
  /// A peer sent the request
  Remote,
}

/// Notified when an exchange completes
pub trait ExchangeObserver: Send + Sync {
  /// The exchange completed; invoked exactly once, without any
  /// exchange lock held.
  fn completed(&self, exchange: &Exchange);
}

/// Everything that changes over the lifetime of an exchange.
///
/// Layers keep their per-exchange state here.
#[derive(Debug)]
pub(crate) struct State {
  /// The request as a whole (reassembled, when received blockwise)
  pub(crate) request: Req,
  /// The request message last sent or received, e.g. the current block
  pub(crate) current_request: Req,
  /// The response as a whole
  pub(crate) response: Option<Resp>,
  /// The response message last sent or received
  pub(crate) current_response: Option<Resp>,
  pub(crate) retransmission: Option<Retransmission>,
  pub(crate) block1: Option<BlockStatus>,
  pub(crate) block2: Option<BlockStatus>,
  pub(crate) block_cleanup: Option<u64>,
  pub(crate) key_uri: Option<KeyUri>,
  pub(crate) relation: Option<Arc<ObserveRelation>>,
  pub(crate) orderer: Option<NotificationOrderer>,
  pub(crate) reregistration: Option<u64>,
  pub(crate) expiry: Option<u64>,
  pub(crate) timed_out: bool,
  generation: u64,
}

/// A request and all messages sent or received on its behalf:
/// retransmissions, blocks, the response, notifications.
///
/// Exchanges are shared (`Arc<Exchange>`) between the endpoint, the
/// matcher, pending timers and the application.
pub struct Exchange {
  id: u64,
  origin: Origin,
  remote: SocketAddr,
  session: SessionId,
  state: Stem<State>,
  complete: AtomicBool,
  observers: Mutex<Vec<Arc<dyn ExchangeObserver>>>,
}

impl fmt::Debug for Exchange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Exchange")
     .field("id", &self.id)
     .field("origin", &self.origin)
     .field("remote", &self.remote)
     .field("complete", &self.is_complete())
     .finish()
  }
}

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

impl Exchange {
  /// Create an exchange for a request
  pub fn new(origin: Origin, request: Req, session: SessionId) -> Self {
    Self::with_remote(origin, request.remote(), request, session)
  }

  fn with_remote(origin: Origin, remote: SocketAddr, request: Req, session: SessionId) -> Self {
    Self { id: NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed),
           origin,
           remote,
           session,
           state: Stem::new(State { current_request: request.clone(),
                                    request,
                                    response: None,
                                    current_response: None,
                                    retransmission: None,
                                    block1: None,
                                    block2: None,
                                    block_cleanup: None,
                                    key_uri: None,
                                    relation: None,
                                    orderer: None,
                                    reregistration: None,
                                    expiry: None,
                                    timed_out: false,
                                    generation: 0 }),
           complete: AtomicBool::new(false),
           observers: Default::default() }
  }

  /// An exchange for one member's response to a multicast request.
  ///
  /// It shares the request (and its state) with the original exchange.
  pub(crate) fn clone_for_multicast_response(&self, remote: SocketAddr) -> Self {
    let (request, orderer) = self.state.map_ref(|s| (s.request.clone(), s.orderer.clone()));
    let ex = Self::with_remote(self.origin, remote, request, self.session);
    ex.state.map_mut(|s| s.orderer = orderer.map(|_| NotificationOrderer::default()));
    ex
  }

  /// Unique identifier of this exchange (within the process)
  pub fn id(&self) -> u64 {
    self.id
  }

  /// Who started the exchange
  pub fn origin(&self) -> Origin {
    self.origin
  }

  /// The peer
  pub fn remote(&self) -> SocketAddr {
    self.remote
  }

  /// The session with the peer
  pub fn session(&self) -> SessionId {
    self.session
  }

  /// Was the request sent to a multicast group?
  pub fn is_multicast(&self) -> bool {
    self.state.map_ref(|s| s.request.is_multicast())
  }

  /// The request as a whole
  pub fn request(&self) -> Req {
    self.state.map_ref(|s| s.request.clone())
  }

  /// The request message last sent or received
  pub fn current_request(&self) -> Req {
    self.state.map_ref(|s| s.current_request.clone())
  }

  /// The response as a whole, once there is one
  pub fn response(&self) -> Option<Resp> {
    self.state.map_ref(|s| s.response.clone())
  }

  /// The response message last sent or received
  pub fn current_response(&self) -> Option<Resp> {
    self.state.map_ref(|s| s.current_response.clone())
  }

  /// The observe relation this exchange carries, if any
  pub fn relation(&self) -> Option<Arc<ObserveRelation>> {
    self.state.map_ref(|s| s.relation.clone())
  }

  /// Did the exchange time out?
  pub fn is_timed_out(&self) -> bool {
    self.state.map_ref(|s| s.timed_out)
  }

  /// Has the exchange completed?
  pub fn is_complete(&self) -> bool {
    self.complete.load(Ordering::Acquire)
  }

  /// Be notified when the exchange completes.
  ///
  /// Observers added after completion are never invoked.
  pub fn add_observer(&self, observer: Arc<dyn ExchangeObserver>) {
    lock(&self.observers).push(observer);
  }

  /// Mark the exchange complete and notify observers.
  ///
  /// Yields `false` (and does nothing) if it already was.
  pub fn set_complete(&self) -> bool {
    if self.complete.swap(true, Ordering::AcqRel) {
      return false;
    }

    self.state.map_mut(|s| {
                s.retransmission = None;
                s.block_cleanup = None;
                s.reregistration = None;
                s.expiry = None;
                s.relation = None;
              });

    let observers = core::mem::take(&mut *lock(&self.observers));
    observers.iter().for_each(|o| o.completed(self));
    true
  }

  /// Mark the exchange (and its current request) timed out, then complete it
  pub(crate) fn set_timed_out(&self) {
    let req = self.state.map_mut(|s| {
                          s.timed_out = true;
                          s.current_request.clone()
                        });
    req.state().set_timed_out();
    self.set_complete();
  }

  pub(crate) fn set_request(&self, req: Req) {
    self.state.map_mut(|s| s.request = req);
  }

  pub(crate) fn set_current_request(&self, req: Req) {
    self.state.map_mut(|s| s.current_request = req);
  }

  pub(crate) fn set_response(&self, resp: Resp) {
    self.state.map_mut(|s| s.response = Some(resp));
  }

  pub(crate) fn set_current_response(&self, resp: Resp) {
    self.state.map_mut(|s| s.current_response = Some(resp));
  }

  /// Read the exchange state. Never call a layer from `f`.
  pub(crate) fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
    self.state.map_ref(f)
  }

  /// Change the exchange state. Never call a layer from `f`.
  pub(crate) fn update<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
    self.state.map_mut(f)
  }

  /// A number no timer of this exchange has been scheduled with yet
  pub(crate) fn next_generation(&self) -> u64 {
    self.state.map_mut(|s| {
                s.generation += 1;
                s.generation
              })
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::AtomicUsize;

  use super::*;

  struct Count(AtomicUsize);
  impl ExchangeObserver for Count {
    fn completed(&self, _: &Exchange) {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }

  fn exchange() -> Exchange {
    Exchange::new(Origin::Local,
                  Req::get("127.0.0.1:5683".parse().unwrap(), "a"),
                  SessionId::default())
  }

  #[test]
  fn completes_once() {
    let ex = exchange();
    let count = Arc::new(Count(AtomicUsize::new(0)));
    ex.add_observer(count.clone());

    assert!(ex.set_complete());
    assert!(!ex.set_complete());
    assert_eq!(count.0.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn timing_out_marks_request_and_completes() {
    let ex = exchange();
    ex.set_timed_out();
    assert!(ex.is_complete());
    assert!(ex.is_timed_out());
    assert!(ex.request().state().is_timed_out());
  }

  #[test]
  fn multicast_response_exchange_shares_request() {
    let ex = exchange();
    let other = ex.clone_for_multicast_response("127.0.0.1:9999".parse().unwrap());
    other.request().cancel();

    assert_ne!(ex.id(), other.id());
    assert!(ex.request().state().is_cancelled());
  }

  #[test]
  fn generations_increase() {
    let ex = exchange();
    let a = ex.next_generation();
    assert!(ex.next_generation() > a);
  }
}
