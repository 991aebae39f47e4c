use core::fmt::Debug;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::codec::Codec;
use crate::config::Config;
use crate::error::Error;
use crate::exchange::Exchange;
use crate::matcher::Matcher;
use crate::net::{Addrd, Session};
use crate::observe::Relations;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};
use crate::stem::{lock, Stem};
use crate::time::{self, Millis};

/// # Block-wise transfers
/// RFC 7959: splitting large bodies into blocks and reassembling them
pub mod block;

/// # OSCORE
/// The seam where object security protects and unprotects messages
pub mod oscore;

/// # Observe
/// RFC 7641 notifications, server and client side
pub mod observe;

/// # Reliability
/// Piggybacking, ACKs, Resets, retransmission of CON messages
pub mod reliability;

/// # Tokens
pub mod token;

/// # The wire
/// Ids, tokens and serialization; the bottom of every stack
pub mod wire;

#[doc(inline)]
pub use block::{Blockwise, Plain, Scope, Secure, SecureBlockwise};
#[doc(inline)]
pub use observe::Observe;
#[doc(inline)]
pub use oscore::{NoProtection, Oscore, Protect};
#[doc(inline)]
pub use reliability::Reliability;
#[doc(inline)]
pub use token::Token;
#[doc(inline)]
pub use wire::Wire;

/// ## Layers
/// A layer is one concern of the CoAP exchange engine (reliability,
/// block-wise transfer, observe, ...). Layers wrap each other, and the
/// endpoint only ever talks to the outermost one.
///
/// Outbound messages travel from the outside in: each layer does its
/// work then hands the message to the layer it wraps, until [`Wire`]
/// serializes it. Inbound messages travel from the inside out: each
/// layer first asks the layer it wraps, then handles what comes back.
/// Yielding `Ok(None)` from a `receive_*` method swallows the message;
/// layers further out never see it and nothing is delivered.
///
/// ### Nesting
/// Layers are generic over the layer they wrap, so a stack is a
/// nested type read from the outside in:
/// ```text
/// Observe<SecureBlockwise<Oscore<Blockwise<Token<Reliability<Wire>>>>>>
/// ```
/// When the endpoint sends a request, [`Observe`] sees it first and
/// [`Wire`] last. When a response arrives, [`Wire`] sees it first and
/// [`Observe`] last.
///
/// ### Side effects
/// Layers never touch the network or the timer queue directly. They
/// push [`Effect`]s which the endpoint applies once the layer call
/// returns, and keep their per-exchange state in the [`Exchange`].
pub trait Layer: Send + Sync + Debug {
  /// Send a request on behalf of an exchange
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  req: Req)
                  -> Result<(), Error>;

  /// Send a response on behalf of an exchange
  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   resp: Resp)
                   -> Result<(), Error>;

  /// Send an empty message: an ACK, a RST or a ping (CON).
  ///
  /// Pings are sent in an exchange so that the answer can be matched.
  fn send_empty(&self,
                snap: &Snapshot,
                effects: &mut Effects,
                exchange: Option<&Arc<Exchange>>,
                msg: EmptyMsg)
                -> Result<(), Error>;

  /// Handle an inbound request
  fn receive_request(&self,
                     snap: &Snapshot,
                     effects: &mut Effects,
                     exchange: &Arc<Exchange>,
                     req: Req)
                     -> Result<Option<Req>, Error>;

  /// Handle an inbound response
  fn receive_response(&self,
                      snap: &Snapshot,
                      effects: &mut Effects,
                      exchange: &Arc<Exchange>,
                      resp: Resp)
                      -> Result<Option<Resp>, Error>;

  /// Handle an inbound ACK or RST
  fn receive_empty(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   msg: EmptyMsg)
                   -> Result<Option<EmptyMsg>, Error>;

  /// A timer scheduled with [`Effect::Schedule`] expired.
  ///
  /// Layers handle the timers they own and pass the rest inwards.
  fn on_timer(&self,
              snap: &Snapshot,
              effects: &mut Effects,
              exchange: &Arc<Exchange>,
              timer: Timer,
              generation: u64)
              -> Result<(), Error>;
}

/// The layers of an endpoint
pub type Stack = Observe<SecureBlockwise<Oscore<Blockwise<Token<Reliability<Wire>>>>>>;

/// Build the standard [`Stack`]
pub fn stack() -> Stack {
  Observe::new(SecureBlockwise::new(Oscore::new(Blockwise::new(Token::new(Reliability::new(Wire))))))
}

/// Timers layers may schedule for an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timer {
  /// Retransmit the CON message in flight, or give up
  Retransmit,
  /// Forget an abandoned block-wise transfer
  BlockCleanup,
  /// Re-register an observe relation
  Reregister,
  /// Give up waiting for a response that may never come
  Expire,
}

/// Something a layer wants done once it returns
#[derive(Debug, Clone)]
pub enum Effect {
  /// Hand a datagram to the channel
  Transmit(Addrd<Arc<Vec<u8>>>),
  /// Invoke [`Layer::on_timer`] at some point in time.
  ///
  /// When the timer expires, the layer owning it compares `generation`
  /// to the one it stored; a timer it replaced or cancelled since is
  /// ignored. Timers of completed exchanges never fire.
  Schedule {
    /// The exchange the timer belongs to
    exchange: Arc<Exchange>,
    /// Which timer
    timer: Timer,
    /// see [`Exchange::next_generation`]
    generation: u64,
    /// When it should fire
    at: Millis,
  },
}

/// Effects collected while a layer call runs
pub type Effects = Vec<Effect>;

/// Shared machinery the layers use
#[derive(Debug)]
pub struct Services {
  pub(crate) matcher: Matcher,
  pub(crate) relations: Arc<Relations>,
  pub(crate) codec: Box<dyn Codec>,
  pub(crate) protect: Box<dyn Protect>,
  pub(crate) rand: Mutex<ChaCha8Rng>,
  pub(crate) sessions: Stem<HashMap<SocketAddr, Session>>,
}

impl Services {
  pub(crate) fn new(config: &Config, codec: Box<dyn Codec>, protect: Box<dyn Protect>, seed: u64) -> Self {
    let mut rand = ChaCha8Rng::seed_from_u64(seed);
    let matcher = Matcher::new(config, &mut rand);
    Self { matcher,
           relations: Arc::new(Relations::default()),
           codec,
           protect,
           rand: Mutex::new(rand),
           sessions: Stem::new(HashMap::new()) }
  }

  /// The session with a peer, if we learned anything about it
  pub fn session(&self, remote: SocketAddr) -> Option<Session> {
    self.sessions.map_ref(|s| s.get(&remote).copied())
  }

  pub(crate) fn set_session(&self, session: Session) {
    self.sessions.map_mut(|s| s.insert(session.remote, session));
  }

  pub(crate) fn forget_session(&self, remote: SocketAddr) -> Option<Session> {
    self.sessions.map_mut(|s| s.remove(&remote))
  }

  /// The matcher
  pub fn matcher(&self) -> &Matcher {
    &self.matcher
  }

  /// The observe relations we serve
  pub fn relations(&self) -> &Arc<Relations> {
    &self.relations
  }
}

/// The time, the configuration and the shared machinery
/// for one call into the stack
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
  /// The time the call started
  pub time: Millis,
  /// The configuration at that time
  pub config: Config,
  pub(crate) services: &'a Services,
}

impl<'a> Snapshot<'a> {
  pub(crate) fn new(time: Millis, config: Config, services: &'a Services) -> Self {
    Self { time,
           config,
           services }
  }

  /// The session with a peer
  pub fn session(&self, remote: SocketAddr) -> Session {
    self.services
        .sessions
        .map_ref(|s| s.get(&remote).copied())
        .unwrap_or_else(|| Session::udp(remote))
  }

  /// The shared machinery
  pub fn services(&self) -> &'a Services {
    self.services
  }

  pub(crate) fn rng(&self) -> MutexGuard<'_, ChaCha8Rng> {
    lock(&self.services.rand)
  }

  /// Largest message we may send to a peer
  pub(crate) fn max_message_size(&self, remote: SocketAddr) -> usize {
    self.session(remote)
        .max_message_size
        .unwrap_or(self.config.msg.max_message_size)
  }

  /// `self.time` plus some duration
  pub(crate) fn after(&self, delay: Millis) -> Millis {
    time::add(self.time, delay)
  }
}

/// Schedule `timer` for an exchange with a fresh generation,
/// yielding the generation so the owner can store it.
pub(crate) fn schedule(effects: &mut Effects, exchange: &Arc<Exchange>, timer: Timer, at: Millis) -> u64 {
  let generation = exchange.next_generation();
  effects.push(Effect::Schedule { exchange: exchange.clone(),
                                  timer,
                                  generation,
                                  at });
  generation
}
