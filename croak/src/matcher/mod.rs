use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use croak_msg::no_repeat::{BLOCK1, BLOCK2, OBSERVE};
use croak_msg::{CacheKey, Id, Message, Token, Type};
use rand::Rng;

use crate::config::{Config, DedupStrategy};
use crate::error::{Error, What, When};
use crate::exchange::{Exchange, ExchangeObserver, Origin};
use crate::net::SessionId;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};
use crate::stem::lock;
use crate::time::Millis;

/// Remembering previously seen messages
pub mod dedup;

use dedup::Deduplicator;

/// Whose message id space a [`KeyId`] lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Namespace {
  /// Ids we assigned
  Local,
  /// Ids a peer assigned
  Remote,
}

/// Identifies a message by its id and the peer it was exchanged with
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId {
  /// Whose id space
  pub ns: Namespace,
  /// The message id
  pub id: Id,
  /// The peer
  pub remote: SocketAddr,
  /// The session with the peer
  pub session: SessionId,
}

impl KeyId {
  /// Key for a message id we assigned
  pub fn local(id: Id, remote: SocketAddr, session: SessionId) -> Self {
    Self { ns: Namespace::Local,
           id,
           remote,
           session }
  }

  /// Key for a message id a peer assigned
  pub fn remote(id: Id, remote: SocketAddr, session: SessionId) -> Self {
    Self { ns: Namespace::Remote,
           id,
           remote,
           session }
  }
}

/// Identifies an exchange by the token of its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyToken(pub Token);

/// Identifies a blockwise transfer by the peer and the options
/// that select the resource (block options and Observe excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyUri {
  /// Hash of the code and the resource-selecting options
  pub hash: CacheKey,
  /// The peer
  pub remote: SocketAddr,
}

impl KeyUri {
  /// The key of a request to (or from) a peer
  ///
  /// ```
  /// use croak::matcher::KeyUri;
  /// use croak::req::Req;
  /// use croak_msg::Block;
  ///
  /// let addr = "127.0.0.1:5683".parse().unwrap();
  /// let mut a = Req::put(addr, "firmware");
  /// let mut b = a.clone();
  /// a.set_block1(Block::new(512, 0, true));
  /// b.set_block1(Block::new(512, 3, false));
  ///
  /// assert_eq!(KeyUri::of(&a, addr), KeyUri::of(&b, addr));
  /// ```
  pub fn of(msg: &Message, remote: SocketAddr) -> Self {
    Self { hash: CacheKey::excluding(msg, |n| n == BLOCK1 || n == BLOCK2 || n == OBSERVE),
           remote }
  }
}

/// How an inbound request relates to the exchanges we know of
#[derive(Debug, Clone)]
pub enum RequestMatch {
  /// A new exchange was created for the request
  New(Arc<Exchange>),
  /// The request is the next block of an ongoing blockwise transfer
  Continue(Arc<Exchange>),
  /// We saw this request before; this is the exchange it was handled in
  Duplicate(Arc<Exchange>),
}

impl RequestMatch {
  /// The exchange the request belongs to
  pub fn exchange(&self) -> &Arc<Exchange> {
    match self {
      | Self::New(ex) | Self::Continue(ex) | Self::Duplicate(ex) => ex,
    }
  }
}

/// How an inbound response relates to the exchanges we know of
#[derive(Debug, Clone)]
pub enum ResponseMatch {
  /// The response answers a request we sent
  Matched(Arc<Exchange>),
  /// We saw this (CON or NON) response before
  Duplicate(Arc<Exchange>),
  /// Nothing we sent is answered by this response
  Unmatched,
}

#[derive(Debug, Default)]
struct Keys {
  ids: Vec<KeyId>,
  token: Option<KeyToken>,
  uri: Option<KeyUri>,
}

#[derive(Debug)]
struct Tables {
  by_id: HashMap<KeyId, Arc<Exchange>>,
  by_token: HashMap<KeyToken, Arc<Exchange>>,
  ongoing: HashMap<KeyUri, Arc<Exchange>>,
  keys: HashMap<u64, Keys>,
  dedup: Box<dyn Deduplicator>,
  next_mid: u16,
  last_sweep: Option<Millis>,
}

impl Tables {
  fn next_mid(&mut self) -> Id {
    let id = Id(self.next_mid);
    self.next_mid = self.next_mid.wrapping_add(1);
    id
  }

  fn provision_token(&self, rng: &mut impl Rng, length: u8) -> Option<Token> {
    const TRIES_PER_LENGTH: usize = 4;

    let start = usize::from(length).clamp(1, Token::MAX_LEN);
    (start..=Token::MAX_LEN).find_map(|len| {
                              (0..TRIES_PER_LENGTH).find_map(|_| {
                                                     let mut bytes = [0u8; Token::MAX_LEN];
                                                     rng.fill(&mut bytes[..len]);
                                                     let token = Token(bytes[..len].iter().copied().collect());
                                                     if self.by_token.contains_key(&KeyToken(token)) {
                                                       log::trace!("token {} in use, trying another", token);
                                                       None
                                                     } else {
                                                       Some(token)
                                                     }
                                                   })
                            })
  }

  fn evict(&mut self, exchange: u64) {
    let keys = match self.keys.remove(&exchange) {
      | Some(k) => k,
      | None => return,
    };

    let owned = |map_ex: Option<&Arc<Exchange>>| map_ex.map(|e| e.id()) == Some(exchange);

    keys.ids.iter().for_each(|k| {
                     if owned(self.by_id.get(k)) {
                       self.by_id.remove(k);
                     }
                   });

    if let Some(k) = keys.token {
      if owned(self.by_token.get(&k)) {
        self.by_token.remove(&k);
      }
    }

    if let Some(k) = keys.uri {
      if owned(self.ongoing.get(&k)) {
        self.ongoing.remove(&k);
      }
    }

    log::trace!("evicted exchange {}", exchange);
  }
}

struct Evict(Weak<Mutex<Tables>>);

impl ExchangeObserver for Evict {
  fn completed(&self, exchange: &Exchange) {
    if let Some(tables) = self.0.upgrade() {
      lock(&tables).evict(exchange.id());
    }
  }
}

/// Correlates messages with exchanges and detects duplicates.
///
/// All tables live behind a single lock, so a lookup and the
/// registration that follows it can never interleave with another
/// thread's.
///
/// Exchanges are evicted from the tables when they complete.
#[derive(Debug)]
pub struct Matcher {
  tables: Arc<Mutex<Tables>>,
}

impl Matcher {
  /// Create a matcher.
  ///
  /// When `config.msg.randomize_mid_start` is set, the first message id
  /// is drawn from `rng`.
  pub fn new(config: &Config, rng: &mut impl Rng) -> Self {
    let next_mid = if config.msg.randomize_mid_start {
      rng.gen()
    } else {
      0
    };

    Self { tables: Arc::new(Mutex::new(Tables { by_id: Default::default(),
                                                by_token: Default::default(),
                                                ongoing: Default::default(),
                                                keys: Default::default(),
                                                dedup: dedup::new(config.dedup.strategy),
                                                next_mid,
                                                last_sweep: None })) }
  }

  fn tables(&self) -> MutexGuard<'_, Tables> {
    lock(&self.tables)
  }

  /// Start tracking the keys of `exchange`, once
  fn keys_of<'a>(&self, t: &'a mut Tables, exchange: &Arc<Exchange>) -> &'a mut Keys {
    let tables = Arc::downgrade(&self.tables);
    t.keys.entry(exchange.id()).or_insert_with(|| {
                                  exchange.add_observer(Arc::new(Evict(tables)));
                                  Keys::default()
                                })
  }

  /// An exchange may complete while we register it; its observers
  /// have already run then, so evict it ourselves.
  fn evict_if_complete(t: &mut Tables, exchange: &Arc<Exchange>) {
    if exchange.is_complete() {
      t.evict(exchange.id());
    }
  }

  /// Assign a message id and token to an outbound request (unless it
  /// has them already) and register the exchange under both.
  pub fn send_request(&self,
                      exchange: &Arc<Exchange>,
                      req: &mut Req,
                      config: &Config,
                      rng: &mut impl Rng)
                      -> Result<(), Error> {
    let mut t = self.tables();

    if req.id.is_none() {
      req.id = Some(t.next_mid());
    }

    if !req.has_token() {
      let token = t.provision_token(rng, config.msg.token_length)
                   .ok_or_else(|| {
                     When::Sending { to: req.remote(),
                                     id: req.id,
                                     token: req.token }.what(What::Invariant("every token is in use"))
                   })?;
      req.set_token(token);
    }

    let token = KeyToken(req.token);
    match t.by_token.get(&token) {
      | Some(other) if other.id() != exchange.id() => {
        log::warn!("token {} of exchange {} reused by exchange {}",
                   req.token,
                   other.id(),
                   exchange.id());
      },
      | _ => (),
    }
    t.by_token.insert(token, exchange.clone());

    let id = KeyId::local(req.id.unwrap_or_default(), req.remote(), exchange.session());
    t.by_id.insert(id, exchange.clone());

    let keys = self.keys_of(&mut t, exchange);
    keys.ids.push(id);
    keys.token = Some(token);

    Self::evict_if_complete(&mut t, exchange);
    Ok(())
  }

  /// Assign a message id to an outbound response, and register it
  /// when it is CON or NON so that a later ACK or RST can be matched.
  pub fn send_response(&self, exchange: &Arc<Exchange>, resp: &mut Resp) {
    let mut t = self.tables();

    if resp.id.is_none() {
      resp.id = Some(t.next_mid());
    }

    if matches!(resp.ty, Type::Con | Type::Non) {
      let id = KeyId::local(resp.id.unwrap_or_default(), resp.remote(), exchange.session());
      t.by_id.insert(id, exchange.clone());
      self.keys_of(&mut t, exchange).ids.push(id);
      Self::evict_if_complete(&mut t, exchange);
    }
  }

  /// Assign a message id to an outbound empty message without one (a ping),
  /// registering it with `exchange` so that the answer can be matched.
  pub fn send_empty(&self, exchange: Option<&Arc<Exchange>>, msg: &mut EmptyMsg) {
    let mut t = self.tables();

    if msg.id.is_none() {
      msg.msg_mut().id = Some(t.next_mid());
    }

    if let (Some(exchange), Type::Con) = (exchange, msg.ty) {
      let id = KeyId::local(msg.id.unwrap_or_default(), msg.remote(), exchange.session());
      t.by_id.insert(id, exchange.clone());
      self.keys_of(&mut t, exchange).ids.push(id);
      Self::evict_if_complete(&mut t, exchange);
    }
  }

  /// A message id for a message sent outside any exchange (a signal)
  pub(crate) fn next_id(&self) -> Id {
    self.tables().next_mid()
  }

  /// Remember that a blockwise transfer with `exchange` is ongoing,
  /// so that requests for further blocks find it.
  pub fn register_ongoing(&self, exchange: &Arc<Exchange>, key: KeyUri) {
    let mut t = self.tables();
    t.ongoing.insert(key, exchange.clone());
    self.keys_of(&mut t, exchange).uri = Some(key);
    Self::evict_if_complete(&mut t, exchange);
  }

  /// Forget the ongoing blockwise transfer of `exchange`
  pub fn remove_ongoing(&self, exchange: &Exchange, key: KeyUri) {
    let mut t = self.tables();
    if t.ongoing.get(&key).map(|e| e.id()) == Some(exchange.id()) {
      t.ongoing.remove(&key);
    }
  }

  /// Correlate an inbound request.
  ///
  /// | seen this id before?           | block number > 0 with an ongoing transfer? | result                             |
  /// |--------------------------------|--------------------------------------------|------------------------------------|
  /// | yes                            | (not consulted)                            | `Duplicate` of the earlier exchange |
  /// | no                             | yes                                        | `Continue` the ongoing transfer     |
  /// | no                             | no                                         | `New` exchange                      |
  ///
  /// The id is remembered with the resulting exchange in every case, and a
  /// new exchange for a Block1 request becomes the ongoing transfer for its
  /// resource.
  pub fn receive_request(&self, req: &Req, session: SessionId, now: Millis) -> RequestMatch {
    let mut t = self.tables();
    let key = KeyId::remote(req.id.unwrap_or_default(), req.remote(), session);

    if let Some(prev) = t.dedup.find(&key) {
      return RequestMatch::Duplicate(prev);
    }

    let continuing = req.block1().map(|b| b.num() > 0).unwrap_or(false)
                     || req.block2().map(|b| b.num() > 0).unwrap_or(false);
    let uri = KeyUri::of(req, req.remote());
    let ongoing = if continuing {
      t.ongoing.get(&uri).filter(|ex| !ex.is_complete()).cloned()
    } else {
      None
    };

    let result = match ongoing {
      | Some(ex) => RequestMatch::Continue(ex),
      | None => {
        let ex = Arc::new(Exchange::new(Origin::Remote, req.clone(), session));
        if req.block1().is_some() {
          t.ongoing.insert(uri, ex.clone());
          self.keys_of(&mut t, &ex).uri = Some(uri);
        }
        RequestMatch::New(ex)
      },
    };

    t.dedup.find_previous(key, result.exchange(), now);
    result
  }

  /// Correlate an inbound response.
  ///
  /// The token finds the exchange; an ACK must additionally carry the id
  /// of a message we sent in it. A CON or NON response is checked for
  /// duplicates, and a response to a multicast request gets an exchange
  /// of its own.
  pub fn receive_response(&self, resp: &Resp, session: SessionId, now: Millis) -> ResponseMatch {
    let mut t = self.tables();
    let id = resp.id.unwrap_or_default();
    let remote_key = KeyId::remote(id, resp.remote(), session);

    let ex = match t.by_token.get(&KeyToken(resp.token)) {
      | Some(ex) => ex.clone(),
      | None if resp.ty == Type::Ack => return ResponseMatch::Unmatched,
      | None => {
        return match t.dedup.find(&remote_key) {
          | Some(prev) => {
            log::debug!("late duplicate of a response to completed exchange {}", prev.id());
            ResponseMatch::Duplicate(prev)
          },
          | None => ResponseMatch::Unmatched,
        }
      },
    };

    if !ex.is_multicast() && ex.remote() != resp.remote() {
      log::debug!("response with token {} from {} but exchange {} is with {}",
                  resp.token,
                  resp.remote(),
                  ex.id(),
                  ex.remote());
      return ResponseMatch::Unmatched;
    }

    match resp.ty {
      | Type::Ack => {
        let local = KeyId::local(id, resp.remote(), ex.session());
        match t.by_id.get(&local) {
          | Some(sent) if sent.id() == ex.id() => ResponseMatch::Matched(ex),
          | _ => {
            log::debug!("ACK {} carries token {} of exchange {} but not the id of a message sent in it",
                        id,
                        resp.token,
                        ex.id());
            ResponseMatch::Unmatched
          },
        }
      },
      | _ => {
        let target = if ex.is_multicast() {
          Arc::new(ex.clone_for_multicast_response(resp.remote()))
        } else {
          ex
        };

        match t.dedup.find_previous(remote_key, &target, now) {
          | Some(prev) => ResponseMatch::Duplicate(prev),
          | None => ResponseMatch::Matched(target),
        }
      },
    }
  }

  /// Find the exchange an inbound ACK or RST refers to
  pub fn receive_empty(&self, msg: &EmptyMsg, session: SessionId) -> Option<Arc<Exchange>> {
    let key = KeyId::local(msg.id.unwrap_or_default(), msg.remote(), session);
    self.tables().by_id.get(&key).cloned()
  }

  /// The in-flight exchange using a token
  pub fn exchange_for_token(&self, token: Token) -> Option<Arc<Exchange>> {
    self.tables().by_token.get(&KeyToken(token)).cloned()
  }

  /// Sweep the deduplicator when `config.dedup.sweep_interval` has
  /// elapsed since the last sweep, switching strategies if the
  /// configuration changed.
  pub fn sweep(&self, now: Millis, config: &Config) {
    let mut t = self.tables();

    if t.dedup.strategy() != config.dedup.strategy {
      log::info!("switching deduplicator from {:?} to {:?}",
                 t.dedup.strategy(),
                 config.dedup.strategy);
      t.dedup = dedup::new(config.dedup.strategy);
    }

    let due = match t.last_sweep {
      | None => true,
      | Some(last) => now.0.saturating_sub(last.0) >= config.dedup.sweep_interval.0,
    };

    if due {
      t.dedup.sweep(now, config.exchange_lifetime());
      t.last_sweep = Some(now);
    }
  }

  /// Number of exchanges registered by id, token or ongoing transfer
  pub fn exchange_count(&self) -> usize {
    self.tables().keys.len()
  }

  /// Number of messages the deduplicator remembers
  pub fn dedup_len(&self) -> usize {
    self.tables().dedup.len()
  }

  /// The strategy the deduplicator currently uses
  pub fn dedup_strategy(&self) -> DedupStrategy {
    self.tables().dedup.strategy()
  }

  /// Forget everything
  pub fn clear(&self) {
    let mut t = self.tables();
    t.by_id.clear();
    t.by_token.clear();
    t.ongoing.clear();
    t.keys.clear();
    t.dedup.clear();
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::{Block, Code};
  use embedded_time::duration::Milliseconds;
  use rand::SeedableRng;
  use rand_chacha::ChaCha8Rng;

  use super::*;
  use crate::resp::code;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  fn matcher() -> (Matcher, ChaCha8Rng) {
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    (Matcher::new(&Config::default(), &mut rng), rng)
  }

  fn received(id: u16) -> Req {
    let mut msg = Message::new(Type::Con, Code::GET, Id(id), Token::opaque(&[1]));
    msg.set_path("a");
    Req::received(crate::net::Addrd(msg, addr()))
  }

  fn sent(m: &Matcher, rng: &mut ChaCha8Rng) -> (Arc<Exchange>, Req) {
    let mut req = Req::get(addr(), "a");
    let ex = Arc::new(Exchange::new(Origin::Local, req.clone(), SessionId::default()));
    m.send_request(&ex, &mut req, &Config::default(), rng).unwrap();
    (ex, req)
  }

  #[test]
  fn send_request_assigns_id_and_token() {
    let (m, mut rng) = matcher();
    let (ex, req) = sent(&m, &mut rng);

    assert!(req.id.is_some());
    assert_eq!(req.token.len(), 4);
    assert_eq!(m.exchange_for_token(req.token).map(|e| e.id()), Some(ex.id()));
  }

  #[test]
  fn message_ids_increase() {
    let (m, mut rng) = matcher();
    let (_, a) = sent(&m, &mut rng);
    let (_, b) = sent(&m, &mut rng);
    assert_eq!(b.id.unwrap().0, a.id.unwrap().0.wrapping_add(1));
  }

  #[test]
  fn mid_start_is_not_randomized_when_disabled() {
    let mut cfg = Config::default();
    cfg.msg.randomize_mid_start = false;
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let m = Matcher::new(&cfg, &mut rng);

    let mut req = Req::get(addr(), "a");
    let ex = Arc::new(Exchange::new(Origin::Local, req.clone(), SessionId::default()));
    m.send_request(&ex, &mut req, &cfg, &mut rng).unwrap();
    assert_eq!(req.id, Some(Id(0)));
  }

  #[test]
  fn completion_evicts() {
    let (m, mut rng) = matcher();
    let (ex, req) = sent(&m, &mut rng);
    assert_eq!(m.exchange_count(), 1);

    ex.set_complete();
    assert_eq!(m.exchange_count(), 0);
    assert!(m.exchange_for_token(req.token).is_none());
  }

  #[test]
  fn duplicate_request() {
    let (m, _) = matcher();
    let now = Milliseconds(0);

    let first = m.receive_request(&received(1), SessionId::default(), now);
    let again = m.receive_request(&received(1), SessionId::default(), now);
    let other = m.receive_request(&received(2), SessionId::default(), now);

    assert!(matches!(first, RequestMatch::New(_)));
    match again {
      | RequestMatch::Duplicate(ex) => assert_eq!(ex.id(), first.exchange().id()),
      | other => panic!("{:?}", other),
    }
    assert!(matches!(other, RequestMatch::New(_)));
  }

  #[test]
  fn duplicate_expires_after_lifetime() {
    let (m, _) = matcher();
    let cfg = Config::default();

    m.receive_request(&received(1), SessionId::default(), Milliseconds(0));
    m.sweep(Milliseconds(0), &cfg);
    m.sweep(Milliseconds(cfg.exchange_lifetime().0 + 1), &cfg);

    let again = m.receive_request(&received(1), SessionId::default(), Milliseconds(0));
    assert!(matches!(again, RequestMatch::New(_)));
  }

  #[test]
  fn block1_continues_ongoing_transfer() {
    let (m, _) = matcher();
    let now = Milliseconds(0);

    let mut first = received(1);
    first.set_block1(Block::new(16, 0, true));
    let mut second = received(2);
    second.set_block1(Block::new(16, 1, false));

    let a = m.receive_request(&first, SessionId::default(), now);
    let b = m.receive_request(&second, SessionId::default(), now);
    let dup = m.receive_request(&first, SessionId::default(), now);

    assert!(matches!(a, RequestMatch::New(_)));
    match b {
      | RequestMatch::Continue(ex) => assert_eq!(ex.id(), a.exchange().id()),
      | other => panic!("{:?}", other),
    }
    assert!(matches!(dup, RequestMatch::Duplicate(_)));
  }

  #[test]
  fn ack_needs_a_local_id() {
    let (m, mut rng) = matcher();
    let (ex, req) = sent(&m, &mut rng);

    let mut ack = Resp::for_request(&req, code::CONTENT);
    ack.set_type(Type::Ack);
    ack.id = req.id;
    match m.receive_response(&ack, SessionId::default(), Milliseconds(0)) {
      | ResponseMatch::Matched(e) => assert_eq!(e.id(), ex.id()),
      | other => panic!("{:?}", other),
    }

    ack.id = Some(Id(req.id.unwrap().0.wrapping_add(100)));
    assert!(matches!(m.receive_response(&ack, SessionId::default(), Milliseconds(0)),
                     ResponseMatch::Unmatched));
  }

  #[test]
  fn separate_response_is_deduplicated() {
    let (m, mut rng) = matcher();
    let (_, req) = sent(&m, &mut rng);

    let mut resp = Resp::for_request(&req, code::CONTENT);
    resp.set_type(Type::Con);
    resp.id = Some(Id(900));

    assert!(matches!(m.receive_response(&resp, SessionId::default(), Milliseconds(0)),
                     ResponseMatch::Matched(_)));
    assert!(matches!(m.receive_response(&resp, SessionId::default(), Milliseconds(0)),
                     ResponseMatch::Duplicate(_)));
  }

  #[test]
  fn multicast_responses_get_their_own_exchange() {
    let (m, mut rng) = matcher();
    let mut req = Req::get("224.0.1.187:5683".parse().unwrap(), "a");
    req.ty = Type::Non;
    req.set_multicast(true);
    let ex = Arc::new(Exchange::new(Origin::Local, req.clone(), SessionId::default()));
    m.send_request(&ex, &mut req, &Config::default(), &mut rng).unwrap();

    let respond = |from: &str, id: u16| {
      let mut resp = Resp::from_msg(Message::new(Type::Non, code::CONTENT, Id(id), req.token),
                                    from.parse().unwrap());
      resp.set_payload(*b"hi");
      m.receive_response(&resp, SessionId::default(), Milliseconds(0))
    };

    let a = respond("10.0.0.1:5683", 1);
    let b = respond("10.0.0.2:5683", 1);

    match (a, b) {
      | (ResponseMatch::Matched(a), ResponseMatch::Matched(b)) => {
        assert_ne!(a.id(), b.id());
        assert_ne!(a.id(), ex.id());
        assert_eq!(a.remote(), "10.0.0.1:5683".parse().unwrap());
        assert!(!ex.is_complete());
      },
      | other => panic!("{:?}", other),
    }
  }

  #[test]
  fn token_length_grows_when_exhausted() {
    let mut cfg = Config::default();
    cfg.msg.token_length = 1;
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let m = Matcher::new(&cfg, &mut rng);

    let lengths = (0..300).map(|_| {
                            let mut req = Req::get(addr(), "a");
                            let ex = Arc::new(Exchange::new(Origin::Local, req.clone(), SessionId::default()));
                            m.send_request(&ex, &mut req, &cfg, &mut rng).unwrap();
                            req.token.len()
                          })
                          .collect::<Vec<_>>();

    assert!(lengths.iter().all(|n| *n >= 1));
    assert!(lengths.iter().any(|n| *n > 1));
  }
}
