use core::fmt;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use croak_msg::observe::Action;
use croak_msg::{Code, CodeKind, Header, Message, MessageParseError, Type};

use crate::codec::{Codec, Rfc7252};
use crate::config::Config;
use crate::error::{Error, What, When};
use crate::exchange::{Exchange, Origin};
use crate::layer::{self, Effect, Effects, Layer, NoProtection, Protect, Services, Snapshot, Stack};
use crate::logging::msg_summary;
use crate::matcher::{RequestMatch, ResponseMatch};
use crate::net::{Addrd, Channel, Session};
use crate::observe::Relations;
use crate::req::Req;
use crate::resp::{EmptyMsg, Resp};
use crate::stem::{lock, Stem};
use crate::time::{self, Clock, Millis};

mod deliver;
mod exec;
mod queue;
mod signal;
mod timers;

#[doc(inline)]
pub use deliver::{Deliverer, NotFound, Routes};
#[doc(inline)]
pub use exec::{Executor, Inline, Job, Threaded};
use queue::SendQueue;
use timers::{Scheduled, Timers};

/// Largest datagram we can receive
const MAX_DATAGRAM: usize = 65_535;

struct Inner<Ch, Clk> {
  channel: Ch,
  clock: Clk,
  config: Arc<Stem<Config>>,
  services: Services,
  stack: Stack,
  deliverer: Box<dyn Deliverer>,
  executor: Box<dyn Executor>,
  timers: Mutex<Timers>,
  queues: Stem<HashMap<SocketAddr, Arc<SendQueue>>>,
  recv_buf: Mutex<Vec<u8>>,
  running: AtomicBool,
}

/// A CoAP endpoint: a [`Channel`], the layer [`Stack`] and everything
/// the layers share.
///
/// The endpoint does nothing on its own. Drive it by calling
/// [`Endpoint::poll`] in a loop (which also fires due timers), or
/// [`Endpoint::tick`] when you only send.
///
/// Endpoints are cheap to clone; clones share everything.
///
/// ```no_run
/// use std::net::UdpSocket;
///
/// use croak::endpoint::{Endpoint, Routes};
/// use croak::resp::{code, Resp};
/// use croak::time::StdClock;
/// use croak_msg::Code;
///
/// let sock = UdpSocket::bind("0.0.0.0:5683").unwrap();
/// sock.set_nonblocking(true).unwrap();
///
/// let routes = Routes::new().route(Code::GET, "hello", |req| {
///                             let mut resp = Resp::for_request(req, code::CONTENT);
///                             resp.set_payload("world");
///                             resp
///                           });
///
/// let server = Endpoint::builder(sock, StdClock::new()).deliverer(routes)
///                                                      .build()
///                                                      .unwrap();
/// loop {
///   match server.poll() {
///     | Ok(()) | Err(nb::Error::WouldBlock) => (),
///     | Err(nb::Error::Other(e)) => log::error!("{}", e),
///   }
/// }
/// ```
pub struct Endpoint<Ch, Clk> {
  inner: Arc<Inner<Ch, Clk>>,
}

impl<Ch, Clk> Clone for Endpoint<Ch, Clk> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone() }
  }
}

impl<Ch: Channel, Clk> fmt::Debug for Endpoint<Ch, Clk> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Endpoint")
     .field("local_addr", &self.inner.channel.local_addr().ok())
     .field("running", &self.inner.running.load(Ordering::Acquire))
     .field("exchanges", &self.inner.services.matcher.exchange_count())
     .field("timers", &lock(&self.inner.timers).len())
     .finish()
  }
}

/// Configures an [`Endpoint`]
pub struct Builder<Ch, Clk> {
  channel: Ch,
  clock: Clk,
  config: Config,
  deliverer: Box<dyn Deliverer>,
  executor: Box<dyn Executor>,
  codec: Box<dyn Codec>,
  protect: Box<dyn Protect>,
  seed: Option<u64>,
}

impl<Ch, Clk> fmt::Debug for Builder<Ch, Clk> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Builder")
     .field("config", &self.config)
     .field("deliverer", &self.deliverer)
     .field("executor", &self.executor)
     .field("codec", &self.codec)
     .field("protect", &self.protect)
     .field("seed", &self.seed)
     .finish()
  }
}

impl<Ch: Channel, Clk: Clock + Send + Sync + 'static> Builder<Ch, Clk> {
  /// Use this configuration instead of the default one
  pub fn config(mut self, config: Config) -> Self {
    self.config = config;
    self
  }

  /// Hand requests and responses to this deliverer (default [`NotFound`])
  pub fn deliverer(mut self, deliverer: impl Deliverer + 'static) -> Self {
    self.deliverer = Box::new(deliverer);
    self
  }

  /// Handle datagrams with this executor (default [`Inline`])
  pub fn executor(mut self, executor: impl Executor + 'static) -> Self {
    self.executor = Box::new(executor);
    self
  }

  /// Serialize messages with this codec (default [`Rfc7252`])
  pub fn codec(mut self, codec: impl Codec + 'static) -> Self {
    self.codec = Box::new(codec);
    self
  }

  /// Protect messages carrying the OSCORE option with this (default [`NoProtection`])
  pub fn protect(mut self, protect: impl Protect + 'static) -> Self {
    self.protect = Box::new(protect);
    self
  }

  /// Seed the random number generator used for message ids, tokens and
  /// timeout jitter (default: derived from the system time)
  pub fn seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }

  /// Build the endpoint and start the channel
  pub fn build(self) -> Result<Endpoint<Ch, Clk>, Error> {
    let seed = self.seed.unwrap_or_else(|| {
                          let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH)
                                                                  .map(|d| d.as_nanos() as u64)
                                                                  .unwrap_or_default();
                          let port = self.channel.local_addr().map(|a| a.port()).unwrap_or_default();
                          nanos ^ (u64::from(port) << 48)
                        });

    let services = Services::new(&self.config, self.codec, self.protect, seed);
    let inner = Inner { channel: self.channel,
                        clock: self.clock,
                        config: Arc::new(Stem::new(self.config)),
                        services,
                        stack: layer::stack(),
                        deliverer: self.deliverer,
                        executor: self.executor,
                        timers: Mutex::new(Timers::default()),
                        queues: Stem::new(HashMap::new()),
                        recv_buf: Mutex::new(vec![0; MAX_DATAGRAM]),
                        running: AtomicBool::new(false) };

    let ep = Endpoint { inner: Arc::new(inner) };
    ep.start()?;
    Ok(ep)
  }
}

fn channel_error(when: When, e: impl fmt::Debug) -> Error {
  when.what(What::Channel(format!("{:?}", e)))
}

fn sending(req: &Message, to: SocketAddr) -> When {
  When::Sending { to,
                  id: req.id,
                  token: req.token }
}

impl<Ch: Channel, Clk: Clock + Send + Sync + 'static> Endpoint<Ch, Clk> {
  /// Start configuring an endpoint
  pub fn builder(channel: Ch, clock: Clk) -> Builder<Ch, Clk> {
    Builder { channel,
              clock,
              config: Config::default(),
              deliverer: Box::new(NotFound),
              executor: Box::new(Inline),
              codec: Box::new(Rfc7252),
              protect: Box::new(NoProtection),
              seed: None }
  }

  /// The channel
  pub fn channel(&self) -> &Ch {
    &self.inner.channel
  }

  /// The clock
  pub fn clock(&self) -> &Clk {
    &self.inner.clock
  }

  /// The current configuration
  pub fn config(&self) -> Config {
    self.inner.config.map_ref(|c| *c)
  }

  /// Replace the configuration; layers see the change on their next call
  pub fn set_config(&self, config: Config) {
    self.inner.config.map_mut(|c| *c = config);
  }

  /// The shared configuration, e.g. to
  /// [`bind`](crate::properties::Properties::bind) properties to it
  pub fn config_handle(&self) -> Arc<Stem<Config>> {
    self.inner.config.clone()
  }

  /// The machinery shared by the layers
  pub fn services(&self) -> &Services {
    &self.inner.services
  }

  /// The observe relations we serve
  pub fn relations(&self) -> &Arc<Relations> {
    self.inner.services.relations()
  }

  /// Milliseconds since the clock's epoch
  pub fn now(&self) -> Result<Millis, Error> {
    self.inner
        .clock
        .try_now()
        .ok()
        .and_then(time::since_epoch)
        .ok_or_else(|| When::None.what(What::Clock))
  }

  /// Begin accepting traffic
  pub fn start(&self) -> Result<(), Error> {
    self.inner
        .channel
        .start()
        .map_err(|e| channel_error(When::None, e))?;
    self.inner.running.store(true, Ordering::Release);
    log::info!("endpoint {:?} started", self.inner.channel.local_addr().ok());
    Ok(())
  }

  /// Stop accepting traffic; [`Endpoint::poll`] yields `WouldBlock` until started again
  pub fn stop(&self) -> Result<(), Error> {
    self.inner.running.store(false, Ordering::Release);
    log::info!("endpoint {:?} stopped", self.inner.channel.local_addr().ok());
    self.inner
        .channel
        .stop()
        .map_err(|e| channel_error(When::None, e))
  }

  /// Is the endpoint accepting traffic?
  pub fn is_running(&self) -> bool {
    self.inner.running.load(Ordering::Acquire)
  }

  /// The session with a peer
  pub fn session(&self, remote: SocketAddr) -> Session {
    self.inner
        .services
        .session(remote)
        .unwrap_or_else(|| self.inner.channel.session(remote))
  }

  /// When the next timer is due, if any is pending
  pub fn next_timer_at(&self) -> Option<Millis> {
    lock(&self.inner.timers).next_at()
  }

  /// Number of timers waiting to fire
  pub fn pending_timers(&self) -> usize {
    lock(&self.inner.timers).len()
  }

  /// Send a request, yielding the exchange it starts.
  ///
  /// Wait for the response with
  /// `exchange.request().wait_for_response(..)`.
  pub fn send_request(&self, req: Req) -> Result<Arc<Exchange>, Error> {
    let when = sending(&req, req.remote());
    let session = self.session(req.remote());
    let ex = Arc::new(Exchange::new(Origin::Local, req, session.id));
    log::debug!("exchange {}: {} {} to {}",
                ex.id(),
                ex.request().code,
                ex.request().path_string(),
                ex.remote());

    self.run(when, |snap, fx| self.inner.stack.send_request(snap, fx, &ex, ex.request()))?;
    Ok(ex)
  }

  /// Send a response in an exchange a peer started
  pub fn respond(&self, exchange: &Arc<Exchange>, resp: Resp) -> Result<(), Error> {
    let when = sending(&resp, resp.remote());
    self.run(when, |snap, fx| self.inner.stack.send_response(snap, fx, exchange, resp))
  }

  /// Acknowledge the request of an exchange before responding to it
  /// (a "separate" response).
  ///
  /// Does nothing for requests that are not confirmable.
  pub fn accept(&self, exchange: &Arc<Exchange>) -> Result<(), Error> {
    let cur = exchange.current_request();
    match (cur.ty, cur.id) {
      | (Type::Con, Some(id)) => {
        self.run(sending(&cur, cur.remote()), |snap, fx| {
              self.inner
                  .stack
                  .send_empty(snap, fx, Some(exchange), EmptyMsg::ack(id, exchange.remote()))
            })
      },
      | _ => Ok(()),
    }
  }

  /// Reject the request of an exchange with a Reset
  pub fn reject(&self, exchange: &Arc<Exchange>) -> Result<(), Error> {
    let cur = exchange.current_request();
    let id = cur.id
                .ok_or_else(|| sending(&cur, cur.remote()).what(What::Invariant("received request without id")))?;
    self.run(sending(&cur, cur.remote()), |snap, fx| {
          self.inner
              .stack
              .send_empty(snap, fx, Some(exchange), EmptyMsg::reset(id, exchange.remote()))
        })
  }

  /// Stop retransmitting and give up on an exchange.
  ///
  /// Responses still arriving for it are answered with a Reset.
  pub fn cancel(&self, exchange: &Arc<Exchange>) {
    log::debug!("exchange {}: cancelled", exchange.id());
    exchange.request().cancel();
    exchange.current_request().cancel();
    exchange.set_complete();
  }

  /// Stop observing: send the request again with Observe=1 on the same token
  pub fn cancel_observe(&self, exchange: &Arc<Exchange>) -> Result<(), Error> {
    let mut req = exchange.request().follow_up();
    req.set_observe(Action::Deregister.to_uint());
    log::debug!("exchange {}: deregistering from {}", exchange.id(), exchange.remote());
    self.run(sending(&req, req.remote()), |snap, fx| {
          self.inner.stack.send_request(snap, fx, exchange, req)
        })
  }

  /// Check a peer is alive by sending it an empty CON.
  ///
  /// The peer answers with a Reset, which marks the request of the
  /// yielded exchange rejected and completes the exchange.
  pub fn ping(&self, remote: SocketAddr) -> Result<Arc<Exchange>, Error> {
    let session = self.session(remote);
    let ping = Req::from_msg(Message::blank(Type::Con, Code::EMPTY), remote);
    let ex = Arc::new(Exchange::new(Origin::Local, ping, session.id));
    self.run(When::Sending { to: remote,
                             id: None,
                             token: Default::default() },
             |snap, fx| {
               self.inner
                   .stack
                   .send_empty(snap, fx, Some(&ex), EmptyMsg::ping(remote))
             })?;
    Ok(ex)
  }

  /// Announce our capabilities to a peer with a CSM signal
  pub fn send_csm(&self, remote: SocketAddr) -> Result<(), Error> {
    let id = self.inner.services.matcher.next_id();
    self.send_signal(signal::csm(&self.config(), id), remote)
  }

  fn send_signal(&self, msg: Message, to: SocketAddr) -> Result<(), Error> {
    let bytes = self.inner
                    .services
                    .codec
                    .encode(&msg)
                    .map_err(|e| sending(&msg, to).what(What::ToBytes(e)))?;
    log::trace!("-> {} {}", to, msg_summary(&msg));
    self.apply(vec![Effect::Transmit(Addrd(Arc::new(bytes), to))])
  }

  /// Fire due timers, then pull a datagram from the channel and hand it
  /// to the executor.
  ///
  /// Yields `WouldBlock` when there was nothing to read, or when the
  /// endpoint is stopped.
  pub fn poll(&self) -> nb::Result<(), Error> {
    self.tick().map_err(nb::Error::Other)?;

    if !self.is_running() {
      return Err(nb::Error::WouldBlock);
    }

    let dgram = {
      let mut buf = lock(&self.inner.recv_buf);
      match self.inner.channel.recv(&mut buf[..]) {
        | Ok(Addrd(n, from)) => Addrd(buf[..n].to_vec(), from),
        | Err(nb::Error::WouldBlock) => return Err(nb::Error::WouldBlock),
        | Err(nb::Error::Other(e)) => {
          log::error!("failed to receive: {:?}", e);
          return Err(nb::Error::Other(channel_error(When::Polling, e)));
        },
      }
    };

    let ep = self.clone();
    self.inner.executor.execute(Box::new(move || {
                                  if let Err(e) = ep.handle_datagram(dgram.as_ref().map(|d| &d[..])) {
                                    log::error!("{}", e);
                                  }
                                }));
    Ok(())
  }

  /// Fire every timer that is due, sweep the deduplicator and drop
  /// the send queues of peers nobody is sending to
  pub fn tick(&self) -> Result<(), Error> {
    let now = self.now()?;
    let due = lock(&self.inner.timers).pop_due(now);

    let mut result = Ok(());
    for Scheduled { exchange,
                    timer,
                    generation, } in due
    {
      if exchange.is_complete() {
        continue;
      }

      let fired = self.run_at(now, When::Timer, |snap, fx| {
                        self.inner.stack.on_timer(snap, fx, &exchange, timer, generation)
                      });
      if let Err(e) = fired {
        log::error!("exchange {}: {:?} timer failed: {}", exchange.id(), timer, e);
        result = result.and(Err(e));
      }
    }

    self.inner.services.matcher.sweep(now, &self.config());
    self.evict_idle_queues();
    result
  }

  /// Number of peers with a send queue
  pub fn send_queues(&self) -> usize {
    self.inner.queues.map_ref(|qs| qs.len())
  }

  // a queue held by a sender (the map's own reference aside) is in use
  fn evict_idle_queues(&self) {
    let evicted = self.inner.queues.map_mut(|qs| {
                                      let before = qs.len();
                                      qs.retain(|_, q| Arc::strong_count(q) > 1 || !q.is_idle());
                                      before - qs.len()
                                    });
    if evicted > 0 {
      log::trace!("dropped {} idle send queues", evicted);
    }
  }

  /// Handle a datagram from a peer
  pub fn handle_datagram(&self, dgram: Addrd<&[u8]>) -> Result<(), Error> {
    let Addrd(bytes, from) = dgram;
    let msg = match self.inner.services.codec.decode(bytes) {
      | Ok(msg) => msg,
      | Err(e) => return self.malformed(bytes, from, e),
    };

    log::trace!("<- {} {}", from, msg_summary(&msg));
    let now = self.now()?;

    match msg.code.kind() {
      | CodeKind::Signal => self.on_signal(Addrd(msg, from)),
      | CodeKind::Request => self.on_request(now, Addrd(msg, from)),
      | CodeKind::Response => self.on_response(now, Addrd(msg, from)),
      | CodeKind::Empty => self.on_empty(now, Addrd(msg, from)),
    }
  }

  fn malformed(&self, bytes: &[u8], from: SocketAddr, e: MessageParseError) -> Result<(), Error> {
    match Header::peek(bytes) {
      | Some(h) if h.code.kind() == CodeKind::Request && matches!(h.ty, Type::Con | Type::Non) => {
        log::debug!("malformed request {} from {} ({}), resetting", h.id, from, e);
        self.run(When::Receiving { from }, |snap, fx| {
              self.inner
                  .stack
                  .send_empty(snap, fx, None, EmptyMsg::reset(h.id, from))
            })
      },
      | Some(h) => {
        log::debug!("dropping malformed {:?} {} {} from {} ({})", h.ty, h.code, h.id, from, e);
        Ok(())
      },
      | None => {
        log::debug!("dropping {} bytes from {} that are not CoAP ({})", bytes.len(), from, e);
        Ok(())
      },
    }
  }

  fn on_signal(&self, msg: Addrd<Message>) -> Result<(), Error> {
    let from = msg.addr();
    let code = msg.data().code;
    let out = match signal::handle(&self.inner.services, &self.inner.channel, msg) {
      | signal::Handled::Done => Ok(()),
      | signal::Handled::Reply(reply) => self.send_signal(reply, from),
      | signal::Handled::Abort(abort) => {
        let sent = self.send_signal(abort, from);
        self.inner.channel.abort(&self.session(from));
        self.inner.services.forget_session(from);
        self.forget_queue(from);
        sent
      },
    };

    if code == Code::RELEASE || code == Code::ABORT {
      self.forget_queue(from);
    }

    out
  }

  fn forget_queue(&self, remote: SocketAddr) {
    self.inner.queues.map_mut(|qs| qs.remove(&remote));
  }

  fn on_request(&self, now: Millis, msg: Addrd<Message>) -> Result<(), Error> {
    let from = msg.addr();
    let req = Req::received(msg);
    let session = self.session(from);

    let matched = self.inner.services.matcher.receive_request(&req, session.id, now);
    if let RequestMatch::Duplicate(ex) = &matched {
      log::debug!("exchange {}: {} from {} is a duplicate", ex.id(), req.id.unwrap_or_default(), from);
      req.state().set_duplicate();
    }

    let ex = matched.exchange().clone();
    let req = match self.run_at(now, When::Receiving { from }, |snap, fx| {
                          self.inner.stack.receive_request(snap, fx, &ex, req)
                        })? {
      | Some(req) => req,
      | None => return Ok(()),
    };

    match self.inner.deliverer.deliver_request(&ex, &req) {
      | Some(resp) => self.respond(&ex, resp),
      | None => Ok(()),
    }
  }

  fn on_response(&self, now: Millis, msg: Addrd<Message>) -> Result<(), Error> {
    let from = msg.addr();
    let resp = Resp::received(msg);
    let session = self.session(from);

    let ex = match self.inner.services.matcher.receive_response(&resp, session.id, now) {
      | ResponseMatch::Matched(ex) => ex,
      | ResponseMatch::Duplicate(ex) => {
        resp.state().set_duplicate();
        ex
      },
      | ResponseMatch::Unmatched if resp.ty == Type::Ack => {
        log::debug!("dropping {} from {}, it answers nothing we sent", msg_summary(&resp), from);
        return Ok(());
      },
      | ResponseMatch::Unmatched => {
        log::debug!("rejecting {} from {}, it answers nothing we sent", msg_summary(&resp), from);
        let id = resp.id.unwrap_or_default();
        return self.run_at(now, When::Receiving { from }, |snap, fx| {
                     self.inner
                         .stack
                         .send_empty(snap, fx, None, EmptyMsg::reset(id, from))
                   });
      },
    };

    let resp = match self.run_at(now, When::Receiving { from }, |snap, fx| {
                           self.inner.stack.receive_response(snap, fx, &ex, resp)
                         })? {
      | Some(resp) => resp,
      | None => return Ok(()),
    };

    ex.set_response(resp.clone());
    ex.request().state().respond(resp.clone());
    self.inner.deliverer.deliver_response(&ex, &resp);

    if resp.is_last() {
      ex.set_complete();
    }

    Ok(())
  }

  fn on_empty(&self, now: Millis, msg: Addrd<Message>) -> Result<(), Error> {
    let from = msg.addr();
    let msg = EmptyMsg::received(msg);

    if matches!(msg.ty, Type::Con | Type::Non) {
      log::debug!("answering ping {} from {} with a reset", msg.id.unwrap_or_default(), from);
      let id = msg.id.unwrap_or_default();
      return self.run_at(now, When::Receiving { from }, |snap, fx| {
                   self.inner
                       .stack
                       .send_empty(snap, fx, None, EmptyMsg::reset(id, from))
                 });
    }

    let session = self.session(from);
    let ex = match self.inner.services.matcher.receive_empty(&msg, session.id) {
      | Some(ex) => ex,
      | None => {
        log::debug!("dropping {:?} {} from {}, it answers nothing we sent",
                    msg.ty,
                    msg.id.unwrap_or_default(),
                    from);
        return Ok(());
      },
    };

    let handled = self.run_at(now, When::Receiving { from }, |snap, fx| {
                        self.inner.stack.receive_empty(snap, fx, &ex, msg)
                      })?;

    let pinged = ex.origin() == Origin::Local && ex.request().is_empty();
    if handled.is_some() && pinged {
      ex.set_complete();
    }

    Ok(())
  }

  /// Call into the stack with a fresh snapshot, then apply its effects
  fn run<R>(&self, when: When, f: impl FnOnce(&Snapshot, &mut Effects) -> Result<R, Error>) -> Result<R, Error> {
    let now = self.now().map_err(|e| when.what(e.what))?;
    self.run_at(now, when, f)
  }

  fn run_at<R>(&self,
               now: Millis,
               when: When,
               f: impl FnOnce(&Snapshot, &mut Effects) -> Result<R, Error>)
               -> Result<R, Error> {
    let snap = Snapshot::new(now, self.config(), &self.inner.services);
    let mut effects = vec![];
    let out = f(&snap, &mut effects);

    if let Err(e) = &out {
      log::debug!("{} ({:?})", e, when);
    }

    let applied = self.apply(effects);
    let out = out?;
    applied.map(|_| out)
  }

  fn queue(&self, to: SocketAddr) -> Arc<SendQueue> {
    match self.inner.queues.map_ref(|qs| qs.get(&to).cloned()) {
      | Some(q) => q,
      | None => self.inner.queues.map_mut(|qs| qs.entry(to).or_default().clone()),
    }
  }

  fn apply(&self, effects: Effects) -> Result<(), Error> {
    effects.into_iter().fold(Ok(()), |result, effect| match effect {
                         | Effect::Transmit(Addrd(bytes, to)) => {
                           let session = self.session(to);
                           result.and(self.queue(to).send(&self.inner.channel, &session, bytes))
                         },
                         | Effect::Schedule { exchange,
                                              timer,
                                              generation,
                                              at, } => {
                           lock(&self.inner.timers).schedule(at,
                                                             Scheduled { exchange,
                                                                         timer,
                                                                         generation });
                           result
                         },
                       })
  }
}
