use core::fmt::Debug;
use core::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;

use croak_msg::no_repeat::{BLOCK1, BLOCK2, OBSERVE, SIZE1, SIZE2};
use croak_msg::{Block, Code, ContentFormat, Message};

use super::{schedule, Effects, Layer, Snapshot, Timer};
use crate::error::{Error, What, When};
use crate::exchange::{Exchange, Origin};
use crate::matcher::KeyUri;
use crate::req::Req;
use crate::resp::{code, EmptyMsg, Resp};

/// Progress of one block-wise transfer, in either direction
#[derive(Debug, Clone, Default)]
pub(crate) struct BlockStatus {
  /// Number of the block last sent or received
  pub(crate) num: u32,
  pub(crate) szx: u8,
  /// The body sent so far (receiving), or the whole body (sending)
  pub(crate) body: Vec<u8>,
  pub(crate) content_format: Option<ContentFormat>,
  /// Observe option of the notification being transferred
  pub(crate) observe: Option<u32>,
  /// All blocks received, waiting for the response to echo Block1
  pub(crate) complete: bool,
}

/// Which messages a [`Blockwise`] layer is responsible for
pub trait Scope: Debug + Default + Copy + Send + Sync + 'static {
  /// Does the layer handle this message?
  fn applies(msg: &Message) -> bool;
}

/// Messages without the OSCORE option
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Plain;

impl Scope for Plain {
  fn applies(msg: &Message) -> bool {
    !msg.is_oscore()
  }
}

/// Messages protected with OSCORE.
///
/// These are split outside of the OSCORE layer, so that each block is
/// protected on its own.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Secure;

impl Scope for Secure {
  fn applies(msg: &Message) -> bool {
    msg.is_oscore()
  }
}

/// Block-wise transfers (RFC 7959).
///
/// As a client:
/// - request bodies larger than the peer accepts are sent in Block1
///   blocks, continuing on each 2.31 Continue and shrinking the block
///   size when the server asks for smaller blocks
/// - Block2 responses are reassembled by requesting the remaining
///   blocks, and delivered as one response once complete
///
/// As a server:
/// - Block1 requests are reassembled and delivered as one request;
///   a block out of order or with a different Content-Format is answered
///   with 4.08, a body larger than `max_resource_body_size` with 4.13
/// - responses larger than the peer accepts are sent in Block2 blocks;
///   the peer fetches the rest, and a block past the end is answered with 4.02
/// - notifications only carry their first block
///
/// Transfers that stall for `status_lifetime` are abandoned.
#[derive(Debug, Clone, Copy)]
pub struct Blockwise<L, S = Plain> {
  inner: L,
  scope: PhantomData<S>,
}

/// Block-wise transfers of OSCORE-protected messages
pub type SecureBlockwise<L> = Blockwise<L, Secure>;

impl<L, S> Blockwise<L, S> {
  /// Wrap a layer
  pub fn new(inner: L) -> Self {
    Self { inner,
           scope: PhantomData }
  }
}

fn unit(szx: u8) -> usize {
  usize::from(Block::size_of(szx))
}

/// Bytes in one block: the block size, or for BERT as many
/// 1024-byte units as fit in one message
fn block_len(szx: u8, max_message_size: usize) -> usize {
  if szx == Block::BERT_SZX {
    (max_message_size / unit(szx)).max(1) * unit(szx)
  } else {
    unit(szx)
  }
}

/// Block `num` of a body, and whether more follow.
///
/// `None` when the block starts past the end of the body.
fn slice(body: &[u8], szx: u8, num: u32, len: usize) -> Option<(&[u8], bool)> {
  let start = num as usize * unit(szx);
  if start > body.len() || (start == body.len() && start > 0) {
    return None;
  }

  let end = start.saturating_add(len).min(body.len());
  Some((&body[start..end], end < body.len()))
}

fn preferred_szx(snap: &Snapshot, remote: SocketAddr) -> u8 {
  if snap.session(remote).bert() {
    Block::BERT_SZX
  } else {
    Block::szx_for(snap.config.block.default_block_size)
  }
}

/// Is the payload of a block that is not the last one the wrong size?
fn short_block(b: Block, payload: usize) -> bool {
  if b.is_bert() {
    payload == 0 || payload % unit(b.szx()) != 0
  } else {
    payload != unit(b.szx())
  }
}

impl<L: Layer, S: Scope> Blockwise<L, S> {
  /// (Re)start the timer that abandons a stalled transfer
  fn touch(snap: &Snapshot, effects: &mut Effects, exchange: &Arc<Exchange>) {
    let at = snap.after(snap.config.block.status_lifetime);
    let generation = schedule(effects, exchange, Timer::BlockCleanup, at);
    exchange.update(|s| s.block_cleanup = Some(generation));
  }

  /// Stop routing further blocks of a transfer to this exchange
  fn forget_transfer(snap: &Snapshot, exchange: &Arc<Exchange>) {
    let key = exchange.update(|s| {
                        s.block_cleanup = None;
                        s.key_uri.take()
                      });

    if let Some(key) = key {
      snap.services.matcher.remove_ongoing(exchange, key);
    }
  }

  fn request_block(template: &Req, status: &BlockStatus, max_message_size: usize) -> Option<Req> {
    let (payload, more) = slice(&status.body,
                                status.szx,
                                status.num,
                                block_len(status.szx, max_message_size))?;

    let mut block = template.follow_up();
    block.set_payload(payload.to_vec());
    block.set_block1(Block::from_szx(status.szx, status.num, more));
    if status.num == 0 {
      block.set_size1(status.body.len() as u32);
    }

    Some(block)
  }

  /// Answer a Block1 request with an error and end the transfer
  fn reject(&self,
            snap: &Snapshot,
            effects: &mut Effects,
            exchange: &Arc<Exchange>,
            req: &Req,
            code: Code,
            size1: Option<usize>)
            -> Result<Option<Req>, Error> {
    log::debug!("exchange {}: rejecting block-wise request from {} with {}",
                exchange.id(),
                req.remote(),
                code);

    Self::forget_transfer(snap, exchange);
    exchange.update(|s| s.block1 = None);

    let mut resp = Resp::for_request(req, code);
    if let Some(n) = size1 {
      resp.set_size1(n as u32);
    }

    self.inner.send_response(snap, effects, exchange, resp)?;
    Ok(None)
  }

  fn receive_block1(&self,
                    snap: &Snapshot,
                    effects: &mut Effects,
                    exchange: &Arc<Exchange>,
                    req: Req,
                    b: Block)
                    -> Result<Option<Req>, Error> {
    let max_body = snap.config.block.max_resource_body_size;

    let mut status = if b.num() == 0 {
      if req.size1().map(|n| n as usize > max_body).unwrap_or(false) {
        return self.reject(snap,
                           effects,
                           exchange,
                           &req,
                           code::REQUEST_ENTITY_TOO_LARGE,
                           Some(max_body));
      }

      let key = KeyUri::of(&req, req.remote());
      exchange.update(|s| s.key_uri = Some(key));
      BlockStatus { szx: b.szx(),
                    content_format: req.content_format(),
                    ..Default::default() }
    } else {
      match exchange.read(|s| s.block1.clone()) {
        | Some(st) if !st.complete && b.offset() == st.body.len() => st,
        | _ => {
          log::debug!("exchange {}: Block1 {} from {} is out of order",
                      exchange.id(),
                      b.num(),
                      req.remote());
          return self.reject(snap,
                             effects,
                             exchange,
                             &req,
                             code::REQUEST_ENTITY_INCOMPLETE,
                             None);
        },
      }
    };

    if req.content_format() != status.content_format {
      return self.reject(snap,
                         effects,
                         exchange,
                         &req,
                         code::REQUEST_ENTITY_INCOMPLETE,
                         None);
    }

    if b.more() && short_block(b, req.payload.len()) {
      return self.reject(snap, effects, exchange, &req, code::BAD_REQUEST, None);
    }

    status.body.extend_from_slice(req.payload.as_bytes());
    if status.body.len() > max_body {
      return self.reject(snap,
                         effects,
                         exchange,
                         &req,
                         code::REQUEST_ENTITY_TOO_LARGE,
                         Some(max_body));
    }

    status.num = b.num();
    status.szx = b.szx();

    if b.more() {
      let szx = b.szx().min(preferred_szx(snap, req.remote()));
      exchange.update(|s| s.block1 = Some(status));
      Self::touch(snap, effects, exchange);

      let mut resp = Resp::for_request(&req, code::CONTINUE);
      resp.set_block1(Block::from_szx(szx, b.num(), true));
      resp.set_last(false);
      self.inner.send_response(snap, effects, exchange, resp)?;
      return Ok(None);
    }

    log::debug!("exchange {}: received {} byte body in {} blocks",
                exchange.id(),
                status.body.len(),
                b.num() + 1);

    let mut whole = req;
    whole.set_payload(core::mem::take(&mut status.body));
    whole.remove(BLOCK1);
    whole.remove(SIZE1);

    status.complete = true;
    exchange.update(|s| s.block1 = Some(status));
    exchange.set_request(whole.clone());
    Self::forget_transfer(snap, exchange);

    Ok(Some(whole))
  }

  /// Serve a further block of a response we are sending block-wise.
  ///
  /// Yields the request back when there is no such transfer; the
  /// application then answers it (random access).
  fn serve_block2(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  req: Req,
                  b: Block)
                  -> Result<Option<Req>, Error> {
    let (status, whole) = match (exchange.read(|s| s.block2.clone()), exchange.response()) {
      | (Some(st), Some(whole)) => (st, whole),
      | _ => return Ok(Some(req)),
    };

    let szx = b.szx().min(status.szx);
    let num = (b.offset() / unit(szx)) as u32;
    let len = block_len(szx, snap.max_message_size(req.remote()));

    let (payload, more) = match slice(&status.body, szx, num, len) {
      | Some(s) => s,
      | None => {
        let mut resp = Resp::for_request(&req, code::BAD_OPTION);
        resp.set_last(exchange.relation().is_none());
        self.inner.send_response(snap, effects, exchange, resp)?;
        return Ok(None);
      },
    };

    let mut block = whole.detached();
    block.unset_type();
    block.token = req.token;
    block.remove(OBSERVE);
    block.remove(SIZE2);
    block.set_payload(payload.to_vec());
    block.set_block2(Block::from_szx(szx, num, more));
    block.set_last(!more && whole.is_last());

    if more {
      Self::touch(snap, effects, exchange);
    } else {
      exchange.update(|s| s.block2 = None);
      Self::forget_transfer(snap, exchange);
    }

    self.inner.send_response(snap, effects, exchange, block)?;
    Ok(None)
  }

  fn receive_block2(&self,
                    snap: &Snapshot,
                    effects: &mut Effects,
                    exchange: &Arc<Exchange>,
                    resp: Resp,
                    b: Block)
                    -> Result<Option<Resp>, Error> {
    let abandon = |why: &str| {
      log::warn!("exchange {}: abandoning Block2 transfer from {}: {}",
                 exchange.id(),
                 resp.remote(),
                 why);
      exchange.update(|s| {
                s.block2 = None;
                s.block_cleanup = None;
              });
      // an observation outlives a broken notification transfer
      if exchange.read(|s| s.orderer.is_none()) {
        exchange.request().cancel();
        exchange.set_complete();
      }
    };

    let mut status = if b.num() == 0 {
      BlockStatus { szx: b.szx(),
                    content_format: resp.content_format(),
                    observe: resp.observe(),
                    ..Default::default() }
    } else {
      match exchange.read(|s| s.block2.clone()) {
        | Some(st) if b.offset() == st.body.len() => st,
        | _ => {
          abandon("block out of order");
          return Ok(None);
        },
      }
    };

    if b.more() && short_block(b, resp.payload.len()) {
      abandon("block size does not match payload length");
      return Ok(None);
    }

    status.body.extend_from_slice(resp.payload.as_bytes());
    if status.body.len() > snap.config.block.max_resource_body_size {
      abandon("body too large");
      if !exchange.is_complete() {
        exchange.request().cancel();
        exchange.set_complete();
      }
      return Ok(None);
    }

    if b.more() {
      status.szx = b.szx();
      status.num = (status.body.len() / unit(b.szx())) as u32;

      let mut next = exchange.request().follow_up();
      next.remove(OBSERVE);
      next.remove(BLOCK1);
      next.remove(SIZE1);
      next.set_block2(Block::from_szx(status.szx, status.num, false));

      exchange.update(|s| s.block2 = Some(status));
      Self::touch(snap, effects, exchange);
      self.inner.send_request(snap, effects, exchange, next)?;
      return Ok(None);
    }

    let mut whole = resp;
    whole.set_payload(core::mem::take(&mut status.body));
    whole.remove(BLOCK2);
    if let Some(n) = status.observe {
      whole.set_observe(n);
    }

    exchange.update(|s| {
              s.block2 = None;
              s.block_cleanup = None;
            });
    Ok(Some(whole))
  }

  /// Continue sending a request body block-wise after the server's answer
  /// to a block, yielding the response when the transfer is over.
  fn continue_block1(&self,
                     snap: &Snapshot,
                     effects: &mut Effects,
                     exchange: &Arc<Exchange>,
                     resp: Resp)
                     -> Result<Option<Resp>, Error> {
    let mut status = match exchange.read(|s| s.block1.clone()) {
      | Some(st) => st,
      | None => return Ok(Some(resp)),
    };

    match resp.block1() {
      | Some(b) if resp.code == code::CONTINUE => {
        if b.num() != status.num {
          log::warn!("exchange {}: server continued Block1 {} but we sent {}",
                     exchange.id(),
                     b.num(),
                     status.num);
          return Ok(None);
        }

        let limit = snap.max_message_size(exchange.remote());
        let sent_end = status.num as usize * unit(status.szx) + block_len(status.szx, limit);
        if b.szx() < status.szx {
          log::debug!("exchange {}: server asked for {} byte blocks",
                      exchange.id(),
                      unit(b.szx()));
          status.szx = b.szx();
        }
        status.num = (sent_end / unit(status.szx)) as u32;

        match Self::request_block(&exchange.request(), &status, limit) {
          | Some(next) => {
            exchange.update(|s| s.block1 = Some(status));
            Self::touch(snap, effects, exchange);
            self.inner.send_request(snap, effects, exchange, next)?;
            Ok(None)
          },
          | None => {
            log::warn!("exchange {}: server wants more blocks than the body has",
                       exchange.id());
            exchange.update(|s| s.block1 = None);
            Ok(Some(resp))
          },
        }
      },
      | _ => {
        exchange.update(|s| {
                  s.block1 = None;
                  s.block_cleanup = None;
                });
        Ok(Some(resp))
      },
    }
  }
}

impl<L: Layer, S: Scope> Layer for Blockwise<L, S> {
  fn send_request(&self,
                  snap: &Snapshot,
                  effects: &mut Effects,
                  exchange: &Arc<Exchange>,
                  req: Req)
                  -> Result<(), Error> {
    let limit = snap.max_message_size(req.remote());
    if !S::applies(&req)
       || req.block1().is_some()
       || req.block2().is_some()
       || req.payload.len() <= limit
    {
      return self.inner.send_request(snap, effects, exchange, req);
    }

    let status = BlockStatus { szx: preferred_szx(snap, req.remote()),
                               body: req.payload.0.clone(),
                               content_format: req.content_format(),
                               ..Default::default() };

    log::debug!("exchange {}: sending {} byte body in blocks of {}",
                exchange.id(),
                status.body.len(),
                block_len(status.szx, limit));

    let first = Self::request_block(&req, &status, limit).ok_or_else(|| {
                  When::Sending { to: req.remote(),
                                  id: req.id,
                                  token: req.token }.what(What::Invariant("first block of a body is empty"))
                })?;

    exchange.update(|s| s.block1 = Some(status));
    Self::touch(snap, effects, exchange);
    self.inner.send_request(snap, effects, exchange, first)
  }

  fn send_response(&self,
                   snap: &Snapshot,
                   effects: &mut Effects,
                   exchange: &Arc<Exchange>,
                   mut resp: Resp)
                   -> Result<(), Error> {
    if !S::applies(&resp) {
      return self.inner.send_response(snap, effects, exchange, resp);
    }

    if let Some(st) = exchange.read(|s| s.block1.clone()).filter(|st| st.complete) {
      if resp.block1().is_none() {
        resp.set_block1(Block::from_szx(st.szx, st.num, false));
      }
      exchange.update(|s| s.block1 = None);
    }

    let requested = exchange.current_request().block2();
    let limit = snap.max_message_size(resp.remote());
    if resp.block2().is_some() || (requested.is_none() && resp.payload.len() <= limit) {
      return self.inner.send_response(snap, effects, exchange, resp);
    }

    let preferred = preferred_szx(snap, resp.remote());
    let notification = resp.observe().is_some();
    let szx = requested.map(|b| b.szx().min(preferred)).unwrap_or(preferred);
    let offset = match requested {
      | Some(b) if !notification => b.offset(),
      | _ => 0,
    };
    let num = (offset / unit(szx)) as u32;

    let body = resp.payload.0.clone();
    let (payload, more) = match slice(&body, szx, num, block_len(szx, limit)) {
      | Some((p, more)) => (p.to_vec(), more),
      | None => {
        log::debug!("exchange {}: Block2 {} is past the end of a {} byte body",
                    exchange.id(),
                    num,
                    body.len());
        let mut err = Resp::for_request(&exchange.current_request(), code::BAD_OPTION);
        err.set_last(resp.is_last());
        return self.inner.send_response(snap, effects, exchange, err);
      },
    };

    exchange.set_response(resp.clone());

    let mut block = resp;
    block.set_payload(payload);
    block.set_block2(Block::from_szx(szx, num, more));

    if more {
      if num == 0 {
        block.set_size2(body.len() as u32);
      }
      block.set_last(false);

      let key = KeyUri::of(&exchange.request(), exchange.remote());
      snap.services.matcher.register_ongoing(exchange, key);
      exchange.update(|s| {
                s.key_uri = Some(key);
                s.block2 = Some(BlockStatus { num,
                                              szx,
                                              content_format: block.content_format(),
                                              observe: block.observe(),
                                              body,
                                              complete: false });
              });
      Self::touch(snap, effects, exchange);
    }

    self.inner.send_response(snap, effects, exchange, block)
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
      | Some(req) if S::applies(&req) => req,
      | other => return Ok(other),
    };

    let req = match req.block1() {
      | Some(b) => match self.receive_block1(snap, effects, exchange, req, b)? {
        | Some(req) => req,
        | None => return Ok(None),
      },
      | None => req,
    };

    match req.block2() {
      | Some(b) if b.num() > 0 => self.serve_block2(snap, effects, exchange, req, b),
      | _ => Ok(Some(req)),
    }
  }

  fn receive_response(&self,
                      snap: &Snapshot,
                      effects: &mut Effects,
                      exchange: &Arc<Exchange>,
                      resp: Resp)
                      -> Result<Option<Resp>, Error> {
    let resp = match self.inner.receive_response(snap, effects, exchange, resp)? {
      | Some(resp) if S::applies(&resp) => resp,
      | other => return Ok(other),
    };

    let resp = match self.continue_block1(snap, effects, exchange, resp)? {
      | Some(resp) => resp,
      | None => return Ok(None),
    };

    match resp.block2() {
      | Some(b) => self.receive_block2(snap, effects, exchange, resp, b),
      | None => Ok(Some(resp)),
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
    if timer != Timer::BlockCleanup {
      return self.inner.on_timer(snap, effects, exchange, timer, generation);
    }

    if exchange.read(|s| s.block_cleanup) != Some(generation) {
      return Ok(());
    }

    log::debug!("exchange {}: block-wise transfer with {} stalled, forgetting it",
                exchange.id(),
                exchange.remote());

    Self::forget_transfer(snap, exchange);
    exchange.update(|s| {
              s.block1 = None;
              s.block2 = None;
            });

    let observing = exchange.relation().is_some() || exchange.read(|s| s.orderer.is_some());
    match (exchange.origin(), observing) {
      | (_, true) => (),
      | (Origin::Local, false) => exchange.set_timed_out(),
      | (Origin::Remote, false) => {
        exchange.set_complete();
      },
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use croak_msg::{Id, Token as MsgToken, Type};

  use super::*;
  use crate::layer::{Reliability, Token, Wire};
  use crate::test::{self, Harness};

  type Stack = Blockwise<Token<Reliability<Wire>>>;

  fn layer() -> Stack {
    Blockwise::new(Token::new(Reliability::new(Wire)))
  }

  fn body(len: usize) -> Vec<u8> {
    (0..len).map(|n| (n % 251) as u8).collect()
  }

  fn first_sent(fx: &Effects) -> Message {
    test::transmitted(fx).remove(0).unwrap()
  }

  fn put_block(num: u32, more: bool, payload: &[u8], cf: Option<ContentFormat>) -> Message {
    let mut msg = Message::new(Type::Con,
                               Code::PUT,
                               Id(100 + num as u16),
                               MsgToken::opaque(b"put"));
    msg.set_path("firmware");
    msg.set_block1(Block::new(512, num, more));
    if let Some(cf) = cf {
      msg.set_content_format(cf);
    }
    msg.payload.0 = payload.to_vec();
    msg
  }

  #[test]
  fn slicing() {
    let b = body(1300);
    assert_eq!(slice(&b, 5, 0, 512).map(|(p, m)| (p.len(), m)), Some((512, true)));
    assert_eq!(slice(&b, 5, 2, 512).map(|(p, m)| (p.len(), m)), Some((276, false)));
    assert_eq!(slice(&b, 5, 3, 512), None);
    assert_eq!(slice(&[], 5, 0, 512).map(|(p, m)| (p.len(), m)), Some((0, false)));
    assert_eq!(block_len(Block::BERT_SZX, 4000), 3072);
  }

  #[test]
  fn large_put_goes_in_block1_blocks() {
    let h = Harness::new();
    let mut req = Req::put(test::remote(), "firmware");
    req.set_payload(body(10 * 1024));
    let ex = h.local_exchange(req);

    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();

    let mut sent = vec![];
    loop {
      let msg = first_sent(&fx);
      let b = msg.block1().unwrap();
      sent.push(msg.clone());
      if !b.more() {
        break;
      }

      let mut ack = Message::new(Type::Ack, code::CONTINUE, msg.id.unwrap(), msg.token);
      ack.set_block1(Block::from_szx(b.szx(), b.num(), true));
      let (ex, resp) = h.inbound_response(ack).unwrap();

      fx = vec![];
      assert!(layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
                     .unwrap()
                     .is_none());
    }

    assert_eq!(sent.len(), 20);
    assert_eq!(sent[0].size1(), Some(10 * 1024));
    assert!(sent.iter().all(|m| m.payload.len() == 512));
    let all = sent.iter()
                  .flat_map(|m| m.payload.0.clone())
                  .collect::<Vec<_>>();
    assert_eq!(all, body(10 * 1024));
  }

  #[test]
  fn server_may_shrink_blocks() {
    let h = Harness::new();
    let mut req = Req::put(test::remote(), "firmware");
    req.set_payload(body(2048));
    let ex = h.local_exchange(req);

    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();
    let first = first_sent(&fx);

    let mut ack = Message::new(Type::Ack, code::CONTINUE, first.id.unwrap(), first.token);
    ack.set_block1(Block::new(256, 0, true));
    let (ex, resp) = h.inbound_response(ack).unwrap();

    let mut fx = vec![];
    layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
           .unwrap();

    let b = first_sent(&fx).block1().unwrap();
    assert_eq!((b.num(), b.size()), (2, 256));
  }

  #[test]
  fn block1_reassembly() {
    let h = Harness::new();
    let body = body(512 * 3 + 256);
    let chunks = body.chunks(512).collect::<Vec<_>>();

    let mut whole = None;
    for (num, chunk) in chunks.iter().enumerate() {
      let more = num + 1 < chunks.len();
      let (ex, req) = h.inbound_request(put_block(num as u32, more, chunk, None));

      let mut fx = vec![];
      let out = layer().receive_request(&h.snapshot(), &mut fx, &ex, req)
                       .unwrap();

      if more {
        assert!(out.is_none());
        let resp = first_sent(&fx);
        assert_eq!(resp.code, code::CONTINUE);
        assert_eq!(resp.ty, Type::Ack);
        assert_eq!(resp.block1().map(|b| b.num()), Some(num as u32));
      } else {
        whole = out.map(|req| (ex, req));
      }
    }

    let (ex, req) = whole.unwrap();
    assert_eq!(req.payload.0, body);
    assert!(req.block1().is_none());

    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, Resp::for_request(&req, code::CHANGED))
           .unwrap();
    let resp = first_sent(&fx);
    assert_eq!(resp.code, code::CHANGED);
    assert_eq!(resp.block1().map(|b| (b.num(), b.more())), Some((3, false)));
  }

  #[test]
  fn block1_out_of_order() {
    let h = Harness::new();
    let (ex, req) = h.inbound_request(put_block(0, true, &body(512), None));
    layer().receive_request(&h.snapshot(), &mut vec![], &ex, req)
           .unwrap();

    let (ex, req) = h.inbound_request(put_block(2, true, &body(512), None));
    let mut fx = vec![];
    assert!(layer().receive_request(&h.snapshot(), &mut fx, &ex, req)
                   .unwrap()
                   .is_none());
    assert_eq!(first_sent(&fx).code, code::REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn block1_content_format_changes() {
    let h = Harness::new();
    let (ex, req) = h.inbound_request(put_block(0, true, &body(512), Some(ContentFormat::Text)));
    layer().receive_request(&h.snapshot(), &mut vec![], &ex, req)
           .unwrap();

    let (ex, req) = h.inbound_request(put_block(1, false, &body(10), Some(ContentFormat::Json)));
    let mut fx = vec![];
    assert!(layer().receive_request(&h.snapshot(), &mut fx, &ex, req)
                   .unwrap()
                   .is_none());
    assert_eq!(first_sent(&fx).code, code::REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn block1_too_large() {
    let h = Harness::new();
    let mut msg = put_block(0, true, &body(512), None);
    msg.set_size1(1_000_000);
    let (ex, req) = h.inbound_request(msg);

    let mut fx = vec![];
    layer().receive_request(&h.snapshot(), &mut fx, &ex, req)
           .unwrap();
    let resp = first_sent(&fx);
    assert_eq!(resp.code, code::REQUEST_ENTITY_TOO_LARGE);
    assert_eq!(resp.size1(), Some(16 * 1024));
  }

  #[test]
  fn large_response_goes_in_block2_blocks() {
    let h = Harness::new();
    let get = Message::new(Type::Con, Code::GET, Id(1), MsgToken::opaque(b"get"));
    let (ex, req) = h.inbound_request(get);
    let req = layer().receive_request(&h.snapshot(), &mut vec![], &ex, req)
                     .unwrap()
                     .unwrap();

    let mut resp = Resp::for_request(&req, code::CONTENT);
    resp.set_payload(body(1300));
    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, resp)
           .unwrap();

    let first = first_sent(&fx);
    assert_eq!(first.block2().map(|b| (b.num(), b.more())), Some((0, true)));
    assert_eq!(first.size2(), Some(1300));
    assert!(!ex.is_complete());

    let mut got = first.payload.0.clone();
    for num in 1..3u32 {
      let mut next = Message::new(Type::Con, Code::GET, Id(1 + num as u16), MsgToken::opaque(b"get"));
      next.set_block2(Block::new(512, num, false));
      let (cont, req) = h.inbound_request(next);
      assert_eq!(cont.id(), ex.id());

      let mut fx = vec![];
      assert!(layer().receive_request(&h.snapshot(), &mut fx, &cont, req)
                     .unwrap()
                     .is_none());
      let block = first_sent(&fx);
      assert_eq!(block.ty, Type::Ack);
      got.extend(block.payload.0);
    }

    assert_eq!(got, body(1300));
    assert!(ex.is_complete());
  }

  #[test]
  fn block2_past_the_end() {
    let h = Harness::new();
    let mut get = Message::new(Type::Con, Code::GET, Id(1), MsgToken::opaque(b"get"));
    get.set_block2(Block::new(512, 9, false));
    let (ex, req) = h.inbound_request(get);

    let mut resp = Resp::for_request(&req, code::CONTENT);
    resp.set_payload(body(1300));
    let mut fx = vec![];
    layer().send_response(&h.snapshot(), &mut fx, &ex, resp)
           .unwrap();
    assert_eq!(first_sent(&fx).code, code::BAD_OPTION);
  }

  #[test]
  fn block2_reassembly() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "big"));
    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();

    let body = body(1300);
    let mut delivered = None;
    for num in 0..3u32 {
      let sent = first_sent(&fx);
      let (payload, more) = slice(&body, 5, num, 512).unwrap();

      let mut resp = Message::new(Type::Ack, code::CONTENT, sent.id.unwrap(), sent.token);
      resp.set_block2(Block::new(512, num, more));
      resp.payload.0 = payload.to_vec();
      let (ex, resp) = h.inbound_response(resp).unwrap();

      fx = vec![];
      delivered = layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
                         .unwrap();
      if more {
        assert!(delivered.is_none());
        assert_eq!(first_sent(&fx).block2().map(|b| b.num()), Some(num + 1));
      }
    }

    let resp = delivered.unwrap();
    assert_eq!(resp.payload.0, body);
    assert!(resp.block2().is_none());
  }

  #[test]
  fn block2_size_mismatch_abandons() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "big"));
    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();
    let sent = first_sent(&fx);

    let mut resp = Message::new(Type::Ack, code::CONTENT, sent.id.unwrap(), sent.token);
    resp.set_block2(Block::new(512, 0, true));
    resp.payload.0 = body(100);
    let (ex, resp) = h.inbound_response(resp).unwrap();

    let mut fx = vec![];
    assert!(layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
                   .unwrap()
                   .is_none());
    assert!(test::transmitted(&fx).is_empty());
    assert!(ex.read(|s| s.block2.is_none()));
    assert!(ex.is_complete());
    assert!(ex.request().state().is_cancelled());
    assert!(ex.request().wait_for_response(Duration::from_millis(0)).is_none());
  }

  #[test]
  fn block2_out_of_order_abandons() {
    let h = Harness::new();
    let ex = h.local_exchange(Req::get(test::remote(), "big"));
    let mut fx = vec![];
    layer().send_request(&h.snapshot(), &mut fx, &ex, ex.request())
           .unwrap();

    let body = body(2048);
    let sent = first_sent(&fx);
    let mut resp = Message::new(Type::Ack, code::CONTENT, sent.id.unwrap(), sent.token);
    resp.set_block2(Block::new(512, 0, true));
    resp.payload.0 = body[..512].to_vec();
    let (ex, resp) = h.inbound_response(resp).unwrap();
    let mut fx = vec![];
    layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
           .unwrap();
    assert!(!ex.is_complete());

    let sent = first_sent(&fx);
    assert_eq!(sent.block2().map(|b| b.num()), Some(1));
    let mut resp = Message::new(Type::Ack, code::CONTENT, sent.id.unwrap(), sent.token);
    resp.set_block2(Block::new(512, 2, true));
    resp.payload.0 = body[1024..1536].to_vec();
    let (ex, resp) = h.inbound_response(resp).unwrap();

    let mut fx = vec![];
    assert!(layer().receive_response(&h.snapshot(), &mut fx, &ex, resp)
                   .unwrap()
                   .is_none());
    assert!(test::transmitted(&fx).is_empty());
    assert!(ex.read(|s| s.block2.is_none() && s.block_cleanup.is_none()));
    assert!(ex.is_complete());
    assert!(ex.request().state().is_cancelled());
  }

  #[test]
  fn stalled_transfer_is_forgotten() {
    let mut h = Harness::new();
    let (ex, req) = h.inbound_request(put_block(0, true, &body(512), None));
    let mut fx = vec![];
    layer().receive_request(&h.snapshot(), &mut fx, &ex, req)
           .unwrap();

    let (generation, at) = test::scheduled(&fx, Timer::BlockCleanup).unwrap();
    h.time = at;
    layer().on_timer(&h.snapshot(), &mut vec![], &ex, Timer::BlockCleanup, generation)
           .unwrap();

    assert!(ex.is_complete());
    assert!(ex.read(|s| s.block1.is_none()));
  }
}
