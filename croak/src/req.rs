use core::ops::{Deref, DerefMut};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use croak_msg::{Code, Message, Token, Type};

use crate::codec::Codec;
use crate::lifecycle::MessageState;
use crate::net::Addrd;
use crate::resp::Resp;

/// A CoAP request, addressed to (or received from) a peer
///
/// Dereferences to the underlying [`Message`]; mutable access
/// discards the cached serialized form.
///
/// ```
/// use croak::req::Req;
///
/// let addr = "127.0.0.1:5683".parse().unwrap();
/// let mut req = Req::get(addr, "sensors/temp");
/// req.add_query("unit=c");
///
/// assert_eq!(req.path_string(), "sensors/temp");
/// assert_eq!(req.remote(), addr);
/// ```
#[derive(Debug, Clone)]
pub struct Req {
  msg: Message,
  remote: SocketAddr,
  state: Arc<MessageState>,
  bytes: Option<Arc<Vec<u8>>>,
  token_set: bool,
  multicast: bool,
}

impl Req {
  /// Create a confirmable request
  pub fn new(method: Code, remote: SocketAddr, path: &str) -> Self {
    let mut msg = Message::blank(Type::Con, method);
    msg.set_path(path);
    Self::from_msg(msg, remote)
  }

  /// Create a confirmable GET request
  pub fn get(remote: SocketAddr, path: &str) -> Self {
    Self::new(Code::GET, remote, path)
  }

  /// Create a confirmable POST request
  pub fn post(remote: SocketAddr, path: &str) -> Self {
    Self::new(Code::POST, remote, path)
  }

  /// Create a confirmable PUT request
  pub fn put(remote: SocketAddr, path: &str) -> Self {
    Self::new(Code::PUT, remote, path)
  }

  /// Create a confirmable DELETE request
  pub fn delete(remote: SocketAddr, path: &str) -> Self {
    Self::new(Code::DELETE, remote, path)
  }

  /// Wrap a message.
  ///
  /// A non-empty token in the message is kept; otherwise one is
  /// generated when the request is sent.
  pub fn from_msg(msg: Message, remote: SocketAddr) -> Self {
    Self { token_set: !msg.token.is_empty(),
           msg,
           remote,
           state: Default::default(),
           bytes: None,
           multicast: false }
  }

  /// A request received from a peer
  pub(crate) fn received(msg: Addrd<Message>) -> Self {
    let Addrd(msg, remote) = msg;
    Self { token_set: true,
           ..Self::from_msg(msg, remote) }
  }

  /// A new request for the same resource, with fresh state, no message
  /// id, the same token and an empty payload.
  ///
  /// Used for follow-up requests within one exchange
  /// (next block, re-registration, cancellation).
  pub fn follow_up(&self) -> Self {
    let mut msg = self.msg.clone();
    msg.id = None;
    msg.payload = Default::default();
    Self { msg,
           remote: self.remote,
           state: Default::default(),
           bytes: None,
           token_set: self.token_set,
           multicast: self.multicast }
  }

  /// Set the token explicitly (an empty token is allowed)
  pub fn set_token(&mut self, token: Token) {
    self.msg.token = token;
    self.token_set = true;
    self.bytes = None;
  }

  /// Has a token been chosen for this request?
  pub fn has_token(&self) -> bool {
    self.token_set
  }

  /// Set the payload
  pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
    self.msg.payload.0 = payload.into();
    self.bytes = None;
  }

  /// Is this request sent to a multicast group?
  pub fn is_multicast(&self) -> bool {
    self.multicast
  }

  /// Mark this request as sent to a multicast group; responses from
  /// every member are accepted.
  pub fn set_multicast(&mut self, multicast: bool) {
    self.multicast = multicast;
  }

  /// The peer
  pub fn remote(&self) -> SocketAddr {
    self.remote
  }

  /// Borrow the message
  pub fn msg(&self) -> &Message {
    &self.msg
  }

  /// Take the message
  pub fn into_msg(self) -> Message {
    self.msg
  }

  /// State shared by all clones of this request
  pub fn state(&self) -> &Arc<MessageState> {
    &self.state
  }

  /// Cancel the request, see [`MessageState::cancel`]
  pub fn cancel(&self) {
    self.state.cancel()
  }

  /// See [`MessageState::wait_for_response`]
  pub fn wait_for_response(&self, timeout: Duration) -> Option<Resp> {
    self.state.wait_for_response(timeout)
  }

  /// Serialize, reusing the cached bytes when nothing changed
  pub(crate) fn encode(&mut self, codec: &dyn Codec) -> Result<Arc<Vec<u8>>, croak_msg::MessageToBytesError> {
    match &self.bytes {
      | Some(b) => Ok(b.clone()),
      | None => {
        let b = Arc::new(codec.encode(&self.msg)?);
        self.bytes = Some(b.clone());
        Ok(b)
      },
    }
  }

  /// The serialized form, if the request has been encoded
  pub fn bytes(&self) -> Option<&Arc<Vec<u8>>> {
    self.bytes.as_ref()
  }
}

impl Deref for Req {
  type Target = Message;

  fn deref(&self) -> &Message {
    &self.msg
  }
}

impl DerefMut for Req {
  fn deref_mut(&mut self) -> &mut Message {
    self.bytes = None;
    &mut self.msg
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::Id;

  use super::*;
  use crate::codec::Rfc7252;

  fn addr() -> SocketAddr {
    "127.0.0.1:5683".parse().unwrap()
  }

  #[test]
  fn clones_share_state() {
    let req = Req::get(addr(), "a");
    let clone = req.clone();
    clone.cancel();
    assert!(req.state().is_cancelled());
  }

  #[test]
  fn follow_up_keeps_token_not_state() {
    let mut req = Req::get(addr(), "a");
    req.set_token(Token::opaque(b"x"));
    req.id = Some(Id(1));
    req.set_payload(*b"body");

    let next = req.follow_up();
    req.cancel();

    assert_eq!(next.token, req.token);
    assert_eq!(next.id, None);
    assert!(next.payload.is_empty());
    assert!(!next.state().is_cancelled());
  }

  #[test]
  fn mutation_drops_cached_bytes() {
    let mut req = Req::get(addr(), "a");
    req.id = Some(Id(1));
    let first = req.encode(&Rfc7252).unwrap();
    assert!(Arc::ptr_eq(&first, &req.encode(&Rfc7252).unwrap()));

    req.set_path("b");
    assert!(req.bytes().is_none());
    assert_ne!(*req.encode(&Rfc7252).unwrap(), *first);
  }
}
