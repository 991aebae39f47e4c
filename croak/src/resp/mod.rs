use core::ops::{Deref, DerefMut};
use std::net::SocketAddr;
use std::sync::Arc;

use croak_msg::{Code, Message, Type};

use crate::codec::Codec;
use crate::lifecycle::MessageState;
use crate::net::Addrd;
use crate::req::Req;

/// Response codes
pub mod code;

/// A CoAP response, addressed to (or received from) a peer
///
/// A response created with [`Resp::for_request`] has no type yet;
/// the endpoint piggybacks it on the ACK of a confirmable request when
/// it can, and otherwise sends it as CON or NON depending on the request.
/// Use [`Resp::set_type`] to choose explicitly.
///
/// ```
/// use croak::req::Req;
/// use croak::resp::{code, Resp};
///
/// let req = Req::get("127.0.0.1:5683".parse().unwrap(), "sensors/temp");
/// let mut resp = Resp::for_request(&req, code::CONTENT);
/// resp.set_payload("23.5");
///
/// assert_eq!(resp.token, req.token);
/// assert!(!resp.is_type_set());
/// ```
#[derive(Debug, Clone)]
pub struct Resp {
  msg: Message,
  remote: SocketAddr,
  state: Arc<MessageState>,
  bytes: Option<Arc<Vec<u8>>>,
  type_set: bool,
  last: bool,
}

impl Resp {
  /// Create a response to a request
  pub fn for_request(req: &Req, code: Code) -> Self {
    let mut msg = Message::blank(Type::Non, code);
    msg.token = req.token;
    Self { msg,
           remote: req.remote(),
           state: Default::default(),
           bytes: None,
           type_set: false,
           last: true }
  }

  /// Wrap a message to be sent to `remote`
  pub fn from_msg(msg: Message, remote: SocketAddr) -> Self {
    Self { msg,
           remote,
           state: Default::default(),
           bytes: None,
           type_set: true,
           last: true }
  }

  /// A response received from a peer
  pub(crate) fn received(msg: Addrd<Message>) -> Self {
    let Addrd(msg, remote) = msg;
    Self::from_msg(msg, remote)
  }

  /// A copy of this response with fresh state, no id and no cached bytes
  pub(crate) fn detached(&self) -> Self {
    let mut msg = self.msg.clone();
    msg.id = None;
    Self { msg,
           remote: self.remote,
           state: Default::default(),
           bytes: None,
           type_set: self.type_set,
           last: self.last }
  }

  /// Choose the message type explicitly
  pub fn set_type(&mut self, ty: Type) {
    self.msg.ty = ty;
    self.type_set = true;
    self.bytes = None;
  }

  /// Let the endpoint choose the message type again
  pub(crate) fn unset_type(&mut self) {
    self.type_set = false;
  }

  /// Was the type chosen explicitly (or by the endpoint already)?
  pub fn is_type_set(&self) -> bool {
    self.type_set
  }

  /// Set the payload
  pub fn set_payload(&mut self, payload: impl Into<Vec<u8>>) {
    self.msg.payload.0 = payload.into();
    self.bytes = None;
  }

  /// Is this the final response of its exchange?
  ///
  /// Notifications and intermediate blocks are not.
  pub fn is_last(&self) -> bool {
    self.last
  }

  pub(crate) fn set_last(&mut self, last: bool) {
    self.last = last;
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

  /// State shared by all clones of this response
  pub fn state(&self) -> &Arc<MessageState> {
    &self.state
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

  /// The serialized form, if the response has been encoded
  pub fn bytes(&self) -> Option<&Arc<Vec<u8>>> {
    self.bytes.as_ref()
  }
}

impl Deref for Resp {
  type Target = Message;

  fn deref(&self) -> &Message {
    &self.msg
  }
}

impl DerefMut for Resp {
  fn deref_mut(&mut self) -> &mut Message {
    self.bytes = None;
    &mut self.msg
  }
}

/// An Empty message: ACK, RST or ping
#[derive(Debug, Clone)]
pub struct EmptyMsg {
  msg: Message,
  remote: SocketAddr,
}

impl EmptyMsg {
  /// An ACK for the message with this id
  pub fn ack(id: croak_msg::Id, remote: SocketAddr) -> Self {
    Self { msg: Message::ack(id),
           remote }
  }

  /// A RST for the message with this id
  pub fn reset(id: croak_msg::Id, remote: SocketAddr) -> Self {
    Self { msg: Message::reset(id),
           remote }
  }

  /// A CON ping, whose id is assigned when sent
  pub fn ping(remote: SocketAddr) -> Self {
    Self { msg: Message { code: Code::EMPTY,
                          ty: Type::Con,
                          ..Default::default() },
           remote }
  }

  pub(crate) fn received(msg: Addrd<Message>) -> Self {
    let Addrd(msg, remote) = msg;
    Self { msg, remote }
  }

  /// The peer
  pub fn remote(&self) -> SocketAddr {
    self.remote
  }

  /// Borrow the message
  pub fn msg(&self) -> &Message {
    &self.msg
  }

  pub(crate) fn msg_mut(&mut self) -> &mut Message {
    &mut self.msg
  }
}

impl Deref for EmptyMsg {
  type Target = Message;

  fn deref(&self) -> &Message {
    &self.msg
  }
}
