use crate::cursor::Cursor;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::TryFromBytes;

/// Message payload
///
/// The payload of requests and responses is the representation
/// of a resource or the result of a requested action; its format
/// is given by the Content-Format option if present.
///
/// An empty payload means the message is sent without a payload
/// marker.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Payload(pub Vec<u8>);

impl Payload {
  /// Get the payload bytes
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Number of bytes in the payload
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Is the payload absent?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (request, response, empty)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl From<u8> for Byte1 {
  fn from(b: u8) -> Self {
    Byte1 { ver: Version(b >> 6),
            ty: Type::from_bits(b >> 4),
            tkl: b & 0b1111 }
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    (b.ver.0 << 6) | (b.ty.to_bits() << 4) | b.tkl
  }
}

/// The fixed 4-byte header of a message.
///
/// Used to salvage what we can from a datagram that failed to parse,
/// e.g. to answer a malformed request with a Reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
  /// see [`Type`]
  pub ty: Type,
  /// Token length nibble (may be a reserved value)
  pub tkl: u8,
  /// see [`Code`]
  pub code: Code,
  /// see [`Id`]
  pub id: Id,
}

impl Header {
  /// Read the header of a datagram.
  ///
  /// Yields `None` when the datagram is not a CoAP message at all:
  /// shorter than 4 bytes or with a version other than 1.
  ///
  /// ```
  /// use croak_msg::{Code, Header, Id, Type};
  ///
  /// let h = Header::peek(&[0b01_00_0000, 1, 0, 7, 0xFF]).unwrap();
  /// assert_eq!((h.ty, h.code, h.id), (Type::Con, Code::GET, Id(7)));
  ///
  /// assert_eq!(Header::peek(&[0b10_00_0000, 1, 0, 7]), None);
  /// assert_eq!(Header::peek(&[0b01_00_0000, 1]), None);
  /// ```
  pub fn peek(bytes: &[u8]) -> Option<Header> {
    match bytes {
      | [b1, code, id0, id1, ..] => {
        let Byte1 { ver, ty, tkl } = Byte1::from(*b1);
        if ver != Version::default() {
          None
        } else {
          Some(Header { ty,
                        tkl,
                        code: Code::from(*code),
                        id: Id::from_be_bytes([*id0, *id1]) })
        }
      },
      | _ => None,
    }
  }
}

/// # `Message` struct
/// Low-level representation of a CoAP message.
///
/// Options are kept in an [`OptionMap`], which iterates in ascending
/// option number order; this is the order they must be serialized in.
///
/// Messages support both serializing to bytes and from bytes, by using the provided [`TryFromBytes`] and [`TryIntoBytes`](crate::TryIntoBytes) traits.
///
/// ```
/// use croak_msg::*;
/// # //                       version  token len  code (2.05 Content)
/// # //                       |        |          /
/// # //                       |  type  |         /  message ID
/// # //                       |  |     |        |   |
/// # //                       vv vv vvvv vvvvvvvv vvvvvvvvvvvvvvvv
/// # let header: [u8; 4] = 0b_01_00_0001_01000101_0000000000000001u32.to_be_bytes();
/// # let token: [u8; 1] = [254u8];
/// # let content_format: &[u8] = b"application/json";
/// # let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
/// # let payload: [&[u8]; 2] = [&[0b_11111111u8], b"hello, world!"];
/// let packet: Vec<u8> = /* bytes! */
/// # [header.as_ref(), token.as_ref(), options.concat().as_ref(), payload.concat().as_ref()].concat();
///
/// let msg = Message::try_from_bytes(&packet).unwrap();
///
/// let mut expected = Message::new(Type::Con,
///                                 Code::new(2, 5),
///                                 Id(1),
///                                 Token(tinyvec::array_vec!([u8; 8] => 254)));
/// expected.set(OptNumber(12), OptValue(content_format.to_vec()));
/// expected.payload = Payload(b"hello, world!".to_vec());
///
/// assert_eq!(msg, expected);
/// assert_eq!(msg.try_into_bytes().unwrap(), packet);
/// ```
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Message {
  /// see [`Id`] for details
  ///
  /// `None` until one is assigned.
  pub id: Option<Id>,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`OptionMap`] for details
  pub opts: OptionMap,
  /// see [`Payload`]
  pub payload: Payload,
}

impl Message {
  /// Create a message with an id and token, no options and no payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { id: Some(id),
           ty,
           ver: Version::default(),
           token,
           code,
           opts: OptionMap::new(),
           payload: Payload::default() }
  }

  /// Create a message without an id or token; both are
  /// assigned when the message is sent.
  pub fn blank(ty: Type, code: Code) -> Self {
    Self { ty,
           code,
           ..Default::default() }
  }

  /// Create an Empty message (code 0.00, no token, no options)
  pub fn empty(ty: Type, id: Id) -> Self {
    Self::new(ty, Code::EMPTY, id, Token::default())
  }

  /// Create an Empty ACK with the given message id.
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, Type};
  ///
  /// let req = Message::new(Type::Con, Code::GET, Id(12), Default::default());
  /// let ack = Message::ack(req.id.unwrap());
  ///
  /// assert_eq!(ack.ty, Type::Ack);
  /// assert_eq!(ack.id, Some(Id(12)));
  /// assert!(ack.is_empty());
  /// ```
  pub fn ack(id: Id) -> Self {
    Self::empty(Type::Ack, id)
  }

  /// Create an Empty RST with the given message id
  pub fn reset(id: Id) -> Self {
    Self::empty(Type::Reset, id)
  }

  /// Is this an Empty (0.00) message?
  pub fn is_empty(&self) -> bool {
    self.code == Code::EMPTY
  }

  /// Is this a request?
  pub fn is_request(&self) -> bool {
    self.code.kind() == CodeKind::Request
  }

  /// Is this a response?
  pub fn is_response(&self) -> bool {
    self.code.kind() == CodeKind::Response
  }

  /// Is this a signal (7.xx)?
  pub fn is_signal(&self) -> bool {
    self.code.kind() == CodeKind::Signal
  }

  /// Get all values of an option
  pub fn get(&self, n: OptNumber) -> Option<&Vec<OptValue>> {
    self.opts.get(&n)
  }

  /// Get the first value of an option
  pub fn get_first(&self, n: OptNumber) -> Option<&OptValue> {
    self.get(n).and_then(|vs| vs.first())
  }

  /// Does the message carry this option at all?
  pub fn has(&self, n: OptNumber) -> bool {
    self.opts.contains_key(&n)
  }

  /// Number of values the option has
  pub fn count(&self, n: OptNumber) -> usize {
    self.get(n).map(Vec::len).unwrap_or(0)
  }

  /// Replace all values of an option with a single value,
  /// yielding the old values.
  pub fn set(&mut self, n: OptNumber, v: OptValue) -> Option<Vec<OptValue>> {
    self.opts.insert(n, vec![v])
  }

  /// Add a value to an option, after any it already has
  pub fn add(&mut self, n: OptNumber, v: OptValue) {
    self.opts.entry(n).or_insert_with(Vec::new).push(v);
  }

  /// Remove an option, yielding its values
  pub fn remove(&mut self, n: OptNumber) -> Option<Vec<OptValue>> {
    self.opts.remove(&n)
  }

  /// Get the first value of an option as an unsigned integer
  pub fn get_uint(&self, n: OptNumber) -> Option<u32> {
    self.get_first(n).and_then(OptValue::as_uint)
  }

  /// Set an option to an unsigned integer
  pub fn set_uint(&mut self, n: OptNumber, v: u32) {
    self.set(n, OptValue::uint(v));
  }

  /// The Uri-Path segments
  pub fn path(&self) -> Vec<&str> {
    self.get(repeat::PATH)
        .map(|vs| vs.iter().filter_map(OptValue::as_str).collect())
        .unwrap_or_default()
  }

  /// The Uri-Path segments joined by `/`
  ///
  /// ```
  /// use croak_msg::{Code, Message, Type};
  ///
  /// let mut req = Message::blank(Type::Con, Code::GET);
  /// req.set_path("/sensors/temp");
  /// assert_eq!(req.path(), vec!["sensors", "temp"]);
  /// assert_eq!(req.path_string(), "sensors/temp");
  /// ```
  pub fn path_string(&self) -> String {
    self.path().join("/")
  }

  /// Replace the Uri-Path with the segments of a `/`-separated path
  pub fn set_path(&mut self, path: &str) {
    self.remove(repeat::PATH);
    path.split('/')
        .filter(|s| !s.is_empty())
        .for_each(|s| self.add(repeat::PATH, OptValue::string(s)));
  }

  /// The Uri-Query items
  pub fn query(&self) -> Vec<&str> {
    self.get(repeat::QUERY)
        .map(|vs| vs.iter().filter_map(OptValue::as_str).collect())
        .unwrap_or_default()
  }

  /// Add a Uri-Query item
  pub fn add_query(&mut self, q: &str) {
    self.add(repeat::QUERY, OptValue::string(q));
  }

  /// Uri-Host
  pub fn host(&self) -> Option<&str> {
    self.get_first(no_repeat::HOST).and_then(OptValue::as_str)
  }

  /// Set Uri-Host
  pub fn set_host(&mut self, host: &str) {
    self.set(no_repeat::HOST, OptValue::string(host));
  }

  /// Content-Format
  pub fn content_format(&self) -> Option<ContentFormat> {
    self.get_uint(no_repeat::CONTENT_FORMAT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// Set Content-Format
  pub fn set_content_format(&mut self, f: ContentFormat) {
    self.set_uint(no_repeat::CONTENT_FORMAT, u32::from(u16::from(f)));
  }

  /// Accept
  pub fn accept(&self) -> Option<ContentFormat> {
    self.get_uint(no_repeat::ACCEPT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// Set Accept
  pub fn set_accept(&mut self, f: ContentFormat) {
    self.set_uint(no_repeat::ACCEPT, u32::from(u16::from(f)));
  }

  /// Max-Age in seconds, if set
  pub fn max_age(&self) -> Option<u32> {
    self.get_uint(no_repeat::MAX_AGE)
  }

  /// Set Max-Age in seconds
  pub fn set_max_age(&mut self, secs: u32) {
    self.set_uint(no_repeat::MAX_AGE, secs);
  }

  /// The Observe option value
  pub fn observe(&self) -> Option<u32> {
    self.get_uint(no_repeat::OBSERVE)
  }

  /// The Observe option interpreted as a request action
  pub fn observe_action(&self) -> Option<observe::Action> {
    self.observe().and_then(observe::Action::from_uint)
  }

  /// Set the Observe option
  pub fn set_observe(&mut self, n: u32) {
    self.set_uint(no_repeat::OBSERVE, n & observe::SEQUENCE_MASK);
  }

  /// Block1
  pub fn block1(&self) -> Option<Block> {
    self.get_uint(no_repeat::BLOCK1).map(Block::from)
  }

  /// Set Block1
  pub fn set_block1(&mut self, b: Block) {
    self.set_uint(no_repeat::BLOCK1, u32::from(b));
  }

  /// Block2
  pub fn block2(&self) -> Option<Block> {
    self.get_uint(no_repeat::BLOCK2).map(Block::from)
  }

  /// Set Block2
  pub fn set_block2(&mut self, b: Block) {
    self.set_uint(no_repeat::BLOCK2, u32::from(b));
  }

  /// Size1
  pub fn size1(&self) -> Option<u32> {
    self.get_uint(no_repeat::SIZE1)
  }

  /// Set Size1
  pub fn set_size1(&mut self, n: u32) {
    self.set_uint(no_repeat::SIZE1, n);
  }

  /// Size2
  pub fn size2(&self) -> Option<u32> {
    self.get_uint(no_repeat::SIZE2)
  }

  /// Set Size2
  pub fn set_size2(&mut self, n: u32) {
    self.set_uint(no_repeat::SIZE2, n);
  }

  /// Does the message carry the OSCORE option?
  pub fn is_oscore(&self) -> bool {
    self.has(no_repeat::OSCORE)
  }

  /// The payload as UTF-8, if it is valid UTF-8
  pub fn payload_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.payload.0).ok()
  }

  /// Serialize to bytes
  pub fn to_bytes(&self) -> Result<Vec<u8>, crate::MessageToBytesError> {
    crate::to_bytes::message_to_bytes(self)
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes.as_ref());

    let Byte1 { tkl, ty, ver } = bytes.next().ok_or_else(MessageParseError::eof)?.into();

    if ver != Version::default() {
      return Err(Self::Error::InvalidVersion(ver.0));
    }

    if usize::from(tkl) > Token::MAX_LEN {
      return Err(Self::Error::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id = bytes.take_exact(2)
                  .map(|id| Id::from_be_bytes([id[0], id[1]]))
                  .ok_or_else(MessageParseError::eof)?;

    if code == Code::EMPTY && (tkl > 0 || !bytes.is_exhausted()) {
      return Err(Self::Error::NonEmptyEmptyMessage);
    }

    let token = bytes.take_exact(usize::from(tkl))
                     .and_then(Token::try_from_slice)
                     .ok_or_else(MessageParseError::eof)?;

    let opts = opt::parse_opts(&mut bytes)?;

    let payload = match bytes.next() {
      | Some(0xFF) if bytes.is_exhausted() => return Err(Self::Error::PayloadMarkerWithoutPayload),
      | Some(_) => Payload(bytes.take_until_end().to_vec()),
      | None => Payload::default(),
    };

    Ok(Message { id: Some(id),
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload })
  }
}

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, Vec<u8>) {
  let header: [u8; 4] = 0b_01_00_0001_01000101_0000000000000001u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b_11111111u8], b"hello, world!"];
  let bytes = [header.as_ref(),
               token.as_ref(),
               options.concat().as_ref(),
               payload.concat().as_ref()].concat();

  let mut msg = Message::new(Type::Con,
                             Code::new(2, 5),
                             Id(1),
                             Token(tinyvec::array_vec!([u8; 8] => 254)));
  msg.set(OptNumber(12), OptValue(content_format.to_vec()));
  msg.payload = Payload(b"hello, world!".to_vec());

  (msg, bytes)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_msg() {
    let (expect, msg) = test_msg();
    assert_eq!(Message::try_from_bytes(&msg).unwrap(), expect)
  }

  #[test]
  fn parse_byte1() {
    let byte = 0b_01_10_0011u8;
    let byte = Byte1::from(byte);
    assert_eq!(byte,
               Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 })
  }

  #[test]
  fn wrong_version_is_not_coap() {
    let err = Message::try_from_bytes([0b_10_00_0000u8, 1, 0, 1]).unwrap_err();
    assert_eq!(err, MessageParseError::InvalidVersion(2));
    assert!(err.is_not_coap());
  }

  #[test]
  fn reserved_token_length() {
    let err = Message::try_from_bytes([0b_01_00_1001u8, 1, 0, 1]).unwrap_err();
    assert_eq!(err, MessageParseError::InvalidTokenLength(9));
  }

  #[test]
  fn truncated() {
    assert_eq!(Message::try_from_bytes([0b_01_00_0000u8, 1, 0]),
               Err(MessageParseError::UnexpectedEndOfStream));
    assert_eq!(Message::try_from_bytes([0b_01_00_0010u8, 1, 0, 1, 9]),
               Err(MessageParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn marker_without_payload() {
    let err = Message::try_from_bytes([0b_01_00_0000u8, 1, 0, 1, 0xFF]).unwrap_err();
    assert_eq!(err, MessageParseError::PayloadMarkerWithoutPayload);
  }

  #[test]
  fn empty_message_with_payload() {
    let err = Message::try_from_bytes([0b_01_00_0000u8, 0, 0, 1, 0xFF, 1]).unwrap_err();
    assert_eq!(err, MessageParseError::NonEmptyEmptyMessage);

    let ack = Message::try_from_bytes([0b_01_10_0000u8, 0, 0, 1]).unwrap();
    assert_eq!(ack, Message::ack(Id(1)));
  }

  #[test]
  fn reserved_option_delta() {
    let err = Message::try_from_bytes([0b_01_00_0000u8, 1, 0, 1, 0b1111_0000]).unwrap_err();
    assert_eq!(err,
               MessageParseError::OptParseError(OptParseError::OptionDeltaReservedValue(15)));
  }

  #[test]
  fn typed_accessors() {
    let mut msg = Message::blank(Type::Con, Code::GET);
    msg.set_content_format(ContentFormat::Json);
    msg.set_block2(Block::new(256, 4, false));
    msg.set_observe(0);
    msg.add_query("a=b");
    msg.add_query("c");

    assert_eq!(msg.content_format(), Some(ContentFormat::Json));
    assert_eq!(msg.block2().map(|b| (b.num(), b.size())), Some((4, 256)));
    assert_eq!(msg.observe_action(), Some(observe::Action::Register));
    assert_eq!(msg.query(), vec!["a=b", "c"]);
    assert_eq!(msg.count(repeat::QUERY), 2);
    assert_eq!(msg.block1(), None);
    assert!(!msg.is_oscore());
  }
}
