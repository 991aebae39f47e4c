use core::fmt::Debug;

use croak_msg::{Message, MessageParseError, MessageToBytesError, TryFromBytes};

/// Converts messages to and from datagrams
pub trait Codec: Debug + Send + Sync {
  /// Serialize a message
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError>;

  /// Parse a datagram
  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError>;
}

/// The UDP message format of RFC 7252 section 3
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rfc7252;

impl Codec for Rfc7252 {
  fn encode(&self, msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
    msg.to_bytes()
  }

  fn decode(&self, bytes: &[u8]) -> Result<Message, MessageParseError> {
    Message::try_from_bytes(bytes)
  }
}
