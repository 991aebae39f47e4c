use super::opt::parse_error::OptParseError;

/// Errors encounterable while parsing a message from bytes
#[derive(Copy, Clone, Debug, PartialEq, PartialOrd, Eq, Ord)]
pub enum MessageParseError {
  /// Reached end of stream before parsing was finished
  UnexpectedEndOfStream,

  /// The version bits were not `1`; this datagram is not a CoAP message.
  InvalidVersion(u8),

  /// Token length nibble was > 8 (9-15 are reserved)
  InvalidTokenLength(u8),

  /// Error parsing option
  OptParseError(OptParseError),

  /// A payload marker (`0xFF`) was found with no payload after it
  PayloadMarkerWithoutPayload,

  /// An Empty (0.00) message carried a token, options or a payload
  NonEmptyEmptyMessage,
}

impl MessageParseError {
  /// Shorthand for [`MessageParseError::UnexpectedEndOfStream`]
  pub fn eof() -> Self {
    Self::UnexpectedEndOfStream
  }

  /// Whether the bytes that caused this error could not possibly be
  /// a CoAP message (as opposed to being a malformed one).
  ///
  /// ```
  /// use croak_msg::MessageParseError;
  ///
  /// assert!(MessageParseError::InvalidVersion(2).is_not_coap());
  /// assert!(!MessageParseError::PayloadMarkerWithoutPayload.is_not_coap());
  /// ```
  pub fn is_not_coap(&self) -> bool {
    matches!(self, Self::InvalidVersion(_))
  }
}

impl From<OptParseError> for MessageParseError {
  fn from(e: OptParseError) -> Self {
    Self::OptParseError(e)
  }
}

impl core::fmt::Display for MessageParseError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::UnexpectedEndOfStream => write!(f, "datagram ended before the message did"),
      | Self::InvalidVersion(v) => write!(f, "unsupported version {}", v),
      | Self::InvalidTokenLength(n) => write!(f, "token length {} is reserved", n),
      | Self::OptParseError(e) => write!(f, "malformed option: {:?}", e),
      | Self::PayloadMarkerWithoutPayload => write!(f, "payload marker followed by nothing"),
      | Self::NonEmptyEmptyMessage => write!(f, "empty message must not have a token, options or payload"),
    }
  }
}
