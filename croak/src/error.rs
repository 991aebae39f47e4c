use core::fmt;
use std::net::SocketAddr;

use croak_msg::{Id, MessageParseError, MessageToBytesError, Token};

/// The context that an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
  /// We were sending a message
  Sending {
    /// Where it was headed
    to: SocketAddr,
    /// Its id, when one had been assigned
    id: Option<Id>,
    /// Its token
    token: Token,
  },
  /// We were handling a datagram
  Receiving {
    /// Who sent it
    from: SocketAddr,
  },
  /// We were handling an expired timer
  Timer,
  /// We were polling the channel for new datagrams
  Polling,
  /// Some other operation
  None,
}

impl When {
  /// Construct a specific error from the context an error occurred in
  pub fn what(self, what: What) -> Error {
    Error { when: self, what }
  }
}

/// An error encountered by the endpoint or one of its layers
#[derive(Debug, Clone, PartialEq)]
pub struct Error {
  /// What happened
  pub what: What,
  /// When it happened
  pub when: When,
}

/// A contextless error with some additional debug data attached.
#[derive(Debug, Clone, PartialEq)]
pub enum What {
  /// The transport failed; carries the transport's debug representation
  Channel(String),
  /// Failed to serialize an outbound message
  ToBytes(MessageToBytesError),
  /// Failed to parse an inbound datagram
  FromBytes(MessageParseError),
  /// The clock failed to provide the current time
  Clock,
  /// The message or exchange was cancelled
  Cancelled,
  /// Retransmissions were exhausted without an acknowledgement
  Timeout,
  /// Object security refused to protect or unprotect a message
  Protection(String),
  /// Something happened that the exchange engine assumes never does.
  Invariant(&'static str),
}

impl Error {
  /// Was this error caused by the transport?
  pub fn is_channel(&self) -> bool {
    matches!(self.what, What::Channel(_))
  }

  /// Was an internal invariant broken?
  pub fn is_invariant(&self) -> bool {
    matches!(self.what, What::Invariant(_))
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.what {
      | What::Channel(e) => write!(f, "channel error: {}", e)?,
      | What::ToBytes(e) => write!(f, "failed to serialize message: {}", e)?,
      | What::FromBytes(e) => write!(f, "failed to parse message: {}", e)?,
      | What::Clock => write!(f, "clock failed")?,
      | What::Cancelled => write!(f, "cancelled")?,
      | What::Timeout => write!(f, "timed out")?,
      | What::Protection(e) => write!(f, "object security: {}", e)?,
      | What::Invariant(s) => write!(f, "invariant broken: {}", s)?,
    }

    match self.when {
      | When::Sending { to, id: Some(id), .. } => write!(f, " while sending {} to {}", id, to),
      | When::Sending { to, .. } => write!(f, " while sending to {}", to),
      | When::Receiving { from } => write!(f, " while receiving from {}", from),
      | When::Timer => write!(f, " while handling a timer"),
      | When::Polling => write!(f, " while polling"),
      | When::None => Ok(()),
    }
  }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_includes_context() {
    let to: SocketAddr = "127.0.0.1:5683".parse().unwrap();
    let e = When::Sending { to,
                            id: Some(Id(3)),
                            token: Token::default() }.what(What::Timeout);
    assert_eq!(e.to_string(), "timed out while sending 3 to 127.0.0.1:5683");
    assert!(!e.is_invariant());
  }
}
