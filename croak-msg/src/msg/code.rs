/// # Message Code
/// 8-bit unsigned integer, split into a 3-bit class (most
/// significant bits) and a 5-bit detail (least significant bits),
/// documented as "c.dd" where "c" is a digit from 0 to 7 for the
/// 3-bit subfield and "dd" are two digits from 00 to 31 for the 5-bit
/// subfield.
///
/// The class can indicate a request (0), a success response (2),
/// a client error response (4), a server error response (5) or,
/// on reliable transports, a signaling message (7).
/// As a special case, Code 0.00 indicates an Empty message.
///
/// ```
/// use croak_msg::Code;
///
/// let content = Code::new(2, 05);
/// assert_eq!(content.to_string(), "2.05");
/// assert_eq!(u8::from(content), 0b010_00101);
/// assert_eq!(Code::from(0b010_00101u8), content);
/// ```
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Code {
  /// The "class" of message codes identify it as a request or response, and provides the class of response status:
  ///
  /// |class|meaning|
  /// |---|---|
  /// |`0`|Message is a request|
  /// |`2`|Message is a success response|
  /// |`4`|Message is a client error response|
  /// |`5`|Message is a server error response|
  /// |`7`|Message is a signal|
  pub class: u8,

  /// 2-digit integer (range `[0, 32)`) that provides granular information about the response status.
  ///
  /// Will always be `0` for empty messages.
  pub detail: u8,
}

/// Whether a code is for a request, response, signal or empty message
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// A request code (0.xx)
  Request,
  /// A response code ([2-5].xx)
  Response,
  /// A signaling code (7.xx)
  Signal,
  /// EMPTY (0.00)
  Empty,
}

impl Code {
  /// Create a new Code
  ///
  /// ```
  /// use croak_msg::Code;
  ///
  /// let content = Code::new(2, 05);
  /// ```
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// The EMPTY code (0.00)
  pub const EMPTY: Code = Code::new(0, 0);

  /// GET (0.01)
  pub const GET: Code = Code::new(0, 1);
  /// POST (0.02)
  pub const POST: Code = Code::new(0, 2);
  /// PUT (0.03)
  pub const PUT: Code = Code::new(0, 3);
  /// DELETE (0.04)
  pub const DELETE: Code = Code::new(0, 4);
  /// FETCH (0.05)
  pub const FETCH: Code = Code::new(0, 5);
  /// PATCH (0.06)
  pub const PATCH: Code = Code::new(0, 6);
  /// iPATCH (0.07)
  pub const IPATCH: Code = Code::new(0, 7);

  /// Capabilities and Settings Message (7.01)
  pub const CSM: Code = Code::new(7, 1);
  /// Ping (7.02)
  pub const PING: Code = Code::new(7, 2);
  /// Pong (7.03)
  pub const PONG: Code = Code::new(7, 3);
  /// Release (7.04)
  pub const RELEASE: Code = Code::new(7, 4);
  /// Abort (7.05)
  pub const ABORT: Code = Code::new(7, 5);

  /// Get whether this code is for a request, response, signal or empty message
  ///
  /// ```
  /// use croak_msg::{Code, CodeKind};
  ///
  /// assert_eq!(Code::new(0, 0).kind(), CodeKind::Empty);
  /// assert_eq!(Code::new(0, 1).kind(), CodeKind::Request);
  /// assert_eq!(Code::new(2, 5).kind(), CodeKind::Response);
  /// assert_eq!(Code::new(7, 2).kind(), CodeKind::Signal);
  /// ```
  pub fn kind(&self) -> CodeKind {
    match self.class {
      | 0 if self.detail == 0 => CodeKind::Empty,
      | 0 => CodeKind::Request,
      | 7 => CodeKind::Signal,
      | _ => CodeKind::Response,
    }
  }

  /// Is this a 2.xx code?
  pub fn is_success(&self) -> bool {
    self.class == 2
  }

  /// Is this a 4.xx or 5.xx code?
  pub fn is_error(&self) -> bool {
    self.class == 4 || self.class == 5
  }
}

impl core::fmt::Display for Code {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    // xxx => class, yyyyy => detail
    // xxxyyyyy
    Code { class: b >> 5,
           detail: b & 0b0001_1111 }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    ((code.class & 0b111) << 5) | (code.detail & 0b0001_1111)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test::assert_eqb;

  #[test]
  fn parse_code() {
    let byte = 0b0100_0101_u8;
    let code = Code::from(byte);
    assert_eq!(code, Code { class: 2, detail: 5 })
  }

  #[test]
  fn serialize_code() {
    let code = Code { class: 2, detail: 5 };
    let actual: u8 = code.into();
    let expected = 0b0100_0101_u8;
    assert_eqb!(actual, expected)
  }

  #[test]
  fn error_classes() {
    assert!(Code::new(4, 4).is_error());
    assert!(Code::new(5, 0).is_error());
    assert!(!Code::new(2, 5).is_error());
    assert!(Code::new(2, 31).is_success());
  }
}
