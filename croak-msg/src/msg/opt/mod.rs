use std::collections::BTreeMap;

use crate::cursor::Cursor;

/// Option parsing error
pub mod parse_error;
pub use parse_error::*;

/// Well-known option numbers and value types
pub mod known;
pub use known::*;

/// Options keyed by number, in ascending numeric order.
///
/// Within a single number, values keep the order they were
/// added (or parsed) in; this matters for repeatable options like
/// `Uri-Path`.
pub type OptionMap = BTreeMap<OptNumber, Vec<OptValue>>;

/// The Option number identifies which Option is being set
/// (e.g. Content-Format has a Number of 12)
///
/// Because Option Numbers are only meaningful in a message
/// context, they are stored as absolute numbers rather than the
/// delta used on the wire.
///
/// # Option Qualities
/// The number alone tells a recipient how to treat an option
/// it does not recognize:
/// ```text
///  0   1   2   3   4   5   6   7
/// +---+---+---+---+---+---+---+---+
/// |           | NoCacheKey| U | C |
/// +---+---+---+---+---+---+---+---+
/// ```
/// * `C` critical ([`OptNumber::must_be_processed`])
/// * `U` unsafe ([`OptNumber::when_unsupported_by_proxy`])
/// * `NoCacheKey` ([`OptNumber::when_option_changes`])
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u32);

/// Whether an option must be understood by the recipient
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum OptionMustBeProcessed {
  /// This option is critical; an endpoint that does not recognize it
  /// must reject the message.
  ///
  /// Unrecognized critical options in a CON request yield 4.02 Bad Option,
  /// in a CON response or piggybacked ACK the response is rejected,
  /// and in NON messages the message is dropped.
  Yes,
  /// This option is elective and may be silently ignored if not recognized.
  No,
}

/// What a proxy that does not understand an option should do with it
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum WhenOptionUnsupportedByProxy {
  /// This option is "Unsafe to forward"; a proxy that doesn't
  /// understand it must not forward the message.
  Error,
  /// This option is "Safe to forward"
  Forward,
}

/// Whether an option is part of the cache key
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum WhenOptionChanges {
  /// The option is part of the cache key; a differing value
  /// means a different response.
  ResponseChanges,
  /// The option is `NoCacheKey`; it may differ between requests
  /// that are answered by the same cached response.
  ResponseDoesNotChange,
}

impl OptNumber {
  /// Whether or not this option may be ignored by a server
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    match self.0 & 0b1 {
      | 1 => OptionMustBeProcessed::Yes,
      | _ => OptionMustBeProcessed::No,
    }
  }

  /// Whether or not this option may be forwarded blindly by
  /// a proxy that does not support processing it
  pub fn when_unsupported_by_proxy(&self) -> WhenOptionUnsupportedByProxy {
    match (self.0 & 0b10) >> 1 {
      | 1 => WhenOptionUnsupportedByProxy::Error,
      | _ => WhenOptionUnsupportedByProxy::Forward,
    }
  }

  /// Whether or not different values for this option should
  /// yield a proxy's cached response
  ///
  /// _e.g. when ETag changes, the response should be refetched,
  /// when Size1 changes it should not._
  pub fn when_option_changes(&self) -> WhenOptionChanges {
    match self.0 & 0x1E {
      | 0x1C => WhenOptionChanges::ResponseDoesNotChange,
      | _ => WhenOptionChanges::ResponseChanges,
    }
  }

  /// Shorthand for `when_unsupported_by_proxy() == Error`
  pub fn is_unsafe(&self) -> bool {
    self.when_unsupported_by_proxy() == WhenOptionUnsupportedByProxy::Error
  }

  /// Shorthand for `must_be_processed() == Yes`
  pub fn is_critical(&self) -> bool {
    self.must_be_processed() == OptionMustBeProcessed::Yes
  }

  /// Shorthand for `when_option_changes() == ResponseDoesNotChange`
  pub fn is_no_cache_key(&self) -> bool {
    self.when_option_changes() == WhenOptionChanges::ResponseDoesNotChange
  }
}

impl core::fmt::Display for OptNumber {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match known::name_of(*self) {
      | Some(name) => write!(f, "{}({})", name, self.0),
      | None => write!(f, "{}", self.0),
    }
  }
}

/// The raw bytes of an option's value.
///
/// How the bytes are interpreted depends on the option's
/// [`OptFormat`]; see [`known::format_of`].
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// An empty value
  pub fn empty() -> Self {
    Self(Vec::new())
  }

  /// Encode an unsigned integer in the fewest big-endian bytes
  /// possible; zero is the empty byte string.
  ///
  /// ```
  /// use croak_msg::OptValue;
  ///
  /// assert_eq!(OptValue::uint(0).0, Vec::<u8>::new());
  /// assert_eq!(OptValue::uint(12).0, vec![12]);
  /// assert_eq!(OptValue::uint(256).0, vec![1, 0]);
  /// assert_eq!(OptValue::uint(256).as_uint(), Some(256));
  /// ```
  pub fn uint(n: u32) -> Self {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[skip..].to_vec())
  }

  /// Interpret this value as a big-endian unsigned integer.
  ///
  /// Yields `None` if the value is longer than 4 bytes.
  pub fn as_uint(&self) -> Option<u32> {
    if self.0.len() > 4 {
      None
    } else {
      Some(self.0.iter().fold(0u32, |n, b| (n << 8) | u32::from(*b)))
    }
  }

  /// A UTF-8 string value
  pub fn string(s: &str) -> Self {
    Self(s.as_bytes().to_vec())
  }

  /// Interpret this value as a UTF-8 string
  pub fn as_str(&self) -> Option<&str> {
    core::str::from_utf8(&self.0).ok()
  }

  /// Get the raw bytes
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }

  /// Number of bytes in the value
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Is this the zero-length value?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl From<Vec<u8>> for OptValue {
  fn from(bytes: Vec<u8>) -> Self {
    Self(bytes)
  }
}

impl From<&[u8]> for OptValue {
  fn from(bytes: &[u8]) -> Self {
    Self(bytes.to_vec())
  }
}

/// Get the number that a 4-bit delta or length nibble stands for,
/// consuming its 1- or 2-byte extension if there is one.
///
/// `reserved_err` is the error yielded for the reserved nibble value 15.
pub(crate) fn parse_opt_len_or_delta(head: u8,
                                     bytes: &mut Cursor<'_>,
                                     reserved_err: OptParseError)
                                     -> Result<u32, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok(u32::from(n) + 13)
    },
    | 14 => {
      let ext = bytes.take_exact(2).ok_or_else(OptParseError::eof)?;
      Ok(u32::from(u16::from_be_bytes([ext[0], ext[1]])) + 269)
    },
    | 15 => Err(reserved_err),
    | _ => Ok(u32::from(head)),
  }
}

/// Largest delta or length representable with the 2-byte extension
pub const MAX_EXTENDED: u32 = u16::MAX as u32 + 269;

/// Split a delta or length into its 4-bit nibble and
/// big-endian extension bytes.
///
/// Yields `None` when `n` is larger than [`MAX_EXTENDED`].
pub(crate) fn opt_len_or_delta(n: u32) -> Option<(u8, tinyvec::ArrayVec<[u8; 2]>)> {
  let mut ext = tinyvec::ArrayVec::<[u8; 2]>::new();
  match n {
    | n if n >= 269 && n <= MAX_EXTENDED => {
      ext.extend_from_slice(&((n - 269) as u16).to_be_bytes());
      Some((14, ext))
    },
    | n if n >= 269 => None,
    | n if n >= 13 => {
      ext.push((n - 13) as u8);
      Some((13, ext))
    },
    | n => Some((n as u8, ext)),
  }
}

/// Parse options from the cursor until the payload marker or
/// the end of the datagram. The payload marker is not consumed.
pub(crate) fn parse_opts(bytes: &mut Cursor<'_>) -> Result<OptionMap, OptParseError> {
  let mut opts = OptionMap::new();
  let mut number = 0u32;

  loop {
    match bytes.peek_byte() {
      | None | Some(0xFF) => break Ok(opts),
      | Some(_) => (),
    }

    let head = bytes.next().ok_or_else(OptParseError::eof)?;
    let delta = parse_opt_len_or_delta(head >> 4,
                                       bytes,
                                       OptParseError::OptionDeltaReservedValue(head >> 4))?;
    let len = parse_opt_len_or_delta(head & 0b1111,
                                     bytes,
                                     OptParseError::ValueLengthReservedValue(head & 0b1111))?;

    number = number.checked_add(delta)
                   .ok_or(OptParseError::OptionNumberOverflow)?;

    let value = bytes.take_exact(len as usize)
                     .ok_or_else(OptParseError::eof)?;

    opts.entry(OptNumber(number))
        .or_insert_with(Vec::new)
        .push(OptValue(value.to_vec()));
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parse_opt_delta_and_length() {
    let del = 24;
    let len = 1;
    let byte = 0b_1101_0001u8;
    let bytes = [byte, del - 13, 1];
    let mut cur = Cursor::new(&bytes);
    let head = cur.next().unwrap();
    let d = parse_opt_len_or_delta(head >> 4, &mut cur, OptParseError::OptionDeltaReservedValue(13)).unwrap();
    let l = parse_opt_len_or_delta(head & 0b1111, &mut cur, OptParseError::ValueLengthReservedValue(1)).unwrap();
    assert_eq!(d, u32::from(del));
    assert_eq!(l, len);
  }

  #[test]
  fn reserved_nibble_is_error() {
    let mut cur = Cursor::new(&[]);
    assert_eq!(parse_opt_len_or_delta(15, &mut cur, OptParseError::OptionDeltaReservedValue(15)),
               Err(OptParseError::OptionDeltaReservedValue(15)));
  }

  #[test]
  fn truncated_extension_is_eof() {
    let mut cur = Cursor::new(&[1]);
    assert_eq!(parse_opt_len_or_delta(14, &mut cur, OptParseError::OptionDeltaReservedValue(15)),
               Err(OptParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn nibble_boundaries() {
    for n in [0u32, 12, 13, 268, 269, 65536 + 12, MAX_EXTENDED] {
      let (nib, ext) = opt_len_or_delta(n).unwrap();
      let mut cur = Cursor::new(ext.as_slice());
      let back = parse_opt_len_or_delta(nib, &mut cur, OptParseError::OptionDeltaReservedValue(15)).unwrap();
      assert_eq!(back, n, "{} should survive encoding", n);
      assert!(cur.is_exhausted());
    }

    assert_eq!(opt_len_or_delta(12).unwrap().1.len(), 0);
    assert_eq!(opt_len_or_delta(13).unwrap().1.len(), 1);
    assert_eq!(opt_len_or_delta(268).unwrap().1.len(), 1);
    assert_eq!(opt_len_or_delta(269).unwrap().1.len(), 2);
    assert!(opt_len_or_delta(MAX_EXTENDED + 1).is_none());
  }

  #[test]
  fn parse_opts_keeps_order_within_number() {
    // Uri-Path "a", Uri-Path "bc", Content-Format 0, then payload marker
    let bytes = [0b1011_0001, b'a', 0b0000_0010, b'b', b'c', 0b0001_0000, 0xFF, 1];
    let mut cur = Cursor::new(&bytes);
    let opts = parse_opts(&mut cur).unwrap();

    assert_eq!(opts.get(&OptNumber(11)).unwrap(),
               &vec![OptValue::string("a"), OptValue::string("bc")]);
    assert_eq!(opts.get(&OptNumber(12)).unwrap(), &vec![OptValue::empty()]);
    assert_eq!(cur.peek_byte(), Some(0xFF));
  }

  #[test]
  fn uint_values_are_minimal() {
    assert_eq!(OptValue::uint(0).len(), 0);
    assert_eq!(OptValue::uint(255).0, vec![255]);
    assert_eq!(OptValue::uint(0x0100_0000).0, vec![1, 0, 0, 0]);
    assert_eq!(OptValue(vec![0, 0, 1]).as_uint(), Some(1));
    assert_eq!(OptValue(vec![1, 2, 3, 4, 5]).as_uint(), None);
  }

  #[test]
  fn opt_number_qualities() {
    // critical, safe-to-fwd, cache-key
    let if_match = OptNumber(1);

    // critical, unsafe-to-fwd, cache-key
    let uri_host = OptNumber(3);

    // elective, safe-to-fwd, cache-key
    let etag = OptNumber(4);

    // elective, safe-to-fwd, no-cache-key
    let size1 = OptNumber(60);

    [&if_match, &uri_host].into_iter()
                          .for_each(|opt| assert_eq!(opt.must_be_processed(), OptionMustBeProcessed::Yes));

    [&etag, &size1].into_iter()
                   .for_each(|opt| assert_eq!(opt.must_be_processed(), OptionMustBeProcessed::No));

    [&if_match, &etag, &size1].into_iter().for_each(|opt| {
                                            assert_eq!(opt.when_unsupported_by_proxy(),
                                                       WhenOptionUnsupportedByProxy::Forward)
                                          });

    assert_eq!(uri_host.when_unsupported_by_proxy(), WhenOptionUnsupportedByProxy::Error);

    [&if_match, &uri_host, &etag].into_iter().for_each(|opt| {
                                               assert_eq!(opt.when_option_changes(),
                                                          WhenOptionChanges::ResponseChanges)
                                             });

    assert_eq!(size1.when_option_changes(), WhenOptionChanges::ResponseDoesNotChange);
    assert!(OptNumber(28).is_no_cache_key());
    assert!(!OptNumber(30).is_no_cache_key());
  }
}
