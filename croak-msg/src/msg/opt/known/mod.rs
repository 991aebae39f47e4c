use super::OptNumber;

/// Content-Format values
pub mod content_format;
pub use content_format::*;

/// Block1 / Block2 values
pub mod block;
pub use block::*;

/// Observe values
pub mod observe;

macro_rules! opt {
  (#[doc = $doc:expr] $name:ident = $n:literal) => {
    #[doc = $doc]
    pub const $name: crate::OptNumber = crate::OptNumber($n);
  };
}

pub(crate) use opt;

/// Non-repeatable options
pub mod no_repeat {
  use super::opt;

  opt!(#[doc = "Uri-Host (RFC 7252 5.10.1)"]
       HOST = 3);
  opt!(#[doc = "If-None-Match (RFC 7252 5.10.8.2)"]
       IF_NONE_MATCH = 5);
  opt!(#[doc = "Observe (RFC 7641 2)"]
       OBSERVE = 6);
  opt!(#[doc = "Uri-Port (RFC 7252 5.10.1)"]
       PORT = 7);
  opt!(#[doc = "OSCORE (RFC 8613 2)"]
       OSCORE = 9);
  opt!(#[doc = "Content-Format (RFC 7252 5.10.3)"]
       CONTENT_FORMAT = 12);
  opt!(#[doc = "Max-Age (RFC 7252 5.10.5)"]
       MAX_AGE = 14);
  opt!(#[doc = "Accept (RFC 7252 5.10.4)"]
       ACCEPT = 17);
  opt!(#[doc = "Block2 (RFC 7959 2.1)"]
       BLOCK2 = 23);
  opt!(#[doc = "Block1 (RFC 7959 2.1)"]
       BLOCK1 = 27);
  opt!(#[doc = "Size2 (RFC 7959 4)"]
       SIZE2 = 28);
  opt!(#[doc = "Proxy-Uri (RFC 7252 5.10.2)"]
       PROXY_URI = 35);
  opt!(#[doc = "Proxy-Scheme (RFC 7252 5.10.2)"]
       PROXY_SCHEME = 39);
  opt!(#[doc = "Size1 (RFC 7252 5.10.9)"]
       SIZE1 = 60);
}

/// Repeatable options
pub mod repeat {
  use super::opt;

  opt!(#[doc = "If-Match (RFC 7252 5.10.8.1)"]
       IF_MATCH = 1);
  opt!(#[doc = "ETag (RFC 7252 5.10.6)"]
       ETAG = 4);
  opt!(#[doc = "Location-Path (RFC 7252 5.10.7)"]
       LOCATION_PATH = 8);
  opt!(#[doc = "Uri-Path (RFC 7252 5.10.1)"]
       PATH = 11);
  opt!(#[doc = "Uri-Query (RFC 7252 5.10.1)"]
       QUERY = 15);
  opt!(#[doc = "Location-Query (RFC 7252 5.10.7)"]
       LOCATION_QUERY = 20);
}

/// Options of signaling messages (RFC 8323 5).
///
/// Signal option numbers are scoped to the signal code they
/// appear in, so the same number means different things in
/// different signals.
pub mod signal {
  use super::opt;

  /// CSM (7.01) options
  pub mod csm {
    use super::opt;

    opt!(#[doc = "Max-Message-Size"]
         MAX_MESSAGE_SIZE = 2);
    opt!(#[doc = "Block-Wise-Transfer"]
         BLOCK_WISE_TRANSFER = 4);
  }

  opt!(#[doc = "Custody (Ping 7.02 and Pong 7.03)"]
       CUSTODY = 2);

  /// Release (7.04) options
  pub mod release {
    use super::opt;

    opt!(#[doc = "Alternative-Address"]
         ALTERNATIVE_ADDRESS = 2);
    opt!(#[doc = "Hold-Off"]
         HOLD_OFF = 4);
  }

  opt!(#[doc = "Bad-CSM-Option (Abort 7.05)"]
       BAD_CSM_OPTION = 2);
}

/// How an option's value bytes are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OptFormat {
  /// Zero-length value
  Empty,
  /// Opaque bytes
  Opaque,
  /// Non-negative integer, big-endian with leading zeros stripped
  Uint,
  /// UTF-8 string
  String,
}

/// Get the value format of a registered (non-signal) option.
///
/// Unregistered options are treated as opaque.
///
/// ```
/// use croak_msg::{known, OptFormat};
///
/// assert_eq!(known::format_of(known::repeat::PATH), OptFormat::String);
/// assert_eq!(known::format_of(known::no_repeat::BLOCK2), OptFormat::Uint);
/// assert_eq!(known::format_of(croak_msg::OptNumber(65000)), OptFormat::Opaque);
/// ```
pub fn format_of(n: OptNumber) -> OptFormat {
  match n.0 {
    | 5 => OptFormat::Empty,
    | 6 | 7 | 12 | 14 | 17 | 23 | 27 | 28 | 60 => OptFormat::Uint,
    | 3 | 8 | 11 | 15 | 20 | 35 | 39 => OptFormat::String,
    | _ => OptFormat::Opaque,
  }
}

/// Whether a registered option may appear more than once
pub fn is_repeatable(n: OptNumber) -> bool {
  matches!(n.0, 1 | 4 | 8 | 11 | 15 | 20) || name_of(n).is_none()
}

/// The registered name of an option, if any
pub fn name_of(n: OptNumber) -> Option<&'static str> {
  Some(match n.0 {
         | 1 => "If-Match",
         | 3 => "Uri-Host",
         | 4 => "ETag",
         | 5 => "If-None-Match",
         | 6 => "Observe",
         | 7 => "Uri-Port",
         | 8 => "Location-Path",
         | 9 => "OSCORE",
         | 11 => "Uri-Path",
         | 12 => "Content-Format",
         | 14 => "Max-Age",
         | 15 => "Uri-Query",
         | 17 => "Accept",
         | 20 => "Location-Query",
         | 23 => "Block2",
         | 27 => "Block1",
         | 28 => "Size2",
         | 35 => "Proxy-Uri",
         | 39 => "Proxy-Scheme",
         | 60 => "Size1",
         | _ => return None,
       })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn block_options_are_no_cache_key_safe() {
    // Block options are critical and unsafe, size options are elective and NoCacheKey
    assert!(no_repeat::BLOCK1.is_critical());
    assert!(no_repeat::BLOCK2.is_critical());
    assert!(no_repeat::SIZE1.is_no_cache_key());
    assert!(no_repeat::SIZE2.is_no_cache_key());
    assert!(!no_repeat::OBSERVE.is_critical());
  }

  #[test]
  fn names() {
    assert_eq!(name_of(no_repeat::OSCORE), Some("OSCORE"));
    assert_eq!(name_of(OptNumber(2)), None);
    assert!(is_repeatable(repeat::PATH));
    assert!(!is_repeatable(no_repeat::CONTENT_FORMAT));
  }
}
