/// Values of the Observe option in a request
///
/// ```
/// use croak_msg::observe::Action;
///
/// assert_eq!(Action::from_uint(0), Some(Action::Register));
/// assert_eq!(Action::from_uint(1), Some(Action::Deregister));
/// assert_eq!(Action::from_uint(2), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
  /// Add the requester to the list of observers of the target resource
  Register,
  /// Remove the requester from the list of observers
  Deregister,
}

impl Action {
  /// Interpret an Observe option value sent in a request
  pub fn from_uint(n: u32) -> Option<Self> {
    match n {
      | 0 => Some(Self::Register),
      | 1 => Some(Self::Deregister),
      | _ => None,
    }
  }

  /// The Observe option value for this action
  pub fn to_uint(self) -> u32 {
    match self {
      | Self::Register => 0,
      | Self::Deregister => 1,
    }
  }
}

/// Observe sequence numbers are 24 bits wide
pub const SEQUENCE_MASK: u32 = 0x00FF_FFFF;

/// Half of the sequence number space; the window in which
/// a larger number is considered newer
pub const SEQUENCE_HALF: u32 = 1 << 23;

/// Increment a 24-bit observe sequence number, wrapping around
///
/// ```
/// use croak_msg::observe::next_sequence;
///
/// assert_eq!(next_sequence(1), 2);
/// assert_eq!(next_sequence(0xFF_FFFF), 0);
/// ```
pub fn next_sequence(n: u32) -> u32 {
  n.wrapping_add(1) & SEQUENCE_MASK
}

/// Is sequence number `incoming` newer than `current`,
/// ignoring the max-age fallback?
///
/// ```
/// use croak_msg::observe::is_newer;
///
/// assert!(is_newer(1, 2));
/// assert!(!is_newer(2, 1));
/// assert!(!is_newer(7, 7));
/// assert!(is_newer(16777210, 5));
/// ```
pub fn is_newer(current: u32, incoming: u32) -> bool {
  let (v1, v2) = (current & SEQUENCE_MASK, incoming & SEQUENCE_MASK);
  (v1 < v2 && v2 - v1 < SEQUENCE_HALF) || (v1 > v2 && v1 - v2 > SEQUENCE_HALF)
}
