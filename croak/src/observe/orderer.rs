use croak_msg::observe::is_newer;

use crate::time::{Millis, Stamped};

/// Decides whether a notification is fresher than the last one
/// accepted, as described in RFC 7641 section 3.4.
///
/// A notification is fresh when its sequence number is newer than the
/// last accepted one (modulo 2^24), or when the last accepted one is
/// older than the notification max age.
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use croak::observe::NotificationOrderer;
///
/// let max_age = Milliseconds(128_000u64);
/// let mut orderer = NotificationOrderer::default();
///
/// assert!(orderer.is_fresh(16_777_210, Milliseconds(0), max_age));
/// assert!(orderer.is_fresh(5, Milliseconds(10), max_age));
/// assert!(!orderer.is_fresh(5, Milliseconds(20), max_age));
/// assert!(orderer.is_fresh(5, Milliseconds(128_011), max_age));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationOrderer {
  last: Option<Stamped<u32>>,
}

impl NotificationOrderer {
  /// Is a notification with sequence number `number`, arriving at `now`,
  /// fresher than the last one accepted? If so it becomes the last one accepted.
  pub fn is_fresh(&mut self, number: u32, now: Millis, max_age: Millis) -> bool {
    let fresh = match self.last {
      | None => true,
      | Some(Stamped(last, at)) => {
        is_newer(last, number) || now.0 > at.0.saturating_add(max_age.0)
      },
    };

    if fresh {
      self.last = Some(Stamped(number, now));
    }

    fresh
  }

  /// Sequence number of the last accepted notification
  pub fn current(&self) -> Option<u32> {
    self.last.map(|s| s.0)
  }

  /// When the last notification was accepted
  pub fn last_accepted_at(&self) -> Option<Millis> {
    self.last.map(|s| s.time())
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;

  const MAX_AGE: Millis = Milliseconds(128_000);

  fn ms(n: u64) -> Millis {
    Milliseconds(n)
  }

  #[test]
  fn wraparound_is_newer() {
    let mut o = NotificationOrderer::default();
    assert!(o.is_fresh(16_777_210, ms(0), MAX_AGE));
    assert!(o.is_fresh(5, ms(1), MAX_AGE));
    assert_eq!(o.current(), Some(5));
  }

  #[test]
  fn equal_is_stale_until_max_age() {
    let mut o = NotificationOrderer::default();
    assert!(o.is_fresh(7, ms(0), MAX_AGE));
    assert!(!o.is_fresh(7, ms(1), MAX_AGE));
    assert!(!o.is_fresh(7, ms(128_000), MAX_AGE));
    assert!(o.is_fresh(7, ms(128_001), MAX_AGE));
    assert_eq!(o.last_accepted_at(), Some(ms(128_001)));
  }

  #[test]
  fn older_is_stale() {
    let mut o = NotificationOrderer::default();
    assert!(o.is_fresh(100, ms(0), MAX_AGE));
    assert!(!o.is_fresh(99, ms(1), MAX_AGE));
    assert!(!o.is_fresh(100 + (1 << 23) + 1, ms(2), MAX_AGE));
  }
}
