use embedded_time::duration::Milliseconds;
use embedded_time::rate::Fraction;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// A [`Clock`] backed by [`std::time::Instant`], counting
/// milliseconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct StdClock(std::time::Instant);

impl StdClock {
  /// Create a clock starting now
  pub fn new() -> Self {
    Self(std::time::Instant::now())
  }
}

impl Default for StdClock {
  fn default() -> Self {
    Self::new()
  }
}

impl embedded_time::Clock for StdClock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    let elapsed = self.0.elapsed().as_millis();
    u64::try_from(elapsed).map(Instant::new)
                          .map_err(|_| embedded_time::clock::Error::Unspecified)
  }
}

/// Timeout configuration allowing for "never time out" as an option
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy)]
pub enum Timeout {
  /// Timeout after some number of milliseconds has elapsed
  Millis(u64),
  /// Never time out
  Never,
}

impl Timeout {
  /// Get the timeout as a [`std::time::Duration`], if there is one
  pub fn as_duration(&self) -> Option<std::time::Duration> {
    match self {
      | Timeout::Millis(ms) => Some(std::time::Duration::from_millis(*ms)),
      | Timeout::Never => None,
    }
  }
}

/// Convert an instant of some clock to milliseconds since the clock's epoch.
///
/// Yields `None` if the number of milliseconds would overflow `u64`.
pub fn since_epoch<C: Clock>(instant: Instant<C>) -> Option<Millis> {
  Millis::try_from(instant.duration_since_epoch()).ok()
}

/// Add two durations, saturating at `u64::MAX`
pub fn add(a: Millis, b: Millis) -> Millis {
  Milliseconds(a.0.saturating_add(b.0))
}

/// Data associated with a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamped<T>(pub T, pub Millis);

impl<T> Stamped<T> {
  /// Borrow the data
  pub fn data(&self) -> &T {
    &self.0
  }

  /// When the data was stamped
  pub fn time(&self) -> Millis {
    self.1
  }

  /// Discard the timestamp
  pub fn discard_timestamp(self) -> T {
    self.0
  }

  /// Map the data, keeping the timestamp
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Stamped<R> {
    Stamped(f(self.0), self.1)
  }
}
