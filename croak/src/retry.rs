use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use rand::Rng;

use crate::time::Millis;

/// A non-blocking timer that allows a fixed-delay or exponential-backoff retry,
/// that lives alongside some operation to retry.
///
/// It does not _contain_ the work to be done; the owner asks the timer
/// when the next attempt is due ([`RetryTimer::next_attempt_at`]) and
/// what to do once that time has come ([`RetryTimer::what_should_i_do`]).
///
/// ```
/// use embedded_time::duration::Milliseconds;
/// use croak::retry;
///
/// let strategy = retry::Strategy::Delay { min: Milliseconds(1000),
///                                         max: Milliseconds(1000) };
/// let mut retry = retry::RetryTimer::new(Milliseconds(0),
///                                        strategy,
///                                        retry::Attempts(2),
///                                        &mut rand::rngs::mock::StepRng::new(0, 1));
///
/// assert_eq!(retry.next_attempt_at(), Milliseconds(1000u64));
/// assert_eq!(retry.what_should_i_do(Milliseconds(999)),
///            Err(nb::Error::WouldBlock));
/// assert_eq!(retry.what_should_i_do(Milliseconds(1000)),
///            Ok(retry::YouShould::Retry));
/// assert_eq!(retry.what_should_i_do(Milliseconds(2000)),
///            Ok(retry::YouShould::Cry));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryTimer {
  start: Millis,
  init: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

impl RetryTimer {
  /// Create a new retrier, starting now.
  ///
  /// The first attempt is assumed to happen at `start`; the initial delay
  /// is drawn from the strategy's range using `rng` when the range has jitter.
  pub fn new(start: Millis, strategy: Strategy, max_attempts: Attempts, rng: &mut impl Rng) -> Self {
    Self { start,
           strategy,
           init: if strategy.has_jitter() {
             Milliseconds(rng.gen_range(strategy.range()))
           } else {
             Milliseconds(*strategy.range().start())
           },
           max_attempts,
           attempts: Attempts(1) }
  }

  /// Number of attempts made so far, including the first
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }

  /// The delay drawn for the first retry
  pub fn initial_delay(&self) -> Millis {
    self.init
  }

  /// When the next retry (or the final give-up) is due
  pub fn next_attempt_at(&self) -> Millis {
    Milliseconds(self.start.0.saturating_add(self.strategy.total_delay(self.init, self.attempts)))
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer "it failed again! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  pub fn what_should_i_do(&mut self, now: Millis) -> nb::Result<YouShould, core::convert::Infallible> {
    if now < self.next_attempt_at() {
      Err(nb::Error::WouldBlock)
    } else if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    }
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
  /// Generate a random delay between `init_min` and `init_max`,
  /// and wait until this delay has passed before the second attempt.
  ///
  /// After each failed attempt, multiply the delay by `scale`.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Millis,
    /// Maximum (inclusive) delay for second attempt
    init_max: Millis,
    /// Factor the delay grows by after each attempt
    scale: f32,
  },
  /// Generate a random delay between `min` and `max`,
  /// and wait until this delay has passed between attempts.
  Delay {
    /// Minimum (inclusive) delay for attempts
    min: Millis,
    /// Maximum (inclusive) delay for attempts
    max: Millis,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Delay { min: Milliseconds(min),
                       max: Milliseconds(max), } => (min..=max.max(min)),

      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max),
                             .. } => (min..=max.max(min)),
    }
  }

  /// Get the amount of time this strategy will take if all attempts fail
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::retry::{Attempts, Strategy};
  ///
  /// let s = Strategy::Exponential { init_min: Milliseconds(2000),
  ///                                 init_max: Milliseconds(3000),
  ///                                 scale: 2.0 };
  /// assert_eq!(s.max_time(Attempts(4)), Milliseconds(45_000u64));
  /// assert_eq!(s.max_time(Attempts(5)), Milliseconds(93_000u64));
  /// ```
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    let init = Milliseconds(*self.range().end());
    Milliseconds(self.total_delay(init, max_attempts))
  }

  /// Given the initial delay and number of attempts that have been performed,
  /// yields the time since the first attempt at which the next one is due.
  fn total_delay(&self, Milliseconds(init): Millis, attempts: Attempts) -> u64 {
    match self {
      | Self::Delay { .. } => init.saturating_mul(u64::from(attempts.0)),
      | Self::Exponential { scale, .. } => {
        // | attempts | total delay                   |
        // | 1        | init                          |
        // | 2        | init + init*s                 |
        // | n        | init * (1 + s + .. + s^(n-1)) |
        let scale = f64::from(*scale);
        let sum = (0..attempts.0).map(|n| scale.powi(i32::from(n))).sum::<f64>();
        (init as f64 * sum) as u64
      },
    }
  }
}

#[cfg(test)]
mod test {
  use rand::rngs::mock::StepRng;
  use rand::SeedableRng;

  use super::*;

  fn ms(n: u64) -> Millis {
    Milliseconds(n)
  }

  #[test]
  fn delay_retrier() {
    let mut retry = RetryTimer::new(ms(0),
                                    Strategy::Delay { min: ms(1000),
                                                      max: ms(1000) },
                                    Attempts(5),
                                    &mut StepRng::new(0, 1));

    // attempt 1 happens before asking what_should_i_do

    assert_eq!(retry.what_should_i_do(ms(999)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(ms(1000)).unwrap(), YouShould::Retry);

    assert_eq!(retry.what_should_i_do(ms(1999)).unwrap_err(),
               nb::Error::WouldBlock);
    assert_eq!(retry.what_should_i_do(ms(2000)).unwrap(), YouShould::Retry);

    assert_eq!(retry.what_should_i_do(ms(10_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.what_should_i_do(ms(10_000)).unwrap(), YouShould::Retry);
    assert_eq!(retry.attempts(), Attempts(5));
    assert_eq!(retry.what_should_i_do(ms(10_000)).unwrap(), YouShould::Cry);
  }

  #[test]
  fn exponential_retrier() {
    let mut retry = RetryTimer::new(ms(0),
                                    Strategy::Exponential { init_min: ms(1000),
                                                            init_max: ms(1000),
                                                            scale: 2.0 },
                                    Attempts(5),
                                    &mut StepRng::new(0, 1));

    let mut due = vec![];
    loop {
      let at = retry.next_attempt_at();
      assert_eq!(retry.what_should_i_do(Milliseconds(at.0 - 1)).unwrap_err(),
                 nb::Error::WouldBlock);
      match retry.what_should_i_do(at).unwrap() {
        | YouShould::Retry => due.push(at.0),
        | YouShould::Cry => {
          assert_eq!(at, ms(31_000));
          break;
        },
      }
    }

    assert_eq!(due, vec![1000, 3000, 7000, 15_000]);
  }

  #[test]
  fn jitter_stays_in_range() {
    let strategy = Strategy::Exponential { init_min: ms(2000),
                                           init_max: ms(3000),
                                           scale: 2.0 };
    let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(7);
    for _ in 0..100 {
      let init = RetryTimer::new(ms(0), strategy, Attempts(5), &mut rng).initial_delay();
      assert!((2000..=3000).contains(&init.0));
    }
  }

  #[test]
  fn scaled_intervals_increase() {
    let strategy = Strategy::Exponential { init_min: ms(100),
                                           init_max: ms(100),
                                           scale: 1.5 };
    let totals = (1..=4).map(|n| strategy.total_delay(ms(100), Attempts(n)))
                        .collect::<Vec<_>>();
    assert_eq!(totals, vec![100, 250, 475, 812]);
  }
}
