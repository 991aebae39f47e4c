use embedded_time::duration::Milliseconds;

use crate::retry::{Attempts, Strategy};
use crate::time::Millis;

/// Configuration options related to retransmitting CON messages
/// that have not been acknowledged
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Con {
  /// Minimum time to wait for an ACK before the first retransmission.
  ///
  /// Defaults to 2 seconds.
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Con;
  ///
  /// assert_eq!(Con::default().ack_timeout, Milliseconds(2_000u64));
  /// ```
  pub ack_timeout: Millis,
  /// The initial timeout is drawn at random between `ack_timeout`
  /// and `ack_timeout * ack_random_factor`.
  ///
  /// Defaults to 1.5
  /// ```
  /// use croak::config::Con;
  ///
  /// assert_eq!(Con::default().ack_random_factor, 1.5);
  /// ```
  pub ack_random_factor: f32,
  /// After each retransmission the timeout is multiplied by this.
  ///
  /// Defaults to 2
  /// ```
  /// use croak::config::Con;
  ///
  /// assert_eq!(Con::default().ack_timeout_scale, 2.0);
  /// ```
  pub ack_timeout_scale: f32,
  /// Number of times we are allowed to retransmit a CON message
  /// before giving up on it.
  ///
  /// Defaults to 4
  /// ```
  /// use croak::config::Con;
  /// use croak::retry::Attempts;
  ///
  /// assert_eq!(Con::default().max_retransmit, Attempts(4));
  /// ```
  pub max_retransmit: Attempts,
}

impl Con {
  /// The retry strategy described by these settings
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Con;
  /// use croak::retry::Strategy;
  ///
  /// assert_eq!(Con::default().retry_strategy(),
  ///            Strategy::Exponential { init_min: Milliseconds(2_000),
  ///                                    init_max: Milliseconds(3_000),
  ///                                    scale: 2.0 });
  /// ```
  pub fn retry_strategy(&self) -> Strategy {
    let max = (self.ack_timeout.0 as f64 * f64::from(self.ack_random_factor.max(1.0))) as u64;
    Strategy::Exponential { init_min: self.ack_timeout,
                            init_max: Milliseconds(max),
                            scale: self.ack_timeout_scale }
  }

  /// Total number of transmissions a CON message gets, the first included
  pub fn max_attempts(&self) -> Attempts {
    Attempts(self.max_retransmit.0.saturating_add(1))
  }
}

impl Default for Con {
  fn default() -> Self {
    Con { ack_timeout: Milliseconds(2_000),
          ack_random_factor: 1.5,
          ack_timeout_scale: 2.0,
          max_retransmit: Attempts(4) }
  }
}

/// Configuration options related to parsing & handling messages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Msg {
  /// Length of the tokens we generate for outbound requests.
  ///
  /// Grows automatically (up to 8) when a generated token collides
  /// with one still in use.
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().token_length, 4);
  /// ```
  pub token_length: u8,

  /// Largest message we send without resorting to blockwise transfer.
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().max_message_size, 1024);
  /// ```
  pub max_message_size: usize,

  /// Start message ids at a random number rather than 0
  ///
  /// ```
  /// use croak::config::Msg;
  ///
  /// assert!(Msg::default().randomize_mid_start);
  /// ```
  pub randomize_mid_start: bool,

  /// See [`Con`]
  pub con: Con,

  /// Upper bound on the time a datagram spends in the network.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Msg;
  ///
  /// assert_eq!(Msg::default().max_latency, Milliseconds(100_000u64));
  /// ```
  pub max_latency: Millis,
}

impl Default for Msg {
  fn default() -> Self {
    Msg { token_length: 4,
          max_message_size: 1024,
          randomize_mid_start: true,
          con: Con::default(),
          max_latency: Milliseconds(100_000) }
  }
}

/// Configuration options related to blockwise transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  /// Block size we prefer when splitting bodies
  ///
  /// ```
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().default_block_size, 512);
  /// ```
  pub default_block_size: u16,

  /// How long an idle transfer is kept before it is discarded
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().status_lifetime, Milliseconds(300_000u64));
  /// ```
  pub status_lifetime: Millis,

  /// Largest body we are willing to reassemble.
  ///
  /// Bigger transfers are refused with 4.13 (Request Entity Too Large).
  ///
  /// ```
  /// use croak::config::Block;
  ///
  /// assert_eq!(Block::default().max_resource_body_size, 16_384);
  /// ```
  pub max_resource_body_size: usize,
}

impl Default for Block {
  fn default() -> Self {
    Block { default_block_size: 512,
            status_lifetime: Milliseconds(300_000),
            max_resource_body_size: 16_384 }
  }
}

/// Configuration options related to observing resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Observe {
  /// Freshness window of a notification when it carries no Max-Age.
  ///
  /// A notification older than this is superseded by any newer one,
  /// regardless of sequence numbers.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Observe;
  ///
  /// assert_eq!(Observe::default().notification_max_age, Milliseconds(128_000u64));
  /// ```
  pub notification_max_age: Millis,

  /// Send a CON notification at least this often, to check
  /// that the observer is still interested.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Observe;
  ///
  /// assert_eq!(Observe::default().check_interval_time,
  ///            Milliseconds(86_400_000u64));
  /// ```
  pub check_interval_time: Millis,

  /// Send a CON notification at least every this many notifications.
  ///
  /// ```
  /// use croak::config::Observe;
  ///
  /// assert_eq!(Observe::default().check_interval_count, 100);
  /// ```
  pub check_interval_count: u32,

  /// Upper bound of the random delay added to Max-Age
  /// before a client re-registers.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Observe;
  ///
  /// assert_eq!(Observe::default().reregistration_backoff, Milliseconds(2_000u64));
  /// ```
  pub reregistration_backoff: Millis,
}

impl Default for Observe {
  fn default() -> Self {
    Observe { notification_max_age: Milliseconds(128_000),
              check_interval_time: Milliseconds(86_400_000),
              check_interval_count: 100,
              reregistration_backoff: Milliseconds(2_000) }
  }
}

/// How previously seen messages are remembered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DedupStrategy {
  /// Stamp every entry and periodically drop those older
  /// than the exchange lifetime
  MarkAndSweep,
  /// Keep entries in generations; every period the oldest
  /// generation is dropped wholesale
  CropRotation,
  /// Never detect duplicates
  Noop,
}

/// Configuration options related to deduplication
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dedup {
  /// See [`DedupStrategy`]
  ///
  /// ```
  /// use croak::config::{Dedup, DedupStrategy};
  ///
  /// assert_eq!(Dedup::default().strategy, DedupStrategy::MarkAndSweep);
  /// ```
  pub strategy: DedupStrategy,

  /// How often the deduplicator is swept (or rotated)
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Dedup;
  ///
  /// assert_eq!(Dedup::default().sweep_interval, Milliseconds(10_000u64));
  /// ```
  pub sweep_interval: Millis,
}

impl Default for Dedup {
  fn default() -> Self {
    Dedup { strategy: DedupStrategy::MarkAndSweep,
            sweep_interval: Milliseconds(10_000) }
  }
}

/// Runtime config
///
/// Every operation reads a fresh copy, so changes made through
/// [`Properties`](crate::properties::Properties) take effect immediately.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Config {
  /// See [`Msg`]
  pub msg: Msg,
  /// See [`Block`]
  pub block: Block,
  /// See [`Observe`]
  pub observe: Observe,
  /// See [`Dedup`]
  pub dedup: Dedup,
  /// Use this instead of the derived [`Config::exchange_lifetime`]
  pub exchange_lifetime: Option<Millis>,
}

impl Config {
  /// Time from the first transmission of a CON message
  /// to its last retransmission
  pub fn max_transmit_span(&self) -> Millis {
    self.msg.con.retry_strategy().max_time(self.msg.con.max_retransmit)
  }

  /// Time from the first transmission of a CON message
  /// to when the sender gives up waiting for an ACK
  pub fn max_transmit_wait(&self) -> Millis {
    self.msg.con.retry_strategy().max_time(self.msg.con.max_attempts())
  }

  /// Time a node takes to turn a CON into an ACK
  pub fn processing_delay(&self) -> Millis {
    self.msg.con.ack_timeout
  }

  /// Time from starting to send a CON message to when
  /// its message id can safely be reused.
  ///
  /// ```
  /// use embedded_time::duration::Milliseconds;
  /// use croak::config::Config;
  ///
  /// assert_eq!(Config::default().exchange_lifetime(), Milliseconds(247_000u64));
  /// ```
  pub fn exchange_lifetime(&self) -> Millis {
    self.exchange_lifetime.unwrap_or_else(|| {
                            Milliseconds(self.max_transmit_span().0
                                         + 2 * self.msg.max_latency.0
                                         + self.processing_delay().0)
                          })
  }

  /// Time from sending a NON message to when its
  /// message id can safely be reused
  pub fn non_lifetime(&self) -> Millis {
    Milliseconds(self.max_transmit_span().0 + self.msg.max_latency.0)
  }
}
