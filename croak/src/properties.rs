use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use embedded_time::duration::Milliseconds;

use crate::config::{Config, DedupStrategy};
use crate::retry::Attempts;
use crate::stem::Stem;

/// Names of the recognized properties
pub mod keys {
  /// [`Con::ack_timeout`](crate::config::Con::ack_timeout), in milliseconds
  pub const ACK_TIMEOUT: &str = "ACK_TIMEOUT";
  /// [`Con::ack_random_factor`](crate::config::Con::ack_random_factor)
  pub const ACK_RANDOM_FACTOR: &str = "ACK_RANDOM_FACTOR";
  /// [`Con::ack_timeout_scale`](crate::config::Con::ack_timeout_scale)
  pub const ACK_TIMEOUT_SCALE: &str = "ACK_TIMEOUT_SCALE";
  /// [`Con::max_retransmit`](crate::config::Con::max_retransmit)
  pub const MAX_RETRANSMIT: &str = "MAX_RETRANSMIT";
  /// [`Msg::max_message_size`](crate::config::Msg::max_message_size)
  pub const MAX_MESSAGE_SIZE: &str = "MAX_MESSAGE_SIZE";
  /// [`Msg::token_length`](crate::config::Msg::token_length)
  pub const TOKEN_SIZE_LIMIT: &str = "TOKEN_SIZE_LIMIT";
  /// [`Msg::max_latency`](crate::config::Msg::max_latency), in milliseconds
  pub const MAX_LATENCY: &str = "MAX_LATENCY";
  /// [`Block::default_block_size`](crate::config::Block::default_block_size)
  pub const PREFERRED_BLOCK_SIZE: &str = "PREFERRED_BLOCK_SIZE";
  /// [`Block::status_lifetime`](crate::config::Block::status_lifetime), in milliseconds
  pub const BLOCKWISE_STATUS_LIFETIME: &str = "BLOCKWISE_STATUS_LIFETIME";
  /// [`Block::max_resource_body_size`](crate::config::Block::max_resource_body_size)
  pub const MAX_RESOURCE_BODY_SIZE: &str = "MAX_RESOURCE_BODY_SIZE";
  /// [`Observe::notification_max_age`](crate::config::Observe::notification_max_age), in milliseconds
  pub const NOTIFICATION_MAX_AGE: &str = "NOTIFICATION_MAX_AGE";
  /// [`Observe::check_interval_time`](crate::config::Observe::check_interval_time), in milliseconds
  pub const NOTIFICATION_CHECK_INTERVAL_TIME: &str = "NOTIFICATION_CHECK_INTERVAL";
  /// [`Observe::check_interval_count`](crate::config::Observe::check_interval_count)
  pub const NOTIFICATION_CHECK_INTERVAL_COUNT: &str = "NOTIFICATION_CHECK_INTERVAL_COUNT";
  /// [`Observe::reregistration_backoff`](crate::config::Observe::reregistration_backoff), in milliseconds
  pub const NOTIFICATION_REREGISTRATION_BACKOFF: &str = "NOTIFICATION_REREGISTRATION_BACKOFF";
  /// [`Dedup::strategy`](crate::config::Dedup::strategy):
  /// `MARK_AND_SWEEP`, `CROP_ROTATION` or `NOOP`
  pub const DEDUPLICATOR: &str = "DEDUPLICATOR";
  /// [`Dedup::sweep_interval`](crate::config::Dedup::sweep_interval), in milliseconds
  pub const MARK_AND_SWEEP_INTERVAL: &str = "MARK_AND_SWEEP_INTERVAL";
  /// [`Config::exchange_lifetime`](crate::config::Config::exchange_lifetime), in milliseconds
  pub const EXCHANGE_LIFETIME: &str = "EXCHANGE_LIFETIME";

  /// Every recognized key
  pub const ALL: [&str; 17] = [ACK_TIMEOUT,
                               ACK_RANDOM_FACTOR,
                               ACK_TIMEOUT_SCALE,
                               MAX_RETRANSMIT,
                               MAX_MESSAGE_SIZE,
                               TOKEN_SIZE_LIMIT,
                               MAX_LATENCY,
                               PREFERRED_BLOCK_SIZE,
                               BLOCKWISE_STATUS_LIFETIME,
                               MAX_RESOURCE_BODY_SIZE,
                               NOTIFICATION_MAX_AGE,
                               NOTIFICATION_CHECK_INTERVAL_TIME,
                               NOTIFICATION_CHECK_INTERVAL_COUNT,
                               NOTIFICATION_REREGISTRATION_BACKOFF,
                               DEDUPLICATOR,
                               MARK_AND_SWEEP_INTERVAL,
                               EXCHANGE_LIFETIME];
}

/// Errors encountered while reading or changing properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyError {
  /// The key is not one of [`keys::ALL`]
  UnknownKey(String),
  /// The value could not be interpreted for the key
  InvalidValue {
    /// The property
    key: String,
    /// The offending value
    value: String,
  },
  /// The properties document was not valid JSON
  /// (or not a flat object)
  Json(String),
}

impl fmt::Display for PropertyError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      | Self::UnknownKey(k) => write!(f, "unknown property {}", k),
      | Self::InvalidValue { key, value } => write!(f, "invalid value {:?} for {}", value, key),
      | Self::Json(e) => write!(f, "invalid properties document: {}", e),
    }
  }
}

impl std::error::Error for PropertyError {}

type Listener = Box<dyn Fn(&str, &str) + Send + Sync>;

/// A flat key/value view of [`Config`] that can be loaded from a
/// document and changed at runtime.
///
/// Listeners registered with [`Properties::on_change`] are invoked
/// after every successful [`Properties::set`].
///
/// ```
/// use croak::config::Config;
/// use croak::properties::{keys, Properties};
///
/// let mut props = Properties::from_config(&Config::default());
/// assert_eq!(props.get(keys::MAX_RETRANSMIT), Some("4"));
///
/// props.set(keys::MAX_RETRANSMIT, "2").unwrap();
/// assert_eq!(props.to_config().unwrap().msg.con.max_retransmit.0, 2);
///
/// assert!(props.set(keys::MAX_RETRANSMIT, "lots").is_err());
/// assert!(props.set("FLUX_CAPACITANCE", "1.21").is_err());
/// ```
#[derive(Default)]
pub struct Properties {
  values: BTreeMap<String, String>,
  listeners: Vec<Listener>,
}

impl fmt::Debug for Properties {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Properties")
     .field("values", &self.values)
     .field("listeners", &self.listeners.len())
     .finish()
  }
}

impl Properties {
  /// Properties describing a config
  pub fn from_config(config: &Config) -> Self {
    let c = config;
    let dedup = match c.dedup.strategy {
      | DedupStrategy::MarkAndSweep => "MARK_AND_SWEEP",
      | DedupStrategy::CropRotation => "CROP_ROTATION",
      | DedupStrategy::Noop => "NOOP",
    };

    let values = [(keys::ACK_TIMEOUT, c.msg.con.ack_timeout.0.to_string()),
                  (keys::ACK_RANDOM_FACTOR, c.msg.con.ack_random_factor.to_string()),
                  (keys::ACK_TIMEOUT_SCALE, c.msg.con.ack_timeout_scale.to_string()),
                  (keys::MAX_RETRANSMIT, c.msg.con.max_retransmit.0.to_string()),
                  (keys::MAX_MESSAGE_SIZE, c.msg.max_message_size.to_string()),
                  (keys::TOKEN_SIZE_LIMIT, c.msg.token_length.to_string()),
                  (keys::MAX_LATENCY, c.msg.max_latency.0.to_string()),
                  (keys::PREFERRED_BLOCK_SIZE, c.block.default_block_size.to_string()),
                  (keys::BLOCKWISE_STATUS_LIFETIME, c.block.status_lifetime.0.to_string()),
                  (keys::MAX_RESOURCE_BODY_SIZE, c.block.max_resource_body_size.to_string()),
                  (keys::NOTIFICATION_MAX_AGE, c.observe.notification_max_age.0.to_string()),
                  (keys::NOTIFICATION_CHECK_INTERVAL_TIME, c.observe.check_interval_time.0.to_string()),
                  (keys::NOTIFICATION_CHECK_INTERVAL_COUNT, c.observe.check_interval_count.to_string()),
                  (keys::NOTIFICATION_REREGISTRATION_BACKOFF,
                   c.observe.reregistration_backoff.0.to_string()),
                  (keys::DEDUPLICATOR, dedup.to_string()),
                  (keys::MARK_AND_SWEEP_INTERVAL, c.dedup.sweep_interval.0.to_string()),
                  (keys::EXCHANGE_LIFETIME, c.exchange_lifetime().0.to_string())];

    Self { values: values.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
           listeners: vec![] }
  }

  /// Properties loaded from a flat JSON object, layered over the defaults.
  ///
  /// Values may be JSON strings or numbers.
  ///
  /// ```
  /// use croak::properties::{keys, Properties};
  ///
  /// let props = Properties::from_json(r#"{"ACK_TIMEOUT": 500, "DEDUPLICATOR": "NOOP"}"#).unwrap();
  /// let config = props.to_config().unwrap();
  ///
  /// assert_eq!(config.msg.con.ack_timeout.0, 500);
  /// assert_eq!(config.dedup.strategy, croak::config::DedupStrategy::Noop);
  /// ```
  #[cfg(feature = "std_serde_json")]
  pub fn from_json(json: &str) -> Result<Self, PropertyError> {
    let doc: BTreeMap<String, serde_json::Value> =
      serde_json::from_str(json).map_err(|e| PropertyError::Json(e.to_string()))?;

    doc.into_iter()
       .try_fold(Self::from_config(&Config::default()), |mut props, (k, v)| {
         let v = match v {
           | serde_json::Value::String(s) => s,
           | serde_json::Value::Number(n) => n.to_string(),
           | serde_json::Value::Bool(b) => b.to_string(),
           | other => return Err(PropertyError::InvalidValue { key: k, value: other.to_string() }),
         };
         props.set(&k, &v)?;
         Ok(props)
       })
  }

  /// Get the value of a property
  pub fn get(&self, key: &str) -> Option<&str> {
    self.values.get(key).map(String::as_str)
  }

  /// Change a property.
  ///
  /// The value is validated before it is stored; listeners are notified
  /// only when the change was accepted.
  pub fn set(&mut self, key: &str, value: &str) -> Result<(), PropertyError> {
    if !keys::ALL.contains(&key) {
      return Err(PropertyError::UnknownKey(key.to_string()));
    }

    apply(&mut Config::default(), key, value)?;
    self.values.insert(key.to_string(), value.to_string());
    self.listeners.iter().for_each(|f| f(key, value));
    Ok(())
  }

  /// Invoke `f` with the key and new value whenever a property changes
  pub fn on_change(&mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) {
    self.listeners.push(Box::new(f));
  }

  /// Keep a shared config in sync with changes made to these properties
  pub fn bind(&mut self, target: Arc<Stem<Config>>) {
    self.on_change(move |k, v| {
          target.map_mut(|c| {
                  if let Err(e) = apply(c, k, v) {
                    log::warn!("property {} not applied: {}", k, e);
                  }
                })
        });
  }

  /// Build a config from these properties
  pub fn to_config(&self) -> Result<Config, PropertyError> {
    let mut config = Config::default();
    let derived_lifetime = config.exchange_lifetime().0.to_string();

    self.values
        .iter()
        // an unchanged lifetime stays derived from the other settings
        .filter(|(k, v)| !(k.as_str() == keys::EXCHANGE_LIFETIME && **v == derived_lifetime))
        .try_for_each(|(k, v)| apply(&mut config, k, v))?;

    Ok(config)
  }
}

fn apply(c: &mut Config, key: &str, value: &str) -> Result<(), PropertyError> {
  fn parse<T: core::str::FromStr>(key: &str, value: &str) -> Result<T, PropertyError> {
    value.trim()
         .parse()
         .map_err(|_| PropertyError::InvalidValue { key: key.to_string(),
                                                    value: value.to_string() })
  }

  fn ms(key: &str, value: &str) -> Result<crate::time::Millis, PropertyError> {
    parse::<u64>(key, value).map(Milliseconds)
  }

  match key {
    | keys::ACK_TIMEOUT => c.msg.con.ack_timeout = ms(key, value)?,
    | keys::ACK_RANDOM_FACTOR => c.msg.con.ack_random_factor = parse(key, value)?,
    | keys::ACK_TIMEOUT_SCALE => c.msg.con.ack_timeout_scale = parse(key, value)?,
    | keys::MAX_RETRANSMIT => c.msg.con.max_retransmit = Attempts(parse(key, value)?),
    | keys::MAX_MESSAGE_SIZE => c.msg.max_message_size = parse(key, value)?,
    | keys::TOKEN_SIZE_LIMIT => match parse::<u8>(key, value)? {
      | n @ 0..=8 => c.msg.token_length = n,
      | _ => {
        return Err(PropertyError::InvalidValue { key: key.to_string(),
                                                 value: value.to_string() })
      },
    },
    | keys::MAX_LATENCY => c.msg.max_latency = ms(key, value)?,
    | keys::PREFERRED_BLOCK_SIZE => c.block.default_block_size = parse(key, value)?,
    | keys::BLOCKWISE_STATUS_LIFETIME => c.block.status_lifetime = ms(key, value)?,
    | keys::MAX_RESOURCE_BODY_SIZE => c.block.max_resource_body_size = parse(key, value)?,
    | keys::NOTIFICATION_MAX_AGE => c.observe.notification_max_age = ms(key, value)?,
    | keys::NOTIFICATION_CHECK_INTERVAL_TIME => c.observe.check_interval_time = ms(key, value)?,
    | keys::NOTIFICATION_CHECK_INTERVAL_COUNT => c.observe.check_interval_count = parse(key, value)?,
    | keys::NOTIFICATION_REREGISTRATION_BACKOFF => {
      c.observe.reregistration_backoff = ms(key, value)?
    },
    | keys::DEDUPLICATOR => {
      c.dedup.strategy = match value.trim() {
        | "MARK_AND_SWEEP" => DedupStrategy::MarkAndSweep,
        | "CROP_ROTATION" => DedupStrategy::CropRotation,
        | "NOOP" => DedupStrategy::Noop,
        | _ => {
          return Err(PropertyError::InvalidValue { key: key.to_string(),
                                                   value: value.to_string() })
        },
      }
    },
    | keys::MARK_AND_SWEEP_INTERVAL => c.dedup.sweep_interval = ms(key, value)?,
    | keys::EXCHANGE_LIFETIME => c.exchange_lifetime = Some(ms(key, value)?),
    | _ => return Err(PropertyError::UnknownKey(key.to_string())),
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use super::*;

  #[test]
  fn defaults_round_trip() {
    let props = Properties::from_config(&Config::default());
    assert_eq!(props.to_config().unwrap(), Config::default());
  }

  #[test]
  fn listeners_see_accepted_changes_only() {
    let seen = Arc::new(Mutex::new(vec![]));
    let mut props = Properties::default();
    let s = seen.clone();
    props.on_change(move |k, v| s.lock().unwrap().push(format!("{}={}", k, v)));

    props.set(keys::ACK_TIMEOUT, "100").unwrap();
    props.set(keys::TOKEN_SIZE_LIMIT, "9").unwrap_err();
    props.set(keys::DEDUPLICATOR, "CROP_ROTATION").unwrap();

    assert_eq!(*seen.lock().unwrap(),
               vec!["ACK_TIMEOUT=100".to_string(),
                    "DEDUPLICATOR=CROP_ROTATION".to_string()]);
  }

  #[test]
  fn bound_config_is_hot_reloaded() {
    let config = Arc::new(Stem::new(Config::default()));
    let mut props = Properties::from_config(&Config::default());
    props.bind(config.clone());

    props.set(keys::PREFERRED_BLOCK_SIZE, "64").unwrap();
    props.set(keys::EXCHANGE_LIFETIME, "1000").unwrap();

    config.map_ref(|c| {
            assert_eq!(c.block.default_block_size, 64);
            assert_eq!(c.exchange_lifetime().0, 1000);
          });
  }

  #[test]
  #[cfg(feature = "std_serde_json")]
  fn json_rejects_nested_values() {
    let err = Properties::from_json(r#"{"ACK_TIMEOUT": [1]}"#).unwrap_err();
    assert!(matches!(err, PropertyError::InvalidValue { .. }));

    let err = Properties::from_json("[1, 2]").unwrap_err();
    assert!(matches!(err, PropertyError::Json(_)));
  }
}
