use core::fmt::Debug;
use std::collections::HashMap;
use std::sync::Arc;

use embedded_time::duration::Milliseconds;

use super::KeyId;
use crate::config::DedupStrategy;
use crate::exchange::Exchange;
use crate::time::{Millis, Stamped};

/// Remembers inbound messages by [`KeyId`] so that retransmitted
/// duplicates are recognized.
pub trait Deduplicator: Debug + Send {
  /// Find the exchange a message with this key was seen in before;
  /// if it was not seen before, remember it as belonging to `exchange`.
  fn find_previous(&mut self, key: KeyId, exchange: &Arc<Exchange>, now: Millis) -> Option<Arc<Exchange>>;

  /// Find the exchange a message with this key was seen in, without remembering it
  fn find(&self, key: &KeyId) -> Option<Arc<Exchange>>;

  /// Forget what is older than `lifetime`
  fn sweep(&mut self, now: Millis, lifetime: Millis);

  /// Number of remembered messages
  fn len(&self) -> usize;

  /// Is nothing remembered?
  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Forget everything
  fn clear(&mut self);

  /// The strategy this deduplicator implements
  fn strategy(&self) -> DedupStrategy;
}

/// Create a deduplicator
pub fn new(strategy: DedupStrategy) -> Box<dyn Deduplicator> {
  match strategy {
    | DedupStrategy::MarkAndSweep => Box::new(MarkAndSweep::default()),
    | DedupStrategy::CropRotation => Box::new(CropRotation::default()),
    | DedupStrategy::Noop => Box::new(Noop),
  }
}

/// Every entry is stamped with the time it was first seen;
/// a sweep drops the entries older than the exchange lifetime.
#[derive(Debug, Default)]
pub struct MarkAndSweep {
  entries: HashMap<KeyId, Stamped<Arc<Exchange>>>,
}

impl Deduplicator for MarkAndSweep {
  fn find_previous(&mut self, key: KeyId, exchange: &Arc<Exchange>, now: Millis) -> Option<Arc<Exchange>> {
    match self.entries.get(&key) {
      | Some(prev) => Some(prev.data().clone()),
      | None => {
        self.entries.insert(key, Stamped(exchange.clone(), now));
        None
      },
    }
  }

  fn find(&self, key: &KeyId) -> Option<Arc<Exchange>> {
    self.entries.get(key).map(|s| s.data().clone())
  }

  fn sweep(&mut self, now: Millis, lifetime: Millis) {
    let before = self.entries.len();
    self.entries
        .retain(|_, s| now.0.saturating_sub(s.time().0) < lifetime.0);

    let swept = before - self.entries.len();
    if swept > 0 {
      log::trace!("mark and sweep: forgot {} of {} messages", swept, before);
    }
  }

  fn len(&self) -> usize {
    self.entries.len()
  }

  fn clear(&mut self) {
    self.entries.clear()
  }

  fn strategy(&self) -> DedupStrategy {
    DedupStrategy::MarkAndSweep
  }
}

/// Entries are kept in three generations. Every half lifetime the
/// oldest generation is dropped and becomes the current one, so an
/// entry is remembered for at least one lifetime.
#[derive(Debug, Default)]
pub struct CropRotation {
  generations: [HashMap<KeyId, Arc<Exchange>>; 3],
  current: usize,
  last_rotation: Option<Millis>,
}

impl CropRotation {
  fn rotate(&mut self) {
    self.current = (self.current + 1) % self.generations.len();
    self.generations[self.current].clear();
  }
}

impl Deduplicator for CropRotation {
  fn find_previous(&mut self, key: KeyId, exchange: &Arc<Exchange>, _: Millis) -> Option<Arc<Exchange>> {
    match self.find(&key) {
      | Some(prev) => Some(prev),
      | None => {
        self.generations[self.current].insert(key, exchange.clone());
        None
      },
    }
  }

  fn find(&self, key: &KeyId) -> Option<Arc<Exchange>> {
    self.generations.iter().find_map(|g| g.get(key).cloned())
  }

  fn sweep(&mut self, now: Millis, lifetime: Millis) {
    let period = Milliseconds(lifetime.0 / 2);
    match self.last_rotation {
      | None => self.last_rotation = Some(now),
      | Some(last) if now.0.saturating_sub(last.0) >= period.0 => {
        self.rotate();
        self.last_rotation = Some(now);
      },
      | Some(_) => (),
    }
  }

  fn len(&self) -> usize {
    self.generations.iter().map(HashMap::len).sum()
  }

  fn clear(&mut self) {
    self.generations.iter_mut().for_each(HashMap::clear)
  }

  fn strategy(&self) -> DedupStrategy {
    DedupStrategy::CropRotation
  }
}

/// Never detects duplicates
#[derive(Debug, Default, Clone, Copy)]
pub struct Noop;

impl Deduplicator for Noop {
  fn find_previous(&mut self, _: KeyId, _: &Arc<Exchange>, _: Millis) -> Option<Arc<Exchange>> {
    None
  }

  fn find(&self, _: &KeyId) -> Option<Arc<Exchange>> {
    None
  }

  fn sweep(&mut self, _: Millis, _: Millis) {}

  fn len(&self) -> usize {
    0
  }

  fn clear(&mut self) {}

  fn strategy(&self) -> DedupStrategy {
    DedupStrategy::Noop
  }
}

#[cfg(test)]
mod tests {
  use croak_msg::Id;

  use super::*;
  use crate::exchange::Origin;
  use crate::matcher::Namespace;
  use crate::net::SessionId;
  use crate::req::Req;

  fn key(n: u16) -> KeyId {
    KeyId { id: Id(n),
            remote: "127.0.0.1:5683".parse().unwrap(),
            session: SessionId::default(),
            ns: Namespace::Remote }
  }

  fn exchange() -> Arc<Exchange> {
    Arc::new(Exchange::new(Origin::Remote,
                           Req::get("127.0.0.1:5683".parse().unwrap(), "a"),
                           SessionId::default()))
  }

  fn ms(n: u64) -> Millis {
    Milliseconds(n)
  }

  #[test]
  fn mark_and_sweep() {
    let mut d = MarkAndSweep::default();
    let ex = exchange();

    assert!(d.find_previous(key(1), &ex, ms(0)).is_none());
    assert!(d.find_previous(key(2), &ex, ms(500)).is_none());
    assert_eq!(d.find_previous(key(1), &exchange(), ms(600)).map(|e| e.id()),
               Some(ex.id()));

    d.sweep(ms(1000), ms(1000));
    assert!(d.find(&key(1)).is_none());
    assert!(d.find(&key(2)).is_some());
  }

  #[test]
  fn crop_rotation_keeps_entries_for_a_lifetime() {
    let mut d = CropRotation::default();
    let ex = exchange();

    d.sweep(ms(0), ms(1000));
    d.find_previous(key(1), &ex, ms(0));

    d.sweep(ms(500), ms(1000));
    assert!(d.find(&key(1)).is_some());
    d.sweep(ms(1000), ms(1000));
    assert!(d.find(&key(1)).is_some());
    d.sweep(ms(1500), ms(1000));
    assert!(d.find(&key(1)).is_none());
  }

  #[test]
  fn noop_never_finds() {
    let mut d = Noop;
    let ex = exchange();
    d.find_previous(key(1), &ex, ms(0));
    assert!(d.find_previous(key(1), &ex, ms(0)).is_none());
    assert!(d.is_empty());
  }
}
