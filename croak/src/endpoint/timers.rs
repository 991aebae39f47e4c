use std::collections::BTreeMap;
use std::sync::Arc;

use crate::exchange::Exchange;
use crate::layer::Timer;
use crate::time::Millis;

/// A timer waiting to fire
#[derive(Debug, Clone)]
pub(crate) struct Scheduled {
  pub(crate) exchange: Arc<Exchange>,
  pub(crate) timer: Timer,
  pub(crate) generation: u64,
}

/// Timers ordered by deadline, then by the order they were scheduled in
#[derive(Debug, Default)]
pub(crate) struct Timers {
  queue: BTreeMap<(Millis, u64), Scheduled>,
  seq: u64,
}

impl Timers {
  pub(crate) fn schedule(&mut self, at: Millis, scheduled: Scheduled) {
    self.seq = self.seq.wrapping_add(1);
    self.queue.insert((at, self.seq), scheduled);
  }

  /// Remove and yield every timer due at `now`, earliest first
  pub(crate) fn pop_due(&mut self, now: Millis) -> Vec<Scheduled> {
    let mut due = vec![];
    while let Some(entry) = self.queue.first_entry() {
      if entry.key().0 > now {
        break;
      }
      due.push(entry.remove());
    }
    due
  }

  /// When the next timer is due
  pub(crate) fn next_at(&self) -> Option<Millis> {
    self.queue.keys().next().map(|(at, _)| *at)
  }

  pub(crate) fn len(&self) -> usize {
    self.queue.len()
  }

  pub(crate) fn clear(&mut self) {
    self.queue.clear();
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::duration::Milliseconds;

  use super::*;
  use crate::exchange::Origin;
  use crate::net::SessionId;
  use crate::req::Req;
  use crate::test;

  fn scheduled(timer: Timer) -> Scheduled {
    let ex = Arc::new(Exchange::new(Origin::Local, Req::get(test::remote(), "a"), SessionId::default()));
    Scheduled { exchange: ex,
                timer,
                generation: 1 }
  }

  #[test]
  fn pops_due_timers_in_order() {
    let mut timers = Timers::default();
    timers.schedule(Milliseconds(20), scheduled(Timer::Expire));
    timers.schedule(Milliseconds(10), scheduled(Timer::Retransmit));
    timers.schedule(Milliseconds(10), scheduled(Timer::BlockCleanup));
    timers.schedule(Milliseconds(30), scheduled(Timer::Reregister));

    assert_eq!(timers.next_at(), Some(Milliseconds(10)));
    assert!(timers.pop_due(Milliseconds(9)).is_empty());

    let due = timers.pop_due(Milliseconds(20)).into_iter()
                                              .map(|s| s.timer)
                                              .collect::<Vec<_>>();
    assert_eq!(due, vec![Timer::Retransmit, Timer::BlockCleanup, Timer::Expire]);
    assert_eq!(timers.len(), 1);
    assert_eq!(timers.next_at(), Some(Milliseconds(30)));
  }
}
