use core::fmt;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::resp::Resp;
use crate::stem::lock;

/// Something that happened to a message after it was handed to the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageEvent {
  /// The message is being retransmitted for the n-th time
  Retransmitting(u16),
  /// The peer acknowledged the message
  Acknowledged,
  /// The peer rejected the message with a Reset
  Rejected,
  /// Retransmissions were exhausted without an acknowledgement
  TimedOut,
  /// The message was cancelled locally
  Cancelled,
  /// A response to the (request) message arrived
  Responded,
}

/// Receives [`MessageEvent`]s for a message
pub trait MessageObserver: Send + Sync {
  /// Invoked once per event, after the message state has been updated
  fn on_event(&self, event: MessageEvent);
}

impl<F> MessageObserver for F where F: Fn(MessageEvent) + Send + Sync
{
  fn on_event(&self, event: MessageEvent) {
    self(event)
  }
}

/// Flags set over the lifetime of a message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Flags {
  /// see [`MessageEvent::Acknowledged`]
  pub acknowledged: bool,
  /// see [`MessageEvent::Rejected`]
  pub rejected: bool,
  /// see [`MessageEvent::TimedOut`]
  pub timed_out: bool,
  /// see [`MessageEvent::Cancelled`]
  pub cancelled: bool,
  /// The (inbound) message was a duplicate of one we already processed
  pub duplicate: bool,
  /// Number of retransmissions so far
  pub retransmissions: u16,
}

impl Flags {
  /// Will nothing more happen to this message?
  pub fn is_final(&self) -> bool {
    self.rejected || self.timed_out || self.cancelled
  }
}

fn raise(flag: &mut bool) -> bool {
  !core::mem::replace(flag, true)
}

#[derive(Debug, Default)]
struct Inner {
  flags: Flags,
  response: Option<Resp>,
}

/// State shared by every copy of a message.
///
/// Cloning a [`Req`](crate::req::Req) or [`Resp`] shares its state, so
/// the flags set by the endpoint are visible to the application.
#[derive(Default)]
pub struct MessageState {
  inner: Mutex<Inner>,
  changed: Condvar,
  observers: Mutex<Vec<Arc<dyn MessageObserver>>>,
}

impl fmt::Debug for MessageState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageState")
     .field("flags", &self.flags())
     .field("observers", &lock(&self.observers).len())
     .finish()
  }
}

impl MessageState {
  /// A snapshot of the message's flags
  pub fn flags(&self) -> Flags {
    lock(&self.inner).flags
  }

  /// Has the peer acknowledged the message?
  pub fn is_acknowledged(&self) -> bool {
    self.flags().acknowledged
  }

  /// Did the peer reject the message?
  pub fn is_rejected(&self) -> bool {
    self.flags().rejected
  }

  /// Did the message time out?
  pub fn is_timed_out(&self) -> bool {
    self.flags().timed_out
  }

  /// Was the message cancelled?
  pub fn is_cancelled(&self) -> bool {
    self.flags().cancelled
  }

  /// Was this (inbound) message a duplicate?
  pub fn is_duplicate(&self) -> bool {
    self.flags().duplicate
  }

  /// Register an observer for future events
  pub fn observe(&self, observer: Arc<dyn MessageObserver>) {
    lock(&self.observers).push(observer);
  }

  /// Cancel the message.
  ///
  /// A cancelled request is no longer retransmitted, and notifications
  /// arriving for a cancelled observe request are answered with a Reset.
  pub fn cancel(&self) {
    self.transition(MessageEvent::Cancelled, |f| raise(&mut f.cancelled));
  }

  pub(crate) fn set_acknowledged(&self) -> bool {
    self.transition(MessageEvent::Acknowledged, |f| raise(&mut f.acknowledged))
  }

  pub(crate) fn set_rejected(&self) -> bool {
    self.transition(MessageEvent::Rejected, |f| raise(&mut f.rejected))
  }

  pub(crate) fn set_timed_out(&self) -> bool {
    self.transition(MessageEvent::TimedOut, |f| raise(&mut f.timed_out))
  }

  pub(crate) fn set_duplicate(&self) {
    lock(&self.inner).flags.duplicate = true;
  }

  pub(crate) fn retransmitting(&self) -> u16 {
    let n = {
      let mut inner = lock(&self.inner);
      inner.flags.retransmissions = inner.flags.retransmissions.saturating_add(1);
      inner.flags.retransmissions
    };
    self.notify(MessageEvent::Retransmitting(n));
    n
  }

  /// Store a response to this (request) message and wake any waiters
  pub(crate) fn respond(&self, resp: Resp) {
    lock(&self.inner).response = Some(resp);
    self.changed.notify_all();
    self.notify(MessageEvent::Responded);
  }

  /// Take the most recent response, if one has arrived
  pub fn take_response(&self) -> Option<Resp> {
    lock(&self.inner).response.take()
  }

  /// Block the current thread until a response arrives, the request
  /// reaches a final state (rejected, timed out, cancelled) or `timeout` elapses.
  ///
  /// For observe requests every call yields the latest notification
  /// that has not been taken yet.
  pub fn wait_for_response(&self, timeout: Duration) -> Option<Resp> {
    let deadline = Instant::now() + timeout;
    let mut inner = lock(&self.inner);

    loop {
      if let Some(resp) = inner.response.take() {
        return Some(resp);
      }

      if inner.flags.is_final() {
        return None;
      }

      let now = Instant::now();
      if now >= deadline {
        return None;
      }

      inner = self.changed
                  .wait_timeout(inner, deadline - now)
                  .map(|(guard, _)| guard)
                  .unwrap_or_else(|e| PoisonError::into_inner(e).0);
    }
  }

  fn transition(&self, event: MessageEvent, f: impl FnOnce(&mut Flags) -> bool) -> bool {
    let changed = f(&mut lock(&self.inner).flags);
    if changed {
      self.changed.notify_all();
      self.notify(event);
    }
    changed
  }

  fn notify(&self, event: MessageEvent) {
    let observers = lock(&self.observers).clone();
    observers.iter().for_each(|o| o.on_event(event));
  }
}
