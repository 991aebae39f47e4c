use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, What, When};
use crate::net::{Addrd, Channel, Session};
use crate::stem::lock;

/// Datagrams waiting to be handed to the channel for one peer.
///
/// At most one thread writes to the channel at a time. A thread that
/// finds the queue being drained leaves its datagram behind for the
/// draining thread, which checks for stragglers after letting go.
#[derive(Debug, Default)]
pub(crate) struct SendQueue {
  pending: Mutex<VecDeque<Arc<Vec<u8>>>>,
  draining: AtomicBool,
}

impl SendQueue {
  pub(crate) fn send<Ch: Channel>(&self, channel: &Ch, session: &Session, dgram: Arc<Vec<u8>>) -> Result<(), Error> {
    lock(&self.pending).push_back(dgram);

    loop {
      if self.draining
             .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
             .is_err()
      {
        return Ok(());
      }

      let drained = self.drain(channel, session);
      self.draining.store(false, Ordering::Release);
      drained?;

      if lock(&self.pending).is_empty() {
        return Ok(());
      }
    }
  }

  pub(crate) fn len(&self) -> usize {
    lock(&self.pending).len()
  }

  /// Nothing waiting, and nobody sending
  pub(crate) fn is_idle(&self) -> bool {
    !self.draining.load(Ordering::Acquire) && lock(&self.pending).is_empty()
  }

  fn drain<Ch: Channel>(&self, channel: &Ch, session: &Session) -> Result<(), Error> {
    loop {
      let dgram = match lock(&self.pending).pop_front() {
        | Some(d) => d,
        | None => return Ok(()),
      };

      loop {
        match channel.send(session, Addrd(&dgram[..], session.remote)) {
          | Ok(()) => break,
          | Err(nb::Error::WouldBlock) => std::thread::yield_now(),
          | Err(nb::Error::Other(e)) => {
            log::error!("failed to send {} bytes to {}: {:?}",
                        dgram.len(),
                        session.remote,
                        e);
            return Err(When::Sending { to: session.remote,
                                       id: None,
                                       token: Default::default() }.what(What::Channel(format!("{:?}", e))));
          },
        }
      }
    }
  }
}
