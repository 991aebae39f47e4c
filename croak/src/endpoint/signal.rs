use croak_msg::signal::{csm, BAD_CSM_OPTION, CUSTODY};
use croak_msg::{Code, Id, Message, OptValue, Type};

use crate::config::Config;
use crate::layer::Services;
use crate::logging::msg_summary;
use crate::net::{Addrd, Channel, Session};

/// What the endpoint should do after a signal was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Handled {
  /// Nothing more
  Done,
  /// Send a signal back
  Reply(Message),
  /// Send an Abort, then tear the session down
  Abort(Message),
}

/// The CSM we announce ourselves with
pub(crate) fn csm(config: &Config, id: Id) -> Message {
  let mut msg = Message::new(Type::Non, Code::CSM, id, Default::default());
  msg.set_uint(csm::MAX_MESSAGE_SIZE,
               u32::try_from(config.msg.max_message_size).unwrap_or(u32::MAX));
  msg.set(csm::BLOCK_WISE_TRANSFER, OptValue::empty());
  msg
}

/// Handle a signal (7.xx) message from a peer.
///
/// Capabilities learned from a CSM are remembered as the peer's session.
pub(crate) fn handle<Ch: Channel>(services: &Services, channel: &Ch, msg: Addrd<Message>) -> Handled {
  let Addrd(msg, from) = msg;
  let session = services.session(from)
                        .unwrap_or_else(|| channel.session(from));

  log::debug!("<- {} signal {}", from, msg_summary(&msg));

  match msg.code {
    | Code::CSM => capabilities(services, session, &msg),
    | Code::PING => {
      let mut pong = Message::new(Type::Non, Code::PONG, msg.id.unwrap_or_default(), msg.token);
      if msg.has(CUSTODY) {
        pong.set(CUSTODY, OptValue::empty());
      }
      Handled::Reply(pong)
    },
    | Code::PONG => {
      log::trace!("pong from {}", from);
      Handled::Done
    },
    | Code::RELEASE => {
      channel.release(&session);
      services.forget_session(from);
      Handled::Done
    },
    | Code::ABORT => {
      if let Some(opt) = msg.get_uint(BAD_CSM_OPTION) {
        log::warn!("{} aborted the session, it did not understand CSM option {}", from, opt);
      }
      channel.abort(&session);
      services.forget_session(from);
      Handled::Done
    },
    | other => {
      log::warn!("ignoring unknown signal {} from {}", other, from);
      Handled::Done
    },
  }
}

fn capabilities(services: &Services, mut session: Session, msg: &Message) -> Handled {
  for (n, values) in msg.opts.iter() {
    match *n {
      | csm::MAX_MESSAGE_SIZE => {
        session.max_message_size = values.first()
                                         .and_then(OptValue::as_uint)
                                         .and_then(|n| usize::try_from(n).ok());
      },
      | csm::BLOCK_WISE_TRANSFER => session.block_wise_transfer = true,
      | other if other.is_critical() => {
        log::warn!("{} sent unknown critical CSM option {}, aborting", session.remote, other.0);
        let mut abort = Message::new(Type::Non, Code::ABORT, msg.id.unwrap_or_default(), msg.token);
        abort.set_uint(BAD_CSM_OPTION, other.0);
        return Handled::Abort(abort);
      },
      | other => log::debug!("ignoring elective CSM option {}", other.0),
    }
  }

  log::debug!("session with {} now {:?}", session.remote, session);
  services.set_session(session);
  Handled::Done
}

#[cfg(test)]
mod tests {
  use croak_msg::{OptNumber, Token};

  use super::*;
  use crate::test::{self, ChannelMock, Harness};

  fn signal(code: Code) -> Message {
    Message::new(Type::Non, code, Id(9), Token::opaque(b"sig"))
  }

  #[test]
  fn csm_updates_session() {
    let h = Harness::new();
    let mut msg = signal(Code::CSM);
    msg.set_uint(csm::MAX_MESSAGE_SIZE, 4096);
    msg.set(csm::BLOCK_WISE_TRANSFER, OptValue::empty());

    let handled = handle(&h.services, &ChannelMock::new(), Addrd(msg, test::remote()));

    assert_eq!(handled, Handled::Done);
    let session = h.services.session(test::remote()).unwrap();
    assert_eq!(session.max_message_size, Some(4096));
    assert!(session.block_wise_transfer);
  }

  #[test]
  fn unknown_critical_csm_option_aborts() {
    let h = Harness::new();
    let mut msg = signal(Code::CSM);
    msg.set_uint(OptNumber(7), 1);

    match handle(&h.services, &ChannelMock::new(), Addrd(msg, test::remote())) {
      | Handled::Abort(abort) => {
        assert_eq!(abort.code, Code::ABORT);
        assert_eq!(abort.get_uint(BAD_CSM_OPTION), Some(7));
      },
      | other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(h.services.session(test::remote()), None);
  }

  #[test]
  fn ping_gets_pong() {
    let h = Harness::new();
    let mut ping = signal(Code::PING);
    ping.set(CUSTODY, OptValue::empty());

    match handle(&h.services, &ChannelMock::new(), Addrd(ping.clone(), test::remote())) {
      | Handled::Reply(pong) => {
        assert_eq!(pong.code, Code::PONG);
        assert_eq!(pong.token, ping.token);
        assert!(pong.has(CUSTODY));
      },
      | other => panic!("expected pong, got {:?}", other),
    }
  }

  #[test]
  fn release_and_abort_end_the_session() {
    let h = Harness::new();
    let channel = ChannelMock::new();
    h.services.set_session(Session::udp(test::remote()));

    handle(&h.services, &channel, Addrd(signal(Code::RELEASE), test::remote()));
    assert_eq!(h.services.session(test::remote()), None);
    assert_eq!(*channel.released.lock().unwrap(), vec![test::remote()]);

    handle(&h.services, &channel, Addrd(signal(Code::ABORT), test::remote()));
    assert_eq!(*channel.aborted.lock().unwrap(), vec![test::remote()]);
  }

  #[test]
  fn announces_capabilities() {
    let msg = csm(&Config::default(), Id(1));
    assert_eq!(msg.get_uint(csm::MAX_MESSAGE_SIZE), Some(1024));
    assert!(msg.has(csm::BLOCK_WISE_TRANSFER));
  }
}
