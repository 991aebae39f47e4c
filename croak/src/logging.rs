use core::fmt::Write;

use croak_msg::Message;

use crate::resp::code;

/// One-line description of a message for log output, e.g.
/// `Response: Ack 2.05 Content id=7 token=0a0b with 4 byte payload`
pub(crate) fn msg_summary(msg: &Message) -> String {
  let mut buf = String::new();
  write!(buf, "{:?}: {:?} {}", msg.code.kind(), msg.ty, msg.code).ok();

  if let Some(name) = code::name_of(msg.code) {
    write!(buf, " {}", name).ok();
  }

  if let Some(id) = msg.id {
    write!(buf, " id={}", id).ok();
  }

  if !msg.token.is_empty() {
    write!(buf, " token={}", msg.token).ok();
  }

  write!(buf, " with {} byte payload", msg.payload.len()).ok();
  buf
}

#[cfg(test)]
mod tests {
  use croak_msg::{Code, Id, Token, Type};

  use super::*;

  #[test]
  fn summary() {
    let mut msg = Message::new(Type::Ack, Code::new(2, 5), Id(7), Token::try_from_slice(&[10, 11]).unwrap());
    msg.payload.0 = b"23.5".to_vec();

    assert_eq!(msg_summary(&msg),
               "Response: Ack 2.05 Content id=7 token=0a0b with 4 byte payload");
  }
}
