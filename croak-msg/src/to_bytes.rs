use crate::msg::opt::{opt_len_or_delta, MAX_EXTENDED};
use crate::msg::Byte1;
use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a collection of bytes
  ///
  /// ```
  /// use croak_msg::{Code, Id, Message, Token, TryIntoBytes, Type};
  ///
  /// let msg = Message::new(Type::Con, Code::GET, Id(0), Token::default());
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  /// assert_eq!(bytes, vec![0b01_00_0000, 1, 0, 0]);
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// The message was never assigned an [`Id`]
  IdUnset,
  /// An option value cannot be represented in the option length field
  #[allow(missing_docs)]
  OptionValueTooLong { number: OptNumber, len: usize },
  /// The delta between two consecutive options cannot be represented
  #[allow(missing_docs)]
  OptionDeltaTooLarge { number: OptNumber },
}

impl core::fmt::Display for MessageToBytesError {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::IdUnset => write!(f, "message has no id"),
      | Self::OptionValueTooLong { number, len } => {
        write!(f, "value of option {} is too long ({} bytes)", number, len)
      },
      | Self::OptionDeltaTooLarge { number } => {
        write!(f, "option {} is too far from the previous option", number)
      },
    }
  }
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    message_to_bytes(&self)
  }
}

impl<'a> TryIntoBytes for &'a Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    message_to_bytes(self)
  }
}

/// Exact number of bytes a message will serialize to,
/// assuming it serializes at all.
pub fn encoded_len(msg: &Message) -> usize {
  let mut prev = 0u32;
  let opts: usize = msg.opts
                       .iter()
                       .flat_map(|(n, vs)| vs.iter().map(move |v| (n.0, v.len())))
                       .map(|(n, len)| {
                         let delta = n - prev;
                         prev = n;
                         1 + ext_len(delta) + ext_len(len as u32) + len
                       })
                       .sum();
  let payload = match msg.payload.len() {
    | 0 => 0,
    | n => 1 + n,
  };

  4 + msg.token.len() + opts + payload
}

fn ext_len(n: u32) -> usize {
  match n {
    | n if n >= 269 => 2,
    | n if n >= 13 => 1,
    | _ => 0,
  }
}

pub(crate) fn message_to_bytes(msg: &Message) -> Result<Vec<u8>, MessageToBytesError> {
  let id = msg.id.ok_or(MessageToBytesError::IdUnset)?;
  let mut bytes = Vec::with_capacity(encoded_len(msg));

  let byte1: u8 = Byte1 { tkl: msg.token.len() as u8,
                          ver: msg.ver,
                          ty: msg.ty }.into();

  bytes.push(byte1);
  bytes.push(msg.code.into());
  bytes.extend(id.0.to_be_bytes());
  bytes.extend(msg.token.as_bytes());

  let mut prev = 0u32;
  for (number, values) in msg.opts.iter() {
    for value in values {
      let delta = number.0 - prev;
      prev = number.0;

      let (delta_nib, delta_ext) =
        opt_len_or_delta(delta).ok_or(MessageToBytesError::OptionDeltaTooLarge { number: *number })?;
      let (len_nib, len_ext) =
        u32::try_from(value.len()).ok()
                                  .filter(|len| *len <= MAX_EXTENDED)
                                  .and_then(opt_len_or_delta)
                                  .ok_or(MessageToBytesError::OptionValueTooLong { number: *number,
                                                                                   len: value.len() })?;

      bytes.push((delta_nib << 4) | len_nib);
      bytes.extend(delta_ext);
      bytes.extend(len_ext);
      bytes.extend(value.as_bytes());
    }
  }

  if !msg.payload.is_empty() {
    bytes.push(0b11111111);
    bytes.extend(msg.payload.as_bytes());
  }

  Ok(bytes)
}

#[cfg(test)]
mod tests {
  use core::iter::repeat;

  use super::*;
  use crate::test::{assert_eqb, assert_eqb_iter};

  #[test]
  fn msg() {
    let (msg, expected) = crate::msg::test_msg();
    let actual: Vec<u8> = msg.try_into_bytes().unwrap();
    assert_eqb_iter!(actual, expected);
  }

  #[test]
  fn byte_1() {
    let byte = Byte1 { ver: Version(1),
                       ty: Type::Ack,
                       tkl: 3 };
    let actual: u8 = byte.into();
    let expected = 0b_01_10_0011u8;
    assert_eqb!(actual, expected)
  }

  #[test]
  fn opt() {
    let cases: [(u32, Vec<u8>, Vec<u8>); 4] =
      [(24,
        repeat(1).take(100).collect(),
        [[0b1101_1101u8, 24 - 13, 100 - 13].as_ref(),
         repeat(1).take(100).collect::<Vec<u8>>().as_ref()].concat()),
       (1, vec![1], vec![0b0001_0001, 1]),
       (24, vec![1], vec![0b1101_0001, 11, 1]),
       (24,
        repeat(1).take(300).collect(),
        [[0b1101_1110, 24 - 13].as_ref(),
         (300u16 - 269).to_be_bytes().as_ref(),
         repeat(1).take(300).collect::<Vec<u8>>().as_ref()].concat())];

    cases.into_iter().for_each(|(number, value, expected)| {
                       let mut msg = Message::new(Type::Con, Code::GET, Id(0), Token::default());
                       msg.set(OptNumber(number), OptValue(value));
                       let actual = msg.to_bytes().unwrap();
                       assert_eqb_iter!(actual[4..], expected)
                     });
  }

  #[test]
  fn nibble_boundaries_round_trip() {
    for n in [12u32, 13, 268, 269, 65536 + 12] {
      let mut msg = Message::new(Type::Non, Code::PUT, Id(9), Token::opaque(&[1]));
      msg.set(OptNumber(n), OptValue(vec![7; n as usize]));
      msg.payload = Payload(vec![1, 2, 3]);

      let bytes = msg.to_bytes().unwrap();
      assert_eq!(bytes.len(), encoded_len(&msg));
      assert_eq!(Message::try_from_bytes(&bytes).unwrap(), msg, "{}", n);
    }
  }

  #[test]
  fn options_serialize_in_ascending_order() {
    let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token::default());
    msg.set(OptNumber(60), OptValue::uint(1));
    msg.add(OptNumber(11), OptValue::string("b"));
    msg.set(OptNumber(3), OptValue::string("h"));
    msg.add(OptNumber(11), OptValue::string("c"));

    let bytes = msg.to_bytes().unwrap();
    assert_eqb_iter!(bytes[4..],
                     [0b0011_0001, b'h', 0b1000_0001, b'b', 0b0000_0001, b'c', 0b1101_0001, 60 - 11 - 13, 1]);
  }

  #[test]
  fn no_payload_marker() {
    let msg = Message::new(Type::Con, Code::new(2, 5), Id(0), Token::default());
    assert_ne!(msg.to_bytes().unwrap().last(), Some(&0b11111111));
  }

  #[test]
  fn id_unset() {
    let msg = Message::blank(Type::Con, Code::GET);
    assert_eq!(msg.to_bytes(), Err(MessageToBytesError::IdUnset));
  }

  #[test]
  fn value_too_long() {
    let mut msg = Message::new(Type::Con, Code::GET, Id(0), Token::default());
    msg.set(OptNumber(1), OptValue(vec![0; MAX_EXTENDED as usize + 1]));
    assert_eq!(msg.to_bytes(),
               Err(MessageToBytesError::OptionValueTooLong { number: OptNumber(1),
                                                             len: MAX_EXTENDED as usize + 1 }));
  }
}
