/// A cursor over a borrowed byte buffer, used by the
/// parsers to consume a datagram front-to-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cursor<'a> {
  bytes: &'a [u8],
  pos: usize,
}

impl<'a> Cursor<'a> {
  pub(crate) fn new(bytes: &'a [u8]) -> Self {
    Self { bytes, pos: 0 }
  }

  /// Take the next byte, or None if the cursor is exhausted.
  pub(crate) fn next(&mut self) -> Option<u8> {
    self.take_exact(1).map(|b| b[0])
  }

  /// Look at the next byte without advancing
  pub(crate) fn peek_byte(&self) -> Option<u8> {
    self.bytes.get(self.pos).copied()
  }

  /// Take exactly `n` bytes, or None (without advancing)
  /// if fewer than `n` bytes remain.
  pub(crate) fn take_exact(&mut self, n: usize) -> Option<&'a [u8]> {
    if n > self.remaining() {
      None
    } else {
      let out = &self.bytes[self.pos..self.pos + n];
      self.pos += n;
      Some(out)
    }
  }

  /// Consume everything left in the buffer
  pub(crate) fn take_until_end(&mut self) -> &'a [u8] {
    let out = &self.bytes[self.pos..];
    self.pos = self.bytes.len();
    out
  }

  pub(crate) fn remaining(&self) -> usize {
    self.bytes.len() - self.pos
  }

  pub(crate) fn is_exhausted(&self) -> bool {
    self.remaining() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn next() {
    let mut cur = Cursor::new(&[1]);
    assert_eq!(cur.next(), Some(1));
    assert_eq!(cur.next(), None);
    assert!(cur.is_exhausted());
  }

  #[test]
  fn take_exact() {
    let mut cur = Cursor::new(&[1, 2, 3]);
    assert_eq!(cur.take_exact(2), Some([1, 2].as_ref()));
    assert_eq!(cur.take_exact(2), None);
    assert_eq!(cur.peek_byte(), Some(3));
    assert_eq!(cur.take_exact(1), Some([3].as_ref()));
    assert!(cur.is_exhausted());
  }

  #[test]
  fn take_until_end() {
    let mut cur = Cursor::new(&[1, 2, 3]);
    cur.next();
    assert_eq!(cur.take_until_end(), &[2, 3]);
    assert_eq!(cur.take_until_end(), &[] as &[u8]);
  }
}
