/// Three items of information may need to be transferred in a
/// Block (Block1 or Block2) option:
/// * the size of the block ([`Block::size`])
/// * whether more blocks are following ([`Block::more`])
/// * the relative number of the block ([`Block::num`]) within a sequence of blocks with the given size.
///
/// On the wire this is a 0-3 byte unsigned integer:
/// ```text
///  NUM (4, 12 or 20 bits) | M (1 bit) | SZX (3 bits)
/// ```
///
/// An SZX of 7 is reserved for BERT (RFC 8323); a BERT block carries
/// one or more 1024-byte units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block(u32);

impl Block {
  /// Largest block number representable in 3 bytes
  pub const MAX_NUM: u32 = (1 << 20) - 1;

  /// The SZX denoting a BERT block
  pub const BERT_SZX: u8 = 7;

  /// Create a block option from a block size in bytes.
  ///
  /// The size is rounded down to the nearest size category (see [`Block::szx_for`]).
  pub fn new(size: u16, num: u32, more: bool) -> Self {
    Self::from_szx(Self::szx_for(size), num, more)
  }

  /// Create a block option from a size exponent
  ///
  /// ```
  /// use croak_msg::Block;
  ///
  /// let b = Block::from_szx(2, 5, true);
  /// assert_eq!(b.size(), 64);
  /// assert_eq!(b.num(), 5);
  /// assert!(b.more());
  /// ```
  pub fn from_szx(szx: u8, num: u32, more: bool) -> Self {
    let num = (num & Self::MAX_NUM) << 4;
    let more = u32::from(more) << 3;
    Self(num | more | u32::from(szx & 0b111))
  }

  /// The size exponent of a block size, rounding down to the
  /// nearest power of two in `16..=1024`.
  ///
  /// ```
  /// use croak_msg::Block;
  ///
  /// assert_eq!(Block::szx_for(16), 0);
  /// assert_eq!(Block::szx_for(500), 4);
  /// assert_eq!(Block::szx_for(512), 5);
  /// assert_eq!(Block::szx_for(4096), 6);
  /// ```
  pub fn szx_for(size: u16) -> u8 {
    let size = size.clamp(16, 1024);
    let log2 = 15 - size.leading_zeros() as u8;
    log2 - 4
  }

  /// The number of bytes a size exponent stands for.
  ///
  /// BERT (7) yields the 1024-byte unit size.
  pub fn size_of(szx: u8) -> u16 {
    2u16.pow(u32::from(szx.min(6)) + 4)
  }

  /// The block size in bytes (the unit size for BERT)
  pub fn size(&self) -> u16 {
    Self::size_of(self.szx())
  }

  /// The raw size exponent
  pub fn szx(&self) -> u8 {
    (self.0 & 0b111) as u8
  }

  /// Whether this is a BERT block
  pub fn is_bert(&self) -> bool {
    self.szx() == Self::BERT_SZX
  }

  /// Whether more blocks follow this one
  pub fn more(&self) -> bool {
    (self.0 & 0b1000) >> 3 == 1
  }

  /// The block number
  pub fn num(&self) -> u32 {
    self.0 >> 4
  }

  /// Byte offset of this block within the full body
  pub fn offset(&self) -> usize {
    self.num() as usize * usize::from(self.size())
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> Self {
    b.0
  }
}

impl From<u32> for Block {
  fn from(n: u32) -> Self {
    Block(n)
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn block() {
    let b = Block(33);
    assert_eq!(b.size(), 32);
    assert_eq!(b.num(), 2);
    assert_eq!(b.more(), false);

    let b = Block(59);
    assert_eq!(b.size(), 128);
    assert_eq!(b.num(), 3);
    assert_eq!(b.more(), true);

    assert_eq!(Block::new(32, 2, false), Block(33));
    assert_eq!(Block::new(128, 3, true), Block(59));
  }

  #[test]
  fn size_rounds_down_to_nearest_power_of_two() {
    assert_eq!(Block::new(0, 1, false).size(), 16);
    assert_eq!(Block::new(10, 1, false).size(), 16);
    assert_eq!(Block::new(17, 1, false).size(), 16);
    assert_eq!(Block::new(31, 1, false).size(), 16);
    assert_eq!(Block::new(33, 1, false).size(), 32);
    assert_eq!(Block::new(64, 1, false).size(), 64);
    assert_eq!(Block::new(1000, 1, false).size(), 512);
    assert_eq!(Block::new(1024, 1, false).size(), 1024);
    assert_eq!(Block::new(2048, 1, false).size(), 1024);
  }

  #[test]
  fn packing_survives_every_field_combination() {
    for num in [0, 1, 15, 16, 4095, 4096, Block::MAX_NUM] {
      for szx in 0..=6 {
        for more in [true, false] {
          let b = Block::from(u32::from(Block::from_szx(szx, num, more)));
          assert_eq!((b.num(), b.szx(), b.more()), (num, szx, more));
        }
      }
    }
  }

  #[test]
  fn bert() {
    let b = Block::from_szx(Block::BERT_SZX, 3, true);
    assert!(b.is_bert());
    assert_eq!(b.size(), 1024);
    assert!(!Block::from_szx(6, 3, true).is_bert());
  }

  #[test]
  fn offset() {
    assert_eq!(Block::new(512, 3, false).offset(), 1536);
  }
}
