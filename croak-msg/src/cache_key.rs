use core::fmt::Debug;
use core::hash::{Hash, Hasher};

use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

use crate::{Message, OptNumber};

/// [`Hasher`] implementation that uses
/// the [`blake2`] algo to generate a 64 bit hash.
///
/// Unlike the std `DefaultHasher`, the output is stable across
/// processes and releases.
///
/// ```
/// use core::hash::{Hash, Hasher};
///
/// use croak_msg::Blake2Hasher;
///
/// let mut hasher_a = Blake2Hasher::new();
/// let mut hasher_b = Blake2Hasher::new();
///
/// "hello".hash(&mut hasher_a);
/// "hello".hash(&mut hasher_b);
/// assert_eq!(hasher_a.finish(), hasher_b.finish());
///
/// 123_u16.hash(&mut hasher_a);
/// "not 123!".hash(&mut hasher_b);
/// assert_ne!(hasher_a.finish(), hasher_b.finish());
/// ```
#[derive(Default, Clone)]
pub struct Blake2Hasher(Blake2b<U8>);

impl Blake2Hasher {
  /// Create a new `Blake2Hasher`
  pub fn new() -> Self {
    Self::default()
  }
}

impl Debug for Blake2Hasher {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("Blake2Hasher")
     .field(&"<Blake2b<U8>>")
     .finish()
  }
}

impl Hasher for Blake2Hasher {
  fn finish(&self) -> u64 {
    let out: [u8; 8] = self.0.clone().finalize().into();
    u64::from_be_bytes(out)
  }

  fn write(&mut self, bytes: &[u8]) {
    self.0.update(bytes);
  }
}

/// The cache key can be used to compare messages for representing
/// the same action against the same resource; for example requests
/// with different IDs but the same method and cache-key affecting options
/// (ex. path, query parameters) will yield the same cache-key.
///
/// Options that are `NoCacheKey` (see [`OptNumber::when_option_changes`])
/// never contribute to the key. Callers may exclude further options,
/// e.g. the block options when correlating the blocks of one transfer.
///
/// ```
/// use croak_msg::{known, CacheKey, Code, Id, Message, OptValue, Token, Type};
///
/// let mut a = Message::new(Type::Con, Code::GET, Id(1), Token::default());
/// a.add(known::repeat::PATH, OptValue::string("temp"));
/// let mut b = Message::new(Type::Non, Code::GET, Id(2), Token::default());
/// b.add(known::repeat::PATH, OptValue::string("temp"));
///
/// assert_eq!(CacheKey::of(&a), CacheKey::of(&b));
///
/// b.set_block1(croak_msg::Block::new(64, 2, true));
/// assert_ne!(CacheKey::of(&a), CacheKey::of(&b));
/// assert_eq!(CacheKey::excluding(&a, |n| n == known::no_repeat::BLOCK1),
///            CacheKey::excluding(&b, |n| n == known::no_repeat::BLOCK1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey(pub u64);

impl CacheKey {
  /// Hash the code and every cache-key option of a message
  pub fn of(msg: &Message) -> Self {
    Self::excluding(msg, |_| false)
  }

  /// Hash the code and the cache-key options of a message for
  /// which `exclude` yields `false`
  pub fn excluding(msg: &Message, exclude: impl Fn(OptNumber) -> bool) -> Self {
    let mut hasher = Blake2Hasher::new();
    msg.code.hash(&mut hasher);
    msg.opts
       .iter()
       .filter(|(num, _)| !num.is_no_cache_key() && !exclude(**num))
       .for_each(|(num, vals)| {
         num.hash(&mut hasher);
         vals.iter().for_each(|v| v.hash(&mut hasher));
       });
    Self(hasher.finish())
  }
}
