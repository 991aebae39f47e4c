use tinyvec::ArrayVec;

/// Message Token
///
/// 0 to 8 opaque bytes chosen by the client, used to correlate
/// requests and responses independently of the message [`Id`](crate::Id).
///
/// The length limit is structural: a `Token` cannot hold more than 8 bytes.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// The maximum number of bytes a token may contain
  pub const MAX_LEN: usize = 8;

  /// Take an arbitrary-length sequence of bytes and turn it into an opaque message token
  ///
  /// Uses the BLAKE2 hashing algorithm.
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// let my_token = Token::opaque(&[0, 1, 2]);
  /// assert_eq!(my_token.len(), 8);
  /// assert_eq!(my_token, Token::opaque(&[0, 1, 2]));
  /// ```
  pub fn opaque(data: &[u8]) -> Token {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let mut digest = Blake2b::<U8>::new();
    digest.update(data);
    Token(Into::<[u8; 8]>::into(digest.finalize()).into())
  }

  /// Copy a byte slice into a token, yielding `None` if
  /// it is longer than 8 bytes.
  ///
  /// ```
  /// use croak_msg::Token;
  ///
  /// assert!(Token::try_from_slice(&[1, 2, 3]).is_some());
  /// assert!(Token::try_from_slice(&[0; 9]).is_none());
  /// ```
  pub fn try_from_slice(bytes: &[u8]) -> Option<Token> {
    if bytes.len() > Self::MAX_LEN {
      None
    } else {
      Some(Token(bytes.iter().copied().collect()))
    }
  }

  /// Get the token's bytes
  pub fn as_bytes(&self) -> &[u8] {
    self.0.as_slice()
  }

  /// Number of bytes in the token
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Is this the zero-length token?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl core::fmt::Display for Token {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    self.0.iter().try_for_each(|b| write!(f, "{:02x}", b))
  }
}
