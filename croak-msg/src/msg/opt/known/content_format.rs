/// Content-Format
///
/// ```
/// use croak_msg::ContentFormat;
///
/// assert_eq!(u16::from(ContentFormat::Json), 50);
/// assert_eq!(ContentFormat::from(60), ContentFormat::Cbor);
/// assert_eq!(ContentFormat::from(9999), ContentFormat::Other(9999));
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentFormat {
  /// `text/plain; charset=utf-8`
  Text,
  /// `application/link-format`
  LinkFormat,
  /// `application/xml`
  Xml,
  /// `application/octet-stream`
  OctetStream,
  /// `application/exi`
  Exi,
  /// `application/json`
  Json,
  /// `application/cbor`
  Cbor,
  /// `application/senml+json`
  SenmlJson,
  /// `application/oscore`
  Oscore,
  /// Another content format
  Other(u16),
}

impl ContentFormat {
  /// The MIME type string, where one is registered
  pub fn mime(&self) -> Option<&'static str> {
    use ContentFormat::*;
    match self {
      | Text => Some("text/plain; charset=utf-8"),
      | LinkFormat => Some("application/link-format"),
      | Xml => Some("application/xml"),
      | OctetStream => Some("application/octet-stream"),
      | Exi => Some("application/exi"),
      | Json => Some("application/json"),
      | Cbor => Some("application/cbor"),
      | SenmlJson => Some("application/senml+json"),
      | Oscore => Some("application/oscore"),
      | Other(_) => None,
    }
  }
}

impl From<ContentFormat> for u16 {
  fn from(f: ContentFormat) -> Self {
    use ContentFormat::*;
    match f {
      | Text => 0,
      | LinkFormat => 40,
      | Xml => 41,
      | OctetStream => 42,
      | Exi => 47,
      | Json => 50,
      | Cbor => 60,
      | SenmlJson => 110,
      | Oscore => 10001,
      | Other(n) => n,
    }
  }
}

impl From<u16> for ContentFormat {
  fn from(n: u16) -> Self {
    use ContentFormat::*;
    match n {
      | 0 => Text,
      | 40 => LinkFormat,
      | 41 => Xml,
      | 42 => OctetStream,
      | 47 => Exi,
      | 50 => Json,
      | 60 => Cbor,
      | 110 => SenmlJson,
      | 10001 => Oscore,
      | n => Other(n),
    }
  }
}
