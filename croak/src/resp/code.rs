pub use croak_msg::Code;

use crate::code;

// 2.xx
code!("7252"("5.9.1.1") CREATED = 2*01, "2.01 Created");
code!("7252"("5.9.1.2") DELETED = 2*02, "2.02 Deleted");
code!("7252"("5.9.1.3") VALID   = 2*03, "2.03 Valid");
code!("7252"("5.9.1.4") CHANGED = 2*04, "2.04 Changed");
code!("7252"("5.9.1.5") CONTENT = 2*05, "2.05 Content");
code!("7959"("2.9.1")   CONTINUE = 2*31, "2.31 Continue");

// 4.xx
code!("7252"("5.9.2.1")  BAD_REQUEST                = 4*00, "4.00 Bad Request");
code!("7252"("5.9.2.2")  UNAUTHORIZED               = 4*01, "4.01 Unauthorized");
code!("7252"("5.9.2.3")  BAD_OPTION                 = 4*02, "4.02 Bad Option");
code!("7252"("5.9.2.4")  FORBIDDEN                  = 4*03, "4.03 Forbidden");
code!("7252"("5.9.2.5")  NOT_FOUND                  = 4*04, "4.04 Not Found");
code!("7252"("5.9.2.6")  METHOD_NOT_ALLOWED         = 4*05, "4.05 Method Not Allowed");
code!("7252"("5.9.2.7")  NOT_ACCEPTABLE             = 4*06, "4.06 Not Acceptable");
code!("7959"("2.9.2")    REQUEST_ENTITY_INCOMPLETE  = 4*08, "4.08 Request Entity Incomplete");
code!("7252"("5.9.2.8")  PRECONDITION_FAILED        = 4*12, "4.12 Precondition Failed");
code!("7252"("5.9.2.9")  REQUEST_ENTITY_TOO_LARGE   = 4*13, "4.13 Request Entity Too Large");
code!("7252"("5.9.2.10") UNSUPPORTED_CONTENT_FORMAT = 4*15, "4.15 Unsupported Content-Format");

// 5.xx
code!("7252"("5.9.3.1") INTERNAL_SERVER_ERROR  = 5*00, "5.00 Internal Server Error");
code!("7252"("5.9.3.2") NOT_IMPLEMENTED        = 5*01, "5.01 Not Implemented");
code!("7252"("5.9.3.3") BAD_GATEWAY            = 5*02, "5.02 Bad Gateway");
code!("7252"("5.9.3.4") SERVICE_UNAVAILABLE    = 5*03, "5.03 Service Unavailable");
code!("7252"("5.9.3.5") GATEWAY_TIMEOUT        = 5*04, "5.04 Gateway Timeout");
code!("7252"("5.9.3.6") PROXYING_NOT_SUPPORTED = 5*05, "5.05 Proxying Not Supported");

/// Human-readable name of a response code
///
/// ```
/// use croak::resp::code;
///
/// assert_eq!(code::name_of(code::CONTENT), Some("Content"));
/// assert_eq!(code::name_of(code::Code::new(2, 6)), None);
/// ```
pub fn name_of(c: Code) -> Option<&'static str> {
  Some(match (c.class, c.detail) {
    | (2, 1) => "Created",
    | (2, 2) => "Deleted",
    | (2, 3) => "Valid",
    | (2, 4) => "Changed",
    | (2, 5) => "Content",
    | (2, 31) => "Continue",
    | (4, 0) => "Bad Request",
    | (4, 1) => "Unauthorized",
    | (4, 2) => "Bad Option",
    | (4, 3) => "Forbidden",
    | (4, 4) => "Not Found",
    | (4, 5) => "Method Not Allowed",
    | (4, 6) => "Not Acceptable",
    | (4, 8) => "Request Entity Incomplete",
    | (4, 12) => "Precondition Failed",
    | (4, 13) => "Request Entity Too Large",
    | (4, 15) => "Unsupported Content-Format",
    | (5, 0) => "Internal Server Error",
    | (5, 1) => "Not Implemented",
    | (5, 2) => "Bad Gateway",
    | (5, 3) => "Service Unavailable",
    | (5, 4) => "Gateway Timeout",
    | (5, 5) => "Proxying Not Supported",
    | _ => return None,
  })
}
