//! `croak` is a CoAP exchange engine: the part of a CoAP stack between
//! the socket and the application.
//!
//! ## CoAP
//! CoAP ([RFC 7252](https://datatracker.ietf.org/doc/html/rfc7252)) copies the
//! semantics of HTTP (methods, status codes, options instead of headers) to
//! constrained devices, and usually runs over UDP. Because UDP guarantees nothing,
//! CoAP brings its own message layer: confirmable messages are acknowledged and
//! retransmitted, duplicates are detected, responses are matched to requests by
//! token.
//!
//! ## What croak does
//! - Reliability: piggybacked and separate responses, ACK / RST, retransmission
//!   with exponential back-off
//! - Matching and deduplication of inbound messages
//! - Block-wise transfers ([RFC 7959](https://datatracker.ietf.org/doc/html/rfc7959))
//! - Observe ([RFC 7641](https://datatracker.ietf.org/doc/html/rfc7641)), server and client side
//! - Signals ([RFC 8323](https://datatracker.ietf.org/doc/html/rfc8323)): CSM, Ping, Pong, Release, Abort
//!
//! Messages themselves (parsing, serializing, options) live in [`croak_msg`].
//!
//! ## Example
//! ```no_run
//! use std::net::UdpSocket;
//! use std::time::Duration;
//!
//! use croak::endpoint::Endpoint;
//! use croak::req::Req;
//! use croak::time::StdClock;
//!
//! let sock = UdpSocket::bind("0.0.0.0:0").unwrap();
//! sock.set_nonblocking(true).unwrap();
//! let client = Endpoint::builder(sock, StdClock::new()).build().unwrap();
//!
//! let server = "127.0.0.1:5683".parse().unwrap();
//! let ex = client.send_request(Req::get(server, "sensors/temp")).unwrap();
//!
//! let poller = client.clone();
//! std::thread::spawn(move || loop {
//!   poller.poll().ok();
//! });
//!
//! let resp = ex.request().wait_for_response(Duration::from_secs(5));
//! println!("{:?}", resp.and_then(|r| r.payload_str().map(String::from)));
//! ```

#![doc(html_root_url = "https://docs.rs/croak/0.1.0")]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
// -
// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(missing_copy_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]


pub(crate) mod logging;

/// Serializing and parsing messages
pub mod codec;

/// # Configuring runtime behavior
/// Timeouts, block sizes, deduplication and observe settings,
/// with the defaults of RFC 7252 section 4.8.
pub mod config;

/// # The endpoint
/// Drives a [`Channel`](crate::net::Channel) and the layer
/// [`Stack`](crate::layer::Stack), delivering requests and responses
/// to the application.
pub mod endpoint;

/// Errors
pub mod error;

/// # Exchanges
/// A request, its response(s) and everything the layers track
/// in between.
pub mod exchange;

/// # Protocol layers
/// See [`Layer`](crate::layer::Layer).
pub mod layer;

/// The state messages go through after they are sent or received
pub mod lifecycle;

/// # Matching
/// Correlates inbound messages with the exchanges they belong to,
/// and detects duplicates.
pub mod matcher;

/// network abstractions
pub mod net;

/// # Observe
/// Relations we serve and the ordering of notifications we receive
pub mod observe;

/// Flat key/value view of [`Config`](crate::config::Config)
pub mod properties;

/// requests
pub mod req;

/// responses
pub mod resp;

/// customizable retrying of fallible operations
pub mod retry;

/// Shared mutable state
pub mod stem;

/// time abstractions
pub mod time;

#[doc(inline)]
pub use config::Config;
#[doc(inline)]
pub use endpoint::Endpoint;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use req::Req;
#[doc(inline)]
pub use resp::Resp;

macro_rules! code {
  ($rfc:literal($section:literal) $name:ident = $c:literal*$d:literal, $doc:literal) => {
    #[doc = concat!($doc,
                    "\n\nSee [RFC",
                    $rfc,
                    " section ",
                    $section,
                    "](https://datatracker.ietf.org/doc/html/rfc",
                    $rfc,
                    "#section-",
                    $section,
                    ")")]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: croak_msg::Code = croak_msg::Code::new($c, $d);
  };
}

pub(crate) use code;
