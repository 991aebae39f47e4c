//! Low-level representation of CoAP messages.
//!
//! The most notable item in `croak_msg` is [`Message`];
//! a CoAP message very close to the actual byte layout.
//!
//! ## Allocation
//! Messages own their options and payload in heap-allocated
//! collections. The token is the exception; it is capped at
//! 8 bytes by the protocol and lives inline in a [`tinyvec::ArrayVec`].
//!
//! ## Performance
//! This crate uses `criterion` to measure performance of encoding
//! and decoding messages, as well as `coap_lite::Packet` for comparison.
//!
//! You can run benchmarks with `cargo bench`.

#![doc(html_root_url = "https://docs.rs/croak-msg/0.1.0")]
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

pub(crate) mod cursor;

#[doc(hidden)]
pub mod from_bytes;
#[doc(hidden)]
pub mod to_bytes;

#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use to_bytes::{MessageToBytesError, TryIntoBytes};

mod cache_key;
pub use cache_key::*;

/// Message structs
pub mod msg;
pub use msg::*;

#[cfg(test)]
pub(crate) mod test {
  macro_rules! assert_eqb {
    ($actual:expr, $expected:expr) => {
      if $actual != $expected {
        panic!("expected {:08b} to equal {:08b}", $actual, $expected)
      }
    };
  }

  macro_rules! assert_eqb_iter {
    ($actual:expr, $expected:expr) => {
      if $actual.iter().ne($expected.iter()) {
        panic!("expected {:?} to equal {:?}",
               $actual.into_iter()
                      .map(|b| format!("{:08b}", b))
                      .collect::<Vec<_>>(),
               $expected.into_iter()
                        .map(|b| format!("{:08b}", b))
                        .collect::<Vec<_>>())
      }
    };
  }

  pub(crate) use {assert_eqb, assert_eqb_iter};
}
