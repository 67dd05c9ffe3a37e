#![deny(unsafe_code)]

//! XDR serialization (RFC 4506) for the sunrpc stack.
//!
//! Two layers:
//!
//! - [`Buffer`] - a growable segmented byte buffer with big-endian
//!   position/limit cursor semantics; growing appends segments instead of
//!   copying.
//! - [`Xdr`] - the encoding/decoding stream on top, with the
//!   begin/end lifecycle, four-octet alignment, and the
//!   [`XdrEncode`]/[`XdrDecode`] traits composite types implement.
//!
//! The codec is strict by default about declared lengths and UTF-8;
//! boolean leniency is selectable via [`BoolPolicy`].

mod buffer;
mod stream;

pub use buffer::{Buffer, BufferError};
pub use stream::{pad_len, BoolPolicy, Xdr, XdrDecode, XdrEncode, XdrError};
