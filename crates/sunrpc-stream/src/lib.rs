#![deny(unsafe_code)]

//! Record framing for ONC RPC transports.
//!
//! - [`RecordFramer`] - record marking over any async byte stream (TCP):
//!   fragment headers, multi-fragment reassembly, outbound splitting, and a
//!   configurable record ceiling.
//! - [`DatagramFramer`] - UDP pass-through where each datagram is one
//!   record.

mod framing;
mod udp;

pub use framing::{
    FrameError, RecordFramer, DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_RECORD_SIZE,
    FRAGMENT_LENGTH_MASK, LAST_FRAGMENT,
};
pub use udp::{DatagramFramer, MAX_DATAGRAM_SIZE};
