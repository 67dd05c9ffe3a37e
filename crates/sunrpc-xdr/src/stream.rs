//! XDR encoding/decoding stream (RFC 4506).
//!
//! An [`Xdr`] wraps a [`Buffer`] together with a role: a stream is idle until
//! [`begin_encoding`](Xdr::begin_encoding) or
//! [`begin_decoding`](Xdr::begin_decoding) activates it, and
//! [`end_encoding`](Xdr::end_encoding) flips the buffer for transmission.
//! Every datum occupies a multiple of four octets; padding is written as
//! zeros and skipped unseen on decode.

use std::fmt;

use crate::buffer::{Buffer, BufferError};

/// How the decoder treats boolean wire values other than 0 and 1.
///
/// RFC 4506 prescribes exactly 0 or 1, but deployed peers are known to send
/// arbitrary non-zero values for true, so the default is lenient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoolPolicy {
    /// Any non-zero value decodes as `true`.
    #[default]
    Lenient,
    /// Only 0 and 1 are accepted.
    Strict,
}

/// Error produced by XDR decoding (and, for overflow, encoding).
#[derive(Debug)]
pub enum XdrError {
    /// Buffer underflow or overflow.
    Buffer(BufferError),
    /// A declared length exceeds what the buffer still holds.
    BadLength { declared: u32, available: usize },
    /// A boolean wire value other than 0/1 under [`BoolPolicy::Strict`].
    NonCanonicalBool(u32),
    /// A string was not valid UTF-8.
    Utf8(std::string::FromUtf8Error),
}

impl fmt::Display for XdrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XdrError::Buffer(e) => write!(f, "{e}"),
            XdrError::BadLength { declared, available } => {
                write!(f, "declared length {declared} exceeds {available} available bytes")
            }
            XdrError::NonCanonicalBool(v) => write!(f, "non-canonical boolean value {v}"),
            XdrError::Utf8(e) => write!(f, "malformed utf-8 string: {e}"),
        }
    }
}

impl std::error::Error for XdrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            XdrError::Buffer(e) => Some(e),
            XdrError::Utf8(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for XdrError {
    fn from(e: BufferError) -> Self {
        XdrError::Buffer(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Encoding,
    Decoding,
}

/// Number of zero octets needed to pad `len` to a four-octet boundary.
pub fn pad_len(len: usize) -> usize {
    (4 - len % 4) % 4
}

static PADDING: [u8; 4] = [0; 4];

/// Bidirectional XDR stream over a [`Buffer`].
pub struct Xdr {
    buf: Buffer,
    state: State,
    bool_policy: BoolPolicy,
}

impl Xdr {
    /// Create an idle stream over a fresh growable buffer.
    pub fn new(capacity: usize) -> Self {
        Self::from_buffer(Buffer::allocate(capacity))
    }

    /// Create an idle stream over an existing buffer.
    pub fn from_buffer(buf: Buffer) -> Self {
        Self {
            buf,
            state: State::Idle,
            bool_policy: BoolPolicy::default(),
        }
    }

    /// Wrap received bytes, ready for [`begin_decoding`](Xdr::begin_decoding).
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::from_buffer(Buffer::wrap(bytes))
    }

    /// Select the boolean decoding policy.
    pub fn with_bool_policy(mut self, policy: BoolPolicy) -> Self {
        self.bool_policy = policy;
        self
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buf
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buf
    }

    /// Consume the stream and copy out the readable bytes.
    ///
    /// Meaningful after [`end_encoding`](Xdr::end_encoding), which flips the
    /// buffer so the readable window is exactly what was written.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_bytes()
    }

    /// Bytes remaining in the readable window.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    // Lifecycle. Misuse of the role flag is a programmer error and panics.

    /// Switch the stream into encoding mode. Panics if not idle.
    pub fn begin_encoding(&mut self) {
        assert_eq!(self.state, State::Idle, "xdr stream already active");
        self.buf.clear();
        self.state = State::Encoding;
    }

    /// Finish encoding and flip the buffer for transmission or decoding.
    pub fn end_encoding(&mut self) {
        assert_eq!(self.state, State::Encoding, "xdr stream is not encoding");
        self.buf.flip();
        self.state = State::Idle;
    }

    /// Switch the stream into decoding mode, rewinding the read cursor.
    pub fn begin_decoding(&mut self) {
        assert_eq!(self.state, State::Idle, "xdr stream already active");
        self.buf.rewind();
        self.state = State::Decoding;
    }

    /// Finish decoding.
    pub fn end_decoding(&mut self) {
        assert_eq!(self.state, State::Decoding, "xdr stream is not decoding");
        self.state = State::Idle;
    }

    fn check_encoding(&self) {
        assert_eq!(self.state, State::Encoding, "xdr stream is not encoding");
    }

    fn check_decoding(&self) {
        assert_eq!(self.state, State::Decoding, "xdr stream is not decoding");
    }

    // Primitives.

    pub fn encode_i32(&mut self, v: i32) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_i32(v)?)
    }

    pub fn encode_u32(&mut self, v: u32) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_u32(v)?)
    }

    pub fn encode_i64(&mut self, v: i64) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_i64(v)?)
    }

    pub fn encode_u64(&mut self, v: u64) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_u64(v)?)
    }

    pub fn encode_f32(&mut self, v: f32) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_slice(&v.to_be_bytes())?)
    }

    pub fn encode_f64(&mut self, v: f64) -> Result<(), XdrError> {
        self.check_encoding();
        Ok(self.buf.put_slice(&v.to_be_bytes())?)
    }

    pub fn encode_bool(&mut self, v: bool) -> Result<(), XdrError> {
        self.encode_u32(v as u32)
    }

    pub fn decode_i32(&mut self) -> Result<i32, XdrError> {
        self.check_decoding();
        Ok(self.buf.get_i32()?)
    }

    pub fn decode_u32(&mut self) -> Result<u32, XdrError> {
        self.check_decoding();
        Ok(self.buf.get_u32()?)
    }

    pub fn decode_i64(&mut self) -> Result<i64, XdrError> {
        self.check_decoding();
        Ok(self.buf.get_i64()?)
    }

    pub fn decode_u64(&mut self) -> Result<u64, XdrError> {
        self.check_decoding();
        Ok(self.buf.get_u64()?)
    }

    pub fn decode_f32(&mut self) -> Result<f32, XdrError> {
        self.check_decoding();
        let mut b = [0u8; 4];
        self.buf.get_slice(&mut b)?;
        Ok(f32::from_be_bytes(b))
    }

    pub fn decode_f64(&mut self) -> Result<f64, XdrError> {
        self.check_decoding();
        let mut b = [0u8; 8];
        self.buf.get_slice(&mut b)?;
        Ok(f64::from_be_bytes(b))
    }

    pub fn decode_bool(&mut self) -> Result<bool, XdrError> {
        let v = self.decode_u32()?;
        match (self.bool_policy, v) {
            (_, 0) => Ok(false),
            (_, 1) => Ok(true),
            (BoolPolicy::Lenient, _) => Ok(true),
            (BoolPolicy::Strict, other) => Err(XdrError::NonCanonicalBool(other)),
        }
    }

    // Opaques and strings.

    /// Encode fixed-length opaque data: the bytes plus zero padding, no
    /// length prefix.
    pub fn encode_opaque_fixed(&mut self, data: &[u8]) -> Result<(), XdrError> {
        self.check_encoding();
        self.buf.put_slice(data)?;
        self.buf.put_slice(&PADDING[..pad_len(data.len())])?;
        Ok(())
    }

    /// Encode variable-length opaque data: u32 length, bytes, zero padding.
    pub fn encode_opaque(&mut self, data: &[u8]) -> Result<(), XdrError> {
        self.encode_u32(data.len() as u32)?;
        self.encode_opaque_fixed(data)
    }

    /// Encode a UTF-8 string as variable-length opaque data.
    pub fn encode_string(&mut self, s: &str) -> Result<(), XdrError> {
        self.encode_opaque(s.as_bytes())
    }

    /// Encode an optional string; `None` goes out as the empty string.
    pub fn encode_opt_string(&mut self, s: Option<&str>) -> Result<(), XdrError> {
        self.encode_string(s.unwrap_or(""))
    }

    /// Decode fixed-length opaque data of a known size, skipping padding.
    pub fn decode_opaque_fixed(&mut self, len: usize) -> Result<Vec<u8>, XdrError> {
        self.check_decoding();
        if len > self.buf.remaining() {
            return Err(XdrError::BadLength {
                declared: len as u32,
                available: self.buf.remaining(),
            });
        }
        let mut out = vec![0u8; len];
        self.buf.get_slice(&mut out)?;
        self.buf.skip(pad_len(len))?;
        Ok(out)
    }

    /// Decode variable-length opaque data.
    pub fn decode_opaque(&mut self) -> Result<Vec<u8>, XdrError> {
        let len = self.decode_u32()?;
        self.decode_opaque_fixed(len as usize)
    }

    /// Decode a UTF-8 string.
    pub fn decode_string(&mut self) -> Result<String, XdrError> {
        let bytes = self.decode_opaque()?;
        String::from_utf8(bytes).map_err(XdrError::Utf8)
    }

    // Vectors and optionals.

    pub fn encode_int_vec(&mut self, values: &[i32]) -> Result<(), XdrError> {
        self.encode_u32(values.len() as u32)?;
        for v in values {
            self.encode_i32(*v)?;
        }
        Ok(())
    }

    pub fn decode_int_vec(&mut self) -> Result<Vec<i32>, XdrError> {
        let count = self.decode_u32()?;
        self.check_count(count, 4)?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.decode_i32()?);
        }
        Ok(out)
    }

    pub fn encode_long_vec(&mut self, values: &[i64]) -> Result<(), XdrError> {
        self.encode_u32(values.len() as u32)?;
        for v in values {
            self.encode_i64(*v)?;
        }
        Ok(())
    }

    pub fn decode_long_vec(&mut self) -> Result<Vec<i64>, XdrError> {
        let count = self.decode_u32()?;
        self.check_count(count, 8)?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.decode_i64()?);
        }
        Ok(out)
    }

    /// Encode a counted sequence of composite values.
    pub fn encode_vec<T: XdrEncode>(&mut self, values: &[T]) -> Result<(), XdrError> {
        self.encode_u32(values.len() as u32)?;
        for v in values {
            v.encode_xdr(self)?;
        }
        Ok(())
    }

    /// Decode a counted sequence of composite values.
    pub fn decode_vec<T: XdrDecode>(&mut self) -> Result<Vec<T>, XdrError> {
        let count = self.decode_u32()?;
        // Every XDR datum is at least 4 octets, so an honest count can never
        // exceed remaining/4. Checking up front keeps a hostile count from
        // reserving gigabytes.
        self.check_count(count, 4)?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(T::decode_xdr(self)?);
        }
        Ok(out)
    }

    /// Encode a fixed-length array: the elements back to back, no count.
    pub fn encode_fixed_vec<T: XdrEncode>(&mut self, values: &[T]) -> Result<(), XdrError> {
        for v in values {
            v.encode_xdr(self)?;
        }
        Ok(())
    }

    /// Decode a fixed-length array whose count comes from the protocol, not
    /// the wire.
    pub fn decode_fixed_vec<T: XdrDecode>(&mut self, count: usize) -> Result<Vec<T>, XdrError> {
        self.check_count(count as u32, 4)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(T::decode_xdr(self)?);
        }
        Ok(out)
    }

    /// Encode `Some(v)` as `true` followed by `v`, `None` as `false`.
    pub fn encode_optional<T: XdrEncode>(&mut self, value: Option<&T>) -> Result<(), XdrError> {
        match value {
            Some(v) => {
                self.encode_bool(true)?;
                v.encode_xdr(self)
            }
            None => self.encode_bool(false),
        }
    }

    /// Decode an optional value.
    pub fn decode_optional<T: XdrDecode>(&mut self) -> Result<Option<T>, XdrError> {
        if self.decode_bool()? {
            Ok(Some(T::decode_xdr(self)?))
        } else {
            Ok(None)
        }
    }

    fn check_count(&self, count: u32, elem_size: usize) -> Result<(), XdrError> {
        let available = self.buf.remaining();
        if (count as u64) * (elem_size as u64) > available as u64 {
            return Err(XdrError::BadLength {
                declared: count,
                available,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Xdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Xdr")
            .field("buf", &self.buf)
            .field("state", &self.state)
            .finish()
    }
}

/// A value that can write itself to an [`Xdr`] stream.
pub trait XdrEncode {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError>;
}

/// A value that can read itself from an [`Xdr`] stream.
pub trait XdrDecode: Sized {
    fn decode_xdr(xdr: &mut Xdr) -> Result<Self, XdrError>;
}

/// XDR void: occupies no octets.
impl XdrEncode for () {
    fn encode_xdr(&self, _xdr: &mut Xdr) -> Result<(), XdrError> {
        Ok(())
    }
}

impl XdrDecode for () {
    fn decode_xdr(_xdr: &mut Xdr) -> Result<Self, XdrError> {
        Ok(())
    }
}

macro_rules! xdr_primitive {
    ($ty:ty, $enc:ident, $dec:ident) => {
        impl XdrEncode for $ty {
            fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
                xdr.$enc(*self)
            }
        }
        impl XdrDecode for $ty {
            fn decode_xdr(xdr: &mut Xdr) -> Result<Self, XdrError> {
                xdr.$dec()
            }
        }
    };
}

xdr_primitive!(i32, encode_i32, decode_i32);
xdr_primitive!(u32, encode_u32, decode_u32);
xdr_primitive!(i64, encode_i64, decode_i64);
xdr_primitive!(u64, encode_u64, decode_u64);
xdr_primitive!(bool, encode_bool, decode_bool);
xdr_primitive!(f32, encode_f32, decode_f32);
xdr_primitive!(f64, encode_f64, decode_f64);

impl XdrEncode for String {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_string(self)
    }
}

impl XdrDecode for String {
    fn decode_xdr(xdr: &mut Xdr) -> Result<Self, XdrError> {
        xdr.decode_string()
    }
}

impl XdrEncode for &str {
    fn encode_xdr(&self, xdr: &mut Xdr) -> Result<(), XdrError> {
        xdr.encode_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(fill: impl FnOnce(&mut Xdr)) -> Xdr {
        let mut xdr = Xdr::new(1024);
        xdr.begin_encoding();
        fill(&mut xdr);
        xdr.end_encoding();
        xdr.begin_decoding();
        xdr
    }

    #[test]
    fn encode_decode_int() {
        let mut xdr = Xdr::new(1024);
        xdr.begin_encoding();
        xdr.encode_i32(17).unwrap();
        xdr.end_encoding();
        assert_eq!(xdr.buffer().to_bytes(), vec![0x00, 0x00, 0x00, 0x11]);
        xdr.begin_decoding();
        assert_eq!(xdr.decode_i32().unwrap(), 17);
    }

    #[test]
    fn encode_decode_dynamic_opaque() {
        let data = b"some random data".to_vec();
        let mut xdr = roundtrip(|x| x.encode_opaque(&data).unwrap());
        assert_eq!(xdr.decode_opaque().unwrap(), data);
    }

    #[test]
    fn opaque_occupies_aligned_length() {
        for len in 0usize..=9 {
            let data = vec![0xAB; len];
            let mut xdr = Xdr::new(64);
            xdr.begin_encoding();
            xdr.encode_opaque(&data).unwrap();
            xdr.end_encoding();
            let expected = 4 + len + (4 - len % 4) % 4;
            assert_eq!(xdr.buffer().remaining(), expected, "len {len}");
        }
    }

    #[test]
    fn padding_bytes_are_zero() {
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_opaque(&[0xFF; 5]).unwrap();
        xdr.end_encoding();
        let bytes = xdr.buffer().to_bytes();
        assert_eq!(&bytes[9..12], &[0, 0, 0]);
    }

    #[test]
    fn encode_decode_booleans() {
        let mut xdr = roundtrip(|x| {
            x.encode_bool(true).unwrap();
            x.encode_bool(false).unwrap();
        });
        assert!(xdr.decode_bool().unwrap());
        assert!(!xdr.decode_bool().unwrap());
    }

    #[test]
    fn lenient_bool_accepts_any_nonzero() {
        let mut xdr = roundtrip(|x| x.encode_u32(0xFFFF_FFFF).unwrap());
        assert!(xdr.decode_bool().unwrap());
    }

    #[test]
    fn strict_bool_rejects_noncanonical() {
        let mut xdr = Xdr::new(16).with_bool_policy(BoolPolicy::Strict);
        xdr.begin_encoding();
        xdr.encode_u32(2).unwrap();
        xdr.end_encoding();
        xdr.begin_decoding();
        match xdr.decode_bool() {
            Err(XdrError::NonCanonicalBool(2)) => {}
            other => panic!("expected NonCanonicalBool, got {other:?}"),
        }
    }

    #[test]
    fn encode_decode_string() {
        let original = "some random data";
        let mut xdr = roundtrip(|x| x.encode_string(original).unwrap());
        assert_eq!(xdr.decode_string().unwrap(), original);
    }

    #[test]
    fn encode_decode_empty_string() {
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_string("").unwrap();
        xdr.end_encoding();
        assert_eq!(xdr.buffer().to_bytes(), vec![0, 0, 0, 0]);
        xdr.begin_decoding();
        assert_eq!(xdr.decode_string().unwrap(), "");
    }

    #[test]
    fn null_string_roundtrips_as_empty() {
        let mut a = Xdr::new(64);
        a.begin_encoding();
        a.encode_opt_string(None).unwrap();
        a.end_encoding();

        let mut b = Xdr::new(64);
        b.begin_encoding();
        b.encode_string("").unwrap();
        b.end_encoding();

        assert_eq!(a.buffer().to_bytes(), b.buffer().to_bytes());
        a.begin_decoding();
        assert_eq!(a.decode_string().unwrap(), "");
    }

    #[test]
    fn encode_decode_long() {
        let value = 7i64 << 32;
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_i64(value).unwrap();
        xdr.end_encoding();
        assert_eq!(
            xdr.buffer().to_bytes(),
            vec![0x00, 0x00, 0x00, 0x07, 0x00, 0x00, 0x00, 0x00]
        );
        xdr.begin_decoding();
        assert_eq!(xdr.decode_i64().unwrap(), value);
    }

    #[test]
    fn encode_decode_long_extremes() {
        for value in [i64::MIN, i64::MAX, 0, -1] {
            let mut xdr = roundtrip(|x| x.encode_i64(value).unwrap());
            assert_eq!(xdr.decode_i64().unwrap(), value);
        }
    }

    #[test]
    fn min_long_wire_bytes() {
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_i64(i64::MIN).unwrap();
        xdr.end_encoding();
        assert_eq!(
            xdr.buffer().to_bytes(),
            vec![0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn encode_decode_int_vector() {
        let vector = [1, 2, 3, 4];
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_int_vec(&vector).unwrap();
        xdr.end_encoding();
        let mut expected = vec![0, 0, 0, 4];
        for v in vector {
            expected.extend_from_slice(&(v as u32).to_be_bytes());
        }
        assert_eq!(xdr.buffer().to_bytes(), expected);
        xdr.begin_decoding();
        assert_eq!(xdr.decode_int_vec().unwrap(), vector);
    }

    #[test]
    fn encode_decode_floats() {
        let mut xdr = roundtrip(|x| {
            x.encode_f32(1.5).unwrap();
            x.encode_f64(-2.25).unwrap();
        });
        assert_eq!(xdr.decode_f32().unwrap(), 1.5);
        assert_eq!(xdr.decode_f64().unwrap(), -2.25);
    }

    #[test]
    fn encode_decode_optional() {
        let mut xdr = roundtrip(|x| {
            x.encode_optional(Some(&42u32)).unwrap();
            x.encode_optional::<u32>(None).unwrap();
        });
        assert_eq!(xdr.decode_optional::<u32>().unwrap(), Some(42));
        assert_eq!(xdr.decode_optional::<u32>().unwrap(), None);
    }

    #[test]
    fn auto_grow_preserves_values() {
        // Two longs into a 10-byte buffer force a grow mid-stream.
        let mut xdr = Xdr::new(10);
        xdr.begin_encoding();
        xdr.encode_i64(1).unwrap();
        xdr.encode_i64(2).unwrap();
        xdr.end_encoding();
        xdr.begin_decoding();
        assert_eq!(xdr.decode_i64().unwrap(), 1);
        assert_eq!(xdr.decode_i64().unwrap(), 2);
    }

    #[test]
    fn declared_length_past_end_is_rejected() {
        let mut xdr = Xdr::from_bytes(vec![0x00, 0x00, 0x10, 0x00, 0xAA, 0xBB]);
        xdr.begin_decoding();
        match xdr.decode_opaque() {
            Err(XdrError::BadLength { declared: 0x1000, .. }) => {}
            other => panic!("expected BadLength, got {other:?}"),
        }
    }

    #[test]
    fn hostile_vector_count_is_rejected() {
        let mut xdr = Xdr::from_bytes(vec![0xFF, 0xFF, 0xFF, 0xFF]);
        xdr.begin_decoding();
        assert!(matches!(
            xdr.decode_vec::<u32>(),
            Err(XdrError::BadLength { .. })
        ));
    }

    #[test]
    fn truncated_read_underflows() {
        let mut xdr = Xdr::from_bytes(vec![0x00, 0x00]);
        xdr.begin_decoding();
        assert!(matches!(xdr.decode_u32(), Err(XdrError::Buffer(_))));
    }

    #[test]
    fn malformed_utf8_is_surfaced() {
        let mut xdr = Xdr::new(16);
        xdr.begin_encoding();
        xdr.encode_opaque(&[0xC3, 0x28]).unwrap();
        xdr.end_encoding();
        xdr.begin_decoding();
        assert!(matches!(xdr.decode_string(), Err(XdrError::Utf8(_))));
    }

    #[test]
    fn generic_roundtrip_via_traits() {
        let mut xdr = roundtrip(|x| {
            x.encode_vec(&[10u32, 20, 30]).unwrap();
        });
        assert_eq!(xdr.decode_vec::<u32>().unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn fixed_array_has_no_count_word() {
        let mut xdr = Xdr::new(64);
        xdr.begin_encoding();
        xdr.encode_fixed_vec(&[1u32, 2, 3]).unwrap();
        xdr.end_encoding();
        assert_eq!(xdr.buffer().remaining(), 12);
        xdr.begin_decoding();
        assert_eq!(xdr.decode_fixed_vec::<u32>(3).unwrap(), vec![1, 2, 3]);
    }
}
