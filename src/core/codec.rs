//! Binary Argument Codec
//!
//! Packs a heterogeneous, ordered argument list into one contiguous byte
//! payload so a single opaque buffer can carry any command shape across
//! the owner/worker boundary.
//!
//! ## Field Layout
//!
//! Every field starts with a one-byte [`ArgTag`]; lengths and counts are
//! `u32` little-endian, integers are `i64` little-endian.
//!
//! ```text
//! Bytes  : 0x01 | len:u32 | bytes
//! Int    : 0x02 | i64
//! Bool   : 0x03 | u8 (0 or 1)
//! Pair   : 0x04 | len:u32 | key | len:u32 | value
//! Array  : 0x05 | count:u32 | (len:u32 | bytes) * count
//! Double : 0x06 | f64 bits
//! ```
//!
//! Encoding never fails for fields within [`MAX_FIELD_LEN`]; writing a
//! longer field or array panics, so callers holding user data validate it
//! first with [`check_command`]. Decoding fails with `InvalidArgument` when
//! the buffer is short, a tag does not match, or a declared length exceeds
//! the remaining bytes.

use crate::core::error::{ConnectorError, Result};

/// Largest byte string (or array element count) a single field can carry.
pub const MAX_FIELD_LEN: usize = u32::MAX as usize;

/// Field tag written before every encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArgTag {
    /// Length-prefixed byte string.
    Bytes = 0x01,
    /// Signed 64-bit integer.
    Int = 0x02,
    /// Boolean.
    Bool = 0x03,
    /// Key/value pair of byte strings.
    Pair = 0x04,
    /// Array of byte strings.
    Array = 0x05,
    /// 64-bit float.
    Double = 0x06,
}

impl ArgTag {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(ArgTag::Bytes),
            0x02 => Some(ArgTag::Int),
            0x03 => Some(ArgTag::Bool),
            0x04 => Some(ArgTag::Pair),
            0x05 => Some(ArgTag::Array),
            0x06 => Some(ArgTag::Double),
            _ => None,
        }
    }
}

// =============================================================================
// ENCODER
// =============================================================================

/// Growable argument encoder.
///
/// # Panics
///
/// Every `put_*` taking bytes panics if a byte string is longer than
/// [`MAX_FIELD_LEN`] or an array has more elements than that.
#[derive(Debug, Default)]
pub struct ArgWriter {
    buf: Vec<u8>,
    fields: usize,
}

impl ArgWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing buffer. Its contents are cleared, its capacity kept.
    pub fn reuse(mut buf: Vec<u8>) -> Self {
        buf.clear();
        Self { buf, fields: 0 }
    }

    /// Append a byte string.
    pub fn put_bytes(&mut self, value: impl AsRef<[u8]>) -> &mut Self {
        self.buf.push(ArgTag::Bytes as u8);
        self.put_raw(value.as_ref());
        self.fields += 1;
        self
    }

    /// Append a UTF-8 string (encoded as bytes).
    pub fn put_str(&mut self, value: &str) -> &mut Self {
        self.put_bytes(value.as_bytes())
    }

    /// Append an integer.
    pub fn put_int(&mut self, value: i64) -> &mut Self {
        self.buf.push(ArgTag::Int as u8);
        self.buf.extend_from_slice(&value.to_le_bytes());
        self.fields += 1;
        self
    }

    /// Append a boolean.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(ArgTag::Bool as u8);
        self.buf.push(value as u8);
        self.fields += 1;
        self
    }

    /// Append a float.
    pub fn put_double(&mut self, value: f64) -> &mut Self {
        self.buf.push(ArgTag::Double as u8);
        self.buf.extend_from_slice(&value.to_bits().to_le_bytes());
        self.fields += 1;
        self
    }

    /// Append a key/value pair.
    pub fn put_pair(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> &mut Self {
        self.buf.push(ArgTag::Pair as u8);
        self.put_raw(key.as_ref());
        self.put_raw(value.as_ref());
        self.fields += 1;
        self
    }

    /// Append an array of byte strings.
    pub fn put_array<I, T>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.buf.push(ArgTag::Array as u8);
        let count_at = self.buf.len();
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        let mut count: u32 = 0;
        for value in values {
            self.put_raw(value.as_ref());
            count = count
                .checked_add(1)
                .unwrap_or_else(|| panic!("array exceeds {MAX_FIELD_LEN} elements"));
        }
        self.buf[count_at..count_at + 4].copy_from_slice(&count.to_le_bytes());
        self.fields += 1;
        self
    }

    /// Number of fields written so far.
    pub fn field_count(&self) -> usize {
        self.fields
    }

    /// Encoded size in bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Finish encoding and take the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn put_raw(&mut self, bytes: &[u8]) {
        let len = u32::try_from(bytes.len()).unwrap_or_else(|_| {
            panic!("field of {} bytes exceeds {MAX_FIELD_LEN}", bytes.len())
        });
        self.buf.extend_from_slice(&len.to_le_bytes());
        self.buf.extend_from_slice(bytes);
    }
}

// =============================================================================
// DECODER
// =============================================================================

/// Zero-copy argument decoder over a borrowed payload.
#[derive(Debug, Clone)]
pub struct ArgReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ArgReader<'a> {
    /// Start decoding `buf` from the beginning.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// True once every field has been consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Tag of the next field without consuming it.
    pub fn peek_tag(&self) -> Option<ArgTag> {
        self.buf.get(self.pos).copied().and_then(ArgTag::from_u8)
    }

    /// Read a byte string.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        self.expect_tag(ArgTag::Bytes)?;
        self.take_raw()
    }

    /// Read a byte string that must be valid UTF-8.
    pub fn read_str(&mut self) -> Result<&'a str> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map_err(|_| ConnectorError::invalid("string field is not valid utf-8"))
    }

    /// Read an integer.
    pub fn read_int(&mut self) -> Result<i64> {
        self.expect_tag(ArgTag::Int)?;
        let raw = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(raw);
        Ok(i64::from_le_bytes(arr))
    }

    /// Read a boolean.
    pub fn read_bool(&mut self) -> Result<bool> {
        self.expect_tag(ArgTag::Bool)?;
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ConnectorError::invalid(format!("bad bool byte {other:#04x}"))),
        }
    }

    /// Read a float.
    pub fn read_double(&mut self) -> Result<f64> {
        self.expect_tag(ArgTag::Double)?;
        let raw = self.take(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(raw);
        Ok(f64::from_bits(u64::from_le_bytes(arr)))
    }

    /// Read a key/value pair.
    pub fn read_pair(&mut self) -> Result<(&'a [u8], &'a [u8])> {
        self.expect_tag(ArgTag::Pair)?;
        let key = self.take_raw()?;
        let value = self.take_raw()?;
        Ok((key, value))
    }

    /// Read an array of byte strings.
    pub fn read_array(&mut self) -> Result<Vec<&'a [u8]>> {
        self.expect_tag(ArgTag::Array)?;
        let count = self.take_u32()? as usize;
        // Each element needs at least its 4-byte length prefix.
        if count > self.remaining() / 4 {
            return Err(ConnectorError::invalid(format!(
                "array count {count} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.take_raw()?);
        }
        Ok(out)
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::invalid(format!(
                "{} trailing bytes after last field",
                self.remaining()
            )))
        }
    }

    fn expect_tag(&mut self, want: ArgTag) -> Result<()> {
        let byte = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| ConnectorError::invalid(format!("missing {want:?} field")))?;
        if byte != want as u8 {
            return Err(ConnectorError::invalid(format!(
                "expected {want:?} field, found tag {byte:#04x}"
            )));
        }
        self.pos += 1;
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(ConnectorError::invalid(format!(
                "field needs {n} bytes, {} remaining",
                self.remaining()
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_u32(&mut self) -> Result<u32> {
        let raw = self.take(4)?;
        let mut arr = [0u8; 4];
        arr.copy_from_slice(raw);
        Ok(u32::from_le_bytes(arr))
    }

    fn take_raw(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}

// =============================================================================
// COMMAND HELPERS
// =============================================================================

/// Validate a command before encoding it: the name must be non-empty and
/// every field must fit the codec.
pub fn check_command<P: AsRef<[u8]>>(name: &str, params: &[P]) -> Result<()> {
    check_command_within(name, params, MAX_FIELD_LEN)
}

fn check_command_within<P: AsRef<[u8]>>(name: &str, params: &[P], limit: usize) -> Result<()> {
    if name.is_empty() {
        return Err(ConnectorError::invalid("empty command name"));
    }
    if name.len() > limit {
        return Err(ConnectorError::invalid(format!(
            "command name of {} bytes exceeds {limit}",
            name.len()
        )));
    }
    if params.len() > limit {
        return Err(ConnectorError::invalid(format!(
            "{} params exceed {limit}",
            params.len()
        )));
    }
    for (i, param) in params.iter().enumerate() {
        let bytes: &[u8] = param.as_ref();
        if bytes.len() > limit {
            return Err(ConnectorError::invalid(format!(
                "param {i} of {} bytes exceeds {limit}",
                bytes.len()
            )));
        }
    }
    Ok(())
}

/// Encode one `name params...` command. See [`check_command`].
pub fn encode_command<P: AsRef<[u8]>>(writer: &mut ArgWriter, name: &str, params: &[P]) {
    writer.put_str(name);
    writer.put_array(params.iter().map(AsRef::<[u8]>::as_ref));
}

/// Decode one command written by [`encode_command`].
pub fn decode_command<'a>(reader: &mut ArgReader<'a>) -> Result<(&'a str, Vec<&'a [u8]>)> {
    let name = reader.read_str()?;
    if name.is_empty() {
        return Err(ConnectorError::invalid("empty command name"));
    }
    let params = reader.read_array()?;
    Ok((name, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mixed_fields_decode_in_order() {
        let mut w = ArgWriter::new();
        w.put_str("HSET")
            .put_int(-42)
            .put_bool(true)
            .put_pair("field", b"\x00\xff")
            .put_array(["a", "", "ccc"])
            .put_double(1.5);
        assert_eq!(w.field_count(), 6);

        let payload = w.into_bytes();
        let mut r = ArgReader::new(&payload);
        assert_eq!(r.read_str().unwrap(), "HSET");
        assert_eq!(r.read_int().unwrap(), -42);
        assert!(r.read_bool().unwrap());
        assert_eq!(r.read_pair().unwrap(), (&b"field"[..], &b"\x00\xff"[..]));
        let arr = r.read_array().unwrap();
        assert_eq!(arr, vec![&b"a"[..], &b""[..], &b"ccc"[..]]);
        assert_eq!(r.read_double().unwrap(), 1.5);
        assert!(r.finish().is_ok());
    }

    #[test]
    fn test_short_buffer_rejected() {
        let mut w = ArgWriter::new();
        w.put_bytes(b"hello world");
        let payload = w.into_bytes();

        let truncated = &payload[..payload.len() - 3];
        let err = ArgReader::new(truncated).read_bytes().unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidArgument(_)));
    }

    #[test]
    fn test_declared_length_past_end() {
        // Bytes tag claiming 1000 bytes with only 2 present.
        let mut payload = vec![ArgTag::Bytes as u8];
        payload.extend_from_slice(&1000u32.to_le_bytes());
        payload.extend_from_slice(b"ab");
        assert!(ArgReader::new(&payload).read_bytes().is_err());
    }

    #[test]
    fn test_tag_mismatch() {
        let mut w = ArgWriter::new();
        w.put_int(7);
        let payload = w.into_bytes();
        let mut r = ArgReader::new(&payload);
        assert!(r.read_bytes().is_err());
        // Failed read does not consume the field.
        assert_eq!(r.read_int().unwrap(), 7);
    }

    #[test]
    fn test_huge_array_count_rejected_without_allocating() {
        let mut payload = vec![ArgTag::Array as u8];
        payload.extend_from_slice(&u32::MAX.to_le_bytes());
        assert!(ArgReader::new(&payload).read_array().is_err());
    }

    #[test]
    fn test_bad_bool_byte() {
        let payload = [ArgTag::Bool as u8, 7];
        assert!(ArgReader::new(&payload).read_bool().is_err());
    }

    #[test]
    fn test_trailing_bytes_detected() {
        let mut w = ArgWriter::new();
        w.put_int(1).put_int(2);
        let payload = w.into_bytes();
        let mut r = ArgReader::new(&payload);
        r.read_int().unwrap();
        assert!(r.finish().is_err());
    }

    #[test]
    fn test_reuse_keeps_capacity() {
        let buf = Vec::with_capacity(256);
        let mut w = ArgWriter::reuse(buf);
        w.put_str("PING");
        let bytes = w.into_bytes();
        assert!(bytes.capacity() >= 256);

        let w = ArgWriter::reuse(bytes);
        assert!(w.is_empty());
        assert_eq!(w.field_count(), 0);
    }

    #[test]
    fn test_command_helpers() {
        let mut w = ArgWriter::new();
        encode_command(&mut w, "SET", &["key", "value"]);
        encode_command::<&str>(&mut w, "PING", &[]);
        let payload = w.into_bytes();

        let mut r = ArgReader::new(&payload);
        let (name, params) = decode_command(&mut r).unwrap();
        assert_eq!(name, "SET");
        assert_eq!(params, vec![&b"key"[..], &b"value"[..]]);
        let (name, params) = decode_command(&mut r).unwrap();
        assert_eq!(name, "PING");
        assert!(params.is_empty());
        assert!(r.is_empty());
    }

    #[test]
    fn test_check_command_enforces_field_limit() {
        assert!(check_command("SET", &["k", "v"]).is_ok());
        assert!(matches!(
            check_command::<&str>("", &[]),
            Err(ConnectorError::InvalidArgument(_))
        ));

        assert!(check_command_within("SET", &["key", "val"], 3).is_ok());
        assert!(check_command_within("SET", &["key", "value"], 3).is_err());
        assert!(check_command_within("HSET", &["k"], 3).is_err());
        assert!(check_command_within("GET", &["a", "b", "c", "d"], 3).is_err());
    }

    #[test]
    fn test_empty_command_name_rejected() {
        let mut w = ArgWriter::new();
        encode_command(&mut w, "", &["x"]);
        let payload = w.into_bytes();
        assert!(decode_command(&mut ArgReader::new(&payload)).is_err());
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bytes_never_panic(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut r = ArgReader::new(&data);
            // Walk the buffer with whatever tag comes next until it fails or ends.
            while let Some(tag) = r.peek_tag() {
                let ok = match tag {
                    ArgTag::Bytes => r.read_bytes().is_ok(),
                    ArgTag::Int => r.read_int().is_ok(),
                    ArgTag::Bool => r.read_bool().is_ok(),
                    ArgTag::Pair => r.read_pair().is_ok(),
                    ArgTag::Array => r.read_array().is_ok(),
                    ArgTag::Double => r.read_double().is_ok(),
                };
                if !ok {
                    break;
                }
            }
        }

        #[test]
        fn prop_command_params_survive(
            name in "[A-Z]{1,12}",
            params in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..32), 0..8),
        ) {
            let mut w = ArgWriter::new();
            encode_command(&mut w, &name, &params);
            let payload = w.into_bytes();
            let mut r = ArgReader::new(&payload);
            let (decoded_name, decoded) = decode_command(&mut r).unwrap();
            prop_assert_eq!(decoded_name, name.as_str());
            prop_assert_eq!(decoded.len(), params.len());
            for (a, b) in decoded.iter().zip(params.iter()) {
                prop_assert_eq!(*a, b.as_slice());
            }
            prop_assert!(r.is_empty());
        }
    }
}
