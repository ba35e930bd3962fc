//! Length-prefixed wire primitives shared by the metadata and body coders.
//!
//! Strings are an `i32` byte length followed by UTF-8 bytes; `-1` marks an
//! absent string or array. All fixed-width fields are big-endian.

#![allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]

use super::Error;

use bytes::{Buf, BufMut, BytesMut};

const ABSENT: i32 = -1;

pub(crate) fn put_string(buf: &mut BytesMut, value: &str) {
    buf.put_i32(value.len() as i32);
    buf.put_slice(value.as_bytes());
}

pub(crate) fn put_opt_string(buf: &mut BytesMut, value: Option<&str>) {
    match value {
        Some(value) => put_string(buf, value),
        None => buf.put_i32(ABSENT),
    }
}

pub(crate) fn put_string_array(buf: &mut BytesMut, values: &[String]) {
    buf.put_i32(values.len() as i32);
    for value in values {
        put_string(buf, value);
    }
}

pub(crate) fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub(crate) fn get_i32(buf: &mut impl Buf) -> Result<i32, Error> {
    if buf.remaining() < 4 {
        return Err(Error::Truncated);
    }
    Ok(buf.get_i32())
}

pub(crate) fn get_u32(buf: &mut impl Buf) -> Result<u32, Error> {
    Ok(get_i32(buf)? as u32)
}

pub(crate) fn get_i64(buf: &mut impl Buf) -> Result<i64, Error> {
    if buf.remaining() < 8 {
        return Err(Error::Truncated);
    }
    Ok(buf.get_i64())
}

pub(crate) fn get_bool(buf: &mut impl Buf) -> Result<bool, Error> {
    if buf.remaining() < 1 {
        return Err(Error::Truncated);
    }
    Ok(buf.get_u8() != 0)
}

pub(crate) fn get_opt_string(buf: &mut impl Buf) -> Result<Option<String>, Error> {
    let len = get_i32(buf)?;
    if len == ABSENT {
        return Ok(None);
    }
    let len = usize::try_from(len).map_err(|_| Error::InvalidLength(len))?;
    if buf.remaining() < len {
        return Err(Error::Truncated);
    }
    let bytes = buf.copy_to_bytes(len);
    let value = String::from_utf8(bytes.to_vec()).map_err(|_| Error::InvalidUtf8)?;
    Ok(Some(value))
}

pub(crate) fn get_string(buf: &mut impl Buf) -> Result<String, Error> {
    get_opt_string(buf)?.ok_or(Error::AbsentString)
}

pub(crate) fn get_string_array(buf: &mut impl Buf) -> Result<Option<Vec<String>>, Error> {
    let len = get_i32(buf)?;
    if len == ABSENT {
        return Ok(None);
    }
    let count = usize::try_from(len).map_err(|_| Error::InvalidLength(len))?;
    // Every element needs at least its length prefix.
    if buf.remaining() < count.saturating_mul(4) {
        return Err(Error::Truncated);
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(get_string(buf)?);
    }
    Ok(Some(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "hello");
        put_string(&mut buf, "");

        let mut bytes = &buf.freeze()[..];
        assert_eq!(get_string(&mut bytes).unwrap(), "hello");
        assert_eq!(get_string(&mut bytes).unwrap(), "");
        assert!(!bytes.has_remaining());
    }

    #[test]
    fn test_absent_string_round_trip() {
        let mut buf = BytesMut::new();
        put_opt_string(&mut buf, None);
        put_opt_string(&mut buf, Some("present"));

        let mut bytes = &buf.freeze()[..];
        assert_eq!(get_opt_string(&mut bytes).unwrap(), None);
        assert_eq!(get_opt_string(&mut bytes).unwrap().as_deref(), Some("present"));
    }

    #[test]
    fn test_string_array_round_trip() {
        let values = vec!["a".to_owned(), String::new(), "c".to_owned()];
        let mut buf = BytesMut::new();
        put_string_array(&mut buf, &values);

        let mut bytes = &buf.freeze()[..];
        assert_eq!(get_string_array(&mut bytes).unwrap(), Some(values));
    }

    #[test]
    fn test_empty_array_is_not_absent() {
        let mut buf = BytesMut::new();
        put_string_array(&mut buf, &[]);

        let mut bytes = &buf.freeze()[..];
        assert_eq!(get_string_array(&mut bytes).unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_negative_length_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32(-7);

        let mut bytes = &buf.freeze()[..];
        assert!(matches!(
            get_opt_string(&mut bytes),
            Err(Error::InvalidLength(-7))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32(2);
        buf.put_slice(&[0xff, 0xfe]);

        let mut bytes = &buf.freeze()[..];
        assert!(matches!(get_string(&mut bytes), Err(Error::InvalidUtf8)));
    }

    #[test]
    fn test_truncated_input_is_rejected() {
        let mut buf = BytesMut::new();
        buf.put_i32(10);
        buf.put_slice(b"short");

        let mut bytes = &buf.freeze()[..];
        assert!(matches!(get_string(&mut bytes), Err(Error::Truncated)));
    }
}
