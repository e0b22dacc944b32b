use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Encodes a UTF-8 string with a 2-byte length prefix
///
/// # Errors
///
/// Returns an error if the string is longer than 65,535 bytes
pub fn encode_string<B: BufMut>(buf: &mut B, string: &str) -> Result<()> {
    let len = u16::try_from(string.len()).map_err(|_| {
        MqttError::MalformedPacket(format!(
            "String length {} exceeds maximum {}",
            string.len(),
            u16::MAX
        ))
    })?;
    buf.put_u16(len);
    buf.put_slice(string.as_bytes());
    Ok(())
}

/// Decodes a 2-byte length-prefixed string, always validating UTF-8
///
/// # Errors
///
/// See [`decode_string_with`]
pub fn decode_string<B: Buf>(buf: &mut B) -> Result<String> {
    decode_string_with(buf, true)
}

/// Decodes a 2-byte length-prefixed string.
///
/// With `validate_utf8` the bytes must be well-formed UTF-8 and must not
/// contain U+0000. Without it, invalid sequences are replaced and the
/// string is accepted as-is.
///
/// # Errors
///
/// Returns `MqttError::MalformedPacket` if:
/// - Fewer than 2 bytes remain for the length prefix
/// - Fewer bytes remain than the prefix declares
/// - Validation is on and the string is not well-formed
pub fn decode_string_with<B: Buf>(buf: &mut B, validate_utf8: bool) -> Result<String> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(
            "Insufficient bytes for string length".to_string(),
        ));
    }

    let len = buf.get_u16() as usize;

    if buf.remaining() < len {
        return Err(MqttError::MalformedPacket(format!(
            "Insufficient bytes for string data: expected {}, got {}",
            len,
            buf.remaining()
        )));
    }

    let mut bytes = vec![0u8; len];
    buf.copy_to_slice(&mut bytes);

    if !validate_utf8 {
        return Ok(String::from_utf8_lossy(&bytes).into_owned());
    }

    let string = String::from_utf8(bytes)
        .map_err(|e| MqttError::MalformedPacket(format!("Invalid UTF-8: {e}")))?;

    if string.contains('\0') {
        return Err(MqttError::MalformedPacket(
            "String contains null character".to_string(),
        ));
    }

    Ok(string)
}

/// Decodes a UTF-8 string pair (user property)
///
/// # Errors
///
/// Returns an error if either string fails to decode
pub fn decode_string_pair<B: Buf>(buf: &mut B, validate_utf8: bool) -> Result<(String, String)> {
    let key = decode_string_with(buf, validate_utf8)?;
    let value = decode_string_with(buf, validate_utf8)?;
    Ok((key, value))
}

/// Calculates the encoded length of a string (2 bytes for length + string bytes)
#[must_use]
pub fn string_len(string: &str) -> usize {
    2 + string.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_encode_decode_string() {
        let mut buf = BytesMut::new();

        let long_string = "a".repeat(300);
        for test_str in ["", "MQTT", "sensors/temp", "Hello, 世界!", &long_string] {
            buf.clear();
            encode_string(&mut buf, test_str).unwrap();
            assert_eq!(buf.len(), string_len(test_str));

            let decoded = decode_string(&mut buf).unwrap();
            assert_eq!(decoded, test_str);
        }
    }

    #[test]
    fn test_encode_string_too_long() {
        let mut buf = BytesMut::new();
        let too_long = "x".repeat(usize::from(u16::MAX) + 1);
        assert!(encode_string(&mut buf, &too_long).is_err());
    }

    #[test]
    fn test_decode_insufficient_length_bytes() {
        let mut buf = BytesMut::from(&[0x00u8][..]);
        assert!(matches!(
            decode_string(&mut buf),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_insufficient_string_bytes() {
        let mut buf = BytesMut::new();
        buf.put_u16(10);
        buf.put_slice(b"short");
        assert!(matches!(
            decode_string(&mut buf),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_strict() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_slice(&[0xC3, 0x28]);
        assert!(matches!(
            decode_string_with(&mut buf, true),
            Err(MqttError::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_decode_invalid_utf8_lenient() {
        let mut buf = BytesMut::new();
        buf.put_u16(2);
        buf.put_slice(&[0xC3, 0x28]);
        let decoded = decode_string_with(&mut buf, false).unwrap();
        assert_eq!(decoded.chars().count(), 2);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_null_character_strict() {
        let mut buf = BytesMut::new();
        buf.put_u16(3);
        buf.put_slice(b"a\0b");
        assert!(decode_string(&mut buf).is_err());
    }

    #[test]
    fn test_decode_string_pair() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "region").unwrap();
        encode_string(&mut buf, "eu-west").unwrap();
        let (key, value) = decode_string_pair(&mut buf, true).unwrap();
        assert_eq!(key, "region");
        assert_eq!(value, "eu-west");
    }
}
