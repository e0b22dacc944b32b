//! Variable byte integer codec
//!
//! Used for the fixed-header remaining length, the MQTT 5 properties length
//! and subscription identifiers. Each byte carries 7 bits of value, least
//! significant group first; the high bit flags a continuation byte.

use crate::error::{MqttError, Result};
use bytes::{Buf, BufMut};

/// Maximum value that can be encoded as a variable byte integer (268,435,455)
pub const VARIABLE_INT_MAX: u32 = 268_435_455;

/// Maximum number of bytes a variable byte integer may occupy
pub const VARIABLE_INT_MAX_BYTES: usize = 4;

/// Multiplier of the fourth (last legal) length byte
const MAX_MULTIPLIER: u32 = 128 * 128 * 128;

/// Outcome of peeking a variable byte integer from a partially received buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableIntPeek {
    /// Decoded value and the number of bytes it occupies
    Complete { value: u32, len: usize },
    /// The continuation bit is set on the last available byte
    Incomplete,
    /// A fifth continuation byte would be required
    Malformed,
}

/// Variable length integer as defined by MQTT specification
///
/// Encodes values using 1-4 bytes:
/// - 0-127: 1 byte
/// - 128-16,383: 2 bytes
/// - 16,384-2,097,151: 3 bytes
/// - 2,097,152-268,435,455: 4 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableInt {
    value: u32,
}

impl VariableInt {
    /// Creates a new `VariableInt` from a u32 value
    ///
    /// # Errors
    ///
    /// Returns `MqttError::ProtocolError` if the value exceeds the maximum
    pub fn new(value: u32) -> Result<Self> {
        if value > VARIABLE_INT_MAX {
            return Err(MqttError::ProtocolError(format!(
                "Variable integer value {value} exceeds maximum {VARIABLE_INT_MAX}"
            )));
        }
        Ok(Self { value })
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Returns the number of bytes needed to encode this value
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        match self.value {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }

    /// Encodes this variable integer into the provided buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        let mut remaining = self.value;
        loop {
            // remaining % 128 always fits in 7 bits
            #[allow(clippy::cast_possible_truncation)]
            let mut byte = (remaining % 128) as u8;
            remaining /= 128;
            if remaining > 0 {
                byte |= 0x80;
            }
            buf.put_u8(byte);
            if remaining == 0 {
                break;
            }
        }
    }

    /// Inspects the start of `bytes` without consuming anything.
    ///
    /// This is what the frame decoder uses for the remaining length, where a
    /// short buffer means "wait for the next read" rather than an error.
    #[must_use]
    pub fn peek(bytes: &[u8]) -> VariableIntPeek {
        let mut value = 0u32;
        let mut multiplier = 1u32;

        for (index, byte) in bytes.iter().enumerate() {
            value += u32::from(byte & 0x7F) * multiplier;
            if byte & 0x80 == 0 {
                return VariableIntPeek::Complete {
                    value,
                    len: index + 1,
                };
            }
            if multiplier == MAX_MULTIPLIER {
                return VariableIntPeek::Malformed;
            }
            multiplier *= 128;
        }

        VariableIntPeek::Incomplete
    }

    /// Decodes a variable integer from a buffer that must already hold it
    /// completely (a packet body).
    ///
    /// # Errors
    ///
    /// Returns `MqttError::MalformedPacket` if the buffer ends early or more
    /// than 4 bytes are used
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        match Self::peek(buf.chunk()) {
            VariableIntPeek::Complete { value, len } => {
                buf.advance(len);
                Ok(Self { value })
            }
            VariableIntPeek::Incomplete => Err(MqttError::MalformedPacket(
                "Insufficient bytes for variable integer".to_string(),
            )),
            VariableIntPeek::Malformed => Err(MqttError::MalformedPacket(
                "Variable integer exceeds 4 bytes".to_string(),
            )),
        }
    }
}

impl From<VariableInt> for u32 {
    fn from(v: VariableInt) -> Self {
        v.value
    }
}

impl TryFrom<usize> for VariableInt {
    type Error = MqttError;

    fn try_from(value: usize) -> Result<Self> {
        let value = u32::try_from(value).map_err(|_| {
            MqttError::ProtocolError("Value too large for variable integer".to_string())
        })?;
        Self::new(value)
    }
}

/// Encodes a u32 value as a variable byte integer
///
/// # Errors
///
/// Returns `MqttError::ProtocolError` if the value exceeds the maximum
pub fn encode_variable_int<B: BufMut>(buf: &mut B, value: u32) -> Result<()> {
    VariableInt::new(value)?.encode(buf);
    Ok(())
}

/// Decodes a variable byte integer from a packet body
///
/// # Errors
///
/// Returns an error if decoding fails
pub fn decode_variable_int<B: Buf>(buf: &mut B) -> Result<u32> {
    Ok(VariableInt::decode(buf)?.value())
}

/// Number of bytes needed to encode `value`
#[must_use]
pub fn variable_int_len(value: u32) -> usize {
    VariableInt {
        value: value.min(VARIABLE_INT_MAX),
    }
    .encoded_size()
}
