//! Frame codec for PLC data areas
//!
//! Decodes raw bytes into typed values according to a [`FrameSpec`], and
//! writes typed values back into a schema-sized buffer. Wire rules per type:
//! ```text
//! INT16   2 bytes  big-endian signed
//! BYTE    1 byte   unsigned
//! BOOL    1 byte   bit `bit_index` (0 = LSB)
//! FLOAT   4 bytes  IEEE-754 big-endian
//! DOUBLE  8 bytes  IEEE-754 big-endian
//! STRING  [ capacity ][ used ][ payload: max_len bytes ]
//! ```

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use crate::frame::{DataType, FieldSpec, FrameSpec, STRING_HEADER_LEN};
use crate::snapshot::FrameSnapshot;

/// Errors that abandon a single decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("data length mismatch: {actual} != {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("field '{field}' ends at {end}, past buffer of {available} bytes")]
    OutOfBounds {
        field: String,
        end: usize,
        available: usize,
    },

    #[error("field '{field}' has bit index {bit_index} outside 0..7")]
    BitIndex { field: String, bit_index: u8 },

    #[error("frame has no field '{0}'")]
    MissingField(String),

    #[error("field '{field}' is not {expected}")]
    FieldType {
        field: String,
        expected: &'static str,
    },
}

/// Errors raised while writing values into a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("frame has no field '{0}'")]
    UnknownField(String),

    #[error("value for field '{field}' does not match its {expected} type")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },

    #[error("string for field '{field}' is {len} bytes (max: {max_len})")]
    StringTooLong {
        field: String,
        len: usize,
        max_len: usize,
    },
}

/// A decoded field value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int16(i16),
    Byte(u8),
    Bool(bool),
    Float(f32),
    Double(f64),
    Text(String),
}

/// Field values of one decoded frame, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedFrame {
    values: Vec<(String, FieldValue)>,
}

impl DecodedFrame {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    fn require(&self, name: &str) -> Result<&FieldValue, DecodeError> {
        self.get(name)
            .ok_or_else(|| DecodeError::MissingField(name.to_string()))
    }

    /// Integer value of an INT16 or BYTE field
    pub fn int(&self, name: &str) -> Result<i32, DecodeError> {
        match self.require(name)? {
            FieldValue::Int16(v) => Ok(i32::from(*v)),
            FieldValue::Byte(v) => Ok(i32::from(*v)),
            _ => Err(DecodeError::FieldType {
                field: name.to_string(),
                expected: "an integer",
            }),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, DecodeError> {
        match self.require(name)? {
            FieldValue::Text(v) => Ok(v),
            _ => Err(DecodeError::FieldType {
                field: name.to_string(),
                expected: "a string",
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Decode a whole frame
///
/// All-or-nothing: the buffer must be exactly `spec.length()` bytes and
/// every field must fit, otherwise no values are produced.
pub fn decode_frame(data: &[u8], spec: &FrameSpec) -> Result<DecodedFrame, DecodeError> {
    if data.len() != spec.length() {
        return Err(DecodeError::LengthMismatch {
            expected: spec.length(),
            actual: data.len(),
        });
    }

    let mut values = Vec::with_capacity(spec.fields().len());
    for field in spec.fields() {
        let index = field.offset() - spec.start();
        let value = decode_field(data, field, index)?;
        values.push((field.name().to_string(), value));
    }

    Ok(DecodedFrame { values })
}

/// Decode a frame straight into a snapshot type
pub fn decode<S: FrameSnapshot>(data: &[u8], spec: &FrameSpec) -> Result<S, DecodeError> {
    S::from_frame(&decode_frame(data, spec)?)
}

/// Decode one field starting at `index` within `data`
pub fn decode_field(data: &[u8], field: &FieldSpec, index: usize) -> Result<FieldValue, DecodeError> {
    let data_type = field.data_type();
    let end = index + data_type.width();
    if end > data.len() {
        return Err(DecodeError::OutOfBounds {
            field: field.name().to_string(),
            end,
            available: data.len(),
        });
    }
    let bytes = &data[index..end];

    let value = match data_type {
        DataType::Int16 => FieldValue::Int16(i16::from_be_bytes([bytes[0], bytes[1]])),
        DataType::Byte => FieldValue::Byte(bytes[0]),
        DataType::Bool { bit_index } => {
            if bit_index > 7 {
                return Err(DecodeError::BitIndex {
                    field: field.name().to_string(),
                    bit_index,
                });
            }
            FieldValue::Bool(bytes[0] & (1 << bit_index) != 0)
        }
        DataType::Float => {
            FieldValue::Float(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        DataType::Double => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            FieldValue::Double(f64::from_be_bytes(raw))
        }
        DataType::String { max_len } => FieldValue::Text(decode_string(bytes, max_len)),
    };

    Ok(value)
}

/// Decode a length-prefixed string occupying exactly `max_len + 2` bytes
///
/// The used-length byte is clamped to `max_len`, so a device reporting more
/// than the reserved capacity never makes the read leave the field.
fn decode_string(bytes: &[u8], max_len: usize) -> String {
    let used = usize::from(bytes[1]).min(max_len);
    let payload = &bytes[STRING_HEADER_LEN..STRING_HEADER_LEN + used];
    String::from_utf8_lossy(payload).trim().to_string()
}

/// Writes values into a zeroed buffer laid out by a [`FrameSpec`]
#[derive(Debug)]
pub struct FrameWriter<'a> {
    spec: &'a FrameSpec,
    buffer: BytesMut,
}

impl<'a> FrameWriter<'a> {
    pub fn new(spec: &'a FrameSpec) -> Self {
        Self {
            spec,
            buffer: BytesMut::zeroed(spec.length()),
        }
    }

    /// Write a value into the named field
    pub fn put(&mut self, name: &str, value: FieldValue) -> Result<&mut Self, EncodeError> {
        let field = self
            .spec
            .field(name)
            .ok_or_else(|| EncodeError::UnknownField(name.to_string()))?;
        let index = field.offset() - self.spec.start();
        let mismatch = |expected| EncodeError::TypeMismatch {
            field: name.to_string(),
            expected,
        };

        match (field.data_type(), value) {
            (DataType::Int16, FieldValue::Int16(v)) => {
                self.buffer[index..index + 2].copy_from_slice(&v.to_be_bytes());
            }
            (DataType::Byte, FieldValue::Byte(v)) => {
                self.buffer[index] = v;
            }
            (DataType::Bool { bit_index }, FieldValue::Bool(v)) => {
                if v {
                    self.buffer[index] |= 1 << bit_index;
                } else {
                    self.buffer[index] &= !(1 << bit_index);
                }
            }
            (DataType::Float, FieldValue::Float(v)) => {
                self.buffer[index..index + 4].copy_from_slice(&v.to_be_bytes());
            }
            (DataType::Double, FieldValue::Double(v)) => {
                self.buffer[index..index + 8].copy_from_slice(&v.to_be_bytes());
            }
            (DataType::String { max_len }, FieldValue::Text(v)) => {
                let raw = v.as_bytes();
                if raw.len() > max_len {
                    return Err(EncodeError::StringTooLong {
                        field: name.to_string(),
                        len: raw.len(),
                        max_len,
                    });
                }
                // max_len is bounded by the schema to fit the header bytes
                self.buffer[index] = max_len as u8;
                self.buffer[index + 1] = raw.len() as u8;
                let payload = index + STRING_HEADER_LEN;
                self.buffer[payload..payload + max_len].fill(0);
                self.buffer[payload..payload + raw.len()].copy_from_slice(raw);
            }
            (DataType::Int16, _) => return Err(mismatch("INT16")),
            (DataType::Byte, _) => return Err(mismatch("BYTE")),
            (DataType::Bool { .. }, _) => return Err(mismatch("BOOL")),
            (DataType::Float, _) => return Err(mismatch("FLOAT")),
            (DataType::Double, _) => return Err(mismatch("DOUBLE")),
            (DataType::String { .. }, _) => return Err(mismatch("STRING")),
        }

        Ok(self)
    }

    /// Take the encoded frame
    pub fn finish(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::layouts;
    use crate::snapshot::AckSnapshot;

    fn put_string(buf: &mut [u8], offset: usize, capacity: u8, text: &str) {
        buf[offset] = capacity;
        buf[offset + 1] = text.len() as u8;
        buf[offset + 2..offset + 2 + text.len()].copy_from_slice(text.as_bytes());
    }

    fn ack_buffer(trigger: i16, command: &str, token: &str) -> Vec<u8> {
        let mut buf = vec![0u8; layouts::STATUS_FRAME_LEN];
        buf[0..2].copy_from_slice(&trigger.to_be_bytes());
        put_string(&mut buf, 2, 100, command);
        put_string(&mut buf, 208, 40, token);
        buf
    }

    #[test]
    fn test_decode_reference_ack_frame() {
        let spec = layouts::ack_frame(1).unwrap();
        let mut buf = ack_buffer(1, "start_cycle", "abc");
        buf[104..106].copy_from_slice(&(-3i16).to_be_bytes());
        put_string(&mut buf, 106, 100, "  door open ");
        buf[250..252].copy_from_slice(&42i16.to_be_bytes());

        let ack: AckSnapshot = decode(&buf, &spec).expect("decode failed");
        assert_eq!(ack.trigger, 1);
        assert_eq!(ack.command, "start_cycle");
        assert_eq!(ack.token, "abc");
        assert_eq!(ack.error, -3);
        assert_eq!(ack.message, "door open");
        assert_eq!(ack.mission_id, 42);
    }

    #[test]
    fn test_string_used_length_is_clamped() {
        let spec = FrameSpec::fitted(
            1,
            0,
            vec![
                FieldSpec::string("name", 0, 4).unwrap(),
                FieldSpec::byte("after", 6).unwrap(),
            ],
        )
        .unwrap();
        // device claims 200 used bytes in a 4-byte field
        let buf = [4u8, 200, b'a', b'b', b'c', b'd', b'X'];

        let frame = decode_frame(&buf, &spec).unwrap();
        assert_eq!(frame.text("name").unwrap(), "abcd");
        assert_eq!(frame.int("after").unwrap(), i32::from(b'X'));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let spec = FrameSpec::fitted(1, 0, vec![FieldSpec::string("s", 0, 3).unwrap()]).unwrap();
        let buf = [3u8, 3, b'o', 0xFF, b'k'];
        let frame = decode_frame(&buf, &spec).unwrap();
        assert_eq!(frame.text("s").unwrap(), "o\u{FFFD}k");
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let spec = layouts::ack_frame(1).unwrap();
        let short = vec![0u8; layouts::STATUS_FRAME_LEN - 1];
        assert_eq!(
            decode_frame(&short, &spec).unwrap_err(),
            DecodeError::LengthMismatch {
                expected: 252,
                actual: 251
            }
        );
        let long = vec![0u8; layouts::STATUS_FRAME_LEN + 1];
        assert!(matches!(
            decode_frame(&long, &spec),
            Err(DecodeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_field_past_buffer_is_out_of_bounds() {
        let field = FieldSpec::double("d", 0).unwrap();
        let err = decode_field(&[0u8; 6], &field, 0).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfBounds { end: 8, available: 6, .. }));
    }

    #[test]
    fn test_scalar_decoding() {
        let spec = FrameSpec::fitted(
            1,
            10,
            vec![
                FieldSpec::bool("flag", 10, 2).unwrap(),
                FieldSpec::float("f", 11).unwrap(),
                FieldSpec::double("d", 15).unwrap(),
                FieldSpec::byte("b", 23).unwrap(),
            ],
        )
        .unwrap();
        let mut buf = vec![0b0000_0100u8];
        buf.extend_from_slice(&1.5f32.to_be_bytes());
        buf.extend_from_slice(&(-2.25f64).to_be_bytes());
        buf.push(250);

        let frame = decode_frame(&buf, &spec).unwrap();
        assert_eq!(frame.get("flag"), Some(&FieldValue::Bool(true)));
        assert_eq!(frame.get("f"), Some(&FieldValue::Float(1.5)));
        assert_eq!(frame.get("d"), Some(&FieldValue::Double(-2.25)));
        assert_eq!(frame.int("b").unwrap(), 250);
        assert!(matches!(frame.text("b"), Err(DecodeError::FieldType { .. })));
    }

    #[test]
    fn test_writer_output_decodes() {
        let spec = layouts::control_frame(2).unwrap();
        let mut writer = FrameWriter::new(&spec);
        writer
            .put("trigger", FieldValue::Int16(1))
            .unwrap()
            .put("command", FieldValue::Text("start_homing".into()))
            .unwrap()
            .put("token", FieldValue::Text("cmd-9".into()))
            .unwrap();
        let bytes = writer.finish();

        assert_eq!(bytes.len(), layouts::CONTROL_FRAME_LEN);
        assert_eq!(&bytes[2..4], &[100, 12]);
        let frame = decode_frame(&bytes, &spec).unwrap();
        assert_eq!(frame.int("trigger").unwrap(), 1);
        assert_eq!(frame.text("command").unwrap(), "start_homing");
        assert_eq!(frame.text("token").unwrap(), "cmd-9");
        assert_eq!(frame.int("mission_id").unwrap(), 0);
    }

    #[test]
    fn test_writer_rejects_bad_values() {
        let spec = layouts::control_frame(2).unwrap();
        let mut writer = FrameWriter::new(&spec);
        assert!(matches!(
            writer.put("token", FieldValue::Text("x".repeat(41))),
            Err(EncodeError::StringTooLong { len: 41, max_len: 40, .. })
        ));
        assert!(matches!(
            writer.put("trigger", FieldValue::Text("1".into())),
            Err(EncodeError::TypeMismatch { expected: "INT16", .. })
        ));
        assert!(matches!(
            writer.put("nope", FieldValue::Byte(1)),
            Err(EncodeError::UnknownField(_))
        ));
    }
}
