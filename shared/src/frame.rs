//! Frame Schema
//!
//! Static description of a binary frame inside a PLC data area:
//! ```text
//! area N: [ start .. start + length )
//!          field @ offset, type, (max_len | bit_index)
//! ```
//!
//! Schemas are validated once at construction and never mutated afterwards.
//! Any malformed layout is a [`SchemaError`] and must stop startup.

use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Largest string capacity representable in the capacity header byte
pub const MAX_STRING_LEN: usize = 254;

/// Bytes preceding string payload: declared capacity + used length
pub const STRING_HEADER_LEN: usize = 2;

/// Errors raised while building a schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("STRING field '{0}' needs max_len")]
    MissingMaxLen(String),

    #[error("STRING field '{name}' max_len {max_len} exceeds {MAX_STRING_LEN}")]
    MaxLenTooLarge { name: String, max_len: usize },

    #[error("BOOL field '{name}' needs bit_index in range 0..7 (got {bit_index:?})")]
    InvalidBitIndex { name: String, bit_index: Option<u8> },

    #[error("field '{name}' of type {data_type} cannot have {aux}")]
    UnexpectedAux {
        name: String,
        data_type: TypeTag,
        aux: &'static str,
    },

    #[error("duplicate field name in frame: '{0}'")]
    DuplicateField(String),

    #[error("field '{name}' offset {offset} < frame start {start}")]
    OffsetBeforeStart {
        name: String,
        offset: usize,
        start: usize,
    },

    #[error("frame length too small: {length} < required {required}")]
    LengthTooSmall { length: usize, required: usize },

    #[error("'{name}' at {offset} spanning {width} bytes overflows the address range")]
    AddressOverflow {
        name: String,
        offset: usize,
        width: usize,
    },
}

/// Raw type tag of a field, as written in a layout table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Int16,
    Byte,
    Bool,
    String,
    Float,
    Double,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TypeTag::Int16 => "INT16",
            TypeTag::Byte => "BYTE",
            TypeTag::Bool => "BOOL",
            TypeTag::String => "STRING",
            TypeTag::Float => "FLOAT",
            TypeTag::Double => "DOUBLE",
        };
        f.write_str(name)
    }
}

/// Validated field type together with its auxiliary data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Big-endian signed 16-bit integer
    Int16,
    /// Unsigned 8-bit integer
    Byte,
    /// Single bit of one byte, 0 = least significant
    Bool { bit_index: u8 },
    /// Capacity byte, used-length byte, then `max_len` payload bytes
    String { max_len: usize },
    /// IEEE-754 big-endian single precision
    Float,
    /// IEEE-754 big-endian double precision
    Double,
}

impl DataType {
    /// Number of bytes the field occupies on the wire
    pub fn width(&self) -> usize {
        match self {
            DataType::Int16 => 2,
            DataType::Byte => 1,
            DataType::Bool { .. } => 1,
            DataType::String { max_len } => max_len + STRING_HEADER_LEN,
            DataType::Float => 4,
            DataType::Double => 8,
        }
    }

    pub fn tag(&self) -> TypeTag {
        match self {
            DataType::Int16 => TypeTag::Int16,
            DataType::Byte => TypeTag::Byte,
            DataType::Bool { .. } => TypeTag::Bool,
            DataType::String { .. } => TypeTag::String,
            DataType::Float => TypeTag::Float,
            DataType::Double => TypeTag::Double,
        }
    }
}

/// One named field of a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    offset: usize,
    data_type: DataType,
}

impl FieldSpec {
    /// Build a field from a raw layout row, validating the auxiliary data
    ///
    /// STRING requires `max_len` and forbids `bit_index`; BOOL requires a
    /// `bit_index` in 0..=7 and forbids `max_len`; every other type forbids both.
    pub fn new(
        name: impl Into<String>,
        offset: usize,
        tag: TypeTag,
        max_len: Option<usize>,
        bit_index: Option<u8>,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let unexpected = |aux| SchemaError::UnexpectedAux {
            name: name.clone(),
            data_type: tag,
            aux,
        };
        let scalar = |data_type| {
            if max_len.is_some() {
                return Err(unexpected("max_len"));
            }
            if bit_index.is_some() {
                return Err(unexpected("bit_index"));
            }
            Ok(data_type)
        };

        let data_type = match tag {
            TypeTag::String => {
                if bit_index.is_some() {
                    return Err(unexpected("bit_index"));
                }
                let max_len = max_len.ok_or_else(|| SchemaError::MissingMaxLen(name.clone()))?;
                if max_len > MAX_STRING_LEN {
                    return Err(SchemaError::MaxLenTooLarge { name, max_len });
                }
                DataType::String { max_len }
            }
            TypeTag::Bool => {
                if max_len.is_some() {
                    return Err(unexpected("max_len"));
                }
                match bit_index {
                    Some(bit_index) if bit_index <= 7 => DataType::Bool { bit_index },
                    _ => return Err(SchemaError::InvalidBitIndex { name, bit_index }),
                }
            }
            TypeTag::Int16 => scalar(DataType::Int16)?,
            TypeTag::Byte => scalar(DataType::Byte)?,
            TypeTag::Float => scalar(DataType::Float)?,
            TypeTag::Double => scalar(DataType::Double)?,
        };

        if offset.checked_add(data_type.width()).is_none() {
            return Err(SchemaError::AddressOverflow {
                name,
                offset,
                width: data_type.width(),
            });
        }

        Ok(Self {
            name,
            offset,
            data_type,
        })
    }

    pub fn int16(name: impl Into<String>, offset: usize) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::Int16, None, None)
    }

    pub fn byte(name: impl Into<String>, offset: usize) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::Byte, None, None)
    }

    pub fn bool(name: impl Into<String>, offset: usize, bit_index: u8) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::Bool, None, Some(bit_index))
    }

    pub fn string(
        name: impl Into<String>,
        offset: usize,
        max_len: usize,
    ) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::String, Some(max_len), None)
    }

    pub fn float(name: impl Into<String>, offset: usize) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::Float, None, None)
    }

    pub fn double(name: impl Into<String>, offset: usize) -> Result<Self, SchemaError> {
        Self::new(name, offset, TypeTag::Double, None, None)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// First byte after the field
    pub fn end_offset(&self) -> usize {
        self.offset + self.data_type.width()
    }
}

/// Validated layout of one frame in a PLC data area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    area: u16,
    start: usize,
    length: usize,
    fields: Vec<FieldSpec>,
}

impl FrameSpec {
    /// Build a frame, enforcing unique names, offsets at or after `start`
    /// and a declared `length` that covers the furthest field end
    pub fn new(
        area: u16,
        start: usize,
        length: usize,
        fields: Vec<FieldSpec>,
    ) -> Result<Self, SchemaError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name()) {
                return Err(SchemaError::DuplicateField(field.name().to_string()));
            }
        }

        for field in &fields {
            if field.offset() < start {
                return Err(SchemaError::OffsetBeforeStart {
                    name: field.name().to_string(),
                    offset: field.offset(),
                    start,
                });
            }
        }

        if start.checked_add(length).is_none() {
            return Err(SchemaError::AddressOverflow {
                name: "frame".to_string(),
                offset: start,
                width: length,
            });
        }

        let required = required_length(start, &fields);
        if length < required {
            return Err(SchemaError::LengthTooSmall { length, required });
        }

        Ok(Self {
            area,
            start,
            length,
            fields,
        })
    }

    /// Build a frame whose length is exactly the span its fields require
    pub fn fitted(area: u16, start: usize, fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        let length = required_length(start, &fields);
        Self::new(area, start, length, fields)
    }

    pub fn area(&self) -> u16 {
        self.area
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// One past the last byte of the frame
    pub fn end(&self) -> usize {
        self.start + self.length
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name() == name)
    }
}

fn required_length(start: usize, fields: &[FieldSpec]) -> usize {
    fields
        .iter()
        .map(FieldSpec::end_offset)
        .max()
        .map(|end| end.saturating_sub(start))
        .unwrap_or(0)
}

/// Reference layouts of the hub's handshake frames
pub mod layouts {
    use super::{FieldSpec, FrameSpec, SchemaError};

    /// Length of the acknowledgement and execution frames
    pub const STATUS_FRAME_LEN: usize = 252;

    /// Length of the control frame written on dispatch
    pub const CONTROL_FRAME_LEN: usize = 148;

    /// Fields shared by the acknowledgement and execution frames
    pub fn status_fields() -> Result<Vec<FieldSpec>, SchemaError> {
        Ok(vec![
            FieldSpec::int16("trigger", 0)?,
            FieldSpec::string("command", 2, 100)?,
            FieldSpec::int16("error", 104)?,
            FieldSpec::string("message", 106, 100)?,
            FieldSpec::string("token", 208, 40)?,
            FieldSpec::int16("mission_id", 250)?,
        ])
    }

    /// Acknowledgement frame written by the actuator after a dispatch
    pub fn ack_frame(area: u16) -> Result<FrameSpec, SchemaError> {
        FrameSpec::fitted(area, 0, status_fields()?)
    }

    /// Execution frame written by the actuator when a command has run
    pub fn exec_frame(area: u16) -> Result<FrameSpec, SchemaError> {
        FrameSpec::fitted(area, 0, status_fields()?)
    }

    /// Control frame the bridge writes to hand a command to the actuator
    pub fn control_frame(area: u16) -> Result<FrameSpec, SchemaError> {
        FrameSpec::fitted(
            area,
            0,
            vec![
                FieldSpec::int16("trigger", 0)?,
                FieldSpec::string("command", 2, 100)?,
                FieldSpec::string("token", 104, 40)?,
                FieldSpec::int16("mission_id", 146)?,
            ],
        )
    }
}
