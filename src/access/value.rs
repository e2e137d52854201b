use crate::error::{DbError, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Ordering;
use std::fmt;
use std::io::{Read, Write};

/// Maximum number of payload bytes stored for a `Varchar` field.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed on-disk width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Varchar,
}

impl DataType {
    /// Number of bytes a field of this type occupies inside a tuple slot.
    pub fn size(&self) -> usize {
        match self {
            DataType::Int32 => 4,
            // length prefix + padded payload
            DataType::Varchar => 4 + STRING_LEN,
        }
    }

    /// Reads one field of this type from `reader`.
    pub fn parse<R: Read>(&self, reader: &mut R) -> Result<Value> {
        match self {
            DataType::Int32 => Ok(Value::Int32(reader.read_i32::<BigEndian>()?)),
            DataType::Varchar => {
                let len = reader.read_u32::<BigEndian>()? as usize;
                let mut payload = [0u8; STRING_LEN];
                reader.read_exact(&mut payload)?;
                let len = len.min(STRING_LEN);
                let s = String::from_utf8_lossy(&payload[..len]).into_owned();
                Ok(Value::String(s))
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "int"),
            DataType::Varchar => write!(f, "string"),
        }
    }
}

/// Values that can be stored in a tuple field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int32(i32),
    String(String),
}

impl Value {
    /// Get the data type of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::String(_) => DataType::Varchar,
        }
    }

    /// Writes the fixed-width encoding of this value.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Value::Int32(i) => writer.write_i32::<BigEndian>(*i)?,
            Value::String(s) => {
                let bytes = truncate_utf8(s, STRING_LEN);
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
                writer.write_all(&[0u8; STRING_LEN][..STRING_LEN - bytes.len()])?;
            }
        }
        Ok(())
    }

    /// Compares two values of the same type; values of different types are unordered.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int32(a), Value::Int32(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::Int32(i) => Ok(*i),
            other => Err(DbError::TupleSchemaMismatch {
                expected: DataType::Int32.to_string(),
                found: other.data_type().to_string(),
            }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{}", s),
        }
    }
}

fn truncate_utf8(s: &str, max: usize) -> &[u8] {
    if s.len() <= max {
        return s.as_bytes();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s.as_bytes()[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_data_type_len() {
        assert_eq!(DataType::Int32.size(), 4);
        assert_eq!(DataType::Varchar.size(), 132);
    }

    #[test]
    fn test_int_encoding_is_big_endian() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        Value::Int32(0x01020304).serialize(&mut buf)?;
        assert_eq!(buf, vec![1, 2, 3, 4]);

        let parsed = DataType::Int32.parse(&mut Cursor::new(&buf))?;
        assert_eq!(parsed, Value::Int32(0x01020304));
        Ok(())
    }

    #[test]
    fn test_string_is_padded() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        Value::String("abc".to_string()).serialize(&mut buf)?;
        assert_eq!(buf.len(), DataType::Varchar.size());
        assert_eq!(&buf[..4], &[0, 0, 0, 3]);
        assert!(buf[7..].iter().all(|&b| b == 0));

        let parsed = DataType::Varchar.parse(&mut Cursor::new(&buf))?;
        assert_eq!(parsed, Value::String("abc".to_string()));
        Ok(())
    }

    #[test]
    fn test_long_string_truncated_on_char_boundary() -> anyhow::Result<()> {
        // 127 ASCII bytes followed by a two byte character
        let s = format!("{}é", "a".repeat(127));
        let mut buf = Vec::new();
        Value::String(s).serialize(&mut buf)?;
        assert_eq!(buf.len(), DataType::Varchar.size());

        let parsed = DataType::Varchar.parse(&mut Cursor::new(&buf))?;
        assert_eq!(parsed, Value::String("a".repeat(127)));
        Ok(())
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::Int32(1).compare(&Value::Int32(2)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::String("b".into()).compare(&Value::String("a".into())),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Int32(1).compare(&Value::String("1".into())), None);
    }

    #[test]
    fn test_short_read_fails() {
        let result = DataType::Int32.parse(&mut Cursor::new(vec![1u8, 2]));
        assert!(matches!(result, Err(DbError::Io(_))));
    }
}
