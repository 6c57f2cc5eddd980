use super::Error;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Result;

/// Utility trait for serializing data inside trace files
///
/// Trace files have a few conventions that make it useful to define an extra trait (instead of
/// just using `serde`):
///
///   - tags are always `u8`
///   - when serializing a sequence, the length of the sequence is `u32`
///   - strings are `u16` length prefixed UTF-8
///   - the bulky integer sequences are LEB128 encoded (see [`write_sequence`])
///
pub trait Serialize: Sized {
    /// Serialize construct into a binary output stream
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()>;
}

/// Inverse of [`Serialize`]
pub trait Deserialize: Sized {
    /// Deserialize construct from a binary input stream
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error>;
}

macro_rules! primitive {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Serialize for $ty {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                writer.$write::<BigEndian>(*self)
            }
        }

        impl Deserialize for $ty {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
                Ok(reader.$read::<BigEndian>()?)
            }
        }
    };
}

primitive!(u16, write_u16, read_u16);
primitive!(u32, write_u32, read_u32);
primitive!(u64, write_u64, read_u64);
primitive!(i16, write_i16, read_i16);
primitive!(i64, write_i64, read_i64);

impl Serialize for u8 {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self)
    }
}

impl Deserialize for u8 {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        Ok(reader.read_u8()?)
    }
}

impl Serialize for bool {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(*self as u8)
    }
}

impl Deserialize for bool {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            tag => Err(Error::InvalidTag { what: "boolean", tag }),
        }
    }
}

/// Length in `u16` is the first thing serialized/deserialized
impl Serialize for String {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        let len = u16::try_from(self.len()).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "string is too long")
        })?;
        len.serialize(writer)?;
        writer.write_all(self.as_bytes())
    }
}

impl Deserialize for String {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u16::deserialize(reader)?;
        let mut bytes = vec![0; len as usize];
        reader.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|err| {
            Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
        })
    }
}

/// Absent values are a `0` tag, present values are a `1` tag followed by the value
impl<A: Serialize> Serialize for Option<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        match self {
            None => writer.write_u8(0),
            Some(value) => {
                writer.write_u8(1)?;
                value.serialize(writer)
            }
        }
    }
}

impl<A: Deserialize> Deserialize for Option<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(A::deserialize(reader)?)),
            tag => Err(Error::InvalidTag { what: "option", tag }),
        }
    }
}

/// Size in `u32` is the first thing serialized/deserialized
impl<A: Serialize> Serialize for Vec<A> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        (self.len() as u32).serialize(writer)?;
        for elem in self {
            elem.serialize(writer)?;
        }
        Ok(())
    }
}

impl<A: Deserialize> Deserialize for Vec<A> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Self, Error> {
        let len = u32::deserialize(reader)?;
        // Don't trust the length for preallocation: corrupted files would allocate gigabytes
        let mut elems = Vec::with_capacity((len as usize).min(1 << 12));
        for _ in 0..len {
            elems.push(A::deserialize(reader)?);
        }
        Ok(elems)
    }
}

/// Write an unsigned LEB128 integer
pub fn write_uleb128<W: WriteBytesExt>(writer: &mut W, mut value: u64) -> Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        writer.write_u8(byte)?;
        if value == 0 {
            return Ok(());
        }
    }
}

/// Read an unsigned LEB128 integer
pub fn read_uleb128<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<u64, Error> {
    let mut value: u64 = 0;
    for i in 0..10 {
        let byte = reader.read_u8()?;
        let payload = byte & 0x7f;
        if i == 9 && payload > 1 {
            return Err(Error::InvalidVarint);
        }
        value |= u64::from(payload) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(Error::InvalidVarint)
}

pub fn zigzag_encode(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

pub fn zigzag_decode(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

/// Write a sequence of signed integers: `u64` count followed by zig-zag LEB128 values
///
/// Instruction indices and small object identifiers then mostly take one or two bytes.
pub fn write_sequence<W: WriteBytesExt>(
    writer: &mut W,
    values: impl ExactSizeIterator<Item = i64>,
) -> Result<()> {
    (values.len() as u64).serialize(writer)?;
    for value in values {
        write_uleb128(writer, zigzag_encode(value))?;
    }
    Ok(())
}

/// Read a sequence written with [`write_sequence`]
pub fn read_sequence<R: ReadBytesExt>(reader: &mut R) -> std::result::Result<Vec<i64>, Error> {
    let len = u64::deserialize(reader)?;
    let mut values = Vec::with_capacity((len as usize).min(1 << 16));
    for _ in 0..len {
        values.push(zigzag_decode(read_uleb128(reader)?));
    }
    Ok(values)
}
