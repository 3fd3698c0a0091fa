//! Serializer Module
//!
//! Pluggable encode/decode of keys and values for snapshot files.

use std::io::{self, Read, Write};

// == Serializer ==
/// Encodes one value of type `T` to a byte stream and reads it back.
///
/// Keys and values get separate serializers, so the snapshot code is generic
/// over the cache's types without inspecting them.
pub trait Serializer<T>: Send + Sync {
    /// Writes `value` to `out`.
    fn serialize(&self, value: &T, out: &mut dyn Write) -> io::Result<()>;

    /// Reads one value from `input`.
    fn deserialize(&self, input: &mut dyn Read) -> io::Result<T>;
}

// == String Serializer ==
/// Strings as a big-endian `u16` byte length followed by modified UTF-8.
///
/// This is the encoding of Java's `DataOutput.writeUTF`: NUL is written as
/// `C0 80` and characters outside the BMP as two 3-byte surrogates. Encoded
/// strings longer than 65535 bytes are rejected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String, out: &mut dyn Write) -> io::Result<()> {
        let encoded = encode_modified_utf8(value);
        let len = u16::try_from(encoded.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("encoded string too long: {} bytes", encoded.len()),
            )
        })?;
        out.write_all(&len.to_be_bytes())?;
        out.write_all(&encoded)
    }

    fn deserialize(&self, input: &mut dyn Read) -> io::Result<String> {
        let mut len = [0u8; 2];
        input.read_exact(&mut len)?;
        let mut bytes = vec![0u8; usize::from(u16::from_be_bytes(len))];
        input.read_exact(&mut bytes)?;
        decode_modified_utf8(&bytes)
    }
}

// == U64 Serializer ==
/// Unsigned integers as 8 big-endian bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct U64Serializer;

impl Serializer<u64> for U64Serializer {
    fn serialize(&self, value: &u64, out: &mut dyn Write) -> io::Result<()> {
        out.write_all(&value.to_be_bytes())
    }

    fn deserialize(&self, input: &mut dyn Read) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        input.read_exact(&mut buf)?;
        Ok(u64::from_be_bytes(buf))
    }
}

fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out
}

fn decode_modified_utf8(bytes: &[u8]) -> io::Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        let (unit, width) = match b >> 4 {
            0..=7 => (u16::from(b), 1),
            12 | 13 => {
                let b2 = continuation(bytes, i + 1)?;
                ((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F), 2)
            }
            14 => {
                let b2 = continuation(bytes, i + 1)?;
                let b3 = continuation(bytes, i + 2)?;
                (
                    (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
                    3,
                )
            }
            _ => return Err(malformed(i)),
        };
        units.push(unit);
        i += width;
    }
    String::from_utf16(&units)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

fn continuation(bytes: &[u8], at: usize) -> io::Result<u8> {
    match bytes.get(at) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b),
        _ => Err(malformed(at)),
    }
}

fn malformed(at: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed modified UTF-8 around byte {at}"),
    )
}
