//! Typed, position-tracking byte reader over a class-file stream.
use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::error::{ErrorContext, TranslationError};

/// A wrapping reader over an in-memory class-file byte stream.
///
/// The whole file is buffered up front (as the teacher's `jvm.rs`
/// already does via `Cursor`) so later stages -- in particular the
/// trusted-attribute digest -- can re-derive a canonicalized view of
/// bytes already consumed.
pub struct ClassFileReader<'a> {
    cursor: Cursor<&'a [u8]>,
    path: Option<String>,
}

impl<'a> ClassFileReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { cursor: Cursor::new(bytes), path: None }
    }

    #[must_use]
    pub fn with_path(bytes: &'a [u8], path: impl Into<String>) -> Self {
        Self { cursor: Cursor::new(bytes), path: Some(path.into()) }
    }

    /// Offset of the next unread byte.
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.cursor.position() as usize
    }

    fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new().with_offset(self.current_offset());
        if let Some(path) = &self.path {
            ctx = ctx.with_class(path.clone());
        }
        ctx
    }

    fn format_err(&self, message: impl Into<String>) -> TranslationError {
        TranslationError::class_format(message, self.context())
    }

    pub fn read_u1(&mut self) -> crate::error::Result<u8> {
        self.cursor.read_u8().map_err(|_| self.format_err("unexpected end of stream reading u1"))
    }

    pub fn read_u2(&mut self) -> crate::error::Result<u16> {
        self.cursor
            .read_u16::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading u2"))
    }

    pub fn read_u4(&mut self) -> crate::error::Result<u32> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading u4"))
    }

    pub fn read_i1(&mut self) -> crate::error::Result<i8> {
        self.cursor.read_i8().map_err(|_| self.format_err("unexpected end of stream reading i1"))
    }

    pub fn read_i2(&mut self) -> crate::error::Result<i16> {
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading i2"))
    }

    pub fn read_i4(&mut self) -> crate::error::Result<i32> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading i4"))
    }

    pub fn read_i8(&mut self) -> crate::error::Result<i64> {
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading i8"))
    }

    pub fn read_float(&mut self) -> crate::error::Result<f32> {
        self.cursor
            .read_f32::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading float"))
    }

    pub fn read_double(&mut self) -> crate::error::Result<f64> {
        self.cursor
            .read_f64::<BigEndian>()
            .map_err(|_| self.format_err("unexpected end of stream reading double"))
    }

    pub fn read_fully(&mut self, n: usize) -> crate::error::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.cursor.read_exact(&mut buf).map_err(|_| self.format_err(format!("unexpected end of stream reading {n} bytes")))?;
        Ok(buf)
    }

    pub fn skip(&mut self, n: usize) -> crate::error::Result<()> {
        self.read_fully(n).map(|_| ())
    }

    /// Reads a JVM "modified UTF-8" string: ordinary UTF-8 except NUL
    /// is encoded as the two bytes `0xC0 0x80` and characters outside
    /// the BMP are encoded as a CESU-8-style surrogate pair, each
    /// surrogate itself encoded as a three-byte sequence (six bytes
    /// total instead of the four a standard UTF-8 encoder would use).
    pub fn read_utf_modified(&mut self) -> crate::error::Result<String> {
        let length = self.read_u2()? as usize;
        let bytes = self.read_fully(length)?;
        decode_modified_utf8(&bytes).map_err(|message| self.format_err(message))
    }

    /// Asserts that every byte of the stream has been consumed.
    pub fn assert_eof(&mut self) -> crate::error::Result<()> {
        let mut probe = [0u8; 1];
        match self.cursor.read(&mut probe) {
            Ok(0) => Ok(()),
            Ok(_) => Err(self.format_err("trailing bytes after expected end of class file")),
            Err(_) => Ok(()),
        }
    }
}

/// Decodes a JVM "modified UTF-8" byte sequence into a [`String`].
fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 == 0 {
            return Err("embedded raw NUL in modified UTF-8".to_string());
        }
        if b0 & 0x80 == 0 {
            out.push(b0 as char);
            i += 1;
            continue;
        }
        if b0 & 0xE0 == 0xC0 {
            let b1 = *bytes.get(i + 1).ok_or("truncated 2-byte modified UTF-8 sequence")?;
            let cp = (u32::from(b0 & 0x1F) << 6) | u32::from(b1 & 0x3F);
            out.push(char::from_u32(cp).ok_or("invalid codepoint in modified UTF-8")?);
            i += 2;
            continue;
        }
        if b0 & 0xF0 == 0xE0 {
            let b1 = *bytes.get(i + 1).ok_or("truncated 3-byte modified UTF-8 sequence")?;
            let b2 = *bytes.get(i + 2).ok_or("truncated 3-byte modified UTF-8 sequence")?;
            // Six-byte surrogate-pair encoding: two adjacent 3-byte
            // sequences whose codepoints fall in the surrogate range.
            if (0xD8..=0xDB).contains(&((u32::from(b0 & 0x0F) << 4) | (u32::from(b1 & 0x3F) >> 2)))
                && bytes.get(i + 3) == Some(&0xED)
            {
                let b4 = *bytes.get(i + 4).ok_or("truncated surrogate pair")?;
                let b5 = *bytes.get(i + 5).ok_or("truncated surrogate pair")?;
                let high = 0xD800
                    + (((u32::from(b0 & 0x0F) << 4) | (u32::from(b1 & 0x3F) >> 2)) - 0xD8) * 0x40
                    + ((u32::from(b1 & 0x3F) << 6) | u32::from(b2 & 0x3F)) % 0x40;
                let low = 0xDC00
                    + (((u32::from(0xEDu8 & 0x0F) << 4) | (u32::from(b4 & 0x3F) >> 2)) - 0xDC) * 0x40
                    + ((u32::from(b4 & 0x3F) << 6) | u32::from(b5 & 0x3F)) % 0x40;
                let cp = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                out.push(char::from_u32(cp).ok_or("invalid surrogate pair in modified UTF-8")?);
                i += 6;
                continue;
            }
            let cp = (u32::from(b0 & 0x0F) << 12) | (u32::from(b1 & 0x3F) << 6) | u32::from(b2 & 0x3F);
            out.push(char::from_u32(cp).ok_or("invalid codepoint in modified UTF-8")?);
            i += 3;
            continue;
        }
        return Err(format!("unsupported modified UTF-8 lead byte 0x{b0:02x}"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_scalar_fields_in_order() {
        let bytes = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x3C];
        let mut reader = ClassFileReader::new(&bytes);
        assert_eq!(reader.read_u4().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.read_u2().unwrap(), 0);
        assert_eq!(reader.read_u2().unwrap(), 0x3C);
        assert_eq!(reader.current_offset(), 8);
        reader.assert_eof().unwrap();
    }

    #[test]
    fn reports_offset_on_short_read() {
        let bytes = [0x00];
        let mut reader = ClassFileReader::new(&bytes);
        let err = reader.read_u4().unwrap_err();
        match err {
            TranslationError::ClassFormat { context, .. } => assert_eq!(context.offset, Some(0)),
            other => panic!("expected ClassFormat, got {other:?}"),
        }
    }

    #[test]
    fn decodes_plain_ascii_modified_utf8() {
        let mut bytes = vec![0x00, 0x05];
        bytes.extend_from_slice(b"hello");
        let mut reader = ClassFileReader::new(&bytes);
        assert_eq!(reader.read_utf_modified().unwrap(), "hello");
    }

    #[test]
    fn decodes_two_byte_nul_encoding() {
        let bytes = [0x00, 0x02, 0xC0, 0x80];
        let mut reader = ClassFileReader::new(&bytes);
        assert_eq!(reader.read_utf_modified().unwrap(), "\u{0}");
    }

    #[test]
    fn assert_eof_fails_on_trailing_bytes() {
        let bytes = [1, 2, 3];
        let mut reader = ClassFileReader::new(&bytes);
        reader.read_u1().unwrap();
        assert!(reader.assert_eof().is_err());
    }
}
