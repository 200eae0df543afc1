//! Primitive field encodings used by Bedrock packets.
//!
//! Bedrock mixes conventions freely: var-ints (LEB128, with zig-zag for
//! signed values), little-endian fixed-width numbers for most fields, and
//! big-endian ones in a few older packets. [`ReadExt`] and [`WriteExt`]
//! add the shapes we need to [`Buf`] and [`BufMut`].

use bytes::{Buf, BufMut};

use crate::ProtocolError;

/// Reading helpers. Every method checks the remaining length first, so a
/// short buffer yields [`ProtocolError::Truncated`] instead of a panic.
pub trait ReadExt: Buf {
    fn need(&self, n: usize, what: &'static str) -> Result<(), ProtocolError> {
        if self.remaining() < n {
            Err(ProtocolError::Truncated(what))
        } else {
            Ok(())
        }
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        self.need(1, "bool")?;
        Ok(self.get_u8() != 0)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        self.need(1, "u8")?;
        Ok(self.get_u8())
    }

    fn read_u16_le(&mut self) -> Result<u16, ProtocolError> {
        self.need(2, "u16")?;
        Ok(self.get_u16_le())
    }

    fn read_i32_be(&mut self) -> Result<i32, ProtocolError> {
        self.need(4, "i32")?;
        Ok(self.get_i32())
    }

    fn read_i32_le(&mut self) -> Result<i32, ProtocolError> {
        self.need(4, "i32")?;
        Ok(self.get_i32_le())
    }

    fn read_u32_le(&mut self) -> Result<u32, ProtocolError> {
        self.need(4, "u32")?;
        Ok(self.get_u32_le())
    }

    fn read_u64_le(&mut self) -> Result<u64, ProtocolError> {
        self.need(8, "u64")?;
        Ok(self.get_u64_le())
    }

    fn read_f32_le(&mut self) -> Result<f32, ProtocolError> {
        self.need(4, "f32")?;
        Ok(self.get_f32_le())
    }

    fn read_var_u32(&mut self) -> Result<u32, ProtocolError> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            self.need(1, "var-int")?;
            let byte = self.get_u8();
            value |= u32::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    fn read_var_u64(&mut self) -> Result<u64, ProtocolError> {
        let mut value = 0u64;
        for shift in (0..70).step_by(7) {
            self.need(1, "var-long")?;
            let byte = self.get_u8();
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(ProtocolError::VarIntTooLong)
    }

    fn read_var_i32(&mut self) -> Result<i32, ProtocolError> {
        let raw = self.read_var_u32()?;
        Ok((raw >> 1) as i32 ^ -((raw & 1) as i32))
    }

    fn read_var_i64(&mut self) -> Result<i64, ProtocolError> {
        let raw = self.read_var_u64()?;
        Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
    }

    /// Var-int length followed by UTF-8 bytes.
    fn read_string(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_var_u32()? as usize;
        self.read_utf8(len)
    }

    /// Little-endian `u32` length followed by UTF-8 bytes, as used inside
    /// the login payload.
    fn read_long_string_le(&mut self) -> Result<String, ProtocolError> {
        let len = self.read_u32_le()? as usize;
        self.read_utf8(len)
    }

    fn read_utf8(&mut self, len: usize) -> Result<String, ProtocolError> {
        self.need(len, "string")?;
        let mut raw = vec![0u8; len];
        self.copy_to_slice(&mut raw);
        String::from_utf8(raw).map_err(|_| ProtocolError::InvalidString)
    }
}

impl<B: Buf + ?Sized> ReadExt for B {}

/// Writing counterparts of [`ReadExt`].
pub trait WriteExt: BufMut {
    fn write_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    fn write_var_u32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn write_var_u64(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.put_u8((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.put_u8(value as u8);
    }

    fn write_var_i32(&mut self, value: i32) {
        self.write_var_u32(((value << 1) ^ (value >> 31)) as u32);
    }

    fn write_var_i64(&mut self, value: i64) {
        self.write_var_u64(((value << 1) ^ (value >> 63)) as u64);
    }

    fn write_string(&mut self, value: &str) {
        self.write_var_u32(value.len() as u32);
        self.put_slice(value.as_bytes());
    }

    fn write_long_string_le(&mut self, value: &str) {
        self.put_u32_le(value.len() as u32);
        self.put_slice(value.as_bytes());
    }
}

impl<B: BufMut + ?Sized> WriteExt for B {}
