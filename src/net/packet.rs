use std::fmt;

/// Packet header size on the wire: 2 bytes opcode, 2 bytes payload length.
pub const HEADER_SIZE: usize = 4;

/// Hard cap on payload size; anything above this is a protocol violation.
pub const MAX_PACKET_SIZE: usize = 1024;

/// Error returned when a read would run past the end of the payload.
/// Carries the cursor position before the attempt and the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadError {
    pub pos: usize,
    pub want: usize,
}

impl fmt::Display for ReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read of {} bytes at offset {} out of range", self.want, self.pos)
    }
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        if self.remaining() < len {
            return Err(ReadError { pos: self.pos, want: len });
        }
        let start = self.pos;
        self.pos += len;
        Ok(&self.data[start..start + len])
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ReadError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Result<i16, ReadError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> Result<i32, ReadError> {
        Ok(self.read_u32()? as i32)
    }

    /// Floats travel as their raw IEEE-754 bit pattern swapped to network
    /// byte order, never as a numeric conversion.
    pub fn read_f32(&mut self) -> Result<f32, ReadError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Reads a NUL-terminated UTF-8 string. Missing terminator is an error
    /// reporting the whole remainder as the attempted size.
    pub fn read_string(&mut self) -> Result<String, ReadError> {
        if self.remaining() == 0 {
            return Err(ReadError { pos: self.pos, want: 1 });
        }
        let rest = &self.data[self.pos..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(ReadError { pos: self.pos, want: rest.len() + 1 });
        };
        let bytes = &rest[..nul];
        self.pos += nul + 1;
        Ok(String::from_utf8_lossy(bytes).to_string())
    }
}

/// Append-only packet builder with a write cursor and support for patching
/// previously reserved positions (used for array count headers).
#[derive(Debug, Clone)]
pub struct PacketWriter {
    opcode: u16,
    data: Vec<u8>,
}

impl PacketWriter {
    pub fn new(opcode: u16) -> Self {
        Self { opcode, data: Vec::new() }
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    /// Writes the string bytes followed by a NUL terminator.
    pub fn write_string(&mut self, value: &str) {
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
    }

    /// Writes a placeholder u32 and returns its offset for a later patch.
    pub fn reserve_u32(&mut self) -> usize {
        let pos = self.data.len();
        self.write_u32(0);
        pos
    }

    pub fn write_u32_at(&mut self, value: u32, pos: usize) {
        if pos + 4 <= self.data.len() {
            self.data[pos..pos + 4].copy_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_u16_at(&mut self, value: u16, pos: usize) {
        if pos + 2 <= self.data.len() {
            self.data[pos..pos + 2].copy_from_slice(&value.to_be_bytes());
        }
    }

    pub fn write_u8_at(&mut self, value: u8, pos: usize) {
        if pos < self.data.len() {
            self.data[pos] = value;
        }
    }

    /// Prepends the 4-byte header and yields the full wire frame.
    pub fn frame(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.data.len());
        out.extend_from_slice(&self.opcode.to_be_bytes());
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}
