//! Bounds-checked little-endian cursors over byte buffers. Every read and
//! write goes through an explicit field-by-field codec; in-memory layout is
//! never reinterpreted as file layout.

use glam::{vec2, vec3, Vec2, Vec3};

use crate::error::{PofError, Result};
use crate::math::BBox;

/// The target-engine format negates the X axis relative to the in-memory
/// convention. Self-inverse.
pub fn flip_x(v: Vec3) -> Vec3 {
    vec3(-v.x, v.y, v.z)
}

/// X negation for a bounding box: min/max X swap after the sign flip so the
/// box stays properly ordered. Self-inverse.
pub fn flip_bbox(b: BBox) -> BBox {
    BBox {
        min: vec3(-b.max.x, b.min.y, b.min.z),
        max: vec3(-b.min.x, b.max.y, b.max.z),
    }
}

fn underrun(what: &'static str, at: usize) -> PofError {
    PofError::Malformed { what, at }
}

/// Read cursor over a borrowed buffer.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.buf.len() {
            return Err(underrun("seek past end", pos));
        }
        self.pos = pos;
        Ok(())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.seek(self.pos + n)
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(underrun("unexpected end of data", self.pos));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_vec2(&mut self) -> Result<Vec2> {
        Ok(vec2(self.read_f32()?, self.read_f32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(vec3(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    pub fn read_bbox(&mut self) -> Result<BBox> {
        Ok(BBox::new(self.read_vec3()?, self.read_vec3()?))
    }

    /// Length-prefixed string: i32 byte count, raw bytes, no terminator.
    /// Trailing NULs some writers emit are stripped.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(underrun("negative string length", self.pos));
        }
        let bytes = self.read_bytes(len as usize)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec())
            .map_err(|_| underrun("string is not utf-8", self.pos))
    }
}

/// Growable write cursor, used by the chunk and native writers.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Writer::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_bytes(&v.to_le_bytes());
    }

    pub fn write_vec2(&mut self, v: Vec2) {
        self.write_f32(v.x);
        self.write_f32(v.y);
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    pub fn write_bbox(&mut self, b: BBox) {
        self.write_vec3(b.min);
        self.write_vec3(b.max);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_i32(s.len() as i32);
        self.write_bytes(s.as_bytes());
    }
}

/// Fixed-extent write cursor for the tree packers, which size their output
/// exactly before writing. Running past the end is an error, never a panic.
pub struct SliceWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> SliceWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        SliceWriter { buf, pos: 0 }
    }

    pub fn at(buf: &'a mut [u8], pos: usize) -> Self {
        SliceWriter { buf, pos }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buf.len() - self.pos < bytes.len() {
            return Err(underrun("write past end of packed buffer", self.pos));
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.write_bytes(&[v])
    }

    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_le_bytes())
    }

    pub fn write_vec3(&mut self, v: Vec3) -> Result<()> {
        self.write_f32(v.x)?;
        self.write_f32(v.y)?;
        self.write_f32(v.z)
    }

    pub fn write_bbox(&mut self, b: BBox) -> Result<()> {
        self.write_vec3(b.min)?;
        self.write_vec3(b.max)
    }
}

#[cfg(test)]
mod binary_tests {
    use super::*;

    #[test]
    fn round_trip_scalars_and_strings() {
        let mut w = Writer::new();
        w.write_i32(-7);
        w.write_f32(2.5);
        w.write_string("engine01");
        w.write_vec3(vec3(1.0, -2.0, 3.0));

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        assert_eq!(r.read_i32().unwrap(), -7);
        assert_eq!(r.read_f32().unwrap(), 2.5);
        assert_eq!(r.read_string().unwrap(), "engine01");
        assert_eq!(r.read_vec3().unwrap(), vec3(1.0, -2.0, 3.0));
        assert!(r.is_empty());
    }

    #[test]
    fn reader_errors_on_underrun() {
        let mut r = Reader::new(&[1, 2]);
        assert!(matches!(r.read_i32(), Err(PofError::Malformed { .. })));
    }

    #[test]
    fn slice_writer_refuses_overrun() {
        let mut buf = [0u8; 4];
        let mut w = SliceWriter::new(&mut buf);
        w.write_i32(1).unwrap();
        assert!(w.write_u8(0).is_err());
    }

    #[test]
    fn flip_is_self_inverse() {
        let v = vec3(1.0, 2.0, 3.0);
        assert_eq!(flip_x(flip_x(v)), v);

        let b = BBox::new(vec3(-1.0, -2.0, -3.0), vec3(4.0, 5.0, 6.0));
        let f = flip_bbox(b);
        assert_eq!(f.min, vec3(-4.0, -2.0, -3.0));
        assert_eq!(f.max, vec3(1.0, 5.0, 6.0));
        assert_eq!(flip_bbox(f), b);
    }
}
