//! Little-endian helpers shared by the index encoders and the bundle format.

use crate::error::IndexLoadError;

pub(crate) fn put_u8(buffer: &mut Vec<u8>, value: u8) {
    buffer.push(value);
}

pub(crate) fn put_u32(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buffer: &mut Vec<u8>, value: u64) {
    buffer.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_f32s(buffer: &mut Vec<u8>, values: &[f32]) {
    buffer.reserve(values.len() * 4);
    for value in values {
        buffer.extend_from_slice(&value.to_le_bytes());
    }
}

/// A bounds-checked cursor over an encoded buffer.
///
/// Every read fails with [`IndexLoadError::Corrupt`] instead of panicking
/// when the buffer is shorter than the encoding claims.
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub(crate) fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], IndexLoadError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.bytes.len()).ok_or_else(
            || IndexLoadError::Corrupt(format!("unexpected end of data reading {what}")),
        )?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], IndexLoadError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.take(N, what)?);
        Ok(array)
    }

    pub(crate) fn u8(&mut self, what: &str) -> Result<u8, IndexLoadError> {
        Ok(self.take_array::<1>(what)?[0])
    }

    pub(crate) fn u32(&mut self, what: &str) -> Result<u32, IndexLoadError> {
        self.take_array(what).map(u32::from_le_bytes)
    }

    pub(crate) fn u64(&mut self, what: &str) -> Result<u64, IndexLoadError> {
        self.take_array(what).map(u64::from_le_bytes)
    }

    /// Read a `u64` length and check it fits in memory on this platform.
    pub(crate) fn len(&mut self, what: &str) -> Result<usize, IndexLoadError> {
        let value = self.u64(what)?;
        usize::try_from(value)
            .map_err(|_| IndexLoadError::Corrupt(format!("{what} {value} out of range")))
    }

    pub(crate) fn f32s(&mut self, count: usize, what: &str) -> Result<Vec<f32>, IndexLoadError> {
        let byte_len = count
            .checked_mul(4)
            .ok_or_else(|| IndexLoadError::Corrupt(format!("{what} length overflows")))?;
        let raw = self.take(byte_len, what)?;
        Ok(raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Consume and return everything not yet read.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }

    pub(crate) fn finish(&self, what: &str) -> Result<(), IndexLoadError> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(IndexLoadError::Corrupt(format!(
                "{} trailing bytes after {what}",
                self.bytes.len() - self.pos
            )))
        }
    }
}
