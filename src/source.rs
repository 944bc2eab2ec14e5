//! The byte-source contract consumed by the Streamer (SPEC_FULL §6): a
//! single non-negative read-into-buffer operation, 0 meaning EOF. Any
//! `std::io::Read` already satisfies it.

use crate::error::Result;

pub trait ByteSource {
    /// Reads up to `buf.len()` bytes, returning the count read. 0 means EOF.
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl<R: std::io::Read> ByteSource for R {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.read(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn cursor_is_a_byte_source() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        let n = cursor.read_into(&mut buf).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(cursor.read_into(&mut buf).unwrap(), 0);
    }
}
