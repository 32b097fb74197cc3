use std::io::Read;

use crc_fast::{CrcAlgorithm, Digest};

/// Reader wrapper that calculates the CRC64/Redis checksum as it reads
pub(crate) struct Crc64Reader<R> {
    reader: R,
    checksum: Digest,
}

impl<R> Crc64Reader<R> {
    pub(crate) fn new(reader: R) -> Self {
        let checksum = Digest::new(CrcAlgorithm::Crc64Redis);
        Self { reader, checksum }
    }

    /// Checksum of everything read so far
    pub(crate) fn checksum(&self) -> u64 {
        self.checksum.finalize()
    }
}

impl<R: Read> Read for Crc64Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.checksum.update(&buf[..n]);
        Ok(n)
    }
}
